//! CLI argument definitions.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

use crate::config::{DEFAULT_ORIGIN, DEFAULT_PORT};
use crate::models::{ChatMode, Screen};

/// Nelson-GPT - pediatric reference chat, offline first
#[derive(Parser, Debug)]
#[command(name = "nelson")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Directory holding persisted chats and preferences
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    /// Keep everything in memory for this run
    #[arg(long, global = true)]
    pub ephemeral: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the app server
    Serve {
        /// Port to listen on
        #[arg(short, long, default_value_t = DEFAULT_PORT)]
        port: u16,

        /// Upstream origin serving the app shell
        #[arg(long, default_value = DEFAULT_ORIGIN)]
        origin: String,

        /// Name of the cache bucket to seed and keep
        #[arg(long)]
        cache_version: Option<String>,

        /// Wait for an explicit SKIP_WAITING before activating the cache
        #[arg(long)]
        no_skip_waiting: bool,

        /// Open browser automatically
        #[arg(long)]
        open: bool,
    },

    /// Start a new chat with a message and wait for the reply
    New {
        /// Mode for the new chat (defaults to the selected mode)
        #[arg(short, long, value_enum)]
        mode: Option<ModeArg>,

        /// Message to send
        #[arg(trailing_var_arg = true, required = true)]
        message: Vec<String>,
    },

    /// Send a message to an existing chat and wait for the reply
    Ask {
        /// Chat ID
        id: String,

        /// Message to send
        #[arg(trailing_var_arg = true, required = true)]
        message: Vec<String>,
    },

    /// List chats, newest first
    List,

    /// Show a chat's messages (defaults to the active chat)
    Show {
        /// Chat ID
        id: Option<String>,
    },

    /// Make a chat active
    Use {
        /// Chat ID
        id: String,
    },

    /// Rename a chat
    Rename {
        /// Chat ID
        id: String,

        /// New title
        #[arg(trailing_var_arg = true, required = true)]
        title: Vec<String>,
    },

    /// Delete a chat
    Delete {
        /// Chat ID
        id: String,
    },

    /// Replace a message's content
    Edit {
        /// Chat ID
        chat_id: String,

        /// Message ID
        message_id: String,

        /// New content
        #[arg(trailing_var_arg = true, required = true)]
        content: Vec<String>,
    },

    /// Set the mode used for new chats
    Mode {
        #[arg(value_enum)]
        mode: ModeArg,
    },

    /// Turn dark mode on or off
    DarkMode {
        #[arg(value_enum)]
        setting: Toggle,
    },

    /// Switch the current screen
    Screen {
        #[arg(value_enum)]
        screen: ScreenArg,
    },

    /// Show usage statistics
    Stats,

    /// Delete all chats and preferences
    Clear,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum ModeArg {
    Academic,
    Clinical,
}

impl From<ModeArg> for ChatMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Academic => Self::Academic,
            ModeArg::Clinical => Self::Clinical,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum Toggle {
    On,
    Off,
}

impl Toggle {
    pub const fn enabled(self) -> bool {
        matches!(self, Self::On)
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum ScreenArg {
    Chat,
    History,
    Settings,
    Profile,
}

impl From<ScreenArg> for Screen {
    fn from(screen: ScreenArg) -> Self {
        match screen {
            ScreenArg::Chat => Self::Chat,
            ScreenArg::History => Self::History,
            ScreenArg::Settings => Self::Settings,
            ScreenArg::Profile => Self::Profile,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_new_with_mode() {
        let cli = Cli::parse_from(["nelson", "new", "-m", "clinical", "fever", "in", "infants"]);
        match cli.command {
            Some(Commands::New { mode, message }) => {
                assert!(matches!(mode, Some(ModeArg::Clinical)));
                assert_eq!(message.join(" "), "fever in infants");
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn global_flags_after_subcommand() {
        let cli = Cli::parse_from(["nelson", "list", "--ephemeral"]);
        assert!(cli.ephemeral);
        assert!(matches!(cli.command, Some(Commands::List)));
    }

    #[test]
    fn serve_defaults() {
        let cli = Cli::parse_from(["nelson", "serve"]);
        match cli.command {
            Some(Commands::Serve {
                port,
                origin,
                cache_version,
                no_skip_waiting,
                open,
            }) => {
                assert_eq!(port, DEFAULT_PORT);
                assert_eq!(origin, DEFAULT_ORIGIN);
                assert!(cache_version.is_none());
                assert!(!no_skip_waiting);
                assert!(!open);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn dark_mode_toggle() {
        let cli = Cli::parse_from(["nelson", "dark-mode", "on"]);
        match cli.command {
            Some(Commands::DarkMode { setting }) => assert!(setting.enabled()),
            other => panic!("unexpected command: {other:?}"),
        }
    }
}
