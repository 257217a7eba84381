//! CLI command execution.
//!
//! Commands work on the local store directly; `serve` starts the HTTP front
//! door over the same data directory.

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use chrono::Local;
use clap::CommandFactory;

use crate::config::Config;
use crate::context::AppContext;
use crate::conversation::{submit, SubmitTarget};
use crate::models::{Chat, ChatMode, Message};
use crate::server;

use super::args::{Cli, Commands};

/// Width of the title column in `list`.
const TITLE_WIDTH: usize = 40;

/// Build the runtime config from global flags.
fn base_config(cli: &Cli) -> Config {
    let mut config = if cli.ephemeral {
        Config::ephemeral()
    } else {
        Config::default()
    };
    if let Some(dir) = &cli.data_dir {
        config.data_dir.clone_from(dir);
    }
    config
}

/// Execute the CLI command.
pub async fn execute(cli: Cli) -> Result<()> {
    let mut config = base_config(&cli);

    let Some(command) = cli.command else {
        Cli::command().print_help()?;
        println!();
        return Ok(());
    };

    match command {
        Commands::Serve {
            port,
            origin,
            cache_version,
            no_skip_waiting,
            open,
        } => {
            config.port = port;
            config.origin = origin;
            if let Some(version) = cache_version {
                config.cache_version = version;
            }
            config.skip_waiting = !no_skip_waiting;
            server::start_server(&config, open).await
        }
        command => run_local(&config, command).await,
    }
}

/// Run a command against the local store.
async fn run_local(config: &Config, command: Commands) -> Result<()> {
    if !config.ephemeral {
        if let Some(port) = server::running_port(config) {
            eprintln!(
                "Note: a server on port {port} uses this data directory; it will not see these changes until restarted."
            );
        }
    }

    let ctx = AppContext::from_config(config)?;

    match command {
        Commands::New { mode, message } => {
            let mode = match mode {
                Some(mode) => ChatMode::from(mode),
                None => ctx.store.read().await.ui().selected_mode,
            };
            converse(&ctx, SubmitTarget::NewChat(mode), &message.join(" ")).await
        }
        Commands::Ask { id, message } => {
            require_chat(&ctx, &id).await?;
            converse(&ctx, SubmitTarget::Existing(id), &message.join(" ")).await
        }
        Commands::List => list_chats(&ctx).await,
        Commands::Show { id } => show_chat(&ctx, id.as_deref()).await,
        Commands::Use { id } => {
            require_chat(&ctx, &id).await?;
            ctx.store.write().await.set_current_chat(&id);
            println!("Active chat: {id}");
            Ok(())
        }
        Commands::Rename { id, title } => {
            require_chat(&ctx, &id).await?;
            let title = title.join(" ");
            ctx.store.write().await.rename_chat(&id, &title);
            println!("Renamed {id} to \"{title}\"");
            Ok(())
        }
        Commands::Delete { id } => {
            require_chat(&ctx, &id).await?;
            ctx.store.write().await.delete_chat(&id);
            println!("Deleted {id}");
            Ok(())
        }
        Commands::Edit {
            chat_id,
            message_id,
            content,
        } => {
            let chat = require_chat(&ctx, &chat_id).await?;
            if chat.message(&message_id).is_none() {
                bail!("Message {message_id} not found in chat {chat_id}");
            }
            ctx.store
                .write()
                .await
                .update_message(&chat_id, &message_id, &content.join(" "));
            println!("Updated {message_id}");
            Ok(())
        }
        Commands::Mode { mode } => {
            let mode = ChatMode::from(mode);
            ctx.store.write().await.set_selected_mode(mode);
            println!("New chats will use {mode} mode");
            Ok(())
        }
        Commands::DarkMode { setting } => {
            ctx.store.write().await.set_dark_mode(setting.enabled());
            println!("Dark mode {}", if setting.enabled() { "on" } else { "off" });
            Ok(())
        }
        Commands::Screen { screen } => {
            let screen = screen.into();
            ctx.store.write().await.set_current_screen(screen);
            println!("Current screen: {screen}");
            Ok(())
        }
        Commands::Stats => {
            let stats = ctx.store.read().await.stats();
            println!("Chats:    {}", stats.total_chats);
            println!("Messages: {}", stats.total_messages);
            println!(
                "Academic: {} ({}%)",
                stats.academic_chats, stats.academic_percent
            );
            println!("Clinical: {}", stats.clinical_chats);
            Ok(())
        }
        Commands::Clear => {
            ctx.clear_all().await;
            println!("All chats and preferences deleted.");
            Ok(())
        }
        Commands::Serve { .. } => bail!("serve cannot run against the local store"),
    }
}

/// Look up a chat, failing with a readable error when it is missing.
async fn require_chat(ctx: &AppContext, chat_id: &str) -> Result<Chat> {
    match ctx.store.read().await.chat(chat_id) {
        Some(chat) => Ok(chat.clone()),
        None => bail!("Chat {chat_id} not found. Use 'nelson list' to see chats."),
    }
}

/// Submit a message and print the assistant's reply once it lands.
async fn converse(ctx: &Arc<AppContext>, target: SubmitTarget, content: &str) -> Result<()> {
    let Some(submission) = submit(ctx, target, content).await else {
        bail!("Nothing sent: the message is empty or the chat no longer exists");
    };
    println!("Chat ID: {}", submission.chat_id);

    let reply_id = submission
        .reply
        .await
        .context("Assistant reply task failed")?;

    let store = ctx.store.read().await;
    if let Some(reply) = store
        .chat(&submission.chat_id)
        .and_then(|chat| chat.message(&reply_id))
    {
        println!();
        print_message(reply);
    }
    Ok(())
}

async fn list_chats(ctx: &AppContext) -> Result<()> {
    let store = ctx.store.read().await;
    if store.chats().is_empty() {
        println!("No chats yet.");
        return Ok(());
    }

    let current = store.ui().current_chat_id.as_deref();
    println!(
        "  {:<43} {:<TITLE_WIDTH$} {:<9} {:<5} {:<16}",
        "ID", "TITLE", "MODE", "MSGS", "UPDATED"
    );
    println!("{}", "-".repeat(120));
    for chat in store.chats() {
        println!("{}", format_row(chat, current == Some(chat.id.as_str())));
    }
    Ok(())
}

fn format_row(chat: &Chat, active: bool) -> String {
    let marker = if active { '*' } else { ' ' };
    let title: String = if chat.title.chars().count() > TITLE_WIDTH {
        let mut short: String = chat.title.chars().take(TITLE_WIDTH - 3).collect();
        short.push_str("...");
        short
    } else {
        chat.title.clone()
    };
    format!(
        "{marker} {:<43} {title:<TITLE_WIDTH$} {:<9} {:<5} {:<16}",
        chat.id,
        chat.mode.as_str(),
        chat.messages.len(),
        chat.updated_at
            .with_timezone(&Local)
            .format("%Y-%m-%d %H:%M"),
    )
}

async fn show_chat(ctx: &AppContext, chat_id: Option<&str>) -> Result<()> {
    let store = ctx.store.read().await;
    let chat = match chat_id {
        Some(id) => store.chat(id),
        None => store.current_chat(),
    };
    let Some(chat) = chat else {
        match chat_id {
            Some(id) => bail!("Chat {id} not found."),
            None => {
                println!("No active chat. Start one with 'nelson new <message>'.");
                return Ok(());
            }
        }
    };

    println!("{} [{}]", chat.title, chat.mode);
    println!("{}", "-".repeat(60));
    if chat.messages.is_empty() {
        println!("No messages yet.");
    }
    for message in &chat.messages {
        print_message(message);
    }
    Ok(())
}

fn print_message(message: &Message) {
    println!("[{}] {}", message.role.as_str().to_uppercase(), message.id);
    println!("{}", message.content);
    for citation in message.citations.iter().flatten() {
        println!(
            "  - Chapter {}, p. {}: {}",
            citation.chapter, citation.page, citation.text
        );
    }
    println!();
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use std::path::PathBuf;

    #[test]
    fn base_config_applies_global_flags() {
        let cli = Cli::parse_from(["nelson", "--data-dir", "/tmp/nelson-test", "--ephemeral", "list"]);
        let config = base_config(&cli);
        assert_eq!(config.data_dir, PathBuf::from("/tmp/nelson-test"));
        assert!(config.ephemeral);
    }

    #[test]
    fn row_marks_active_and_truncates_title() {
        let mut chat = Chat::new(ChatMode::Clinical);
        chat.title = "x".repeat(60);
        chat.messages.push(Message::user("hi"));

        let row = format_row(&chat, true);
        assert!(row.starts_with("* "));
        assert!(row.contains(&format!("{}...", "x".repeat(TITLE_WIDTH - 3))));
        assert!(!row.contains(&"x".repeat(TITLE_WIDTH + 1)));
        assert!(row.contains("clinical"));

        assert!(format_row(&chat, false).starts_with("  "));
    }

    #[tokio::test]
    async fn require_chat_reports_missing() {
        let ctx = AppContext::from_config(&Config::ephemeral()).unwrap();
        let id = ctx.store.write().await.create_chat(ChatMode::Academic);

        assert_eq!(require_chat(&ctx, &id).await.unwrap().id, id);
        let err = require_chat(&ctx, "chat-missing").await.unwrap_err();
        assert!(err.to_string().contains("chat-missing"));
    }
}
