//! Nelson - offline-first pediatric reference chat.
//!
//! Keeps chat sessions and UI preferences in a persisted store, answers
//! questions through a pluggable assistant, and serves the web app through
//! a versioned offline cache.
//!
//! Architecture:
//! - `store` owns chats and UI state and writes every change through
//! - `cache` intercepts app-shell requests and answers them cache-first
//! - `server` exposes both over HTTP; the CLI drives the store directly

mod assistant;
mod cache;
mod cli;
mod config;
mod connectivity;
mod context;
mod conversation;
mod install;
mod models;
mod server;
mod store;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use cli::{execute, Cli};

#[tokio::main]
async fn main() -> Result<()> {
    // RUST_LOG replaces the default filter entirely when set.
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("nelson=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    execute(cli).await
}
