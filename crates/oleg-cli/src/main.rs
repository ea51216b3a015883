//! CLI entry point for Oleg.
//!
//! This binary provides the `oleg` command with subcommands for serving the
//! webhook, managing the webhook registration and checking configuration.

mod check;
mod cli;
mod config;
mod helpers;
mod serve;
mod webhook;

use anyhow::Result;
use clap::Parser;

use crate::cli::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    // A missing .env file is fine; the process environment still applies.
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { host, port } => serve::cmd_serve(host, port).await,
        Commands::Webhook { action } => webhook::cmd_webhook(action).await,
        Commands::Check => check::cmd_check().await,
    }
}
