//! CLI argument definitions.
//!
//! All `clap` structures live here so that `main.rs` stays focused on
//! dispatching subcommands.

use clap::{Parser, Subcommand};

/// Oleg -- a witty group-chat bot for Telegram.
#[derive(Parser)]
#[command(
    name = "oleg",
    version,
    about = "Oleg -- a witty group-chat bot for Telegram",
    long_about = "Receives Telegram updates over a webhook and joins group conversations \
                  sparingly: replies when addressed, otherwise within a target reply ratio, \
                  reacting with an emoji when a topic is hot."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the webhook server.
    Serve {
        /// Address to bind the HTTP server to.  Overrides `HOST`.
        #[arg(long)]
        host: Option<String>,

        /// Port to listen on.  Overrides `PORT`.
        #[arg(long, short)]
        port: Option<u16>,
    },

    /// Manage the Telegram webhook registration.
    Webhook {
        #[command(subcommand)]
        action: WebhookAction,
    },

    /// Validate configuration and the Telegram token, then exit.
    Check,
}

#[derive(Subcommand)]
pub enum WebhookAction {
    /// Register `TELEGRAM_WEBHOOK_URL` with Telegram.
    Set {
        /// Discard updates queued while no webhook was set.
        #[arg(long)]
        drop_pending: bool,
    },

    /// Remove the webhook registration.
    Delete {
        /// Discard updates queued for delivery.
        #[arg(long)]
        drop_pending: bool,
    },

    /// Show the current webhook registration.
    Info,
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn serve_flags_are_optional() {
        let cli = Cli::try_parse_from(["oleg", "serve"]).unwrap();
        assert!(matches!(cli.command, Commands::Serve { host: None, port: None }));

        let cli =
            Cli::try_parse_from(["oleg", "serve", "--host", "127.0.0.1", "-p", "9000"]).unwrap();
        match cli.command {
            Commands::Serve { host, port } => {
                assert_eq!(host.as_deref(), Some("127.0.0.1"));
                assert_eq!(port, Some(9000));
            }
            _ => panic!("expected serve"),
        }
    }

    #[test]
    fn webhook_subcommands_parse() {
        let cli = Cli::try_parse_from(["oleg", "webhook", "set", "--drop-pending"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Webhook { action: WebhookAction::Set { drop_pending: true } }
        ));

        let cli = Cli::try_parse_from(["oleg", "webhook", "info"]).unwrap();
        assert!(matches!(cli.command, Commands::Webhook { action: WebhookAction::Info }));

        assert!(Cli::try_parse_from(["oleg", "webhook"]).is_err());
        assert!(Cli::try_parse_from(["oleg", "serve", "--port", "http"]).is_err());
    }
}
