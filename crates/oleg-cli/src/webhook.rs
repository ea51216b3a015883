//! Subcommand: `oleg webhook` -- manage the Telegram webhook by hand.
//!
//! Only needs `TELEGRAM_BOT_TOKEN` (plus `TELEGRAM_WEBHOOK_URL` and the
//! optional secret for `set`), so it works before the rest of the bot is
//! configured.

use anyhow::{Context, Result};

use oleg_adapters::{TelegramClient, TelegramConfig, WebhookInfo, WebhookOptions, webhook_endpoint};

use crate::cli::WebhookAction;
use crate::helpers::{env_non_empty, init_tracing};
use crate::serve::register_webhook;

pub async fn cmd_webhook(action: WebhookAction) -> Result<()> {
    init_tracing("warn", false);

    let token = env_non_empty("TELEGRAM_BOT_TOKEN")
        .ok_or_else(|| anyhow::anyhow!("TELEGRAM_BOT_TOKEN is required"))?;
    let telegram = TelegramClient::new(TelegramConfig::new(token))
        .context("failed to create Telegram client")?;

    match action {
        WebhookAction::Set { drop_pending } => {
            let base = env_non_empty("TELEGRAM_WEBHOOK_URL")
                .ok_or_else(|| anyhow::anyhow!("TELEGRAM_WEBHOOK_URL is required"))?;
            let endpoint = webhook_endpoint(&base).context("invalid TELEGRAM_WEBHOOK_URL")?;
            let options = WebhookOptions {
                url: endpoint.clone(),
                secret_token: env_non_empty("TELEGRAM_WEBHOOK_SECRET"),
                drop_pending_updates: drop_pending,
            };
            register_webhook(&telegram, &options).await?;
            println!("Webhook set: {endpoint}");
        }
        WebhookAction::Delete { drop_pending } => {
            telegram
                .delete_webhook(drop_pending)
                .await
                .context("failed to delete webhook")?;
            println!("Webhook deleted.");
        }
        WebhookAction::Info => {
            let info = telegram
                .get_webhook_info()
                .await
                .context("failed to fetch webhook info")?;
            print!("{}", describe_webhook(&info));
        }
    }
    Ok(())
}

/// Human-readable summary of a `getWebhookInfo` result.
pub fn describe_webhook(info: &WebhookInfo) -> String {
    let mut out = String::new();
    if info.url.is_empty() {
        out.push_str("  URL:              (not set)\n");
    } else {
        out.push_str(&format!("  URL:              {}\n", info.url));
    }
    out.push_str(&format!("  Pending updates:  {}\n", info.pending_update_count));
    if let Some(max) = info.max_connections {
        out.push_str(&format!("  Max connections:  {max}\n"));
    }
    if let Some(updates) = &info.allowed_updates {
        out.push_str(&format!("  Allowed updates:  {}\n", updates.join(", ")));
    }
    if let Some(message) = &info.last_error_message {
        let when = info
            .last_error_date
            .and_then(|ts| chrono::DateTime::from_timestamp(ts, 0))
            .map(|dt| dt.format("%Y-%m-%d %H:%M:%S UTC").to_string())
            .unwrap_or_else(|| "unknown time".to_owned());
        out.push_str(&format!("  Last error:       {message} ({when})\n"));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn describes_unset_webhook() {
        let info = WebhookInfo {
            url: String::new(),
            pending_update_count: 0,
            last_error_date: None,
            last_error_message: None,
            max_connections: None,
            allowed_updates: None,
        };
        let text = describe_webhook(&info);
        assert!(text.contains("(not set)"));
        assert!(text.contains("Pending updates:  0"));
        assert!(!text.contains("Last error"));
    }

    #[test]
    fn describes_webhook_with_error() {
        let info = WebhookInfo {
            url: "https://bot.example.com/webhook/telegram".into(),
            pending_update_count: 3,
            last_error_date: Some(0),
            last_error_message: Some("Connection refused".into()),
            max_connections: Some(40),
            allowed_updates: Some(vec!["message".into(), "edited_message".into()]),
        };
        let text = describe_webhook(&info);
        assert!(text.contains("https://bot.example.com/webhook/telegram"));
        assert!(text.contains("Max connections:  40"));
        assert!(text.contains("message, edited_message"));
        assert!(text.contains("Connection refused (1970-01-01 00:00:00 UTC)"));
    }
}
