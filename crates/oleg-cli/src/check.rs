//! Subcommand: `oleg check` -- validate configuration and exit.

use anyhow::{Context, Result};

use oleg_adapters::{TelegramClient, TelegramConfig};

use crate::config::BotConfig;

pub async fn cmd_check() -> Result<()> {
    let config = BotConfig::from_env().context("invalid configuration")?;
    print!("{}", summarize(&config));

    let telegram = TelegramClient::new(TelegramConfig::new(&config.telegram_token))
        .context("failed to create Telegram client")?;
    let me = telegram
        .get_me()
        .await
        .context("TELEGRAM_BOT_TOKEN was rejected by getMe")?;
    println!(
        "  Telegram:         ok (@{}, id {})",
        me.username.as_deref().unwrap_or("-"),
        me.id
    );
    println!();
    println!("  Configuration OK.");
    Ok(())
}

/// Summary of the effective configuration.  Credentials are masked.
pub fn summarize(config: &BotConfig) -> String {
    let mut out = String::new();
    out.push('\n');
    out.push_str(&format!("  Oleg v{}\n", env!("CARGO_PKG_VERSION")));
    out.push_str(&format!("  Environment:      {}\n", config.environment));
    out.push_str(&format!("  Telegram token:   {}\n", mask(&config.telegram_token)));
    out.push_str(&format!(
        "  Webhook:          {}\n",
        config.webhook_endpoint().as_deref().unwrap_or("(not configured)")
    ));
    out.push_str(&format!(
        "  Webhook secret:   {}\n",
        if config.webhook_secret.is_some() { "set" } else { "not set" }
    ));
    out.push_str(&format!("  OpenAI key:       {}\n", mask(&config.openai_api_key)));
    out.push_str(&format!(
        "  Model:            {} via {}\n",
        config.openai_model, config.openai_base_url
    ));
    out.push_str(&format!(
        "  Reply target:     {:.1}%\n",
        config.tunables.reply_target_ratio * 100.0
    ));
    out.push_str(&format!("  Minimum gap:      {}s\n", config.tunables.gap_min_seconds));
    out.push_str(&format!(
        "  Store:            {} chats x {} messages\n",
        config.store.max_chats, config.store.window_size
    ));
    out.push_str(&format!("  Admins:           {}\n", config.admin_user_ids.len()));
    out.push_str(&format!("  Aliases:          {}\n", config.bot_aliases.join(", ")));
    out.push_str(&format!("  Listen:           {}:{}\n", config.host, config.port));
    out
}

/// Keep only the last four characters of a credential.
fn mask(secret: &str) -> String {
    let chars: Vec<char> = secret.chars().collect();
    if chars.len() <= 8 {
        return "****".to_owned();
    }
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("****{tail}")
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    #[test]
    fn mask_hides_short_and_long_secrets() {
        assert_eq!(mask("abc"), "****");
        assert_eq!(mask("sk-1234567890abcd"), "****abcd");
    }

    #[test]
    fn summary_never_prints_credentials() {
        let map = HashMap::from([
            ("TELEGRAM_BOT_TOKEN".to_owned(), "123456:SECRET-TOKEN-VALUE".to_owned()),
            ("OPENAI_API_KEY".to_owned(), "sk-very-secret-key".to_owned()),
            ("TELEGRAM_WEBHOOK_SECRET".to_owned(), "hook-secret".to_owned()),
            ("TELEGRAM_WEBHOOK_URL".to_owned(), "https://bot.example.com".to_owned()),
        ]);
        let config = BotConfig::from_map(&map).unwrap();
        let text = summarize(&config);

        assert!(!text.contains("SECRET-TOKEN"));
        assert!(!text.contains("very-secret"));
        assert!(!text.contains("hook-secret"));
        assert!(text.contains("https://bot.example.com/webhook/telegram"));
        assert!(text.contains("Reply target:     10.0%"));
        assert!(text.contains("Minimum gap:      20s"));
    }
}
