//! Bot configuration loaded from the environment.
//!
//! [`BotConfig::from_lookup`] reads every setting through an injectable
//! lookup so tests can feed a map instead of touching the process
//! environment.  Anything invalid is a [`ConfigError`] and stops start-up.

use std::collections::HashMap;
use std::fmt::Display;
use std::str::FromStr;
use std::time::Duration;

use oleg_agent::Tunables;
use oleg_agent::llm::client::{DEFAULT_MODEL, OPENAI_BASE_URL};
use oleg_agent::responder::DEFAULT_MAX_RESPONSE_WORDS;
use oleg_agent::settings::{
    DEFAULT_GAP_MIN_SECONDS, DEFAULT_REPLY_TARGET_RATIO, REPLY_TARGET_RANGE,
};
use oleg_store::StoreConfig;
use oleg_store::window::{DEFAULT_MAX_CHATS, DEFAULT_WINDOW_SIZE};
use url::Url;

use crate::helpers::is_truthy;

const DEFAULT_ALIASES: &str = "oleg";
const DEFAULT_LLM_TIMEOUT_SECS: u64 = 15;
const DEFAULT_CHAT_IDLE_HOURS: i64 = 24;
const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_PORT: u16 = 8000;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} is required but not set")]
    Missing(&'static str),

    #[error("invalid {key}={value:?}: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

impl ConfigError {
    fn invalid(key: &'static str, value: impl Into<String>, reason: impl Display) -> Self {
        Self::Invalid {
            key,
            value: value.into(),
            reason: reason.to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Environment
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Environment {
    #[default]
    Development,
    Production,
}

impl Environment {
    pub fn is_production(self) -> bool {
        self == Self::Production
    }
}

impl FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "development" | "dev" => Ok(Self::Development),
            "production" | "prod" => Ok(Self::Production),
            other => Err(format!("expected `development` or `production`, got `{other}`")),
        }
    }
}

impl Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Development => f.write_str("development"),
            Self::Production => f.write_str("production"),
        }
    }
}

// ---------------------------------------------------------------------------
// BotConfig
// ---------------------------------------------------------------------------

/// Everything the `serve` command needs to wire the bot together.
#[derive(Debug, Clone)]
pub struct BotConfig {
    pub environment: Environment,
    /// `OLEG_DEBUG`: lowers the default log level to `debug`.
    pub debug: bool,

    pub telegram_token: String,
    pub webhook_secret: Option<String>,
    /// Public base URL; the webhook path is appended on registration.
    pub webhook_url: Option<String>,

    pub openai_api_key: String,
    pub openai_model: String,
    pub openai_base_url: String,
    pub llm_timeout: Duration,
    pub max_response_words: usize,

    pub store: StoreConfig,
    pub tunables: Tunables,
    pub chat_idle: chrono::Duration,

    pub admin_user_ids: Vec<i64>,
    /// Overrides the username reported by `getMe`.
    pub bot_username: Option<String>,
    pub bot_aliases: Vec<String>,

    pub host: String,
    pub port: u16,
}

impl BotConfig {
    /// Load from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load from a key/value map.
    pub fn from_map(map: &HashMap<String, String>) -> Result<Self, ConfigError> {
        Self::from_lookup(|key| map.get(key).cloned())
    }

    /// Load through `lookup`.  Blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_owned())
                .filter(|v| !v.is_empty())
        };

        let environment = parse_or(&get, "OLEG_ENV", Environment::Development)?;
        let debug = get("OLEG_DEBUG").is_some_and(|v| is_truthy(&v));

        let telegram_token =
            get("TELEGRAM_BOT_TOKEN").ok_or(ConfigError::Missing("TELEGRAM_BOT_TOKEN"))?;
        let openai_api_key =
            get("OPENAI_API_KEY").ok_or(ConfigError::Missing("OPENAI_API_KEY"))?;

        let webhook_url = get("TELEGRAM_WEBHOOK_URL");
        match &webhook_url {
            Some(raw) => validate_webhook_url(raw, environment)?,
            None if environment.is_production() => {
                return Err(ConfigError::Missing("TELEGRAM_WEBHOOK_URL"));
            }
            None => {}
        }

        let openai_base_url =
            get("OPENAI_BASE_URL").unwrap_or_else(|| OPENAI_BASE_URL.to_owned());
        if let Err(e) = Url::parse(&openai_base_url) {
            return Err(ConfigError::invalid("OPENAI_BASE_URL", openai_base_url, e));
        }

        let store = StoreConfig {
            window_size: parse_positive(&get, "WINDOW_SIZE", DEFAULT_WINDOW_SIZE)?,
            max_chats: parse_positive(&get, "MAX_CHATS", DEFAULT_MAX_CHATS)?,
        };

        let tunables = Tunables {
            reply_target_ratio: parse_or(&get, "REPLY_TARGET_RATIO", DEFAULT_REPLY_TARGET_RATIO)?,
            gap_min_seconds: parse_or(&get, "GAP_MIN_SECONDS", DEFAULT_GAP_MIN_SECONDS)?,
        };
        if let Err(e) = tunables.validate() {
            let key = if REPLY_TARGET_RANGE.contains(&tunables.reply_target_ratio) {
                "GAP_MIN_SECONDS"
            } else {
                "REPLY_TARGET_RATIO"
            };
            let value = get(key).unwrap_or_default();
            return Err(ConfigError::invalid(key, value, e));
        }

        let llm_timeout_secs: u64 =
            parse_positive(&get, "LLM_TIMEOUT_SECONDS", DEFAULT_LLM_TIMEOUT_SECS)?;
        let chat_idle_hours: i64 =
            parse_positive(&get, "CHAT_IDLE_HOURS", DEFAULT_CHAT_IDLE_HOURS)?;
        let chat_idle = chrono::Duration::try_hours(chat_idle_hours).ok_or_else(|| {
            ConfigError::invalid("CHAT_IDLE_HOURS", chat_idle_hours.to_string(), "too large")
        })?;
        let max_response_words =
            parse_positive(&get, "MAX_RESPONSE_WORDS", DEFAULT_MAX_RESPONSE_WORDS)?;
        let aliases = get("BOT_ALIASES").unwrap_or_else(|| DEFAULT_ALIASES.to_owned());

        Ok(Self {
            environment,
            debug,
            telegram_token,
            webhook_secret: get("TELEGRAM_WEBHOOK_SECRET"),
            webhook_url,
            openai_api_key,
            openai_model: get("OPENAI_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_owned()),
            openai_base_url,
            llm_timeout: Duration::from_secs(llm_timeout_secs),
            max_response_words,
            store,
            tunables,
            chat_idle,
            admin_user_ids: parse_admins(get("ADMIN_USER_IDS"))?,
            bot_username: get("BOT_USERNAME").map(|u| u.trim_start_matches('@').to_owned()),
            bot_aliases: parse_aliases(&aliases),
            host: get("HOST").unwrap_or_else(|| DEFAULT_HOST.to_owned()),
            port: parse_or(&get, "PORT", DEFAULT_PORT)?,
        })
    }

    /// Full webhook URL to register, if a public base URL is configured.
    pub fn webhook_endpoint(&self) -> Option<String> {
        self.webhook_url
            .as_deref()
            .and_then(|base| oleg_adapters::webhook_endpoint(base).ok())
    }

    /// Default tracing filter when `RUST_LOG` is not set.
    pub fn log_level(&self) -> &'static str {
        if self.debug { "debug" } else { "info" }
    }
}

// ---------------------------------------------------------------------------
// Parsing helpers
// ---------------------------------------------------------------------------

fn parse_or<T, G>(get: &G, key: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: Display,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(raw) => raw
            .parse()
            .map_err(|e| ConfigError::invalid(key, raw.clone(), e)),
        None => Ok(default),
    }
}

/// Like [`parse_or`], rejecting zero and negative values.
fn parse_positive<T, G>(get: &G, key: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr + PartialOrd + Default,
    T::Err: Display,
    G: Fn(&str) -> Option<String>,
{
    let value = parse_or(get, key, default)?;
    if value <= T::default() {
        return Err(ConfigError::invalid(
            key,
            get(key).unwrap_or_default(),
            "must be greater than zero",
        ));
    }
    Ok(value)
}

fn validate_webhook_url(raw: &str, environment: Environment) -> Result<(), ConfigError> {
    let url = Url::parse(raw).map_err(|e| ConfigError::invalid("TELEGRAM_WEBHOOK_URL", raw, e))?;
    oleg_adapters::webhook_endpoint(raw)
        .map_err(|e| ConfigError::invalid("TELEGRAM_WEBHOOK_URL", raw, e))?;
    if environment.is_production() && url.scheme() != "https" {
        return Err(ConfigError::invalid(
            "TELEGRAM_WEBHOOK_URL",
            raw,
            "Telegram only delivers webhooks over https",
        ));
    }
    Ok(())
}

fn parse_admins(raw: Option<String>) -> Result<Vec<i64>, ConfigError> {
    let Some(raw) = raw else {
        return Ok(Vec::new());
    };
    raw.split(',')
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(|id| {
            id.parse::<i64>().map_err(|e| {
                ConfigError::invalid("ADMIN_USER_IDS", raw.clone(), format!("{id:?}: {e}"))
            })
        })
        .collect()
}

fn parse_aliases(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|a| a.trim().to_lowercase())
        .filter(|a| !a.is_empty())
        .collect()
}
