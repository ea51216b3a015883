//! Telegram Bot API client.
//!
//! Covers what the bot needs from the platform: identity (`getMe`), text
//! replies (`sendMessage`), emoji reactions (`setMessageReaction`) and
//! webhook management (`setWebhook`, `deleteWebhook`, `getWebhookInfo`).
//!
//! Every call goes through one retry loop.  A 429 is retried after the
//! `retry_after` Telegram sends, as long as that wait is within bounds;
//! 5xx responses and transport failures are retried with exponential
//! backoff.  Anything else fails immediately.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use oleg_agent::ChatSender;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{debug, info, warn};
use url::Url;

use crate::error::{AdapterError, Result};

/// Telegram Bot API host.  Method calls are POSTed to
/// `{base}/bot{token}/{method}`.
const TELEGRAM_API_BASE: &str = "https://api.telegram.org";

/// Path the webhook server listens on, relative to the public base URL.
pub const WEBHOOK_PATH: &str = "webhook/telegram";

/// Update kinds the bot subscribes to.
const ALLOWED_UPDATES: &[&str] = &["message", "edited_message"];

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct TelegramConfig {
    pub token: String,
    /// API host; overridable for tests.
    pub api_base: String,
    /// Total attempts per call, including the first.
    pub max_attempts: u32,
    /// Longest `retry_after` the client is willing to wait out.
    pub max_retry_after: Duration,
    /// Delay before the first retry of a transient failure.
    pub base_backoff: Duration,
    pub request_timeout: Duration,
}

impl TelegramConfig {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            api_base: TELEGRAM_API_BASE.to_owned(),
            max_attempts: 3,
            max_retry_after: Duration::from_secs(30),
            base_backoff: Duration::from_millis(500),
            request_timeout: Duration::from_secs(30),
        }
    }

    /// Point the client at another API host.
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_owned();
        self
    }
}

// ---------------------------------------------------------------------------
// Result types
// ---------------------------------------------------------------------------

/// The bot's own account, from `getMe`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct BotIdentity {
    pub id: i64,
    #[serde(default)]
    pub first_name: String,
    pub username: Option<String>,
}

/// Current webhook registration, from `getWebhookInfo`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct WebhookInfo {
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub pending_update_count: u64,
    pub last_error_date: Option<i64>,
    pub last_error_message: Option<String>,
    pub max_connections: Option<u32>,
    pub allowed_updates: Option<Vec<String>>,
}

/// Parameters for `setWebhook`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebhookOptions {
    /// Full webhook URL, see [`webhook_endpoint`].
    pub url: String,
    pub secret_token: Option<String>,
    pub drop_pending_updates: bool,
}

/// Build the full webhook URL from the public base URL.
///
/// # Errors
///
/// Returns [`AdapterError::InvalidInput`] when `base` is not an absolute
/// http(s) URL.
pub fn webhook_endpoint(base: &str) -> Result<String> {
    let mut parsed = Url::parse(base.trim())
        .map_err(|e| AdapterError::InvalidInput(format!("invalid webhook base URL {base:?}: {e}")))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(AdapterError::InvalidInput(format!(
            "webhook base URL must be http(s), got {base:?}"
        )));
    }
    if !parsed.path().ends_with('/') {
        let path = format!("{}/", parsed.path());
        parsed.set_path(&path);
    }
    let full = parsed
        .join(WEBHOOK_PATH)
        .map_err(|e| AdapterError::InvalidInput(format!("invalid webhook base URL {base:?}: {e}")))?;
    Ok(full.to_string())
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// Async client for the handful of Bot API methods the bot uses.
#[derive(Debug, Clone)]
pub struct TelegramClient {
    config: Arc<TelegramConfig>,
    http: reqwest::Client,
}

impl TelegramClient {
    /// Create a client.
    ///
    /// # Errors
    ///
    /// Returns [`AdapterError::ConfigError`] for an empty token or when the
    /// HTTP client cannot be built.
    pub fn new(config: TelegramConfig) -> Result<Self> {
        if config.token.trim().is_empty() {
            return Err(AdapterError::ConfigError(
                "Telegram bot token is empty".into(),
            ));
        }
        let http = reqwest::Client::builder()
            .user_agent(concat!("oleg/", env!("CARGO_PKG_VERSION")))
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| AdapterError::ConfigError(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            config: Arc::new(config),
            http,
        })
    }

    pub fn config(&self) -> &TelegramConfig {
        &self.config
    }

    /// Build a full Bot API URL for `method`.
    fn api_url(&self, method: &str) -> String {
        format!("{}/bot{}/{}", self.config.api_base, self.config.token, method)
    }

    /// Parse a Bot API response, returning its `result` on success.
    ///
    /// Telegram responses follow the format
    /// `{ "ok": true, "result": ... }` on success, or
    /// `{ "ok": false, "error_code": 429, "description": "...",
    /// "parameters": { "retry_after": 5 } }` on failure.
    pub fn parse_telegram_response(response: &Value, method: &str) -> Result<Value> {
        let ok = response
            .get("ok")
            .and_then(|v| v.as_bool())
            .unwrap_or(false);

        if !ok {
            let code = response
                .get("error_code")
                .and_then(|v| v.as_i64())
                .unwrap_or(-1);
            let description = response
                .get("description")
                .and_then(|v| v.as_str())
                .unwrap_or("unknown error")
                .to_owned();
            let retry_after = response
                .pointer("/parameters/retry_after")
                .and_then(|v| v.as_u64());
            return Err(AdapterError::Api {
                method: method.to_owned(),
                code,
                description,
                retry_after,
            });
        }

        Ok(response.get("result").cloned().unwrap_or(Value::Null))
    }

    /// POST `body` to `method`, retrying rate limits and transient failures.
    async fn call(&self, method: &str, body: &Value) -> Result<Value> {
        let url = self.api_url(method);
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;
            let err = match self.call_once(&url, method, body).await {
                Ok(result) => return Ok(result),
                Err(e) => e,
            };

            if attempt >= self.config.max_attempts || !err.is_transient() {
                return Err(err);
            }

            let rate_limit_wait = match &err {
                AdapterError::Api {
                    code: 429,
                    retry_after,
                    ..
                } => Some(Duration::from_secs(retry_after.unwrap_or(1))),
                _ => None,
            };
            let delay = match rate_limit_wait {
                Some(wait) if wait > self.config.max_retry_after => {
                    warn!(method, wait_secs = wait.as_secs(), "rate limit wait too long, giving up");
                    return Err(err);
                }
                Some(wait) => wait,
                None => self.config.base_backoff * (1u32 << (attempt - 1)),
            };

            warn!(
                method,
                attempt,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "Telegram call failed, retrying"
            );
            tokio::time::sleep(delay).await;
        }
    }

    async fn call_once(&self, url: &str, method: &str, body: &Value) -> Result<Value> {
        debug!(method, "calling Telegram API");

        let response = self
            .http
            .post(url)
            .json(body)
            .send()
            .await
            .map_err(|e| AdapterError::Http {
                method: method.to_owned(),
                reason: e.without_url().to_string(),
            })?;

        let status = response.status();
        let json_resp: Value = response.json().await.map_err(|e| AdapterError::Parse {
            method: method.to_owned(),
            reason: format!("status {status}: {e}"),
        })?;

        Self::parse_telegram_response(&json_resp, method)
    }

    fn decode<T: serde::de::DeserializeOwned>(method: &str, value: Value) -> Result<T> {
        serde_json::from_value(value).map_err(|e| AdapterError::Parse {
            method: method.to_owned(),
            reason: e.to_string(),
        })
    }

    // -----------------------------------------------------------------------
    // Methods
    // -----------------------------------------------------------------------

    /// Fetch the bot's own account.  Doubles as a token check.
    pub async fn get_me(&self) -> Result<BotIdentity> {
        let result = self.call("getMe", &json!({})).await?;
        Self::decode("getMe", result)
    }

    /// Send a plain-text message, optionally as a reply.  Returns the id of
    /// the sent message.
    pub async fn send_message(&self, chat_id: i64, text: &str, reply_to: Option<i64>) -> Result<i64> {
        if text.trim().is_empty() {
            return Err(AdapterError::InvalidInput("message text is empty".into()));
        }

        let mut body = json!({
            "chat_id": chat_id,
            "text": text,
        });
        if let Some(message_id) = reply_to {
            body["reply_parameters"] = json!({
                "message_id": message_id,
                "allow_sending_without_reply": true,
            });
        }

        let result = self.call("sendMessage", &body).await?;
        result
            .get("message_id")
            .and_then(|v| v.as_i64())
            .ok_or_else(|| AdapterError::Parse {
                method: "sendMessage".into(),
                reason: "missing `message_id` in result".into(),
            })
    }

    /// Replace the bot's reaction on a message with a single emoji.
    pub async fn set_message_reaction(&self, chat_id: i64, message_id: i64, emoji: &str) -> Result<()> {
        let body = json!({
            "chat_id": chat_id,
            "message_id": message_id,
            "reaction": [{ "type": "emoji", "emoji": emoji }],
        });
        self.call("setMessageReaction", &body).await?;
        Ok(())
    }

    /// Register the webhook.
    pub async fn set_webhook(&self, options: &WebhookOptions) -> Result<()> {
        let mut body = json!({
            "url": options.url,
            "drop_pending_updates": options.drop_pending_updates,
            "allowed_updates": ALLOWED_UPDATES,
        });
        if let Some(secret) = &options.secret_token {
            body["secret_token"] = json!(secret);
        }

        self.call("setWebhook", &body).await?;
        info!(url = %options.url, "Telegram webhook set");
        Ok(())
    }

    /// Remove the webhook registration.
    pub async fn delete_webhook(&self, drop_pending_updates: bool) -> Result<()> {
        self.call(
            "deleteWebhook",
            &json!({ "drop_pending_updates": drop_pending_updates }),
        )
        .await?;
        info!("Telegram webhook deleted");
        Ok(())
    }

    pub async fn get_webhook_info(&self) -> Result<WebhookInfo> {
        let result = self.call("getWebhookInfo", &json!({})).await?;
        Self::decode("getWebhookInfo", result)
    }
}

#[async_trait]
impl ChatSender for TelegramClient {
    async fn send_message(&self, chat_id: i64, text: &str, reply_to: Option<i64>) -> oleg_agent::Result<i64> {
        Ok(TelegramClient::send_message(self, chat_id, text, reply_to).await?)
    }

    async fn set_reaction(&self, chat_id: i64, message_id: i64, emoji: &str) -> oleg_agent::Result<()> {
        Ok(self.set_message_reaction(chat_id, message_id, emoji).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> TelegramClient {
        TelegramClient::new(TelegramConfig::new("123456:ABC-DEF")).unwrap()
    }

    #[test]
    fn empty_token_is_rejected() {
        let err = TelegramClient::new(TelegramConfig::new("  ")).unwrap_err();
        assert!(matches!(err, AdapterError::ConfigError(_)));
    }

    #[test]
    fn api_url_embeds_token_and_method() {
        assert_eq!(
            client().api_url("sendMessage"),
            "https://api.telegram.org/bot123456:ABC-DEF/sendMessage"
        );
    }

    #[test]
    fn api_base_override_trims_slash() {
        let config = TelegramConfig::new("t").with_api_base("http://127.0.0.1:9999/");
        assert_eq!(config.api_base, "http://127.0.0.1:9999");
    }

    #[test]
    fn parse_success_returns_result() {
        let resp = json!({ "ok": true, "result": { "message_id": 5 } });
        let result = TelegramClient::parse_telegram_response(&resp, "sendMessage").unwrap();
        assert_eq!(result["message_id"], 5);
    }

    #[test]
    fn parse_failure_keeps_code_and_retry_after() {
        let resp = json!({
            "ok": false,
            "error_code": 429,
            "description": "Too Many Requests: retry after 7",
            "parameters": { "retry_after": 7 }
        });
        match TelegramClient::parse_telegram_response(&resp, "sendMessage") {
            Err(AdapterError::Api {
                code, retry_after, ..
            }) => {
                assert_eq!(code, 429);
                assert_eq!(retry_after, Some(7));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn parse_missing_ok_is_an_error() {
        let err = TelegramClient::parse_telegram_response(&json!({}), "getMe").unwrap_err();
        assert_eq!(err.api_code(), Some(-1));
    }

    #[test]
    fn webhook_endpoint_appends_path() {
        assert_eq!(
            webhook_endpoint("https://bot.example.com").unwrap(),
            "https://bot.example.com/webhook/telegram"
        );
        assert_eq!(
            webhook_endpoint("https://example.com/oleg/").unwrap(),
            "https://example.com/oleg/webhook/telegram"
        );
        assert_eq!(
            webhook_endpoint("https://example.com/oleg").unwrap(),
            "https://example.com/oleg/webhook/telegram"
        );
    }

    #[test]
    fn webhook_endpoint_rejects_bad_urls() {
        assert!(webhook_endpoint("not a url").is_err());
        assert!(webhook_endpoint("ftp://example.com").is_err());
    }
}
