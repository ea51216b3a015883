//! OpenAI-compatible chat completions client.
//!
//! Talks to `{base_url}/chat/completions` with bearer authentication.  Any
//! endpoint that speaks the OpenAI wire format (OpenAI itself, Ollama, vLLM,
//! Together, ...) works by changing the base URL.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};
use serde_json::{Value, json};

use crate::error::{AgentError, Result};
use crate::llm::CompletionBackend;
use crate::llm::types::{ChatRequest, Completion, Message, Role, Usage};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Default OpenAI API base URL.
pub const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

/// Default model when none is configured.
pub const DEFAULT_MODEL: &str = "gpt-4o";

/// Outer HTTP timeout.  Per-attempt deadlines are enforced by the caller.
const HTTP_TIMEOUT: Duration = Duration::from_secs(60);

// ---------------------------------------------------------------------------
// Client configuration
// ---------------------------------------------------------------------------

/// Configuration for a single chat completions endpoint.
#[derive(Debug, Clone)]
pub struct LlmClientConfig {
    /// API key for bearer authentication.
    pub api_key: String,
    /// Base URL for the API (e.g. `https://api.openai.com/v1`).
    pub base_url: String,
    /// Model used when a request leaves `model` empty.
    pub default_model: String,
    /// Token limit used when a request leaves `max_tokens` unset.
    pub max_tokens: u32,
}

impl LlmClientConfig {
    /// Create a configuration for the OpenAI API.
    pub fn openai(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self::openai_compatible(api_key, model, OPENAI_BASE_URL)
    }

    /// Create a configuration for any OpenAI-compatible API.
    pub fn openai_compatible(
        api_key: impl Into<String>,
        model: impl Into<String>,
        base_url: impl Into<String>,
    ) -> Self {
        let base_url: String = base_url.into();
        Self {
            api_key: api_key.into(),
            base_url: base_url.trim_end_matches('/').to_owned(),
            default_model: model.into(),
            max_tokens: 1024,
        }
    }
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// A non-streaming chat completions client.
#[derive(Debug, Clone)]
pub struct LlmClient {
    config: Arc<LlmClientConfig>,
    http: reqwest::Client,
}

impl LlmClient {
    /// Create a new client with the given configuration.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::MissingApiKey`] for an empty key.
    pub fn new(config: LlmClientConfig) -> Result<Self> {
        if config.api_key.is_empty() {
            return Err(AgentError::MissingApiKey {
                provider: "openai".into(),
            });
        }

        let http = reqwest::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .map_err(|e| AgentError::LlmRequestFailed {
                reason: format!("failed to build HTTP client: {e}"),
            })?;

        Ok(Self {
            config: Arc::new(config),
            http,
        })
    }

    pub fn config(&self) -> &LlmClientConfig {
        &self.config
    }

    /// Send a non-streaming chat request.
    pub async fn chat(&self, request: &ChatRequest) -> Result<Completion> {
        let body = self.build_request_body(request);
        let resp = self.send_request(&body).await?;

        let status = resp.status();
        let text = resp
            .text()
            .await
            .map_err(|e| AgentError::LlmRequestFailed {
                reason: format!("failed to read response body: {e}"),
            })?;

        if !status.is_success() {
            return Err(AgentError::LlmStatus {
                status: status.as_u16(),
                body: text,
            });
        }

        let v: Value = serde_json::from_str(&text).map_err(|e| AgentError::LlmParseFailed {
            reason: format!("invalid JSON response: {e}"),
        })?;

        parse_openai_response(&v)
    }

    /// Build the JSON body for the Chat Completions API.
    fn build_request_body(&self, request: &ChatRequest) -> Value {
        let model = if request.model.is_empty() {
            self.config.default_model.as_str()
        } else {
            request.model.as_str()
        };

        let mut body = json!({
            "model": model,
            "max_tokens": request.max_tokens.unwrap_or(self.config.max_tokens),
            "messages": messages_to_openai(&request.messages),
        });

        if let Some(temp) = request.temperature {
            body["temperature"] = json!(temp);
        }
        if let Some(penalty) = request.presence_penalty {
            body["presence_penalty"] = json!(penalty);
        }
        if let Some(penalty) = request.frequency_penalty {
            body["frequency_penalty"] = json!(penalty);
        }

        body
    }

    async fn send_request(&self, body: &Value) -> Result<reqwest::Response> {
        let url = format!("{}/chat/completions", self.config.base_url);

        let mut headers = HeaderMap::new();
        let auth_value = format!("Bearer {}", self.config.api_key);
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&auth_value).map_err(|e| AgentError::LlmRequestFailed {
                reason: format!("invalid authorization header: {e}"),
            })?,
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        tracing::debug!(url = %url, model = %body["model"], "sending LLM request");

        self.http
            .post(&url)
            .headers(headers)
            .json(body)
            .send()
            .await
            .map_err(|e| AgentError::LlmRequestFailed {
                reason: e.to_string(),
            })
    }
}

#[async_trait]
impl CompletionBackend for LlmClient {
    async fn complete(&self, request: &ChatRequest) -> Result<Completion> {
        self.chat(request).await
    }

    fn model(&self) -> &str {
        &self.config.default_model
    }
}

// ===========================================================================
// Wire format conversion
// ===========================================================================

/// Convert messages into the OpenAI `messages` array.
pub fn messages_to_openai(messages: &[Message]) -> Vec<Value> {
    messages
        .iter()
        .map(|msg| {
            let role = match msg.role {
                Role::System => "system",
                Role::User => "user",
                Role::Assistant => "assistant",
            };
            json!({ "role": role, "content": msg.content })
        })
        .collect()
}

/// Parse a non-streaming Chat Completions response.
pub fn parse_openai_response(v: &Value) -> Result<Completion> {
    let message = &v["choices"][0]["message"];

    if message.is_null() {
        return Err(AgentError::LlmParseFailed {
            reason: "missing `choices[0].message` in response".into(),
        });
    }

    let text = message["content"].as_str().unwrap_or_default().to_owned();
    let usage = match v.get("usage") {
        Some(u) if !u.is_null() => serde_json::from_value(u.clone())?,
        _ => Usage::default(),
    };

    Ok(Completion { text, usage })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn openai_config_construction() {
        let config = LlmClientConfig::openai("sk-test-key", "gpt-4o");
        assert_eq!(config.api_key, "sk-test-key");
        assert_eq!(config.default_model, "gpt-4o");
        assert_eq!(config.base_url, "https://api.openai.com/v1");
    }

    #[test]
    fn openai_compatible_config_trims_trailing_slash() {
        let config =
            LlmClientConfig::openai_compatible("local-key", "llama3", "http://localhost:11434/v1/");
        assert_eq!(config.base_url, "http://localhost:11434/v1");
        assert_eq!(config.default_model, "llama3");
    }

    #[test]
    fn empty_api_key_returns_error() {
        let result = LlmClient::new(LlmClientConfig::openai("", "gpt-4o"));
        assert!(matches!(result, Err(AgentError::MissingApiKey { .. })));
    }

    #[test]
    fn messages_to_openai_keeps_roles_and_order() {
        let messages = vec![
            Message::system("You are Oleg."),
            Message::user("hi"),
            Message::assistant("hey"),
        ];
        let wire = messages_to_openai(&messages);
        assert_eq!(wire.len(), 3);
        assert_eq!(wire[0]["role"], "system");
        assert_eq!(wire[1]["content"], "hi");
        assert_eq!(wire[2]["role"], "assistant");
    }

    #[test]
    fn build_request_body_applies_defaults_and_sampling() {
        let client = LlmClient::new(LlmClientConfig::openai("sk", "gpt-4o")).unwrap();
        let mut request = ChatRequest::new(vec![Message::user("hi")]);
        request.temperature = Some(0.8);
        request.max_tokens = Some(150);
        request.presence_penalty = Some(0.1);

        let body = client.build_request_body(&request);
        assert_eq!(body["model"], "gpt-4o");
        assert_eq!(body["max_tokens"], 150);
        assert!((body["temperature"].as_f64().unwrap() - 0.8).abs() < 1e-6);
        assert!(body.get("frequency_penalty").is_none());
        assert_eq!(body["messages"][0]["role"], "user");
    }

    #[test]
    fn parse_openai_text_response() {
        let response = serde_json::json!({
            "id": "chatcmpl-abc",
            "object": "chat.completion",
            "choices": [{
                "index": 0,
                "message": {"role": "assistant", "content": "Hello from OpenAI!"},
                "finish_reason": "stop"
            }],
            "usage": {"prompt_tokens": 10, "completion_tokens": 5, "total_tokens": 15}
        });

        let completion = parse_openai_response(&response).unwrap();
        assert_eq!(completion.text, "Hello from OpenAI!");
        assert_eq!(completion.usage.total_tokens, 15);
    }

    #[test]
    fn parse_response_without_usage_defaults_to_zero() {
        let response = serde_json::json!({
            "choices": [{"message": {"role": "assistant", "content": "ok"}}]
        });
        let completion = parse_openai_response(&response).unwrap();
        assert_eq!(completion.usage, Usage::default());
    }

    #[test]
    fn parse_response_without_choices_fails() {
        let response = serde_json::json!({"error": {"message": "boom"}});
        assert!(matches!(
            parse_openai_response(&response),
            Err(AgentError::LlmParseFailed { .. })
        ));
    }
}
