//! Adapter error types.
//!
//! Every Telegram failure surfaces as an [`AdapterError`].  API-level
//! failures keep the method name and Telegram's error code so callers can
//! tell a rate limit from a bad request without parsing strings.

/// Unified error type for the adapters crate.
#[derive(Debug, thiserror::Error)]
pub enum AdapterError {
    /// The HTTP request never produced a response.
    #[error("{method}: request failed: {reason}")]
    Http { method: String, reason: String },

    /// Telegram answered `ok: false`.
    #[error("{method}: Telegram API error (code {code}): {description}")]
    Api {
        method: String,
        code: i64,
        description: String,
        /// Seconds to wait before retrying, sent with 429 responses.
        retry_after: Option<u64>,
    },

    /// The response body was not the expected JSON shape.
    #[error("{method}: failed to parse response: {reason}")]
    Parse { method: String, reason: String },

    /// Caller-supplied input was rejected before any request was made.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Configuration error in adapter setup.
    #[error("configuration error: {0}")]
    ConfigError(String),

    /// JSON serialization or deserialization failed.
    #[error("serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

impl AdapterError {
    /// Telegram error code, when the failure came from the API itself.
    pub fn api_code(&self) -> Option<i64> {
        match self {
            Self::Api { code, .. } => Some(*code),
            _ => None,
        }
    }

    /// Whether the same call may succeed after waiting.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Http { .. } => true,
            Self::Api { code, .. } => *code == 429 || *code >= 500,
            _ => false,
        }
    }
}

impl From<AdapterError> for oleg_agent::AgentError {
    fn from(err: AdapterError) -> Self {
        Self::DeliveryFailed {
            reason: err.to_string(),
        }
    }
}

/// Convenience alias used throughout the adapters crate.
pub type Result<T> = std::result::Result<T, AdapterError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_classification() {
        let limited = AdapterError::Api {
            method: "sendMessage".into(),
            code: 429,
            description: "Too Many Requests".into(),
            retry_after: Some(3),
        };
        assert!(limited.is_transient());
        assert_eq!(limited.api_code(), Some(429));

        let bad = AdapterError::Api {
            method: "sendMessage".into(),
            code: 400,
            description: "Bad Request: chat not found".into(),
            retry_after: None,
        };
        assert!(!bad.is_transient());
        assert!(!AdapterError::InvalidInput("x".into()).is_transient());
    }

    #[test]
    fn converts_into_delivery_failure() {
        let err: oleg_agent::AgentError = AdapterError::Http {
            method: "sendMessage".into(),
            reason: "connection reset".into(),
        }
        .into();
        assert!(err.to_string().contains("connection reset"));
    }
}
