//! Agent error types.
//!
//! All agent subsystems surface errors through [`AgentError`].  Most of
//! them never reach a chat user: the responder turns LLM failures into a
//! fallback reply and the pipeline counts delivery failures.

/// Unified error type for the agent crate.
#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    // -- LLM errors ----------------------------------------------------------
    /// An HTTP request to the LLM provider failed before a status arrived.
    #[error("llm request failed: {reason}")]
    LlmRequestFailed { reason: String },

    /// The LLM provider answered with a non-success status.
    #[error("llm api returned {status}: {body}")]
    LlmStatus { status: u16, body: String },

    /// The LLM response could not be parsed into the expected format.
    #[error("llm response parse error: {reason}")]
    LlmParseFailed { reason: String },

    /// A single completion attempt exceeded its time limit.
    #[error("llm request timed out after {seconds}s")]
    LlmTimeout { seconds: u64 },

    /// The model answered with nothing usable.
    #[error("llm returned an empty completion")]
    EmptyCompletion,

    /// The API key is missing for a provider that requires one.
    #[error("missing api key for provider: {provider}")]
    MissingApiKey { provider: String },

    // -- Outbound chat errors ------------------------------------------------
    /// Sending a message or reaction to the chat platform failed.
    #[error("delivery failed: {reason}")]
    DeliveryFailed { reason: String },

    // -- Configuration errors ------------------------------------------------
    /// A tunable or input value is outside its accepted range.
    #[error("validation error: {reason}")]
    ValidationError { reason: String },

    // -- Serialization -------------------------------------------------------
    /// JSON serialization or deserialization failed.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    // -- Upstream crate errors -----------------------------------------------
    /// An error propagated from the store crate.
    #[error("store error: {0}")]
    Store(#[from] oleg_store::StoreError),
}

impl AgentError {
    /// Whether retrying the same request may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::LlmRequestFailed { .. } | Self::LlmTimeout { .. } | Self::EmptyCompletion => {
                true
            }
            Self::LlmStatus { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}

/// Convenience alias used throughout the agent crate.
pub type Result<T> = std::result::Result<T, AgentError>;

impl From<reqwest::Error> for AgentError {
    fn from(err: reqwest::Error) -> Self {
        Self::LlmRequestFailed {
            reason: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_limits_and_server_errors_are_transient() {
        let rate_limited = AgentError::LlmStatus {
            status: 429,
            body: String::new(),
        };
        let server = AgentError::LlmStatus {
            status: 503,
            body: String::new(),
        };
        assert!(rate_limited.is_transient());
        assert!(server.is_transient());
        assert!(AgentError::LlmTimeout { seconds: 15 }.is_transient());
    }

    #[test]
    fn client_errors_are_not_transient() {
        let unauthorized = AgentError::LlmStatus {
            status: 401,
            body: "bad key".into(),
        };
        assert!(!unauthorized.is_transient());
        assert!(
            !AgentError::LlmParseFailed {
                reason: "x".into()
            }
            .is_transient()
        );
    }
}
