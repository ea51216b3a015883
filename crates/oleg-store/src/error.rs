//! Error types for the oleg-store crate.
//!
//! Store operations themselves are total; errors only arise when a store
//! or tracker is constructed with an unusable configuration.

use thiserror::Error;

/// Alias for `Result<T, StoreError>`.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur when building the conversation state.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A configuration value is outside its accepted range.
    #[error("invalid store config: {field} {reason}")]
    InvalidConfig {
        field: &'static str,
        reason: String,
    },
}

impl StoreError {
    pub(crate) fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            field,
            reason: reason.into(),
        }
    }
}
