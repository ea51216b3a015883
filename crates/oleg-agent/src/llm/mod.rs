//! LLM integration layer.
//!
//! - [`types`] -- prompt messages, requests, completions.
//! - [`client`] -- HTTP client for OpenAI-compatible endpoints.
//!
//! The responder only depends on [`CompletionBackend`], so tests can swap
//! the HTTP client for a scripted one.

pub mod client;
pub mod types;

use async_trait::async_trait;

use crate::error::Result;

pub use client::{LlmClient, LlmClientConfig};
pub use types::{ChatRequest, Completion, Message, Role, Usage};

/// Anything that can turn a chat request into a completion.
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    async fn complete(&self, request: &ChatRequest) -> Result<Completion>;

    /// Model name reported in statistics.
    fn model(&self) -> &str;
}
