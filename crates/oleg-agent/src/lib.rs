//! Conversation brain for the Oleg bot.
//!
//! This crate decides whether the bot speaks, reacts, or stays quiet for
//! every group message, and produces the words when it does speak.
//!
//! ## Architecture
//!
//! ```text
//! inbound Message
//!        │
//! ┌──────┴───────┐   command?   ┌────────────────┐
//! │   Pipeline   │─────────────>│ CommandHandler │
//! └──────┬───────┘              └────────────────┘
//!        │
//! ┌──────┴─────────┐   Reply    ┌───────────┐    ┌────────────┐
//! │ DecisionEngine │───────────>│ Responder │───>│ LLM client │
//! │ (heat, quota,  │            └───────────┘    └────────────┘
//! │  gap)          │   React    ┌───────────┐
//! └────────────────┘───────────>│ reactions │
//!                               └───────────┘
//! ```
//!
//! ## Modules
//!
//! - [`pipeline`] -- Per-message flow and the outbound [`ChatSender`] seam.
//! - [`decision`] -- Reply / react / ignore rules and topic heat.
//! - [`language`] / [`tone`] -- Window analysis feeding prompts and reactions.
//! - [`reactions`] -- Emoji selection from Telegram's allowed set.
//! - [`responder`] -- Prompting, retries, post-processing, fallbacks.
//! - [`commands`] -- `/setquota`, `/setgap`, `/stats`, `/help`, `/status`.
//! - [`settings`] -- Live-tunable reply target and gap.
//! - [`llm`] -- OpenAI-compatible chat completions client.
//! - [`error`] -- Agent error types.

pub mod commands;
pub mod decision;
pub mod error;
pub mod language;
pub mod llm;
pub mod pipeline;
pub mod reactions;
pub mod responder;
pub mod settings;
pub mod tone;

// Re-export the most commonly used types at the crate root.
pub use commands::{Command, CommandHandler, Invocation};
pub use decision::{
    Action, Decision, DecisionEngine, DecisionInput, DecisionReason, RandomSource, topic_heat,
};
pub use error::{AgentError, Result};
pub use language::{detect_language, detect_text};
pub use llm::{ChatRequest, Completion, CompletionBackend, LlmClient, LlmClientConfig, Usage};
pub use pipeline::{
    ChatSender, MentionDetector, Outcome, Pipeline, PipelineParts, PipelineSnapshot, PipelineStats,
};
pub use reactions::{ALLOWED_REACTIONS, choose_reaction, select_emoji};
pub use responder::{Responder, ResponderConfig, ResponderStats, UsageSnapshot, fallback_reply};
pub use settings::{LiveSettings, Tunables};
pub use tone::{EmojiLevel, Formality, ToneHints, analyze_tone};
