//! Platform adapters for the Oleg bot.
//!
//! - [`telegram`] -- Bot API client: messages, reactions, webhook management.
//! - [`update`] -- Inbound webhook payload types and their conversion into
//!   stored messages.
//! - [`error`] -- Adapter error types.

pub mod error;
pub mod telegram;
pub mod update;

pub use error::{AdapterError, Result};
pub use telegram::{
    BotIdentity, TelegramClient, TelegramConfig, WebhookInfo, WebhookOptions, webhook_endpoint,
};
pub use update::{Chat, TgMessage, Update, User};
