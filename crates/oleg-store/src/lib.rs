//! # oleg-store
//!
//! In-memory conversation state for the Oleg bot.
//!
//! Nothing here is persisted.  The store keeps a bounded window of recent
//! messages per chat and evicts whole chats in least-recently-active order
//! once the configured chat budget is exceeded.  The quota tracker keeps a
//! rolling record of how many eligible messages the bot answered.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │  SlidingWindowStore                          │
//! │    registry (std Mutex, never held on await) │
//! │      chat_id -> Arc<tokio Mutex<ChatWindow>> │
//! │      recency index (tick -> chat_id)         │
//! ├──────────────────────────────────────────────┤
//! │  QuotaTracker (rolling window of decisions)  │
//! └──────────────────────────────────────────────┘
//! ```
//!
//! ## Quick start
//!
//! ```ignore
//! use oleg_store::{Message, SlidingWindowStore, StoreConfig};
//!
//! let store = SlidingWindowStore::new(StoreConfig::default())?;
//! store.append(Message::new(1, -100, 42, "hello", chrono::Utc::now())).await;
//! let recent = store.window(-100).await;
//! ```

pub mod error;
pub mod quota;
pub mod window;

// ── re-exports ───────────────────────────────────────────────────────

pub use error::{StoreError, StoreResult};
pub use quota::{QuotaConfig, QuotaOutcome, QuotaSnapshot, QuotaTracker};
pub use window::{ChatGuard, ChatWindow, Message, SlidingWindowStore, StoreConfig, StoreStats};
