//! Shared application state for the web server.
//!
//! [`AppState`] is wrapped in an `Arc` and shared across all request
//! handlers and background tasks.  Everything mutable inside it is already
//! synchronized (store, quota, live settings, atomic counters), so handlers
//! never take a lock on the state itself.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use oleg_agent::{LiveSettings, Pipeline};
use oleg_store::{QuotaTracker, SlidingWindowStore};
use serde::Serialize;

/// Default idle time after which a chat's window is purged.
pub const DEFAULT_CHAT_IDLE_HOURS: i64 = 24;

/// Shared state accessible from every Axum handler.
pub struct AppState {
    pub pipeline: Arc<Pipeline>,
    pub store: Arc<SlidingWindowStore>,
    pub quota: Arc<QuotaTracker>,
    pub settings: LiveSettings,

    /// Expected `X-Telegram-Bot-Api-Secret-Token`; `None` disables the check.
    pub webhook_secret: Option<String>,

    /// The bot's own user id, used to skip its own messages and flag
    /// replies to it.
    pub bot_id: Option<i64>,

    /// Chats idle longer than this are purged by the background sweep.
    pub chat_idle: chrono::Duration,

    pub webhook_stats: WebhookStats,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(
        pipeline: Arc<Pipeline>,
        store: Arc<SlidingWindowStore>,
        quota: Arc<QuotaTracker>,
        settings: LiveSettings,
    ) -> Self {
        Self {
            pipeline,
            store,
            quota,
            settings,
            webhook_secret: None,
            bot_id: None,
            chat_idle: chrono::Duration::hours(DEFAULT_CHAT_IDLE_HOURS),
            webhook_stats: WebhookStats::default(),
            started_at: Instant::now(),
        }
    }

    pub fn with_webhook_secret(mut self, secret: Option<String>) -> Self {
        self.webhook_secret = secret.filter(|s| !s.is_empty());
        self
    }

    pub fn with_bot_id(mut self, bot_id: i64) -> Self {
        self.bot_id = Some(bot_id);
        self
    }

    pub fn with_chat_idle(mut self, idle: chrono::Duration) -> Self {
        self.chat_idle = idle;
        self
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }
}

// ── webhook counters ────────────────────────────────────────────────

/// Counters for inbound webhook traffic.
#[derive(Debug, Default)]
pub struct WebhookStats {
    received: AtomicU64,
    dispatched: AtomicU64,
    ignored: AtomicU64,
    rejected_secret: AtomicU64,
    malformed: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct WebhookSnapshot {
    pub received: u64,
    pub dispatched: u64,
    pub ignored: u64,
    pub rejected_secret: u64,
    pub malformed: u64,
}

impl WebhookStats {
    pub(crate) fn record_received(&self) {
        self.received.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_dispatched(&self) {
        self.dispatched.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_ignored(&self) {
        self.ignored.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_rejected_secret(&self) {
        self.rejected_secret.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_malformed(&self) {
        self.malformed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> WebhookSnapshot {
        WebhookSnapshot {
            received: self.received.load(Ordering::Relaxed),
            dispatched: self.dispatched.load(Ordering::Relaxed),
            ignored: self.ignored.load(Ordering::Relaxed),
            rejected_secret: self.rejected_secret.load(Ordering::Relaxed),
            malformed: self.malformed.load(Ordering::Relaxed),
        }
    }
}
