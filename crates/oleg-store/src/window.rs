//! Per-chat sliding windows with least-recently-active chat eviction.
//!
//! Each chat owns a bounded [`ChatWindow`] behind its own async mutex so
//! that work on one chat never waits on another.  The registry that maps
//! chat ids to windows, together with the recency index used for eviction,
//! sits behind a short synchronous lock that is never held across an
//! `.await`.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::fmt;
use std::ops::Deref;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::debug;

use crate::error::{StoreError, StoreResult};

/// Default number of messages retained per chat.
pub const DEFAULT_WINDOW_SIZE: usize = 50;

/// Default number of chats tracked before eviction kicks in.
pub const DEFAULT_MAX_CHATS: usize = 1000;

// ── message ──────────────────────────────────────────────────────────

/// A single chat message as seen by the bot.
///
/// An edit arriving with an id already in the window replaces the stored
/// text and flags in place; the position and timestamp are kept.  The
/// bot's own replies are stored
/// too (with `from_bot` set) so that prompt construction sees the whole
/// conversation, but analysis code filters them out.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Message {
    /// Telegram message id, unique within the chat.
    pub id: i64,
    pub chat_id: i64,
    pub sender_id: i64,
    /// Message text or media caption.  May be empty.
    pub text: String,
    pub timestamp: DateTime<Utc>,
    /// The message is a reply to one of the bot's messages.
    pub is_reply_to_bot: bool,
    /// The message mentions the bot by username or alias.
    pub mentions_bot: bool,
    /// Id of the message this one replies to, if any.
    pub reply_to_message_id: Option<i64>,
    /// The message was sent by the bot itself.
    pub from_bot: bool,
}

impl Message {
    /// Create a plain human message with no reply or mention flags.
    pub fn new(
        id: i64,
        chat_id: i64,
        sender_id: i64,
        text: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            chat_id,
            sender_id,
            text: text.into(),
            timestamp,
            is_reply_to_bot: false,
            mentions_bot: false,
            reply_to_message_id: None,
            from_bot: false,
        }
    }

    /// Create a record of a message the bot sent.
    pub fn bot_reply(
        id: i64,
        chat_id: i64,
        bot_id: i64,
        text: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            from_bot: true,
            ..Self::new(id, chat_id, bot_id, text, timestamp)
        }
    }

    /// Mark whether the message mentions the bot.
    pub fn with_mention(mut self, mentions_bot: bool) -> Self {
        self.mentions_bot = mentions_bot;
        self
    }

    /// Mark the message as a reply to `reply_to`.
    pub fn with_reply_to(mut self, reply_to: i64, to_bot: bool) -> Self {
        self.reply_to_message_id = Some(reply_to);
        self.is_reply_to_bot = to_bot;
        self
    }

    /// Whether the message is addressed directly at the bot.
    pub fn is_addressed(&self) -> bool {
        self.mentions_bot || self.is_reply_to_bot
    }
}

// ── chat window ──────────────────────────────────────────────────────

/// Bounded, insertion-ordered buffer of a single chat's recent messages.
#[derive(Debug)]
pub struct ChatWindow {
    chat_id: i64,
    capacity: usize,
    messages: VecDeque<Message>,
    last_activity_at: DateTime<Utc>,
    last_bot_reply_at: Option<DateTime<Utc>>,
}

impl ChatWindow {
    fn new(chat_id: i64, capacity: usize, now: DateTime<Utc>) -> Self {
        Self {
            chat_id,
            capacity,
            messages: VecDeque::with_capacity(capacity),
            last_activity_at: now,
            last_bot_reply_at: None,
        }
    }

    pub(crate) fn push(&mut self, message: Message) {
        self.last_activity_at = if self.messages.is_empty() {
            message.timestamp
        } else {
            self.last_activity_at.max(message.timestamp)
        };

        let existing = self
            .messages
            .iter_mut()
            .find(|m| m.id == message.id && m.from_bot == message.from_bot);
        if let Some(stored) = existing {
            stored.text = message.text;
            stored.mentions_bot = message.mentions_bot;
            stored.is_reply_to_bot = message.is_reply_to_bot;
            stored.reply_to_message_id = message.reply_to_message_id;
            return;
        }

        while self.messages.len() >= self.capacity {
            self.messages.pop_front();
        }
        self.messages.push_back(message);
    }

    pub fn chat_id(&self) -> i64 {
        self.chat_id
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Iterate the buffered messages, oldest first.
    pub fn messages(&self) -> impl DoubleEndedIterator<Item = &Message> {
        self.messages.iter()
    }

    /// Clone the buffered messages, oldest first.
    pub fn snapshot(&self) -> Vec<Message> {
        self.messages.iter().cloned().collect()
    }

    /// Clone at most `limit` of the newest messages, oldest first.
    pub fn recent(&self, limit: usize) -> Vec<Message> {
        let skip = self.messages.len().saturating_sub(limit);
        self.messages.iter().skip(skip).cloned().collect()
    }

    pub fn last_activity_at(&self) -> DateTime<Utc> {
        self.last_activity_at
    }

    /// When the bot last replied with text in this chat.
    pub fn last_bot_reply_at(&self) -> Option<DateTime<Utc>> {
        self.last_bot_reply_at
    }

    /// Timestamp of the newest human message in the window.
    pub fn latest_human_at(&self) -> Option<DateTime<Utc>> {
        self.messages
            .iter()
            .filter(|m| !m.from_bot)
            .map(|m| m.timestamp)
            .max()
    }

    /// Whether `message_id` is one of the bot's messages still in the window.
    pub fn contains_bot_message(&self, message_id: i64) -> bool {
        self.messages
            .iter()
            .any(|m| m.from_bot && m.id == message_id)
    }

    /// Number of bot-authored messages in the window.
    pub fn bot_message_count(&self) -> usize {
        self.messages.iter().filter(|m| m.from_bot).count()
    }
}

// ── store config ─────────────────────────────────────────────────────

/// Sizing for a [`SlidingWindowStore`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreConfig {
    /// Messages retained per chat.
    pub window_size: usize,
    /// Chats tracked before the least recently active one is evicted.
    pub max_chats: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            window_size: DEFAULT_WINDOW_SIZE,
            max_chats: DEFAULT_MAX_CHATS,
        }
    }
}

impl StoreConfig {
    fn validate(&self) -> StoreResult<()> {
        if self.window_size == 0 {
            return Err(StoreError::invalid("window_size", "must be at least 1"));
        }
        if self.max_chats == 0 {
            return Err(StoreError::invalid("max_chats", "must be at least 1"));
        }
        Ok(())
    }
}

// ── store stats ──────────────────────────────────────────────────────

/// Point-in-time occupancy of the store.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct StoreStats {
    pub active_chats: usize,
    pub max_chats: usize,
    pub window_size: usize,
    pub total_messages: usize,
    /// Stored messages as a percentage of `max_chats * window_size`.
    pub utilization_percent: f64,
}

impl fmt::Display for StoreStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "chats={}/{} messages={} window={} utilization={:.2}%",
            self.active_chats,
            self.max_chats,
            self.total_messages,
            self.window_size,
            self.utilization_percent,
        )
    }
}

// ── registry ─────────────────────────────────────────────────────────

#[derive(Debug)]
struct Slot {
    window: Arc<AsyncMutex<ChatWindow>>,
    tick: u64,
    last_activity_at: DateTime<Utc>,
    len: usize,
}

/// Chat map plus an ordered recency index.  Smaller ticks are older.
#[derive(Debug, Default)]
struct Registry {
    chats: HashMap<i64, Slot>,
    recency: BTreeMap<u64, i64>,
    next_tick: u64,
}

impl Registry {
    fn bump(&mut self) -> u64 {
        self.next_tick += 1;
        self.next_tick
    }

    /// Move `chat_id` to the most recent position and return its window.
    fn touch(&mut self, chat_id: i64) -> Option<Arc<AsyncMutex<ChatWindow>>> {
        let tick = self.bump();
        let slot = self.chats.get_mut(&chat_id)?;
        self.recency.remove(&slot.tick);
        slot.tick = tick;
        self.recency.insert(tick, chat_id);
        Some(Arc::clone(&slot.window))
    }

    fn insert(&mut self, chat_id: i64, window: Arc<AsyncMutex<ChatWindow>>, now: DateTime<Utc>) {
        let tick = self.bump();
        self.recency.insert(tick, chat_id);
        self.chats.insert(
            chat_id,
            Slot {
                window,
                tick,
                last_activity_at: now,
                len: 0,
            },
        );
    }

    fn remove(&mut self, chat_id: i64) -> bool {
        match self.chats.remove(&chat_id) {
            Some(slot) => {
                self.recency.remove(&slot.tick);
                true
            }
            None => false,
        }
    }

    fn pop_least_recent(&mut self) -> Option<i64> {
        let (_, chat_id) = self.recency.pop_first()?;
        self.chats.remove(&chat_id);
        Some(chat_id)
    }
}

// ── sliding window store ─────────────────────────────────────────────

/// Bounded in-memory store of recent messages for every active chat.
///
/// Memory is bounded by `max_chats * window_size` messages.  All
/// operations are total: unknown chats read as empty windows.
#[derive(Debug)]
pub struct SlidingWindowStore {
    config: StoreConfig,
    registry: Mutex<Registry>,
}

impl SlidingWindowStore {
    /// Create an empty store.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidConfig`] if either size is zero.
    pub fn new(config: StoreConfig) -> StoreResult<Self> {
        config.validate()?;
        debug!(
            window_size = config.window_size,
            max_chats = config.max_chats,
            "sliding window store created"
        );
        Ok(Self {
            config,
            registry: Mutex::new(Registry::default()),
        })
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    fn registry(&self) -> MutexGuard<'_, Registry> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Lock a chat's window for exclusive use, creating it if needed.
    ///
    /// Creating a chat when the store is full evicts the least recently
    /// active chat first.  A task that still holds the guard of an evicted
    /// chat keeps a detached window; its later appends are not tracked.
    pub async fn lock_chat(&self, chat_id: i64) -> ChatGuard<'_> {
        let window = {
            let mut registry = self.registry();
            match registry.touch(chat_id) {
                Some(window) => window,
                None => {
                    while registry.chats.len() >= self.config.max_chats {
                        match registry.pop_least_recent() {
                            Some(evicted) => {
                                debug!(chat_id = evicted, "evicted least recently active chat");
                            }
                            None => break,
                        }
                    }
                    let now = Utc::now();
                    let window = Arc::new(AsyncMutex::new(ChatWindow::new(
                        chat_id,
                        self.config.window_size,
                        now,
                    )));
                    registry.insert(chat_id, Arc::clone(&window), now);
                    window
                }
            }
        };

        ChatGuard {
            store: self,
            window: window.lock_owned().await,
        }
    }

    /// Append a message to its chat's window, dropping the oldest entry
    /// when the window is full.
    pub async fn append(&self, message: Message) {
        let mut chat = self.lock_chat(message.chat_id).await;
        chat.append(message);
    }

    /// The chat's buffered messages, oldest first.  Empty for unknown chats.
    pub async fn window(&self, chat_id: i64) -> Vec<Message> {
        let window = self.registry().touch(chat_id);
        match window {
            Some(window) => window.lock().await.snapshot(),
            None => Vec::new(),
        }
    }

    /// Evict least recently active chats until the chat budget is met.
    ///
    /// Returns the number of chats evicted.
    pub fn evict_if_over_capacity(&self) -> usize {
        let mut registry = self.registry();
        let mut evicted = 0;
        while registry.chats.len() > self.config.max_chats {
            if registry.pop_least_recent().is_none() {
                break;
            }
            evicted += 1;
        }
        if evicted > 0 {
            debug!(evicted, "evicted chats over capacity");
        }
        evicted
    }

    /// Drop a chat's window.  Returns `true` if the chat was tracked.
    pub fn clear_chat(&self, chat_id: i64) -> bool {
        let removed = self.registry().remove(chat_id);
        if removed {
            debug!(chat_id, "cleared chat window");
        }
        removed
    }

    /// Drop every chat idle for longer than `max_idle`.
    ///
    /// Returns the number of chats removed.
    pub fn purge_inactive(&self, max_idle: Duration, now: DateTime<Utc>) -> usize {
        let mut registry = self.registry();
        let stale: Vec<i64> = registry
            .chats
            .iter()
            .filter(|(_, slot)| now - slot.last_activity_at > max_idle)
            .map(|(chat_id, _)| *chat_id)
            .collect();
        for chat_id in &stale {
            registry.remove(*chat_id);
        }
        stale.len()
    }

    /// Number of chats currently tracked.
    pub fn chat_count(&self) -> usize {
        self.registry().chats.len()
    }

    pub fn stats(&self) -> StoreStats {
        let registry = self.registry();
        let active_chats = registry.chats.len();
        let total_messages: usize = registry.chats.values().map(|s| s.len).sum();
        let capacity = self.config.max_chats * self.config.window_size;
        StoreStats {
            active_chats,
            max_chats: self.config.max_chats,
            window_size: self.config.window_size,
            total_messages,
            utilization_percent: total_messages as f64 / capacity as f64 * 100.0,
        }
    }

    fn record_activity(&self, chat_id: i64, at: DateTime<Utc>, len: usize) {
        let mut registry = self.registry();
        if let Some(slot) = registry.chats.get_mut(&chat_id) {
            slot.last_activity_at = at;
            slot.len = len;
        }
    }
}

// ── chat guard ───────────────────────────────────────────────────────

/// Exclusive access to one chat's window.
///
/// Derefs to [`ChatWindow`] for reads; mutations go through the guard so
/// the store's bookkeeping stays in step.
pub struct ChatGuard<'a> {
    store: &'a SlidingWindowStore,
    window: OwnedMutexGuard<ChatWindow>,
}

impl ChatGuard<'_> {
    /// Append a message, dropping the oldest entry when full.
    pub fn append(&mut self, message: Message) {
        self.window.push(message);
        self.store.record_activity(
            self.window.chat_id,
            self.window.last_activity_at,
            self.window.len(),
        );
    }

    /// Record that the bot committed to a text reply at `at`.  Never moves
    /// the recorded time backwards.
    pub fn mark_bot_reply(&mut self, at: DateTime<Utc>) {
        let latest = self
            .window
            .last_bot_reply_at
            .map_or(at, |previous| previous.max(at));
        self.window.last_bot_reply_at = Some(latest);
    }
}

impl Deref for ChatGuard<'_> {
    type Target = ChatWindow;

    fn deref(&self) -> &ChatWindow {
        &self.window
    }
}

// ── tests ────────────────────────────────────────────────────────────
