//! Per-message processing pipeline.
//!
//! One call to [`Pipeline::handle_message`] takes an inbound chat message
//! through storage, command dispatch or the decision engine, and finally the
//! outbound side effect (reply, reaction, or nothing).
//!
//! The chat's window lock is held only while the message is appended and
//! the decision is recorded.  LLM and platform calls happen after it is
//! released; the lock is reacquired just to store the bot's sent reply.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use chrono::Utc;
use oleg_store::{Message, QuotaOutcome, QuotaTracker, SlidingWindowStore};
use rand::SeedableRng;
use rand::rngs::StdRng;
use regex::Regex;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::commands::CommandHandler;
use crate::decision::{Action, DecisionEngine, DecisionInput, DecisionReason, RandomSource};
use crate::error::{AgentError, Result};
use crate::reactions::choose_reaction;
use crate::responder::Responder;
use crate::settings::LiveSettings;
use crate::tone::analyze_tone;

// ---------------------------------------------------------------------------
// Outbound seam
// ---------------------------------------------------------------------------

/// Outbound operations on the chat platform.
#[async_trait]
pub trait ChatSender: Send + Sync {
    /// Send `text` to `chat_id`, optionally as a reply.  Returns the id of
    /// the sent message.
    async fn send_message(&self, chat_id: i64, text: &str, reply_to: Option<i64>) -> Result<i64>;

    /// Put a single emoji reaction on a message.
    async fn set_reaction(&self, chat_id: i64, message_id: i64, emoji: &str) -> Result<()>;
}

// ---------------------------------------------------------------------------
// Mention detection
// ---------------------------------------------------------------------------

/// Recognizes `@username` mentions and bare alias words.
#[derive(Debug, Clone)]
pub struct MentionDetector {
    username: Option<Regex>,
    aliases: Vec<String>,
}

impl MentionDetector {
    /// Build a detector for `username` (with or without the leading `@`)
    /// and a list of alias words.  Matching is case-insensitive.
    pub fn new(username: Option<&str>, aliases: &[String]) -> Result<Self> {
        let username = username
            .map(|name| name.trim().trim_start_matches('@'))
            .filter(|name| !name.is_empty())
            .map(|name| {
                Regex::new(&format!(r"(?i)@{}\b", regex::escape(name))).map_err(|e| {
                    AgentError::ValidationError {
                        reason: format!("invalid bot username {name:?}: {e}"),
                    }
                })
            })
            .transpose()?;
        let aliases = aliases
            .iter()
            .map(|a| a.trim().to_lowercase())
            .filter(|a| !a.is_empty())
            .collect();
        Ok(Self { username, aliases })
    }

    pub fn mentions(&self, text: &str) -> bool {
        if self.username.as_ref().is_some_and(|re| re.is_match(text)) {
            return true;
        }
        if self.aliases.is_empty() {
            return false;
        }
        text.to_lowercase()
            .split(|c: char| !c.is_alphanumeric() && c != '_')
            .any(|word| self.aliases.iter().any(|alias| alias == word))
    }
}

// ---------------------------------------------------------------------------
// Statistics
// ---------------------------------------------------------------------------

/// Counters for pipeline outcomes and outbound failures.
#[derive(Debug, Default)]
pub struct PipelineStats {
    messages: AtomicU64,
    replies: AtomicU64,
    reactions: AtomicU64,
    ignored: AtomicU64,
    commands: AtomicU64,
    send_errors: AtomicU64,
    reaction_errors: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PipelineSnapshot {
    pub messages: u64,
    pub replies: u64,
    pub reactions: u64,
    pub ignored: u64,
    pub commands: u64,
    pub send_errors: u64,
    pub reaction_errors: u64,
}

impl PipelineStats {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> PipelineSnapshot {
        PipelineSnapshot {
            messages: self.messages.load(Ordering::Relaxed),
            replies: self.replies.load(Ordering::Relaxed),
            reactions: self.reactions.load(Ordering::Relaxed),
            ignored: self.ignored.load(Ordering::Relaxed),
            commands: self.commands.load(Ordering::Relaxed),
            send_errors: self.send_errors.load(Ordering::Relaxed),
            reaction_errors: self.reaction_errors.load(Ordering::Relaxed),
        }
    }
}

impl fmt::Display for PipelineStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = self.snapshot();
        write!(
            f,
            "messages={} replies={} reactions={} ignored={} commands={} errors={}",
            s.messages,
            s.replies,
            s.reactions,
            s.ignored,
            s.commands,
            s.send_errors + s.reaction_errors,
        )
    }
}

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

/// What the pipeline did with one message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// A text reply was generated.  `sent` is the platform id when delivery
    /// succeeded.
    Replied { sent: Option<i64> },
    Reacted { emoji: &'static str },
    Ignored { reason: DecisionReason },
    /// The message was a command and its response was sent.
    Command { sent: Option<i64> },
    /// Stored only; nothing to act on (no text).
    Stored,
}

/// Shared components the pipeline is assembled from.
pub struct PipelineParts {
    pub store: Arc<SlidingWindowStore>,
    pub quota: Arc<QuotaTracker>,
    pub settings: LiveSettings,
    pub engine: DecisionEngine,
    pub responder: Arc<Responder>,
    pub commands: CommandHandler,
    pub sender: Arc<dyn ChatSender>,
    pub mentions: MentionDetector,
    /// Platform user id of the bot; stored replies carry it as sender.
    pub bot_id: i64,
}

pub struct Pipeline {
    store: Arc<SlidingWindowStore>,
    quota: Arc<QuotaTracker>,
    settings: LiveSettings,
    engine: DecisionEngine,
    responder: Arc<Responder>,
    commands: CommandHandler,
    sender: Arc<dyn ChatSender>,
    mentions: MentionDetector,
    bot_id: i64,
    rng: Mutex<Box<dyn RandomSource>>,
    stats: PipelineStats,
}

impl Pipeline {
    /// Assemble a pipeline that draws admission randomness from the OS.
    pub fn new(parts: PipelineParts) -> Self {
        Self::with_rng(parts, Box::new(StdRng::from_os_rng()))
    }

    /// Assemble a pipeline with an explicit random source.
    pub fn with_rng(parts: PipelineParts, rng: Box<dyn RandomSource>) -> Self {
        Self {
            store: parts.store,
            quota: parts.quota,
            settings: parts.settings,
            engine: parts.engine,
            responder: parts.responder,
            commands: parts.commands,
            sender: parts.sender,
            mentions: parts.mentions,
            bot_id: parts.bot_id,
            rng: Mutex::new(rng),
            stats: PipelineStats::default(),
        }
    }

    pub fn stats(&self) -> &PipelineStats {
        &self.stats
    }

    pub fn responder(&self) -> &Responder {
        &self.responder
    }

    pub fn engine(&self) -> &DecisionEngine {
        &self.engine
    }

    /// Process one inbound message.
    ///
    /// Decisions are evaluated at the message's timestamp, clamped so a
    /// chat's clock never runs backwards: a late or re-delivered message is
    /// judged at the newest time the chat has already seen.  Commands and
    /// their responses are answered but never stored.
    pub async fn handle_message(&self, mut message: Message) -> Outcome {
        PipelineStats::bump(&self.stats.messages);
        if !message.mentions_bot && self.mentions.mentions(&message.text) {
            message.mentions_bot = true;
        }

        let mut chat = self.store.lock_chat(message.chat_id).await;
        let now = [chat.latest_human_at(), chat.last_bot_reply_at()]
            .into_iter()
            .flatten()
            .fold(message.timestamp, std::cmp::max);
        if now > message.timestamp {
            debug!(
                chat_id = message.chat_id,
                message_id = message.id,
                stamped = %message.timestamp,
                now = %now,
                "late message moved to chat time"
            );
            message.timestamp = now;
        }

        if let Some(invocation) = self.commands.parse(&message.text) {
            PipelineStats::bump(&self.stats.commands);
            let response = self.commands.execute(&invocation, message.sender_id, &chat, now);
            drop(chat);
            let sent = self.deliver(&message, response, false).await;
            return Outcome::Command { sent };
        }

        if let Some(reply_to) = message.reply_to_message_id {
            if chat.contains_bot_message(reply_to) {
                message.is_reply_to_bot = true;
            }
        }
        chat.append(message.clone());

        if message.text.trim().is_empty() {
            return Outcome::Stored;
        }

        let window = chat.snapshot();
        let input = DecisionInput {
            message: &message,
            window: &window,
            last_bot_reply_at: chat.last_bot_reply_at(),
            quota_ratio: self.quota.ratio(now),
            tunables: self.settings.snapshot(),
            now,
        };
        let decision = {
            let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
            self.engine.decide(&input, rng.as_mut())
        };

        let quota_outcome = match decision.action {
            Action::Reply => QuotaOutcome::Replied,
            Action::React => QuotaOutcome::Reacted,
            Action::Ignore => QuotaOutcome::Ignored,
        };
        self.quota.record(quota_outcome, now);
        if decision.action == Action::Reply {
            chat.mark_bot_reply(now);
        }
        drop(chat);

        debug!(
            chat_id = message.chat_id,
            message_id = message.id,
            action = %decision.action,
            reason = %decision.reason,
            heat = decision.heat,
            "decision made"
        );

        match decision.action {
            Action::Reply => {
                PipelineStats::bump(&self.stats.replies);
                let hints = analyze_tone(&window);
                let text = self.responder.generate_reply(&window, &hints, &message).await;
                let sent = self.deliver(&message, text, true).await;
                Outcome::Replied { sent }
            }
            Action::React => {
                PipelineStats::bump(&self.stats.reactions);
                let hints = analyze_tone(&window);
                let emoji = choose_reaction(&message.text, &hints);
                if let Err(e) = self
                    .sender
                    .set_reaction(message.chat_id, message.id, emoji)
                    .await
                {
                    PipelineStats::bump(&self.stats.reaction_errors);
                    warn!(chat_id = message.chat_id, message_id = message.id, error = %e, "reaction failed");
                }
                Outcome::Reacted { emoji }
            }
            Action::Ignore => {
                PipelineStats::bump(&self.stats.ignored);
                Outcome::Ignored {
                    reason: decision.reason,
                }
            }
        }
    }

    /// Send `text` as a reply to `trigger`, recording it in the window when
    /// `record` is set.
    async fn deliver(&self, trigger: &Message, text: String, record: bool) -> Option<i64> {
        match self
            .sender
            .send_message(trigger.chat_id, &text, Some(trigger.id))
            .await
        {
            Ok(sent_id) => {
                if record {
                    let mut chat = self.store.lock_chat(trigger.chat_id).await;
                    chat.append(Message::bot_reply(
                        sent_id,
                        trigger.chat_id,
                        self.bot_id,
                        text,
                        Utc::now(),
                    ));
                }
                info!(chat_id = trigger.chat_id, reply_to = trigger.id, sent_id, "reply sent");
                Some(sent_id)
            }
            Err(e) => {
                PipelineStats::bump(&self.stats.send_errors);
                warn!(chat_id = trigger.chat_id, reply_to = trigger.id, error = %e, "send failed");
                None
            }
        }
    }
}
