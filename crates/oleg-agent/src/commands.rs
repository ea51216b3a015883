//! Slash commands for inspecting and tuning the bot from inside a chat.
//!
//! `/setquota` and `/setgap` mutate the shared [`LiveSettings`] and are
//! limited to the admin allow-list.  `/stats`, `/status` and `/help` are
//! read-only and open to everyone.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use oleg_store::{ChatWindow, QuotaTracker, SlidingWindowStore};
use tracing::info;

use crate::reactions::ALLOWED_REACTIONS;
use crate::responder::Responder;
use crate::settings::{GAP_SECONDS_RANGE, LiveSettings};

/// Reply sent to non-admins who try a mutating command.
pub const ADMIN_REQUIRED: &str = "❌ Admin permissions required for this command.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    SetQuota,
    SetGap,
    Stats,
    Help,
    Status,
}

impl Command {
    fn from_name(name: &str) -> Option<Self> {
        match name {
            "/setquota" => Some(Self::SetQuota),
            "/setgap" => Some(Self::SetGap),
            "/stats" => Some(Self::Stats),
            "/help" => Some(Self::Help),
            "/status" => Some(Self::Status),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::SetQuota => "/setquota",
            Self::SetGap => "/setgap",
            Self::Stats => "/stats",
            Self::Help => "/help",
            Self::Status => "/status",
        }
    }

    pub fn requires_admin(&self) -> bool {
        matches!(self, Self::SetQuota | Self::SetGap)
    }
}

/// A parsed command and its whitespace-separated arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation<'a> {
    pub command: Command,
    pub args: Vec<&'a str>,
}

/// Executes chat commands against the shared runtime state.
pub struct CommandHandler {
    admins: HashSet<i64>,
    bot_username: Option<String>,
    settings: LiveSettings,
    quota: Arc<QuotaTracker>,
    store: Arc<SlidingWindowStore>,
    responder: Arc<Responder>,
    react_heat_threshold: f64,
}

impl CommandHandler {
    pub fn new(
        admins: impl IntoIterator<Item = i64>,
        settings: LiveSettings,
        quota: Arc<QuotaTracker>,
        store: Arc<SlidingWindowStore>,
        responder: Arc<Responder>,
        react_heat_threshold: f64,
    ) -> Self {
        let admins: HashSet<i64> = admins.into_iter().collect();
        info!(admins = admins.len(), "command handler initialized");
        Self {
            admins,
            bot_username: None,
            settings,
            quota,
            store,
            responder,
            react_heat_threshold,
        }
    }

    /// Only accept `/cmd@name` suffixes that match this username.
    pub fn with_bot_username(mut self, username: impl Into<String>) -> Self {
        self.bot_username = Some(username.into().trim_start_matches('@').to_lowercase());
        self
    }

    pub fn is_admin(&self, user_id: i64) -> bool {
        self.admins.contains(&user_id)
    }

    /// Parse `text` as a command.  Returns `None` for ordinary messages,
    /// unknown commands and commands addressed to another bot.
    pub fn parse<'a>(&self, text: &'a str) -> Option<Invocation<'a>> {
        let mut parts = text.split_whitespace();
        let head = parts.next()?;
        if !head.starts_with('/') {
            return None;
        }

        let head = head.to_lowercase();
        let name = match head.split_once('@') {
            Some((name, target)) => {
                if let Some(own) = &self.bot_username {
                    if target != own {
                        return None;
                    }
                }
                name
            }
            None => head.as_str(),
        };

        Some(Invocation {
            command: Command::from_name(name)?,
            args: parts.collect(),
        })
    }

    /// Run a parsed command for `sender_id`.  `chat` is the caller's locked
    /// view of the chat the command was sent in.
    pub fn execute(
        &self,
        invocation: &Invocation<'_>,
        sender_id: i64,
        chat: &ChatWindow,
        now: DateTime<Utc>,
    ) -> String {
        let command = invocation.command;
        if command.requires_admin() && !self.is_admin(sender_id) {
            info!(command = command.name(), sender_id, "admin command rejected");
            return ADMIN_REQUIRED.to_owned();
        }

        let response = match command {
            Command::SetQuota => self.set_quota(&invocation.args),
            Command::SetGap => self.set_gap(&invocation.args),
            Command::Stats => self.stats(chat, now),
            Command::Help => self.help(sender_id),
            Command::Status => self.status(chat, now),
        };
        info!(
            command = command.name(),
            sender_id,
            chat_id = chat.chat_id(),
            "command executed"
        );
        response
    }

    fn set_quota(&self, args: &[&str]) -> String {
        let Some(raw) = args.first() else {
            let current = self.settings.snapshot().reply_target_ratio;
            return format!(
                "📊 Current quota: {}\nUsage: /setquota <ratio> (e.g., /setquota 0.15 for 15%)",
                percent(current)
            );
        };
        let Ok(ratio) = raw.parse::<f64>() else {
            return "❌ Invalid quota value. Use a decimal between 0.0 and 1.0".to_owned();
        };
        match self.settings.set_reply_target_ratio(ratio) {
            Ok(old) => format!("✅ Quota updated: {} → {}", percent(old), percent(ratio)),
            Err(_) => "❌ Quota must be between 0.0 and 1.0 (0% to 100%)".to_owned(),
        }
    }

    fn set_gap(&self, args: &[&str]) -> String {
        let Some(raw) = args.first() else {
            let current = self.settings.snapshot().gap_min_seconds;
            return format!(
                "⏱️ Current gap: {current}s\nUsage: /setgap <seconds> (e.g., /setgap 30)"
            );
        };
        let Ok(seconds) = raw.parse::<u64>() else {
            return format!(
                "❌ Invalid gap value. Use an integer between {} and {}",
                GAP_SECONDS_RANGE.start(),
                GAP_SECONDS_RANGE.end()
            );
        };
        match self.settings.set_gap_min_seconds(seconds) {
            Ok(old) => format!("✅ Gap updated: {old}s → {seconds}s"),
            Err(_) => format!(
                "❌ Gap must be between {} and {} seconds",
                GAP_SECONDS_RANGE.start(),
                GAP_SECONDS_RANGE.end()
            ),
        }
    }

    fn stats(&self, chat: &ChatWindow, now: DateTime<Utc>) -> String {
        let quota = self.quota.snapshot(now);
        let tunables = self.settings.snapshot();
        let store = self.store.stats();
        let usage = self.responder.stats().snapshot();

        let mut out = format!(
            "📊 **OlegBot Statistics**\n\n\
             🧠 **Decision Engine:**\n\
             • Messages processed: {}\n\
             • Replies sent: {}\n\
             • Reactions: {}\n\
             • Current quota usage: {}\n\
             • Target ratio: {}\n\
             • Minimum gap: {}s\n\
             • Heat threshold: {:.1}\n\n",
            quota.total_eligible,
            quota.total_replies,
            quota.total_reactions,
            percent(quota.ratio),
            percent(tunables.reply_target_ratio),
            tunables.gap_min_seconds,
            self.react_heat_threshold,
        );
        out.push_str(&format!(
            "💾 **Message Store:**\n\
             • Active chats: {}\n\
             • Window size: {} messages\n\n",
            store.active_chats, store.window_size,
        ));
        out.push_str(&format!(
            "🗣️ **Responder:**\n\
             • LLM requests: {}\n\
             • Fallback replies: {}\n\
             • Tokens used: {}\n\
             • Reaction types: {}\n",
            usage.requests,
            usage.fallbacks,
            usage.total_tokens,
            ALLOWED_REACTIONS.len(),
        ));

        if !chat.is_empty() {
            out.push_str(&format!(
                "\n💬 **This Chat:**\n\
                 • Messages in window: {}\n\
                 • Bot messages: {}\n",
                chat.len(),
                chat.bot_message_count(),
            ));
        }
        out
    }

    fn help(&self, sender_id: i64) -> String {
        let mut out = String::from("🤖 **OlegBot Commands**\n\n");
        out.push_str("📊 **General Commands:**\n");
        out.push_str("• `/stats` - Show bot statistics\n");
        out.push_str("• `/status` - Show bot status\n");
        out.push_str("• `/help` - Show this help message\n\n");

        if self.is_admin(sender_id) {
            out.push_str("⚙️ **Admin Commands:**\n");
            out.push_str("• `/setquota <ratio>` - Set reply quota (0.0-1.0)\n");
            out.push_str("• `/setgap <seconds>` - Set minimum gap between replies (5-300)\n\n");
        }

        out.push_str("💡 **Tips:**\n");
        out.push_str("• Mention the bot to get a guaranteed response\n");
        out.push_str("• Bot participates in hot topics automatically\n");
        out.push_str("• Reactions are used when rate-limited\n");
        out
    }

    fn status(&self, chat: &ChatWindow, now: DateTime<Utc>) -> String {
        let quota = self.quota.snapshot(now);
        let target = self.settings.snapshot().reply_target_ratio;
        let (emoji, label) = status_level(quota.ratio, target);

        let last_activity = match chat.last_bot_reply_at() {
            None => "No recent activity".to_owned(),
            Some(at) => {
                let secs = (now - at).num_seconds().max(0);
                if secs < 60 {
                    format!("{secs}s ago")
                } else if secs < 3600 {
                    format!("{}m ago", secs / 60)
                } else {
                    format!("{}h ago", secs / 3600)
                }
            }
        };

        format!(
            "{emoji} **Bot Status: {label}**\n\n\
             📈 Quota usage: {} / {}\n\
             ⏱️ Last activity: {last_activity}\n\
             💬 Messages processed: {}\n",
            percent(quota.ratio),
            percent(target),
            quota.total_eligible,
        )
    }
}

/// Traffic-light status from quota usage relative to the target.
fn status_level(ratio: f64, target: f64) -> (&'static str, &'static str) {
    let usage = if target > 0.0 {
        ratio / target
    } else if ratio > 0.0 {
        1.0
    } else {
        0.0
    };
    if usage < 0.5 {
        ("🟢", "Active")
    } else if usage < 0.8 {
        ("🟡", "Moderate")
    } else {
        ("🔴", "Rate Limited")
    }
}

fn percent(ratio: f64) -> String {
    format!("{:.1}%", ratio * 100.0)
}
