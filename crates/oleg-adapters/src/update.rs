//! Inbound Telegram `Update` payloads.
//!
//! Only the fields the bot reads are modelled; unknown fields are ignored
//! by serde.  [`TgMessage::to_message`] turns a platform message into the
//! store's [`Message`].

use chrono::{DateTime, Utc};
use oleg_store::Message;
use serde::Deserialize;

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Update {
    pub update_id: i64,
    pub message: Option<TgMessage>,
    pub edited_message: Option<TgMessage>,
}

impl Update {
    /// The message carried by this update, new or edited.  Other update
    /// kinds yield `None`.
    pub fn message(&self) -> Option<&TgMessage> {
        self.message.as_ref().or(self.edited_message.as_ref())
    }

    pub fn is_edit(&self) -> bool {
        self.message.is_none() && self.edited_message.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct User {
    pub id: i64,
    #[serde(default)]
    pub is_bot: bool,
    #[serde(default)]
    pub first_name: String,
    pub username: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Chat {
    pub id: i64,
    /// `private`, `group`, `supergroup` or `channel`.
    #[serde(rename = "type", default)]
    pub kind: String,
    pub title: Option<String>,
}

impl Chat {
    pub fn is_group(&self) -> bool {
        matches!(self.kind.as_str(), "group" | "supergroup")
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TgMessage {
    pub message_id: i64,
    pub from: Option<User>,
    pub chat: Chat,
    /// Unix time the message was sent.
    pub date: i64,
    /// Unix time of the latest edit, present on edited messages.
    #[serde(default)]
    pub edit_date: Option<i64>,
    pub text: Option<String>,
    /// Caption of photos, videos and documents.
    pub caption: Option<String>,
    pub reply_to_message: Option<Box<TgMessage>>,
}

impl TgMessage {
    /// Text or caption, whichever is present.
    pub fn content(&self) -> &str {
        self.text
            .as_deref()
            .or(self.caption.as_deref())
            .unwrap_or_default()
    }

    /// Convert into a stored message.
    ///
    /// `bot_id` marks replies to the bot.  Returns `None` for messages the
    /// bot sent itself, which are recorded when they are sent instead.
    /// Edits are stamped with their edit time, not the original send time.
    pub fn to_message(&self, bot_id: Option<i64>) -> Option<Message> {
        let sender_id = self.from.as_ref().map_or(self.chat.id, |u| u.id);
        if bot_id == Some(sender_id) {
            return None;
        }

        let unix = self.edit_date.unwrap_or(self.date);
        let timestamp = DateTime::<Utc>::from_timestamp(unix, 0).unwrap_or_else(Utc::now);
        let mut message = Message::new(
            self.message_id,
            self.chat.id,
            sender_id,
            self.content(),
            timestamp,
        );

        if let Some(parent) = &self.reply_to_message {
            let to_bot = match (bot_id, &parent.from) {
                (Some(bot), Some(author)) => author.id == bot,
                _ => false,
            };
            message = message.with_reply_to(parent.message_id, to_bot);
        }
        Some(message)
    }
}
