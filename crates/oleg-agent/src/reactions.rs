//! Emoji reaction selection.
//!
//! Telegram only accepts reactions from a fixed emoji set, so every emoji
//! returned here is drawn from [`ALLOWED_REACTIONS`].

use crate::tone::{EmojiLevel, Formality, ToneHints};

/// The subset of Telegram's allowed reaction emoji this bot uses.
pub const ALLOWED_REACTIONS: &[&str] = &["👍", "🔥", "👌", "🎉", "👀", "🤣", "❤", "😢", "🤔"];

/// Used when no table entry applies.
pub const DEFAULT_REACTION: &str = "👀";

const TONE_TABLE: &[((Formality, EmojiLevel), &str)] = &[
    ((Formality::Casual, EmojiLevel::Low), "👍"),
    ((Formality::Casual, EmojiLevel::High), "🔥"),
    ((Formality::Formal, EmojiLevel::Low), "👌"),
    ((Formality::Formal, EmojiLevel::High), "🎉"),
];

/// Coarse sentiment inferred from keywords.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sentiment {
    Funny,
    Positive,
    Negative,
    Thinking,
}

const FUNNY_WORDS: &[&str] = &[
    "lol", "haha", "hahaha", "funny", "joke", "laugh", "hilarious", "meme", "rofl", "lmao",
];
const POSITIVE_WORDS: &[&str] = &[
    "good",
    "great",
    "awesome",
    "amazing",
    "perfect",
    "love",
    "happy",
    "thanks",
    "thank",
    "excellent",
    "wonderful",
    "fantastic",
    "brilliant",
];
const NEGATIVE_WORDS: &[&str] = &[
    "bad",
    "terrible",
    "awful",
    "hate",
    "sad",
    "angry",
    "frustrated",
    "disappointed",
    "wrong",
    "problem",
    "fail",
];
const THINKING_WORDS: &[&str] = &[
    "think",
    "wonder",
    "hmm",
    "curious",
    "consider",
    "why",
    "how",
    "explain",
    "understand",
];

/// Pick a reaction from the tone table alone.
pub fn select_emoji(hints: &ToneHints) -> &'static str {
    TONE_TABLE
        .iter()
        .find(|(key, _)| *key == (hints.formality, hints.emoji_level))
        .map(|(_, emoji)| *emoji)
        .unwrap_or(DEFAULT_REACTION)
}

/// Detect sentiment from whole-word keyword matches.  Funny wins over
/// positive, which wins over negative, which wins over thinking.
pub fn detect_sentiment(text: &str) -> Option<Sentiment> {
    if text.contains('😂') || text.contains('🤣') {
        return Some(Sentiment::Funny);
    }

    let lower = text.to_lowercase();
    let words: Vec<&str> = lower
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .collect();
    let has_any = |vocab: &[&str]| words.iter().any(|w| vocab.iter().any(|v| v == w));

    if has_any(FUNNY_WORDS) {
        Some(Sentiment::Funny)
    } else if has_any(POSITIVE_WORDS) {
        Some(Sentiment::Positive)
    } else if has_any(NEGATIVE_WORDS) {
        Some(Sentiment::Negative)
    } else if has_any(THINKING_WORDS) {
        Some(Sentiment::Thinking)
    } else {
        None
    }
}

/// Pick a reaction for `text`, preferring its sentiment over the tone table.
///
/// Formal chats skip the laughing reaction.
pub fn choose_reaction(text: &str, hints: &ToneHints) -> &'static str {
    match detect_sentiment(text) {
        Some(Sentiment::Funny) if hints.formality == Formality::Casual => "🤣",
        Some(Sentiment::Positive) => "❤",
        Some(Sentiment::Negative) => "😢",
        Some(Sentiment::Thinking) => "🤔",
        _ => select_emoji(hints),
    }
}
