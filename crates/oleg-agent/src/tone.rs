//! Coarse tone signals derived from a chat window.
//!
//! Two signals feed prompt construction and reaction choice: how emoji-heavy
//! the conversation is, and whether messages are long enough to read as
//! formal.  Only human messages with non-blank text are considered.

use std::fmt;

use oleg_store::Message;
use serde::Serialize;

use crate::language::{DEFAULT_LANGUAGE, detect_language};

/// Emoji-to-character ratio above which a conversation counts as emoji-heavy.
pub const HIGH_EMOJI_RATIO: f64 = 0.02;

/// Average words per message above which a conversation counts as formal.
pub const FORMAL_AVG_WORDS: f64 = 18.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Formality {
    Casual,
    Formal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EmojiLevel {
    Low,
    High,
}

impl fmt::Display for Formality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Casual => "casual",
            Self::Formal => "formal",
        })
    }
}

impl fmt::Display for EmojiLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Low => "low",
            Self::High => "high",
        })
    }
}

/// Tone of a conversation, recomputed from the window on demand.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ToneHints {
    /// ISO 639-1 code of the dominant language.
    pub language: &'static str,
    pub formality: Formality,
    pub emoji_level: EmojiLevel,
    pub emoji_ratio: f64,
    pub avg_words: f64,
}

impl Default for ToneHints {
    fn default() -> Self {
        Self {
            language: DEFAULT_LANGUAGE,
            formality: Formality::Casual,
            emoji_level: EmojiLevel::Low,
            emoji_ratio: 0.0,
            avg_words: 0.0,
        }
    }
}

impl fmt::Display for ToneHints {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}, {} emoji ({:.1}%), lang={}",
            self.formality,
            self.emoji_level,
            self.emoji_ratio * 100.0,
            self.language,
        )
    }
}

/// Whether `c` falls in one of the common emoji blocks.
pub fn is_emoji(c: char) -> bool {
    matches!(
        c as u32,
        0x1F600..=0x1F64F // emoticons
            | 0x1F300..=0x1F5FF // symbols and pictographs
            | 0x1F680..=0x1F6FF // transport and map
            | 0x1F1E0..=0x1F1FF // regional indicators
            | 0x1F900..=0x1F9FF // supplemental symbols
            | 0x2600..=0x26FF // miscellaneous symbols
            | 0x2702..=0x27B0 // dingbats
    )
}

/// Derive tone hints from a window.  An empty window yields the defaults.
pub fn analyze_tone(window: &[Message]) -> ToneHints {
    let texts: Vec<&str> = window
        .iter()
        .filter(|m| !m.from_bot && !m.text.trim().is_empty())
        .map(|m| m.text.as_str())
        .collect();

    if texts.is_empty() {
        return ToneHints::default();
    }

    let mut total_chars = 0usize;
    let mut emoji_chars = 0usize;
    let mut total_words = 0usize;
    for text in &texts {
        for c in text.chars() {
            total_chars += 1;
            if is_emoji(c) {
                emoji_chars += 1;
            }
        }
        total_words += text.split_whitespace().count();
    }

    let emoji_ratio = if total_chars == 0 {
        0.0
    } else {
        emoji_chars as f64 / total_chars as f64
    };
    let avg_words = total_words as f64 / texts.len() as f64;

    ToneHints {
        language: detect_language(window),
        formality: if avg_words > FORMAL_AVG_WORDS {
            Formality::Formal
        } else {
            Formality::Casual
        },
        emoji_level: if emoji_ratio > HIGH_EMOJI_RATIO {
            EmojiLevel::High
        } else {
            EmojiLevel::Low
        },
        emoji_ratio,
        avg_words,
    }
}
