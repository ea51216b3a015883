//! Reply generation.
//!
//! Builds a tone-adapted prompt from the chat window, asks the completion
//! backend for a reply with a per-attempt deadline and bounded retries, and
//! post-processes the text.  Callers always get a string back: when every
//! attempt fails the responder answers with a localized canned reply.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use oleg_store::Message;
use serde::Serialize;
use tracing::{debug, warn};

use crate::error::{AgentError, Result};
use crate::language::language_name;
use crate::llm::{ChatRequest, CompletionBackend, Message as PromptMessage, Usage};
use crate::tone::{EmojiLevel, Formality, ToneHints};

/// Default cap on reply length, in words.
pub const DEFAULT_MAX_RESPONSE_WORDS: usize = 100;

/// Hard cap on reply length, in characters.
const MAX_RESPONSE_CHARS: usize = 500;

/// Rough blended price used for the cost estimate, USD per million tokens.
const COST_PER_MILLION_TOKENS: f64 = 10.0;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct ResponderConfig {
    /// Model override.  Empty uses the backend's default.
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
    /// Deadline for a single completion attempt.
    pub timeout: Duration,
    /// Total attempts, including the first.
    pub max_attempts: u32,
    /// Delay before the first retry; doubles for each further retry.
    pub base_backoff: Duration,
    pub max_response_words: usize,
    /// How many recent window messages are quoted in the prompt.
    pub context_messages: usize,
}

impl Default for ResponderConfig {
    fn default() -> Self {
        Self {
            model: String::new(),
            max_tokens: 150,
            temperature: 0.8,
            timeout: Duration::from_secs(15),
            max_attempts: 3,
            base_backoff: Duration::from_millis(100),
            max_response_words: DEFAULT_MAX_RESPONSE_WORDS,
            context_messages: 5,
        }
    }
}

// ---------------------------------------------------------------------------
// Usage statistics
// ---------------------------------------------------------------------------

/// Counters describing LLM usage since start-up.
#[derive(Debug, Default)]
pub struct ResponderStats {
    requests: AtomicU64,
    failures: AtomicU64,
    fallbacks: AtomicU64,
    prompt_tokens: AtomicU64,
    completion_tokens: AtomicU64,
    total_tokens: AtomicU64,
}

/// Serializable copy of [`ResponderStats`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct UsageSnapshot {
    pub requests: u64,
    pub failures: u64,
    pub fallbacks: u64,
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
    pub avg_tokens_per_request: f64,
    pub estimated_cost_usd: f64,
}

impl ResponderStats {
    fn record_request(&self) {
        self.requests.fetch_add(1, Ordering::Relaxed);
    }

    fn record_failure(&self) {
        self.failures.fetch_add(1, Ordering::Relaxed);
    }

    fn record_fallback(&self) {
        self.fallbacks.fetch_add(1, Ordering::Relaxed);
    }

    fn record_usage(&self, usage: &Usage) {
        self.prompt_tokens
            .fetch_add(u64::from(usage.prompt_tokens), Ordering::Relaxed);
        self.completion_tokens
            .fetch_add(u64::from(usage.completion_tokens), Ordering::Relaxed);
        self.total_tokens
            .fetch_add(u64::from(usage.total_tokens), Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> UsageSnapshot {
        let requests = self.requests.load(Ordering::Relaxed);
        let total_tokens = self.total_tokens.load(Ordering::Relaxed);
        UsageSnapshot {
            requests,
            failures: self.failures.load(Ordering::Relaxed),
            fallbacks: self.fallbacks.load(Ordering::Relaxed),
            prompt_tokens: self.prompt_tokens.load(Ordering::Relaxed),
            completion_tokens: self.completion_tokens.load(Ordering::Relaxed),
            total_tokens,
            avg_tokens_per_request: if requests == 0 {
                0.0
            } else {
                total_tokens as f64 / requests as f64
            },
            estimated_cost_usd: total_tokens as f64 / 1_000_000.0 * COST_PER_MILLION_TOKENS,
        }
    }

    /// Reset all counters to zero.
    pub fn reset(&self) {
        for counter in [
            &self.requests,
            &self.failures,
            &self.fallbacks,
            &self.prompt_tokens,
            &self.completion_tokens,
            &self.total_tokens,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}

impl fmt::Display for ResponderStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let snap = self.snapshot();
        write!(
            f,
            "requests={} failures={} fallbacks={} tokens={} cost=${:.4}",
            snap.requests, snap.failures, snap.fallbacks, snap.total_tokens, snap.estimated_cost_usd,
        )
    }
}

// ---------------------------------------------------------------------------
// Responder
// ---------------------------------------------------------------------------

/// Generates replies through a [`CompletionBackend`].
pub struct Responder {
    backend: Arc<dyn CompletionBackend>,
    config: ResponderConfig,
    stats: ResponderStats,
}

impl Responder {
    pub fn new(backend: Arc<dyn CompletionBackend>, config: ResponderConfig) -> Self {
        Self {
            backend,
            config,
            stats: ResponderStats::default(),
        }
    }

    pub fn config(&self) -> &ResponderConfig {
        &self.config
    }

    pub fn stats(&self) -> &ResponderStats {
        &self.stats
    }

    /// Model name requests are sent with.
    pub fn model(&self) -> &str {
        if self.config.model.is_empty() {
            self.backend.model()
        } else {
            &self.config.model
        }
    }

    /// Generate a reply to `message`.  Never fails: exhausting the retries
    /// yields a localized fallback.
    pub async fn generate_reply(
        &self,
        window: &[Message],
        hints: &ToneHints,
        message: &Message,
    ) -> String {
        let request = self.build_request(window, hints, message);
        match self.complete_with_retry(&request).await {
            Ok(text) => text,
            Err(e) => {
                warn!(
                    chat_id = message.chat_id,
                    message_id = message.id,
                    error = %e,
                    "reply generation failed, using fallback"
                );
                self.stats.record_fallback();
                fallback_reply(hints, message.id)
            }
        }
    }

    fn build_request(&self, window: &[Message], hints: &ToneHints, message: &Message) -> ChatRequest {
        let mut request = ChatRequest::new(vec![
            PromptMessage::system(build_system_prompt(hints)),
            PromptMessage::user(build_user_prompt(
                window,
                message,
                self.config.context_messages,
            )),
        ]);
        request.model = self.config.model.clone();
        request.max_tokens = Some(self.config.max_tokens);
        request.temperature = Some(self.config.temperature);
        request.presence_penalty = Some(0.1);
        request.frequency_penalty = Some(0.1);
        request
    }

    async fn complete_with_retry(&self, request: &ChatRequest) -> Result<String> {
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            self.stats.record_request();

            let outcome =
                match tokio::time::timeout(self.config.timeout, self.backend.complete(request))
                    .await
                {
                    Ok(Ok(completion)) => {
                        self.stats.record_usage(&completion.usage);
                        finalize_reply(&completion.text, self.config.max_response_words)
                            .ok_or(AgentError::EmptyCompletion)
                    }
                    Ok(Err(e)) => Err(e),
                    Err(_) => Err(AgentError::LlmTimeout {
                        seconds: self.config.timeout.as_secs(),
                    }),
                };

            match outcome {
                Ok(text) => {
                    debug!(attempt, chars = text.chars().count(), "reply generated");
                    return Ok(text);
                }
                Err(e) if e.is_transient() && attempt < self.config.max_attempts => {
                    self.stats.record_failure();
                    let delay = self.config.base_backoff * (1u32 << (attempt - 1));
                    warn!(
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "completion attempt failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => {
                    self.stats.record_failure();
                    return Err(e);
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Prompt construction
// ---------------------------------------------------------------------------

fn language_instruction(code: &str) -> String {
    let fixed = match code {
        "en" => "Respond in English",
        "es" => "Responde en español",
        "fr" => "Répondez en français",
        "de" => "Antworte auf Deutsch",
        "it" => "Rispondi in italiano",
        "pt" => "Responda em português",
        "ru" => "Отвечай на русском языке",
        "ja" => "日本語で答えてください",
        "zh" => "请用中文回答",
        "ko" => "한국어로 대답해주세요",
        "ar" => "أجب باللغة العربية",
        "hi" => "हिंदी में उत्तर दें",
        _ => {
            let name = language_name(code);
            let name = if name == "Unknown" { code } else { name };
            return format!("Respond in {name} if possible, otherwise English");
        }
    };
    fixed.to_owned()
}

/// System prompt carrying the persona plus language and tone guidance.
pub fn build_system_prompt(hints: &ToneHints) -> String {
    let formality = match hints.formality {
        Formality::Formal => "Use formal language and avoid excessive emojis",
        Formality::Casual => "Use casual, friendly language",
    };
    let emoji = match hints.emoji_level {
        EmojiLevel::High => "Feel free to use emojis to match the conversation style",
        EmojiLevel::Low => "Use emojis sparingly",
    };

    format!(
        "You are Oleg, a witty and engaging chatbot participating in a group chat.\n\
         \n\
         Key traits:\n\
         - Witty and sometimes sarcastic, but not mean-spirited\n\
         - Conversational and natural, like a friend in the group\n\
         - Brief responses (under 100 words, preferably 1-2 sentences)\n\
         - Contextually aware of the ongoing conversation\n\
         - Adapt to the group's communication style\n\
         \n\
         Language: {language}\n\
         Tone: {formality}\n\
         Emojis: {emoji}\n\
         \n\
         Remember: Be helpful when asked direct questions, but primarily focus on natural \
         conversation flow. Don't be overly formal or robotic.",
        language = language_instruction(hints.language),
    )
}

/// User prompt quoting the last `context_messages` window entries and the
/// message being answered.
pub fn build_user_prompt(window: &[Message], message: &Message, context_messages: usize) -> String {
    let skip = window.len().saturating_sub(context_messages);
    let lines: Vec<String> = window
        .iter()
        .skip(skip)
        .filter(|m| !m.text.is_empty())
        .map(|m| {
            if m.from_bot {
                format!("Bot: {}", m.text)
            } else {
                format!("User{}: {}", m.sender_id, m.text)
            }
        })
        .collect();

    let context = if window.is_empty() {
        "No recent conversation context.".to_owned()
    } else if lines.is_empty() {
        "No text messages in recent context.".to_owned()
    } else {
        lines.join("\n")
    };

    format!(
        "Recent conversation:\n{context}\n\n\
         Latest message to respond to: \"{}\"\n\n\
         Generate a natural, witty response that fits the conversation flow. \
         Keep it brief and engaging.",
        message.text
    )
}

// ---------------------------------------------------------------------------
// Post-processing
// ---------------------------------------------------------------------------

/// Trim, unwrap surrounding quotes and enforce the word and character caps.
/// Returns `None` when nothing usable is left.
pub fn finalize_reply(raw: &str, max_words: usize) -> Option<String> {
    let mut text = raw.trim();
    if text.chars().count() >= 2 && text.starts_with('"') && text.ends_with('"') {
        text = text[1..text.len() - 1].trim();
    }
    if text.is_empty() {
        return None;
    }

    let mut reply = if text.split_whitespace().count() > max_words {
        let mut truncated = text
            .split_whitespace()
            .take(max_words)
            .collect::<Vec<_>>()
            .join(" ");
        truncated.push_str("...");
        truncated
    } else {
        text.to_owned()
    };

    if reply.chars().count() > MAX_RESPONSE_CHARS {
        reply = reply.chars().take(MAX_RESPONSE_CHARS - 3).collect();
        reply.push_str("...");
    }

    Some(reply)
}

// ---------------------------------------------------------------------------
// Fallbacks
// ---------------------------------------------------------------------------

const FALLBACK_EN: &[&str] = &[
    "Interesting point! 🤔",
    "I see what you mean.",
    "That's worth thinking about.",
    "Fair enough!",
    "Good observation.",
];
const FALLBACK_ES: &[&str] = &[
    "¡Punto interesante! 🤔",
    "Entiendo lo que quieres decir.",
    "Eso vale la pena pensarlo.",
    "¡Justo!",
    "Buena observación.",
];
const FALLBACK_RU: &[&str] = &[
    "Интересная мысль! 🤔",
    "Понимаю, что ты имеешь в виду.",
    "Над этим стоит подумать.",
    "Справедливо!",
    "Хорошее наблюдение.",
];
const FALLBACK_FR: &[&str] = &[
    "Point intéressant ! 🤔",
    "Je vois ce que tu veux dire.",
    "Ça vaut la peine d'y réfléchir.",
    "C'est juste !",
    "Bonne observation.",
];

/// Canned reply in the chat's language.  `seed` picks the variant; formal
/// chats get it without the emoji.
pub fn fallback_reply(hints: &ToneHints, seed: i64) -> String {
    let pool = match hints.language {
        "es" => FALLBACK_ES,
        "ru" => FALLBACK_RU,
        "fr" => FALLBACK_FR,
        _ => FALLBACK_EN,
    };
    let index = seed.rem_euclid(pool.len() as i64) as usize;
    let reply = pool[index];
    match hints.formality {
        Formality::Formal => reply.replace(" 🤔", ""),
        Formality::Casual => reply.to_owned(),
    }
}
