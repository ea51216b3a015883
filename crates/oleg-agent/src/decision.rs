//! Per-message engagement decision: reply, react, or stay silent.
//!
//! Rules, first match wins:
//!
//! 1. A mention or a reply to the bot always gets a reply.
//! 2. Inside the minimum gap since the bot's last reply, stay silent.
//! 3. Below the reply quota, admit a reply with probability
//!    `0.1 + 0.9 * heat`.
//! 4. Not replying and the topic is warm: react.
//! 5. Otherwise stay silent.
//!
//! The engine is a pure function of its inputs.  Time and randomness are
//! injected; recording the outcome is left to the caller, which holds the
//! chat lock.

use std::fmt;

use chrono::{DateTime, Duration, Utc};
use oleg_store::Message;
use rand::Rng;
use rand::rngs::StdRng;
use serde::Serialize;

use crate::settings::Tunables;

/// Heat at or above which a non-reply turns into a reaction.
pub const REACT_HEAT_THRESHOLD: f64 = 0.3;

/// Floor of the reply admission probability.
const BASE_REPLY_PROBABILITY: f64 = 0.1;

/// How many recent human messages the heat score looks at.
const HEAT_SAMPLE: usize = 20;

/// How far back a message counts as active, in minutes.
const HEAT_ACTIVE_MINUTES: i64 = 5;

// ---------------------------------------------------------------------------
// Random source
// ---------------------------------------------------------------------------

/// Uniform random numbers in `[0, 1)` for reply admission.
pub trait RandomSource: Send {
    fn next_f64(&mut self) -> f64;
}

impl RandomSource for StdRng {
    fn next_f64(&mut self) -> f64 {
        self.random::<f64>()
    }
}

// ---------------------------------------------------------------------------
// Decision types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Reply,
    React,
    Ignore,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Reply => "reply",
            Self::React => "react",
            Self::Ignore => "ignore",
        })
    }
}

/// Which rule produced a decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionReason {
    /// Mentioned or replied to.
    DirectAddress,
    /// Too soon after the previous reply.
    GapFloor,
    /// Reply quota reached; the message was not admitted.
    QuotaSaturated,
    /// Admitted by the probabilistic draw.
    Admitted,
    /// Draw failed, but the topic is warm enough for a reaction.
    HeatReaction,
    /// Draw failed and the topic is cold.
    Cold,
}

impl fmt::Display for DecisionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::DirectAddress => "direct_address",
            Self::GapFloor => "gap_floor",
            Self::QuotaSaturated => "quota_saturated",
            Self::Admitted => "admitted",
            Self::HeatReaction => "heat_reaction",
            Self::Cold => "cold",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Decision {
    pub action: Action,
    pub reason: DecisionReason,
    /// Topic heat in `[0, 1]` at decision time.
    pub heat: f64,
}

/// Everything the engine looks at for one message.
#[derive(Debug, Clone, Copy)]
pub struct DecisionInput<'a> {
    pub message: &'a Message,
    /// The chat window, oldest first.  May include `message` itself.
    pub window: &'a [Message],
    pub last_bot_reply_at: Option<DateTime<Utc>>,
    /// Observed reply ratio from the quota tracker.
    pub quota_ratio: f64,
    pub tunables: Tunables,
    pub now: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// Stateless rule evaluator.
#[derive(Debug, Clone, Copy)]
pub struct DecisionEngine {
    react_heat_threshold: f64,
}

impl Default for DecisionEngine {
    fn default() -> Self {
        Self {
            react_heat_threshold: REACT_HEAT_THRESHOLD,
        }
    }
}

impl DecisionEngine {
    pub fn new(react_heat_threshold: f64) -> Self {
        Self {
            react_heat_threshold,
        }
    }

    pub fn react_heat_threshold(&self) -> f64 {
        self.react_heat_threshold
    }

    /// Decide what to do with `input.message`.
    pub fn decide(&self, input: &DecisionInput<'_>, rng: &mut dyn RandomSource) -> Decision {
        let heat = topic_heat(input.window, input.now);

        if input.message.is_addressed() {
            return Decision {
                action: Action::Reply,
                reason: DecisionReason::DirectAddress,
                heat,
            };
        }

        if let Some(last) = input.last_bot_reply_at {
            if input.now - last < input.tunables.gap() {
                return Decision {
                    action: Action::Ignore,
                    reason: DecisionReason::GapFloor,
                    heat,
                };
            }
        }

        let below_quota = input.quota_ratio < input.tunables.reply_target_ratio;
        if below_quota {
            let probability = BASE_REPLY_PROBABILITY + (1.0 - BASE_REPLY_PROBABILITY) * heat;
            if rng.next_f64() < probability {
                return Decision {
                    action: Action::Reply,
                    reason: DecisionReason::Admitted,
                    heat,
                };
            }
        }

        if heat >= self.react_heat_threshold {
            return Decision {
                action: Action::React,
                reason: DecisionReason::HeatReaction,
                heat,
            };
        }

        Decision {
            action: Action::Ignore,
            reason: if below_quota {
                DecisionReason::Cold
            } else {
                DecisionReason::QuotaSaturated
            },
            heat,
        }
    }
}

// ---------------------------------------------------------------------------
// Topic heat
// ---------------------------------------------------------------------------

/// How lively the conversation is, in `[0, 1]`.
///
/// Looks at the last 20 human messages and keeps those from the last five
/// minutes.  Combines message rate (per minute), distinct senders
/// (saturating at three) and reply density (capped at 0.5).  Fewer than two
/// sampled messages means no heat.
pub fn topic_heat(window: &[Message], now: DateTime<Utc>) -> f64 {
    let sample: Vec<&Message> = window
        .iter()
        .rev()
        .filter(|m| !m.from_bot)
        .take(HEAT_SAMPLE)
        .collect();

    if sample.len() < 2 {
        return 0.0;
    }

    let active_window = Duration::minutes(HEAT_ACTIVE_MINUTES);
    let active: Vec<&&Message> = sample
        .iter()
        .filter(|m| now - m.timestamp <= active_window)
        .collect();

    if active.is_empty() {
        return 0.0;
    }

    let count = active.len() as f64;
    let rate = count / HEAT_ACTIVE_MINUTES as f64;

    let mut senders: Vec<i64> = active.iter().map(|m| m.sender_id).collect();
    senders.sort_unstable();
    senders.dedup();
    let diversity = (senders.len() as f64 / 3.0).min(1.0);

    let replies = active
        .iter()
        .filter(|m| m.reply_to_message_id.is_some())
        .count() as f64;
    let reply_density = (replies / count).min(0.5);

    ((rate * 0.4 + diversity * 0.4 + reply_density * 0.2) / 2.0).clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rand::SeedableRng;

    /// Always returns the same draw.
    struct FixedRandom(f64);

    impl RandomSource for FixedRandom {
        fn next_f64(&mut self) -> f64 {
            self.0
        }
    }

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    fn human(id: i64, sender: i64, secs: i64) -> Message {
        Message::new(id, 1, sender, "hello there", at(secs))
    }

    fn input<'a>(message: &'a Message, window: &'a [Message]) -> DecisionInput<'a> {
        DecisionInput {
            message,
            window,
            last_bot_reply_at: None,
            quota_ratio: 0.0,
            tunables: Tunables::default(),
            now: message.timestamp,
        }
    }

    // -- topic heat ----------------------------------------------------------

    #[test]
    fn heat_is_zero_for_tiny_windows() {
        assert_eq!(topic_heat(&[], at(0)), 0.0);
        assert_eq!(topic_heat(&[human(1, 1, 0)], at(0)), 0.0);
    }

    #[test]
    fn heat_is_zero_for_stale_windows() {
        let window = vec![human(1, 1, 0), human(2, 2, 10)];
        assert_eq!(topic_heat(&window, at(3600)), 0.0);
    }

    #[test]
    fn heat_grows_with_activity_and_diversity() {
        let quiet = vec![human(1, 1, 0), human(2, 1, 100)];
        let busy: Vec<Message> = (0..12).map(|i| human(i, i % 4, i * 10)).collect();

        let quiet_heat = topic_heat(&quiet, at(120));
        let busy_heat = topic_heat(&busy, at(120));
        // 2 msgs / 5 min, one sender: (0.4*0.4 + 1/3*0.4) / 2
        assert!((quiet_heat - (0.16 + 0.4 / 3.0) / 2.0).abs() < 1e-9);
        assert!(busy_heat > quiet_heat);
        assert!(busy_heat <= 1.0);
    }

    #[test]
    fn heat_ignores_bot_messages() {
        let window = vec![
            human(1, 1, 0),
            Message::bot_reply(2, 1, 99, "bot", at(1)),
            Message::bot_reply(3, 1, 99, "bot", at(2)),
        ];
        assert_eq!(topic_heat(&window, at(3)), 0.0);
    }

    #[test]
    fn heat_saturates_at_one() {
        let window: Vec<Message> = (0..20)
            .map(|i| human(i, i % 5, i).with_reply_to(i - 1, false))
            .collect();
        assert_eq!(topic_heat(&window, at(30)), 1.0);
    }

    // -- rules ---------------------------------------------------------------

    #[test]
    fn mention_always_replies() {
        let message = human(1, 1, 0).with_mention(true);
        let mut inp = input(&message, &[]);
        inp.last_bot_reply_at = Some(at(-1));
        inp.quota_ratio = 1.0;

        let decision = DecisionEngine::default().decide(&inp, &mut FixedRandom(0.99));
        assert_eq!(decision.action, Action::Reply);
        assert_eq!(decision.reason, DecisionReason::DirectAddress);
    }

    #[test]
    fn reply_to_bot_always_replies() {
        let message = human(2, 1, 0).with_reply_to(1, true);
        let mut inp = input(&message, &[]);
        inp.last_bot_reply_at = Some(at(0));
        let decision = DecisionEngine::default().decide(&inp, &mut FixedRandom(0.99));
        assert_eq!(decision.action, Action::Reply);
    }

    #[test]
    fn gap_floor_blocks_unprompted_replies() {
        let message = human(1, 1, 100);
        let mut inp = input(&message, &[]);
        inp.last_bot_reply_at = Some(at(90));

        let decision = DecisionEngine::default().decide(&inp, &mut FixedRandom(0.0));
        assert_eq!(decision.action, Action::Ignore);
        assert_eq!(decision.reason, DecisionReason::GapFloor);
    }

    #[test]
    fn gap_elapsed_allows_reply() {
        let message = human(1, 1, 100);
        let mut inp = input(&message, &[]);
        inp.last_bot_reply_at = Some(at(80));

        let decision = DecisionEngine::default().decide(&inp, &mut FixedRandom(0.0));
        assert_eq!(decision.action, Action::Reply);
        assert_eq!(decision.reason, DecisionReason::Admitted);
    }

    #[test]
    fn saturated_quota_never_replies() {
        let message = human(1, 1, 0);
        let mut inp = input(&message, &[]);
        inp.quota_ratio = 0.10;

        let decision = DecisionEngine::default().decide(&inp, &mut FixedRandom(0.0));
        assert_eq!(decision.action, Action::Ignore);
        assert_eq!(decision.reason, DecisionReason::QuotaSaturated);
    }

    #[test]
    fn warm_topic_reacts_when_not_replying() {
        let window: Vec<Message> = (0..10).map(|i| human(i, i % 3, i * 5)).collect();
        let message = window[9].clone();
        let mut inp = input(&message, &window);
        inp.quota_ratio = 0.5;

        let decision = DecisionEngine::default().decide(&inp, &mut FixedRandom(0.0));
        assert!(decision.heat >= REACT_HEAT_THRESHOLD);
        assert_eq!(decision.action, Action::React);
        assert_eq!(decision.reason, DecisionReason::HeatReaction);
    }

    #[test]
    fn cold_topic_with_failed_draw_is_ignored() {
        let message = human(1, 1, 0);
        let inp = input(&message, &[]);
        let decision = DecisionEngine::default().decide(&inp, &mut FixedRandom(0.5));
        assert_eq!(decision.action, Action::Ignore);
        assert_eq!(decision.reason, DecisionReason::Cold);
        assert_eq!(decision.heat, 0.0);
    }

    #[test]
    fn admission_probability_scales_with_heat() {
        // Cold chat: only draws under 0.1 are admitted.
        let message = human(1, 1, 0);
        let inp = input(&message, &[]);
        let engine = DecisionEngine::default();
        assert_eq!(
            engine.decide(&inp, &mut FixedRandom(0.09)).action,
            Action::Reply
        );
        assert_eq!(
            engine.decide(&inp, &mut FixedRandom(0.11)).action,
            Action::Ignore
        );
    }

    #[test]
    fn seeded_rng_is_deterministic() {
        let message = human(1, 1, 0);
        let inp = input(&message, &[]);
        let engine = DecisionEngine::default();
        let run = |seed| {
            let mut rng = StdRng::seed_from_u64(seed);
            (0..50)
                .map(|_| engine.decide(&inp, &mut rng).action)
                .collect::<Vec<_>>()
        };
        assert_eq!(run(7), run(7));
    }
}
