//! Live-tunable engagement settings.
//!
//! Admin commands change these at runtime; the decision engine reads a
//! consistent snapshot per message.

use std::ops::RangeInclusive;
use std::sync::{Arc, PoisonError, RwLock};

use serde::Serialize;

use crate::error::{AgentError, Result};

pub const DEFAULT_REPLY_TARGET_RATIO: f64 = 0.10;
pub const DEFAULT_GAP_MIN_SECONDS: u64 = 20;

/// Accepted range for the reply target ratio.
pub const REPLY_TARGET_RANGE: RangeInclusive<f64> = 0.0..=1.0;

/// Accepted range for the minimum gap between replies, in seconds.
pub const GAP_SECONDS_RANGE: RangeInclusive<u64> = 5..=300;

/// The values admins can tune while the bot runs.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Tunables {
    /// Fraction of eligible messages the bot aims to answer.
    pub reply_target_ratio: f64,
    /// Minimum seconds between two unprompted replies in one chat.
    pub gap_min_seconds: u64,
}

impl Default for Tunables {
    fn default() -> Self {
        Self {
            reply_target_ratio: DEFAULT_REPLY_TARGET_RATIO,
            gap_min_seconds: DEFAULT_GAP_MIN_SECONDS,
        }
    }
}

impl Tunables {
    pub fn validate(&self) -> Result<()> {
        validate_ratio(self.reply_target_ratio)?;
        validate_gap(self.gap_min_seconds)
    }

    /// The minimum gap as a duration.
    pub fn gap(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.gap_min_seconds as i64)
    }
}

fn validate_ratio(ratio: f64) -> Result<()> {
    if !REPLY_TARGET_RANGE.contains(&ratio) {
        return Err(AgentError::ValidationError {
            reason: format!("reply target ratio must be between 0.0 and 1.0, got {ratio}"),
        });
    }
    Ok(())
}

fn validate_gap(seconds: u64) -> Result<()> {
    if !GAP_SECONDS_RANGE.contains(&seconds) {
        return Err(AgentError::ValidationError {
            reason: format!("gap must be between 5 and 300 seconds, got {seconds}"),
        });
    }
    Ok(())
}

/// Shared handle to the current [`Tunables`].  Clones share state.
#[derive(Debug, Clone, Default)]
pub struct LiveSettings {
    inner: Arc<RwLock<Tunables>>,
}

impl LiveSettings {
    /// Create a handle seeded with validated values.
    pub fn new(initial: Tunables) -> Result<Self> {
        initial.validate()?;
        Ok(Self {
            inner: Arc::new(RwLock::new(initial)),
        })
    }

    /// Copy of the current values.
    pub fn snapshot(&self) -> Tunables {
        *self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Set the reply target ratio, returning the previous value.
    pub fn set_reply_target_ratio(&self, ratio: f64) -> Result<f64> {
        validate_ratio(ratio)?;
        let mut tunables = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        let old = tunables.reply_target_ratio;
        tunables.reply_target_ratio = ratio;
        tracing::info!(old, new = ratio, "reply target ratio updated");
        Ok(old)
    }

    /// Set the minimum gap between replies, returning the previous value.
    pub fn set_gap_min_seconds(&self, seconds: u64) -> Result<u64> {
        validate_gap(seconds)?;
        let mut tunables = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        let old = tunables.gap_min_seconds;
        tunables.gap_min_seconds = seconds;
        tracing::info!(old, new = seconds, "minimum reply gap updated");
        Ok(old)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let tunables = Tunables::default();
        assert!(tunables.validate().is_ok());
        assert_eq!(tunables.gap(), chrono::Duration::seconds(20));
    }

    #[test]
    fn setters_validate_and_return_previous_value() {
        let settings = LiveSettings::default();
        assert_eq!(settings.set_reply_target_ratio(0.25).unwrap(), 0.10);
        assert_eq!(settings.set_gap_min_seconds(60).unwrap(), 20);

        assert!(settings.set_reply_target_ratio(1.5).is_err());
        assert!(settings.set_reply_target_ratio(f64::NAN).is_err());
        assert!(settings.set_gap_min_seconds(4).is_err());
        assert!(settings.set_gap_min_seconds(301).is_err());

        let snap = settings.snapshot();
        assert_eq!(snap.reply_target_ratio, 0.25);
        assert_eq!(snap.gap_min_seconds, 60);
    }

    #[test]
    fn clones_share_state() {
        let a = LiveSettings::default();
        let b = a.clone();
        a.set_gap_min_seconds(30).unwrap();
        assert_eq!(b.snapshot().gap_min_seconds, 30);
    }

    #[test]
    fn new_rejects_invalid_seed() {
        let result = LiveSettings::new(Tunables {
            reply_target_ratio: 0.1,
            gap_min_seconds: 1,
        });
        assert!(result.is_err());
    }
}
