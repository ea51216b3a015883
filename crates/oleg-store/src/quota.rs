//! Rolling reply quota.
//!
//! The tracker records one event per message the decision engine looked
//! at and remembers whether the bot answered it.  The observed reply ratio
//! is computed over the events inside a rolling time window, so the ratio
//! recovers on its own once the bot has been quiet for a while.

use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::error::{StoreError, StoreResult};

/// Default length of the rolling window, in seconds.
pub const DEFAULT_QUOTA_WINDOW_SECS: i64 = 3600;

/// Default cap on events retained inside the window.
pub const DEFAULT_QUOTA_MAX_EVENTS: usize = 10_000;

/// What the bot did with an eligible message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuotaOutcome {
    Replied,
    Reacted,
    Ignored,
}

/// Sizing for a [`QuotaTracker`].
#[derive(Debug, Clone, Copy)]
pub struct QuotaConfig {
    /// Events older than this no longer count toward the ratio.
    pub window: Duration,
    /// Oldest events are dropped once this many are retained.
    pub max_events: usize,
}

impl Default for QuotaConfig {
    fn default() -> Self {
        Self {
            window: Duration::seconds(DEFAULT_QUOTA_WINDOW_SECS),
            max_events: DEFAULT_QUOTA_MAX_EVENTS,
        }
    }
}

// ── lifetime counters ────────────────────────────────────────────────

/// Monotonic counters since process start (or the last reset).
#[derive(Debug, Default)]
struct QuotaCounters {
    eligible: AtomicU64,
    replies: AtomicU64,
    reactions: AtomicU64,
}

impl QuotaCounters {
    fn record(&self, outcome: QuotaOutcome) {
        self.eligible.fetch_add(1, Ordering::Relaxed);
        match outcome {
            QuotaOutcome::Replied => {
                self.replies.fetch_add(1, Ordering::Relaxed);
            }
            QuotaOutcome::Reacted => {
                self.reactions.fetch_add(1, Ordering::Relaxed);
            }
            QuotaOutcome::Ignored => {}
        }
    }

    fn reset(&self) {
        self.eligible.store(0, Ordering::Relaxed);
        self.replies.store(0, Ordering::Relaxed);
        self.reactions.store(0, Ordering::Relaxed);
    }
}

// ── snapshot ─────────────────────────────────────────────────────────

/// Read-only view of the quota at a point in time.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct QuotaSnapshot {
    /// Eligible messages inside the rolling window.
    pub window_eligible: usize,
    /// Bot replies inside the rolling window.
    pub window_replies: usize,
    /// `window_replies / window_eligible`, or 0 when the window is empty.
    pub ratio: f64,
    pub total_eligible: u64,
    pub total_replies: u64,
    pub total_reactions: u64,
}

impl fmt::Display for QuotaSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "window={}/{} ratio={:.2}% eligible={} replies={} reactions={}",
            self.window_replies,
            self.window_eligible,
            self.ratio * 100.0,
            self.total_eligible,
            self.total_replies,
            self.total_reactions,
        )
    }
}

// ── tracker ──────────────────────────────────────────────────────────

#[derive(Debug, Default)]
struct QuotaWindow {
    /// `(when, replied)` pairs, oldest first.
    events: VecDeque<(DateTime<Utc>, bool)>,
    replies: usize,
}

impl QuotaWindow {
    fn pop_front(&mut self) {
        if let Some((_, true)) = self.events.pop_front() {
            self.replies -= 1;
        }
    }

    fn prune(&mut self, now: DateTime<Utc>, config: &QuotaConfig) {
        let cutoff = now - config.window;
        while self.events.front().is_some_and(|(at, _)| *at <= cutoff) {
            self.pop_front();
        }
        while self.events.len() > config.max_events {
            self.pop_front();
        }
    }

    fn ratio(&self) -> f64 {
        if self.events.is_empty() {
            return 0.0;
        }
        self.replies as f64 / self.events.len() as f64
    }
}

/// Process-wide rolling record of eligible messages and bot replies.
#[derive(Debug)]
pub struct QuotaTracker {
    config: QuotaConfig,
    window: Mutex<QuotaWindow>,
    counters: QuotaCounters,
}

impl QuotaTracker {
    /// Create an empty tracker.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidConfig`] for a non-positive window or a
    /// zero event cap.
    pub fn new(config: QuotaConfig) -> StoreResult<Self> {
        if config.window <= Duration::zero() {
            return Err(StoreError::invalid("quota window", "must be positive"));
        }
        if config.max_events == 0 {
            return Err(StoreError::invalid("quota max_events", "must be at least 1"));
        }
        Ok(Self {
            config,
            window: Mutex::new(QuotaWindow::default()),
            counters: QuotaCounters::default(),
        })
    }

    fn lock(&self) -> MutexGuard<'_, QuotaWindow> {
        self.window.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record the outcome of one eligible message.
    ///
    /// Events stay in time order: an outcome stamped before the newest
    /// recorded event is filed at that event's time.
    pub fn record(&self, outcome: QuotaOutcome, now: DateTime<Utc>) {
        self.counters.record(outcome);
        let replied = outcome == QuotaOutcome::Replied;
        let mut window = self.lock();
        let at = window.events.back().map_or(now, |(last, _)| (*last).max(now));
        window.events.push_back((at, replied));
        if replied {
            window.replies += 1;
        }
        window.prune(at, &self.config);
    }

    /// Observed reply ratio over the rolling window ending at `now`.
    pub fn ratio(&self, now: DateTime<Utc>) -> f64 {
        let mut window = self.lock();
        window.prune(now, &self.config);
        window.ratio()
    }

    pub fn snapshot(&self, now: DateTime<Utc>) -> QuotaSnapshot {
        let mut window = self.lock();
        window.prune(now, &self.config);
        QuotaSnapshot {
            window_eligible: window.events.len(),
            window_replies: window.replies,
            ratio: window.ratio(),
            total_eligible: self.counters.eligible.load(Ordering::Relaxed),
            total_replies: self.counters.replies.load(Ordering::Relaxed),
            total_reactions: self.counters.reactions.load(Ordering::Relaxed),
        }
    }

    /// Forget every recorded event and zero the counters.
    pub fn reset(&self) {
        *self.lock() = QuotaWindow::default();
        self.counters.reset();
    }
}

impl Default for QuotaTracker {
    fn default() -> Self {
        Self {
            config: QuotaConfig::default(),
            window: Mutex::new(QuotaWindow::default()),
            counters: QuotaCounters::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    #[test]
    fn empty_tracker_has_zero_ratio() {
        let tracker = QuotaTracker::default();
        assert_eq!(tracker.ratio(at(0)), 0.0);
    }

    #[test]
    fn ratio_counts_replies_over_eligible() {
        let tracker = QuotaTracker::default();
        tracker.record(QuotaOutcome::Replied, at(0));
        tracker.record(QuotaOutcome::Ignored, at(1));
        tracker.record(QuotaOutcome::Reacted, at(2));
        tracker.record(QuotaOutcome::Ignored, at(3));
        assert!((tracker.ratio(at(4)) - 0.25).abs() < 1e-9);

        let snap = tracker.snapshot(at(4));
        assert_eq!(snap.window_eligible, 4);
        assert_eq!(snap.window_replies, 1);
        assert_eq!(snap.total_reactions, 1);
    }

    #[test]
    fn late_outcome_expires_with_the_newest_event() {
        let tracker = QuotaTracker::new(QuotaConfig {
            window: Duration::seconds(100),
            max_events: 1000,
        })
        .unwrap();
        tracker.record(QuotaOutcome::Ignored, at(1_000));
        tracker.record(QuotaOutcome::Replied, at(10));
        assert!((tracker.ratio(at(1_050)) - 0.5).abs() < 1e-9);

        tracker.record(QuotaOutcome::Ignored, at(1_200));
        assert_eq!(tracker.ratio(at(1_200)), 0.0);
        assert_eq!(tracker.snapshot(at(1_200)).window_eligible, 1);
    }

    #[test]
    fn old_events_leave_the_window() {
        let tracker = QuotaTracker::new(QuotaConfig {
            window: Duration::seconds(60),
            max_events: 100,
        })
        .unwrap();
        tracker.record(QuotaOutcome::Replied, at(0));
        tracker.record(QuotaOutcome::Ignored, at(30));
        assert!((tracker.ratio(at(59)) - 0.5).abs() < 1e-9);
        assert_eq!(tracker.ratio(at(61)), 0.0);

        let snap = tracker.snapshot(at(61));
        assert_eq!(snap.window_eligible, 1);
        assert_eq!(snap.total_replies, 1);
        assert_eq!(snap.total_eligible, 2);
    }

    #[test]
    fn event_cap_drops_oldest() {
        let tracker = QuotaTracker::new(QuotaConfig {
            window: Duration::seconds(3600),
            max_events: 2,
        })
        .unwrap();
        tracker.record(QuotaOutcome::Replied, at(0));
        tracker.record(QuotaOutcome::Ignored, at(1));
        tracker.record(QuotaOutcome::Ignored, at(2));
        assert_eq!(tracker.ratio(at(3)), 0.0);
    }

    #[test]
    fn reset_clears_everything() {
        let tracker = QuotaTracker::default();
        tracker.record(QuotaOutcome::Replied, at(0));
        tracker.reset();
        let snap = tracker.snapshot(at(1));
        assert_eq!(snap.window_eligible, 0);
        assert_eq!(snap.total_eligible, 0);
    }

    #[test]
    fn invalid_config_is_rejected() {
        assert!(
            QuotaTracker::new(QuotaConfig {
                window: Duration::zero(),
                max_events: 10,
            })
            .is_err()
        );
        assert!(
            QuotaTracker::new(QuotaConfig {
                window: Duration::seconds(10),
                max_events: 0,
            })
            .is_err()
        );
    }
}
