//! Priority scoring for queue entries.
//!
//! A score is a weighted sum of three components, each in `[0, 1]`:
//! - wait: `min(waited / 1h, 1)`, grows with time in the queue
//! - activity: how active the user is, from a `SignalProvider`
//! - compatibility: how easy the user is to pair, from a `SignalProvider`
//!
//! Scores are pure functions of the entry, the signals and `now`, so equal
//! inputs always give equal scores and ordering ties are broken by age.

use std::cmp::Ordering;
use std::sync::Arc;

use time::OffsetDateTime;

use crate::queue::{QueueEntry, WAIT_SATURATION_SECS};

/// Source of the activity and compatibility components.
pub trait SignalProvider: Send + Sync + 'static {
    fn activity(&self, entry: &QueueEntry) -> f64;
    fn compatibility(&self, entry: &QueueEntry) -> f64;
}

/// Same value for every entry.
#[derive(Debug, Clone, Copy)]
pub struct FlatSignals {
    pub activity: f64,
    pub compatibility: f64,
}

impl Default for FlatSignals {
    fn default() -> Self {
        Self {
            activity: 0.5,
            compatibility: 0.5,
        }
    }
}

impl SignalProvider for FlatSignals {
    fn activity(&self, _entry: &QueueEntry) -> f64 {
        self.activity
    }

    fn compatibility(&self, _entry: &QueueEntry) -> f64 {
        self.compatibility
    }
}

/// Component weights. Must be non-negative and sum to 1.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PriorityWeights {
    pub wait: f64,
    pub activity: f64,
    pub compatibility: f64,
}

impl Default for PriorityWeights {
    fn default() -> Self {
        Self {
            wait: 0.4,
            activity: 0.3,
            compatibility: 0.3,
        }
    }
}

impl PriorityWeights {
    pub fn validate(&self) -> Result<(), String> {
        if self.wait < 0.0 || self.activity < 0.0 || self.compatibility < 0.0 {
            return Err("priority weights must be non-negative".to_string());
        }
        if (self.wait + self.activity + self.compatibility - 1.0).abs() > 1e-9 {
            return Err("priority weights must sum to 1.0".to_string());
        }
        Ok(())
    }
}

pub struct PriorityScorer {
    weights: PriorityWeights,
    signals: Arc<dyn SignalProvider>,
}

impl PriorityScorer {
    pub fn new(weights: PriorityWeights, signals: Arc<dyn SignalProvider>) -> Self {
        Self { weights, signals }
    }

    pub fn weights(&self) -> PriorityWeights {
        self.weights
    }

    pub fn wait_component(entry: &QueueEntry, now: OffsetDateTime) -> f64 {
        (entry.waited_secs(now) / WAIT_SATURATION_SECS).min(1.0)
    }

    pub fn score(&self, entry: &QueueEntry, now: OffsetDateTime) -> f64 {
        let wait = Self::wait_component(entry, now);
        let activity = unit(self.signals.activity(entry));
        let compatibility = unit(self.signals.compatibility(entry));

        let score = self.weights.wait * wait
            + self.weights.activity * activity
            + self.weights.compatibility * compatibility;
        score.clamp(0.0, 1.0)
    }
}

/// Clamps a signal into `[0, 1]`; NaN counts as 0.
fn unit(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

/// Pass order: highest priority first, then oldest, then entry id.
pub fn priority_order(a: &QueueEntry, b: &QueueEntry) -> Ordering {
    b.priority_score
        .total_cmp(&a.priority_score)
        .then_with(|| a.created_at.cmp(&b.created_at))
        .then_with(|| a.id.cmp(&b.id))
}
