#![warn(clippy::unwrap_used, clippy::expect_used)]

//! Session feedback: reward computation and retrospective analysis.
//!
//! [`RewardPolicy`] turns what the player reports about a session into the
//! scalar reward the learner consumes. [`OutcomeStatistics`] and
//! [`PreferenceProfile`] look back over recorded experiences; they only read.

pub mod error;
pub mod profile;
pub mod reward;

use std::collections::BTreeMap;

use heimkino_core::{Action, Experience};
use serde::Serialize;

pub use error::{FeedbackError, Result};
pub use profile::{GenreAffinity, PreferenceProfile, StrategyPreference};
pub use reward::{RewardBreakdown, RewardPolicy, RewardWeights, SessionVerdict};

/// Statistics aggregated from recorded experiences.
///
/// A session counts as a success when its reward is positive.
#[derive(Debug, Default, Clone, Copy, PartialEq, Serialize)]
pub struct OutcomeStatistics {
    /// Total number of outcomes (successes + failures).
    pub total: usize,
    pub successes: usize,
    pub failures: usize,
    pub total_reward: f64,
}

impl OutcomeStatistics {
    pub fn record(&mut self, reward: f64) {
        self.total += 1;
        if reward > 0.0 {
            self.successes += 1;
        } else {
            self.failures += 1;
        }
        if reward.is_finite() {
            self.total_reward += reward;
        }
    }

    /// Calculate success rate (0.0 to 1.0).
    #[must_use]
    pub fn success_rate(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        #[allow(clippy::cast_precision_loss)]
        let rate = self.successes as f64 / self.total as f64;
        rate
    }

    #[must_use]
    pub fn failure_rate(&self) -> f64 {
        debug_assert!(
            self.successes + self.failures == self.total,
            "OutcomeStatistics totals are inconsistent"
        );
        if self.total == 0 {
            return 0.0;
        }
        1.0 - self.success_rate()
    }

    #[must_use]
    pub fn average_reward(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        #[allow(clippy::cast_precision_loss)]
        let avg = self.total_reward / self.total as f64;
        avg
    }
}

/// Aggregate experiences by the strategy that produced them.
#[must_use]
pub fn aggregate_by_action<'a>(
    experiences: impl IntoIterator<Item = &'a Experience>,
) -> BTreeMap<Action, OutcomeStatistics> {
    let mut stats: BTreeMap<Action, OutcomeStatistics> = BTreeMap::new();
    for exp in experiences {
        stats.entry(exp.action).or_default().record(exp.reward);
    }
    stats
}
