//! Append-only experience log.
//!
//! `prune` is the only operation that removes data and it always drops the
//! oldest entries. `total_recorded` keeps counting across pruning; it drives
//! the exploration schedule.

use std::collections::VecDeque;

use heimkino_core::Experience;
use tracing::debug;

use crate::error::{QLearnError, Result};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExperienceStore {
    entries: VecDeque<Experience>,
    total_recorded: u64,
}

impl ExperienceStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuilds a store from persisted parts, oldest first.
    pub fn from_parts(entries: Vec<Experience>, total_recorded: u64) -> Result<Self> {
        for (i, exp) in entries.iter().enumerate() {
            if !exp.reward.is_finite() {
                return Err(QLearnError::NonFiniteReward(i));
            }
            if i > 0 && exp.timestamp < entries[i - 1].timestamp {
                return Err(QLearnError::NonMonotonicTimestamps(i));
            }
        }
        if (entries.len() as u64) > total_recorded {
            return Err(QLearnError::InconsistentTotal {
                total: total_recorded,
                kept: entries.len(),
            });
        }
        Ok(Self {
            entries: entries.into(),
            total_recorded,
        })
    }

    /// Appends an experience. A timestamp earlier than the newest stored one
    /// is lifted to it so the log stays non-decreasing.
    pub fn append(&mut self, mut experience: Experience) -> &Experience {
        if let Some(last) = self.entries.back() {
            if experience.timestamp < last.timestamp {
                debug!(
                    given = %experience.timestamp,
                    last = %last.timestamp,
                    "experience timestamp behind log, lifting"
                );
                experience.timestamp = last.timestamp;
            }
        }
        self.entries.push_back(experience);
        self.total_recorded += 1;
        &self.entries[self.entries.len() - 1]
    }

    /// The `n` most recent experiences, most recent first.
    #[must_use]
    pub fn recent(&self, n: usize) -> Vec<&Experience> {
        self.entries.iter().rev().take(n).collect()
    }

    /// Everything kept, oldest first.
    pub fn all(&self) -> impl DoubleEndedIterator<Item = &Experience> + ExactSizeIterator + '_ {
        self.entries.iter()
    }

    #[must_use]
    pub fn get(&self, index: usize) -> Option<&Experience> {
        self.entries.get(index)
    }

    /// Keeps the `retain_count` most recent entries. Returns how many were
    /// dropped.
    pub fn prune(&mut self, retain_count: usize) -> usize {
        let excess = self.entries.len().saturating_sub(retain_count);
        self.entries.drain(..excess);
        excess
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Experiences ever appended, including pruned ones.
    #[must_use]
    pub fn total_recorded(&self) -> u64 {
        self.total_recorded
    }

    /// Mean reward over the `n` most recent experiences.
    #[must_use]
    pub fn average_recent_reward(&self, n: usize) -> Option<f64> {
        let recent = self.recent(n);
        if recent.is_empty() {
            return None;
        }
        #[allow(clippy::cast_precision_loss)]
        let mean = recent.iter().map(|e| e.reward).sum::<f64>() / recent.len() as f64;
        Some(mean)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.total_recorded = 0;
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use heimkino_core::{Action, CompletionBucket, DayType, State, TimeOfDay};
    use time::{Duration, OffsetDateTime};

    #[allow(clippy::cast_precision_loss)]
    fn exp(i: i64) -> Experience {
        let s = State::new(TimeOfDay::Night, DayType::Weekday, &[], CompletionBucket::Medium).unwrap();
        Experience {
            state: s.clone(),
            action: Action::RecommendTrending,
            reward: i as f64,
            next_state: s,
            timestamp: OffsetDateTime::UNIX_EPOCH + Duration::seconds(i),
        }
    }

    #[test]
    fn recent_is_most_recent_first() {
        let mut store = ExperienceStore::new();
        for i in 0..5 {
            store.append(exp(i));
        }
        let rewards: Vec<f64> = store.recent(3).iter().map(|e| e.reward).collect();
        assert_eq!(rewards, vec![4.0, 3.0, 2.0]);
        assert_eq!(store.recent(50).len(), 5);
    }

    #[test]
    fn prune_keeps_newest_in_original_order() {
        let mut store = ExperienceStore::new();
        for i in 0..150 {
            store.append(exp(i));
        }
        assert_eq!(store.prune(100), 50);
        assert_eq!(store.len(), 100);
        let rewards: Vec<f64> = store.all().map(|e| e.reward).collect();
        let expected: Vec<f64> = (50..150).map(|i| i as f64).collect();
        assert_eq!(rewards, expected);
        assert_eq!(store.total_recorded(), 150);

        assert_eq!(store.prune(500), 0);
    }

    #[test]
    fn append_lifts_backdated_timestamps() {
        let mut store = ExperienceStore::new();
        store.append(exp(10));
        let stored = store.append(exp(3)).timestamp;
        assert_eq!(stored, exp(10).timestamp);
    }

    #[test]
    fn average_recent_reward_window() {
        let mut store = ExperienceStore::new();
        assert_eq!(store.average_recent_reward(5), None);
        for i in 0..4 {
            store.append(exp(i));
        }
        // 3 + 2 = 5 over 2
        assert_eq!(store.average_recent_reward(2), Some(2.5));
    }

    #[test]
    fn from_parts_validates() {
        let ok = ExperienceStore::from_parts(vec![exp(1), exp(2)], 10).unwrap();
        assert_eq!(ok.total_recorded(), 10);

        assert_eq!(
            ExperienceStore::from_parts(vec![exp(2), exp(1)], 2),
            Err(QLearnError::NonMonotonicTimestamps(1))
        );
        assert!(matches!(
            ExperienceStore::from_parts(vec![exp(1), exp(2)], 1),
            Err(QLearnError::InconsistentTotal { .. })
        ));
        let mut bad = exp(1);
        bad.reward = f64::NAN;
        assert_eq!(
            ExperienceStore::from_parts(vec![bad], 1),
            Err(QLearnError::NonFiniteReward(0))
        );
    }
}
