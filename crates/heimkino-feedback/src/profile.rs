//! Read-only view of what the engine has learned about its viewer.

use std::collections::{BTreeMap, HashMap, HashSet};

use heimkino_core::{Action, Experience, GenreId, State, TimeOfDay};
use serde::Serialize;
use time::{format_description::well_known::Rfc3339, OffsetDateTime};

use crate::{aggregate_by_action, OutcomeStatistics};

/// Fallback timestamp when formatting fails
const FALLBACK_TIMESTAMP: &str = "1970-01-01T00:00:00Z";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GenreAffinity {
    pub genre: GenreId,
    pub score: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct StrategyPreference {
    pub action: Action,
    /// Mean learned value of `action` across the states seen at this time.
    pub mean_value: f64,
    pub states: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PreferenceProfile {
    pub generated_at: String,
    pub experiences_considered: usize,
    /// Strongest first.
    pub genre_affinity: Vec<GenreAffinity>,
    pub preferred_strategy: BTreeMap<TimeOfDay, StrategyPreference>,
    pub by_action: BTreeMap<Action, OutcomeStatistics>,
}

impl PreferenceProfile {
    /// Builds the profile from recorded experiences and learned
    /// `(state, action, value)` entries.
    ///
    /// Genre affinity accumulates the reward of every positively rewarded
    /// session onto the genres of its follow-up state, discounted by their
    /// position in the recency list.
    pub fn build<'a>(
        experiences: impl IntoIterator<Item = &'a Experience>,
        values: impl IntoIterator<Item = (&'a State, Action, f64)>,
    ) -> Self {
        let experiences: Vec<&Experience> = experiences.into_iter().collect();

        let mut affinity: HashMap<GenreId, f64> = HashMap::new();
        for exp in experiences.iter().filter(|e| e.reward > 0.0) {
            for (pos, genre) in exp.next_state.recent_genres().iter().enumerate() {
                #[allow(clippy::cast_precision_loss)]
                let discount = 1.0 / (pos + 1) as f64;
                *affinity.entry(*genre).or_default() += exp.reward * discount;
            }
        }
        let mut genre_affinity: Vec<GenreAffinity> = affinity
            .into_iter()
            .map(|(genre, score)| GenreAffinity { genre, score })
            .collect();
        genre_affinity.sort_by(|a, b| b.score.total_cmp(&a.score).then(a.genre.cmp(&b.genre)));

        let mut sums: BTreeMap<TimeOfDay, ([f64; Action::COUNT], usize)> = BTreeMap::new();
        let mut seen_states: HashSet<&State> = HashSet::new();
        for (state, action, value) in values {
            let slot = sums.entry(state.time_of_day()).or_insert(([0.0; Action::COUNT], 0));
            slot.0[action.index()] += value;
            if seen_states.insert(state) {
                slot.1 += 1;
            }
        }
        let preferred_strategy = sums
            .into_iter()
            .filter(|(_, (_, states))| *states > 0)
            .map(|(tod, (totals, states))| {
                let mut best = Action::ALL[0];
                for action in Action::ALL {
                    if totals[action.index()] > totals[best.index()] {
                        best = action;
                    }
                }
                #[allow(clippy::cast_precision_loss)]
                let mean_value = totals[best.index()] / states as f64;
                (
                    tod,
                    StrategyPreference {
                        action: best,
                        mean_value,
                        states,
                    },
                )
            })
            .collect();

        Self {
            generated_at: iso8601_now(),
            experiences_considered: experiences.len(),
            genre_affinity,
            preferred_strategy,
            by_action: aggregate_by_action(experiences.iter().copied()),
        }
    }
}

fn iso8601_now() -> String {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_else(|_| FALLBACK_TIMESTAMP.to_string())
}
