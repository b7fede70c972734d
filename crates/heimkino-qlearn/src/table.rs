//! Arena-indexed Q-value table.
//!
//! Every distinct [`State`] gets a stable row id the first time it is updated;
//! the values live in a dense `[row][action]` array. Lookups on the
//! recommendation path hash the state once and then index directly.

use std::collections::{HashMap, HashSet};

use heimkino_core::{Action, Decision, DecisionReason, Experience, LearningParams, Policy, State};
use rand::{Rng, RngCore};
use tracing::trace;

use crate::error::{QLearnError, Result};

type Row = [f64; Action::COUNT];

#[derive(Debug, Clone, Default)]
pub struct QValueTable {
    states: Vec<State>,
    index: HashMap<State, usize>,
    values: Vec<Row>,
}

impl QValueTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuilds a table from `(state, action, value)` triples, e.g. from a
    /// snapshot. Rows touched by the triples are created with zeros for the
    /// actions not listed.
    pub fn from_entries(entries: impl IntoIterator<Item = (State, Action, f64)>) -> Result<Self> {
        let mut table = Self::new();
        let mut seen: HashSet<(usize, Action)> = HashSet::new();
        for (state, action, value) in entries {
            if !value.is_finite() {
                return Err(QLearnError::NonFiniteValue {
                    state: state.to_string(),
                    action,
                    value,
                });
            }
            let label = state.to_string();
            let row = table.row_id_or_insert(state);
            if !seen.insert((row, action)) {
                return Err(QLearnError::DuplicateEntry {
                    state: label,
                    action,
                });
            }
            table.values[row][action.index()] = value;
        }
        Ok(table)
    }

    /// Number of distinct states with a row.
    #[must_use]
    pub fn len(&self) -> usize {
        self.states.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    /// `Q(state, action)`; unseen pairs read as `0.0`.
    #[must_use]
    pub fn value(&self, state: &State, action: Action) -> f64 {
        self.row(state).map_or(0.0, |row| row[action.index()])
    }

    #[must_use]
    pub fn row(&self, state: &State) -> Option<&Row> {
        self.index.get(state).map(|&id| &self.values[id])
    }

    /// `max_a Q(state, a)`, `0.0` for unseen states.
    #[must_use]
    pub fn max_value(&self, state: &State) -> f64 {
        self.greedy(state).1
    }

    /// Best action for `state`. Ties go to the earliest action in
    /// [`Action::ALL`], so equal tables always yield the same choice.
    #[must_use]
    pub fn greedy(&self, state: &State) -> (Action, f64) {
        let Some(row) = self.row(state) else {
            return (Action::ALL[0], 0.0);
        };
        let mut best = (Action::ALL[0], row[0]);
        for action in Action::ALL.iter().skip(1) {
            let v = row[action.index()];
            if v > best.1 {
                best = (*action, v);
            }
        }
        best
    }

    /// ε-greedy selection. With `epsilon <= 0` no random number is drawn.
    pub fn select_action<R: Rng + ?Sized>(
        &self,
        state: &State,
        epsilon: f64,
        rng: &mut R,
    ) -> Decision {
        if epsilon > 0.0 && rng.gen::<f64>() < epsilon {
            let action = Action::ALL[rng.gen_range(0..Action::COUNT)];
            return Decision {
                action,
                value: self.value(state, action),
                why: DecisionReason::Explore,
            };
        }
        let (action, value) = self.greedy(state);
        let why = if self.index.contains_key(state) {
            DecisionReason::Exploit
        } else {
            DecisionReason::Unseen
        };
        Decision { action, value, why }
    }

    /// `Q(s,a) ← Q(s,a) + α·[r + γ·max_a' Q(s',a') − Q(s,a)]`.
    ///
    /// Creates the row for `state` on first touch. Returns the TD error.
    pub fn update(
        &mut self,
        state: &State,
        action: Action,
        reward: f64,
        next_state: &State,
        params: &LearningParams,
    ) -> f64 {
        debug_assert!(reward.is_finite(), "reward must be validated upstream");
        let target = reward + params.gamma * self.max_value(next_state);
        let row = self.row_id_or_insert(state.clone());
        let current = self.values[row][action.index()];
        let td_error = target - current;
        self.values[row][action.index()] = current + params.alpha * td_error;
        trace!(state = %state, %action, reward, td_error, "q update");
        td_error
    }

    /// All stored `(state, action, value)` triples, rows in creation order.
    pub fn entries(&self) -> impl Iterator<Item = (&State, Action, f64)> + '_ {
        self.states.iter().zip(self.values.iter()).flat_map(|(state, row)| {
            Action::ALL
                .iter()
                .map(move |action| (state, *action, row[action.index()]))
        })
    }

    /// Rows in creation order.
    pub fn rows(&self) -> impl Iterator<Item = (&State, &Row)> + '_ {
        self.states.iter().zip(self.values.iter())
    }

    /// Drops every entry ("clear all" reset).
    pub fn clear(&mut self) {
        self.states.clear();
        self.index.clear();
        self.values.clear();
    }

    fn row_id_or_insert(&mut self, state: State) -> usize {
        if let Some(&id) = self.index.get(&state) {
            return id;
        }
        let id = self.states.len();
        self.index.insert(state.clone(), id);
        self.states.push(state);
        self.values.push([0.0; Action::COUNT]);
        id
    }
}

impl PartialEq for QValueTable {
    /// Same set of rows with the same values; row ids are not compared.
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len()
            && self
                .rows()
                .all(|(state, row)| other.row(state).is_some_and(|o| o == row))
    }
}

impl Policy for QValueTable {
    fn decide(&self, state: &State, epsilon: f64, rng: &mut dyn RngCore) -> Decision {
        self.select_action(state, epsilon, rng)
    }

    fn learn(&mut self, experience: &Experience, params: &LearningParams) -> f64 {
        self.update(
            &experience.state,
            experience.action,
            experience.reward,
            &experience.next_state,
            params,
        )
    }
}
