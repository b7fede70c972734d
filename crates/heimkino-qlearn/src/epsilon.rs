use serde::{Deserialize, Serialize};

use crate::error::{QLearnError, Result};

/// Exploration rate as a pure function of the number of recorded experiences.
///
/// `ε(n) = floor + (initial − floor) · 0.5^(n / half_life_experiences)`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EpsilonSchedule {
    pub initial: f64,
    pub floor: f64,
    /// Experiences after which the distance to the floor has halved.
    pub half_life_experiences: f64,
}

impl Default for EpsilonSchedule {
    fn default() -> Self {
        Self {
            initial: 0.3,
            floor: 0.05,
            half_life_experiences: 200.0,
        }
    }
}

impl EpsilonSchedule {
    /// Constant ε, no decay.
    #[must_use]
    pub fn constant(epsilon: f64) -> Self {
        Self {
            initial: epsilon,
            floor: epsilon,
            half_life_experiences: 1.0,
        }
    }

    #[must_use]
    pub fn epsilon_for(&self, total_experiences: u64) -> f64 {
        #[allow(clippy::cast_precision_loss)]
        let halvings = total_experiences as f64 / self.half_life_experiences;
        self.floor + (self.initial - self.floor) * 0.5_f64.powf(halvings)
    }

    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.initial) || !(0.0..=1.0).contains(&self.floor) {
            return Err(QLearnError::InvalidSchedule(format!(
                "initial {} and floor {} must lie in 0..=1",
                self.initial, self.floor
            )));
        }
        if self.floor > self.initial {
            return Err(QLearnError::InvalidSchedule(format!(
                "floor {} above initial {}",
                self.floor, self.initial
            )));
        }
        if !(self.half_life_experiences.is_finite() && self.half_life_experiences > 0.0) {
            return Err(QLearnError::InvalidSchedule(format!(
                "half life {} must be positive",
                self.half_life_experiences
            )));
        }
        Ok(())
    }
}
