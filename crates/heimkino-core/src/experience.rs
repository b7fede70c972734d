use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::action::Action;
use crate::error::{Result, ValidationError};
use crate::state::State;

/// One recorded learning sample. Immutable once appended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Experience {
    pub state: State,
    pub action: Action,
    pub reward: f64,
    pub next_state: State,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
}

/// Temporal-difference constants. Configuration, not derived.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LearningParams {
    /// Learning rate α.
    pub alpha: f64,
    /// Discount factor γ.
    pub gamma: f64,
}

impl Default for LearningParams {
    fn default() -> Self {
        Self {
            alpha: 0.1,
            gamma: 0.95,
        }
    }
}

impl LearningParams {
    /// α must lie in `(0, 1]`, γ in `[0, 1)`.
    pub fn validate(&self) -> Result<()> {
        if !(self.alpha > 0.0 && self.alpha <= 1.0) {
            return Err(ValidationError::field("alpha", format!("{} not in (0, 1]", self.alpha)));
        }
        if !(0.0..1.0).contains(&self.gamma) {
            return Err(ValidationError::field("gamma", format!("{} not in [0, 1)", self.gamma)));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_params_are_valid() {
        assert!(LearningParams::default().validate().is_ok());
    }

    #[test]
    fn gamma_of_one_is_rejected() {
        let params = LearningParams {
            alpha: 0.1,
            gamma: 1.0,
        };
        assert!(params.validate().is_err());
        let params = LearningParams {
            alpha: f64::NAN,
            gamma: 0.5,
        };
        assert!(params.validate().is_err());
    }
}
