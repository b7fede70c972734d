#![warn(clippy::unwrap_used, clippy::expect_used)]

//! Shared vocabulary of the heimkino recommendation engine.
//!
//! Everything here is a plain value type: the discretized [`State`], the
//! closed [`Action`] set, recorded [`Experience`]s and the boundary payloads in
//! [`event`]. The [`Policy`] trait is the seam between the orchestrator and
//! whatever learns which strategy to use.

pub mod action;
pub mod error;
pub mod event;
pub mod experience;
pub mod state;

use rand::RngCore;
use serde::{Deserialize, Serialize};

pub use action::{Action, UnknownAction};
pub use error::ValidationError;
pub use event::{
    ContentMetadata, ContentType, RankedItem, ReasonTag, RecommendationRequest,
    RecommendationResponse, SessionFeedback,
};
pub use experience::{Experience, LearningParams};
pub use state::{CompletionBucket, DayType, GenreId, State, TimeOfDay, ViewingContext};

/// How a strategy was picked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionReason {
    /// Random pick with probability ε.
    Explore,
    /// Greedy pick over learned values.
    Exploit,
    /// Greedy pick over a state the policy has never learned about; resolved
    /// by the fixed priority order.
    Unseen,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    pub action: Action,
    /// Learned value of `action` in the decided state.
    pub value: f64,
    pub why: DecisionReason,
}

pub trait Policy {
    /// ε-greedy choice of a strategy for `state`.
    fn decide(&self, state: &State, epsilon: f64, rng: &mut dyn RngCore) -> Decision;
    /// Applies one learning step and returns the temporal-difference error.
    fn learn(&mut self, experience: &Experience, params: &LearningParams) -> f64;
}
