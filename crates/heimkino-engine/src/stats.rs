use serde::{Deserialize, Serialize};

/// Read-only summary of the learned model.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelStats {
    /// Experiences ever recorded, including pruned ones.
    pub total_experiences: u64,
    /// Experiences currently kept for replay.
    #[serde(default)]
    pub retained_experiences: usize,
    pub distinct_states_visited: usize,
    pub current_epsilon: f64,
    /// Mean reward of the most recent sessions; `None` before the first one.
    pub avg_recent_reward: Option<f64>,
}
