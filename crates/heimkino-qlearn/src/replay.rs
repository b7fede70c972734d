use heimkino_core::{LearningParams, Policy};
use rand::seq::index;
use rand::Rng;
use serde::Serialize;
use tracing::debug;

use crate::store::ExperienceStore;

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct ReplayReport {
    /// Experiences re-applied.
    pub applied: usize,
    pub mean_abs_td_error: f64,
}

/// Re-trains `policy` on up to `batch` experiences sampled uniformly without
/// replacement. Sampled experiences are applied oldest first.
pub fn replay_batch<P, R>(
    policy: &mut P,
    store: &ExperienceStore,
    batch: usize,
    params: &LearningParams,
    rng: &mut R,
) -> ReplayReport
where
    P: Policy + ?Sized,
    R: Rng + ?Sized,
{
    let amount = batch.min(store.len());
    if amount == 0 {
        return ReplayReport::default();
    }
    let mut picked = index::sample(rng, store.len(), amount).into_vec();
    picked.sort_unstable();

    let mut abs_error = 0.0;
    let mut applied = 0;
    for i in picked {
        if let Some(exp) = store.get(i) {
            abs_error += policy.learn(exp, params).abs();
            applied += 1;
        }
    }
    #[allow(clippy::cast_precision_loss)]
    let mean_abs_td_error = abs_error / applied.max(1) as f64;
    debug!(applied, mean_abs_td_error, "replay batch applied");
    ReplayReport {
        applied,
        mean_abs_td_error,
    }
}
