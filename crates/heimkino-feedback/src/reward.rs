//! Turns session feedback into a scalar reward in `-1.0..=1.0`.
//!
//! `blend = wc·completion + wr·(rating−1)/4 + we·engagement` over the weights
//! of the terms that are present, and `reward = 2·blend − 1`. A missing rating
//! hands its weight to the other two terms in proportion.

use heimkino_core::SessionFeedback;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{FeedbackError, Result};

/// Completion above which a session counts as excellent.
const VERDICT_EXCELLENT: f64 = 0.9;
/// Completion above which a session counts as good.
const VERDICT_GOOD: f64 = 0.7;
/// Completion above which a session counts as partially watched.
const VERDICT_PARTIAL: f64 = 0.3;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RewardWeights {
    pub completion: f64,
    pub rating: f64,
    pub engagement: f64,
}

impl Default for RewardWeights {
    fn default() -> Self {
        Self {
            completion: 0.5,
            rating: 0.3,
            engagement: 0.2,
        }
    }
}

impl RewardWeights {
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("completion", self.completion),
            ("rating", self.rating),
            ("engagement", self.engagement),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(FeedbackError::InvalidWeight { name, value });
            }
        }
        if self.completion + self.rating + self.engagement <= 0.0 {
            return Err(FeedbackError::ZeroWeights);
        }
        Ok(())
    }
}

/// Coarse classification of how a session went, by completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionVerdict {
    Excellent,
    Good,
    Partial,
    Poor,
}

impl SessionVerdict {
    #[must_use]
    pub fn from_completion(completion: f64) -> Self {
        if completion > VERDICT_EXCELLENT {
            Self::Excellent
        } else if completion > VERDICT_GOOD {
            Self::Good
        } else if completion > VERDICT_PARTIAL {
            Self::Partial
        } else {
            Self::Poor
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RewardBreakdown {
    pub reward: f64,
    /// Completion after clamping to `0..=1`.
    pub completion: f64,
    /// Set when the reported completion lay outside `0..=1`.
    pub completion_clamped: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rating: Option<f64>,
    pub engagement: f64,
    pub verdict: SessionVerdict,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct RewardPolicy {
    weights: RewardWeights,
}

impl RewardPolicy {
    pub fn new(weights: RewardWeights) -> Result<Self> {
        weights.validate()?;
        Ok(Self { weights })
    }

    /// Rewards a session of content that runs `duration_minutes`. Expects
    /// feedback that already passed [`SessionFeedback::validate`].
    #[must_use]
    pub fn evaluate(&self, feedback: &SessionFeedback, duration_minutes: u32) -> RewardBreakdown {
        let raw = feedback.completion_rate;
        let completion = raw.clamp(0.0, 1.0);
        let completion_clamped = completion != raw;
        if completion_clamped {
            warn!(
                content_id = %feedback.content_id,
                completion_rate = raw,
                "completion rate outside 0..=1, clamped"
            );
        }

        let engagement = feedback
            .engagement
            .unwrap_or_else(|| watch_ratio(feedback.watch_duration_seconds, duration_minutes, completion))
            .clamp(0.0, 1.0);
        let rating = feedback.user_rating.map(|r| (f64::from(r) - 1.0) / 4.0);

        let w = &self.weights;
        let mut weighted = w.completion * completion + w.engagement * engagement;
        let mut total_weight = w.completion + w.engagement;
        if let Some(r) = rating {
            weighted += w.rating * r;
            total_weight += w.rating;
        }
        let blend = if total_weight > 0.0 {
            weighted / total_weight
        } else {
            completion
        };

        RewardBreakdown {
            reward: (2.0 * blend - 1.0).clamp(-1.0, 1.0),
            completion,
            completion_clamped,
            rating,
            engagement,
            verdict: SessionVerdict::from_completion(completion),
        }
    }
}

/// Share of the runtime actually watched. Falls back to completion when the
/// runtime is unknown.
fn watch_ratio(watch_seconds: f64, duration_minutes: u32, completion: f64) -> f64 {
    if duration_minutes == 0 {
        return completion;
    }
    watch_seconds / (f64::from(duration_minutes) * 60.0)
}
