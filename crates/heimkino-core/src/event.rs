//! Boundary payloads exchanged with the host application.
//!
//! These structs are the inbound and outbound shapes of the engine: content
//! registration, recommendation request/response and session feedback. They
//! are validated once here, when they cross into the engine, instead of being
//! re-checked deep inside the learning code.

use serde::{Deserialize, Serialize};

use crate::action::Action;
use crate::error::{Result, ValidationError};
use crate::state::{GenreId, State, ViewingContext};
use crate::DecisionReason;

/// Earliest release year accepted at registration.
pub const MIN_YEAR: i32 = 1870;
/// Latest release year accepted at registration.
pub const MAX_YEAR: i32 = 2100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
    Movie,
    Series,
    Documentary,
    Special,
}

/// Content registration: the metadata the embedder needs for one title.
///
/// Re-registering the same `content_id` replaces the previous entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentMetadata {
    pub content_id: String,
    /// Optional display title; not used for ranking.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub genres: Vec<GenreId>,
    /// Wire name is `type`.
    #[serde(rename = "type")]
    pub content_type: ContentType,
    pub year: i32,
    pub duration_minutes: u32,
    /// Externally supplied popularity score (TMDB scale, unbounded above).
    pub popularity: f64,
    /// Average user rating on a 0..=10 scale, if known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rating: Option<f64>,
    #[serde(default)]
    pub keywords: Vec<String>,
}

impl ContentMetadata {
    pub fn validate(&self) -> Result<()> {
        if self.content_id.trim().is_empty() {
            return Err(ValidationError::EmptyContentId);
        }
        if !(MIN_YEAR..=MAX_YEAR).contains(&self.year) {
            return Err(ValidationError::field(
                "year",
                format!("{} outside {MIN_YEAR}..={MAX_YEAR}", self.year),
            ));
        }
        if self.duration_minutes == 0 {
            return Err(ValidationError::field("duration_minutes", "must be positive"));
        }
        if !self.popularity.is_finite() || self.popularity < 0.0 {
            return Err(ValidationError::field(
                "popularity",
                format!("{} is not a finite, non-negative number", self.popularity),
            ));
        }
        if let Some(rating) = self.rating {
            if !(0.0..=10.0).contains(&rating) {
                return Err(ValidationError::field(
                    "rating",
                    format!("{rating} outside 0..=10"),
                ));
            }
        }
        Ok(())
    }
}

/// Inbound recommendation request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecommendationRequest {
    pub context: ViewingContext,
    pub candidate_pool: Vec<String>,
    pub count: usize,
}

/// Why an item ended up in the ranked list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReasonTag {
    SimilarToRecent,
    GenreMatch,
    NewGenre,
    Trending,
    TimeFit,
    FallbackTrending,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedItem {
    pub content_id: String,
    pub score: f64,
    pub reason_tag: ReasonTag,
}

/// Outbound recommendation response.
///
/// `state` and `chosen_strategy` are what the learning step needs once the
/// session concludes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecommendationResponse {
    pub ranked: Vec<RankedItem>,
    pub chosen_strategy: Action,
    pub why: DecisionReason,
    pub state: State,
}

/// Inbound session feedback.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionFeedback {
    pub content_id: String,
    pub watch_duration_seconds: f64,
    /// Nominally `0..=1`; slightly outside values are clamped and flagged.
    pub completion_rate: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_rating: Option<u8>,
    /// Engagement derived from pauses and rewinds, `0..=1`, if the player
    /// reports it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub engagement: Option<f64>,
}

impl SessionFeedback {
    /// Rejects what cannot be repaired. `completion_rate` is only required to
    /// be finite here; clamping it is the reward policy's job.
    pub fn validate(&self) -> Result<()> {
        if self.content_id.trim().is_empty() {
            return Err(ValidationError::EmptyContentId);
        }
        if !self.watch_duration_seconds.is_finite() || self.watch_duration_seconds < 0.0 {
            return Err(ValidationError::InvalidWatchDuration(
                self.watch_duration_seconds,
            ));
        }
        if !self.completion_rate.is_finite() {
            return Err(ValidationError::NonFiniteCompletion);
        }
        if let Some(rating) = self.user_rating {
            if !(1..=5).contains(&rating) {
                return Err(ValidationError::RatingOutOfRange(rating));
            }
        }
        if let Some(engagement) = self.engagement {
            if !(0.0..=1.0).contains(&engagement) {
                return Err(ValidationError::EngagementOutOfRange(engagement));
            }
        }
        Ok(())
    }
}
