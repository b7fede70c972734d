//! Discretized viewing state used as the key of the learned value table.
//!
//! A [`State`] is derived fresh from a [`ViewingContext`] on every request.
//! Equal field combinations compare and hash equal, so they collapse onto the
//! same table row. The constructor is the only way in; deserialization runs
//! through it as well, which keeps snapshots from smuggling in states the
//! discretization rules could never produce.

use serde::{Deserialize, Serialize};
use std::fmt;
use time::{OffsetDateTime, Weekday};

use crate::error::{Result, ValidationError};

/// Maximum number of genres remembered in [`State::recent_genres`].
pub const MAX_RECENT_GENRES: usize = 3;

/// TMDB genre identifier (e.g. `28` = Action, `18` = Drama).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GenreId(pub u32);

impl fmt::Display for GenreId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeOfDay {
    Morning,
    Afternoon,
    Evening,
    Night,
}

impl TimeOfDay {
    /// 5–11 morning, 12–16 afternoon, 17–21 evening, everything else night.
    #[must_use]
    pub fn from_hour(hour: u8) -> Self {
        match hour {
            5..=11 => Self::Morning,
            12..=16 => Self::Afternoon,
            17..=21 => Self::Evening,
            _ => Self::Night,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DayType {
    Weekday,
    Weekend,
}

impl DayType {
    #[must_use]
    pub fn from_weekday(day: Weekday) -> Self {
        match day {
            Weekday::Saturday | Weekday::Sunday => Self::Weekend,
            _ => Self::Weekday,
        }
    }
}

/// Average completion of recent sessions, bucketed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompletionBucket {
    Low,
    Medium,
    High,
}

impl CompletionBucket {
    /// `< 0.4` low, `< 0.75` medium, otherwise high. Non-finite input is low.
    #[must_use]
    pub fn from_rate(rate: f64) -> Self {
        if !rate.is_finite() || rate < 0.4 {
            Self::Low
        } else if rate < 0.75 {
            Self::Medium
        } else {
            Self::High
        }
    }

    /// Representative completion rate of the bucket.
    #[must_use]
    pub fn midpoint(self) -> f64 {
        match self {
            Self::Low => 0.2,
            Self::Medium => 0.575,
            Self::High => 0.875,
        }
    }
}

/// Immutable, discretized snapshot of the viewing context.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawState")]
pub struct State {
    time_of_day: TimeOfDay,
    day_type: DayType,
    recent_genres: Vec<GenreId>,
    avg_completion_bucket: CompletionBucket,
}

#[derive(Deserialize)]
struct RawState {
    time_of_day: TimeOfDay,
    day_type: DayType,
    #[serde(default)]
    recent_genres: Vec<GenreId>,
    avg_completion_bucket: CompletionBucket,
}

impl TryFrom<RawState> for State {
    type Error = ValidationError;

    fn try_from(raw: RawState) -> Result<Self> {
        Self::new(
            raw.time_of_day,
            raw.day_type,
            &raw.recent_genres,
            raw.avg_completion_bucket,
        )
    }
}

impl State {
    /// Builds a state. Duplicate genres collapse onto their first (most recent)
    /// occurrence; more than [`MAX_RECENT_GENRES`] distinct genres is rejected.
    pub fn new(
        time_of_day: TimeOfDay,
        day_type: DayType,
        recent_genres: &[GenreId],
        avg_completion_bucket: CompletionBucket,
    ) -> Result<Self> {
        let genres = dedup_in_order(recent_genres.iter().copied());
        if genres.len() > MAX_RECENT_GENRES {
            return Err(ValidationError::TooManyRecentGenres {
                count: genres.len(),
                max: MAX_RECENT_GENRES,
            });
        }
        Ok(Self {
            time_of_day,
            day_type,
            recent_genres: genres,
            avg_completion_bucket,
        })
    }

    #[must_use]
    pub fn time_of_day(&self) -> TimeOfDay {
        self.time_of_day
    }

    #[must_use]
    pub fn day_type(&self) -> DayType {
        self.day_type
    }

    /// Most recent first.
    #[must_use]
    pub fn recent_genres(&self) -> &[GenreId] {
        &self.recent_genres
    }

    #[must_use]
    pub fn avg_completion_bucket(&self) -> CompletionBucket {
        self.avg_completion_bucket
    }

    /// The state that follows a watched item: its genres move to the front of
    /// the recency list (oldest fall off) and the completion bucket moves
    /// halfway toward the observed completion rate.
    #[must_use]
    pub fn after_session(&self, watched_genres: &[GenreId], completion_rate: f64) -> Self {
        let mut genres = dedup_in_order(
            watched_genres
                .iter()
                .chain(self.recent_genres.iter())
                .copied(),
        );
        genres.truncate(MAX_RECENT_GENRES);
        let blended = (self.avg_completion_bucket.midpoint() + completion_rate.clamp(0.0, 1.0)) / 2.0;
        Self {
            time_of_day: self.time_of_day,
            day_type: self.day_type,
            recent_genres: genres,
            avg_completion_bucket: CompletionBucket::from_rate(blended),
        }
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let genres: Vec<String> = self.recent_genres.iter().map(ToString::to_string).collect();
        write!(
            f,
            "{:?}/{:?}/[{}]/{:?}",
            self.time_of_day,
            self.day_type,
            genres.join(","),
            self.avg_completion_bucket
        )
    }
}

fn dedup_in_order(genres: impl Iterator<Item = GenreId>) -> Vec<GenreId> {
    let mut out: Vec<GenreId> = Vec::new();
    for g in genres {
        if !out.contains(&g) {
            out.push(g);
        }
    }
    out
}

/// Caller-supplied viewing context of a recommendation request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViewingContext {
    pub time_of_day: TimeOfDay,
    pub day_type: DayType,
    /// Recently watched genres, most recent first.
    #[serde(default)]
    pub recent_genres: Vec<GenreId>,
    pub completion_bucket: CompletionBucket,
    /// Most recently completed item; anchors the "similar" strategy.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_completed: Option<String>,
}

impl ViewingContext {
    /// Derives the clock-based fields from a local timestamp.
    #[must_use]
    pub fn at(
        local_time: OffsetDateTime,
        recent_genres: Vec<GenreId>,
        avg_completion: f64,
        last_completed: Option<String>,
    ) -> Self {
        Self {
            time_of_day: TimeOfDay::from_hour(local_time.hour()),
            day_type: DayType::from_weekday(local_time.weekday()),
            recent_genres,
            completion_bucket: CompletionBucket::from_rate(avg_completion),
            last_completed,
        }
    }

    /// Encodes the context into its table key.
    pub fn to_state(&self) -> Result<State> {
        State::new(
            self.time_of_day,
            self.day_type,
            &self.recent_genres,
            self.completion_bucket,
        )
    }
}
