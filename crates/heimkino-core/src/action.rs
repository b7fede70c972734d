use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Recommendation strategy. Closed set: a new strategy is a schema change.
///
/// Declaration order is the tie-break priority used by greedy selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    RecommendSimilar,
    RecommendGenre,
    ExploreNewGenre,
    RecommendTrending,
    RecommendByTime,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown action '{0}'")]
pub struct UnknownAction(pub String);

impl Action {
    pub const COUNT: usize = 5;

    /// All actions in tie-break priority order.
    pub const ALL: [Action; Action::COUNT] = [
        Action::RecommendSimilar,
        Action::RecommendGenre,
        Action::ExploreNewGenre,
        Action::RecommendTrending,
        Action::RecommendByTime,
    ];

    /// Dense column index, `0..Action::COUNT`.
    #[must_use]
    pub fn index(self) -> usize {
        self as usize
    }

    #[must_use]
    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::RecommendSimilar => "recommend_similar",
            Self::RecommendGenre => "recommend_genre",
            Self::ExploreNewGenre => "explore_new_genre",
            Self::RecommendTrending => "recommend_trending",
            Self::RecommendByTime => "recommend_by_time",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Action {
    type Err = UnknownAction;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|a| a.as_str() == s)
            .ok_or_else(|| UnknownAction(s.to_string()))
    }
}
