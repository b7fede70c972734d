//! Turns a chosen [`Action`] into a ranked list over the candidate pool.
//!
//! Every strategy scores only pool members, sorts by descending score and
//! breaks ties by ascending content id. A strategy that cannot apply (no
//! anchor, no recent genres, nothing left after filtering) returns an empty
//! list and leaves the fallback to the caller.

use std::collections::HashSet;

use heimkino_content::embed::genre_slot;
use heimkino_content::{cosine, ContentEmbedder, DurationBucket, SimilarityIndex};
use heimkino_core::{
    Action, ContentMetadata, DayType, RankedItem, ReasonTag, State, TimeOfDay, ViewingContext,
};

/// Popularity at which the trending score saturates.
const POPULARITY_SATURATION: f64 = 1000.0;
/// Share of the time-of-day fit in the by-time score; popularity fills the rest.
const TIME_FIT_WEIGHT: f64 = 0.7;

pub(crate) struct Realizer<'a> {
    pub index: &'a mut SimilarityIndex,
    pub embedder: &'a ContentEmbedder,
}

impl Realizer<'_> {
    pub fn realize(
        &mut self,
        action: Action,
        state: &State,
        context: &ViewingContext,
        pool: &[&ContentMetadata],
    ) -> Vec<RankedItem> {
        match action {
            Action::RecommendSimilar => self.similar(state, context, pool),
            Action::RecommendGenre => self.genre(state, pool),
            Action::ExploreNewGenre => explore_new_genre(state, pool),
            Action::RecommendTrending => trending(pool, ReasonTag::Trending),
            Action::RecommendByTime => by_time(state, pool),
        }
    }

    /// Nearest neighbours of the last completed item, or of the recent genres
    /// when there is no usable anchor.
    fn similar(
        &mut self,
        state: &State,
        context: &ViewingContext,
        pool: &[&ContentMetadata],
    ) -> Vec<RankedItem> {
        let anchor = context
            .last_completed
            .as_deref()
            .and_then(|id| self.index.get(id))
            .map(|e| (e.content_id.clone(), e.vector));
        let (anchor_id, query) = match anchor {
            Some((id, vector)) => (Some(id), vector),
            None if !state.recent_genres().is_empty() => {
                (None, self.embedder.embed_genres(state.recent_genres()))
            }
            None => return Vec::new(),
        };

        let wanted: HashSet<&str> = pool.iter().map(|m| m.content_id.as_str()).collect();
        let k = self.index.len();
        let hits = self.index.top_k(&query, k);
        let scored = hits
            .iter()
            .filter(|(id, _)| wanted.contains(id.as_str()) && anchor_id.as_deref() != Some(id.as_str()))
            .map(|(id, score)| (id.as_str(), f64::from(*score)))
            .collect();
        rank(scored, ReasonTag::SimilarToRecent)
    }

    /// Candidates sharing a genre with the recent ones, closest profile first.
    fn genre(&self, state: &State, pool: &[&ContentMetadata]) -> Vec<RankedItem> {
        let recent = slots(state.recent_genres().iter().map(|g| genre_slot(*g)));
        if recent.is_empty() {
            return Vec::new();
        }
        let query = self.embedder.embed_genres(state.recent_genres());
        let scored = pool
            .iter()
            .filter(|m| m.genres.iter().any(|g| recent.contains(&genre_slot(*g))))
            .filter_map(|m| {
                self.index
                    .get(&m.content_id)
                    .map(|e| (m.content_id.as_str(), f64::from(cosine(&query, &e.vector))))
            })
            .collect();
        rank(scored, ReasonTag::GenreMatch)
    }
}

fn slots(it: impl Iterator<Item = usize>) -> HashSet<usize> {
    it.collect()
}

/// Candidates outside every recent genre, most popular first.
fn explore_new_genre(state: &State, pool: &[&ContentMetadata]) -> Vec<RankedItem> {
    let recent = slots(state.recent_genres().iter().map(|g| genre_slot(*g)));
    let fresh: Vec<&ContentMetadata> = pool
        .iter()
        .copied()
        .filter(|m| !m.genres.iter().any(|g| recent.contains(&genre_slot(*g))))
        .collect();
    trending(&fresh, ReasonTag::NewGenre)
}

pub(crate) fn trending(pool: &[&ContentMetadata], tag: ReasonTag) -> Vec<RankedItem> {
    let scored = pool
        .iter()
        .map(|m| (m.content_id.as_str(), popularity_score(m.popularity)))
        .collect();
    rank(scored, tag)
}

fn by_time(state: &State, pool: &[&ContentMetadata]) -> Vec<RankedItem> {
    let scored = pool
        .iter()
        .map(|m| {
            let fit = time_fit(
                state.time_of_day(),
                state.day_type(),
                DurationBucket::from_minutes(m.duration_minutes),
            );
            let score = TIME_FIT_WEIGHT * fit + (1.0 - TIME_FIT_WEIGHT) * popularity_score(m.popularity);
            (m.content_id.as_str(), score)
        })
        .collect();
    rank(scored, ReasonTag::TimeFit)
}

/// `ln(1+p) / ln(1+1000)`, clamped to `0..=1`.
pub(crate) fn popularity_score(popularity: f64) -> f64 {
    if !popularity.is_finite() || popularity <= 0.0 {
        return 0.0;
    }
    (popularity.ln_1p() / POPULARITY_SATURATION.ln_1p()).min(1.0)
}

/// How well a runtime suits a slot of the day, `0..=1`.
fn time_fit(time_of_day: TimeOfDay, day_type: DayType, bucket: DurationBucket) -> f64 {
    use DurationBucket::{Epic, Episode, Feature, Long, Short};
    let base: f64 = match (time_of_day, bucket) {
        (TimeOfDay::Morning, Short) => 1.0,
        (TimeOfDay::Morning, Episode) => 0.8,
        (TimeOfDay::Morning, Feature) => 0.4,
        (TimeOfDay::Morning, Long) => 0.2,
        (TimeOfDay::Morning, Epic) => 0.1,
        (TimeOfDay::Afternoon, Short) => 0.6,
        (TimeOfDay::Afternoon, Episode) => 1.0,
        (TimeOfDay::Afternoon, Feature) => 0.8,
        (TimeOfDay::Afternoon, Long) => 0.5,
        (TimeOfDay::Afternoon, Epic) => 0.3,
        (TimeOfDay::Evening, Short) => 0.3,
        (TimeOfDay::Evening, Episode) => 0.6,
        (TimeOfDay::Evening, Feature | Long) => 1.0,
        (TimeOfDay::Evening, Epic) => 0.7,
        (TimeOfDay::Night, Short) => 0.7,
        (TimeOfDay::Night, Episode) => 1.0,
        (TimeOfDay::Night, Feature) => 0.6,
        (TimeOfDay::Night, Long) => 0.3,
        (TimeOfDay::Night, Epic) => 0.1,
    };
    // weekends leave room for long runtimes
    let bonus = match (day_type, bucket) {
        (DayType::Weekend, Long | Epic) => 0.2,
        _ => 0.0,
    };
    (base + bonus).min(1.0)
}

fn rank(mut scored: Vec<(&str, f64)>, tag: ReasonTag) -> Vec<RankedItem> {
    scored.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(b.0)));
    scored
        .into_iter()
        .map(|(id, score)| RankedItem {
            content_id: id.to_string(),
            score,
            reason_tag: tag,
        })
        .collect()
}
