//! Cosine-similarity search over registered content.
//!
//! Query results are cached per `(query, k)`. Upserts and invalidations do
//! not flush the cache: until an entry expires it may still list an item that
//! was removed, or miss one that was added. Callers that need exact
//! membership filter results against their own catalog.

use std::collections::BTreeMap;
use std::time::Duration;

use tracing::{debug, trace};

use crate::cache::{CacheKey, CacheStats, QueryCache};
use crate::embed::{ContentEmbedding, EMBEDDING_DIM};

/// Cosine similarity in `-1.0..=1.0`. Zero when either vector has no length.
///
/// # Panics
///
/// When the vectors differ in length.
#[must_use]
pub fn cosine(a: &[f32], b: &[f32]) -> f32 {
    assert_eq!(a.len(), b.len(), "cosine of vectors with different lengths");
    let (mut dot, mut na, mut nb) = (0.0_f64, 0.0_f64, 0.0_f64);
    for (x, y) in a.iter().zip(b) {
        let (x, y) = (f64::from(*x), f64::from(*y));
        dot += x * y;
        na += x * x;
        nb += y * y;
    }
    if na == 0.0 || nb == 0.0 {
        return 0.0;
    }
    #[allow(clippy::cast_possible_truncation)]
    let sim = (dot / (na.sqrt() * nb.sqrt())).clamp(-1.0, 1.0) as f32;
    sim
}

pub struct SimilarityIndex {
    items: BTreeMap<String, ContentEmbedding>,
    cache: QueryCache<Vec<(String, f32)>>,
}

impl SimilarityIndex {
    #[must_use]
    pub fn new(cache_capacity: usize, cache_ttl: Duration) -> Self {
        Self {
            items: BTreeMap::new(),
            cache: QueryCache::new(cache_capacity, cache_ttl),
        }
    }

    /// Inserts or replaces by content id. Returns the replaced embedding.
    pub fn upsert(&mut self, embedding: ContentEmbedding) -> Option<ContentEmbedding> {
        trace!(content_id = %embedding.content_id, "index upsert");
        self.items.insert(embedding.content_id.clone(), embedding)
    }

    pub fn invalidate(&mut self, content_id: &str) -> Option<ContentEmbedding> {
        self.items.remove(content_id)
    }

    #[must_use]
    pub fn get(&self, content_id: &str) -> Option<&ContentEmbedding> {
        self.items.get(content_id)
    }

    #[must_use]
    pub fn contains(&self, content_id: &str) -> bool {
        self.items.contains_key(content_id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// The `k` most similar items, best first. Equal scores order by
    /// ascending content id.
    ///
    /// # Panics
    ///
    /// When `query` is not [`EMBEDDING_DIM`] long.
    pub fn top_k(&mut self, query: &[f32], k: usize) -> Vec<(String, f32)> {
        assert_eq!(
            query.len(),
            EMBEDDING_DIM,
            "query has {} dimensions, index holds {EMBEDDING_DIM}",
            query.len()
        );
        if k == 0 {
            return Vec::new();
        }
        let key = CacheKey::new(query, k);
        if let Some(hit) = self.cache.get(&key) {
            trace!(k, "similarity cache hit");
            return hit;
        }

        let mut scored: Vec<(String, f32)> = self
            .items
            .values()
            .map(|e| (e.content_id.clone(), cosine(query, &e.vector)))
            .collect();
        // BTreeMap iteration is id-ordered and the sort is stable.
        scored.sort_by(|a, b| b.1.total_cmp(&a.1));
        scored.truncate(k);
        debug!(k, returned = scored.len(), indexed = self.items.len(), "similarity query");

        self.cache.insert(key, scored.clone());
        scored
    }

    pub fn clear_cache(&mut self) {
        self.cache.clear();
    }

    #[must_use]
    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ContentEmbedder;
    use heimkino_core::{ContentMetadata, ContentType, GenreId};

    fn meta(id: &str, genres: &[u32]) -> ContentMetadata {
        ContentMetadata {
            content_id: id.into(),
            title: None,
            genres: genres.iter().copied().map(GenreId).collect(),
            content_type: ContentType::Movie,
            year: 2010,
            duration_minutes: 110,
            popularity: 50.0,
            rating: Some(7.0),
            keywords: Vec::new(),
        }
    }

    fn index_with(items: &[(&str, &[u32])]) -> SimilarityIndex {
        let embedder = ContentEmbedder::new();
        let mut index = SimilarityIndex::new(16, Duration::from_secs(300));
        for (id, genres) in items {
            index.upsert(embedder.embed(&meta(id, genres)));
        }
        index
    }

    #[test]
    fn cosine_is_symmetric_and_bounded() {
        let embedder = ContentEmbedder::new();
        let a = embedder.embed(&meta("a", &[28, 12])).vector;
        let b = embedder.embed(&meta("b", &[18])).vector;
        assert!((cosine(&a, &b) - cosine(&b, &a)).abs() < 1e-7);
        assert!((-1.0..=1.0).contains(&cosine(&a, &b)));
        assert!((cosine(&a, &a) - 1.0).abs() < 1e-6);
        assert_eq!(cosine(&[0.0; 4], &[1.0; 4]), 0.0);
    }

    #[test]
    fn cosine_handles_mixed_signs() {
        let a = [0.5_f32, -1.25, 3.0, 0.0, -0.75];
        let neg: Vec<f32> = a.iter().map(|x| -x).collect();
        assert!((cosine(&a, &neg) + 1.0).abs() < 1e-6);

        let b = [-2.0_f32, 0.5, 1.0, -4.0, 0.25];
        let ab = cosine(&a, &b);
        assert!((-1.0..=1.0).contains(&ab));
        assert!((ab - cosine(&b, &a)).abs() < 1e-7);
        // dot 1.1875 over norms of about 15.57
        assert!(ab > 0.0 && ab < 0.5, "{ab}");
    }

    #[test]
    fn top_k_orders_by_similarity_then_id() {
        let mut index = index_with(&[("c-drama", &[18]), ("b-action", &[28]), ("a-action", &[28]), ("mix", &[28, 18])]);
        let query = index.get("a-action").map(|e| e.vector).unwrap_or([0.0; EMBEDDING_DIM]);
        let top = index.top_k(&query, 3);
        let ids: Vec<&str> = top.iter().map(|(id, _)| id.as_str()).collect();
        assert_eq!(ids, vec!["a-action", "b-action", "mix"]);
        assert!(top.windows(2).all(|w| w[0].1 >= w[1].1));
    }

    #[test]
    fn k_larger_than_index_returns_everything() {
        let mut index = index_with(&[("a", &[28]), ("b", &[18])]);
        let query = index.get("a").map(|e| e.vector).unwrap_or([0.0; EMBEDDING_DIM]);
        assert_eq!(index.top_k(&query, 10).len(), 2);
        assert!(index.top_k(&query, 0).is_empty());
    }

    #[test]
    fn repeated_queries_hit_the_cache() {
        let mut index = index_with(&[("a", &[28]), ("b", &[18])]);
        let query = index.get("b").map(|e| e.vector).unwrap_or([0.0; EMBEDDING_DIM]);
        let first = index.top_k(&query, 2);
        let second = index.top_k(&query, 2);
        assert_eq!(first, second);
        assert_eq!(index.cache_stats().hits, 1);
    }

    #[test]
    fn invalidation_leaves_cached_results_until_cleared() {
        let mut index = index_with(&[("a", &[28]), ("b", &[28])]);
        let query = index.get("a").map(|e| e.vector).unwrap_or([0.0; EMBEDDING_DIM]);
        assert_eq!(index.top_k(&query, 2).len(), 2);

        assert!(index.invalidate("b").is_some());
        assert!(!index.contains("b"));
        assert_eq!(index.top_k(&query, 2).len(), 2, "stale entry served from cache");

        index.clear_cache();
        assert_eq!(index.top_k(&query, 2).len(), 1);
    }

    #[test]
    fn upsert_replaces_by_id() {
        let embedder = ContentEmbedder::new();
        let mut index = index_with(&[("a", &[28])]);
        let previous = index.upsert(embedder.embed(&meta("a", &[18])));
        assert!(previous.is_some());
        assert_eq!(index.len(), 1);
    }

    #[test]
    #[should_panic(expected = "dimensions")]
    fn wrong_query_dimension_is_a_contract_violation() {
        let mut index = index_with(&[("a", &[28])]);
        let _ = index.top_k(&[1.0; 8], 1);
    }
}
