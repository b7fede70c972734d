//! Deterministic content feature embeddings.
//!
//! The 64 dimensions are partitioned into fixed feature groups. The partition
//! is a contract shared by every producer and consumer of embeddings:
//!
//! | slots    | group           | encoding                                   |
//! |----------|-----------------|--------------------------------------------|
//! | `0..20`  | genres          | soft one-hot, `1/n` per recognized genre   |
//! | `20..24` | content type    | one-hot                                    |
//! | `24..27` | scalars         | year, popularity, rating, each in `0..=1`  |
//! | `27..32` | duration bucket | one-hot                                    |
//! | `32..64` | keywords        | `1/n` per recognized keyword               |
//!
//! Each group is scaled by its weight and the whole vector is L2-normalized,
//! so any two embeddings compare by cosine without further work.

use std::ops::Range;

use heimkino_core::{ContentMetadata, ContentType, GenreId};
use serde::Serialize;

pub const EMBEDDING_DIM: usize = 64;

pub const GENRE_SLOTS: Range<usize> = 0..20;
pub const TYPE_SLOTS: Range<usize> = 20..24;
pub const SCALAR_SLOTS: Range<usize> = 24..27;
pub const DURATION_SLOTS: Range<usize> = 27..32;
pub const KEYWORD_SLOTS: Range<usize> = 32..64;

const GENRE_WEIGHT: f32 = 1.0;
const TYPE_WEIGHT: f32 = 0.5;
const SCALAR_WEIGHT: f32 = 0.3;
const DURATION_WEIGHT: f32 = 0.3;
const KEYWORD_WEIGHT: f32 = 0.6;

/// Genre slot of unknown genres.
const OTHER_GENRE_SLOT: usize = 19;

/// Popularity at which the popularity scalar saturates.
const POPULARITY_SATURATION: f64 = 1000.0;

/// Recognized keywords, one slot each. Anything else is dropped.
pub const KEYWORD_VOCABULARY: [&str; 32] = [
    "based on novel",
    "superhero",
    "space",
    "time travel",
    "dystopia",
    "artificial intelligence",
    "heist",
    "detective",
    "serial killer",
    "murder",
    "revenge",
    "friendship",
    "coming of age",
    "love",
    "family",
    "war",
    "biography",
    "true story",
    "sports",
    "music",
    "magic",
    "monster",
    "zombie",
    "vampire",
    "alien",
    "post-apocalyptic",
    "high school",
    "christmas",
    "animal",
    "survival",
    "conspiracy",
    "politics",
];

/// Embedding slot of a TMDB genre id. TV genres fold onto the closest movie
/// genre.
#[must_use]
pub fn genre_slot(genre: GenreId) -> usize {
    match genre.0 {
        28 | 10759 => 0, // action, action & adventure
        12 => 1,
        16 => 2,
        35 => 3,
        80 => 4,
        99 | 10763 => 5, // documentary, news
        18 | 10766 => 6, // drama, soap
        10751 | 10762 => 7, // family, kids
        14 => 8,
        36 => 9,
        27 => 10,
        10402 => 11,
        9648 => 12,
        10749 => 13,
        878 | 10765 => 14, // science fiction, sci-fi & fantasy
        10770 => 15,
        53 => 16,
        10752 | 10768 => 17, // war, war & politics
        37 => 18,
        _ => OTHER_GENRE_SLOT,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DurationBucket {
    /// Under 30 minutes.
    Short,
    /// 30 to 59 minutes.
    Episode,
    /// 60 to 99 minutes.
    Feature,
    /// 100 to 149 minutes.
    Long,
    /// 150 minutes and more.
    Epic,
}

impl DurationBucket {
    #[must_use]
    pub fn from_minutes(minutes: u32) -> Self {
        match minutes {
            0..=29 => Self::Short,
            30..=59 => Self::Episode,
            60..=99 => Self::Feature,
            100..=149 => Self::Long,
            _ => Self::Epic,
        }
    }

    fn offset(self) -> usize {
        self as usize
    }
}

fn type_offset(content_type: ContentType) -> usize {
    match content_type {
        ContentType::Movie => 0,
        ContentType::Series => 1,
        ContentType::Documentary => 2,
        ContentType::Special => 3,
    }
}

/// The metadata an embedding was derived from, as the embedder saw it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EmbeddingMetadata {
    pub genres: Vec<GenreId>,
    pub content_type: ContentType,
    pub year: i32,
    pub duration_bucket: DurationBucket,
    /// Recognized keywords only, normalized.
    pub keywords: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ContentEmbedding {
    pub content_id: String,
    pub vector: [f32; EMBEDDING_DIM],
    pub metadata: EmbeddingMetadata,
}

/// Pure metadata → vector encoder. No randomness, no I/O.
#[derive(Debug, Clone, Copy, Default)]
pub struct ContentEmbedder;

impl ContentEmbedder {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    #[must_use]
    pub fn embed(&self, meta: &ContentMetadata) -> ContentEmbedding {
        let mut v = [0.0_f32; EMBEDDING_DIM];

        write_genres(&mut v, &meta.genres);

        v[TYPE_SLOTS.start + type_offset(meta.content_type)] = TYPE_WEIGHT;

        let year = f64::from(meta.year - 1900) / 130.0;
        let popularity = meta.popularity.max(0.0).ln_1p() / POPULARITY_SATURATION.ln_1p();
        let rating = meta.rating.unwrap_or(0.0) / 10.0;
        for (slot, x) in SCALAR_SLOTS.zip([year, popularity, rating]) {
            v[slot] = SCALAR_WEIGHT * unit(x);
        }

        let duration_bucket = DurationBucket::from_minutes(meta.duration_minutes);
        v[DURATION_SLOTS.start + duration_bucket.offset()] = DURATION_WEIGHT;

        let mut keywords: Vec<String> = Vec::new();
        let mut keyword_slots: Vec<usize> = Vec::new();
        for raw in &meta.keywords {
            let kw = raw.trim().to_lowercase();
            if let Some(pos) = KEYWORD_VOCABULARY.iter().position(|k| *k == kw) {
                if !keyword_slots.contains(&pos) {
                    keyword_slots.push(pos);
                    keywords.push(kw);
                }
            }
        }
        if !keyword_slots.is_empty() {
            #[allow(clippy::cast_precision_loss)]
            let share = KEYWORD_WEIGHT / keyword_slots.len() as f32;
            for pos in keyword_slots {
                v[KEYWORD_SLOTS.start + pos] = share;
            }
        }

        normalize(&mut v);
        ContentEmbedding {
            content_id: meta.content_id.clone(),
            vector: v,
            metadata: EmbeddingMetadata {
                genres: meta.genres.clone(),
                content_type: meta.content_type,
                year: meta.year,
                duration_bucket,
                keywords,
            },
        }
    }

    /// Query vector carrying only genre affinity. All-zero for no genres.
    #[must_use]
    pub fn embed_genres(&self, genres: &[GenreId]) -> [f32; EMBEDDING_DIM] {
        let mut v = [0.0_f32; EMBEDDING_DIM];
        write_genres(&mut v, genres);
        normalize(&mut v);
        v
    }
}

fn write_genres(v: &mut [f32; EMBEDDING_DIM], genres: &[GenreId]) {
    let mut slots: Vec<usize> = Vec::new();
    for g in genres {
        let slot = genre_slot(*g);
        if !slots.contains(&slot) {
            slots.push(slot);
        }
    }
    if slots.is_empty() {
        return;
    }
    #[allow(clippy::cast_precision_loss)]
    let share = GENRE_WEIGHT / slots.len() as f32;
    for slot in slots {
        v[GENRE_SLOTS.start + slot] = share;
    }
}

#[allow(clippy::cast_possible_truncation)]
fn unit(x: f64) -> f32 {
    if x.is_finite() {
        x.clamp(0.0, 1.0) as f32
    } else {
        0.0
    }
}

fn normalize(v: &mut [f32; EMBEDDING_DIM]) {
    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        v.iter_mut().for_each(|x| *x /= norm);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn meta(id: &str, genres: &[u32], keywords: &[&str]) -> ContentMetadata {
        ContentMetadata {
            content_id: id.into(),
            title: None,
            genres: genres.iter().copied().map(GenreId).collect(),
            content_type: ContentType::Movie,
            year: 2014,
            duration_minutes: 169,
            popularity: 120.0,
            rating: Some(8.4),
            keywords: keywords.iter().map(|k| (*k).to_string()).collect(),
        }
    }

    fn norm(v: &[f32]) -> f32 {
        v.iter().map(|x| x * x).sum::<f32>().sqrt()
    }

    #[test]
    fn partition_covers_every_slot_once() {
        let groups = [GENRE_SLOTS, TYPE_SLOTS, SCALAR_SLOTS, DURATION_SLOTS, KEYWORD_SLOTS];
        let mut next = 0;
        for g in groups {
            assert_eq!(g.start, next);
            next = g.end;
        }
        assert_eq!(next, EMBEDDING_DIM);
        assert_eq!(KEYWORD_VOCABULARY.len(), KEYWORD_SLOTS.len());
    }

    #[test]
    fn embedding_is_deterministic_finite_and_unit_length() {
        let embedder = ContentEmbedder::new();
        let m = meta("interstellar", &[12, 18, 878], &["space", "time travel", "wormhole"]);
        let a = embedder.embed(&m);
        let b = embedder.embed(&m);
        assert_eq!(a, b);
        assert_eq!(a.vector.len(), EMBEDDING_DIM);
        assert!(a.vector.iter().all(|x| x.is_finite()));
        assert!((norm(&a.vector) - 1.0).abs() < 1e-5);
    }

    #[test]
    fn unknown_keywords_are_dropped() {
        let embedder = ContentEmbedder::new();
        let e = embedder.embed(&meta("x", &[28], &["  Space ", "wormhole", "space"]));
        assert_eq!(e.metadata.keywords, vec!["space".to_string()]);
        let nonzero_keyword_slots = e.vector[KEYWORD_SLOTS].iter().filter(|x| **x > 0.0).count();
        assert_eq!(nonzero_keyword_slots, 1);
    }

    #[test]
    fn genre_weights_are_soft_one_hot() {
        let embedder = ContentEmbedder::new();
        let e = embedder.embed(&meta("x", &[28, 10759, 35], &[]));
        // 28 and 10759 share the action slot.
        let active: Vec<f32> = e.vector[GENRE_SLOTS].iter().copied().filter(|x| *x > 0.0).collect();
        assert_eq!(active.len(), 2);
        assert!((active[0] - active[1]).abs() < 1e-7);
    }

    #[test]
    fn degenerate_metadata_still_embeds() {
        let embedder = ContentEmbedder::new();
        let mut m = meta("x", &[], &[]);
        m.popularity = 0.0;
        m.rating = None;
        m.year = 1870;
        let e = embedder.embed(&m);
        assert!(e.vector.iter().all(|x| x.is_finite()));
        assert!(norm(&e.vector) > 0.99);
    }

    #[test]
    fn genre_query_vector() {
        let embedder = ContentEmbedder::new();
        assert!(embedder.embed_genres(&[]).iter().all(|x| *x == 0.0));
        let q = embedder.embed_genres(&[GenreId(18)]);
        assert!((q[GENRE_SLOTS.start + 6] - 1.0).abs() < 1e-7);
    }

    #[test]
    fn duration_buckets() {
        assert_eq!(DurationBucket::from_minutes(22), DurationBucket::Short);
        assert_eq!(DurationBucket::from_minutes(45), DurationBucket::Episode);
        assert_eq!(DurationBucket::from_minutes(95), DurationBucket::Feature);
        assert_eq!(DurationBucket::from_minutes(136), DurationBucket::Long);
        assert_eq!(DurationBucket::from_minutes(201), DurationBucket::Epic);
    }

    #[test]
    fn metadata_serializes_as_the_embedder_saw_it() {
        let embedding = ContentEmbedder::new().embed(&meta("x", &[878, 18], &["Space", "unknown"]));
        let json = serde_json::to_value(&embedding.metadata).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "genres": [878, 18],
                "content_type": "movie",
                "year": 2014,
                "duration_bucket": "epic",
                "keywords": ["space"],
            })
        );
    }
}
