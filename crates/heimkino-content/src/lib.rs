#![warn(clippy::unwrap_used, clippy::expect_used)]

//! Content features and similarity search.

pub mod cache;
pub mod embed;
pub mod index;

pub use cache::{CacheStats, QueryCache};
pub use embed::{ContentEmbedder, ContentEmbedding, DurationBucket, EmbeddingMetadata, EMBEDDING_DIM};
pub use index::{cosine, SimilarityIndex};
