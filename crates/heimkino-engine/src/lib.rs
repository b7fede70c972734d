#![warn(clippy::unwrap_used, clippy::expect_used)]

//! On-device recommendation engine.
//!
//! [`RecommendationOrchestrator`] ties the pieces together: it encodes the
//! viewing context into a state, lets the learned table pick a strategy,
//! ranks the candidate pool with it and learns from the session that
//! follows. [`PersistenceManager`] moves the learned model in and out of
//! versioned snapshots.
//!
//! The orchestrator is a plain owned value. Share it across threads through
//! [`EngineHandle`].

pub mod config;
pub mod error;
pub mod handle;
pub mod orchestrator;
pub mod persistence;
pub mod stats;
mod strategy;

pub use config::{CacheConfig, EngineConfig, MAX_CACHE_CAPACITY};
pub use error::{ConfigError, EngineError, PersistError, Result};
pub use handle::EngineHandle;
pub use orchestrator::{PendingSession, RecommendationOrchestrator, SessionOutcome, SessionPhase};
pub use persistence::{LoadedModel, PersistenceManager, SNAPSHOT_FORMAT, SNAPSHOT_VERSION};
pub use stats::ModelStats;

pub use heimkino_content::CacheStats;
pub use heimkino_feedback::{OutcomeStatistics, PreferenceProfile, SessionVerdict};
pub use heimkino_qlearn::ReplayReport;
