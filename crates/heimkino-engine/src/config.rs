//! Engine configuration.
//!
//! Every section defaults, so an empty JSON object is a valid config file.

use std::fs;
use std::path::Path;
use std::time::Duration;

use heimkino_core::LearningParams;
use heimkino_feedback::RewardWeights;
use heimkino_qlearn::EpsilonSchedule;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Upper bound of `cache.capacity`.
pub const MAX_CACHE_CAPACITY: usize = 65_536;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Cached similarity queries; `0` disables the cache.
    pub capacity: usize,
    pub ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity: 128,
            ttl_secs: 300,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub learning: LearningParams,
    pub epsilon: EpsilonSchedule,
    pub reward: RewardWeights,
    pub cache: CacheConfig,
    /// Experiences kept after every append.
    pub retention: usize,
    /// Window of `avg_recent_reward` in the model statistics.
    pub stats_window: usize,
    /// Default batch of an explicit replay.
    pub replay_batch: usize,
    /// Seeds exploration. `None` seeds from the OS.
    pub seed: Option<u64>,
    pub persist_timeout_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            learning: LearningParams::default(),
            epsilon: EpsilonSchedule::default(),
            reward: RewardWeights::default(),
            cache: CacheConfig::default(),
            retention: 1000,
            stats_window: 20,
            replay_batch: 32,
            seed: None,
            persist_timeout_ms: 2000,
        }
    }
}

impl EngineConfig {
    /// Reads and validates a JSON config file.
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.learning
            .validate()
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;
        self.epsilon
            .validate()
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;
        self.reward
            .validate()
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;
        if self.cache.capacity > MAX_CACHE_CAPACITY {
            return Err(ConfigError::Invalid(format!(
                "cache.capacity {} exceeds {MAX_CACHE_CAPACITY}",
                self.cache.capacity
            )));
        }
        if self.retention == 0 {
            return Err(ConfigError::Invalid("retention must be at least 1".into()));
        }
        if self.stats_window == 0 {
            return Err(ConfigError::Invalid("stats_window must be at least 1".into()));
        }
        if self.persist_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "persist_timeout_ms must be positive".into(),
            ));
        }
        Ok(())
    }

    #[must_use]
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache.ttl_secs)
    }

    #[must_use]
    pub fn persist_timeout(&self) -> Duration {
        Duration::from_millis(self.persist_timeout_ms)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_are_valid() {
        let config = EngineConfig::default();
        assert!(config.validate().is_ok());
        assert!((config.learning.alpha - 0.1).abs() < f64::EPSILON);
        assert!((config.epsilon.initial - 0.3).abs() < f64::EPSILON);
        assert_eq!(config.cache_ttl(), Duration::from_secs(300));
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"learning": {{"alpha": 0.25}}, "seed": 7}}"#).unwrap();
        let config = EngineConfig::from_path(file.path()).unwrap();
        assert!((config.learning.alpha - 0.25).abs() < f64::EPSILON);
        assert!((config.learning.gamma - 0.95).abs() < f64::EPSILON);
        assert_eq!(config.seed, Some(7));
        assert_eq!(config.retention, 1000);
    }

    #[test]
    fn invalid_values_are_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"epsilon": {{"initial": 0.1, "floor": 0.5}}}}"#).unwrap();
        assert!(matches!(
            EngineConfig::from_path(file.path()),
            Err(ConfigError::Invalid(_))
        ));

        let config = EngineConfig {
            retention: 0,
            ..EngineConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn oversized_cache_is_rejected() {
        let config: EngineConfig =
            serde_json::from_str(r#"{"cache":{"capacity":18446744073709551615}}"#).unwrap();
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let at_limit = EngineConfig {
            cache: CacheConfig {
                capacity: MAX_CACHE_CAPACITY,
                ..CacheConfig::default()
            },
            ..EngineConfig::default()
        };
        assert!(at_limit.validate().is_ok());
    }

    #[test]
    fn missing_and_malformed_files() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            EngineConfig::from_path(&dir.path().join("absent.json")),
            Err(ConfigError::Read { .. })
        ));
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "not json").unwrap();
        assert!(matches!(
            EngineConfig::from_path(file.path()),
            Err(ConfigError::Parse { .. })
        ));
    }
}
