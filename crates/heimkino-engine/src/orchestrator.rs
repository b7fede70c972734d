//! The recommendation façade and its session lifecycle.
//!
//! ```text
//! Idle ──get_recommendations──▶ StrategySelected ──start_session──▶ SessionActive
//!  ▲                               │   ▲  (re-request)                    │
//!  │                               └───┘                                  │
//!  └──────────────── record_session (SessionEnded, learn) ◀───────────────┘
//! ```
//!
//! `SessionEnded` is transient: `record_session` learns from the session and
//! returns to `Idle` before it returns. `cancel_session` goes back to `Idle`
//! from anywhere without learning.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;

use heimkino_content::{CacheStats, ContentEmbedder, SimilarityIndex};
use heimkino_core::{
    Action, ContentMetadata, Experience, Policy, RankedItem, ReasonTag, RecommendationRequest,
    RecommendationResponse, SessionFeedback, State,
};
use heimkino_feedback::{
    aggregate_by_action, OutcomeStatistics, PreferenceProfile, RewardPolicy, SessionVerdict,
};
use heimkino_qlearn::{replay_batch, ExperienceStore, QValueTable, ReplayReport};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::error::{ConfigError, EngineError, PersistError, Result};
use crate::persistence::{LoadedModel, PersistenceManager};
use crate::stats::ModelStats;
use crate::strategy::{self, Realizer};

/// Where the orchestrator is in its session lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    Idle,
    StrategySelected,
    SessionActive,
}

impl SessionPhase {
    fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::StrategySelected => "strategy_selected",
            Self::SessionActive => "session_active",
        }
    }
}

/// A selection that has not been learned from yet. Hosts that do not keep
/// the orchestrator alive between calls store it and hand it back through
/// [`RecommendationOrchestrator::resume`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingSession {
    pub state: State,
    pub action: Action,
    /// Content ids offered to the viewer, best first.
    pub offered: Vec<String>,
    /// Set once a session was started for one of them.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub playing: Option<String>,
}

/// What `record_session` learned.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionOutcome {
    pub content_id: String,
    pub action: Action,
    pub reward: f64,
    /// The reported completion rate lay outside `0..=1` and was clamped.
    pub completion_clamped: bool,
    pub verdict: SessionVerdict,
    pub q_before: f64,
    pub q_after: f64,
    pub td_error: f64,
    pub state: State,
    pub next_state: State,
    /// Oldest experiences dropped by the retention limit.
    pub pruned: usize,
}

pub struct RecommendationOrchestrator {
    config: EngineConfig,
    table: QValueTable,
    store: ExperienceStore,
    embedder: ContentEmbedder,
    index: SimilarityIndex,
    catalog: HashMap<String, ContentMetadata>,
    reward: RewardPolicy,
    persistence: PersistenceManager,
    rng: StdRng,
    pending: Option<PendingSession>,
}

impl RecommendationOrchestrator {
    /// An orchestrator with an empty model and an empty catalog.
    pub fn new(config: EngineConfig) -> Result<Self> {
        config.validate()?;
        let reward =
            RewardPolicy::new(config.reward).map_err(|e| ConfigError::Invalid(e.to_string()))?;
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Ok(Self {
            index: SimilarityIndex::new(config.cache.capacity, config.cache_ttl()),
            persistence: PersistenceManager::new(config.persist_timeout()),
            table: QValueTable::new(),
            store: ExperienceStore::new(),
            embedder: ContentEmbedder::new(),
            catalog: HashMap::new(),
            reward,
            rng,
            pending: None,
            config,
        })
    }

    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    #[must_use]
    pub fn phase(&self) -> SessionPhase {
        match &self.pending {
            None => SessionPhase::Idle,
            Some(p) if p.playing.is_some() => SessionPhase::SessionActive,
            Some(_) => SessionPhase::StrategySelected,
        }
    }

    #[must_use]
    pub fn pending(&self) -> Option<&PendingSession> {
        self.pending.as_ref()
    }

    /// Registers or replaces a content item. Returns `true` when an item with
    /// the same id was replaced.
    pub fn register_content(&mut self, meta: ContentMetadata) -> Result<bool> {
        meta.validate()?;
        self.index.upsert(self.embedder.embed(&meta));
        let replaced = self.catalog.insert(meta.content_id.clone(), meta).is_some();
        Ok(replaced)
    }

    /// Forgets a content item. Cached similarity results may still name it
    /// until they expire; recommendations never do.
    pub fn remove_content(&mut self, content_id: &str) -> bool {
        self.index.invalidate(content_id);
        self.catalog.remove(content_id).is_some()
    }

    #[must_use]
    pub fn content(&self, content_id: &str) -> Option<&ContentMetadata> {
        self.catalog.get(content_id)
    }

    #[must_use]
    pub fn catalog_len(&self) -> usize {
        self.catalog.len()
    }

    /// Picks a strategy for the request's context and ranks the candidate
    /// pool with it. Allowed while idle or to replace an earlier selection.
    pub fn get_recommendations(
        &mut self,
        request: &RecommendationRequest,
    ) -> Result<RecommendationResponse> {
        self.require_not_playing("get_recommendations")?;
        let state = request.context.to_state()?;
        let epsilon = self.current_epsilon();
        let decision = self.table.decide(&state, epsilon, &mut self.rng);

        let mut seen: HashSet<&str> = HashSet::new();
        let mut pool: Vec<&ContentMetadata> = Vec::new();
        let mut unknown = 0_usize;
        for id in &request.candidate_pool {
            if !seen.insert(id.as_str()) {
                continue;
            }
            match self.catalog.get(id) {
                Some(meta) => pool.push(meta),
                None => unknown += 1,
            }
        }
        if unknown > 0 {
            warn!(unknown, "skipping unregistered candidates");
        }

        let mut ranked: Vec<RankedItem> = if pool.is_empty() || request.count == 0 {
            Vec::new()
        } else {
            let mut realizer = Realizer {
                index: &mut self.index,
                embedder: &self.embedder,
            };
            let ranked = realizer.realize(decision.action, &state, &request.context, &pool);
            if ranked.is_empty() {
                debug!(strategy = %decision.action, "strategy found nothing, falling back to trending");
                strategy::trending(&pool, ReasonTag::FallbackTrending)
            } else {
                ranked
            }
        };
        ranked.truncate(request.count);

        debug!(
            state = %state,
            strategy = %decision.action,
            why = ?decision.why,
            epsilon,
            ranked = ranked.len(),
            "recommendations ready"
        );
        self.pending = Some(PendingSession {
            state: state.clone(),
            action: decision.action,
            offered: ranked.iter().map(|r| r.content_id.clone()).collect(),
            playing: None,
        });
        Ok(RecommendationResponse {
            ranked,
            chosen_strategy: decision.action,
            why: decision.why,
            state,
        })
    }

    /// Marks one of the offered items as playing.
    pub fn start_session(&mut self, content_id: &str) -> Result<()> {
        let phase = self.phase();
        let pending = match self.pending.as_mut() {
            Some(p) if phase == SessionPhase::StrategySelected => p,
            _ => return Err(invalid(phase, "start_session")),
        };
        if !pending.offered.iter().any(|id| id == content_id) {
            return Err(EngineError::UnknownContent(content_id.to_string()));
        }
        pending.playing = Some(content_id.to_string());
        debug!(content_id, "session started");
        Ok(())
    }

    /// Ends the active session: computes the reward, records the experience,
    /// applies one learning step and returns to idle.
    pub fn record_session(&mut self, feedback: &SessionFeedback) -> Result<SessionOutcome> {
        let phase = self.phase();
        let playing = match self.pending.as_ref().and_then(|p| p.playing.as_deref()) {
            Some(id) => id,
            None => return Err(invalid(phase, "record_session")),
        };
        feedback.validate()?;
        if feedback.content_id != playing {
            return Err(EngineError::SessionMismatch {
                expected: playing.to_string(),
                got: feedback.content_id.clone(),
            });
        }
        let Some(pending) = self.pending.take() else {
            return Err(invalid(phase, "record_session"));
        };

        let (genres, duration) = match self.catalog.get(&feedback.content_id) {
            Some(meta) => (meta.genres.clone(), meta.duration_minutes),
            None => {
                warn!(content_id = %feedback.content_id, "content removed during session");
                (Vec::new(), 0)
            }
        };
        let breakdown = self.reward.evaluate(feedback, duration);
        let next_state = pending.state.after_session(&genres, breakdown.completion);

        let q_before = self.table.value(&pending.state, pending.action);
        let experience = self.store.append(Experience {
            state: pending.state.clone(),
            action: pending.action,
            reward: breakdown.reward,
            next_state: next_state.clone(),
            timestamp: OffsetDateTime::now_utc(),
        });
        let td_error = self.table.learn(experience, &self.config.learning);
        let q_after = self.table.value(&pending.state, pending.action);
        let pruned = self.store.prune(self.config.retention);

        info!(
            content_id = %feedback.content_id,
            strategy = %pending.action,
            reward = breakdown.reward,
            verdict = ?breakdown.verdict,
            q_before,
            q_after,
            "session recorded"
        );
        Ok(SessionOutcome {
            content_id: feedback.content_id.clone(),
            action: pending.action,
            reward: breakdown.reward,
            completion_clamped: breakdown.completion_clamped,
            verdict: breakdown.verdict,
            q_before,
            q_after,
            td_error,
            state: pending.state,
            next_state,
            pruned,
        })
    }

    /// Drops the current selection or session without learning. Returns
    /// whether there was one.
    pub fn cancel_session(&mut self) -> bool {
        let had = self.pending.take().is_some();
        if had {
            debug!("session cancelled");
        }
        had
    }

    /// Restores a selection saved from an earlier process. Only while idle.
    pub fn resume(&mut self, pending: PendingSession) -> Result<()> {
        let phase = self.phase();
        if phase != SessionPhase::Idle {
            return Err(invalid(phase, "resume"));
        }
        if let Some(id) = &pending.playing {
            if !pending.offered.contains(id) {
                return Err(EngineError::UnknownContent(id.clone()));
            }
        }
        self.pending = Some(pending);
        Ok(())
    }

    /// Re-trains on a uniform sample of recorded experiences.
    /// `None` uses the configured batch size.
    pub fn replay(&mut self, batch: Option<usize>) -> ReplayReport {
        let batch = batch.unwrap_or(self.config.replay_batch);
        let report = replay_batch(
            &mut self.table,
            &self.store,
            batch,
            &self.config.learning,
            &mut self.rng,
        );
        info!(applied = report.applied, mean_abs_td_error = report.mean_abs_td_error, "replay finished");
        report
    }

    #[must_use]
    pub fn current_epsilon(&self) -> f64 {
        self.config.epsilon.epsilon_for(self.store.total_recorded())
    }

    #[must_use]
    pub fn get_stats(&self) -> ModelStats {
        ModelStats {
            total_experiences: self.store.total_recorded(),
            retained_experiences: self.store.len(),
            distinct_states_visited: self.table.len(),
            current_epsilon: self.current_epsilon(),
            avg_recent_reward: self.store.average_recent_reward(self.config.stats_window),
        }
    }

    #[must_use]
    pub fn outcome_statistics(&self) -> BTreeMap<Action, OutcomeStatistics> {
        aggregate_by_action(self.store.all())
    }

    #[must_use]
    pub fn preference_profile(&self) -> PreferenceProfile {
        PreferenceProfile::build(self.store.all(), self.table.entries())
    }

    #[must_use]
    pub fn cache_stats(&self) -> CacheStats {
        self.index.cache_stats()
    }

    #[must_use]
    pub fn q_value(&self, state: &State, action: Action) -> f64 {
        self.table.value(state, action)
    }

    #[must_use]
    pub fn table(&self) -> &QValueTable {
        &self.table
    }

    #[must_use]
    pub fn experiences(&self) -> &ExperienceStore {
        &self.store
    }

    /// Serializes the learned model.
    pub fn save(&self) -> std::result::Result<Vec<u8>, PersistError> {
        self.persistence
            .save(&self.table, &self.store, &self.get_stats())
    }

    /// Replaces the learned model with a snapshot. On error the current model
    /// stays exactly as it was.
    pub fn load(&mut self, snapshot: &[u8]) -> std::result::Result<(), PersistError> {
        let model = self.persistence.load(snapshot).inspect_err(|e| {
            warn!(error = %e, "snapshot rejected, keeping current model");
        })?;
        self.install(model);
        Ok(())
    }

    /// Writes the model atomically, bounded by the configured timeout.
    pub fn save_to_path(&self, path: &Path) -> std::result::Result<(), PersistError> {
        self.persistence
            .save_to_path_with_timeout(path, &self.table, &self.store, &self.get_stats())
            .inspect_err(|e| warn!(path = %path.display(), error = %e, "saving model failed"))
    }

    pub fn load_from_path(&mut self, path: &Path) -> std::result::Result<(), PersistError> {
        let model = self
            .persistence
            .load_from_path_with_timeout(path)
            .inspect_err(|e| {
                warn!(path = %path.display(), error = %e, "loading model failed, keeping current model");
            })?;
        self.install(model);
        Ok(())
    }

    /// Forgets everything learned. The catalog is kept.
    pub fn reset(&mut self) {
        let (table, store) = self.persistence.reset();
        self.table = table;
        self.store = store;
        self.pending = None;
        info!("model reset");
    }

    fn install(&mut self, model: LoadedModel) {
        info!(
            entries = model.table.len(),
            experiences = model.store.len(),
            saved_at = %model.saved_at,
            "model installed"
        );
        self.table = model.table;
        self.store = model.store;
        self.pending = None;
    }

    fn require_not_playing(&self, event: &'static str) -> Result<()> {
        match self.phase() {
            SessionPhase::SessionActive => Err(invalid(SessionPhase::SessionActive, event)),
            _ => Ok(()),
        }
    }
}

fn invalid(phase: SessionPhase, event: &'static str) -> EngineError {
    EngineError::InvalidTransition {
        from: phase.as_str(),
        event,
    }
}
