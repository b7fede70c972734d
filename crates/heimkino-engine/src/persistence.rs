//! Versioned model snapshots.
//!
//! A snapshot is a self-describing JSON document:
//!
//! ```json
//! { "format": "heimkino.model", "version": 1, "saved_at": "...",
//!   "q_table": [{ "state": {..}, "action": "recommend_genre", "value": 0.12 }],
//!   "experiences": [..], "total_recorded": 42, "stats": {..} }
//! ```
//!
//! Decoding checks the envelope first and only then the body, so a document
//! from a different program or a newer version is reported as unreadable
//! before anything else is looked at. Floats are written shortest-roundtrip
//! and parsed with `float_roundtrip`, which makes save/load lossless.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use heimkino_core::{Action, Experience, State};
use heimkino_qlearn::{ExperienceStore, QValueTable};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tempfile::NamedTempFile;
use time::OffsetDateTime;
use tracing::{debug, info, warn};

use crate::error::PersistError;
use crate::stats::ModelStats;

pub const SNAPSHOT_FORMAT: &str = "heimkino.model";
pub const SNAPSHOT_VERSION: u32 = 1;

type Result<T> = std::result::Result<T, PersistError>;

#[derive(Debug, Serialize)]
struct SnapshotOut<'a> {
    format: &'static str,
    version: u32,
    #[serde(with = "time::serde::rfc3339")]
    saved_at: OffsetDateTime,
    q_table: Vec<EntryOut<'a>>,
    experiences: Vec<&'a Experience>,
    total_recorded: u64,
    stats: &'a ModelStats,
}

#[derive(Debug, Serialize)]
struct EntryOut<'a> {
    state: &'a State,
    action: Action,
    value: f64,
}

/// Body of a snapshot whose envelope checked out. States and actions stay
/// untyped until [`decode_body`] so that unknown values surface as schema
/// mismatches rather than parse failures.
#[derive(Debug, Deserialize)]
struct SnapshotIn {
    #[serde(with = "time::serde::rfc3339")]
    saved_at: OffsetDateTime,
    q_table: Vec<EntryIn>,
    experiences: Vec<ExperienceIn>,
    total_recorded: u64,
    #[serde(default)]
    stats: Option<ModelStats>,
}

#[derive(Debug, Deserialize)]
struct EntryIn {
    state: Value,
    action: String,
    value: f64,
}

#[derive(Debug, Deserialize)]
struct ExperienceIn {
    state: Value,
    action: String,
    reward: f64,
    next_state: Value,
    #[serde(with = "time::serde::rfc3339")]
    timestamp: OffsetDateTime,
}

/// A fully validated model, ready to swap in.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadedModel {
    pub table: QValueTable,
    pub store: ExperienceStore,
    pub saved_at: OffsetDateTime,
    /// Statistics as recorded at save time.
    pub stats: Option<ModelStats>,
}

/// Encodes, decodes and stores model snapshots.
#[derive(Debug, Clone, Copy)]
pub struct PersistenceManager {
    timeout: Duration,
}

impl PersistenceManager {
    #[must_use]
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    /// Serializes the model into a snapshot document.
    pub fn save(
        &self,
        table: &QValueTable,
        store: &ExperienceStore,
        stats: &ModelStats,
    ) -> Result<Vec<u8>> {
        let doc = SnapshotOut {
            format: SNAPSHOT_FORMAT,
            version: SNAPSHOT_VERSION,
            saved_at: OffsetDateTime::now_utc(),
            q_table: table
                .entries()
                .map(|(state, action, value)| EntryOut {
                    state,
                    action,
                    value,
                })
                .collect(),
            experiences: store.all().collect(),
            total_recorded: store.total_recorded(),
            stats,
        };
        let bytes = serde_json::to_vec(&doc).map_err(std::io::Error::from)?;
        debug!(
            entries = doc.q_table.len(),
            experiences = doc.experiences.len(),
            bytes = bytes.len(),
            "snapshot encoded"
        );
        Ok(bytes)
    }

    /// Parses and validates a snapshot. Nothing is returned unless the whole
    /// document is valid.
    pub fn load(&self, bytes: &[u8]) -> Result<LoadedModel> {
        let doc: Value = serde_json::from_slice(bytes)
            .map_err(|e| PersistError::unreadable(format!("not a JSON document: {e}")))?;

        match doc.get("format").and_then(Value::as_str) {
            Some(SNAPSHOT_FORMAT) => {}
            Some(other) => {
                return Err(PersistError::unreadable(format!("unknown format tag {other:?}")))
            }
            None => return Err(PersistError::unreadable("missing format tag")),
        }
        match doc.get("version").and_then(Value::as_u64) {
            Some(v) if v == u64::from(SNAPSHOT_VERSION) => {}
            Some(v) => return Err(PersistError::unreadable(format!("unsupported version {v}"))),
            None => return Err(PersistError::unreadable("missing version")),
        }

        let body: SnapshotIn = serde_json::from_value(doc)
            .map_err(|e| PersistError::unreadable(format!("malformed snapshot body: {e}")))?;
        decode_body(body)
    }

    /// An empty model.
    #[must_use]
    pub fn reset(&self) -> (QValueTable, ExperienceStore) {
        (QValueTable::new(), ExperienceStore::new())
    }

    /// Writes `bytes` next to `path` and renames over it, so readers see
    /// either the old or the new snapshot.
    pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
        let parent = match path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        fs::create_dir_all(parent)?;
        let mut tmp = NamedTempFile::new_in(parent)?;
        tmp.write_all(bytes)?;
        tmp.as_file().sync_all()?;
        tmp.persist(path).map_err(|e| PersistError::Io(e.error))?;
        Ok(())
    }

    pub fn save_to_path(
        &self,
        path: &Path,
        table: &QValueTable,
        store: &ExperienceStore,
        stats: &ModelStats,
    ) -> Result<()> {
        let bytes = self.save(table, store, stats)?;
        Self::write_atomic(path, &bytes)?;
        info!(path = %path.display(), bytes = bytes.len(), "model saved");
        Ok(())
    }

    pub fn load_from_path(&self, path: &Path) -> Result<LoadedModel> {
        let bytes = fs::read(path)?;
        let model = self.load(&bytes)?;
        info!(path = %path.display(), entries = model.table.len(), "model loaded");
        Ok(model)
    }

    /// Like [`save_to_path`](Self::save_to_path), giving up after the
    /// configured timeout. The write keeps running in the background and may
    /// still complete.
    pub fn save_to_path_with_timeout(
        &self,
        path: &Path,
        table: &QValueTable,
        store: &ExperienceStore,
        stats: &ModelStats,
    ) -> Result<()> {
        let bytes = self.save(table, store, stats)?;
        let target = path.to_path_buf();
        run_with_timeout(self.timeout, move || Self::write_atomic(&target, &bytes))?;
        info!(path = %path.display(), "model saved");
        Ok(())
    }

    pub fn load_from_path_with_timeout(&self, path: &Path) -> Result<LoadedModel> {
        let source: PathBuf = path.to_path_buf();
        let bytes = run_with_timeout(self.timeout, move || Ok(fs::read(source)?))?;
        self.load(&bytes)
    }
}

fn run_with_timeout<T, F>(timeout: Duration, job: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T> + Send + 'static,
{
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        // The receiver is gone once the caller timed out.
        let _ = tx.send(job());
    });
    match rx.recv_timeout(timeout) {
        Ok(result) => result,
        Err(mpsc::RecvTimeoutError::Timeout) => {
            warn!(?timeout, "snapshot I/O timed out");
            Err(PersistError::Timeout(timeout))
        }
        Err(mpsc::RecvTimeoutError::Disconnected) => Err(PersistError::Io(std::io::Error::other(
            "snapshot worker exited without a result",
        ))),
    }
}

fn decode_state(raw: Value, what: &str) -> Result<State> {
    serde_json::from_value(raw).map_err(|e| PersistError::SchemaMismatch(format!("{what}: {e}")))
}

fn decode_action(raw: &str) -> Result<Action> {
    raw.parse()
        .map_err(|e: heimkino_core::UnknownAction| PersistError::SchemaMismatch(e.to_string()))
}

fn decode_body(body: SnapshotIn) -> Result<LoadedModel> {
    let mut entries = Vec::with_capacity(body.q_table.len());
    for (i, entry) in body.q_table.into_iter().enumerate() {
        let state = decode_state(entry.state, &format!("q_table[{i}].state"))?;
        entries.push((state, decode_action(&entry.action)?, entry.value));
    }
    let table = QValueTable::from_entries(entries)
        .map_err(|e| PersistError::unreadable(format!("q_table: {e}")))?;

    let mut experiences = Vec::with_capacity(body.experiences.len());
    for (i, exp) in body.experiences.into_iter().enumerate() {
        experiences.push(Experience {
            state: decode_state(exp.state, &format!("experiences[{i}].state"))?,
            action: decode_action(&exp.action)?,
            reward: exp.reward,
            next_state: decode_state(exp.next_state, &format!("experiences[{i}].next_state"))?,
            timestamp: exp.timestamp,
        });
    }
    let store = ExperienceStore::from_parts(experiences, body.total_recorded)
        .map_err(|e| PersistError::unreadable(format!("experiences: {e}")))?;

    Ok(LoadedModel {
        table,
        store,
        saved_at: body.saved_at,
        stats: body.stats,
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use heimkino_core::{CompletionBucket, DayType, GenreId, LearningParams, TimeOfDay};
    use serde_json::json;

    fn state(genres: &[u32]) -> State {
        let genres: Vec<GenreId> = genres.iter().copied().map(GenreId).collect();
        State::new(TimeOfDay::Evening, DayType::Weekend, &genres, CompletionBucket::Medium).unwrap()
    }

    fn model() -> (QValueTable, ExperienceStore) {
        let mut table = QValueTable::new();
        let mut store = ExperienceStore::new();
        let params = LearningParams::default();
        for (i, reward) in [0.1_f64 / 3.0, -0.7, 0.95].into_iter().enumerate() {
            let exp = Experience {
                state: state(&[18]),
                action: Action::ALL[i],
                reward,
                next_state: state(&[28, 18]),
                timestamp: OffsetDateTime::UNIX_EPOCH + time::Duration::minutes(i as i64),
            };
            table.update(&exp.state, exp.action, exp.reward, &exp.next_state, &params);
            store.append(exp);
        }
        (table, store)
    }

    fn manager() -> PersistenceManager {
        PersistenceManager::new(Duration::from_secs(5))
    }

    #[test]
    fn round_trip_is_lossless() {
        let (table, store) = model();
        let pm = manager();
        let bytes = pm.save(&table, &store, &ModelStats::default()).unwrap();
        let loaded = pm.load(&bytes).unwrap();
        assert_eq!(loaded.table, table);
        assert_eq!(loaded.store, store);
        assert_eq!(loaded.stats, Some(ModelStats::default()));
    }

    #[test]
    fn unknown_version_is_unreadable() {
        let (table, store) = model();
        let pm = manager();
        let mut doc: Value =
            serde_json::from_slice(&pm.save(&table, &store, &ModelStats::default()).unwrap()).unwrap();
        doc["version"] = json!(99);
        let err = pm.load(&serde_json::to_vec(&doc).unwrap()).unwrap_err();
        assert!(err.is_unreadable(), "{err}");
    }

    #[test]
    fn foreign_documents_are_unreadable() {
        let pm = manager();
        for bytes in [
            b"\x00\x01garbage".to_vec(),
            br#"{"version": 1}"#.to_vec(),
            br#"{"format": "other", "version": 1}"#.to_vec(),
            br#"{"format": "heimkino.model", "version": 1, "q_table": 3}"#.to_vec(),
        ] {
            assert!(pm.load(&bytes).unwrap_err().is_unreadable());
        }
    }

    #[test]
    fn unknown_action_is_a_schema_mismatch() {
        let (table, store) = model();
        let pm = manager();
        let mut doc: Value =
            serde_json::from_slice(&pm.save(&table, &store, &ModelStats::default()).unwrap()).unwrap();
        doc["q_table"][0]["action"] = json!("recommend_by_mood");
        let err = pm.load(&serde_json::to_vec(&doc).unwrap()).unwrap_err();
        assert!(matches!(err, PersistError::SchemaMismatch(_)), "{err}");
    }

    #[test]
    fn impossible_state_is_a_schema_mismatch() {
        let (table, store) = model();
        let pm = manager();
        let mut doc: Value =
            serde_json::from_slice(&pm.save(&table, &store, &ModelStats::default()).unwrap()).unwrap();
        doc["experiences"][0]["state"]["recent_genres"] = json!([1, 2, 3, 4]);
        let err = pm.load(&serde_json::to_vec(&doc).unwrap()).unwrap_err();
        assert!(matches!(err, PersistError::SchemaMismatch(_)), "{err}");
    }

    #[test]
    fn atomic_write_replaces_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("model.json");
        let (table, store) = model();
        let pm = manager();
        pm.save_to_path(&path, &table, &store, &ModelStats::default()).unwrap();
        pm.save_to_path(&path, &QValueTable::new(), &ExperienceStore::new(), &ModelStats::default())
            .unwrap();
        let loaded = pm.load_from_path(&path).unwrap();
        assert!(loaded.table.is_empty());
        // only the snapshot itself is left behind
        assert_eq!(fs::read_dir(path.parent().unwrap()).unwrap().count(), 1);
    }

    #[test]
    fn timeout_variants_complete_within_budget() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.json");
        let (table, store) = model();
        let pm = manager();
        pm.save_to_path_with_timeout(&path, &table, &store, &ModelStats::default())
            .unwrap();
        let loaded = pm.load_from_path_with_timeout(&path).unwrap();
        assert_eq!(loaded.table, table);
    }

    #[test]
    fn slow_jobs_time_out() {
        let err = run_with_timeout(Duration::from_millis(10), || {
            thread::sleep(Duration::from_millis(500));
            Ok(())
        })
        .unwrap_err();
        assert!(matches!(err, PersistError::Timeout(_)));
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = manager().load_from_path(&dir.path().join("absent.json")).unwrap_err();
        assert!(matches!(err, PersistError::Io(_)));
    }
}
