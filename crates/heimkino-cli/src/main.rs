//! CLI for heimkino.
//!
//! Drives the recommendation engine from files: a JSONL catalog of content
//! registrations, the model snapshot and the pending session between a
//! `recommend` and its `feedback`. Results go to stdout as JSON, logs go to
//! stderr.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use heimkino_core::{ContentMetadata, GenreId, RecommendationRequest, SessionFeedback, ViewingContext};
use heimkino_engine::{EngineConfig, PendingSession, RecommendationOrchestrator};
use serde::Serialize;
use std::fs::{self, File};
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(flatten)]
    files: Files,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct Files {
    /// Model snapshot
    #[arg(long, global = true, env = "HEIMKINO_MODEL", default_value = "data/heimkino.model.json")]
    model: PathBuf,

    /// Engine config (JSON); defaults apply when absent
    #[arg(long, global = true, env = "HEIMKINO_CONFIG")]
    config: Option<PathBuf>,

    /// Content catalog, one registration per line
    #[arg(long, global = true, env = "HEIMKINO_CATALOG", default_value = "data/heimkino.catalog.jsonl")]
    catalog: PathBuf,

    /// Pending session between `recommend` and `feedback`
    #[arg(long, global = true, default_value = "data/heimkino.session.json")]
    session: PathBuf,
}

#[derive(Subcommand)]
enum Commands {
    /// Register content from a JSONL file ("-" reads stdin)
    Register {
        #[arg(long)]
        input: PathBuf,
    },
    /// Pick a strategy and rank candidates
    Recommend {
        /// Candidate content ids; the whole catalog when omitted
        #[arg(long, value_delimiter = ',')]
        pool: Vec<String>,

        #[arg(long, default_value = "5")]
        count: usize,

        /// Local time of the request (RFC 3339); now when omitted
        #[arg(long, value_parser = parse_rfc3339)]
        at: Option<OffsetDateTime>,

        /// Recently watched genre ids, most recent first
        #[arg(long, value_delimiter = ',')]
        genres: Vec<u32>,

        /// Average completion of recent sessions
        #[arg(long, default_value = "0.5")]
        completion: f64,

        /// Most recently completed content id
        #[arg(long)]
        last: Option<String>,
    },
    /// Report that playback of a recommended item started
    Start { content_id: String },
    /// Report how the session went and learn from it
    Feedback {
        #[arg(long)]
        content_id: String,

        #[arg(long)]
        watch_seconds: f64,

        #[arg(long)]
        completion: f64,

        /// Explicit rating 1..=5
        #[arg(long)]
        rating: Option<u8>,

        /// Engagement 0..=1
        #[arg(long)]
        engagement: Option<f64>,
    },
    /// Drop the pending session without learning
    Cancel,
    /// Re-train on a sample of recorded sessions
    Replay {
        #[arg(long)]
        batch: Option<usize>,
    },
    /// Model statistics and per-strategy outcomes
    Stats,
    /// Learned viewer preferences
    Profile,
    /// Forget everything learned
    Reset,
}

fn parse_rfc3339(s: &str) -> Result<OffsetDateTime, time::error::Parse> {
    OffsetDateTime::parse(s, &Rfc3339)
}

/// The device's local clock. The offset cannot be determined once other
/// threads run, so call this before anything spawns.
fn local_now() -> OffsetDateTime {
    OffsetDateTime::now_local().unwrap_or_else(|e| {
        warn!(error = %e, "local offset unavailable, using UTC");
        OffsetDateTime::now_utc()
    })
}

fn load_config(files: &Files) -> Result<EngineConfig> {
    match &files.config {
        Some(path) => EngineConfig::from_path(path)
            .with_context(|| format!("Failed to load config {}", path.display())),
        None => Ok(EngineConfig::default()),
    }
}

fn read_registrations(path: &Path) -> Result<Vec<ContentMetadata>> {
    let reader: Box<dyn BufRead> = if path == Path::new("-") {
        Box::new(BufReader::new(io::stdin()))
    } else {
        let f = File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
        Box::new(BufReader::new(f))
    };
    let mut items = Vec::new();
    for (idx, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let meta: ContentMetadata = serde_json::from_str(&line)
            .with_context(|| format!("{}:{}: invalid registration", path.display(), idx + 1))?;
        items.push(meta);
    }
    Ok(items)
}

fn read_catalog(path: &Path) -> Result<Vec<ContentMetadata>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    read_registrations(path)
}

fn write_catalog(path: &Path, items: &[ContentMetadata]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut file = io::BufWriter::new(File::create(path)?);
    for item in items {
        serde_json::to_writer(&mut file, item)?;
        writeln!(file)?;
    }
    file.flush()?;
    Ok(())
}

/// Builds an orchestrator from the config, the catalog and the snapshot.
fn boot(files: &Files) -> Result<RecommendationOrchestrator> {
    let mut engine = RecommendationOrchestrator::new(load_config(files)?)?;
    for meta in read_catalog(&files.catalog)? {
        let id = meta.content_id.clone();
        engine
            .register_content(meta)
            .with_context(|| format!("Catalog entry {id:?} is invalid"))?;
    }
    if files.model.exists() {
        engine.load_from_path(&files.model).with_context(|| {
            format!(
                "Model {} could not be loaded; run `heimkino reset` to start over",
                files.model.display()
            )
        })?;
    }
    Ok(engine)
}

fn load_pending(path: &Path) -> Result<Option<PendingSession>> {
    if !path.exists() {
        return Ok(None);
    }
    let file = File::open(path)?;
    let pending = serde_json::from_reader(file)
        .with_context(|| format!("Session file {} is corrupt", path.display()))?;
    Ok(Some(pending))
}

fn save_pending(path: &Path, pending: Option<&PendingSession>) -> Result<()> {
    match pending {
        Some(p) => {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
            let file = File::create(path)?;
            serde_json::to_writer_pretty(file, p)?;
        }
        None if path.exists() => fs::remove_file(path)?,
        None => {}
    }
    Ok(())
}

fn resume_pending(engine: &mut RecommendationOrchestrator, files: &Files) -> Result<()> {
    let pending = load_pending(&files.session)?
        .context("No pending session; run `heimkino recommend` first")?;
    engine.resume(pending)?;
    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let stdout = io::stdout();
    let mut out = stdout.lock();
    serde_json::to_writer_pretty(&mut out, value)?;
    writeln!(out)?;
    Ok(())
}

#[derive(Serialize)]
struct RegisterSummary {
    registered: usize,
    replaced: usize,
    catalog_size: usize,
}

fn register(files: &Files, input: &Path) -> Result<RegisterSummary> {
    let incoming = read_registrations(input)?;
    let mut catalog = read_catalog(&files.catalog)?;
    let mut replaced = 0;
    for meta in &incoming {
        meta.validate()
            .with_context(|| format!("Registration {:?} is invalid", meta.content_id))?;
    }
    for meta in incoming.iter().cloned() {
        match catalog.iter_mut().find(|m| m.content_id == meta.content_id) {
            Some(slot) => {
                *slot = meta;
                replaced += 1;
            }
            None => catalog.push(meta),
        }
    }
    write_catalog(&files.catalog, &catalog)?;
    info!(registered = incoming.len(), replaced, "catalog updated");
    Ok(RegisterSummary {
        registered: incoming.len(),
        replaced,
        catalog_size: catalog.len(),
    })
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    let files = &cli.files;

    match cli.command {
        Commands::Register { input } => print_json(&register(files, &input)?)?,
        Commands::Recommend {
            pool,
            count,
            at,
            genres,
            completion,
            last,
        } => {
            let at = at.unwrap_or_else(local_now);
            let mut engine = boot(files)?;
            if load_pending(&files.session)?.is_some_and(|p| p.playing.is_some()) {
                anyhow::bail!("A session is playing; send `heimkino feedback` or `heimkino cancel` first");
            }
            let candidate_pool = if pool.is_empty() {
                read_catalog(&files.catalog)?
                    .into_iter()
                    .map(|m| m.content_id)
                    .collect()
            } else {
                pool
            };
            let context = ViewingContext::at(
                at,
                genres.into_iter().map(GenreId).collect(),
                completion,
                last,
            );
            let response = engine.get_recommendations(&RecommendationRequest {
                context,
                candidate_pool,
                count,
            })?;
            save_pending(&files.session, engine.pending())?;
            print_json(&response)?;
        }
        Commands::Start { content_id } => {
            let mut engine = boot(files)?;
            resume_pending(&mut engine, files)?;
            engine.start_session(&content_id)?;
            save_pending(&files.session, engine.pending())?;
            print_json(&engine.pending())?;
        }
        Commands::Feedback {
            content_id,
            watch_seconds,
            completion,
            rating,
            engagement,
        } => {
            let mut engine = boot(files)?;
            resume_pending(&mut engine, files)?;
            let outcome = engine.record_session(&SessionFeedback {
                content_id,
                watch_duration_seconds: watch_seconds,
                completion_rate: completion,
                user_rating: rating,
                engagement,
            })?;
            engine
                .save_to_path(&files.model)
                .context("Failed to save model")?;
            save_pending(&files.session, None)?;
            print_json(&outcome)?;
        }
        Commands::Cancel => {
            let had = load_pending(&files.session)?.is_some();
            save_pending(&files.session, None)?;
            print_json(&serde_json::json!({ "cancelled": had }))?;
        }
        Commands::Replay { batch } => {
            let mut engine = boot(files)?;
            let report = engine.replay(batch);
            engine
                .save_to_path(&files.model)
                .context("Failed to save model")?;
            print_json(&report)?;
        }
        Commands::Stats => {
            let engine = boot(files)?;
            print_json(&serde_json::json!({
                "model": engine.get_stats(),
                "by_action": engine.outcome_statistics(),
                "similarity_cache": engine.cache_stats(),
            }))?;
        }
        Commands::Profile => {
            let engine = boot(files)?;
            print_json(&engine.preference_profile())?;
        }
        Commands::Reset => {
            let config = load_config(files)?;
            let mut engine = RecommendationOrchestrator::new(config)?;
            engine.reset();
            engine
                .save_to_path(&files.model)
                .context("Failed to save model")?;
            if files.session.exists() {
                warn!("dropping pending session");
            }
            save_pending(&files.session, None)?;
            print_json(&engine.get_stats())?;
        }
    }

    Ok(())
}
