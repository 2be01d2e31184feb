//! Session state and checkpoint persistence
//!
//! [`SessionState`] is the resume substrate: the day's action log, the
//! processed-target set and the rate limiter whose counters are derived from
//! the log. [`CheckpointStore`] writes it to a human-readable JSON file with
//! an atomic replace, reads it back with validation, and archives finished
//! sessions.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

use crate::config::SessionConfig;
use crate::error::{CheckpointError, EngageError, Result};
use crate::rate_limiter::{DailyCaps, DailyCounters, RateLimiter};
use crate::stats::RunStats;
use crate::types::{ActionKind, ActionRecord};

/// Version of the checkpoint file layout
pub const CHECKPOINT_VERSION: u32 = 1;

/// Summary of a closed session, kept for audit in its successor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArchivedSession {
    pub date: NaiveDate,
    /// Where the full session was archived, if archiving succeeded
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
    pub records: usize,
    pub counters: DailyCounters,
    #[serde(default)]
    pub completed: bool,
}

/// On-disk form of a [`SessionState`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub version: u32,
    pub date: NaiveDate,
    pub daily_counters: DailyCounters,
    pub processed_targets: BTreeSet<String>,
    pub action_log: Vec<ActionRecord>,
    pub session_start: DateTime<Utc>,
    pub last_checkpoint: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_session: Option<ArchivedSession>,
    #[serde(default)]
    pub completed: bool,
}

impl Checkpoint {
    /// Reject unknown versions, malformed records and duplicate
    /// `(target, kind)` pairs
    pub fn validate(&self) -> std::result::Result<(), CheckpointError> {
        if self.version != CHECKPOINT_VERSION {
            return Err(CheckpointError::SchemaMismatch {
                found: self.version,
                expected: CHECKPOINT_VERSION,
            });
        }

        let mut seen = HashSet::new();
        for (i, record) in self.action_log.iter().enumerate() {
            if !record.is_well_formed() {
                return Err(CheckpointError::Inconsistent(format!(
                    "record {} ({} on {}) has outcome {} but error is {}",
                    i,
                    record.kind,
                    record.target_id,
                    record.outcome,
                    if record.error.is_some() { "present" } else { "missing" }
                )));
            }
            if !seen.insert((record.target_id.as_str(), record.kind)) {
                return Err(CheckpointError::Inconsistent(format!(
                    "duplicate {} record for {}",
                    record.kind, record.target_id
                )));
            }
        }
        Ok(())
    }

    /// Summarize this checkpoint for its successor
    pub fn summary(&self, archived_at: Option<PathBuf>) -> ArchivedSession {
        ArchivedSession {
            date: self.date,
            path: archived_at,
            records: self.action_log.len(),
            counters: DailyCounters::from_records(&self.action_log),
            completed: self.completed,
        }
    }
}

/// State of one day's session, owned by the orchestrator
#[derive(Debug, Clone)]
pub struct SessionState {
    limiter: RateLimiter,
    processed: BTreeSet<String>,
    log: Vec<ActionRecord>,
    attempted: HashSet<(String, ActionKind)>,
    session_start: DateTime<Utc>,
    last_checkpoint: DateTime<Utc>,
    previous_session: Option<ArchivedSession>,
    completed: bool,
}

impl SessionState {
    /// Start an empty session for `today`
    pub fn fresh(caps: DailyCaps, today: NaiveDate, now: DateTime<Utc>) -> Self {
        Self {
            limiter: RateLimiter::new(caps, today),
            processed: BTreeSet::new(),
            log: Vec::new(),
            attempted: HashSet::new(),
            session_start: now,
            last_checkpoint: now,
            previous_session: None,
            completed: false,
        }
    }

    /// Rebuild a session from a checkpoint.
    ///
    /// Counters are replayed from the action log; stored counters that
    /// disagree are reported and ignored.
    pub fn from_checkpoint(
        checkpoint: Checkpoint,
        caps: DailyCaps,
    ) -> std::result::Result<Self, CheckpointError> {
        checkpoint.validate()?;

        let replayed = DailyCounters::from_records(&checkpoint.action_log);
        if replayed != checkpoint.daily_counters {
            warn!(
                "Checkpoint counters {:?} disagree with its action log {:?}, using the log",
                checkpoint.daily_counters, replayed
            );
        }

        for (kind, count) in replayed.iter() {
            if count > caps.get(kind) {
                warn!(
                    "{} {} action(s) already recorded today exceed the daily cap of {}",
                    count,
                    kind,
                    caps.get(kind)
                );
            }
        }

        let attempted = checkpoint
            .action_log
            .iter()
            .map(|r| (r.target_id.clone(), r.kind))
            .collect();

        Ok(Self {
            limiter: RateLimiter::with_counters(caps, replayed, checkpoint.date),
            processed: checkpoint.processed_targets,
            log: checkpoint.action_log,
            attempted,
            session_start: checkpoint.session_start,
            last_checkpoint: checkpoint.last_checkpoint,
            previous_session: checkpoint.previous_session,
            completed: checkpoint.completed,
        })
    }

    pub fn to_checkpoint(&self) -> Checkpoint {
        Checkpoint {
            version: CHECKPOINT_VERSION,
            date: self.date(),
            daily_counters: self.limiter.counters().clone(),
            processed_targets: self.processed.clone(),
            action_log: self.log.clone(),
            session_start: self.session_start,
            last_checkpoint: self.last_checkpoint,
            previous_session: self.previous_session.clone(),
            completed: self.completed,
        }
    }

    /// The calendar day this session counts for
    pub fn date(&self) -> NaiveDate {
        self.limiter.as_of()
    }

    pub fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    pub fn limiter_mut(&mut self) -> &mut RateLimiter {
        &mut self.limiter
    }

    pub fn counters(&self) -> &DailyCounters {
        self.limiter.counters()
    }

    pub fn records(&self) -> &[ActionRecord] {
        &self.log
    }

    pub fn has_record(&self, target_id: &str, kind: ActionKind) -> bool {
        self.attempted.contains(&(target_id.to_string(), kind))
    }

    /// Append a record; a success is counted against today's cap.
    ///
    /// Fails without changing state on a duplicate `(target, kind)` or when
    /// the success would pass the cap.
    pub fn append(&mut self, record: ActionRecord) -> Result<()> {
        if self.has_record(&record.target_id, record.kind) {
            return Err(EngageError::InvalidInput(format!(
                "duplicate {} record for {}",
                record.kind, record.target_id
            )));
        }
        if record.is_success() {
            let day = self.date();
            self.limiter.record(record.kind, day)?;
        }
        self.attempted.insert((record.target_id.clone(), record.kind));
        self.log.push(record);
        Ok(())
    }

    pub fn mark_processed(&mut self, target_id: &str) {
        self.processed.insert(target_id.to_string());
    }

    pub fn is_processed(&self, target_id: &str) -> bool {
        self.processed.contains(target_id)
    }

    pub fn session_start(&self) -> DateTime<Utc> {
        self.session_start
    }

    pub fn last_checkpoint(&self) -> DateTime<Utc> {
        self.last_checkpoint
    }

    pub fn previous_session(&self) -> Option<&ArchivedSession> {
        self.previous_session.as_ref()
    }

    pub fn set_previous_session(&mut self, previous: ArchivedSession) {
        self.previous_session = Some(previous);
    }

    pub fn is_completed(&self) -> bool {
        self.completed
    }

    pub fn mark_completed(&mut self) {
        self.completed = true;
    }

    pub fn stats(&self) -> RunStats {
        RunStats::from_records(self.date(), &self.log)
    }
}

/// When to flush: after `every` unflushed records or once `interval` has
/// passed since the last flush, whichever comes first
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlushPolicy {
    pub every: usize,
    pub interval: Duration,
}

impl FlushPolicy {
    pub fn from_config(config: &SessionConfig) -> Self {
        Self {
            every: config.checkpoint_every.max(1),
            interval: Duration::from_secs(config.checkpoint_interval_secs),
        }
    }
}

/// Reads and writes checkpoint files
#[derive(Debug)]
pub struct CheckpointStore {
    path: PathBuf,
    archive_dir: PathBuf,
    policy: FlushPolicy,
    unflushed: usize,
    last_flush: Instant,
}

impl CheckpointStore {
    pub fn new(path: PathBuf, archive_dir: PathBuf, policy: FlushPolicy) -> Self {
        Self {
            path,
            archive_dir,
            policy,
            unflushed: 0,
            last_flush: Instant::now(),
        }
    }

    /// Store at the configured path, or at `resume` when given
    pub fn from_config(config: &SessionConfig, resume: Option<PathBuf>) -> Self {
        Self::new(
            resume.unwrap_or_else(|| config.checkpoint_path()),
            config.archive_dir(),
            FlushPolicy::from_config(config),
        )
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn archive_dir(&self) -> &Path {
        &self.archive_dir
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Read and validate a checkpoint file
    pub fn read(path: &Path) -> std::result::Result<Checkpoint, CheckpointError> {
        let content = std::fs::read_to_string(path).map_err(|source| CheckpointError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let checkpoint: Checkpoint =
            serde_json::from_str(&content).map_err(|source| CheckpointError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        checkpoint.validate()?;
        Ok(checkpoint)
    }

    /// Read this store's checkpoint; `None` when the file does not exist
    pub fn load(&self) -> std::result::Result<Option<Checkpoint>, CheckpointError> {
        if !self.exists() {
            return Ok(None);
        }
        Self::read(&self.path).map(Some)
    }

    /// Persist `state` now
    pub fn save(
        &mut self,
        state: &mut SessionState,
        now: DateTime<Utc>,
    ) -> std::result::Result<(), CheckpointError> {
        state.last_checkpoint = now;
        let checkpoint = state.to_checkpoint();
        let json = serde_json::to_vec_pretty(&checkpoint)?;
        atomic_write(&self.path, &json)?;

        debug!(
            "Checkpoint saved to {} ({} records)",
            self.path.display(),
            checkpoint.action_log.len()
        );
        self.unflushed = 0;
        self.last_flush = Instant::now();
        Ok(())
    }

    /// Count one appended record toward the flush policy
    pub fn note_record(&mut self) {
        self.unflushed += 1;
    }

    pub fn unflushed(&self) -> usize {
        self.unflushed
    }

    pub fn flush_due(&self) -> bool {
        self.unflushed >= self.policy.every
            || (self.unflushed > 0 && self.last_flush.elapsed() >= self.policy.interval)
    }

    /// Save when the policy says so; returns whether a save happened
    pub fn flush_if_due(
        &mut self,
        state: &mut SessionState,
        now: DateTime<Utc>,
    ) -> std::result::Result<bool, CheckpointError> {
        if !self.flush_due() {
            return Ok(false);
        }
        self.save(state, now)?;
        Ok(true)
    }

    /// Copy a session into `archive_dir/session-YYYY-MM-DD.json`
    pub fn archive(
        &self,
        checkpoint: &Checkpoint,
    ) -> std::result::Result<PathBuf, CheckpointError> {
        let path = self
            .archive_dir
            .join(format!("session-{}.json", checkpoint.date.format("%Y-%m-%d")));
        let json = serde_json::to_vec_pretty(checkpoint)?;
        atomic_write(&path, &json)?;
        info!("Archived session {} to {}", checkpoint.date, path.display());
        Ok(path)
    }

    /// Write `archive_dir/stats-YYYY-MM-DD.json`
    pub fn write_stats(&self, stats: &RunStats) -> std::result::Result<PathBuf, CheckpointError> {
        let path = self
            .archive_dir
            .join(format!("stats-{}.json", stats.date.format("%Y-%m-%d")));
        let json = serde_json::to_vec_pretty(stats)?;
        atomic_write(&path, &json)?;
        Ok(path)
    }
}

/// Write through a tempfile in the same directory, then rename over `path`
fn atomic_write(path: &Path, data: &[u8]) -> std::result::Result<(), CheckpointError> {
    let write_error = |source: std::io::Error| CheckpointError::Write {
        path: path.to_path_buf(),
        source,
    };

    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir).map_err(write_error)?;

    let mut tmp = NamedTempFile::new_in(dir).map_err(write_error)?;
    tmp.write_all(data).map_err(write_error)?;
    tmp.as_file().sync_all().map_err(write_error)?;
    tmp.persist(path).map_err(|e| write_error(e.error))?;
    Ok(())
}
