//! Daily engagement orchestrator
//!
//! One sequential worker per account:
//!
//! ```text
//! Initializing → Discovering → ActionPending → Acting → Recording
//!                     ↑                                    │
//!                     └──────── (Pausing) ←────────────────┤
//!                                                          ├→ Completed
//!                                                          └→ Aborted
//! ```
//!
//! The orchestrator owns the [`SessionState`] for the whole run. Every
//! action is gated by the rate limiter, paced by the timing controller,
//! dispatched to its executor, appended to the log and checkpointed per the
//! flush policy. A stop request is honoured at the next state boundary,
//! never in the middle of an action.

use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tracing::{debug, error, info, warn};

use crate::automation::AutomationSurface;
use crate::clock::Clock;
use crate::config::Config;
use crate::discovery::{TargetDiscovery, TargetSource};
use crate::error::Result;
use crate::events::{Event, EventBus};
use crate::executor::{ExecutionContext, Executor};
use crate::generation::{CommentTemplates, TextGenerator};
use crate::rate_limiter::DailyCaps;
use crate::session::{CheckpointStore, SessionState};
use crate::stats::RunStats;
use crate::timing::TimingController;
use crate::types::{ActionKind, ActionRecord, Outcome, Target};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Initializing,
    Discovering,
    ActionPending,
    Acting,
    Recording,
    Pausing,
    Completed,
    Aborted,
}

impl RunState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunState::Completed | RunState::Aborted)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompletionReason {
    /// No configured action kind may be performed again today
    QuotaExhausted,
    /// Discovery has no more candidates
    DiscoveryExhausted,
    /// The checkpoint for today was already marked completed
    AlreadyCompleted,
}

impl fmt::Display for CompletionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompletionReason::QuotaExhausted => write!(f, "daily quota exhausted"),
            CompletionReason::DiscoveryExhausted => write!(f, "no more targets"),
            CompletionReason::AlreadyCompleted => write!(f, "session already completed today"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AbortReason {
    /// Likely lockout or detection; stop before hammering a failing surface
    ConsecutiveFailures { count: u32 },
    StopRequested,
}

impl fmt::Display for AbortReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AbortReason::ConsecutiveFailures { count } => {
                write!(f, "{} consecutive failures", count)
            }
            AbortReason::StopRequested => write!(f, "stop requested"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "reason", rename_all = "snake_case")]
pub enum RunOutcome {
    Completed(CompletionReason),
    Aborted(AbortReason),
}

impl RunOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, RunOutcome::Completed(_))
    }

    /// 0 for a completed run, 1 for an aborted one
    pub fn exit_code(&self) -> i32 {
        if self.is_completed() {
            0
        } else {
            1
        }
    }

    fn label(&self) -> &'static str {
        match self {
            RunOutcome::Completed(_) => "completed",
            RunOutcome::Aborted(_) => "aborted",
        }
    }
}

impl fmt::Display for RunOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunOutcome::Completed(reason) => write!(f, "completed ({})", reason),
            RunOutcome::Aborted(reason) => write!(f, "aborted ({})", reason),
        }
    }
}

/// What a terminal run hands back to its caller
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub outcome: RunOutcome,
    pub stats: RunStats,
    pub checkpoint_path: PathBuf,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub archive_path: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stats_path: Option<PathBuf>,
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Run {}", self.outcome)?;
        writeln!(f, "{}", self.stats)?;
        write!(f, "Checkpoint: {}", self.checkpoint_path.display())?;
        if let Some(path) = &self.archive_path {
            write!(f, "\nArchive: {}", path.display())?;
        }
        if let Some(path) = &self.stats_path {
            write!(f, "\nStats: {}", path.display())?;
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
struct StopInner {
    stopped: AtomicBool,
    notify: Notify,
}

/// Cloneable stop request shared with signal handlers
#[derive(Debug, Clone, Default)]
pub struct StopSignal {
    inner: Arc<StopInner>,
}

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Safe to call from any thread, including a signal-handling thread
    pub fn request_stop(&self) {
        self.inner.stopped.store(true, Ordering::SeqCst);
        self.inner.notify.notify_waiters();
    }

    pub fn is_stopped(&self) -> bool {
        self.inner.stopped.load(Ordering::SeqCst)
    }

    /// Sleep for `duration` unless a stop arrives first.
    ///
    /// Returns false when the sleep was cut short by a stop request.
    pub async fn sleep(&self, duration: Duration) -> bool {
        let notified = self.inner.notify.notified();
        tokio::pin!(notified);
        notified.as_mut().enable();

        if self.is_stopped() {
            return false;
        }
        tokio::select! {
            _ = tokio::time::sleep(duration) => !self.is_stopped(),
            _ = notified => false,
        }
    }
}

/// External collaborators of a run
#[derive(Clone)]
pub struct Collaborators {
    pub surface: Arc<dyn AutomationSurface>,
    pub generator: Arc<dyn TextGenerator>,
    pub source: Arc<dyn TargetSource>,
    pub clock: Arc<dyn Clock>,
}

/// Control flow out of the per-target action loop
enum TargetStep {
    /// Go back to discovery
    Next,
    Finished(RunReport),
}

pub struct DailyOrchestrator {
    config: Config,
    caps: DailyCaps,
    action_order: Vec<ActionKind>,
    surface: Arc<dyn AutomationSurface>,
    generator: Arc<dyn TextGenerator>,
    clock: Arc<dyn Clock>,
    discovery: TargetDiscovery,
    timing: TimingController,
    templates: CommentTemplates,
    template_rng: StdRng,
    events: EventBus,
    stop: StopSignal,
    state: RunState,
    consecutive_failures: u32,
    actions_this_run: u32,
}

impl DailyOrchestrator {
    pub fn new(config: Config, collaborators: Collaborators) -> Result<Self> {
        config.validate()?;

        let timing = TimingController::from_config(&config.timing)?;
        let templates = CommentTemplates::from_config(&config.comments)?;
        let template_rng = match config.timing.seed {
            Some(seed) => StdRng::seed_from_u64(seed.wrapping_add(1)),
            None => StdRng::from_entropy(),
        };
        let discovery = TargetDiscovery::new(
            collaborators.source,
            &config.discovery,
            collaborators.clock.clone(),
        );

        Ok(Self {
            caps: config.limits.caps(),
            action_order: config.session.action_order.clone(),
            surface: collaborators.surface,
            generator: collaborators.generator,
            clock: collaborators.clock,
            discovery,
            timing,
            templates,
            template_rng,
            events: EventBus::default(),
            stop: StopSignal::new(),
            state: RunState::Initializing,
            consecutive_failures: 0,
            actions_this_run: 0,
            config,
        })
    }

    pub fn with_events(mut self, events: EventBus) -> Self {
        self.events = events;
        self
    }

    pub fn with_stop_signal(mut self, stop: StopSignal) -> Self {
        self.stop = stop;
        self
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn stop_signal(&self) -> StopSignal {
        self.stop.clone()
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    /// Run today's session to a terminal state.
    ///
    /// With `resume`, that checkpoint must exist and is loaded and written
    /// back in place; otherwise the configured checkpoint is used when
    /// present. `Err` is returned only for faults that end the run outside
    /// the state machine: an unreadable or inconsistent checkpoint, or a
    /// failed checkpoint write.
    pub async fn run(&mut self, resume: Option<PathBuf>) -> Result<RunReport> {
        self.state = RunState::Initializing;
        self.consecutive_failures = 0;
        self.actions_this_run = 0;

        let explicit = resume.is_some();
        let mut store = CheckpointStore::from_config(&self.config.session, resume);
        let mut session = self.initialize(&mut store, explicit)?;

        if session.is_completed() {
            info!("Session for {} is already completed", session.date());
            return self.complete(CompletionReason::AlreadyCompleted, &mut store, &mut session);
        }

        self.discovery.restart();
        loop {
            if self.stop.is_stopped() {
                return self.abort(AbortReason::StopRequested, &mut store, &mut session);
            }
            self.ensure_current_day(&mut store, &mut session)?;
            self.transition(RunState::Discovering);

            let today = self.clock.today();
            if session.limiter_mut().is_exhausted(&self.action_order, today) {
                return self.complete(CompletionReason::QuotaExhausted, &mut store, &mut session);
            }

            let Some(target) = self.discovery.next().await else {
                return self.complete(CompletionReason::DiscoveryExhausted, &mut store, &mut session);
            };
            if session.is_processed(&target.id) {
                debug!("Skipping {}: already processed today", target.id);
                continue;
            }

            match self.process_target(&target, &mut store, &mut session).await? {
                TargetStep::Next => continue,
                TargetStep::Finished(report) => return Ok(report),
            }
        }
    }

    /// Kinds from the configured order that apply to this target
    fn applicable_kinds(&self, target: &Target) -> Vec<ActionKind> {
        self.action_order
            .iter()
            .copied()
            .filter(|kind| kind.applies_to(target.kind))
            .collect()
    }

    async fn process_target(
        &mut self,
        target: &Target,
        store: &mut CheckpointStore,
        session: &mut SessionState,
    ) -> Result<TargetStep> {
        self.transition(RunState::ActionPending);

        let pending: Vec<ActionKind> = self
            .applicable_kinds(target)
            .into_iter()
            .filter(|kind| !session.has_record(&target.id, *kind))
            .collect();
        if pending.is_empty() {
            session.mark_processed(&target.id);
            return Ok(TargetStep::Next);
        }

        for kind in pending {
            if self.stop.is_stopped() {
                let report = self.abort(AbortReason::StopRequested, store, session)?;
                return Ok(TargetStep::Finished(report));
            }
            if self.ensure_current_day(store, session)? {
                return Ok(TargetStep::Next);
            }

            let today = self.clock.today();
            if !session.limiter_mut().may_perform(kind, today) {
                debug!("Skipping {} on {}: daily cap reached", kind, target.id);
                continue;
            }

            if self.actions_this_run > 0 {
                let delay = self.timing.next_delay();
                if !self.pause(delay, false).await {
                    let report = self.abort(AbortReason::StopRequested, store, session)?;
                    return Ok(TargetStep::Finished(report));
                }
            }

            self.transition(RunState::Acting);
            let record = self.act(kind, target).await;
            self.actions_this_run += 1;

            self.transition(RunState::Recording);
            let batch_due = self.record(target, record, store, session)?;

            let threshold = self.config.session.max_consecutive_failures;
            if self.consecutive_failures >= threshold {
                error!(
                    "{} consecutive failures, stopping the run",
                    self.consecutive_failures
                );
                let reason = AbortReason::ConsecutiveFailures {
                    count: self.consecutive_failures,
                };
                let report = self.abort(reason, store, session)?;
                return Ok(TargetStep::Finished(report));
            }

            if batch_due {
                self.transition(RunState::Pausing);
                let pause = self.timing.next_batch_pause();
                info!(
                    "Batch complete, pausing for {}",
                    humantime::format_duration(round_secs(pause))
                );
                if !self.pause(pause, true).await {
                    let report = self.abort(AbortReason::StopRequested, store, session)?;
                    return Ok(TargetStep::Finished(report));
                }
            }
        }

        Ok(TargetStep::Next)
    }

    async fn act(&mut self, kind: ActionKind, target: &Target) -> ActionRecord {
        let hint = self.templates.pick(&mut self.template_rng).to_string();
        let ctx = ExecutionContext {
            surface: self.surface.as_ref(),
            generator: self.generator.as_ref(),
            clock: self.clock.as_ref(),
            comments: &self.config.comments,
            action_timeout: self.config.timing.action_timeout(),
            template_hint: &hint,
        };
        Executor::for_kind(kind).execute(target, &ctx).await
    }

    /// Append the record, update counters and checkpoint.
    /// Returns whether a batch pause is due.
    fn record(
        &mut self,
        target: &Target,
        record: ActionRecord,
        store: &mut CheckpointStore,
        session: &mut SessionState,
    ) -> Result<bool> {
        match record.outcome {
            Outcome::Success => {
                info!("{} {} ({})", record.kind, target.id, target.source);
                self.consecutive_failures = 0;
            }
            Outcome::Skipped => {
                info!("{} {} skipped: already done", record.kind, target.id);
                self.consecutive_failures = 0;
            }
            Outcome::Failure => {
                let counted = record
                    .error
                    .as_ref()
                    .map_or(true, |e| e.category.counts_as_failure());
                if counted {
                    self.consecutive_failures += 1;
                }
            }
        }
        if let Some(degradation) = &record.degradation {
            warn!(
                "{} on {} degraded: {}",
                record.kind, target.id, degradation
            );
        }

        session.append(record.clone())?;
        self.events.emit(Event::ActionRecorded { record });

        let done = self
            .applicable_kinds(target)
            .iter()
            .all(|kind| session.has_record(&target.id, *kind));
        if done {
            session.mark_processed(&target.id);
        }

        store.note_record();
        if store.flush_if_due(session, self.clock.now())? {
            self.emit_checkpoint_saved(store, session);
        }

        Ok(self.timing.note_action())
    }

    /// Load, roll over or create today's session and save it once
    fn initialize(&mut self, store: &mut CheckpointStore, explicit: bool) -> Result<SessionState> {
        let today = self.clock.today();
        let now = self.clock.now();

        let loaded = if explicit {
            Some(CheckpointStore::read(store.path())?)
        } else {
            store.load()?
        };

        let mut session = match loaded {
            None => {
                info!("Starting a fresh session for {}", today);
                SessionState::fresh(self.caps, today, now)
            }
            Some(checkpoint) if checkpoint.date == today => {
                info!(
                    "Resuming session for {} from {} ({} records)",
                    today,
                    store.path().display(),
                    checkpoint.action_log.len()
                );
                SessionState::from_checkpoint(checkpoint, self.caps)?
            }
            Some(checkpoint) => {
                info!(
                    "Checkpoint is from {}, closing it and starting {}",
                    checkpoint.date, today
                );
                let archived = store.archive(&checkpoint)?;
                let mut fresh = SessionState::fresh(self.caps, today, now);
                fresh.set_previous_session(checkpoint.summary(Some(archived)));
                self.events.emit(Event::DayRolledOver {
                    from: checkpoint.date,
                    to: today,
                });
                fresh
            }
        };

        store.save(&mut session, now)?;
        self.emit_checkpoint_saved(store, &session);
        Ok(session)
    }

    /// Close the session if the calendar day changed under it.
    ///
    /// The old day is checkpointed and archived and a fresh session takes
    /// its place, exactly as if the process had been restarted. Returns true
    /// when a rollover happened.
    fn ensure_current_day(
        &mut self,
        store: &mut CheckpointStore,
        session: &mut SessionState,
    ) -> Result<bool> {
        let today = self.clock.today();
        let previous_day = session.date();
        if previous_day == today {
            return Ok(false);
        }

        let now = self.clock.now();
        info!("Day changed from {} to {}, rolling over", previous_day, today);
        store.save(session, now)?;
        let closed = session.to_checkpoint();
        let archived = store.archive(&closed)?;

        let mut fresh = SessionState::fresh(self.caps, today, now);
        fresh.set_previous_session(closed.summary(Some(archived)));
        *session = fresh;
        store.save(session, now)?;

        self.discovery.restart();
        self.events.emit(Event::DayRolledOver {
            from: previous_day,
            to: today,
        });
        Ok(true)
    }

    fn complete(
        &mut self,
        reason: CompletionReason,
        store: &mut CheckpointStore,
        session: &mut SessionState,
    ) -> Result<RunReport> {
        self.transition(RunState::Completed);

        session.mark_completed();
        store.save(session, self.clock.now())?;
        self.emit_checkpoint_saved(store, session);

        let archive_path = store.archive(&session.to_checkpoint())?;
        let stats = session.stats();
        let stats_path = store.write_stats(&stats)?;
        info!("Run completed: {}", reason);

        self.finish(
            RunOutcome::Completed(reason),
            stats,
            store,
            Some(archive_path),
            Some(stats_path),
        )
    }

    fn abort(
        &mut self,
        reason: AbortReason,
        store: &mut CheckpointStore,
        session: &mut SessionState,
    ) -> Result<RunReport> {
        self.transition(RunState::Aborted);

        store.save(session, self.clock.now())?;
        self.emit_checkpoint_saved(store, session);
        warn!(
            "Run aborted: {}. Resume from {}",
            reason,
            store.path().display()
        );

        let stats = session.stats();
        self.finish(RunOutcome::Aborted(reason), stats, store, None, None)
    }

    fn finish(
        &mut self,
        outcome: RunOutcome,
        stats: RunStats,
        store: &CheckpointStore,
        archive_path: Option<PathBuf>,
        stats_path: Option<PathBuf>,
    ) -> Result<RunReport> {
        self.events.emit(Event::RunFinished {
            outcome: outcome.label().to_string(),
            stats: stats.clone(),
        });
        Ok(RunReport {
            outcome,
            stats,
            checkpoint_path: store.path().to_path_buf(),
            archive_path,
            stats_path,
        })
    }

    /// Interruptible sleep; false when a stop request cut it short
    async fn pause(&mut self, duration: Duration, batch: bool) -> bool {
        self.events.emit(Event::Paused {
            seconds: duration.as_secs_f64(),
            batch,
        });
        debug!("Waiting {:.1}s", duration.as_secs_f64());
        self.stop.sleep(duration).await
    }

    fn transition(&mut self, to: RunState) {
        if self.state == to {
            return;
        }
        debug!("{:?} -> {:?}", self.state, to);
        self.events.emit(Event::StateChanged {
            from: self.state,
            to,
        });
        self.state = to;
    }

    fn emit_checkpoint_saved(&self, store: &CheckpointStore, session: &SessionState) {
        self.events.emit(Event::CheckpointSaved {
            path: store.path().display().to_string(),
            records: session.records().len(),
        });
    }
}

fn round_secs(duration: Duration) -> Duration {
    Duration::from_secs(duration.as_secs())
}
