//! Scenario tests for the daily orchestrator
//!
//! Each test runs a full session against mock collaborators and inspects the
//! persisted checkpoint and the calls the surface received.

use chrono::NaiveDate;
use libengage::clock::ManualClock;
use libengage::discovery::Candidate;
use libengage::error::{AutomationError, GenerationError};
use libengage::mock::{MockGenerator, MockSource, MockSurface};
use libengage::orchestrator::{AbortReason, CompletionReason};
use libengage::rate_limiter::DailyCounters;
use libengage::session::{Checkpoint, CheckpointStore};
use libengage::types::ErrorCategory;
use libengage::{ActionKind, Collaborators, Config, DailyOrchestrator, Outcome, RunOutcome};
use std::collections::HashSet;
use std::sync::Arc;
use tempfile::TempDir;

fn today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 6, 1).unwrap()
}

/// Config with zero pacing, one discovery round and paths inside `temp`
fn test_config(temp: &TempDir) -> Config {
    let mut config = Config::default();
    config.discovery.hashtags = vec!["vegan".to_string()];
    config.discovery.competitors = Vec::new();
    config.discovery.max_rounds = 1;
    config.timing.min_action_delay_secs = 0.0;
    config.timing.max_action_delay_secs = 0.0;
    config.timing.min_batch_pause_secs = 0.0;
    config.timing.max_batch_pause_secs = 0.0;
    config.timing.seed = Some(42);
    config.session.checkpoint_path = temp
        .path()
        .join("checkpoint.json")
        .display()
        .to_string();
    config.session.archive_dir = temp.path().join("archive").display().to_string();
    config
}

fn source(users: &[&str]) -> MockSource {
    MockSource::new().with_hashtag(
        "vegan",
        users.iter().map(|u| Candidate::user(*u, 1_000)).collect(),
    )
}

fn build(
    config: Config,
    surface: Arc<MockSurface>,
    generator: Arc<MockGenerator>,
    users: &[&str],
) -> DailyOrchestrator {
    DailyOrchestrator::new(
        config,
        Collaborators {
            surface,
            generator,
            source: Arc::new(source(users)),
            clock: Arc::new(ManualClock::at_noon(today())),
        },
    )
    .unwrap()
}

fn read_checkpoint(config: &Config) -> Checkpoint {
    CheckpointStore::read(&config.session.checkpoint_path()).unwrap()
}

fn pairs(checkpoint: &Checkpoint) -> Vec<(ActionKind, String)> {
    checkpoint
        .action_log
        .iter()
        .map(|r| (r.kind, r.target_id.clone()))
        .collect()
}

#[tokio::test]
async fn test_caps_exhaustion_completes_after_like_and_follow() {
    let temp = TempDir::new().unwrap();
    let mut config = test_config(&temp);
    config.limits.follows_per_day = 1;
    config.limits.likes_per_day = 1;
    config.limits.comments_per_day = 0;

    let surface = Arc::new(MockSurface::success());
    let mut orchestrator = build(
        config.clone(),
        surface.clone(),
        Arc::new(MockGenerator::returning("Nice!")),
        &["a", "b"],
    );

    let report = orchestrator.run(None).await.unwrap();

    assert_eq!(
        report.outcome,
        RunOutcome::Completed(CompletionReason::QuotaExhausted)
    );
    let checkpoint = read_checkpoint(&config);
    assert_eq!(
        pairs(&checkpoint),
        vec![
            (ActionKind::Like, "a".to_string()),
            (ActionKind::Follow, "a".to_string()),
        ],
        "Expected exactly Like(a) then Follow(a)"
    );
    assert!(checkpoint.completed);
    assert!(
        !surface.calls().iter().any(|(_, id)| id == "b"),
        "Target b must not be touched once the quota is spent"
    );
}

#[tokio::test]
async fn test_generation_failure_uses_fallback_and_is_not_a_failure() {
    let temp = TempDir::new().unwrap();
    let mut config = test_config(&temp);
    config.limits.follows_per_day = 0;
    config.limits.likes_per_day = 0;
    config.limits.comments_per_day = 3;
    config.comments.templates = vec!["Fallback comment! 🙌".to_string()];

    let surface = Arc::new(MockSurface::success());
    let generator = Arc::new(MockGenerator::failing(GenerationError::Unavailable(
        "model offline".into(),
    )));
    let mut orchestrator = build(config.clone(), surface.clone(), generator.clone(), &["a", "b", "c"]);

    let report = orchestrator.run(None).await.unwrap();

    assert!(report.outcome.is_completed());
    assert_eq!(generator.call_count(), 3);

    let checkpoint = read_checkpoint(&config);
    assert_eq!(checkpoint.action_log.len(), 3);
    for record in &checkpoint.action_log {
        assert_eq!(record.kind, ActionKind::Comment);
        assert_eq!(record.outcome, Outcome::Success, "record {:?}", record);
        assert!(record.error.is_none());
        assert_eq!(record.comment_text.as_deref(), Some("Fallback comment! 🙌"));
        assert_eq!(
            record.degradation.as_ref().map(|d| d.category),
            Some(ErrorCategory::GenerationFailure)
        );
    }

    assert_eq!(report.stats.category_count(ErrorCategory::GenerationFailure), 3);
    assert_eq!(report.stats.category_count(ErrorCategory::ExecutionFailure), 0);
    assert_eq!(report.stats.kind(ActionKind::Comment).succeeded, 3);
    assert!(surface
        .comments()
        .iter()
        .all(|(_, text)| text == "Fallback comment! 🙌"));
}

#[tokio::test]
async fn test_three_timeouts_abort_with_three_records() {
    let temp = TempDir::new().unwrap();
    let mut config = test_config(&temp);
    config.session.max_consecutive_failures = 3;
    config.timing.action_timeout_secs = 0.02;

    let surface = Arc::new(MockSurface::with_delay(std::time::Duration::from_millis(300)));
    let mut orchestrator = build(
        config.clone(),
        surface.clone(),
        Arc::new(MockGenerator::returning("Nice!")),
        &["a", "b", "c"],
    );

    let report = orchestrator.run(None).await.unwrap();

    assert_eq!(
        report.outcome,
        RunOutcome::Aborted(AbortReason::ConsecutiveFailures { count: 3 })
    );
    assert_eq!(report.outcome.exit_code(), 1);

    let checkpoint = read_checkpoint(&config);
    assert_eq!(checkpoint.action_log.len(), 3);
    assert!(!checkpoint.completed);
    for record in &checkpoint.action_log {
        let error = record.error.as_ref().expect("timeout records carry an error");
        assert_eq!(error.category, ErrorCategory::TimeoutFailure);
        assert_eq!(error.message, "timeout");
    }
    assert_eq!(checkpoint.daily_counters, DailyCounters::new());
    assert_eq!(report.stats.category_count(ErrorCategory::TimeoutFailure), 3);
}

#[tokio::test]
async fn test_success_resets_consecutive_failures() {
    let temp = TempDir::new().unwrap();
    let mut config = test_config(&temp);
    config.session.max_consecutive_failures = 2;
    config.session.action_order = vec![ActionKind::Like, ActionKind::Follow];

    // Follow always fails, Like always succeeds: failures never run back to back
    let surface = Arc::new(
        MockSurface::success()
            .fail_kind(ActionKind::Follow, AutomationError::Rejected("blocked".into())),
    );
    let mut orchestrator = build(
        config.clone(),
        surface,
        Arc::new(MockGenerator::returning("Nice!")),
        &["a", "b", "c"],
    );

    let report = orchestrator.run(None).await.unwrap();

    assert_eq!(
        report.outcome,
        RunOutcome::Completed(CompletionReason::DiscoveryExhausted)
    );
    assert_eq!(report.stats.kind(ActionKind::Follow).failed, 3);
    assert_eq!(report.stats.kind(ActionKind::Like).succeeded, 3);
}

#[tokio::test]
async fn test_engage_before_follow_for_every_target() {
    let temp = TempDir::new().unwrap();
    let config = test_config(&temp);
    let users = ["a", "b", "c", "d"];
    let surface = Arc::new(MockSurface::success());
    let mut orchestrator = build(
        config.clone(),
        surface.clone(),
        Arc::new(MockGenerator::returning("Nice!")),
        &users,
    );

    orchestrator.run(None).await.unwrap();
    let log = pairs(&read_checkpoint(&config));

    for user in users {
        let position = |kind: ActionKind| {
            log.iter()
                .position(|(k, id)| *k == kind && id == user)
                .unwrap_or_else(|| panic!("missing {} record for {}", kind, user))
        };
        let follow = position(ActionKind::Follow);
        assert!(position(ActionKind::Like) < follow, "Like must precede Follow for {}", user);
        assert!(
            position(ActionKind::Comment) < follow,
            "Comment must precede Follow for {}",
            user
        );
    }
}

#[tokio::test]
async fn test_configured_action_order_is_followed() {
    let temp = TempDir::new().unwrap();
    let mut config = test_config(&temp);
    config.session.action_order = vec![ActionKind::Comment, ActionKind::Like, ActionKind::Follow];

    let surface = Arc::new(MockSurface::success());
    let mut orchestrator = build(
        config,
        surface.clone(),
        Arc::new(MockGenerator::returning("Nice!")),
        &["a"],
    );
    orchestrator.run(None).await.unwrap();

    let kinds: Vec<_> = surface.calls().into_iter().map(|(kind, _)| kind).collect();
    assert_eq!(kinds, vec![ActionKind::Comment, ActionKind::Like, ActionKind::Follow]);
}

#[tokio::test]
async fn test_invalid_action_order_is_rejected() {
    let temp = TempDir::new().unwrap();
    let mut config = test_config(&temp);
    config.session.action_order = vec![ActionKind::Follow, ActionKind::Like];

    let result = DailyOrchestrator::new(
        config,
        Collaborators {
            surface: Arc::new(MockSurface::success()),
            generator: Arc::new(MockGenerator::returning("Nice!")),
            source: Arc::new(source(&["a"])),
            clock: Arc::new(ManualClock::at_noon(today())),
        },
    );

    match result {
        Err(e) => assert_eq!(e.exit_code(), 2),
        Ok(_) => panic!("Follow before Like must be rejected"),
    }
}

#[tokio::test]
async fn test_posts_are_never_followed() {
    let temp = TempDir::new().unwrap();
    let config = test_config(&temp);
    let surface = Arc::new(MockSurface::success());
    let mut orchestrator = DailyOrchestrator::new(
        config.clone(),
        Collaborators {
            surface: surface.clone(),
            generator: Arc::new(MockGenerator::returning("Nice!")),
            source: Arc::new(
                MockSource::new().with_hashtag("vegan", vec![Candidate::post("CxPost1")]),
            ),
            clock: Arc::new(ManualClock::at_noon(today())),
        },
    )
    .unwrap();

    orchestrator.run(None).await.unwrap();

    let checkpoint = read_checkpoint(&config);
    assert_eq!(
        pairs(&checkpoint),
        vec![
            (ActionKind::Like, "CxPost1".to_string()),
            (ActionKind::Comment, "CxPost1".to_string()),
        ]
    );
    assert!(checkpoint.processed_targets.contains("CxPost1"));
}

#[tokio::test]
async fn test_counters_never_pass_caps_and_match_replay() {
    let temp = TempDir::new().unwrap();
    let mut config = test_config(&temp);
    config.limits.follows_per_day = 2;
    config.limits.likes_per_day = 3;
    config.limits.comments_per_day = 1;
    let users = ["a", "b", "c", "d", "e", "f"];

    let mut orchestrator = build(
        config.clone(),
        Arc::new(MockSurface::success()),
        Arc::new(MockGenerator::returning("Nice!")),
        &users,
    );
    orchestrator.run(None).await.unwrap();

    let checkpoint = read_checkpoint(&config);
    let replayed = DailyCounters::from_records(&checkpoint.action_log);
    assert_eq!(replayed, checkpoint.daily_counters);
    assert_eq!(replayed.get(ActionKind::Follow), 2);
    assert_eq!(replayed.get(ActionKind::Like), 3);
    assert_eq!(replayed.get(ActionKind::Comment), 1);

    let unique: HashSet<_> = pairs(&checkpoint).into_iter().collect();
    assert_eq!(unique.len(), checkpoint.action_log.len(), "No duplicate (kind, target)");
}

#[tokio::test]
async fn test_already_done_targets_are_recorded_as_skipped() {
    let temp = TempDir::new().unwrap();
    let mut config = test_config(&temp);
    config.session.action_order = vec![ActionKind::Like, ActionKind::Follow];
    let surface = Arc::new(MockSurface::success().already_done("a"));

    let mut orchestrator = build(
        config.clone(),
        surface,
        Arc::new(MockGenerator::returning("Nice!")),
        &["a"],
    );
    let report = orchestrator.run(None).await.unwrap();

    let checkpoint = read_checkpoint(&config);
    assert!(checkpoint
        .action_log
        .iter()
        .all(|r| r.outcome == Outcome::Skipped));
    assert!(checkpoint.daily_counters.is_zero());
    assert_eq!(report.stats.total.skipped, 2);
}

#[tokio::test]
async fn test_empty_discovery_completes_immediately() {
    let temp = TempDir::new().unwrap();
    let config = test_config(&temp);
    let surface = Arc::new(MockSurface::success());
    let mut orchestrator = build(
        config.clone(),
        surface.clone(),
        Arc::new(MockGenerator::returning("Nice!")),
        &[],
    );

    let report = orchestrator.run(None).await.unwrap();
    assert_eq!(
        report.outcome,
        RunOutcome::Completed(CompletionReason::DiscoveryExhausted)
    );
    assert_eq!(surface.call_count(), 0);

    let stats_path = report.stats_path.expect("completed runs write stats");
    let stats: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(stats_path).unwrap()).unwrap();
    assert_eq!(stats["date"], "2025-06-01");
}
