//! Mock collaborators for testing
//!
//! Configurable stand-ins for the automation surface, the text generator and
//! the discovery source. They are compiled into every build so integration
//! tests can script failures, delays and already-done targets, and then
//! inspect what the orchestrator asked for.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::sleep;

use crate::automation::{AutomationSurface, IntentReport, PostContext, SurfaceResult};
use crate::discovery::{Candidate, TargetSource};
use crate::error::{AutomationError, DiscoveryError, GenerationError};
use crate::generation::{CommentContext, TextGenerator};
use crate::types::{ActionKind, DiscoverySource, Target};

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

/// Mock automation surface
#[derive(Debug, Default)]
pub struct MockSurface {
    /// Error returned by every intent of the given kind
    failures: HashMap<ActionKind, AutomationError>,
    /// Targets already followed/liked; intents on them report not applied
    already_done: HashSet<String>,
    /// Delay before every intent completes
    delay: Duration,
    context: PostContext,
    context_error: Option<AutomationError>,
    calls: Arc<Mutex<Vec<(ActionKind, String)>>>,
    comments: Arc<Mutex<Vec<(String, String)>>>,
}

impl MockSurface {
    /// Surface that accepts every intent
    pub fn success() -> Self {
        Self::default()
    }

    /// Surface that fails every intent with `error`
    pub fn failing(error: AutomationError) -> Self {
        let mut surface = Self::default();
        for kind in ActionKind::ALL {
            surface.failures.insert(kind, error.clone());
        }
        surface
    }

    /// Surface whose intents never finish within a short timeout
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay,
            ..Default::default()
        }
    }

    pub fn fail_kind(mut self, kind: ActionKind, error: AutomationError) -> Self {
        self.failures.insert(kind, error);
        self
    }

    pub fn already_done(mut self, target_id: &str) -> Self {
        self.already_done.insert(target_id.to_string());
        self
    }

    pub fn with_context(mut self, context: PostContext) -> Self {
        self.context = context;
        self
    }

    pub fn failing_context(mut self, error: AutomationError) -> Self {
        self.context_error = Some(error);
        self
    }

    /// Intents in the order they were issued, including failed ones
    pub fn calls(&self) -> Vec<(ActionKind, String)> {
        lock(&self.calls).clone()
    }

    pub fn call_count(&self) -> usize {
        lock(&self.calls).len()
    }

    /// `(target, text)` pairs submitted as comments
    pub fn comments(&self) -> Vec<(String, String)> {
        lock(&self.comments).clone()
    }

    async fn intent(&self, kind: ActionKind, target: &Target) -> SurfaceResult<IntentReport> {
        lock(&self.calls).push((kind, target.id.clone()));

        if !self.delay.is_zero() {
            sleep(self.delay).await;
        }
        if let Some(error) = self.failures.get(&kind) {
            return Err(error.clone());
        }
        if kind != ActionKind::Comment && self.already_done.contains(&target.id) {
            return Ok(IntentReport::already_done(format!("{} already done", kind)));
        }
        Ok(IntentReport::applied().with_diagnostic("mock"))
    }
}

#[async_trait]
impl AutomationSurface for MockSurface {
    fn name(&self) -> &str {
        "mock"
    }

    async fn follow_user(&self, target: &Target) -> SurfaceResult<IntentReport> {
        self.intent(ActionKind::Follow, target).await
    }

    async fn like_post(&self, target: &Target) -> SurfaceResult<IntentReport> {
        self.intent(ActionKind::Like, target).await
    }

    async fn read_post_context(&self, _target: &Target) -> SurfaceResult<PostContext> {
        match &self.context_error {
            Some(error) => Err(error.clone()),
            None => Ok(self.context.clone()),
        }
    }

    async fn submit_comment(&self, target: &Target, text: &str) -> SurfaceResult<IntentReport> {
        let report = self.intent(ActionKind::Comment, target).await?;
        lock(&self.comments).push((target.id.clone(), text.to_string()));
        Ok(report)
    }
}

/// Mock text generator
#[derive(Debug)]
pub struct MockGenerator {
    response: Result<String, GenerationError>,
    delay: Duration,
    call_count: Arc<Mutex<usize>>,
}

impl MockGenerator {
    pub fn returning(text: &str) -> Self {
        Self {
            response: Ok(text.to_string()),
            delay: Duration::ZERO,
            call_count: Arc::new(Mutex::new(0)),
        }
    }

    pub fn failing(error: GenerationError) -> Self {
        Self {
            response: Err(error),
            delay: Duration::ZERO,
            call_count: Arc::new(Mutex::new(0)),
        }
    }

    pub fn with_delay(text: &str, delay: Duration) -> Self {
        Self {
            delay,
            ..Self::returning(text)
        }
    }

    pub fn call_count(&self) -> usize {
        *lock(&self.call_count)
    }
}

#[async_trait]
impl TextGenerator for MockGenerator {
    fn name(&self) -> &str {
        "mock"
    }

    async fn generate_comment(
        &self,
        _context: &CommentContext,
        _template_hint: &str,
    ) -> Result<String, GenerationError> {
        *lock(&self.call_count) += 1;
        if !self.delay.is_zero() {
            sleep(self.delay).await;
        }
        self.response.clone()
    }
}

/// Mock discovery source with scripted candidates per query
#[derive(Debug, Default)]
pub struct MockSource {
    results: HashMap<DiscoverySource, Vec<Candidate>>,
    failing: HashSet<String>,
    /// `None` returns the whole list on page 0
    page_size: Option<usize>,
    fetch_count: Arc<Mutex<usize>>,
}

impl MockSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_hashtag(mut self, tag: &str, candidates: Vec<Candidate>) -> Self {
        self.results
            .insert(DiscoverySource::Hashtag(tag.to_string()), candidates);
        self
    }

    pub fn with_competitor(mut self, account: &str, candidates: Vec<Candidate>) -> Self {
        self.results.insert(
            DiscoverySource::CompetitorFollower(account.to_string()),
            candidates,
        );
        self
    }

    /// Every fetch for this hashtag or competitor fails
    pub fn failing_on(mut self, name: &str) -> Self {
        self.failing.insert(name.to_string());
        self
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = Some(page_size.max(1));
        self
    }

    pub fn fetch_count(&self) -> usize {
        *lock(&self.fetch_count)
    }
}

#[async_trait]
impl TargetSource for MockSource {
    fn name(&self) -> &str {
        "mock"
    }

    async fn fetch(
        &self,
        query: &DiscoverySource,
        page: usize,
    ) -> Result<Vec<Candidate>, DiscoveryError> {
        *lock(&self.fetch_count) += 1;

        let name = match query {
            DiscoverySource::Hashtag(tag) => tag,
            DiscoverySource::CompetitorFollower(account) => account,
        };
        if self.failing.contains(name) {
            return Err(DiscoveryError::Source {
                source_name: "mock".to_string(),
                message: format!("scripted failure for {}", query),
            });
        }

        let list = self.results.get(query).cloned().unwrap_or_default();
        Ok(match self.page_size {
            None if page == 0 => list,
            None => Vec::new(),
            Some(size) => list.into_iter().skip(page * size).take(size).collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn target(id: &str) -> Target {
        Target::user(id, DiscoverySource::Hashtag("t".into()), Utc::now())
    }

    #[tokio::test]
    async fn test_mock_surface_records_calls() {
        let surface = MockSurface::success().already_done("bob");
        assert!(surface.like_post(&target("alice")).await.unwrap().applied);
        assert!(!surface.follow_user(&target("bob")).await.unwrap().applied);
        surface.submit_comment(&target("alice"), "hi").await.unwrap();

        assert_eq!(
            surface.calls(),
            vec![
                (ActionKind::Like, "alice".to_string()),
                (ActionKind::Follow, "bob".to_string()),
                (ActionKind::Comment, "alice".to_string()),
            ]
        );
        assert_eq!(surface.comments(), vec![("alice".to_string(), "hi".to_string())]);
    }

    #[tokio::test]
    async fn test_mock_surface_fail_kind() {
        let surface = MockSurface::success()
            .fail_kind(ActionKind::Follow, AutomationError::Rejected("blocked".into()));
        assert!(surface.like_post(&target("a")).await.is_ok());
        assert!(surface.follow_user(&target("a")).await.is_err());
        assert_eq!(surface.call_count(), 2);
    }

    #[tokio::test]
    async fn test_mock_source_paging() {
        let source = MockSource::new()
            .with_hashtag("t", (0..5).map(|i| Candidate::user(format!("u{}", i), 1)).collect())
            .with_page_size(2);
        let query = DiscoverySource::Hashtag("t".into());
        assert_eq!(source.fetch(&query, 0).await.unwrap().len(), 2);
        assert_eq!(source.fetch(&query, 2).await.unwrap().len(), 1);
        assert!(source.fetch(&query, 3).await.unwrap().is_empty());
        assert_eq!(source.fetch_count(), 3);
    }

    #[tokio::test]
    async fn test_mock_generator_counts_calls() {
        let generator = MockGenerator::failing(GenerationError::Empty);
        let ctx = CommentContext::new(PostContext::default(), &Default::default());
        assert!(generator.generate_comment(&ctx, "hint").await.is_err());
        assert_eq!(generator.call_count(), 1);
    }
}
