//! Target discovery
//!
//! [`TargetDiscovery`] merges hashtag and competitor-follower queries into one
//! lazy, deduplicated stream of [`Target`]s. Queries take turns one page at a
//! time, so neither strategy starves the other, and every candidate goes
//! through the same [`QualityFilter`] whatever its source.
//!
//! The stream can be restarted from the beginning but has no resumable cursor.
//! Resume is the orchestrator's job, via its processed-target set.

use async_trait::async_trait;
use serde::Deserialize;
use std::collections::{HashMap, HashSet, VecDeque};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::config::DiscoveryConfig;
use crate::error::DiscoveryError;
use crate::types::{DiscoverySource, Target, TargetKind};

/// A raw candidate as returned by a source, before filtering
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Candidate {
    pub id: String,
    #[serde(default = "default_candidate_kind")]
    pub kind: TargetKind,
    #[serde(default)]
    pub follower_count: Option<u64>,
    #[serde(default)]
    pub is_private: bool,
}

fn default_candidate_kind() -> TargetKind {
    TargetKind::User
}

impl Candidate {
    pub fn user(id: impl Into<String>, follower_count: u64) -> Self {
        Self {
            id: id.into(),
            kind: TargetKind::User,
            follower_count: Some(follower_count),
            is_private: false,
        }
    }

    pub fn post(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: TargetKind::Post,
            follower_count: None,
            is_private: false,
        }
    }

    pub fn private(mut self) -> Self {
        self.is_private = true;
        self
    }
}

/// Scraping backend for hashtag and competitor-follower queries
#[async_trait]
pub trait TargetSource: Send + Sync {
    fn name(&self) -> &str;

    /// Fetch one page of candidates for `query`. An empty page means the
    /// query has nothing more to offer.
    async fn fetch(
        &self,
        query: &DiscoverySource,
        page: usize,
    ) -> std::result::Result<Vec<Candidate>, DiscoveryError>;
}

/// Config-driven quality heuristic, applied identically to every source
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QualityFilter {
    pub min_followers: u64,
    pub max_followers: Option<u64>,
    pub allow_private: bool,
}

impl QualityFilter {
    pub fn from_config(config: &DiscoveryConfig) -> Self {
        Self {
            min_followers: config.min_followers,
            max_followers: config.max_followers,
            allow_private: config.allow_private,
        }
    }

    /// An unknown follower count only passes when no minimum is set
    pub fn accepts(&self, candidate: &Candidate) -> bool {
        if candidate.is_private && !self.allow_private {
            return false;
        }
        match candidate.follower_count {
            Some(count) => {
                count >= self.min_followers && self.max_followers.map_or(true, |max| count <= max)
            }
            None => self.min_followers == 0,
        }
    }
}

/// Canonical form of a raw identifier.
///
/// Leading `@`/`#` and trailing `/` are stripped and only the first path
/// segment is kept. User names are case-insensitive and get lowercased; post
/// shortcodes keep their case. Returns `None` when nothing is left.
pub fn normalize_identifier(raw: &str, kind: TargetKind) -> Option<String> {
    let trimmed = raw
        .trim()
        .trim_start_matches(['@', '#'])
        .trim_matches('/');
    let first = trimmed.split('/').next().unwrap_or("").trim();
    if first.is_empty() {
        return None;
    }
    Some(match kind {
        TargetKind::User => first.to_lowercase(),
        TargetKind::Post => first.to_string(),
    })
}

/// Build the query list, alternating hashtags and competitors
fn interleave_queries(config: &DiscoveryConfig) -> Vec<DiscoverySource> {
    let hashtags: Vec<_> = config
        .hashtags
        .iter()
        .filter_map(|h| normalize_identifier(h, TargetKind::User))
        .map(DiscoverySource::Hashtag)
        .collect();
    let competitors: Vec<_> = config
        .competitors
        .iter()
        .filter_map(|c| normalize_identifier(c, TargetKind::User))
        .map(DiscoverySource::CompetitorFollower)
        .collect();

    let mut queries = Vec::with_capacity(hashtags.len() + competitors.len());
    let mut h = hashtags.into_iter();
    let mut c = competitors.into_iter();
    loop {
        match (h.next(), c.next()) {
            (None, None) => break,
            (a, b) => queries.extend(a.into_iter().chain(b)),
        }
    }
    queries.dedup();
    queries
}

#[derive(Debug)]
struct QueryCursor {
    query: DiscoverySource,
    page: usize,
    taken: usize,
    done: bool,
}

impl QueryCursor {
    fn new(query: DiscoverySource) -> Self {
        Self {
            query,
            page: 0,
            taken: 0,
            done: false,
        }
    }

    fn reset(&mut self) {
        self.page = 0;
        self.taken = 0;
        self.done = false;
    }
}

/// Lazy, deduplicated, filtered stream of targets
pub struct TargetDiscovery {
    source: Arc<dyn TargetSource>,
    clock: Arc<dyn Clock>,
    filter: QualityFilter,
    max_per_source: usize,
    max_rounds: u32,
    cursors: Vec<QueryCursor>,
    turn: usize,
    round: u32,
    found_this_round: usize,
    seen: HashSet<(TargetKind, String)>,
    buffer: VecDeque<Target>,
    exhausted: bool,
}

impl TargetDiscovery {
    pub fn new(
        source: Arc<dyn TargetSource>,
        config: &DiscoveryConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let cursors: Vec<_> = interleave_queries(config)
            .into_iter()
            .map(QueryCursor::new)
            .collect();
        let exhausted = cursors.is_empty();
        Self {
            source,
            clock,
            filter: QualityFilter::from_config(config),
            max_per_source: config.max_per_source.max(1),
            max_rounds: config.max_rounds,
            cursors,
            turn: 0,
            round: 0,
            found_this_round: 0,
            seen: HashSet::new(),
            buffer: VecDeque::new(),
            exhausted,
        }
    }

    pub fn rounds_completed(&self) -> u32 {
        self.round
    }

    pub fn is_exhausted(&self) -> bool {
        self.exhausted && self.buffer.is_empty()
    }

    /// Forget everything and start over from the first query
    pub fn restart(&mut self) {
        for cursor in &mut self.cursors {
            cursor.reset();
        }
        self.turn = 0;
        self.round = 0;
        self.found_this_round = 0;
        self.seen.clear();
        self.buffer.clear();
        self.exhausted = self.cursors.is_empty();
    }

    /// Next target, or `None` once every round is spent
    pub async fn next(&mut self) -> Option<Target> {
        loop {
            if let Some(target) = self.buffer.pop_front() {
                return Some(target);
            }
            if self.exhausted {
                return None;
            }
            if self.cursors.iter().all(|c| c.done) {
                self.finish_round();
                continue;
            }

            let idx = self.turn;
            self.turn = (self.turn + 1) % self.cursors.len();
            if !self.cursors[idx].done {
                self.pull_page(idx).await;
            }
        }
    }

    fn finish_round(&mut self) {
        self.round += 1;
        let out_of_rounds = self.max_rounds != 0 && self.round >= self.max_rounds;
        if self.found_this_round == 0 || out_of_rounds {
            info!(
                "Discovery exhausted after {} round(s), {} unique candidates",
                self.round,
                self.seen.len()
            );
            self.exhausted = true;
            return;
        }

        debug!(
            "Discovery round {} found {} candidates, re-querying",
            self.round, self.found_this_round
        );
        self.found_this_round = 0;
        self.turn = 0;
        for cursor in &mut self.cursors {
            cursor.reset();
        }
    }

    async fn pull_page(&mut self, idx: usize) {
        let (query, page) = {
            let cursor = &self.cursors[idx];
            (cursor.query.clone(), cursor.page)
        };

        let candidates = match self.source.fetch(&query, page).await {
            Ok(candidates) => candidates,
            Err(e) => {
                warn!("Discovery query {} failed, skipping it: {}", query, e);
                self.cursors[idx].done = true;
                return;
            }
        };

        if candidates.is_empty() {
            debug!("Discovery query {} exhausted at page {}", query, page);
            self.cursors[idx].done = true;
            return;
        }
        self.cursors[idx].page += 1;

        let now = self.clock.now();
        for candidate in candidates {
            if self.cursors[idx].taken >= self.max_per_source {
                break;
            }
            if !self.filter.accepts(&candidate) {
                debug!("Filtered out {} from {}", candidate.id, query);
                continue;
            }
            let Some(id) = normalize_identifier(&candidate.id, candidate.kind) else {
                continue;
            };
            if !self.seen.insert((candidate.kind, id.clone())) {
                continue;
            }

            let target = match candidate.kind {
                TargetKind::User => Target::user(id, query.clone(), now),
                TargetKind::Post => Target::post(id, query.clone(), now),
            };
            self.buffer.push_back(target);
            self.cursors[idx].taken += 1;
            self.found_this_round += 1;
        }

        if self.cursors[idx].taken >= self.max_per_source {
            self.cursors[idx].done = true;
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct SeedFile {
    page_size: Option<usize>,
    hashtags: HashMap<String, Vec<Candidate>>,
    competitors: HashMap<String, Vec<Candidate>>,
}

/// Source backed by a JSON file of pre-scraped candidates.
///
/// ```json
/// {
///   "page_size": 20,
///   "hashtags": { "veganfitness": [{ "id": "alice", "follower_count": 1200 }] },
///   "competitors": { "rival": [{ "id": "bob", "is_private": true }] }
/// }
/// ```
#[derive(Debug)]
pub struct SeedFileSource {
    page_size: usize,
    hashtags: HashMap<String, Vec<Candidate>>,
    competitors: HashMap<String, Vec<Candidate>>,
}

impl SeedFileSource {
    const DEFAULT_PAGE_SIZE: usize = 20;

    pub fn load(path: &Path) -> std::result::Result<Self, DiscoveryError> {
        let seed_error = |message: String| DiscoveryError::SeedFile {
            path: path.display().to_string(),
            message,
        };
        let content = std::fs::read_to_string(path).map_err(|e| seed_error(e.to_string()))?;
        Self::from_json(&content).map_err(|e| match e {
            DiscoveryError::SeedFile { message, .. } => seed_error(message),
            other => other,
        })
    }

    pub fn from_json(content: &str) -> std::result::Result<Self, DiscoveryError> {
        let seed: SeedFile = serde_json::from_str(content).map_err(|e| DiscoveryError::SeedFile {
            path: "<inline>".to_string(),
            message: e.to_string(),
        })?;

        let normalize_keys = |map: HashMap<String, Vec<Candidate>>| {
            map.into_iter()
                .filter_map(|(k, v)| normalize_identifier(&k, TargetKind::User).map(|k| (k, v)))
                .collect::<HashMap<_, _>>()
        };

        Ok(Self {
            page_size: seed.page_size.unwrap_or(Self::DEFAULT_PAGE_SIZE).max(1),
            hashtags: normalize_keys(seed.hashtags),
            competitors: normalize_keys(seed.competitors),
        })
    }

    pub fn candidate_count(&self) -> usize {
        self.hashtags.values().chain(self.competitors.values()).map(Vec::len).sum()
    }
}

#[async_trait]
impl TargetSource for SeedFileSource {
    fn name(&self) -> &str {
        "seed-file"
    }

    async fn fetch(
        &self,
        query: &DiscoverySource,
        page: usize,
    ) -> std::result::Result<Vec<Candidate>, DiscoveryError> {
        let list = match query {
            DiscoverySource::Hashtag(tag) => self.hashtags.get(tag),
            DiscoverySource::CompetitorFollower(account) => self.competitors.get(account),
        };
        let Some(list) = list else {
            return Ok(Vec::new());
        };

        let start = page.saturating_mul(self.page_size);
        Ok(list
            .iter()
            .skip(start)
            .take(self.page_size)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::mock::MockSource;
    use chrono::NaiveDate;

    fn clock() -> Arc<dyn Clock> {
        Arc::new(ManualClock::at_noon(
            NaiveDate::from_ymd_opt(2025, 6, 1).unwrap(),
        ))
    }

    fn config(hashtags: &[&str], competitors: &[&str]) -> DiscoveryConfig {
        DiscoveryConfig {
            hashtags: hashtags.iter().map(|s| s.to_string()).collect(),
            competitors: competitors.iter().map(|s| s.to_string()).collect(),
            ..DiscoveryConfig::default()
        }
    }

    async fn drain(discovery: &mut TargetDiscovery) -> Vec<String> {
        let mut ids = Vec::new();
        while let Some(target) = discovery.next().await {
            ids.push(target.id);
        }
        ids
    }

    #[test]
    fn test_normalize_identifier() {
        assert_eq!(normalize_identifier("@Alice/", TargetKind::User).as_deref(), Some("alice"));
        assert_eq!(
            normalize_identifier("/bob/reels/", TargetKind::User).as_deref(),
            Some("bob")
        );
        assert_eq!(normalize_identifier("#VeganFitness", TargetKind::User).as_deref(), Some("veganfitness"));
        assert_eq!(normalize_identifier("CxY12ab", TargetKind::Post).as_deref(), Some("CxY12ab"));
        assert_eq!(normalize_identifier(" @/ ", TargetKind::User), None);
    }

    #[test]
    fn test_quality_filter() {
        let filter = QualityFilter {
            min_followers: 100,
            max_followers: Some(10_000),
            allow_private: false,
        };
        assert!(filter.accepts(&Candidate::user("a", 100)));
        assert!(!filter.accepts(&Candidate::user("b", 99)));
        assert!(!filter.accepts(&Candidate::user("c", 10_001)));
        assert!(!filter.accepts(&Candidate::user("d", 500).private()));
        assert!(!filter.accepts(&Candidate::post("p1")), "Unknown count fails a minimum");

        let open = QualityFilter {
            min_followers: 0,
            max_followers: None,
            allow_private: true,
        };
        assert!(open.accepts(&Candidate::post("p1")));
        assert!(open.accepts(&Candidate::user("d", 0).private()));
    }

    #[test]
    fn test_queries_interleave_sources() {
        let queries = interleave_queries(&config(&["#a", "b", "c"], &["@x"]));
        assert_eq!(
            queries,
            vec![
                DiscoverySource::Hashtag("a".into()),
                DiscoverySource::CompetitorFollower("x".into()),
                DiscoverySource::Hashtag("b".into()),
                DiscoverySource::Hashtag("c".into()),
            ]
        );
    }

    #[tokio::test]
    async fn test_merges_and_dedupes_across_sources() {
        let source = MockSource::new()
            .with_hashtag("vegan", vec![Candidate::user("Alice", 10), Candidate::user("bob", 10)])
            .with_competitor("rival", vec![Candidate::user("@alice", 10), Candidate::user("carol", 10)]);
        let mut discovery = TargetDiscovery::new(
            Arc::new(source),
            &DiscoveryConfig {
                max_rounds: 1,
                ..config(&["vegan"], &["rival"])
            },
            clock(),
        );

        let ids = drain(&mut discovery).await;
        assert_eq!(ids, vec!["alice", "bob", "carol"]);
        assert!(discovery.is_exhausted());
    }

    #[tokio::test]
    async fn test_filter_applies_to_every_source() {
        let source = MockSource::new()
            .with_hashtag("vegan", vec![Candidate::user("small", 5), Candidate::user("big", 500)])
            .with_competitor("rival", vec![Candidate::user("tiny", 1), Candidate::user("huge", 900)]);
        let mut discovery = TargetDiscovery::new(
            Arc::new(source),
            &DiscoveryConfig {
                min_followers: 100,
                max_rounds: 1,
                ..config(&["vegan"], &["rival"])
            },
            clock(),
        );

        assert_eq!(drain(&mut discovery).await, vec!["big", "huge"]);
    }

    #[tokio::test]
    async fn test_max_per_source_bounds_each_query() {
        let many: Vec<_> = (0..10).map(|i| Candidate::user(format!("u{}", i), 10)).collect();
        let source = MockSource::new()
            .with_hashtag("a", many.clone())
            .with_hashtag("b", many.into_iter().map(|mut c| {
                c.id = format!("b-{}", c.id);
                c
            }).collect());
        let mut discovery = TargetDiscovery::new(
            Arc::new(source),
            &DiscoveryConfig {
                max_per_source: 3,
                max_rounds: 1,
                ..config(&["a", "b"], &[])
            },
            clock(),
        );

        let ids = drain(&mut discovery).await;
        assert_eq!(ids, vec!["u0", "u1", "u2", "b-u0", "b-u1", "b-u2"]);
    }

    #[tokio::test]
    async fn test_failing_query_is_skipped() {
        let source = MockSource::new()
            .with_hashtag("good", vec![Candidate::user("alice", 10)])
            .failing_on("bad");
        let mut discovery = TargetDiscovery::new(
            Arc::new(source),
            &config(&["bad", "good"], &[]),
            clock(),
        );

        assert_eq!(drain(&mut discovery).await, vec!["alice"]);
    }

    #[tokio::test]
    async fn test_requery_stops_when_round_finds_nothing_new() {
        let source = Arc::new(
            MockSource::new().with_hashtag("a", vec![Candidate::user("alice", 10)]),
        );
        let mut discovery = TargetDiscovery::new(
            source.clone(),
            &DiscoveryConfig {
                max_rounds: 0,
                ..config(&["a"], &[])
            },
            clock(),
        );

        assert_eq!(drain(&mut discovery).await, vec!["alice"]);
        assert_eq!(discovery.rounds_completed(), 2);
        assert!(source.fetch_count() >= 4, "Second round should re-query");
    }

    #[tokio::test]
    async fn test_restart_replays_from_the_beginning() {
        let source = MockSource::new().with_hashtag(
            "a",
            vec![Candidate::user("alice", 10), Candidate::user("bob", 10)],
        );
        let mut discovery = TargetDiscovery::new(Arc::new(source), &config(&["a"], &[]), clock());

        assert_eq!(discovery.next().await.map(|t| t.id).as_deref(), Some("alice"));
        discovery.restart();
        assert_eq!(drain(&mut discovery).await, vec!["alice", "bob"]);
    }

    #[tokio::test]
    async fn test_no_queries_is_immediately_exhausted() {
        let mut discovery =
            TargetDiscovery::new(Arc::new(MockSource::new()), &config(&[], &[]), clock());
        assert!(discovery.next().await.is_none());
    }

    #[tokio::test]
    async fn test_seed_file_source_pages() {
        let source = SeedFileSource::from_json(
            r##"{
                "page_size": 2,
                "hashtags": { "#Vegan": [
                    {"id": "a", "follower_count": 10},
                    {"id": "b"},
                    {"id": "CxPost", "kind": "post"}
                ] },
                "competitors": { "@rival": [{"id": "c", "is_private": true}] }
            }"##,
        )
        .unwrap();
        assert_eq!(source.candidate_count(), 4);

        let tag = DiscoverySource::Hashtag("vegan".into());
        assert_eq!(source.fetch(&tag, 0).await.unwrap().len(), 2);
        let second = source.fetch(&tag, 1).await.unwrap();
        assert_eq!(second, vec![Candidate::post("CxPost")]);
        assert!(source.fetch(&tag, 2).await.unwrap().is_empty());

        let rival = DiscoverySource::CompetitorFollower("rival".into());
        assert!(source.fetch(&rival, 0).await.unwrap()[0].is_private);
    }

    #[test]
    fn test_seed_file_load_reports_path() {
        let err = SeedFileSource::load(Path::new("/nonexistent/seed.json")).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/seed.json"));
    }
}
