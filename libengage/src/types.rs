//! Core types for Engagecast

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// The closed set of engagement actions
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    Follow,
    Like,
    Comment,
}

impl ActionKind {
    /// All kinds, engagement actions first
    pub const ALL: [ActionKind; 3] = [ActionKind::Like, ActionKind::Comment, ActionKind::Follow];

    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::Follow => "follow",
            ActionKind::Like => "like",
            ActionKind::Comment => "comment",
        }
    }

    /// Like and Comment engage with content; Follow does not.
    pub fn is_engagement(&self) -> bool {
        !matches!(self, ActionKind::Follow)
    }

    /// Whether this kind can be applied to a target of the given kind.
    /// Posts cannot be followed.
    pub fn applies_to(&self, target: TargetKind) -> bool {
        match (self, target) {
            (ActionKind::Follow, TargetKind::Post) => false,
            _ => true,
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for ActionKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "follow" | "follows" => Ok(ActionKind::Follow),
            "like" | "likes" => Ok(ActionKind::Like),
            "comment" | "comments" => Ok(ActionKind::Comment),
            _ => Err(format!(
                "Invalid action kind: '{}'. Valid options: follow, like, comment",
                s
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetKind {
    User,
    Post,
}

/// Where a target was discovered
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "name", rename_all = "snake_case")]
pub enum DiscoverySource {
    /// Posts and authors found under a hashtag (without `#`)
    Hashtag(String),
    /// Followers of a competitor account (without `@`)
    CompetitorFollower(String),
}

impl fmt::Display for DiscoverySource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DiscoverySource::Hashtag(tag) => write!(f, "#{}", tag),
            DiscoverySource::CompetitorFollower(account) => write!(f, "@{} followers", account),
        }
    }
}

/// A user or post selected for engagement. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Target {
    pub id: String,
    pub kind: TargetKind,
    pub source: DiscoverySource,
    pub discovered_at: DateTime<Utc>,
}

impl Target {
    pub fn user(id: impl Into<String>, source: DiscoverySource, discovered_at: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            kind: TargetKind::User,
            source,
            discovered_at,
        }
    }

    pub fn post(id: impl Into<String>, source: DiscoverySource, discovered_at: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            kind: TargetKind::Post,
            source,
            discovered_at,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Success,
    Failure,
    Skipped,
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Success => write!(f, "success"),
            Outcome::Failure => write!(f, "failure"),
            Outcome::Skipped => write!(f, "skipped"),
        }
    }
}

/// Attribution for a failed or degraded action
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// The automation surface rejected or errored the action
    ExecutionFailure,
    /// A blocking call exceeded its configured bound
    TimeoutFailure,
    /// Comment text generation failed and the fallback template was used
    GenerationFailure,
}

impl ErrorCategory {
    /// Whether this category counts toward the consecutive-failure threshold
    pub fn counts_as_failure(&self) -> bool {
        !matches!(self, ErrorCategory::GenerationFailure)
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorCategory::ExecutionFailure => write!(f, "execution_failure"),
            ErrorCategory::TimeoutFailure => write!(f, "timeout_failure"),
            ErrorCategory::GenerationFailure => write!(f, "generation_failure"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionError {
    pub category: ErrorCategory,
    pub message: String,
}

impl ActionError {
    pub fn new(category: ErrorCategory, message: impl Into<String>) -> Self {
        Self {
            category,
            message: message.into(),
        }
    }

    pub fn timeout() -> Self {
        Self::new(ErrorCategory::TimeoutFailure, "timeout")
    }
}

impl fmt::Display for ActionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.category, self.message)
    }
}

/// One attempted action, appended once to the session log and never mutated.
///
/// `error` is present iff `outcome` is `Failure`. `degradation` carries a
/// non-fatal annotation such as a comment posted with fallback text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionRecord {
    pub id: Uuid,
    pub target_id: String,
    pub kind: ActionKind,
    pub outcome: Outcome,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ActionError>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub degradation: Option<ActionError>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment_text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diagnostic: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl ActionRecord {
    fn base(target_id: &str, kind: ActionKind, outcome: Outcome, timestamp: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            target_id: target_id.to_string(),
            kind,
            outcome,
            error: None,
            degradation: None,
            comment_text: None,
            diagnostic: None,
            timestamp,
        }
    }

    pub fn success(target_id: &str, kind: ActionKind, timestamp: DateTime<Utc>) -> Self {
        Self::base(target_id, kind, Outcome::Success, timestamp)
    }

    pub fn failure(
        target_id: &str,
        kind: ActionKind,
        error: ActionError,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            error: Some(error),
            ..Self::base(target_id, kind, Outcome::Failure, timestamp)
        }
    }

    pub fn skipped(target_id: &str, kind: ActionKind, timestamp: DateTime<Utc>) -> Self {
        Self::base(target_id, kind, Outcome::Skipped, timestamp)
    }

    pub fn with_diagnostic(mut self, diagnostic: Option<String>) -> Self {
        self.diagnostic = diagnostic;
        self
    }

    pub fn with_comment(mut self, text: impl Into<String>, degradation: Option<ActionError>) -> Self {
        self.comment_text = Some(text.into());
        self.degradation = degradation;
        self
    }

    pub fn is_success(&self) -> bool {
        self.outcome == Outcome::Success
    }

    /// True when this record counts toward the consecutive-failure threshold
    pub fn is_failure(&self) -> bool {
        self.outcome == Outcome::Failure
    }

    /// Checks the error-iff-failure invariant
    pub fn is_well_formed(&self) -> bool {
        (self.outcome == Outcome::Failure) == self.error.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_action_kind_from_str() {
        assert_eq!("follow".parse::<ActionKind>().unwrap(), ActionKind::Follow);
        assert_eq!("Likes".parse::<ActionKind>().unwrap(), ActionKind::Like);
        assert_eq!("COMMENT".parse::<ActionKind>().unwrap(), ActionKind::Comment);
        assert!("retweet".parse::<ActionKind>().is_err());
    }

    #[test]
    fn test_follow_does_not_apply_to_posts() {
        assert!(!ActionKind::Follow.applies_to(TargetKind::Post));
        assert!(ActionKind::Follow.applies_to(TargetKind::User));
        assert!(ActionKind::Like.applies_to(TargetKind::Post));
        assert!(ActionKind::Comment.applies_to(TargetKind::User));
    }

    #[test]
    fn test_all_kinds_engage_before_follow() {
        let follow_pos = ActionKind::ALL
            .iter()
            .position(|k| *k == ActionKind::Follow)
            .unwrap();
        assert_eq!(follow_pos, ActionKind::ALL.len() - 1);
    }

    #[test]
    fn test_failure_record_carries_error() {
        let record = ActionRecord::failure(
            "alice",
            ActionKind::Like,
            ActionError::timeout(),
            Utc::now(),
        );
        assert!(record.is_failure());
        assert!(record.is_well_formed());
        assert_eq!(record.error.as_ref().unwrap().message, "timeout");
    }

    #[test]
    fn test_success_record_has_no_error() {
        let record = ActionRecord::success("alice", ActionKind::Follow, Utc::now());
        assert!(record.is_success());
        assert!(record.error.is_none());
        assert!(record.is_well_formed());
    }

    #[test]
    fn test_generation_failure_is_not_counted() {
        assert!(!ErrorCategory::GenerationFailure.counts_as_failure());
        assert!(ErrorCategory::TimeoutFailure.counts_as_failure());
        assert!(ErrorCategory::ExecutionFailure.counts_as_failure());
    }

    #[test]
    fn test_record_serializes_snake_case() {
        let record = ActionRecord::failure(
            "bob",
            ActionKind::Comment,
            ActionError::new(ErrorCategory::ExecutionFailure, "rejected"),
            Utc::now(),
        );
        let json = serde_json::to_string(&record).unwrap();
        assert!(json.contains("\"kind\":\"comment\""));
        assert!(json.contains("\"outcome\":\"failure\""));
        assert!(json.contains("\"category\":\"execution_failure\""));
        assert!(!json.contains("degradation"));
    }

    #[test]
    fn test_discovery_source_display() {
        assert_eq!(DiscoverySource::Hashtag("vegan".into()).to_string(), "#vegan");
        assert_eq!(
            DiscoverySource::CompetitorFollower("rival".into()).to_string(),
            "@rival followers"
        );
    }
}
