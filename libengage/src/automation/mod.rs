//! Automation surface abstraction
//!
//! The orchestrator never drives a browser directly. It issues intents
//! (follow this user, like this post, comment on this post) through the
//! [`AutomationSurface`] trait and receives a report or an [`AutomationError`].
//!
//! [`browser::BrowserSurface`] implements the intents on top of the primitive
//! capability trait [`browser::BrowserDriver`]. [`DryRunSurface`] logs intents
//! without acting.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::AutomationError;
use crate::types::Target;

pub mod browser;
pub mod dry_run;

pub use dry_run::DryRunSurface;

pub type SurfaceResult<T> = std::result::Result<T, AutomationError>;

/// What the surface observed after carrying out an intent
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntentReport {
    /// False when the target was already in the requested state
    /// (already following, post already liked)
    pub applied: bool,
    pub diagnostic: Option<String>,
}

impl IntentReport {
    pub fn applied() -> Self {
        Self {
            applied: true,
            diagnostic: None,
        }
    }

    pub fn already_done(diagnostic: impl Into<String>) -> Self {
        Self {
            applied: false,
            diagnostic: Some(diagnostic.into()),
        }
    }

    pub fn with_diagnostic(mut self, diagnostic: impl Into<String>) -> Self {
        self.diagnostic = Some(diagnostic.into());
        self
    }
}

/// Content context handed to the comment generator
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostContext {
    pub author: Option<String>,
    pub caption: Option<String>,
}

/// Intent-level access to the platform.
///
/// For a user target, `like_post`, `read_post_context` and `submit_comment`
/// act on that user's most recent post.
#[async_trait]
pub trait AutomationSurface: Send + Sync {
    /// Surface name for logs
    fn name(&self) -> &str;

    async fn follow_user(&self, target: &Target) -> SurfaceResult<IntentReport>;

    async fn like_post(&self, target: &Target) -> SurfaceResult<IntentReport>;

    async fn read_post_context(&self, target: &Target) -> SurfaceResult<PostContext>;

    async fn submit_comment(&self, target: &Target, text: &str) -> SurfaceResult<IntentReport>;
}
