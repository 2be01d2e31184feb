//! Action executors
//!
//! One executor per [`ActionKind`]. Each performs a single unit of engagement
//! through the automation surface and always returns an [`ActionRecord`];
//! faults from the surface, the generator or a timeout are captured in the
//! record and never propagate.

use std::future::Future;
use std::time::Duration;

use tokio::time::timeout;
use tracing::{debug, warn};

use crate::automation::{AutomationSurface, IntentReport, PostContext, SurfaceResult};
use crate::clock::Clock;
use crate::config::CommentsConfig;
use crate::error::GenerationError;
use crate::generation::{sanitize_generated, CommentContext, TextGenerator};
use crate::types::{ActionError, ActionKind, ActionRecord, ErrorCategory, Target};

/// Collaborators and bounds for one dispatch
pub struct ExecutionContext<'a> {
    pub surface: &'a dyn AutomationSurface,
    pub generator: &'a dyn TextGenerator,
    pub clock: &'a dyn Clock,
    pub comments: &'a CommentsConfig,
    /// Bound on each call into the automation surface
    pub action_timeout: Duration,
    /// Template offered to the generator and used as fallback text
    pub template_hint: &'a str,
}

/// Closed set of executors, one per action kind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Executor {
    Follow,
    Like,
    Comment,
}

impl Executor {
    pub fn for_kind(kind: ActionKind) -> Self {
        match kind {
            ActionKind::Follow => Executor::Follow,
            ActionKind::Like => Executor::Like,
            ActionKind::Comment => Executor::Comment,
        }
    }

    pub fn kind(&self) -> ActionKind {
        match self {
            Executor::Follow => ActionKind::Follow,
            Executor::Like => ActionKind::Like,
            Executor::Comment => ActionKind::Comment,
        }
    }

    /// Perform the action against `target` and describe what happened
    pub async fn execute(&self, target: &Target, ctx: &ExecutionContext<'_>) -> ActionRecord {
        match self {
            Executor::Follow => {
                run_intent(ctx, ActionKind::Follow, target, ctx.surface.follow_user(target)).await
            }
            Executor::Like => {
                run_intent(ctx, ActionKind::Like, target, ctx.surface.like_post(target)).await
            }
            Executor::Comment => execute_comment(target, ctx).await,
        }
    }
}

async fn run_intent<F>(
    ctx: &ExecutionContext<'_>,
    kind: ActionKind,
    target: &Target,
    intent: F,
) -> ActionRecord
where
    F: Future<Output = SurfaceResult<IntentReport>>,
{
    let result = timeout(ctx.action_timeout, intent).await;
    let now = ctx.clock.now();

    match result {
        Err(_) => {
            warn!(
                "{} on {} timed out after {}",
                kind,
                target.id,
                humantime::format_duration(ctx.action_timeout)
            );
            ActionRecord::failure(&target.id, kind, ActionError::timeout(), now)
        }
        Ok(Err(e)) => {
            warn!("{} on {} failed: {}", kind, target.id, e);
            ActionRecord::failure(
                &target.id,
                kind,
                ActionError::new(ErrorCategory::ExecutionFailure, e.to_string()),
                now,
            )
        }
        Ok(Ok(report)) if report.applied => {
            ActionRecord::success(&target.id, kind, now).with_diagnostic(report.diagnostic)
        }
        Ok(Ok(report)) => {
            debug!("{} on {} already done", kind, target.id);
            ActionRecord::skipped(&target.id, kind, now).with_diagnostic(report.diagnostic)
        }
    }
}

async fn execute_comment(target: &Target, ctx: &ExecutionContext<'_>) -> ActionRecord {
    let post = match timeout(ctx.action_timeout, ctx.surface.read_post_context(target)).await {
        Ok(Ok(post)) => post,
        Ok(Err(e)) => {
            warn!("Could not read post context for {}: {}", target.id, e);
            PostContext::default()
        }
        Err(_) => {
            warn!("Reading post context for {} timed out", target.id);
            PostContext::default()
        }
    };

    let context = CommentContext::new(post, ctx.comments);
    let (text, degradation) = match generate(ctx, &context).await {
        Ok(text) => (text, None),
        Err(e) => {
            warn!(
                "Comment generation for {} failed, using template: {}",
                target.id, e
            );
            (
                fallback_text(ctx.template_hint, ctx.comments.max_chars),
                Some(ActionError::new(
                    ErrorCategory::GenerationFailure,
                    e.to_string(),
                )),
            )
        }
    };

    let record = run_intent(
        ctx,
        ActionKind::Comment,
        target,
        ctx.surface.submit_comment(target, &text),
    )
    .await;
    record.with_comment(text, degradation)
}

async fn generate(
    ctx: &ExecutionContext<'_>,
    context: &CommentContext,
) -> Result<String, GenerationError> {
    let bound = ctx.comments.generation_timeout();
    match timeout(bound, ctx.generator.generate_comment(context, ctx.template_hint)).await {
        Ok(Ok(text)) => sanitize_generated(&text, context.max_chars),
        Ok(Err(e)) => Err(e),
        Err(_) => Err(GenerationError::Timeout(bound)),
    }
}

fn fallback_text(template: &str, max_chars: usize) -> String {
    template.trim().chars().take(max_chars).collect()
}
