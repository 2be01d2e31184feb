//! Surface that logs intents instead of performing them

use async_trait::async_trait;
use tracing::info;

use super::{AutomationSurface, IntentReport, PostContext, SurfaceResult};
use crate::types::{Target, TargetKind};

#[derive(Debug, Default, Clone)]
pub struct DryRunSurface {
    headless: bool,
}

impl DryRunSurface {
    pub fn new(headless: bool) -> Self {
        Self { headless }
    }
}

#[async_trait]
impl AutomationSurface for DryRunSurface {
    fn name(&self) -> &str {
        "dry-run"
    }

    async fn follow_user(&self, target: &Target) -> SurfaceResult<IntentReport> {
        info!("[dry-run] follow {} ({})", target.id, target.source);
        Ok(IntentReport::applied().with_diagnostic("dry-run"))
    }

    async fn like_post(&self, target: &Target) -> SurfaceResult<IntentReport> {
        info!("[dry-run] like latest post of {} ({})", target.id, target.source);
        Ok(IntentReport::applied().with_diagnostic("dry-run"))
    }

    async fn read_post_context(&self, target: &Target) -> SurfaceResult<PostContext> {
        Ok(PostContext {
            author: (target.kind == TargetKind::User).then(|| target.id.clone()),
            caption: None,
        })
    }

    async fn submit_comment(&self, target: &Target, text: &str) -> SurfaceResult<IntentReport> {
        info!(
            "[dry-run] comment on {} (headless={}): {}",
            target.id, self.headless, text
        );
        Ok(IntentReport::applied().with_diagnostic("dry-run"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::DiscoverySource;
    use chrono::Utc;

    #[tokio::test]
    async fn test_dry_run_reports_applied() {
        let surface = DryRunSurface::new(true);
        let target = Target::user("erin", DiscoverySource::Hashtag("rust".into()), Utc::now());

        let report = surface.follow_user(&target).await.unwrap();
        assert!(report.applied);
        assert_eq!(report.diagnostic.as_deref(), Some("dry-run"));

        let ctx = surface.read_post_context(&target).await.unwrap();
        assert_eq!(ctx.author.as_deref(), Some("erin"));
    }
}
