//! Intent surface built on primitive browser capabilities
//!
//! A [`BrowserDriver`] exposes navigate, find-element, click, type and
//! read-page-state. [`BrowserSurface`] turns those into follow/like/comment
//! intents and confirms each one by re-reading the page.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{AutomationSurface, IntentReport, PostContext, SurfaceResult};
use crate::config::BrowserConfig;
use crate::error::AutomationError;
use crate::types::{Target, TargetKind};

const MAX_CAPTION_CHARS: usize = 500;

/// Opaque reference to an element located by the driver
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ElementHandle(pub String);

/// Snapshot of the current page
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageState {
    pub url: String,
    pub title: String,
    pub visible_text: String,
}

/// Primitive browser capabilities
#[async_trait]
pub trait BrowserDriver: Send + Sync {
    async fn navigate(&self, url: &str) -> SurfaceResult<()>;

    /// Locate an element; `Ok(None)` when the selector matches nothing
    async fn find_element(&self, selector: &str) -> SurfaceResult<Option<ElementHandle>>;

    async fn click(&self, element: &ElementHandle) -> SurfaceResult<()>;

    async fn type_text(&self, element: &ElementHandle, text: &str) -> SurfaceResult<()>;

    async fn read_page_state(&self) -> SurfaceResult<PageState>;
}

/// Element selectors used by [`BrowserSurface`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Selectors {
    pub follow_button: String,
    pub following_indicator: String,
    pub first_post_link: String,
    pub like_button: String,
    pub liked_indicator: String,
    pub comment_input: String,
    pub comment_submit: String,
}

impl Default for Selectors {
    fn default() -> Self {
        Self {
            follow_button: "header button:has-text('Follow')".to_string(),
            following_indicator: "header button:has-text('Following')".to_string(),
            first_post_link: "article a[href*='/p/']".to_string(),
            like_button: "svg[aria-label='Like']".to_string(),
            liked_indicator: "svg[aria-label='Unlike']".to_string(),
            comment_input: "textarea[aria-label^='Add a comment']".to_string(),
            comment_submit: "div[role='button']:has-text('Post')".to_string(),
        }
    }
}

pub struct BrowserSurface<D> {
    driver: D,
    base_url: String,
    selectors: Selectors,
}

impl<D: BrowserDriver> BrowserSurface<D> {
    pub fn new(driver: D, config: &BrowserConfig) -> Self {
        Self {
            driver,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            selectors: config.selectors.clone(),
        }
    }

    pub fn driver(&self) -> &D {
        &self.driver
    }

    fn profile_url(&self, user: &str) -> String {
        format!("{}/{}/", self.base_url, user)
    }

    fn post_url(&self, post: &str) -> String {
        format!("{}/p/{}/", self.base_url, post)
    }

    async fn is_present(&self, selector: &str) -> SurfaceResult<bool> {
        Ok(self.driver.find_element(selector).await?.is_some())
    }

    async fn require(&self, selector: &str) -> SurfaceResult<ElementHandle> {
        self.driver
            .find_element(selector)
            .await?
            .ok_or_else(|| AutomationError::ElementNotFound(selector.to_string()))
    }

    /// Open the target post, or the most recent post of a user target
    async fn open_post(&self, target: &Target) -> SurfaceResult<()> {
        match target.kind {
            TargetKind::Post => self.driver.navigate(&self.post_url(&target.id)).await,
            TargetKind::User => {
                self.driver.navigate(&self.profile_url(&target.id)).await?;
                let link = self.require(&self.selectors.first_post_link).await?;
                self.driver.click(&link).await
            }
        }
    }
}

#[async_trait]
impl<D: BrowserDriver> AutomationSurface for BrowserSurface<D> {
    fn name(&self) -> &str {
        "browser"
    }

    async fn follow_user(&self, target: &Target) -> SurfaceResult<IntentReport> {
        if target.kind == TargetKind::Post {
            return Err(AutomationError::Rejected(format!(
                "cannot follow post {}",
                target.id
            )));
        }

        self.driver.navigate(&self.profile_url(&target.id)).await?;
        if self.is_present(&self.selectors.following_indicator).await? {
            return Ok(IntentReport::already_done("already following"));
        }

        let button = self.require(&self.selectors.follow_button).await?;
        self.driver.click(&button).await?;

        if !self.is_present(&self.selectors.following_indicator).await? {
            return Err(AutomationError::Rejected(format!(
                "follow of {} did not register",
                target.id
            )));
        }
        Ok(IntentReport::applied())
    }

    async fn like_post(&self, target: &Target) -> SurfaceResult<IntentReport> {
        self.open_post(target).await?;
        if self.is_present(&self.selectors.liked_indicator).await? {
            return Ok(IntentReport::already_done("post already liked"));
        }

        let button = self.require(&self.selectors.like_button).await?;
        self.driver.click(&button).await?;

        if !self.is_present(&self.selectors.liked_indicator).await? {
            return Err(AutomationError::Rejected(format!(
                "like on {} did not register",
                target.id
            )));
        }
        Ok(IntentReport::applied())
    }

    async fn read_post_context(&self, target: &Target) -> SurfaceResult<PostContext> {
        self.open_post(target).await?;
        let state = self.driver.read_page_state().await?;

        let caption: String = state.visible_text.trim().chars().take(MAX_CAPTION_CHARS).collect();
        Ok(PostContext {
            author: match target.kind {
                TargetKind::User => Some(target.id.clone()),
                TargetKind::Post => None,
            },
            caption: (!caption.is_empty()).then_some(caption),
        })
    }

    async fn submit_comment(&self, target: &Target, text: &str) -> SurfaceResult<IntentReport> {
        self.open_post(target).await?;

        let input = self.require(&self.selectors.comment_input).await?;
        self.driver.click(&input).await?;
        self.driver.type_text(&input, text).await?;

        let submit = self.require(&self.selectors.comment_submit).await?;
        self.driver.click(&submit).await?;

        let state = self.driver.read_page_state().await?;
        if !state.visible_text.contains(text) {
            return Err(AutomationError::Rejected(
                "comment not visible after submit".to_string(),
            ));
        }
        Ok(IntentReport::applied().with_diagnostic(state.url))
    }
}
