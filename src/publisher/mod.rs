//! Publish dispatch across social platforms.
//!
//! The dispatcher fans a generated post out to every enabled platform
//! adapter; each adapter owns its own failure-recovery policy and one
//! platform's failure never blocks another's attempt. Failures are logged
//! and terminal for the cycle — there is no cross-cycle retry queue.

use crate::models::GeneratedPost;
use async_trait::async_trait;
use tracing::{info, warn};

pub mod facebook;
pub mod instagram;

/// What happened to one platform's publish attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishStatus {
    /// Posted as intended.
    Posted,
    /// Posted via the platform's degraded fallback path.
    PostedFallback,
    /// Gave up for this cycle.
    Abandoned,
}

/// Per-platform outcome reported back to the scheduler.
#[derive(Debug, Clone)]
pub struct PlatformOutcome {
    pub platform: &'static str,
    pub status: PublishStatus,
    /// Failure or fallback detail, for the logs.
    pub detail: Option<String>,
}

impl PlatformOutcome {
    pub fn posted(platform: &'static str) -> Self {
        Self {
            platform,
            status: PublishStatus::Posted,
            detail: None,
        }
    }

    pub fn fallback(platform: &'static str, detail: impl Into<String>) -> Self {
        Self {
            platform,
            status: PublishStatus::PostedFallback,
            detail: Some(detail.into()),
        }
    }

    pub fn abandoned(platform: &'static str, detail: impl Into<String>) -> Self {
        Self {
            platform,
            status: PublishStatus::Abandoned,
            detail: Some(detail.into()),
        }
    }
}

/// One enabled social platform.
#[async_trait]
pub trait Platform: Send {
    fn name(&self) -> &'static str;

    /// Publish the post, optionally citing the source article. Must not
    /// panic or propagate errors; every failure maps to an outcome.
    async fn publish(&mut self, post: &GeneratedPost, source_url: Option<&str>)
    -> PlatformOutcome;
}

/// Fan-out over the enabled platform adapters.
pub struct Dispatcher {
    platforms: Vec<Box<dyn Platform>>,
}

impl Dispatcher {
    pub fn new(platforms: Vec<Box<dyn Platform>>) -> Self {
        Self { platforms }
    }

    pub fn is_empty(&self) -> bool {
        self.platforms.is_empty()
    }

    /// Publish to every platform; outcomes come back in platform order.
    pub async fn publish(
        &mut self,
        post: &GeneratedPost,
        source_url: Option<&str>,
    ) -> Vec<PlatformOutcome> {
        let attempts = self
            .platforms
            .iter_mut()
            .map(|platform| platform.publish(post, source_url));
        let outcomes = futures::future::join_all(attempts).await;

        for outcome in &outcomes {
            match outcome.status {
                PublishStatus::Posted => info!(platform = outcome.platform, "published"),
                PublishStatus::PostedFallback => info!(
                    platform = outcome.platform,
                    detail = outcome.detail.as_deref().unwrap_or(""),
                    "published via fallback"
                ),
                PublishStatus::Abandoned => warn!(
                    platform = outcome.platform,
                    detail = outcome.detail.as_deref().unwrap_or(""),
                    "publish abandoned"
                ),
            }
        }
        outcomes
    }
}
