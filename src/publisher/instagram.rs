//! Instagram image adapter.
//!
//! Every publish attempt starts by asking the session manager for a live
//! session; without one the attempt is abandoned for the cycle. The caption
//! card itself comes from a [`CardRenderer`] collaborator — pixel layout is
//! not this crate's business.
//!
//! Failure policy on upload, per failure class: an expired session gets
//! exactly one retry after re-authentication; a rate limit or identity
//! challenge is abandoned immediately (the session manager keeps the state
//! so the next cycle behaves accordingly); anything else is logged and
//! abandoned.

use super::{Platform, PlatformOutcome};
use crate::models::GeneratedPost;
use crate::session::{ApiError, SessionManager};
use async_trait::async_trait;
use std::path::PathBuf;
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("card template unreadable: {0}")]
    Template(#[from] std::io::Error),
}

/// Renders a post into image bytes. Purely cosmetic concerns live behind
/// this seam.
pub trait CardRenderer: Send + Sync {
    fn render(&self, post: &GeneratedPost) -> Result<Vec<u8>, RenderError>;
}

/// Serves a pre-rendered card image from disk.
pub struct StaticCardRenderer {
    template_path: PathBuf,
}

impl StaticCardRenderer {
    pub fn new(template_path: impl Into<PathBuf>) -> Self {
        Self {
            template_path: template_path.into(),
        }
    }
}

impl CardRenderer for StaticCardRenderer {
    fn render(&self, _post: &GeneratedPost) -> Result<Vec<u8>, RenderError> {
        Ok(std::fs::read(&self.template_path)?)
    }
}

pub struct InstagramPlatform {
    session: SessionManager,
    renderer: Box<dyn CardRenderer>,
}

impl InstagramPlatform {
    pub fn new(session: SessionManager, renderer: Box<dyn CardRenderer>) -> Self {
        Self { session, renderer }
    }
}

#[async_trait]
impl Platform for InstagramPlatform {
    fn name(&self) -> &'static str {
        "instagram"
    }

    async fn publish(
        &mut self,
        post: &GeneratedPost,
        _source_url: Option<&str>,
    ) -> PlatformOutcome {
        if !self.session.ensure_authenticated().await {
            warn!(state = ?self.session.state(), "no authenticated session");
            return PlatformOutcome::abandoned(self.name(), "no authenticated session");
        }

        let image = match self.renderer.render(post) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(error = %e, "card rendering failed");
                return PlatformOutcome::abandoned(self.name(), e.to_string());
            }
        };
        let caption = post.caption();

        match self.session.upload_photo(&image, &caption).await {
            Ok(()) => {
                info!("photo published");
                PlatformOutcome::posted(self.name())
            }
            Err(ApiError::LoginRequired) => {
                warn!("session expired mid-publish, retrying once after re-authentication");
                if !self.session.ensure_authenticated().await {
                    return PlatformOutcome::abandoned(self.name(), "re-authentication failed");
                }
                match self.session.upload_photo(&image, &caption).await {
                    Ok(()) => PlatformOutcome::posted(self.name()),
                    Err(e) => PlatformOutcome::abandoned(self.name(), e.to_string()),
                }
            }
            Err(e @ ApiError::RateLimited) | Err(e @ ApiError::ChallengeRequired) => {
                PlatformOutcome::abandoned(self.name(), e.to_string())
            }
            Err(e) => {
                warn!(error = %e, "photo upload failed");
                PlatformOutcome::abandoned(self.name(), e.to_string())
            }
        }
    }
}
