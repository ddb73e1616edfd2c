//! Facebook feed adapter.
//!
//! Posts go to the page feed through the Graph API. The preferred shape is
//! a link post (Facebook renders the preview card itself); when that fails
//! for any reason the adapter falls back to a plain-text post with the
//! article URL appended inline. A second failure is terminal for the cycle.

use super::{Platform, PlatformOutcome};
use crate::fetch::HTTP;
use crate::models::GeneratedPost;
use crate::utils::truncate_for_log;
use async_trait::async_trait;
use thiserror::Error;
use tracing::{info, warn};

const DEFAULT_API_BASE: &str = "https://graph.facebook.com/v19.0";

#[derive(Debug, Error)]
enum FeedError {
    #[error("graph api status {status}: {detail}")]
    Rejected { status: u16, detail: String },
    #[error(transparent)]
    Transport(#[from] reqwest::Error),
}

pub struct FacebookPlatform {
    api_base: String,
    access_token: String,
}

impl FacebookPlatform {
    pub fn new(access_token: String) -> Self {
        Self {
            api_base: DEFAULT_API_BASE.to_string(),
            access_token,
        }
    }

    async fn post_feed(&self, message: &str, link: Option<&str>) -> Result<(), FeedError> {
        let mut form = vec![
            ("message", message),
            ("access_token", self.access_token.as_str()),
        ];
        if let Some(link) = link {
            form.push(("link", link));
        }

        let response = HTTP
            .post(format!("{}/me/feed", self.api_base))
            .form(&form)
            .send()
            .await?;
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let detail = response.text().await.unwrap_or_default();
        Err(FeedError::Rejected {
            status: status.as_u16(),
            detail: truncate_for_log(&detail, 200),
        })
    }
}

/// The plain-text shape used when the link-card post fails.
pub fn fallback_message(message: &str, link: &str) -> String {
    format!("{message}\n\n🔗 新聞全文：{link}")
}

#[async_trait]
impl Platform for FacebookPlatform {
    fn name(&self) -> &'static str {
        "facebook"
    }

    async fn publish(
        &mut self,
        post: &GeneratedPost,
        source_url: Option<&str>,
    ) -> PlatformOutcome {
        let message = post.caption();

        let Some(link) = source_url else {
            // Topic and manual posts have no article to cite.
            return match self.post_feed(&message, None).await {
                Ok(()) => PlatformOutcome::posted(self.name()),
                Err(e) => PlatformOutcome::abandoned(self.name(), e.to_string()),
            };
        };

        match self.post_feed(&message, Some(link)).await {
            Ok(()) => {
                info!("link post accepted");
                PlatformOutcome::posted(self.name())
            }
            Err(e) => {
                warn!(error = %e, "link post failed, falling back to plain text");
                let plain = fallback_message(&message, link);
                match self.post_feed(&plain, None).await {
                    Ok(()) => PlatformOutcome::fallback(self.name(), e.to_string()),
                    Err(e2) => PlatformOutcome::abandoned(self.name(), e2.to_string()),
                }
            }
        }
    }
}
