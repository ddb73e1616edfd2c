//! Shared HTTP client and page-fetch policy.
//!
//! Every outbound page fetch (listing pages and article pages) goes through
//! [`fetch_page`]: one shared client, a ~20 second total timeout, and a
//! uniform error surface. Timeouts and transport failures are reported the
//! same way as non-2xx statuses; callers treat all of them as transient.

use once_cell::sync::Lazy;
use reqwest::Client;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

const FETCH_TIMEOUT: Duration = Duration::from_secs(20);

const USER_AGENT: &str = concat!(
    "medipost/",
    env!("CARGO_PKG_VERSION"),
    " (Mozilla/5.0 compatible)"
);

/// The process-wide HTTP client used for page fetches and platform calls.
pub static HTTP: Lazy<Client> = Lazy::new(|| {
    Client::builder()
        .user_agent(USER_AGENT)
        .connect_timeout(Duration::from_secs(10))
        .timeout(FETCH_TIMEOUT)
        .build()
        .unwrap_or_else(|_| Client::new())
});

/// A transient page-fetch failure.
///
/// Never escalated: callers resolve every variant by waiting and retrying
/// the same step later.
#[derive(Debug, Error)]
pub enum FetchError {
    /// The server answered with a non-2xx status.
    #[error("unexpected status {0}")]
    Status(u16),
    /// Connection, TLS, timeout, or body-read failure.
    #[error(transparent)]
    Transport(#[from] reqwest::Error),
}

/// Fetch a page body as text.
///
/// Returns the HTML on 2xx, [`FetchError`] otherwise. Failures are logged
/// here once so call sites only decide what to do next.
pub async fn fetch_page(url: &str) -> Result<String, FetchError> {
    let response = match HTTP.get(url).send().await {
        Ok(r) => r,
        Err(e) => {
            warn!(%url, error = %e, "page fetch failed");
            return Err(FetchError::Transport(e));
        }
    };

    let status = response.status();
    if !status.is_success() {
        warn!(%url, status = status.as_u16(), "page fetch returned non-success status");
        return Err(FetchError::Status(status.as_u16()));
    }

    let body = response.text().await?;
    debug!(%url, bytes = body.len(), "fetched page");
    Ok(body)
}
