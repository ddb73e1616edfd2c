//! One-slot duplicate guard.
//!
//! Remembers the last successfully processed article URL so the poll loop
//! does not re-post the same article across consecutive cycles. The guard
//! deliberately starts every process pass-through: the first cycle is never
//! a duplicate regardless of what is on disk, because its purpose is to
//! suppress repeats *between cycles*, not across process restarts.
//!
//! Persistence is a single overwrite; there is exactly one writer (the
//! scheduler), so last-writer-wins is sufficient.

use std::path::PathBuf;
use tokio::fs;
use tracing::{debug, warn};

pub struct DuplicateGuard {
    path: PathBuf,
    /// Set once the scheduler records its first URL this process.
    primed: bool,
}

impl DuplicateGuard {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            primed: false,
        }
    }

    /// Is this URL the same one we recorded last cycle?
    ///
    /// Always `false` until [`record`](Self::record) has run once in this
    /// process. An unreadable or corrupt record is treated as "no prior
    /// record" and logged.
    pub async fn is_duplicate(&self, url: &str) -> bool {
        if !self.primed {
            return false;
        }
        match fs::read_to_string(&self.path).await {
            Ok(cached) => cached.trim() == url,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "guard record unreadable, treating as absent");
                false
            }
        }
    }

    /// Overwrite the guard slot with this URL.
    ///
    /// Write failures are logged and otherwise ignored; a broken guard
    /// degrades to occasional repeats, never to a stalled loop.
    pub async fn record(&mut self, url: &str) {
        if let Err(e) = fs::write(&self.path, url).await {
            warn!(path = %self.path.display(), error = %e, "failed to persist guard record");
        } else {
            debug!(%url, "guard record updated");
        }
        self.primed = true;
    }
}
