//! Data models shared across the discovery and publish pipeline.
//!
//! This module defines the core data structures used throughout the application:
//! - [`Candidate`]: a (title, URL) pair discovered on a listing page
//! - [`Article`]: the extracted body of a single article page
//! - [`GeneratedPost`]: the short social post produced by the generation service

use serde::{Deserialize, Serialize};

/// A candidate article discovered on a source's listing page.
///
/// Candidates are ephemeral: an adapter produces them in document order and
/// the registry consumes them immediately during the relevance scan. A
/// candidate has no identity beyond its URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    /// The headline text as it appears on the listing page.
    pub title: String,
    /// The absolute URL of the article page.
    pub url: String,
}

/// The extracted body of one article page.
///
/// Produced by the extractor, consumed by the generation call, and discarded
/// once the publish cycle completes. `body_blocks` preserves document order;
/// an empty vector is a valid result (page fetched, no article elements).
#[derive(Debug, Clone)]
pub struct Article {
    /// The article page URL.
    pub url: String,
    /// Body text blocks in document order, boilerplate stripped.
    pub body_blocks: Vec<String>,
}

impl Article {
    /// Join the body blocks into the single text the generation service sees.
    pub fn body_text(&self) -> String {
        self.body_blocks.join(" ")
    }
}

/// A short social-media post produced by the generation service.
///
/// Immutable once produced. The title and body are intentionally tiny
/// (caption-card sized); hashtags are already deduplicated and `#`-free.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GeneratedPost {
    /// Short headline, roughly 15 characters.
    pub title: String,
    /// Post body, roughly 50 characters.
    pub body: String,
    /// Tag tokens without the leading `#`.
    pub hashtags: Vec<String>,
}

impl GeneratedPost {
    /// Render the caption used by the image platform: body plus hashtags.
    pub fn caption(&self) -> String {
        if self.hashtags.is_empty() {
            return self.body.clone();
        }
        let tags = self
            .hashtags
            .iter()
            .map(|t| format!("#{t}"))
            .collect::<Vec<_>>()
            .join(" ");
        format!("{}\n\n{}", self.body, tags)
    }
}
