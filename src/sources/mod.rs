//! News-source adapters and the source registry.
//!
//! Each submodule scrapes one outlet's health listing page. Adapters share a
//! single contract: given the listing HTML, return candidate (title, URL)
//! pairs in document order. Fetching, relevance scanning, and fallback
//! selection live in the registry so every site behaves identically past the
//! selector layer.
//!
//! # Supported sources
//!
//! | Source | Module | Listing |
//! |--------|--------|---------|
//! | 三立新聞網 | [`setn`] | health.setn.com |
//! | 聯合新聞網 元氣網 | [`udn`] | health.udn.com |
//! | 中央社 | [`cna`] | cna.com.tw 生活 |
//! | 自由時報 健康網 | [`ltn`] | health.ltn.com.tw |
//! | TVBS新聞網 | [`tvbs`] | health.tvbs.com.tw |

use crate::fetch::fetch_page;
use crate::models::Candidate;
use crate::relevance;
use async_trait::async_trait;
use rand::seq::SliceRandom;
use tracing::{debug, info, warn};
use url::Url;

pub mod cna;
pub mod ltn;
pub mod setn;
pub mod tvbs;
pub mod udn;

/// One news site's candidate parser.
///
/// Implementations are pure with respect to the network: they receive the
/// already-fetched listing HTML and only differ in the selectors used to
/// extract (title, href) pairs and in URL resolution.
pub trait SourceAdapter: Send + Sync {
    /// Stable identifier used in configuration (`"setn"`, `"udn"`, ...).
    fn id(&self) -> &'static str;

    /// Human-readable outlet name for logs.
    fn name(&self) -> &'static str;

    /// The listing page to poll.
    fn listing_url(&self) -> &str;

    /// Parse structurally valid candidates from the listing HTML, in
    /// document order.
    fn candidates(&self, html: &str) -> Vec<Candidate>;
}

/// Resolve an href against the listing URL, absolute hrefs passing through.
pub(crate) fn resolve_href(base: &Url, href: &str) -> Option<String> {
    let href = href.trim();
    if href.is_empty() {
        return None;
    }
    if href.starts_with("http://") || href.starts_with("https://") {
        return Some(href.to_string());
    }
    base.join(href).ok().map(|u| u.to_string())
}

/// Structural validity floor: listing noise like「更多」or「影音」is
/// shorter than a real headline.
pub(crate) fn valid_title(title: &str) -> bool {
    title.chars().count() >= 5
}

/// Collapse an anchor's text nodes into one trimmed headline.
pub(crate) fn anchor_title(element: &scraper::ElementRef<'_>) -> String {
    element
        .text()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// The article chosen from one listing page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pick {
    /// Chosen article URL.
    pub url: String,
    /// Headline of the chosen candidate.
    pub title: String,
    /// The keyword that matched, or `None` when the first-valid fallback
    /// was used.
    pub matched: Option<&'static str>,
}

/// Scan candidates in document order: first relevant headline wins, else
/// fall back to the first structurally valid candidate.
///
/// Returns `None` only when the slice is empty, so any page that parses at
/// all yields an article.
pub fn pick_relevant(candidates: &[Candidate]) -> Option<Pick> {
    let fallback = candidates.first()?;
    for candidate in candidates {
        if let Some(keyword) = relevance::matched_keyword(&candidate.title) {
            return Some(Pick {
                url: candidate.url.clone(),
                title: candidate.title.clone(),
                matched: Some(keyword),
            });
        }
        debug!(title = %candidate.title, "candidate skipped, no keyword hit");
    }
    Some(Pick {
        url: fallback.url.clone(),
        title: fallback.title.clone(),
        matched: None,
    })
}

/// Discovery seam used by the poll scheduler.
#[async_trait]
pub trait Discover: Send + Sync {
    /// Fetch one article URL, returning the URL and the outlet name it came
    /// from, or `None` when every source failed this round.
    async fn next_article(&self) -> Option<(String, String)>;
}

/// The set of configured source adapters.
pub struct SourceRegistry {
    adapters: Vec<Box<dyn SourceAdapter>>,
}

impl SourceRegistry {
    /// Build a registry for the given source ids; unknown ids are logged
    /// and skipped.
    pub fn from_ids(ids: &[String]) -> Self {
        let mut adapters: Vec<Box<dyn SourceAdapter>> = Vec::new();
        for id in ids {
            match id.as_str() {
                "setn" => adapters.push(Box::new(setn::Setn::default())),
                "udn" => adapters.push(Box::new(udn::Udn::default())),
                "cna" => adapters.push(Box::new(cna::Cna::default())),
                "ltn" => adapters.push(Box::new(ltn::Ltn::default())),
                "tvbs" => adapters.push(Box::new(tvbs::Tvbs::default())),
                other => warn!(source = other, "unknown source id in config, skipping"),
            }
        }
        Self { adapters }
    }

    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }

    /// Fetch one article URL from a single source.
    ///
    /// Fetch or parse failure yields `None`; the caller retries later. A
    /// listing that parses into at least one valid candidate always yields
    /// a URL thanks to the first-valid fallback.
    pub async fn fetch_from_source(&self, adapter: &dyn SourceAdapter) -> Option<String> {
        let html = match fetch_page(adapter.listing_url()).await {
            Ok(html) => html,
            Err(e) => {
                warn!(source = adapter.id(), error = %e, "listing fetch failed");
                return None;
            }
        };

        let candidates = adapter.candidates(&html);
        if candidates.is_empty() {
            warn!(source = adapter.id(), "no structurally valid candidates on listing page");
            return None;
        }

        let pick = pick_relevant(&candidates)?;
        match pick.matched {
            Some(keyword) => info!(
                source = adapter.id(),
                keyword,
                title = %pick.title,
                "relevant article found"
            ),
            None => info!(
                source = adapter.id(),
                title = %pick.title,
                "no keyword hit, falling back to first candidate"
            ),
        }
        Some(pick.url)
    }

    /// Fetch one article URL from any source, trying sources in random
    /// order until one succeeds.
    pub async fn fetch_from_any(&self) -> Option<(String, String)> {
        let mut order: Vec<usize> = (0..self.adapters.len()).collect();
        order.shuffle(&mut rand::rng());

        for index in order {
            let adapter = self.adapters[index].as_ref();
            info!(source = adapter.id(), outlet = adapter.name(), "polling source");
            if let Some(url) = self.fetch_from_source(adapter).await {
                return Some((url, adapter.name().to_string()));
            }
        }
        warn!("all sources failed this round");
        None
    }
}

#[async_trait]
impl Discover for SourceRegistry {
    async fn next_article(&self) -> Option<(String, String)> {
        self.fetch_from_any().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(title: &str, url: &str) -> Candidate {
        Candidate {
            title: title.to_string(),
            url: url.to_string(),
        }
    }

    #[test]
    fn test_pick_relevant_short_circuits_on_first_hit() {
        let candidates = vec![
            candidate("職棒開幕戰門票開賣", "https://news.example/1"),
            candidate("流感疫苗開打 醫師提醒高風險族群", "https://news.example/2"),
            candidate("糖尿病友飲食三原則", "https://news.example/3"),
        ];
        let pick = pick_relevant(&candidates).unwrap();
        assert_eq!(pick.url, "https://news.example/2");
        assert!(pick.matched.is_some());
    }

    #[test]
    fn test_pick_relevant_falls_back_to_first_candidate() {
        let candidates = vec![
            candidate("議會預算案三讀通過", "https://news.example/1"),
            candidate("颱風外圍環流影響交通", "https://news.example/2"),
        ];
        let pick = pick_relevant(&candidates).unwrap();
        assert_eq!(pick.url, "https://news.example/1");
        assert_eq!(pick.matched, None);
    }

    #[test]
    fn test_pick_relevant_empty_is_none() {
        assert!(pick_relevant(&[]).is_none());
    }

    #[test]
    fn test_resolve_href_relative_and_absolute() {
        let base = Url::parse("https://health.example.com/index").unwrap();
        assert_eq!(
            resolve_href(&base, "/news/123").as_deref(),
            Some("https://health.example.com/news/123")
        );
        assert_eq!(
            resolve_href(&base, "https://other.example.com/a").as_deref(),
            Some("https://other.example.com/a")
        );
        assert_eq!(resolve_href(&base, "  "), None);
    }

    #[test]
    fn test_valid_title_floor() {
        assert!(!valid_title("更多"));
        assert!(valid_title("流感疫苗開打了"));
    }

    #[test]
    fn test_registry_from_ids_skips_unknown() {
        let registry = SourceRegistry::from_ids(&["setn".to_string(), "nope".to_string()]);
        assert_eq!(registry.adapters.len(), 1);
    }
}
