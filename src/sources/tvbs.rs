//! TVBS新聞網 health-section adapter.
//!
//! The health site buckets articles under topic paths (`/medical/`,
//! `/regimen/`, `/nutrition/`, ...). List markup is a plain anchor grid, so
//! the adapter selects list-block anchors and keeps only topic-path links.

use super::{anchor_title, resolve_href, valid_title, SourceAdapter};
use crate::models::Candidate;
use once_cell::sync::Lazy;
use scraper::{Html, Selector};
use tracing::debug;
use url::Url;

const LISTING_URL: &str = "https://health.tvbs.com.tw/";

const ARTICLE_PATHS: &[&str] = &["/medical/", "/regimen/", "/nutrition/", "/review/"];

static LINK_SELECTOR: Lazy<Selector> = Lazy::new(|| {
    Selector::parse("div.news_list a, div.list_block a, h2 a, article a").unwrap()
});

static FALLBACK_SELECTOR: Lazy<Selector> = Lazy::new(|| {
    Selector::parse(
        "a[href*=\"/medical/\"], a[href*=\"/regimen/\"], a[href*=\"/nutrition/\"]",
    )
    .unwrap()
});

fn is_article_path(url: &str) -> bool {
    ARTICLE_PATHS.iter().any(|p| url.contains(p))
}

#[derive(Debug, Default)]
pub struct Tvbs;

impl Tvbs {
    fn collect(&self, document: &Html, selector: &Selector, base: &Url) -> Vec<Candidate> {
        let mut out = Vec::new();
        for element in document.select(selector) {
            let title = anchor_title(&element);
            let Some(href) = element.value().attr("href") else {
                continue;
            };
            if !valid_title(&title) {
                continue;
            }
            let Some(url) = resolve_href(base, href) else {
                continue;
            };
            if !is_article_path(&url) {
                continue;
            }
            out.push(Candidate { title, url });
        }
        out
    }
}

impl SourceAdapter for Tvbs {
    fn id(&self) -> &'static str {
        "tvbs"
    }

    fn name(&self) -> &'static str {
        "TVBS新聞網"
    }

    fn listing_url(&self) -> &str {
        LISTING_URL
    }

    fn candidates(&self, html: &str) -> Vec<Candidate> {
        let base = match Url::parse(LISTING_URL) {
            Ok(base) => base,
            Err(_) => return Vec::new(),
        };
        let document = Html::parse_document(html);

        let mut out = self.collect(&document, &LINK_SELECTOR, &base);
        if out.is_empty() {
            out = self.collect(&document, &FALLBACK_SELECTOR, &base);
        }
        debug!(count = out.len(), "parsed TVBS candidates");
        out
    }
}
