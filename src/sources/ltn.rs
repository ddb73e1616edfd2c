//! 自由時報 健康網 (LTN health) adapter.
//!
//! Headlines live in title/text-classed blocks; article URLs carry
//! `/article/`. A bare anchor scan backs up the primary selectors.

use super::{anchor_title, resolve_href, valid_title, SourceAdapter};
use crate::models::Candidate;
use once_cell::sync::Lazy;
use scraper::{Html, Selector};
use tracing::debug;
use url::Url;

const LISTING_URL: &str = "https://health.ltn.com.tw/";

static TITLE_SELECTOR: Lazy<Selector> = Lazy::new(|| {
    Selector::parse(
        "h3[class*=\"title\"] a, h2[class*=\"title\"] a, \
         div[class*=\"title\"] a, div[class*=\"text\"] a",
    )
    .unwrap()
});

static FALLBACK_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("a[href*=\"/article/\"]").unwrap());

#[derive(Debug, Default)]
pub struct Ltn;

impl Ltn {
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
            if !url.contains("/article/") {
                continue;
            }
            out.push(Candidate { title, url });
        }
        out
    }
}

impl SourceAdapter for Ltn {
    fn id(&self) -> &'static str {
        "ltn"
    }

    fn name(&self) -> &'static str {
        "自由時報"
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

        let mut out = self.collect(&document, &TITLE_SELECTOR, &base);
        if out.is_empty() {
            out = self.collect(&document, &FALLBACK_SELECTOR, &base);
        }
        debug!(count = out.len(), "parsed LTN candidates");
        out
    }
}
