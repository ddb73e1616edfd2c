//! 三立新聞網 (SETN) health-section adapter.
//!
//! The health vertical mixes several list layouts (news cards, view-all
//! lists, inline article teasers), so the selector covers all of them.
//! Article links always carry a `/news/` path segment; anything else on
//! the page is navigation.

use super::{anchor_title, resolve_href, valid_title, SourceAdapter};
use crate::models::Candidate;
use once_cell::sync::Lazy;
use scraper::{Html, Selector};
use tracing::debug;
use url::Url;

const LISTING_URL: &str = "https://health.setn.com/";

static LINK_SELECTOR: Lazy<Selector> = Lazy::new(|| {
    Selector::parse(
        "div.news-item a, div.newsItems a, h3.view-li-title a, article a[href*=\"/news/\"]",
    )
    .unwrap()
});

#[derive(Debug, Default)]
pub struct Setn;

impl SourceAdapter for Setn {
    fn id(&self) -> &'static str {
        "setn"
    }

    fn name(&self) -> &'static str {
        "三立新聞網"
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

        let mut out = Vec::new();
        for element in document.select(&LINK_SELECTOR) {
            let title = anchor_title(&element);
            let Some(href) = element.value().attr("href") else {
                continue;
            };
            if !valid_title(&title) {
                continue;
            }
            let Some(url) = resolve_href(&base, href) else {
                continue;
            };
            if !url.contains("/news/") && !url.contains("/News/") {
                continue;
            }
            out.push(Candidate { title, url });
        }
        debug!(count = out.len(), "parsed SETN candidates");
        out
    }
}
