//! 聯合新聞網 元氣網 (UDN health) adapter.
//!
//! Story teasers sit in `dt`/`h2`/`h3` elements whose class names carry
//! `story` or `title`. When the markup shifts (it does, often) the adapter
//! falls back to bare `/story/` anchors anywhere on the page.

use super::{anchor_title, resolve_href, valid_title, SourceAdapter};
use crate::models::Candidate;
use once_cell::sync::Lazy;
use scraper::{Html, Selector};
use tracing::debug;
use url::Url;

const LISTING_URL: &str = "https://health.udn.com/health/index";

static STORY_SELECTOR: Lazy<Selector> = Lazy::new(|| {
    Selector::parse(
        "dt[class*=\"story\"] a, dt[class*=\"title\"] a, \
         h2[class*=\"story\"] a, h2[class*=\"title\"] a, \
         h3[class*=\"story\"] a, h3[class*=\"title\"] a",
    )
    .unwrap()
});

static FALLBACK_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("a[href*=\"/story/\"]").unwrap());

#[derive(Debug, Default)]
pub struct Udn;

impl Udn {
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
            if !url.contains("/story/") {
                continue;
            }
            out.push(Candidate { title, url });
        }
        out
    }
}

impl SourceAdapter for Udn {
    fn id(&self) -> &'static str {
        "udn"
    }

    fn name(&self) -> &'static str {
        "聯合新聞網"
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

        let mut out = self.collect(&document, &STORY_SELECTOR, &base);
        if out.is_empty() {
            out = self.collect(&document, &FALLBACK_SELECTOR, &base);
        }
        debug!(count = out.len(), "parsed UDN candidates");
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_story_teasers_preferred() {
        let html = r#"
            <html><body>
              <dt class="story__title"><a href="/story/5678/801001">久坐傷腰 復健科醫師教伸展</a></dt>
              <h2 class="title-line"><a href="/story/5678/801002">減肥停滯期的營養對策</a></h2>
              <a href="/story/5678/801003">純連結不該被選到</a>
            </body></html>
        "#;
        let candidates = Udn.candidates(html);
        assert_eq!(candidates.len(), 2);
        assert_eq!(
            candidates[0].url,
            "https://health.udn.com/story/5678/801001"
        );
    }

    #[test]
    fn test_fallback_to_story_anchors() {
        let html = r#"
            <html><body>
              <div><a href="/story/5678/801010">糖尿病患的冬季照護重點</a></div>
              <div><a href="/tag/diabetes">糖尿病專區標籤頁</a></div>
            </body></html>
        "#;
        let candidates = Udn.candidates(html);
        assert_eq!(candidates.len(), 1);
        assert_eq!(
            candidates[0].url,
            "https://health.udn.com/story/5678/801010"
        );
    }

    #[test]
    fn test_empty_page() {
        assert!(Udn.candidates("<html></html>").is_empty());
    }
}
