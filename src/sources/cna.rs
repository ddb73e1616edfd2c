//! 中央社 (CNA) life-section adapter.
//!
//! CNA's list markup wraps headlines in title-classed blocks under the main
//! list container. Article URLs carry `/news/`; the fallback path scans the
//! `listInfo` container when the primary selectors come up empty.

use super::{anchor_title, resolve_href, valid_title, SourceAdapter};
use crate::models::Candidate;
use once_cell::sync::Lazy;
use scraper::{Html, Selector};
use tracing::debug;
use url::Url;

const LISTING_URL: &str = "https://www.cna.com.tw/list/ahel.aspx";

static TITLE_SELECTOR: Lazy<Selector> = Lazy::new(|| {
    Selector::parse(
        "h2[class*=\"title\"] a, div[class*=\"title\"] a, \
         div[class*=\"mainList\"] a, ul[class*=\"mainList\"] a",
    )
    .unwrap()
});

static FALLBACK_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("a[href*=\"/news/\"], div.listInfo a").unwrap());

#[derive(Debug, Default)]
pub struct Cna;

impl Cna {
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
            if !url.contains("/news/") {
                continue;
            }
            out.push(Candidate { title, url });
        }
        out
    }
}

impl SourceAdapter for Cna {
    fn id(&self) -> &'static str {
        "cna"
    }

    fn name(&self) -> &'static str {
        "中央社"
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
        debug!(count = out.len(), "parsed CNA candidates");
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_main_list_titles() {
        let html = r#"
            <html><body>
              <ul class="mainList">
                <li><a href="/news/ahel/202501010001.aspx"><h2>本土流感進入流行期 疾管署說明</h2></a></li>
                <li><a href="/news/ahel/202501010002.aspx"><h2>國人十大死因出爐 癌症蟬聯首位</h2></a></li>
              </ul>
            </body></html>
        "#;
        let candidates = Cna.candidates(html);
        assert_eq!(candidates.len(), 2);
        assert_eq!(
            candidates[0].url,
            "https://www.cna.com.tw/news/ahel/202501010001.aspx"
        );
    }

    #[test]
    fn test_fallback_anchor_scan() {
        let html = r#"
            <html><body>
              <div class="listInfo">
                <a href="/news/ahel/202501010003.aspx">長者接種肺炎鏈球菌疫苗 注意事項</a>
              </div>
            </body></html>
        "#;
        let candidates = Cna.candidates(html);
        assert_eq!(candidates.len(), 1);
    }

    #[test]
    fn test_empty_page() {
        assert!(Cna.candidates("<html></html>").is_empty());
    }
}
