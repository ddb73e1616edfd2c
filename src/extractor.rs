//! Article body extraction.
//!
//! Given an article URL, fetch the page and return its `<article>` text
//! blocks in document order. A page with no article elements is a valid,
//! empty result; downstream generation handles "no content" with its
//! placeholder contract.

use crate::fetch::{fetch_page, FetchError};
use async_trait::async_trait;
use once_cell::sync::Lazy;
use scraper::{Html, Selector};
use tracing::{info, instrument};

/// Ad interstitial injected into article bodies by several outlets.
const AD_BOILERPLATE: &str = "我是廣告 請繼續往下閱讀";

static ARTICLE_SELECTOR: Lazy<Selector> = Lazy::new(|| Selector::parse("article").unwrap());

/// Extraction seam used by the poll scheduler.
#[async_trait]
pub trait ExtractArticle: Send + Sync {
    /// Fetch the page and extract its body blocks.
    async fn extract(&self, url: &str) -> Result<Vec<String>, FetchError>;
}

/// Production extractor backed by [`fetch_page`].
#[derive(Debug, Default)]
pub struct PageExtractor;

#[async_trait]
impl ExtractArticle for PageExtractor {
    #[instrument(level = "info", skip_all, fields(%url))]
    async fn extract(&self, url: &str) -> Result<Vec<String>, FetchError> {
        let html = fetch_page(url).await?;
        let blocks = body_blocks(&html);
        info!(blocks = blocks.len(), "extracted article body");
        Ok(blocks)
    }
}

/// Pull the text of every `<article>` element, strip the ad boilerplate,
/// and collapse blank lines within each block.
pub fn body_blocks(html: &str) -> Vec<String> {
    let document = Html::parse_document(html);
    document
        .select(&ARTICLE_SELECTOR)
        .filter_map(|element| {
            let raw = element.text().collect::<Vec<_>>().join("\n");
            let cleaned = raw.replace(AD_BOILERPLATE, "");
            let block = cleaned
                .lines()
                .map(str::trim)
                .filter(|line| !line.is_empty())
                .collect::<Vec<_>>()
                .join("\n");
            if block.is_empty() { None } else { Some(block) }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_body_blocks_in_document_order() {
        let html = r#"
            <html><body>
              <article><p>第一段內文。</p><p>第二段內文。</p></article>
              <article><p>第二篇的內文。</p></article>
            </body></html>
        "#;
        let blocks = body_blocks(html);
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0], "第一段內文。\n第二段內文。");
        assert_eq!(blocks[1], "第二篇的內文。");
    }

    #[test]
    fn test_boilerplate_is_stripped() {
        let html = r#"
            <article><p>上半段。</p><p>我是廣告 請繼續往下閱讀</p><p>下半段。</p></article>
        "#;
        let blocks = body_blocks(html);
        assert_eq!(blocks, vec!["上半段。\n下半段。".to_string()]);
    }

    #[test]
    fn test_blank_lines_collapsed() {
        let html = "<article><p>一</p>\n\n\n<p></p>\n<p>段落文字內容</p></article>";
        let blocks = body_blocks(html);
        assert_eq!(blocks, vec!["一\n段落文字內容".to_string()]);
    }

    #[test]
    fn test_page_without_articles_is_empty_success() {
        let html = "<html><body><div>沒有 article 元素</div></body></html>";
        assert!(body_blocks(html).is_empty());
    }
}
