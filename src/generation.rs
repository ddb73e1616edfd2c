//! Generation-service collaborator.
//!
//! Talks to an OpenAI-compatible chat-completion endpoint and never returns
//! an error: empty input yields [`EMPTY_INPUT_PLACEHOLDER`], a failed or
//! malformed call yields [`GENERATION_FAILED_PLACEHOLDER`]. Callers must
//! treat the placeholders as valid, if undesirable, results.
//!
//! Three prompt variants exist: a titled article post, a topic-only post,
//! and a hashtag set. The reply of the titled variant is parsed by
//! [`parse_titled_reply`], a pure function kept outside the orchestration
//! core with a documented fallback (first line = title, remainder = body).

use crate::config::GenerationConfig;
use crate::models::GeneratedPost;
use crate::utils::truncate_for_log;
use async_trait::async_trait;
use itertools::Itertools;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, instrument, warn};

/// Returned when the input text is empty.
pub const EMPTY_INPUT_PLACEHOLDER: &str = "這段訊息是空的";

/// Returned when the generation call fails.
pub const GENERATION_FAILED_PLACEHOLDER: &str = "生成失敗";

/// At most this many hashtags survive parsing.
const MAX_HASHTAGS: usize = 10;

const ARTICLE_PROMPT: &str = "\
你是一名專業的醫師，根據新聞撰寫跟新聞相關的內容，像在和民眾對話。\
請使用繁體中文且吸引人。輸出兩行：第一行為「標題：」加上不超過15字的標題，\
第二行為「內文：」加上不超過50字的內文，不要其他文字。";

const TOPIC_PROMPT: &str = "\
你是一名專業的醫師，撰寫一則衛教貼文，像在和民眾對話。\
請使用繁體中文且吸引人，輸出僅包含內文，不要標題、盡可能簡短明瞭不超過50字。";

const HASHTAG_PROMPT: &str = "\
根據以下內容，輸出3到5個適合社群貼文的繁體中文 hashtag，\
以空格分隔，每個以 # 開頭，不要其他文字。";

static TITLE_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*(?:標題|Title)\s*[:：]\s*(.+)$").unwrap());
static BODY_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*(?:內文|Body)\s*[:：]\s*(.+)$").unwrap());
static HASHTAG_TOKEN: Lazy<Regex> = Lazy::new(|| Regex::new(r"#([\p{L}\p{N}_]+)").unwrap());

/// Generation seam used by the scheduler and the manual mode.
#[async_trait]
pub trait GeneratePost: Send + Sync {
    /// Produce a titled post (plus hashtags) from an article body.
    async fn post_from_article(&self, article_text: &str) -> GeneratedPost;

    /// Produce a bare post body from a topic string.
    async fn post_from_topic(&self, topic: &str) -> String;
}

#[derive(Debug, Error)]
enum ChatError {
    #[error("unexpected status {0}")]
    Status(u16),
    #[error(transparent)]
    Transport(#[from] reqwest::Error),
    #[error("empty completion")]
    EmptyCompletion,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: String,
}

/// OpenAI-compatible chat-completion client.
pub struct OpenAiGenerator {
    http: reqwest::Client,
    api_base: String,
    api_key: String,
    model: String,
}

impl OpenAiGenerator {
    pub fn new(config: &GenerationConfig) -> Self {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(60))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            http,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
        }
    }

    #[instrument(level = "info", skip_all)]
    async fn chat(&self, system: &str, user: &str) -> Result<String, ChatError> {
        let url = format!("{}/chat/completions", self.api_base);
        let payload = json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": system},
                {"role": "user", "content": user}
            ],
            "temperature": 1.0,
            "max_tokens": 200
        });

        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&payload)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ChatError::Status(status.as_u16()));
        }

        let parsed: ChatResponse = response.json().await?;
        let content = parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content.trim().to_string())
            .filter(|c| !c.is_empty())
            .ok_or(ChatError::EmptyCompletion)?;

        info!(reply = %truncate_for_log(&content, 120), "generation reply received");
        Ok(content)
    }

    async fn hashtags_for(&self, body: &str) -> Vec<String> {
        match self.chat(HASHTAG_PROMPT, body).await {
            Ok(reply) => parse_hashtags(&reply),
            Err(e) => {
                warn!(error = %e, "hashtag generation failed, continuing without tags");
                Vec::new()
            }
        }
    }
}

#[async_trait]
impl GeneratePost for OpenAiGenerator {
    async fn post_from_article(&self, article_text: &str) -> GeneratedPost {
        if article_text.trim().is_empty() {
            return GeneratedPost {
                title: EMPTY_INPUT_PLACEHOLDER.to_string(),
                body: EMPTY_INPUT_PLACEHOLDER.to_string(),
                hashtags: Vec::new(),
            };
        }

        let reply = match self.chat(ARTICLE_PROMPT, article_text).await {
            Ok(reply) => reply,
            Err(e) => {
                warn!(error = %e, "post generation failed, using placeholder");
                return GeneratedPost {
                    title: GENERATION_FAILED_PLACEHOLDER.to_string(),
                    body: GENERATION_FAILED_PLACEHOLDER.to_string(),
                    hashtags: Vec::new(),
                };
            }
        };

        let (title, body) = parse_titled_reply(&reply);
        let hashtags = self.hashtags_for(&body).await;
        GeneratedPost {
            title,
            body,
            hashtags,
        }
    }

    async fn post_from_topic(&self, topic: &str) -> String {
        if topic.trim().is_empty() {
            return EMPTY_INPUT_PLACEHOLDER.to_string();
        }
        match self.chat(TOPIC_PROMPT, topic).await {
            Ok(reply) => reply,
            Err(e) => {
                warn!(error = %e, "topic generation failed, using placeholder");
                GENERATION_FAILED_PLACEHOLDER.to_string()
            }
        }
    }
}

/// Split a generated reply into (title, body).
///
/// Prefers explicit `標題：` / `內文：` (or `Title:` / `Body:`) labels.
/// Fallback: first non-empty line is the title, the remainder is the body;
/// a single-line reply is used for both.
pub fn parse_titled_reply(reply: &str) -> (String, String) {
    let mut labeled_title = None;
    let mut labeled_body = None;
    for line in reply.lines() {
        if labeled_title.is_none() {
            if let Some(caps) = TITLE_LINE.captures(line) {
                labeled_title = Some(caps[1].trim().to_string());
                continue;
            }
        }
        if labeled_body.is_none() {
            if let Some(caps) = BODY_LINE.captures(line) {
                labeled_body = Some(caps[1].trim().to_string());
            }
        }
    }
    if let (Some(title), Some(body)) = (&labeled_title, &labeled_body) {
        return (title.clone(), body.clone());
    }

    let mut lines = reply.lines().map(str::trim).filter(|l| !l.is_empty());
    let title = lines.next().unwrap_or(reply).trim().to_string();
    let rest = lines.collect::<Vec<_>>().join("\n");
    if rest.is_empty() {
        (title.clone(), title)
    } else {
        (title, rest)
    }
}

/// Extract `#`-prefixed tokens, deduplicated in order, capped, `#` removed.
pub fn parse_hashtags(reply: &str) -> Vec<String> {
    HASHTAG_TOKEN
        .captures_iter(reply)
        .map(|caps| caps[1].to_string())
        .unique()
        .take(MAX_HASHTAGS)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GenerationConfig;

    #[test]
    fn test_parse_titled_reply_with_labels() {
        let reply = "標題：流感升溫\n內文：天冷流感患者增加，記得接種疫苗。";
        let (title, body) = parse_titled_reply(reply);
        assert_eq!(title, "流感升溫");
        assert_eq!(body, "天冷流感患者增加，記得接種疫苗。");
    }

    #[test]
    fn test_parse_titled_reply_english_labels() {
        let reply = "Title: Flu season\nBody: Get vaccinated early.";
        let (title, body) = parse_titled_reply(reply);
        assert_eq!(title, "Flu season");
        assert_eq!(body, "Get vaccinated early.");
    }

    #[test]
    fn test_parse_titled_reply_fallback_first_line() {
        let reply = "流感升溫\n天冷流感患者增加。\n記得接種疫苗。";
        let (title, body) = parse_titled_reply(reply);
        assert_eq!(title, "流感升溫");
        assert_eq!(body, "天冷流感患者增加。\n記得接種疫苗。");
    }

    #[test]
    fn test_parse_titled_reply_single_line() {
        let (title, body) = parse_titled_reply("天冷注意保暖。");
        assert_eq!(title, "天冷注意保暖。");
        assert_eq!(body, "天冷注意保暖。");
    }

    #[test]
    fn test_parse_hashtags_dedup_and_cap() {
        let tags = parse_hashtags("#健康 #流感 #健康 #疫苗");
        assert_eq!(tags, vec!["健康", "流感", "疫苗"]);

        let many = (0..20).map(|i| format!("#tag{i}")).collect::<Vec<_>>().join(" ");
        assert_eq!(parse_hashtags(&many).len(), MAX_HASHTAGS);
    }

    #[test]
    fn test_parse_hashtags_ignores_plain_text() {
        assert!(parse_hashtags("沒有任何標籤的句子").is_empty());
    }

    #[tokio::test]
    async fn test_empty_article_short_circuits_to_placeholder() {
        let generator = OpenAiGenerator::new(&GenerationConfig {
            api_base: "http://127.0.0.1:1".to_string(),
            api_key: "test".to_string(),
            model: "test-model".to_string(),
        });
        // No HTTP call is made for empty input, so the unroutable base
        // address above is never touched.
        let post = generator.post_from_article("   ").await;
        assert_eq!(post.title, EMPTY_INPUT_PLACEHOLDER);
        assert_eq!(post.body, EMPTY_INPUT_PLACEHOLDER);
        assert!(post.hashtags.is_empty());
    }

    #[tokio::test]
    async fn test_empty_topic_short_circuits_to_placeholder() {
        let generator = OpenAiGenerator::new(&GenerationConfig {
            api_base: "http://127.0.0.1:1".to_string(),
            api_key: "test".to_string(),
            model: "test-model".to_string(),
        });
        assert_eq!(generator.post_from_topic("").await, EMPTY_INPUT_PLACEHOLDER);
    }
}
