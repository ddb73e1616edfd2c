//! The poll scheduler: the only active driver in the process.
//!
//! One cycle runs discovery → dedup → extraction → generation → publish →
//! record, to completion, before the next begins. A failed discovery waits
//! a fixed 30-second penalty and retries; everything else waits the
//! jittered inter-cycle delay, which both hides the posting cadence and
//! spreads load on the upstream sites.
//!
//! [`PollScheduler::run_cycle`] does one full pass and returns a
//! [`CycleOutcome`] without sleeping, so the state machine is testable with
//! scripted collaborators; [`PollScheduler::run`] is the thin forever-loop
//! that adds the waits.
//!
//! Two simpler variants share the shape: the topic loop (no discovery, no
//! dedup) and the interactive manual mode (single-shot with confirmation).

use crate::dedup::DuplicateGuard;
use crate::extractor::ExtractArticle;
use crate::generation::GeneratePost;
use crate::models::{Article, GeneratedPost};
use crate::publisher::{Dispatcher, PlatformOutcome};
use crate::sources::Discover;
use rand::Rng;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::time::sleep;
use tracing::{info, warn};

/// Fixed wait before retrying a failed discovery. Distinct from the
/// inter-cycle delay; it never grows.
pub const FETCH_RETRY_PENALTY: Duration = Duration::from_secs(30);

/// Uniformly sample the inter-cycle delay; an inverted range is swapped
/// before sampling.
pub fn compute_delay(min: Duration, max: Duration) -> Duration {
    let (lo, hi) = if min > max { (max, min) } else { (min, max) };
    if lo == hi {
        return lo;
    }
    Duration::from_secs_f64(rand::rng().random_range(lo.as_secs_f64()..=hi.as_secs_f64()))
}

/// What one cycle did, and therefore what to wait before the next.
#[derive(Debug)]
pub enum CycleOutcome {
    /// Discovery or article fetch failed; retry after the fixed penalty.
    NoArticle,
    /// Same URL as last cycle; nothing was generated or published.
    Duplicate { url: String },
    /// A post went through the dispatcher (not necessarily successfully
    /// on every platform) and the guard was updated.
    Published {
        url: String,
        outcomes: Vec<PlatformOutcome>,
    },
}

pub struct PollScheduler {
    discover: Box<dyn Discover>,
    extractor: Box<dyn ExtractArticle>,
    generator: Box<dyn GeneratePost>,
    dispatcher: Dispatcher,
    guard: DuplicateGuard,
    delay_min: Duration,
    delay_max: Duration,
}

impl PollScheduler {
    pub fn new(
        discover: Box<dyn Discover>,
        extractor: Box<dyn ExtractArticle>,
        generator: Box<dyn GeneratePost>,
        dispatcher: Dispatcher,
        guard: DuplicateGuard,
        delay_min: Duration,
        delay_max: Duration,
    ) -> Self {
        Self {
            discover,
            extractor,
            generator,
            dispatcher,
            guard,
            delay_min,
            delay_max,
        }
    }

    /// Run forever. There is no terminal state; the loop ends with the
    /// process.
    pub async fn run(mut self) {
        loop {
            match self.run_cycle().await {
                CycleOutcome::NoArticle => {
                    info!(
                        penalty_secs = FETCH_RETRY_PENALTY.as_secs(),
                        "no article this round, retrying after penalty"
                    );
                    sleep(FETCH_RETRY_PENALTY).await;
                    continue;
                }
                CycleOutcome::Duplicate { url } => {
                    info!(%url, "duplicate article, cycle skipped");
                }
                CycleOutcome::Published { url, outcomes } => {
                    info!(%url, platforms = outcomes.len(), "publish cycle complete");
                }
            }
            let delay = compute_delay(self.delay_min, self.delay_max);
            info!(delay_secs = delay.as_secs(), "next cycle scheduled");
            sleep(delay).await;
        }
    }

    /// One full pass of the state machine, no sleeping.
    pub async fn run_cycle(&mut self) -> CycleOutcome {
        let Some((url, source)) = self.discover.next_article().await else {
            return CycleOutcome::NoArticle;
        };
        info!(%url, source = %source, "article discovered");

        if self.guard.is_duplicate(&url).await {
            return CycleOutcome::Duplicate { url };
        }

        let body_blocks = match self.extractor.extract(&url).await {
            Ok(blocks) => blocks,
            Err(e) => {
                warn!(%url, error = %e, "article fetch failed");
                return CycleOutcome::NoArticle;
            }
        };
        let article = Article {
            url: url.clone(),
            body_blocks,
        };

        let post = self.generator.post_from_article(&article.body_text()).await;
        info!(url = %article.url, title = %post.title, "post generated");

        let outcomes = self.dispatcher.publish(&post, Some(&url)).await;

        // The guard is updated no matter how the platforms fared: a
        // partially failed publish still counts as seen.
        self.guard.record(&url).await;

        CycleOutcome::Published { url, outcomes }
    }
}

/// Topic-only loop: generate from a standing topic and publish on the
/// jittered cadence. No discovery, no dedup.
pub struct TopicScheduler {
    generator: Box<dyn GeneratePost>,
    dispatcher: Dispatcher,
    topic: String,
    delay_min: Duration,
    delay_max: Duration,
}

impl TopicScheduler {
    pub fn new(
        generator: Box<dyn GeneratePost>,
        dispatcher: Dispatcher,
        topic: String,
        delay_min: Duration,
        delay_max: Duration,
    ) -> Self {
        Self {
            generator,
            dispatcher,
            topic,
            delay_min,
            delay_max,
        }
    }

    pub async fn run(mut self) {
        loop {
            let body = self.generator.post_from_topic(&self.topic).await;
            info!(body = %body, "topic post generated");
            let post = GeneratedPost {
                title: self.topic.clone(),
                body,
                hashtags: Vec::new(),
            };
            self.dispatcher.publish(&post, None).await;

            let delay = compute_delay(self.delay_min, self.delay_max);
            info!(delay_secs = delay.as_secs(), "next topic post scheduled");
            sleep(delay).await;
        }
    }
}

/// Interactive single-shot mode: read a topic or URL from stdin, show the
/// draft, and publish on confirmation. Loops until stdin closes.
pub async fn run_manual(
    extractor: Box<dyn ExtractArticle>,
    generator: Box<dyn GeneratePost>,
    mut dispatcher: Dispatcher,
) {
    let stdin = BufReader::new(tokio::io::stdin());
    let mut lines = stdin.lines();

    loop {
        println!("輸入主題或網址：");
        let Ok(Some(input)) = lines.next_line().await else {
            break;
        };
        let input = input.trim().to_string();
        if input.is_empty() {
            continue;
        }

        let (post, source_url) = if input.starts_with("https://") || input.starts_with("http://") {
            let blocks = match extractor.extract(&input).await {
                Ok(blocks) => blocks,
                Err(e) => {
                    warn!(url = %input, error = %e, "article fetch failed");
                    continue;
                }
            };
            let article = Article {
                url: input.clone(),
                body_blocks: blocks,
            };
            (
                generator.post_from_article(&article.body_text()).await,
                Some(input),
            )
        } else {
            let body = generator.post_from_topic(&input).await;
            (
                GeneratedPost {
                    title: input.clone(),
                    body,
                    hashtags: Vec::new(),
                },
                None,
            )
        };

        println!("\n生成內容：\n{}\n", post.caption());
        println!("要發佈嗎？(y/n)：");
        let Ok(Some(answer)) = lines.next_line().await else {
            break;
        };
        if answer.trim().eq_ignore_ascii_case("y") {
            dispatcher.publish(&post, source_url.as_deref()).await;
        } else {
            info!("draft discarded");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::FetchError;
    use crate::publisher::{Platform, PlatformOutcome, PublishStatus};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct FakeDiscover {
        url: Option<String>,
    }

    #[async_trait]
    impl Discover for FakeDiscover {
        async fn next_article(&self) -> Option<(String, String)> {
            self.url.clone().map(|u| (u, "測試來源".to_string()))
        }
    }

    struct FakeExtractor {
        blocks: Option<Vec<String>>,
    }

    #[async_trait]
    impl ExtractArticle for FakeExtractor {
        async fn extract(&self, _url: &str) -> Result<Vec<String>, FetchError> {
            match &self.blocks {
                Some(blocks) => Ok(blocks.clone()),
                None => Err(FetchError::Status(500)),
            }
        }
    }

    struct CountingGenerator {
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl GeneratePost for CountingGenerator {
        async fn post_from_article(&self, article_text: &str) -> GeneratedPost {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let body = if article_text.trim().is_empty() {
                crate::generation::EMPTY_INPUT_PLACEHOLDER.to_string()
            } else {
                "測試貼文內容".to_string()
            };
            GeneratedPost {
                title: "測試標題".to_string(),
                body,
                hashtags: vec![],
            }
        }

        async fn post_from_topic(&self, _topic: &str) -> String {
            self.calls.fetch_add(1, Ordering::SeqCst);
            "主題貼文".to_string()
        }
    }

    struct CountingPlatform {
        calls: Arc<AtomicUsize>,
        status: PublishStatus,
    }

    #[async_trait]
    impl Platform for CountingPlatform {
        fn name(&self) -> &'static str {
            "counting"
        }

        async fn publish(
            &mut self,
            _post: &GeneratedPost,
            _source_url: Option<&str>,
        ) -> PlatformOutcome {
            self.calls.fetch_add(1, Ordering::SeqCst);
            PlatformOutcome {
                platform: "counting",
                status: self.status,
                detail: None,
            }
        }
    }

    fn temp_guard(name: &str) -> DuplicateGuard {
        let path = std::env::temp_dir().join(format!(
            "medipost-sched-{}-{name}.txt",
            std::process::id()
        ));
        let _ = std::fs::remove_file(&path);
        DuplicateGuard::new(path)
    }

    fn scheduler(
        url: Option<&str>,
        blocks: Option<Vec<String>>,
        gen_calls: Arc<AtomicUsize>,
        pub_calls: Arc<AtomicUsize>,
        status: PublishStatus,
        guard_name: &str,
    ) -> PollScheduler {
        PollScheduler::new(
            Box::new(FakeDiscover {
                url: url.map(str::to_string),
            }),
            Box::new(FakeExtractor { blocks }),
            Box::new(CountingGenerator { calls: gen_calls }),
            Dispatcher::new(vec![Box::new(CountingPlatform {
                calls: pub_calls,
                status,
            })]),
            temp_guard(guard_name),
            Duration::from_secs(1),
            Duration::from_secs(2),
        )
    }

    #[test]
    fn test_compute_delay_inverted_range_is_swapped() {
        for _ in 0..100 {
            let d = compute_delay(Duration::from_secs(10), Duration::from_secs(5));
            assert!(d >= Duration::from_secs(5) && d <= Duration::from_secs(10));
        }
    }

    #[test]
    fn test_compute_delay_degenerate_range() {
        assert_eq!(
            compute_delay(Duration::from_secs(7), Duration::from_secs(7)),
            Duration::from_secs(7)
        );
    }

    #[tokio::test]
    async fn test_cycle_publishes_and_records() {
        let gen_calls = Arc::new(AtomicUsize::new(0));
        let pub_calls = Arc::new(AtomicUsize::new(0));
        let mut sched = scheduler(
            Some("https://site/a"),
            Some(vec!["一段內文".to_string()]),
            gen_calls.clone(),
            pub_calls.clone(),
            PublishStatus::Posted,
            "publishes",
        );

        let outcome = sched.run_cycle().await;
        assert!(matches!(outcome, CycleOutcome::Published { .. }));
        assert_eq!(gen_calls.load(Ordering::SeqCst), 1);
        assert_eq!(pub_calls.load(Ordering::SeqCst), 1);
        assert!(sched.guard.is_duplicate("https://site/a").await);
    }

    #[tokio::test]
    async fn test_duplicate_skips_generation_and_publish() {
        let gen_calls = Arc::new(AtomicUsize::new(0));
        let pub_calls = Arc::new(AtomicUsize::new(0));
        let mut sched = scheduler(
            Some("https://site/a"),
            Some(vec!["一段內文".to_string()]),
            gen_calls.clone(),
            pub_calls.clone(),
            PublishStatus::Posted,
            "dedup-skip",
        );

        assert!(matches!(
            sched.run_cycle().await,
            CycleOutcome::Published { .. }
        ));
        let outcome = sched.run_cycle().await;
        assert!(matches!(outcome, CycleOutcome::Duplicate { url } if url == "https://site/a"));
        // Nothing past the guard ran on the second cycle.
        assert_eq!(gen_calls.load(Ordering::SeqCst), 1);
        assert_eq!(pub_calls.load(Ordering::SeqCst), 1);
        assert!(sched.guard.is_duplicate("https://site/a").await);
    }

    #[tokio::test]
    async fn test_publish_failure_still_records_as_seen() {
        let gen_calls = Arc::new(AtomicUsize::new(0));
        let pub_calls = Arc::new(AtomicUsize::new(0));
        let mut sched = scheduler(
            Some("https://site/a"),
            Some(vec!["一段內文".to_string()]),
            gen_calls,
            pub_calls,
            PublishStatus::Abandoned,
            "fail-records",
        );

        match sched.run_cycle().await {
            CycleOutcome::Published { outcomes, .. } => {
                assert_eq!(outcomes[0].status, PublishStatus::Abandoned);
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert!(sched.guard.is_duplicate("https://site/a").await);
    }

    #[tokio::test]
    async fn test_empty_article_still_publishes_placeholder() {
        let gen_calls = Arc::new(AtomicUsize::new(0));
        let pub_calls = Arc::new(AtomicUsize::new(0));
        let mut sched = scheduler(
            Some("https://site/empty"),
            Some(vec![]),
            gen_calls,
            pub_calls.clone(),
            PublishStatus::Posted,
            "empty-article",
        );

        assert!(matches!(
            sched.run_cycle().await,
            CycleOutcome::Published { .. }
        ));
        assert_eq!(pub_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_discovery_failure_is_no_article() {
        let gen_calls = Arc::new(AtomicUsize::new(0));
        let pub_calls = Arc::new(AtomicUsize::new(0));
        let mut sched = scheduler(
            None,
            Some(vec![]),
            gen_calls.clone(),
            pub_calls,
            PublishStatus::Posted,
            "no-article",
        );

        assert!(matches!(sched.run_cycle().await, CycleOutcome::NoArticle));
        assert_eq!(gen_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_article_fetch_failure_is_no_article() {
        let gen_calls = Arc::new(AtomicUsize::new(0));
        let pub_calls = Arc::new(AtomicUsize::new(0));
        let mut sched = scheduler(
            Some("https://site/a"),
            None,
            gen_calls.clone(),
            pub_calls,
            PublishStatus::Posted,
            "fetch-fail",
        );

        assert!(matches!(sched.run_cycle().await, CycleOutcome::NoArticle));
        assert_eq!(gen_calls.load(Ordering::SeqCst), 0);
        // A failed fetch is not recorded as seen.
        assert!(!sched.guard.is_duplicate("https://site/a").await);
    }
}
