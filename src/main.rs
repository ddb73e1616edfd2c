//! # medipost
//!
//! A long-running bot that polls Taiwanese health-news outlets, turns the
//! freshest relevant article into a short social post via an
//! OpenAI-compatible generation service, and publishes the result to
//! Facebook and Instagram.
//!
//! ## Architecture
//!
//! The poll scheduler is the sole active driver. Each cycle:
//! 1. **Discovery**: pick one relevant article URL from the configured
//!    sources, shuffled so no outlet dominates
//! 2. **Dedup**: skip the cycle if it is the same URL as last time
//! 3. **Extraction**: pull the article body text
//! 4. **Generation**: produce a short titled post (placeholder on failure,
//!    never an error)
//! 5. **Publish**: fan out to every enabled platform independently
//! 6. **Record**: update the duplicate guard, then wait a jittered delay
//!
//! ## Usage
//!
//! ```sh
//! medipost --config config.yaml
//! medipost --mode manual
//! ```

use clap::Parser;
use std::error::Error;
use std::time::Duration;
use tracing::{debug, info};
use tracing_subscriber::{EnvFilter, fmt as tfmt};

mod cli;
mod config;
mod dedup;
mod extractor;
mod fetch;
mod generation;
mod models;
mod publisher;
mod relevance;
mod scheduler;
mod session;
mod sources;
mod utils;

use cli::Cli;
use config::{AppConfig, Mode};
use dedup::DuplicateGuard;
use extractor::PageExtractor;
use generation::OpenAiGenerator;
use publisher::facebook::FacebookPlatform;
use publisher::instagram::{InstagramPlatform, StaticCardRenderer};
use publisher::{Dispatcher, Platform};
use scheduler::{PollScheduler, TopicScheduler, run_manual};
use session::{HttpInstagramApi, SessionCredentials, SessionManager};
use sources::SourceRegistry;
use utils::ensure_writable_dir;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    // --- Tracing init ---
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tfmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .init();

    info!(version = env!("CARGO_PKG_VERSION"), "medipost starting up");

    let args = Cli::parse();
    debug!(?args.config, ?args.mode, "parsed CLI arguments");

    let config = config::load_config(&args.config)?;
    let mode = args.mode.unwrap_or(config.mode);
    info!(config_path = %args.config, ?mode, "configuration loaded");

    ensure_writable_dir(&config.state_dir).await?;

    let generator = Box::new(OpenAiGenerator::new(&config.generation));
    let dispatcher = build_dispatcher(&config);

    match mode {
        Mode::News => {
            if dispatcher.is_empty() {
                return Err("news mode needs at least one enabled platform".into());
            }
            let registry = SourceRegistry::from_ids(&config.sources);
            if registry.is_empty() {
                return Err("news mode needs at least one configured source".into());
            }
            let guard = DuplicateGuard::new(config.guard_path());
            let scheduler = PollScheduler::new(
                Box::new(registry),
                Box::new(PageExtractor),
                generator,
                dispatcher,
                guard,
                Duration::from_secs(config.delay.min_secs),
                Duration::from_secs(config.delay.max_secs),
            );
            scheduler.run().await;
        }
        Mode::Topic => {
            if dispatcher.is_empty() {
                return Err("topic mode needs at least one enabled platform".into());
            }
            let scheduler = TopicScheduler::new(
                generator,
                dispatcher,
                config.topic.clone(),
                Duration::from_secs(config.delay.min_secs),
                Duration::from_secs(config.delay.max_secs),
            );
            scheduler.run().await;
        }
        Mode::Manual => {
            run_manual(Box::new(PageExtractor), generator, dispatcher).await;
            info!("manual session finished");
        }
    }

    Ok(())
}

/// Build the publish fan-out from the per-platform config sections.
fn build_dispatcher(config: &AppConfig) -> Dispatcher {
    let mut platforms: Vec<Box<dyn Platform>> = Vec::new();

    if let Some(facebook) = config.facebook.as_ref().filter(|f| f.enabled) {
        info!("facebook platform enabled");
        platforms.push(Box::new(FacebookPlatform::new(
            facebook.access_token.clone(),
        )));
    }

    if let Some(instagram) = config.instagram.as_ref().filter(|i| i.enabled) {
        info!(username = %instagram.username, "instagram platform enabled");
        // Config token first, then the token persisted by a prior run.
        let session_token = instagram.session_token.clone().or_else(|| {
            std::fs::read_to_string(config.token_path())
                .ok()
                .map(|t| t.trim().to_string())
                .filter(|t| !t.is_empty())
        });
        let creds = SessionCredentials {
            username: instagram.username.clone(),
            password: instagram.password.clone(),
            session_token,
            settings_path: config.settings_path(),
            token_path: config.token_path(),
        };
        let session = SessionManager::new(
            Box::new(HttpInstagramApi::new(&instagram.username)),
            creds,
            (
                Duration::from_secs(instagram.warmup_min_secs),
                Duration::from_secs(instagram.warmup_max_secs),
            ),
        );
        platforms.push(Box::new(InstagramPlatform::new(
            session,
            Box::new(StaticCardRenderer::new(&instagram.card_template)),
        )));
    }

    Dispatcher::new(platforms)
}
