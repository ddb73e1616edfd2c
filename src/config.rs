//! YAML configuration.
//!
//! The config file is read once at startup and consumed as already-validated
//! values; a missing generation key or an empty platform set in news mode is
//! the only fatal startup condition, enforced in `main`.

use clap::ValueEnum;
use serde::Deserialize;
use std::error::Error;
use std::path::{Path, PathBuf};

/// Which loop the process runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Poll news sources and post discovered articles.
    News,
    /// Post generated content for a standing topic, no discovery.
    Topic,
    /// Interactive single-shot prompting.
    Manual,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_mode")]
    pub mode: Mode,
    /// Source ids to poll, in `sources/` module terms.
    #[serde(default = "default_sources")]
    pub sources: Vec<String>,
    #[serde(default)]
    pub delay: DelayConfig,
    /// Directory for the duplicate-guard record and session material.
    #[serde(default = "default_state_dir")]
    pub state_dir: String,
    /// Standing topic for topic mode.
    #[serde(default = "default_topic")]
    pub topic: String,
    pub generation: GenerationConfig,
    #[serde(default)]
    pub facebook: Option<FacebookConfig>,
    #[serde(default)]
    pub instagram: Option<InstagramConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DelayConfig {
    /// Minimum inter-cycle delay in seconds.
    #[serde(default = "default_delay_min")]
    pub min_secs: u64,
    /// Maximum inter-cycle delay in seconds.
    #[serde(default = "default_delay_max")]
    pub max_secs: u64,
}

impl Default for DelayConfig {
    fn default() -> Self {
        Self {
            min_secs: default_delay_min(),
            max_secs: default_delay_max(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct GenerationConfig {
    #[serde(default = "default_api_base")]
    pub api_base: String,
    pub api_key: String,
    #[serde(default = "default_model")]
    pub model: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FacebookConfig {
    pub access_token: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct InstagramConfig {
    pub username: String,
    #[serde(default)]
    pub password: Option<String>,
    /// Previously issued session token, the tier-1 credential.
    #[serde(default)]
    pub session_token: Option<String>,
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Post-authentication stabilization wait range.
    #[serde(default = "default_warmup_min")]
    pub warmup_min_secs: u64,
    #[serde(default = "default_warmup_max")]
    pub warmup_max_secs: u64,
    /// Pre-rendered caption-card image served by the static renderer.
    pub card_template: String,
}

impl AppConfig {
    pub fn guard_path(&self) -> PathBuf {
        Path::new(&self.state_dir).join("last_posted.txt")
    }

    pub fn settings_path(&self) -> PathBuf {
        Path::new(&self.state_dir).join("instagram_settings.json")
    }

    pub fn token_path(&self) -> PathBuf {
        Path::new(&self.state_dir).join("instagram_sessionid.txt")
    }
}

fn default_mode() -> Mode {
    Mode::News
}

fn default_sources() -> Vec<String> {
    ["setn", "udn", "cna", "ltn", "tvbs"]
        .into_iter()
        .map(str::to_string)
        .collect()
}

fn default_state_dir() -> String {
    "state".to_string()
}

fn default_topic() -> String {
    "日常保健".to_string()
}

fn default_delay_min() -> u64 {
    30 * 60
}

fn default_delay_max() -> u64 {
    3 * 60 * 60
}

fn default_api_base() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_model() -> String {
    "gpt-4o".to_string()
}

fn default_true() -> bool {
    true
}

fn default_warmup_min() -> u64 {
    5 * 60
}

fn default_warmup_max() -> u64 {
    15 * 60
}

/// Load and parse the YAML config file.
pub fn load_config(path: &str) -> Result<AppConfig, Box<dyn Error>> {
    let raw = std::fs::read_to_string(path)?;
    let config: AppConfig = serde_yaml::from_str(&raw)?;
    Ok(config)
}
