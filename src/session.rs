//! Instagram session management.
//!
//! The publish path requires a live authenticated session, and the platform
//! expires, challenges, and rate-limits sessions at will. This module owns
//! that problem: the [`SessionManager`] is an explicit state machine over
//! {Unauthenticated, Authenticated, Challenged, RateLimited} that gives the
//! publish dispatcher a single guarantee — `ensure_authenticated()` returns
//! either a usable session or `false`, never a half-logged-in client.
//!
//! Authentication walks three credential tiers in strict priority order,
//! stopping at the first success:
//!
//! 1. a previously issued session token,
//! 2. the persisted device/session settings blob,
//! 3. username + password.
//!
//! Every successful login re-persists the settings (and a fresh token when
//! the platform hands one out) so later process restarts start at tier 1.
//! A successful authentication is followed by a one-time warm-up: a few
//! benign read calls and a randomized multi-minute wait, which keeps the
//! publish call itself from looking like the first action of a brand-new
//! session.

use crate::utils::truncate_for_log;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
use tokio::fs;
use tokio::time::sleep;
use tracing::{debug, info, warn};

/// Failure classes the platform API can report.
///
/// The manager and the publish adapter key their recovery policy off these
/// variants; anything unclassifiable lands in `Other` and is terminal for
/// the attempt.
#[derive(Debug, Error)]
pub enum ApiError {
    /// The platform demands an identity verification step no bot can pass.
    #[error("identity challenge required")]
    ChallengeRequired,
    /// The platform is throttling this account or device.
    #[error("rate limited")]
    RateLimited,
    /// The session is gone; a fresh login is needed.
    #[error("login required")]
    LoginRequired,
    #[error("platform api failure: {0}")]
    Other(String),
}

/// Device/session settings blob persisted between process runs.
///
/// The shape is platform-defined; unknown keys ride along in `extra` so a
/// newer settings dump survives a round-trip through an older binary.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct StoredSettings {
    pub user_id: Option<String>,
    pub device_id: String,
    pub user_agent: String,
    pub session_token: Option<String>,
    pub saved_at: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Minimal account payload from the liveness probe.
#[derive(Debug, Clone)]
pub struct AccountInfo {
    pub username: String,
    pub follower_count: u64,
}

/// The raw platform API surface the manager drives.
///
/// Production uses [`HttpInstagramApi`]; tests script this trait directly.
#[async_trait]
pub trait SessionApi: Send + Sync {
    /// Tier 1: adopt a previously issued session token.
    async fn login_with_token(&mut self, token: &str) -> Result<(), ApiError>;
    /// Tier 2: restore a session from persisted settings.
    async fn login_with_settings(&mut self, settings: &StoredSettings) -> Result<(), ApiError>;
    /// Tier 3: full credential login.
    async fn login_with_password(&mut self, username: &str, password: &str)
    -> Result<(), ApiError>;
    /// Lightweight liveness probe (also used for warm-up reads).
    async fn account_info(&mut self) -> Result<AccountInfo, ApiError>;
    /// Current device/session settings, for persistence.
    fn export_settings(&self) -> StoredSettings;
    /// The session token the platform issued, when there is one.
    fn session_token(&self) -> Option<String>;
    /// Publish a photo with a caption. Requires a live session.
    async fn upload_photo(&mut self, image: &[u8], caption: &str) -> Result<(), ApiError>;
}

/// Authentication state. Owned exclusively by the manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Unauthenticated,
    Authenticated,
    Challenged,
    RateLimited,
}

/// Credential material and its on-disk homes.
pub struct SessionCredentials {
    pub username: String,
    pub password: Option<String>,
    /// In-memory tier-1 token; cleared whenever a probe fails using it.
    pub session_token: Option<String>,
    pub settings_path: PathBuf,
    pub token_path: PathBuf,
}

pub struct SessionManager {
    api: Box<dyn SessionApi>,
    state: SessionState,
    creds: SessionCredentials,
    last_verified_at: Option<DateTime<Utc>>,
    /// Post-authentication stabilization wait, uniform in this range.
    /// A zero maximum disables all warm-up sleeping (tests).
    warmup_range: (Duration, Duration),
}

impl SessionManager {
    pub fn new(
        api: Box<dyn SessionApi>,
        creds: SessionCredentials,
        warmup_range: (Duration, Duration),
    ) -> Self {
        Self {
            api,
            state: SessionState::Unauthenticated,
            creds,
            last_verified_at: None,
            warmup_range,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Install replacement credential material (operator out-of-band action
    /// after a challenge) and rearm the machine from Unauthenticated.
    #[cfg_attr(not(test), allow(dead_code))]
    pub fn replace_credentials(&mut self, session_token: Option<String>, password: Option<String>) {
        self.creds.session_token = session_token;
        if password.is_some() {
            self.creds.password = password;
        }
        self.state = SessionState::Unauthenticated;
        info!("credential material replaced, session rearmed");
    }

    /// Guarantee a live session or report failure.
    ///
    /// The caller gets a plain bool; all recovery policy lives here.
    pub async fn ensure_authenticated(&mut self) -> bool {
        match self.state {
            SessionState::Challenged => {
                warn!("session is challenged; waiting for operator to replace credentials");
                false
            }
            SessionState::RateLimited => {
                // The inter-cycle delay between publish attempts is the
                // backoff; by the next call it has elapsed.
                debug!("leaving rate-limited state, retrying authentication");
                self.state = SessionState::Unauthenticated;
                self.attempt_tiers().await
            }
            SessionState::Authenticated => match self.api.account_info().await {
                Ok(account) => {
                    debug!(
                        username = %account.username,
                        last_verified = ?self.last_verified_at,
                        "session probe ok"
                    );
                    self.last_verified_at = Some(Utc::now());
                    true
                }
                Err(ApiError::ChallengeRequired) => {
                    warn!("session probe hit an identity challenge");
                    self.state = SessionState::Challenged;
                    false
                }
                Err(ApiError::RateLimited) => {
                    warn!("session probe rate limited");
                    self.state = SessionState::RateLimited;
                    false
                }
                Err(e) => {
                    // The token the probe used is presumed dead; keep the
                    // persisted settings and re-derive a token from them.
                    warn!(error = %e, "session probe failed, re-authenticating");
                    self.creds.session_token = None;
                    self.state = SessionState::Unauthenticated;
                    self.attempt_tiers().await
                }
            },
            SessionState::Unauthenticated => self.attempt_tiers().await,
        }
    }

    /// Publish a photo through the managed session, keeping the state
    /// machine in sync with the platform's verdict.
    pub async fn upload_photo(&mut self, image: &[u8], caption: &str) -> Result<(), ApiError> {
        let result = self.api.upload_photo(image, caption).await;
        match &result {
            Err(ApiError::ChallengeRequired) => self.state = SessionState::Challenged,
            Err(ApiError::RateLimited) => self.state = SessionState::RateLimited,
            Err(ApiError::LoginRequired) => {
                self.creds.session_token = None;
                self.state = SessionState::Unauthenticated;
            }
            _ => {}
        }
        result
    }

    /// Walk the credential tiers in priority order.
    ///
    /// Challenge and rate-limit verdicts stop the walk immediately: a
    /// challenge will not clear by trying harder, and further attempts
    /// under a rate limit only compound it.
    async fn attempt_tiers(&mut self) -> bool {
        if let Some(token) = self.creds.session_token.clone() {
            match self.api.login_with_token(&token).await {
                Ok(()) => return self.on_authenticated("token").await,
                Err(ApiError::ChallengeRequired) => {
                    warn!("token login hit an identity challenge");
                    self.state = SessionState::Challenged;
                    return false;
                }
                Err(ApiError::RateLimited) => {
                    warn!("token login rate limited, abandoning attempt");
                    self.state = SessionState::RateLimited;
                    return false;
                }
                Err(e) => {
                    warn!(error = %e, "token login failed, trying stored settings");
                    self.creds.session_token = None;
                }
            }
        }

        if let Some(settings) = self.load_settings().await {
            match self.api.login_with_settings(&settings).await {
                Ok(()) => return self.on_authenticated("settings").await,
                Err(ApiError::ChallengeRequired) => {
                    warn!("settings login hit an identity challenge");
                    self.state = SessionState::Challenged;
                    return false;
                }
                Err(ApiError::RateLimited) => {
                    warn!("settings login rate limited, abandoning attempt");
                    self.state = SessionState::RateLimited;
                    return false;
                }
                Err(e) => warn!(error = %e, "settings login failed, trying password"),
            }
        }

        if let Some(password) = self.creds.password.clone() {
            match self
                .api
                .login_with_password(&self.creds.username, &password)
                .await
            {
                Ok(()) => return self.on_authenticated("password").await,
                Err(ApiError::ChallengeRequired) => {
                    warn!("password login hit an identity challenge");
                    self.state = SessionState::Challenged;
                    return false;
                }
                Err(ApiError::RateLimited) => {
                    warn!("password login rate limited, abandoning attempt");
                    self.state = SessionState::RateLimited;
                    return false;
                }
                Err(e) => warn!(error = %e, "password login failed"),
            }
        }

        warn!("all authentication tiers exhausted");
        false
    }

    async fn on_authenticated(&mut self, tier: &str) -> bool {
        self.state = SessionState::Authenticated;
        self.last_verified_at = Some(Utc::now());
        info!(tier, "authenticated");

        let mut settings = self.api.export_settings();
        settings.saved_at = Some(Utc::now());
        self.persist_settings(&settings).await;
        if let Some(token) = self.api.session_token() {
            self.creds.session_token = Some(token.clone());
            self.persist_token(&token).await;
        }

        self.warm_up().await;
        // Warm-up probes can themselves surface a challenge or rate limit.
        matches!(self.state, SessionState::Authenticated)
    }

    /// One-time cost per authentication: benign reads with short pauses,
    /// then a randomized stabilization wait before the first publish.
    async fn warm_up(&mut self) {
        let mut ok = 0usize;
        for _ in 0..2 {
            match self.api.account_info().await {
                Ok(account) => {
                    debug!(username = %account.username, followers = account.follower_count, "warm-up read ok");
                    ok += 1;
                }
                Err(ApiError::ChallengeRequired) => {
                    warn!("warm-up read hit an identity challenge");
                    self.state = SessionState::Challenged;
                    return;
                }
                Err(ApiError::RateLimited) => {
                    warn!("warm-up read rate limited");
                    self.state = SessionState::RateLimited;
                    return;
                }
                Err(e) => warn!(error = %e, "warm-up read failed"),
            }
            sleep(self.warmup_pause()).await;
        }

        let wait = self.warmup_wait();
        info!(ok, wait_secs = wait.as_secs(), "warm-up reads done, stabilizing");
        sleep(wait).await;
    }

    fn warmup_pause(&self) -> Duration {
        if self.warmup_range.1.is_zero() {
            return Duration::ZERO;
        }
        Duration::from_millis(rand::rng().random_range(1_000..=3_000))
    }

    fn warmup_wait(&self) -> Duration {
        let (min, max) = self.warmup_range;
        if max.is_zero() {
            return Duration::ZERO;
        }
        let (lo, hi) = if min > max { (max, min) } else { (min, max) };
        Duration::from_secs(rand::rng().random_range(lo.as_secs()..=hi.as_secs()))
    }

    async fn load_settings(&self) -> Option<StoredSettings> {
        match fs::read_to_string(&self.creds.settings_path).await {
            Ok(raw) => match serde_json::from_str::<StoredSettings>(&raw) {
                Ok(settings) => Some(settings),
                Err(e) => {
                    warn!(
                        path = %self.creds.settings_path.display(),
                        error = %e,
                        "stored settings unparsable, skipping tier"
                    );
                    None
                }
            },
            Err(e) => {
                debug!(
                    path = %self.creds.settings_path.display(),
                    error = %e,
                    "no stored settings"
                );
                None
            }
        }
    }

    async fn persist_settings(&self, settings: &StoredSettings) {
        let serialized = match serde_json::to_string_pretty(settings) {
            Ok(s) => s,
            Err(e) => {
                warn!(error = %e, "failed to serialize session settings");
                return;
            }
        };
        if let Some(parent) = self.creds.settings_path.parent() {
            let _ = fs::create_dir_all(parent).await;
        }
        if let Err(e) = fs::write(&self.creds.settings_path, serialized).await {
            warn!(path = %self.creds.settings_path.display(), error = %e, "failed to persist session settings");
        } else {
            info!(path = %self.creds.settings_path.display(), "session settings persisted");
        }
    }

    async fn persist_token(&self, token: &str) {
        if let Some(parent) = self.creds.token_path.parent() {
            let _ = fs::create_dir_all(parent).await;
        }
        if let Err(e) = fs::write(&self.creds.token_path, token).await {
            warn!(path = %self.creds.token_path.display(), error = %e, "failed to persist session token");
        }
    }
}

/// Private-API HTTP client for Instagram.
///
/// Sessions ride in the `sessionid` cookie; the device identity is pinned
/// per account so restored settings look like the same phone.
pub struct HttpInstagramApi {
    http: reqwest::Client,
    api_base: String,
    device_id: String,
    user_agent: String,
    user_id: Option<String>,
    session_token: Option<String>,
}

const DEFAULT_API_BASE: &str = "https://i.instagram.com/api/v1";
const DEVICE_USER_AGENT: &str =
    "Instagram 269.0.0.18.75 Android (33/13; 420dpi; 1080x2219; medipost; en_US)";

impl HttpInstagramApi {
    pub fn new(username: &str) -> Self {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(20))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            http,
            api_base: DEFAULT_API_BASE.to_string(),
            device_id: derive_device_id(username),
            user_agent: DEVICE_USER_AGENT.to_string(),
            user_id: None,
            session_token: None,
        }
    }

    fn cookie_header(&self) -> Option<String> {
        self.session_token
            .as_ref()
            .map(|token| format!("sessionid={token}"))
    }

    async fn get(&self, path: &str) -> Result<String, ApiError> {
        let mut request = self
            .http
            .get(format!("{}{path}", self.api_base))
            .header(reqwest::header::USER_AGENT, &self.user_agent);
        if let Some(cookie) = self.cookie_header() {
            request = request.header(reqwest::header::COOKIE, cookie);
        }
        let response = request
            .send()
            .await
            .map_err(|e| ApiError::Other(e.to_string()))?;
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ApiError::Other(e.to_string()))?;
        if status.is_success() {
            Ok(body)
        } else {
            Err(classify_response(status.as_u16(), &body))
        }
    }

    async fn post_form(&self, path: &str, form: &[(&str, &str)]) -> Result<String, ApiError> {
        let mut request = self
            .http
            .post(format!("{}{path}", self.api_base))
            .header(reqwest::header::USER_AGENT, &self.user_agent)
            .form(form);
        if let Some(cookie) = self.cookie_header() {
            request = request.header(reqwest::header::COOKIE, cookie);
        }
        let response = request
            .send()
            .await
            .map_err(|e| ApiError::Other(e.to_string()))?;
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ApiError::Other(e.to_string()))?;
        if status.is_success() {
            Ok(body)
        } else {
            Err(classify_response(status.as_u16(), &body))
        }
    }

    /// Validate the current session token with the account endpoint and
    /// remember the account id.
    async fn adopt_session(&mut self) -> Result<(), ApiError> {
        let body = self.get("/accounts/current_user/").await?;
        let value: serde_json::Value =
            serde_json::from_str(&body).map_err(|e| ApiError::Other(e.to_string()))?;
        self.user_id = value
            .pointer("/user/pk")
            .and_then(|v| v.as_u64())
            .map(|pk| pk.to_string());
        Ok(())
    }
}

#[async_trait]
impl SessionApi for HttpInstagramApi {
    async fn login_with_token(&mut self, token: &str) -> Result<(), ApiError> {
        self.session_token = Some(token.to_string());
        match self.adopt_session().await {
            Ok(()) => Ok(()),
            Err(e) => {
                self.session_token = None;
                Err(e)
            }
        }
    }

    async fn login_with_settings(&mut self, settings: &StoredSettings) -> Result<(), ApiError> {
        let token = settings
            .session_token
            .clone()
            .ok_or_else(|| ApiError::Other("stored settings carry no session token".into()))?;
        if !settings.device_id.is_empty() {
            self.device_id = settings.device_id.clone();
        }
        if !settings.user_agent.is_empty() {
            self.user_agent = settings.user_agent.clone();
        }
        self.user_id = settings.user_id.clone();
        self.session_token = Some(token);
        match self.adopt_session().await {
            Ok(()) => Ok(()),
            Err(e) => {
                self.session_token = None;
                Err(e)
            }
        }
    }

    async fn login_with_password(
        &mut self,
        username: &str,
        password: &str,
    ) -> Result<(), ApiError> {
        let device_id = self.device_id.clone();
        let body = self
            .post_form(
                "/accounts/login/",
                &[
                    ("username", username),
                    ("password", password),
                    ("device_id", device_id.as_str()),
                    ("login_attempt_count", "0"),
                ],
            )
            .await?;

        let value: serde_json::Value =
            serde_json::from_str(&body).map_err(|e| ApiError::Other(e.to_string()))?;
        if value.get("status").and_then(|s| s.as_str()) != Some("ok") {
            return Err(classify_response(200, &body));
        }
        self.user_id = value
            .pointer("/logged_in_user/pk")
            .and_then(|v| v.as_u64())
            .map(|pk| pk.to_string());
        self.session_token = value
            .get("sessionid")
            .and_then(|v| v.as_str())
            .map(str::to_string);
        Ok(())
    }

    async fn account_info(&mut self) -> Result<AccountInfo, ApiError> {
        if self.session_token.is_none() {
            return Err(ApiError::LoginRequired);
        }
        let body = self.get("/accounts/current_user/").await?;
        let value: serde_json::Value =
            serde_json::from_str(&body).map_err(|e| ApiError::Other(e.to_string()))?;
        let username = value
            .pointer("/user/username")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();
        let follower_count = value
            .pointer("/user/follower_count")
            .and_then(|v| v.as_u64())
            .unwrap_or(0);
        Ok(AccountInfo {
            username,
            follower_count,
        })
    }

    fn export_settings(&self) -> StoredSettings {
        StoredSettings {
            user_id: self.user_id.clone(),
            device_id: self.device_id.clone(),
            user_agent: self.user_agent.clone(),
            session_token: self.session_token.clone(),
            saved_at: None,
            extra: serde_json::Map::new(),
        }
    }

    fn session_token(&self) -> Option<String> {
        self.session_token.clone()
    }

    async fn upload_photo(&mut self, image: &[u8], caption: &str) -> Result<(), ApiError> {
        if self.session_token.is_none() {
            return Err(ApiError::LoginRequired);
        }
        let upload_id = Utc::now().timestamp_millis().to_string();

        let mut request = self
            .http
            .post(format!("{}/rupload_igphoto/{upload_id}", self.api_base))
            .header(reqwest::header::USER_AGENT, &self.user_agent)
            .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
            .body(image.to_vec());
        if let Some(cookie) = self.cookie_header() {
            request = request.header(reqwest::header::COOKIE, cookie);
        }
        let response = request
            .send()
            .await
            .map_err(|e| ApiError::Other(e.to_string()))?;
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ApiError::Other(e.to_string()))?;
        if !status.is_success() {
            return Err(classify_response(status.as_u16(), &body));
        }

        let body = self
            .post_form(
                "/media/configure/",
                &[("upload_id", upload_id.as_str()), ("caption", caption)],
            )
            .await?;
        let value: serde_json::Value =
            serde_json::from_str(&body).map_err(|e| ApiError::Other(e.to_string()))?;
        if value.get("status").and_then(|s| s.as_str()) == Some("ok") {
            Ok(())
        } else {
            Err(classify_response(200, &body))
        }
    }
}

/// Map a platform response onto the failure taxonomy.
fn classify_response(status: u16, body: &str) -> ApiError {
    if status == 429 || body.contains("rate_limit") || body.contains("Please wait a few minutes") {
        ApiError::RateLimited
    } else if body.contains("challenge_required") || body.contains("checkpoint") {
        ApiError::ChallengeRequired
    } else if status == 403 || body.contains("login_required") {
        ApiError::LoginRequired
    } else {
        ApiError::Other(format!("status {status}: {}", truncate_for_log(body, 120)))
    }
}

/// Stable per-account device id, so restored sessions present the same
/// device fingerprint across restarts.
fn derive_device_id(username: &str) -> String {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for byte in username.bytes() {
        hash ^= u64::from(byte);
        hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
    }
    format!("android-{hash:016x}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    /// Scripted API double: each login tier and the probe pop their next
    /// scripted verdict; calls are recorded in order.
    struct ScriptedApi {
        calls: Arc<Mutex<Vec<String>>>,
        token_results: VecDeque<Result<(), ApiError>>,
        settings_results: VecDeque<Result<(), ApiError>>,
        password_results: VecDeque<Result<(), ApiError>>,
        probe_results: VecDeque<Result<AccountInfo, ApiError>>,
        upload_results: VecDeque<Result<(), ApiError>>,
        issued_token: Option<String>,
    }

    impl ScriptedApi {
        fn new(calls: Arc<Mutex<Vec<String>>>) -> Self {
            Self {
                calls,
                token_results: VecDeque::new(),
                settings_results: VecDeque::new(),
                password_results: VecDeque::new(),
                probe_results: VecDeque::new(),
                upload_results: VecDeque::new(),
                issued_token: Some("fresh-token".to_string()),
            }
        }

        fn record(&self, call: &str) {
            self.calls.lock().unwrap().push(call.to_string());
        }

        fn ok_probe() -> Result<AccountInfo, ApiError> {
            Ok(AccountInfo {
                username: "healthbot".to_string(),
                follower_count: 42,
            })
        }
    }

    #[async_trait]
    impl SessionApi for ScriptedApi {
        async fn login_with_token(&mut self, _token: &str) -> Result<(), ApiError> {
            self.record("token");
            self.token_results
                .pop_front()
                .unwrap_or(Err(ApiError::LoginRequired))
        }

        async fn login_with_settings(&mut self, _s: &StoredSettings) -> Result<(), ApiError> {
            self.record("settings");
            self.settings_results
                .pop_front()
                .unwrap_or(Err(ApiError::LoginRequired))
        }

        async fn login_with_password(&mut self, _u: &str, _p: &str) -> Result<(), ApiError> {
            self.record("password");
            self.password_results
                .pop_front()
                .unwrap_or(Err(ApiError::LoginRequired))
        }

        async fn account_info(&mut self) -> Result<AccountInfo, ApiError> {
            self.record("probe");
            self.probe_results.pop_front().unwrap_or_else(Self::ok_probe)
        }

        fn export_settings(&self) -> StoredSettings {
            StoredSettings {
                device_id: "android-test".to_string(),
                user_agent: "test-agent".to_string(),
                session_token: self.issued_token.clone(),
                ..StoredSettings::default()
            }
        }

        fn session_token(&self) -> Option<String> {
            self.issued_token.clone()
        }

        async fn upload_photo(&mut self, _image: &[u8], _caption: &str) -> Result<(), ApiError> {
            self.record("upload");
            self.upload_results.pop_front().unwrap_or(Ok(()))
        }
    }

    fn temp_state_paths(name: &str) -> (PathBuf, PathBuf) {
        let dir = std::env::temp_dir().join(format!(
            "medipost-session-{}-{name}",
            std::process::id()
        ));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        (dir.join("settings.json"), dir.join("token.txt"))
    }

    fn manager_with(
        api: ScriptedApi,
        name: &str,
        token: Option<&str>,
        password: Option<&str>,
    ) -> SessionManager {
        let (settings_path, token_path) = temp_state_paths(name);
        SessionManager::new(
            Box::new(api),
            SessionCredentials {
                username: "healthbot".to_string(),
                password: password.map(str::to_string),
                session_token: token.map(str::to_string),
                settings_path,
                token_path,
            },
            (Duration::ZERO, Duration::ZERO),
        )
    }

    #[tokio::test]
    async fn test_tier2_recovery_with_only_stored_settings() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let mut api = ScriptedApi::new(calls.clone());
        api.settings_results.push_back(Ok(()));
        let mut manager = manager_with(api, "tier2", None, None);
        std::fs::write(
            &manager.creds.settings_path,
            serde_json::to_string(&StoredSettings {
                device_id: "android-test".to_string(),
                user_agent: "test-agent".to_string(),
                session_token: Some("persisted".to_string()),
                ..StoredSettings::default()
            })
            .unwrap(),
        )
        .unwrap();

        assert!(manager.ensure_authenticated().await);
        assert_eq!(manager.state(), SessionState::Authenticated);
        // No token and no password configured: tier 2 went first.
        assert_eq!(calls.lock().unwrap()[0], "settings");
    }

    #[tokio::test]
    async fn test_tiers_walk_in_priority_order() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let mut api = ScriptedApi::new(calls.clone());
        api.token_results.push_back(Err(ApiError::LoginRequired));
        api.password_results.push_back(Ok(()));
        let mut manager = manager_with(api, "priority", Some("stale-token"), Some("secret"));

        assert!(manager.ensure_authenticated().await);
        let order = calls.lock().unwrap();
        // Token first, no settings file on disk, then password; warm-up
        // probes follow authentication.
        assert_eq!(order[0], "token");
        assert_eq!(order[1], "password");
        assert!(order[2..].iter().all(|c| c == "probe"));
    }

    #[tokio::test]
    async fn test_successful_auth_persists_settings_and_token() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let mut api = ScriptedApi::new(calls);
        api.password_results.push_back(Ok(()));
        let mut manager = manager_with(api, "persist", None, Some("secret"));

        assert!(manager.ensure_authenticated().await);
        let persisted: StoredSettings = serde_json::from_str(
            &std::fs::read_to_string(&manager.creds.settings_path).unwrap(),
        )
        .unwrap();
        assert_eq!(persisted.session_token.as_deref(), Some("fresh-token"));
        assert!(persisted.saved_at.is_some());
        assert_eq!(
            std::fs::read_to_string(&manager.creds.token_path).unwrap(),
            "fresh-token"
        );
        // Fresh token becomes the next call's tier-1 material.
        assert_eq!(manager.creds.session_token.as_deref(), Some("fresh-token"));
    }

    #[tokio::test]
    async fn test_challenge_is_sticky_until_credentials_replaced() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let mut api = ScriptedApi::new(calls.clone());
        api.password_results.push_back(Err(ApiError::ChallengeRequired));
        api.password_results.push_back(Ok(()));
        let mut manager = manager_with(api, "challenge", None, Some("secret"));

        assert!(!manager.ensure_authenticated().await);
        assert_eq!(manager.state(), SessionState::Challenged);

        let before = calls.lock().unwrap().len();
        // Challenged state refuses without touching the API.
        assert!(!manager.ensure_authenticated().await);
        assert_eq!(calls.lock().unwrap().len(), before);

        manager.replace_credentials(None, Some("new-secret".to_string()));
        assert!(manager.ensure_authenticated().await);
        assert_eq!(manager.state(), SessionState::Authenticated);
    }

    #[tokio::test]
    async fn test_rate_limit_stops_tier_walk_and_recovers_next_call() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let mut api = ScriptedApi::new(calls.clone());
        api.token_results.push_back(Err(ApiError::RateLimited));
        api.token_results.push_back(Ok(()));
        let mut manager = manager_with(api, "ratelimit", Some("token"), Some("secret"));

        assert!(!manager.ensure_authenticated().await);
        assert_eq!(manager.state(), SessionState::RateLimited);
        // No settings/password attempts after the rate-limit verdict.
        assert_eq!(*calls.lock().unwrap(), vec!["token".to_string()]);

        // Next call reverts to Unauthenticated and retries the tiers.
        assert!(manager.ensure_authenticated().await);
        assert_eq!(manager.state(), SessionState::Authenticated);
    }

    #[tokio::test]
    async fn test_probe_failure_rederives_from_settings_not_token() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let mut api = ScriptedApi::new(calls.clone());
        api.token_results.push_back(Ok(()));
        api.probe_results.push_back(Ok(ScriptedApi::ok_probe().unwrap()));
        api.probe_results.push_back(Ok(ScriptedApi::ok_probe().unwrap()));
        // Liveness probe on the next ensure call fails.
        api.probe_results.push_back(Err(ApiError::LoginRequired));
        api.settings_results.push_back(Ok(()));
        let mut manager = manager_with(api, "probe-fail", Some("token"), None);

        assert!(manager.ensure_authenticated().await);
        calls.lock().unwrap().clear();

        assert!(manager.ensure_authenticated().await);
        let order = calls.lock().unwrap();
        // probe failed -> settings tier; the dead token is never retried.
        assert_eq!(order[0], "probe");
        assert_eq!(order[1], "settings");
        assert!(!order.contains(&"token".to_string()));
    }

    #[tokio::test]
    async fn test_upload_rate_limit_marks_state() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let mut api = ScriptedApi::new(calls);
        api.token_results.push_back(Ok(()));
        api.upload_results.push_back(Err(ApiError::RateLimited));
        let mut manager = manager_with(api, "upload-rl", Some("token"), None);

        assert!(manager.ensure_authenticated().await);
        let result = manager.upload_photo(b"img", "caption").await;
        assert!(matches!(result, Err(ApiError::RateLimited)));
        assert_eq!(manager.state(), SessionState::RateLimited);
    }

    #[test]
    fn test_classify_response_taxonomy() {
        assert!(matches!(classify_response(429, ""), ApiError::RateLimited));
        assert!(matches!(
            classify_response(400, r#"{"message":"challenge_required"}"#),
            ApiError::ChallengeRequired
        ));
        assert!(matches!(
            classify_response(403, r#"{"message":"login_required"}"#),
            ApiError::LoginRequired
        ));
        assert!(matches!(classify_response(500, "boom"), ApiError::Other(_)));
    }

    #[test]
    fn test_derive_device_id_is_stable() {
        assert_eq!(derive_device_id("healthbot"), derive_device_id("healthbot"));
        assert_ne!(derive_device_id("healthbot"), derive_device_id("other"));
    }

    #[test]
    fn test_stored_settings_roundtrip_preserves_unknown_keys() {
        let raw = r#"{
            "user_id": "123",
            "device_id": "android-abc",
            "user_agent": "agent",
            "session_token": "tok",
            "saved_at": null,
            "phone_manufacturer": "Pixel"
        }"#;
        let settings: StoredSettings = serde_json::from_str(raw).unwrap();
        assert_eq!(settings.extra["phone_manufacturer"], "Pixel");
        let back = serde_json::to_string(&settings).unwrap();
        assert!(back.contains("phone_manufacturer"));
    }
}
