// src/config.rs
use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

const ENV_PATH: &str = "TRACKER_CONFIG_PATH";
const ENV_CACHE_MINUTES: &str = "CACHE_DURATION_MINUTES";
const ENV_REQUEST_TIMEOUT: &str = "REQUEST_TIMEOUT_SECS";
const ENV_CACHE_PATH: &str = "TRACKER_CACHE_PATH";

pub const POST_LIMIT_RANGE: (usize, usize) = (10, 500);
pub const TOP_N_RANGE: (usize, usize) = (5, 50);

/// Runtime settings. Every field has a default, so a partial file is fine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    pub subreddit: String,
    pub base_url: String,
    pub mirror_base_url: String,
    /// Sort orders the primary feed walks, in order.
    pub feeds: Vec<String>,
    pub cache_duration_minutes: u64,
    pub request_timeout_secs: u64,
    pub connect_timeout_secs: u64,
    /// Minimum spacing between outbound requests.
    pub request_delay_ms: u64,
    pub rate_limit_backoff_secs: u64,
    pub max_retries: u32,
    /// Pause between one failed strategy and the next.
    pub strategy_pause_ms: u64,
    pub fetch_comments: bool,
    pub comment_limit: usize,
    /// Persist the snapshot cache here (JSON). In-memory only when unset.
    pub cache_path: Option<PathBuf>,
    /// Background refresh period; 0 disables it.
    pub warm_refresh_secs: u64,
    pub default_post_limit: usize,
    pub default_top_n: usize,
    pub user_agents: Vec<String>,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            subreddit: "wallstreetbets".into(),
            base_url: "https://www.reddit.com".into(),
            mirror_base_url: "https://api.reddiw.com".into(),
            feeds: vec!["hot".into(), "new".into(), "top".into()],
            cache_duration_minutes: 30,
            request_timeout_secs: 10,
            connect_timeout_secs: 4,
            request_delay_ms: 2_000,
            rate_limit_backoff_secs: 10,
            max_retries: 3,
            strategy_pause_ms: 1_000,
            fetch_comments: false,
            comment_limit: 20,
            cache_path: None,
            warm_refresh_secs: 0,
            default_post_limit: 100,
            default_top_n: 20,
            user_agents: default_user_agents(),
        }
    }
}

fn default_user_agents() -> Vec<String> {
    [
        "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
        "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
        "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
        "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:121.0) Gecko/20100101 Firefox/121.0",
        "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.1 Safari/605.1.15",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

impl TrackerConfig {
    /// Load from an explicit path. TOML or JSON, chosen by extension.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading tracker config from {}", path.display()))?;
        let ext = path
            .extension()
            .and_then(|s| s.to_str())
            .unwrap_or_default()
            .to_ascii_lowercase();
        let mut cfg = parse_config(&content, &ext)
            .with_context(|| format!("parsing tracker config {}", path.display()))?;
        cfg.sanitize();
        Ok(cfg)
    }

    /// Resolve config with fallbacks, then apply env overrides:
    /// 1) $TRACKER_CONFIG_PATH
    /// 2) config/tracker.toml
    /// 3) config/tracker.json
    /// 4) built-in defaults
    pub fn load_default() -> Result<Self> {
        let mut cfg = if let Ok(p) = std::env::var(ENV_PATH) {
            let pb = PathBuf::from(p);
            if !pb.exists() {
                return Err(anyhow!("{ENV_PATH} points to non-existent path"));
            }
            Self::load_from(&pb)?
        } else {
            let toml_p = PathBuf::from("config/tracker.toml");
            let json_p = PathBuf::from("config/tracker.json");
            if toml_p.exists() {
                Self::load_from(&toml_p)?
            } else if json_p.exists() {
                Self::load_from(&json_p)?
            } else {
                Self::default()
            }
        };
        cfg.apply_env_overrides();
        cfg.sanitize();
        Ok(cfg)
    }

    /// Individual env vars beat file values. Unparseable values are ignored.
    pub fn apply_env_overrides(&mut self) {
        if let Some(v) = env_number(ENV_CACHE_MINUTES) {
            self.cache_duration_minutes = v;
        }
        if let Some(v) = env_number(ENV_REQUEST_TIMEOUT) {
            self.request_timeout_secs = v;
        }
        if let Ok(p) = std::env::var(ENV_CACHE_PATH) {
            let p = p.trim();
            if !p.is_empty() {
                self.cache_path = Some(PathBuf::from(p));
            }
        }
    }

    fn sanitize(&mut self) {
        fn blank(s: &str) -> bool {
            s.trim().is_empty()
        }
        let d = Self::default();

        if blank(&self.subreddit) {
            self.subreddit = d.subreddit;
        }
        if blank(&self.base_url) {
            self.base_url = d.base_url;
        }
        if blank(&self.mirror_base_url) {
            self.mirror_base_url = d.mirror_base_url;
        }
        self.feeds.retain(|f| !blank(f));
        if self.feeds.is_empty() {
            self.feeds = d.feeds;
        }
        self.user_agents.retain(|ua| !blank(ua));
        if self.user_agents.is_empty() {
            self.user_agents = d.user_agents;
        }
        if self.request_timeout_secs == 0 {
            self.request_timeout_secs = d.request_timeout_secs;
        }
        if self.connect_timeout_secs == 0 {
            self.connect_timeout_secs = d.connect_timeout_secs;
        }
        if self.max_retries == 0 {
            self.max_retries = 1;
        }
        self.default_post_limit = self
            .default_post_limit
            .clamp(POST_LIMIT_RANGE.0, POST_LIMIT_RANGE.1);
        self.default_top_n = self.default_top_n.clamp(TOP_N_RANGE.0, TOP_N_RANGE.1);
    }

    pub fn cache_duration(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.cache_duration_minutes as i64)
    }

    pub fn warm_refresh(&self) -> Option<Duration> {
        (self.warm_refresh_secs > 0).then(|| Duration::from_secs(self.warm_refresh_secs))
    }
}

fn env_number<T: std::str::FromStr>(key: &str) -> Option<T> {
    let raw = std::env::var(key).ok()?;
    match raw.trim().parse::<T>() {
        Ok(v) => Some(v),
        Err(_) => {
            tracing::warn!(key, value = %raw, "ignoring unparseable env override");
            None
        }
    }
}

fn parse_config(s: &str, hint_ext: &str) -> Result<TrackerConfig> {
    if hint_ext == "json" {
        return Ok(serde_json::from_str(s)?);
    }
    match toml::from_str::<TrackerConfig>(s) {
        Ok(cfg) => Ok(cfg),
        Err(toml_err) => serde_json::from_str(s)
            .map_err(|_| anyhow!("unsupported tracker config format: {toml_err}")),
    }
}
