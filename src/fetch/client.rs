// src/fetch/client.rs
//! Rate-limited HTTP client shared by every fetch strategy.
//!
//! Requests are serialized through one pacing lock so consecutive calls are at
//! least `min_delay` apart, user agents rotate per request, and a 429 triggers a
//! fixed backoff before the retry.

use metrics::counter;
use reqwest::header::{ACCEPT, ACCEPT_LANGUAGE, CACHE_CONTROL, USER_AGENT};
use reqwest::StatusCode;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

use super::FetchError;
use crate::config::TrackerConfig;

pub struct PoliteClient {
    http: reqwest::Client,
    user_agents: Vec<String>,
    next_agent: AtomicUsize,
    last_request: Mutex<Option<Instant>>,
    min_delay: Duration,
    backoff: Duration,
    max_retries: u32,
}

impl PoliteClient {
    pub fn from_config(cfg: &TrackerConfig) -> Result<Self, FetchError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(cfg.request_timeout_secs))
            .connect_timeout(Duration::from_secs(cfg.connect_timeout_secs))
            .build()?;

        Ok(Self {
            http,
            user_agents: cfg.user_agents.clone(),
            next_agent: AtomicUsize::new(0),
            last_request: Mutex::new(None),
            min_delay: Duration::from_millis(cfg.request_delay_ms),
            backoff: Duration::from_secs(cfg.rate_limit_backoff_secs),
            max_retries: cfg.max_retries.max(1),
        })
    }

    /// Override pacing (tests use short delays).
    pub fn with_pacing(mut self, min_delay: Duration, backoff: Duration) -> Self {
        self.min_delay = min_delay;
        self.backoff = backoff;
        self
    }

    pub fn min_delay(&self) -> Duration {
        self.min_delay
    }

    /// Round-robin over the configured user agents.
    pub fn rotate_agent(&self) -> &str {
        if self.user_agents.is_empty() {
            return concat!("ticker-sentiment-tracker/", env!("CARGO_PKG_VERSION"));
        }
        let i = self.next_agent.fetch_add(1, Ordering::Relaxed) % self.user_agents.len();
        &self.user_agents[i]
    }

    /// Waits until `min_delay` has passed since the previous request, then claims the slot.
    pub async fn pace(&self) {
        let mut last = self.last_request.lock().await;
        if let Some(prev) = *last {
            let next_allowed = prev + self.min_delay;
            let now = Instant::now();
            if next_allowed > now {
                tokio::time::sleep_until(next_allowed).await;
            }
        }
        *last = Some(Instant::now());
    }

    /// GET `url` and return the body. Retries 429 up to `max_retries` attempts.
    pub async fn get_text(&self, url: &str, accept: &str) -> Result<String, FetchError> {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            self.pace().await;

            let resp = self
                .http
                .get(url)
                .header(USER_AGENT, self.rotate_agent())
                .header(ACCEPT, accept)
                .header(ACCEPT_LANGUAGE, "en-US,en;q=0.9")
                .header(CACHE_CONTROL, "no-cache")
                .send()
                .await?;

            let status = resp.status();
            if status == StatusCode::TOO_MANY_REQUESTS {
                counter!("fetch_rate_limited_total").increment(1);
                if attempt >= self.max_retries {
                    return Err(FetchError::RateLimited(attempt));
                }
                tracing::warn!(
                    target: "fetch",
                    url,
                    attempt,
                    backoff_secs = self.backoff.as_secs_f64(),
                    "rate limited, backing off"
                );
                tokio::time::sleep(self.backoff).await;
                continue;
            }
            if !status.is_success() {
                return Err(FetchError::Status(status.as_u16()));
            }

            return Ok(resp.text().await?);
        }
    }
}
