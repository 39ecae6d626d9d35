// src/fetch/mod.rs
//! Content fetcher: ordered fallback over fetch strategies, dedup by post id,
//! optional comment attachment.

pub mod client;
pub mod html;
pub mod listing;

use async_trait::async_trait;
use metrics::{counter, describe_counter, describe_histogram};
use once_cell::sync::OnceCell;
use std::collections::HashSet;
use std::time::{Duration, Instant};

use crate::config::TrackerConfig;
use crate::models::Post;

pub use client::PoliteClient;
pub use html::HtmlStrategy;
pub use listing::ListingStrategy;

/// Longest text kept per post unit, in chars.
pub const MAX_TEXT_CHARS: usize = 10_000;

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    /// Every strategy failed. The pipeline may fall back to stale cache on this.
    #[error("content source unavailable: {}", .attempts.join("; "))]
    SourceUnavailable { attempts: Vec<String> },
    #[error("rate limited by upstream after {0} attempts")]
    RateLimited(u32),
    #[error("upstream returned HTTP {0}")]
    Status(u16),
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("unexpected payload: {0}")]
    Parse(String),
}

/// Anything that can hand the pipeline a bounded batch of posts.
#[async_trait]
pub trait PostSource: Send + Sync {
    async fn fetch(&self, limit: usize) -> Result<Vec<Post>, FetchError>;
}

/// One concrete way of retrieving posts, tried in a fixed order by `ContentFetcher`.
#[async_trait]
pub trait FetchStrategy: Send + Sync {
    fn name(&self) -> &'static str;
    async fn fetch(&self, client: &PoliteClient, limit: usize) -> Result<Vec<Post>, FetchError>;
}

/// One-time metrics registration (so series show up on /metrics).
fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("fetch_posts_total", "Posts returned by the content fetcher.");
        describe_counter!(
            "fetch_strategy_errors_total",
            "Fetch strategies that failed or came back empty."
        );
        describe_counter!(
            "fetch_rate_limited_total",
            "HTTP 429 responses from the content source."
        );
        describe_histogram!("fetch_duration_ms", "Wall time of one fetch call.");
    });
}

/// Normalize post text: decode entities, drop tags, collapse whitespace, cap length.
pub fn normalize_text(s: &str) -> String {
    let mut out = html_escape::decode_html_entities(s).to_string();

    static RE_TAGS: OnceCell<regex::Regex> = OnceCell::new();
    let re_tags = RE_TAGS.get_or_init(|| regex::Regex::new(r"(?is)</?[a-z][^>]*>").expect("tag regex"));
    out = re_tags.replace_all(&out, " ").to_string();

    out = out
        .replace(['\u{201C}', '\u{201D}', '\u{00AB}', '\u{00BB}'], "\"")
        .replace(['\u{2018}', '\u{2019}'], "'");

    out = out.split_whitespace().collect::<Vec<_>>().join(" ");

    if out.chars().count() > MAX_TEXT_CHARS {
        out = out.chars().take(MAX_TEXT_CHARS).collect();
    }
    out
}

/// Insertion-ordered, id-deduplicated, bounded post collection.
#[derive(Debug, Default)]
pub struct PostSet {
    seen: HashSet<String>,
    posts: Vec<Post>,
    limit: usize,
}

impl PostSet {
    pub fn with_limit(limit: usize) -> Self {
        Self {
            seen: HashSet::new(),
            posts: Vec::new(),
            limit,
        }
    }

    /// Adds unseen posts until full. Returns how many were added.
    pub fn extend(&mut self, posts: impl IntoIterator<Item = Post>) -> usize {
        let mut added = 0;
        for p in posts {
            if self.is_full() {
                break;
            }
            if self.seen.insert(p.id.clone()) {
                self.posts.push(p);
                added += 1;
            }
        }
        added
    }

    pub fn len(&self) -> usize {
        self.posts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.posts.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.posts.len() >= self.limit
    }

    pub fn into_vec(self) -> Vec<Post> {
        self.posts
    }
}

#[derive(Debug, Clone)]
struct CommentFetch {
    base_url: String,
    limit: usize,
}

pub struct ContentFetcher {
    client: PoliteClient,
    strategies: Vec<Box<dyn FetchStrategy>>,
    comments: Option<CommentFetch>,
    strategy_pause: Duration,
}

impl ContentFetcher {
    pub fn new(client: PoliteClient, strategies: Vec<Box<dyn FetchStrategy>>) -> Self {
        Self {
            client,
            strategies,
            comments: None,
            strategy_pause: Duration::ZERO,
        }
    }

    /// JSON feed → mirror → degraded HTML, paced and timed out per `cfg`.
    pub fn from_config(cfg: &TrackerConfig) -> Result<Self, FetchError> {
        let client = PoliteClient::from_config(cfg)?;
        let strategies: Vec<Box<dyn FetchStrategy>> = vec![
            Box::new(ListingStrategy::primary(cfg)),
            Box::new(ListingStrategy::mirror(cfg)),
            Box::new(HtmlStrategy::from_config(cfg)),
        ];

        let mut fetcher =
            Self::new(client, strategies).with_strategy_pause(Duration::from_millis(cfg.strategy_pause_ms));
        if cfg.fetch_comments {
            fetcher = fetcher.with_comments(&cfg.base_url, cfg.comment_limit);
        }
        Ok(fetcher)
    }

    pub fn with_comments(mut self, base_url: &str, limit: usize) -> Self {
        self.comments = Some(CommentFetch {
            base_url: base_url.trim_end_matches('/').to_string(),
            limit,
        });
        self
    }

    pub fn with_strategy_pause(mut self, pause: Duration) -> Self {
        self.strategy_pause = pause;
        self
    }

    pub fn strategy_names(&self) -> Vec<&'static str> {
        self.strategies.iter().map(|s| s.name()).collect()
    }

    /// Best effort: a failed comment fetch leaves that post without comments.
    async fn attach_comments(&self, posts: &mut [Post]) {
        let Some(cf) = &self.comments else {
            return;
        };
        if cf.limit == 0 {
            return;
        }
        for post in posts.iter_mut().filter(|p| p.comments.is_empty()) {
            let url = format!(
                "{}/comments/{}.json?limit={}&raw_json=1",
                cf.base_url, post.id, cf.limit
            );
            let res = self
                .client
                .get_text(&url, "application/json")
                .await
                .and_then(|body| listing::parse_comments(&body, cf.limit));
            match res {
                Ok(c) => post.comments = c,
                Err(e) => {
                    tracing::debug!(target: "fetch", post = %post.id, error = %e, "comment fetch failed");
                }
            }
        }
    }
}

#[async_trait]
impl PostSource for ContentFetcher {
    async fn fetch(&self, limit: usize) -> Result<Vec<Post>, FetchError> {
        ensure_metrics_described();
        if limit == 0 {
            return Ok(Vec::new());
        }

        let t0 = Instant::now();
        let mut attempts = Vec::with_capacity(self.strategies.len());
        let mut saw_empty = false;

        for (i, strategy) in self.strategies.iter().enumerate() {
            match strategy.fetch(&self.client, limit).await {
                Ok(posts) if !posts.is_empty() => {
                    let mut set = PostSet::with_limit(limit);
                    set.extend(posts);
                    let mut posts = set.into_vec();
                    self.attach_comments(&mut posts).await;

                    counter!("fetch_posts_total").increment(posts.len() as u64);
                    metrics::histogram!("fetch_duration_ms")
                        .record(t0.elapsed().as_secs_f64() * 1_000.0);
                    tracing::info!(
                        target: "fetch",
                        strategy = strategy.name(),
                        posts = posts.len(),
                        "fetched posts"
                    );
                    return Ok(posts);
                }
                Ok(_) => {
                    saw_empty = true;
                    counter!("fetch_strategy_errors_total").increment(1);
                    tracing::warn!(target: "fetch", strategy = strategy.name(), "strategy returned no posts");
                    attempts.push(format!("{}: empty", strategy.name()));
                }
                Err(e) => {
                    counter!("fetch_strategy_errors_total").increment(1);
                    tracing::warn!(target: "fetch", strategy = strategy.name(), error = %e, "strategy failed");
                    attempts.push(format!("{}: {e}", strategy.name()));
                }
            }

            if i + 1 < self.strategies.len() && !self.strategy_pause.is_zero() {
                tokio::time::sleep(self.strategy_pause).await;
            }
        }

        if saw_empty {
            // Reachable but nothing to read: a valid empty batch, not an outage.
            return Ok(Vec::new());
        }
        Err(FetchError::SourceUnavailable { attempts })
    }
}
