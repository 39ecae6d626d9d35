// src/fetch/html.rs
//! Degraded fallback: scrape post titles out of the rendered listing page.
//! Titles only, no bodies; used when both JSON feeds are down.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;

use super::{normalize_text, FetchError, FetchStrategy, PoliteClient, PostSet};
use crate::config::TrackerConfig;
use crate::models::Post;

// <shreddit-post ... id="t3_abc" post-title="..." score="12" created-timestamp="...">
static RE_SHREDDIT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<shreddit-post\b([^>]*)>").expect("shreddit regex"));
static RE_ATTR_ID: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"\bid="t3_([A-Za-z0-9]+)""#).expect("id attr regex"));
static RE_ATTR_TITLE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"\bpost-title="([^"]*)""#).expect("title attr regex"));
static RE_ATTR_SCORE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"\bscore="(-?\d+)""#).expect("score attr regex"));
static RE_ATTR_CREATED: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"\bcreated-timestamp="([^"]+)""#).expect("created attr regex"));

// Older markup: <h3 class="...Post..."> ... <a href="/r/x/comments/<id>/slug/">Title</a>
static RE_LEGACY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?is)<h3[^>]*class="[^"]*Post[^"]*"[^>]*>.*?<a[^>]*href="/r/\w+/comments/([A-Za-z0-9]+)/[^"]*"[^>]*>([^<]+)</a>"#)
        .expect("legacy post regex")
});

/// Extract up to `limit` posts from a listing page. `now` stamps posts whose markup has no time.
pub fn parse_html(html: &str, limit: usize, now: DateTime<Utc>) -> Vec<Post> {
    let mut set = PostSet::with_limit(limit);

    let modern = RE_SHREDDIT.captures_iter(html).filter_map(|cap| {
        let attrs = cap.get(1)?.as_str();
        let id = RE_ATTR_ID.captures(attrs)?.get(1)?.as_str().to_string();
        let title = normalize_text(RE_ATTR_TITLE.captures(attrs)?.get(1)?.as_str());
        if title.is_empty() {
            return None;
        }
        let score = RE_ATTR_SCORE
            .captures(attrs)
            .and_then(|c| c[1].parse::<i64>().ok())
            .unwrap_or(0);
        let created_at = RE_ATTR_CREATED
            .captures(attrs)
            .and_then(|c| {
                DateTime::parse_from_rfc3339(&c[1])
                    .or_else(|_| DateTime::parse_from_str(&c[1], "%Y-%m-%dT%H:%M:%S%.f%z"))
                    .ok()
            })
            .map(|t| t.with_timezone(&Utc))
            .unwrap_or(now);
        Some(Post {
            id,
            title,
            body: String::new(),
            comments: Vec::new(),
            created_at,
            score,
        })
    });
    set.extend(modern);

    if !set.is_full() {
        let legacy = RE_LEGACY.captures_iter(html).filter_map(|cap| {
            let title = normalize_text(&cap[2]);
            (!title.is_empty()).then(|| Post {
                id: cap[1].to_string(),
                title,
                body: String::new(),
                comments: Vec::new(),
                created_at: now,
                score: 0,
            })
        });
        set.extend(legacy);
    }

    set.into_vec()
}

pub struct HtmlStrategy {
    page_url: String,
}

impl HtmlStrategy {
    pub fn new(page_url: impl Into<String>) -> Self {
        Self {
            page_url: page_url.into(),
        }
    }

    pub fn from_config(cfg: &TrackerConfig) -> Self {
        Self::new(format!(
            "{}/r/{}/",
            cfg.base_url.trim_end_matches('/'),
            cfg.subreddit
        ))
    }
}

#[async_trait]
impl FetchStrategy for HtmlStrategy {
    fn name(&self) -> &'static str {
        "html"
    }

    async fn fetch(&self, client: &PoliteClient, limit: usize) -> Result<Vec<Post>, FetchError> {
        let body = client
            .get_text(&self.page_url, "text/html,application/xhtml+xml")
            .await?;
        Ok(parse_html(&body, limit, Utc::now()))
    }
}
