// src/fetch/listing.rs
//! JSON listing feeds (primary and mirror), plus comment-thread parsing.

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use serde::Deserialize;

use super::{normalize_text, FetchError, FetchStrategy, PoliteClient, PostSet};
use crate::config::TrackerConfig;
use crate::models::Post;

/// Largest page the listing endpoints return.
pub const PAGE_SIZE: usize = 100;

#[derive(Debug, Deserialize)]
struct Listing {
    data: ListingData,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ListingData {
    children: Vec<Thing>,
    after: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Thing {
    kind: String,
    #[serde(default)]
    data: ThingData,
}

/// Union of the post (`t3`) and comment (`t1`) fields we read.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ThingData {
    id: String,
    title: Option<String>,
    selftext: Option<String>,
    body: Option<String>,
    created_utc: f64,
    score: i64,
    stickied: bool,
    pinned: bool,
}

/// One decoded listing page.
#[derive(Debug, Default)]
pub struct ListingPage {
    pub posts: Vec<Post>,
    pub after: Option<String>,
}

fn timestamp(secs: f64) -> DateTime<Utc> {
    Utc.timestamp_opt(secs as i64, 0).single().unwrap_or_else(Utc::now)
}

/// Decode a listing page. Skips non-post things, stickied/pinned posts and posts without a title.
pub fn parse_listing(raw: &str) -> Result<ListingPage, FetchError> {
    let listing: Listing =
        serde_json::from_str(raw).map_err(|e| FetchError::Parse(format!("listing: {e}")))?;

    let posts = listing
        .data
        .children
        .into_iter()
        .filter(|t| t.kind == "t3")
        .map(|t| t.data)
        .filter(|d| !d.stickied && !d.pinned && !d.id.is_empty())
        .filter_map(|d| {
            let title = normalize_text(d.title.as_deref().unwrap_or_default());
            if title.is_empty() {
                return None;
            }
            Some(Post {
                id: d.id,
                title,
                body: normalize_text(d.selftext.as_deref().unwrap_or_default()),
                comments: Vec::new(),
                created_at: timestamp(d.created_utc),
                score: d.score,
            })
        })
        .collect();

    Ok(ListingPage {
        posts,
        after: listing.data.after.filter(|a| !a.is_empty()),
    })
}

/// Decode a comment thread (`[post_listing, comment_listing]`) into at most `limit` bodies.
pub fn parse_comments(raw: &str, limit: usize) -> Result<Vec<String>, FetchError> {
    let parts: Vec<Listing> =
        serde_json::from_str(raw).map_err(|e| FetchError::Parse(format!("comments: {e}")))?;

    let Some(thread) = parts.into_iter().nth(1) else {
        return Ok(Vec::new());
    };

    Ok(thread
        .data
        .children
        .into_iter()
        .filter(|t| t.kind == "t1")
        .filter_map(|t| t.data.body)
        .filter(|b| b != "[deleted]" && b != "[removed]")
        .map(|b| normalize_text(&b))
        .filter(|b| !b.is_empty())
        .take(limit)
        .collect())
}

/// Paginated JSON feed over one or more sort orders of the configured community.
pub struct ListingStrategy {
    name: &'static str,
    base_url: String,
    subreddit: String,
    feeds: Vec<String>,
}

impl ListingStrategy {
    pub fn new(name: &'static str, base_url: &str, subreddit: &str, feeds: Vec<String>) -> Self {
        Self {
            name,
            base_url: base_url.trim_end_matches('/').to_string(),
            subreddit: subreddit.to_string(),
            feeds,
        }
    }

    pub fn primary(cfg: &TrackerConfig) -> Self {
        Self::new("json-feed", &cfg.base_url, &cfg.subreddit, cfg.feeds.clone())
    }

    /// Alternate host, hot feed only.
    pub fn mirror(cfg: &TrackerConfig) -> Self {
        Self::new("mirror", &cfg.mirror_base_url, &cfg.subreddit, vec!["hot".into()])
    }

    pub fn page_url(&self, feed: &str, limit: usize, after: Option<&str>) -> String {
        let mut url = format!(
            "{}/r/{}/{}.json?limit={}&raw_json=1",
            self.base_url, self.subreddit, feed, limit
        );
        if feed == "top" {
            url.push_str("&t=day");
        }
        if let Some(a) = after {
            url.push_str("&after=");
            url.push_str(a);
        }
        url
    }
}

#[async_trait]
impl FetchStrategy for ListingStrategy {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn fetch(&self, client: &PoliteClient, limit: usize) -> Result<Vec<Post>, FetchError> {
        let mut merged = PostSet::with_limit(limit);
        let mut last_err = None;

        for feed in &self.feeds {
            let mut after: Option<String> = None;
            while !merged.is_full() {
                let want = (limit - merged.len()).min(PAGE_SIZE);
                let url = self.page_url(feed, want, after.as_deref());

                let page = match client
                    .get_text(&url, "application/json")
                    .await
                    .and_then(|body| parse_listing(&body))
                {
                    Ok(p) => p,
                    Err(e) => {
                        tracing::debug!(target: "fetch", strategy = self.name, feed = %feed, error = %e, "page failed");
                        last_err = Some(e);
                        break;
                    }
                };

                let added = merged.extend(page.posts);
                match page.after {
                    Some(a) if added > 0 => after = Some(a),
                    _ => break,
                }
            }
            if merged.is_full() {
                break;
            }
        }

        match last_err {
            Some(e) if merged.is_empty() => Err(e),
            _ => Ok(merged.into_vec()),
        }
    }
}
