// tests/fetch_fallback.rs
//
// Content fetcher behaviour.
//
// Covered:
// - ordered fallback over scripted strategies (first non-empty wins)
// - all-empty → Ok(empty), all-failed → SourceUnavailable
// - dedup + limit, zero limit, inter-strategy pause
// - against a loopback axum server: 429 backoff + retry, RateLimited after
//   max_retries, HTML fallback when both JSON feeds fail, comment attachment,
//   `after` pagination with duplicates across pages and across feeds

use async_trait::async_trait;
use chrono::Utc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use axum::{extract::Query, http::StatusCode, response::IntoResponse, routing::get, Router};
use ticker_sentiment_tracker::config::TrackerConfig;
use ticker_sentiment_tracker::fetch::{
    ContentFetcher, FetchError, FetchStrategy, PoliteClient, PostSource,
};
use ticker_sentiment_tracker::models::Post;

fn post(id: &str) -> Post {
    Post {
        id: id.into(),
        title: format!("post {id}"),
        body: String::new(),
        comments: vec![],
        created_at: Utc::now(),
        score: 0,
    }
}

enum Script {
    Posts(Vec<&'static str>),
    Fail,
}

struct Scripted {
    name: &'static str,
    script: Script,
    calls: Arc<AtomicUsize>,
}

impl Scripted {
    fn boxed(name: &'static str, script: Script) -> (Box<dyn FetchStrategy>, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let s = Scripted {
            name,
            script,
            calls: calls.clone(),
        };
        (Box::new(s), calls)
    }
}

#[async_trait]
impl FetchStrategy for Scripted {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn fetch(&self, _client: &PoliteClient, _limit: usize) -> Result<Vec<Post>, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.script {
            Script::Posts(ids) => Ok(ids.iter().map(|id| post(id)).collect()),
            Script::Fail => Err(FetchError::Status(503)),
        }
    }
}

fn quiet_config() -> TrackerConfig {
    TrackerConfig {
        request_delay_ms: 0,
        rate_limit_backoff_secs: 0,
        strategy_pause_ms: 0,
        request_timeout_secs: 5,
        ..TrackerConfig::default()
    }
}

fn client() -> PoliteClient {
    PoliteClient::from_config(&quiet_config()).unwrap()
}

#[tokio::test]
async fn first_non_empty_strategy_wins() {
    let (a, a_calls) = Scripted::boxed("a", Script::Fail);
    let (b, b_calls) = Scripted::boxed("b", Script::Posts(vec![]));
    let (c, c_calls) = Scripted::boxed("c", Script::Posts(vec!["1", "2"]));
    let (d, d_calls) = Scripted::boxed("d", Script::Posts(vec!["9"]));
    let f = ContentFetcher::new(client(), vec![a, b, c, d]);

    let posts = f.fetch(10).await.unwrap();
    let ids: Vec<_> = posts.iter().map(|p| p.id.as_str()).collect();
    assert_eq!(ids, vec!["1", "2"]);
    assert_eq!(a_calls.load(Ordering::SeqCst), 1);
    assert_eq!(b_calls.load(Ordering::SeqCst), 1);
    assert_eq!(c_calls.load(Ordering::SeqCst), 1);
    assert_eq!(d_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn all_failed_is_source_unavailable() {
    let (a, _) = Scripted::boxed("json-feed", Script::Fail);
    let (b, _) = Scripted::boxed("mirror", Script::Fail);
    let f = ContentFetcher::new(client(), vec![a, b]);

    match f.fetch(10).await {
        Err(FetchError::SourceUnavailable { attempts }) => {
            assert_eq!(attempts.len(), 2);
            assert!(attempts[0].starts_with("json-feed"));
            assert!(attempts[1].starts_with("mirror"));
        }
        other => panic!("expected SourceUnavailable, got {other:?}"),
    }
}

#[tokio::test]
async fn empty_and_failed_mix_is_a_valid_empty_batch() {
    let (a, _) = Scripted::boxed("a", Script::Fail);
    let (b, _) = Scripted::boxed("b", Script::Posts(vec![]));
    let f = ContentFetcher::new(client(), vec![a, b]);
    assert!(f.fetch(10).await.unwrap().is_empty());
}

#[tokio::test]
async fn duplicates_dropped_and_limit_respected() {
    let (a, _) = Scripted::boxed("a", Script::Posts(vec!["1", "2", "1", "3", "4"]));
    let f = ContentFetcher::new(client(), vec![a]);
    let ids: Vec<_> = f.fetch(3).await.unwrap().into_iter().map(|p| p.id).collect();
    assert_eq!(ids, vec!["1", "2", "3"]);
}

#[tokio::test]
async fn zero_limit_never_touches_strategies() {
    let (a, calls) = Scripted::boxed("a", Script::Posts(vec!["1"]));
    let f = ContentFetcher::new(client(), vec![a]);
    assert!(f.fetch(0).await.unwrap().is_empty());
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn pauses_between_failed_strategies() {
    let (a, _) = Scripted::boxed("a", Script::Fail);
    let (b, _) = Scripted::boxed("b", Script::Fail);
    let (c, _) = Scripted::boxed("c", Script::Posts(vec!["1"]));
    let f = ContentFetcher::new(client(), vec![a, b, c])
        .with_strategy_pause(Duration::from_millis(40));

    let t0 = Instant::now();
    assert_eq!(f.fetch(5).await.unwrap().len(), 1);
    assert!(t0.elapsed() >= Duration::from_millis(80));
}

// ---- loopback server ----

const LISTING: &str = r#"{"kind":"Listing","data":{"after":null,"children":[
  {"kind":"t3","data":{"id":"a1","title":"$GME squeeze","selftext":"great","created_utc":1700000000,"score":3}},
  {"kind":"t3","data":{"id":"a2","title":"AMC news","selftext":"","created_utc":1700000100,"score":1}}
]}}"#;

const COMMENTS: &str = r#"[
  {"kind":"Listing","data":{"children":[]}},
  {"kind":"Listing","data":{"children":[
    {"kind":"t1","data":{"body":"TSLA too"}},
    {"kind":"t1","data":{"body":"[deleted]"}}
  ]}}
]"#;

const HTML: &str = r#"<html><body>
  <shreddit-post id="t3_h1" post-title="NVDA to the moon" score="7"></shreddit-post>
</body></html>"#;

async fn serve(app: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

fn config_for(base: &str) -> TrackerConfig {
    TrackerConfig {
        subreddit: "stocks".into(),
        base_url: base.into(),
        mirror_base_url: format!("{base}/mirror"),
        feeds: vec!["hot".into()],
        max_retries: 3,
        ..quiet_config()
    }
}

#[tokio::test]
async fn rate_limited_page_is_retried_after_backoff() {
    let hits = Arc::new(AtomicUsize::new(0));
    let h = hits.clone();
    let app = Router::new().route(
        "/r/stocks/hot.json",
        get(move || {
            let h = h.clone();
            async move {
                if h.fetch_add(1, Ordering::SeqCst) == 0 {
                    (StatusCode::TOO_MANY_REQUESTS, "slow down").into_response()
                } else {
                    LISTING.into_response()
                }
            }
        }),
    );
    let base = serve(app).await;

    let f = ContentFetcher::from_config(&config_for(&base)).unwrap();
    let posts = f.fetch(10).await.unwrap();
    let ids: Vec<_> = posts.iter().map(|p| p.id.as_str()).collect();
    assert_eq!(ids, vec!["a1", "a2"]);
    assert_eq!(hits.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn persistent_429_surfaces_as_rate_limited() {
    let app = Router::new().route(
        "/r/stocks/hot.json",
        get(|| async { (StatusCode::TOO_MANY_REQUESTS, "no") }),
    );
    let base = serve(app).await;

    let c = PoliteClient::from_config(&config_for(&base)).unwrap();
    let err = c
        .get_text(&format!("{base}/r/stocks/hot.json"), "application/json")
        .await
        .unwrap_err();
    assert!(matches!(err, FetchError::RateLimited(3)));
}

#[tokio::test]
async fn html_page_is_the_last_resort() {
    let app = Router::new()
        .route(
            "/r/stocks/hot.json",
            get(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "boom") }),
        )
        .route("/r/stocks/", get(|| async { HTML }));
    let base = serve(app).await;

    let f = ContentFetcher::from_config(&config_for(&base)).unwrap();
    assert_eq!(f.strategy_names(), vec!["json-feed", "mirror", "html"]);
    let posts = f.fetch(10).await.unwrap();
    assert_eq!(posts.len(), 1);
    assert_eq!(posts[0].id, "h1");
    assert_eq!(posts[0].title, "NVDA to the moon");
}

#[tokio::test]
async fn comments_are_attached_when_enabled() {
    let app = Router::new()
        .route("/r/stocks/hot.json", get(|| async { LISTING }))
        .route("/comments/a1.json", get(|| async { COMMENTS }));
    let base = serve(app).await;

    let cfg = TrackerConfig {
        fetch_comments: true,
        comment_limit: 5,
        ..config_for(&base)
    };
    let posts = ContentFetcher::from_config(&cfg).unwrap().fetch(10).await.unwrap();
    assert_eq!(posts[0].comments, vec!["TSLA too".to_string()]);
    // a2 has no comment route: 404 leaves it empty
    assert!(posts[1].comments.is_empty());
}

fn page(ids: &[&str], after: Option<&str>) -> String {
    let children = ids
        .iter()
        .map(|id| {
            format!(
                r#"{{"kind":"t3","data":{{"id":"{id}","title":"post {id}","created_utc":1700000000}}}}"#
            )
        })
        .collect::<Vec<_>>()
        .join(",");
    let after = after.map_or("null".to_string(), |a| format!("\"{a}\""));
    format!(r#"{{"kind":"Listing","data":{{"after":{after},"children":[{children}]}}}}"#)
}

/// Serves `/r/stocks/{feed}.json` from a table keyed by the `after` token
/// (empty string for the first page) and records every token asked for.
fn paged_feed(pages: Vec<(&'static str, String)>, seen: Arc<Mutex<Vec<String>>>) -> axum::routing::MethodRouter {
    let pages: Arc<HashMap<&'static str, String>> = Arc::new(pages.into_iter().collect());
    get(move |Query(q): Query<HashMap<String, String>>| {
        let pages = pages.clone();
        let seen = seen.clone();
        async move {
            let after = q.get("after").cloned().unwrap_or_default();
            seen.lock().unwrap().push(after.clone());
            match pages.get(after.as_str()) {
                Some(body) => body.clone().into_response(),
                None => StatusCode::NOT_FOUND.into_response(),
            }
        }
    })
}

#[tokio::test]
async fn listing_follows_after_tokens_and_drops_repeats() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let hot = paged_feed(
        vec![
            ("", page(&["a", "b"], Some("p2"))),
            ("p2", page(&["b", "c"], Some("p3"))),
            ("p3", page(&["d"], None)),
        ],
        seen.clone(),
    );
    let base = serve(Router::new().route("/r/stocks/hot.json", hot)).await;

    let posts = ContentFetcher::from_config(&config_for(&base))
        .unwrap()
        .fetch(10)
        .await
        .unwrap();
    let ids: Vec<_> = posts.iter().map(|p| p.id.as_str()).collect();
    assert_eq!(ids, vec!["a", "b", "c", "d"]);
    assert_eq!(*seen.lock().unwrap(), vec!["", "p2", "p3"]);
}

#[tokio::test]
async fn next_feed_fills_up_to_the_limit() {
    let hot_seen = Arc::new(Mutex::new(Vec::new()));
    let new_seen = Arc::new(Mutex::new(Vec::new()));
    let hot = paged_feed(
        vec![
            ("", page(&["a", "b"], Some("h2"))),
            ("h2", page(&["c"], None)),
        ],
        hot_seen.clone(),
    );
    let new = paged_feed(
        vec![
            ("", page(&["b", "e"], Some("n2"))),
            ("n2", page(&["f", "g", "h"], Some("n3"))),
            ("n3", page(&["z"], None)),
        ],
        new_seen.clone(),
    );
    let base = serve(
        Router::new()
            .route("/r/stocks/hot.json", hot)
            .route("/r/stocks/new.json", new),
    )
    .await;

    let cfg = TrackerConfig {
        feeds: vec!["hot".into(), "new".into()],
        ..config_for(&base)
    };
    let posts = ContentFetcher::from_config(&cfg).unwrap().fetch(6).await.unwrap();
    let ids: Vec<_> = posts.iter().map(|p| p.id.as_str()).collect();
    assert_eq!(ids, vec!["a", "b", "c", "e", "f", "g"]);
    assert_eq!(*hot_seen.lock().unwrap(), vec!["", "h2"]);
    // limit reached on the second page of `new`; the third is never requested
    assert_eq!(*new_seen.lock().unwrap(), vec!["", "n2"]);
}
