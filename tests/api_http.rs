// tests/api_http.rs
//
// HTTP-level tests for the public API Router without opening sockets.
// We exercise the router directly via tower::ServiceExt::oneshot.
//
// Covered:
// - GET /health
// - GET /api/stocks (defaults, bounds → 400, cache flag, source down → 500)
// - DELETE /api/stocks + GET /api/status
// - POST/GET /api/symbols
// - GET /api/insights

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{json, Value as Json};
use shuttle_axum::axum::{
    body::{self, Body},
    http::{Request, StatusCode},
    Router,
};
use std::sync::Arc;
use tower::ServiceExt as _; // for `oneshot`

use ticker_sentiment_tracker::fetch::{FetchError, PostSource};
use ticker_sentiment_tracker::models::Post;
use ticker_sentiment_tracker::{create_router, AppState, Pipeline, TrackerConfig};

const BODY_LIMIT: usize = 1024 * 1024;

struct StaticSource(Option<Vec<Post>>);

#[async_trait]
impl PostSource for StaticSource {
    async fn fetch(&self, limit: usize) -> Result<Vec<Post>, FetchError> {
        match &self.0 {
            Some(p) => Ok(p.iter().take(limit).cloned().collect()),
            None => Err(FetchError::SourceUnavailable { attempts: vec![] }),
        }
    }
}

fn post(id: &str, title: &str) -> Post {
    Post {
        id: id.into(),
        title: title.into(),
        body: String::new(),
        comments: vec![],
        created_at: Utc::now(),
        score: 1,
    }
}

fn posts() -> Vec<Post> {
    vec![
        post("1", "$GME to the moon, great buy!"),
        post("2", "GME is a scam, terrible bagholders"),
        post("3", "NVDA looks great"),
        post("4", "QX is a two letter thing"),
    ]
}

fn app_with(source: StaticSource) -> Router {
    let pipeline = Arc::new(Pipeline::new(source, chrono::Duration::minutes(30)));
    create_router(AppState::new(pipeline, &TrackerConfig::default()))
}

fn app() -> Router {
    app_with(StaticSource(Some(posts())))
}

async fn call(app: &Router, method: &str, uri: &str, body: Option<Json>) -> (StatusCode, Json) {
    let mut req = Request::builder().method(method).uri(uri);
    let body = match body {
        Some(v) => {
            req = req.header("content-type", "application/json");
            Body::from(v.to_string())
        }
        None => Body::empty(),
    };
    let resp = app
        .clone()
        .oneshot(req.body(body).expect("build request"))
        .await
        .expect("oneshot");
    let status = resp.status();
    let bytes = body::to_bytes(resp.into_body(), BODY_LIMIT)
        .await
        .expect("read body")
        .to_vec();
    let v = serde_json::from_slice(&bytes).unwrap_or(Json::Null);
    (status, v)
}

#[tokio::test]
async fn health_returns_ok() {
    let resp = app()
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let bytes = body::to_bytes(resp.into_body(), BODY_LIMIT).await.unwrap();
    assert_eq!(&bytes[..], b"ok");
}

#[tokio::test]
async fn stocks_uses_defaults_and_caches() {
    let app = app();

    let (status, v) = call(&app, "GET", "/api/stocks", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(v["success"], json!(true));
    assert_eq!(v["cached"], json!(false));
    assert_eq!(v["stale"], json!(false));
    assert!(v["last_updated"].is_string());

    let data = v["data"].as_array().expect("data array");
    assert_eq!(data[0]["symbol"], json!("GME"));
    assert_eq!(data[0]["mention_count"], json!(2));
    assert!(data[0]["sentiment"]["compound"].is_number());

    let (_, again) = call(&app, "GET", "/api/stocks?top_n=5", None).await;
    assert_eq!(again["cached"], json!(true));
}

#[tokio::test]
async fn stocks_rejects_out_of_range_params() {
    let app = app();
    for uri in [
        "/api/stocks?post_limit=5",
        "/api/stocks?post_limit=501",
        "/api/stocks?top_n=4",
        "/api/stocks?top_n=51",
    ] {
        let (status, v) = call(&app, "GET", uri, None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{uri}");
        assert_eq!(v["success"], json!(false));
        assert!(v["error"].as_str().unwrap().contains("between"));
    }
}

#[tokio::test]
async fn source_down_without_cache_is_500() {
    let app = app_with(StaticSource(None));
    let (status, v) = call(&app, "GET", "/api/stocks?force_refresh=true", None).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(v["success"], json!(false));
    assert!(v.get("data").is_none());
}

#[tokio::test]
async fn clear_and_status() {
    let app = app();

    let (_, v) = call(&app, "GET", "/api/status", None).await;
    assert_eq!(v["data"]["exists"], json!(false));

    call(&app, "GET", "/api/stocks?post_limit=100", None).await;
    let (_, v) = call(&app, "GET", "/api/status", None).await;
    assert_eq!(v["data"]["exists"], json!(true));
    assert_eq!(v["data"]["fresh"], json!(true));
    assert_eq!(v["data"]["source_post_count"], json!(4));
    assert_eq!(v["data"]["cached_post_limits"], json!([100]));

    let (status, v) = call(&app, "DELETE", "/api/stocks", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(v["success"], json!(true));

    let (_, v) = call(&app, "GET", "/api/status", None).await;
    assert_eq!(v["data"]["exists"], json!(false));
}

#[tokio::test]
async fn symbols_can_be_added_and_listed() {
    let app = app();

    let (status, v) = call(&app, "POST", "/api/symbols", Some(json!({ "add": ["QX"] }))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(v["data"]["added"], json!(1));

    let (_, v) = call(&app, "GET", "/api/symbols", None).await;
    let known: Vec<_> = v["data"].as_array().unwrap().iter().filter_map(|s| s.as_str()).collect();
    assert!(known.contains(&"QX"));

    let (_, v) = call(&app, "GET", "/api/stocks?force_refresh=true", None).await;
    let symbols: Vec<_> = v["data"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|r| r["symbol"].as_str())
        .collect();
    assert!(symbols.contains(&"QX"));

    let (status, _) = call(&app, "POST", "/api/symbols", Some(json!({}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn insights_summarize_the_snapshot() {
    let app = app();
    let (status, v) = call(&app, "GET", "/api/insights", None).await;
    assert_eq!(status, StatusCode::OK);
    let d = &v["data"];
    assert_eq!(d["total_mentions"], json!(3));
    assert!(d["mood"].is_string());
    assert!(!d["recommendations"].as_array().unwrap().is_empty());
}
