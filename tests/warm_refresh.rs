// tests/warm_refresh.rs
use async_trait::async_trait;
use chrono::Utc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use ticker_sentiment_tracker::fetch::{FetchError, PostSource};
use ticker_sentiment_tracker::models::Post;
use ticker_sentiment_tracker::pipeline::{spawn_warm_refresh, Pipeline, WarmRefreshCfg};

#[derive(Clone, Default)]
struct Counting {
    calls: Arc<AtomicUsize>,
    fail: bool,
}

#[async_trait]
impl PostSource for Counting {
    async fn fetch(&self, _limit: usize) -> Result<Vec<Post>, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(FetchError::Status(502));
        }
        Ok(vec![Post {
            id: "1".into(),
            title: "AMC warm".into(),
            body: String::new(),
            comments: vec![],
            created_at: Utc::now(),
            score: 0,
        }])
    }
}

#[tokio::test]
async fn refreshes_repeatedly_and_fills_cache() {
    let src = Counting::default();
    let pipeline = Arc::new(Pipeline::new(src.clone(), chrono::Duration::minutes(30)));

    let handle = spawn_warm_refresh(
        pipeline.clone(),
        WarmRefreshCfg {
            every: Duration::from_millis(20),
            post_limit: 100,
            top_n: 20,
        },
    );
    tokio::time::sleep(Duration::from_millis(110)).await;
    handle.abort();

    // force refresh on every tick, never served from cache
    assert!(src.calls.load(Ordering::SeqCst) >= 3);
    let status = pipeline.status();
    assert!(status.exists);
    assert_eq!(status.cached_post_limits, vec![100]);
}

#[tokio::test]
async fn failures_do_not_stop_the_loop() {
    let src = Counting {
        fail: true,
        ..Counting::default()
    };
    let pipeline = Arc::new(Pipeline::new(src.clone(), chrono::Duration::minutes(30)));

    let handle = spawn_warm_refresh(
        pipeline.clone(),
        WarmRefreshCfg {
            every: Duration::from_millis(20),
            post_limit: 50,
            top_n: 10,
        },
    );
    tokio::time::sleep(Duration::from_millis(110)).await;
    assert!(!handle.is_finished());
    handle.abort();

    assert!(src.calls.load(Ordering::SeqCst) >= 3);
    assert!(!pipeline.status().exists);
}
