//! Ticker Sentiment Tracker: binary entrypoint
//! Boots the Axum HTTP server: config, pipeline, metrics and the optional warm-refresh task.

use anyhow::Context;
use shuttle_axum::ShuttleAxum;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use ticker_sentiment_tracker::metrics::Metrics;
use ticker_sentiment_tracker::pipeline::{spawn_warm_refresh, WarmRefreshCfg};
use ticker_sentiment_tracker::{build_state, create_router, TrackerConfig};

/// Enable compact tracing logs in development only.
/// Activation requires BOTH:
///   - dev environment (debug build OR SHUTTLE_ENV in {local, development, dev})
///   - TRACKER_DEV_LOG=1
fn enable_dev_tracing() {
    let dev_flag = std::env::var("TRACKER_DEV_LOG")
        .ok()
        .is_some_and(|v| v == "1");

    let is_dev_env = cfg!(debug_assertions)
        || matches!(
            std::env::var("SHUTTLE_ENV")
                .unwrap_or_default()
                .to_ascii_lowercase()
                .as_str(),
            "local" | "development" | "dev"
        );

    if !(dev_flag && is_dev_env) {
        return;
    }

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("ticker_sentiment_tracker=info,warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().compact())
        .init();
}

#[shuttle_runtime::main]
async fn axum() -> ShuttleAxum {
    // Load .env in local/dev; no-op in prod environments.
    let _ = dotenvy::dotenv();

    enable_dev_tracing();

    let cfg = TrackerConfig::load_default().context("loading tracker config")?;
    let state = build_state(&cfg).context("building pipeline")?;

    let metrics = Metrics::init(cfg.cache_duration_minutes * 60)?;

    if let Some(every) = cfg.warm_refresh() {
        spawn_warm_refresh(
            state.pipeline.clone(),
            WarmRefreshCfg {
                every,
                post_limit: cfg.default_post_limit,
                top_n: cfg.default_top_n,
            },
        );
        tracing::info!(every_secs = every.as_secs(), "warm refresh enabled");
    }

    let router = create_router(state).merge(metrics.router());

    Ok(router.into())
}
