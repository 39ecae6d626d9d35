// src/lib.rs
// Public library surface for the binaries and integration tests.

pub mod api;
pub mod config;
pub mod extract;
pub mod fetch;
pub mod insights;
pub mod metrics;
pub mod models;
pub mod pipeline;
pub mod sentiment;

// ---- Re-exports for stable public API ----
pub use crate::api::{create_router, AppState};
pub use crate::config::TrackerConfig;
pub use crate::extract::SymbolExtractor;
pub use crate::models::{RankedResult, RankedSymbol, SentimentResult};
pub use crate::pipeline::{Pipeline, PipelineError};
pub use crate::sentiment::SentimentAnalyzer;

use std::sync::Arc;

/// Build the live pipeline and the router state from one config.
pub fn build_state(cfg: &TrackerConfig) -> anyhow::Result<AppState> {
    let pipeline = Arc::new(Pipeline::from_config(cfg)?);
    tracing::info!(
        subreddit = %cfg.subreddit,
        cache_minutes = cfg.cache_duration_minutes,
        persisted = cfg.cache_path.is_some(),
        "pipeline ready"
    );
    Ok(AppState::new(pipeline, cfg))
}
