// src/pipeline/scheduler.rs
use crate::pipeline::Pipeline;
use metrics::counter;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

#[derive(Clone, Copy, Debug)]
pub struct WarmRefreshCfg {
    pub every: Duration,
    pub post_limit: usize,
    pub top_n: usize,
}

/// Keep the default snapshot warm by force-refreshing it on a fixed period.
/// The first refresh happens immediately. Failures are logged and the loop keeps going.
pub fn spawn_warm_refresh(pipeline: Arc<Pipeline>, cfg: WarmRefreshCfg) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(cfg.every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            counter!("pipeline_warm_refresh_total").increment(1);

            match pipeline.run(cfg.post_limit, cfg.top_n, true).await {
                Ok(r) => tracing::info!(
                    target: "pipeline",
                    symbols = r.results.len(),
                    posts = r.source_post_count,
                    stale = r.stale,
                    "warm refresh tick"
                ),
                Err(e) => tracing::warn!(target: "pipeline", error = %e, "warm refresh failed"),
            }
        }
    })
}
