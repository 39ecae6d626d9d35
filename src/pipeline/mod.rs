// src/pipeline/mod.rs
//! Aggregation pipeline: fetch → extract → score → rank, behind a snapshot cache.

pub mod cache;
pub mod scheduler;

use chrono::{DateTime, Duration, Utc};
use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use once_cell::sync::OnceCell;
use serde::Serialize;
use std::cmp::Ordering;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Instant;

use crate::config::TrackerConfig;
use crate::extract::SymbolExtractor;
use crate::fetch::{ContentFetcher, FetchError, PostSource};
use crate::models::{
    CacheEntry, CacheStatus, Post, RankedResult, RankedSymbol, SentimentResult, SentimentSummary,
};
use crate::sentiment::SentimentAnalyzer;

pub use cache::SnapshotCache;
pub use scheduler::{spawn_warm_refresh, WarmRefreshCfg};

/// Source of "now". Injectable so cache expiry is testable without sleeping.
pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// Fetch failed and nothing was cached to fall back on.
    #[error("content source unavailable and no cached snapshot: {0}")]
    SourceUnavailable(#[source] FetchError),
}

/// Outcome of a symbol-list edit.
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct SymbolChange {
    pub added: usize,
    pub removed: usize,
    pub known: usize,
}

fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("pipeline_runs_total", "Pipeline run requests.");
        describe_counter!("pipeline_cache_hits_total", "Runs answered from a fresh snapshot.");
        describe_counter!("pipeline_cache_misses_total", "Runs that had to fetch.");
        describe_counter!(
            "pipeline_stale_fallback_total",
            "Runs answered from an expired snapshot because the source was down."
        );
        describe_counter!("pipeline_warm_refresh_total", "Background refresh ticks.");
        describe_histogram!("pipeline_run_ms", "Wall time of a fetching run.");
        describe_gauge!("pipeline_last_run_ts", "Unix time of the last successful fetch run.");
        describe_gauge!("pipeline_cache_duration_secs", "Configured snapshot lifetime.");
    });
}

/// Deterministic order: mentions desc, compound desc, symbol asc.
pub fn rank_order(a: &RankedSymbol, b: &RankedSymbol) -> Ordering {
    b.mention_count
        .cmp(&a.mention_count)
        .then_with(|| b.sentiment.compound.total_cmp(&a.sentiment.compound))
        .then_with(|| a.symbol.cmp(&b.symbol))
}

pub fn sort_ranked(ranked: &mut [RankedSymbol]) {
    ranked.sort_by(rank_order);
}

pub struct Pipeline {
    source: Box<dyn PostSource>,
    extractor: RwLock<SymbolExtractor>,
    analyzer: SentimentAnalyzer,
    cache: SnapshotCache,
    cache_duration: Duration,
    clock: Clock,
}

impl Pipeline {
    pub fn new(source: impl PostSource + 'static, cache_duration: Duration) -> Self {
        Self {
            source: Box::new(source),
            extractor: RwLock::new(SymbolExtractor::new()),
            analyzer: SentimentAnalyzer::new(),
            cache: SnapshotCache::in_memory(),
            cache_duration,
            clock: Arc::new(Utc::now),
        }
    }

    /// Live fetcher plus in-memory or persisted cache, per `cfg`.
    pub fn from_config(cfg: &TrackerConfig) -> anyhow::Result<Self> {
        let fetcher = ContentFetcher::from_config(cfg)?;
        let mut p = Self::new(fetcher, cfg.cache_duration());
        if let Some(path) = &cfg.cache_path {
            p = p.with_cache(SnapshotCache::persistent(path));
        }
        Ok(p)
    }

    pub fn with_cache(mut self, cache: SnapshotCache) -> Self {
        self.cache = cache;
        self
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_extractor(mut self, extractor: SymbolExtractor) -> Self {
        self.extractor = RwLock::new(extractor);
        self
    }

    pub fn cache_duration(&self) -> Duration {
        self.cache_duration
    }

    fn now(&self) -> DateTime<Utc> {
        (self.clock)()
    }

    /// Ranked symbols for `post_limit` posts, truncated to `top_n`.
    ///
    /// A fresh snapshot is reused unless `force_refresh`. When the fetch fails
    /// the newest snapshot is returned flagged `stale`; only with no snapshot
    /// at all is the failure surfaced.
    pub async fn run(
        &self,
        post_limit: usize,
        top_n: usize,
        force_refresh: bool,
    ) -> Result<RankedResult, PipelineError> {
        ensure_metrics_described();
        counter!("pipeline_runs_total").increment(1);
        let now = self.now();

        if post_limit == 0 {
            return Ok(empty_result(now));
        }

        if !force_refresh {
            if let Some(hit) = self.cache.fresh(post_limit, now, self.cache_duration) {
                counter!("pipeline_cache_hits_total").increment(1);
                tracing::debug!(target: "pipeline", post_limit, created_at = %hit.created_at, "cache hit");
                return Ok(from_entry(hit, top_n, false));
            }
        }
        counter!("pipeline_cache_misses_total").increment(1);

        let t0 = Instant::now();
        let posts = match self.source.fetch(post_limit).await {
            Ok(p) => p,
            Err(e) => {
                if let Some(old) = self.cache.stale(post_limit) {
                    counter!("pipeline_stale_fallback_total").increment(1);
                    tracing::warn!(
                        target: "pipeline",
                        error = %e,
                        snapshot_limit = old.post_limit,
                        age_minutes = (now - old.created_at).num_minutes(),
                        "fetch failed, serving stale snapshot"
                    );
                    return Ok(from_entry(old, top_n, true));
                }
                tracing::error!(target: "pipeline", error = %e, "fetch failed with nothing cached");
                return Err(PipelineError::SourceUnavailable(e));
            }
        };

        if posts.is_empty() {
            tracing::info!(target: "pipeline", post_limit, "source returned no posts");
            return Ok(empty_result(now));
        }

        let ranked = self.rank(&posts, now);
        let entry = CacheEntry {
            post_limit,
            ranked_symbols: ranked,
            created_at: now,
            source_post_count: posts.len(),
            post_mood: self.analyzer.summarize_posts(&posts),
        };
        if let Some(write) = self.cache.stage(entry.clone()) {
            if let Err(e) = tokio::task::spawn_blocking(move || write.write()).await {
                tracing::warn!(target: "pipeline", error = %e, "cache write task failed");
            }
        }

        histogram!("pipeline_run_ms").record(t0.elapsed().as_secs_f64() * 1_000.0);
        gauge!("pipeline_last_run_ts").set(now.timestamp() as f64);
        tracing::info!(
            target: "pipeline",
            post_limit,
            posts = entry.source_post_count,
            symbols = entry.ranked_symbols.len(),
            "snapshot refreshed"
        );

        Ok(from_entry(entry, top_n, false).fresh_at(now))
    }

    /// Extract, score and order symbols for one batch of posts.
    pub fn rank(&self, posts: &[Post], now: DateTime<Utc>) -> Vec<RankedSymbol> {
        let mentions = self
            .extractor
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .tally_posts(posts);

        let mut ranked: Vec<RankedSymbol> = mentions
            .into_iter()
            .map(|m| {
                let mut sentiment = self.analyzer.score_many(&m.contexts.iter().collect::<Vec<_>>());
                if !sentiment.is_finite() {
                    tracing::warn!(target: "pipeline", symbol = %m.symbol, "non-finite sentiment, using neutral");
                    sentiment = SentimentResult::NEUTRAL;
                }
                RankedSymbol {
                    symbol: m.symbol,
                    mention_count: m.count,
                    sentiment,
                    last_updated: now,
                }
            })
            .collect();

        sort_ranked(&mut ranked);
        ranked
    }

    pub fn status(&self) -> CacheStatus {
        let cached_post_limits = self.cache.keys();
        let Some(e) = self.cache.newest() else {
            return CacheStatus {
                exists: false,
                fresh: false,
                last_updated: None,
                age_minutes: None,
                expires_at: None,
                source_post_count: None,
                cached_post_limits,
            };
        };

        let age = self.now() - e.created_at;
        CacheStatus {
            exists: true,
            fresh: age <= self.cache_duration,
            last_updated: Some(e.created_at),
            age_minutes: Some(age.num_milliseconds() as f64 / 60_000.0),
            expires_at: Some(e.created_at + self.cache_duration),
            source_post_count: Some(e.source_post_count),
            cached_post_limits,
        }
    }

    pub fn clear_cache(&self) {
        self.cache.clear();
        tracing::info!(target: "pipeline", "cache cleared");
    }

    /// Add symbols to the allow-list and/or block them. Applies to the next fetch;
    /// cached snapshots are left untouched.
    pub fn configure_symbols(&self, add: &[String], remove: &[String]) -> SymbolChange {
        let mut ex = self.extractor.write().unwrap_or_else(PoisonError::into_inner);
        let added = ex.add_symbols(add);
        let removed = ex.remove_symbols(remove);
        let known = ex.known_symbols().len();
        tracing::info!(target: "pipeline", added, removed, known, "symbol lists updated");
        SymbolChange {
            added,
            removed,
            known,
        }
    }

    pub fn known_symbols(&self) -> Vec<String> {
        self.extractor
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .known_symbols()
    }
}

fn empty_result(now: DateTime<Utc>) -> RankedResult {
    RankedResult {
        results: Vec::new(),
        from_cache: false,
        stale: false,
        as_of: now,
        source_post_count: 0,
        post_mood: SentimentSummary::default(),
    }
}

fn from_entry(entry: CacheEntry, top_n: usize, stale: bool) -> RankedResult {
    let mut results = entry.ranked_symbols;
    results.truncate(top_n);
    RankedResult {
        results,
        from_cache: true,
        stale,
        as_of: entry.created_at,
        source_post_count: entry.source_post_count,
        post_mood: entry.post_mood,
    }
}

impl RankedResult {
    fn fresh_at(mut self, now: DateTime<Utc>) -> Self {
        self.from_cache = false;
        self.stale = false;
        self.as_of = now;
        self
    }
}
