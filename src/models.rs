//! Core data records shared by the extractor, scorer, fetcher and pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// One fetched post. Immutable once the fetcher hands it over.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Post {
    pub id: String,
    pub title: String,
    pub body: String,
    #[serde(default)]
    pub comments: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub score: i64,
}

impl Post {
    /// Title, body and every comment, each as an independent text unit.
    pub fn text_units(&self) -> impl Iterator<Item = &str> + '_ {
        [self.title.as_str(), self.body.as_str()]
            .into_iter()
            .chain(self.comments.iter().map(String::as_str))
            .filter(|t| !t.trim().is_empty())
    }
}

/// Accumulated mentions of one symbol during a single aggregation run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SymbolMention {
    pub symbol: String,
    pub count: usize,
    pub contexts: BTreeSet<String>,
}

impl SymbolMention {
    pub fn new(symbol: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            count: 0,
            contexts: BTreeSet::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum SentimentCategory {
    Positive,
    Negative,
    Neutral,
}

/// Lexicon score for one text (or the mean over several texts).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct SentimentResult {
    pub compound: f64,
    pub positive: f64,
    pub negative: f64,
    pub neutral: f64,
    pub category: SentimentCategory,
}

impl SentimentResult {
    /// `{0, 0, 0, 1, Neutral}`: blank text, no contexts, or a failed score.
    pub const NEUTRAL: SentimentResult = SentimentResult {
        compound: 0.0,
        positive: 0.0,
        negative: 0.0,
        neutral: 1.0,
        category: SentimentCategory::Neutral,
    };

    pub fn is_finite(&self) -> bool {
        self.compound.is_finite()
            && self.positive.is_finite()
            && self.negative.is_finite()
            && self.neutral.is_finite()
    }
}

impl Default for SentimentResult {
    fn default() -> Self {
        Self::NEUTRAL
    }
}

/// Externally visible output row.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RankedSymbol {
    pub symbol: String,
    pub mention_count: usize,
    pub sentiment: SentimentResult,
    pub last_updated: DateTime<Utc>,
}

/// Post counts by the category of their title+body sentiment.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SentimentSummary {
    pub positive: usize,
    pub negative: usize,
    pub neutral: usize,
}

/// One ranked snapshot, as held by the pipeline cache.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CacheEntry {
    /// `post_limit` the snapshot was computed for (the cache key).
    pub post_limit: usize,
    pub ranked_symbols: Vec<RankedSymbol>,
    pub created_at: DateTime<Utc>,
    pub source_post_count: usize,
    #[serde(default)]
    pub post_mood: SentimentSummary,
}

/// Result of one `Pipeline::run`.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct RankedResult {
    pub results: Vec<RankedSymbol>,
    pub from_cache: bool,
    /// Served from an expired entry because the source was unreachable.
    pub stale: bool,
    pub as_of: DateTime<Utc>,
    pub source_post_count: usize,
    pub post_mood: SentimentSummary,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct CacheStatus {
    pub exists: bool,
    pub fresh: bool,
    pub last_updated: Option<DateTime<Utc>>,
    pub age_minutes: Option<f64>,
    pub expires_at: Option<DateTime<Utc>>,
    pub source_post_count: Option<usize>,
    /// Every `post_limit` that currently has a snapshot.
    pub cached_post_limits: Vec<usize>,
}
