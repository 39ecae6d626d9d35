// src/insights.rs
//! Market-level read of one ranked snapshot.

use serde::Serialize;

use crate::models::{RankedSymbol, SentimentCategory, SentimentSummary};

/// Mention-weighted average compound at or beyond this is Bullish/Bearish.
pub const MOOD_THRESHOLD: f64 = 0.1;
/// A symbol's compound beyond ±this counts as strong.
pub const STRONG_SENTIMENT: f64 = 0.5;
pub const HIGH_VOLUME_MENTIONS: usize = 5;
pub const CONTRARIAN_MIN_MENTIONS: usize = 3;

const TOP_STRONG: usize = 3;
const TOP_VOLUME: usize = 5;

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub enum MarketMood {
    Bullish,
    Bearish,
    Neutral,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct MarketInsights {
    pub total_mentions: usize,
    pub avg_sentiment: f64,
    pub mood: MarketMood,
    pub strong_positive: Vec<RankedSymbol>,
    pub strong_negative: Vec<RankedSymbol>,
    pub high_volume: Vec<RankedSymbol>,
    pub distribution: SentimentSummary,
    pub recommendations: Vec<String>,
}

pub fn mood_of(avg: f64) -> MarketMood {
    if avg >= MOOD_THRESHOLD {
        MarketMood::Bullish
    } else if avg <= -MOOD_THRESHOLD {
        MarketMood::Bearish
    } else {
        MarketMood::Neutral
    }
}

pub fn market_insights(ranked: &[RankedSymbol]) -> MarketInsights {
    let total_mentions: usize = ranked.iter().map(|r| r.mention_count).sum();
    let weighted: f64 = ranked
        .iter()
        .map(|r| r.sentiment.compound * r.mention_count as f64)
        .sum();
    let avg_sentiment = if total_mentions > 0 {
        weighted / total_mentions as f64
    } else {
        0.0
    };

    let mut strong_positive: Vec<RankedSymbol> = ranked
        .iter()
        .filter(|r| r.sentiment.compound > STRONG_SENTIMENT)
        .cloned()
        .collect();
    strong_positive.sort_by(|a, b| b.sentiment.compound.total_cmp(&a.sentiment.compound));
    strong_positive.truncate(TOP_STRONG);

    let mut strong_negative: Vec<RankedSymbol> = ranked
        .iter()
        .filter(|r| r.sentiment.compound < -STRONG_SENTIMENT)
        .cloned()
        .collect();
    strong_negative.sort_by(|a, b| a.sentiment.compound.total_cmp(&b.sentiment.compound));
    strong_negative.truncate(TOP_STRONG);

    let mut high_volume: Vec<RankedSymbol> = ranked
        .iter()
        .filter(|r| r.mention_count >= HIGH_VOLUME_MENTIONS)
        .cloned()
        .collect();
    high_volume.sort_by(|a, b| b.mention_count.cmp(&a.mention_count));
    high_volume.truncate(TOP_VOLUME);

    let mut distribution = SentimentSummary::default();
    for r in ranked {
        match r.sentiment.category {
            SentimentCategory::Positive => distribution.positive += 1,
            SentimentCategory::Negative => distribution.negative += 1,
            SentimentCategory::Neutral => distribution.neutral += 1,
        }
    }

    let recommendations = recommend(ranked, &strong_negative, &distribution);

    MarketInsights {
        total_mentions,
        avg_sentiment,
        mood: mood_of(avg_sentiment),
        strong_positive,
        strong_negative,
        high_volume,
        distribution,
        recommendations,
    }
}

fn recommend(
    ranked: &[RankedSymbol],
    strong_negative: &[RankedSymbol],
    dist: &SentimentSummary,
) -> Vec<String> {
    let mut out = Vec::new();

    let momentum = ranked
        .iter()
        .filter(|r| r.sentiment.compound > 0.0)
        .max_by(|a, b| momentum_of(a).total_cmp(&momentum_of(b)));
    if let Some(m) = momentum {
        out.push(format!(
            "Momentum: {} leads with {} mentions at {:.2} sentiment",
            m.symbol, m.mention_count, m.sentiment.compound
        ));
    }

    let contrarian = strong_negative
        .iter()
        .filter(|r| r.mention_count >= CONTRARIAN_MIN_MENTIONS)
        .max_by(|a, b| a.sentiment.compound.abs().total_cmp(&b.sentiment.compound.abs()));
    if let Some(c) = contrarian {
        out.push(format!(
            "Contrarian: {} is heavily discussed ({} mentions) with {:.2} sentiment",
            c.symbol, c.mention_count, c.sentiment.compound
        ));
    }

    let breakout = ranked
        .iter()
        .filter(|r| {
            r.sentiment.category == SentimentCategory::Neutral
                && r.mention_count >= HIGH_VOLUME_MENTIONS
        })
        .max_by_key(|r| r.mention_count);
    if let Some(b) = breakout {
        out.push(format!(
            "Watch: {} has {} mentions but no clear direction yet",
            b.symbol, b.mention_count
        ));
    }

    if dist.negative as f64 > dist.positive as f64 * 1.5 {
        out.push(format!(
            "Risk: negative symbols outnumber positive ones ({} vs {})",
            dist.negative, dist.positive
        ));
    }

    if out.is_empty() {
        out.push("Balanced: no symbol stands out in this snapshot".to_string());
    }
    out
}

fn momentum_of(r: &RankedSymbol) -> f64 {
    r.sentiment.compound * r.mention_count as f64
}
