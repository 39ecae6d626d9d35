//! # Sentiment Scorer
//! Lexicon scoring with negation and intensifier modifiers. Pure and deterministic.
//!
//! Compound score is `s / sqrt(s^2 + 15)` with `s = positive_sum - negative_sum`,
//! so it stays inside `[-1, 1]` for any text length.

use once_cell::sync::Lazy;
use serde::Deserialize;
use std::collections::{HashMap, HashSet};

use crate::models::{Post, SentimentCategory, SentimentResult, SentimentSummary};

/// Compound at or above this is `Positive`.
pub const POSITIVE_THRESHOLD: f64 = 0.05;
/// Compound at or below this is `Negative`.
pub const NEGATIVE_THRESHOLD: f64 = -0.05;
/// Normalization constant of the compound formula.
pub const COMPOUND_ALPHA: f64 = 15.0;
/// How many preceding tokens are searched for a negator.
const NEGATION_WINDOW: usize = 3;

#[derive(Debug, Deserialize)]
pub struct Lexicon {
    pub positive: HashSet<String>,
    pub negative: HashSet<String>,
    pub intensifiers: HashMap<String, f64>,
    pub negations: HashSet<String>,
}

static LEXICON: Lazy<Lexicon> = Lazy::new(|| {
    let raw = include_str!("../data/sentiment_lexicon.json");
    serde_json::from_str::<Lexicon>(raw).expect("valid sentiment lexicon")
});

/// Maps a compound score to its category. The only place thresholds are applied.
pub fn categorize(compound: f64) -> SentimentCategory {
    if compound >= POSITIVE_THRESHOLD {
        SentimentCategory::Positive
    } else if compound <= NEGATIVE_THRESHOLD {
        SentimentCategory::Negative
    } else {
        SentimentCategory::Neutral
    }
}

#[derive(Debug, Clone, Copy)]
pub struct SentimentAnalyzer {
    lexicon: &'static Lexicon,
}

impl Default for SentimentAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

impl SentimentAnalyzer {
    pub fn new() -> Self {
        Self { lexicon: &LEXICON }
    }

    /// Use a caller-supplied lexicon (tests, alternate vocabularies).
    pub fn with_lexicon(lexicon: &'static Lexicon) -> Self {
        Self { lexicon }
    }

    pub fn lexicon(&self) -> &'static Lexicon {
        self.lexicon
    }

    /// Base weight: +1 positive, -1 negative, 0 otherwise.
    #[inline]
    fn word_weight(&self, w: &str) -> f64 {
        if self.lexicon.positive.contains(w) {
            1.0
        } else if self.lexicon.negative.contains(w) {
            -1.0
        } else {
            0.0
        }
    }

    pub fn score(&self, text: &str) -> SentimentResult {
        if text.trim().is_empty() {
            return SentimentResult::NEUTRAL;
        }

        let tokens = tokenize(text);
        let mut pos_sum = 0.0f64;
        let mut neg_sum = 0.0f64;
        let mut neutral = 0.0f64;

        for i in 0..tokens.len() {
            let mut weight = self.word_weight(&tokens[i]);

            if weight != 0.0 {
                let negated = (1..=NEGATION_WINDOW)
                    .any(|k| i >= k && self.lexicon.negations.contains(&tokens[i - k]));
                if negated {
                    weight = -weight;
                }

                if i > 0 {
                    if let Some(boost) = self.lexicon.intensifiers.get(&tokens[i - 1]) {
                        weight += boost.copysign(weight);
                    }
                }
            }

            if weight > 0.0 {
                pos_sum += weight;
            } else if weight < 0.0 {
                neg_sum += -weight;
            } else {
                neutral += 1.0;
            }
        }

        let total = pos_sum + neg_sum + neutral;
        if total == 0.0 {
            return SentimentResult::NEUTRAL;
        }

        let compound = compound_score(pos_sum - neg_sum);
        SentimentResult {
            compound,
            positive: pos_sum / total,
            negative: neg_sum / total,
            neutral: neutral / total,
            category: categorize(compound),
        }
    }

    /// Arithmetic mean of the per-text results; category recomputed from the mean compound.
    pub fn score_many<S: AsRef<str>>(&self, texts: &[S]) -> SentimentResult {
        if texts.is_empty() {
            return SentimentResult::NEUTRAL;
        }

        let n = texts.len() as f64;
        let (mut c, mut p, mut ng, mut nu) = (0.0, 0.0, 0.0, 0.0);
        for t in texts {
            let r = self.score(t.as_ref());
            c += r.compound;
            p += r.positive;
            ng += r.negative;
            nu += r.neutral;
        }

        let compound = (c / n).clamp(-1.0, 1.0);
        SentimentResult {
            compound,
            positive: p / n,
            negative: ng / n,
            neutral: nu / n,
            category: categorize(compound),
        }
    }

    /// Counts posts by the category of their combined title and body.
    pub fn summarize_posts(&self, posts: &[Post]) -> SentimentSummary {
        let mut out = SentimentSummary::default();
        for post in posts {
            let combined = format!("{} {}", post.title, post.body);
            if combined.trim().is_empty() {
                continue;
            }
            match self.score(&combined).category {
                SentimentCategory::Positive => out.positive += 1,
                SentimentCategory::Negative => out.negative += 1,
                SentimentCategory::Neutral => out.neutral += 1,
            }
        }
        out
    }
}

fn compound_score(net: f64) -> f64 {
    (net / (net * net + COMPOUND_ALPHA).sqrt()).clamp(-1.0, 1.0)
}

/// Lowercase; everything except word characters, whitespace and apostrophes becomes a separator.
pub fn tokenize(s: &str) -> Vec<String> {
    s.to_lowercase()
        .split(|c: char| !(c.is_alphanumeric() || c == '_' || c == '\''))
        .map(|t| t.trim_matches('\''))
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}
