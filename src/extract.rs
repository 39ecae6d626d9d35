// src/extract.rs
//! # Symbol Extractor
//! Finds ticker-like tokens in free text and filters false positives.
//!
//! Candidates are 1–6 uppercase letters bounded by non-word characters, or a
//! `$` cashtag (any case). Validation order:
//! 1. operator-blocked or deny-listed → reject
//! 2. one letter → only a cashtag on the allow-list
//! 3. two letters → only the curated two-letter list
//! 4. allow-list → accept
//! 5. three to six letters → accept unless a slang pattern matches
//!
//! Symbol lists live in `data/symbols.json`.

use anyhow::Context;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet, HashSet};

use crate::models::{Post, SymbolMention};

/// Characters of surrounding text captured on each side of a match.
pub const CONTEXT_RADIUS: usize = 50;

#[derive(Debug, Clone, Deserialize)]
pub struct SymbolLists {
    pub allow: Vec<String>,
    pub two_letter: Vec<String>,
    pub deny: Vec<String>,
    #[serde(default)]
    pub slang_patterns: Vec<String>,
}

impl SymbolLists {
    pub fn bundled() -> Self {
        DEFAULT_LISTS.clone()
    }
}

static DEFAULT_LISTS: Lazy<SymbolLists> = Lazy::new(|| {
    let raw = include_str!("../data/symbols.json");
    serde_json::from_str::<SymbolLists>(raw).expect("valid symbol lists")
});

static CANDIDATE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\$(?P<tag>[A-Z]{1,6})\b|\b(?P<bare>[A-Z]{1,6})\b").expect("candidate regex")
});

#[derive(Debug, Clone)]
pub struct SymbolExtractor {
    allow: HashSet<String>,
    two_letter: HashSet<String>,
    deny: HashSet<String>,
    /// Removed by an operator; wins over every accept rule.
    blocked: HashSet<String>,
    slang: Vec<Regex>,
}

impl Default for SymbolExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl SymbolExtractor {
    /// Extractor over the bundled lists.
    pub fn new() -> Self {
        Self::from_lists(SymbolLists::bundled()).expect("bundled slang patterns compile")
    }

    pub fn from_lists(lists: SymbolLists) -> anyhow::Result<Self> {
        let slang = lists
            .slang_patterns
            .iter()
            .map(|p| Regex::new(p).with_context(|| format!("slang pattern `{p}`")))
            .collect::<anyhow::Result<Vec<_>>>()?;

        Ok(Self {
            allow: upper_set(lists.allow),
            two_letter: upper_set(lists.two_letter),
            deny: lists
                .deny
                .iter()
                .map(|s| s.trim().to_ascii_uppercase())
                .filter(|s| !s.is_empty())
                .collect(),
            blocked: HashSet::new(),
            slang,
        })
    }

    /// Distinct symbols in `text`. Empty for empty or symbol-free input.
    pub fn extract(&self, text: &str) -> BTreeSet<String> {
        self.candidates(text).map(|(sym, _)| sym).collect()
    }

    /// Per-symbol raw match count and deduplicated context windows for one text unit.
    pub fn scan(&self, text: &str) -> Vec<SymbolMention> {
        let mut found: BTreeMap<String, SymbolMention> = BTreeMap::new();
        for (sym, (start, end)) in self.candidates(text) {
            let entry = found
                .entry(sym.clone())
                .or_insert_with(|| SymbolMention::new(sym));
            entry.count += 1;
            let ctx = context_window(text, start, end, CONTEXT_RADIUS);
            if !ctx.is_empty() {
                entry.contexts.insert(ctx);
            }
        }
        found.into_values().collect()
    }

    /// Merges mentions over a batch. A symbol counts once per post, however many
    /// of the post's units (title, body, comments) mention it; contexts from all
    /// units are kept.
    pub fn tally_posts(&self, posts: &[Post]) -> Vec<SymbolMention> {
        let mut acc: BTreeMap<String, SymbolMention> = BTreeMap::new();

        for post in posts {
            let mut in_post: BTreeSet<String> = BTreeSet::new();
            for unit in post.text_units() {
                for m in self.scan(unit) {
                    in_post.insert(m.symbol.clone());
                    acc.entry(m.symbol.clone())
                        .or_insert_with(|| SymbolMention::new(m.symbol))
                        .contexts
                        .extend(m.contexts);
                }
            }
            for sym in in_post {
                if let Some(e) = acc.get_mut(&sym) {
                    e.count += 1;
                }
            }
        }

        acc.into_values().collect()
    }

    /// Add symbols to the allow-list (and un-block them). Returns how many changed.
    pub fn add_symbols<S: AsRef<str>>(&mut self, symbols: &[S]) -> usize {
        let mut changed = 0;
        for s in symbols.iter().filter_map(|s| clean_symbol(s.as_ref())) {
            self.blocked.remove(&s);
            if s.len() == 2 {
                self.two_letter.insert(s.clone());
            }
            if self.allow.insert(s) {
                changed += 1;
            }
        }
        changed
    }

    /// Drop symbols from the allow-list and block them from the heuristic path too.
    pub fn remove_symbols<S: AsRef<str>>(&mut self, symbols: &[S]) -> usize {
        let mut changed = 0;
        for s in symbols.iter().filter_map(|s| clean_symbol(s.as_ref())) {
            self.two_letter.remove(&s);
            let was_allowed = self.allow.remove(&s);
            if self.blocked.insert(s) || was_allowed {
                changed += 1;
            }
        }
        changed
    }

    /// Sorted copy of the allow-list.
    pub fn known_symbols(&self) -> Vec<String> {
        let mut v: Vec<String> = self.allow.iter().cloned().collect();
        v.sort();
        v
    }

    pub fn deny_list(&self) -> impl Iterator<Item = &str> + '_ {
        self.deny.iter().map(String::as_str)
    }

    pub fn is_valid(&self, candidate: &str, cashtag: bool) -> bool {
        let len = candidate.len();
        if len == 0 || len > 6 || !candidate.bytes().all(|b| b.is_ascii_uppercase()) {
            return false;
        }
        if self.blocked.contains(candidate) || self.deny.contains(candidate) {
            return false;
        }
        match len {
            1 => cashtag && self.allow.contains(candidate),
            2 => self.two_letter.contains(candidate),
            _ if self.allow.contains(candidate) => true,
            _ => !self.slang.iter().any(|re| re.is_match(candidate)),
        }
    }

    /// Accepted candidates with the byte span of the full match (including `$`).
    fn candidates<'a>(
        &'a self,
        text: &'a str,
    ) -> impl Iterator<Item = (String, (usize, usize))> + 'a {
        CANDIDATE_RE.captures_iter(text).filter_map(move |caps| {
            let whole = caps.get(0)?;
            let (raw, cashtag) = match (caps.name("tag"), caps.name("bare")) {
                (Some(t), _) => (t.as_str().to_string(), true),
                (None, Some(b)) => (b.as_str().to_string(), false),
                _ => return None,
            };
            self.is_valid(&raw, cashtag)
                .then(|| (raw, (whole.start(), whole.end())))
        })
    }
}

fn upper_set(items: Vec<String>) -> HashSet<String> {
    items.iter().filter_map(|s| clean_symbol(s)).collect()
}

/// Uppercased symbol, or `None` unless it is 1-6 ASCII letters (an optional `$` is stripped).
fn clean_symbol(s: &str) -> Option<String> {
    let t = s.trim();
    let t = t.strip_prefix('$').unwrap_or(t);
    let ok = (1..=6).contains(&t.len()) && t.bytes().all(|b| b.is_ascii_alphabetic());
    ok.then(|| t.to_ascii_uppercase())
}

/// Up to `radius` chars either side of `[start, end)`, trimmed, whitespace collapsed.
pub fn context_window(text: &str, start: usize, end: usize, radius: usize) -> String {
    let from = text[..start]
        .char_indices()
        .rev()
        .nth(radius.saturating_sub(1))
        .map(|(i, _)| i)
        .unwrap_or(0);
    let to = text[end..]
        .char_indices()
        .nth(radius)
        .map(|(i, _)| end + i)
        .unwrap_or(text.len());

    text[from..to].split_whitespace().collect::<Vec<_>>().join(" ")
}
