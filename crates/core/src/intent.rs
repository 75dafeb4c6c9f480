//! Query intent classification.
//!
//! A `QueryIntent` is computed per request and never persisted. Detection is
//! a pure function over the query text: keyword patterns vote for intent
//! kinds, scores are normalized, and the significant word tokens are kept
//! for relevance ranking downstream.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// The kinds of analytical query the pipeline recognizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentKind {
    Aggregation,
    Join,
    Filter,
    TimeSeries,
    Ranking,
    General,
}

/// Keyword patterns voting for each intent kind. Matching is whole-word,
/// case-insensitive.
const INTENT_PATTERNS: &[(IntentKind, &[&str])] = &[
    (
        IntentKind::Aggregation,
        &[
            "total", "sum", "average", "avg", "count", "mean", "maximum", "minimum",
        ],
    ),
    (
        IntentKind::Join,
        &["join", "combine", "related", "relationship", "together", "per", "by"],
    ),
    (
        IntentKind::Filter,
        &[
            "where", "filter", "only", "specific", "exclude", "between", "above", "below",
        ],
    ),
    (
        IntentKind::TimeSeries,
        &[
            "trend", "monthly", "daily", "weekly", "yearly", "quarterly", "growth", "month",
            "year", "day", "week",
        ],
    ),
    (
        IntentKind::Ranking,
        &["top", "best", "worst", "most", "least", "highest", "lowest", "rank"],
    ),
];

/// Words too common to carry relevance signal.
const STOPWORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "by", "for", "from", "get", "give", "how", "in",
    "is", "it", "me", "of", "on", "or", "per", "show", "that", "the", "their", "them", "to",
    "what", "which", "with",
];

/// Classification of a natural-language query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryIntent {
    /// Intent kinds with normalized scores summing to 1.0.
    pub kinds: BTreeMap<IntentKind, f64>,
    /// Significant lowercased word tokens, in order of first appearance.
    pub keywords: Vec<String>,
}

impl QueryIntent {
    /// Classify a query. Always produces at least one kind (`General` when
    /// nothing matches) and never fails.
    pub fn classify(query: &str) -> Self {
        let words = tokenize(query);
        let mut kinds: BTreeMap<IntentKind, f64> = BTreeMap::new();

        for (kind, patterns) in INTENT_PATTERNS {
            let matches = patterns.iter().filter(|p| words.contains(&p.to_string())).count();
            if matches > 0 {
                kinds.insert(*kind, matches as f64 / patterns.len() as f64);
            }
        }

        // Normalize so scores are comparable across queries of any length.
        let total: f64 = kinds.values().sum();
        if total > 0.0 {
            for score in kinds.values_mut() {
                *score /= total;
            }
        } else {
            kinds.insert(IntentKind::General, 1.0);
        }

        let keywords = words
            .into_iter()
            .filter(|w| !STOPWORDS.contains(&w.as_str()))
            .collect();

        Self { kinds, keywords }
    }

    /// Score for a kind, 0.0 when absent.
    pub fn score(&self, kind: IntentKind) -> f64 {
        self.kinds.get(&kind).copied().unwrap_or(0.0)
    }

    /// Whether no specific intent was detected.
    pub fn is_general(&self) -> bool {
        self.kinds.contains_key(&IntentKind::General)
    }
}

/// Lowercase, split on non-alphanumerics, drop empties, dedupe preserving
/// first-appearance order.
fn tokenize(query: &str) -> Vec<String> {
    let mut seen = std::collections::BTreeSet::new();
    let mut out = Vec::new();
    for word in query
        .to_lowercase()
        .split(|c: char| !c.is_alphanumeric() && c != '_')
    {
        if word.is_empty() {
            continue;
        }
        if seen.insert(word.to_string()) {
            out.push(word.to_string());
        }
    }
    out
}
