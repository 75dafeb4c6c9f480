//! Heuristic token estimation.
//!
//! No tokenizer dependency: counts are derived from empirical
//! characters-per-token ratios plus overhead for SQL keywords and
//! punctuation. Estimates are memoized by (text hash, model).

use sqlprompt_core::hash::short_sha256;
use std::collections::HashMap;
use std::sync::Mutex;

/// Characters per token, by model family. Matched by substring against the
/// configured model id, so "llama-3.1-8b" picks the llama ratio.
const MODEL_RATIOS: &[(&str, f64)] = &[("llama", 3.5), ("gpt", 4.0), ("claude", 3.8)];
const DEFAULT_RATIO: f64 = 3.75;

/// Keywords that tokenize heavier than their character count suggests.
const SQL_KEYWORDS: &[&str] = &["SELECT", "FROM", "WHERE", "JOIN", "GROUP BY", "ORDER BY"];
const SPECIAL_CHARS: &str = "()[]{},.;:'\"";

/// Memo cap. The memo is cleared rather than LRU-managed: estimation is
/// cheap enough that a rare cold restart beats per-entry bookkeeping.
const MEMO_CAP: usize = 4096;

pub struct TokenEstimator {
    memo: Mutex<HashMap<(String, String), usize>>,
}

impl TokenEstimator {
    pub fn new() -> Self {
        Self {
            memo: Mutex::new(HashMap::new()),
        }
    }

    /// Estimate the token count of `text` for `model_id`. Deterministic,
    /// never errors; unknown models use the default ratio.
    pub fn estimate(&self, text: &str, model_id: &str) -> usize {
        let key = (short_sha256(text), model_id.to_string());
        {
            let memo = self
                .memo
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            if let Some(&count) = memo.get(&key) {
                return count;
            }
        }

        let count = estimate_uncached(text, model_id);

        let mut memo = self
            .memo
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        if memo.len() >= MEMO_CAP {
            memo.clear();
        }
        memo.insert(key, count);
        count
    }
}

impl Default for TokenEstimator {
    fn default() -> Self {
        Self::new()
    }
}

fn estimate_uncached(text: &str, model_id: &str) -> usize {
    let model_lower = model_id.to_lowercase();
    let ratio = MODEL_RATIOS
        .iter()
        .find(|(name, _)| model_lower.contains(name))
        .map(|(_, r)| *r)
        .unwrap_or(DEFAULT_RATIO);

    let base = text.chars().count() as f64 / ratio;

    let upper = text.to_uppercase();
    let keyword_overhead = SQL_KEYWORDS.iter().filter(|k| upper.contains(*k)).count() * 2;

    let special = text.chars().filter(|c| SPECIAL_CHARS.contains(*c)).count();
    let special_overhead = special as f64 * 0.3;

    (base + keyword_overhead as f64 + special_overhead) as usize
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn estimate_is_deterministic() {
        let est = TokenEstimator::new();
        let text = "SELECT count(*) FROM sales WHERE amount > 100";
        assert_eq!(est.estimate(text, "llama"), est.estimate(text, "llama"));
    }

    #[test]
    fn model_ratio_changes_count() {
        let est = TokenEstimator::new();
        // Long plain text, no keywords or punctuation: ratio dominates.
        let text = "word ".repeat(200);
        let llama = est.estimate(&text, "llama-3.1-8b");
        let gpt = est.estimate(&text, "gpt-4o");
        assert!(llama > gpt, "lower chars-per-token means more tokens");
    }

    #[test]
    fn unknown_model_uses_default_ratio() {
        let est = TokenEstimator::new();
        let text = "a".repeat(375);
        assert_eq!(est.estimate(&text, "mystery-model"), 100);
    }

    #[test]
    fn sql_keywords_add_overhead() {
        let est = TokenEstimator::new();
        let plain = "x".repeat(40);
        let sql = format!("SELECT {}", "x".repeat(33)); // same char count
        assert!(est.estimate(&sql, "llama") > est.estimate(&plain, "llama"));
    }

    #[test]
    fn punctuation_adds_overhead() {
        let est = TokenEstimator::new();
        let plain = "abcd".repeat(10);
        let punct = "(),;".repeat(10);
        assert!(est.estimate(&punct, "llama") > est.estimate(&plain, "llama"));
    }

    #[test]
    fn empty_text_is_zero() {
        let est = TokenEstimator::new();
        assert_eq!(est.estimate("", "llama"), 0);
    }
}
