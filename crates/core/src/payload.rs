//! The assembled context payload handed to the LLM collaborator.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// How much schema detail to include per table.
///
/// Ordered: `Minimal < Standard < Comprehensive`, which is what lets the
/// budget manager binary-search for the highest level that fits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetailLevel {
    Minimal,
    Standard,
    Comprehensive,
}

impl DetailLevel {
    /// All levels, lowest detail first.
    pub const ALL: [DetailLevel; 3] = [
        DetailLevel::Minimal,
        DetailLevel::Standard,
        DetailLevel::Comprehensive,
    ];
}

impl fmt::Display for DetailLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DetailLevel::Minimal => "minimal",
            DetailLevel::Standard => "standard",
            DetailLevel::Comprehensive => "comprehensive",
        };
        f.write_str(s)
    }
}

impl FromStr for DetailLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "minimal" => Ok(DetailLevel::Minimal),
            "standard" => Ok(DetailLevel::Standard),
            "comprehensive" => Ok(DetailLevel::Comprehensive),
            other => Err(format!(
                "invalid detail level '{other}', expected minimal|standard|comprehensive"
            )),
        }
    }
}

/// Where the schema snapshot behind a payload came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContextSource {
    /// Freshly extracted from the storage engine.
    Fresh,
    /// Served from a validated cache entry.
    Cache,
    /// TTL-expired cache entry used as a timeout fallback.
    StaleCache,
    /// Reduced-detail synthesis after upstream failures.
    Degraded,
}

/// Final assembled prompt plus metadata. One per generation request,
/// never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextPayload {
    /// The prompt text to send to the LLM.
    pub prompt: String,
    /// Tables included, in ranked order.
    pub tables_included: Vec<String>,
    /// Estimated token count of `prompt`.
    pub estimated_tokens: usize,
    /// Whether anything was dropped or reduced to fit the budget.
    pub truncated: bool,
    /// Detail level the renderer actually used.
    pub detail_level: DetailLevel,
    /// Advisory completeness score in [0, 1]. A weighted heuristic,
    /// not a calibrated probability.
    pub confidence: f64,
    /// Provenance of the schema snapshot.
    pub source: ContextSource,
}
