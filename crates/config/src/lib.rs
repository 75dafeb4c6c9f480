//! Configuration loading, validation, and management for sqlprompt.
//!
//! Loads configuration from `~/.sqlprompt/config.toml` with environment
//! variable overrides (`SQLPROMPT_*`). Validates all settings at startup —
//! an invalid budget or detail level is a programmer error and fails load,
//! unlike runtime degradation which never does.

use serde::{Deserialize, Serialize};
use sqlprompt_core::DetailLevel;
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.sqlprompt/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Model identifier used for token estimation and cache keying.
    #[serde(default = "default_model_id")]
    pub model_id: String,

    /// Total token budget for an assembled context.
    #[serde(default = "default_max_context_tokens")]
    pub max_context_tokens: usize,

    /// Requested schema detail level; the budget manager may reduce it.
    #[serde(default = "default_detail_level")]
    pub detail_level: String,

    /// Cache configuration.
    #[serde(default)]
    pub cache: CacheConfig,

    /// Schema extraction configuration.
    #[serde(default)]
    pub extraction: ExtractionConfig,

    /// Token budget split across prompt categories.
    #[serde(default)]
    pub budget: BudgetConfig,
}

fn default_model_id() -> String {
    "llama".into()
}
fn default_max_context_tokens() -> usize {
    4000
}
fn default_detail_level() -> String {
    "standard".into()
}
fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Maximum entries in the hot in-memory tier.
    #[serde(default = "default_l1_max_entries")]
    pub l1_max_entries: usize,

    /// Maximum entries in the warm in-memory tier.
    #[serde(default = "default_l2_max_entries")]
    pub l2_max_entries: usize,

    /// Combined L1+L2 memory ceiling in megabytes.
    #[serde(default = "default_max_memory_mb")]
    pub max_memory_mb: usize,

    /// Default entry time-to-live in seconds.
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u64,

    /// Hits below L1 before an entry is promoted upward.
    #[serde(default = "default_promotion_threshold")]
    pub promotion_threshold: u32,

    /// Disk tier directory. Defaults to `~/.sqlprompt/cache`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dir: Option<PathBuf>,
}

fn default_l1_max_entries() -> usize {
    50
}
fn default_l2_max_entries() -> usize {
    200
}
fn default_max_memory_mb() -> usize {
    100
}
fn default_ttl_secs() -> u64 {
    3600
}
fn default_promotion_threshold() -> u32 {
    2
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            l1_max_entries: default_l1_max_entries(),
            l2_max_entries: default_l2_max_entries(),
            max_memory_mb: default_max_memory_mb(),
            ttl_secs: default_ttl_secs(),
            promotion_threshold: default_promotion_threshold(),
            dir: None,
        }
    }
}

impl CacheConfig {
    /// Disk tier directory, defaulting under the config dir.
    pub fn cache_dir(&self) -> PathBuf {
        self.dir
            .clone()
            .unwrap_or_else(|| AppConfig::config_dir().join("cache"))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionConfig {
    /// Sample rows pulled per table.
    #[serde(default = "default_sample_rows")]
    pub sample_rows: usize,

    /// Bounded worker pool size for concurrent per-table extraction.
    /// 0 means "derive from CPU count, capped at 8".
    #[serde(default)]
    pub worker_pool: usize,

    /// Timeout for each per-table storage operation, in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Whether to fetch cardinality statistics for key columns.
    #[serde(default = "default_true")]
    pub cardinality_stats: bool,
}

fn default_sample_rows() -> usize {
    3
}
fn default_timeout_ms() -> u64 {
    2000
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            sample_rows: default_sample_rows(),
            worker_pool: 0,
            timeout_ms: default_timeout_ms(),
            cardinality_stats: true,
        }
    }
}

impl ExtractionConfig {
    /// Effective worker pool size.
    pub fn effective_workers(&self) -> usize {
        if self.worker_pool > 0 {
            self.worker_pool
        } else {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4)
                .min(8)
        }
    }
}

/// Fraction of the total token budget allocated to each prompt category.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BudgetConfig {
    #[serde(default = "default_instructions_pct")]
    pub instructions: f64,
    #[serde(default = "default_schema_pct")]
    pub schema: f64,
    #[serde(default = "default_samples_pct")]
    pub sample_rows: f64,
    #[serde(default = "default_examples_pct")]
    pub examples: f64,
    #[serde(default = "default_buffer_pct")]
    pub buffer: f64,
}

fn default_instructions_pct() -> f64 {
    0.10
}
fn default_schema_pct() -> f64 {
    0.70
}
fn default_samples_pct() -> f64 {
    0.10
}
fn default_examples_pct() -> f64 {
    0.05
}
fn default_buffer_pct() -> f64 {
    0.05
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self {
            instructions: default_instructions_pct(),
            schema: default_schema_pct(),
            sample_rows: default_samples_pct(),
            examples: default_examples_pct(),
            buffer: default_buffer_pct(),
        }
    }
}

impl BudgetConfig {
    pub fn total_fraction(&self) -> f64 {
        self.instructions + self.schema + self.sample_rows + self.examples + self.buffer
    }
}

impl AppConfig {
    /// Load configuration from the default path (~/.sqlprompt/config.toml).
    ///
    /// Environment overrides, highest priority:
    /// - `SQLPROMPT_MODEL` — model id
    /// - `SQLPROMPT_MAX_CONTEXT_TOKENS` — total token budget
    /// - `SQLPROMPT_CONTEXT_LEVEL` — detail level
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;

        if let Ok(model) = std::env::var("SQLPROMPT_MODEL") {
            config.model_id = model;
        }
        if let Ok(tokens) = std::env::var("SQLPROMPT_MAX_CONTEXT_TOKENS") {
            config.max_context_tokens = tokens.parse().map_err(|_| {
                ConfigError::ValidationError(format!(
                    "SQLPROMPT_MAX_CONTEXT_TOKENS must be an integer, got '{tokens}'"
                ))
            })?;
        }
        if let Ok(level) = std::env::var("SQLPROMPT_CONTEXT_LEVEL") {
            config.detail_level = level;
        }

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".sqlprompt")
    }

    /// Parsed detail level. `validate` guarantees this succeeds after load.
    pub fn parsed_detail_level(&self) -> Result<DetailLevel, ConfigError> {
        self.detail_level
            .parse()
            .map_err(ConfigError::ValidationError)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_context_tokens == 0 {
            return Err(ConfigError::ValidationError(
                "max_context_tokens must be greater than 0".into(),
            ));
        }

        self.parsed_detail_level()?;

        if self.extraction.sample_rows > 100 {
            return Err(ConfigError::ValidationError(format!(
                "extraction.sample_rows must be at most 100, got {}",
                self.extraction.sample_rows
            )));
        }

        if self.cache.l1_max_entries == 0 || self.cache.l2_max_entries == 0 {
            return Err(ConfigError::ValidationError(
                "cache tier capacities must be greater than 0".into(),
            ));
        }

        let fractions = [
            ("instructions", self.budget.instructions),
            ("schema", self.budget.schema),
            ("sample_rows", self.budget.sample_rows),
            ("examples", self.budget.examples),
            ("buffer", self.budget.buffer),
        ];
        for (name, value) in fractions {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::ValidationError(format!(
                    "budget.{name} must be in [0, 1], got {value}"
                )));
            }
        }
        if self.budget.total_fraction() > 1.0 + 1e-9 {
            return Err(ConfigError::ValidationError(format!(
                "budget fractions must sum to at most 1.0, got {:.3}",
                self.budget.total_fraction()
            )));
        }

        Ok(())
    }

    /// Generate a default config TOML string.
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            model_id: default_model_id(),
            max_context_tokens: default_max_context_tokens(),
            detail_level: default_detail_level(),
            cache: CacheConfig::default(),
            extraction: ExtractionConfig::default(),
            budget: BudgetConfig::default(),
        }
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}
