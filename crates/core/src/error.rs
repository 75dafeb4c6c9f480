//! Error types for the sqlprompt domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error variant.
//!
//! The pipeline distinguishes programmer errors (invalid configuration) from
//! expected degradation (a table that fails introspection, a corrupt cache
//! file, a truncated context). Only the former surface as hard failures;
//! degradation is recovered locally and logged.

use thiserror::Error;

/// The top-level error type for all sqlprompt operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Storage engine errors ---
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    // --- Schema extraction errors ---
    #[error("Extraction error: {0}")]
    Extraction(#[from] ExtractionError),

    // --- Cache errors ---
    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    // --- LLM collaborator errors ---
    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    // --- Configuration errors ---
    #[error("Configuration error: {message}")]
    Config { message: String },

    // --- Serialization ---
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // --- Generic ---
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

/// Errors from the storage engine collaborator. Structured so callers can
/// tell a bad query from a missing table from a permissions problem.
#[derive(Debug, Clone, Error)]
pub enum StorageError {
    #[error("SQL syntax error: {0}")]
    Syntax(String),

    #[error("Object not found: {name}")]
    MissingObject { name: String },

    #[error("Permission denied on {object}: {reason}")]
    PermissionDenied { object: String, reason: String },

    #[error("Storage operation timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("Connection error: {0}")]
    Connection(String),
}

/// A single table failed extraction. Always recovered locally by omitting
/// the table from the batch; never propagated out of the extractor.
#[derive(Debug, Clone, Error)]
pub enum ExtractionError {
    #[error("Introspection failed for table {table}: {reason}")]
    Introspection { table: String, reason: String },

    #[error("Sampling failed for table {table}: {reason}")]
    Sampling { table: String, reason: String },

    #[error("Extraction timed out for table {table}")]
    Timeout { table: String },
}

#[derive(Debug, Error)]
pub enum CacheError {
    /// A stored entry failed to deserialize or checksum-validate.
    /// Treated as a miss; the entry is evicted.
    #[error("Corrupt cache entry for key {key}: {reason}")]
    Corrupt { key: String, reason: String },

    #[error("Cache I/O error: {0}")]
    Io(String),

    #[error("Cache serialization error: {0}")]
    Serialization(String),
}

#[derive(Debug, Clone, Error)]
pub enum LlmError {
    #[error("Completion request timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    #[error("API request failed: {message} (status: {status_code})")]
    Api { status_code: u16, message: String },

    #[error("Model not found: {0}")]
    ModelNotFound(String),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),
}
