//! # sqlprompt Core
//!
//! Domain types, traits, and error definitions for the sqlprompt context
//! pipeline. This crate has **zero framework dependencies** — it defines the
//! domain model that all other crates implement against.
//!
//! ## Design Philosophy
//!
//! Every external collaborator (storage engine, LLM endpoint) is defined as a
//! trait here. Implementations live outside this workspace. This enables:
//! - Swapping backends via configuration
//! - Easy testing with mock/stub implementations
//! - Clean dependency graph (all crates depend inward on core)

pub mod error;
pub mod hash;
pub mod intent;
pub mod llm;
pub mod payload;
pub mod schema;
pub mod storage;

// Re-export key types at crate root for ergonomics
pub use error::{CacheError, Error, ExtractionError, LlmError, Result, StorageError};
pub use intent::{IntentKind, QueryIntent};
pub use llm::{CompletionRequest, LlmProvider};
pub use payload::{ContextPayload, ContextSource, DetailLevel};
pub use schema::{CardinalityHint, ColumnInfo, ForeignKeyRelation, TableSchema};
pub use storage::{QueryRows, StorageEngine, TableMeta};
