//! StorageEngine trait — the abstraction over the analytical database.
//!
//! The pipeline only introspects and samples; query execution is exposed for
//! completeness but never called by this workspace. Implementations wrap a
//! real engine connection (DuckDB, Postgres, ...).

use crate::error::StorageError;
use crate::schema::ColumnInfo;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Raw catalog metadata for one table, as returned by a single batched
/// introspection call. The extractor enriches this into a full
/// [`crate::TableSchema`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableMeta {
    pub name: String,
    /// Columns in ordinal order.
    pub columns: Vec<ColumnInfo>,
    /// Row-count estimate. Engines may return an approximate figure for
    /// large tables; exactness is not required for prompt context.
    pub row_estimate: u64,
}

/// Tabular result from `execute`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryRows {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<serde_json::Value>>,
}

/// The storage engine collaborator.
///
/// Introspection calls are expected to be cheap catalog reads. Every method
/// may be invoked concurrently from the extractor's worker pool, so
/// implementations must be `Send + Sync`.
#[async_trait]
pub trait StorageEngine: Send + Sync {
    /// A human-readable name for this engine (e.g. "duckdb").
    fn name(&self) -> &str;

    /// All registered table names.
    async fn table_names(&self) -> Result<Vec<String>, StorageError>;

    /// Column list, types, and row estimate for one table, in one pass.
    async fn introspect(&self, table: &str) -> Result<TableMeta, StorageError>;

    /// Up to `limit` sample rows (`SELECT * ... LIMIT n`).
    async fn sample(&self, table: &str, limit: usize)
        -> Result<Vec<Vec<serde_json::Value>>, StorageError>;

    /// Distinct-value count for a column. May be approximate.
    async fn count_distinct(&self, table: &str, column: &str) -> Result<u64, StorageError>;

    /// Cheap structural fingerprint for one table (column set + types).
    ///
    /// Default implementation derives it from `introspect`; engines with a
    /// catalog version counter should override with something cheaper.
    async fn structural_fingerprint(&self, table: &str) -> Result<String, StorageError> {
        let meta = self.introspect(table).await?;
        let mut parts: Vec<String> = Vec::with_capacity(meta.columns.len() + 1);
        parts.push(meta.name.clone());
        for col in &meta.columns {
            parts.push(format!("{}:{}", col.name, col.data_type));
        }
        Ok(crate::hash::short_sha256_parts(parts))
    }

    /// Execute arbitrary SQL. Outside this core's scope; interface only.
    async fn execute(&self, sql: &str) -> Result<QueryRows, StorageError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    struct TwoColumnEngine;

    #[async_trait]
    impl StorageEngine for TwoColumnEngine {
        fn name(&self) -> &str {
            "stub"
        }

        async fn table_names(&self) -> Result<Vec<String>, StorageError> {
            Ok(vec!["events".into()])
        }

        async fn introspect(&self, table: &str) -> Result<TableMeta, StorageError> {
            Ok(TableMeta {
                name: table.into(),
                columns: vec![
                    ColumnInfo::new("id", "BIGINT", 1),
                    ColumnInfo::new("payload", "VARCHAR", 2),
                ],
                row_estimate: 10,
            })
        }

        async fn sample(
            &self,
            _table: &str,
            _limit: usize,
        ) -> Result<Vec<Vec<serde_json::Value>>, StorageError> {
            Ok(vec![])
        }

        async fn count_distinct(&self, _table: &str, _column: &str) -> Result<u64, StorageError> {
            Ok(10)
        }

        async fn execute(&self, _sql: &str) -> Result<QueryRows, StorageError> {
            Err(StorageError::PermissionDenied {
                object: "stub".into(),
                reason: "execution not supported".into(),
            })
        }
    }

    #[tokio::test]
    async fn default_fingerprint_tracks_structure() {
        let engine = TwoColumnEngine;
        let a = engine.structural_fingerprint("events").await.unwrap();
        let b = engine.structural_fingerprint("events").await.unwrap();
        assert_eq!(a, b);
        // Fingerprint matches what TableSchema would compute for the same shape.
        let meta = engine.introspect("events").await.unwrap();
        let mut schema = crate::schema::TableSchema::new(meta.name);
        schema.columns = meta.columns;
        assert_eq!(a, schema.structural_checksum());
    }
}
