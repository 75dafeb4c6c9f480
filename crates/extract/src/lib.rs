//! Concurrent schema extraction.
//!
//! The extractor walks the engine catalog with a bounded worker pool: one
//! task per table in a `JoinSet`, gated by a semaphore, each I/O call under
//! its own timeout. A table that fails is logged and omitted — one broken
//! view never empties the whole context.

mod relations;

pub use relations::infer_foreign_keys;

use sqlprompt_core::{ExtractionError, Result, StorageEngine, TableSchema};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::timeout;
use tracing::{debug, info, warn};

/// Extraction tuning. Defaults mirror the config crate's.
#[derive(Debug, Clone)]
pub struct ExtractorOptions {
    /// Sample rows fetched per table.
    pub sample_rows: usize,
    /// Concurrent per-table workers.
    pub workers: usize,
    /// Per-operation timeout.
    pub op_timeout: Duration,
    /// Whether to fetch distinct counts for key columns.
    pub cardinality_stats: bool,
}

impl Default for ExtractorOptions {
    fn default() -> Self {
        Self {
            sample_rows: 3,
            workers: std::thread::available_parallelism()
                .map(|n| n.get().min(8))
                .unwrap_or(4),
            op_timeout: Duration::from_millis(2000),
            cardinality_stats: true,
        }
    }
}

pub struct SchemaExtractor {
    engine: Arc<dyn StorageEngine>,
    options: ExtractorOptions,
}

impl SchemaExtractor {
    pub fn new(engine: Arc<dyn StorageEngine>, options: ExtractorOptions) -> Self {
        Self { engine, options }
    }

    /// Extract schemas for the named tables, or the whole catalog when
    /// `tables` is `None`. Tables that fail are omitted, never fatal.
    ///
    /// Dropping the returned future aborts in-flight per-table tasks.
    pub async fn extract(
        &self,
        tables: Option<&[String]>,
    ) -> Result<BTreeMap<String, TableSchema>> {
        let names: Vec<String> = match tables {
            Some(t) => t.to_vec(),
            None => timeout(self.options.op_timeout, self.engine.table_names())
                .await
                .map_err(|_| ExtractionError::Timeout {
                    table: "<catalog>".to_string(),
                })?
                .map_err(|e| ExtractionError::Introspection {
                    table: "<catalog>".to_string(),
                    reason: e.to_string(),
                })?,
        };

        let semaphore = Arc::new(Semaphore::new(self.options.workers.max(1)));
        let mut set = JoinSet::new();
        for name in names {
            let engine = Arc::clone(&self.engine);
            let options = self.options.clone();
            let semaphore = Arc::clone(&semaphore);
            set.spawn(async move {
                let permit = semaphore.acquire_owned().await;
                if permit.is_err() {
                    // Semaphore closed: the extraction future was dropped.
                    return (
                        name.clone(),
                        Err(ExtractionError::Timeout { table: name }),
                    );
                }
                let result = extract_table(engine.as_ref(), &name, &options).await;
                (name, result)
            });
        }

        let mut schemas = BTreeMap::new();
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok((name, Ok(schema))) => {
                    schemas.insert(name, schema);
                }
                Ok((name, Err(e))) => {
                    warn!(table = %name, error = %e, "Skipping table: extraction failed");
                }
                Err(e) => {
                    warn!(error = %e, "Extraction worker panicked or was cancelled");
                }
            }
        }

        relations::infer_foreign_keys(&mut schemas);
        info!(tables = schemas.len(), "Schema extraction complete");
        Ok(schemas)
    }
}

/// Build the schema snapshot for one table. Introspection failure is fatal
/// for the table; sampling and cardinality failures only degrade it.
async fn extract_table(
    engine: &dyn StorageEngine,
    table: &str,
    options: &ExtractorOptions,
) -> std::result::Result<TableSchema, ExtractionError> {
    let meta = timeout(options.op_timeout, engine.introspect(table))
        .await
        .map_err(|_| ExtractionError::Timeout {
            table: table.to_string(),
        })?
        .map_err(|e| ExtractionError::Introspection {
            table: table.to_string(),
            reason: e.to_string(),
        })?;

    let mut schema = TableSchema::new(meta.name);
    schema.columns = meta.columns;
    schema.row_estimate = meta.row_estimate;

    let sample_fut = fetch_samples(engine, table, schema.row_estimate, options);
    let cardinality_fut = fetch_cardinality(engine, table, &schema, options);
    let (sample_rows, cardinality_stats) = tokio::join!(sample_fut, cardinality_fut);
    schema.sample_rows = sample_rows;
    schema.cardinality_stats = cardinality_stats;

    schema.checksum = schema.structural_checksum();
    Ok(schema)
}

async fn fetch_samples(
    engine: &dyn StorageEngine,
    table: &str,
    row_estimate: u64,
    options: &ExtractorOptions,
) -> Vec<Vec<serde_json::Value>> {
    if row_estimate == 0 || options.sample_rows == 0 {
        return Vec::new();
    }
    match timeout(options.op_timeout, engine.sample(table, options.sample_rows)).await {
        Ok(Ok(rows)) => rows,
        Ok(Err(e)) => {
            debug!(table, error = %e, "Could not fetch sample rows");
            Vec::new()
        }
        Err(_) => {
            debug!(table, "Sample fetch timed out");
            Vec::new()
        }
    }
}

/// Distinct counts for key-ish columns: primary keys, unique columns, and
/// anything with "id" in the name.
async fn fetch_cardinality(
    engine: &dyn StorageEngine,
    table: &str,
    schema: &TableSchema,
    options: &ExtractorOptions,
) -> BTreeMap<String, u64> {
    let mut stats = BTreeMap::new();
    if !options.cardinality_stats {
        return stats;
    }
    for col in &schema.columns {
        let keyish = col.is_primary_key || col.is_unique || col.name.to_lowercase().contains("id");
        if !keyish {
            continue;
        }
        match timeout(options.op_timeout, engine.count_distinct(table, &col.name)).await {
            Ok(Ok(count)) => {
                stats.insert(col.name.clone(), count);
            }
            Ok(Err(e)) => {
                debug!(table, column = %col.name, error = %e, "Could not fetch cardinality");
            }
            Err(_) => {
                debug!(table, column = %col.name, "Cardinality fetch timed out");
            }
        }
    }
    stats
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use sqlprompt_core::{ColumnInfo, QueryRows, StorageError, TableMeta};
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Catalog stub with a configurable failing table and call counters.
    struct StubEngine {
        tables: Vec<&'static str>,
        failing: Option<&'static str>,
        slow: Option<&'static str>,
        introspect_calls: AtomicUsize,
    }

    impl StubEngine {
        fn new(tables: Vec<&'static str>) -> Self {
            Self {
                tables,
                failing: None,
                slow: None,
                introspect_calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl StorageEngine for StubEngine {
        fn name(&self) -> &str {
            "stub"
        }

        async fn table_names(&self) -> std::result::Result<Vec<String>, StorageError> {
            Ok(self.tables.iter().map(|s| s.to_string()).collect())
        }

        async fn introspect(&self, table: &str) -> std::result::Result<TableMeta, StorageError> {
            self.introspect_calls.fetch_add(1, Ordering::SeqCst);
            if self.failing == Some(table) {
                return Err(StorageError::MissingObject { name: table.into() });
            }
            if self.slow == Some(table) {
                tokio::time::sleep(Duration::from_secs(60)).await;
            }
            let mut columns = vec![
                ColumnInfo::new("id", "BIGINT", 1),
                ColumnInfo::new("amount", "DECIMAL(10,2)", 2),
            ];
            if table == "sales" {
                columns.push(ColumnInfo::new("customer_id", "BIGINT", 3));
            }
            columns[0].is_primary_key = true;
            Ok(TableMeta {
                name: table.into(),
                columns,
                row_estimate: 500,
            })
        }

        async fn sample(
            &self,
            _table: &str,
            limit: usize,
        ) -> std::result::Result<Vec<Vec<serde_json::Value>>, StorageError> {
            Ok(vec![
                vec![serde_json::json!(1), serde_json::json!(9.99)];
                limit
            ])
        }

        async fn count_distinct(
            &self,
            _table: &str,
            _column: &str,
        ) -> std::result::Result<u64, StorageError> {
            Ok(500)
        }

        async fn execute(&self, _sql: &str) -> std::result::Result<QueryRows, StorageError> {
            Err(StorageError::PermissionDenied {
                object: "stub".into(),
                reason: "not supported".into(),
            })
        }
    }

    fn options() -> ExtractorOptions {
        ExtractorOptions {
            sample_rows: 2,
            workers: 4,
            op_timeout: Duration::from_millis(200),
            cardinality_stats: true,
        }
    }

    #[tokio::test]
    async fn extracts_all_tables_when_unfiltered() {
        let engine = Arc::new(StubEngine::new(vec!["sales", "customers"]));
        let extractor = SchemaExtractor::new(engine.clone(), options());

        let schemas = extractor.extract(None).await.unwrap();
        assert_eq!(schemas.len(), 2);
        assert_eq!(engine.introspect_calls.load(Ordering::SeqCst), 2);

        let sales = &schemas["sales"];
        assert_eq!(sales.row_estimate, 500);
        assert_eq!(sales.sample_rows.len(), 2);
        assert!(!sales.checksum.is_empty());
        // PK and *_id columns get distinct counts.
        assert!(sales.cardinality_stats.contains_key("id"));
        assert!(sales.cardinality_stats.contains_key("customer_id"));
    }

    #[tokio::test]
    async fn filter_limits_extraction() {
        let engine = Arc::new(StubEngine::new(vec!["sales", "customers", "web_logs"]));
        let extractor = SchemaExtractor::new(engine.clone(), options());

        let wanted = vec!["sales".to_string()];
        let schemas = extractor.extract(Some(&wanted)).await.unwrap();
        assert_eq!(schemas.len(), 1);
        assert_eq!(engine.introspect_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failing_table_is_omitted_not_fatal() {
        let mut engine = StubEngine::new(vec!["sales", "broken_view"]);
        engine.failing = Some("broken_view");
        let extractor = SchemaExtractor::new(Arc::new(engine), options());

        let schemas = extractor.extract(None).await.unwrap();
        assert_eq!(schemas.len(), 1);
        assert!(schemas.contains_key("sales"));
    }

    #[tokio::test]
    async fn slow_table_times_out_and_is_omitted() {
        let mut engine = StubEngine::new(vec!["sales", "glacial"]);
        engine.slow = Some("glacial");
        let extractor = SchemaExtractor::new(Arc::new(engine), options());

        let schemas = extractor.extract(None).await.unwrap();
        assert_eq!(schemas.len(), 1);
        assert!(schemas.contains_key("sales"));
    }

    #[tokio::test]
    async fn foreign_keys_resolved_across_batch() {
        let engine = Arc::new(StubEngine::new(vec!["sales", "customers"]));
        let extractor = SchemaExtractor::new(engine, options());

        let schemas = extractor.extract(None).await.unwrap();
        let fks = &schemas["sales"].foreign_keys;
        assert_eq!(fks.len(), 1);
        assert_eq!(fks[0].to_table, "customers");
    }

    #[tokio::test]
    async fn empty_catalog_yields_empty_map() {
        let engine = Arc::new(StubEngine::new(vec![]));
        let extractor = SchemaExtractor::new(engine, options());
        let schemas = extractor.extract(None).await.unwrap();
        assert!(schemas.is_empty());
    }
}
