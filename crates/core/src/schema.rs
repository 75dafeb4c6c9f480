//! Table and column metadata extracted from the storage engine catalog.
//!
//! A `TableSchema` is a read-only snapshot: once extracted it is never
//! mutated, only replaced. Staleness is detected by comparing the snapshot's
//! structural checksum against the live catalog's fingerprint, not by
//! wall-clock age alone.

use crate::hash::short_sha256_parts;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Detailed column information.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnInfo {
    /// Column name as declared in the catalog.
    pub name: String,
    /// Declared SQL type (e.g. `VARCHAR`, `BIGINT`).
    pub data_type: String,
    /// Whether NULL values are permitted.
    pub is_nullable: bool,
    /// Primary-key flag (heuristic for engines without constraint metadata).
    pub is_primary_key: bool,
    /// Unique-constraint flag.
    pub is_unique: bool,
    /// Foreign-key candidate flag (`*_id` naming or detected relation).
    pub is_foreign_key: bool,
    /// Declared default value, if any.
    pub default_value: Option<String>,
    /// 1-based ordinal position within the table.
    pub ordinal_position: u32,
}

impl ColumnInfo {
    /// Minimal constructor for the common case; constraint flags default off.
    pub fn new(name: impl Into<String>, data_type: impl Into<String>, ordinal: u32) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
            is_nullable: true,
            is_primary_key: false,
            is_unique: false,
            is_foreign_key: false,
            default_value: None,
            ordinal_position: ordinal,
        }
    }
}

/// Cardinality hint for a detected relationship. Heuristic, advisory only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CardinalityHint {
    OneToOne,
    OneToMany,
    ManyToMany,
}

/// A detected foreign-key relationship between two tables.
///
/// Inferred from column naming conventions, not declared constraints, so it
/// carries no correctness guarantee — it only informs relevance ranking and
/// prompt text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForeignKeyRelation {
    pub from_table: String,
    pub from_column: String,
    pub to_table: String,
    pub to_column: String,
    pub cardinality: CardinalityHint,
}

impl fmt::Display for ForeignKeyRelation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{} -> {}.{}",
            self.from_table, self.from_column, self.to_table, self.to_column
        )
    }
}

/// Schema snapshot for a single table.
///
/// Owned exclusively by the extractor; consumers receive it read-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableSchema {
    pub name: String,
    /// Columns in ordinal order.
    pub columns: Vec<ColumnInfo>,
    /// Row-count estimate. May be approximate for large tables.
    pub row_estimate: u64,
    /// Bounded sample rows (one `Vec<Value>` per row, column order).
    #[serde(default)]
    pub sample_rows: Vec<Vec<serde_json::Value>>,
    /// Detected foreign-key relationships originating from this table.
    #[serde(default)]
    pub foreign_keys: Vec<ForeignKeyRelation>,
    /// Distinct-value counts for key columns.
    #[serde(default)]
    pub cardinality_stats: BTreeMap<String, u64>,
    /// Structural fingerprint captured at extraction time.
    pub checksum: String,
}

impl TableSchema {
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            name,
            columns: Vec::new(),
            row_estimate: 0,
            sample_rows: Vec::new(),
            foreign_keys: Vec::new(),
            cardinality_stats: BTreeMap::new(),
            checksum: String::new(),
        }
    }

    /// Fingerprint of the table's structure: name plus the ordered set of
    /// (column name, declared type) pairs. Row contents never participate,
    /// so inserts and updates do not invalidate cached schemas — only
    /// DDL-level changes do.
    pub fn structural_checksum(&self) -> String {
        let mut parts: Vec<String> = Vec::with_capacity(self.columns.len() + 1);
        parts.push(self.name.clone());
        for col in &self.columns {
            parts.push(format!("{}:{}", col.name, col.data_type));
        }
        short_sha256_parts(parts)
    }

    /// Columns flagged as primary or foreign keys, in ordinal order.
    pub fn key_columns(&self) -> impl Iterator<Item = &ColumnInfo> {
        self.columns
            .iter()
            .filter(|c| c.is_primary_key || c.is_foreign_key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_table() -> TableSchema {
        let mut t = TableSchema::new("sales");
        t.columns = vec![
            ColumnInfo::new("id", "BIGINT", 1),
            ColumnInfo::new("customer_id", "BIGINT", 2),
            ColumnInfo::new("amount", "DECIMAL(10,2)", 3),
        ];
        t.row_estimate = 1200;
        t
    }

    #[test]
    fn checksum_stable_across_clones() {
        let t = sample_table();
        assert_eq!(t.structural_checksum(), t.clone().structural_checksum());
    }

    #[test]
    fn checksum_changes_on_column_add() {
        let mut t = sample_table();
        let before = t.structural_checksum();
        t.columns.push(ColumnInfo::new("region", "VARCHAR", 4));
        assert_ne!(before, t.structural_checksum());
    }

    #[test]
    fn checksum_changes_on_type_change() {
        let mut t = sample_table();
        let before = t.structural_checksum();
        t.columns[2].data_type = "DOUBLE".into();
        assert_ne!(before, t.structural_checksum());
    }

    #[test]
    fn checksum_ignores_row_data() {
        let mut t = sample_table();
        let before = t.structural_checksum();
        t.row_estimate = 999_999;
        t.sample_rows = vec![vec![serde_json::json!(1), serde_json::json!("x")]];
        assert_eq!(before, t.structural_checksum());
    }

    #[test]
    fn fk_display_renders_arrow() {
        let fk = ForeignKeyRelation {
            from_table: "sales".into(),
            from_column: "customer_id".into(),
            to_table: "customers".into(),
            to_column: "id".into(),
            cardinality: CardinalityHint::OneToMany,
        };
        assert_eq!(fk.to_string(), "sales.customer_id -> customers.id");
    }

    #[test]
    fn key_columns_filters_flags() {
        let mut t = sample_table();
        t.columns[0].is_primary_key = true;
        t.columns[1].is_foreign_key = true;
        let keys: Vec<_> = t.key_columns().map(|c| c.name.as_str()).collect();
        assert_eq!(keys, vec!["id", "customer_id"]);
    }

    #[test]
    fn table_schema_serde_roundtrip() {
        let mut t = sample_table();
        t.checksum = t.structural_checksum();
        t.sample_rows = vec![vec![
            serde_json::json!(1),
            serde_json::json!(42),
            serde_json::json!(19.99),
        ]];
        let json = serde_json::to_string(&t).unwrap();
        let back: TableSchema = serde_json::from_str(&json).unwrap();
        assert_eq!(t, back);
    }
}
