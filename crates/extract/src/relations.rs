//! Foreign-key inference over an extracted schema set.
//!
//! DuckDB-style engines expose little constraint metadata, so relationships
//! are inferred from the `<table>_id` naming convention. Advisory only.

use sqlprompt_core::{CardinalityHint, ForeignKeyRelation, TableSchema};
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

/// Infer foreign keys across the whole extracted set and flag the source
/// columns. Runs after extraction so plural-form resolution can see every
/// table in the batch, not just the ones processed first.
pub fn infer_foreign_keys(schemas: &mut BTreeMap<String, TableSchema>) {
    let names: BTreeSet<String> = schemas.keys().cloned().collect();

    for schema in schemas.values_mut() {
        let table_name = schema.name.clone();
        let row_estimate = schema.row_estimate;
        let mut relations = Vec::new();

        for col in &mut schema.columns {
            let Some(prefix) = col.name.strip_suffix("_id") else {
                continue;
            };
            if prefix.is_empty() {
                continue;
            }

            // Prefer the plural form when a matching table exists:
            // customer_id -> customers.id.
            let plural = format!("{prefix}s");
            let to_table = if names.contains(&plural) {
                plural
            } else {
                prefix.to_string()
            };

            // Distinct count matching the row count means the column is a
            // unique reference; otherwise assume the usual one-to-many.
            let cardinality = match schema.cardinality_stats.get(&col.name) {
                Some(&distinct) if row_estimate > 0 && distinct >= row_estimate => {
                    CardinalityHint::OneToOne
                }
                _ => CardinalityHint::OneToMany,
            };

            col.is_foreign_key = true;
            let fk = ForeignKeyRelation {
                from_table: table_name.clone(),
                from_column: col.name.clone(),
                to_table,
                to_column: "id".to_string(),
                cardinality,
            };
            debug!(relation = %fk, "Inferred foreign key");
            relations.push(fk);
        }

        schema.foreign_keys = relations;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlprompt_core::ColumnInfo;

    fn table(name: &str, columns: &[(&str, &str)]) -> TableSchema {
        let mut t = TableSchema::new(name);
        t.columns = columns
            .iter()
            .enumerate()
            .map(|(i, (n, ty))| ColumnInfo::new(*n, *ty, i as u32 + 1))
            .collect();
        t.row_estimate = 100;
        t
    }

    fn schema_set(tables: Vec<TableSchema>) -> BTreeMap<String, TableSchema> {
        tables.into_iter().map(|t| (t.name.clone(), t)).collect()
    }

    #[test]
    fn resolves_plural_target() {
        let mut schemas = schema_set(vec![
            table("sales", &[("id", "BIGINT"), ("customer_id", "BIGINT")]),
            table("customers", &[("id", "BIGINT"), ("name", "VARCHAR")]),
        ]);
        infer_foreign_keys(&mut schemas);

        let fks = &schemas["sales"].foreign_keys;
        assert_eq!(fks.len(), 1);
        assert_eq!(fks[0].to_table, "customers");
        assert_eq!(fks[0].to_column, "id");
        assert!(schemas["sales"].columns[1].is_foreign_key);
    }

    #[test]
    fn falls_back_to_singular_when_no_plural_table() {
        let mut schemas = schema_set(vec![table(
            "orders",
            &[("id", "BIGINT"), ("region_id", "INTEGER")],
        )]);
        infer_foreign_keys(&mut schemas);
        assert_eq!(schemas["orders"].foreign_keys[0].to_table, "region");
    }

    #[test]
    fn plain_id_column_is_not_a_foreign_key() {
        let mut schemas = schema_set(vec![table("users", &[("id", "BIGINT")])]);
        infer_foreign_keys(&mut schemas);
        assert!(schemas["users"].foreign_keys.is_empty());
        assert!(!schemas["users"].columns[0].is_foreign_key);
    }

    #[test]
    fn unique_reference_hints_one_to_one() {
        let mut schemas = schema_set(vec![
            table("profiles", &[("id", "BIGINT"), ("user_id", "BIGINT")]),
            table("users", &[("id", "BIGINT")]),
        ]);
        schemas
            .get_mut("profiles")
            .unwrap()
            .cardinality_stats
            .insert("user_id".into(), 100);
        infer_foreign_keys(&mut schemas);

        assert_eq!(
            schemas["profiles"].foreign_keys[0].cardinality,
            CardinalityHint::OneToOne
        );
    }
}
