//! Token budget planning.
//!
//! Splits the total context budget into category allocations, then walks the
//! relevance ranking deciding how much of each table fits. Overflow degrades
//! gracefully: first narrower column lists, then lower detail levels, and
//! only then dropped tables — the plan never comes back empty when the
//! schema has at least one table.

use crate::relevance::{rank_tables, TableScore};
use crate::render::table_section;
use crate::token::TokenEstimator;
use sqlprompt_config::BudgetConfig;
use sqlprompt_core::{DetailLevel, QueryIntent, TableSchema};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

/// Tables worth attaching sample rows to.
const SAMPLE_SCORE_FLOOR: f64 = 50.0;
/// Column cap for a truncated table section.
const TRUNCATED_COLUMN_CAP: usize = 6;
/// Ranking depth; beyond this a schema section stops helping generation.
const MAX_TABLES: usize = 15;

/// Column names worth keeping when a table's list must be cut, beyond its
/// key columns.
const COMMONLY_QUERIED: &[&str] = &[
    "name", "date", "created_at", "updated_at", "amount", "total", "status", "type", "email",
    "timestamp", "ts", "value", "price", "quantity", "category",
];

/// Absolute token allocations per prompt category. Always sums to at most
/// the total budget it was derived from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Allocations {
    pub instructions: usize,
    pub schema: usize,
    pub sample_rows: usize,
    pub examples: usize,
    pub buffer: usize,
}

impl Allocations {
    pub fn from_fractions(total: usize, fractions: &BudgetConfig) -> Self {
        let alloc = |f: f64| (total as f64 * f).floor() as usize;
        Self {
            instructions: alloc(fractions.instructions),
            schema: alloc(fractions.schema),
            sample_rows: alloc(fractions.sample_rows),
            examples: alloc(fractions.examples),
            buffer: alloc(fractions.buffer),
        }
    }

    pub fn total(&self) -> usize {
        self.instructions + self.schema + self.sample_rows + self.examples + self.buffer
    }
}

/// One table's slot in the plan.
#[derive(Debug, Clone, PartialEq)]
pub struct PlannedTable {
    pub name: String,
    pub score: f64,
    /// Detail level this table renders at. Usually the plan's level; drops
    /// to minimal when the table only fit in reduced form.
    pub level: DetailLevel,
    pub include_samples: bool,
    /// `Some` narrows the rendered column list (budget truncation).
    pub columns: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BudgetPlan {
    /// Highest detail level that fit.
    pub detail_level: DetailLevel,
    pub allocations: Allocations,
    /// Tables in ranked order.
    pub tables: Vec<PlannedTable>,
    /// True when anything was dropped, narrowed, or detail-reduced.
    pub truncated: bool,
}

pub struct ContextBudgetManager {
    estimator: Arc<TokenEstimator>,
    fractions: BudgetConfig,
    model_id: String,
}

impl ContextBudgetManager {
    pub fn new(estimator: Arc<TokenEstimator>, fractions: BudgetConfig, model_id: String) -> Self {
        Self {
            estimator,
            fractions,
            model_id,
        }
    }

    /// Plan which tables fit the schema budget at the highest detail level
    /// possible, up to `requested`.
    pub fn plan(
        &self,
        query: &str,
        intent: &QueryIntent,
        schemas: &BTreeMap<String, TableSchema>,
        total_budget: usize,
        requested: DetailLevel,
    ) -> BudgetPlan {
        let allocations = Allocations::from_fractions(total_budget, &self.fractions);
        let ranked = rank_tables(query, intent, schemas, MAX_TABLES);

        if ranked.is_empty() {
            return BudgetPlan {
                detail_level: requested,
                allocations,
                tables: Vec::new(),
                truncated: false,
            };
        }

        // Levels no higher than requested, lowest first. Token cost grows
        // monotonically with the level, so binary search finds the highest
        // level whose walk fits without truncation.
        let candidates: Vec<DetailLevel> = DetailLevel::ALL
            .iter()
            .copied()
            .filter(|l| *l <= requested)
            .collect();

        let mut best: Option<(usize, Vec<PlannedTable>)> = None;
        let (mut lo, mut hi) = (0isize, candidates.len() as isize - 1);
        while lo <= hi {
            let mid = (lo + hi) / 2;
            let level = candidates[mid as usize];
            let (tables, walk_truncated) = self.walk(&ranked, schemas, level, &allocations);
            if walk_truncated {
                hi = mid - 1;
            } else {
                best = Some((mid as usize, tables));
                lo = mid + 1;
            }
        }

        let (level, tables, walk_truncated) = match best {
            Some((i, tables)) => (candidates[i], tables, false),
            None => {
                // Even minimal detail overflows; keep its best-effort walk.
                let level = candidates[0];
                let (tables, _) = self.walk(&ranked, schemas, level, &allocations);
                (level, tables, true)
            }
        };

        let truncated = walk_truncated || level < requested;
        if truncated {
            debug!(
                level = %level,
                tables = tables.len(),
                ranked = ranked.len(),
                "Budget plan reduced to fit"
            );
        }

        BudgetPlan {
            detail_level: level,
            allocations,
            tables,
            truncated,
        }
    }

    /// Walk the ranking at one detail level. Returns the planned tables and
    /// whether anything had to be narrowed or dropped.
    fn walk(
        &self,
        ranked: &[TableScore],
        schemas: &BTreeMap<String, TableSchema>,
        level: DetailLevel,
        allocations: &Allocations,
    ) -> (Vec<PlannedTable>, bool) {
        let mut planned = Vec::new();
        let mut schema_used = 0usize;
        let mut sample_used = 0usize;
        let mut truncated = false;

        for entry in ranked {
            let Some(schema) = schemas.get(&entry.name) else {
                continue;
            };

            // Samples are gated by score and charged to their own category.
            let mut include_samples = entry.score > SAMPLE_SCORE_FLOOR
                && level != DetailLevel::Minimal
                && !schema.sample_rows.is_empty();
            if include_samples {
                let with = self.estimate(&table_section(schema, level, true, None));
                let without = self.estimate(&table_section(schema, level, false, None));
                let sample_cost = with.saturating_sub(without);
                if sample_used + sample_cost > allocations.sample_rows {
                    include_samples = false;
                } else {
                    sample_used += sample_cost;
                }
            }

            let section = table_section(schema, level, include_samples, None);
            let tokens = self.estimate(&section);
            if schema_used + tokens <= allocations.schema {
                planned.push(PlannedTable {
                    name: entry.name.clone(),
                    score: entry.score,
                    level,
                    include_samples,
                    columns: None,
                });
                schema_used += tokens;
                continue;
            }

            // Oversized: narrow the column list instead of dropping the table.
            let remaining = allocations.schema.saturating_sub(schema_used);
            match self.narrow_to_fit(schema, remaining, planned.is_empty()) {
                Some((columns, cost)) => {
                    planned.push(PlannedTable {
                        name: entry.name.clone(),
                        score: entry.score,
                        level: DetailLevel::Minimal,
                        include_samples: false,
                        columns: Some(columns),
                    });
                    schema_used += cost;
                    truncated = true;
                }
                None => {
                    truncated = true;
                    break;
                }
            }
        }

        (planned, truncated)
    }

    /// Narrow a table to a reduced minimal-detail section that fits within
    /// `remaining` schema tokens, trying the widest column list first. When
    /// `must_include` is set the narrowest form is returned even if it still
    /// overflows, so the plan never comes back empty; the renderer's final
    /// clamp keeps the whole prompt under the total budget.
    fn narrow_to_fit(
        &self,
        schema: &TableSchema,
        remaining: usize,
        must_include: bool,
    ) -> Option<(Vec<String>, usize)> {
        let mut narrowest = None;
        for cap in (1..=TRUNCATED_COLUMN_CAP).rev() {
            let columns = truncated_columns(schema, cap);
            let section = table_section(schema, DetailLevel::Minimal, false, Some(&columns));
            let cost = self.estimate(&section);
            if cost <= remaining {
                return Some((columns, cost));
            }
            narrowest = Some((columns, cost));
        }
        if must_include { narrowest } else { None }
    }

    fn estimate(&self, text: &str) -> usize {
        self.estimator.estimate(text, &self.model_id)
    }
}

/// Reduced column list: key columns first, then commonly-queried names,
/// ordinal order within each group, capped.
fn truncated_columns(schema: &TableSchema, cap: usize) -> Vec<String> {
    let mut columns: Vec<String> = schema
        .key_columns()
        .map(|c| c.name.clone())
        .take(cap)
        .collect();
    for col in &schema.columns {
        if columns.len() >= cap {
            break;
        }
        if columns.contains(&col.name) {
            continue;
        }
        if COMMONLY_QUERIED.contains(&col.name.to_lowercase().as_str()) {
            columns.push(col.name.clone());
        }
    }
    if columns.is_empty() {
        // No keys, nothing common: keep the leading columns.
        columns = schema
            .columns
            .iter()
            .take(cap)
            .map(|c| c.name.clone())
            .collect();
    }
    columns
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlprompt_core::ColumnInfo;

    fn table(name: &str, columns: &[&str], rows: u64) -> TableSchema {
        let mut t = TableSchema::new(name);
        t.columns = columns
            .iter()
            .enumerate()
            .map(|(i, c)| ColumnInfo::new(*c, "VARCHAR", i as u32 + 1))
            .collect();
        t.row_estimate = rows;
        t.sample_rows = vec![vec![serde_json::json!("v1"), serde_json::json!("v2")]];
        t
    }

    fn schemas() -> BTreeMap<String, TableSchema> {
        [
            table("sales", &["id", "customer_id", "amount", "created_at"], 5000),
            table("customers", &["id", "name", "email"], 300),
        ]
        .into_iter()
        .map(|t| (t.name.clone(), t))
        .collect()
    }

    fn manager() -> ContextBudgetManager {
        ContextBudgetManager::new(
            Arc::new(TokenEstimator::new()),
            BudgetConfig::default(),
            "llama".to_string(),
        )
    }

    #[test]
    fn allocations_never_exceed_total() {
        for total in [1usize, 37, 100, 999, 4000] {
            let a = Allocations::from_fractions(total, &BudgetConfig::default());
            assert!(a.total() <= total, "allocations overflow at {total}");
        }
    }

    #[test]
    fn generous_budget_keeps_requested_level() {
        let m = manager();
        let intent = QueryIntent::classify("sales amount by customer name");
        let plan = m.plan(
            "sales amount by customer name",
            &intent,
            &schemas(),
            100_000,
            DetailLevel::Comprehensive,
        );
        assert_eq!(plan.detail_level, DetailLevel::Comprehensive);
        assert!(!plan.truncated);
        assert_eq!(plan.tables.len(), 2);
        assert!(plan.tables.iter().all(|t| t.columns.is_none()));
    }

    #[test]
    fn tiny_budget_truncates_but_keeps_a_table() {
        let m = manager();
        let intent = QueryIntent::classify("sales amount by customer name");
        let plan = m.plan(
            "sales amount by customer name",
            &intent,
            &schemas(),
            50,
            DetailLevel::Comprehensive,
        );
        assert!(plan.truncated);
        assert!(!plan.tables.is_empty(), "plan must never come back empty");
    }

    #[test]
    fn detail_degrades_before_tables_drop() {
        let m = manager();
        let intent = QueryIntent::classify("sales amount by customer name");
        // Wide enough for both tables at minimal but not comprehensive.
        let mut budget = 100;
        let plan = loop {
            let plan = m.plan(
                "sales amount by customer name",
                &intent,
                &schemas(),
                budget,
                DetailLevel::Comprehensive,
            );
            if plan.tables.len() == 2 && plan.tables.iter().all(|t| t.columns.is_none()) {
                break plan;
            }
            budget += 50;
            assert!(budget < 100_000, "never found a fitting budget");
        };
        assert!(plan.detail_level <= DetailLevel::Comprehensive);
        // Fitting at a reduced level still reports truncation.
        if plan.detail_level < DetailLevel::Comprehensive {
            assert!(plan.truncated);
        }
    }

    #[test]
    fn oversized_table_narrows_columns_to_fit_allocation() {
        let m = manager();
        let intent = QueryIntent::classify("sales amount by customer name");
        let plan = m.plan(
            "sales amount by customer name",
            &intent,
            &schemas(),
            50,
            DetailLevel::Standard,
        );
        assert!(plan.truncated);

        // The top table is kept in reduced form, and the reduced section
        // fits the schema allocation rather than blowing past it.
        let first = &plan.tables[0];
        assert_eq!(first.level, DetailLevel::Minimal);
        let columns = first.columns.as_ref().expect("narrowed column list");
        let section = table_section(&schemas()[&first.name], first.level, false, Some(columns));
        let cost = TokenEstimator::new().estimate(&section, "llama");
        assert!(
            cost <= plan.allocations.schema,
            "reduced section ({cost} tokens) must fit the schema allocation ({})",
            plan.allocations.schema
        );
    }

    #[test]
    fn empty_schema_plans_empty() {
        let m = manager();
        let intent = QueryIntent::classify("anything");
        let plan = m.plan(
            "anything",
            &intent,
            &BTreeMap::new(),
            4000,
            DetailLevel::Standard,
        );
        assert!(plan.tables.is_empty());
        assert!(!plan.truncated);
    }

    #[test]
    fn truncated_columns_prefer_keys_then_common() {
        let mut t = table(
            "orders",
            &[
                "id", "customer_id", "sku", "flags", "amount", "internal_a", "internal_b",
                "internal_c",
            ],
            10,
        );
        t.columns[0].is_primary_key = true;
        t.columns[1].is_foreign_key = true;
        let cols = truncated_columns(&t, TRUNCATED_COLUMN_CAP);
        assert_eq!(cols[0], "id");
        assert_eq!(cols[1], "customer_id");
        assert!(cols.contains(&"amount".to_string()));
        assert!(cols.len() <= TRUNCATED_COLUMN_CAP);
        assert!(!cols.contains(&"internal_a".to_string()));
    }

    #[test]
    fn plan_is_deterministic() {
        let m = manager();
        let intent = QueryIntent::classify("sales by customer");
        let a = m.plan("sales by customer", &intent, &schemas(), 400, DetailLevel::Standard);
        let b = m.plan("sales by customer", &intent, &schemas(), 400, DetailLevel::Standard);
        assert_eq!(a, b);
    }
}
