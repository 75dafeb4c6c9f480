//! Relevance scoring and ranking of tables against a query.
//!
//! Pure functions over (query tokens, table metadata). No I/O, no caching,
//! no shared state — scoring must be reproducible for the same inputs so
//! that a warm cache yields an identical table ordering.

use sqlprompt_core::{IntentKind, QueryIntent, TableSchema};
use std::collections::{BTreeMap, BTreeSet};

// Match weights. Exact name hits dominate word overlap, which dominates
// column-level signals.
const TABLE_NAME_MATCH: f64 = 100.0;
const TABLE_WORD_OVERLAP: f64 = 20.0;
const COLUMN_NAME_MATCH: f64 = 25.0;
const COLUMN_WORD_MATCH: f64 = 10.0;
const COLUMN_DIVERSITY_STEP: f64 = 5.0;
const COLUMN_DIVERSITY_CAP: f64 = 25.0;
const FK_DEGREE_WEIGHT: f64 = 3.0;
const AGGREGATION_LARGE_TABLE_BONUS: f64 = 10.0;
const JOIN_RELATED_BONUS: f64 = 15.0;
const RELATED_TO_HOT_BONUS: f64 = 15.0;
const HOT_SCORE: f64 = 50.0;
const LARGE_TABLE_PENALTY: f64 = 0.7;
const MIN_RELEVANT_SCORE: f64 = 10.0;
const MIN_TABLES: usize = 3;

#[derive(Debug, Clone, PartialEq)]
pub struct TableScore {
    pub name: String,
    pub score: f64,
    pub row_estimate: u64,
}

/// Score every table, rank descending, and select the relevant subset.
///
/// Selection keeps tables scoring above the relevance floor, topped up to a
/// minimum of three, capped at `max_tables`. When nothing in the query
/// matches the schema at all, falls back to the most central tables so the
/// result is never empty.
pub fn rank_tables(
    query: &str,
    intent: &QueryIntent,
    schemas: &BTreeMap<String, TableSchema>,
    max_tables: usize,
) -> Vec<TableScore> {
    if !has_keyword_signal(query, intent, schemas) {
        return central_tables(schemas, MIN_TABLES.min(max_tables));
    }

    let mut scored = score_tables(query, intent, schemas);
    sort_ranked(&mut scored);

    let mut result = Vec::new();
    for entry in scored {
        if entry.score > MIN_RELEVANT_SCORE || result.len() < MIN_TABLES {
            result.push(entry);
            if result.len() >= max_tables {
                break;
            }
        }
    }
    result
}

/// Raw relevance scores, unordered. Exposed separately for testing the
/// weights without the selection policy.
pub fn score_tables(
    query: &str,
    intent: &QueryIntent,
    schemas: &BTreeMap<String, TableSchema>,
) -> Vec<TableScore> {
    let query_lower = query.to_lowercase();
    let query_words: BTreeSet<&str> = intent.keywords.iter().map(String::as_str).collect();

    let mut scored: Vec<TableScore> = schemas
        .values()
        .map(|schema| TableScore {
            name: schema.name.clone(),
            score: base_score(schema, &query_lower, &query_words, intent),
            row_estimate: schema.row_estimate,
        })
        .collect();

    // Second pass: joins are common, so a table related to an already-hot
    // table gets pulled along even when the query never names it. Hot names
    // are collected up front so the bonus pass can mutate the scores.
    let hot: BTreeSet<String> = scored
        .iter()
        .filter(|t| t.score > HOT_SCORE)
        .map(|t| t.name.clone())
        .collect();
    for entry in &mut scored {
        if hot.contains(entry.name.as_str()) {
            continue;
        }
        let schema = &schemas[&entry.name];
        let related_to_hot = schema
            .foreign_keys
            .iter()
            .any(|fk| hot.contains(fk.to_table.as_str()))
            || schemas.values().any(|other| {
                hot.contains(other.name.as_str())
                    && other
                        .foreign_keys
                        .iter()
                        .any(|fk| fk.to_table == entry.name)
            });
        if related_to_hot {
            entry.score += RELATED_TO_HOT_BONUS;
        }
    }

    scored
}

/// Whether any table or column matches the query at all. Structural terms
/// (FK degree, intent boosts) don't count: they rank, they don't select.
fn has_keyword_signal(
    query: &str,
    intent: &QueryIntent,
    schemas: &BTreeMap<String, TableSchema>,
) -> bool {
    let query_lower = query.to_lowercase();
    let query_words: BTreeSet<&str> = intent.keywords.iter().map(String::as_str).collect();
    schemas.values().any(|schema| {
        let table_lower = schema.name.to_lowercase();
        if query_lower.contains(&table_lower) {
            return true;
        }
        if table_lower.split('_').any(|w| query_words.contains(w)) {
            return true;
        }
        schema.columns.iter().any(|col| {
            let col_lower = col.name.to_lowercase();
            query_lower.contains(&col_lower) || col_lower.split('_').any(|w| query_words.contains(w))
        })
    })
}

fn base_score(
    schema: &TableSchema,
    query_lower: &str,
    query_words: &BTreeSet<&str>,
    intent: &QueryIntent,
) -> f64 {
    let mut score = 0.0;
    let table_lower = schema.name.to_lowercase();

    if query_lower.contains(&table_lower) {
        score += TABLE_NAME_MATCH;
    }

    let table_words: BTreeSet<&str> = table_lower.split('_').collect();
    let overlap = table_words.intersection(query_words).count();
    score += overlap as f64 * TABLE_WORD_OVERLAP;

    let mut column_matches = 0usize;
    for col in &schema.columns {
        let col_lower = col.name.to_lowercase();
        if query_lower.contains(&col_lower) {
            score += COLUMN_NAME_MATCH;
            column_matches += 1;
        } else if col_lower.split('_').any(|w| query_words.contains(w)) {
            score += COLUMN_WORD_MATCH;
            column_matches += 1;
        }
    }
    if column_matches > 0 {
        score += (column_matches as f64 * COLUMN_DIVERSITY_STEP).min(COLUMN_DIVERSITY_CAP);
    }

    score += schema.foreign_keys.len() as f64 * FK_DEGREE_WEIGHT;

    if intent.score(IntentKind::Aggregation) > 0.3 && schema.row_estimate > 1000 {
        score += AGGREGATION_LARGE_TABLE_BONUS;
    }
    if intent.score(IntentKind::Join) > 0.3 && !schema.foreign_keys.is_empty() {
        score += JOIN_RELATED_BONUS;
    }

    // Very large tables are deprioritized unless the query names them.
    if schema.row_estimate > 1_000_000 && !query_lower.contains(&table_lower) {
        score *= LARGE_TABLE_PENALTY;
    }

    score
}

/// Deterministic ordering: score desc, then row estimate desc (bigger tables
/// are assumed more central), then name asc.
fn sort_ranked(scored: &mut [TableScore]) {
    scored.sort_by(|a, b| {
        b.score
            .total_cmp(&a.score)
            .then(b.row_estimate.cmp(&a.row_estimate))
            .then(a.name.cmp(&b.name))
    });
}

/// Most central tables: FK degree (outgoing plus incoming) first, then row
/// estimate. Used when the query matched nothing.
fn central_tables(schemas: &BTreeMap<String, TableSchema>, n: usize) -> Vec<TableScore> {
    let mut incoming: BTreeMap<&str, usize> = BTreeMap::new();
    for schema in schemas.values() {
        for fk in &schema.foreign_keys {
            *incoming.entry(fk.to_table.as_str()).or_default() += 1;
        }
    }

    let mut entries: Vec<(usize, TableScore)> = schemas
        .values()
        .map(|schema| {
            let degree = schema.foreign_keys.len()
                + incoming.get(schema.name.as_str()).copied().unwrap_or(0);
            (
                degree,
                TableScore {
                    name: schema.name.clone(),
                    score: 0.0,
                    row_estimate: schema.row_estimate,
                },
            )
        })
        .collect();
    entries.sort_by(|(da, a), (db, b)| {
        db.cmp(da)
            .then(b.row_estimate.cmp(&a.row_estimate))
            .then(a.name.cmp(&b.name))
    });
    entries.into_iter().take(n).map(|(_, t)| t).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlprompt_core::{CardinalityHint, ColumnInfo, ForeignKeyRelation};

    fn table(name: &str, columns: &[&str], rows: u64) -> TableSchema {
        let mut t = TableSchema::new(name);
        t.columns = columns
            .iter()
            .enumerate()
            .map(|(i, c)| ColumnInfo::new(*c, "VARCHAR", i as u32 + 1))
            .collect();
        t.row_estimate = rows;
        t
    }

    fn fk(from: &str, col: &str, to: &str) -> ForeignKeyRelation {
        ForeignKeyRelation {
            from_table: from.into(),
            from_column: col.into(),
            to_table: to.into(),
            to_column: "id".into(),
            cardinality: CardinalityHint::OneToMany,
        }
    }

    fn demo_schema() -> BTreeMap<String, TableSchema> {
        let mut sales = table(
            "sales",
            &[
                "id", "customer_id", "product_id", "amount", "revenue", "quantity", "discount",
                "region", "channel", "status", "created_at", "updated_at",
            ],
            120_000,
        );
        sales.foreign_keys = vec![fk("sales", "customer_id", "customers")];
        let customers = table(
            "customers",
            &[
                "id", "name", "email", "segment", "country", "city", "joined_at", "active",
            ],
            8_000,
        );
        let web_logs = table(
            "web_logs",
            &[
                "id", "session", "path", "referrer", "agent", "ip", "duration", "status_code",
                "ts",
            ],
            2_000_000,
        );
        [sales, customers, web_logs]
            .into_iter()
            .map(|t| (t.name.clone(), t))
            .collect()
    }

    #[test]
    fn revenue_query_ranks_web_logs_last() {
        let query = "total revenue by customer";
        let intent = QueryIntent::classify(query);
        let ranked = rank_tables(query, &intent, &demo_schema(), 15);

        let names: Vec<&str> = ranked.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names.len(), 3);
        assert_eq!(names[2], "web_logs");
        assert!(names[..2].contains(&"sales"));
        assert!(names[..2].contains(&"customers"));
    }

    #[test]
    fn exact_table_name_dominates() {
        let query = "show me the web_logs for today";
        let intent = QueryIntent::classify(query);
        let ranked = rank_tables(query, &intent, &demo_schema(), 15);
        assert_eq!(ranked[0].name, "web_logs");
    }

    #[test]
    fn fk_bonus_pulls_in_related_table() {
        let query = "sales amount by region";
        let intent = QueryIntent::classify(query);
        let scores = score_tables(query, &intent, &demo_schema());

        let customers = scores.iter().find(|t| t.name == "customers").unwrap();
        let logs = scores.iter().find(|t| t.name == "web_logs").unwrap();
        // customers is related to hot "sales"; web_logs is isolated.
        assert!(customers.score > logs.score);
    }

    #[test]
    fn pull_along_bonus_is_the_only_score_for_unmentioned_related_table() {
        // "customers" gets no textual match here; its whole score must be
        // the second-pass bonus for being joined to the hot "sales" table.
        let query = "show me the sales table";
        let intent = QueryIntent::classify(query);
        let scores = score_tables(query, &intent, &demo_schema());

        let sales = scores.iter().find(|t| t.name == "sales").unwrap();
        let customers = scores.iter().find(|t| t.name == "customers").unwrap();
        assert!(sales.score > HOT_SCORE);
        assert_eq!(customers.score, RELATED_TO_HOT_BONUS);
    }

    #[test]
    fn no_match_falls_back_to_central_tables() {
        let query = "zzz qqq xyzzy";
        let intent = QueryIntent::classify(query);
        let ranked = rank_tables(query, &intent, &demo_schema(), 15);

        assert_eq!(ranked.len(), 3);
        // sales and customers share the FK edge; both precede web_logs.
        assert_eq!(ranked[2].name, "web_logs");
    }

    #[test]
    fn empty_schema_yields_empty_ranking() {
        let intent = QueryIntent::classify("anything");
        let ranked = rank_tables("anything", &intent, &BTreeMap::new(), 15);
        assert!(ranked.is_empty());
    }

    #[test]
    fn ranking_is_deterministic() {
        let query = "total revenue by customer";
        let intent = QueryIntent::classify(query);
        let a = rank_tables(query, &intent, &demo_schema(), 15);
        let b = rank_tables(query, &intent, &demo_schema(), 15);
        assert_eq!(a, b);
    }
}
