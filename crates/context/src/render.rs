//! Prompt text rendering.
//!
//! All formatting lives here so the budget walk and the assembler measure
//! the exact text that ends up in the prompt.

use crate::token::TokenEstimator;
use sqlprompt_core::{DetailLevel, IntentKind, QueryIntent, TableSchema};

/// Base instruction block for DuckDB SQL generation.
pub const SQL_SYSTEM_PROMPT: &str = "You are a SQL expert specializing in DuckDB. Convert natural language to DuckDB SQL.
Rules:
1. Only respond with valid SQL queries - no explanations or comments
2. Use DuckDB syntax and functions
3. Always add LIMIT clause for safety (default LIMIT 100 unless specified)
4. Use appropriate aggregate functions when asked for summaries
5. Handle NULL values appropriately
6. For text searches, use ILIKE for case-insensitive matching
7. Return only the SQL query, nothing else";

/// Static guidelines appended at comprehensive detail.
pub const QUERY_GUIDELINES: &str = "Query Guidelines:
- Prefer explicit JOIN conditions over implicit joins
- Qualify column names with table aliases when joining
- Use the relationships listed above to pick join keys";

/// Line appended wherever text was cut to fit a token budget.
pub const TRUNCATION_MARKER: &str = "[Truncated to fit token budget]";

const MAX_RELATIONSHIPS: usize = 3;
const MAX_SAMPLE_COLUMNS: usize = 5;
const MAX_SAMPLE_ROWS: usize = 2;
const MAX_SAMPLE_VALUE_CHARS: usize = 20;
const MAX_INTENT_HINTS: usize = 2;
const HINT_CONFIDENCE_FLOOR: f64 = 0.3;

/// One guidance line per detected intent kind.
fn hint_for(kind: IntentKind) -> Option<&'static str> {
    match kind {
        IntentKind::Aggregation => {
            Some("Use aggregate functions (SUM, AVG, COUNT) with GROUP BY")
        }
        IntentKind::Join => Some("Join related tables on their foreign key columns"),
        IntentKind::Filter => Some("Apply WHERE conditions; use ILIKE for text matching"),
        IntentKind::TimeSeries => {
            Some("Use date_trunc for time bucketing and ORDER BY the time column")
        }
        IntentKind::Ranking => Some("Use ORDER BY with LIMIT, or window functions for rankings"),
        IntentKind::General => None,
    }
}

/// Guidance lines for the top detected intents. Empty when nothing clears
/// the confidence floor.
pub fn intent_hints(intent: &QueryIntent) -> String {
    let mut kinds: Vec<(&IntentKind, &f64)> = intent.kinds.iter().collect();
    kinds.sort_by(|a, b| b.1.total_cmp(a.1).then(a.0.cmp(b.0)));

    let mut lines = Vec::new();
    for (kind, score) in kinds.into_iter().take(MAX_INTENT_HINTS) {
        if *score > HINT_CONFIDENCE_FLOOR {
            if let Some(hint) = hint_for(*kind) {
                lines.push(format!("- {hint}"));
            }
        }
    }
    lines.join("\n")
}

/// Render one table's schema section.
///
/// `columns` narrows the column list when the budget walk had to truncate;
/// `None` renders every column.
pub fn table_section(
    schema: &TableSchema,
    level: DetailLevel,
    include_samples: bool,
    columns: Option<&[String]>,
) -> String {
    let mut parts = Vec::new();

    let row_info = if schema.row_estimate > 0 {
        format!(" ({} rows)", group_thousands(schema.row_estimate))
    } else {
        String::new()
    };
    parts.push(format!("\n### Table: {}{}", schema.name, row_info));

    parts.push("Columns:".to_string());
    let truncated_columns = columns.is_some();
    for col in &schema.columns {
        if let Some(wanted) = columns {
            if !wanted.contains(&col.name) {
                continue;
            }
        }
        let mut desc = format!("  - {}: {}", col.name, col.data_type);
        if level != DetailLevel::Minimal {
            let mut constraints = Vec::new();
            if col.is_primary_key {
                constraints.push("PK");
            }
            if col.is_unique {
                constraints.push("UNIQUE");
            }
            if !col.is_nullable {
                constraints.push("NOT NULL");
            }
            if !constraints.is_empty() {
                desc.push_str(&format!(" [{}]", constraints.join(", ")));
            }
        }
        if level == DetailLevel::Comprehensive {
            if let Some(card) = schema.cardinality_stats.get(&col.name) {
                desc.push_str(&format!(" (cardinality: {})", group_thousands(*card)));
            }
        }
        parts.push(desc);
    }
    if truncated_columns {
        parts.push("  - ... (column list truncated)".to_string());
    }

    if level != DetailLevel::Minimal && !schema.foreign_keys.is_empty() {
        parts.push("\nRelationships:".to_string());
        for fk in schema.foreign_keys.iter().take(MAX_RELATIONSHIPS) {
            parts.push(format!("  - {fk}"));
        }
    }

    if include_samples && level != DetailLevel::Minimal && !schema.sample_rows.is_empty() {
        parts.push("\nSample Data:".to_string());
        let col_names: Vec<&str> = schema
            .columns
            .iter()
            .take(MAX_SAMPLE_COLUMNS)
            .map(|c| c.name.as_str())
            .collect();
        parts.push(format!("  {}", col_names.join(" | ")));
        for row in schema.sample_rows.iter().take(MAX_SAMPLE_ROWS) {
            let values: Vec<String> = row
                .iter()
                .take(MAX_SAMPLE_COLUMNS)
                .map(format_sample_value)
                .collect();
            parts.push(format!("  {}", values.join(" | ")));
        }
    }

    parts.join("\n")
}

fn format_sample_value(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::Null => "NULL".to_string(),
        serde_json::Value::String(s) if s.chars().count() > MAX_SAMPLE_VALUE_CHARS => {
            let prefix: String = s.chars().take(MAX_SAMPLE_VALUE_CHARS - 3).collect();
            format!("{prefix}...")
        }
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Everything in the prompt except the trailing user-query section:
/// instructions, guidance, and the schema sections.
pub fn compose_body(
    instructions: &str,
    hints: &str,
    schema_sections: &[String],
    guidelines: Option<&str>,
) -> String {
    let mut parts = vec![instructions.to_string()];
    if !hints.is_empty() {
        parts.push("\n## Query Guidance".to_string());
        parts.push(hints.to_string());
    }
    parts.push("\n## Database Schema".to_string());
    parts.push(schema_sections.join("\n"));
    if let Some(g) = guidelines {
        parts.push(format!("\n{g}"));
    }
    parts.join("\n")
}

/// The trailing user-query section. Never truncated — cutting the query
/// itself would leave the model nothing to convert.
pub fn query_section(query: &str) -> String {
    format!("\n\n## User Query\nConvert to SQL: {query}")
}

/// Assemble the final prompt from its sections.
pub fn compose_prompt(
    instructions: &str,
    hints: &str,
    schema_sections: &[String],
    guidelines: Option<&str>,
    query: &str,
) -> String {
    format!(
        "{}{}",
        compose_body(instructions, hints, schema_sections, guidelines),
        query_section(query)
    )
}

/// Truncate line-wise to a token budget, binary-searching the cut point.
/// The truncation marker is charged against the same budget; when not even
/// the marker fits, the result is empty.
pub fn truncate_to_budget(
    text: &str,
    token_budget: usize,
    estimator: &TokenEstimator,
    model_id: &str,
) -> String {
    if estimator.estimate(text, model_id) <= token_budget {
        return text.to_string();
    }

    let lines: Vec<&str> = text.split('\n').collect();
    let fits = |prefix: &str| {
        estimator.estimate(&format!("{prefix}\n{TRUNCATION_MARKER}"), model_id) <= token_budget
    };
    let (mut left, mut right) = (0usize, lines.len());
    while left < right {
        let mid = (left + right + 1) / 2;
        if fits(&lines[..mid].join("\n")) {
            left = mid;
        } else {
            right = mid - 1;
        }
    }

    if left == 0 && !fits("") {
        return String::new();
    }
    format!("{}\n{TRUNCATION_MARKER}", lines[..left].join("\n"))
}

/// Final whole-prompt guard. Category allocations do not cover the section
/// headers or the query line, so the assembled text can overshoot the total
/// by a margin; this cuts body lines from the end until the prompt fits,
/// always keeping the user-query section intact.
pub fn clamp_prompt(
    body: &str,
    tail: &str,
    token_budget: usize,
    estimator: &TokenEstimator,
    model_id: &str,
) -> (String, bool) {
    let full = format!("{body}{tail}");
    if estimator.estimate(&full, model_id) <= token_budget {
        return (full, false);
    }

    let lines: Vec<&str> = body.split('\n').collect();
    let fits = |prefix: &str| {
        estimator.estimate(&format!("{prefix}\n{TRUNCATION_MARKER}{tail}"), model_id)
            <= token_budget
    };
    let (mut left, mut right) = (0usize, lines.len());
    while left < right {
        let mid = (left + right + 1) / 2;
        if fits(&lines[..mid].join("\n")) {
            left = mid;
        } else {
            right = mid - 1;
        }
    }

    if left == 0 && !fits("") {
        // Nothing but the query fits.
        return (tail.trim_start().to_string(), true);
    }
    (
        format!("{}\n{TRUNCATION_MARKER}{tail}", lines[..left].join("\n")),
        true,
    )
}

/// Format an integer with thousands separators (1200 -> "1,200").
pub fn group_thousands(n: u64) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}
