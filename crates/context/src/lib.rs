//! Context assembly for NL-to-SQL generation.
//!
//! Turns a natural-language query plus an extracted schema into a
//! budget-bounded LLM prompt: relevance ranking picks the tables, the budget
//! manager decides how much of each fits, the renderer produces the text,
//! and the assembler wires it all to the cache and the extractor.

pub mod assembler;
pub mod budget;
pub mod relevance;
pub mod render;
pub mod token;

pub use assembler::ContextAssembler;
pub use budget::{Allocations, BudgetPlan, ContextBudgetManager, PlannedTable};
pub use relevance::{rank_tables, score_tables, TableScore};
pub use token::TokenEstimator;
