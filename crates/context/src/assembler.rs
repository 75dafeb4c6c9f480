//! End-to-end context assembly.
//!
//! One `assemble` call runs the whole pipeline: intent classification,
//! fingerprint check, cache-validated schema fetch with an ordered fallback
//! chain, budget planning, prompt rendering, and confidence scoring. Budget
//! overflow is never an error — the caller always gets the smallest valid
//! payload with `truncated` set.

use crate::budget::{BudgetPlan, ContextBudgetManager};
use crate::render;
use crate::token::TokenEstimator;
use sqlprompt_cache::{CacheSettings, MultiLevelCache};
use sqlprompt_config::AppConfig;
use sqlprompt_core::hash::{short_sha256, short_sha256_parts};
use sqlprompt_core::{
    ContextPayload, ContextSource, DetailLevel, Error, QueryIntent, Result, StorageEngine,
    TableSchema,
};
use sqlprompt_extract::{ExtractorOptions, SchemaExtractor};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, info, warn};

const CONFIDENCE_BASE: f64 = 0.5;
const CONFIDENCE_CACHE_HIT: f64 = 0.15;
const CONFIDENCE_UNTRUNCATED: f64 = 0.2;
const CONFIDENCE_FALLBACK_PENALTY: f64 = 0.15;
const CONFIDENCE_MINIMAL_PENALTY: f64 = 0.1;
const CONFIDENCE_SMOOTHING: f64 = 0.05;

type SchemaMap = BTreeMap<String, TableSchema>;

/// Ordered schema-fetch strategies. Each is tried in turn until one yields
/// a usable schema map; `Degraded` always terminates the chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FetchStrategy {
    ValidatedCache,
    FreshExtract,
    StaleCache,
    Degraded,
}

const FETCH_ORDER: [FetchStrategy; 4] = [
    FetchStrategy::ValidatedCache,
    FetchStrategy::FreshExtract,
    FetchStrategy::StaleCache,
    FetchStrategy::Degraded,
];

pub struct ContextAssembler {
    engine: Arc<dyn StorageEngine>,
    cache: MultiLevelCache<SchemaMap>,
    extractor: SchemaExtractor,
    estimator: Arc<TokenEstimator>,
    budget: ContextBudgetManager,
    config: AppConfig,
}

impl ContextAssembler {
    pub fn new(engine: Arc<dyn StorageEngine>, config: AppConfig) -> Self {
        let cache = MultiLevelCache::new(CacheSettings {
            l1_max_entries: config.cache.l1_max_entries,
            l2_max_entries: config.cache.l2_max_entries,
            max_memory_bytes: config.cache.max_memory_mb * 1024 * 1024,
            promotion_threshold: config.cache.promotion_threshold,
            disk_dir: Some(config.cache.cache_dir()),
        });
        let extractor = SchemaExtractor::new(
            Arc::clone(&engine),
            ExtractorOptions {
                sample_rows: config.extraction.sample_rows,
                workers: config.extraction.effective_workers(),
                op_timeout: Duration::from_millis(config.extraction.timeout_ms),
                cardinality_stats: config.extraction.cardinality_stats,
            },
        );
        let estimator = Arc::new(TokenEstimator::new());
        let budget = ContextBudgetManager::new(
            Arc::clone(&estimator),
            config.budget.clone(),
            config.model_id.clone(),
        );
        Self {
            engine,
            cache,
            extractor,
            estimator,
            budget,
            config,
        }
    }

    /// Assemble the LLM context for one natural-language query.
    pub async fn assemble(&self, query: &str) -> Result<ContextPayload> {
        let intent = QueryIntent::classify(query);
        debug!(kinds = ?intent.kinds, "Classified query intent");

        let catalog = self.live_catalog().await;
        let (schemas, source) = self.fetch_schemas(catalog.as_ref()).await;

        let requested = self
            .config
            .parsed_detail_level()
            .map_err(|e| Error::Config {
                message: e.to_string(),
            })?;
        // A degraded snapshot is already untrustworthy; spending budget on
        // detail it may not have is pointless.
        let requested = if source == ContextSource::Degraded {
            DetailLevel::Minimal
        } else {
            requested
        };

        let plan = self.budget.plan(
            query,
            &intent,
            &schemas,
            self.config.max_context_tokens,
            requested,
        );

        let (prompt, clamped) = self.render(query, &intent, &schemas, &plan);
        let estimated_tokens = self.estimator.estimate(&prompt, &self.config.model_id);
        let truncated = plan.truncated || clamped;
        let confidence = confidence_score(&prompt, source, truncated, plan.detail_level);

        Ok(ContextPayload {
            prompt,
            tables_included: plan.tables.iter().map(|t| t.name.clone()).collect(),
            estimated_tokens,
            truncated,
            detail_level: plan.detail_level,
            confidence,
            source,
        })
    }

    /// Cache statistics for the schema cache.
    pub async fn cache_stats(&self) -> sqlprompt_cache::CacheStats {
        self.cache.stats().await
    }

    /// Table names plus live structural fingerprints. `None` when the
    /// engine is unreachable — the fallback chain then skips straight to
    /// stale data.
    async fn live_catalog(&self) -> Option<Catalog> {
        let op_timeout = Duration::from_millis(self.config.extraction.timeout_ms);
        let names = match timeout(op_timeout, self.engine.table_names()).await {
            Ok(Ok(mut names)) => {
                names.sort();
                names
            }
            Ok(Err(e)) => {
                warn!(error = %e, "Could not list tables, falling back to stale data");
                return None;
            }
            Err(_) => {
                warn!("Table listing timed out, falling back to stale data");
                return None;
            }
        };

        let mut fingerprints = Vec::with_capacity(names.len());
        for name in &names {
            match timeout(op_timeout, self.engine.structural_fingerprint(name)).await {
                Ok(Ok(fp)) => fingerprints.push(fp),
                Ok(Err(e)) => {
                    warn!(table = %name, error = %e, "Fingerprint failed, falling back to stale data");
                    return None;
                }
                Err(_) => {
                    warn!(table = %name, "Fingerprint timed out, falling back to stale data");
                    return None;
                }
            }
        }

        let mut parts = names.clone();
        parts.extend(fingerprints.iter().cloned());
        parts.push(self.config.model_id.clone());
        let cache_key = format!("schema:{}", short_sha256_parts(&parts));
        let checksum = short_sha256_parts(&fingerprints);
        Some(Catalog {
            names,
            cache_key,
            checksum,
        })
    }

    /// Run the fallback chain. Always yields a schema map — possibly empty
    /// on the degraded path — plus the source it came from.
    async fn fetch_schemas(&self, catalog: Option<&Catalog>) -> (SchemaMap, ContextSource) {
        let ttl = Duration::from_secs(self.config.cache.ttl_secs);
        // Partial output of a failed fresh pass, reused by the degraded path.
        let mut partial: Option<SchemaMap> = None;

        for strategy in FETCH_ORDER {
            match strategy {
                FetchStrategy::ValidatedCache => {
                    let Some(catalog) = catalog else { continue };
                    if let Some(schemas) =
                        self.cache.get_validated(&catalog.cache_key, &catalog.checksum).await
                    {
                        debug!(tables = schemas.len(), "Serving schema from validated cache");
                        return (schemas, ContextSource::Cache);
                    }
                }
                FetchStrategy::FreshExtract => {
                    let Some(catalog) = catalog else { continue };
                    match self.extractor.extract(Some(&catalog.names)).await {
                        Ok(schemas) if schemas.len() == catalog.names.len() => {
                            info!(tables = schemas.len(), "Fresh schema extraction");
                            self.cache
                                .put(
                                    &catalog.cache_key,
                                    schemas.clone(),
                                    ttl,
                                    Some(catalog.checksum.clone()),
                                )
                                .await;
                            return (schemas, ContextSource::Fresh);
                        }
                        Ok(schemas) if !catalog.names.is_empty() => {
                            // Some tables failed; keep what extracted but let
                            // the stale entry compete before settling.
                            warn!(
                                extracted = schemas.len(),
                                expected = catalog.names.len(),
                                "Partial extraction, trying stale cache"
                            );
                            partial = Some(schemas);
                        }
                        Ok(schemas) => return (schemas, ContextSource::Fresh),
                        Err(e) => {
                            warn!(error = %e, "Fresh extraction failed, trying stale cache");
                        }
                    }
                }
                FetchStrategy::StaleCache => {
                    let Some(catalog) = catalog else { continue };
                    if let Some(schemas) = self.cache.get_stale(&catalog.cache_key).await {
                        warn!(tables = schemas.len(), "Serving stale schema snapshot");
                        return (schemas, ContextSource::StaleCache);
                    }
                }
                FetchStrategy::Degraded => {
                    let schemas = partial.take().unwrap_or_default();
                    warn!(
                        tables = schemas.len(),
                        "Degraded context: assembling from partial schema"
                    );
                    return (schemas, ContextSource::Degraded);
                }
            }
        }

        // FETCH_ORDER ends with Degraded, which always returns.
        (SchemaMap::new(), ContextSource::Degraded)
    }

    /// Render the prompt. The boolean is true when the whole-prompt clamp
    /// had to cut lines beyond what the plan already reduced.
    fn render(
        &self,
        query: &str,
        intent: &QueryIntent,
        schemas: &SchemaMap,
        plan: &BudgetPlan,
    ) -> (String, bool) {
        let model_id = &self.config.model_id;
        let instructions = render::truncate_to_budget(
            render::SQL_SYSTEM_PROMPT,
            plan.allocations.instructions,
            &self.estimator,
            model_id,
        );

        let hints = {
            let text = render::intent_hints(intent);
            if text.is_empty()
                || self.estimator.estimate(&text, model_id) > plan.allocations.examples
            {
                String::new()
            } else {
                text
            }
        };

        let sections: Vec<String> = plan
            .tables
            .iter()
            .filter_map(|t| {
                schemas.get(&t.name).map(|schema| {
                    render::table_section(
                        schema,
                        t.level,
                        t.include_samples,
                        t.columns.as_deref(),
                    )
                })
            })
            .collect();

        let guidelines = (plan.detail_level == DetailLevel::Comprehensive)
            .then_some(render::QUERY_GUIDELINES);

        // Category allocations never cover the section headers or the query
        // line; the final clamp holds the hard total-budget ceiling.
        let body = render::compose_body(&instructions, &hints, &sections, guidelines);
        let tail = render::query_section(query);
        render::clamp_prompt(
            &body,
            &tail,
            self.config.max_context_tokens,
            &self.estimator,
            model_id,
        )
    }
}

struct Catalog {
    names: Vec<String>,
    cache_key: String,
    checksum: String,
}

/// Advisory confidence heuristic. Deterministic: the smoothing term comes
/// from a stable hash of the prompt, not an RNG, so identical inputs give
/// identical scores.
fn confidence_score(
    prompt: &str,
    source: ContextSource,
    truncated: bool,
    level: DetailLevel,
) -> f64 {
    let mut score = CONFIDENCE_BASE;
    if source == ContextSource::Cache {
        score += CONFIDENCE_CACHE_HIT;
    }
    if !truncated {
        score += CONFIDENCE_UNTRUNCATED;
    }
    if matches!(source, ContextSource::StaleCache | ContextSource::Degraded) {
        score -= CONFIDENCE_FALLBACK_PENALTY;
    }
    if level == DetailLevel::Minimal {
        score -= CONFIDENCE_MINIMAL_PENALTY;
    }
    score += smoothing(prompt);
    score.clamp(0.0, 1.0)
}

/// Bounded smoothing in [-0.05, 0.05] derived from the prompt hash.
fn smoothing(prompt: &str) -> f64 {
    let hash = short_sha256(prompt);
    let bucket = u32::from_str_radix(&hash[..8], 16).unwrap_or(0);
    (bucket as f64 / u32::MAX as f64) * (2.0 * CONFIDENCE_SMOOTHING) - CONFIDENCE_SMOOTHING
}
