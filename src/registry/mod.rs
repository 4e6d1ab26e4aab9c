//! Plan & schema registry.
//!
//! Process-wide lookup tables built once at startup: normalized query →
//! plan entry, table → covering caches, table/column → uniqueness metadata.
//! The registry also owns the live result caches, one per cacheable SELECT.
//! After construction only cache contents and the unknown-query diagnostics
//! mutate, so readers take no locks on the plan maps.

use std::sync::Arc;

use dashmap::DashMap;
use fxhash::FxHashMap;

use crate::cache::{CacheConfig, CacheStats, ResultCache};
use crate::plan::{CachePlan, ColumnMeta, Operator, PlanEntry, PlanError, Schema, SelectPlan};

/// A reference to one live cache plus the SELECT body it serves.
#[derive(Clone)]
pub struct CacheHandle {
    /// Normalized query text, also usable as executable SQL for point loads.
    pub query: Arc<str>,
    pub info: Arc<SelectPlan>,
    pub cache: Arc<ResultCache>,
    /// The fingerprint is a row identity: the SELECT's sole condition is
    /// equality on a primary or unique column, with no extra args.
    pub unique_only: bool,
}

pub struct Registry {
    queries: FxHashMap<String, Arc<PlanEntry>>,
    caches: FxHashMap<String, CacheHandle>,
    by_table: FxHashMap<String, Vec<CacheHandle>>,
    schema: Schema,
    unknown: DashMap<String, u64>,
}

impl Registry {
    pub fn new(plan: CachePlan, schema: Schema, config: CacheConfig) -> Result<Self, PlanError> {
        let mut queries = FxHashMap::default();
        let mut caches: FxHashMap<String, CacheHandle> = FxHashMap::default();
        let mut by_table: FxHashMap<String, Vec<CacheHandle>> = FxHashMap::default();

        for entry in plan.queries {
            let text = entry.query().to_string();
            if queries.contains_key(&text) {
                return Err(PlanError::DuplicateQuery(text));
            }

            if let PlanEntry::Select(select) = &entry {
                if select.cache {
                    let info = Arc::new(select.clone());
                    let handle = CacheHandle {
                        query: Arc::from(text.as_str()),
                        cache: Arc::new(ResultCache::new(text.clone(), &config)),
                        unique_only: unique_only(&info, &schema),
                        info,
                    };
                    by_table
                        .entry(select.table.clone())
                        .or_default()
                        .push(handle.clone());
                    caches.insert(text.clone(), handle);
                }
            }

            queries.insert(text, Arc::new(entry));
        }

        tracing::info!(
            queries = queries.len(),
            caches = caches.len(),
            tables = schema.table_count(),
            "cache registry initialized"
        );

        Ok(Self {
            queries,
            caches,
            by_table,
            schema,
            unknown: DashMap::new(),
        })
    }

    /// Load the plan and schema files and build the registry. Failure here
    /// is fatal to startup by design.
    pub fn from_paths(
        plan_path: impl AsRef<std::path::Path>,
        schema_path: impl AsRef<std::path::Path>,
        config: CacheConfig,
    ) -> Result<Self, RegistryError> {
        let plan = CachePlan::from_path(plan_path)?;
        let schema = Schema::from_path(schema_path)?;
        Ok(Self::new(plan, schema, config)?)
    }

    pub fn plan_for(&self, normalized: &str) -> Option<&Arc<PlanEntry>> {
        self.queries.get(normalized)
    }

    pub fn cache_for(&self, normalized: &str) -> Option<&CacheHandle> {
        self.caches.get(normalized)
    }

    pub fn caches_for(&self, table: &str) -> &[CacheHandle] {
        self.by_table.get(table).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn column(&self, table: &str, column: &str) -> Option<&ColumnMeta> {
        self.schema.column(table, column)
    }

    pub fn is_row_identity(&self, table: &str, column: &str) -> bool {
        self.schema.is_row_identity(table, column)
    }

    /// The EQ point cache on `table.column`, if the plan has one. Used to
    /// serve IN queries by fanning out per-element lookups.
    pub fn companion_eq_cache(&self, table: &str, column: &str) -> Option<&CacheHandle> {
        self.caches_for(table).iter().find(|handle| {
            let conditions = &handle.info.conditions;
            conditions.len() == 1
                && conditions[0].operator == Operator::Eq
                && conditions[0].column == column
                && !conditions[0].placeholder.extra
        })
    }

    /// Purge every cache in every table.
    pub fn purge_all(&self) {
        for handle in self.caches.values() {
            handle.cache.purge();
        }
    }

    /// Record a query the plan does not know. Logged once per distinct text.
    pub fn record_unknown(&self, raw: &str) {
        let mut count = self.unknown.entry(raw.to_string()).or_insert(0);
        *count += 1;
        if *count == 1 {
            tracing::warn!(query = raw, "query not in cache plan; passing through");
        }
    }

    pub fn unknown_queries(&self) -> Vec<(String, u64)> {
        let mut entries: Vec<_> = self
            .unknown
            .iter()
            .map(|e| (e.key().clone(), *e.value()))
            .collect();
        entries.sort();
        entries
    }

    pub fn cache_count(&self) -> usize {
        self.caches.len()
    }

    pub fn stats(&self) -> Vec<CacheStats> {
        let mut stats: Vec<_> = self.caches.values().map(|h| h.cache.stats()).collect();
        stats.sort_by(|a, b| a.query.cmp(&b.query));
        stats
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error(transparent)]
    Plan(#[from] PlanError),

    #[error(transparent)]
    Schema(#[from] crate::plan::SchemaError),
}

fn unique_only(info: &SelectPlan, schema: &Schema) -> bool {
    let [condition] = info.conditions.as_slice() else {
        return false;
    };
    condition.operator == Operator::Eq
        && !condition.placeholder.extra
        && schema.is_row_identity(&info.table, &condition.column)
}
