//! Statement classification.
//!
//! Decides, per incoming query, whether the shim serves from cache,
//! forwards untouched, or invalidates before forwarding a write.

use std::sync::Arc;

use super::normalize::{normalize, NormalizedQuery};
use crate::plan::{Operator, PlanEntry};
use crate::registry::Registry;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Not in the plan (or normalization failed): forward, and purge all
    /// caches if it turns out to be an exec.
    Unknown,
    /// Known but not cacheable: forward untouched.
    Passthrough,
    /// Cacheable SELECT: serve through the result cache.
    CacheRead,
    /// Cacheable SELECT whose only condition is `IN`: fan out per-element
    /// point lookups against the companion EQ cache.
    InFanout,
    /// INSERT/UPDATE/DELETE in the plan: invalidate, then forward.
    Write,
}

#[derive(Debug, Clone)]
pub struct Classified {
    pub action: Action,
    pub entry: Option<Arc<PlanEntry>>,
    pub normalized: Option<NormalizedQuery>,
}

pub fn classify(registry: &Registry, raw: &str) -> Classified {
    let normalized = match normalize(raw) {
        Ok(normalized) => normalized,
        Err(err) => {
            tracing::debug!(query = raw, error = %err, "normalization failed");
            registry.record_unknown(raw);
            return Classified {
                action: Action::Unknown,
                entry: None,
                normalized: None,
            };
        }
    };

    let Some(entry) = registry.plan_for(&normalized.query) else {
        registry.record_unknown(raw);
        return Classified {
            action: Action::Unknown,
            entry: None,
            normalized: Some(normalized),
        };
    };

    let action = match &**entry {
        PlanEntry::Select(select) if !select.cache => Action::Passthrough,
        PlanEntry::Select(_) if normalized.for_update => Action::Passthrough,
        PlanEntry::Select(select) => match select.conditions.as_slice() {
            [condition] if condition.operator == Operator::In => Action::InFanout,
            _ => Action::CacheRead,
        },
        _ => Action::Write,
    };

    Classified {
        action,
        entry: Some(Arc::clone(entry)),
        normalized: Some(normalized),
    }
}
