//! Write invalidation.
//!
//! Runs synchronously before a write is forwarded to the database, so a
//! failed write over-invalidates but can never leave a stale entry behind.
//! For each cache covering the written table the engine picks the cheapest
//! safe operation: nothing, a targeted forget of one fingerprint, or a full
//! purge.

use crate::cache::Fingerprint;
use crate::data::Cell;
use crate::plan::{Condition, DeletePlan, InsertPlan, Operator, PlanEntry, UpdatePlan};
use crate::query::ExtraArg;
use crate::registry::{CacheHandle, Registry};

/// Apply invalidation for a planned write.
pub fn invalidate_write(
    registry: &Registry,
    entry: &PlanEntry,
    args: &[Cell],
    extra_args: &[ExtraArg],
) {
    match entry {
        PlanEntry::Insert(insert) => invalidate_insert(registry, insert, args, extra_args),
        PlanEntry::Update(update) => invalidate_update(registry, update, args, extra_args),
        PlanEntry::Delete(delete) => invalidate_delete(registry, delete, args, extra_args),
        PlanEntry::Select(_) => {}
    }
}

fn invalidate_insert(
    registry: &Registry,
    insert: &InsertPlan,
    args: &[Cell],
    extra_args: &[ExtraArg],
) {
    let width = insert.columns.len();
    for handle in registry.caches_for(&insert.table) {
        // A fresh row cannot live under a key that previously resolved to
        // nothing in a row-identity cache.
        if handle.unique_only {
            continue;
        }

        let companion = single_eq_condition(handle)
            .filter(|_| extra_args.is_empty())
            .and_then(|condition| {
                insert
                    .columns
                    .iter()
                    .position(|c| *c == condition.column)
            });

        match companion {
            Some(position) if width > 0 && args.len() % width == 0 => {
                // multi-row inserts share one args vector
                for row in args.chunks(width) {
                    forget(handle, &Fingerprint::of(std::slice::from_ref(&row[position])));
                }
            }
            _ => purge(handle),
        }
    }
}

fn invalidate_update(
    registry: &Registry,
    update: &UpdatePlan,
    args: &[Cell],
    extra_args: &[ExtraArg],
) {
    let updated: Vec<&str> = update.target_columns().collect();
    let by_unique = unique_condition(registry, &update.table, &update.conditions);

    let Some(condition) = by_unique else {
        for handle in registry.caches_for(&update.table) {
            if intersects(&updated, &handle.info.targets) {
                purge(handle);
            }
        }
        return;
    };

    let key_value = condition_value(condition, args, extra_args);
    for handle in registry.caches_for(&update.table) {
        if !intersects(&updated, &handle.info.targets) {
            continue;
        }
        match (&key_value, keyed_by(handle, condition)) {
            (Some(value), true) => {
                forget(handle, &Fingerprint::of(std::slice::from_ref(value)))
            }
            _ => purge(handle),
        }
    }
}

fn invalidate_delete(
    registry: &Registry,
    delete: &DeletePlan,
    args: &[Cell],
    extra_args: &[ExtraArg],
) {
    let by_unique = unique_condition(registry, &delete.table, &delete.conditions);

    let Some(condition) = by_unique else {
        for handle in registry.caches_for(&delete.table) {
            purge(handle);
        }
        return;
    };

    let key_value = condition_value(condition, args, extra_args);
    for handle in registry.caches_for(&delete.table) {
        match (&key_value, keyed_by(handle, condition)) {
            (Some(value), true) => {
                forget(handle, &Fingerprint::of(std::slice::from_ref(value)))
            }
            _ => purge(handle),
        }
    }
}

/// The write's sole condition, if it is an equality on a primary or unique
/// column.
fn unique_condition<'a>(
    registry: &Registry,
    table: &str,
    conditions: &'a [Condition],
) -> Option<&'a Condition> {
    let [condition] = conditions else {
        return None;
    };
    (condition.operator == Operator::Eq && registry.is_row_identity(table, &condition.column))
        .then_some(condition)
}

/// A forget on `handle` is sufficient only if its fingerprint is the same
/// row identity the write navigates by.
fn keyed_by(handle: &CacheHandle, condition: &Condition) -> bool {
    handle.unique_only && handle.info.conditions[0].column == condition.column
}

fn single_eq_condition(handle: &CacheHandle) -> Option<&Condition> {
    let [condition] = handle.info.conditions.as_slice() else {
        return None;
    };
    (condition.operator == Operator::Eq && !condition.placeholder.extra).then_some(condition)
}

fn condition_value(condition: &Condition, args: &[Cell], extra_args: &[ExtraArg]) -> Option<Cell> {
    if condition.placeholder.extra {
        extra_args
            .get(condition.placeholder.index)
            .map(|arg| arg.value.clone())
    } else {
        args.get(condition.placeholder.index).cloned()
    }
}

fn intersects(updated: &[&str], targets: &[String]) -> bool {
    updated.iter().any(|u| targets.iter().any(|t| t == u))
}

fn forget(handle: &CacheHandle, key: &Fingerprint) {
    tracing::debug!(query = %handle.query, key = %key, "invalidate: forget");
    handle.cache.forget(key);
}

fn purge(handle: &CacheHandle) {
    tracing::debug!(query = %handle.query, "invalidate: purge");
    handle.cache.purge();
}
