//! The caching statement wrapper.
//!
//! Prepared once, it remembers the raw text (what the database executes),
//! the normalized text (what the plan matched), and the classification.
//! Reads route through the result cache; writes invalidate first and are
//! then forwarded.

use std::sync::Arc;

use parking_lot::Mutex;

use super::{CancelToken, Connection, DriverError, ExecResult, RowStream, Statement};
use crate::cache::{Fingerprint, RowSnapshot};
use crate::data::Cell;
use crate::invalidate::invalidate_write;
use crate::query::{Action, Classified};
use crate::registry::Registry;

pub struct CachingStatement {
    raw: String,
    classified: Classified,
    inner: Mutex<Box<dyn Statement>>,
    conn: Arc<Mutex<Box<dyn Connection>>>,
    registry: Arc<Registry>,
}

impl CachingStatement {
    pub(crate) fn new(
        raw: String,
        classified: Classified,
        inner: Box<dyn Statement>,
        conn: Arc<Mutex<Box<dyn Connection>>>,
        registry: Arc<Registry>,
    ) -> Self {
        Self {
            raw,
            classified,
            inner: Mutex::new(inner),
            conn,
            registry,
        }
    }

    pub fn action(&self) -> Action {
        self.classified.action
    }

    pub fn num_input(&self) -> usize {
        self.inner.lock().num_input()
    }

    pub fn exec(&self, args: &[Cell]) -> Result<ExecResult, DriverError> {
        self.exec_with_ctx(&CancelToken::new(), args)
    }

    /// Invalidate (for planned writes) or defensively purge (for unplanned
    /// ones), then forward. Invalidation is never rolled back: a failed or
    /// cancelled write over-invalidates but cannot leave a stale entry.
    pub fn exec_with_ctx(
        &self,
        ctx: &CancelToken,
        args: &[Cell],
    ) -> Result<ExecResult, DriverError> {
        match self.classified.action {
            Action::Unknown => {
                tracing::warn!(query = %self.raw, "unplanned exec; purging all caches");
                self.registry.purge_all();
            }
            Action::Write => {
                if let Some(entry) = &self.classified.entry {
                    invalidate_write(&self.registry, entry, args, self.extra_args());
                }
            }
            _ => {}
        }
        self.inner.lock().exec_with_ctx(ctx, args)
    }

    pub fn query(&self, args: &[Cell]) -> Result<Box<dyn RowStream>, DriverError> {
        self.query_with_ctx(&CancelToken::new(), args)
    }

    pub fn query_with_ctx(
        &self,
        ctx: &CancelToken,
        args: &[Cell],
    ) -> Result<Box<dyn RowStream>, DriverError> {
        match self.classified.action {
            Action::CacheRead => self.query_cached(ctx, args),
            Action::InFanout => self.query_fanout(ctx, args),
            _ => self.inner.lock().query_with_ctx(ctx, args),
        }
    }

    pub fn close(&self) -> Result<(), DriverError> {
        self.inner.lock().close()
    }

    fn extra_args(&self) -> &[crate::query::ExtraArg] {
        self.classified
            .normalized
            .as_ref()
            .map(|n| n.extra_args.as_slice())
            .unwrap_or(&[])
    }

    fn normalized_query(&self) -> &str {
        self.classified
            .normalized
            .as_ref()
            .map(|n| n.query.as_str())
            .unwrap_or(&self.raw)
    }

    fn query_cached(
        &self,
        ctx: &CancelToken,
        args: &[Cell],
    ) -> Result<Box<dyn RowStream>, DriverError> {
        let Some(handle) = self.registry.cache_for(self.normalized_query()) else {
            return self.inner.lock().query_with_ctx(ctx, args);
        };

        let key = Fingerprint::of(args);
        let snapshot = handle.cache.get(key, ctx, || {
            let mut stream = self.inner.lock().query_with_ctx(ctx, args)?;
            RowSnapshot::capture(stream.as_mut())
        })?;
        tracing::trace!(query = %handle.query, rows = snapshot.len(), "served from cache");
        Ok(Box::new(snapshot.replay()))
    }

    /// Serve `col IN (…)` as one point lookup per element against the
    /// companion EQ cache, concatenated in input order. Elements missing
    /// from the cache are loaded by preparing the companion's query on the
    /// same connection.
    fn query_fanout(
        &self,
        ctx: &CancelToken,
        args: &[Cell],
    ) -> Result<Box<dyn RowStream>, DriverError> {
        let select = match self.classified.entry.as_deref() {
            Some(crate::plan::PlanEntry::Select(select)) => select,
            _ => return self.inner.lock().query_with_ctx(ctx, args),
        };
        let condition = &select.conditions[0];

        let Some(companion) = self
            .registry
            .companion_eq_cache(&select.table, &condition.column)
        else {
            return self.inner.lock().query_with_ctx(ctx, args);
        };

        let values: Vec<Cell> = if condition.placeholder.extra {
            self.extra_args().iter().map(|a| a.value.clone()).collect()
        } else {
            args.to_vec()
        };

        let mut parts = Vec::with_capacity(values.len());
        for value in &values {
            let key = Fingerprint::of(std::slice::from_ref(value));
            let snapshot = companion.cache.get(key, ctx, || {
                let mut stmt = self.conn.lock().prepare(&companion.query)?;
                let result = stmt
                    .query_with_ctx(ctx, std::slice::from_ref(value))
                    .and_then(|mut stream| RowSnapshot::capture(stream.as_mut()));
                let _ = stmt.close();
                result
            })?;
            parts.push(snapshot);
        }

        Ok(Box::new(RowSnapshot::concat(&parts).replay()))
    }
}
