//! Database driver surface.
//!
//! [`Connection`], [`Statement`], [`RowStream`] and [`Transaction`] mirror a
//! classic driver: prepare a statement, bind arguments, execute or iterate a
//! row cursor. The caching shim consumes any implementation of these traits
//! through [`CachingConnection`], which adds plan matching, result caching
//! and write invalidation on top.

pub mod conn;
pub mod stmt;

#[cfg(test)]
pub(crate) mod fake;

pub use conn::CachingConnection;
pub use stmt::CachingStatement;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::data::Cell;

/// Errors surfaced by drivers and by the shim itself.
///
/// Payloads are plain strings so the error is `Clone`: a single-flight load
/// failure is shared with every waiter of that flight.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DriverError {
    #[error("database error: {0}")]
    Database(String),

    #[error("row conversion failed: {0}")]
    RowConversion(String),

    #[error("operation cancelled")]
    Cancelled,

    #[error("unsupported by driver: {0}")]
    Unsupported(&'static str),
}

/// Cooperative cancellation token handed to `*_with_ctx` calls.
///
/// Cancellation is checked before driver calls and while waiting on an
/// in-flight cache load. It never rolls back an invalidation that already
/// happened.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    pub fn check(&self) -> Result<(), DriverError> {
        if self.is_cancelled() {
            Err(DriverError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Outcome of an execute call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExecResult {
    pub last_insert_id: i64,
    pub rows_affected: u64,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TxOptions {
    pub read_only: bool,
}

pub trait Connection: Send {
    fn prepare(&mut self, sql: &str) -> Result<Box<dyn Statement>, DriverError>;

    fn begin(
        &mut self,
        ctx: &CancelToken,
        opts: TxOptions,
    ) -> Result<Box<dyn Transaction>, DriverError>;

    fn close(&mut self) -> Result<(), DriverError>;
}

pub trait Statement: Send {
    /// Number of placeholder parameters the statement expects.
    fn num_input(&self) -> usize;

    fn exec(&mut self, args: &[Cell]) -> Result<ExecResult, DriverError>;

    fn query(&mut self, args: &[Cell]) -> Result<Box<dyn RowStream>, DriverError>;

    fn exec_with_ctx(
        &mut self,
        ctx: &CancelToken,
        args: &[Cell],
    ) -> Result<ExecResult, DriverError> {
        ctx.check()?;
        self.exec(args)
    }

    fn query_with_ctx(
        &mut self,
        ctx: &CancelToken,
        args: &[Cell],
    ) -> Result<Box<dyn RowStream>, DriverError> {
        ctx.check()?;
        self.query(args)
    }

    fn close(&mut self) -> Result<(), DriverError>;
}

/// A forward-only row cursor.
pub trait RowStream: Send {
    fn columns(&self) -> Vec<String>;

    /// Copy the next row into `dest` and advance. Returns `Ok(false)` at
    /// end of stream.
    fn next(&mut self, dest: &mut [Cell]) -> Result<bool, DriverError>;

    fn close(&mut self) -> Result<(), DriverError>;
}

pub trait Transaction: Send {
    fn commit(&mut self) -> Result<(), DriverError>;
    fn rollback(&mut self) -> Result<(), DriverError>;
}
