//! Scripted in-memory driver used by the façade tests.
//!
//! Responses are keyed by (SQL text, argument fingerprint); every query and
//! exec is logged so tests can count backend round trips.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use super::{
    CancelToken, Connection, DriverError, ExecResult, RowStream, Statement, Transaction, TxOptions,
};
use crate::cache::Fingerprint;
use crate::data::Cell;

#[derive(Default)]
pub struct FakeState {
    columns: HashMap<String, Vec<String>>,
    responses: HashMap<(String, Fingerprint), Vec<Vec<Cell>>>,
    pub query_log: Vec<(String, Vec<Cell>)>,
    pub exec_log: Vec<(String, Vec<Cell>)>,
    fail_exec: bool,
}

/// Handle for scripting responses and inspecting the log.
#[derive(Clone, Default)]
pub struct FakeDb {
    state: Arc<Mutex<FakeState>>,
}

impl FakeDb {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connect(&self) -> Box<dyn Connection> {
        Box::new(FakeConn {
            state: Arc::clone(&self.state),
        })
    }

    /// Declare the column set a query returns.
    pub fn columns(&self, sql: &str, columns: &[&str]) {
        self.state
            .lock()
            .columns
            .insert(sql.to_string(), columns.iter().map(|c| c.to_string()).collect());
    }

    /// Script the rows returned for one (query, args) pair.
    pub fn script(&self, sql: &str, args: &[Cell], rows: Vec<Vec<Cell>>) {
        self.state
            .lock()
            .responses
            .insert((sql.to_string(), Fingerprint::of(args)), rows);
    }

    pub fn fail_exec(&self, fail: bool) {
        self.state.lock().fail_exec = fail;
    }

    pub fn queries_of(&self, sql: &str) -> usize {
        self.state
            .lock()
            .query_log
            .iter()
            .filter(|(q, _)| q == sql)
            .count()
    }

    pub fn execs(&self) -> Vec<(String, Vec<Cell>)> {
        self.state.lock().exec_log.clone()
    }
}

struct FakeConn {
    state: Arc<Mutex<FakeState>>,
}

impl Connection for FakeConn {
    fn prepare(&mut self, sql: &str) -> Result<Box<dyn Statement>, DriverError> {
        Ok(Box::new(FakeStmt {
            sql: sql.to_string(),
            state: Arc::clone(&self.state),
        }))
    }

    fn begin(
        &mut self,
        _ctx: &CancelToken,
        _opts: TxOptions,
    ) -> Result<Box<dyn Transaction>, DriverError> {
        Ok(Box::new(FakeTx))
    }

    fn close(&mut self) -> Result<(), DriverError> {
        Ok(())
    }
}

struct FakeStmt {
    sql: String,
    state: Arc<Mutex<FakeState>>,
}

impl Statement for FakeStmt {
    fn num_input(&self) -> usize {
        self.sql.matches('?').count()
    }

    fn exec(&mut self, args: &[Cell]) -> Result<ExecResult, DriverError> {
        let mut state = self.state.lock();
        if state.fail_exec {
            return Err(DriverError::Database("scripted exec failure".into()));
        }
        state.exec_log.push((self.sql.clone(), args.to_vec()));
        Ok(ExecResult {
            last_insert_id: 0,
            rows_affected: 1,
        })
    }

    fn query(&mut self, args: &[Cell]) -> Result<Box<dyn RowStream>, DriverError> {
        let mut state = self.state.lock();
        state.query_log.push((self.sql.clone(), args.to_vec()));
        let columns = state.columns.get(&self.sql).cloned().unwrap_or_default();
        let rows = state
            .responses
            .get(&(self.sql.clone(), Fingerprint::of(args)))
            .cloned()
            .unwrap_or_default();
        Ok(Box::new(FakeRows::new(columns, rows)))
    }

    fn close(&mut self) -> Result<(), DriverError> {
        Ok(())
    }
}

pub struct FakeRows {
    columns: Vec<String>,
    rows: Vec<Vec<Cell>>,
    idx: usize,
    pub fail_at: Option<usize>,
}

impl FakeRows {
    pub fn new(columns: Vec<String>, rows: Vec<Vec<Cell>>) -> Self {
        Self {
            columns,
            rows,
            idx: 0,
            fail_at: None,
        }
    }
}

impl RowStream for FakeRows {
    fn columns(&self) -> Vec<String> {
        self.columns.clone()
    }

    fn next(&mut self, dest: &mut [Cell]) -> Result<bool, DriverError> {
        if self.fail_at == Some(self.idx) {
            return Err(DriverError::RowConversion("scripted conversion failure".into()));
        }
        let Some(row) = self.rows.get(self.idx) else {
            return Ok(false);
        };
        for (slot, cell) in dest.iter_mut().zip(row.iter()) {
            *slot = cell.clone();
        }
        self.idx += 1;
        Ok(true)
    }

    fn close(&mut self) -> Result<(), DriverError> {
        Ok(())
    }
}

struct FakeTx;

impl Transaction for FakeTx {
    fn commit(&mut self) -> Result<(), DriverError> {
        Ok(())
    }

    fn rollback(&mut self) -> Result<(), DriverError> {
        Ok(())
    }
}
