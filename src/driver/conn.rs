//! The caching connection façade.
//!
//! Wraps any [`Connection`] implementation. Prepared statements are
//! classified once at prepare time; unprepared exec/query calls are
//! prepared internally so both paths share the same dispatch.

use std::sync::Arc;

use parking_lot::Mutex;

use super::stmt::CachingStatement;
use super::{CancelToken, Connection, DriverError, ExecResult, RowStream, Transaction, TxOptions};
use crate::cache::RowSnapshot;
use crate::data::Cell;
use crate::query::{classify, Action};
use crate::registry::Registry;

pub struct CachingConnection {
    inner: Arc<Mutex<Box<dyn Connection>>>,
    registry: Arc<Registry>,
}

impl CachingConnection {
    pub fn new(inner: Box<dyn Connection>, registry: Arc<Registry>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(inner)),
            registry,
        }
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// Classify `raw` against the plan and prepare it on the underlying
    /// connection. The raw text is what the database ultimately executes;
    /// the normalized text is only used for plan matching.
    pub fn prepare(&self, raw: &str) -> Result<CachingStatement, DriverError> {
        let classified = classify(&self.registry, raw);
        let inner = self.inner.lock().prepare(raw)?;
        Ok(CachingStatement::new(
            raw.to_string(),
            classified,
            inner,
            Arc::clone(&self.inner),
            Arc::clone(&self.registry),
        ))
    }

    pub fn exec(&self, raw: &str, args: &[Cell]) -> Result<ExecResult, DriverError> {
        self.exec_with_ctx(&CancelToken::new(), raw, args)
    }

    pub fn exec_with_ctx(
        &self,
        ctx: &CancelToken,
        raw: &str,
        args: &[Cell],
    ) -> Result<ExecResult, DriverError> {
        let stmt = self.prepare(raw)?;
        let result = stmt.exec_with_ctx(ctx, args);
        let _ = stmt.close();
        result
    }

    pub fn query(&self, raw: &str, args: &[Cell]) -> Result<Box<dyn RowStream>, DriverError> {
        self.query_with_ctx(&CancelToken::new(), raw, args)
    }

    /// One-shot query. Passthrough results are materialized before the
    /// internal statement is closed, so the returned cursor never outlives
    /// a live driver resource.
    pub fn query_with_ctx(
        &self,
        ctx: &CancelToken,
        raw: &str,
        args: &[Cell],
    ) -> Result<Box<dyn RowStream>, DriverError> {
        let stmt = self.prepare(raw)?;
        let result = stmt.query_with_ctx(ctx, args).and_then(|mut stream| {
            match stmt.action() {
                // cached paths already return a detached replay
                Action::CacheRead | Action::InFanout => Ok(stream),
                _ => {
                    let snapshot = RowSnapshot::capture(stream.as_mut())?;
                    Ok(Box::new(snapshot.replay()) as Box<dyn RowStream>)
                }
            }
        });
        let _ = stmt.close();
        result
    }

    /// Transactions are forwarded verbatim; the cache is not
    /// transaction-aware.
    pub fn begin(
        &self,
        ctx: &CancelToken,
        opts: TxOptions,
    ) -> Result<Box<dyn Transaction>, DriverError> {
        self.inner.lock().begin(ctx, opts)
    }

    pub fn close(&self) -> Result<(), DriverError> {
        self.inner.lock().close()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{CacheConfig, Fingerprint};
    use crate::driver::fake::FakeDb;
    use crate::plan::{CachePlan, Schema};

    const USER_BY_ID: &str = "SELECT * FROM users WHERE id = ?";
    const POST_BY_ID: &str = "SELECT * FROM posts WHERE id = ?";

    const DDL: &str = "
CREATE TABLE users (id BIGINT PRIMARY KEY, name VARCHAR(255));
CREATE TABLE posts (id BIGINT PRIMARY KEY, body TEXT);";

    const PLAN: &str = r#"
queries:
  - query: SELECT * FROM users WHERE id = ?
    type: select
    table: users
    cache: true
    targets: [id, name]
    conditions:
      - column: id
        placeholder: { index: 0 }
  - query: SELECT * FROM posts WHERE id = ?
    type: select
    table: posts
    cache: true
    targets: [id, body]
    conditions:
      - column: id
        placeholder: { index: 0 }
  - query: UPDATE users SET name = ? WHERE id = ?
    type: update
    table: users
    targets:
      - column: name
        placeholder: { index: 0 }
    conditions:
      - column: id
        placeholder: { index: 1 }
"#;

    fn fixture() -> (FakeDb, CachingConnection) {
        let registry = Arc::new(
            Registry::new(
                CachePlan::from_yaml(PLAN).unwrap(),
                Schema::from_ddl(DDL).unwrap(),
                CacheConfig::default(),
            )
            .unwrap(),
        );
        let db = FakeDb::new();
        db.columns(USER_BY_ID, &["id", "name"]);
        db.columns(POST_BY_ID, &["id", "body"]);
        let conn = CachingConnection::new(db.connect(), registry);
        (db, conn)
    }

    fn drain(stream: &mut dyn RowStream) -> Vec<Vec<Cell>> {
        let mut dest = vec![Cell::Null; stream.columns().len()];
        let mut out = Vec::new();
        while stream.next(&mut dest).unwrap() {
            out.push(dest.clone());
        }
        out
    }

    #[test]
    fn test_one_shot_query_is_cached() {
        let (db, conn) = fixture();
        db.script(USER_BY_ID, &[Cell::Int(7)], vec![vec![Cell::Int(7), Cell::from("A")]]);

        let first = drain(conn.query(USER_BY_ID, &[Cell::Int(7)]).unwrap().as_mut());
        let second = drain(conn.query(USER_BY_ID, &[Cell::Int(7)]).unwrap().as_mut());

        assert_eq!(first, second);
        assert_eq!(db.queries_of(USER_BY_ID), 1);
    }

    #[test]
    fn test_one_shot_exec_invalidates() {
        let (db, conn) = fixture();
        db.script(USER_BY_ID, &[Cell::Int(7)], vec![vec![Cell::Int(7), Cell::from("A")]]);
        drain(conn.query(USER_BY_ID, &[Cell::Int(7)]).unwrap().as_mut());

        conn.exec(
            "UPDATE users SET name = ? WHERE id = ?",
            &[Cell::from("B"), Cell::Int(7)],
        )
        .unwrap();

        assert_eq!(db.execs().len(), 1);
        db.script(USER_BY_ID, &[Cell::Int(7)], vec![vec![Cell::Int(7), Cell::from("B")]]);
        let after = drain(conn.query(USER_BY_ID, &[Cell::Int(7)]).unwrap().as_mut());
        assert_eq!(after[0][1], Cell::from("B"));
        assert_eq!(db.queries_of(USER_BY_ID), 2);
    }

    #[test]
    fn test_unknown_exec_purges_every_table() {
        let (db, conn) = fixture();
        db.script(USER_BY_ID, &[Cell::Int(7)], vec![vec![Cell::Int(7), Cell::from("A")]]);
        db.script(POST_BY_ID, &[Cell::Int(1)], vec![vec![Cell::Int(1), Cell::from("x")]]);
        drain(conn.query(USER_BY_ID, &[Cell::Int(7)]).unwrap().as_mut());
        drain(conn.query(POST_BY_ID, &[Cell::Int(1)]).unwrap().as_mut());

        conn.exec("TRUNCATE users", &[]).unwrap();

        // the write was forwarded after the purge
        assert_eq!(db.execs()[0].0, "TRUNCATE users");
        let registry = conn.registry();
        let users = registry.cache_for(USER_BY_ID).unwrap();
        let posts = registry.cache_for(POST_BY_ID).unwrap();
        assert!(!users.cache.contains(&Fingerprint::of(&[Cell::Int(7)])));
        assert!(!posts.cache.contains(&Fingerprint::of(&[Cell::Int(1)])));
    }

    #[test]
    fn test_unknown_query_passes_through_uncached() {
        let (db, conn) = fixture();
        let sql = "SELECT name FROM users GROUP BY name";
        db.columns(sql, &["name"]);
        db.script(sql, &[], vec![vec![Cell::from("A")]]);

        drain(conn.query(sql, &[]).unwrap().as_mut());
        drain(conn.query(sql, &[]).unwrap().as_mut());
        assert_eq!(db.queries_of(sql), 2);
        assert_eq!(conn.registry().unknown_queries().len(), 1);
    }

    #[test]
    fn test_cancelled_exec_does_not_reach_driver() {
        let (db, conn) = fixture();
        db.script(USER_BY_ID, &[Cell::Int(7)], vec![vec![Cell::Int(7), Cell::from("A")]]);
        drain(conn.query(USER_BY_ID, &[Cell::Int(7)]).unwrap().as_mut());

        let ctx = CancelToken::new();
        ctx.cancel();
        let err = conn
            .exec_with_ctx(
                &ctx,
                "UPDATE users SET name = ? WHERE id = ?",
                &[Cell::from("B"), Cell::Int(7)],
            )
            .unwrap_err();

        assert_eq!(err, DriverError::Cancelled);
        assert!(db.execs().is_empty());
        // invalidation had already been applied; there is no rollback
        let users = conn.registry().cache_for(USER_BY_ID).unwrap();
        assert!(!users.cache.contains(&Fingerprint::of(&[Cell::Int(7)])));
    }

    #[test]
    fn test_begin_and_close_forward() {
        let (_db, conn) = fixture();
        let mut tx = conn.begin(&CancelToken::new(), TxOptions::default()).unwrap();
        tx.commit().unwrap();
        conn.close().unwrap();
    }
}
