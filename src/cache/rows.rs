//! Materialized result sets.
//!
//! A [`RowSnapshot`] is captured once from a live driver cursor and then
//! replayed by any number of readers. The row vector is shared immutably
//! behind `Arc`s; each [`Replay`] owns nothing but its cursor position.

use std::sync::Arc;

use crate::data::Cell;
use crate::driver::{DriverError, RowStream};

/// An immutable, cheaply cloneable materialization of a query result.
#[derive(Debug, Clone)]
pub struct RowSnapshot {
    columns: Arc<Vec<String>>,
    rows: Arc<Vec<Vec<Cell>>>,
}

impl RowSnapshot {
    /// Drain a driver cursor to end-of-stream and close it.
    ///
    /// Cell values are copied out of the driver's row buffer; `Bytes` cells
    /// own fresh storage, so no cell in the snapshot aliases driver-owned
    /// memory. A conversion error reported by the cursor fails the whole
    /// capture.
    pub fn capture(stream: &mut dyn RowStream) -> Result<Self, DriverError> {
        let columns = stream.columns();
        let mut rows = Vec::new();
        let mut dest = vec![Cell::Null; columns.len()];
        while stream.next(&mut dest)? {
            rows.push(dest.clone());
        }
        stream.close()?;
        Ok(Self {
            columns: Arc::new(columns),
            rows: Arc::new(rows),
        })
    }

    pub fn from_parts(columns: Vec<String>, rows: Vec<Vec<Cell>>) -> Self {
        Self {
            columns: Arc::new(columns),
            rows: Arc::new(rows),
        }
    }

    pub fn empty() -> Self {
        Self::from_parts(Vec::new(), Vec::new())
    }

    /// Concatenate snapshots in order, taking the column set from the first
    /// non-empty one.
    pub fn concat(parts: &[RowSnapshot]) -> RowSnapshot {
        let columns = parts
            .iter()
            .find(|p| !p.is_empty())
            .or_else(|| parts.first())
            .map(|p| p.columns().to_vec())
            .unwrap_or_default();

        let mut rows = Vec::with_capacity(parts.iter().map(|p| p.len()).sum());
        for part in parts {
            rows.extend(part.rows().iter().cloned());
        }
        RowSnapshot::from_parts(columns, rows)
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<Cell>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// A fresh cursor over the snapshot, starting at row 0.
    pub fn replay(&self) -> Replay {
        Replay {
            snapshot: self.clone(),
            idx: 0,
            limit: None,
        }
    }

    /// A cursor that stops after `limit` rows per replay.
    pub fn replay_limited(&self, limit: usize) -> Replay {
        Replay {
            snapshot: self.clone(),
            idx: 0,
            limit: Some(limit),
        }
    }
}

/// A per-reader cursor over a [`RowSnapshot`].
///
/// `close` rewinds the cursor instead of freeing anything, so a cached
/// cursor can be handed out and replayed again.
pub struct Replay {
    snapshot: RowSnapshot,
    idx: usize,
    limit: Option<usize>,
}

impl RowStream for Replay {
    fn columns(&self) -> Vec<String> {
        self.snapshot.columns().to_vec()
    }

    fn next(&mut self, dest: &mut [Cell]) -> Result<bool, DriverError> {
        let capped = self.limit.map(|l| self.idx >= l).unwrap_or(false);
        if capped || self.idx >= self.snapshot.len() {
            self.idx = 0;
            return Ok(false);
        }
        let row = &self.snapshot.rows()[self.idx];
        for (slot, cell) in dest.iter_mut().zip(row.iter()) {
            *slot = cell.clone();
        }
        self.idx += 1;
        Ok(true)
    }

    fn close(&mut self) -> Result<(), DriverError> {
        self.idx = 0;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(n: i64) -> RowSnapshot {
        let rows = (0..n)
            .map(|i| vec![Cell::Int(i), Cell::Text(format!("row-{}", i))])
            .collect();
        RowSnapshot::from_parts(vec!["id".into(), "name".into()], rows)
    }

    fn drain(replay: &mut Replay) -> Vec<Vec<Cell>> {
        let mut dest = vec![Cell::Null; replay.columns().len()];
        let mut out = Vec::new();
        while replay.next(&mut dest).unwrap() {
            out.push(dest.clone());
        }
        out
    }

    #[test]
    fn test_replay_delivers_all_rows_in_order() {
        let snap = snapshot(3);
        let rows = drain(&mut snap.replay());
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0][0], Cell::Int(0));
        assert_eq!(rows[2][1], Cell::Text("row-2".into()));
    }

    #[test]
    fn test_replay_rewinds_after_exhaustion() {
        let snap = snapshot(2);
        let mut replay = snap.replay();
        assert_eq!(drain(&mut replay).len(), 2);
        // EOF reset the cursor; the same replay serves the rows again
        assert_eq!(drain(&mut replay).len(), 2);
    }

    #[test]
    fn test_limit_caps_rows_per_replay() {
        let snap = snapshot(5);
        let mut replay = snap.replay_limited(2);
        assert_eq!(drain(&mut replay).len(), 2);
    }

    #[test]
    fn test_clones_iterate_independently() {
        let snap = snapshot(4);
        let mut a = snap.replay();
        let mut b = snap.replay();
        let mut dest = vec![Cell::Null; 2];

        assert!(a.next(&mut dest).unwrap());
        assert!(a.next(&mut dest).unwrap());
        assert_eq!(dest[0], Cell::Int(1));

        // b is untouched by a's progress
        assert!(b.next(&mut dest).unwrap());
        assert_eq!(dest[0], Cell::Int(0));
    }

    #[test]
    fn test_concurrent_clone_iteration() {
        let snap = snapshot(100);
        let mut handles = Vec::new();
        for _ in 0..4 {
            let mut replay = snap.replay();
            handles.push(std::thread::spawn(move || {
                let mut dest = vec![Cell::Null; 2];
                let mut seen = Vec::new();
                while replay.next(&mut dest).unwrap() {
                    seen.push(dest[0].as_i64().unwrap());
                }
                seen
            }));
        }
        for handle in handles {
            let seen = handle.join().unwrap();
            assert_eq!(seen, (0..100).collect::<Vec<_>>());
        }
    }

    #[test]
    fn test_concat_preserves_order_and_picks_columns() {
        let empty = RowSnapshot::empty();
        let a = snapshot(2);
        let b = snapshot(1);
        let merged = RowSnapshot::concat(&[empty, a, b]);
        assert_eq!(merged.columns(), &["id".to_string(), "name".to_string()]);
        assert_eq!(merged.len(), 3);
        assert_eq!(merged.rows()[2][0], Cell::Int(0));
    }

    #[test]
    fn test_concat_of_empties() {
        let merged = RowSnapshot::concat(&[RowSnapshot::empty(), RowSnapshot::empty()]);
        assert!(merged.is_empty());
        assert!(merged.columns().is_empty());
    }

    #[test]
    fn test_capture_from_stream() {
        use crate::driver::fake::FakeRows;
        let mut stream = FakeRows::new(
            vec!["id".into()],
            vec![vec![Cell::Int(1)], vec![Cell::Int(2)]],
        );
        let snap = RowSnapshot::capture(&mut stream).unwrap();
        assert_eq!(snap.len(), 2);
        assert_eq!(snap.columns(), &["id".to_string()]);
    }

    #[test]
    fn test_capture_fails_on_conversion_error() {
        use crate::driver::fake::FakeRows;
        let mut stream = FakeRows::new(
            vec!["id".into()],
            vec![vec![Cell::Int(1)], vec![Cell::Int(2)]],
        );
        stream.fail_at = Some(1);
        let err = RowSnapshot::capture(&mut stream).unwrap_err();
        assert!(matches!(err, crate::driver::DriverError::RowConversion(_)));
    }
}
