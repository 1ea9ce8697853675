pub mod pool;
pub mod postgres;
pub mod sqlite;

pub use postgres::PgExecutor;
pub use sqlite::SqliteExecutor;

use crate::errors::ExecutionError;
use crate::model::{ResultSet, Row};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Copy)]
pub struct ExecutionLimits {
    pub timeout: Duration,
    pub max_rows: usize,
}

impl ExecutionLimits {
    pub fn timeout_ms(&self) -> u64 {
        self.timeout.as_millis() as u64
    }
}

/// Connection pool occupancy, as reported by the health check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolStatus {
    pub size: u32,
    pub in_use: u32,
    pub idle: u32,
    /// Connections open beyond the configured base size.
    pub overflow: u32,
    pub max: u32,
}

impl PoolStatus {
    pub fn from_counts(open: u32, idle: u32, base_size: u32, max: u32) -> Self {
        let idle = idle.min(open);
        Self {
            size: open,
            in_use: open - idle,
            idle,
            overflow: open.saturating_sub(base_size),
            max,
        }
    }
}

/// Runs statements that have already passed validation.
#[async_trait]
pub trait QueryExecutor: Send + Sync {
    async fn execute(&self, sql: &str, limits: &ExecutionLimits)
        -> Result<ResultSet, ExecutionError>;

    async fn ping(&self) -> anyhow::Result<()>;

    fn pool_status(&self) -> Option<PoolStatus>;

    async fn close(&self) {}
}

/// Accumulates converted rows up to a cap, remembering whether more existed.
///
/// Backends stop fetching as soon as `push` returns false, so at most
/// `max_rows + 1` rows are ever pulled from the database.
#[derive(Debug)]
pub struct RowCollector {
    columns: Vec<String>,
    rows: Vec<Row>,
    max_rows: usize,
    truncated: bool,
}

impl RowCollector {
    pub fn new(max_rows: usize) -> Self {
        Self {
            columns: Vec::new(),
            rows: Vec::new(),
            max_rows,
            truncated: false,
        }
    }

    pub fn has_columns(&self) -> bool {
        !self.columns.is_empty()
    }

    pub fn set_columns(&mut self, columns: Vec<String>) {
        self.columns = columns;
    }

    /// Returns false once the cap is exceeded; the row is dropped.
    pub fn push(&mut self, row: Row) -> bool {
        if self.rows.len() < self.max_rows {
            self.rows.push(row);
            true
        } else {
            self.truncated = true;
            false
        }
    }

    pub fn finish(self, elapsed_ms: u64) -> ResultSet {
        if self.truncated {
            tracing::warn!(
                event = "result_set_truncated",
                max_rows = self.max_rows,
                returned = self.rows.len(),
            );
        }
        ResultSet {
            row_count: self.rows.len(),
            columns: self.columns,
            rows: self.rows,
            truncated: self.truncated,
            elapsed_ms,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn collect(n: usize, max: usize) -> ResultSet {
        let mut c = RowCollector::new(max);
        c.set_columns(vec!["i".into()]);
        for i in 0..n {
            let mut row = Row::new();
            row.insert("i".into(), json!(i));
            if !c.push(row) {
                break;
            }
        }
        c.finish(1)
    }

    #[test]
    fn test_exactly_max_rows_is_not_truncated() {
        let rs = collect(1000, 1000);
        assert_eq!(rs.row_count, 1000);
        assert!(!rs.truncated);
    }

    #[test]
    fn test_one_over_max_is_truncated() {
        let rs = collect(1001, 1000);
        assert_eq!(rs.row_count, 1000);
        assert_eq!(rs.rows.len(), 1000);
        assert!(rs.truncated);
        assert_eq!(rs.rows[999]["i"], json!(999));
    }

    #[test]
    fn test_pool_status_overflow() {
        let s = PoolStatus::from_counts(8, 3, 5, 20);
        assert_eq!(s.in_use, 5);
        assert_eq!(s.overflow, 3);

        let s = PoolStatus::from_counts(2, 2, 5, 20);
        assert_eq!(s.in_use, 0);
        assert_eq!(s.overflow, 0);
    }
}
