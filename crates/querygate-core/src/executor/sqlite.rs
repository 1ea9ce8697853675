use super::{ExecutionLimits, PoolStatus, QueryExecutor, RowCollector};
use crate::errors::ExecutionError;
use crate::model::{ResultSet, Row};
use anyhow::Context;
use async_trait::async_trait;
use rusqlite::types::ValueRef;
use rusqlite::{Connection, ErrorCode};
use serde_json::Value;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Instant;

/// VM instructions between deadline checks.
const PROGRESS_STEPS: i32 = 1000;

/// Executes validated statements against a SQLite database file on a
/// dedicated `query_only` connection.
///
/// Each statement carries its own deadline, checked by a progress handler
/// installed while it holds the connection. An expired request therefore
/// only ever aborts its own statement.
#[derive(Clone)]
pub struct SqliteExecutor {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteExecutor {
    pub fn open(path: &Path) -> anyhow::Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("failed to open sqlite db {}", path.display()))?;
        conn.busy_timeout(std::time::Duration::from_secs(1))?;
        conn.pragma_update(None, "query_only", true)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }
}

#[async_trait]
impl QueryExecutor for SqliteExecutor {
    async fn execute(
        &self,
        sql: &str,
        limits: &ExecutionLimits,
    ) -> Result<ResultSet, ExecutionError> {
        let conn = self.conn.clone();
        let sql_owned = sql.to_string();
        let max_rows = limits.max_rows;
        let timeout_ms = limits.timeout_ms();
        let deadline = Instant::now() + limits.timeout;

        let task = tokio::task::spawn_blocking(move || {
            run_query(&conn, &sql_owned, max_rows, deadline, timeout_ms)
        });

        // An abandoned task still honours `deadline`: it either aborts itself
        // mid-statement or skips the statement once it gets the connection.
        match tokio::time::timeout_at(deadline.into(), task).await {
            Ok(Ok(result)) => result,
            Ok(Err(join)) => Err(ExecutionError::Database(format!("executor task failed: {join}"))),
            Err(_) => {
                tracing::warn!(event = "query_timeout", timeout_ms);
                Err(ExecutionError::Timeout { timeout_ms })
            }
        }
    }

    async fn ping(&self) -> anyhow::Result<()> {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || -> anyhow::Result<()> {
            let conn = conn
                .lock()
                .map_err(|_| anyhow::anyhow!("sqlite executor mutex poisoned"))?;
            conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))?;
            Ok(())
        })
        .await?
    }

    fn pool_status(&self) -> Option<PoolStatus> {
        let in_use = u32::from(self.conn.try_lock().is_err());
        Some(PoolStatus::from_counts(1, 1 - in_use, 1, 1))
    }
}

fn run_query(
    conn: &Mutex<Connection>,
    sql: &str,
    max_rows: usize,
    deadline: Instant,
    timeout_ms: u64,
) -> Result<ResultSet, ExecutionError> {
    let start = Instant::now();
    let conn = conn
        .lock()
        .map_err(|_| ExecutionError::Connection("sqlite executor mutex poisoned".into()))?;

    if Instant::now() >= deadline {
        tracing::debug!(event = "query_skipped_expired", timeout_ms);
        return Err(ExecutionError::Timeout { timeout_ms });
    }

    conn.progress_handler(PROGRESS_STEPS, Some(move || Instant::now() >= deadline));
    let result = collect_rows(&conn, sql, max_rows, timeout_ms);
    conn.progress_handler(0, None::<fn() -> bool>);

    result.map(|collector| collector.finish(start.elapsed().as_millis() as u64))
}

fn collect_rows(
    conn: &Connection,
    sql: &str,
    max_rows: usize,
    timeout_ms: u64,
) -> Result<RowCollector, ExecutionError> {
    let map = |e: rusqlite::Error| map_sqlite_error(e, timeout_ms);
    let mut stmt = conn.prepare(sql).map_err(map)?;
    let columns: Vec<String> = stmt.column_names().iter().map(|c| c.to_string()).collect();

    let mut collector = RowCollector::new(max_rows);
    collector.set_columns(columns.clone());

    let mut rows = stmt.query([]).map_err(map)?;
    while let Some(row) = rows.next().map_err(map)? {
        let mut out = Row::new();
        for (idx, name) in columns.iter().enumerate() {
            out.insert(name.clone(), convert_value(row.get_ref(idx).map_err(map)?));
        }
        if !collector.push(out) {
            break;
        }
    }

    Ok(collector)
}

fn convert_value(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::from(i),
        ValueRef::Real(f) => serde_json::Number::from_f64(f)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        ValueRef::Text(t) => Value::String(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(b) => Value::String(String::from_utf8_lossy(b).into_owned()),
    }
}

fn map_sqlite_error(e: rusqlite::Error, timeout_ms: u64) -> ExecutionError {
    let mapped = match &e {
        rusqlite::Error::SqliteFailure(err, msg) => {
            let detail = msg.clone().unwrap_or_else(|| err.to_string());
            match err.code {
                ErrorCode::OperationInterrupted => ExecutionError::Timeout { timeout_ms },
                ErrorCode::ConstraintViolation => ExecutionError::Integrity(detail),
                ErrorCode::CannotOpen
                | ErrorCode::DatabaseBusy
                | ErrorCode::DatabaseLocked
                | ErrorCode::NotADatabase => ExecutionError::Connection(detail),
                _ => ExecutionError::Database(detail),
            }
        }
        _ => ExecutionError::Database(e.to_string()),
    };
    tracing::error!(event = "db_execution_error", error = %e, kind = ?mapped);
    mapped
}
