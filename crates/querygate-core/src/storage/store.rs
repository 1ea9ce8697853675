use super::{ClaimOutcome, RecordStore};
use crate::model::{EvaluationScores, EvaluationStatus, NewQueryRecord, QueryRecord};
use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

const SELECT_RECORD: &str = "SELECT id, natural_language_query, generated_sql, result_count, execution_time_ms,
        created_at, evaluation_status, faithfulness_score, answer_relevance_score, context_precision_score
 FROM query_logs";

/// Query-log store over a single SQLite connection.
#[derive(Clone)]
pub struct SqliteStore {
    pub(crate) conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    pub fn open(path: &Path) -> anyhow::Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("failed to open sqlite db {}", path.display()))?;
        conn.busy_timeout(std::time::Duration::from_secs(5))?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn memory() -> anyhow::Result<Self> {
        let conn = Connection::open_in_memory().context("failed to open in-memory sqlite db")?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn init_schema(&self) -> anyhow::Result<()> {
        let conn = self.lock()?;
        conn.execute_batch(super::schema::DDL)?;
        migrate_evaluation_columns(&conn)?;
        conn.execute_batch(super::schema::POST_MIGRATION_DDL)?;
        Ok(())
    }

    fn lock(&self) -> anyhow::Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow::anyhow!("sqlite store mutex poisoned"))
    }

    /// Runs `f` against the connection on the blocking pool so the mutex
    /// wait and the SQLite I/O stay off the async workers.
    async fn blocking<T, F>(&self, f: F) -> anyhow::Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> anyhow::Result<T> + Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = conn
                .lock()
                .map_err(|_| anyhow::anyhow!("sqlite store mutex poisoned"))?;
            f(&mut conn)
        })
        .await?
    }

    fn status_of(conn: &Connection, id: i64) -> anyhow::Result<Option<EvaluationStatus>> {
        let status: Option<String> = conn
            .query_row(
                "SELECT evaluation_status FROM query_logs WHERE id=?1",
                params![id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(status.map(|s| EvaluationStatus::parse(&s)))
    }
}

#[async_trait]
impl RecordStore for SqliteStore {
    async fn insert_record(&self, record: &NewQueryRecord) -> anyhow::Result<i64> {
        let record = record.clone();
        self.blocking(move |conn| {
            conn.execute(
                "INSERT INTO query_logs(natural_language_query, generated_sql, evaluation_status,
                                        result_count, execution_time_ms, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    record.question,
                    record.generated_sql,
                    EvaluationStatus::Pending.as_str(),
                    record.result_count,
                    record.execution_time_ms,
                    Utc::now().to_rfc3339(),
                ],
            )?;
            Ok(conn.last_insert_rowid())
        })
        .await
    }

    async fn claim_for_evaluation(&self, id: i64) -> anyhow::Result<ClaimOutcome> {
        self.blocking(move |conn| {
            let changed = conn.execute(
                "UPDATE query_logs SET evaluation_status=?1 WHERE id=?2 AND evaluation_status=?3",
                params![
                    EvaluationStatus::Evaluating.as_str(),
                    id,
                    EvaluationStatus::Pending.as_str()
                ],
            )?;
            if changed == 1 {
                return Ok(ClaimOutcome::Claimed);
            }
            Ok(match Self::status_of(conn, id)? {
                Some(status) => ClaimOutcome::AlreadyClaimed(status),
                None => ClaimOutcome::NotFound,
            })
        })
        .await
    }

    async fn complete_evaluation(
        &self,
        id: i64,
        scores: &EvaluationScores,
    ) -> anyhow::Result<bool> {
        let scores = *scores;
        self.blocking(move |conn| {
            let tx = conn.transaction()?;
            let changed = tx.execute(
                "UPDATE query_logs
                 SET faithfulness_score=?1, answer_relevance_score=?2, context_precision_score=?3,
                     evaluation_status=?4
                 WHERE id=?5 AND evaluation_status=?6",
                params![
                    scores.faithfulness,
                    scores.answer_relevance,
                    scores.context_precision,
                    EvaluationStatus::Completed.as_str(),
                    id,
                    EvaluationStatus::Evaluating.as_str(),
                ],
            )?;
            tx.commit()?;
            Ok(changed == 1)
        })
        .await
    }

    async fn fail_evaluation(&self, id: i64) -> anyhow::Result<bool> {
        self.blocking(move |conn| {
            let changed = conn.execute(
                "UPDATE query_logs SET evaluation_status=?1 WHERE id=?2 AND evaluation_status=?3",
                params![
                    EvaluationStatus::Failed.as_str(),
                    id,
                    EvaluationStatus::Evaluating.as_str()
                ],
            )?;
            Ok(changed == 1)
        })
        .await
    }

    async fn get_record(&self, id: i64) -> anyhow::Result<Option<QueryRecord>> {
        self.blocking(move |conn| {
            let mut stmt = conn.prepare(&format!("{SELECT_RECORD} WHERE id=?1"))?;
            let record = stmt.query_row(params![id], row_to_record).optional()?;
            Ok(record)
        })
        .await
    }

    async fn list_records(&self) -> anyhow::Result<Vec<QueryRecord>> {
        self.blocking(|conn| {
            let mut stmt =
                conn.prepare(&format!("{SELECT_RECORD} ORDER BY created_at DESC, id DESC"))?;
            let rows = stmt.query_map([], row_to_record)?;
            let mut out = Vec::new();
            for r in rows {
                out.push(r?);
            }
            Ok(out)
        })
        .await
    }

    async fn ping(&self) -> anyhow::Result<()> {
        self.blocking(|conn| {
            conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))?;
            Ok(())
        })
        .await
    }
}

fn row_to_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<QueryRecord> {
    let created_raw: String = row.get(5)?;
    let created_at = DateTime::parse_from_rfc3339(&created_raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(5, rusqlite::types::Type::Text, Box::new(e))
        })?;
    let status: String = row.get(6)?;

    Ok(QueryRecord::from_parts(
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get::<_, Option<i64>>(3)?.unwrap_or(0),
        row.get::<_, Option<i64>>(4)?.unwrap_or(0),
        created_at,
        EvaluationStatus::parse(&status),
        row.get(7)?,
        row.get(8)?,
        row.get(9)?,
    ))
}

/// Databases created before asynchronous evaluation existed have no status or
/// score columns. Existing rows come up as `pending`.
fn migrate_evaluation_columns(conn: &Connection) -> anyhow::Result<()> {
    let cols = get_columns(conn, "query_logs")?;
    add_column_if_missing(
        conn,
        &cols,
        "query_logs",
        "evaluation_status",
        "TEXT NOT NULL DEFAULT 'pending'",
    )?;
    add_column_if_missing(conn, &cols, "query_logs", "faithfulness_score", "REAL")?;
    add_column_if_missing(conn, &cols, "query_logs", "answer_relevance_score", "REAL")?;
    add_column_if_missing(conn, &cols, "query_logs", "context_precision_score", "REAL")?;
    Ok(())
}

fn get_columns(
    conn: &Connection,
    table: &str,
) -> anyhow::Result<std::collections::HashSet<String>> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({})", table))?;
    let rows = stmt.query_map([], |row| row.get::<_, String>(1))?;
    let mut out = std::collections::HashSet::new();
    for r in rows {
        out.insert(r?);
    }
    Ok(out)
}

fn add_column_if_missing(
    conn: &Connection,
    cols: &std::collections::HashSet<String>,
    table: &str,
    col: &str,
    ty: &str,
) -> anyhow::Result<()> {
    if !cols.contains(col) {
        let sql = format!("ALTER TABLE {} ADD COLUMN {} {}", table, col, ty);
        conn.execute(&sql, [])?;
        tracing::info!(event = "schema_column_added", table, column = col);
    }
    Ok(())
}
