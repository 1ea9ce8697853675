use super::{ExecutionLimits, PoolStatus, QueryExecutor, RowCollector};
use crate::errors::ExecutionError;
use crate::model::{ResultSet, Row};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use futures_util::TryStreamExt;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde_json::Value;
use sqlx::postgres::{PgPool, PgRow};
use sqlx::{Column, Row as _, TypeInfo};
use std::time::{Duration, Instant};

// Slack on top of the server-side statement_timeout before the client gives up.
const CLIENT_GRACE: Duration = Duration::from_millis(250);

/// Executes validated statements on a pooled PostgreSQL connection inside a
/// read-only transaction.
#[derive(Clone)]
pub struct PgExecutor {
    pool: PgPool,
    base_size: u32,
    max_connections: u32,
}

impl PgExecutor {
    pub fn new(pool: PgPool, base_size: u32, max_connections: u32) -> Self {
        Self {
            pool,
            base_size,
            max_connections,
        }
    }

    async fn run(&self, sql: &str, limits: &ExecutionLimits) -> Result<ResultSet, ExecutionError> {
        let timeout_ms = limits.timeout_ms();
        let start = Instant::now();

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error(e, timeout_ms))?;
        sqlx::query("SET TRANSACTION READ ONLY")
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error(e, timeout_ms))?;
        sqlx::query(&format!("SET LOCAL statement_timeout = {}", timeout_ms))
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error(e, timeout_ms))?;

        let mut collector = RowCollector::new(limits.max_rows);
        {
            let mut stream = sqlx::query(sql).fetch(&mut *tx);
            while let Some(row) = stream
                .try_next()
                .await
                .map_err(|e| map_sqlx_error(e, timeout_ms))?
            {
                if !collector.has_columns() {
                    collector.set_columns(row.columns().iter().map(|c| c.name().to_string()).collect());
                }
                let converted = convert_row(&row).map_err(|e| map_sqlx_error(e, timeout_ms))?;
                if !collector.push(converted) {
                    break;
                }
            }
        }

        // nothing to keep: the transaction is read-only
        if let Err(e) = tx.rollback().await {
            tracing::debug!(event = "db_rollback_failed", error = %e);
        }

        Ok(collector.finish(start.elapsed().as_millis() as u64))
    }
}

#[async_trait]
impl QueryExecutor for PgExecutor {
    async fn execute(
        &self,
        sql: &str,
        limits: &ExecutionLimits,
    ) -> Result<ResultSet, ExecutionError> {
        match tokio::time::timeout(limits.timeout + CLIENT_GRACE, self.run(sql, limits)).await {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!(event = "query_timeout", timeout_ms = limits.timeout_ms());
                Err(ExecutionError::Timeout {
                    timeout_ms: limits.timeout_ms(),
                })
            }
        }
    }

    async fn ping(&self) -> anyhow::Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    fn pool_status(&self) -> Option<PoolStatus> {
        Some(PoolStatus::from_counts(
            self.pool.size(),
            self.pool.num_idle() as u32,
            self.base_size,
            self.max_connections,
        ))
    }

    async fn close(&self) {
        super::pool::close_pool().await;
        if !self.pool.is_closed() {
            self.pool.close().await;
        }
    }
}

fn convert_row(row: &PgRow) -> Result<Row, sqlx::Error> {
    let mut out = Row::new();
    for (idx, col) in row.columns().iter().enumerate() {
        let value = convert_value(row, idx, col.type_info().name())?;
        out.insert(col.name().to_string(), value);
    }
    Ok(out)
}

/// Maps a column to a transport-neutral JSON value: NUMERIC becomes a float,
/// date/time types become ISO-8601 strings.
fn convert_value(row: &PgRow, idx: usize, type_name: &str) -> Result<Value, sqlx::Error> {
    let value = match type_name {
        "BOOL" => row.try_get::<Option<bool>, _>(idx)?.map(Value::from),
        "INT2" => row.try_get::<Option<i16>, _>(idx)?.map(Value::from),
        "INT4" => row.try_get::<Option<i32>, _>(idx)?.map(Value::from),
        "INT8" => row.try_get::<Option<i64>, _>(idx)?.map(Value::from),
        "FLOAT4" => row
            .try_get::<Option<f32>, _>(idx)?
            .map(|v| float_value(v as f64)),
        "FLOAT8" => row.try_get::<Option<f64>, _>(idx)?.map(float_value),
        "NUMERIC" => row
            .try_get::<Option<Decimal>, _>(idx)?
            .map(|d| d.to_f64().map(float_value).unwrap_or(Value::Null)),
        "DATE" => row
            .try_get::<Option<NaiveDate>, _>(idx)?
            .map(|d| Value::String(d.format("%Y-%m-%d").to_string())),
        "TIMESTAMP" => row
            .try_get::<Option<NaiveDateTime>, _>(idx)?
            .map(|d| Value::String(d.format("%Y-%m-%dT%H:%M:%S%.f").to_string())),
        "TIMESTAMPTZ" => row
            .try_get::<Option<DateTime<Utc>>, _>(idx)?
            .map(|d| Value::String(d.to_rfc3339())),
        "TIME" => row
            .try_get::<Option<NaiveTime>, _>(idx)?
            .map(|t| Value::String(t.format("%H:%M:%S%.f").to_string())),
        "JSON" | "JSONB" => row.try_get::<Option<Value>, _>(idx)?,
        _ => match row.try_get::<Option<String>, _>(idx) {
            Ok(v) => v.map(Value::String),
            Err(e) => {
                tracing::debug!(event = "column_type_unsupported", type_name, error = %e);
                None
            }
        },
    };
    Ok(value.unwrap_or(Value::Null))
}

fn float_value(v: f64) -> Value {
    serde_json::Number::from_f64(v)
        .map(Value::Number)
        .unwrap_or(Value::Null)
}

fn map_sqlx_error(e: sqlx::Error, timeout_ms: u64) -> ExecutionError {
    let mapped = match &e {
        sqlx::Error::Database(db) => {
            let code = db.code().map(|c| c.to_string()).unwrap_or_default();
            if code == "57014" {
                ExecutionError::Timeout { timeout_ms }
            } else if code.starts_with("23") {
                ExecutionError::Integrity(db.message().to_string())
            } else if code.starts_with("08") {
                ExecutionError::Connection(db.message().to_string())
            } else {
                ExecutionError::Database(db.message().to_string())
            }
        }
        sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed
        | sqlx::Error::Io(_)
        | sqlx::Error::Tls(_)
        | sqlx::Error::WorkerCrashed => ExecutionError::Connection(e.to_string()),
        _ => ExecutionError::Database(e.to_string()),
    };
    tracing::error!(event = "db_execution_error", error = %e, kind = ?mapped);
    mapped
}
