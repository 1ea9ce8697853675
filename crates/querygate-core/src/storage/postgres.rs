use super::{ClaimOutcome, RecordStore};
use crate::model::{EvaluationScores, EvaluationStatus, NewQueryRecord, QueryRecord};
use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgRow};
use sqlx::Row;

// Casts let tables created with INTEGER ids, NUMERIC(3,2) scores or a plain
// TIMESTAMP decode into the same Rust types.
const SELECT_RECORD: &str = "SELECT id::int8 AS id, natural_language_query, generated_sql,
        result_count::int8 AS result_count, execution_time_ms::int8 AS execution_time_ms,
        created_at::timestamptz AS created_at, evaluation_status,
        faithfulness_score::float8 AS faithfulness_score,
        answer_relevance_score::float8 AS answer_relevance_score,
        context_precision_score::float8 AS context_precision_score
 FROM query_logs";

/// Query-log store over the shared PostgreSQL pool.
#[derive(Clone)]
pub struct PgRecordStore {
    pool: PgPool,
}

impl PgRecordStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn init_schema(&self) -> anyhow::Result<()> {
        for stmt in super::schema::PG_DDL {
            sqlx::query(stmt)
                .execute(&self.pool)
                .await
                .context("query_logs schema init failed")?;
        }
        Ok(())
    }

    async fn status_of(&self, id: i64) -> anyhow::Result<Option<EvaluationStatus>> {
        let status: Option<String> =
            sqlx::query_scalar("SELECT evaluation_status FROM query_logs WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(status.map(|s| EvaluationStatus::parse(&s)))
    }
}

#[async_trait]
impl RecordStore for PgRecordStore {
    async fn insert_record(&self, record: &NewQueryRecord) -> anyhow::Result<i64> {
        let id: i64 = sqlx::query_scalar(
            "INSERT INTO query_logs(natural_language_query, generated_sql, evaluation_status,
                                    result_count, execution_time_ms, created_at)
             VALUES ($1, $2, $3, $4, $5, $6)
             RETURNING id::int8",
        )
        .bind(&record.question)
        .bind(&record.generated_sql)
        .bind(EvaluationStatus::Pending.as_str())
        .bind(record.result_count)
        .bind(record.execution_time_ms)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await?;
        Ok(id)
    }

    async fn claim_for_evaluation(&self, id: i64) -> anyhow::Result<ClaimOutcome> {
        let result = sqlx::query(
            "UPDATE query_logs SET evaluation_status = $1 WHERE id = $2 AND evaluation_status = $3",
        )
        .bind(EvaluationStatus::Evaluating.as_str())
        .bind(id)
        .bind(EvaluationStatus::Pending.as_str())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 1 {
            return Ok(ClaimOutcome::Claimed);
        }
        Ok(match self.status_of(id).await? {
            Some(status) => ClaimOutcome::AlreadyClaimed(status),
            None => ClaimOutcome::NotFound,
        })
    }

    async fn complete_evaluation(
        &self,
        id: i64,
        scores: &EvaluationScores,
    ) -> anyhow::Result<bool> {
        let mut tx = self.pool.begin().await?;
        let result = sqlx::query(
            "UPDATE query_logs
             SET faithfulness_score = $1, answer_relevance_score = $2,
                 context_precision_score = $3, evaluation_status = $4
             WHERE id = $5 AND evaluation_status = $6",
        )
        .bind(scores.faithfulness)
        .bind(scores.answer_relevance)
        .bind(scores.context_precision)
        .bind(EvaluationStatus::Completed.as_str())
        .bind(id)
        .bind(EvaluationStatus::Evaluating.as_str())
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(result.rows_affected() == 1)
    }

    async fn fail_evaluation(&self, id: i64) -> anyhow::Result<bool> {
        let result = sqlx::query(
            "UPDATE query_logs SET evaluation_status = $1 WHERE id = $2 AND evaluation_status = $3",
        )
        .bind(EvaluationStatus::Failed.as_str())
        .bind(id)
        .bind(EvaluationStatus::Evaluating.as_str())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn get_record(&self, id: i64) -> anyhow::Result<Option<QueryRecord>> {
        let row = sqlx::query(&format!("{SELECT_RECORD} WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(row_to_record).transpose()
    }

    async fn list_records(&self) -> anyhow::Result<Vec<QueryRecord>> {
        let rows = sqlx::query(&format!("{SELECT_RECORD} ORDER BY created_at DESC, id DESC"))
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(row_to_record).collect()
    }

    async fn ping(&self) -> anyhow::Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

fn row_to_record(row: &PgRow) -> anyhow::Result<QueryRecord> {
    let status: String = row.try_get("evaluation_status")?;
    let created_at: DateTime<Utc> = row.try_get("created_at")?;
    Ok(QueryRecord::from_parts(
        row.try_get("id")?,
        row.try_get("natural_language_query")?,
        row.try_get("generated_sql")?,
        row.try_get::<Option<i64>, _>("result_count")?.unwrap_or(0),
        row.try_get::<Option<i64>, _>("execution_time_ms")?.unwrap_or(0),
        created_at,
        EvaluationStatus::parse(&status),
        row.try_get("faithfulness_score")?,
        row.try_get("answer_relevance_score")?,
        row.try_get("context_precision_score")?,
    ))
}
