//! The request pipeline: sanitize, generate, validate, execute, log, and
//! hand off to evaluation.

use crate::config::AppConfig;
use crate::errors::{ExecutionError, GenerationError, LifecycleError, QueryError};
use crate::executor::{pool, ExecutionLimits, PgExecutor, PoolStatus, QueryExecutor, SqliteExecutor};
use crate::lifecycle::{EvaluationJob, EvaluationManager, EvaluationStatusView};
use crate::model::{EvaluationStatus, NewQueryRecord, ResultSet, Row};
use crate::providers::llm::OpenAIClient;
use crate::providers::scorer::JUDGE_SAMPLE_ROWS;
use crate::providers::{
    DisabledScorer, JudgeScorer, LlmClient, LlmSqlGenerator, Scorer, SqlGenerator,
    UnavailableGenerator,
};
use crate::report::{self, AnalysisReport, ReportConfig};
use crate::sanitize::sanitize;
use crate::storage::{PgRecordStore, RecordStore, SqliteStore};
use crate::validate::{StatementValidator, ValidationPolicy};
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryResponse {
    pub success: bool,
    pub query: String,
    pub generated_sql: Option<String>,
    pub results: Vec<Row>,
    pub result_count: usize,
    pub execution_time_ms: u64,
    pub truncated: bool,
    pub query_log_id: Option<i64>,
    pub evaluation_status: Option<EvaluationStatus>,
    pub error: Option<String>,
    /// `VALIDATION_ERROR`, `LLM_ERROR` or `DB_ERROR`.
    pub error_type: Option<String>,
}

impl QueryResponse {
    fn failure(query: &str, sql: Option<String>, err: &QueryError, elapsed_ms: u64) -> Self {
        Self {
            success: false,
            query: query.to_string(),
            generated_sql: sql,
            results: Vec::new(),
            result_count: 0,
            execution_time_ms: elapsed_ms,
            truncated: false,
            query_log_id: None,
            evaluation_status: None,
            error: Some(err.user_message()),
            error_type: Some(err.error_type().to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthReport {
    /// `healthy` or `unhealthy`.
    pub status: String,
    /// `connected` or `disconnected`.
    pub database: String,
    pub timestamp: String,
    pub backend: String,
    pub pool_status: Option<PoolStatus>,
    pub error: Option<String>,
}

impl HealthReport {
    pub fn is_healthy(&self) -> bool {
        self.status == "healthy"
    }
}

pub struct QueryService {
    validator: StatementValidator,
    generator: Arc<dyn SqlGenerator>,
    executor: Arc<dyn QueryExecutor>,
    evaluations: EvaluationManager,
    exec_timeout: Duration,
    request_timeout: Duration,
    report: ReportConfig,
    backend: &'static str,
}

impl QueryService {
    /// Wires already-built components. Spawns evaluation workers, so it must
    /// run inside a tokio runtime.
    pub fn new(
        cfg: &AppConfig,
        generator: Arc<dyn SqlGenerator>,
        executor: Arc<dyn QueryExecutor>,
        store: Arc<dyn RecordStore>,
        scorer: Arc<dyn Scorer>,
    ) -> anyhow::Result<Self> {
        let policy = Arc::new(cfg.policy.clone());
        let validator = StatementValidator::new(policy)?;
        let evaluations = EvaluationManager::start(store, scorer, &cfg.evaluation);
        Ok(Self {
            validator,
            generator,
            executor,
            evaluations,
            exec_timeout: Duration::from_millis(cfg.execution.timeout_ms),
            request_timeout: Duration::from_millis(cfg.execution.request_timeout_ms),
            report: cfg.report.clone(),
            backend: if cfg.is_postgres() { "postgres" } else { "sqlite" },
        })
    }

    pub fn policy(&self) -> &ValidationPolicy {
        self.validator.policy()
    }

    pub fn validator(&self) -> &StatementValidator {
        &self.validator
    }

    pub fn store(&self) -> &Arc<dyn RecordStore> {
        self.evaluations.store()
    }

    /// Runs one natural-language query end to end. Never fails: every error
    /// is folded into the response with its error-type tag.
    pub async fn submit(&self, text: &str) -> QueryResponse {
        let start = Instant::now();
        let deadline = start + self.request_timeout;
        let mut generated: Option<String> = None;

        let outcome = self.run_pipeline(text, deadline, &mut generated).await;
        let elapsed_ms = start.elapsed().as_millis() as u64;

        match outcome {
            Ok(rs) => self.log_and_schedule(text, generated.unwrap_or_default(), rs, elapsed_ms).await,
            Err(e) => {
                tracing::warn!(
                    event = "query_failed",
                    error_type = e.error_type(),
                    error = %e,
                    elapsed_ms,
                );
                QueryResponse::failure(text, generated, &e, elapsed_ms)
            }
        }
    }

    async fn run_pipeline(
        &self,
        text: &str,
        deadline: Instant,
        generated: &mut Option<String>,
    ) -> Result<ResultSet, QueryError> {
        let question = sanitize(text, self.policy())?;

        let sql = tokio::time::timeout_at(deadline, self.generator.generate(&question))
            .await
            .map_err(|_| GenerationError::DeadlineExceeded)??;
        *generated = Some(sql.clone());

        self.validator.validate_with_context(&sql, Some(text))?;

        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Err(ExecutionError::Timeout {
                timeout_ms: self.request_timeout.as_millis() as u64,
            }
            .into());
        }
        let limits = ExecutionLimits {
            timeout: self.exec_timeout.min(remaining),
            max_rows: self.policy().max_result_rows,
        };
        Ok(self.executor.execute(&sql, &limits).await?)
    }

    async fn log_and_schedule(
        &self,
        text: &str,
        sql: String,
        rs: ResultSet,
        elapsed_ms: u64,
    ) -> QueryResponse {
        let record = NewQueryRecord {
            question: text.to_string(),
            generated_sql: sql.clone(),
            result_count: rs.row_count as i64,
            execution_time_ms: elapsed_ms as i64,
        };
        let id = self.evaluations.create(&record).await;

        if let Some(id) = id {
            let job = EvaluationJob {
                record_id: id,
                question: text.to_string(),
                sql: sql.clone(),
                rows: rs.rows.iter().take(JUDGE_SAMPLE_ROWS).cloned().collect(),
            };
            self.evaluations.schedule_evaluation(job).await;
        }

        tracing::info!(
            event = "query_executed",
            result_count = rs.row_count,
            truncated = rs.truncated,
            elapsed_ms,
        );

        QueryResponse {
            success: true,
            query: text.to_string(),
            generated_sql: Some(sql),
            result_count: rs.row_count,
            results: rs.rows,
            execution_time_ms: elapsed_ms,
            truncated: rs.truncated,
            query_log_id: id,
            evaluation_status: id.map(|_| EvaluationStatus::Pending),
            error: None,
            error_type: None,
        }
    }

    pub async fn evaluation_status(&self, id: i64) -> Result<EvaluationStatusView, LifecycleError> {
        self.evaluations.get_status(id).await
    }

    pub async fn analysis(&self) -> anyhow::Result<AnalysisReport> {
        let records = self.store().list_records().await?;
        Ok(report::analyze(&records, &self.report))
    }

    pub async fn health(&self) -> HealthReport {
        let checked = match self.executor.ping().await {
            Ok(()) => self.store().ping().await,
            Err(e) => Err(e),
        };
        let timestamp = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);
        match checked {
            Ok(()) => HealthReport {
                status: "healthy".into(),
                database: "connected".into(),
                timestamp,
                backend: self.backend.into(),
                pool_status: self.executor.pool_status(),
                error: None,
            },
            Err(e) => {
                tracing::error!(event = "health_check_failed", error = %e);
                HealthReport {
                    status: "unhealthy".into(),
                    database: "disconnected".into(),
                    timestamp,
                    backend: self.backend.into(),
                    pool_status: None,
                    error: Some(e.to_string()),
                }
            }
        }
    }

    /// Waits for queued evaluations, then releases database connections.
    pub async fn shutdown(&self) {
        self.evaluations.shutdown().await;
        self.executor.close().await;
        tracing::info!(event = "service_stopped");
    }
}

/// Builds the service for `cfg`: PostgreSQL when the URL says so, otherwise
/// a SQLite file.
pub async fn bootstrap(cfg: &AppConfig) -> anyhow::Result<QueryService> {
    let (executor, store): (Arc<dyn QueryExecutor>, Arc<dyn RecordStore>) = if cfg.is_postgres() {
        let pool = pool::init_pool(&cfg.database_url, &cfg.pool).await?;
        let store = PgRecordStore::new(pool.clone());
        store.init_schema().await?;
        let executor = PgExecutor::new(pool, cfg.pool.size, cfg.pool.max_connections());
        (Arc::new(executor), Arc::new(store))
    } else {
        let path = Path::new(&cfg.database_url);
        let store = SqliteStore::open(path)?;
        store.init_schema()?;
        let executor = SqliteExecutor::open(path)?;
        (Arc::new(executor), Arc::new(store))
    };

    let (generator, scorer): (Arc<dyn SqlGenerator>, Arc<dyn Scorer>) = match &cfg.llm.api_key {
        Some(key) => {
            let client: Arc<dyn LlmClient> = Arc::new(OpenAIClient::new(
                cfg.llm.model.clone(),
                key.clone(),
                cfg.llm.base_url.clone(),
                cfg.llm.max_tokens,
            ));
            (
                Arc::new(LlmSqlGenerator::new(client.clone(), &cfg.llm, &cfg.policy.allowed_table)),
                Arc::new(JudgeScorer::new(client)),
            )
        }
        None => {
            tracing::warn!(event = "llm_disabled", reason = "OPENAI_API_KEY is not set");
            (
                Arc::new(UnavailableGenerator::new("OPENAI_API_KEY is not set")),
                Arc::new(DisabledScorer),
            )
        }
    };

    tracing::info!(
        event = "service_started",
        backend = if cfg.is_postgres() { "postgres" } else { "sqlite" },
        allowed_table = %cfg.policy.allowed_table,
        eval_workers = cfg.evaluation.workers,
    );
    QueryService::new(cfg, generator, executor, store, scorer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::llm::fake::{FakeClient, FakeReply};
    use crate::storage::seed::seed_employees_at;

    async fn service_with(client: FakeClient, cfg: AppConfig) -> (tempfile::TempDir, QueryService) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("svc.db");
        seed_employees_at(&path).unwrap();

        let store = SqliteStore::open(&path).unwrap();
        store.init_schema().unwrap();
        let executor = SqliteExecutor::open(&path).unwrap();
        let client: Arc<dyn LlmClient> = Arc::new(client);
        let generator = LlmSqlGenerator::new(client, &cfg.llm, "employees");
        let svc = QueryService::new(
            &cfg,
            Arc::new(generator),
            Arc::new(executor),
            Arc::new(store),
            Arc::new(DisabledScorer),
        )
        .unwrap();
        (dir, svc)
    }

    fn cfg() -> AppConfig {
        let mut cfg = AppConfig::new();
        cfg.llm.backoff_ms = vec![1];
        cfg
    }

    #[tokio::test]
    async fn test_submit_success_logs_pending_record() {
        let (_dir, svc) = service_with(
            FakeClient::new("SELECT first_name FROM employees WHERE department = 'Engineering'"),
            cfg(),
        )
        .await;
        let resp = svc.submit("who works in engineering").await;
        assert!(resp.success, "{:?}", resp.error);
        assert!(resp.result_count > 0);
        assert_eq!(resp.result_count, resp.results.len());
        assert_eq!(resp.evaluation_status, Some(EvaluationStatus::Pending));

        let id = resp.query_log_id.unwrap();
        svc.shutdown().await;
        // the disabled scorer marks the record failed
        let view = svc.evaluation_status(id).await.unwrap();
        assert_eq!(view.status, EvaluationStatus::Failed);
        assert!(view.scores.is_none());
    }

    #[tokio::test]
    async fn test_validation_failure_is_tagged() {
        let (_dir, svc) = service_with(FakeClient::new("SELECT * FROM employees_backup"), cfg()).await;
        let resp = svc.submit("show the backup").await;
        assert!(!resp.success);
        assert_eq!(resp.error_type.as_deref(), Some("VALIDATION_ERROR"));
        assert_eq!(resp.generated_sql.as_deref(), Some("SELECT * FROM employees_backup"));
        assert!(resp.query_log_id.is_none());

        let resp = svc.submit("  ;; -- ").await;
        assert_eq!(resp.error_type.as_deref(), Some("VALIDATION_ERROR"));
        assert!(resp.generated_sql.is_none());
    }

    #[tokio::test]
    async fn test_generation_failure_is_tagged() {
        let (_dir, svc) = service_with(FakeClient::new("INVALID_REQUEST"), cfg()).await;
        let resp = svc.submit("delete everyone").await;
        assert_eq!(resp.error_type.as_deref(), Some("LLM_ERROR"));
    }

    #[tokio::test]
    async fn test_request_deadline_bounds_generation() {
        let mut c = cfg();
        c.execution.request_timeout_ms = 50;
        let slow = FakeClient::new("SELECT 1")
            .then(FakeReply::Delayed(Duration::from_secs(2), "SELECT * FROM employees".into()));
        let (_dir, svc) = service_with(slow, c).await;

        let started = std::time::Instant::now();
        let resp = svc.submit("everyone").await;
        assert!(started.elapsed() < Duration::from_secs(1));
        assert_eq!(resp.error_type.as_deref(), Some("LLM_ERROR"));
    }

    #[tokio::test]
    async fn test_health_reports_pool() {
        let (_dir, svc) = service_with(FakeClient::new("SELECT 1"), cfg()).await;
        let health = svc.health().await;
        assert!(health.is_healthy());
        assert_eq!(health.backend, "sqlite");
        assert_eq!(health.pool_status.map(|p| p.size), Some(1));
    }
}
