use querygate_core::config::AppConfig;
use querygate_core::executor::SqliteExecutor;
use querygate_core::model::EvaluationStatus;
use querygate_core::providers::llm::fake::FakeClient;
use querygate_core::providers::{JudgeScorer, LlmClient, LlmSqlGenerator};
use querygate_core::storage::seed::seed_employees_at;
use querygate_core::storage::SqliteStore;
use querygate_core::QueryService;
use std::sync::Arc;

const JUDGE_REPLY: &str =
    r#"{"faithfulness": 0.55, "answer_relevance": 0.9, "context_precision": 0.8}"#;

async fn service(sql_reply: &str) -> (tempfile::TempDir, QueryService) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("querygate.db");
    seed_employees_at(&path).unwrap();

    let mut cfg = AppConfig::new();
    cfg.database_url = path.display().to_string();

    let store = SqliteStore::open(&path).unwrap();
    store.init_schema().unwrap();
    let sql_client: Arc<dyn LlmClient> = Arc::new(FakeClient::new(sql_reply));
    let judge_client: Arc<dyn LlmClient> = Arc::new(FakeClient::new(JUDGE_REPLY));

    let svc = QueryService::new(
        &cfg,
        Arc::new(LlmSqlGenerator::new(sql_client, &cfg.llm, "employees")),
        Arc::new(SqliteExecutor::open(&path).unwrap()),
        Arc::new(store),
        Arc::new(JudgeScorer::new(judge_client)),
    )
    .unwrap();
    (dir, svc)
}

#[tokio::test]
async fn test_query_is_scored_in_background() {
    let (_dir, svc) = service("SELECT first_name, salary_usd FROM employees WHERE salary_usd > 100000").await;

    let resp = svc.submit("who earns a high salary?").await;
    assert!(resp.success, "{:?}", resp.error);
    assert_eq!(resp.evaluation_status, Some(EvaluationStatus::Pending));
    let id = resp.query_log_id.unwrap();

    // drains the evaluation queue
    svc.shutdown().await;

    let view = svc.evaluation_status(id).await.unwrap();
    assert_eq!(view.status, EvaluationStatus::Completed);
    let scores = view.scores.unwrap();
    assert_eq!(scores.faithfulness, 0.55);
    assert_eq!(scores.answer_relevance, 0.9);
    assert_eq!(scores.context_precision, 0.8);

    let report = svc.analysis().await.unwrap();
    assert_eq!(report.total_queries, 1);
    assert_eq!(report.weak_queries.len(), 1);
    assert!(report.weak_queries[0].reason.starts_with("Low faithfulness"));
    assert!(report
        .recommendations
        .iter()
        .any(|r| r.contains("salary comparisons")));
}

#[tokio::test]
async fn test_dangerous_sql_never_reaches_the_database() {
    let (_dir, svc) = service("DeLeTe FrOm Employees").await;
    let resp = svc.submit("remove everybody").await;
    assert!(!resp.success);
    assert_eq!(resp.error_type.as_deref(), Some("VALIDATION_ERROR"));
    assert!(resp.query_log_id.is_none());

    let resp = svc.submit("how many employees are there").await;
    assert!(!resp.success);

    svc.shutdown().await;
    let report = svc.analysis().await.unwrap();
    assert_eq!(report.total_queries, 0);
    assert!(report.recommendations[0].starts_with("No queries executed yet"));
}

#[tokio::test]
async fn test_sanitizer_strips_injection_before_generation() {
    let (_dir, svc) = service("SELECT * FROM employees").await;
    let resp = svc.submit("SELECT * FROM employees; -- DROP TABLE").await;
    // the raw question is echoed back; only the generator sees the sanitized text
    assert_eq!(resp.query, "SELECT * FROM employees; -- DROP TABLE");
    assert!(resp.success);
    assert_eq!(resp.result_count, 18);
    assert!(!resp.truncated);
    svc.shutdown().await;
}

#[tokio::test]
async fn test_unknown_record_is_not_found() {
    let (_dir, svc) = service("SELECT * FROM employees").await;
    assert!(matches!(
        svc.evaluation_status(12345).await,
        Err(querygate_core::LifecycleError::NotFound(12345))
    ));
    svc.shutdown().await;
}
