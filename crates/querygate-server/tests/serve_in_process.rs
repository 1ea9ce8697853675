use querygate_core::config::AppConfig;
use querygate_core::executor::SqliteExecutor;
use querygate_core::providers::llm::fake::FakeClient;
use querygate_core::providers::{JudgeScorer, LlmClient, LlmSqlGenerator};
use querygate_core::storage::seed::seed_employees_at;
use querygate_core::storage::SqliteStore;
use querygate_core::QueryService;
use querygate_server::config::ServerConfig;
use querygate_server::server::Server;
use querygate_server::tools::ToolContext;
use serde_json::Value;
use std::sync::Arc;

fn context(dir: &tempfile::TempDir) -> ToolContext {
    let path = dir.path().join("q.db");
    seed_employees_at(&path).unwrap();
    let mut cfg = AppConfig::new();
    cfg.database_url = path.display().to_string();

    let store = SqliteStore::open(&path).unwrap();
    store.init_schema().unwrap();
    let sql: Arc<dyn LlmClient> = Arc::new(FakeClient::new(
        "SQL: SELECT first_name, leave_type FROM employees WHERE leave_type IS NOT NULL",
    ));
    let judge: Arc<dyn LlmClient> = Arc::new(FakeClient::new(
        r#"{"faithfulness": 1.0, "answer_relevance": 0.9, "context_precision": 0.8}"#,
    ));
    let service = QueryService::new(
        &cfg,
        Arc::new(LlmSqlGenerator::new(sql, &cfg.llm, "employees")),
        Arc::new(SqliteExecutor::open(&path).unwrap()),
        Arc::new(store),
        Arc::new(JudgeScorer::new(judge)),
    )
    .unwrap();
    ToolContext::new(Arc::new(service), ServerConfig::default())
}

fn call(id: u64, tool: &str, args: Value) -> String {
    serde_json::json!({
        "jsonrpc": "2.0",
        "method": "tools/call",
        "params": { "name": tool, "arguments": args },
        "id": id
    })
    .to_string()
}

fn inner(line: &str) -> Value {
    let resp: Value = serde_json::from_str(line).unwrap();
    serde_json::from_str(resp["result"]["content"][0]["text"].as_str().unwrap()).unwrap()
}

#[tokio::test]
async fn test_submit_then_poll() {
    let dir = tempfile::tempdir().unwrap();
    let ctx = context(&dir);

    let input = format!(
        "{}\n\n{}\n",
        call(1, "query_submit", serde_json::json!({ "query": "who is on leave right now?" })),
        call(2, "health_check", serde_json::json!({})),
    );
    let mut out = Vec::new();
    Server::serve(&ctx, input.as_bytes(), &mut out).await.unwrap();

    let text = String::from_utf8(out).unwrap();
    let lines: Vec<&str> = text.lines().collect();
    // the blank line produces no response
    assert_eq!(lines.len(), 2);

    let submitted = inner(lines[0]);
    assert_eq!(submitted["success"], true);
    assert_eq!(submitted["result_count"], 3);
    assert_eq!(submitted["evaluation_status"], "pending");
    let id = submitted["query_log_id"].as_i64().unwrap();

    ctx.service.shutdown().await;

    let poll = call(3, "evaluation_status", serde_json::json!({ "query_log_id": id }));
    let mut out = Vec::new();
    Server::serve(&ctx, poll.as_bytes(), &mut out).await.unwrap();
    let status = inner(String::from_utf8(out).unwrap().trim());
    assert_eq!(status["status"], "completed");
    assert_eq!(status["scores"]["faithfulness"], 1.0);
}
