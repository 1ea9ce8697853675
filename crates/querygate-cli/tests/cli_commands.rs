use assert_cmd::Command;
use predicates::str::contains;
use tempfile::TempDir;

fn querygate(dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("querygate").unwrap();
    cmd.env("DATABASE_URL", dir.path().join("querygate.db"))
        .env_remove("OPENAI_API_KEY")
        .env_remove("QUERYGATE_CONFIG")
        .env("QUERYGATE_LOG", "error");
    cmd
}

#[test]
fn test_validate_accepts_plain_select() {
    let dir = TempDir::new().unwrap();
    querygate(&dir)
        .args(["validate", "SELECT first_name FROM employees WHERE department = 'HR'"])
        .assert()
        .success()
        .stdout(contains("ok: statement allowed"));
}

#[test]
fn test_validate_rejections_carry_codes() {
    let dir = TempDir::new().unwrap();
    querygate(&dir)
        .args(["validate", "DROP TABLE employees"])
        .assert()
        .code(1)
        .stdout(contains("rejected ["));

    querygate(&dir)
        .args(["validate", "SELECT * FROM employees_backup"])
        .assert()
        .code(1)
        .stdout(contains("INVALID_TABLE"));
}

#[test]
fn test_validate_json_format() {
    let dir = TempDir::new().unwrap();
    let out = querygate(&dir)
        .args([
            "validate",
            "--format",
            "json",
            "SELECT * FROM employees; DELETE FROM employees",
        ])
        .assert()
        .code(1)
        .get_output()
        .stdout
        .clone();
    let v: serde_json::Value = serde_json::from_slice(&out).unwrap();
    assert_eq!(v["valid"], false);
    assert!(v["error"]["code"].is_string());
}

#[test]
fn test_sanitize_strips_markers() {
    let dir = TempDir::new().unwrap();
    querygate(&dir)
        .args(["sanitize", "show me everyone; -- in HR /* please */"])
        .assert()
        .success()
        .stdout(contains("show me everyone  in HR  please"));

    querygate(&dir)
        .args(["sanitize", " ;;-- "])
        .assert()
        .code(1)
        .stderr(contains("EMPTY_INPUT"));
}

#[test]
fn test_sanitize_respects_max_input() {
    let dir = TempDir::new().unwrap();
    querygate(&dir)
        .env("QUERYGATE_MAX_INPUT", "10")
        .args(["sanitize", "who works in engineering?"])
        .assert()
        .code(1)
        .stderr(contains("TOO_LONG"));
}

#[test]
fn test_seed_then_health_and_empty_report() {
    let dir = TempDir::new().unwrap();
    querygate(&dir)
        .arg("seed")
        .assert()
        .success()
        .stderr(contains("seeded"));

    // second run is a no-op
    querygate(&dir)
        .arg("seed")
        .assert()
        .success()
        .stderr(contains("skipped"));

    let out = querygate(&dir)
        .arg("health")
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let health: serde_json::Value = serde_json::from_slice(&out).unwrap();
    assert_eq!(health["status"], "healthy");
    assert_eq!(health["backend"], "sqlite");

    let out = querygate(&dir)
        .args(["report", "--format", "json"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let report: serde_json::Value = serde_json::from_slice(&out).unwrap();
    assert_eq!(report["total_queries"], 0);

    querygate(&dir)
        .arg("report")
        .assert()
        .success()
        .stdout(contains("Query analysis (0 queries)"));
}

#[test]
fn test_report_to_file() {
    let dir = TempDir::new().unwrap();
    let out_path = dir.path().join("out/report.json");
    querygate(&dir)
        .args(["report", "--format", "json", "--out"])
        .arg(&out_path)
        .assert()
        .success();
    let body = std::fs::read_to_string(&out_path).unwrap();
    let report: serde_json::Value = serde_json::from_str(&body).unwrap();
    assert!(report["recommendations"].is_array());
}

#[test]
fn test_query_without_api_key_is_llm_error() {
    let dir = TempDir::new().unwrap();
    querygate(&dir).arg("seed").assert().success();

    let out = querygate(&dir)
        .args(["query", "who is on leave?"])
        .assert()
        .code(1)
        .get_output()
        .stdout
        .clone();
    let resp: serde_json::Value = serde_json::from_slice(&out).unwrap();
    assert_eq!(resp["success"], false);
    assert_eq!(resp["error_type"], "LLM_ERROR");
    assert!(resp["query_log_id"].is_null());
}

#[test]
fn test_query_rejects_empty_question() {
    let dir = TempDir::new().unwrap();
    querygate(&dir)
        .args(["query", "--format", "text", "  ;  "])
        .assert()
        .code(1)
        .stdout(contains("error [VALIDATION_ERROR]"));
}

#[test]
fn test_status_unknown_record() {
    let dir = TempDir::new().unwrap();
    querygate(&dir)
        .args(["status", "42"])
        .assert()
        .code(1)
        .stderr(contains("no query record with id 42"));
}

#[test]
fn test_strict_config_rejects_unknown_keys() {
    let dir = TempDir::new().unwrap();
    let cfg = dir.path().join("querygate.yaml");
    std::fs::write(&cfg, "policy:\n  allowed_table: employees\nnot_a_key: 1\n").unwrap();

    querygate(&dir)
        .args(["--strict", "--config"])
        .arg(&cfg)
        .args(["validate", "SELECT 1 FROM employees"])
        .assert()
        .code(2)
        .stderr(contains("config error"));

    querygate(&dir)
        .arg("--config")
        .arg(&cfg)
        .args(["validate", "SELECT 1 FROM employees"])
        .assert()
        .success();
}
