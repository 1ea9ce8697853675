use anyhow::Result;
use serde_json::Value;
use std::io::{BufRead, BufReader, Write};
use std::process::{Child, ChildStdout, Command, Stdio};

struct Harness {
    child: Child,
    reader: BufReader<ChildStdout>,
    _dir: tempfile::TempDir,
}

impl Harness {
    fn spawn(env: &[(&str, &str)]) -> Result<Self> {
        let dir = tempfile::tempdir()?;
        let db = dir.path().join("querygate.db");
        querygate_core::storage::seed::seed_employees_at(&db)?;

        let mut cmd = Command::new(env!("CARGO_BIN_EXE_querygate-server"));
        cmd.env("DATABASE_URL", &db)
            .env("QUERYGATE_LOG", "warn")
            .env_remove("OPENAI_API_KEY");
        for (k, v) in env {
            cmd.env(k, v);
        }
        let mut child = cmd
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()?;
        let stdout = child.stdout.take().expect("stdout");
        Ok(Self {
            child,
            reader: BufReader::new(stdout),
            _dir: dir,
        })
    }

    fn send_raw(&mut self, line: &str) -> Result<Value> {
        let stdin = self.child.stdin.as_mut().expect("stdin");
        writeln!(stdin, "{}", line)?;
        stdin.flush()?;
        let mut out = String::new();
        self.reader.read_line(&mut out)?;
        Ok(serde_json::from_str(&out)?)
    }

    fn send(&mut self, req: Value) -> Result<Value> {
        self.send_raw(&serde_json::to_string(&req)?)
    }

    fn call(&mut self, id: u64, tool: &str, args: Value) -> Result<Value> {
        let resp = self.send(serde_json::json!({
            "jsonrpc": "2.0",
            "method": "tools/call",
            "params": { "name": tool, "arguments": args },
            "id": id
        }))?;
        Ok(extract_inner(&resp))
    }

    fn finish(mut self) -> Result<()> {
        drop(self.child.stdin.take());
        let status = self.child.wait()?;
        assert!(status.success());
        Ok(())
    }
}

fn extract_inner(resp: &Value) -> Value {
    let text = resp["result"]["content"][0]["text"]
        .as_str()
        .expect("tool result text");
    serde_json::from_str(text).expect("inner JSON")
}

#[test]
fn test_stdio_flow() -> Result<()> {
    let mut h = Harness::spawn(&[])?;

    let init = h.send(serde_json::json!({
        "jsonrpc": "2.0",
        "method": "initialize",
        "params": { "protocolVersion": "2024-11-05", "capabilities": {} },
        "id": 1
    }))?;
    assert_eq!(init["result"]["serverInfo"]["name"], "querygate-server");

    let list = h.send(serde_json::json!({
        "jsonrpc": "2.0", "method": "tools/list", "params": {}, "id": 2
    }))?;
    let tools = list["result"]["tools"].as_array().expect("tools");
    for name in [
        "query_submit",
        "evaluation_status",
        "analysis_report",
        "health_check",
        "sql_validate",
    ] {
        assert!(tools.iter().any(|t| t["name"] == name), "missing {name}");
    }

    let ok = h.call(3, "sql_validate", serde_json::json!({ "sql": "SELECT * FROM employees" }))?;
    assert_eq!(ok["valid"], true);

    let bad = h.call(
        4,
        "sql_validate",
        serde_json::json!({ "sql": "SELECT * FROM employees_backup" }),
    )?;
    assert_eq!(bad["valid"], false);
    assert_eq!(bad["error"]["code"], "INVALID_TABLE");

    let health = h.call(5, "health_check", serde_json::json!({}))?;
    assert_eq!(health["status"], "healthy");
    assert_eq!(health["backend"], "sqlite");

    // no API key configured: the generator is unavailable
    let q = h.call(6, "query_submit", serde_json::json!({ "query": "who is on leave?" }))?;
    assert_eq!(q["success"], false);
    assert_eq!(q["error_type"], "LLM_ERROR");

    let missing = h.call(7, "evaluation_status", serde_json::json!({ "query_log_id": 999 }))?;
    assert_eq!(missing["error"]["code"], "E_NOT_FOUND");

    let report = h.call(8, "analysis_report", serde_json::json!({}))?;
    assert_eq!(report["total_queries"], 0);

    let unknown = h.send(serde_json::json!({
        "jsonrpc": "2.0", "method": "nope", "id": 9
    }))?;
    assert_eq!(unknown["error"]["code"], -32601);

    h.finish()
}

#[test]
fn test_message_limit() -> Result<()> {
    let mut h = Harness::spawn(&[("QUERYGATE_MAX_BYTES", "100")])?;
    let req = serde_json::json!({
        "jsonrpc": "2.0",
        "method": "tools/call",
        "params": { "name": "sql_validate", "arguments": { "sql": "x".repeat(200) } },
        "id": 1
    });
    let resp = h.send(req)?;
    let inner = extract_inner(&resp);
    assert_eq!(inner["error"]["code"], "E_LIMIT_EXCEEDED");
    assert_eq!(resp["result"]["isError"], true);
    h.finish()
}

#[test]
fn test_field_limit_boundary() -> Result<()> {
    let mut h = Harness::spawn(&[("QUERYGATE_MAX_FIELD_BYTES", "23")])?;

    // exactly 23 bytes
    let ok = h.call(1, "sql_validate", serde_json::json!({ "sql": "SELECT * FROM employees" }))?;
    assert_eq!(ok["valid"], true);

    let too_long = h.call(
        2,
        "sql_validate",
        serde_json::json!({ "sql": "SELECT * FROM employees " }),
    )?;
    assert_eq!(too_long["error"]["code"], "E_LIMIT_EXCEEDED");
    h.finish()
}

#[test]
fn test_garbage_line_gets_parse_error() -> Result<()> {
    let mut h = Harness::spawn(&[])?;
    let resp = h.send_raw("{not json")?;
    assert_eq!(resp["error"]["code"], -32700);
    h.finish()
}
