use super::{exit_codes, open_service};
use crate::cli::args::QueryArgs;
use querygate_core::config::AppConfig;
use querygate_core::service::QueryResponse;
use querygate_core::lifecycle::EvaluationStatusView;
use querygate_core::QueryService;
use std::io::Write;
use std::time::{Duration, Instant};

const POLL_INTERVAL: Duration = Duration::from_millis(100);

pub async fn run(args: QueryArgs, cfg: &AppConfig) -> anyhow::Result<i32> {
    let service = open_service(cfg).await?;
    let resp = service.submit(&args.text).await;

    if args.format == "json" {
        println!("{}", serde_json::to_string_pretty(&resp)?);
    } else {
        print!("{}", render_text(&resp)?);
    }
    std::io::stdout().flush()?;

    if args.wait {
        if let Some(id) = resp.query_log_id {
            let budget = Duration::from_millis(cfg.evaluation.timeout_ms) + Duration::from_secs(1);
            let view = wait_for_evaluation(&service, id, budget).await?;
            if args.format == "json" {
                println!("{}", serde_json::to_string_pretty(&view)?);
            } else {
                match &view.scores {
                    Some(s) => println!(
                        "evaluation: {} (faithfulness {:.2}, relevance {:.2}, precision {:.2})",
                        view.status.as_str(),
                        s.faithfulness,
                        s.answer_relevance,
                        s.context_precision
                    ),
                    None => println!("evaluation: {}", view.status.as_str()),
                }
            }
        }
    }

    // drains the queued evaluation before the process exits
    service.shutdown().await;

    Ok(if resp.success {
        exit_codes::OK
    } else {
        exit_codes::QUERY_FAILED
    })
}

async fn wait_for_evaluation(
    service: &QueryService,
    id: i64,
    budget: Duration,
) -> anyhow::Result<EvaluationStatusView> {
    let deadline = Instant::now() + budget;
    loop {
        let view = service.evaluation_status(id).await?;
        if view.status.is_terminal() || Instant::now() >= deadline {
            return Ok(view);
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    }
}

fn render_text(resp: &QueryResponse) -> anyhow::Result<String> {
    let mut out = String::new();
    if let Some(sql) = &resp.generated_sql {
        out.push_str(&format!("sql: {sql}\n"));
    }
    if !resp.success {
        out.push_str(&format!(
            "error [{}]: {}\n",
            resp.error_type.as_deref().unwrap_or("UNKNOWN"),
            resp.error.as_deref().unwrap_or("")
        ));
        return Ok(out);
    }

    let suffix = if resp.truncated { ", truncated" } else { "" };
    out.push_str(&format!(
        "rows: {} ({} ms{})\n",
        resp.result_count, resp.execution_time_ms, suffix
    ));
    for row in &resp.results {
        out.push_str(&serde_json::to_string(row)?);
        out.push('\n');
    }
    if let Some(id) = resp.query_log_id {
        out.push_str(&format!("query_log_id: {id}\n"));
    }
    Ok(out)
}
