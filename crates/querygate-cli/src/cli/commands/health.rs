use super::{exit_codes, open_service};
use crate::cli::args::HealthArgs;
use querygate_core::config::AppConfig;

pub async fn run(args: HealthArgs, cfg: &AppConfig) -> anyhow::Result<i32> {
    let service = open_service(cfg).await?;
    let health = service.health().await;
    service.shutdown().await;

    if args.format == "json" {
        println!("{}", serde_json::to_string_pretty(&health)?);
    } else {
        println!("{} ({}, database {})", health.status, health.backend, health.database);
        if let Some(pool) = &health.pool_status {
            println!("pool: {}", serde_json::to_string(pool)?);
        }
        if let Some(err) = &health.error {
            println!("error: {err}");
        }
    }

    Ok(if health.is_healthy() {
        exit_codes::OK
    } else {
        exit_codes::QUERY_FAILED
    })
}
