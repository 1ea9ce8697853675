use super::{exit_codes, open_service};
use crate::cli::args::ReportArgs;
use querygate_core::config::AppConfig;
use querygate_core::report::console;

pub async fn run(args: ReportArgs, cfg: &AppConfig) -> anyhow::Result<i32> {
    let service = open_service(cfg).await?;
    let report = service.analysis().await;
    service.shutdown().await;
    let report = report?;

    let body = match args.format.as_str() {
        "json" => serde_json::to_string_pretty(&report)?,
        "text" => console::render(&report),
        other => {
            eprintln!("config error: unknown format '{other}' (expected text|json)");
            return Ok(exit_codes::CONFIG_ERROR);
        }
    };

    match &args.out {
        Some(path) => {
            if let Some(parent) = path.parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent)?;
                }
            }
            std::fs::write(path, body)?;
            eprintln!("wrote {}", path.display());
        }
        None => println!("{}", body.trim_end()),
    }
    Ok(exit_codes::OK)
}
