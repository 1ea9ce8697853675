use anyhow::{Context, Result};
use clap::Parser;
use querygate_core::config::AppConfig;
use querygate_server::config::ServerConfig;
use querygate_server::server::Server;
use querygate_server::tools::ToolContext;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// YAML config file; environment variables override it.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Reject unknown keys in the config file.
    #[arg(long)]
    strict: bool,
}

fn init_logging(log_level: &str) {
    let filter = EnvFilter::try_new(log_level).unwrap_or_else(|_| EnvFilter::new("info"));

    fmt()
        .with_env_filter(filter)
        .json()
        .with_timer(fmt::time::UtcTime::rfc_3339())
        .with_target(true)
        .with_current_span(false)
        .with_span_list(false)
        .with_writer(std::io::stderr) // stdout carries the protocol
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let server_cfg = ServerConfig::from_env();
    init_logging(&server_cfg.log_level);

    let app_cfg =
        AppConfig::load(args.config.as_deref(), args.strict).context("invalid configuration")?;

    tracing::info!(
        event = "server_start",
        config = ?server_cfg,
        llm = ?app_cfg.llm
    );

    let service = querygate_core::bootstrap(&app_cfg)
        .await
        .context("failed to start query service")?;

    Server::run(ToolContext::new(Arc::new(service), server_cfg)).await
}
