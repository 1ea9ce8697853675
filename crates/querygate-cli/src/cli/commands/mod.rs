use super::args::*;
use anyhow::Context;
use querygate_core::config::AppConfig;
use querygate_core::errors::LifecycleError;
use querygate_core::QueryService;
use std::path::Path;
use tracing_subscriber::{fmt, EnvFilter};

pub mod health;
pub mod query;
pub mod report;
pub mod validate;

pub mod exit_codes {
    pub const OK: i32 = 0;
    pub const QUERY_FAILED: i32 = 1;
    pub const CONFIG_ERROR: i32 = 2;
}

pub async fn dispatch(cli: Cli) -> anyhow::Result<i32> {
    init_logging();

    if let Command::Version = cli.cmd {
        println!("{}", env!("CARGO_PKG_VERSION"));
        return Ok(exit_codes::OK);
    }

    let cfg = match AppConfig::load(cli.config.as_deref(), cli.strict) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("config error: {e}");
            return Ok(exit_codes::CONFIG_ERROR);
        }
    };
    tracing::debug!(
        event = "config_loaded",
        backend = if cfg.is_postgres() { "postgres" } else { "sqlite" },
        llm = ?cfg.llm
    );

    match cli.cmd {
        Command::Query(args) => query::run(args, &cfg).await,
        Command::Validate(args) => validate::run(args, &cfg),
        Command::Sanitize(args) => cmd_sanitize(args, &cfg),
        Command::Status(args) => cmd_status(args, &cfg).await,
        Command::Report(args) => report::run(args, &cfg).await,
        Command::Health(args) => health::run(args, &cfg).await,
        Command::Seed => cmd_seed(&cfg),
        Command::Version => Ok(exit_codes::OK),
    }
}

/// JSON logs on stderr. Quieter than the server by default so command output
/// stays readable; `QUERYGATE_LOG` overrides.
fn init_logging() {
    let level = std::env::var("QUERYGATE_LOG").unwrap_or_else(|_| "warn".to_string());
    let filter = EnvFilter::try_new(&level).unwrap_or_else(|_| EnvFilter::new("warn"));

    let _ = fmt()
        .with_env_filter(filter)
        .json()
        .with_timer(fmt::time::UtcTime::rfc_3339())
        .with_target(true)
        .with_current_span(false)
        .with_span_list(false)
        .with_writer(std::io::stderr)
        .try_init();
}

pub(crate) async fn open_service(cfg: &AppConfig) -> anyhow::Result<QueryService> {
    querygate_core::bootstrap(cfg)
        .await
        .with_context(|| format!("failed to open database {}", redact_url(&cfg.database_url)))
}

/// Drops the password from a connection URL before it reaches a message.
fn redact_url(url: &str) -> String {
    match (url.find("://"), url.rfind('@')) {
        (Some(scheme), Some(at)) if at > scheme => {
            let creds = &url[scheme + 3..at];
            match creds.find(':') {
                Some(colon) => format!(
                    "{}{}:***{}",
                    &url[..scheme + 3],
                    &creds[..colon],
                    &url[at..]
                ),
                None => url.to_string(),
            }
        }
        _ => url.to_string(),
    }
}

fn cmd_sanitize(args: SanitizeArgs, cfg: &AppConfig) -> anyhow::Result<i32> {
    match querygate_core::sanitize::sanitize(&args.text, &cfg.policy) {
        Ok(clean) => {
            println!("{clean}");
            Ok(exit_codes::OK)
        }
        Err(e) => {
            eprintln!("rejected [{}]: {}", e.kind(), e);
            Ok(exit_codes::QUERY_FAILED)
        }
    }
}

async fn cmd_status(args: StatusArgs, cfg: &AppConfig) -> anyhow::Result<i32> {
    let service = open_service(cfg).await?;
    let res = service.evaluation_status(args.id).await;
    service.shutdown().await;

    match res {
        Ok(view) => {
            println!("{}", serde_json::to_string_pretty(&view)?);
            Ok(exit_codes::OK)
        }
        Err(LifecycleError::NotFound(id)) => {
            eprintln!("no query record with id {id}");
            Ok(exit_codes::QUERY_FAILED)
        }
        Err(e) => Err(e.into()),
    }
}

fn cmd_seed(cfg: &AppConfig) -> anyhow::Result<i32> {
    if cfg.is_postgres() {
        eprintln!("config error: seed only targets SQLite databases");
        return Ok(exit_codes::CONFIG_ERROR);
    }
    let path = Path::new(&cfg.database_url);
    ensure_parent_dir(path)?;
    let inserted = querygate_core::storage::seed::seed_employees_at(path)?;
    if inserted == 0 {
        eprintln!("note: {} already has employee rows (skipped)", path.display());
    } else {
        eprintln!("seeded {} employees into {}", inserted, path.display());
    }
    Ok(exit_codes::OK)
}

fn ensure_parent_dir(path: &Path) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}
