use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "querygate",
    version,
    about = "Natural-language queries behind a read-only SQL gate"
)]
pub struct Cli {
    /// YAML config file; environment variables override it.
    #[arg(long, global = true, env = "QUERYGATE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Reject unknown keys in the config file.
    #[arg(long, global = true)]
    pub strict: bool,

    #[command(subcommand)]
    pub cmd: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run a natural-language query end to end
    Query(QueryArgs),
    /// Check a SQL statement against the validation policy
    Validate(ValidateArgs),
    /// Show how a question is cleaned before generation
    Sanitize(SanitizeArgs),
    /// Look up the evaluation state of a logged query
    Status(StatusArgs),
    /// Summarise evaluation scores across the query history
    Report(ReportArgs),
    /// Check database connectivity
    Health(HealthArgs),
    /// Create and fill the demo employees table (SQLite only)
    Seed,
    Version,
}

#[derive(clap::Args, Debug, Clone)]
pub struct QueryArgs {
    /// The question, in plain language
    pub text: String,

    /// Wait for the background evaluation and print its outcome
    #[arg(long)]
    pub wait: bool,

    #[arg(long, default_value = "json")]
    pub format: String, // text|json
}

#[derive(clap::Args, Debug, Clone)]
pub struct ValidateArgs {
    pub sql: String,

    #[arg(long, default_value = "text")]
    pub format: String, // text|json
}

#[derive(clap::Args, Debug, Clone)]
pub struct SanitizeArgs {
    pub text: String,
}

#[derive(clap::Args, Debug, Clone)]
pub struct StatusArgs {
    /// Record id returned as `query_log_id`
    pub id: i64,
}

#[derive(clap::Args, Debug, Clone)]
pub struct ReportArgs {
    #[arg(long, default_value = "text")]
    pub format: String, // text|json

    /// Write the report here instead of stdout
    #[arg(long)]
    pub out: Option<PathBuf>,
}

#[derive(clap::Args, Debug, Clone)]
pub struct HealthArgs {
    #[arg(long, default_value = "json")]
    pub format: String, // text|json
}
