use crate::errors::ConfigError;
use crate::report::ReportConfig;
use crate::validate::ValidationPolicy;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::env;
use std::path::Path;
use std::str::FromStr;

pub const DEFAULT_DATABASE_URL: &str = "querygate.db";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// `postgres://...` selects PostgreSQL; anything else is a SQLite path.
    pub database_url: String,
    pub policy: ValidationPolicy,
    pub execution: ExecutionConfig,
    pub pool: PoolConfig,
    pub evaluation: EvaluationConfig,
    pub llm: LlmConfig,
    pub report: ReportConfig,
    pub log_level: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionConfig {
    /// Per-statement database timeout.
    pub timeout_ms: u64,
    /// Outer deadline for the whole submit pipeline.
    pub request_timeout_ms: u64,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 3_000,
            request_timeout_ms: 10_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Connections kept open.
    pub size: u32,
    /// Extra connections allowed under load.
    pub max_overflow: u32,
    pub acquire_timeout_ms: u64,
    pub max_lifetime_secs: u64,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            size: 5,
            max_overflow: 15,
            acquire_timeout_ms: 30_000,
            max_lifetime_secs: 3_600,
        }
    }
}

impl PoolConfig {
    pub fn max_connections(&self) -> u32 {
        self.size.saturating_add(self.max_overflow).max(1)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EvaluationConfig {
    pub workers: usize,
    pub queue_capacity: usize,
    pub timeout_ms: u64,
}

impl Default for EvaluationConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            queue_capacity: 256,
            timeout_ms: 60_000,
        }
    }
}

#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    pub model: String,
    pub base_url: String,
    pub generation_timeout_ms: u64,
    pub max_attempts: u32,
    pub backoff_ms: Vec<u64>,
    pub max_tokens: u32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: "gpt-4o-mini".to_string(),
            base_url: "https://api.openai.com/v1".to_string(),
            generation_timeout_ms: 5_000,
            max_attempts: 3,
            backoff_ms: vec![1_000, 2_000, 4_000],
            max_tokens: 200,
        }
    }
}

impl std::fmt::Debug for LlmConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmConfig")
            .field("api_key", &self.api_key.as_ref().map(|_| "***"))
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .field("generation_timeout_ms", &self.generation_timeout_ms)
            .field("max_attempts", &self.max_attempts)
            .field("backoff_ms", &self.backoff_ms)
            .field("max_tokens", &self.max_tokens)
            .finish()
    }
}

impl AppConfig {
    pub fn new() -> Self {
        Self {
            database_url: DEFAULT_DATABASE_URL.to_string(),
            log_level: "info".to_string(),
            ..Default::default()
        }
    }

    pub fn from_env() -> Self {
        Self::new().with_overrides(|key| env::var(key).ok())
    }

    /// Defaults, then the YAML file (if any), then environment variables.
    pub fn load(path: Option<&Path>, strict: bool) -> Result<Self, ConfigError> {
        let base = match path {
            Some(p) => load_config(p, strict)?,
            None => Self::new(),
        };
        let cfg = base.with_overrides(|key| env::var(key).ok());
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn is_postgres(&self) -> bool {
        let url = self.database_url.trim();
        url.starts_with("postgres://") || url.starts_with("postgresql://")
    }

    /// Applies overrides from `lookup`, typically the process environment.
    /// Unparseable values are ignored.
    pub fn with_overrides<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("DATABASE_URL") {
            self.database_url = v;
        }
        if let Some(v) = lookup("QUERYGATE_ALLOWED_TABLE") {
            self.policy.allowed_table = v;
        }
        set_parsed(&lookup, "QUERYGATE_MAX_INPUT", &mut self.policy.max_input_chars);
        set_parsed(&lookup, "QUERYGATE_MAX_ROWS", &mut self.policy.max_result_rows);
        set_parsed(&lookup, "QUERYGATE_EXEC_TIMEOUT_MS", &mut self.execution.timeout_ms);
        set_parsed(
            &lookup,
            "QUERYGATE_REQUEST_TIMEOUT_MS",
            &mut self.execution.request_timeout_ms,
        );
        set_parsed(&lookup, "QUERYGATE_POOL_SIZE", &mut self.pool.size);
        set_parsed(&lookup, "QUERYGATE_POOL_MAX_OVERFLOW", &mut self.pool.max_overflow);
        set_parsed(
            &lookup,
            "QUERYGATE_POOL_TIMEOUT_MS",
            &mut self.pool.acquire_timeout_ms,
        );
        set_parsed(&lookup, "QUERYGATE_EVAL_WORKERS", &mut self.evaluation.workers);
        set_parsed(&lookup, "QUERYGATE_EVAL_QUEUE", &mut self.evaluation.queue_capacity);
        set_parsed(&lookup, "QUERYGATE_EVAL_TIMEOUT_MS", &mut self.evaluation.timeout_ms);
        if let Some(v) = lookup("QUERYGATE_REPORT_EXCLUDE_ZERO") {
            if let Some(flag) = parse_flag(&v) {
                self.report.exclude_zero_scores = flag;
            }
        }
        if let Some(v) = lookup("OPENAI_API_KEY") {
            if !v.trim().is_empty() {
                self.llm.api_key = Some(v);
            }
        }
        if let Some(v) = lookup("QUERYGATE_MODEL") {
            self.llm.model = v;
        }
        if let Some(v) = lookup("QUERYGATE_LLM_BASE_URL") {
            self.llm.base_url = v;
        }
        if let Some(v) = lookup("QUERYGATE_LOG") {
            self.log_level = v;
        }
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.database_url.trim().is_empty() {
            return Err(ConfigError("database_url must not be empty".into()));
        }
        if self.policy.normalized_table().is_empty() {
            return Err(ConfigError("policy.allowed_table must not be empty".into()));
        }
        if self.policy.max_input_chars == 0 || self.policy.max_result_rows == 0 {
            return Err(ConfigError(
                "policy.max_input_chars and policy.max_result_rows must be positive".into(),
            ));
        }
        if self.execution.timeout_ms == 0 || self.execution.request_timeout_ms == 0 {
            return Err(ConfigError("execution timeouts must be positive".into()));
        }
        if self.evaluation.workers == 0 || self.evaluation.queue_capacity == 0 {
            return Err(ConfigError(
                "evaluation.workers and evaluation.queue_capacity must be positive".into(),
            ));
        }
        if self.llm.max_attempts == 0 {
            return Err(ConfigError("llm.max_attempts must be at least 1".into()));
        }
        Ok(())
    }
}

fn set_parsed<F, T>(lookup: &F, key: &str, slot: &mut T)
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    if let Some(v) = lookup(key) {
        if let Ok(n) = v.trim().parse() {
            *slot = n;
        }
    }
}

fn parse_flag(v: &str) -> Option<bool> {
    match v.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

pub fn load_config(path: &Path, strict: bool) -> Result<AppConfig, ConfigError> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| ConfigError(format!("failed to read config {}: {}", path.display(), e)))?;

    let mut ignored_keys = BTreeSet::new();
    let deserializer = serde_yaml::Deserializer::from_str(&raw);
    let mut cfg: AppConfig = serde_ignored::deserialize(deserializer, |path| {
        ignored_keys.insert(path.to_string());
    })
    .map_err(|e| ConfigError(format!("failed to parse YAML: {}", e)))?;

    if !ignored_keys.is_empty() {
        if strict {
            return Err(ConfigError(format!(
                "Unknown fields detected in strict mode: {:?} (file: {})",
                ignored_keys,
                path.display()
            )));
        }
        tracing::warn!(event = "config_unknown_keys", keys = ?ignored_keys, file = %path.display());
    }

    if cfg.database_url.trim().is_empty() {
        cfg.database_url = DEFAULT_DATABASE_URL.to_string();
    }
    if cfg.log_level.trim().is_empty() {
        cfg.log_level = "info".to_string();
    }
    Ok(cfg)
}
