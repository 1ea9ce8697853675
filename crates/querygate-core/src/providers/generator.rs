use super::llm::LlmClient;
use super::prompts;
use crate::config::LlmConfig;
use crate::errors::GenerationError;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Natural-language to SQL translation.
#[async_trait]
pub trait SqlGenerator: Send + Sync {
    /// Returns one candidate SQL string. The result is untrusted and must
    /// still go through validation.
    async fn generate(&self, question: &str) -> Result<String, GenerationError>;
}

/// Generator backed by a chat-completion model, with bounded retries for
/// transient failures.
pub struct LlmSqlGenerator {
    client: Arc<dyn LlmClient>,
    system_prompt: String,
    attempt_timeout: Duration,
    max_attempts: u32,
    backoff: Vec<Duration>,
}

impl LlmSqlGenerator {
    pub fn new(client: Arc<dyn LlmClient>, cfg: &LlmConfig, table: &str) -> Self {
        Self {
            client,
            system_prompt: prompts::sql_system_prompt(table),
            attempt_timeout: Duration::from_millis(cfg.generation_timeout_ms),
            max_attempts: cfg.max_attempts.max(1),
            backoff: cfg.backoff_ms.iter().map(|ms| Duration::from_millis(*ms)).collect(),
        }
    }

    fn backoff_for(&self, attempt: u32) -> Duration {
        let idx = (attempt as usize).saturating_sub(1);
        self.backoff
            .get(idx)
            .or_else(|| self.backoff.last())
            .copied()
            .unwrap_or(Duration::ZERO)
    }

    async fn attempt(&self, question: &str, attempt: u32) -> Result<String, GenerationError> {
        let call = self.client.complete(Some(&self.system_prompt), question);
        match tokio::time::timeout(self.attempt_timeout, call).await {
            Err(_) => Err(GenerationError::Timeout { attempts: attempt }),
            Ok(Err(e)) => Err(classify_error(&e, attempt)),
            Ok(Ok(resp)) => parse_sql_reply(&resp.text),
        }
    }
}

#[async_trait]
impl SqlGenerator for LlmSqlGenerator {
    async fn generate(&self, question: &str) -> Result<String, GenerationError> {
        let start = Instant::now();
        let mut attempt = 1;
        loop {
            match self.attempt(question, attempt).await {
                Ok(sql) => {
                    tracing::info!(
                        event = "llm_sql_generated",
                        provider = self.client.provider_name(),
                        sql = %sql,
                        elapsed_ms = start.elapsed().as_millis() as u64,
                        attempt,
                    );
                    return Ok(sql);
                }
                Err(e) if e.is_transient() && attempt < self.max_attempts => {
                    let delay = self.backoff_for(attempt);
                    tracing::warn!(
                        event = "llm_retry",
                        error = %e,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => {
                    tracing::error!(event = "llm_error", error = %e, attempt);
                    return Err(match e {
                        GenerationError::Timeout { .. } => {
                            GenerationError::Timeout { attempts: attempt }
                        }
                        other => other,
                    });
                }
            }
        }
    }
}

/// Stand-in used when no model is configured; every request fails fast.
pub struct UnavailableGenerator {
    reason: String,
}

impl UnavailableGenerator {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

#[async_trait]
impl SqlGenerator for UnavailableGenerator {
    async fn generate(&self, _question: &str) -> Result<String, GenerationError> {
        Err(GenerationError::Unreachable(self.reason.clone()))
    }
}

fn classify_error(e: &anyhow::Error, attempt: u32) -> GenerationError {
    let msg = e.to_string();
    let lower = msg.to_lowercase();
    if lower.contains("rate_limit") || lower.contains("rate limit") || lower.contains("429") {
        return GenerationError::RateLimited(msg);
    }
    if let Some(re) = e.downcast_ref::<reqwest::Error>() {
        if re.is_timeout() {
            return GenerationError::Timeout { attempts: attempt };
        }
        if re.is_connect() || re.is_request() {
            return GenerationError::Unreachable(msg);
        }
    }
    GenerationError::Api(msg)
}

/// Normalises a model reply into bare SQL.
pub fn parse_sql_reply(text: &str) -> Result<String, GenerationError> {
    let mut sql = text.trim();

    if let Some(rest) = sql.strip_prefix("```") {
        let rest = rest.strip_suffix("```").unwrap_or(rest);
        // drop the language tag line (```sql)
        sql = match rest.split_once('\n') {
            Some((tag, body)) if !tag.trim().contains(' ') => body,
            _ => rest,
        }
        .trim();
    }

    if let Some(head) = sql.get(..4) {
        if head.eq_ignore_ascii_case("SQL:") {
            sql = sql[4..].trim();
        }
    }

    if sql.trim_matches('"') == prompts::INVALID_REQUEST {
        return Err(GenerationError::CannotFulfill);
    }
    if sql.is_empty() {
        return Err(GenerationError::Api("model returned an empty completion".into()));
    }
    Ok(sql.to_string())
}
