use super::llm::LlmClient;
use super::prompts;
use crate::model::{EvaluationScores, Row};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

/// Rows shown to the judge; keeps prompts within token limits.
pub const JUDGE_SAMPLE_ROWS: usize = 5;

/// Quality scoring of an executed query.
#[async_trait]
pub trait Scorer: Send + Sync {
    /// `Ok(None)` means scoring is unavailable; the record is marked failed.
    async fn score(
        &self,
        question: &str,
        sql: &str,
        rows: &[Row],
    ) -> anyhow::Result<Option<EvaluationScores>>;

    fn name(&self) -> &'static str;
}

/// LLM-as-judge over the question, SQL and a sample of result rows.
pub struct JudgeScorer {
    client: Arc<dyn LlmClient>,
}

impl JudgeScorer {
    pub fn new(client: Arc<dyn LlmClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Scorer for JudgeScorer {
    async fn score(
        &self,
        question: &str,
        sql: &str,
        rows: &[Row],
    ) -> anyhow::Result<Option<EvaluationScores>> {
        let answer = render_answer(rows);
        let prompt = prompts::judge_prompt(question, sql, &answer);
        let resp = self
            .client
            .complete(Some(prompts::JUDGE_SYSTEM_PROMPT), &prompt)
            .await?;
        let scores = parse_judge_reply(&resp.text)?;
        tracing::info!(
            event = "judge_scores",
            faithfulness = scores.faithfulness,
            answer_relevance = scores.answer_relevance,
            context_precision = scores.context_precision,
        );
        Ok(Some(scores))
    }

    fn name(&self) -> &'static str {
        "judge"
    }
}

/// Scorer used when no judge model is configured.
pub struct DisabledScorer;

#[async_trait]
impl Scorer for DisabledScorer {
    async fn score(
        &self,
        _question: &str,
        _sql: &str,
        _rows: &[Row],
    ) -> anyhow::Result<Option<EvaluationScores>> {
        tracing::debug!(event = "scoring_skipped", reason = "scorer disabled");
        Ok(None)
    }

    fn name(&self) -> &'static str {
        "disabled"
    }
}

/// Result rows as plain statements ("Record 1: first_name: Ada, ...").
fn render_answer(rows: &[Row]) -> String {
    if rows.is_empty() {
        return "No results returned from the database.".to_string();
    }
    rows.iter()
        .take(JUDGE_SAMPLE_ROWS)
        .enumerate()
        .map(|(i, row)| {
            let parts: Vec<String> = row
                .iter()
                .map(|(k, v)| match v {
                    Value::String(s) => format!("{k}: {s}"),
                    other => format!("{k}: {other}"),
                })
                .collect();
            format!("Record {}: {}", i + 1, parts.join(", "))
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn parse_judge_reply(text: &str) -> anyhow::Result<EvaluationScores> {
    let start = text
        .find('{')
        .ok_or_else(|| anyhow::anyhow!("judge reply has no JSON object"))?;
    let end = text
        .rfind('}')
        .filter(|end| *end > start)
        .ok_or_else(|| anyhow::anyhow!("judge reply has no JSON object"))?;
    let obj: Value = serde_json::from_str(&text[start..=end])?;

    Ok(EvaluationScores::new(
        read_score(&obj, "faithfulness")?,
        read_score(&obj, "answer_relevance")?,
        read_score(&obj, "context_precision")?,
    ))
}

fn read_score(obj: &Value, metric: &str) -> anyhow::Result<f64> {
    let raw = obj
        .get(metric)
        .ok_or_else(|| anyhow::anyhow!("judge reply missing '{}'", metric))?;
    let value = match raw {
        Value::Number(n) => n.as_f64().unwrap_or(f64::NAN),
        Value::String(s) => s
            .trim()
            .parse::<f64>()
            .map_err(|e| anyhow::anyhow!("judge score '{}' is not a number: {}", metric, e))?,
        Value::Null => f64::NAN,
        other => anyhow::bail!("judge score '{}' has unexpected type: {}", metric, other),
    };
    Ok(sanitize_score(metric, value))
}

/// NaN and infinities become 0.0 (logged); everything else is clamped into [0, 1].
pub fn sanitize_score(metric: &str, value: f64) -> f64 {
    if value.is_nan() {
        tracing::warn!(event = "score_nan", metric, "metric returned NaN");
        return 0.0;
    }
    if value.is_infinite() {
        tracing::warn!(event = "score_inf", metric, "metric returned Inf");
        return 0.0;
    }
    value.clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::llm::FakeClient;
    use serde_json::json;

    fn row(pairs: &[(&str, Value)]) -> Row {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_sanitize_score() {
        assert_eq!(sanitize_score("f", f64::NAN), 0.0);
        assert_eq!(sanitize_score("f", f64::INFINITY), 0.0);
        assert_eq!(sanitize_score("f", f64::NEG_INFINITY), 0.0);
        assert_eq!(sanitize_score("f", 1.7), 1.0);
        assert_eq!(sanitize_score("f", -0.2), 0.0);
        assert_eq!(sanitize_score("f", 0.42), 0.42);
    }

    #[test]
    fn test_parse_reply_with_surrounding_text() {
        let s = parse_judge_reply(
            "Here you go:\n{\"faithfulness\": 0.9, \"answer_relevance\": \"0.8\", \"context_precision\": \"NaN\"}",
        )
        .unwrap();
        assert_eq!(s, EvaluationScores::new(0.9, 0.8, 0.0));
    }

    #[test]
    fn test_parse_reply_rejects_garbage() {
        assert!(parse_judge_reply("I think it is fine").is_err());
        assert!(parse_judge_reply("{\"faithfulness\": 0.9}").is_err());
        assert!(parse_judge_reply("{\"faithfulness\": [1], \"answer_relevance\": 1, \"context_precision\": 1}").is_err());
    }

    #[test]
    fn test_render_answer_samples_first_rows() {
        let rows: Vec<Row> = (0..8)
            .map(|i| row(&[("employee_id", json!(i)), ("first_name", json!("Ada"))]))
            .collect();
        let answer = render_answer(&rows);
        assert!(answer.starts_with("Record 1: employee_id: 0, first_name: Ada"));
        assert!(answer.contains("Record 5:"));
        assert!(!answer.contains("Record 6:"));
        assert_eq!(render_answer(&[]), "No results returned from the database.");
    }

    #[tokio::test]
    async fn test_judge_scorer_end_to_end() -> anyhow::Result<()> {
        let client = Arc::new(FakeClient::new(
            r#"{"faithfulness": 0.95, "answer_relevance": 0.6, "context_precision": 0.7}"#,
        ));
        let scorer = JudgeScorer::new(client);
        let scores = scorer
            .score("who is on leave?", "SELECT * FROM employees", &[])
            .await?;
        assert_eq!(scores, Some(EvaluationScores::new(0.95, 0.6, 0.7)));
        Ok(())
    }

    #[tokio::test]
    async fn test_disabled_scorer_is_unavailable() -> anyhow::Result<()> {
        assert_eq!(DisabledScorer.score("q", "SELECT 1", &[]).await?, None);
        Ok(())
    }
}
