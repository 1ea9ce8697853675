use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One result row in transport-neutral form (column name -> JSON value).
pub type Row = serde_json::Map<String, serde_json::Value>;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ResultSet {
    pub columns: Vec<String>,
    pub rows: Vec<Row>,
    pub row_count: usize,
    pub truncated: bool,
    pub elapsed_ms: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvaluationStatus {
    Pending,
    Evaluating,
    Completed,
    Failed,
}

impl EvaluationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EvaluationStatus::Pending => "pending",
            EvaluationStatus::Evaluating => "evaluating",
            EvaluationStatus::Completed => "completed",
            EvaluationStatus::Failed => "failed",
        }
    }

    /// Unknown strings map to `Failed` so a corrupted row is never reported as scored.
    pub fn parse(s: &str) -> Self {
        match s {
            "pending" => EvaluationStatus::Pending,
            "evaluating" => EvaluationStatus::Evaluating,
            "completed" => EvaluationStatus::Completed,
            _ => EvaluationStatus::Failed,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, EvaluationStatus::Completed | EvaluationStatus::Failed)
    }

    pub fn can_transition_to(&self, next: EvaluationStatus) -> bool {
        matches!(
            (self, next),
            (EvaluationStatus::Pending, EvaluationStatus::Evaluating)
                | (EvaluationStatus::Evaluating, EvaluationStatus::Completed)
                | (EvaluationStatus::Evaluating, EvaluationStatus::Failed)
        )
    }
}

impl std::fmt::Display for EvaluationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EvaluationScores {
    pub faithfulness: f64,
    pub answer_relevance: f64,
    pub context_precision: f64,
}

impl EvaluationScores {
    pub fn new(faithfulness: f64, answer_relevance: f64, context_precision: f64) -> Self {
        Self {
            faithfulness,
            answer_relevance,
            context_precision,
        }
    }
}

/// Fields captured synchronously when a query has executed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewQueryRecord {
    pub question: String,
    pub generated_sql: String,
    pub result_count: i64,
    pub execution_time_ms: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryRecord {
    pub id: i64,
    pub question: String,
    pub generated_sql: String,
    pub result_count: i64,
    pub execution_time_ms: i64,
    pub created_at: DateTime<Utc>,
    pub status: EvaluationStatus,
    /// Only ever `Some` when `status == Completed`.
    pub scores: Option<EvaluationScores>,
}

impl QueryRecord {
    /// Builds a record from raw persisted columns, dropping any score columns
    /// that are present on a record that is not `completed`.
    #[allow(clippy::too_many_arguments)]
    pub fn from_parts(
        id: i64,
        question: String,
        generated_sql: String,
        result_count: i64,
        execution_time_ms: i64,
        created_at: DateTime<Utc>,
        status: EvaluationStatus,
        faithfulness: Option<f64>,
        answer_relevance: Option<f64>,
        context_precision: Option<f64>,
    ) -> Self {
        let scores = match (status, faithfulness, answer_relevance, context_precision) {
            (EvaluationStatus::Completed, Some(f), Some(r), Some(p)) => {
                Some(EvaluationScores::new(f, r, p))
            }
            _ => None,
        };
        Self {
            id,
            question,
            generated_sql,
            result_count,
            execution_time_ms,
            created_at,
            status,
            scores,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LlmResponse {
    pub text: String,
    pub provider: String,
    pub model: String,
    #[serde(default)]
    pub meta: serde_json::Value,
}
