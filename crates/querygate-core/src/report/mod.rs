//! Read-only rollups over persisted query records.

pub mod buckets;
pub mod console;
pub mod recommend;

pub use buckets::{classify, Bucket};

use crate::model::{EvaluationScores, EvaluationStatus, QueryRecord};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportConfig {
    /// Any dimension below this marks a record as weak.
    pub weak_threshold: f64,
    /// Per-bucket average faithfulness that triggers a bucket suggestion.
    pub bucket_faithfulness_floor: f64,
    /// Share of weak records low in one dimension that triggers its suggestion.
    pub dominance_ratio: f64,
    /// Share of all records being weak that triggers the global suggestion.
    pub weak_share_ratio: f64,
    pub max_weak_records: usize,
    /// Treat scores of exactly 0.0 as unscored.
    pub exclude_zero_scores: bool,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            weak_threshold: 0.7,
            bucket_faithfulness_floor: 0.8,
            dominance_ratio: 0.5,
            weak_share_ratio: 0.3,
            max_weak_records: 10,
            exclude_zero_scores: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    Faithfulness,
    AnswerRelevance,
    ContextPrecision,
}

impl Metric {
    /// Explanation attached to a weak record, by priority.
    pub fn weakness_reason(&self) -> &'static str {
        match self {
            Metric::Faithfulness => {
                "Low faithfulness - SQL may not accurately reflect schema or query intent"
            }
            Metric::AnswerRelevance => {
                "Low answer relevance - results may not align with user's actual question"
            }
            Metric::ContextPrecision => {
                "Low context precision - SQL may select unnecessary fields or lack focus"
            }
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct AverageScores {
    pub faithfulness: f64,
    pub answer_relevance: f64,
    pub context_precision: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BucketStats {
    pub count: usize,
    pub avg_faithfulness: f64,
    pub avg_answer_relevance: f64,
    pub avg_context_precision: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatusCounts {
    pub pending: usize,
    pub evaluating: usize,
    pub completed: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WeakRecord {
    pub id: i64,
    pub query: String,
    pub sql: String,
    pub scores: EvaluationScores,
    pub created_at: DateTime<Utc>,
    pub reason: String,
    /// Dimensions below the threshold, in priority order.
    pub low_metrics: Vec<Metric>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalysisReport {
    pub total_queries: usize,
    pub status_counts: StatusCounts,
    pub average_scores: AverageScores,
    pub query_type_analysis: BTreeMap<Bucket, BucketStats>,
    pub weak_queries: Vec<WeakRecord>,
    pub recommendations: Vec<String>,
}

/// Running mean that skips unscored values.
#[derive(Default)]
struct Mean {
    sum: f64,
    n: usize,
}

impl Mean {
    fn add(&mut self, v: Option<f64>) {
        if let Some(v) = v {
            self.sum += v;
            self.n += 1;
        }
    }

    fn get(&self, decimals: i32) -> f64 {
        if self.n == 0 {
            return 0.0;
        }
        round_to(self.sum / self.n as f64, decimals)
    }
}

#[derive(Default)]
struct Triple {
    faithfulness: Mean,
    answer_relevance: Mean,
    context_precision: Mean,
    count: usize,
}

impl Triple {
    fn add(&mut self, s: &EvaluationScores, cfg: &ReportConfig) {
        self.faithfulness.add(effective(s.faithfulness, cfg));
        self.answer_relevance.add(effective(s.answer_relevance, cfg));
        self.context_precision.add(effective(s.context_precision, cfg));
        self.count += 1;
    }
}

fn round_to(v: f64, decimals: i32) -> f64 {
    let f = 10f64.powi(decimals);
    (v * f).round() / f
}

fn effective(v: f64, cfg: &ReportConfig) -> Option<f64> {
    if cfg.exclude_zero_scores && v == 0.0 {
        None
    } else {
        Some(v)
    }
}

fn low_metrics(s: &EvaluationScores, cfg: &ReportConfig) -> Vec<Metric> {
    [
        (Metric::Faithfulness, s.faithfulness),
        (Metric::AnswerRelevance, s.answer_relevance),
        (Metric::ContextPrecision, s.context_precision),
    ]
    .into_iter()
    .filter(|(_, v)| effective(*v, cfg).is_some_and(|v| v < cfg.weak_threshold))
    .map(|(m, _)| m)
    .collect()
}

/// Builds the analysis report. Only `completed` records carry scores; the
/// rest count towards totals and status counts only.
pub fn analyze(records: &[QueryRecord], cfg: &ReportConfig) -> AnalysisReport {
    let mut ordered: Vec<&QueryRecord> = records.iter().collect();
    ordered.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));

    let mut status_counts = StatusCounts::default();
    let mut overall = Triple::default();
    let mut per_bucket: BTreeMap<Bucket, Triple> = BTreeMap::new();
    let mut weak = Vec::new();

    for rec in &ordered {
        match rec.status {
            EvaluationStatus::Pending => status_counts.pending += 1,
            EvaluationStatus::Evaluating => status_counts.evaluating += 1,
            EvaluationStatus::Completed => status_counts.completed += 1,
            EvaluationStatus::Failed => status_counts.failed += 1,
        }
        let Some(scores) = rec.scores.as_ref() else {
            continue;
        };

        overall.add(scores, cfg);
        if !rec.generated_sql.trim().is_empty() {
            per_bucket
                .entry(classify(&rec.generated_sql))
                .or_default()
                .add(scores, cfg);
        }

        let low = low_metrics(scores, cfg);
        if let Some(first) = low.first() {
            weak.push(WeakRecord {
                id: rec.id,
                query: rec.question.clone(),
                sql: rec.generated_sql.clone(),
                scores: *scores,
                created_at: rec.created_at,
                reason: first.weakness_reason().to_string(),
                low_metrics: low,
            });
        }
    }

    let query_type_analysis: BTreeMap<Bucket, BucketStats> = per_bucket
        .into_iter()
        .filter(|(_, t)| t.faithfulness.n > 0)
        .map(|(bucket, t)| {
            (
                bucket,
                BucketStats {
                    count: t.count,
                    avg_faithfulness: t.faithfulness.get(3),
                    avg_answer_relevance: t.answer_relevance.get(3),
                    avg_context_precision: t.context_precision.get(3),
                },
            )
        })
        .collect();

    let recommendations = recommend::recommend(
        &recommend::RecommendationInput {
            total: records.len(),
            weak: &weak,
            buckets: &query_type_analysis,
        },
        cfg,
    );

    let average_scores = AverageScores {
        faithfulness: overall.faithfulness.get(2),
        answer_relevance: overall.answer_relevance.get(2),
        context_precision: overall.context_precision.get(2),
    };

    tracing::info!(
        event = "analysis_report_generated",
        total_queries = records.len(),
        weak_queries = weak.len(),
        avg_faithfulness = average_scores.faithfulness,
    );

    weak.truncate(cfg.max_weak_records);
    AnalysisReport {
        total_queries: records.len(),
        status_counts,
        average_scores,
        query_type_analysis,
        weak_queries: weak,
        recommendations,
    }
}
