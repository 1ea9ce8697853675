use super::{BucketStats, Metric, ReportConfig, WeakRecord};
use super::buckets::Bucket;
use std::collections::BTreeMap;

pub const NO_DATA: &str = "No queries executed yet. Run some queries to generate recommendations.";
pub const ALL_GOOD: &str = "✅ All queries performing well (scores ≥ 0.7). Continue monitoring.";
pub const FALLBACK: &str = "Review weak queries manually to identify improvement opportunities";

const SALARY_TERMS: &[&str] = &["salary", "pay", "compensation"];
const SHORT_QUERY_WORDS: usize = 5;

/// Input to the rule set. `weak` holds every weak record, not just the ones
/// shown in the report.
pub struct RecommendationInput<'a> {
    pub total: usize,
    pub weak: &'a [WeakRecord],
    pub buckets: &'a BTreeMap<Bucket, BucketStats>,
}

pub fn recommend(input: &RecommendationInput<'_>, cfg: &ReportConfig) -> Vec<String> {
    if input.total == 0 {
        return vec![NO_DATA.to_string()];
    }
    if input.weak.is_empty() {
        return vec![ALL_GOOD.to_string()];
    }

    let mut out = Vec::new();

    for (bucket, stats) in input.buckets {
        if stats.avg_faithfulness >= cfg.bucket_faithfulness_floor {
            continue;
        }
        let advice = match bucket {
            Bucket::Aggregation => (
                "Aggregation",
                "Add more aggregation query examples (DISTINCT, GROUP BY, COUNT) to LLM prompt.",
            ),
            Bucket::Join => ("JOIN", "Add manager relationship JOIN examples to LLM prompt."),
            Bucket::DateRange => (
                "Date range",
                "Standardize INTERVAL syntax in LLM prompt examples.",
            ),
            Bucket::WhereFilter | Bucket::Simple => continue,
        };
        out.push(format!(
            "⚠️ {} queries show low faithfulness ({:.2}). {}",
            advice.0, stats.avg_faithfulness, advice.1
        ));
    }

    let texts: Vec<String> = input.weak.iter().map(|w| w.query.to_lowercase()).collect();
    if texts
        .iter()
        .any(|t| SALARY_TERMS.iter().any(|term| t.contains(term)))
    {
        out.push(
            "Add few-shot examples for salary comparisons in LLM prompt (e.g., 'high earner' → salary_usd > 80000)"
                .to_string(),
        );
    }
    if texts
        .iter()
        .any(|t| t.split_whitespace().count() < SHORT_QUERY_WORDS)
    {
        out.push(
            "Provide user guidance for more specific queries (e.g., 'show employees' → 'show all active employees in engineering')"
                .to_string(),
        );
    }

    let weak_total = input.weak.len() as f64;
    let dominant = |count: usize| count as f64 > weak_total * cfg.dominance_ratio;
    let low_in = |metric: Metric| input.weak.iter().filter(|w| w.low_metrics.contains(&metric)).count();

    if dominant(low_in(Metric::Faithfulness)) {
        out.push("Include database schema details in prompt context to improve SQL faithfulness".to_string());
    }
    if dominant(low_in(Metric::ContextPrecision)) {
        out.push("Refine LLM prompt to encourage selecting only necessary columns (avoid SELECT *)".to_string());
    }
    if dominant(low_in(Metric::AnswerRelevance)) {
        out.push("Add semantic validation step to ensure SQL intent matches natural language query".to_string());
    }

    if weak_total > input.total as f64 * cfg.weak_share_ratio {
        out.push("Consider A/B testing alternative LLM prompts to improve overall query quality".to_string());
    }

    if out.is_empty() {
        out.push(FALLBACK.to_string());
    }
    out
}
