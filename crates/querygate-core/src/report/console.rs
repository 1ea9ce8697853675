use super::AnalysisReport;
use std::fmt::Write;

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() > max {
        let cut: String = s.chars().take(max).collect();
        format!("{}...", cut)
    } else {
        s.to_string()
    }
}

/// Human-readable summary of an analysis report.
pub fn render(report: &AnalysisReport) -> String {
    let mut out = String::new();
    let c = &report.status_counts;

    let _ = writeln!(out, "Query analysis ({} queries)", report.total_queries);
    let _ = writeln!(
        out,
        "  status: {} completed, {} pending, {} evaluating, {} failed",
        c.completed, c.pending, c.evaluating, c.failed
    );

    let avg = &report.average_scores;
    let _ = writeln!(out, "\nAverage scores");
    let _ = writeln!(out, "  faithfulness       {:.2}", avg.faithfulness);
    let _ = writeln!(out, "  answer relevance   {:.2}", avg.answer_relevance);
    let _ = writeln!(out, "  context precision  {:.2}", avg.context_precision);

    if !report.query_type_analysis.is_empty() {
        let _ = writeln!(out, "\nBy query type");
        let _ = writeln!(
            out,
            "  {:<14} {:>5} {:>7} {:>7} {:>7}",
            "type", "n", "faith", "relev", "prec"
        );
        for (bucket, s) in &report.query_type_analysis {
            let _ = writeln!(
                out,
                "  {:<14} {:>5} {:>7.3} {:>7.3} {:>7.3}",
                bucket.as_str(),
                s.count,
                s.avg_faithfulness,
                s.avg_answer_relevance,
                s.avg_context_precision
            );
        }
    }

    if !report.weak_queries.is_empty() {
        let _ = writeln!(out, "\nWeak queries");
        for w in &report.weak_queries {
            let _ = writeln!(
                out,
                "  ⚠️  #{} \"{}\" ({:.2}/{:.2}/{:.2})",
                w.id,
                truncate(&w.query, 60),
                w.scores.faithfulness,
                w.scores.answer_relevance,
                w.scores.context_precision
            );
            let _ = writeln!(out, "      {}", w.reason);
            let _ = writeln!(out, "      SQL: {}", truncate(&w.sql, 80));
        }
    }

    let _ = writeln!(out, "\nRecommendations");
    for r in &report.recommendations {
        let _ = writeln!(out, "  - {}", r);
    }
    out
}
