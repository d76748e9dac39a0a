use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::dataset::{coerce_score, round2};

/// Raw report scores collected for one topic, ready for monthly bucketing.
#[derive(Debug, Clone, PartialEq)]
pub struct TopicReports {
    pub domain_name: String,
    pub topic_name: String,
    /// `(ISO date, score)` pairs in upstream order.
    pub scores: Vec<(String, f64)>,
}

/// One monthly average for one topic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MonthlyRow {
    /// `YYYY-MM` bucket.
    pub month: String,
    pub domain_name: String,
    pub topic_name: String,
    pub average_score: f64,
    pub report_count: usize,
}

/// Extract `(date, score)` pairs from a raw visibility-report payload.
/// The report list lives at the payload root or under `reports`/`data`;
/// entries without a date are dropped, non-numeric scores coerce to 0.
pub fn parse_report_scores(payload: &Value) -> Vec<(String, f64)> {
    let entries = payload
        .as_array()
        .or_else(|| payload.get("reports").and_then(Value::as_array))
        .or_else(|| payload.get("data").and_then(Value::as_array));
    let Some(entries) = entries else {
        return Vec::new();
    };

    entries
        .iter()
        .filter_map(|entry| {
            let date = entry
                .get("date")
                .or_else(|| entry.get("createdAt"))
                .and_then(Value::as_str)?;
            // Timestamps truncate to their date part.
            let date: String = date.chars().take(10).collect();
            if date.len() < 7 {
                return None;
            }
            let score = coerce_score(
                entry
                    .get("score")
                    .or_else(|| entry.get("brandScore"))
                    .or_else(|| entry.get("visibilityScore")),
            );
            Some((date, score))
        })
        .collect()
}

/// Bucket per-topic report scores by calendar month and average them.
/// Rows come back sorted by (month, domain, topic).
pub fn monthly_rollup(topics: &[TopicReports]) -> Vec<MonthlyRow> {
    use std::collections::BTreeMap;

    let mut buckets: BTreeMap<(String, String, String), (f64, usize)> = BTreeMap::new();
    for topic in topics {
        for (date, score) in &topic.scores {
            let month: String = date.chars().take(7).collect();
            let bucket = buckets
                .entry((month, topic.domain_name.clone(), topic.topic_name.clone()))
                .or_insert((0.0, 0));
            bucket.0 += score;
            bucket.1 += 1;
        }
    }

    buckets
        .into_iter()
        .map(|((month, domain_name, topic_name), (sum, count))| MonthlyRow {
            month,
            domain_name,
            topic_name,
            average_score: round2(sum / count as f64),
            report_count: count,
        })
        .collect()
}

/// Markdown rendering of a monthly rollup, one row per (month, topic).
pub fn render_monthly_markdown(rows: &[MonthlyRow]) -> String {
    let mut out = String::from("| Month | Domain | Topic | Average | Reports |\n");
    out.push_str("| --- | --- | --- | --- | --- |\n");
    for row in rows {
        out.push_str(&format!(
            "| {} | {} | {} | {:.2}% | {} |\n",
            row.month, row.domain_name, row.topic_name, row.average_score, row.report_count
        ));
    }
    out
}
