use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One ranked citation source (domain or URL) for one model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CitationRow {
    pub model_label: String,
    /// 1-based position within this model's list, renumbered locally so
    /// each model ranks independently of the others.
    pub rank: usize,
    pub source: String,
    pub citation_count: u64,
}

/// One over-time data point, tagged with the model it belongs to. The point
/// itself is passed through untouched; its shape is owned by the upstream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeriesPoint {
    pub model_label: String,
    pub point: Value,
}

/// The upstream's per-model aggregate metrics block, passed through.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelMetrics {
    pub model_label: String,
    pub metrics: Value,
}

/// Flattened citation data across models: each sequence lists the GLOBAL
/// response's entries first, then one run of entries per model, in the
/// order the responses were supplied.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CitationReport {
    pub top_domains: Vec<CitationRow>,
    pub top_urls: Vec<CitationRow>,
    pub domains_over_time: Vec<SeriesPoint>,
    pub urls_over_time: Vec<SeriesPoint>,
    pub global_metrics: Vec<ModelMetrics>,
}

/// Flatten detail-enabled visibility responses into one citation report.
/// Callers supply `(model_label, payload)` pairs with the GLOBAL response
/// first; list order within each payload is preserved as the upstream
/// already ranks it.
pub fn aggregate_citations(responses: &[(String, Value)]) -> CitationReport {
    let mut report = CitationReport::default();

    for (model_label, payload) in responses {
        report.top_domains.extend(ranked_rows(
            model_label,
            section(payload, "topDomains"),
            &["domain", "name"],
        ));
        report.top_urls.extend(ranked_rows(
            model_label,
            section(payload, "topUrls"),
            &["url"],
        ));
        report.domains_over_time.extend(tagged_points(
            model_label,
            section(payload, "domainsOverTime"),
        ));
        report
            .urls_over_time
            .extend(tagged_points(model_label, section(payload, "urlsOverTime")));
        if let Some(metrics) = section(payload, "globalMetrics") {
            report.global_metrics.push(ModelMetrics {
                model_label: model_label.clone(),
                metrics: metrics.clone(),
            });
        }
    }

    report
}

/// Detail sections appear at the payload root or nested under
/// `detailedResults`, depending on the upstream endpoint version.
fn section<'a>(payload: &'a Value, key: &str) -> Option<&'a Value> {
    payload
        .get(key)
        .or_else(|| payload.get("detailedResults")?.get(key))
}

fn ranked_rows(model_label: &str, list: Option<&Value>, source_keys: &[&str]) -> Vec<CitationRow> {
    let Some(entries) = list.and_then(Value::as_array) else {
        return Vec::new();
    };

    let mut rows = Vec::with_capacity(entries.len());
    for entry in entries {
        let Some(source) = source_keys
            .iter()
            .find_map(|key| entry.get(*key))
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|source| !source.is_empty())
        else {
            continue;
        };
        let citation_count = entry
            .get("count")
            .or_else(|| entry.get("citationCount"))
            .and_then(|count| {
                count
                    .as_u64()
                    .or_else(|| count.as_f64().map(|count| count.max(0.0) as u64))
            })
            .unwrap_or(0);
        rows.push(CitationRow {
            model_label: model_label.to_string(),
            rank: rows.len() + 1,
            source: source.to_string(),
            citation_count,
        });
    }
    rows
}

fn tagged_points(model_label: &str, list: Option<&Value>) -> Vec<SeriesPoint> {
    let Some(entries) = list.and_then(Value::as_array) else {
        return Vec::new();
    };
    entries
        .iter()
        .map(|point| SeriesPoint {
            model_label: model_label.to_string(),
            point: point.clone(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::aggregate_citations;

    fn responses() -> Vec<(String, serde_json::Value)> {
        vec![
            (
                "GLOBAL".to_string(),
                json!({
                    "topDomains": [
                        { "domain": "wikipedia.org", "count": 42 },
                        { "domain": "reddit.com", "count": 17 }
                    ],
                    "topUrls": [
                        { "url": "https://wikipedia.org/wiki/Acme", "count": 12 }
                    ],
                    "domainsOverTime": [
                        { "date": "2026-01-01", "domains": { "wikipedia.org": 4 } }
                    ],
                    "globalMetrics": { "totalCitations": 59 }
                }),
            ),
            (
                "gpt-4o".to_string(),
                json!({
                    "detailedResults": {
                        "topDomains": [
                            { "domain": "reddit.com", "count": 9 }
                        ]
                    }
                }),
            ),
        ]
    }

    #[test]
    fn global_entries_come_first_in_upstream_order() {
        let report = aggregate_citations(&responses());
        assert_eq!(report.top_domains.len(), 3);
        assert_eq!(report.top_domains[0].model_label, "GLOBAL");
        assert_eq!(report.top_domains[0].source, "wikipedia.org");
        assert_eq!(report.top_domains[1].source, "reddit.com");
        assert_eq!(report.top_domains[2].model_label, "gpt-4o");
    }

    #[test]
    fn rank_is_renumbered_per_model() {
        let report = aggregate_citations(&responses());
        assert_eq!(report.top_domains[0].rank, 1);
        assert_eq!(report.top_domains[1].rank, 2);
        // The per-model list restarts at 1 regardless of GLOBAL's length.
        assert_eq!(report.top_domains[2].rank, 1);
    }

    #[test]
    fn sections_resolve_from_root_or_detailed_results() {
        let report = aggregate_citations(&responses());
        assert_eq!(report.top_urls.len(), 1);
        assert_eq!(report.domains_over_time.len(), 1);
        assert_eq!(report.global_metrics.len(), 1);
        assert_eq!(report.global_metrics[0].metrics["totalCitations"], 59);
    }

    #[test]
    fn entries_without_source_are_skipped_without_gaps_in_rank() {
        let report = aggregate_citations(&[(
            "GLOBAL".to_string(),
            json!({
                "topDomains": [
                    { "count": 4 },
                    { "domain": "example.org", "citationCount": 2 }
                ]
            }),
        )]);
        assert_eq!(report.top_domains.len(), 1);
        assert_eq!(report.top_domains[0].rank, 1);
        assert_eq!(report.top_domains[0].citation_count, 2);
    }
}
