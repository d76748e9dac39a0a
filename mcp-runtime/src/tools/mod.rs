use chrono::{Duration, Utc};
use serde_json::Value;
use tokio::task::JoinSet;
use tracing::warn;

use beacon_core::error::FetchError;

use crate::client::ApiClient;

pub mod catalog;
pub mod citations;
pub mod summary;
pub mod visibility;

/// Default trailing window for the score and citation tools.
pub(crate) const DEFAULT_WINDOW_DAYS: i64 = 30;

/// Resolve the requested date range. Either bound missing selects the
/// trailing `window_days` window ending today, matching the upstream
/// dashboard default.
pub(crate) fn resolve_date_range(
    start: Option<String>,
    end: Option<String>,
    window_days: i64,
) -> (String, String) {
    match (start, end) {
        (Some(start), Some(end)) => (start, end),
        _ => {
            let today = Utc::now().date_naive();
            let start = today - Duration::days(window_days);
            (
                start.format("%Y-%m-%d").to_string(),
                today.format("%Y-%m-%d").to_string(),
            )
        }
    }
}

pub(crate) fn aggregated_path(domain_id: &str, topic_id: &str) -> String {
    format!("/domains/{domain_id}/topics/{topic_id}/visibility/aggregated")
}

pub(crate) fn base_query(start_date: &str, end_date: &str) -> Vec<(String, String)> {
    vec![
        ("startDate".to_string(), start_date.to_string()),
        ("endDate".to_string(), end_date.to_string()),
        ("latestOnly".to_string(), "false".to_string()),
        ("page".to_string(), "1".to_string()),
        ("limit".to_string(), "100".to_string()),
    ]
}

/// Model labels reported by the aggregated endpoint.
pub(crate) fn available_models(payload: &Value) -> Vec<String> {
    payload
        .get("availableModels")
        .and_then(Value::as_array)
        .map(|models| {
            models
                .iter()
                .filter_map(Value::as_str)
                .map(str::trim)
                .filter(|model| !model.is_empty())
                .map(ToString::to_string)
                .collect()
        })
        .unwrap_or_default()
}

/// Apply the caller's optional model filter (case-insensitive) to the
/// upstream's available-model list.
pub(crate) fn select_models(available: &[String], filter: Option<&[String]>) -> Vec<String> {
    match filter {
        None => available.to_vec(),
        Some(filter) => available
            .iter()
            .filter(|model| {
                filter
                    .iter()
                    .any(|wanted| wanted.eq_ignore_ascii_case(model))
            })
            .cloned()
            .collect(),
    }
}

/// Fan out one aggregated fetch per model and gather all results.
///
/// Each task writes into its own pre-sized slot, so results come back in
/// model order and a single failure never fails the batch.
pub(crate) async fn fetch_per_model(
    client: &ApiClient,
    path: &str,
    query: &[(String, String)],
    models: &[String],
) -> Vec<(String, Result<Value, FetchError>)> {
    let mut slots: Vec<Option<Result<Value, FetchError>>> = Vec::new();
    slots.resize_with(models.len(), || None);

    let mut tasks = JoinSet::new();
    for (index, model) in models.iter().enumerate() {
        let client = client.clone();
        let path = path.to_string();
        let mut query = query.to_vec();
        query.push(("models".to_string(), model.clone()));
        tasks.spawn(async move { (index, client.get(&path, &query).await) });
    }

    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok((index, result)) => slots[index] = Some(result),
            Err(err) => warn!(error = %err, "model fetch task aborted"),
        }
    }

    models
        .iter()
        .cloned()
        .zip(slots)
        .map(|(model, slot)| {
            let result = slot
                .unwrap_or_else(|| Err(FetchError::Transport("fetch task aborted".to_string())));
            (model, result)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{available_models, base_query, resolve_date_range, select_models};

    #[test]
    fn explicit_bounds_pass_through() {
        let (start, end) = resolve_date_range(
            Some("2026-01-01".to_string()),
            Some("2026-02-01".to_string()),
            30,
        );
        assert_eq!(start, "2026-01-01");
        assert_eq!(end, "2026-02-01");
    }

    #[test]
    fn missing_bound_selects_trailing_window() {
        // A single provided bound is ignored; both default together.
        let (start, end) = resolve_date_range(Some("1999-01-01".to_string()), None, 30);
        assert_ne!(start, "1999-01-01");
        assert_eq!(start.len(), 10);
        assert_eq!(end.len(), 10);
        assert!(start < end);
    }

    #[test]
    fn base_query_pins_paging_and_latest_only() {
        let query = base_query("2026-01-01", "2026-01-31");
        assert!(query.contains(&("latestOnly".to_string(), "false".to_string())));
        assert!(query.contains(&("page".to_string(), "1".to_string())));
        assert!(query.contains(&("limit".to_string(), "100".to_string())));
    }

    #[test]
    fn available_models_skips_blank_entries() {
        let models = available_models(&json!({ "availableModels": ["gpt-4o", " ", "claude"] }));
        assert_eq!(models, vec!["gpt-4o", "claude"]);
    }

    #[test]
    fn select_models_filters_case_insensitively() {
        let available = vec!["gpt-4o".to_string(), "claude".to_string()];
        let selected = select_models(&available, Some(&["GPT-4O".to_string()]));
        assert_eq!(selected, vec!["gpt-4o"]);

        let all = select_models(&available, None);
        assert_eq!(all.len(), 2);
    }
}
