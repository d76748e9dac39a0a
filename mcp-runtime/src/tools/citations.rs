use serde_json::{Value, json};
use tracing::warn;

use beacon_core::citations::aggregate_citations;
use beacon_core::dataset::GLOBAL_MODEL_LABEL;

use crate::ToolError;
use crate::client::ApiClient;
use crate::tools::{
    DEFAULT_WINDOW_DAYS, aggregated_path, available_models, base_query, fetch_per_model,
    resolve_date_range, select_models,
};

/// Validated arguments for `beacon_get_citations`.
#[derive(Debug, Clone, PartialEq)]
pub struct CitationsRequest {
    pub domain_id: String,
    pub topic_id: String,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub models: Option<Vec<String>>,
}

pub async fn run(client: &ApiClient, request: CitationsRequest) -> Result<Value, ToolError> {
    let (start_date, end_date) =
        resolve_date_range(request.start_date, request.end_date, DEFAULT_WINDOW_DAYS);
    let path = aggregated_path(&request.domain_id, &request.topic_id);
    let mut query = base_query(&start_date, &end_date);
    query.push(("includeDetailedResults".to_string(), "true".to_string()));

    let global = client.get(&path, &query).await?;
    let selected = select_models(&available_models(&global), request.models.as_deref());
    let fetched = fetch_per_model(client, &path, &query, &selected).await;

    // GLOBAL first, then the per-model responses that succeeded, in the
    // order they were requested.
    let mut responses = vec![(GLOBAL_MODEL_LABEL.to_string(), global)];
    let mut model_outcomes = Vec::with_capacity(fetched.len());
    for (model, result) in fetched {
        match result {
            Ok(payload) => {
                model_outcomes.push(json!({ "model": model, "ok": true }));
                responses.push((model, payload));
            }
            Err(err) => {
                warn!(model = %model, error = %err, "skipping model: citations fetch failed");
                model_outcomes.push(json!({
                    "model": model,
                    "ok": false,
                    "reason": err.to_string(),
                }));
            }
        }
    }

    let report = aggregate_citations(&responses);
    let metadata = json!({
        "topDomains": report.top_domains.len(),
        "topUrls": report.top_urls.len(),
        "domainsOverTime": report.domains_over_time.len(),
        "urlsOverTime": report.urls_over_time.len(),
        "modelsWithMetrics": report.global_metrics.len(),
    });

    Ok(json!({
        "request": {
            "path": path,
            "startDate": start_date,
            "endDate": end_date,
            "models": selected,
        },
        "modelOutcomes": model_outcomes,
        "report": report,
        "metadata": metadata,
    }))
}
