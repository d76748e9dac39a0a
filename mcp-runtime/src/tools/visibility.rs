use std::collections::BTreeSet;

use serde_json::{Value, json};
use tracing::warn;

use beacon_core::dataset::{
    EntityKind, GLOBAL_MODEL_LABEL, NormalizedRow, normalize, parse_time_series,
};
use beacon_core::pivot::pivot;
use beacon_core::render::{OutputFormat, Rendered, render};

use crate::ToolError;
use crate::client::ApiClient;
use crate::tools::{
    DEFAULT_WINDOW_DAYS, aggregated_path, available_models, base_query, fetch_per_model,
    resolve_date_range, select_models,
};

/// Validated arguments for `beacon_get_visibility_scores`.
#[derive(Debug, Clone, PartialEq)]
pub struct VisibilityScoresRequest {
    pub domain_id: String,
    pub topic_id: String,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub models: Option<Vec<String>>,
    pub output_format: OutputFormat,
}

pub async fn run(
    client: &ApiClient,
    request: VisibilityScoresRequest,
) -> Result<Value, ToolError> {
    let (start_date, end_date) =
        resolve_date_range(request.start_date, request.end_date, DEFAULT_WINDOW_DAYS);
    let path = aggregated_path(&request.domain_id, &request.topic_id);
    let query = base_query(&start_date, &end_date);

    // The cross-model aggregate is the one required fetch; everything else
    // degrades per model.
    let global = client.get(&path, &query).await?;

    let selected = select_models(&available_models(&global), request.models.as_deref());
    let fetched = fetch_per_model(client, &path, &query, &selected).await;

    let brand_name = client.config().brand_name.clone();
    let mut rows = normalize(&parse_time_series(&global), GLOBAL_MODEL_LABEL, &brand_name);
    let mut model_outcomes = Vec::with_capacity(fetched.len());
    for (model, result) in fetched {
        match result {
            Ok(payload) => {
                rows.extend(normalize(&parse_time_series(&payload), &model, &brand_name));
                model_outcomes.push(json!({ "model": model, "ok": true }));
            }
            Err(err) => {
                warn!(model = %model, error = %err, "skipping model: visibility fetch failed");
                model_outcomes.push(json!({
                    "model": model,
                    "ok": false,
                    "reason": err.to_string(),
                }));
            }
        }
    }

    let metadata = dataset_metadata(&rows, &selected, &start_date, &end_date);
    let mut payload = json!({
        "request": {
            "path": path,
            "startDate": start_date,
            "endDate": end_date,
            "models": selected,
            "outputFormat": request.output_format.as_str(),
        },
        "modelOutcomes": model_outcomes,
    });

    match pivot(&rows) {
        Some(result) => {
            let dataset = match render(&result, request.output_format) {
                Rendered::Text(content) => json!({
                    "format": request.output_format.as_str(),
                    "content": content,
                    "columns": result.columns,
                    "stats": result.stats,
                    "metadata": metadata,
                }),
                Rendered::Records(records) => json!({
                    "format": request.output_format.as_str(),
                    "records": records,
                    "metadata": metadata,
                }),
            };
            payload["dataset"] = dataset;
        }
        None => {
            payload["dataset"] = Value::Null;
            payload["message"] =
                json!("no visibility data points in the requested range");
        }
    }

    Ok(payload)
}

/// Long-format dataset counts, mirroring what the upstream dashboard shows
/// next to an export.
fn dataset_metadata(
    rows: &[NormalizedRow],
    models: &[String],
    start_date: &str,
    end_date: &str,
) -> Value {
    let primary_rows = rows
        .iter()
        .filter(|row| row.entity_kind == EntityKind::Primary)
        .count();
    let unique_competitors: BTreeSet<&str> = rows
        .iter()
        .filter(|row| row.entity_kind == EntityKind::Competitor)
        .map(|row| row.entity_name.as_str())
        .collect();

    let mut labels = vec![GLOBAL_MODEL_LABEL.to_string()];
    labels.extend(models.iter().cloned());

    json!({
        "totalRows": rows.len(),
        "primaryRows": primary_rows,
        "competitorRows": rows.len() - primary_rows,
        "uniqueCompetitors": unique_competitors.len(),
        "modelsAnalyzed": labels.len(),
        "models": labels,
        "requestedRange": { "start": start_date, "end": end_date },
        "observedRange": {
            "start": rows.first().map(|row| row.date.clone()),
            "end": rows.last().map(|row| row.date.clone()),
        },
    })
}
