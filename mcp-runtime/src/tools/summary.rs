use std::time::Duration;

use serde_json::{Value, json};
use tokio::task::JoinSet;
use tracing::warn;

use beacon_core::error::FetchError;
use beacon_core::summary::{
    TopicReports, monthly_rollup, parse_report_scores, render_monthly_markdown,
};

use crate::ToolError;
use crate::catalog::{Topic, resolve_catalog};
use crate::client::ApiClient;
use crate::tools::resolve_date_range;

/// Validated arguments for `beacon_get_visibility_monthly_summary`.
#[derive(Debug, Clone, PartialEq)]
pub struct MonthlySummaryRequest {
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub models: Option<Vec<String>>,
    pub brand_filter: Option<String>,
    pub market_filter: Option<String>,
}

/// Monthly summaries look further back than the score tools.
const SUMMARY_WINDOW_DAYS: i64 = 180;

/// Outbound throttle for the whole-catalog sweep: at most this many raw
/// report fetches in flight, with a pause between batches. Rate-limiting
/// policy, not a correctness requirement.
const FETCH_BATCH_SIZE: usize = 8;
const BATCH_PAUSE: Duration = Duration::from_millis(250);

pub async fn run(client: &ApiClient, request: MonthlySummaryRequest) -> Result<Value, ToolError> {
    let (start_date, end_date) =
        resolve_date_range(request.start_date, request.end_date, SUMMARY_WINDOW_DAYS);

    let catalog = resolve_catalog(client).await?;
    let topics: Vec<Topic> = catalog
        .topics
        .into_iter()
        .filter(|topic| {
            matches_filter(&topic.domain_name, request.brand_filter.as_deref())
                && matches_filter(&topic.name, request.market_filter.as_deref())
        })
        .collect();

    let mut query = vec![
        ("startDate".to_string(), start_date.clone()),
        ("endDate".to_string(), end_date.clone()),
    ];
    if let Some(models) = &request.models {
        query.push(("models".to_string(), models.join(",")));
    }

    let results = fetch_topic_reports(client, &topics, &query).await;

    let mut reports = Vec::new();
    let mut topic_outcomes = Vec::with_capacity(results.len());
    for (topic, result) in results {
        match result {
            Ok(payload) => {
                let scores = parse_report_scores(&payload);
                topic_outcomes.push(json!({
                    "domain": topic.domain_name,
                    "topic": topic.name,
                    "ok": true,
                    "reports": scores.len(),
                }));
                reports.push(TopicReports {
                    domain_name: topic.domain_name,
                    topic_name: topic.name,
                    scores,
                });
            }
            Err(err) => {
                warn!(
                    domain = %topic.domain_name,
                    topic = %topic.name,
                    error = %err,
                    "skipping topic: raw report fetch failed"
                );
                topic_outcomes.push(json!({
                    "domain": topic.domain_name,
                    "topic": topic.name,
                    "ok": false,
                    "reason": err.to_string(),
                }));
            }
        }
    }

    let rows = monthly_rollup(&reports);
    let months: std::collections::BTreeSet<&str> =
        rows.iter().map(|row| row.month.as_str()).collect();
    let succeeded = reports.len();
    let metadata = json!({
        "topicsRequested": topic_outcomes.len(),
        "topicsSucceeded": succeeded,
        "topicsFailed": topic_outcomes.len() - succeeded,
        "monthsCovered": months.len(),
    });

    Ok(json!({
        "request": {
            "startDate": start_date,
            "endDate": end_date,
            "models": request.models,
            "brandFilter": request.brand_filter,
            "marketFilter": request.market_filter,
        },
        "topicOutcomes": topic_outcomes,
        "summary": {
            "markdown": render_monthly_markdown(&rows),
            "rows": rows,
        },
        "metadata": metadata,
    }))
}

/// Batched fan-out over the topic list; each batch joins fully before the
/// next starts so no more than `FETCH_BATCH_SIZE` requests are in flight.
async fn fetch_topic_reports(
    client: &ApiClient,
    topics: &[Topic],
    query: &[(String, String)],
) -> Vec<(Topic, Result<Value, FetchError>)> {
    let mut results = Vec::with_capacity(topics.len());

    for (batch_index, batch) in topics.chunks(FETCH_BATCH_SIZE).enumerate() {
        if batch_index > 0 {
            tokio::time::sleep(BATCH_PAUSE).await;
        }

        let mut slots: Vec<Option<Result<Value, FetchError>>> = Vec::new();
        slots.resize_with(batch.len(), || None);

        let mut tasks = JoinSet::new();
        for (index, topic) in batch.iter().enumerate() {
            let client = client.clone();
            let path = format!(
                "/domains/{}/topics/{}/visibility",
                topic.domain_id, topic.id
            );
            let query = query.to_vec();
            tasks.spawn(async move { (index, client.get(&path, &query).await) });
        }
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, result)) => slots[index] = Some(result),
                Err(err) => warn!(error = %err, "topic fetch task aborted"),
            }
        }

        for (topic, slot) in batch.iter().zip(slots) {
            let result = slot
                .unwrap_or_else(|| Err(FetchError::Transport("fetch task aborted".to_string())));
            results.push((topic.clone(), result));
        }
    }

    results
}

fn matches_filter(name: &str, filter: Option<&str>) -> bool {
    match filter {
        None => true,
        Some(filter) => {
            let filter = filter.trim();
            filter.is_empty() || name.to_lowercase().contains(&filter.to_lowercase())
        }
    }
}
