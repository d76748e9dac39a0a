use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Model label for the cross-model aggregate series.
pub const GLOBAL_MODEL_LABEL: &str = "GLOBAL";

/// Whether a row belongs to the tracked brand or one of its competitors.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Primary,
    Competitor,
}

/// One point of an upstream visibility time series: the primary entity's
/// score plus the competitor score map for a single date.
#[derive(Debug, Clone, PartialEq)]
pub struct RawTimePoint {
    pub date: String,
    pub primary_score: f64,
    pub competitor_scores: BTreeMap<String, f64>,
}

impl RawTimePoint {
    /// Tolerant parse of one `chartData` entry. Entries without a date are
    /// dropped; non-numeric scores coerce to 0 at this layer only.
    pub fn from_value(value: &Value) -> Option<Self> {
        let date = value.get("date").and_then(Value::as_str)?.to_string();
        let primary_score = coerce_score(value.get("brand"));
        let competitor_scores = value
            .get("competitors")
            .and_then(Value::as_object)
            .map(|map| {
                map.iter()
                    .map(|(name, score)| (name.clone(), coerce_score(Some(score))))
                    .collect()
            })
            .unwrap_or_default();
        Some(Self {
            date,
            primary_score,
            competitor_scores,
        })
    }
}

/// One long-format observation: a single entity's score on one date under
/// one model label. The variation fields compare against the previous point
/// of the same series and are `None` at the first point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalizedRow {
    pub date: String,
    pub entity_name: String,
    pub entity_kind: EntityKind,
    pub score: f64,
    pub model_label: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub variation_absolute: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub variation_percent: Option<f64>,
}

/// Extract the `chartData` time series from an aggregated visibility payload.
pub fn parse_time_series(payload: &Value) -> Vec<RawTimePoint> {
    payload
        .get("chartData")
        .and_then(Value::as_array)
        .map(|entries| entries.iter().filter_map(RawTimePoint::from_value).collect())
        .unwrap_or_default()
}

/// Flatten one time series into long-format rows under `model_label`.
///
/// Variation at point i>0 is `round(score[i] - score[i-1], 2)`; percent
/// variation divides by the previous score and is 0 when that score is not
/// positive (upstream renders growth-from-zero as 0 rather than undefined).
/// Competitors with a non-positive current score are dropped entirely; a
/// competitor absent from the previous point varies against a 0 base.
pub fn normalize(
    points: &[RawTimePoint],
    model_label: &str,
    primary_name: &str,
) -> Vec<NormalizedRow> {
    let mut rows = Vec::new();

    for (index, point) in points.iter().enumerate() {
        let previous = index.checked_sub(1).map(|prev| &points[prev]);

        let (variation_absolute, variation_percent) =
            variation(point.primary_score, previous.map(|prev| prev.primary_score));
        rows.push(NormalizedRow {
            date: point.date.clone(),
            entity_name: primary_name.to_string(),
            entity_kind: EntityKind::Primary,
            score: point.primary_score,
            model_label: model_label.to_string(),
            variation_absolute,
            variation_percent,
        });

        for (name, score) in &point.competitor_scores {
            if *score <= 0.0 {
                continue;
            }
            let previous_score = previous
                .map(|prev| prev.competitor_scores.get(name).copied().unwrap_or(0.0));
            let (variation_absolute, variation_percent) = variation(*score, previous_score);
            rows.push(NormalizedRow {
                date: point.date.clone(),
                entity_name: name.clone(),
                entity_kind: EntityKind::Competitor,
                score: *score,
                model_label: model_label.to_string(),
                variation_absolute,
                variation_percent,
            });
        }
    }

    rows
}

fn variation(score: f64, previous_score: Option<f64>) -> (Option<f64>, Option<f64>) {
    let Some(previous_score) = previous_score else {
        return (None, None);
    };
    let delta = round2(score - previous_score);
    let percent = if previous_score > 0.0 {
        round2(delta / previous_score * 100.0)
    } else {
        0.0
    };
    (Some(delta), Some(percent))
}

/// Coerce an upstream score to a number; non-numeric values become 0.
pub(crate) fn coerce_score(value: Option<&Value>) -> f64 {
    let Some(value) = value else {
        return 0.0;
    };
    if let Some(number) = value.as_f64() {
        return number;
    }
    value
        .as_str()
        .and_then(|raw| raw.trim().parse::<f64>().ok())
        .unwrap_or(0.0)
}

pub(crate) fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
