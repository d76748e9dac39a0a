use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::dataset::{EntityKind, NormalizedRow, round2};

/// One wide-format row: the scores of every entity on one (date, model) pair.
/// `values` is parallel to `PivotResult::columns`; `None` means the entity
/// did not report on that date/model and must not be read as 0.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PivotRow {
    pub date: String,
    pub model_label: String,
    pub values: Vec<Option<f64>>,
}

/// Per-entity summary statistics over the populated cells of one column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityStats {
    pub entity_name: String,
    pub average: f64,
    pub min: f64,
    pub max: f64,
    pub sample_count: usize,
}

/// The pivoted dataset: a fixed column ordering, one row per distinct
/// (date, model) pair, and per-column statistics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PivotResult {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub primary_entity: Option<String>,
    pub columns: Vec<String>,
    pub rows: Vec<PivotRow>,
    pub stats: BTreeMap<String, EntityStats>,
}

/// Re-group long-format rows into a wide table keyed by (date, model).
///
/// Returns `None` on empty input: an explicit "no data" outcome callers
/// must branch on, distinct from a table that pivoted to zero rows.
///
/// Column order is the primary entity first (when present), then the
/// remaining entity names ascending; it is a derived property and identical
/// across repeated calls regardless of input row order. Rows are ordered by
/// the ascending string concatenation of date and model label, which sorts
/// date-first only because upstream dates are zero-padded ISO strings.
pub fn pivot(rows: &[NormalizedRow]) -> Option<PivotResult> {
    if rows.is_empty() {
        return None;
    }

    let mut primary_entity: Option<String> = None;
    let mut groups: BTreeMap<String, Group> = BTreeMap::new();

    for row in rows {
        if primary_entity.is_none() && row.entity_kind == EntityKind::Primary {
            primary_entity = Some(row.entity_name.clone());
        }
        let score = if row.score.is_finite() { row.score } else { 0.0 };
        let key = format!("{}{}", row.date, row.model_label);
        groups
            .entry(key)
            .or_insert_with(|| Group {
                date: row.date.clone(),
                model_label: row.model_label.clone(),
                scores: BTreeMap::new(),
            })
            .scores
            .insert(row.entity_name.clone(), round2(score));
    }

    let mut remaining: BTreeSet<String> = groups
        .values()
        .flat_map(|group| group.scores.keys().cloned())
        .collect();
    let mut columns = Vec::with_capacity(remaining.len());
    if let Some(primary) = &primary_entity {
        if remaining.remove(primary) {
            columns.push(primary.clone());
        }
    }
    columns.extend(remaining);

    let rows: Vec<PivotRow> = groups
        .into_values()
        .map(|group| PivotRow {
            values: columns
                .iter()
                .map(|column| group.scores.get(column).copied())
                .collect(),
            date: group.date,
            model_label: group.model_label,
        })
        .collect();

    let mut stats = BTreeMap::new();
    for (index, column) in columns.iter().enumerate() {
        let observed: Vec<f64> = rows.iter().filter_map(|row| row.values[index]).collect();
        if observed.is_empty() {
            continue;
        }
        let sum: f64 = observed.iter().sum();
        stats.insert(
            column.clone(),
            EntityStats {
                entity_name: column.clone(),
                average: round2(sum / observed.len() as f64),
                min: observed.iter().copied().fold(f64::INFINITY, f64::min),
                max: observed.iter().copied().fold(f64::NEG_INFINITY, f64::max),
                sample_count: observed.len(),
            },
        );
    }

    Some(PivotResult {
        primary_entity,
        columns,
        rows,
        stats,
    })
}

struct Group {
    date: String,
    model_label: String,
    scores: BTreeMap<String, f64>,
}

#[cfg(test)]
mod tests {
    use super::pivot;
    use crate::dataset::{EntityKind, NormalizedRow};

    fn row(date: &str, name: &str, kind: EntityKind, score: f64, model: &str) -> NormalizedRow {
        NormalizedRow {
            date: date.to_string(),
            entity_name: name.to_string(),
            entity_kind: kind,
            score,
            model_label: model.to_string(),
            variation_absolute: None,
            variation_percent: None,
        }
    }

    fn sample_rows() -> Vec<NormalizedRow> {
        vec![
            row("2026-01-01", "Your Brand", EntityKind::Primary, 10.0, "GLOBAL"),
            row("2026-01-01", "Zeta", EntityKind::Competitor, 5.0, "GLOBAL"),
            row("2026-01-02", "Your Brand", EntityKind::Primary, 12.0, "GLOBAL"),
            row("2026-01-02", "Alpha", EntityKind::Competitor, 3.0, "GLOBAL"),
            row("2026-01-01", "Your Brand", EntityKind::Primary, 9.0, "gpt-4o"),
        ]
    }

    #[test]
    fn empty_input_is_no_data_not_zero_rows() {
        assert!(pivot(&[]).is_none());
    }

    #[test]
    fn one_row_per_distinct_date_model_pair() {
        let result = pivot(&sample_rows()).unwrap();
        assert_eq!(result.rows.len(), 3);
    }

    #[test]
    fn primary_column_comes_first_then_lexicographic() {
        let result = pivot(&sample_rows()).unwrap();
        assert_eq!(result.columns, vec!["Your Brand", "Alpha", "Zeta"]);
    }

    #[test]
    fn column_order_is_stable_under_input_shuffle() {
        let mut shuffled = sample_rows();
        shuffled.reverse();
        let a = pivot(&sample_rows()).unwrap();
        let b = pivot(&shuffled).unwrap();
        assert_eq!(a.columns, b.columns);
        assert_eq!(a.rows, b.rows);
    }

    #[test]
    fn rows_sort_by_date_then_model() {
        let result = pivot(&sample_rows()).unwrap();
        let keys: Vec<(String, String)> = result
            .rows
            .iter()
            .map(|row| (row.date.clone(), row.model_label.clone()))
            .collect();
        assert_eq!(
            keys,
            vec![
                ("2026-01-01".to_string(), "GLOBAL".to_string()),
                ("2026-01-01".to_string(), "gpt-4o".to_string()),
                ("2026-01-02".to_string(), "GLOBAL".to_string()),
            ]
        );
    }

    #[test]
    fn missing_cells_stay_absent_instead_of_zero() {
        let result = pivot(&sample_rows()).unwrap();
        let alpha_index = result.columns.iter().position(|c| c == "Alpha").unwrap();
        let first_row = &result.rows[0];
        assert_eq!(first_row.values[alpha_index], None);
    }

    #[test]
    fn stats_average_over_populated_cells_only() {
        let result = pivot(&sample_rows()).unwrap();
        let brand = &result.stats["Your Brand"];
        // (10 + 9 + 12) / 3
        assert_eq!(brand.average, 10.33);
        assert_eq!(brand.min, 9.0);
        assert_eq!(brand.max, 12.0);
        assert_eq!(brand.sample_count, 3);

        let alpha = &result.stats["Alpha"];
        assert_eq!(alpha.sample_count, 1);
        assert_eq!(alpha.average, 3.0);
    }

    #[test]
    fn scores_round_to_two_decimals_in_table() {
        let rows = vec![row(
            "2026-01-01",
            "Your Brand",
            EntityKind::Primary,
            3.14159,
            "GLOBAL",
        )];
        let result = pivot(&rows).unwrap();
        assert_eq!(result.rows[0].values[0], Some(3.14));
    }

    #[test]
    fn competitor_only_input_has_no_primary_column() {
        let rows = vec![row("2026-01-01", "Alpha", EntityKind::Competitor, 4.0, "GLOBAL")];
        let result = pivot(&rows).unwrap();
        assert_eq!(result.primary_entity, None);
        assert_eq!(result.columns, vec!["Alpha"]);
    }
}
