use std::fmt;
use std::str::FromStr;

use serde_json::Value;

use crate::pivot::PivotResult;

/// Serialization targets for a pivoted dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    #[default]
    Markdown,
    Csv,
    Tsv,
    Structured,
}

impl OutputFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            OutputFormat::Markdown => "markdown",
            OutputFormat::Csv => "csv",
            OutputFormat::Tsv => "tsv",
            OutputFormat::Structured => "structured",
        }
    }
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "markdown" | "md" => Ok(OutputFormat::Markdown),
            "csv" => Ok(OutputFormat::Csv),
            "tsv" => Ok(OutputFormat::Tsv),
            "structured" => Ok(OutputFormat::Structured),
            other => Err(format!(
                "unknown output format '{other}' (expected markdown, csv, tsv, or structured)"
            )),
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A rendered dataset: text for the tabular formats, records for
/// programmatic consumers.
#[derive(Debug, Clone, PartialEq)]
pub enum Rendered {
    Text(String),
    Records(Value),
}

/// Serialize a pivot result. Every format iterates rows and columns in the
/// pivot engine's fixed order; nothing here re-sorts.
pub fn render(result: &PivotResult, format: OutputFormat) -> Rendered {
    match format {
        OutputFormat::Markdown => Rendered::Text(render_markdown(result)),
        OutputFormat::Csv => Rendered::Text(render_delimited(result, ',')),
        OutputFormat::Tsv => Rendered::Text(render_delimited(result, '\t')),
        OutputFormat::Structured => {
            Rendered::Records(serde_json::to_value(result).unwrap_or(Value::Null))
        }
    }
}

/// Markdown: scores as fixed two-decimal percentages, absent cells as `-`,
/// followed by a per-entity summary table.
fn render_markdown(result: &PivotResult) -> String {
    let mut out = String::new();

    push_markdown_row(
        &mut out,
        ["Date", "Model"]
            .into_iter()
            .map(str::to_string)
            .chain(result.columns.iter().cloned()),
    );
    push_markdown_row(
        &mut out,
        std::iter::repeat_n("---".to_string(), result.columns.len() + 2),
    );
    for row in &result.rows {
        push_markdown_row(
            &mut out,
            [row.date.clone(), row.model_label.clone()]
                .into_iter()
                .chain(row.values.iter().map(|value| match value {
                    Some(score) => format!("{score:.2}%"),
                    None => "-".to_string(),
                })),
        );
    }

    out.push_str("\n### Entity summary\n\n");
    push_markdown_row(
        &mut out,
        ["Entity", "Average", "Min", "Max", "Samples"]
            .into_iter()
            .map(str::to_string),
    );
    push_markdown_row(&mut out, std::iter::repeat_n("---".to_string(), 5));
    for column in &result.columns {
        let Some(stats) = result.stats.get(column) else {
            continue;
        };
        push_markdown_row(
            &mut out,
            [
                stats.entity_name.clone(),
                format!("{:.2}%", stats.average),
                format!("{:.2}%", stats.min),
                format!("{:.2}%", stats.max),
                stats.sample_count.to_string(),
            ]
            .into_iter(),
        );
    }

    out
}

fn push_markdown_row(out: &mut String, cells: impl Iterator<Item = String>) {
    out.push('|');
    for cell in cells {
        out.push(' ');
        out.push_str(&cell);
        out.push_str(" |");
    }
    out.push('\n');
}

/// CSV/TSV: bare numbers, absent cells as empty fields, no summary section
/// so the output parses back cleanly.
fn render_delimited(result: &PivotResult, delimiter: char) -> String {
    let mut lines = Vec::with_capacity(result.rows.len() + 1);

    let header: Vec<String> = ["Date", "Model"]
        .into_iter()
        .map(str::to_string)
        .chain(result.columns.iter().cloned())
        .map(|cell| escape_field(&cell, delimiter))
        .collect();
    lines.push(header.join(&delimiter.to_string()));

    for row in &result.rows {
        let cells: Vec<String> = [row.date.clone(), row.model_label.clone()]
            .into_iter()
            .map(|cell| escape_field(&cell, delimiter))
            .chain(row.values.iter().map(|value| match value {
                Some(score) => score.to_string(),
                None => String::new(),
            }))
            .collect();
        lines.push(cells.join(&delimiter.to_string()));
    }

    lines.join("\n")
}

fn escape_field(field: &str, delimiter: char) -> String {
    if field.contains(delimiter) || field.contains('"') || field.contains('\n') {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::{OutputFormat, Rendered, render};
    use crate::dataset::{EntityKind, NormalizedRow};
    use crate::pivot::pivot;

    fn sample() -> crate::pivot::PivotResult {
        let row = |date: &str, name: &str, kind: EntityKind, score: f64| NormalizedRow {
            date: date.to_string(),
            entity_name: name.to_string(),
            entity_kind: kind,
            score,
            model_label: "GLOBAL".to_string(),
            variation_absolute: None,
            variation_percent: None,
        };
        pivot(&[
            row("2026-01-01", "Your Brand", EntityKind::Primary, 10.0),
            row("2026-01-01", "Alpha", EntityKind::Competitor, 5.5),
            row("2026-01-02", "Your Brand", EntityKind::Primary, 12.0),
        ])
        .unwrap()
    }

    #[test]
    fn format_parse_round_trips_and_rejects_unknown() {
        for format in [
            OutputFormat::Markdown,
            OutputFormat::Csv,
            OutputFormat::Tsv,
            OutputFormat::Structured,
        ] {
            assert_eq!(OutputFormat::from_str(format.as_str()).unwrap(), format);
        }
        assert!(OutputFormat::from_str("xml").is_err());
    }

    #[test]
    fn markdown_renders_percentages_and_dashes() {
        let Rendered::Text(text) = render(&sample(), OutputFormat::Markdown) else {
            panic!("markdown must render to text");
        };
        assert!(text.starts_with("| Date | Model | Your Brand | Alpha |"));
        assert!(text.contains("| 2026-01-01 | GLOBAL | 10.00% | 5.50% |"));
        // Alpha did not report on the second date.
        assert!(text.contains("| 2026-01-02 | GLOBAL | 12.00% | - |"));
        assert!(text.contains("### Entity summary"));
    }

    #[test]
    fn csv_uses_bare_numbers_and_empty_absent_fields() {
        let Rendered::Text(text) = render(&sample(), OutputFormat::Csv) else {
            panic!("csv must render to text");
        };
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "Date,Model,Your Brand,Alpha");
        assert_eq!(lines[1], "2026-01-01,GLOBAL,10,5.5");
        assert_eq!(lines[2], "2026-01-02,GLOBAL,12,");
    }

    #[test]
    fn csv_round_trip_recovers_score_triples() {
        let result = sample();
        let Rendered::Text(text) = render(&result, OutputFormat::Csv) else {
            panic!("csv must render to text");
        };

        let mut lines = text.lines();
        let header: Vec<&str> = lines.next().unwrap().split(',').collect();
        for (line, expected) in lines.zip(&result.rows) {
            let cells: Vec<&str> = line.split(',').collect();
            assert_eq!(cells[0], expected.date);
            assert_eq!(cells[1], expected.model_label);
            for (cell, value) in cells[2..].iter().zip(&expected.values) {
                match value {
                    Some(score) => assert_eq!(cell.parse::<f64>().unwrap(), *score),
                    None => assert!(cell.is_empty()),
                }
            }
            assert_eq!(cells.len(), header.len());
        }
    }

    #[test]
    fn tsv_uses_tab_delimiter() {
        let Rendered::Text(text) = render(&sample(), OutputFormat::Tsv) else {
            panic!("tsv must render to text");
        };
        assert!(text.lines().next().unwrap().contains('\t'));
    }

    #[test]
    fn structured_returns_records() {
        let Rendered::Records(value) = render(&sample(), OutputFormat::Structured) else {
            panic!("structured must render to records");
        };
        assert_eq!(value["columns"][0], "Your Brand");
        assert!(value["rows"].as_array().unwrap().len() == 2);
        assert!(value["stats"]["Your Brand"]["average"].is_number());
    }
}
