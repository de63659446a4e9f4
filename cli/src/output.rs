//! # Output Rendering
//!
//! Terminal rendering shared by `ask` and `shell`.

use askdb_rag::{Answer, ExecutionOutcome, ExecutionReport};
use colored::Colorize;
use serde_json::{Map, Value};

/// Widest a result column is allowed to render.
const MAX_CELL_WIDTH: usize = 40;

pub fn print_answer(answer: &Answer, verbose: bool) {
    println!();
    println!("{}", "SQL".cyan().bold());
    println!("  {}", answer.sql);

    if !answer.explanation.is_empty() {
        println!();
        println!("{}", "Explanation".cyan().bold());
        println!("  {}", answer.explanation);
    }

    if !answer.tables_used.is_empty() {
        println!();
        println!(
            "{} {}",
            "Tables:".dimmed(),
            answer.tables_used.join(", ")
        );
    }

    if verbose {
        let retrieved: Vec<String> = answer
            .retrieved
            .iter()
            .map(|r| format!("{} ({:.3})", r.table, r.score))
            .collect();
        println!("{} {}", "Retrieved:".dimmed(), retrieved.join(", "));
        if let Some(strategy) = answer.strategy {
            println!("{} {:?}", "Extracted from:".dimmed(), strategy);
        }
    }

    if !answer.warnings.is_empty() {
        println!();
        for warning in &answer.warnings {
            println!("{} {}", "⚠".yellow().bold(), warning.yellow());
        }
    }

    match &answer.execution {
        Some(ExecutionOutcome::Rows(report)) => print_report(report),
        Some(ExecutionOutcome::Failed { error }) => {
            println!();
            println!("{} Execution failed: {}", "✗".red().bold(), error);
        }
        None => {}
    }
}

fn print_report(report: &ExecutionReport) {
    println!();
    for line in format_table(&report.columns, &report.rows) {
        println!("  {line}");
    }
    println!();
    let mut summary = format!(
        "{} row(s) in {:.3}s",
        report.row_count, report.elapsed_seconds
    );
    if report.cached {
        summary.push_str(" (cached)");
    }
    if report.truncated {
        summary.push_str(", more rows available (raise --limit)");
    }
    println!("{}", summary.dimmed());
}

/// Render a result set as aligned text lines: header, rule, rows.
pub fn format_table(columns: &[String], rows: &[Map<String, Value>]) -> Vec<String> {
    if columns.is_empty() {
        return vec!["(no columns)".to_string()];
    }

    let cells: Vec<Vec<String>> = rows
        .iter()
        .map(|row| {
            columns
                .iter()
                .map(|c| cell_text(row.get(c).unwrap_or(&Value::Null)))
                .collect()
        })
        .collect();

    let widths: Vec<usize> = columns
        .iter()
        .enumerate()
        .map(|(i, name)| {
            cells
                .iter()
                .map(|row| row[i].chars().count())
                .chain(std::iter::once(name.chars().count()))
                .max()
                .unwrap_or(0)
                .min(MAX_CELL_WIDTH)
        })
        .collect();

    let render = |values: &[String]| -> String {
        values
            .iter()
            .zip(&widths)
            .map(|(value, &width)| format!("{:<width$}", truncate_cell(value, width)))
            .collect::<Vec<_>>()
            .join(" | ")
            .trim_end()
            .to_string()
    };

    let mut lines = Vec::with_capacity(cells.len() + 2);
    lines.push(render(columns));
    lines.push(
        widths
            .iter()
            .map(|&w| "-".repeat(w))
            .collect::<Vec<_>>()
            .join("-+-"),
    );
    lines.extend(cells.iter().map(|row| render(row.as_slice())));
    lines
}

/// Display text for one JSON cell. Null renders as `NULL`.
pub fn cell_text(value: &Value) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn truncate_cell(value: &str, width: usize) -> String {
    if value.chars().count() <= width {
        value.to_string()
    } else {
        let kept: String = value.chars().take(width.saturating_sub(1)).collect();
        format!("{kept}…")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(value: Value) -> Map<String, Value> {
        value.as_object().unwrap().clone()
    }

    #[test]
    fn test_format_table_aligns_columns() {
        let columns = vec!["aoordno".to_string(), "note".to_string()];
        let rows = vec![
            row(json!({"aoordno": 1, "note": "first"})),
            row(json!({"aoordno": 22, "note": null})),
        ];
        let lines = format_table(&columns, &rows);
        assert_eq!(lines[0], "aoordno | note");
        assert_eq!(lines[1], "--------+------");
        assert_eq!(lines[2], "1       | first");
        assert_eq!(lines[3], "22      | NULL");
    }

    #[test]
    fn test_long_cells_are_truncated() {
        let columns = vec!["c".to_string()];
        let rows = vec![row(json!({"c": "x".repeat(100)}))];
        let lines = format_table(&columns, &rows);
        assert_eq!(lines[2].chars().count(), MAX_CELL_WIDTH);
        assert!(lines[2].ends_with('…'));
    }

    #[test]
    fn test_no_columns() {
        assert_eq!(format_table(&[], &[]), vec!["(no columns)"]);
    }
}
