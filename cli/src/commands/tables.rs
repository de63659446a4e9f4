//! # Tables Command
//!
//! Lists the allow-listed tables and what the knowledge base knows about
//! each one.

use anyhow::Result;
use colored::Colorize;
use serde::Serialize;

use crate::config::Config;
use crate::context;
use crate::errors::report_rag_error;
use crate::exit_codes::*;

#[derive(Debug)]
pub struct TablesArgs {
    pub json: bool,
}

#[derive(Debug, Serialize)]
struct TableRow {
    table: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    display_name: Option<String>,
    fields: usize,
    examples: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

pub fn execute(args: TablesArgs, config: &Config) -> Result<i32> {
    let kb = context::knowledge_base(config);
    if let Err(e) = kb.ensure_exists() {
        return Ok(report_rag_error(&e, false));
    }

    let rows: Vec<TableRow> = kb
        .allowed_tables()
        .iter()
        .map(|table| match kb.table_summary(table) {
            Ok(summary) => TableRow {
                table: table.clone(),
                display_name: summary.display_name,
                fields: summary.field_count,
                examples: summary.example_count,
                error: None,
            },
            Err(e) => TableRow {
                table: table.clone(),
                display_name: None,
                fields: 0,
                examples: 0,
                error: Some(e.to_string()),
            },
        })
        .collect();

    if args.json {
        println!("{}", serde_json::to_string_pretty(&rows)?);
        return Ok(EXIT_SUCCESS);
    }

    println!(
        "{} ({} allow-listed)",
        "Tables".bold(),
        rows.len()
    );
    println!("{}", "─".repeat(40).dimmed());
    for row in &rows {
        match &row.error {
            None => println!(
                "  {:<6} {:<28} {}",
                row.table.cyan(),
                row.display_name.as_deref().unwrap_or("-"),
                format!("{} fields, {} examples", row.fields, row.examples).dimmed()
            ),
            Some(error) => println!("  {:<6} {}", row.table.cyan(), error.red()),
        }
    }
    Ok(EXIT_SUCCESS)
}
