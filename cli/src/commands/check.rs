//! # Check Command
//!
//! Verifies that every allow-listed table has a usable metadata file.

use anyhow::Result;
use colored::Colorize;

use crate::config::Config;
use crate::context;
use crate::errors::report_rag_error;
use crate::exit_codes::*;

#[derive(Debug)]
pub struct CheckArgs {
    pub json: bool,
}

/// Execute the check command
///
/// # Returns
///
/// * `Ok(EXIT_SUCCESS)` - Every table file is present and valid
/// * `Ok(EXIT_CONFIG_ERROR)` - Directory missing, or some table files missing/invalid
pub fn execute(args: CheckArgs, config: &Config) -> Result<i32> {
    let kb = context::knowledge_base(config);
    if let Err(e) = kb.ensure_exists() {
        return Ok(report_rag_error(&e, false));
    }
    let report = kb.check();

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("{}", "Knowledge Base Check".bold());
        println!("{}", "─".repeat(40).dimmed());
        println!("{} {}", "Directory:".dimmed(), kb.root().display());
        println!(
            "{} {}/{} valid",
            "Tables:".dimmed(),
            report.valid_tables.len(),
            report.total_tables
        );
        if !report.missing_tables.is_empty() {
            println!(
                "{} {}",
                "Missing:".yellow().bold(),
                report.missing_tables.join(", ")
            );
        }
        for invalid in &report.invalid_tables {
            println!(
                "{} {}: {}",
                "Invalid:".red().bold(),
                invalid.table,
                invalid.reason
            );
        }
        if !report.tables_with_examples.is_empty() {
            println!();
            println!("{}", "Worked examples".cyan().bold());
            for (table, count) in &report.tables_with_examples {
                println!("  {table}: {count}");
            }
        }
        let catalog = kb.catalog_path();
        println!();
        println!(
            "{} {}",
            "Catalog:".dimmed(),
            if catalog.exists() {
                "found".green()
            } else {
                "not found".yellow()
            }
        );
    }

    Ok(if report.is_complete() {
        EXIT_SUCCESS
    } else {
        EXIT_CONFIG_ERROR
    })
}
