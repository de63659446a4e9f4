//! # Schema Command
//!
//! Shows the schema document built for one table, exactly as it is
//! embedded for retrieval, with a structural summary.
//!
//! ## Usage
//!
//! ```bash
//! askdb schema o
//! askdb schema o --json
//! ```

use anyhow::Result;
use askdb_rag::SchemaDocument;
use colored::Colorize;

use crate::config::Config;
use crate::context;
use crate::errors::{display_error, display_validation_error, report_rag_error};
use crate::exit_codes::*;

#[derive(Debug)]
pub struct SchemaArgs {
    pub table: String,
    pub json: bool,
}

/// Execute the schema command
///
/// # Returns
///
/// * `Ok(EXIT_SUCCESS)` - Document shown
/// * `Ok(EXIT_INVALID_INPUT)` - Table is not allow-listed
/// * `Ok(EXIT_CONFIG_ERROR)` - Metadata file missing or malformed
pub fn execute(args: SchemaArgs, config: &Config) -> Result<i32> {
    let kb = context::knowledge_base(config);
    let Some(table) = kb
        .allowed_tables()
        .iter()
        .find(|t| t.eq_ignore_ascii_case(&args.table))
        .cloned()
    else {
        display_validation_error(&format!("'{}' is not an allow-listed table", args.table));
        return Ok(EXIT_INVALID_INPUT);
    };

    let metadata = match kb.load_table(&table) {
        Ok(metadata) => metadata,
        Err(e) => {
            display_error(&e.to_string());
            return Ok(EXIT_CONFIG_ERROR);
        }
    };
    let catalog = match kb.load_catalog() {
        Ok(catalog) => catalog,
        Err(e) => return Ok(report_rag_error(&e, false)),
    };
    let document = SchemaDocument::build(&metadata, catalog.get(&table));

    if args.json {
        let summary = kb.table_summary(&table)?;
        println!(
            "{}",
            serde_json::to_string_pretty(&serde_json::json!({
                "summary": summary,
                "content_hash": document.content_hash,
                "text": document.text,
            }))?
        );
        return Ok(EXIT_SUCCESS);
    }

    println!("{}", document.text);
    println!("{}", "─".repeat(40).dimmed());
    println!(
        "{} {}",
        "Content hash:".dimmed(),
        &document.content_hash[..16]
    );
    Ok(EXIT_SUCCESS)
}
