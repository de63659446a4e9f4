//! # Ingest Command
//!
//! Builds schema documents for every allow-listed table and indexes them.
//!
//! ## Usage
//!
//! ```bash
//! # Rebuild the index from scratch
//! askdb ingest
//!
//! # Upsert without clearing the index first
//! askdb ingest --keep-existing
//! ```

use anyhow::Result;
use askdb_rag::{IngestOptions, IngestionStatus};
use colored::Colorize;

use crate::config::Config;
use crate::context;
use crate::errors::report_rag_error;
use crate::exit_codes::*;

/// Arguments for the ingest command
#[derive(Debug)]
pub struct IngestArgs {
    /// Keep documents already in the index
    pub keep_existing: bool,
    /// Output the report as JSON
    pub json: bool,
    pub verbose: bool,
}

/// Execute the ingest command
///
/// # Returns
///
/// * `Ok(EXIT_SUCCESS)` - At least one table was indexed
/// * `Ok(EXIT_CONFIG_ERROR)` - Knowledge base missing, or nothing could be indexed
/// * `Ok(EXIT_RETRIEVAL_ERROR)` - Embedding service or index unreachable
pub async fn execute(args: IngestArgs, config: &Config) -> Result<i32> {
    let ingestor = match context::ingestor(config).await {
        Ok(ingestor) => ingestor,
        Err(e) => return Ok(report_rag_error(&e, args.verbose)),
    };

    let options = IngestOptions {
        reset: !args.keep_existing,
    };
    let report = match ingestor.ingest(options).await {
        Ok(report) => report,
        Err(e) => return Ok(report_rag_error(&e, args.verbose)),
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        let (mark, label) = match report.status {
            IngestionStatus::Success => ("✓".bright_green().bold(), "Ingestion complete".green()),
            IngestionStatus::Partial => ("⚠".yellow().bold(), "Ingestion partial".yellow()),
            IngestionStatus::Empty => ("✗".red().bold(), "Nothing ingested".red()),
        };
        println!("{mark} {label}");
        println!(
            "  {} {}",
            "Tables indexed:".dimmed(),
            report.processed_tables
        );
        println!(
            "  {} {}",
            "With examples:".dimmed(),
            report.tables_with_examples
        );
        println!(
            "  {} {}",
            "Catalog:".dimmed(),
            if report.catalog_loaded { "loaded" } else { "not found" }
        );
        for skipped in &report.skipped {
            println!("  {} {}: {}", "skipped".yellow(), skipped.table, skipped.reason.dimmed());
        }
    }

    Ok(match report.status {
        IngestionStatus::Empty => EXIT_CONFIG_ERROR,
        _ => EXIT_SUCCESS,
    })
}
