//! # Status Command
//!
//! Checks the knowledge base, vector index, embedding model, LLM and
//! database in one pass.
//!
//! ## Usage
//!
//! ```bash
//! askdb status
//! ```

use anyhow::Result;
use colored::Colorize;

use crate::config::Config;
use crate::context;
use crate::errors::report_rag_error;
use crate::exit_codes::*;

#[derive(Debug)]
pub struct StatusArgs {
    pub json: bool,
}

/// Execute the status command
///
/// # Returns
///
/// * `Ok(EXIT_SUCCESS)` - Everything reachable and the index is populated
/// * `Ok(EXIT_CONFIG_ERROR)` - Knowledge base missing or index empty
/// * `Ok(EXIT_RETRIEVAL_ERROR)` - Index unreachable
/// * `Ok(EXIT_EXECUTION_ERROR)` - Database configured but unreachable
pub async fn execute(args: StatusArgs, config: &Config) -> Result<i32> {
    let kb = context::knowledge_base(config);
    let kb_check = kb.ensure_exists().ok().map(|_| kb.check());

    let pipeline = match context::pipeline(config).await {
        Ok(pipeline) => pipeline,
        Err(e) => return Ok(report_rag_error(&e, false)),
    };
    let health = pipeline.health().await;

    let exit_code = if health.indexed_tables.is_err() {
        EXIT_RETRIEVAL_ERROR
    } else if matches!(health.database, Some(Err(_))) {
        EXIT_EXECUTION_ERROR
    } else if kb_check.is_none() || health.indexed_tables == Ok(0) {
        EXIT_CONFIG_ERROR
    } else {
        EXIT_SUCCESS
    };

    if args.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&serde_json::json!({
                "knowledge_base": kb_check,
                "health": health,
                "llm_ready": config.llm.is_ready(),
                "embedding_ready": config.embedding.is_ready(),
            }))?
        );
        return Ok(exit_code);
    }

    println!("{}", "askdb Status".bold());
    println!("{}", "─".repeat(40).dimmed());
    println!();

    match &kb_check {
        Some(check) => {
            let mark = if check.is_complete() {
                "✓".bright_green().bold()
            } else {
                "⚠".yellow().bold()
            };
            println!(
                "{} Knowledge base: {} ({}/{} tables valid)",
                mark,
                kb.root().display(),
                check.valid_tables.len(),
                check.total_tables
            );
        }
        None => println!(
            "{} Knowledge base: {} {}",
            "✗".red().bold(),
            kb.root().display(),
            "not found".red()
        ),
    }

    match &health.indexed_tables {
        Ok(0) => {
            println!(
                "{} Index ({}): {}",
                "⚠".yellow().bold(),
                health.index_backend,
                "empty".yellow()
            );
            println!("  {} Run `askdb ingest` to build it", "→".cyan());
        }
        Ok(count) => println!(
            "{} Index ({}): {} schema document(s)",
            "✓".bright_green().bold(),
            health.index_backend,
            count
        ),
        Err(e) => println!(
            "{} Index ({}): {}",
            "✗".red().bold(),
            health.index_backend,
            e.red()
        ),
    }

    println!(
        "{} Embedding: {} ({})",
        ready_mark(config.embedding.is_ready()),
        health.embedding_model,
        config.embedding.provider
    );
    println!(
        "{} LLM: {} ({})",
        ready_mark(config.llm.is_ready()),
        health.llm_model,
        health.llm_provider
    );
    if !config.llm.is_ready() {
        println!("  {} API key missing", "→".cyan());
    }

    match (&health.database_backend, &health.database) {
        (Some(backend), Some(Ok(()))) => println!(
            "{} Database ({}): {}",
            "✓".bright_green().bold(),
            backend,
            "reachable".green()
        ),
        (Some(backend), Some(Err(e))) => println!(
            "{} Database ({}): {}",
            "✗".red().bold(),
            backend,
            e.red()
        ),
        _ => println!(
            "{} Database: {}",
            "ℹ".blue(),
            "not configured (SQL is generated but not executed)".dimmed()
        ),
    }

    println!(
        "{} Cache: ttl {}s, max {} entries",
        "ℹ".blue(),
        config.cache.ttl_seconds,
        config.cache.max_size
    );

    Ok(exit_code)
}

fn ready_mark(ready: bool) -> colored::ColoredString {
    if ready {
        "✓".bright_green().bold()
    } else {
        "✗".red().bold()
    }
}
