//! # Validate Command
//!
//! Checks a SQL statement against the read-only policy without generating
//! or executing anything.
//!
//! ## Usage
//!
//! ```bash
//! askdb validate "SELECT TOP 10 * FROM o (NOLOCK)"
//! ```

use anyhow::Result;
use askdb_rag::{ValidationResult, validate_sql};
use colored::Colorize;

use crate::config::Config;
use crate::errors::display_validation_error;
use crate::exit_codes::*;

/// Arguments for the validate command
#[derive(Debug)]
pub struct ValidateArgs {
    pub sql: String,
    pub json: bool,
}

/// Execute the validate command
///
/// # Returns
///
/// * `Ok(EXIT_SUCCESS)` - The statement passes the policy
/// * `Ok(EXIT_POLICY_VIOLATION)` - At least one policy error
/// * `Ok(EXIT_INVALID_INPUT)` - Empty statement
pub fn execute(args: ValidateArgs, config: &Config) -> Result<i32> {
    if args.sql.trim().is_empty() {
        display_validation_error("SQL statement is empty");
        return Ok(EXIT_INVALID_INPUT);
    }

    let result = validate_sql(&args.sql, &config.knowledge_base.allowed_tables);
    if args.json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        print_result(&result);
    }
    Ok(exit_code(&result))
}

fn print_result(result: &ValidationResult) {
    if result.is_valid {
        println!("{} {}", "✓".bright_green().bold(), "Valid".green());
    } else {
        println!("{} {}", "✗".red().bold(), "Invalid".red());
    }
    for error in &result.errors {
        println!("  {} {}", "error:".red().bold(), error);
    }
    for warning in &result.warnings {
        println!("  {} {}", "warning:".yellow().bold(), warning);
    }
}

pub fn exit_code(result: &ValidationResult) -> i32 {
    if result.is_valid {
        EXIT_SUCCESS
    } else {
        EXIT_POLICY_VIOLATION
    }
}
