//! # Error Handling
//!
//! User-facing error display for the askdb CLI, and the mapping from
//! library errors to exit codes.

use askdb_rag::RagError;
use colored::Colorize;

use crate::exit_codes::*;

/// Exit code for a library error.
pub fn exit_code_for(error: &RagError) -> i32 {
    match error {
        RagError::Configuration(_) => EXIT_CONFIG_ERROR,
        RagError::Embedding(_) | RagError::Index(_) | RagError::Retrieval(_) => {
            EXIT_RETRIEVAL_ERROR
        }
        RagError::Generation(_) | RagError::NoSqlGenerated { .. } => EXIT_GENERATION_ERROR,
        RagError::PolicyViolation { .. } => EXIT_POLICY_VIOLATION,
        RagError::Execution(_) => EXIT_EXECUTION_ERROR,
        RagError::NoRelevantTables => EXIT_NO_RELEVANT_TABLES,
        RagError::Serialization(_) => EXIT_ERROR,
    }
}

/// Display a library error with suggestions, returning its exit code.
pub fn report_rag_error(error: &RagError, verbose: bool) -> i32 {
    match error {
        RagError::Configuration(message) => display_config_error(message),
        RagError::Embedding(_) | RagError::Index(_) | RagError::Retrieval(_) => {
            display_retrieval_error(&error.to_string())
        }
        RagError::Generation(message) => display_generation_error(message),
        RagError::NoSqlGenerated { raw_output } => {
            display_error("The model response did not contain a SQL statement");
            if verbose {
                eprintln!();
                eprintln!("{}", "Model output:".dimmed());
                eprintln!("{}", raw_output.dimmed());
            } else {
                eprintln!(
                    "{} Re-run with --verbose to see the model output.",
                    "Tip:".cyan().bold()
                );
            }
        }
        RagError::PolicyViolation { errors, warnings } => {
            display_policy_violation(errors, warnings)
        }
        RagError::Execution(message) => {
            eprintln!("{} Execution failed: {}", "✗".red().bold(), message);
        }
        RagError::NoRelevantTables => {
            display_error("No relevant tables found for the question");
            eprintln!();
            eprintln!(
                "{} Run `askdb ingest` to index the knowledge base, or rephrase the question.",
                "Tip:".cyan().bold()
            );
        }
        RagError::Serialization(_) => display_error(&error.to_string()),
    }
    exit_code_for(error)
}

/// Display a configuration error with helpful suggestions
pub fn display_config_error(message: &str) {
    eprintln!("{} Configuration error: {}", "✗".red().bold(), message);
    eprintln!();
    eprintln!("{}", "Possible causes:".yellow());
    eprintln!("  • Knowledge base directory does not exist");
    eprintln!("  • Configuration file is invalid");
    eprintln!();
    eprintln!(
        "{} Run `askdb config show` to inspect the effective configuration.",
        "Tip:".cyan().bold()
    );
}

/// Display an embedding or vector index error with helpful suggestions
pub fn display_retrieval_error(message: &str) {
    eprintln!("{} Retrieval error: {}", "✗".red().bold(), message);
    eprintln!();
    eprintln!("{}", "Possible causes:".yellow());
    eprintln!("  • Embedding service is not running");
    eprintln!("  • Embedding model is not installed");
    eprintln!("  • Index was built with a different embedding model");
    eprintln!();
    eprintln!("{} Run `askdb status` to check every service.", "Tip:".cyan().bold());
}

/// Display a language model error with helpful suggestions
pub fn display_generation_error(message: &str) {
    eprintln!("{} Generation error: {}", "✗".red().bold(), message);
    eprintln!();
    eprintln!("{}", "Possible causes:".yellow());
    eprintln!("  • LLM service is unreachable or timed out");
    eprintln!("  • API key is missing or invalid");
    eprintln!();
    eprintln!("{} Run `askdb status` to check every service.", "Tip:".cyan().bold());
}

/// Display every policy violation, then the advisory warnings.
pub fn display_policy_violation(errors: &[String], warnings: &[String]) {
    eprintln!("{} Generated SQL was rejected:", "✗".red().bold());
    for error in errors {
        eprintln!("  • {}", error.red());
    }
    for warning in warnings {
        eprintln!("  • {}", warning.yellow());
    }
}

/// Display a validation error with helpful suggestions
pub fn display_validation_error(message: &str) {
    eprintln!("{} Invalid request: {}", "✗".red().bold(), message);
    eprintln!();
    eprintln!(
        "{} Check the command options and try again.",
        "Tip:".cyan().bold()
    );
}

/// Display a generic error
pub fn display_error(message: &str) {
    eprintln!("{} Error: {}", "✗".red().bold(), message);
}

/// Display a warning
pub fn display_warning(message: &str) {
    eprintln!("{} Warning: {}", "⚠".yellow().bold(), message);
}

/// Display a success message
pub fn display_success(message: &str) {
    println!("{} {}", "✓".green().bold(), message);
}

/// Display an info message
pub fn display_info(message: &str) {
    println!("{} {}", "ℹ".blue().bold(), message);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_code_for_each_stage() {
        assert_eq!(
            exit_code_for(&RagError::Configuration("x".into())),
            EXIT_CONFIG_ERROR
        );
        assert_eq!(
            exit_code_for(&RagError::retrieval(RagError::Embedding("x".into()))),
            EXIT_RETRIEVAL_ERROR
        );
        assert_eq!(
            exit_code_for(&RagError::NoSqlGenerated {
                raw_output: String::new()
            }),
            EXIT_GENERATION_ERROR
        );
        assert_eq!(
            exit_code_for(&RagError::PolicyViolation {
                errors: vec!["x".into()],
                warnings: vec![]
            }),
            EXIT_POLICY_VIOLATION
        );
        assert_eq!(
            exit_code_for(&RagError::Execution("x".into())),
            EXIT_EXECUTION_ERROR
        );
        assert_eq!(
            exit_code_for(&RagError::NoRelevantTables),
            EXIT_NO_RELEVANT_TABLES
        );
    }

    // These just verify the display functions don't panic.

    #[test]
    fn test_report_rag_error_does_not_panic() {
        let code = report_rag_error(
            &RagError::PolicyViolation {
                errors: vec!["Only SELECT queries are allowed".into()],
                warnings: vec!["Query has no row limit (LIMIT or TOP)".into()],
            },
            false,
        );
        assert_eq!(code, EXIT_POLICY_VIOLATION);
    }

    #[test]
    fn test_display_helpers_do_not_panic() {
        display_validation_error("Question is empty");
        display_warning("This might cause issues");
        display_success("Operation completed");
        display_info("Processing tables...");
    }
}
