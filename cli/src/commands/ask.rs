//! # Ask Command
//!
//! Turns a natural-language question into validated SQL, optionally
//! running it.
//!
//! ## Usage
//!
//! ```bash
//! # Generate SQL only
//! askdb ask "orders from last week"
//!
//! # Generate and run it, returning at most 20 rows
//! askdb ask "orders from last week" --execute --limit 20
//!
//! # Get JSON output
//! askdb ask "pending results for test GLU" --json
//! ```

use anyhow::Result;
use askdb_rag::{Answer, AskOptions};

use crate::config::Config;
use crate::context;
use crate::errors::{display_validation_error, exit_code_for, report_rag_error};
use crate::exit_codes::*;
use crate::output::print_answer;

/// Arguments for the ask command
#[derive(Debug)]
pub struct AskArgs {
    /// The natural language question
    pub question: String,
    /// Run the SQL against the configured database
    pub execute: bool,
    /// Maximum rows to return
    pub limit: Option<usize>,
    /// Schema documents to retrieve
    pub top_k: Option<usize>,
    /// Output JSON instead of formatted text
    pub json: bool,
    /// Verbose output
    pub verbose: bool,
}

/// Execute the ask command
///
/// # Returns
///
/// * `Ok(EXIT_SUCCESS)` - SQL generated (and executed, if requested)
/// * `Ok(EXIT_INVALID_INPUT)` - Empty question
/// * `Ok(EXIT_EXECUTION_ERROR)` - The database rejected the validated SQL
/// * Other codes per failing stage, see [`crate::errors::exit_code_for`]
pub async fn execute(args: AskArgs, config: &Config) -> Result<i32> {
    if args.question.trim().is_empty() {
        display_validation_error("Question is empty");
        return Ok(EXIT_INVALID_INPUT);
    }

    let pipeline = match context::pipeline(config).await {
        Ok(pipeline) => pipeline,
        Err(e) => return Ok(report_rag_error(&e, args.verbose)),
    };

    let options = AskOptions {
        execute: args.execute,
        limit: args.limit,
        top_k: args.top_k,
    };
    let answer = match pipeline.answer(&args.question, &options).await {
        Ok(answer) => answer,
        Err(e) => {
            if args.json {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&serde_json::json!({
                        "question": args.question,
                        "error": e.to_string(),
                    }))?
                );
                return Ok(exit_code_for(&e));
            }
            return Ok(report_rag_error(&e, args.verbose));
        }
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&answer)?);
    } else {
        print_answer(&answer, args.verbose);
    }
    Ok(exit_code(&answer))
}

/// Success unless execution was requested and failed.
pub fn exit_code(answer: &Answer) -> i32 {
    match &answer.execution {
        Some(outcome) if outcome.is_failure() => EXIT_EXECUTION_ERROR,
        _ => EXIT_SUCCESS,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use askdb_rag::ExecutionOutcome;

    fn answer(execution: Option<ExecutionOutcome>) -> Answer {
        Answer {
            question: "orders".to_string(),
            sql: "SELECT * FROM o (NOLOCK);".to_string(),
            explanation: String::new(),
            tables_used: vec!["o".to_string()],
            retrieved: vec![],
            warnings: vec![],
            strategy: None,
            execution,
        }
    }

    #[test]
    fn test_exit_code() {
        assert_eq!(exit_code(&answer(None)), EXIT_SUCCESS);
        assert_eq!(
            exit_code(&answer(Some(ExecutionOutcome::Failed {
                error: "no such table: o".to_string()
            }))),
            EXIT_EXECUTION_ERROR
        );
    }

    #[tokio::test]
    async fn test_empty_question_is_invalid_input() {
        let args = AskArgs {
            question: "   ".to_string(),
            execute: false,
            limit: None,
            top_k: None,
            json: false,
            verbose: false,
        };
        assert_eq!(
            execute(args, &Config::default()).await.unwrap(),
            EXIT_INVALID_INPUT
        );
    }
}
