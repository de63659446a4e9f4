//! # Exit Codes
//!
//! Standard exit codes for the askdb CLI.
//!
//! Each failure stage of answering a question has its own code so scripts
//! can tell a rejected query from an unreachable model.

/// Successful execution
pub const EXIT_SUCCESS: i32 = 0;

/// General error (unspecified)
pub const EXIT_ERROR: i32 = 1;

/// Configuration error (invalid config, missing knowledge base)
pub const EXIT_CONFIG_ERROR: i32 = 2;

/// Embedding provider or vector index failed
pub const EXIT_RETRIEVAL_ERROR: i32 = 3;

/// Language model failed or returned no SQL
pub const EXIT_GENERATION_ERROR: i32 = 4;

/// SQL rejected by the read-only policy
pub const EXIT_POLICY_VIOLATION: i32 = 5;

/// Database rejected or failed the query
pub const EXIT_EXECUTION_ERROR: i32 = 6;

/// Invalid input (empty question, unknown table, bad arguments)
pub const EXIT_INVALID_INPUT: i32 = 7;

/// No indexed table matched the question
pub const EXIT_NO_RELEVANT_TABLES: i32 = 8;
