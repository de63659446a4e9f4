//! # askdb CLI Library
//!
//! Core functionality for the askdb CLI, which answers plain-language
//! questions with validated, read-only SQL.
//!
//! ## Modules
//!
//! - [`commands`] - CLI command implementations
//! - [`config`] - Configuration management
//! - [`context`] - Component wiring from configuration
//! - [`errors`] - Error display and exit code mapping
//! - [`exit_codes`] - Standard exit codes
//! - [`output`] - Terminal rendering of answers and result sets

pub mod commands;
pub mod config;
pub mod context;
pub mod errors;
pub mod exit_codes;
pub mod output;

// Re-export commonly used types
pub use config::Config;
