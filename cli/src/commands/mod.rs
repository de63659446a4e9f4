//! # CLI Command Implementations
//!
//! Each submodule implements one top-level command or command group.
//!
//! ## Available Commands
//!
//! - [`ingest`] - Build and index schema documents
//! - [`ask`] - Turn a question into validated SQL
//! - [`validate`] - Check SQL against the read-only policy
//! - [`tables`] - List allow-listed tables
//! - [`schema`] - Show one table's schema document
//! - [`check`] - Verify the knowledge base
//! - [`shell`] - Interactive question loop
//! - [`status`] - Check every service
//! - [`config`] - Show or initialise configuration

pub mod ask;
pub mod check;
pub mod config;
pub mod ingest;
pub mod schema;
pub mod shell;
pub mod status;
pub mod tables;
pub mod validate;
