//! Read-only query execution.
//!
//! One implementation per database backend, chosen once when the
//! application is wired up. Callers only see [`QueryExecutor`].

mod postgres;
mod sqlite;

pub use postgres::PostgresExecutor;
pub use sqlite::SqliteExecutor;

use std::sync::LazyLock;
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;

use crate::error::RagError;
use crate::types::ExecutionResult;

/// Default per-statement timeout.
pub const DEFAULT_STATEMENT_TIMEOUT: Duration = Duration::from_secs(60);

#[async_trait]
pub trait QueryExecutor: Send + Sync {
    /// Run a validated SELECT and return its rows.
    async fn execute_read_query(&self, sql: &str) -> Result<ExecutionResult, RagError>;

    /// Round-trip a trivial query.
    async fn ping(&self) -> Result<(), RagError>;

    fn backend(&self) -> &'static str;
}

static LOCKING_HINT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\s*(?:\bWITH\s*)?\(\s*NOLOCK\s*\)").unwrap());

static SELECT_TOP_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^\s*SELECT\s+(DISTINCT\s+)?TOP\s*\(?\s*(\d+)\s*\)?\s+").unwrap());

static LIMIT_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)\bLIMIT\s+\d+").unwrap());

/// Rewrite SQL Server conventions the generated SQL follows (`(NOLOCK)`
/// hints, `SELECT TOP n`) into the portable form SQLite and PostgreSQL
/// accept.
pub fn portable_sql(sql: &str) -> String {
    let mut sql = LOCKING_HINT_RE.replace_all(sql, "").trim().to_string();
    while sql.ends_with(';') {
        sql.pop();
        sql = sql.trim_end().to_string();
    }

    if let Some(caps) = SELECT_TOP_RE.captures(&sql) {
        let limit = caps[2].to_string();
        let distinct = caps.get(1).map_or("", |m| m.as_str());
        let rest = sql[caps.get(0).map_or(0, |m| m.end())..].to_string();
        sql = format!("SELECT {distinct}{rest}");
        if !LIMIT_RE.is_match(&sql) {
            sql = format!("{sql} LIMIT {limit}");
        }
    }
    sql
}
