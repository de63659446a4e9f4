use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use log::debug;
use rusqlite::types::ValueRef;
use rusqlite::{Connection, OpenFlags};
use serde_json::{Map, Value};

use super::{DEFAULT_STATEMENT_TIMEOUT, QueryExecutor, portable_sql};
use crate::error::RagError;
use crate::types::ExecutionResult;

/// Executes queries against a SQLite file opened read-only.
///
/// Each query opens its own connection on a blocking thread.
pub struct SqliteExecutor {
    path: PathBuf,
    timeout: Duration,
    max_rows: usize,
}

impl SqliteExecutor {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            timeout: DEFAULT_STATEMENT_TIMEOUT,
            max_rows: usize::MAX,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Stop reading after this many rows.
    pub fn with_max_rows(mut self, max_rows: usize) -> Self {
        self.max_rows = max_rows;
        self
    }

    /// Accepts a plain path or a `sqlite:` / `sqlite://` URL.
    pub fn from_url(url: &str) -> Self {
        let path = url
            .strip_prefix("sqlite://")
            .or_else(|| url.strip_prefix("sqlite:"))
            .unwrap_or(url);
        Self::new(path)
    }

    fn open(path: &Path, timeout: Duration) -> Result<Connection, RagError> {
        let flags = OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX;
        let conn = Connection::open_with_flags(path, flags).map_err(|e| {
            RagError::Execution(format!("failed to open {}: {e}", path.display()))
        })?;
        conn.busy_timeout(timeout)
            .map_err(|e| RagError::Execution(e.to_string()))?;
        Ok(conn)
    }

    async fn run<T, F>(&self, work: F) -> Result<T, RagError>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T, RagError> + Send + 'static,
    {
        let path = self.path.clone();
        let timeout = self.timeout;
        let task = tokio::task::spawn_blocking(move || {
            let conn = Self::open(&path, timeout)?;
            work(&conn)
        });

        match tokio::time::timeout(timeout, task).await {
            Ok(Ok(result)) => result,
            Ok(Err(join)) => Err(RagError::Execution(format!("query task failed: {join}"))),
            Err(_) => Err(RagError::Execution(format!(
                "query timed out after {}s",
                timeout.as_secs()
            ))),
        }
    }
}

fn to_json(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::from(i),
        ValueRef::Real(f) => serde_json::Number::from_f64(f).map_or(Value::Null, Value::Number),
        ValueRef::Text(bytes) => Value::String(String::from_utf8_lossy(bytes).into_owned()),
        ValueRef::Blob(bytes) => Value::String(hex::encode(bytes)),
    }
}

fn query_rows(conn: &Connection, sql: &str, max_rows: usize) -> Result<ExecutionResult, RagError> {
    let started = Instant::now();
    let mut stmt = conn
        .prepare(sql)
        .map_err(|e| RagError::Execution(e.to_string()))?;
    let columns: Vec<String> = stmt.column_names().iter().map(|c| c.to_string()).collect();

    let mut rows = stmt
        .query([])
        .map_err(|e| RagError::Execution(e.to_string()))?;
    let mut out = Vec::new();
    while out.len() < max_rows {
        let Some(row) = rows.next().map_err(|e| RagError::Execution(e.to_string()))? else {
            break;
        };
        let mut record = Map::new();
        for (i, column) in columns.iter().enumerate() {
            let value = row
                .get_ref(i)
                .map_err(|e| RagError::Execution(e.to_string()))?;
            record.insert(column.clone(), to_json(value));
        }
        out.push(record);
    }

    Ok(ExecutionResult {
        row_count: out.len(),
        columns,
        rows: out,
        elapsed_seconds: started.elapsed().as_secs_f64(),
    })
}

#[async_trait]
impl QueryExecutor for SqliteExecutor {
    async fn execute_read_query(&self, sql: &str) -> Result<ExecutionResult, RagError> {
        let sql = portable_sql(sql);
        let max_rows = self.max_rows;
        debug!("Executing on sqlite: {sql}");
        self.run(move |conn| query_rows(conn, &sql, max_rows)).await
    }

    async fn ping(&self) -> Result<(), RagError> {
        self.run(|conn| {
            conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))
                .map(|_| ())
                .map_err(|e| RagError::Execution(e.to_string()))
        })
        .await
    }

    fn backend(&self) -> &'static str {
        "sqlite"
    }
}
