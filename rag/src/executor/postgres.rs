use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures::TryStreamExt;
use log::debug;
use serde_json::{Map, Value};
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::{Column, Row, TypeInfo, ValueRef};

use super::{DEFAULT_STATEMENT_TIMEOUT, QueryExecutor, portable_sql};
use crate::error::RagError;
use crate::types::ExecutionResult;

pub const DEFAULT_POOL_SIZE: u32 = 5;

/// Executes queries on PostgreSQL inside read-only transactions with a
/// per-statement timeout.
pub struct PostgresExecutor {
    pool: PgPool,
    timeout: Duration,
    max_rows: usize,
}

impl PostgresExecutor {
    /// Create the pool. Connections are established on first use.
    pub fn connect_lazy(url: &str, timeout: Duration) -> Result<Self, RagError> {
        let pool = PgPoolOptions::new()
            .max_connections(DEFAULT_POOL_SIZE)
            .acquire_timeout(Duration::from_secs(5))
            .connect_lazy(url)
            .map_err(|e| RagError::Configuration(format!("invalid database url: {e}")))?;
        Ok(Self {
            pool,
            timeout,
            max_rows: usize::MAX,
        })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self {
            pool,
            timeout: DEFAULT_STATEMENT_TIMEOUT,
            max_rows: usize::MAX,
        }
    }

    pub fn with_max_rows(mut self, max_rows: usize) -> Self {
        self.max_rows = max_rows;
        self
    }

    /// Close the pool, waiting for checked-out connections to be returned.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

fn execution_error(e: sqlx::Error) -> RagError {
    match e {
        sqlx::Error::Database(db) => RagError::Execution(db.message().to_string()),
        other => RagError::Execution(other.to_string()),
    }
}

/// Convert one column of a row to JSON, by Postgres type name.
fn column_to_json(row: &PgRow, index: usize) -> Result<Value, sqlx::Error> {
    if row.try_get_raw(index)?.is_null() {
        return Ok(Value::Null);
    }

    let type_name = row.columns()[index].type_info().name().to_string();
    let value = match type_name.as_str() {
        "BOOL" => Value::from(row.try_get::<bool, _>(index)?),
        "INT2" => Value::from(row.try_get::<i16, _>(index)?),
        "INT4" => Value::from(row.try_get::<i32, _>(index)?),
        "INT8" => Value::from(row.try_get::<i64, _>(index)?),
        "FLOAT4" => Value::from(row.try_get::<f32, _>(index)?),
        "FLOAT8" => Value::from(row.try_get::<f64, _>(index)?),
        "JSON" | "JSONB" => row.try_get::<Value, _>(index)?,
        "UUID" => Value::from(row.try_get::<uuid::Uuid, _>(index)?.to_string()),
        "DATE" => Value::from(row.try_get::<chrono::NaiveDate, _>(index)?.to_string()),
        "TIMESTAMP" => Value::from(
            row.try_get::<chrono::NaiveDateTime, _>(index)?
                .to_string(),
        ),
        "TIMESTAMPTZ" => Value::from(
            row.try_get::<chrono::DateTime<chrono::Utc>, _>(index)?
                .to_rfc3339(),
        ),
        "BYTEA" => Value::from(hex::encode(row.try_get::<Vec<u8>, _>(index)?)),
        _ => match row.try_get::<String, _>(index) {
            Ok(text) => Value::from(text),
            Err(_) => Value::String(format!("<{type_name}>")),
        },
    };
    Ok(value)
}

#[async_trait]
impl QueryExecutor for PostgresExecutor {
    async fn execute_read_query(&self, sql: &str) -> Result<ExecutionResult, RagError> {
        let sql = portable_sql(sql);
        debug!("Executing on postgres: {sql}");
        let started = Instant::now();

        let mut tx = self.pool.begin().await.map_err(execution_error)?;
        sqlx::query("SET TRANSACTION READ ONLY")
            .execute(&mut *tx)
            .await
            .map_err(execution_error)?;
        sqlx::query(&format!(
            "SET LOCAL statement_timeout = {}",
            self.timeout.as_millis()
        ))
        .execute(&mut *tx)
        .await
        .map_err(execution_error)?;

        let mut columns: Vec<String> = Vec::new();
        let mut rows = Vec::new();
        {
            let mut stream = sqlx::query(&sql).fetch(&mut *tx);
            while rows.len() < self.max_rows {
                let Some(row) = stream.try_next().await.map_err(execution_error)? else {
                    break;
                };
                if columns.is_empty() {
                    columns = row.columns().iter().map(|c| c.name().to_string()).collect();
                }
                let mut record = Map::new();
                for (i, column) in columns.iter().enumerate() {
                    record.insert(
                        column.clone(),
                        column_to_json(&row, i).map_err(execution_error)?,
                    );
                }
                rows.push(record);
            }
        }
        tx.rollback().await.map_err(execution_error)?;

        Ok(ExecutionResult {
            row_count: rows.len(),
            columns,
            rows,
            elapsed_seconds: started.elapsed().as_secs_f64(),
        })
    }

    async fn ping(&self) -> Result<(), RagError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map(|_| ())
            .map_err(execution_error)
    }

    fn backend(&self) -> &'static str {
        "postgres"
    }
}
