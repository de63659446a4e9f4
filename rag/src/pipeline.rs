//! Question answering pipeline.
//!
//! Runs one question strictly in sequence: retrieve schemas, compose the
//! prompt, generate, parse, validate and optionally execute. The result
//! cache is the only state shared between concurrent questions.

use std::sync::Arc;
use std::time::Duration;

use log::{info, warn};
use serde::Serialize;

use crate::cache::{CacheKey, CacheStats, ResultCache};
use crate::error::RagError;
use crate::executor::QueryExecutor;
use crate::generation::CompletionProvider;
use crate::parser::parse_response;
use crate::policy::validate_sql;
use crate::prompt::PromptComposer;
use crate::retrieval::SchemaRetriever;
use crate::types::{ExecutionResult, SqlStrategy, ValidationResult};

/// Tunables for answering a question.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Schema documents retrieved per question.
    pub top_k: usize,
    /// Rows returned when the caller gives no limit.
    pub default_limit: usize,
    /// Hard ceiling on returned rows.
    pub max_limit: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            top_k: 5,
            default_limit: 100,
            max_limit: 1000,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct AskOptions {
    pub execute: bool,
    pub limit: Option<usize>,
    pub top_k: Option<usize>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RetrievedSummary {
    pub table: String,
    pub score: f32,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExecutionReport {
    pub cached: bool,
    pub columns: Vec<String>,
    pub rows: Vec<serde_json::Map<String, serde_json::Value>>,
    pub row_count: usize,
    pub elapsed_seconds: f64,
    /// More rows were available than the limit allowed.
    pub truncated: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum ExecutionOutcome {
    Rows(ExecutionReport),
    Failed { error: String },
}

impl ExecutionOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, ExecutionOutcome::Failed { .. })
    }
}

/// A validated answer to one question.
#[derive(Debug, Clone, Serialize)]
pub struct Answer {
    pub question: String,
    pub sql: String,
    pub explanation: String,
    pub tables_used: Vec<String>,
    pub retrieved: Vec<RetrievedSummary>,
    pub warnings: Vec<String>,
    pub strategy: Option<SqlStrategy>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub execution: Option<ExecutionOutcome>,
}

/// Readiness of every collaborator, for status output.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineHealth {
    pub index_backend: &'static str,
    /// Number of indexed schema documents, or the error reaching the index.
    pub indexed_tables: Result<usize, String>,
    pub embedding_model: String,
    pub llm_provider: &'static str,
    pub llm_model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database_backend: Option<&'static str>,
    /// `None` when no database is configured.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database: Option<Result<(), String>>,
    pub cache: CacheStats,
}

pub struct SqlPipeline {
    retriever: SchemaRetriever,
    generator: Arc<dyn CompletionProvider>,
    composer: PromptComposer,
    executor: Option<Arc<dyn QueryExecutor>>,
    cache: Arc<ResultCache<ExecutionResult>>,
    allowed_tables: Vec<String>,
    config: PipelineConfig,
}

impl SqlPipeline {
    pub fn new(
        retriever: SchemaRetriever,
        generator: Arc<dyn CompletionProvider>,
        allowed_tables: Vec<String>,
    ) -> Self {
        Self {
            retriever,
            generator,
            composer: PromptComposer::default(),
            executor: None,
            cache: Arc::new(ResultCache::new(Duration::from_secs(300), 50)),
            allowed_tables,
            config: PipelineConfig::default(),
        }
    }

    pub fn with_composer(mut self, composer: PromptComposer) -> Self {
        self.composer = composer;
        self
    }

    pub fn with_executor(mut self, executor: Arc<dyn QueryExecutor>) -> Self {
        self.executor = Some(executor);
        self
    }

    pub fn with_cache(mut self, cache: Arc<ResultCache<ExecutionResult>>) -> Self {
        self.cache = cache;
        self
    }

    pub fn with_config(mut self, config: PipelineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn allowed_tables(&self) -> &[String] {
        &self.allowed_tables
    }

    pub fn cache(&self) -> &Arc<ResultCache<ExecutionResult>> {
        &self.cache
    }

    pub fn retriever(&self) -> &SchemaRetriever {
        &self.retriever
    }

    /// Check SQL against the read-only policy for this pipeline's tables.
    pub fn validate(&self, sql: &str) -> ValidationResult {
        validate_sql(sql, &self.allowed_tables)
    }

    /// Answer a question with validated SQL, executing it when asked to.
    ///
    /// Execution failures are reported on the answer; every earlier failure
    /// aborts the question.
    pub async fn answer(&self, question: &str, options: &AskOptions) -> Result<Answer, RagError> {
        let question = question.trim();
        info!("Answering: {question}");

        let top_k = options.top_k.unwrap_or(self.config.top_k);
        let tables = self.retriever.find_relevant(question, top_k).await?;
        if tables.is_empty() {
            return Err(RagError::NoRelevantTables);
        }

        let prompt = self.composer.compose(question, &tables);
        let raw = self.generator.generate(&prompt).await?;

        let candidate = parse_response(&raw);
        if !candidate.has_sql() {
            return Err(RagError::NoSqlGenerated { raw_output: raw });
        }

        let validation = self.validate(&candidate.sql);
        if !validation.is_valid {
            warn!(
                "Generated SQL rejected with {} error(s)",
                validation.errors.len()
            );
            return Err(RagError::PolicyViolation {
                errors: validation.errors,
                warnings: validation.warnings,
            });
        }

        let execution = if options.execute {
            Some(self.execute(&candidate.sql, options.limit).await)
        } else {
            None
        };

        Ok(Answer {
            question: question.to_string(),
            sql: candidate.sql,
            explanation: candidate.explanation,
            tables_used: candidate.tables_used,
            retrieved: tables
                .iter()
                .map(|t| RetrievedSummary {
                    table: t.table_name.clone(),
                    score: t.score,
                })
                .collect(),
            warnings: validation.warnings,
            strategy: candidate.strategy,
            execution,
        })
    }

    /// Run already validated SQL, serving repeated statements from the cache.
    async fn execute(&self, sql: &str, limit: Option<usize>) -> ExecutionOutcome {
        let Some(executor) = &self.executor else {
            return ExecutionOutcome::Failed {
                error: "no database is configured".to_string(),
            };
        };
        let limit = limit
            .unwrap_or(self.config.default_limit)
            .min(self.config.max_limit);

        let key = CacheKey::from(sql);
        let (result, cached) = match self.cache.get(&key) {
            Some(result) => (result, true),
            None => match executor.execute_read_query(sql).await {
                Ok(result) => {
                    self.cache.set(key, result.clone());
                    (result, false)
                }
                Err(e) => {
                    warn!("Query execution failed: {e}");
                    return ExecutionOutcome::Failed {
                        error: e.to_string(),
                    };
                }
            },
        };

        let truncated = result.rows.len() > limit;
        let mut rows = result.rows;
        rows.truncate(limit);
        info!(
            "Returned {} row(s){}",
            rows.len(),
            if cached { " from cache" } else { "" }
        );
        ExecutionOutcome::Rows(ExecutionReport {
            cached,
            columns: result.columns,
            row_count: rows.len(),
            rows,
            elapsed_seconds: result.elapsed_seconds,
            truncated,
        })
    }

    pub async fn health(&self) -> PipelineHealth {
        let index = self.retriever.index();
        let database = match &self.executor {
            Some(executor) => Some(executor.ping().await.map_err(|e| e.to_string())),
            None => None,
        };
        PipelineHealth {
            index_backend: index.backend(),
            indexed_tables: index.count().await.map_err(|e| e.to_string()),
            embedding_model: self.retriever.embedder().model_name().to_string(),
            llm_provider: self.generator.provider_name(),
            llm_model: self.generator.model_name().to_string(),
            database_backend: self.executor.as_ref().map(|e| e.backend()),
            database,
            cache: self.cache.stats(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::EmbeddingProvider;
    use crate::executor::SqliteExecutor;
    use crate::store::{MemoryIndex, SchemaIndex};
    use crate::types::{QueryExample, SchemaDocument, TableMetadata};
    use async_trait::async_trait;
    use chrono::NaiveDate;
    use std::sync::Mutex;
    use tempfile::TempDir;

    struct KeywordEmbedder;

    #[async_trait]
    impl EmbeddingProvider for KeywordEmbedder {
        async fn embed(&self, text: &str) -> Result<Vec<f32>, RagError> {
            let text = text.to_lowercase();
            Ok(vec![
                if text.contains("order") { 1.0 } else { 0.1 },
                if text.contains("result") { 1.0 } else { 0.1 },
            ])
        }

        async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, RagError> {
            let mut out = Vec::new();
            for text in texts {
                out.push(self.embed(text).await?);
            }
            Ok(out)
        }

        fn dimensions(&self) -> usize {
            2
        }

        fn model_name(&self) -> &str {
            "keyword"
        }
    }

    /// Returns a canned response and records the prompt it was given.
    struct CannedCompletion {
        response: String,
        prompts: Mutex<Vec<String>>,
    }

    impl CannedCompletion {
        fn new(response: &str) -> Arc<Self> {
            Arc::new(Self {
                response: response.to_string(),
                prompts: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl CompletionProvider for CannedCompletion {
        async fn generate(&self, prompt: &str) -> Result<String, RagError> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            Ok(self.response.clone())
        }

        fn model_name(&self) -> &str {
            "canned"
        }

        fn provider_name(&self) -> &'static str {
            "test"
        }
    }

    struct DownCompletion;

    #[async_trait]
    impl CompletionProvider for DownCompletion {
        async fn generate(&self, _prompt: &str) -> Result<String, RagError> {
            Err(RagError::Generation("model unavailable".to_string()))
        }

        fn model_name(&self) -> &str {
            "down"
        }

        fn provider_name(&self) -> &'static str {
            "test"
        }
    }

    const WEEKLY_ORDERS: &str = "SQL_QUERY:\nSELECT TOP 10 aoordno, aodate FROM o (NOLOCK)\nWHERE aodate BETWEEN 20250811 AND 20250818\nORDER BY aoordno;\n\nEXPLANATION:\nOrders placed in the last week\n\nTABLES_USED:\no";

    async fn orders_retriever() -> SchemaRetriever {
        let index = Arc::new(MemoryIndex::new(2));
        let table = TableMetadata {
            name: "o".to_string(),
            description: Some("Lab orders".to_string()),
            examples: vec![QueryExample {
                query: "SELECT * FROM o (NOLOCK) WHERE aodate BETWEEN 20250801 AND 20250807".to_string(),
                description: "Orders in a date range".to_string(),
                ..Default::default()
            }],
            ..Default::default()
        };
        let document = SchemaDocument::build(&table, None);
        let vector = KeywordEmbedder.embed(&document.text).await.unwrap();
        index.upsert_document(&document, vector).await.unwrap();
        SchemaRetriever::new(Arc::new(KeywordEmbedder), index)
    }

    fn orders_db() -> (TempDir, SqliteExecutor) {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("lab.db");
        let conn = rusqlite::Connection::open(&path).unwrap();
        conn.execute_batch(
            "CREATE TABLE o (aoordno INTEGER, aodate INTEGER);
             INSERT INTO o VALUES (1, 20250812);
             INSERT INTO o VALUES (2, 20250814);
             INSERT INTO o VALUES (3, 20250817);
             INSERT INTO o VALUES (4, 20250701);",
        )
        .unwrap();
        (dir, SqliteExecutor::new(path))
    }

    fn pipeline(retriever: SchemaRetriever, generator: Arc<dyn CompletionProvider>) -> SqlPipeline {
        SqlPipeline::new(retriever, generator, vec!["o".to_string(), "r".to_string()]).with_composer(
            PromptComposer::new(3).with_today(NaiveDate::from_ymd_opt(2025, 8, 18).unwrap()),
        )
    }

    #[tokio::test]
    async fn test_orders_from_last_week() {
        let generator = CannedCompletion::new(WEEKLY_ORDERS);
        let pipeline = pipeline(orders_retriever().await, generator.clone());

        let answer = pipeline
            .answer("orders from last week", &AskOptions::default())
            .await
            .unwrap();
        assert!(answer.sql.starts_with("SELECT TOP 10"));
        assert!(answer.sql.ends_with(';'));
        assert_eq!(answer.tables_used, vec!["o"]);
        assert_eq!(answer.explanation, "Orders placed in the last week");
        assert_eq!(answer.retrieved[0].table, "o");
        assert_eq!(answer.strategy, Some(SqlStrategy::LabeledSection));
        assert!(answer.execution.is_none());

        let prompts = generator.prompts.lock().unwrap();
        assert!(prompts[0].contains("20250818"));
        assert!(prompts[0].contains("20250811"));
    }

    #[tokio::test]
    async fn test_execution_is_cached_and_limited() {
        let (_dir, executor) = orders_db();
        let pipeline = pipeline(orders_retriever().await, CannedCompletion::new(WEEKLY_ORDERS))
            .with_executor(Arc::new(executor));
        let options = AskOptions {
            execute: true,
            limit: Some(2),
            ..Default::default()
        };

        let first = pipeline.answer("orders from last week", &options).await.unwrap();
        match first.execution {
            Some(ExecutionOutcome::Rows(report)) => {
                assert!(!report.cached);
                assert_eq!(report.row_count, 2);
                assert!(report.truncated);
                assert_eq!(report.columns, vec!["aoordno", "aodate"]);
            }
            other => panic!("unexpected execution: {other:?}"),
        }

        let second = pipeline.answer("orders from last week", &options).await.unwrap();
        match second.execution {
            Some(ExecutionOutcome::Rows(report)) => assert!(report.cached),
            other => panic!("unexpected execution: {other:?}"),
        }
        assert_eq!(pipeline.cache().stats().hits, 1);
    }

    #[tokio::test]
    async fn test_failed_execution_is_reported_not_cached() {
        let dir = TempDir::new().unwrap();
        let executor = SqliteExecutor::new(dir.path().join("empty.db"));
        let pipeline = pipeline(orders_retriever().await, CannedCompletion::new(WEEKLY_ORDERS))
            .with_executor(Arc::new(executor));
        let options = AskOptions {
            execute: true,
            ..Default::default()
        };

        let answer = pipeline.answer("orders", &options).await.unwrap();
        assert!(answer.execution.unwrap().is_failure());
        assert!(pipeline.cache().is_empty());
    }

    #[tokio::test]
    async fn test_execute_without_database() {
        let pipeline = pipeline(orders_retriever().await, CannedCompletion::new(WEEKLY_ORDERS));
        let options = AskOptions {
            execute: true,
            ..Default::default()
        };
        let answer = pipeline.answer("orders", &options).await.unwrap();
        assert!(answer.execution.unwrap().is_failure());
    }

    #[tokio::test]
    async fn test_empty_index_is_no_relevant_tables() {
        let retriever = SchemaRetriever::new(Arc::new(KeywordEmbedder), Arc::new(MemoryIndex::new(2)));
        let pipeline = pipeline(retriever, CannedCompletion::new(WEEKLY_ORDERS));
        let err = pipeline.answer("orders", &AskOptions::default()).await.unwrap_err();
        assert!(matches!(err, RagError::NoRelevantTables));
    }

    #[tokio::test]
    async fn test_mutating_sql_is_policy_violation() {
        let generator = CannedCompletion::new("SQL_QUERY:\nDROP TABLE o;\n\nEXPLANATION:\nBad\n\nTABLES_USED:\no");
        let pipeline = pipeline(orders_retriever().await, generator);
        let err = pipeline.answer("orders", &AskOptions::default()).await.unwrap_err();
        match err {
            RagError::PolicyViolation { errors, .. } => {
                assert!(errors.iter().any(|e| e.contains("DROP")));
                assert!(errors.iter().any(|e| e.contains("Only SELECT")));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_unauthorized_table_is_policy_violation() {
        let generator = CannedCompletion::new("```sql\nSELECT * FROM secrets (NOLOCK);\n```");
        let pipeline = pipeline(orders_retriever().await, generator);
        let err = pipeline.answer("orders", &AskOptions::default()).await.unwrap_err();
        match err {
            RagError::PolicyViolation { errors, .. } => {
                assert!(errors.iter().any(|e| e.contains("secrets")));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_prose_only_response_is_no_sql() {
        let generator = CannedCompletion::new("I cannot answer that.");
        let pipeline = pipeline(orders_retriever().await, generator);
        let err = pipeline.answer("orders", &AskOptions::default()).await.unwrap_err();
        match err {
            RagError::NoSqlGenerated { raw_output } => assert_eq!(raw_output, "I cannot answer that."),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_generation_failure_aborts() {
        let pipeline = pipeline(orders_retriever().await, Arc::new(DownCompletion));
        let err = pipeline.answer("orders", &AskOptions::default()).await.unwrap_err();
        assert!(matches!(err, RagError::Generation(_)));
    }

    #[tokio::test]
    async fn test_health() {
        let (_dir, executor) = orders_db();
        let pipeline = pipeline(orders_retriever().await, CannedCompletion::new(WEEKLY_ORDERS))
            .with_executor(Arc::new(executor));
        let health = pipeline.health().await;
        assert_eq!(health.index_backend, "memory");
        assert_eq!(health.indexed_tables, Ok(1));
        assert_eq!(health.llm_model, "canned");
        assert_eq!(health.database_backend, Some("sqlite"));
        assert_eq!(health.database, Some(Ok(())));
    }
}
