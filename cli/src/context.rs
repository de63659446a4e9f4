//! # Component Wiring
//!
//! Builds the library components from a [`Config`]. Every backend is
//! chosen here, once; commands only see the capability traits.

use std::sync::Arc;
use std::time::Duration;

use askdb_rag::{
    AnthropicCompletion, CompletionProvider, EmbeddingProvider, ExecutionResult, KnowledgeBase,
    LanceSchemaIndex, MemoryIndex, OllamaCompletion, OllamaProvider, OpenAiCompletion,
    OpenAiProvider, PipelineConfig, PostgresExecutor, PromptComposer, QueryExecutor, RagError,
    ResultCache, SchemaIndex, SchemaIngestor, SchemaRetriever, SqlPipeline, SqliteExecutor,
};
use log::debug;

use crate::config::{
    CacheConfig, Config, DatabaseConfig, DatabaseDriver, EmbeddingConfig, IndexBackend,
    IndexConfig, LlmConfig,
};

pub fn knowledge_base(config: &Config) -> KnowledgeBase {
    KnowledgeBase::new(
        config.knowledge_base.path.clone(),
        config.knowledge_base.allowed_tables.clone(),
    )
}

pub fn build_embedder(config: &EmbeddingConfig) -> Result<Arc<dyn EmbeddingProvider>, RagError> {
    match config.provider.as_str() {
        "ollama" => Ok(Arc::new(OllamaProvider::new(
            config.model.clone(),
            config.endpoint.clone(),
            Some(config.dimensions),
        ))),
        "openai" => {
            let api_key = config.get_api_key().ok_or_else(|| {
                RagError::Configuration(format!(
                    "embedding API key is not set (expected in {})",
                    config.api_key_env.as_deref().unwrap_or("embedding.api_key_env")
                ))
            })?;
            Ok(Arc::new(OpenAiProvider::new(
                api_key,
                config.model.clone(),
                config.endpoint.clone(),
                Some(config.dimensions),
            )))
        }
        other => Err(RagError::Configuration(format!(
            "unknown embedding provider: {other}"
        ))),
    }
}

pub fn build_generator(config: &LlmConfig) -> Result<Arc<dyn CompletionProvider>, RagError> {
    let timeout = Duration::from_secs(config.timeout_seconds);
    let endpoint = Some(config.endpoint.clone());
    match config.provider.as_str() {
        "ollama" => Ok(Arc::new(
            OllamaCompletion::new(config.model.clone(), endpoint).with_timeout(timeout),
        )),
        "openai" | "custom" => Ok(Arc::new(
            OpenAiCompletion::new(config.model.clone(), config.get_api_key(), endpoint)
                .with_timeout(timeout),
        )),
        "anthropic" => {
            let api_key = config.get_api_key().ok_or_else(|| {
                RagError::Configuration("Anthropic API key is not set".to_string())
            })?;
            Ok(Arc::new(
                AnthropicCompletion::new(config.model.clone(), api_key, endpoint)
                    .with_timeout(timeout),
            ))
        }
        other => Err(RagError::Configuration(format!(
            "unknown LLM provider: {other}"
        ))),
    }
}

pub async fn open_index(
    config: &IndexConfig,
    dims: usize,
) -> Result<Arc<dyn SchemaIndex>, RagError> {
    match config.backend {
        IndexBackend::Lancedb => {
            let path = config.path.to_string_lossy();
            debug!("Opening LanceDB index at {path}");
            Ok(Arc::new(
                LanceSchemaIndex::open(&path, &config.collection, dims).await?,
            ))
        }
        IndexBackend::Memory => Ok(Arc::new(MemoryIndex::new(dims))),
    }
}

/// `None` when no database URL is configured.
pub fn build_executor(
    config: &DatabaseConfig,
    max_rows: usize,
) -> Result<Option<Arc<dyn QueryExecutor>>, RagError> {
    let Some(url) = &config.url else {
        return Ok(None);
    };
    let timeout = Duration::from_secs(config.timeout_seconds);
    let executor: Arc<dyn QueryExecutor> = match config.driver {
        DatabaseDriver::Sqlite => Arc::new(
            SqliteExecutor::from_url(url)
                .with_timeout(timeout)
                .with_max_rows(max_rows),
        ),
        DatabaseDriver::Postgres => {
            Arc::new(PostgresExecutor::connect_lazy(url, timeout)?.with_max_rows(max_rows))
        }
    };
    Ok(Some(executor))
}

pub fn build_cache(config: &CacheConfig) -> Arc<ResultCache<ExecutionResult>> {
    Arc::new(ResultCache::new(
        Duration::from_secs(config.ttl_seconds),
        config.max_size,
    ))
}

pub async fn ingestor(config: &Config) -> Result<SchemaIngestor, RagError> {
    let embedder = build_embedder(&config.embedding)?;
    let index = open_index(&config.index, embedder.dimensions()).await?;
    Ok(SchemaIngestor::new(knowledge_base(config), embedder, index))
}

pub async fn pipeline(config: &Config) -> Result<SqlPipeline, RagError> {
    let embedder = build_embedder(&config.embedding)?;
    let index = open_index(&config.index, embedder.dimensions()).await?;
    let generator = build_generator(&config.llm)?;
    // One extra row so truncation can be reported.
    let executor = build_executor(&config.database, config.query.max_limit.saturating_add(1))?;

    let mut pipeline = SqlPipeline::new(
        SchemaRetriever::new(embedder, index),
        generator,
        config.knowledge_base.allowed_tables.clone(),
    )
    .with_composer(PromptComposer::new(config.query.examples_limit))
    .with_cache(build_cache(&config.cache))
    .with_config(PipelineConfig {
        top_k: config.query.top_k,
        default_limit: config.query.default_limit,
        max_limit: config.query.max_limit,
    });
    if let Some(executor) = executor {
        pipeline = pipeline.with_executor(executor);
    }
    Ok(pipeline)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_providers_are_configuration_errors() {
        let embedding = EmbeddingConfig {
            provider: "word2vec".to_string(),
            ..Default::default()
        };
        assert!(matches!(
            build_embedder(&embedding),
            Err(RagError::Configuration(_))
        ));

        let llm = LlmConfig {
            provider: "eliza".to_string(),
            ..Default::default()
        };
        assert!(matches!(build_generator(&llm), Err(RagError::Configuration(_))));
    }

    #[test]
    fn test_default_backends() {
        let config = Config::default();
        assert_eq!(build_embedder(&config.embedding).unwrap().dimensions(), 768);
        assert_eq!(
            build_generator(&config.llm).unwrap().provider_name(),
            "ollama"
        );
        assert!(build_executor(&config.database, 10).unwrap().is_none());
    }

    #[test]
    fn test_sqlite_executor_from_url() {
        let database = DatabaseConfig {
            url: Some("sqlite://lab.db".to_string()),
            ..Default::default()
        };
        let executor = build_executor(&database, 10).unwrap().unwrap();
        assert_eq!(executor.backend(), "sqlite");
    }

    #[tokio::test]
    async fn test_memory_pipeline_reports_health() {
        let mut config = Config::default();
        config.index.backend = IndexBackend::Memory;
        let pipeline = pipeline(&config).await.unwrap();
        let health = pipeline.health().await;
        assert_eq!(health.index_backend, "memory");
        assert_eq!(health.indexed_tables, Ok(0));
        assert!(health.database.is_none());
    }
}
