//! askdb-rag: retrieval-augmented text-to-SQL engine
//!
//! This crate turns natural-language questions into validated, read-only
//! SQL over a fixed set of allow-listed tables:
//! - Schema documents built from per-table metadata and a catalog
//! - Embedding via OpenAI/Ollama and a LanceDB (or in-memory) vector index
//! - Prompt composition from retrieved schemas and worked examples
//! - Parsing of free-text model output into a SQL candidate
//! - A read-only SQL policy gate and a TTL result cache
//!
//! # Example
//!
//! ```ignore
//! use askdb_rag::{AskOptions, SchemaRetriever, SqlPipeline};
//!
//! let retriever = SchemaRetriever::new(embedder, index);
//! let pipeline = SqlPipeline::new(retriever, generator, allowed_tables);
//! let answer = pipeline.answer("orders from last week", &AskOptions::default()).await?;
//! println!("{}", answer.sql);
//! ```

pub mod cache;
pub mod embeddings;
pub mod error;
pub mod executor;
pub mod generation;
mod http;
pub mod ingest;
pub mod parser;
pub mod pipeline;
pub mod policy;
pub mod prompt;
pub mod retrieval;
pub mod schema;
pub mod store;
pub mod types;

pub use cache::{CacheKey, CacheStats, ResultCache};
pub use embeddings::{EmbeddingProvider, OllamaProvider, OpenAiProvider};
pub use error::RagError;
pub use executor::{PostgresExecutor, QueryExecutor, SqliteExecutor};
pub use generation::{AnthropicCompletion, CompletionProvider, OllamaCompletion, OpenAiCompletion};
pub use ingest::{IngestOptions, IngestionReport, IngestionStatus, SchemaIngestor, SkippedTable};
pub use parser::parse_response;
pub use pipeline::{
    Answer, AskOptions, ExecutionOutcome, ExecutionReport, PipelineConfig, PipelineHealth,
    RetrievedSummary, SqlPipeline,
};
pub use policy::{extract_table_names, validate_sql};
pub use prompt::PromptComposer;
pub use retrieval::SchemaRetriever;
pub use schema::KnowledgeBase;
pub use store::{LanceSchemaIndex, MemoryIndex, SchemaIndex};
pub use types::*;
