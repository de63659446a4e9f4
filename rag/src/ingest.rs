//! Schema ingestion: knowledge base files to indexed schema documents.
//!
//! Runs as one exclusive batch. A table whose file is missing or malformed
//! is skipped and reported; an unreachable embedding provider or index
//! aborts the run.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use log::{info, warn};
use serde::Serialize;

use crate::embeddings::EmbeddingProvider;
use crate::error::RagError;
use crate::schema::KnowledgeBase;
use crate::store::SchemaIndex;
use crate::types::SchemaDocument;

/// Documents embedded per provider call.
const EMBED_BATCH_SIZE: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IngestionStatus {
    /// Every allow-listed table was indexed.
    Success,
    /// Some tables were skipped.
    Partial,
    /// Nothing was indexed.
    Empty,
}

#[derive(Debug, Clone, Serialize)]
pub struct SkippedTable {
    pub table: String,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct IngestionReport {
    pub status: IngestionStatus,
    pub processed_tables: usize,
    pub skipped: Vec<SkippedTable>,
    pub catalog_loaded: bool,
    pub tables_with_examples: usize,
    pub ingested_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy)]
pub struct IngestOptions {
    /// Remove every indexed document before ingesting.
    pub reset: bool,
}

impl Default for IngestOptions {
    fn default() -> Self {
        Self { reset: true }
    }
}

pub struct SchemaIngestor {
    knowledge_base: KnowledgeBase,
    embedder: Arc<dyn EmbeddingProvider>,
    index: Arc<dyn SchemaIndex>,
}

impl SchemaIngestor {
    pub fn new(
        knowledge_base: KnowledgeBase,
        embedder: Arc<dyn EmbeddingProvider>,
        index: Arc<dyn SchemaIndex>,
    ) -> Self {
        Self {
            knowledge_base,
            embedder,
            index,
        }
    }

    pub async fn ingest(&self, options: IngestOptions) -> Result<IngestionReport, RagError> {
        let kb = &self.knowledge_base;
        kb.ensure_exists()?;
        info!("Ingesting schemas from {}", kb.root().display());

        let catalog = kb.load_catalog()?;
        info!("Loaded catalog with {} table(s)", catalog.len());

        if options.reset {
            self.index.delete_all().await?;
            info!("Cleared existing schema documents");
        }

        let mut documents: Vec<SchemaDocument> = Vec::new();
        let mut skipped: Vec<SkippedTable> = Vec::new();

        for table_name in kb.allowed_tables() {
            let mut table = match kb.load_table(table_name) {
                Ok(table) => table,
                Err(e) => {
                    warn!("Skipping table {table_name}: {e}");
                    skipped.push(SkippedTable {
                        table: table_name.clone(),
                        reason: e.to_string(),
                    });
                    continue;
                }
            };
            if table.name != *table_name {
                warn!(
                    "{table_name}.json names its table {:?}; indexing it as {table_name}",
                    table.name
                );
                table.name = table_name.clone();
            }

            if table.examples.is_empty() {
                warn!("No query examples for {table_name}");
            } else {
                info!("Processing {table_name} ({} example(s))", table.examples.len());
            }
            documents.push(SchemaDocument::build(&table, catalog.get(table_name)));
        }

        for chunk in documents.chunks(EMBED_BATCH_SIZE) {
            let texts: Vec<String> = chunk.iter().map(|d| d.text.clone()).collect();
            let vectors = self.embedder.embed_batch(&texts).await?;
            if vectors.len() != chunk.len() {
                return Err(RagError::Embedding(format!(
                    "expected {} embeddings, got {}",
                    chunk.len(),
                    vectors.len()
                )));
            }
            for (document, vector) in chunk.iter().zip(vectors) {
                self.index.upsert_document(document, vector).await?;
            }
        }

        let processed_tables = documents.len();
        let status = if processed_tables == 0 {
            IngestionStatus::Empty
        } else if skipped.is_empty() {
            IngestionStatus::Success
        } else {
            IngestionStatus::Partial
        };
        info!(
            "Ingested {processed_tables} table(s), skipped {}",
            skipped.len()
        );

        Ok(IngestionReport {
            status,
            processed_tables,
            skipped,
            catalog_loaded: !catalog.is_empty(),
            tables_with_examples: documents
                .iter()
                .filter(|d| !d.table.examples.is_empty())
                .count(),
            ingested_at: Utc::now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::CATALOG_FILE;
    use crate::store::MemoryIndex;
    use async_trait::async_trait;
    use std::fs;
    use tempfile::TempDir;

    struct ConstantEmbedder;

    #[async_trait]
    impl EmbeddingProvider for ConstantEmbedder {
        async fn embed(&self, _text: &str) -> Result<Vec<f32>, RagError> {
            Ok(vec![1.0, 0.0])
        }

        async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, RagError> {
            Ok(texts.iter().map(|_| vec![1.0, 0.0]).collect())
        }

        fn dimensions(&self) -> usize {
            2
        }

        fn model_name(&self) -> &str {
            "constant"
        }
    }

    struct DownEmbedder;

    #[async_trait]
    impl EmbeddingProvider for DownEmbedder {
        async fn embed(&self, _text: &str) -> Result<Vec<f32>, RagError> {
            Err(RagError::Embedding("down".to_string()))
        }

        async fn embed_batch(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>, RagError> {
            Err(RagError::Embedding("down".to_string()))
        }

        fn dimensions(&self) -> usize {
            2
        }

        fn model_name(&self) -> &str {
            "down"
        }
    }

    fn knowledge_base(dir: &TempDir) -> KnowledgeBase {
        fs::write(
            dir.path().join("o.json"),
            r#"{"description": "Orders", "examples": [{"query": "SELECT * FROM o (NOLOCK)", "description": "all"}]}"#,
        )
        .unwrap();
        fs::write(dir.path().join("r.json"), r#"{"description": "Results"}"#).unwrap();
        fs::write(dir.path().join("c.json"), "{broken").unwrap();
        fs::write(
            dir.path().join(CATALOG_FILE),
            "{\"table_name\": \"o\", \"owner\": \"Lab ops\"}\n",
        )
        .unwrap();
        KnowledgeBase::new(
            dir.path(),
            ["o", "r", "c", "m"].iter().map(|t| t.to_string()).collect(),
        )
    }

    #[tokio::test]
    async fn test_ingest_skips_bad_tables() {
        let dir = TempDir::new().unwrap();
        let index = Arc::new(MemoryIndex::new(2));
        let ingestor = SchemaIngestor::new(knowledge_base(&dir), Arc::new(ConstantEmbedder), index.clone());

        let report = ingestor.ingest(IngestOptions::default()).await.unwrap();
        assert_eq!(report.status, IngestionStatus::Partial);
        assert_eq!(report.processed_tables, 2);
        assert_eq!(report.tables_with_examples, 1);
        assert!(report.catalog_loaded);
        let skipped: Vec<&str> = report.skipped.iter().map(|s| s.table.as_str()).collect();
        assert_eq!(skipped, vec!["c", "m"]);

        assert_eq!(index.table_names().await.unwrap(), vec!["o", "r"]);
        let o = index.get_document("o").await.unwrap().unwrap();
        assert!(o.text.contains("- Owner: Lab ops"));
    }

    #[tokio::test]
    async fn test_reingest_replaces_documents() {
        let dir = TempDir::new().unwrap();
        let index = Arc::new(MemoryIndex::new(2));
        let ingestor = SchemaIngestor::new(knowledge_base(&dir), Arc::new(ConstantEmbedder), index.clone());

        ingestor.ingest(IngestOptions::default()).await.unwrap();
        ingestor.ingest(IngestOptions { reset: false }).await.unwrap();
        assert_eq!(index.count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_reset_removes_tables_no_longer_listed() {
        let dir = TempDir::new().unwrap();
        let index = Arc::new(MemoryIndex::new(2));
        SchemaIngestor::new(knowledge_base(&dir), Arc::new(ConstantEmbedder), index.clone())
            .ingest(IngestOptions::default())
            .await
            .unwrap();

        let narrowed = KnowledgeBase::new(dir.path(), vec!["r".to_string()]);
        let report = SchemaIngestor::new(narrowed, Arc::new(ConstantEmbedder), index.clone())
            .ingest(IngestOptions::default())
            .await
            .unwrap();
        assert_eq!(report.status, IngestionStatus::Success);
        assert_eq!(index.table_names().await.unwrap(), vec!["r"]);
    }

    #[tokio::test]
    async fn test_unreadable_catalog_keeps_existing_index() {
        let dir = TempDir::new().unwrap();
        let index = Arc::new(MemoryIndex::new(2));
        let ingestor = SchemaIngestor::new(knowledge_base(&dir), Arc::new(ConstantEmbedder), index.clone());
        ingestor.ingest(IngestOptions::default()).await.unwrap();

        fs::remove_file(dir.path().join(CATALOG_FILE)).unwrap();
        fs::create_dir(dir.path().join(CATALOG_FILE)).unwrap();
        let err = ingestor.ingest(IngestOptions::default()).await.unwrap_err();
        assert!(matches!(err, RagError::Configuration(_)));
        assert_eq!(index.table_names().await.unwrap(), vec!["o", "r"]);
    }

    #[tokio::test]
    async fn test_missing_directory_is_configuration_error() {
        let dir = TempDir::new().unwrap();
        let kb = KnowledgeBase::new(dir.path().join("missing"), vec!["o".to_string()]);
        let ingestor = SchemaIngestor::new(kb, Arc::new(ConstantEmbedder), Arc::new(MemoryIndex::new(2)));
        let err = ingestor.ingest(IngestOptions::default()).await.unwrap_err();
        assert!(matches!(err, RagError::Configuration(_)));
    }

    #[tokio::test]
    async fn test_embedding_failure_aborts() {
        let dir = TempDir::new().unwrap();
        let ingestor = SchemaIngestor::new(
            knowledge_base(&dir),
            Arc::new(DownEmbedder),
            Arc::new(MemoryIndex::new(2)),
        );
        let err = ingestor.ingest(IngestOptions::default()).await.unwrap_err();
        assert!(matches!(err, RagError::Embedding(_)));
    }
}
