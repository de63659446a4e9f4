//! Schema retrieval: top-k relevant table documents for a question.

use std::sync::Arc;

use log::{debug, info};

use crate::embeddings::EmbeddingProvider;
use crate::error::RagError;
use crate::store::SchemaIndex;
use crate::types::RetrievedTable;

/// Wraps the embedding provider and vector index.
///
/// Results keep the index's similarity scores and order. Failures are
/// reported as [`RagError::Retrieval`] and never replaced by stale data.
#[derive(Clone)]
pub struct SchemaRetriever {
    embedder: Arc<dyn EmbeddingProvider>,
    index: Arc<dyn SchemaIndex>,
}

impl SchemaRetriever {
    pub fn new(embedder: Arc<dyn EmbeddingProvider>, index: Arc<dyn SchemaIndex>) -> Self {
        Self { embedder, index }
    }

    pub fn index(&self) -> &Arc<dyn SchemaIndex> {
        &self.index
    }

    pub fn embedder(&self) -> &Arc<dyn EmbeddingProvider> {
        &self.embedder
    }

    /// At most `k` tables, most similar first. Empty when nothing is indexed.
    pub async fn find_relevant(
        &self,
        question: &str,
        k: usize,
    ) -> Result<Vec<RetrievedTable>, RagError> {
        if k == 0 {
            return Ok(Vec::new());
        }

        let vector = self
            .embedder
            .embed(question)
            .await
            .map_err(RagError::retrieval)?;
        let hits = self
            .index
            .nearest_neighbors(&vector, k)
            .await
            .map_err(RagError::retrieval)?;

        let tables: Vec<RetrievedTable> = hits
            .into_iter()
            .take(k)
            .map(|hit| RetrievedTable {
                table_name: hit.document.table_name,
                schema_text: hit.document.text,
                score: hit.score,
                table: hit.document.table,
                catalog: hit.document.catalog,
            })
            .collect();

        info!("Retrieved {} relevant table(s)", tables.len());
        for table in &tables {
            debug!("  {} (score {:.3})", table.table_name, table.score);
        }
        Ok(tables)
    }
}
