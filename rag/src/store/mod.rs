//! Vector index of schema documents.
//!
//! One document per table. The table name is the identity across rebuilds
//! and maps deterministically onto the backend's id scheme, so re-ingesting
//! a table replaces its previous document instead of adding a second one.

mod lance;
mod memory;

pub use lance::LanceSchemaIndex;
pub use memory::MemoryIndex;

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::RagError;
use crate::types::SchemaDocument;

/// Namespace for document ids.
const DOCUMENT_NAMESPACE: Uuid = Uuid::from_u128(0x12345678_1234_5678_1234_123456789abc);

/// Stable index id for a table's document.
pub fn document_id(table_name: &str) -> Uuid {
    Uuid::new_v5(&DOCUMENT_NAMESPACE, format!("table_{table_name}").as_bytes())
}

/// A stored document returned by similarity search.
#[derive(Debug, Clone)]
pub struct IndexHit {
    pub document: SchemaDocument,
    /// Cosine similarity, higher is closer.
    pub score: f32,
}

#[async_trait]
pub trait SchemaIndex: Send + Sync {
    /// Insert a document, fully replacing any previous version for the same table.
    async fn upsert_document(
        &self,
        document: &SchemaDocument,
        vector: Vec<f32>,
    ) -> Result<(), RagError>;

    /// The `k` nearest documents, most similar first.
    async fn nearest_neighbors(&self, vector: &[f32], k: usize) -> Result<Vec<IndexHit>, RagError>;

    async fn get_document(&self, table_name: &str) -> Result<Option<SchemaDocument>, RagError>;

    /// Names of all indexed tables, sorted.
    async fn table_names(&self) -> Result<Vec<String>, RagError>;

    async fn count(&self) -> Result<usize, RagError>;

    async fn delete_all(&self) -> Result<(), RagError>;

    fn backend(&self) -> &'static str;
}

/// Cosine similarity; zero when either vector has no magnitude.
pub(crate) fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let (mut dot, mut norm_a, mut norm_b) = (0.0f32, 0.0f32, 0.0f32);
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}

fn check_dimensions(vector: &[f32], dims: usize) -> Result<(), RagError> {
    if vector.len() == dims {
        Ok(())
    } else {
        Err(RagError::Index(format!(
            "vector has {} dimensions, index expects {dims}",
            vector.len()
        )))
    }
}
