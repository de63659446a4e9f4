//! In-process schema index.

use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use indexmap::IndexMap;
use uuid::Uuid;

use super::{IndexHit, SchemaIndex, check_dimensions, cosine_similarity, document_id};
use crate::error::RagError;
use crate::types::SchemaDocument;

struct StoredDocument {
    document: SchemaDocument,
    vector: Vec<f32>,
}

/// Brute-force cosine search over documents held in memory.
pub struct MemoryIndex {
    dims: usize,
    documents: RwLock<IndexMap<Uuid, StoredDocument>>,
}

impl MemoryIndex {
    pub fn new(dims: usize) -> Self {
        Self {
            dims,
            documents: RwLock::new(IndexMap::new()),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, IndexMap<Uuid, StoredDocument>> {
        self.documents.read().unwrap_or_else(|p| p.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, IndexMap<Uuid, StoredDocument>> {
        self.documents.write().unwrap_or_else(|p| p.into_inner())
    }
}

#[async_trait]
impl SchemaIndex for MemoryIndex {
    async fn upsert_document(
        &self,
        document: &SchemaDocument,
        vector: Vec<f32>,
    ) -> Result<(), RagError> {
        check_dimensions(&vector, self.dims)?;
        let id = document_id(&document.table_name);
        let mut documents = self.write();
        documents.shift_remove(&id);
        documents.insert(
            id,
            StoredDocument {
                document: document.clone(),
                vector,
            },
        );
        Ok(())
    }

    async fn nearest_neighbors(&self, vector: &[f32], k: usize) -> Result<Vec<IndexHit>, RagError> {
        check_dimensions(vector, self.dims)?;
        let documents = self.read();
        let mut hits: Vec<IndexHit> = documents
            .values()
            .map(|stored| IndexHit {
                document: stored.document.clone(),
                score: cosine_similarity(vector, &stored.vector),
            })
            .collect();
        hits.sort_by(|a, b| b.score.total_cmp(&a.score));
        hits.truncate(k);
        Ok(hits)
    }

    async fn get_document(&self, table_name: &str) -> Result<Option<SchemaDocument>, RagError> {
        Ok(self
            .read()
            .get(&document_id(table_name))
            .map(|stored| stored.document.clone()))
    }

    async fn table_names(&self) -> Result<Vec<String>, RagError> {
        let mut names: Vec<String> = self
            .read()
            .values()
            .map(|stored| stored.document.table_name.clone())
            .collect();
        names.sort();
        Ok(names)
    }

    async fn count(&self) -> Result<usize, RagError> {
        Ok(self.read().len())
    }

    async fn delete_all(&self) -> Result<(), RagError> {
        self.write().clear();
        Ok(())
    }

    fn backend(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TableMetadata;

    fn document(name: &str, text: &str) -> SchemaDocument {
        let table = TableMetadata {
            name: name.to_string(),
            description: Some(text.to_string()),
            ..Default::default()
        };
        SchemaDocument::build(&table, None)
    }

    #[tokio::test]
    async fn test_upsert_replaces_by_table_name() {
        let index = MemoryIndex::new(2);
        index
            .upsert_document(&document("o", "old"), vec![1.0, 0.0])
            .await
            .unwrap();
        index
            .upsert_document(&document("o", "new"), vec![0.0, 1.0])
            .await
            .unwrap();

        assert_eq!(index.count().await.unwrap(), 1);
        let stored = index.get_document("o").await.unwrap().unwrap();
        assert_eq!(stored.table.description.as_deref(), Some("new"));
    }

    #[tokio::test]
    async fn test_nearest_neighbors_ordered_by_similarity() {
        let index = MemoryIndex::new(2);
        index
            .upsert_document(&document("o", "orders"), vec![1.0, 0.0])
            .await
            .unwrap();
        index
            .upsert_document(&document("r", "results"), vec![0.0, 1.0])
            .await
            .unwrap();
        index
            .upsert_document(&document("c", "clients"), vec![0.7, 0.7])
            .await
            .unwrap();

        let hits = index.nearest_neighbors(&[0.9, 0.1], 2).await.unwrap();
        let names: Vec<&str> = hits.iter().map(|h| h.document.table_name.as_str()).collect();
        assert_eq!(names, vec!["o", "c"]);
        assert!(hits[0].score >= hits[1].score);
    }

    #[tokio::test]
    async fn test_dimension_mismatch_is_index_error() {
        let index = MemoryIndex::new(3);
        let err = index
            .upsert_document(&document("o", "orders"), vec![1.0])
            .await
            .unwrap_err();
        assert!(matches!(err, RagError::Index(_)));
    }

    #[tokio::test]
    async fn test_table_names_and_delete_all() {
        let index = MemoryIndex::new(1);
        for name in ["r", "o"] {
            index
                .upsert_document(&document(name, name), vec![1.0])
                .await
                .unwrap();
        }
        assert_eq!(index.table_names().await.unwrap(), vec!["o", "r"]);

        index.delete_all().await.unwrap();
        assert_eq!(index.count().await.unwrap(), 0);
        assert!(index.nearest_neighbors(&[1.0], 5).await.unwrap().is_empty());
    }
}
