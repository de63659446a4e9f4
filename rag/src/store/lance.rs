//! LanceDB schema index.
//!
//! Stores one row per table document at the configured path (by default
//! `.askdb/schemas.lance`). Searches use cosine distance and report
//! similarity as `1 - distance`.

use std::sync::Arc;

use arrow_array::{
    Array, FixedSizeListArray, Float32Array, RecordBatch, RecordBatchIterator, StringArray,
    types::Float32Type,
};
use arrow_schema::{DataType, Field, Schema};
use async_trait::async_trait;
use futures::TryStreamExt;
use lancedb::DistanceType;
use lancedb::query::{ExecutableQuery, QueryBase};
use log::debug;

use super::{IndexHit, SchemaIndex, check_dimensions, document_id};
use crate::error::RagError;
use crate::types::SchemaDocument;

/// LanceDB-backed vector index of schema documents.
pub struct LanceSchemaIndex {
    db: lancedb::Connection,
    collection: String,
    dims: usize,
}

impl LanceSchemaIndex {
    /// Open or create the index at the given path.
    pub async fn open(path: &str, collection: &str, dims: usize) -> Result<Self, RagError> {
        let db = lancedb::connect(path).execute().await?;
        let index = Self {
            db,
            collection: collection.to_string(),
            dims,
        };
        index.ensure_table().await?;
        Ok(index)
    }

    fn schema(&self) -> Arc<Schema> {
        Arc::new(Schema::new(vec![
            Field::new("id", DataType::Utf8, false),
            Field::new("table_name", DataType::Utf8, false),
            Field::new("schema_text", DataType::Utf8, false),
            // The whole SchemaDocument as JSON.
            Field::new("payload", DataType::Utf8, false),
            Field::new(
                "vector",
                DataType::FixedSizeList(
                    Arc::new(Field::new("item", DataType::Float32, true)),
                    self.dims as i32,
                ),
                false,
            ),
        ]))
    }

    async fn ensure_table(&self) -> Result<(), RagError> {
        let tables = self.db.table_names().execute().await?;
        if !tables.contains(&self.collection) {
            let schema = self.schema();
            let empty_batch = RecordBatch::new_empty(schema.clone());
            let batches = RecordBatchIterator::new(vec![Ok(empty_batch)], schema);
            self.db
                .create_table(&self.collection, batches)
                .execute()
                .await?;
        }
        Ok(())
    }

    async fn table(&self) -> Result<lancedb::Table, RagError> {
        Ok(self.db.open_table(&self.collection).execute().await?)
    }

    /// Read documents and (when present) distances out of result batches.
    fn decode(batches: &[RecordBatch]) -> Result<Vec<(SchemaDocument, Option<f32>)>, RagError> {
        let mut rows = Vec::new();
        for batch in batches {
            let Some(payloads) = batch
                .column_by_name("payload")
                .and_then(|c| c.as_any().downcast_ref::<StringArray>())
            else {
                continue;
            };
            let distances = batch
                .column_by_name("_distance")
                .and_then(|c| c.as_any().downcast_ref::<Float32Array>());

            for i in 0..batch.num_rows() {
                let document: SchemaDocument = serde_json::from_str(payloads.value(i))
                    .map_err(|e| RagError::Index(format!("corrupt document payload: {e}")))?;
                rows.push((document, distances.map(|d| d.value(i))));
            }
        }
        Ok(rows)
    }

    async fn scan(&self, filter: Option<String>) -> Result<Vec<SchemaDocument>, RagError> {
        let table = self.table().await?;
        let total = table.count_rows(None).await?;
        if total == 0 {
            return Ok(Vec::new());
        }

        let mut query = table.query().limit(total);
        if let Some(filter) = filter {
            query = query.only_if(filter);
        }
        let batches: Vec<RecordBatch> = query
            .execute()
            .await?
            .try_collect()
            .await
            .map_err(|e| RagError::Index(format!("Failed to scan index: {e}")))?;

        Ok(Self::decode(&batches)?
            .into_iter()
            .map(|(document, _)| document)
            .collect())
    }
}

/// Quote a string literal for a Lance filter expression.
fn sql_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

#[async_trait]
impl SchemaIndex for LanceSchemaIndex {
    async fn upsert_document(
        &self,
        document: &SchemaDocument,
        vector: Vec<f32>,
    ) -> Result<(), RagError> {
        check_dimensions(&vector, self.dims)?;
        let id = document_id(&document.table_name).to_string();
        let payload = serde_json::to_string(document)?;
        let schema = self.schema();

        let vector_array = FixedSizeListArray::from_iter_primitive::<Float32Type, _, _>(
            std::iter::once(Some(vector.into_iter().map(Some).collect::<Vec<_>>())),
            self.dims as i32,
        );

        let batch = RecordBatch::try_new(
            schema.clone(),
            vec![
                Arc::new(StringArray::from(vec![id.as_str()])),
                Arc::new(StringArray::from(vec![document.table_name.as_str()])),
                Arc::new(StringArray::from(vec![document.text.as_str()])),
                Arc::new(StringArray::from(vec![payload.as_str()])),
                Arc::new(vector_array) as Arc<dyn Array>,
            ],
        )
        .map_err(|e| RagError::Index(format!("Failed to create record batch: {e}")))?;

        let table = self.table().await?;
        table.delete(&format!("id = {}", sql_literal(&id))).await?;
        let batches = RecordBatchIterator::new(vec![Ok(batch)], schema);
        table.add(batches).execute().await?;

        debug!("Indexed schema document for {}", document.table_name);
        Ok(())
    }

    async fn nearest_neighbors(&self, vector: &[f32], k: usize) -> Result<Vec<IndexHit>, RagError> {
        check_dimensions(vector, self.dims)?;
        if k == 0 {
            return Ok(Vec::new());
        }
        let table = self.table().await?;
        if table.count_rows(None).await? == 0 {
            return Ok(Vec::new());
        }

        let query = table
            .vector_search(vector)
            .map_err(|e| RagError::Index(format!("Failed to build search query: {e}")))?
            .distance_type(DistanceType::Cosine)
            .limit(k);

        let batches: Vec<RecordBatch> = query
            .execute()
            .await?
            .try_collect()
            .await
            .map_err(|e| RagError::Index(format!("Failed to execute search: {e}")))?;

        let mut hits: Vec<IndexHit> = Self::decode(&batches)?
            .into_iter()
            .map(|(document, distance)| IndexHit {
                document,
                score: 1.0 - distance.unwrap_or(1.0),
            })
            .collect();
        hits.sort_by(|a, b| b.score.total_cmp(&a.score));
        Ok(hits)
    }

    async fn get_document(&self, table_name: &str) -> Result<Option<SchemaDocument>, RagError> {
        let id = document_id(table_name).to_string();
        Ok(self
            .scan(Some(format!("id = {}", sql_literal(&id))))
            .await?
            .into_iter()
            .next())
    }

    async fn table_names(&self) -> Result<Vec<String>, RagError> {
        let mut names: Vec<String> = self
            .scan(None)
            .await?
            .into_iter()
            .map(|document| document.table_name)
            .collect();
        names.sort();
        names.dedup();
        Ok(names)
    }

    async fn count(&self) -> Result<usize, RagError> {
        let table = self.table().await?;
        Ok(table.count_rows(None).await?)
    }

    async fn delete_all(&self) -> Result<(), RagError> {
        let table = self.table().await?;
        table.delete("id IS NOT NULL").await?;
        Ok(())
    }

    fn backend(&self) -> &'static str {
        "lancedb"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TableMetadata;

    fn document(name: &str, description: &str) -> SchemaDocument {
        let table = TableMetadata {
            name: name.to_string(),
            description: Some(description.to_string()),
            ..Default::default()
        };
        SchemaDocument::build(&table, None)
    }

    async fn open(dir: &tempfile::TempDir) -> LanceSchemaIndex {
        let path = dir.path().join("schemas.lance");
        LanceSchemaIndex::open(path.to_str().unwrap(), "lab_schema", 4)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_open_creates_table() {
        let dir = tempfile::tempdir().unwrap();
        let index = open(&dir).await;
        assert_eq!(index.count().await.unwrap(), 0);
        assert!(index.nearest_neighbors(&[1.0, 0.0, 0.0, 0.0], 5).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_upsert_and_search() {
        let dir = tempfile::tempdir().unwrap();
        let index = open(&dir).await;

        index
            .upsert_document(&document("o", "orders"), vec![1.0, 0.0, 0.0, 0.0])
            .await
            .unwrap();
        index
            .upsert_document(&document("r", "results"), vec![0.0, 1.0, 0.0, 0.0])
            .await
            .unwrap();
        assert_eq!(index.count().await.unwrap(), 2);

        let hits = index
            .nearest_neighbors(&[0.9, 0.1, 0.0, 0.0], 5)
            .await
            .unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].document.table_name, "o");
        assert!(hits[0].score > hits[1].score);
    }

    #[tokio::test]
    async fn test_upsert_replaces_previous_version() {
        let dir = tempfile::tempdir().unwrap();
        let index = open(&dir).await;

        index
            .upsert_document(&document("o", "old"), vec![1.0, 0.0, 0.0, 0.0])
            .await
            .unwrap();
        index
            .upsert_document(&document("o", "new"), vec![0.0, 0.0, 1.0, 0.0])
            .await
            .unwrap();

        assert_eq!(index.count().await.unwrap(), 1);
        let stored = index.get_document("o").await.unwrap().unwrap();
        assert_eq!(stored.table.description.as_deref(), Some("new"));
        assert!(index.get_document("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_delete_all() {
        let dir = tempfile::tempdir().unwrap();
        let index = open(&dir).await;

        for (name, v) in [("o", [1.0, 0.0, 0.0, 0.0]), ("r", [0.0, 1.0, 0.0, 0.0])] {
            index
                .upsert_document(&document(name, name), v.to_vec())
                .await
                .unwrap();
        }
        assert_eq!(index.table_names().await.unwrap(), vec!["o", "r"]);

        index.delete_all().await.unwrap();
        assert_eq!(index.count().await.unwrap(), 0);
    }

    #[test]
    fn test_sql_literal_escapes_quotes() {
        assert_eq!(sql_literal("o'r"), "'o''r'");
    }
}
