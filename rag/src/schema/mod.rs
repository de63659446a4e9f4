//! Schema knowledge: loading table metadata from disk and turning it into
//! retrievable documents.

pub mod document;
pub mod knowledge_base;

pub use document::{SqlTechnique, build_schema_text, compute_content_hash, detect_techniques};
pub use knowledge_base::{
    CATALOG_FILE, CatalogIndex, InvalidTable, KnowledgeBase, KnowledgeBaseCheck, TableLoadError,
    TableSummary,
};
