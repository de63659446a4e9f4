//! On-disk knowledge base: one `<table>.json` file per allow-listed table
//! plus an optional `catalog_index.jsonl` with business enrichment.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use log::{debug, warn};
use serde::Serialize;
use thiserror::Error;

use crate::error::RagError;
use crate::schema::document::detect_techniques;
use crate::types::{CatalogEntry, TableMetadata};

/// Name of the catalog file inside the knowledge base directory.
pub const CATALOG_FILE: &str = "catalog_index.jsonl";

/// Catalog entries keyed by table name.
pub type CatalogIndex = HashMap<String, CatalogEntry>;

/// Why a single table file could not be loaded.
#[derive(Error, Debug)]
pub enum TableLoadError {
    #[error("metadata file not found: {}", .0.display())]
    Missing(PathBuf),

    #[error("failed to read {}: {source}", path.display())]
    Unreadable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("malformed metadata in {}: {source}", path.display())]
    Malformed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// A table whose metadata file exists but cannot be used.
#[derive(Debug, Clone, Serialize)]
pub struct InvalidTable {
    pub table: String,
    pub reason: String,
}

/// Result of checking every allow-listed table against the knowledge base.
#[derive(Debug, Clone, Default, Serialize)]
pub struct KnowledgeBaseCheck {
    pub total_tables: usize,
    pub valid_tables: Vec<String>,
    pub missing_tables: Vec<String>,
    pub invalid_tables: Vec<InvalidTable>,
    /// Table name to number of worked examples, for tables that have any.
    pub tables_with_examples: IndexMap<String, usize>,
}

impl KnowledgeBaseCheck {
    pub fn is_complete(&self) -> bool {
        self.missing_tables.is_empty() && self.invalid_tables.is_empty()
    }
}

/// Structural overview of one table, for inspection commands.
#[derive(Debug, Clone, Serialize)]
pub struct TableSummary {
    pub table_name: String,
    pub display_name: Option<String>,
    pub alias: Option<String>,
    pub has_description: bool,
    pub field_count: usize,
    /// Declared column type (taken from a trailing `(type)` in the field
    /// description) to number of columns with that type.
    pub field_types: IndexMap<String, usize>,
    pub join_targets: Vec<String>,
    pub index_count: usize,
    pub example_count: usize,
    pub example_descriptions: Vec<String>,
    pub techniques: Vec<&'static str>,
}

/// Read access to the knowledge base directory.
#[derive(Debug, Clone)]
pub struct KnowledgeBase {
    root: PathBuf,
    allowed_tables: Vec<String>,
}

impl KnowledgeBase {
    pub fn new(root: impl Into<PathBuf>, allowed_tables: Vec<String>) -> Self {
        Self {
            root: root.into(),
            allowed_tables,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn allowed_tables(&self) -> &[String] {
        &self.allowed_tables
    }

    pub fn table_path(&self, table: &str) -> PathBuf {
        self.root.join(format!("{table}.json"))
    }

    pub fn catalog_path(&self) -> PathBuf {
        self.root.join(CATALOG_FILE)
    }

    /// Fail unless the knowledge base directory exists.
    pub fn ensure_exists(&self) -> Result<(), RagError> {
        if self.root.is_dir() {
            Ok(())
        } else {
            Err(RagError::Configuration(format!(
                "knowledge base directory not found: {}",
                self.root.display()
            )))
        }
    }

    /// Load one table's metadata. The table name defaults to the requested
    /// name when the file does not carry one.
    pub fn load_table(&self, table: &str) -> Result<TableMetadata, TableLoadError> {
        let path = self.table_path(table);
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(TableLoadError::Missing(path));
            }
            Err(source) => return Err(TableLoadError::Unreadable { path, source }),
        };

        let mut metadata: TableMetadata = serde_json::from_str(&content)
            .map_err(|source| TableLoadError::Malformed { path, source })?;
        if metadata.name.is_empty() {
            metadata.name = table.to_string();
        }
        Ok(metadata)
    }

    /// Load the catalog index. A missing catalog is not an error; malformed
    /// lines, including lines that are not UTF-8, are skipped with a warning.
    pub fn load_catalog(&self) -> Result<CatalogIndex, RagError> {
        let path = self.catalog_path();
        let content = match fs::read(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                warn!("Catalog file not found: {}", path.display());
                return Ok(CatalogIndex::new());
            }
            Err(e) => {
                return Err(RagError::Configuration(format!(
                    "failed to read catalog {}: {e}",
                    path.display()
                )));
            }
        };

        Ok(parse_catalog(&content))
    }

    /// Check that every allow-listed table has a usable metadata file.
    pub fn check(&self) -> KnowledgeBaseCheck {
        let mut report = KnowledgeBaseCheck {
            total_tables: self.allowed_tables.len(),
            ..Default::default()
        };

        for table in &self.allowed_tables {
            match self.load_table(table) {
                Ok(metadata) => {
                    if !metadata.examples.is_empty() {
                        report
                            .tables_with_examples
                            .insert(table.clone(), metadata.examples.len());
                    }
                    report.valid_tables.push(table.clone());
                }
                Err(TableLoadError::Missing(_)) => report.missing_tables.push(table.clone()),
                Err(e) => report.invalid_tables.push(InvalidTable {
                    table: table.clone(),
                    reason: e.to_string(),
                }),
            }
        }

        debug!(
            "Knowledge base check: {} valid, {} missing, {} invalid",
            report.valid_tables.len(),
            report.missing_tables.len(),
            report.invalid_tables.len()
        );
        report
    }

    pub fn table_summary(&self, table: &str) -> Result<TableSummary, TableLoadError> {
        Ok(summarize(&self.load_table(table)?))
    }
}

fn parse_catalog(content: &[u8]) -> CatalogIndex {
    let mut index = CatalogIndex::new();
    for (line_no, raw) in content.split(|b| *b == b'\n').enumerate() {
        let line = match std::str::from_utf8(raw) {
            Ok(line) => line.trim(),
            Err(e) => {
                warn!("Skipping catalog line {} (not UTF-8: {e})", line_no + 1);
                continue;
            }
        };
        if line.is_empty() {
            continue;
        }
        match serde_json::from_str::<CatalogEntry>(line) {
            Ok(entry) if !entry.table_name.is_empty() => {
                index.insert(entry.table_name.clone(), entry);
            }
            Ok(_) => warn!("Catalog line {} has no table_name, skipping", line_no + 1),
            Err(e) => warn!("Skipping malformed catalog line {}: {e}", line_no + 1),
        }
    }
    index
}

fn summarize(table: &TableMetadata) -> TableSummary {
    let mut field_types: IndexMap<String, usize> = IndexMap::new();
    for description in table.fields.values() {
        if let Some(field_type) = declared_type(description) {
            *field_types.entry(field_type.to_string()).or_default() += 1;
        }
    }

    let mut techniques: Vec<&'static str> = Vec::new();
    for example in &table.examples {
        for technique in detect_techniques(&example.query) {
            if !techniques.contains(&technique.tag()) {
                techniques.push(technique.tag());
            }
        }
    }

    TableSummary {
        table_name: table.name.clone(),
        display_name: table.display_name.clone(),
        alias: table.alias.clone(),
        has_description: table.description.is_some(),
        field_count: table.fields.len(),
        field_types,
        join_targets: table.joins.keys().cloned().collect(),
        index_count: table.indexes.len(),
        example_count: table.examples.len(),
        example_descriptions: table
            .examples
            .iter()
            .map(|e| e.description.clone())
            .collect(),
        techniques,
    }
}

/// `"Order date (int)"` -> `Some("int")`
fn declared_type(description: &str) -> Option<&str> {
    let open = description.rfind('(')?;
    let rest = &description[open + 1..];
    let close = rest.find(')')?;
    let field_type = rest[..close].trim();
    (!field_type.is_empty()).then_some(field_type)
}
