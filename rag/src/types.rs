use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Join conditions towards another table. Source files use either a single
/// condition string or a list of them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum JoinConditions {
    One(String),
    Many(Vec<String>),
}

impl JoinConditions {
    /// Iterate over the individual conditions.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        let slice: &[String] = match self {
            JoinConditions::One(condition) => std::slice::from_ref(condition),
            JoinConditions::Many(conditions) => conditions,
        };
        slice.iter().map(String::as_str)
    }
}

/// A known-good SQL statement shipped with a table's metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct QueryExample {
    #[serde(default)]
    pub query: String,
    #[serde(default)]
    pub description: String,
    /// Named parameters and what they stand for.
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub parameters: IndexMap<String, String>,
}

/// Structured metadata for one allow-listed table.
///
/// Loaded wholesale from `<table>.json` in the knowledge base and never
/// patched in place.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct TableMetadata {
    /// Table name. Filled from the file name when the file omits it.
    #[serde(default, alias = "table_name")]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Column name to description, in source order.
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub fields: IndexMap<String, String>,
    /// Other table to join condition(s).
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub joins: IndexMap<String, JoinConditions>,
    #[serde(default, alias = "Indexes", skip_serializing_if = "IndexMap::is_empty")]
    pub indexes: IndexMap<String, String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub examples: Vec<QueryExample>,
}

/// Optional business enrichment for a table, read from the catalog index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct CatalogEntry {
    pub table_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Every other catalog attribute (business purpose, owner, record count...).
    #[serde(flatten)]
    pub attributes: IndexMap<String, serde_json::Value>,
}

impl CatalogEntry {
    /// Render an attribute as display text. Strings are used verbatim,
    /// other JSON values use their compact JSON form. Nulls count as absent.
    pub fn attribute(&self, key: &str) -> Option<String> {
        match self.attributes.get(key)? {
            serde_json::Value::Null => None,
            serde_json::Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }
}

/// The retrievable text representation of one table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaDocument {
    pub table_name: String,
    /// The only input the embedding is computed from.
    pub text: String,
    pub table: TableMetadata,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub catalog: Option<CatalogEntry>,
    /// SHA-256 of `text`, hex encoded.
    pub content_hash: String,
    pub built_at: DateTime<Utc>,
}

/// A schema document returned by similarity search for one question.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievedTable {
    pub table_name: String,
    pub schema_text: String,
    pub score: f32,
    pub table: TableMetadata,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub catalog: Option<CatalogEntry>,
}

/// Which extraction strategy produced the SQL of a candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SqlStrategy {
    /// A ```sql fenced block.
    FencedBlock,
    /// A `SQL_QUERY:` / `SQL:` / `Query:` labelled section.
    LabeledSection,
    /// A bare `SELECT ... ;` anywhere in the text.
    SelectStatement,
}

/// Structured SQL extracted from free-text model output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct SqlCandidate {
    pub sql: String,
    pub explanation: String,
    pub tables_used: Vec<String>,
    /// The untouched model output, kept for diagnostics.
    pub raw_output: String,
    /// `None` when no strategy found a statement.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strategy: Option<SqlStrategy>,
}

impl SqlCandidate {
    pub fn has_sql(&self) -> bool {
        !self.sql.is_empty()
    }
}

/// Outcome of checking SQL against the read-only policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub is_valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl Default for ValidationResult {
    fn default() -> Self {
        Self {
            is_valid: true,
            errors: Vec::new(),
            warnings: Vec::new(),
        }
    }
}

impl ValidationResult {
    pub fn error(&mut self, message: impl Into<String>) {
        self.is_valid = false;
        self.errors.push(message.into());
    }

    pub fn warning(&mut self, message: impl Into<String>) {
        self.warnings.push(message.into());
    }
}

/// Rows returned by a read-only query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ExecutionResult {
    pub columns: Vec<String>,
    pub rows: Vec<serde_json::Map<String, serde_json::Value>>,
    pub row_count: usize,
    pub elapsed_seconds: f64,
}
