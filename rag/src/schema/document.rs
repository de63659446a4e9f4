//! Schema document builder.
//!
//! Turns a table's metadata (plus optional catalog enrichment) into the text
//! that gets embedded and searched. Section order is fixed so documents are
//! reproducible and prompt sizes stay predictable:
//!
//! header, display name/alias, description, fields, joins, indexes,
//! worked examples, usage patterns, business context, metadata.
//!
//! Sections with nothing to show are omitted entirely.

use std::fmt::Write as _;
use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use regex::Regex;
use sha2::{Digest, Sha256};

use crate::types::{CatalogEntry, QueryExample, SchemaDocument, TableMetadata};

/// Catalog attributes rendered in the business context block, in order.
const BUSINESS_FIELDS: &[&str] = &[
    "business_purpose",
    "data_source",
    "update_frequency",
    "owner",
    "usage_notes",
];

/// Catalog attributes rendered in the metadata block, in order.
const METADATA_FIELDS: &[&str] = &[
    "created_date",
    "last_modified",
    "record_count",
    "data_quality",
    "compliance_notes",
];

/// Column-name fragments recognised in WHERE clauses, with their labels.
const FILTER_PATTERNS: &[(&str, &str)] = &[
    ("DATE", "Date-based queries"),
    ("TEST", "Test code filtering"),
    ("ORDNO", "Order-based queries"),
    ("RESSTAT", "Result status filtering"),
];

/// Words in example descriptions that hint at a usage pattern.
const DESCRIPTION_HINTS: &[(&str, &str)] = &[
    ("patient", "Patient-specific queries"),
    ("date", "Date-based filtering"),
    ("test", "Test result retrieval"),
];

const EXAMPLES_RULE: usize = 40;
const EXAMPLE_RULE: usize = 30;

/// A SQL technique detected in a worked example.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SqlTechnique {
    Joins,
    LockingHints,
    Sorting,
    DateRanges,
    ComplexConditions,
    Filtering,
    Aggregation,
    Functions,
}

impl SqlTechnique {
    pub fn tag(self) -> &'static str {
        match self {
            SqlTechnique::Joins => "JOINS",
            SqlTechnique::LockingHints => "NOLOCK_HINTS",
            SqlTechnique::Sorting => "SORTING",
            SqlTechnique::DateRanges => "DATE_RANGES",
            SqlTechnique::ComplexConditions => "COMPLEX_CONDITIONS",
            SqlTechnique::Filtering => "FILTERING",
            SqlTechnique::Aggregation => "AGGREGATION",
            SqlTechnique::Functions => "FUNCTIONS",
        }
    }
}

static JOIN_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)\bJOIN\b").unwrap());

static NOLOCK_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)\bNOLOCK\b").unwrap());

static ORDER_BY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bORDER\s+BY\b").unwrap());

static BETWEEN_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)\bBETWEEN\b").unwrap());

static AND_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)\bAND\b").unwrap());

static OR_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)\bOR\b").unwrap());

static COMPARISON_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[=<>]").unwrap());

static GROUP_BY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bGROUP\s+BY\b").unwrap());

static AGGREGATE_FN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(COUNT|SUM|AVG|MAX|MIN)\s*\(").unwrap());

static JOINED_TABLE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bJOIN\s+([A-Za-z_][A-Za-z0-9_]*)").unwrap());

static WHERE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)\bWHERE\b").unwrap());

/// Detect the SQL techniques a query uses. Absence of a tag means absence
/// of the technique.
pub fn detect_techniques(query: &str) -> Vec<SqlTechnique> {
    let mut techniques = Vec::new();

    if JOIN_RE.is_match(query) {
        techniques.push(SqlTechnique::Joins);
    }
    if NOLOCK_RE.is_match(query) {
        techniques.push(SqlTechnique::LockingHints);
    }
    if ORDER_BY_RE.is_match(query) {
        techniques.push(SqlTechnique::Sorting);
    }
    if BETWEEN_RE.is_match(query) {
        techniques.push(SqlTechnique::DateRanges);
    }
    if AND_RE.is_match(query) && OR_RE.is_match(query) {
        techniques.push(SqlTechnique::ComplexConditions);
    }
    if COMPARISON_RE.is_match(query) {
        techniques.push(SqlTechnique::Filtering);
    }
    if GROUP_BY_RE.is_match(query) {
        techniques.push(SqlTechnique::Aggregation);
    }
    if AGGREGATE_FN_RE.is_match(query) {
        techniques.push(SqlTechnique::Functions);
    }

    techniques
}

/// Build the retrievable text for a table. Pure and deterministic.
pub fn build_schema_text(table: &TableMetadata, catalog: Option<&CatalogEntry>) -> String {
    let mut text = String::new();
    let _ = writeln!(text, "Table: {}", table.name);

    if let Some(display_name) = &table.display_name {
        let _ = writeln!(text, "Display Name: {display_name}");
    }
    if let Some(alias) = &table.alias {
        let _ = writeln!(text, "Alias: {alias}");
    }
    if let Some(description) = &table.description {
        let _ = writeln!(text, "Description: {description}");
    }
    if let Some(extra) = catalog.and_then(|c| c.description.as_ref()) {
        if table.description.as_ref() != Some(extra) {
            let _ = writeln!(text, "Additional Info: {extra}");
        }
    }

    if !table.fields.is_empty() {
        text.push_str("\nFields/Columns:\n");
        for (name, description) in &table.fields {
            let _ = writeln!(text, "- {name}: {description}");
        }
    }

    if !table.joins.is_empty() {
        text.push_str("\nTable Relationships/Joins:\n");
        for (other, conditions) in &table.joins {
            for condition in conditions.iter() {
                let _ = writeln!(text, "- JOIN {other}: {condition}");
            }
        }
    }

    if !table.indexes.is_empty() {
        text.push_str("\nDatabase Indexes:\n");
        for (name, description) in &table.indexes {
            let _ = writeln!(text, "- {name}: {description}");
        }
    }

    if !table.examples.is_empty() {
        text.push_str("\nSQL Query Examples and Patterns:\n");
        text.push_str(&"=".repeat(EXAMPLES_RULE));
        text.push('\n');
        for (i, example) in table.examples.iter().enumerate() {
            write_example(&mut text, i + 1, example);
        }

        let _ = writeln!(
            text,
            "\nCommon Usage Patterns:\n{}",
            usage_summary(&table.examples)
        );
    }

    if let Some(catalog) = catalog {
        let business = catalog_block(catalog, BUSINESS_FIELDS);
        if !business.is_empty() {
            let _ = writeln!(text, "\nBusiness Context:\n{business}");
        }
        let metadata = catalog_block(catalog, METADATA_FIELDS);
        if !metadata.is_empty() {
            let _ = writeln!(text, "\nMetadata:\n{metadata}");
        }
    }

    text
}

fn write_example(text: &mut String, number: usize, example: &QueryExample) {
    let _ = writeln!(text, "\nExample {number}: {}", example.description);
    let _ = writeln!(text, "SQL Pattern:\n{}", example.query);

    if !example.parameters.is_empty() {
        text.push_str("Parameters:\n");
        for (name, description) in &example.parameters {
            let _ = writeln!(text, "  - {name}: {description}");
        }
    }

    let techniques = detect_techniques(&example.query);
    if !techniques.is_empty() {
        let tags: Vec<&str> = techniques.iter().map(|t| t.tag()).collect();
        let _ = writeln!(text, "SQL Techniques Used: {}", tags.join(", "));
    }

    text.push_str(&"-".repeat(EXAMPLE_RULE));
    text.push('\n');
}

/// Summarise how a table is typically queried, based on its examples.
fn usage_summary(examples: &[QueryExample]) -> String {
    let mut lines: Vec<String> = Vec::new();
    let mut joined: IndexMap<String, usize> = IndexMap::new();
    let mut filters: Vec<&str> = Vec::new();

    for example in examples {
        for caps in JOINED_TABLE_RE.captures_iter(&example.query) {
            *joined.entry(caps[1].to_string()).or_default() += 1;
        }

        if let Some(found) = WHERE_RE.find(&example.query) {
            let predicate = example.query[found.end()..].to_uppercase();
            for (fragment, label) in FILTER_PATTERNS {
                if predicate.contains(fragment) && !filters.contains(label) {
                    filters.push(label);
                }
            }
        }

        let description = example.description.to_lowercase();
        for (word, hint) in DESCRIPTION_HINTS {
            let line = format!("- {hint}");
            if description.contains(word) && !lines.contains(&line) {
                lines.push(line);
            }
        }
    }

    if !joined.is_empty() {
        // Most frequently joined first, ties keep first-seen order.
        joined.sort_by(|_, a, _, b| b.cmp(a));
        let tables: Vec<String> = joined
            .iter()
            .map(|(table, count)| format!("{table} ({count})"))
            .collect();
        lines.push(format!("- Commonly joined with: {}", tables.join(", ")));
    }

    if !filters.is_empty() {
        lines.push(format!("- Common filters: {}", filters.join(", ")));
    }

    if lines.is_empty() {
        "- General data retrieval queries".to_string()
    } else {
        lines.join("\n")
    }
}

fn catalog_block(catalog: &CatalogEntry, keys: &[&str]) -> String {
    keys.iter()
        .filter_map(|key| {
            catalog
                .attribute(key)
                .map(|value| format!("- {}: {value}", label(key)))
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// `business_purpose` -> `Business Purpose`
fn label(key: &str) -> String {
    key.split('_')
        .filter(|w| !w.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Compute a SHA-256 content hash for change detection.
pub fn compute_content_hash(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    hex::encode(hasher.finalize())
}

impl SchemaDocument {
    /// Build the document for a table, stamped with the current time.
    pub fn build(table: &TableMetadata, catalog: Option<&CatalogEntry>) -> Self {
        Self::build_at(table, catalog, Utc::now())
    }

    pub fn build_at(
        table: &TableMetadata,
        catalog: Option<&CatalogEntry>,
        built_at: DateTime<Utc>,
    ) -> Self {
        let text = build_schema_text(table, catalog);
        Self {
            table_name: table.name.clone(),
            content_hash: compute_content_hash(&text),
            text,
            table: table.clone(),
            catalog: catalog.cloned(),
            built_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::JoinConditions;

    fn orders_table() -> TableMetadata {
        let mut table = TableMetadata {
            name: "o".to_string(),
            display_name: Some("Orders".to_string()),
            alias: Some("ao".to_string()),
            description: Some("Lab orders".to_string()),
            ..Default::default()
        };
        table
            .fields
            .insert("a".to_string(), "x (int)".to_string());
        table.fields.insert("b".to_string(), "y".to_string());
        table
    }

    #[test]
    fn test_fields_in_source_order() {
        let text = build_schema_text(&orders_table(), None);
        let field_lines: Vec<&str> = text
            .lines()
            .filter(|line| line.starts_with("- "))
            .collect();
        assert_eq!(field_lines, vec!["- a: x (int)", "- b: y"]);
    }

    #[test]
    fn test_missing_sections_are_omitted() {
        let text = build_schema_text(&orders_table(), None);
        assert!(!text.contains("Joins"));
        assert!(!text.contains("Indexes"));
        assert!(!text.contains("Examples"));
        assert!(!text.contains("Business Context"));
        assert!(!text.contains("Metadata"));

        let bare = TableMetadata {
            name: "x".to_string(),
            ..Default::default()
        };
        assert_eq!(build_schema_text(&bare, None), "Table: x\n");
    }

    #[test]
    fn test_joins_flattened_one_line_per_condition() {
        let mut table = orders_table();
        table.joins.insert(
            "r".to_string(),
            JoinConditions::Many(vec!["o.a = r.a".to_string(), "o.b = r.b".to_string()]),
        );
        table
            .joins
            .insert("c".to_string(), JoinConditions::One("o.c = c.c".to_string()));

        let text = build_schema_text(&table, None);
        assert!(text.contains(
            "\nTable Relationships/Joins:\n- JOIN r: o.a = r.a\n- JOIN r: o.b = r.b\n- JOIN c: o.c = c.c\n"
        ));
    }

    #[test]
    fn test_catalog_description_only_when_different() {
        let table = orders_table();
        let same = CatalogEntry {
            table_name: "o".to_string(),
            description: Some("Lab orders".to_string()),
            ..Default::default()
        };
        assert!(!build_schema_text(&table, Some(&same)).contains("Additional Info"));

        let different = CatalogEntry {
            table_name: "o".to_string(),
            description: Some("All orders placed by clinics".to_string()),
            ..Default::default()
        };
        let text = build_schema_text(&table, Some(&different));
        assert!(text.contains(
            "Description: Lab orders\nAdditional Info: All orders placed by clinics\n"
        ));
    }

    #[test]
    fn test_section_order() {
        let mut table = orders_table();
        table
            .joins
            .insert("r".to_string(), JoinConditions::One("o.a = r.a".to_string()));
        table
            .indexes
            .insert("ix_a".to_string(), "a index".to_string());
        table.examples.push(QueryExample {
            query: "SELECT * FROM o (NOLOCK) JOIN r (NOLOCK) ON o.a = r.a WHERE o.aodate BETWEEN 20250101 AND 20250107".to_string(),
            description: "Orders by date".to_string(),
            parameters: IndexMap::new(),
        });
        let mut catalog = CatalogEntry {
            table_name: "o".to_string(),
            ..Default::default()
        };
        catalog
            .attributes
            .insert("owner".to_string(), serde_json::json!("Lab ops"));
        catalog
            .attributes
            .insert("record_count".to_string(), serde_json::json!(1200));

        let text = build_schema_text(&table, Some(&catalog));
        let positions: Vec<usize> = [
            "Table: o",
            "Display Name:",
            "Alias:",
            "Description:",
            "Fields/Columns:",
            "Table Relationships/Joins:",
            "Database Indexes:",
            "SQL Query Examples and Patterns:",
            "Common Usage Patterns:",
            "Business Context:",
            "Metadata:",
        ]
        .iter()
        .map(|marker| text.find(marker).unwrap_or_else(|| panic!("missing {marker}")))
        .collect();
        assert!(positions.windows(2).all(|w| w[0] < w[1]), "{text}");
        assert!(text.contains("- Owner: Lab ops"));
        assert!(text.contains("- Record Count: 1200"));
    }

    #[test]
    fn test_example_block_contents() {
        let mut table = orders_table();
        let mut parameters = IndexMap::new();
        parameters.insert("@start".to_string(), "First day (YYYYMMDD)".to_string());
        table.examples.push(QueryExample {
            query: "SELECT COUNT(*) FROM o (NOLOCK) WHERE aodate >= @start GROUP BY aosite ORDER BY aosite".to_string(),
            description: "Daily order counts by test date".to_string(),
            parameters,
        });

        let text = build_schema_text(&table, None);
        assert!(text.contains("\nExample 1: Daily order counts by test date\n"));
        assert!(text.contains("SQL Pattern:\nSELECT COUNT(*) FROM o (NOLOCK)"));
        assert!(text.contains("Parameters:\n  - @start: First day (YYYYMMDD)\n"));
        assert!(text.contains(
            "SQL Techniques Used: NOLOCK_HINTS, SORTING, FILTERING, AGGREGATION, FUNCTIONS\n"
        ));
        assert!(text.contains("- Date-based filtering"));
        assert!(text.contains("- Test result retrieval"));
        assert!(text.contains("- Common filters: Date-based queries"));
    }

    #[test]
    fn test_detect_techniques() {
        let tags: Vec<&str> = detect_techniques(
            "select a from o with (nolock) join r on o.x = r.x where a between 1 and 2 or b = 3",
        )
        .iter()
        .map(|t| t.tag())
        .collect();
        assert_eq!(
            tags,
            vec![
                "JOINS",
                "NOLOCK_HINTS",
                "DATE_RANGES",
                "COMPLEX_CONDITIONS",
                "FILTERING"
            ]
        );

        // Keywords embedded in identifiers do not count.
        assert!(detect_techniques("SELECT brand, account FROM orders").is_empty());
    }

    #[test]
    fn test_joined_tables_ranked_by_frequency() {
        let examples = vec![
            QueryExample {
                query: "SELECT * FROM o JOIN c ON o.c = c.c".to_string(),
                ..Default::default()
            },
            QueryExample {
                query: "SELECT * FROM o JOIN r ON o.a = r.a JOIN c ON o.c = c.c".to_string(),
                ..Default::default()
            },
        ];
        assert_eq!(usage_summary(&examples), "- Commonly joined with: c (2), r (1)");
    }

    #[test]
    fn test_usage_summary_fallback() {
        let examples = vec![QueryExample {
            query: "SELECT * FROM o".to_string(),
            description: "Everything".to_string(),
            ..Default::default()
        }];
        assert_eq!(usage_summary(&examples), "- General data retrieval queries");
    }

    #[test]
    fn test_documents_are_deterministic() {
        let table = orders_table();
        let built_at = Utc::now();
        let a = SchemaDocument::build_at(&table, None, built_at);
        let b = SchemaDocument::build_at(&table, None, built_at);
        assert_eq!(a, b);
        assert_eq!(a.content_hash, compute_content_hash(&a.text));
    }

    #[test]
    fn test_label() {
        assert_eq!(label("business_purpose"), "Business Purpose");
        assert_eq!(label("owner"), "Owner");
    }
}
