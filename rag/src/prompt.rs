//! Generation prompt composition.
//!
//! The prompt ends with the three labelled sections the response parser
//! looks for; the labels are shared constants so both sides move together.

use chrono::{Days, Local, NaiveDate};

use crate::parser::{EXPLANATION_LABEL, SQL_LABEL, TABLES_LABEL};
use crate::policy::LOCKING_HINT;
use crate::types::{QueryExample, RetrievedTable};

/// Integer date format used by the data (`20250820`).
pub const INTEGER_DATE_FORMAT: &str = "%Y%m%d";

pub const DEFAULT_EXAMPLES_LIMIT: usize = 3;

/// Number of column names quoted in the field-naming guideline.
const FIELD_NAME_SAMPLE: usize = 5;

/// Builds the SQL generation prompt for one question.
#[derive(Debug, Clone)]
pub struct PromptComposer {
    examples_limit: usize,
    /// Fixed "today" for reproducible prompts; the local date otherwise.
    today: Option<NaiveDate>,
}

impl Default for PromptComposer {
    fn default() -> Self {
        Self::new(DEFAULT_EXAMPLES_LIMIT)
    }
}

impl PromptComposer {
    pub fn new(examples_limit: usize) -> Self {
        Self {
            examples_limit,
            today: None,
        }
    }

    pub fn with_today(mut self, today: NaiveDate) -> Self {
        self.today = Some(today);
        self
    }

    pub fn examples_limit(&self) -> usize {
        self.examples_limit
    }

    pub fn compose(&self, question: &str, tables: &[RetrievedTable]) -> String {
        let today = self.today.unwrap_or_else(|| Local::now().date_naive());
        let week_ago = today.checked_sub_days(Days::new(7)).unwrap_or(today);

        let mut prompt =
            String::from("You are writing SQL for a lab database. Study these working examples:\n\n");

        let examples = self.select_examples(tables);
        if examples.is_empty() {
            prompt.push_str("(no worked examples are available for these tables)\n\n");
        } else {
            prompt.push_str("Here are real working queries from this database:\n\n");
            for (i, example) in examples.iter().enumerate() {
                prompt.push_str(&format!(
                    "Example {}:\nSQL: {}\nPurpose: {}\n\n",
                    i + 1,
                    example.query,
                    example.description
                ));
            }
        }

        prompt.push_str("Notice the patterns:\n");
        prompt.push_str(&format!(
            "- Dates are integers like {} (not strings or functions)\n",
            today.format(INTEGER_DATE_FORMAT)
        ));
        prompt.push_str(&format!("- Always use {LOCKING_HINT} hints\n"));
        let field_names = sample_field_names(tables);
        if field_names.is_empty() {
            prompt.push_str("- Use column names exactly as they appear in the examples\n");
        } else {
            prompt.push_str(&format!("- Field names: {}, etc.\n", field_names.join(", ")));
        }
        prompt.push_str("- Simple WHERE conditions\n\n");

        let names: Vec<&str> = tables.iter().map(|t| t.table_name.as_str()).collect();
        prompt.push_str(&format!("Available tables: {}\n", names.join(", ")));
        prompt.push_str(&format!(
            "Today's date: {}\n",
            today.format(INTEGER_DATE_FORMAT)
        ));
        prompt.push_str(&format!(
            "One week ago: {}\n\n",
            week_ago.format(INTEGER_DATE_FORMAT)
        ));

        prompt.push_str(&format!("Question: \"{question}\"\n\n"));
        prompt.push_str(
            "Write SQL that matches these patterns. Use the same style and field names as the examples.\n\n",
        );
        prompt.push_str(&format!(
            "{SQL_LABEL}\n[your sql here]\n\n{EXPLANATION_LABEL}\n[brief explanation]\n\n{TABLES_LABEL}\n[tables used]"
        ));

        prompt
    }

    /// Worked examples across the retrieved tables in first-seen order.
    fn select_examples<'a>(&self, tables: &'a [RetrievedTable]) -> Vec<&'a QueryExample> {
        tables
            .iter()
            .flat_map(|t| t.table.examples.iter())
            .filter(|e| !e.query.trim().is_empty())
            .take(self.examples_limit)
            .collect()
    }
}

fn sample_field_names(tables: &[RetrievedTable]) -> Vec<&str> {
    tables
        .iter()
        .flat_map(|t| t.table.fields.keys())
        .map(String::as_str)
        .take(FIELD_NAME_SAMPLE)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TableMetadata;

    fn retrieved(name: &str, examples: &[(&str, &str)]) -> RetrievedTable {
        let mut table = TableMetadata {
            name: name.to_string(),
            ..Default::default()
        };
        table
            .fields
            .insert(format!("{name}date"), "Date (int)".to_string());
        for (query, description) in examples {
            table.examples.push(QueryExample {
                query: query.to_string(),
                description: description.to_string(),
                ..Default::default()
            });
        }
        RetrievedTable {
            table_name: name.to_string(),
            schema_text: format!("Table: {name}\n"),
            score: 0.9,
            table,
            catalog: None,
        }
    }

    fn composer() -> PromptComposer {
        PromptComposer::default().with_today(NaiveDate::from_ymd_opt(2025, 8, 20).unwrap())
    }

    #[test]
    fn test_temporal_anchors() {
        let prompt = composer().compose("orders from last week", &[retrieved("o", &[])]);
        assert!(prompt.contains("Today's date: 20250820\n"));
        assert!(prompt.contains("One week ago: 20250813\n"));
        assert!(prompt.contains("Question: \"orders from last week\""));
        assert!(prompt.contains("Available tables: o\n"));
    }

    #[test]
    fn test_examples_limited_in_first_seen_order() {
        let tables = vec![
            retrieved("o", &[("SELECT 1 FROM o", "first"), ("SELECT 2 FROM o", "second")]),
            retrieved("r", &[("SELECT 3 FROM r", "third"), ("SELECT 4 FROM r", "fourth")]),
        ];
        let prompt = composer().compose("q", &tables);
        assert!(prompt.contains("Example 1:\nSQL: SELECT 1 FROM o\nPurpose: first\n"));
        assert!(prompt.contains("Example 3:\nSQL: SELECT 3 FROM r\nPurpose: third\n"));
        assert!(!prompt.contains("fourth"));
    }

    #[test]
    fn test_style_guide() {
        let prompt = composer().compose("q", &[retrieved("ao", &[])]);
        assert!(prompt.contains("- Always use (NOLOCK) hints"));
        assert!(prompt.contains("- Field names: aodate, etc."));
        assert!(prompt.contains("integers like 20250820"));
    }

    #[test]
    fn test_output_contract_order() {
        let prompt = composer().compose("q", &[]);
        let sql = prompt.find(SQL_LABEL).unwrap();
        let explanation = prompt.find(EXPLANATION_LABEL).unwrap();
        let tables = prompt.find(TABLES_LABEL).unwrap();
        assert!(sql < explanation && explanation < tables);
    }
}
