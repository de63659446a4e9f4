//! Response parsing: free-text model output to a structured SQL candidate.
//!
//! SQL extraction is an ordered list of strategies, each tried only when
//! the previous one found nothing:
//!
//! 1. a ```` ```sql ```` fenced block
//! 2. a `SQL_QUERY:` / `SQL:` / `Query:` labelled section
//! 3. the first `SELECT ... ;` anywhere in the text
//!
//! Parsing never fails. Fields that cannot be extracted are left empty and
//! the raw output is always kept on the candidate.

use std::sync::LazyLock;

use log::{debug, warn};
use regex::Regex;

use crate::policy::extract_table_names;
use crate::types::{SqlCandidate, SqlStrategy};

/// Section labels the prompt asks the model to emit, in order.
pub const SQL_LABEL: &str = "SQL_QUERY:";
pub const EXPLANATION_LABEL: &str = "EXPLANATION:";
pub const TABLES_LABEL: &str = "TABLES_USED:";

/// Longest token accepted as a table name in the tables-used section.
const MAX_TABLE_TOKEN_LEN: usize = 10;

static FENCED_SQL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)```sql\s*(.*?)\s*```").unwrap());

/// SQL labels in priority order.
static SQL_LABEL_RES: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    ["SQL_QUERY:", "SQL:", "Query:"]
        .iter()
        .map(|label| Regex::new(&format!(r"(?i)\b{}", regex::escape(label))).unwrap())
        .collect()
});

static ANY_LABEL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:SQL_QUERY|SQL|QUERY|EXPLANATION|TABLES_USED):").unwrap()
});

static SELECT_STATEMENT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)\bSELECT\b.*?;").unwrap());

static EXPLANATION_LABEL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bEXPLANATION:").unwrap());

static EXPLANATION_PROSE_RES: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    vec![
        Regex::new(r"(?is)\b(This query\b.*?)(?:\n\s*\n|$)").unwrap(),
        Regex::new(r"(?is)\b(The query\b.*?)(?:\n\s*\n|$)").unwrap(),
    ]
});

static TABLES_SECTION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bTABLES_USED:\s*([A-Za-z0-9_, ]+)").unwrap());

static FENCE_MARKER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)```(?:sql)?").unwrap());

static LEADING_TYPE_LABEL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^(?:sql|query)\b:?\s*").unwrap());

/// Parse raw model output into a SQL candidate.
pub fn parse_response(raw: &str) -> SqlCandidate {
    let extracted = extract_sql(raw);
    let (sql, strategy) = match extracted {
        Some((sql, strategy)) => {
            debug!("Extracted SQL using {strategy:?}");
            (sql, Some(strategy))
        }
        None => {
            warn!("No SQL statement found in model output");
            (String::new(), None)
        }
    };

    let explanation = extract_explanation(raw);
    let mut tables_used = extract_tables_section(raw);
    if tables_used.is_empty() && !sql.is_empty() {
        tables_used = extract_table_names(&sql);
    }

    SqlCandidate {
        sql,
        explanation,
        tables_used,
        raw_output: raw.to_string(),
        strategy,
    }
}

/// Run the extraction strategies in order and normalise the first hit.
pub fn extract_sql(raw: &str) -> Option<(String, SqlStrategy)> {
    let strategies: [(SqlStrategy, fn(&str) -> Option<&str>); 3] = [
        (SqlStrategy::FencedBlock, fenced_block),
        (SqlStrategy::LabeledSection, labeled_section),
        (SqlStrategy::SelectStatement, select_statement),
    ];

    strategies.iter().find_map(|(strategy, extract)| {
        let sql = normalize_sql(extract(raw)?);
        (!sql.is_empty()).then_some((sql, *strategy))
    })
}

pub fn fenced_block(raw: &str) -> Option<&str> {
    FENCED_SQL_RE
        .captures(raw)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
}

pub fn labeled_section(raw: &str) -> Option<&str> {
    let label = SQL_LABEL_RES.iter().find_map(|re| re.find(raw))?;
    let body = raw[label.end()..].trim_start();

    let mut end = body.find("\n\n").unwrap_or(body.len());
    if let Some(next) = ANY_LABEL_RE.find(body) {
        end = end.min(next.start());
    }

    let section = body[..end].trim();
    (!section.is_empty()).then_some(section)
}

pub fn select_statement(raw: &str) -> Option<&str> {
    SELECT_STATEMENT_RE.find(raw).map(|m| m.as_str())
}

/// Strip fence markers and a leading type label, collapse whitespace line
/// by line, join lines with single spaces and terminate with `;`.
pub fn normalize_sql(sql: &str) -> String {
    let without_fences = FENCE_MARKER_RE.replace_all(sql, "");
    let mut lines: Vec<String> = without_fences
        .lines()
        .map(|line| line.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|line| !line.is_empty())
        .collect();

    if let Some(first) = lines.first_mut() {
        let stripped = LEADING_TYPE_LABEL_RE.replace(first.as_str(), "").into_owned();
        *first = stripped;
        if first.is_empty() {
            lines.remove(0);
        }
    }

    let mut normalized = lines.join(" ");
    if normalized.is_empty() {
        return normalized;
    }
    if !normalized.ends_with(';') {
        normalized.push(';');
    }
    normalized
}

/// Explanation from its labelled section, falling back to a "This query..."
/// or "The query..." paragraph. Markdown emphasis is removed.
pub fn extract_explanation(raw: &str) -> String {
    let labeled = EXPLANATION_LABEL_RE.find(raw).map(|label| {
        let body = &raw[label.end()..];
        let end = ANY_LABEL_RE.find(body).map_or(body.len(), |m| m.start());
        body[..end].trim()
    });

    let explanation = labeled.filter(|s| !s.is_empty()).or_else(|| {
        EXPLANATION_PROSE_RES.iter().find_map(|re| {
            re.captures(raw).and_then(|caps| caps.get(1)).map(|m| {
                let body = m.as_str();
                let end = ANY_LABEL_RE.find(body).map_or(body.len(), |l| l.start());
                body[..end].trim()
            })
        })
    });

    explanation
        .map(strip_emphasis)
        .unwrap_or_default()
}

fn strip_emphasis(text: &str) -> String {
    text.replace(['*', '`'], "").replace("__", "").trim().to_string()
}

/// Table names listed in the tables-used section. Tokens longer than a
/// table name plausibly is are dropped.
pub fn extract_tables_section(raw: &str) -> Vec<String> {
    let Some(caps) = TABLES_SECTION_RE.captures(raw) else {
        return Vec::new();
    };

    let mut tables: Vec<String> = Vec::new();
    for token in caps[1].split(',') {
        let token = token.trim();
        if token.is_empty() || token.len() > MAX_TABLE_TOKEN_LEN {
            continue;
        }
        if !tables.iter().any(|t| t == token) {
            tables.push(token.to_string());
        }
    }
    tables
}
