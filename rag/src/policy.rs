//! Read-only SQL policy.
//!
//! The validator is the only gate between a parsed SQL candidate and the
//! executor. Hard failures go to `errors` and make the result invalid;
//! conventions the project expects but does not enforce go to `warnings`.
//! Every check runs so callers see the complete violation set.

use std::sync::LazyLock;

use regex::Regex;

use crate::types::ValidationResult;

/// Locking hint expected after every table reference.
pub const LOCKING_HINT: &str = "(NOLOCK)";

/// Keywords that write data or change structure.
pub const MUTATING_KEYWORDS: &[&str] = &[
    "DROP", "DELETE", "UPDATE", "INSERT", "TRUNCATE", "ALTER", "CREATE", "MERGE", "GRANT",
    "REVOKE",
];

static TABLE_REF_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:FROM|JOIN)\s+([A-Za-z_][A-Za-z0-9_]*(?:\s*\(\s*NOLOCK\s*\))?)").unwrap()
});

static MUTATING_RES: LazyLock<Vec<(&'static str, Regex)>> = LazyLock::new(|| {
    MUTATING_KEYWORDS
        .iter()
        .map(|kw| (*kw, Regex::new(&format!(r"(?i)\b{kw}\b")).unwrap()))
        .collect()
});

static SELECT_START_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)^SELECT\b").unwrap());

/// Injection signatures, checked in order. The first match is reported.
static INJECTION_PATTERNS: LazyLock<Vec<(&'static str, Regex)>> = LazyLock::new(|| {
    vec![
        (
            "statement terminator followed by a mutating keyword",
            Regex::new(&format!(
                r"(?i);\s*(?:{})\b",
                MUTATING_KEYWORDS.join("|")
            ))
            .unwrap(),
        ),
        ("line comment", Regex::new(r"--").unwrap()),
        ("block comment", Regex::new(r"/\*").unwrap()),
        (
            "UNION-based SELECT",
            Regex::new(r"(?is)\bUNION\b.*\bSELECT\b").unwrap(),
        ),
        ("xp_cmdshell call", Regex::new(r"(?i)\bxp_cmdshell\b").unwrap()),
        (
            "sp_executesql call",
            Regex::new(r"(?i)\bsp_executesql\b").unwrap(),
        ),
    ]
});

static ROW_LIMIT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(?:LIMIT|TOP|FETCH\s+FIRST)\b").unwrap());

static NOLOCK_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)\bNOLOCK\b").unwrap());

/// A comparison against a date-named column, capturing the column, the
/// operator and the right-hand operand.
static DATE_COMPARISON_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b([A-Za-z0-9_.]*DATE[A-Za-z0-9_]*)\s*(<>|!=|>=|<=|=|>|<|\bBETWEEN\b)\s*([^\s;,)]+)")
        .unwrap()
});

/// A column reference such as `r.ardate`.
static COLUMN_REFERENCE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*(?:\.[A-Za-z_][A-Za-z0-9_]*)*$").unwrap());

static INTEGER_DATE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\d{8}$").unwrap());

static BOUND_PARAMETER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?:@\w+|:\w+|\$\d+|\?)$").unwrap());

/// Extract table names referenced after `FROM` or `JOIN`, with locking hints
/// stripped, deduplicated in first-seen order.
///
/// Qualified (`schema.table`) and aliased references are not resolved: the
/// first identifier after the keyword is taken as the table name.
pub fn extract_table_names(sql: &str) -> Vec<String> {
    let mut tables: Vec<String> = Vec::new();
    for caps in TABLE_REF_RE.captures_iter(sql) {
        let name = strip_locking_hint(&caps[1]);
        if !name.is_empty() && !tables.iter().any(|t| t == name) {
            tables.push(name.to_string());
        }
    }
    tables
}

fn strip_locking_hint(reference: &str) -> &str {
    match reference.find('(') {
        Some(pos) => reference[..pos].trim(),
        None => reference.trim(),
    }
}

/// Validate SQL against the read-only policy and the table allow-list.
pub fn validate_sql(sql: &str, allowed_tables: &[String]) -> ValidationResult {
    let mut result = ValidationResult::default();
    let trimmed = sql.trim();

    for (keyword, re) in MUTATING_RES.iter() {
        if re.is_match(trimmed) {
            result.error(format!("Potentially dangerous operation detected: {keyword}"));
        }
    }

    if !SELECT_START_RE.is_match(trimmed) {
        result.error("Only SELECT queries are allowed");
    }

    let unauthorized: Vec<String> = extract_table_names(trimmed)
        .into_iter()
        .filter(|table| {
            !allowed_tables
                .iter()
                .any(|allowed| allowed.eq_ignore_ascii_case(table))
        })
        .collect();
    if !unauthorized.is_empty() {
        result.error(format!(
            "Query uses unauthorized tables: {}",
            unauthorized.join(", ")
        ));
    }

    if let Some((pattern, _)) = INJECTION_PATTERNS
        .iter()
        .find(|(_, re)| re.is_match(trimmed))
    {
        result.error(format!("Potential SQL injection pattern detected: {pattern}"));
    }

    let mut warnings = Vec::new();

    if !ROW_LIMIT_RE.is_match(trimmed) {
        warnings.push("Query has no row limit (LIMIT or TOP)".to_string());
    }

    if !NOLOCK_RE.is_match(trimmed) {
        warnings.push(format!("Query does not use {LOCKING_HINT} hints"));
    }

    for caps in DATE_COMPARISON_RE.captures_iter(trimmed) {
        let raw_operand = &caps[3];
        let operand = raw_operand.trim_matches('\'');
        // Equality between two columns is a join condition.
        let column_equality = &caps[2] == "=" && COLUMN_REFERENCE_RE.is_match(raw_operand);
        if !column_equality
            && !INTEGER_DATE_RE.is_match(operand)
            && !BOUND_PARAMETER_RE.is_match(operand)
        {
            warnings.push(format!(
                "Date comparison on {} should use an integer YYYYMMDD value, got {}",
                &caps[1], raw_operand
            ));
        }
    }

    let opened = trimmed.matches('(').count();
    let closed = trimmed.matches(')').count();
    if opened != closed {
        warnings.push(format!(
            "Unbalanced parentheses: {opened} opening, {closed} closing"
        ));
    }

    for warning in warnings {
        if !result.errors.contains(&warning) && !result.warnings.contains(&warning) {
            result.warning(warning);
        }
    }

    result
}
