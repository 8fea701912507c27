//! Transpiler traits and utilities.

use super::placeholder::PlaceholderStyle;
use crate::value::Value;

/// SQL reserved words that must be quoted when used as identifiers.
pub const RESERVED_WORDS: &[&str] = &[
    "order",
    "group",
    "user",
    "table",
    "select",
    "from",
    "where",
    "join",
    "left",
    "right",
    "inner",
    "outer",
    "on",
    "and",
    "or",
    "not",
    "null",
    "true",
    "false",
    "limit",
    "offset",
    "as",
    "in",
    "is",
    "like",
    "between",
    "having",
    "union",
    "all",
    "distinct",
    "case",
    "when",
    "then",
    "else",
    "end",
    "insert",
    "update",
    "delete",
    "index",
    "key",
    "primary",
    "default",
    "check",
    "desc",
    "asc",
    "by",
    "values",
    "set",
];

/// Constructs a dialect may be unable to express.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SqlFeature {
    Or,
    Not,
    NullCheck,
    Like,
    Between,
    Join,
    RightJoin,
    FullJoin,
    Having,
    GroupBy,
    Offset,
    Distinct,
    Returning,
}

impl SqlFeature {
    /// Clause name reported in `UnsupportedOperation` errors.
    pub fn clause(&self) -> &'static str {
        match self {
            SqlFeature::Or => "OR",
            SqlFeature::Not => "NOT",
            SqlFeature::NullCheck => "IS NULL",
            SqlFeature::Like => "LIKE",
            SqlFeature::Between => "BETWEEN",
            SqlFeature::Join => "JOIN",
            SqlFeature::RightJoin => "RIGHT JOIN",
            SqlFeature::FullJoin => "FULL OUTER JOIN",
            SqlFeature::Having => "HAVING",
            SqlFeature::GroupBy => "GROUP BY",
            SqlFeature::Offset => "OFFSET",
            SqlFeature::Distinct => "DISTINCT",
            SqlFeature::Returning => "RETURNING",
        }
    }
}

/// Quote `name` with `generator` if it is a reserved word or not a plain
/// identifier. Dotted names (`table.column`) are handled part by part;
/// `*` and function expressions such as `COUNT(*)` pass through.
pub fn escape_identifier(generator: &dyn SqlGenerator, name: &str) -> String {
    if name == "*" || name.contains('(') {
        return name.to_string();
    }
    if name.contains('.') {
        return name
            .split('.')
            .map(|part| escape_single_identifier(generator, part))
            .collect::<Vec<_>>()
            .join(".");
    }
    escape_single_identifier(generator, name)
}

fn escape_single_identifier(generator: &dyn SqlGenerator, name: &str) -> String {
    if name == "*" {
        return name.to_string();
    }
    let lower = name.to_lowercase();
    let needs_escaping = RESERVED_WORDS.contains(&lower.as_str())
        || name.is_empty()
        || name.chars().any(|c| !c.is_alphanumeric() && c != '_')
        || name.chars().next().map(|c| c.is_numeric()).unwrap_or(false);

    if needs_escaping {
        generator.quote_identifier(name)
    } else {
        name.to_string()
    }
}

/// Trait for dialect-specific SQL generation.
pub trait SqlGenerator: Send + Sync {
    /// Backend name used in error messages.
    fn name(&self) -> &'static str;
    /// Quote an identifier (table or column name).
    fn quote_identifier(&self, name: &str) -> String {
        format!("\"{}\"", name.replace('"', "\"\""))
    }
    /// Placeholder style the native driver expects.
    fn default_placeholder(&self) -> PlaceholderStyle {
        PlaceholderStyle::Question
    }
    fn supports(&self, _feature: SqlFeature) -> bool {
        true
    }
    /// Whether `ILIKE` is native; otherwise `LOWER(col) LIKE LOWER(?)` is used.
    fn supports_ilike(&self) -> bool {
        false
    }
    fn limit_offset(&self, limit: Option<u64>, offset: Option<u64>) -> String {
        let mut sql = String::new();
        if let Some(n) = limit {
            sql.push_str(&format!(" LIMIT {}", n));
        }
        if let Some(n) = offset {
            sql.push_str(&format!(" OFFSET {}", n));
        }
        sql
    }
    /// Whether OFFSET/FETCH needs an ORDER BY to be valid.
    fn offset_requires_order(&self) -> bool {
        false
    }
    /// Text appended to a SELECT that has a WHERE clause.
    fn filter_suffix(&self) -> Option<&'static str> {
        None
    }
    fn ping_sql(&self) -> &'static str {
        "SELECT 1"
    }

    // Transaction statements. `None` means the step is implicit.
    fn supports_transactions(&self) -> bool {
        true
    }
    fn supports_savepoints(&self) -> bool {
        true
    }
    fn begin_sql(&self) -> Option<String> {
        Some("BEGIN".to_string())
    }
    fn commit_sql(&self) -> Option<String> {
        Some("COMMIT".to_string())
    }
    fn rollback_sql(&self) -> Option<String> {
        Some("ROLLBACK".to_string())
    }
    fn savepoint_sql(&self, name: &str) -> Option<String> {
        Some(format!("SAVEPOINT {}", name))
    }
    fn release_savepoint_sql(&self, name: &str) -> Option<String> {
        Some(format!("RELEASE SAVEPOINT {}", name))
    }
    fn rollback_to_savepoint_sql(&self, name: &str) -> Option<String> {
        Some(format!("ROLLBACK TO SAVEPOINT {}", name))
    }

    // Introspection. Result columns are aliased to `name` (tables) and
    // `name, data_type, nullable, default_value` (columns).
    fn list_tables_sql(&self, database: &str) -> (String, Vec<Value>);
    fn list_columns_sql(&self, database: &str, table: &str) -> (String, Vec<Value>);
}
