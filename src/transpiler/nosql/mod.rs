//! Lowerings for non-SQL backends.
//!
//! Every lowering is all-or-nothing: a clause the target cannot represent
//! fails with `UnsupportedOperation` naming that clause.

pub mod dynamo;
pub mod elastic;
pub mod mongo;
pub mod neo4j;
pub mod redis;

use serde::Serialize;

use crate::ast::{Action, Query};
use crate::error::{OnedbError, Result};

/// A request for an HTTP/JSON style API (DynamoDB, Elasticsearch).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ApiRequest {
    /// API operation, e.g. `Scan`, `PutItem`, `search`, `delete_by_query`.
    pub operation: String,
    /// Table or index the operation targets.
    pub target: String,
    pub body: serde_json::Value,
}

impl ApiRequest {
    pub fn new(
        operation: impl Into<String>,
        target: impl Into<String>,
        body: serde_json::Value,
    ) -> Self {
        Self {
            operation: operation.into(),
            target: target.into(),
            body,
        }
    }
}

/// Translate a SQL LIKE pattern into an anchored regular expression.
pub fn like_to_regex(pattern: &str) -> String {
    let mut out = String::with_capacity(pattern.len() + 2);
    out.push('^');
    for c in pattern.chars() {
        match c {
            '%' => out.push_str(".*"),
            '_' => out.push('.'),
            other => out.push_str(&regex::escape(other.encode_utf8(&mut [0u8; 4]))),
        }
    }
    out.push('$');
    out
}

/// Translate a SQL LIKE pattern into a `*`/`?` glob, escaping glob metacharacters.
pub fn like_to_glob(pattern: &str) -> String {
    let mut out = String::with_capacity(pattern.len());
    for c in pattern.chars() {
        match c {
            '%' => out.push('*'),
            '_' => out.push('?'),
            '*' | '?' | '[' | ']' | '\\' => {
                out.push('\\');
                out.push(c);
            }
            other => out.push(other),
        }
    }
    out
}

/// Fail on the first read-side clause a backend has no equivalent for.
pub(crate) fn reject_clauses(query: &Query, backend: &str, clauses: &[Clause]) -> Result<()> {
    for clause in clauses {
        if clause.present_in(query) {
            return Err(OnedbError::unsupported(clause.name(), backend));
        }
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Clause {
    Join,
    GroupBy,
    Having,
    OrderBy,
    Limit,
    Offset,
    Distinct,
    Aggregate,
    Returning,
    Projection,
}

impl Clause {
    fn name(&self) -> &'static str {
        match self {
            Clause::Join => "JOIN",
            Clause::GroupBy => "GROUP BY",
            Clause::Having => "HAVING",
            Clause::OrderBy => "ORDER BY",
            Clause::Limit => "LIMIT",
            Clause::Offset => "OFFSET",
            Clause::Distinct => "DISTINCT",
            Clause::Aggregate => "aggregate projection",
            Clause::Returning => "RETURNING",
            Clause::Projection => "projection",
        }
    }

    fn present_in(&self, q: &Query) -> bool {
        match self {
            Clause::Join => !q.joins().is_empty(),
            Clause::GroupBy => !q.group_by_columns().is_empty(),
            Clause::Having => q.having_tree().is_some(),
            Clause::OrderBy => !q.order().is_empty(),
            Clause::Limit => q.limit_value().is_some(),
            Clause::Offset => q.offset_value().is_some(),
            Clause::Distinct => q.is_distinct(),
            Clause::Aggregate => q.has_aggregates(),
            Clause::Returning => !q.returning_columns().is_empty(),
            Clause::Projection => !q.columns().is_empty(),
        }
    }
}

/// Clauses that only make sense on a SELECT.
pub(crate) const READ_ONLY_CLAUSES: &[Clause] = &[
    Clause::Join,
    Clause::GroupBy,
    Clause::Having,
    Clause::OrderBy,
    Clause::Limit,
    Clause::Offset,
    Clause::Distinct,
    Clause::Projection,
];

pub(crate) fn is_write(query: &Query) -> bool {
    query.action() != Action::Select
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_like_to_regex() {
        assert_eq!(like_to_regex("J%"), "^J.*$");
        assert_eq!(like_to_regex("a_c"), "^a.c$");
        assert_eq!(like_to_regex("1.5%"), "^1\\.5.*$");
    }

    #[test]
    fn test_like_to_glob() {
        assert_eq!(like_to_glob("user_%"), "user?*");
        assert_eq!(like_to_glob("a*b%"), "a\\*b*");
    }
}
