//! Translation of native errors into the canonical taxonomy.
//!
//! Each adapter variant owns an ordered rule table; the first rule whose
//! matcher accepts the native error decides the kind. Anything unmatched is
//! a `Query` error carrying the original message and code.

use tracing::debug;

use crate::adapter::AdapterKind;
use crate::error::ErrorKind::{Connection, ConstraintViolation, Timeout};
use crate::error::{Details, ErrorKind, OnedbError};
use crate::native::NativeError;

#[derive(Debug, Clone, Copy)]
enum Matcher {
    Category(&'static str),
    Code(&'static str),
    CodePrefix(&'static str),
}

impl Matcher {
    fn matches(&self, err: &NativeError) -> bool {
        match self {
            Matcher::Category(c) => err.category.eq_ignore_ascii_case(c),
            Matcher::Code(c) => err.code.as_deref() == Some(*c),
            Matcher::CodePrefix(p) => err.code.as_deref().is_some_and(|code| code.starts_with(p)),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Rule {
    matcher: Matcher,
    kind: ErrorKind,
}

const fn category(c: &'static str, kind: ErrorKind) -> Rule {
    Rule { matcher: Matcher::Category(c), kind }
}

const fn code(c: &'static str, kind: ErrorKind) -> Rule {
    Rule { matcher: Matcher::Code(c), kind }
}

const fn prefix(p: &'static str, kind: ErrorKind) -> Rule {
    Rule { matcher: Matcher::CodePrefix(p), kind }
}

const RELATIONAL: &[Rule] = &[
    category("constraint", ConstraintViolation),
    category("timeout", Timeout),
    category("io", Connection),
    category("tls", Connection),
    category("auth", Connection),
    // SQLSTATE classes
    prefix("23", ConstraintViolation),
    prefix("08", Connection),
    prefix("28", Connection),
    code("57014", Timeout),
    code("HYT00", Timeout),
    code("HYT01", Timeout),
    // SQLite primary and extended result codes
    code("19", ConstraintViolation),
    code("275", ConstraintViolation),
    code("787", ConstraintViolation),
    code("1299", ConstraintViolation),
    code("1555", ConstraintViolation),
    code("2067", ConstraintViolation),
    code("5", Timeout),
    // MySQL / MariaDB
    code("1062", ConstraintViolation),
    code("1048", ConstraintViolation),
    code("1451", ConstraintViolation),
    code("1452", ConstraintViolation),
    code("3819", ConstraintViolation),
    code("1045", Connection),
    code("2002", Connection),
    code("2003", Connection),
    code("2006", Connection),
    code("2013", Connection),
    code("1205", Timeout),
    code("3024", Timeout),
    // SQL Server
    code("2627", ConstraintViolation),
    code("2601", ConstraintViolation),
    code("547", ConstraintViolation),
    code("515", ConstraintViolation),
    code("18456", Connection),
    // Oracle
    code("ORA-00001", ConstraintViolation),
    code("ORA-01400", ConstraintViolation),
    code("ORA-02290", ConstraintViolation),
    code("ORA-02291", ConstraintViolation),
    code("ORA-02292", ConstraintViolation),
    code("ORA-01017", Connection),
    code("ORA-12154", Connection),
    code("ORA-12541", Connection),
    code("ORA-01013", Timeout),
];

const DOCUMENT: &[Rule] = &[
    category("timeout", Timeout),
    category("io", Connection),
    category("tls", Connection),
    category("auth", Connection),
    category("network", Connection),
    category("server_selection", Connection),
    code("11000", ConstraintViolation),
    code("11001", ConstraintViolation),
    code("ConditionalCheckFailedException", ConstraintViolation),
    code("TransactionCanceledException", ConstraintViolation),
    code("50", Timeout),
    code("ProvisionedThroughputExceededException", Timeout),
    code("RequestLimitExceeded", Timeout),
    code("18", Connection),
    code("UnrecognizedClientException", Connection),
];

const KEY_VALUE: &[Rule] = &[
    category("timeout", Timeout),
    category("io", Connection),
    category("tls", Connection),
    category("auth", Connection),
    prefix("NOAUTH", Connection),
    prefix("WRONGPASS", Connection),
    prefix("BUSY", Timeout),
];

const GRAPH: &[Rule] = &[
    category("timeout", Timeout),
    category("io", Connection),
    category("tls", Connection),
    category("auth", Connection),
    code("Neo.ClientError.Schema.ConstraintValidationFailed", ConstraintViolation),
    prefix("Neo.ClientError.Security.", Connection),
    code("ServiceUnavailable", Connection),
    code("SessionExpired", Connection),
    code("Neo.ClientError.Transaction.TransactionTimedOut", Timeout),
];

const COLUMN_STORE: &[Rule] = &[
    category("timeout", Timeout),
    category("io", Connection),
    category("tls", Connection),
    category("auth", Connection),
    code("NoHostAvailable", Connection),
    code("Unavailable", Connection),
    code("ReadTimeout", Timeout),
    code("WriteTimeout", Timeout),
    code("OperationTimedOut", Timeout),
];

const SEARCH: &[Rule] = &[
    category("timeout", Timeout),
    category("io", Connection),
    category("tls", Connection),
    category("auth", Connection),
    category("connection", Connection),
    code("version_conflict_engine_exception", ConstraintViolation),
    code("timeout_exception", Timeout),
];

/// Per-variant native error classifier.
#[derive(Debug, Clone)]
pub struct ErrorMapper {
    backend: String,
    rules: &'static [Rule],
}

impl ErrorMapper {
    pub fn new(kind: AdapterKind, backend: impl Into<String>) -> Self {
        let rules = match kind {
            AdapterKind::Relational => RELATIONAL,
            AdapterKind::Document => DOCUMENT,
            AdapterKind::KeyValue => KEY_VALUE,
            AdapterKind::Graph => GRAPH,
            AdapterKind::ColumnStore => COLUMN_STORE,
            AdapterKind::Search => SEARCH,
        };
        Self {
            backend: backend.into(),
            rules,
        }
    }

    /// Canonical kind for a native error. Falls back to `Query`.
    pub fn classify(&self, err: &NativeError) -> ErrorKind {
        self.rules
            .iter()
            .find(|rule| rule.matcher.matches(err))
            .map(|rule| rule.kind)
            .unwrap_or(ErrorKind::Query)
    }

    /// Build the canonical error, merging `context` (host, query text, ...)
    /// into its details.
    pub fn map(&self, err: NativeError, context: Details) -> OnedbError {
        let kind = self.classify(&err);
        debug!(backend = %self.backend, kind = %kind, error = %err, "mapped native error");

        let mut details = context;
        details.insert("backend".to_string(), self.backend.clone());
        details.insert("category".to_string(), err.category.clone());
        if let Some(code) = &err.code {
            details.insert("code".to_string(), code.clone());
        }
        let message = err.message;
        match kind {
            ErrorKind::Connection => OnedbError::Connection { message, details },
            ErrorKind::Timeout => OnedbError::Timeout { message, details },
            ErrorKind::ConstraintViolation => OnedbError::ConstraintViolation { message, details },
            _ => OnedbError::Query { message, details },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn db(code: &str) -> NativeError {
        NativeError::new("database", "boom").with_code(code)
    }

    #[test]
    fn test_relational_rules() {
        let m = ErrorMapper::new(AdapterKind::Relational, "postgresql");
        assert_eq!(m.classify(&db("23505")), ConstraintViolation);
        assert_eq!(m.classify(&db("08006")), Connection);
        assert_eq!(m.classify(&db("57014")), Timeout);
        assert_eq!(m.classify(&db("2067")), ConstraintViolation);
        assert_eq!(m.classify(&db("1062")), ConstraintViolation);
        assert_eq!(m.classify(&db("ORA-01013")), Timeout);
        assert_eq!(m.classify(&NativeError::new("io", "reset")), Connection);
        assert_eq!(m.classify(&db("42601")), ErrorKind::Query);
    }

    #[test]
    fn test_other_variants() {
        let doc = ErrorMapper::new(AdapterKind::Document, "mongodb");
        assert_eq!(doc.classify(&db("11000")), ConstraintViolation);
        let kv = ErrorMapper::new(AdapterKind::KeyValue, "redis");
        assert_eq!(kv.classify(&db("NOAUTH Authentication required")), Connection);
        assert_eq!(kv.classify(&db("BUSY Redis is busy")), Timeout);
        let graph = ErrorMapper::new(AdapterKind::Graph, "neo4j");
        assert_eq!(
            graph.classify(&db("Neo.ClientError.Security.Unauthorized")),
            Connection
        );
        let cs = ErrorMapper::new(AdapterKind::ColumnStore, "cassandra");
        assert_eq!(cs.classify(&db("ReadTimeout")), Timeout);
        let search = ErrorMapper::new(AdapterKind::Search, "elasticsearch");
        assert_eq!(
            search.classify(&db("version_conflict_engine_exception")),
            ConstraintViolation
        );
    }

    #[test]
    fn test_unmatched_preserves_detail() {
        let m = ErrorMapper::new(AdapterKind::Relational, "sqlite");
        let mut ctx = Details::new();
        ctx.insert("query".to_string(), "SELEC 1".to_string());
        let err = m.map(NativeError::new("database", "syntax error").with_code("1"), ctx);
        assert_eq!(err.kind(), ErrorKind::Query);
        assert_eq!(err.to_string(), "Query error: syntax error");
        let details = err.details();
        assert_eq!(details["query"], "SELEC 1");
        assert_eq!(details["code"], "1");
        assert_eq!(details["backend"], "sqlite");
    }
}
