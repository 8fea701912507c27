//! The seam to native client libraries.
//!
//! A [`Driver`] opens [`NativeConnection`]s for a descriptor; a connection
//! runs one [`NativeRequest`] at a time and answers with a raw
//! [`NativeResponse`]. Failures come back as [`NativeError`] and are
//! classified by the adapter's [`ErrorMapper`](crate::mapper::ErrorMapper).

use std::fmt;

use async_trait::async_trait;
use serde::Serialize;

use crate::descriptor::Descriptor;
use crate::transpiler::{ApiRequest, Command, CypherQuery, MongoQuery};
use crate::value::{Record, Value};

/// A request in the backend's own shape.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum NativeRequest {
    /// SQL or CQL text with positional parameters.
    Sql { sql: String, params: Vec<Value> },
    Document(MongoQuery),
    Commands(Vec<Command>),
    Cypher(CypherQuery),
    Api(ApiRequest),
    /// Caller-supplied native text passed through untouched.
    Raw { text: String, params: Vec<Value> },
    /// Transaction control for backends without a textual form.
    Transaction(TxOp),
    Introspect(Introspection),
}

impl NativeRequest {
    /// Short form for logs.
    pub fn summary(&self) -> String {
        match self {
            NativeRequest::Sql { sql, .. } => sql.clone(),
            NativeRequest::Raw { text, .. } => text.clone(),
            NativeRequest::Document(q) => format!("{:?} {}", q.operation, q.collection),
            NativeRequest::Commands(cmds) => cmds
                .iter()
                .map(|c| c.name().to_string())
                .collect::<Vec<_>>()
                .join(" "),
            NativeRequest::Cypher(c) => c.statement.clone(),
            NativeRequest::Api(r) => format!("{} {}", r.operation, r.target),
            NativeRequest::Transaction(op) => op.to_string(),
            NativeRequest::Introspect(i) => format!("{:?}", i),
        }
    }
}

/// Transaction control operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum TxOp {
    Begin,
    Commit,
    Rollback,
    Savepoint(String),
    ReleaseSavepoint(String),
    RollbackToSavepoint(String),
}

impl fmt::Display for TxOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TxOp::Begin => write!(f, "BEGIN"),
            TxOp::Commit => write!(f, "COMMIT"),
            TxOp::Rollback => write!(f, "ROLLBACK"),
            TxOp::Savepoint(name) => write!(f, "SAVEPOINT {}", name),
            TxOp::ReleaseSavepoint(name) => write!(f, "RELEASE SAVEPOINT {}", name),
            TxOp::RollbackToSavepoint(name) => write!(f, "ROLLBACK TO SAVEPOINT {}", name),
        }
    }
}

/// Schema introspection for backends that expose it through an API call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum Introspection {
    Tables,
    Columns { table: String },
}

/// Raw reply from a native client.
#[derive(Debug, Clone, PartialEq)]
pub enum NativeResponse {
    /// Tabular result.
    Rows {
        columns: Vec<String>,
        rows: Vec<Vec<Value>>,
        affected: u64,
        last_id: Option<Value>,
    },
    /// Schemaless documents or hashes.
    Documents(Vec<Record>),
    /// Scalar replies (Redis, counts).
    Values(Vec<Value>),
    /// Write acknowledgement.
    Ack { affected: u64, last_id: Option<Value> },
}

/// An error as raised by a native client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NativeError {
    /// Broad class: `database`, `io`, `tls`, `auth`, `timeout`, `protocol`, ...
    pub category: String,
    /// Backend code (SQLSTATE, server error number, exception name).
    pub code: Option<String>,
    pub message: String,
}

impl NativeError {
    pub fn new(category: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            category: category.into(),
            code: None,
            message: message.into(),
        }
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }
}

impl fmt::Display for NativeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.code {
            Some(code) => write!(f, "[{}:{}] {}", self.category, code, self.message),
            None => write!(f, "[{}] {}", self.category, self.message),
        }
    }
}

impl std::error::Error for NativeError {}

pub type NativeResult<T> = std::result::Result<T, NativeError>;

/// Factory for native connections of one client library.
#[async_trait]
pub trait Driver: Send + Sync {
    /// Client library name, e.g. `sqlx-sqlite`.
    fn name(&self) -> &str;

    async fn connect(&self, descriptor: &Descriptor) -> NativeResult<Box<dyn NativeConnection>>;
}

/// One live native connection.
#[async_trait]
pub trait NativeConnection: Send {
    async fn execute(&mut self, request: &NativeRequest) -> NativeResult<NativeResponse>;

    async fn ping(&mut self) -> NativeResult<()>;

    async fn close(self: Box<Self>) -> NativeResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_native_error_display() {
        let e = NativeError::new("database", "duplicate key").with_code("23505");
        assert_eq!(e.to_string(), "[database:23505] duplicate key");
        assert_eq!(NativeError::new("io", "reset").to_string(), "[io] reset");
    }

    #[test]
    fn test_request_summary() {
        let r = NativeRequest::Transaction(TxOp::Savepoint("sp_1".into()));
        assert_eq!(r.summary(), "SAVEPOINT sp_1");
        let c = NativeRequest::Commands(vec![Command::new(["HGETALL", "users:1"])]);
        assert_eq!(c.summary(), "HGETALL");
    }
}
