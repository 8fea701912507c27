//! Redis. Hashes keyed `<table>:<key>`; transactions are MULTI/EXEC.

use super::{AdapterKind, Backend, Capabilities};
use crate::ast::Query;
use crate::error::{OnedbError, Result};
use crate::native::{Introspection, NativeRequest, TxOp};
use crate::transpiler::Command;
use crate::transpiler::nosql::redis::{DEFAULT_KEY_COLUMN, build_redis};
use crate::value::Value;

#[derive(Debug)]
pub struct RedisBackend {
    key_column: String,
}

impl RedisBackend {
    pub fn new(key_column: impl Into<String>) -> Self {
        Self {
            key_column: key_column.into(),
        }
    }
}

impl Default for RedisBackend {
    fn default() -> Self {
        Self::new(DEFAULT_KEY_COLUMN)
    }
}

impl Backend for RedisBackend {
    fn name(&self) -> &'static str {
        "redis"
    }

    fn kind(&self) -> AdapterKind {
        AdapterKind::KeyValue
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            sql: false,
            transactions: true,
            savepoints: false,
            joins: false,
            aggregation_pipeline: false,
            schema_introspection: false,
        }
    }

    fn translate(&self, query: &Query) -> Result<NativeRequest> {
        Ok(NativeRequest::Commands(build_redis(query, &self.key_column)?))
    }

    /// `"GET", ["k"]` style: the text is the command name, params its
    /// arguments.
    fn raw(&self, text: &str, params: Vec<Value>) -> NativeRequest {
        let mut parts: Vec<String> = text.split_whitespace().map(str::to_string).collect();
        parts.extend(params.iter().map(Value::to_plain_string));
        NativeRequest::Commands(vec![Command(parts)])
    }

    fn transaction_request(&self, op: &TxOp) -> Result<Option<NativeRequest>> {
        let name = match op {
            TxOp::Begin => "MULTI",
            TxOp::Commit => "EXEC",
            TxOp::Rollback => "DISCARD",
            _ => return Err(OnedbError::unsupported("savepoints", self.name())),
        };
        Ok(Some(NativeRequest::Commands(vec![Command::new([name])])))
    }

    fn introspect(&self, _what: &Introspection) -> Result<NativeRequest> {
        Err(OnedbError::unsupported("schema introspection", self.name()))
    }
}
