//! Cassandra / CQL.

use super::{AdapterKind, Backend, Capabilities};
use crate::ast::Query;
use crate::error::Result;
use crate::native::{Introspection, NativeRequest};
use crate::transpiler::sql::cql::CqlGenerator;
use crate::transpiler::{PlaceholderStyle, SqlGenerator, cql};
use crate::value::Value;

pub struct CassandraBackend {
    generator: CqlGenerator,
    keyspace: String,
}

impl CassandraBackend {
    pub fn new(keyspace: impl Into<String>, allow_filtering: bool) -> Self {
        Self {
            generator: CqlGenerator::new(allow_filtering),
            keyspace: keyspace.into(),
        }
    }
}

impl Backend for CassandraBackend {
    fn name(&self) -> &'static str {
        "cassandra"
    }

    fn kind(&self) -> AdapterKind {
        AdapterKind::ColumnStore
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            sql: true,
            transactions: false,
            savepoints: false,
            joins: false,
            aggregation_pipeline: false,
            schema_introspection: true,
        }
    }

    fn translate(&self, query: &Query) -> Result<NativeRequest> {
        let (sql, params) = cql(query, &self.generator, PlaceholderStyle::Question)?;
        Ok(NativeRequest::Sql { sql, params })
    }

    fn raw(&self, text: &str, params: Vec<Value>) -> NativeRequest {
        NativeRequest::Sql {
            sql: text.to_string(),
            params,
        }
    }

    fn introspect(&self, what: &Introspection) -> Result<NativeRequest> {
        let (sql, params) = match what {
            Introspection::Tables => self.generator.list_tables_sql(&self.keyspace),
            Introspection::Columns { table } => self.generator.list_columns_sql(&self.keyspace, table),
        };
        Ok(NativeRequest::Sql { sql, params })
    }
}
