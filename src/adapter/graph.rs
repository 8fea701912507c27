//! Neo4j: labels as tables, Cypher as the native language.

use std::collections::BTreeMap;

use super::{AdapterKind, Backend, Capabilities};
use crate::ast::Query;
use crate::error::Result;
use crate::native::{Introspection, NativeRequest};
use crate::transpiler::CypherQuery;
use crate::value::Value;

#[derive(Debug, Default)]
pub struct Neo4jBackend;

impl Backend for Neo4jBackend {
    fn name(&self) -> &'static str {
        "neo4j"
    }

    fn kind(&self) -> AdapterKind {
        AdapterKind::Graph
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            sql: false,
            transactions: true,
            savepoints: false,
            joins: true,
            aggregation_pipeline: false,
            schema_introspection: true,
        }
    }

    fn translate(&self, query: &Query) -> Result<NativeRequest> {
        Ok(NativeRequest::Cypher(query.to_cypher()?))
    }

    /// Raw text is Cypher; positional params bind as `$p1`, `$p2`, ...
    fn raw(&self, text: &str, params: Vec<Value>) -> NativeRequest {
        let params: BTreeMap<String, Value> = params
            .into_iter()
            .enumerate()
            .map(|(i, v)| (format!("p{}", i + 1), v))
            .collect();
        NativeRequest::Cypher(CypherQuery {
            statement: text.to_string(),
            params,
        })
    }

    fn introspect(&self, what: &Introspection) -> Result<NativeRequest> {
        Ok(match what {
            Introspection::Tables => {
                self.raw("CALL db.labels() YIELD label RETURN label AS name", Vec::new())
            }
            Introspection::Columns { table } => self.raw(
                "MATCH (n) WHERE $p1 IN labels(n) UNWIND keys(n) AS name RETURN DISTINCT name",
                vec![Value::from(table.as_str())],
            ),
        })
    }
}
