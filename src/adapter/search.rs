//! Elasticsearch: indices as tables, query DSL as the native language.

use serde_json::json;

use super::{AdapterKind, Backend, Capabilities};
use crate::ast::Query;
use crate::error::Result;
use crate::native::{Introspection, NativeRequest};
use crate::transpiler::ApiRequest;
use crate::value::Value;

#[derive(Debug, Default)]
pub struct ElasticBackend;

impl Backend for ElasticBackend {
    fn name(&self) -> &'static str {
        "elasticsearch"
    }

    fn kind(&self) -> AdapterKind {
        AdapterKind::Search
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            sql: false,
            transactions: false,
            savepoints: false,
            joins: false,
            aggregation_pipeline: true,
            schema_introspection: true,
        }
    }

    fn translate(&self, query: &Query) -> Result<NativeRequest> {
        Ok(NativeRequest::Api(query.to_elastic()?))
    }

    /// Raw text is `<operation> <index>`; the single param, if any, is the
    /// JSON body.
    fn raw(&self, text: &str, params: Vec<Value>) -> NativeRequest {
        let (operation, target) = text.trim().split_once(' ').unwrap_or((text.trim(), ""));
        let body = params.into_iter().next().map(|v| v.to_json()).unwrap_or_else(|| json!({}));
        NativeRequest::Api(ApiRequest::new(operation, target.trim(), body))
    }

    fn introspect(&self, what: &Introspection) -> Result<NativeRequest> {
        Ok(NativeRequest::Api(match what {
            Introspection::Tables => ApiRequest::new("cat_indices", "", json!({})),
            Introspection::Columns { table } => {
                ApiRequest::new("get_mapping", table.as_str(), json!({}))
            }
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raw_api_request() {
        let req = ElasticBackend.raw("search logs", vec![Value::Json(json!({ "size": 1 }))]);
        assert_eq!(
            req,
            NativeRequest::Api(ApiRequest::new("search", "logs", json!({ "size": 1 })))
        );
    }
}
