//! Document stores: MongoDB and DynamoDB.

use serde_json::json;

use super::{AdapterKind, Backend, Capabilities};
use crate::ast::Query;
use crate::error::Result;
use crate::native::{Introspection, NativeRequest};
use crate::transpiler::ApiRequest;

/// MongoDB: finds for plain filters, aggregation pipelines for joins,
/// grouping, aggregates and DISTINCT.
#[derive(Debug, Default)]
pub struct MongoBackend;

impl MongoBackend {
    fn needs_pipeline(query: &Query) -> bool {
        !query.joins().is_empty()
            || !query.group_by_columns().is_empty()
            || query.has_aggregates()
            || query.is_distinct()
            || query.having_tree().is_some()
    }
}

impl Backend for MongoBackend {
    fn name(&self) -> &'static str {
        "mongodb"
    }

    fn kind(&self) -> AdapterKind {
        AdapterKind::Document
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            sql: false,
            transactions: true,
            savepoints: false,
            joins: true,
            aggregation_pipeline: true,
            schema_introspection: true,
        }
    }

    fn translate(&self, query: &Query) -> Result<NativeRequest> {
        let lowered = if Self::needs_pipeline(query) {
            query.to_mongo_pipeline()?
        } else {
            query.to_mongo()?
        };
        Ok(NativeRequest::Document(lowered))
    }
}

/// DynamoDB through its JSON API. Single-item conditional writes only; no
/// multi-statement transactions.
#[derive(Debug, Default)]
pub struct DynamoBackend;

impl Backend for DynamoBackend {
    fn name(&self) -> &'static str {
        "dynamodb"
    }

    fn kind(&self) -> AdapterKind {
        AdapterKind::Document
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            sql: false,
            transactions: false,
            savepoints: false,
            joins: false,
            aggregation_pipeline: false,
            schema_introspection: true,
        }
    }

    fn translate(&self, query: &Query) -> Result<NativeRequest> {
        Ok(NativeRequest::Api(query.to_dynamo()?))
    }

    fn introspect(&self, what: &Introspection) -> Result<NativeRequest> {
        Ok(NativeRequest::Api(match what {
            Introspection::Tables => ApiRequest::new("ListTables", "", json!({})),
            Introspection::Columns { table } => {
                ApiRequest::new("DescribeTable", table.as_str(), json!({ "TableName": table }))
            }
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::native::TxOp;
    use crate::transpiler::MongoOperation;

    #[test]
    fn test_mongo_picks_find_or_pipeline() {
        let b = MongoBackend;
        let NativeRequest::Document(find) = b.translate(&Query::new("users").where_eq("a", 1)).unwrap()
        else {
            panic!("expected a document request");
        };
        assert_eq!(find.operation, MongoOperation::Find);

        let grouped = Query::new("orders").group_by(["status"]);
        let NativeRequest::Document(agg) = b.translate(&grouped).unwrap() else {
            panic!("expected a document request");
        };
        assert_eq!(agg.operation, MongoOperation::Aggregate);
    }

    #[test]
    fn test_dynamo_has_no_transactions() {
        let err = DynamoBackend.transaction_request(&TxOp::Begin).unwrap_err();
        assert_eq!(err.details()["clause"], "transactions");
    }
}
