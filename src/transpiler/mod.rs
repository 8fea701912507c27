//! Lowering of [`Query`] into native request shapes.
//!
//! SQL dialects share one statement builder parameterized by a
//! [`SqlGenerator`]; the other backends each have a lowering under
//! [`nosql`].

pub mod conditions;
pub mod dialect;
pub mod dml;
pub mod nosql;
pub mod placeholder;
pub mod sql;
pub mod traits;

pub use dialect::SqlDialect;
pub use nosql::ApiRequest;
pub use nosql::mongo::{MongoOperation, MongoQuery};
pub use nosql::neo4j::CypherQuery;
pub use nosql::redis::Command;
pub use placeholder::{ParamContext, PlaceholderStyle};
pub use traits::{SqlFeature, SqlGenerator};

use crate::ast::{Action, Query};
use crate::error::Result;
use crate::transpiler::sql::cql::CqlGenerator;
use crate::value::Value;

impl Query {
    /// Render as ANSI SQL with the given placeholder style.
    pub fn to_sql(&self, style: PlaceholderStyle) -> Result<(String, Vec<Value>)> {
        self.to_sql_with(SqlDialect::Ansi, style)
    }

    /// Render for a specific SQL dialect.
    pub fn to_sql_with(
        &self,
        dialect: SqlDialect,
        style: PlaceholderStyle,
    ) -> Result<(String, Vec<Value>)> {
        dml::build_sql(self, dialect.generator().as_ref(), style)
    }

    /// Filter document plus find options.
    pub fn to_mongo(&self) -> Result<MongoQuery> {
        nosql::mongo::build_mongo(self)
    }

    /// Aggregation pipeline (joins, grouping, aggregates).
    pub fn to_mongo_pipeline(&self) -> Result<MongoQuery> {
        nosql::mongo::build_pipeline(self)
    }

    pub fn to_dynamo(&self) -> Result<ApiRequest> {
        nosql::dynamo::build_dynamo(self)
    }

    /// Redis commands, keyed on the `id` column.
    pub fn to_redis(&self) -> Result<Vec<Command>> {
        nosql::redis::build_redis(self, nosql::redis::DEFAULT_KEY_COLUMN)
    }

    pub fn to_cypher(&self) -> Result<CypherQuery> {
        nosql::neo4j::build_cypher(self)
    }

    pub fn to_elastic(&self) -> Result<ApiRequest> {
        nosql::elastic::build_elastic(self)
    }

    /// CQL with `ALLOW FILTERING` on filtered selects.
    pub fn to_cql(&self) -> Result<(String, Vec<Value>)> {
        cql(self, &CqlGenerator::default(), PlaceholderStyle::Question)
    }
}

/// CQL has no multi-row VALUES; several rows become a logged batch.
pub(crate) fn cql(
    query: &Query,
    generator: &CqlGenerator,
    style: PlaceholderStyle,
) -> Result<(String, Vec<Value>)> {
    if query.action() != Action::Insert || query.rows().len() < 2 {
        return dml::build_sql(query, generator, style);
    }
    query.validate()?;
    let mut ctx = ParamContext::new(style);
    let mut statements = Vec::with_capacity(query.rows().len());
    for row in query.rows() {
        let single = Query::insert_into(query.table()).values(row.clone());
        statements.push(dml::write::build_insert(&single, generator, &mut ctx)?);
    }
    Ok((
        format!("BEGIN BATCH {}; APPLY BATCH", statements.join("; ")),
        ctx.into_params(),
    ))
}
