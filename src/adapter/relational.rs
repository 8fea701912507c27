//! SQL databases: one backend parameterized by dialect.

use super::{AdapterKind, Backend, Capabilities};
use crate::ast::{Action, Query};
use crate::error::{OnedbError, Result};
use crate::native::{Introspection, NativeRequest, TxOp};
use crate::transpiler::{PlaceholderStyle, SqlDialect, SqlGenerator};
use crate::value::Value;

pub struct RelationalBackend {
    scheme: &'static str,
    dialect: SqlDialect,
    generator: Box<dyn SqlGenerator>,
    style: PlaceholderStyle,
    database: String,
    id_column: Option<String>,
}

impl RelationalBackend {
    pub fn new(scheme: &'static str, dialect: SqlDialect, database: impl Into<String>) -> Self {
        let generator = dialect.generator();
        Self {
            scheme,
            dialect,
            style: generator.default_placeholder(),
            generator,
            database: database.into(),
            id_column: None,
        }
    }

    /// Override the placeholder style (descriptor `paramstyle`).
    pub fn with_style(mut self, style: PlaceholderStyle) -> Self {
        self.style = style;
        self
    }

    /// Append `RETURNING <column>` to inserts and report it as `last_id`.
    pub fn with_returning_id(mut self, column: impl Into<String>) -> Self {
        self.id_column = Some(column.into());
        self
    }

    pub fn dialect(&self) -> SqlDialect {
        self.dialect
    }

    pub fn style(&self) -> PlaceholderStyle {
        self.style
    }

    fn sql(sql: String, params: Vec<Value>) -> NativeRequest {
        NativeRequest::Sql { sql, params }
    }
}

impl Backend for RelationalBackend {
    fn name(&self) -> &'static str {
        self.scheme
    }

    fn kind(&self) -> AdapterKind {
        AdapterKind::Relational
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            sql: true,
            transactions: self.generator.supports_transactions(),
            savepoints: self.generator.supports_savepoints(),
            joins: true,
            aggregation_pipeline: false,
            schema_introspection: true,
        }
    }

    fn translate(&self, query: &Query) -> Result<NativeRequest> {
        let query = match &self.id_column {
            Some(id) if query.action() == Action::Insert && query.returning_columns().is_empty() => {
                query.copy().returning([id.as_str()])
            }
            _ => query.copy(),
        };
        let (sql, params) = query.to_sql_with(self.dialect, self.style)?;
        Ok(Self::sql(sql, params))
    }

    fn raw(&self, text: &str, params: Vec<Value>) -> NativeRequest {
        Self::sql(text.to_string(), params)
    }

    fn transaction_request(&self, op: &TxOp) -> Result<Option<NativeRequest>> {
        let g = &self.generator;
        if !g.supports_transactions() {
            return Err(OnedbError::unsupported("transactions", self.scheme));
        }
        let sql = match op {
            TxOp::Begin => g.begin_sql(),
            TxOp::Commit => g.commit_sql(),
            TxOp::Rollback => g.rollback_sql(),
            TxOp::Savepoint(_) | TxOp::ReleaseSavepoint(_) | TxOp::RollbackToSavepoint(_)
                if !g.supports_savepoints() =>
            {
                return Err(OnedbError::unsupported("savepoints", self.scheme));
            }
            TxOp::Savepoint(name) => g.savepoint_sql(name),
            TxOp::ReleaseSavepoint(name) => g.release_savepoint_sql(name),
            TxOp::RollbackToSavepoint(name) => g.rollback_to_savepoint_sql(name),
        };
        Ok(sql.map(|sql| Self::sql(sql, Vec::new())))
    }

    fn introspect(&self, what: &Introspection) -> Result<NativeRequest> {
        let (sql, params) = match what {
            Introspection::Tables => self.generator.list_tables_sql(&self.database),
            Introspection::Columns { table } => {
                self.generator.list_columns_sql(&self.database, table)
            }
        };
        Ok(Self::sql(sql, params))
    }

    fn returning_id_column(&self) -> Option<&str> {
        self.id_column.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::record;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_postgres_insert_returns_id() {
        let b = RelationalBackend::new("postgresql", SqlDialect::Postgres, "shop").with_returning_id("id");
        let q = Query::insert_into("users").values(record([("name", "John")]));
        assert_eq!(
            b.translate(&q).unwrap(),
            NativeRequest::Sql {
                sql: "INSERT INTO users (name) VALUES ($1) RETURNING id".into(),
                params: vec![Value::from("John")],
            }
        );
    }

    #[test]
    fn test_transaction_statements() {
        let b = RelationalBackend::new("oracle", SqlDialect::Oracle, "XE");
        assert_eq!(b.transaction_request(&TxOp::Begin).unwrap(), None);
        assert_eq!(
            b.transaction_request(&TxOp::Savepoint("sp_1".into())).unwrap(),
            Some(NativeRequest::Sql { sql: "SAVEPOINT sp_1".into(), params: vec![] })
        );
        let bq = RelationalBackend::new("bigquery", SqlDialect::BigQuery, "ds");
        assert!(bq.transaction_request(&TxOp::Savepoint("sp_1".into())).is_err());
    }
}
