use super::super::traits::{SqlFeature, SqlGenerator};
use crate::value::Value;

/// Cassandra Query Language: the SELECT/INSERT/UPDATE/DELETE subset of SQL
/// without joins, disjunctions or offsets.
pub struct CqlGenerator {
    allow_filtering: bool,
}

impl CqlGenerator {
    pub fn new(allow_filtering: bool) -> Self {
        Self { allow_filtering }
    }
}

impl Default for CqlGenerator {
    fn default() -> Self {
        Self::new(true)
    }
}

impl SqlGenerator for CqlGenerator {
    fn name(&self) -> &'static str {
        "cassandra"
    }

    fn supports(&self, feature: SqlFeature) -> bool {
        !matches!(
            feature,
            SqlFeature::Or
                | SqlFeature::Not
                | SqlFeature::NullCheck
                | SqlFeature::Like
                | SqlFeature::Between
                | SqlFeature::Join
                | SqlFeature::RightJoin
                | SqlFeature::FullJoin
                | SqlFeature::Having
                | SqlFeature::Offset
                | SqlFeature::Returning
        )
    }

    fn filter_suffix(&self) -> Option<&'static str> {
        self.allow_filtering.then_some(" ALLOW FILTERING")
    }

    fn ping_sql(&self) -> &'static str {
        "SELECT release_version FROM system.local"
    }

    fn supports_transactions(&self) -> bool {
        false
    }

    fn supports_savepoints(&self) -> bool {
        false
    }

    fn begin_sql(&self) -> Option<String> {
        None
    }

    fn commit_sql(&self) -> Option<String> {
        None
    }

    fn rollback_sql(&self) -> Option<String> {
        None
    }

    fn savepoint_sql(&self, _name: &str) -> Option<String> {
        None
    }

    fn release_savepoint_sql(&self, _name: &str) -> Option<String> {
        None
    }

    fn rollback_to_savepoint_sql(&self, _name: &str) -> Option<String> {
        None
    }

    fn list_tables_sql(&self, database: &str) -> (String, Vec<Value>) {
        (
            "SELECT table_name AS name FROM system_schema.tables WHERE keyspace_name = ?"
                .to_string(),
            vec![Value::from(database)],
        )
    }

    fn list_columns_sql(&self, database: &str, table: &str) -> (String, Vec<Value>) {
        (
            "SELECT column_name AS name, type AS data_type FROM system_schema.columns \
             WHERE keyspace_name = ? AND table_name = ?"
                .to_string(),
            vec![Value::from(database), Value::from(table)],
        )
    }
}
