use super::super::traits::{SqlFeature, SqlGenerator};
use crate::value::Value;

pub struct SnowflakeGenerator;

impl SqlGenerator for SnowflakeGenerator {
    fn name(&self) -> &'static str {
        "snowflake"
    }

    fn supports(&self, feature: SqlFeature) -> bool {
        feature != SqlFeature::Returning
    }

    fn supports_ilike(&self) -> bool {
        true
    }

    fn supports_savepoints(&self) -> bool {
        false
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

    fn list_tables_sql(&self, _database: &str) -> (String, Vec<Value>) {
        (
            "SELECT table_name AS name FROM information_schema.tables \
             WHERE table_schema = CURRENT_SCHEMA() ORDER BY table_name"
                .to_string(),
            vec![],
        )
    }

    fn list_columns_sql(&self, _database: &str, table: &str) -> (String, Vec<Value>) {
        (
            "SELECT column_name AS name, data_type, \
             CASE WHEN is_nullable = 'YES' THEN 1 ELSE 0 END AS nullable, \
             column_default AS default_value FROM information_schema.columns \
             WHERE table_schema = CURRENT_SCHEMA() AND table_name = ? \
             ORDER BY ordinal_position"
                .to_string(),
            vec![Value::from(table.to_uppercase())],
        )
    }
}
