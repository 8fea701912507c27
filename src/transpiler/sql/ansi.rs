use super::super::traits::SqlGenerator;
use crate::value::Value;

/// Standard SQL with `information_schema` introspection.
pub struct AnsiGenerator;

impl SqlGenerator for AnsiGenerator {
    fn name(&self) -> &'static str {
        "ansi"
    }

    fn list_tables_sql(&self, _database: &str) -> (String, Vec<Value>) {
        (
            "SELECT table_name AS name FROM information_schema.tables ORDER BY table_name"
                .to_string(),
            vec![],
        )
    }

    fn list_columns_sql(&self, _database: &str, table: &str) -> (String, Vec<Value>) {
        (
            "SELECT column_name AS name, data_type, \
             CASE WHEN is_nullable = 'YES' THEN 1 ELSE 0 END AS nullable, \
             column_default AS default_value \
             FROM information_schema.columns WHERE table_name = ? ORDER BY ordinal_position"
                .to_string(),
            vec![Value::from(table)],
        )
    }
}
