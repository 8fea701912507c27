use super::super::placeholder::PlaceholderStyle;
use super::super::traits::SqlGenerator;
use crate::value::Value;

pub struct PostgresGenerator;

impl SqlGenerator for PostgresGenerator {
    fn name(&self) -> &'static str {
        "postgresql"
    }

    fn default_placeholder(&self) -> PlaceholderStyle {
        PlaceholderStyle::Dollar
    }

    fn supports_ilike(&self) -> bool {
        true
    }

    fn list_tables_sql(&self, _database: &str) -> (String, Vec<Value>) {
        (
            "SELECT CAST(table_name AS TEXT) AS name FROM information_schema.tables \
             WHERE table_schema = 'public' AND table_type = 'BASE TABLE' ORDER BY table_name"
                .to_string(),
            vec![],
        )
    }

    fn list_columns_sql(&self, _database: &str, table: &str) -> (String, Vec<Value>) {
        (
            "SELECT CAST(column_name AS TEXT) AS name, CAST(data_type AS TEXT) AS data_type, \
             CASE WHEN is_nullable = 'YES' THEN 1 ELSE 0 END AS nullable, \
             CAST(column_default AS TEXT) AS default_value \
             FROM information_schema.columns \
             WHERE table_schema = 'public' AND table_name = $1 ORDER BY ordinal_position"
                .to_string(),
            vec![Value::from(table)],
        )
    }
}
