use super::super::placeholder::PlaceholderStyle;
use super::super::traits::{SqlFeature, SqlGenerator};
use crate::value::Value;

pub struct BigQueryGenerator;

impl SqlGenerator for BigQueryGenerator {
    fn name(&self) -> &'static str {
        "bigquery"
    }

    fn quote_identifier(&self, id: &str) -> String {
        format!("`{}`", id.replace('`', "\\`"))
    }

    fn default_placeholder(&self) -> PlaceholderStyle {
        PlaceholderStyle::At
    }

    fn supports(&self, feature: SqlFeature) -> bool {
        feature != SqlFeature::Returning
    }

    fn supports_savepoints(&self) -> bool {
        false
    }

    fn begin_sql(&self) -> Option<String> {
        Some("BEGIN TRANSACTION".to_string())
    }

    fn commit_sql(&self) -> Option<String> {
        Some("COMMIT TRANSACTION".to_string())
    }

    fn rollback_sql(&self) -> Option<String> {
        Some("ROLLBACK TRANSACTION".to_string())
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
            format!(
                "SELECT table_name AS name FROM {}.INFORMATION_SCHEMA.TABLES ORDER BY table_name",
                self.quote_identifier(database)
            ),
            vec![],
        )
    }

    fn list_columns_sql(&self, database: &str, table: &str) -> (String, Vec<Value>) {
        (
            format!(
                "SELECT column_name AS name, data_type, \
                 CASE WHEN is_nullable = 'YES' THEN 1 ELSE 0 END AS nullable, \
                 column_default AS default_value FROM {}.INFORMATION_SCHEMA.COLUMNS \
                 WHERE table_name = @p1 ORDER BY ordinal_position",
                self.quote_identifier(database)
            ),
            vec![Value::from(table)],
        )
    }
}
