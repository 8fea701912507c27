use super::super::placeholder::PlaceholderStyle;
use super::super::traits::{SqlFeature, SqlGenerator};
use crate::value::Value;

pub struct SqlServerGenerator;

impl SqlGenerator for SqlServerGenerator {
    fn name(&self) -> &'static str {
        "mssql"
    }

    fn quote_identifier(&self, id: &str) -> String {
        format!("[{}]", id.replace(']', "]]"))
    }

    fn default_placeholder(&self) -> PlaceholderStyle {
        PlaceholderStyle::At
    }

    fn supports(&self, feature: SqlFeature) -> bool {
        feature != SqlFeature::Returning
    }

    fn limit_offset(&self, limit: Option<u64>, offset: Option<u64>) -> String {
        // Syntax: OFFSET n ROWS FETCH NEXT m ROWS ONLY
        let mut sql = String::new();
        if limit.is_some() || offset.is_some() {
            sql.push_str(&format!(" OFFSET {} ROWS", offset.unwrap_or(0)));
            if let Some(lim) = limit {
                sql.push_str(&format!(" FETCH NEXT {} ROWS ONLY", lim));
            }
        }
        sql
    }

    fn offset_requires_order(&self) -> bool {
        true
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

    fn savepoint_sql(&self, name: &str) -> Option<String> {
        Some(format!("SAVE TRANSACTION {}", name))
    }

    fn release_savepoint_sql(&self, _name: &str) -> Option<String> {
        None
    }

    fn rollback_to_savepoint_sql(&self, name: &str) -> Option<String> {
        Some(format!("ROLLBACK TRANSACTION {}", name))
    }

    fn list_tables_sql(&self, _database: &str) -> (String, Vec<Value>) {
        (
            "SELECT TABLE_NAME AS name FROM INFORMATION_SCHEMA.TABLES \
             WHERE TABLE_TYPE = 'BASE TABLE' ORDER BY TABLE_NAME"
                .to_string(),
            vec![],
        )
    }

    fn list_columns_sql(&self, _database: &str, table: &str) -> (String, Vec<Value>) {
        (
            "SELECT COLUMN_NAME AS name, DATA_TYPE AS data_type, \
             CASE WHEN IS_NULLABLE = 'YES' THEN 1 ELSE 0 END AS nullable, \
             COLUMN_DEFAULT AS default_value FROM INFORMATION_SCHEMA.COLUMNS \
             WHERE TABLE_NAME = @p1 ORDER BY ORDINAL_POSITION"
                .to_string(),
            vec![Value::from(table)],
        )
    }
}
