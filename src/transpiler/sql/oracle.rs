use super::super::placeholder::PlaceholderStyle;
use super::super::traits::{SqlFeature, SqlGenerator};
use crate::value::Value;

pub struct OracleGenerator;

impl SqlGenerator for OracleGenerator {
    fn name(&self) -> &'static str {
        "oracle"
    }

    fn default_placeholder(&self) -> PlaceholderStyle {
        PlaceholderStyle::Numeric
    }

    fn supports(&self, feature: SqlFeature) -> bool {
        feature != SqlFeature::Returning
    }

    fn limit_offset(&self, limit: Option<u64>, offset: Option<u64>) -> String {
        // Oracle 12c+: OFFSET n ROWS FETCH NEXT m ROWS ONLY
        let mut sql = String::new();
        if let Some(off) = offset {
            sql.push_str(&format!(" OFFSET {} ROWS", off));
        }
        if let Some(lim) = limit {
            sql.push_str(&format!(" FETCH NEXT {} ROWS ONLY", lim));
        }
        sql
    }

    fn ping_sql(&self) -> &'static str {
        "SELECT 1 FROM DUAL"
    }

    fn begin_sql(&self) -> Option<String> {
        None
    }

    fn release_savepoint_sql(&self, _name: &str) -> Option<String> {
        None
    }

    fn list_tables_sql(&self, _database: &str) -> (String, Vec<Value>) {
        (
            "SELECT table_name AS name FROM user_tables ORDER BY table_name".to_string(),
            vec![],
        )
    }

    fn list_columns_sql(&self, _database: &str, table: &str) -> (String, Vec<Value>) {
        (
            "SELECT column_name AS name, data_type, \
             CASE WHEN nullable = 'Y' THEN 1 ELSE 0 END AS nullable, \
             data_default AS default_value FROM user_tab_columns \
             WHERE table_name = :1 ORDER BY column_id"
                .to_string(),
            vec![Value::from(table.to_uppercase())],
        )
    }
}
