use super::super::traits::{SqlFeature, SqlGenerator};
use crate::value::Value;

pub struct SqliteGenerator;

impl SqlGenerator for SqliteGenerator {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    fn supports(&self, feature: SqlFeature) -> bool {
        // RIGHT/FULL joins need SQLite 3.39; older bundled builds reject them.
        !matches!(feature, SqlFeature::RightJoin | SqlFeature::FullJoin)
    }

    fn limit_offset(&self, limit: Option<u64>, offset: Option<u64>) -> String {
        match (limit, offset) {
            (None, Some(off)) => format!(" LIMIT -1 OFFSET {}", off),
            (Some(lim), Some(off)) => format!(" LIMIT {} OFFSET {}", lim, off),
            (Some(lim), None) => format!(" LIMIT {}", lim),
            (None, None) => String::new(),
        }
    }

    fn list_tables_sql(&self, _database: &str) -> (String, Vec<Value>) {
        (
            "SELECT name FROM sqlite_master WHERE type = 'table' \
             AND name NOT LIKE 'sqlite_%' ORDER BY name"
                .to_string(),
            vec![],
        )
    }

    fn list_columns_sql(&self, _database: &str, table: &str) -> (String, Vec<Value>) {
        (
            "SELECT name, type AS data_type, \
             CASE WHEN \"notnull\" = 0 THEN 1 ELSE 0 END AS nullable, \
             dflt_value AS default_value FROM pragma_table_info(?) ORDER BY cid"
                .to_string(),
            vec![Value::from(table)],
        )
    }
}
