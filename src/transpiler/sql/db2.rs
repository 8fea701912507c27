use super::super::traits::{SqlFeature, SqlGenerator};
use crate::value::Value;

pub struct Db2Generator;

impl SqlGenerator for Db2Generator {
    fn name(&self) -> &'static str {
        "db2"
    }

    fn supports(&self, feature: SqlFeature) -> bool {
        feature != SqlFeature::Returning
    }

    fn limit_offset(&self, limit: Option<u64>, offset: Option<u64>) -> String {
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
        "SELECT 1 FROM SYSIBM.SYSDUMMY1"
    }

    fn begin_sql(&self) -> Option<String> {
        None
    }

    fn savepoint_sql(&self, name: &str) -> Option<String> {
        Some(format!("SAVEPOINT {} ON ROLLBACK RETAIN CURSORS", name))
    }

    fn list_tables_sql(&self, _database: &str) -> (String, Vec<Value>) {
        (
            "SELECT TABNAME AS name FROM SYSCAT.TABLES \
             WHERE TABSCHEMA = CURRENT SCHEMA AND TYPE = 'T' ORDER BY TABNAME"
                .to_string(),
            vec![],
        )
    }

    fn list_columns_sql(&self, _database: &str, table: &str) -> (String, Vec<Value>) {
        (
            "SELECT COLNAME AS name, TYPENAME AS data_type, \
             CASE WHEN NULLS = 'Y' THEN 1 ELSE 0 END AS nullable, \
             DEFAULT AS default_value FROM SYSCAT.COLUMNS \
             WHERE TABSCHEMA = CURRENT SCHEMA AND TABNAME = ? ORDER BY COLNO"
                .to_string(),
            vec![Value::from(table.to_uppercase())],
        )
    }
}
