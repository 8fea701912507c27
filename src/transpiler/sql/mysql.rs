use super::super::traits::{SqlFeature, SqlGenerator};
use crate::value::Value;

pub struct MysqlGenerator;

impl SqlGenerator for MysqlGenerator {
    fn name(&self) -> &'static str {
        "mysql"
    }

    fn quote_identifier(&self, id: &str) -> String {
        format!("`{}`", id.replace('`', "``"))
    }

    fn supports(&self, feature: SqlFeature) -> bool {
        !matches!(feature, SqlFeature::FullJoin | SqlFeature::Returning)
    }

    fn limit_offset(&self, limit: Option<u64>, offset: Option<u64>) -> String {
        // MySQL has no OFFSET without LIMIT; u64::MAX is the documented idiom.
        match (limit, offset) {
            (None, Some(off)) => format!(" LIMIT {} OFFSET {}", u64::MAX, off),
            (Some(lim), Some(off)) => format!(" LIMIT {} OFFSET {}", lim, off),
            (Some(lim), None) => format!(" LIMIT {}", lim),
            (None, None) => String::new(),
        }
    }

    fn begin_sql(&self) -> Option<String> {
        Some("START TRANSACTION".to_string())
    }

    fn list_tables_sql(&self, _database: &str) -> (String, Vec<Value>) {
        (
            "SELECT table_name AS name FROM information_schema.tables \
             WHERE table_schema = DATABASE() ORDER BY table_name"
                .to_string(),
            vec![],
        )
    }

    fn list_columns_sql(&self, _database: &str, table: &str) -> (String, Vec<Value>) {
        mysql_columns_sql(table)
    }
}

pub(super) fn mysql_columns_sql(table: &str) -> (String, Vec<Value>) {
    (
        "SELECT column_name AS name, data_type, \
         CASE WHEN is_nullable = 'YES' THEN 1 ELSE 0 END AS nullable, \
         column_default AS default_value \
         FROM information_schema.columns \
         WHERE table_schema = DATABASE() AND table_name = ? ORDER BY ordinal_position"
            .to_string(),
        vec![Value::from(table)],
    )
}
