use super::super::traits::{SqlFeature, SqlGenerator};
use super::mysql::MysqlGenerator;
use crate::value::Value;

/// MySQL syntax plus `RETURNING` (MariaDB 10.5+).
pub struct MariaDbGenerator;

impl SqlGenerator for MariaDbGenerator {
    fn name(&self) -> &'static str {
        "mariadb"
    }

    fn quote_identifier(&self, id: &str) -> String {
        MysqlGenerator.quote_identifier(id)
    }

    fn supports(&self, feature: SqlFeature) -> bool {
        feature != SqlFeature::FullJoin
    }

    fn limit_offset(&self, limit: Option<u64>, offset: Option<u64>) -> String {
        MysqlGenerator.limit_offset(limit, offset)
    }

    fn begin_sql(&self) -> Option<String> {
        MysqlGenerator.begin_sql()
    }

    fn list_tables_sql(&self, database: &str) -> (String, Vec<Value>) {
        MysqlGenerator.list_tables_sql(database)
    }

    fn list_columns_sql(&self, _database: &str, table: &str) -> (String, Vec<Value>) {
        super::mysql::mysql_columns_sql(table)
    }
}
