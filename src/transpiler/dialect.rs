use std::fmt;

use serde::{Deserialize, Serialize};

use crate::transpiler::sql::ansi::AnsiGenerator;
use crate::transpiler::sql::bigquery::BigQueryGenerator;
use crate::transpiler::sql::cql::CqlGenerator;
use crate::transpiler::sql::db2::Db2Generator;
use crate::transpiler::sql::mariadb::MariaDbGenerator;
use crate::transpiler::sql::mysql::MysqlGenerator;
use crate::transpiler::sql::oracle::OracleGenerator;
use crate::transpiler::sql::postgres::PostgresGenerator;
use crate::transpiler::sql::snowflake::SnowflakeGenerator;
use crate::transpiler::sql::sqlite::SqliteGenerator;
use crate::transpiler::sql::sqlserver::SqlServerGenerator;
use crate::transpiler::traits::SqlGenerator;

/// Supported SQL dialects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum SqlDialect {
    #[default]
    Ansi,
    Postgres,
    MySql,
    MariaDb,
    Sqlite,
    SqlServer,
    Oracle,
    Db2,
    Snowflake,
    BigQuery,
    Cql,
}

impl SqlDialect {
    pub fn generator(&self) -> Box<dyn SqlGenerator> {
        match self {
            SqlDialect::Ansi => Box::new(AnsiGenerator),
            SqlDialect::Postgres => Box::new(PostgresGenerator),
            SqlDialect::MySql => Box::new(MysqlGenerator),
            SqlDialect::MariaDb => Box::new(MariaDbGenerator),
            SqlDialect::Sqlite => Box::new(SqliteGenerator),
            SqlDialect::SqlServer => Box::new(SqlServerGenerator),
            SqlDialect::Oracle => Box::new(OracleGenerator),
            SqlDialect::Db2 => Box::new(Db2Generator),
            SqlDialect::Snowflake => Box::new(SnowflakeGenerator),
            SqlDialect::BigQuery => Box::new(BigQueryGenerator),
            SqlDialect::Cql => Box::new(CqlGenerator::default()),
        }
    }
}

impl fmt::Display for SqlDialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.generator().name())
    }
}
