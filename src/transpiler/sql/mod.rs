pub mod ansi;
pub mod bigquery;
pub mod cql;
pub mod db2;
pub mod mariadb;
pub mod mysql;
pub mod oracle;
pub mod postgres;
pub mod snowflake;
pub mod sqlite;
pub mod sqlserver;
