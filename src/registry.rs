//! Scheme dispatch: which backend translates, which driver executes.
//!
//! Backends for all fifteen schemes are built in. Drivers are pluggable: the
//! sqlx-based ones ship behind cargo features, anything else is registered
//! through [`RegistryBuilder::driver`] and [`install`].

use std::collections::BTreeMap;
use std::sync::{Arc, OnceLock};

use tracing::debug;

use crate::adapter::Adapter;
use crate::adapter::Backend;
use crate::adapter::column_store::CassandraBackend;
use crate::adapter::document::{DynamoBackend, MongoBackend};
use crate::adapter::graph::Neo4jBackend;
use crate::adapter::key_value::RedisBackend;
use crate::adapter::relational::RelationalBackend;
use crate::adapter::search::ElasticBackend;
use crate::descriptor::{Descriptor, Scheme};
use crate::error::{OnedbError, Result};
use crate::native::Driver;
use crate::pool::PoolConfig;
use crate::transpiler::SqlDialect;
use crate::transpiler::nosql::redis::DEFAULT_KEY_COLUMN;

static GLOBAL: OnceLock<Registry> = OnceLock::new();

/// Canonical names of every supported backend.
pub fn supported_databases() -> Vec<&'static str> {
    Scheme::ALL.iter().map(Scheme::as_str).collect()
}

/// Make `registry` the process-wide default. Fails if one is already in
/// place (including the lazily built default).
pub fn install(registry: Registry) -> Result<()> {
    GLOBAL
        .set(registry)
        .map_err(|_| OnedbError::Config("a global registry is already installed".to_string()))
}

/// Native client name and the command that installs it.
pub fn install_hint(scheme: Scheme) -> (&'static str, &'static str) {
    match scheme {
        Scheme::Postgresql => ("sqlx-postgres", "cargo add onedb --features postgres"),
        Scheme::Mysql | Scheme::Mariadb => ("sqlx-mysql", "cargo add onedb --features mysql"),
        Scheme::Sqlite => ("sqlx-sqlite", "cargo add onedb --features sqlite"),
        Scheme::Mongodb => ("mongodb", "cargo add mongodb"),
        Scheme::Redis => ("redis", "cargo add redis"),
        Scheme::Mssql => ("tiberius", "cargo add tiberius"),
        Scheme::Oracle => ("oracle", "cargo add oracle"),
        Scheme::Elasticsearch => ("elasticsearch", "cargo add elasticsearch"),
        Scheme::Cassandra => ("scylla", "cargo add scylla"),
        Scheme::Dynamodb => ("aws-sdk-dynamodb", "cargo add aws-sdk-dynamodb"),
        Scheme::Snowflake => ("snowflake-api", "cargo add snowflake-api"),
        Scheme::Bigquery => ("gcp-bigquery-client", "cargo add gcp-bigquery-client"),
        Scheme::Neo4j => ("neo4rs", "cargo add neo4rs"),
        Scheme::Db2 => ("odbc-api", "cargo add odbc-api"),
    }
}

#[derive(Default)]
pub struct RegistryBuilder {
    drivers: BTreeMap<Scheme, Arc<dyn Driver>>,
}

impl RegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) the driver for `scheme`.
    pub fn driver(mut self, scheme: Scheme, driver: Arc<dyn Driver>) -> Self {
        self.drivers.insert(scheme, driver);
        self
    }

    /// Add the sqlx drivers enabled at compile time.
    #[allow(unused_mut)]
    pub fn with_builtin_drivers(mut self) -> Self {
        #[cfg(any(feature = "sqlite", feature = "postgres", feature = "mysql"))]
        {
            let sqlx: Arc<dyn Driver> = Arc::new(crate::engine::SqlxDriver::new());
            #[cfg(feature = "sqlite")]
            {
                self = self.driver(Scheme::Sqlite, sqlx.clone());
            }
            #[cfg(feature = "postgres")]
            {
                self = self.driver(Scheme::Postgresql, sqlx.clone());
            }
            #[cfg(feature = "mysql")]
            {
                self = self
                    .driver(Scheme::Mysql, sqlx.clone())
                    .driver(Scheme::Mariadb, sqlx.clone());
            }
        }
        self
    }

    pub fn build(self) -> Registry {
        Registry {
            drivers: self.drivers,
        }
    }
}

/// Scheme to driver table.
pub struct Registry {
    drivers: BTreeMap<Scheme, Arc<dyn Driver>>,
}

impl Registry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::new()
    }

    /// The installed registry, or one with just the built-in drivers.
    pub fn global() -> &'static Registry {
        GLOBAL.get_or_init(|| RegistryBuilder::new().with_builtin_drivers().build())
    }

    /// Schemes that have a driver, in canonical order.
    pub fn installed_drivers(&self) -> Vec<Scheme> {
        Scheme::ALL
            .into_iter()
            .filter(|scheme| self.drivers.contains_key(scheme))
            .collect()
    }

    pub fn driver(&self, scheme: Scheme) -> Result<Arc<dyn Driver>> {
        self.drivers.get(&scheme).cloned().ok_or_else(|| {
            let (driver, command) = install_hint(scheme);
            OnedbError::DriverNotInstalled {
                driver: driver.to_string(),
                scheme: scheme.to_string(),
                install_command: command.to_string(),
            }
        })
    }

    /// Build an adapter without connecting. The driver is checked first so
    /// a missing client fails before anything else.
    pub fn adapter(&self, descriptor: Descriptor, base: &PoolConfig) -> Result<Adapter> {
        let driver = self.driver(descriptor.scheme())?;
        let backend = backend_for(&descriptor)?;
        let pool_config = descriptor.pool_config(base)?;
        debug!(scheme = %descriptor.scheme(), driver = driver.name(), "resolved adapter");
        Adapter::new(backend, driver, descriptor, pool_config)
    }

    pub async fn connect(&self, descriptor: Descriptor) -> Result<Adapter> {
        self.connect_with_pool(descriptor, &PoolConfig::default()).await
    }

    /// Build the adapter and open its pool.
    pub async fn connect_with_pool(
        &self,
        descriptor: Descriptor,
        base: &PoolConfig,
    ) -> Result<Adapter> {
        let adapter = self.adapter(descriptor, base)?;
        adapter.connect().await?;
        Ok(adapter)
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("drivers", &self.installed_drivers())
            .finish()
    }
}

/// The backend for a descriptor's scheme, configured from its options.
pub fn backend_for(descriptor: &Descriptor) -> Result<Arc<dyn Backend>> {
    let scheme = descriptor.scheme();
    let database = descriptor.database();
    let relational = |dialect: SqlDialect| -> Result<RelationalBackend> {
        let backend = RelationalBackend::new(scheme.as_str(), dialect, database);
        Ok(match descriptor.placeholder_style()? {
            Some(style) => backend.with_style(style),
            None => backend,
        })
    };

    Ok(match scheme {
        Scheme::Postgresql => Arc::new(
            relational(SqlDialect::Postgres)?
                .with_returning_id(descriptor.option("id_column").unwrap_or("id")),
        ),
        Scheme::Mysql => Arc::new(relational(SqlDialect::MySql)?),
        Scheme::Mariadb => Arc::new(relational(SqlDialect::MariaDb)?),
        Scheme::Sqlite => Arc::new(relational(SqlDialect::Sqlite)?),
        Scheme::Mssql => Arc::new(relational(SqlDialect::SqlServer)?),
        Scheme::Oracle => Arc::new(relational(SqlDialect::Oracle)?),
        Scheme::Db2 => Arc::new(relational(SqlDialect::Db2)?),
        Scheme::Snowflake => Arc::new(relational(SqlDialect::Snowflake)?),
        Scheme::Bigquery => Arc::new(relational(SqlDialect::BigQuery)?),
        Scheme::Mongodb => Arc::new(MongoBackend),
        Scheme::Dynamodb => Arc::new(DynamoBackend),
        Scheme::Redis => Arc::new(RedisBackend::new(
            descriptor.option("key_column").unwrap_or(DEFAULT_KEY_COLUMN),
        )),
        Scheme::Neo4j => Arc::new(Neo4jBackend),
        Scheme::Cassandra => Arc::new(CassandraBackend::new(
            database,
            descriptor.option_bool("allow_filtering")?.unwrap_or(true),
        )),
        Scheme::Elasticsearch => Arc::new(ElasticBackend),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::AdapterKind;
    use crate::error::ErrorKind;

    #[test]
    fn test_supported_databases() {
        let names = supported_databases();
        assert_eq!(names.len(), 15);
        assert!(names.contains(&"postgresql"));
        assert!(names.contains(&"elasticsearch"));
    }

    #[test]
    fn test_missing_driver_reports_install_command() {
        let registry = Registry::builder().build();
        let descriptor = Descriptor::parse("mongodb://localhost/app").unwrap();
        let err = registry.adapter(descriptor, &PoolConfig::default()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DriverNotInstalled);
        assert_eq!(err.details()["install_command"], "cargo add mongodb");
        assert!(registry.installed_drivers().is_empty());
    }

    #[test]
    fn test_backend_for_each_scheme() {
        for scheme in Scheme::ALL {
            let uri = match scheme {
                Scheme::Sqlite => "sqlite:///:memory:".to_string(),
                other => format!("{}://localhost/app", other.as_str()),
            };
            let descriptor = Descriptor::parse(&uri).unwrap();
            let backend = backend_for(&descriptor).unwrap();
            assert_eq!(backend.name(), scheme.as_str());
            assert_eq!(backend.kind(), scheme.kind());
        }
        let pg = backend_for(&Descriptor::parse("postgres://h/db").unwrap()).unwrap();
        assert_eq!(pg.kind(), AdapterKind::Relational);
        assert_eq!(pg.returning_id_column(), Some("id"));
    }
}
