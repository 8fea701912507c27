//! TOML configuration: pool defaults plus named connections.
//!
//! ```toml
//! default = "main"
//!
//! [pool]
//! max_size = 10
//! acquire_timeout = 5.0
//!
//! [connections.main]
//! url = "postgresql://app@db.local/main"
//!
//! [connections.cache]
//! type = "redis"
//! host = "cache.local"
//! pool_size = 2
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;
use tracing::debug;

use crate::descriptor::Descriptor;
use crate::error::{OnedbError, Result};
use crate::pool::PoolConfig;

/// Environment variable naming an explicit config file.
pub const CONFIG_ENV: &str = "ONEDB_CONFIG";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct OnedbConfig {
    /// Name of the connection [`Manager::default`](crate::manager::Manager::default) returns.
    #[serde(default)]
    pub default: Option<String>,
    #[serde(default)]
    pub pool: PoolSection,
    #[serde(default)]
    pub connections: BTreeMap<String, ConnectionConfig>,
}

/// `[pool]`: overrides for [`PoolConfig`]. Durations are in seconds.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PoolSection {
    pub min_size: Option<usize>,
    #[serde(alias = "pool_size")]
    pub max_size: Option<usize>,
    #[serde(alias = "timeout")]
    pub acquire_timeout: Option<f64>,
    pub idle_timeout: Option<f64>,
    pub connect_timeout: Option<f64>,
    pub connect_retries: Option<u32>,
    pub health_check_retries: Option<u32>,
    pub ping_timeout: Option<f64>,
}

impl PoolSection {
    pub fn apply(&self, base: PoolConfig) -> Result<PoolConfig> {
        let mut config = base;
        if let Some(n) = self.min_size {
            config.min_size = n;
        }
        if let Some(n) = self.max_size {
            config.max_size = n;
        }
        if let Some(s) = self.acquire_timeout {
            config.acquire_timeout = seconds("acquire_timeout", s)?;
        }
        if let Some(s) = self.idle_timeout {
            config.idle_timeout = seconds("idle_timeout", s)?;
        }
        if let Some(s) = self.connect_timeout {
            config.connect_timeout = seconds("connect_timeout", s)?;
        }
        if let Some(n) = self.connect_retries {
            config.connect_retries = n;
        }
        if let Some(n) = self.health_check_retries {
            config.health_check_retries = n;
        }
        if let Some(s) = self.ping_timeout {
            config.ping_timeout = seconds("ping_timeout", s)?;
        }
        config.validate()?;
        Ok(config)
    }
}

/// `[connections.<name>]`: either `url = "..."` or keyword fields.
#[derive(Debug, Clone, Deserialize)]
pub struct ConnectionConfig {
    pub url: Option<String>,
    #[serde(flatten)]
    pub fields: BTreeMap<String, toml::Value>,
}

impl ConnectionConfig {
    pub fn descriptor(&self) -> Result<Descriptor> {
        match (&self.url, self.fields.is_empty()) {
            (Some(url), true) => Descriptor::parse(url),
            (Some(_), false) => Err(OnedbError::Config(
                "a connection takes either `url` or keyword fields, not both".to_string(),
            )),
            (None, _) => {
                let params = self
                    .fields
                    .iter()
                    .map(|(key, value)| Ok((key.clone(), scalar(key, value)?)))
                    .collect::<Result<Vec<(String, String)>>>()?;
                Descriptor::from_params(params)
            }
        }
    }
}

impl OnedbConfig {
    /// `$ONEDB_CONFIG` if set, else `<config dir>/onedb/config.toml`. A
    /// missing default file is an empty config.
    pub fn load() -> Result<Self> {
        if let Some(path) = std::env::var_os(CONFIG_ENV) {
            return Self::from_path(PathBuf::from(path));
        }
        match Self::default_path() {
            Some(path) if path.exists() => Self::from_path(path),
            _ => Ok(Self::default()),
        }
    }

    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("onedb").join("config.toml"))
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| OnedbError::Config(format!("cannot read {}: {}", path.display(), e)))?;
        debug!(path = %path.display(), "loaded configuration");
        content.parse()
    }

    /// Pool defaults with the `[pool]` overrides applied.
    pub fn pool_config(&self) -> Result<PoolConfig> {
        self.pool.apply(PoolConfig::default())
    }

    /// Every named connection's descriptor, in name order.
    pub fn descriptors(&self) -> Result<Vec<(String, Descriptor)>> {
        self.connections
            .iter()
            .map(|(name, conn)| {
                conn.descriptor()
                    .map(|d| (name.clone(), d))
                    .map_err(|e| OnedbError::Config(format!("connection '{}': {}", name, e)))
            })
            .collect()
    }
}

impl FromStr for OnedbConfig {
    type Err = OnedbError;

    fn from_str(s: &str) -> Result<Self> {
        let config: OnedbConfig = toml::from_str(s).map_err(|e| OnedbError::Config(e.to_string()))?;
        if let Some(name) = &config.default {
            if !config.connections.contains_key(name) {
                return Err(OnedbError::Config(format!(
                    "default connection '{}' is not defined",
                    name
                )));
            }
        }
        Ok(config)
    }
}

fn seconds(key: &str, value: f64) -> Result<Duration> {
    Duration::try_from_secs_f64(value)
        .map_err(|_| OnedbError::Config(format!("{} must be a non-negative number of seconds", key)))
}

fn scalar(key: &str, value: &toml::Value) -> Result<String> {
    match value {
        toml::Value::String(s) => Ok(s.clone()),
        toml::Value::Integer(i) => Ok(i.to_string()),
        toml::Value::Float(f) => Ok(f.to_string()),
        toml::Value::Boolean(b) => Ok(b.to_string()),
        _ => Err(OnedbError::Config(format!("'{}' must be a scalar value", key))),
    }
}
