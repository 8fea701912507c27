//! Named connections for applications that talk to several databases.

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde::Serialize;
use tracing::info;

use crate::adapter::Adapter;
use crate::config::OnedbConfig;
use crate::descriptor::Descriptor;
use crate::error::{OnedbError, Result};
use crate::pool::{PoolConfig, PoolStats};
use crate::registry::Registry;

/// Read-only snapshot of one managed connection.
#[derive(Debug, Clone, Serialize)]
pub struct ConnectionInfo {
    pub name: String,
    pub scheme: String,
    pub host: String,
    pub database: String,
    pub connected: bool,
    pub is_default: bool,
    pub pool: Option<PoolStats>,
}

#[derive(Default)]
struct State {
    adapters: BTreeMap<String, Arc<Adapter>>,
    default: Option<String>,
}

/// Holds connected adapters by name. The first one added is the default
/// until [`set_default`](Manager::set_default) says otherwise.
pub struct Manager {
    registry: Option<Arc<Registry>>,
    pool_config: PoolConfig,
    state: RwLock<State>,
}

impl Manager {
    /// Manager on the global registry with default pool settings.
    pub fn new() -> Self {
        Self {
            registry: None,
            pool_config: PoolConfig::default(),
            state: RwLock::new(State::default()),
        }
    }

    pub fn with_registry(mut self, registry: Arc<Registry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Pool settings every connection starts from; descriptor options
    /// override them.
    pub fn with_pool_config(mut self, config: PoolConfig) -> Self {
        self.pool_config = config;
        self
    }

    /// Connect every connection in `config`.
    pub async fn from_config(config: &OnedbConfig) -> Result<Self> {
        let manager = Self::new().with_pool_config(config.pool_config()?);
        manager.load(config).await?;
        Ok(manager)
    }

    /// Connect the connections of `config` into this manager.
    pub async fn load(&self, config: &OnedbConfig) -> Result<()> {
        for (name, descriptor) in config.descriptors()? {
            self.add_descriptor(&name, descriptor).await?;
        }
        if let Some(name) = &config.default {
            self.set_default(name)?;
        }
        Ok(())
    }

    fn registry(&self) -> &Registry {
        self.registry.as_deref().unwrap_or_else(|| Registry::global())
    }

    fn read(&self) -> RwLockReadGuard<'_, State> {
        self.state.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, State> {
        self.state.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub async fn add(&self, name: &str, uri: &str) -> Result<Arc<Adapter>> {
        self.add_descriptor(name, Descriptor::parse(uri)?).await
    }

    /// Connect `descriptor` and register it under `name`.
    pub async fn add_descriptor(&self, name: &str, descriptor: Descriptor) -> Result<Arc<Adapter>> {
        if self.read().adapters.contains_key(name) {
            return Err(OnedbError::Config(format!("connection '{}' already exists", name)));
        }
        let adapter = Arc::new(
            self.registry()
                .connect_with_pool(descriptor, &self.pool_config)
                .await?,
        );

        let mut state = self.write();
        if state.adapters.contains_key(name) {
            return Err(OnedbError::Config(format!("connection '{}' already exists", name)));
        }
        state.adapters.insert(name.to_string(), adapter.clone());
        if state.default.is_none() {
            state.default = Some(name.to_string());
        }
        info!(name, target_db = %adapter.descriptor(), "connection added");
        Ok(adapter)
    }

    pub fn get(&self, name: &str) -> Result<Arc<Adapter>> {
        self.read()
            .adapters
            .get(name)
            .cloned()
            .ok_or_else(|| OnedbError::Config(format!("no connection named '{}'", name)))
    }

    pub fn default(&self) -> Result<Arc<Adapter>> {
        let name = self
            .read()
            .default
            .clone()
            .ok_or_else(|| OnedbError::Config("no connections configured".to_string()))?;
        self.get(&name)
    }

    pub fn set_default(&self, name: &str) -> Result<()> {
        let mut state = self.write();
        if !state.adapters.contains_key(name) {
            return Err(OnedbError::Config(format!("no connection named '{}'", name)));
        }
        state.default = Some(name.to_string());
        Ok(())
    }

    /// Unregister and disconnect.
    pub async fn remove(&self, name: &str) -> Result<()> {
        let adapter = {
            let mut state = self.write();
            let adapter = state
                .adapters
                .remove(name)
                .ok_or_else(|| OnedbError::Config(format!("no connection named '{}'", name)))?;
            if state.default.as_deref() == Some(name) {
                state.default = state.adapters.keys().next().cloned();
            }
            adapter
        };
        adapter.disconnect().await;
        info!(name, "connection removed");
        Ok(())
    }

    pub async fn close_all(&self) {
        let adapters: Vec<Arc<Adapter>> = {
            let mut state = self.write();
            state.default = None;
            std::mem::take(&mut state.adapters).into_values().collect()
        };
        for adapter in adapters {
            adapter.disconnect().await;
        }
    }

    pub fn names(&self) -> Vec<String> {
        self.read().adapters.keys().cloned().collect()
    }

    pub fn connections(&self) -> Vec<ConnectionInfo> {
        let state = self.read();
        state
            .adapters
            .iter()
            .map(|(name, adapter)| {
                let descriptor = adapter.descriptor();
                ConnectionInfo {
                    name: name.clone(),
                    scheme: descriptor.scheme().to_string(),
                    host: descriptor.host().to_string(),
                    database: descriptor.database().to_string(),
                    connected: adapter.is_connected(),
                    is_default: state.default.as_deref() == Some(name.as_str()),
                    pool: adapter.pool_stats(),
                }
            })
            .collect()
    }
}

impl std::fmt::Debug for Manager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.read();
        f.debug_struct("Manager")
            .field("connections", &state.adapters.keys().collect::<Vec<_>>())
            .field("default", &state.default)
            .finish()
    }
}
