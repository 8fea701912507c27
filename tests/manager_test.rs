mod common;

use std::sync::Arc;

use common::{MockDriver, fast_pool};
use onedb::config::OnedbConfig;
use onedb::descriptor::Scheme;
use onedb::error::ErrorKind;
use onedb::{Manager, Registry};
use pretty_assertions::assert_eq;

fn manager(driver: &MockDriver) -> Manager {
    let registry = Registry::builder()
        .driver(Scheme::Sqlite, Arc::new(driver.clone()))
        .driver(Scheme::Redis, Arc::new(driver.clone()))
        .build();
    Manager::new()
        .with_registry(Arc::new(registry))
        .with_pool_config(fast_pool(2))
}

#[tokio::test]
async fn test_first_connection_is_default() {
    let driver = MockDriver::new();
    let manager = manager(&driver);

    manager.add("main", "sqlite:///main.db").await.unwrap();
    manager.add("cache", "redis://localhost:6379/0").await.unwrap();

    assert_eq!(manager.names(), vec!["cache", "main"]);
    assert_eq!(manager.default().unwrap().descriptor().scheme(), Scheme::Sqlite);

    manager.set_default("cache").unwrap();
    assert_eq!(manager.default().unwrap().descriptor().scheme(), Scheme::Redis);
    assert_eq!(
        manager.set_default("missing").unwrap_err().kind(),
        ErrorKind::Config
    );
}

#[tokio::test]
async fn test_duplicate_name_rejected() {
    let driver = MockDriver::new();
    let manager = manager(&driver);

    manager.add("main", "sqlite:///main.db").await.unwrap();
    let err = manager.add("main", "sqlite:///other.db").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Config);
    assert_eq!(manager.get("main").unwrap().descriptor().database(), "main.db");
}

#[tokio::test]
async fn test_missing_driver_leaves_manager_untouched() {
    let driver = MockDriver::new();
    let manager = manager(&driver);

    let err = manager
        .add("docs", "mongodb://localhost/app")
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::DriverNotInstalled);
    assert!(manager.names().is_empty());
    assert_eq!(manager.default().unwrap_err().kind(), ErrorKind::Config);
}

#[tokio::test]
async fn test_remove_reassigns_default_and_disconnects() {
    let driver = MockDriver::new();
    let manager = manager(&driver);

    let main = manager.add("main", "sqlite:///main.db").await.unwrap();
    manager.add("reports", "sqlite:///reports.db").await.unwrap();

    manager.remove("main").await.unwrap();
    assert!(!main.is_connected());
    assert_eq!(manager.names(), vec!["reports"]);
    assert_eq!(
        manager.default().unwrap().descriptor().database(),
        "reports.db"
    );
    assert_eq!(manager.remove("main").await.unwrap_err().kind(), ErrorKind::Config);
}

#[tokio::test]
async fn test_connections_snapshot() {
    let driver = MockDriver::new();
    let manager = manager(&driver);
    manager.add("main", "sqlite:///main.db").await.unwrap();
    manager.add("cache", "redis://cache.local:6380/0").await.unwrap();

    let infos = manager.connections();
    assert_eq!(infos.len(), 2);
    let cache = &infos[0];
    assert_eq!(cache.name, "cache");
    assert_eq!(cache.scheme, "redis");
    assert_eq!(cache.host, "cache.local");
    assert!(cache.connected);
    assert!(!cache.is_default);
    assert!(infos[1].is_default);
    assert_eq!(infos[1].pool.as_ref().map(|p| p.max_size), Some(2));

    manager.close_all().await;
    assert!(manager.names().is_empty());
    assert_eq!(driver.state.closes.load(std::sync::atomic::Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_load_from_config() {
    let driver = MockDriver::new();
    let manager = manager(&driver);
    let config: OnedbConfig = r#"
default = "cache"

[connections.main]
url = "sqlite:///main.db"

[connections.cache]
type = "redis"
host = "cache.local"
pool_size = 1
"#
    .parse()
    .unwrap();

    manager.load(&config).await.unwrap();

    assert_eq!(manager.names(), vec!["cache", "main"]);
    let default = manager.default().unwrap();
    assert_eq!(default.descriptor().scheme(), Scheme::Redis);
    assert_eq!(default.pool_config().max_size, 1);
}
