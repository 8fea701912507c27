mod common;

use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use common::{MockDriver, fast_pool, init_tracing};
use onedb::adapter::AdapterKind;
use onedb::descriptor::Descriptor;
use onedb::error::ErrorKind;
use onedb::mapper::ErrorMapper;
use onedb::pool::{EntryState, Pool, PoolConfig};

fn pool(driver: &MockDriver, config: PoolConfig) -> Pool {
    init_tracing();
    Pool::new(
        Arc::new(driver.clone()),
        Descriptor::parse("sqlite:///:memory:").unwrap(),
        config,
        ErrorMapper::new(AdapterKind::Relational, "sqlite"),
    )
    .unwrap()
}

#[tokio::test]
async fn test_max_one_blocks_then_succeeds() {
    let driver = MockDriver::new();
    let pool = pool(&driver, fast_pool(1).acquire_timeout(Duration::from_secs(5)));
    pool.materialize(1).await.unwrap();

    let first = pool.acquire().await.unwrap();
    let waiter = {
        let pool = pool.clone();
        tokio::spawn(async move { pool.acquire().await })
    };

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!waiter.is_finished());
    assert_eq!(pool.stats().waiting, 1);

    drop(first);
    let second = waiter.await.unwrap().unwrap();
    assert_eq!(second.state(), EntryState::Leased);
    // The released connection was reused, not replaced.
    assert_eq!(driver.state.connects.load(Ordering::SeqCst), 1);
    assert_eq!(pool.stats().size, 1);
}

#[tokio::test]
async fn test_acquire_beyond_max_times_out() {
    let driver = MockDriver::new();
    let pool = pool(&driver, fast_pool(2));

    let _a = pool.acquire().await.unwrap();
    let _b = pool.acquire().await.unwrap();
    let err = pool.acquire().await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::PoolTimeout);
    let details = err.details();
    assert_eq!(details["timeout_ms"], "200");
    assert_eq!(details["max_size"], "2");

    let stats = pool.stats();
    assert_eq!(stats.size, 2);
    assert_eq!(stats.leased, 2);
    assert_eq!(stats.waiting, 0);
}

#[tokio::test]
async fn test_cancelled_acquire_leaves_no_reservation() {
    let driver = MockDriver::new();
    let pool = pool(&driver, fast_pool(1).acquire_timeout(Duration::from_secs(5)));

    let held = pool.acquire().await.unwrap();
    let pending = {
        let pool = pool.clone();
        tokio::spawn(async move { pool.acquire().await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;
    pending.abort();
    let _ = pending.await;
    drop(held);

    // The slot is immediately available to the next caller.
    let again = tokio::time::timeout(Duration::from_millis(100), pool.acquire()).await;
    assert!(matches!(again, Ok(Ok(_))));
}

#[tokio::test]
async fn test_broken_idle_connection_is_replaced() {
    let driver = MockDriver::new();
    let pool = pool(&driver, fast_pool(1));
    pool.materialize(1).await.unwrap();

    driver.state.ping_fails.store(true, Ordering::SeqCst);
    let lease = pool.acquire().await.unwrap();
    assert_eq!(lease.state(), EntryState::Leased);
    drop(lease);

    let stats = pool.stats();
    assert_eq!(stats.total_discarded, 1);
    assert_eq!(stats.total_created, 2);
    assert_eq!(stats.size, 1);
}

#[tokio::test]
async fn test_marked_broken_lease_is_discarded() {
    let driver = MockDriver::new();
    let pool = pool(&driver, fast_pool(2));

    let mut lease = pool.acquire().await.unwrap();
    lease.mark_broken();
    assert_eq!(lease.state(), EntryState::Broken);
    lease.release().unwrap();

    let stats = pool.stats();
    assert_eq!(stats.size, 0);
    assert_eq!(stats.idle, 0);
    assert_eq!(stats.total_discarded, 1);
}

#[tokio::test]
async fn test_connect_retries_transient_failures() {
    let driver = MockDriver::new();
    driver.state.fail_connects(2);
    let pool = pool(&driver, fast_pool(1).connect_retries(3));

    let lease = pool.acquire().await.unwrap();
    drop(lease);
    assert_eq!(pool.stats().total_created, 1);
}

#[tokio::test]
async fn test_connect_gives_up_after_retries() {
    let driver = MockDriver::new();
    driver.state.fail_connects(5);
    let pool = pool(&driver, fast_pool(1).connect_retries(2));

    let err = pool.acquire().await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Connection);
    assert_eq!(err.details()["database"], ":memory:");
    // The failed attempt did not keep the slot.
    assert_eq!(pool.stats().leased, 0);
}

#[tokio::test]
async fn test_hung_connect_times_out() {
    let driver = MockDriver::new();
    driver.state.connect_hangs.store(true, Ordering::SeqCst);
    let pool = pool(
        &driver,
        fast_pool(1)
            .connect_timeout(Duration::from_millis(50))
            .connect_retries(2),
    );

    let outcome = tokio::time::timeout(Duration::from_secs(2), pool.acquire()).await;
    let err = outcome.expect("acquire must not hang").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Timeout);
    let details = err.details();
    assert_eq!(details["timeout_ms"], "50");
    assert_eq!(details["database"], ":memory:");

    let stats = pool.stats();
    assert_eq!(stats.size, 0);
    assert_eq!(stats.leased, 0);
}

#[tokio::test]
async fn test_acquire_cancelled_during_health_check_discards_connection() {
    let driver = MockDriver::new();
    let pool = pool(&driver, fast_pool(1).ping_timeout(Duration::from_secs(5)));
    pool.materialize(1).await.unwrap();

    driver.state.ping_delay_ms.store(500, Ordering::SeqCst);
    let cancelled = tokio::time::timeout(Duration::from_millis(50), pool.acquire()).await;
    assert!(cancelled.is_err());

    let stats = pool.stats();
    assert_eq!(stats.size, 0);
    assert_eq!(stats.idle, 0);
    assert_eq!(stats.leased, 0);
    assert_eq!(stats.total_discarded, 1);

    // The close runs in the background.
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(driver.state.closes.load(Ordering::SeqCst), 1);

    driver.state.ping_delay_ms.store(0, Ordering::SeqCst);
    assert!(pool.acquire().await.is_ok());
}

#[tokio::test]
async fn test_idle_connections_reaped_down_to_min() {
    let driver = MockDriver::new();
    let pool = pool(
        &driver,
        fast_pool(3).min_size(1).idle_timeout(Duration::from_millis(10)),
    );
    pool.materialize(3).await.unwrap();
    assert_eq!(pool.stats().idle, 3);

    tokio::time::sleep(Duration::from_millis(30)).await;
    assert_eq!(pool.reap_idle(), 2);
    let stats = pool.stats();
    assert_eq!(stats.size, 1);
    assert_eq!(stats.idle, 1);
}

#[tokio::test]
async fn test_close_rejects_new_leases() {
    let driver = MockDriver::new();
    let pool = pool(&driver, fast_pool(1));
    pool.materialize(1).await.unwrap();
    pool.close().await;

    assert!(pool.is_closed());
    assert_eq!(pool.acquire().await.unwrap_err().kind(), ErrorKind::Connection);
    assert_eq!(driver.state.closes.load(Ordering::SeqCst), 1);
}
