//! Connection pool.
//!
//! One pool per descriptor. A semaphore with `max_size` permits bounds the
//! number of concurrent leases; every lease owns one permit for its whole
//! life, so a cancelled or timed-out acquire never holds a slot. Idle
//! connections sit in a mutex-guarded deque and are health-checked before
//! being handed out again.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{debug, info, warn};

use crate::descriptor::Descriptor;
use crate::error::{Details, ErrorKind, OnedbError, Result};
use crate::mapper::ErrorMapper;
use crate::native::{
    Driver, NativeConnection, NativeError, NativeRequest, NativeResponse, NativeResult,
};

#[derive(Debug, Clone, PartialEq)]
pub struct PoolConfig {
    pub min_size: usize,
    pub max_size: usize,
    /// Max wait for a free slot.
    pub acquire_timeout: Duration,
    /// Idle connections older than this are closed down to `min_size`.
    pub idle_timeout: Duration,
    /// Max time for one connection attempt.
    pub connect_timeout: Duration,
    /// Attempts when opening a connection fails with a connection error.
    pub connect_retries: u32,
    /// First backoff delay, doubled after each failed attempt.
    pub retry_backoff: Duration,
    /// Broken idle connections skipped before opening a fresh one.
    pub health_check_retries: u32,
    pub ping_timeout: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            min_size: 1,
            max_size: 5,
            acquire_timeout: Duration::from_secs(30),
            idle_timeout: Duration::from_secs(600),
            connect_timeout: Duration::from_secs(30),
            connect_retries: 3,
            retry_backoff: Duration::from_millis(100),
            health_check_retries: 3,
            ping_timeout: Duration::from_secs(5),
        }
    }
}

impl PoolConfig {
    pub fn max_size(mut self, max: usize) -> Self {
        self.max_size = max;
        self
    }

    pub fn min_size(mut self, min: usize) -> Self {
        self.min_size = min;
        self
    }

    pub fn acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout = timeout;
        self
    }

    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn connect_retries(mut self, retries: u32) -> Self {
        self.connect_retries = retries;
        self
    }

    pub fn retry_backoff(mut self, backoff: Duration) -> Self {
        self.retry_backoff = backoff;
        self
    }

    pub fn ping_timeout(mut self, timeout: Duration) -> Self {
        self.ping_timeout = timeout;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_size == 0 {
            return Err(OnedbError::InvalidDescriptor("pool max size must be at least 1".into()));
        }
        if self.min_size > self.max_size {
            return Err(OnedbError::InvalidDescriptor(format!(
                "pool min size {} exceeds max size {}",
                self.min_size, self.max_size
            )));
        }
        Ok(())
    }
}

/// Pool statistics for monitoring.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PoolStats {
    /// Open connections, idle plus leased.
    pub size: usize,
    pub idle: usize,
    pub leased: usize,
    pub max_size: usize,
    pub min_size: usize,
    pub total_created: usize,
    pub total_discarded: usize,
    /// Callers blocked in `acquire`.
    pub waiting: usize,
}

/// State of one pool entry as seen by its holder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum EntryState {
    Idle,
    Leased,
    Broken,
}

struct PooledConn {
    conn: Box<dyn NativeConnection>,
    created_at: Instant,
    last_used: Instant,
    last_checked: Instant,
}

struct PoolInner {
    driver: Arc<dyn Driver>,
    descriptor: Descriptor,
    config: PoolConfig,
    mapper: ErrorMapper,
    idle: Mutex<VecDeque<PooledConn>>,
    semaphore: Arc<Semaphore>,
    size: AtomicUsize,
    leased: AtomicUsize,
    waiting: AtomicUsize,
    total_created: AtomicUsize,
    total_discarded: AtomicUsize,
    closed: AtomicBool,
}

impl PoolInner {
    fn idle_set(&self) -> MutexGuard<'_, VecDeque<PooledConn>> {
        // A panic while holding the lock cannot leave the deque half-updated.
        self.idle.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Drop a connection for good, closing it in the background when a
    /// runtime is around.
    fn discard(&self, pooled: PooledConn) {
        self.size.fetch_sub(1, Ordering::SeqCst);
        self.total_discarded.fetch_add(1, Ordering::Relaxed);
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            handle.spawn(async move {
                if let Err(e) = pooled.conn.close().await {
                    debug!(error = %e, "error closing discarded connection");
                }
            });
        }
    }

    /// Return a connection to the idle set. Must run before the lease's
    /// permit is dropped so the next waiter sees it.
    fn return_idle(&self, mut pooled: PooledConn) {
        if self.closed.load(Ordering::SeqCst) {
            self.discard(pooled);
            return;
        }
        pooled.last_used = Instant::now();
        self.idle_set().push_back(pooled);
        self.reap();
    }

    /// Close idle connections past `idle_timeout` while the pool is above
    /// `min_size`.
    fn reap(&self) -> usize {
        let mut reaped = Vec::new();
        {
            let mut idle = self.idle_set();
            let mut kept = VecDeque::with_capacity(idle.len());
            while let Some(pooled) = idle.pop_front() {
                let expired = pooled.last_used.elapsed() >= self.config.idle_timeout;
                let above_min = self.size.load(Ordering::SeqCst) - reaped.len() > self.config.min_size;
                if expired && above_min {
                    reaped.push(pooled);
                } else {
                    kept.push_back(pooled);
                }
            }
            *idle = kept;
        }
        let n = reaped.len();
        for pooled in reaped {
            self.discard(pooled);
        }
        if n > 0 {
            debug!(reaped = n, "closed idle connections");
        }
        n
    }

    fn connection_details(&self) -> Details {
        let mut details = Details::new();
        details.insert("scheme".into(), self.descriptor.scheme().to_string());
        details.insert("host".into(), self.descriptor.host().to_string());
        if let Some(port) = self.descriptor.port() {
            details.insert("port".into(), port.to_string());
        }
        details.insert("database".into(), self.descriptor.database().to_string());
        details
    }

    /// Classify a native failure, recording the configured timeout on
    /// timeout-kind errors.
    fn map_error(&self, native: NativeError, context: Details) -> OnedbError {
        let err = self.mapper.map(native, context);
        if err.kind() == ErrorKind::Timeout && !err.details().contains_key("timeout_ms") {
            let ms = self.config.connect_timeout.as_millis().to_string();
            return err.with_detail("timeout_ms", ms);
        }
        err
    }

    /// Open a connection, retrying connection and timeout failures with
    /// backoff. Each attempt is bounded by `connect_timeout`.
    async fn open(&self) -> Result<PooledConn> {
        let attempts = self.config.connect_retries.max(1);
        let timeout = self.config.connect_timeout;
        let mut backoff = self.config.retry_backoff;
        let mut attempt = 1;
        loop {
            let err = match tokio::time::timeout(timeout, self.driver.connect(&self.descriptor)).await {
                Ok(Ok(conn)) => {
                    self.size.fetch_add(1, Ordering::SeqCst);
                    self.total_created.fetch_add(1, Ordering::Relaxed);
                    let now = Instant::now();
                    return Ok(PooledConn {
                        conn,
                        created_at: now,
                        last_used: now,
                        last_checked: now,
                    });
                }
                Ok(Err(native)) => self.map_error(native, self.connection_details()),
                Err(_) => self.connection_details().into_iter().fold(
                    OnedbError::timeout(format!("connect to {} timed out", self.descriptor), timeout),
                    |err, (key, value)| err.with_detail(key, value),
                ),
            };
            if attempt >= attempts || !err.is_transient() {
                return Err(err);
            }
            warn!(
                attempt,
                attempts,
                error = %err,
                target_db = %self.descriptor,
                "connect failed, retrying"
            );
            tokio::time::sleep(backoff).await;
            backoff = backoff.saturating_mul(2);
            attempt += 1;
        }
    }

    /// Pop idle connections until one answers a ping.
    async fn healthy_idle(&self) -> Option<PooledConn> {
        self.reap();
        for _ in 0..=self.config.health_check_retries {
            let mut checkout = Checkout {
                pool: self,
                pooled: self.idle_set().pop_back(),
            };
            let pooled = checkout.pooled.as_mut()?;
            match tokio::time::timeout(self.config.ping_timeout, pooled.conn.ping()).await {
                Ok(Ok(())) => {
                    pooled.last_checked = Instant::now();
                    return checkout.pooled.take();
                }
                Ok(Err(e)) => warn!(error = %e, "discarding broken connection"),
                Err(_) => warn!("discarding connection that did not answer ping"),
            }
        }
        None
    }
}

/// An idle connection taken out for a health check. Discarded on drop
/// unless claimed, so a cancelled acquire cannot leak it.
struct Checkout<'a> {
    pool: &'a PoolInner,
    pooled: Option<PooledConn>,
}

impl Drop for Checkout<'_> {
    fn drop(&mut self) {
        if let Some(pooled) = self.pooled.take() {
            self.pool.discard(pooled);
        }
    }
}

/// Bounded pool of native connections for one descriptor.
#[derive(Clone)]
pub struct Pool {
    inner: Arc<PoolInner>,
}

impl Pool {
    /// Build the pool without opening anything.
    pub fn new(
        driver: Arc<dyn Driver>,
        descriptor: Descriptor,
        config: PoolConfig,
        mapper: ErrorMapper,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            inner: Arc::new(PoolInner {
                driver,
                descriptor,
                semaphore: Arc::new(Semaphore::new(config.max_size)),
                config,
                mapper,
                idle: Mutex::new(VecDeque::new()),
                size: AtomicUsize::new(0),
                leased: AtomicUsize::new(0),
                waiting: AtomicUsize::new(0),
                total_created: AtomicUsize::new(0),
                total_discarded: AtomicUsize::new(0),
                closed: AtomicBool::new(false),
            }),
        })
    }

    /// Open connections until `n` are idle (capped at `max_size`).
    pub async fn materialize(&self, n: usize) -> Result<()> {
        let target = n.min(self.inner.config.max_size);
        while self.inner.size.load(Ordering::SeqCst) < target {
            let pooled = self.inner.open().await?;
            self.inner.idle_set().push_back(pooled);
        }
        info!(size = target, target_db = %self.inner.descriptor, "pool ready");
        Ok(())
    }

    /// Lease a connection, waiting up to `acquire_timeout` for a free slot.
    pub async fn acquire(&self) -> Result<Lease> {
        if self.is_closed() {
            return Err(OnedbError::connection("pool is closed"));
        }

        let permit = {
            let _waiting = WaitingGuard::enter(&self.inner.waiting);
            let timeout = self.inner.config.acquire_timeout;
            match tokio::time::timeout(timeout, self.inner.semaphore.clone().acquire_owned()).await {
                Ok(Ok(permit)) => permit,
                Ok(Err(_)) => return Err(OnedbError::connection("pool is closed")),
                Err(_) => {
                    warn!(
                        timeout_ms = timeout.as_millis() as u64,
                        max_size = self.inner.config.max_size,
                        "pool exhausted"
                    );
                    return Err(OnedbError::PoolTimeout {
                        timeout_ms: timeout.as_millis() as u64,
                        max_size: self.inner.config.max_size,
                    });
                }
            }
        };

        let pooled = match self.inner.healthy_idle().await {
            Some(pooled) => pooled,
            // The permit is dropped on error, so the slot stays free.
            None => self.inner.open().await?,
        };
        self.inner.leased.fetch_add(1, Ordering::SeqCst);
        Ok(Lease {
            conn: Some(pooled),
            permit: Some(permit),
            pool: self.inner.clone(),
            broken: false,
            in_transaction: false,
        })
    }

    /// Close idle connections past `idle_timeout`, keeping `min_size`.
    pub fn reap_idle(&self) -> usize {
        self.inner.reap()
    }

    pub fn stats(&self) -> PoolStats {
        let idle = self.inner.idle_set().len();
        PoolStats {
            size: self.inner.size.load(Ordering::SeqCst),
            idle,
            leased: self.inner.leased.load(Ordering::SeqCst),
            max_size: self.inner.config.max_size,
            min_size: self.inner.config.min_size,
            total_created: self.inner.total_created.load(Ordering::Relaxed),
            total_discarded: self.inner.total_discarded.load(Ordering::Relaxed),
            waiting: self.inner.waiting.load(Ordering::SeqCst),
        }
    }

    pub fn config(&self) -> &PoolConfig {
        &self.inner.config
    }

    pub fn descriptor(&self) -> &Descriptor {
        &self.inner.descriptor
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    /// Stop handing out connections and close every idle one. Leased
    /// connections are closed when they come back.
    pub async fn close(&self) {
        self.inner.closed.store(true, Ordering::SeqCst);
        self.inner.semaphore.close();
        let drained: Vec<PooledConn> = self.inner.idle_set().drain(..).collect();
        for pooled in drained {
            self.inner.size.fetch_sub(1, Ordering::SeqCst);
            self.inner.total_discarded.fetch_add(1, Ordering::Relaxed);
            if let Err(e) = pooled.conn.close().await {
                debug!(error = %e, "error closing connection");
            }
        }
        info!(target_db = %self.inner.descriptor, "pool closed");
    }
}

struct WaitingGuard<'a>(&'a AtomicUsize);

impl<'a> WaitingGuard<'a> {
    fn enter(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        WaitingGuard(counter)
    }
}

impl Drop for WaitingGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Exclusive loan of one pooled connection. Returns to the pool on
/// [`release`](Lease::release) or drop.
pub struct Lease {
    conn: Option<PooledConn>,
    permit: Option<OwnedSemaphorePermit>,
    pool: Arc<PoolInner>,
    broken: bool,
    in_transaction: bool,
}

impl Lease {
    pub fn state(&self) -> EntryState {
        if self.broken {
            EntryState::Broken
        } else {
            EntryState::Leased
        }
    }

    /// Run one request on the leased connection.
    pub async fn execute(&mut self, request: &NativeRequest) -> NativeResult<NativeResponse> {
        match self.conn.as_mut() {
            Some(pooled) => pooled.conn.execute(request).await,
            None => Err(NativeError::new("io", "connection already released")),
        }
    }

    /// Ping the leased connection within the pool's ping timeout.
    pub async fn ping(&mut self) -> bool {
        let timeout = self.pool.config.ping_timeout;
        let Some(pooled) = self.conn.as_mut() else {
            return false;
        };
        let alive = matches!(tokio::time::timeout(timeout, pooled.conn.ping()).await, Ok(Ok(())));
        if alive {
            pooled.last_checked = Instant::now();
        }
        alive
    }

    /// Age of the underlying connection.
    pub fn age(&self) -> Duration {
        self.conn.as_ref().map(|p| p.created_at.elapsed()).unwrap_or_default()
    }

    /// Flag the connection so it is discarded instead of reused.
    pub fn mark_broken(&mut self) {
        self.broken = true;
    }

    pub(crate) fn set_in_transaction(&mut self, open: bool) {
        self.in_transaction = open;
    }

    pub fn in_transaction(&self) -> bool {
        self.in_transaction
    }

    /// Classify a native failure raised on this connection.
    pub(crate) fn map_error(&self, native: NativeError, context: Details) -> OnedbError {
        self.pool.map_error(native, context)
    }

    pub(crate) fn connection_details(&self) -> Details {
        self.pool.connection_details()
    }

    /// Give the connection back. Releasing with an open transaction is an
    /// error; the connection is discarded rather than reused.
    pub fn release(mut self) -> Result<()> {
        if self.in_transaction {
            self.broken = true;
            self.finish();
            return Err(OnedbError::transaction(
                "connection released while a transaction is still active",
            ));
        }
        self.finish();
        Ok(())
    }

    fn finish(&mut self) {
        if let Some(pooled) = self.conn.take() {
            self.pool.leased.fetch_sub(1, Ordering::SeqCst);
            if self.broken || self.in_transaction {
                if self.in_transaction {
                    warn!("discarding connection returned with an open transaction");
                }
                self.pool.discard(pooled);
            } else {
                self.pool.return_idle(pooled);
            }
        }
        // Only now may the next waiter proceed.
        self.permit.take();
    }
}

impl Drop for Lease {
    fn drop(&mut self) {
        self.finish();
    }
}

impl std::fmt::Debug for Lease {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Lease")
            .field("state", &self.state())
            .field("in_transaction", &self.in_transaction)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_config() {
        let config = PoolConfig::default()
            .max_size(20)
            .min_size(5)
            .acquire_timeout(Duration::from_millis(250));
        assert_eq!(config.max_size, 20);
        assert_eq!(config.min_size, 5);
        assert_eq!(config.acquire_timeout, Duration::from_millis(250));
        assert!(config.validate().is_ok());
        assert!(PoolConfig::default().max_size(0).validate().is_err());
        assert!(PoolConfig::default().min_size(9).validate().is_err());
    }

    #[test]
    fn test_defaults() {
        let c = PoolConfig::default();
        assert_eq!((c.min_size, c.max_size), (1, 5));
        assert_eq!(c.acquire_timeout, Duration::from_secs(30));
        assert_eq!(c.idle_timeout, Duration::from_secs(600));
        assert_eq!(c.connect_retries, 3);
    }
}
