//! Shared helpers for integration tests: a scriptable in-memory driver.
#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use onedb::descriptor::{Descriptor, Scheme};
use onedb::native::{
    Driver, NativeConnection, NativeError, NativeRequest, NativeResponse, NativeResult,
};
use onedb::{Adapter, PoolConfig, Registry, Value};

/// Observable state shared by the driver and every connection it opened.
#[derive(Default)]
pub struct MockState {
    log: Mutex<Vec<String>>,
    responses: Mutex<VecDeque<NativeResponse>>,
    failures: Mutex<Vec<(String, NativeError)>>,
    connect_failures: AtomicUsize,
    pub connects: AtomicUsize,
    pub closes: AtomicUsize,
    pub ping_fails: AtomicBool,
    /// Connection attempts never complete.
    pub connect_hangs: AtomicBool,
    pub ping_delay_ms: AtomicU64,
    pub connect_delay_ms: AtomicU64,
    next_id: AtomicUsize,
}

impl MockState {
    /// Summaries of every executed request, in order.
    pub fn log(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }

    pub fn clear_log(&self) {
        self.log.lock().unwrap().clear();
    }

    /// Queue a response for the next request that is not transaction control.
    pub fn respond(&self, response: NativeResponse) {
        self.responses.lock().unwrap().push_back(response);
    }

    /// Fail every request whose summary starts with `prefix`.
    pub fn fail_on(&self, prefix: &str, err: NativeError) {
        self.failures.lock().unwrap().push((prefix.to_string(), err));
    }

    /// Fail the next `n` connection attempts with an io error.
    pub fn fail_connects(&self, n: usize) {
        self.connect_failures.store(n, Ordering::SeqCst);
    }
}

#[derive(Clone, Default)]
pub struct MockDriver {
    pub state: Arc<MockState>,
}

impl MockDriver {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Driver for MockDriver {
    fn name(&self) -> &str {
        "mock"
    }

    async fn connect(&self, _descriptor: &Descriptor) -> NativeResult<Box<dyn NativeConnection>> {
        if self.state.connect_hangs.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        let delay = self.state.connect_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        let remaining = self.state.connect_failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.state.connect_failures.store(remaining - 1, Ordering::SeqCst);
            return Err(NativeError::new("io", "connection refused"));
        }
        self.state.connects.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MockConnection {
            state: self.state.clone(),
        }))
    }
}

struct MockConnection {
    state: Arc<MockState>,
}

#[async_trait]
impl NativeConnection for MockConnection {
    async fn execute(&mut self, request: &NativeRequest) -> NativeResult<NativeResponse> {
        let summary = request.summary();
        self.state.log.lock().unwrap().push(summary.clone());

        let failure = self
            .state
            .failures
            .lock()
            .unwrap()
            .iter()
            .find(|(prefix, _)| summary.starts_with(prefix.as_str()))
            .map(|(_, err)| err.clone());
        if let Some(err) = failure {
            return Err(err);
        }

        let control = matches!(request, NativeRequest::Transaction(_))
            || ["BEGIN", "COMMIT", "ROLLBACK", "SAVEPOINT", "RELEASE"]
                .iter()
                .any(|kw| summary.starts_with(kw));
        if !control {
            if let Some(response) = self.state.responses.lock().unwrap().pop_front() {
                return Ok(response);
            }
        }

        let is_write = ["INSERT", "UPDATE", "DELETE"]
            .iter()
            .any(|kw| summary.starts_with(kw));
        Ok(if is_write {
            let id = self.state.next_id.fetch_add(1, Ordering::SeqCst) + 1;
            NativeResponse::Ack {
                affected: 1,
                last_id: Some(Value::Int(id as i64)),
            }
        } else {
            NativeResponse::Rows {
                columns: Vec::new(),
                rows: Vec::new(),
                affected: 0,
                last_id: None,
            }
        })
    }

    async fn ping(&mut self) -> NativeResult<()> {
        let delay = self.state.ping_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        if self.state.ping_fails.load(Ordering::SeqCst) {
            Err(NativeError::new("io", "broken pipe"))
        } else {
            Ok(())
        }
    }

    async fn close(self: Box<Self>) -> NativeResult<()> {
        self.state.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Route library events to the test output; `RUST_LOG` picks the level.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
}

/// Pool settings that keep tests fast.
pub fn fast_pool(max: usize) -> PoolConfig {
    PoolConfig::default()
        .max_size(max)
        .min_size(1)
        .acquire_timeout(Duration::from_millis(200))
        .retry_backoff(Duration::from_millis(1))
        .ping_timeout(Duration::from_millis(100))
}

/// Registry whose only driver is `driver`, serving `scheme`.
pub fn registry_with(scheme: Scheme, driver: &MockDriver) -> Registry {
    Registry::builder()
        .driver(scheme, Arc::new(driver.clone()))
        .build()
}

/// Connected adapter for `uri` on a fresh mock driver.
pub async fn mock_adapter(uri: &str, max: usize) -> (Adapter, MockDriver) {
    init_tracing();
    let driver = MockDriver::new();
    let descriptor = Descriptor::parse(uri).unwrap();
    let registry = registry_with(descriptor.scheme(), &driver);
    let adapter = registry
        .connect_with_pool(descriptor, &fast_pool(max))
        .await
        .unwrap();
    (adapter, driver)
}

pub fn rows(columns: &[&str], rows: Vec<Vec<Value>>) -> NativeResponse {
    NativeResponse::Rows {
        columns: columns.iter().map(|c| c.to_string()).collect(),
        rows,
        affected: 0,
        last_id: None,
    }
}
