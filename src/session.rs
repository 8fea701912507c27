//! A leased connection plus its transaction context.

use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, error};

use crate::adapter::Backend;
use crate::ast::Query;
use crate::error::{ErrorKind, OnedbError, Result};
use crate::native::{NativeRequest, TxOp};
use crate::pool::Lease;
use crate::result::{QueryResult, Row};
use crate::transaction::{TransactionContext, TransactionGuard, TransactionState};
use crate::value::Value;

/// Exclusive use of one pooled connection.
///
/// Every statement runs on the same native connection, so a transaction
/// begun here covers everything executed until commit or rollback. Dropping
/// the session returns the connection to the pool; a connection dropped
/// mid-transaction is discarded instead.
pub struct Session {
    lease: Option<Lease>,
    backend: Arc<dyn Backend>,
    tx: TransactionContext,
}

impl Session {
    pub(crate) fn new(lease: Lease, backend: Arc<dyn Backend>) -> Self {
        Self {
            lease: Some(lease),
            backend,
            tx: TransactionContext::default(),
        }
    }

    /// Move the session out, leaving an empty one behind.
    pub(crate) fn take(&mut self) -> Session {
        let empty = Session {
            lease: None,
            backend: self.backend.clone(),
            tx: TransactionContext::default(),
        };
        std::mem::replace(self, empty)
    }

    pub fn backend(&self) -> &dyn Backend {
        self.backend.as_ref()
    }

    pub fn transaction_state(&self) -> TransactionState {
        self.tx.state()
    }

    pub fn depth(&self) -> usize {
        self.tx.depth()
    }

    pub fn transaction(&self) -> &TransactionContext {
        &self.tx
    }

    /// Whether the connection answers within the ping timeout.
    pub async fn ping(&mut self) -> bool {
        match self.lease.as_mut() {
            Some(lease) => lease.ping().await,
            None => false,
        }
    }

    /// Send a native request and normalize the response.
    pub async fn execute_native(&mut self, request: &NativeRequest) -> Result<QueryResult> {
        let backend = self.backend.name();
        let lease = self
            .lease
            .as_mut()
            .ok_or_else(|| OnedbError::connection("session has already been released"))?;

        debug!(backend, request = %request.summary(), "execute");
        let started = Instant::now();
        match lease.execute(request).await {
            Ok(response) => Ok(QueryResult::from_native(response, started.elapsed())),
            Err(native) => {
                let mut context = lease.connection_details();
                context.insert("query".to_string(), request.summary());
                if let Some(params) = request_params(request) {
                    context.insert("params".to_string(), params);
                }
                let err = lease.map_error(native, context);
                if err.kind() == ErrorKind::Connection {
                    lease.mark_broken();
                }
                Err(err)
            }
        }
    }

    /// Run backend-native query text.
    pub async fn execute(&mut self, raw: &str, params: Vec<Value>) -> Result<QueryResult> {
        let request = self.backend.raw(raw, params);
        self.execute_native(&request).await
    }

    pub async fn execute_query(&mut self, query: &Query) -> Result<QueryResult> {
        debug!(backend = self.backend.name(), table = query.table(), "translate");
        let request = self.backend.translate(query)?;
        self.execute_native(&request).await
    }

    pub async fn fetch_all(&mut self, query: &Query) -> Result<Vec<Row>> {
        Ok(self.execute_query(query).await?.rows)
    }

    /// First row of the reply. Backends that cannot express `LIMIT` for
    /// this query (key lookups, filtered scans) run it unlimited.
    pub async fn fetch_one(&mut self, query: &Query) -> Result<Option<Row>> {
        let request = match self.backend.translate(&query.copy().limit(1)) {
            Ok(request) => request,
            Err(e) if e.kind() == ErrorKind::UnsupportedOperation => self.backend.translate(query)?,
            Err(e) => return Err(e),
        };
        Ok(self.execute_native(&request).await?.rows.into_iter().next())
    }

    /// Open a transaction, or a savepoint when one is already open.
    pub async fn begin(&mut self) -> Result<()> {
        let op = self
            .tx
            .plan_begin(self.backend.capabilities().savepoints, self.backend.name())?;
        self.send(&op).await?;
        self.tx.apply(&op);
        if op == TxOp::Begin {
            self.set_in_transaction(true);
        }
        Ok(())
    }

    /// Commit the innermost level. When the outermost commit fails the
    /// transaction is rolled back and the commit error returned.
    pub async fn commit(&mut self) -> Result<()> {
        let op = self.tx.plan_commit()?;
        match self.send(&op).await {
            Ok(()) => {
                self.tx.apply(&op);
                if op == TxOp::Commit {
                    self.set_in_transaction(false);
                }
                Ok(())
            }
            Err(e) if op == TxOp::Commit => {
                let rollback = self.send(&TxOp::Rollback).await;
                self.tx.apply(&TxOp::Rollback);
                self.set_in_transaction(false);
                match rollback {
                    Ok(()) => Err(e),
                    Err(rb) => {
                        error!(error = %rb, "rollback after failed commit also failed");
                        self.mark_broken();
                        Err(e.with_rollback_failure(rb))
                    }
                }
            }
            Err(e) => Err(e),
        }
    }

    /// Roll back the innermost level. The level is closed even when the
    /// backend reports a failure; the connection is then not reused.
    pub async fn rollback(&mut self) -> Result<()> {
        let op = self.tx.plan_rollback()?;
        let outcome = self.send(&op).await;
        self.tx.apply(&op);
        if op == TxOp::Rollback {
            self.set_in_transaction(false);
        }
        if let Err(e) = &outcome {
            error!(error = %e, step = %op, "rollback failed");
            self.mark_broken();
        }
        outcome
    }

    /// Begin a transaction and wrap the session in a guard.
    pub async fn into_transaction(mut self) -> Result<TransactionGuard> {
        self.begin().await?;
        Ok(TransactionGuard::new(self))
    }

    /// Give the connection back to the pool.
    pub fn release(mut self) -> Result<()> {
        match self.lease.take() {
            Some(lease) => lease.release(),
            None => Ok(()),
        }
    }

    async fn send(&mut self, op: &TxOp) -> Result<()> {
        if let Some(request) = self.backend.transaction_request(op)? {
            self.execute_native(&request).await?;
        }
        Ok(())
    }

    fn set_in_transaction(&mut self, open: bool) {
        if let Some(lease) = self.lease.as_mut() {
            lease.set_in_transaction(open);
        }
    }

    fn mark_broken(&mut self) {
        if let Some(lease) = self.lease.as_mut() {
            lease.mark_broken();
        }
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("backend", &self.backend.name())
            .field("lease", &self.lease)
            .field("tx", &self.tx)
            .finish()
    }
}

fn request_params(request: &NativeRequest) -> Option<String> {
    match request {
        NativeRequest::Sql { params, .. } | NativeRequest::Raw { params, .. } => Some(
            params
                .iter()
                .map(Value::to_plain_string)
                .collect::<Vec<_>>()
                .join(", "),
        ),
        _ => None,
    }
}
