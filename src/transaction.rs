//! Transaction state machine and the scope guard around it.
//!
//! [`TransactionContext`] only plans and records steps; the [`Session`]
//! that owns it sends the native statements and applies a step once the
//! backend accepted it. Nesting uses savepoints named `sp_<depth>`.

use std::ops::{Deref, DerefMut};

use tracing::{debug, error, warn};

use crate::error::{OnedbError, Result};
use crate::native::TxOp;
use crate::session::Session;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransactionState {
    #[default]
    Idle,
    Active,
    Committed,
    RolledBack,
}

/// Per-session transaction bookkeeping.
#[derive(Debug, Clone, Default)]
pub struct TransactionContext {
    state: TransactionState,
    depth: usize,
    savepoints: Vec<String>,
}

impl TransactionContext {
    pub fn state(&self) -> TransactionState {
        self.state
    }

    /// 0 outside a transaction, 1 for the outermost level, +1 per savepoint.
    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn savepoints(&self) -> &[String] {
        &self.savepoints
    }

    pub fn is_active(&self) -> bool {
        self.state == TransactionState::Active
    }

    /// Step that opens the next level.
    pub fn plan_begin(&self, savepoints_supported: bool, backend: &str) -> Result<TxOp> {
        if !self.is_active() {
            return Ok(TxOp::Begin);
        }
        if !savepoints_supported {
            return Err(OnedbError::transaction(format!(
                "nested transaction requires savepoints, which {} does not support",
                backend
            )));
        }
        Ok(TxOp::Savepoint(format!("sp_{}", self.depth)))
    }

    /// Step that commits the innermost level.
    pub fn plan_commit(&self) -> Result<TxOp> {
        self.require_active("commit")?;
        Ok(match self.savepoints.last() {
            Some(name) => TxOp::ReleaseSavepoint(name.clone()),
            None => TxOp::Commit,
        })
    }

    /// Step that rolls back the innermost level.
    pub fn plan_rollback(&self) -> Result<TxOp> {
        self.require_active("rollback")?;
        Ok(match self.savepoints.last() {
            Some(name) => TxOp::RollbackToSavepoint(name.clone()),
            None => TxOp::Rollback,
        })
    }

    /// Record a step as done.
    pub fn apply(&mut self, op: &TxOp) {
        match op {
            TxOp::Begin => {
                self.state = TransactionState::Active;
                self.depth = 1;
                self.savepoints.clear();
            }
            TxOp::Savepoint(name) => {
                self.savepoints.push(name.clone());
                self.depth += 1;
            }
            TxOp::ReleaseSavepoint(_) | TxOp::RollbackToSavepoint(_) => {
                self.savepoints.pop();
                self.depth = self.depth.saturating_sub(1);
            }
            TxOp::Commit => self.finish(TransactionState::Committed),
            TxOp::Rollback => self.finish(TransactionState::RolledBack),
        }
    }

    fn finish(&mut self, state: TransactionState) {
        self.state = state;
        self.depth = 0;
        self.savepoints.clear();
    }

    fn require_active(&self, action: &str) -> Result<()> {
        if self.is_active() {
            Ok(())
        } else {
            Err(OnedbError::transaction(format!(
                "cannot {} from state {:?}",
                action, self.state
            )))
        }
    }
}

/// An open transaction on a leased session.
///
/// Derefs to the [`Session`], so queries run inside the transaction. The
/// lease goes back to the pool only after `commit` or `rollback` reached a
/// terminal state. Dropping an unresolved guard rolls back in the
/// background.
#[derive(Debug)]
pub struct TransactionGuard {
    session: Session,
}

impl TransactionGuard {
    pub(crate) fn new(session: Session) -> Self {
        Self { session }
    }

    /// Commit every open level, then release the lease.
    pub async fn commit(mut self) -> Result<()> {
        while self.session.transaction_state() == TransactionState::Active {
            self.session.commit().await?;
        }
        self.session.take().release()
    }

    /// Roll back every open level, then release the lease.
    pub async fn rollback(mut self) -> Result<()> {
        let mut outcome = Ok(());
        while self.session.transaction_state() == TransactionState::Active {
            if let Err(e) = self.session.rollback().await {
                outcome = Err(e);
            }
        }
        let released = self.session.take().release();
        outcome.and(released)
    }
}

impl Deref for TransactionGuard {
    type Target = Session;

    fn deref(&self) -> &Session {
        &self.session
    }
}

impl DerefMut for TransactionGuard {
    fn deref_mut(&mut self) -> &mut Session {
        &mut self.session
    }
}

impl Drop for TransactionGuard {
    fn drop(&mut self) {
        if self.session.transaction_state() != TransactionState::Active {
            return;
        }
        let mut session = self.session.take();
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                warn!("transaction dropped without commit or rollback; rolling back");
                handle.spawn(async move {
                    while session.transaction_state() == TransactionState::Active {
                        if let Err(e) = session.rollback().await {
                            error!(error = %e, "background rollback failed");
                        }
                    }
                    if let Err(e) = session.release() {
                        debug!(error = %e, "release after background rollback failed");
                    }
                });
            }
            Err(_) => {
                warn!("transaction dropped outside a runtime; discarding its connection");
                drop(session);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nested_levels_use_savepoints() {
        let mut ctx = TransactionContext::default();
        let begin = ctx.plan_begin(true, "postgresql").unwrap();
        assert_eq!(begin, TxOp::Begin);
        ctx.apply(&begin);

        let nested = ctx.plan_begin(true, "postgresql").unwrap();
        assert_eq!(nested, TxOp::Savepoint("sp_1".into()));
        ctx.apply(&nested);
        assert_eq!(ctx.depth(), 2);

        let inner = ctx.plan_rollback().unwrap();
        assert_eq!(inner, TxOp::RollbackToSavepoint("sp_1".into()));
        ctx.apply(&inner);
        assert_eq!(ctx.state(), TransactionState::Active);

        let outer = ctx.plan_commit().unwrap();
        assert_eq!(outer, TxOp::Commit);
        ctx.apply(&outer);
        assert_eq!(ctx.state(), TransactionState::Committed);
        assert_eq!(ctx.depth(), 0);
    }

    #[test]
    fn test_nested_without_savepoints_fails() {
        let mut ctx = TransactionContext::default();
        ctx.apply(&TxOp::Begin);
        let err = ctx.plan_begin(false, "redis").unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Transaction);
    }

    #[test]
    fn test_commit_outside_transaction_fails() {
        let mut ctx = TransactionContext::default();
        assert!(ctx.plan_commit().is_err());
        ctx.apply(&TxOp::Begin);
        ctx.apply(&TxOp::Rollback);
        assert!(ctx.plan_rollback().is_err());
        // A finished transaction can be followed by a new one.
        assert_eq!(ctx.plan_begin(false, "sqlite").unwrap(), TxOp::Begin);
    }
}
