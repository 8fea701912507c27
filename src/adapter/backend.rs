use crate::ast::Query;
use crate::error::{OnedbError, Result};
use crate::mapper::ErrorMapper;
use crate::native::{Introspection, NativeRequest, TxOp};
use crate::value::Value;

use super::{AdapterKind, Capabilities};

/// Backend-specific half of an adapter: how queries, transaction steps and
/// introspection look for one native client family.
///
/// `translate` must be a pure function of the query and the backend's
/// settings: the same query always yields the same request.
pub trait Backend: Send + Sync {
    /// Canonical scheme name, used in errors and logs.
    fn name(&self) -> &'static str;

    fn kind(&self) -> AdapterKind;

    fn capabilities(&self) -> Capabilities;

    fn translate(&self, query: &Query) -> Result<NativeRequest>;

    /// Native request for a caller-supplied query text.
    fn raw(&self, text: &str, params: Vec<Value>) -> NativeRequest {
        NativeRequest::Raw {
            text: text.to_string(),
            params,
        }
    }

    /// Request for a transaction step. `Ok(None)` means the step is implicit
    /// on this backend and nothing has to be sent.
    fn transaction_request(&self, op: &TxOp) -> Result<Option<NativeRequest>> {
        let caps = self.capabilities();
        let savepoint_op = matches!(
            op,
            TxOp::Savepoint(_) | TxOp::ReleaseSavepoint(_) | TxOp::RollbackToSavepoint(_)
        );
        if !caps.transactions {
            return Err(OnedbError::unsupported("transactions", self.name()));
        }
        if savepoint_op && !caps.savepoints {
            return Err(OnedbError::unsupported("savepoints", self.name()));
        }
        Ok(Some(NativeRequest::Transaction(op.clone())))
    }

    fn introspect(&self, what: &Introspection) -> Result<NativeRequest> {
        if !self.capabilities().schema_introspection {
            return Err(OnedbError::unsupported("schema introspection", self.name()));
        }
        Ok(NativeRequest::Introspect(what.clone()))
    }

    /// Column whose value is reported as `last_id` when the native client
    /// has no last-insert id of its own.
    fn returning_id_column(&self) -> Option<&str> {
        None
    }

    fn error_mapper(&self) -> ErrorMapper {
        ErrorMapper::new(self.kind(), self.name())
    }
}
