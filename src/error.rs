//! Error types for onedb.
//!
//! Every failure surfaced by the crate is an [`OnedbError`]. Native driver
//! failures are first classified by the per-backend [`ErrorMapper`](crate::mapper::ErrorMapper)
//! into one of the seven canonical kinds; the remaining variants describe
//! misuse of the crate itself (bad descriptors, invalid queries, transaction
//! state violations).

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use thiserror::Error;

/// Structured detail map carried by canonical errors (host, query text, ...).
pub type Details = BTreeMap<String, String>;

/// The main error type for onedb operations.
#[derive(Debug, Error)]
pub enum OnedbError {
    /// Network or authentication failure while talking to a backend.
    #[error("Connection error: {message}")]
    Connection { message: String, details: Details },

    /// The backend rejected or failed to run a query.
    #[error("Query error: {message}")]
    Query { message: String, details: Details },

    /// A backend operation exceeded its time budget.
    #[error("Timeout: {message}")]
    Timeout { message: String, details: Details },

    /// Unique, foreign-key, not-null or check constraint violated.
    #[error("Constraint violation: {message}")]
    ConstraintViolation { message: String, details: Details },

    /// No native client is available for the requested scheme.
    #[error("Driver '{driver}' is not installed. Install with: {install_command}")]
    DriverNotInstalled {
        driver: String,
        scheme: String,
        install_command: String,
    },

    /// The target backend cannot represent the requested construct.
    #[error("Unsupported operation: {clause} is not supported by {backend}")]
    UnsupportedOperation { clause: String, backend: String },

    /// Every pool slot stayed leased for the whole acquire timeout.
    #[error("Pool timeout: no connection available within {timeout_ms}ms (max {max_size})")]
    PoolTimeout { timeout_ms: u64, max_size: usize },

    /// Transaction state machine violation.
    #[error("Transaction error: {0}")]
    Transaction(String),

    /// The query AST failed validation.
    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    /// The connection URI or keyword parameters could not be parsed.
    #[error("Invalid connection descriptor: {0}")]
    InvalidDescriptor(String),

    /// No adapter is registered for the scheme.
    #[error("Adapter not found for scheme '{scheme}'. Available: {available}")]
    AdapterNotFound { scheme: String, available: String },

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// A failure whose cleanup rollback failed as well.
    #[error("{cause} (rollback also failed: {rollback})")]
    RollbackFailed {
        #[source]
        cause: Box<OnedbError>,
        rollback: Box<OnedbError>,
    },

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Coarse classification of an [`OnedbError`].
///
/// The first seven kinds are the canonical taxonomy every native error is
/// mapped into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Connection,
    Query,
    Timeout,
    ConstraintViolation,
    DriverNotInstalled,
    UnsupportedOperation,
    PoolTimeout,
    Transaction,
    InvalidQuery,
    InvalidDescriptor,
    AdapterNotFound,
    Config,
    Io,
}

impl ErrorKind {
    /// Whether this kind belongs to the canonical backend taxonomy.
    pub fn is_canonical(self) -> bool {
        matches!(
            self,
            ErrorKind::Connection
                | ErrorKind::Query
                | ErrorKind::Timeout
                | ErrorKind::ConstraintViolation
                | ErrorKind::DriverNotInstalled
                | ErrorKind::UnsupportedOperation
                | ErrorKind::PoolTimeout
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::Connection => "ConnectionError",
            ErrorKind::Query => "QueryError",
            ErrorKind::Timeout => "TimeoutError",
            ErrorKind::ConstraintViolation => "ConstraintViolationError",
            ErrorKind::DriverNotInstalled => "DriverNotInstalledError",
            ErrorKind::UnsupportedOperation => "UnsupportedOperationError",
            ErrorKind::PoolTimeout => "PoolTimeoutError",
            ErrorKind::Transaction => "TransactionError",
            ErrorKind::InvalidQuery => "InvalidQueryError",
            ErrorKind::InvalidDescriptor => "InvalidDescriptorError",
            ErrorKind::AdapterNotFound => "AdapterNotFoundError",
            ErrorKind::Config => "ConfigError",
            ErrorKind::Io => "IoError",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl OnedbError {
    /// Create a connection error with an empty detail map.
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
            details: Details::new(),
        }
    }

    /// Create a query error recording the offending query text.
    pub fn query(message: impl Into<String>, query: impl Into<String>) -> Self {
        let mut details = Details::new();
        details.insert("query".to_string(), query.into());
        Self::Query {
            message: message.into(),
            details,
        }
    }

    /// Create a timeout error recording the budget that was exceeded.
    pub fn timeout(message: impl Into<String>, timeout: Duration) -> Self {
        let mut details = Details::new();
        details.insert("timeout_ms".to_string(), timeout.as_millis().to_string());
        Self::Timeout {
            message: message.into(),
            details,
        }
    }

    /// Create an unsupported-operation error naming the offending clause.
    pub fn unsupported(clause: impl Into<String>, backend: impl Into<String>) -> Self {
        Self::UnsupportedOperation {
            clause: clause.into(),
            backend: backend.into(),
        }
    }

    pub fn invalid_query(message: impl Into<String>) -> Self {
        Self::InvalidQuery(message.into())
    }

    pub fn transaction(message: impl Into<String>) -> Self {
        Self::Transaction(message.into())
    }

    /// Add a detail entry. Only variants that carry a detail map are affected.
    pub fn with_detail(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        match &mut self {
            Self::Connection { details, .. }
            | Self::Query { details, .. }
            | Self::Timeout { details, .. }
            | Self::ConstraintViolation { details, .. } => {
                details.insert(key.into(), value.into());
            }
            Self::RollbackFailed { cause, .. } => {
                let inner = std::mem::replace(cause.as_mut(), Self::Config(String::new()));
                **cause = inner.with_detail(key, value);
            }
            _ => {}
        }
        self
    }

    /// Attach a failed cleanup rollback to this error without replacing it.
    pub fn with_rollback_failure(self, rollback: OnedbError) -> Self {
        Self::RollbackFailed {
            cause: Box::new(self),
            rollback: Box::new(rollback),
        }
    }

    /// The error that started the failure, skipping rollback attachments.
    pub fn root_cause(&self) -> &OnedbError {
        match self {
            Self::RollbackFailed { cause, .. } => cause.root_cause(),
            other => other,
        }
    }

    /// The attached rollback failure, if any.
    pub fn rollback_failure(&self) -> Option<&OnedbError> {
        match self {
            Self::RollbackFailed { rollback, .. } => Some(rollback),
            _ => None,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Connection { .. } => ErrorKind::Connection,
            Self::Query { .. } => ErrorKind::Query,
            Self::Timeout { .. } => ErrorKind::Timeout,
            Self::ConstraintViolation { .. } => ErrorKind::ConstraintViolation,
            Self::DriverNotInstalled { .. } => ErrorKind::DriverNotInstalled,
            Self::UnsupportedOperation { .. } => ErrorKind::UnsupportedOperation,
            Self::PoolTimeout { .. } => ErrorKind::PoolTimeout,
            Self::Transaction(_) => ErrorKind::Transaction,
            Self::InvalidQuery(_) => ErrorKind::InvalidQuery,
            Self::InvalidDescriptor(_) => ErrorKind::InvalidDescriptor,
            Self::AdapterNotFound { .. } => ErrorKind::AdapterNotFound,
            Self::Config(_) => ErrorKind::Config,
            Self::RollbackFailed { cause, .. } => cause.kind(),
            Self::Io(_) => ErrorKind::Io,
        }
    }

    /// Structured details for callers deciding whether to retry or degrade.
    pub fn details(&self) -> Details {
        match self {
            Self::Connection { details, .. }
            | Self::Query { details, .. }
            | Self::Timeout { details, .. }
            | Self::ConstraintViolation { details, .. } => details.clone(),
            Self::DriverNotInstalled {
                driver,
                scheme,
                install_command,
            } => Details::from([
                ("driver".to_string(), driver.clone()),
                ("scheme".to_string(), scheme.clone()),
                ("install_command".to_string(), install_command.clone()),
            ]),
            Self::UnsupportedOperation { clause, backend } => Details::from([
                ("clause".to_string(), clause.clone()),
                ("backend".to_string(), backend.clone()),
            ]),
            Self::PoolTimeout {
                timeout_ms,
                max_size,
            } => Details::from([
                ("timeout_ms".to_string(), timeout_ms.to_string()),
                ("max_size".to_string(), max_size.to_string()),
            ]),
            Self::AdapterNotFound { scheme, available } => Details::from([
                ("scheme".to_string(), scheme.clone()),
                ("available".to_string(), available.clone()),
            ]),
            Self::RollbackFailed { cause, rollback } => {
                let mut details = cause.details();
                details.insert("rollback_error".to_string(), rollback.to_string());
                details
            }
            _ => Details::new(),
        }
    }

    /// Connection and timeout failures are worth retrying by the caller;
    /// query execution never is retried internally.
    pub fn is_transient(&self) -> bool {
        matches!(self.kind(), ErrorKind::Connection | ErrorKind::Timeout)
    }
}

/// Result type alias for onedb operations.
pub type Result<T> = std::result::Result<T, OnedbError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = OnedbError::unsupported("JOIN", "mongodb");
        assert_eq!(
            err.to_string(),
            "Unsupported operation: JOIN is not supported by mongodb"
        );
        assert_eq!(err.kind(), ErrorKind::UnsupportedOperation);
        assert_eq!(err.details()["clause"], "JOIN");
    }

    #[test]
    fn test_driver_not_installed_details() {
        let err = OnedbError::DriverNotInstalled {
            driver: "sqlx-postgres".into(),
            scheme: "postgresql".into(),
            install_command: "cargo add onedb --features postgres".into(),
        };
        let details = err.details();
        assert_eq!(details["install_command"], "cargo add onedb --features postgres");
        assert!(err.to_string().contains("Install with"));
    }

    #[test]
    fn test_rollback_failure_keeps_original() {
        let original = OnedbError::query("duplicate row", "INSERT INTO users (id) VALUES (?)");
        let err = original.with_rollback_failure(OnedbError::connection("socket closed"));

        assert_eq!(err.kind(), ErrorKind::Query);
        assert!(matches!(err.root_cause(), OnedbError::Query { .. }));
        assert_eq!(err.rollback_failure().map(|e| e.kind()), Some(ErrorKind::Connection));
        assert!(err.details().contains_key("rollback_error"));
        assert_eq!(err.details()["query"], "INSERT INTO users (id) VALUES (?)");
    }

    #[test]
    fn test_with_detail() {
        let err = OnedbError::connection("refused")
            .with_detail("host", "db.internal")
            .with_detail("port", "5432");
        assert_eq!(err.details()["host"], "db.internal");
        assert!(err.is_transient());
        assert!(ErrorKind::PoolTimeout.is_canonical());
        assert!(!ErrorKind::Transaction.is_canonical());
    }
}
