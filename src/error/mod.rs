use thiserror::Error;

/// Result type for setup and configuration paths
pub type Result<T> = std::result::Result<T, ClusterError>;

/// Errors raised while building an invoker (never on the call path)
#[derive(Error, Debug)]
pub enum ClusterError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid endpoint: {0}")]
    InvalidEndpoint(String),

    #[error("Coordination store error: {0}")]
    Store(#[from] StoreError),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Failure of a single call.
///
/// Business failures are produced by the application behind the target and are always
/// propagated verbatim. System failures come from the transport or protocol layer and
/// may be replaced by a fallback reply. A fallback failure means the substitute target
/// failed as well; its message carries both signals.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Failure {
    #[error("business failure: {0}")]
    Business(String),

    #[error("system failure: {0}")]
    System(String),

    #[error("{0}")]
    Fallback(String),
}

impl Failure {
    /// Whether this failure originates from application logic
    pub fn is_business(&self) -> bool {
        matches!(self, Failure::Business(_))
    }

    /// Message without the classification prefix
    pub fn message(&self) -> &str {
        match self {
            Failure::Business(msg) | Failure::System(msg) | Failure::Fallback(msg) => msg,
        }
    }
}

/// Coordination store access errors. Contained inside the metrics aggregator.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("connection failed: {0}")]
    Connection(String),

    #[error("operation timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("corrupt record at {key}: {reason}")]
    Corrupt { key: String, reason: String },

    #[error("version conflict at {key}: expected {expected}, found {actual}")]
    VersionConflict {
        key: String,
        expected: i64,
        actual: i64,
    },

    #[error("unsupported operation: {0}")]
    Unsupported(String),
}

impl From<redis::RedisError> for StoreError {
    fn from(err: redis::RedisError) -> Self {
        if err.is_timeout() {
            StoreError::Protocol(format!("redis timeout: {}", err))
        } else if err.is_connection_refusal() || err.is_connection_dropped() || err.is_io_error()
        {
            StoreError::Connection(err.to_string())
        } else {
            StoreError::Protocol(err.to_string())
        }
    }
}
