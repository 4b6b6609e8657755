//! Error types for replica-parallel execution

use crate::packet::RemoteException;
use crate::types::ConnectionId;
use thiserror::Error;

/// Errors that can occur while talking to one or more replicas
#[derive(Error, Debug)]
pub enum ReplicaError {
    /// Transport failure on one replica connection
    #[error("Connection error ({address}): {message}")]
    Connection { address: String, message: String },

    /// Exception reported by a remote replica
    #[error("Remote exception: {0}")]
    Remote(RemoteException),

    /// Operation called in a state that does not allow it
    #[error("Precondition violated: {0}")]
    Precondition(String),

    /// The pool could not lease a single connection
    #[error("No connection available")]
    NoConnectionAvailable,

    /// The same connection was supplied twice
    #[error("Invalid set of connections: {0} registered twice")]
    DuplicateConnection(ConnectionId),

    /// Network transfer limit exceeded
    #[error("Limit for network transfer exceeded: {amount} bytes read, limit is {limit}")]
    ThrottlerLimitExceeded { limit: u64, amount: u64 },

    /// Invalid settings
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ReplicaError {
    /// Create a connection error for the given replica address
    pub fn connection(address: impl Into<String>, message: impl Into<String>) -> Self {
        ReplicaError::Connection {
            address: address.into(),
            message: message.into(),
        }
    }

    /// Whether the error is a transport failure of a single replica
    pub fn is_connection_error(&self) -> bool {
        matches!(self, ReplicaError::Connection { .. })
    }
}

impl From<RemoteException> for ReplicaError {
    fn from(e: RemoteException) -> Self {
        ReplicaError::Remote(e)
    }
}

impl From<serde_json::Error> for ReplicaError {
    fn from(e: serde_json::Error) -> Self {
        ReplicaError::Config(e.to_string())
    }
}

/// Result type for replica operations
pub type Result<T> = std::result::Result<T, ReplicaError>;
