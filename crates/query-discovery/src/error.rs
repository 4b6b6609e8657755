//! Error types for cluster discovery

use thiserror::Error;

/// Errors that can occur while discovering cluster members
#[derive(Error, Debug)]
pub enum DiscoveryError {
    /// A node payload is not a valid `host:port` address
    #[error("Cannot parse node address {payload:?}: {reason}")]
    Parse { payload: String, reason: String },

    /// The coordination session expired; ephemeral nodes are gone
    #[error("Coordination session expired")]
    SessionExpired,

    /// Path does not exist in the coordination service
    #[error("No node: {0}")]
    NoNode(String),

    /// Any other coordination-service failure
    #[error("Coordination error: {0}")]
    Coordination(String),

    /// Coordination call did not finish in time
    #[error("Coordination operation timed out after {0}ms")]
    Timeout(u64),

    /// Cluster is not configured for discovery
    #[error("Unknown discovery cluster: {0}")]
    UnknownCluster(String),

    /// The background worker is already running
    #[error("Cluster discovery already started")]
    AlreadyStarted,

    /// The service was shut down
    #[error("Cluster discovery is shut down")]
    Stopped,

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl DiscoveryError {
    pub fn parse(payload: impl Into<String>, reason: impl Into<String>) -> Self {
        DiscoveryError::Parse {
            payload: payload.into(),
            reason: reason.into(),
        }
    }
}

impl From<serde_json::Error> for DiscoveryError {
    fn from(e: serde_json::Error) -> Self {
        DiscoveryError::Config(e.to_string())
    }
}

/// Result type for discovery operations
pub type Result<T> = std::result::Result<T, DiscoveryError>;
