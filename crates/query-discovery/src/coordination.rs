//! Coordination service capability
//!
//! Discovery needs only a small slice of a ZooKeeper-like service: session
//! scoped ephemeral nodes, child listing with one-shot watches, and reads.

use crate::error::Result;
use async_trait::async_trait;
use std::fmt;

/// Notification delivered to a one-shot watch
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchEvent {
    /// The child list of `path` changed
    ChildrenChanged { path: String },
    /// The session that armed the watch expired
    SessionExpired,
}

impl fmt::Display for WatchEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WatchEvent::ChildrenChanged { path } => write!(f, "children of {} changed", path),
            WatchEvent::SessionExpired => write!(f, "session expired"),
        }
    }
}

/// One-shot watch callback.
///
/// Runs on a context owned by the coordination service; it must only record
/// the event and return.
pub type WatchCallback = Box<dyn FnOnce(WatchEvent) + Send>;

/// Hierarchical coordination service
#[async_trait]
pub trait CoordinationService: Send + Sync {
    /// Create `path` and all of its missing ancestors as persistent nodes
    async fn create_ancestors(&self, path: &str) -> Result<()>;

    /// Create or overwrite an ephemeral node owned by the current session
    async fn create_ephemeral(&self, path: &str, data: &[u8]) -> Result<()>;

    /// Remove a node; missing nodes are not an error
    async fn remove(&self, path: &str) -> Result<()>;

    /// Child names of `path` and the version of the child list.
    ///
    /// The optional watch fires once on the next change of the list.
    async fn list_children(
        &self,
        path: &str,
        watch: Option<WatchCallback>,
    ) -> Result<(Vec<String>, i64)>;

    /// Data of `path`, `None` if the node does not exist
    async fn get_data(&self, path: &str) -> Result<Option<Vec<u8>>>;

    /// Open a new session after the previous one expired
    async fn reconnect(&self) -> Result<()>;
}

/// Join a parent path and a child name
pub fn child_path(parent: &str, child: &str) -> String {
    format!("{}/{}", parent.trim_end_matches('/'), child)
}
