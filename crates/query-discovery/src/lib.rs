//! Cluster discovery for Query Engine
//!
//! Nodes announce themselves in a coordination service and watch each
//! other; every process keeps an up-to-date, immutable topology snapshot
//! per configured cluster.
//!
//! # Architecture
//!
//! - **CoordinationService**: ephemeral nodes, child watches, reads
//! - **ClusterDiscovery**: registers this node and runs the refresh worker
//! - **PendingUpdates**: clusters marked by watches, drained by the worker
//! - **TopologyRegistry**: latest [`TopologySnapshot`] of every cluster
//!
//! # Example
//!
//! ```ignore
//! use query_discovery::{
//!     ClusterConfig, ClusterDiscovery, DiscoveryConfig, MemoryCoordination, TopologyRegistry,
//! };
//! use std::sync::Arc;
//!
//! let config = DiscoveryConfig::default()
//!     .with_address("replica-1", 9000)
//!     .with_cluster(ClusterConfig::new("analytics", "/discovery/analytics"));
//!
//! let discovery = ClusterDiscovery::new(
//!     config,
//!     Arc::new(MemoryCoordination::new()),
//!     Arc::new(TopologyRegistry::new()),
//! )?;
//! discovery.start().await?;
//!
//! let members = discovery.snapshot("analytics").unwrap().addresses();
//! ```

pub mod config;
pub mod coordination;
pub mod error;
pub mod memory;
pub mod pending;
pub mod service;
pub mod topology;
pub mod types;

// Re-exports
pub use config::{ClusterConfig, DiscoveryConfig};
pub use coordination::{child_path, CoordinationService, WatchCallback, WatchEvent};
pub use error::{DiscoveryError, Result};
pub use memory::MemoryCoordination;
pub use pending::PendingUpdates;
pub use service::{need_update, ClusterDiscovery};
pub use topology::{ClusterMember, TopologyRegistry, TopologySnapshot};
pub use types::*;
