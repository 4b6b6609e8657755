//! Replica client for Query Engine
//!
//! This crate sends one query to several replicas of the same shard and
//! reads the results back as a single packet stream.
//!
//! # Architecture
//!
//! - **Connection**: one live session to a replica, behind a trait
//! - **ConnectionPool**: leases connections, one, many or all at a time
//! - **ParallelReplicas**: fans the query out and multiplexes the replies
//! - **ReplicaCanceller**: cancels the query from another thread
//! - **Throttler**: keeps the network receive rate under a limit
//!
//! # Example
//!
//! ```ignore
//! use query_client::{ParallelReplicas, PoolMode, QueryStage, ReplicaSettings};
//!
//! let settings = ReplicaSettings::default().with_max_parallel_replicas(3);
//! let mut replicas =
//!     ParallelReplicas::from_pool(&pool, settings, None, PoolMode::GetMany, false).await?;
//!
//! replicas.send_query("SELECT count() FROM hits", "q1", QueryStage::Complete, false).await?;
//! while replicas.has_active_replicas() {
//!     let packet = replicas.receive_packet().await?;
//!     // ...
//! }
//! ```
//!
//! # Modules
//!
//! - [`connection`]: Connection capability
//! - [`channel`]: In-process connections over tokio channels
//! - [`pool`]: Connection leasing
//! - [`replicas`]: The parallel replica coordinator
//! - [`throttler`]: Network rate limiting
//! - [`packet`]: Packets exchanged with replicas

pub mod channel;
pub mod config;
pub mod connection;
pub mod error;
pub mod packet;
pub mod pool;
pub mod replicas;
pub mod throttler;
pub mod types;

// Re-exports
pub use channel::{ChannelConnection, ReplicaEndpoint, ReplicaRequest};
pub use config::{PoolMode, ReplicaSettings};
pub use connection::{CancelSink, Connection};
pub use error::{ReplicaError, Result};
pub use packet::{BlockExtraInfo, Packet, PacketKind, ProfileInfo, Progress, RemoteException};
pub use pool::{ConnectionPool, FixedPool, PoolEntry, PoolReturn};
pub use replicas::{ParallelReplicas, ReplicaCanceller, ReplicasState};
pub use throttler::{Throttler, ThrottlerPtr};
pub use types::*;
