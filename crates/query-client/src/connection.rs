//! Replica connection capability
//!
//! The wire protocol lives behind [`Connection`]; this crate only needs to
//! send, wait for readiness and receive whole packets.

use crate::error::Result;
use crate::packet::Packet;
use crate::types::{ConnectionId, ExternalTable, QueryRequest};
use async_trait::async_trait;
use std::sync::Arc;

/// Thread-safe half of a connection that can ask the replica to cancel
///
/// Must not block: implementations enqueue the cancel request and return.
pub trait CancelSink: Send + Sync {
    fn send_cancel(&self) -> Result<()>;
}

/// One live session to a replica
#[async_trait]
pub trait Connection: Send {
    /// Socket identity, unique among live connections
    fn id(&self) -> ConnectionId;

    /// Replica address as `host:port`
    fn address(&self) -> &str;

    /// Whether the replica runs in this process
    fn is_local(&self) -> bool {
        false
    }

    /// Cancel handle usable from another thread while this connection is
    /// being read
    fn canceller(&self) -> Arc<dyn CancelSink>;

    async fn send_query(&mut self, request: &QueryRequest) -> Result<()>;

    async fn send_external_tables(&mut self, tables: &[ExternalTable]) -> Result<()>;

    /// Wait until a packet can be read without blocking.
    ///
    /// Must be cancel-safe: dropping the future before it completes must not
    /// lose any data, so several connections can be raced against each other.
    async fn ready(&mut self) -> Result<()>;

    async fn receive_packet(&mut self) -> Result<Packet>;

    /// Tear the session down immediately
    async fn disconnect(&mut self);

    /// False once the session was torn down
    fn is_connected(&self) -> bool;
}
