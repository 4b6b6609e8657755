//! In-process replica connections backed by tokio channels
//!
//! [`ChannelConnection`] is the client half; [`ReplicaEndpoint`] is held by
//! whatever plays the replica (a local executor, a test, a demo).

use crate::connection::{CancelSink, Connection};
use crate::error::{ReplicaError, Result};
use crate::packet::Packet;
use crate::types::{ConnectionId, ExternalTable, QueryRequest};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Requests delivered to the replica side
#[derive(Debug, Clone)]
pub enum ReplicaRequest {
    /// External tables pushed before the query
    ExternalTables(Vec<ExternalTable>),
    /// The query itself
    Query(QueryRequest),
    /// Cancel the running query
    Cancel,
}

/// Client half of an in-process replica session
pub struct ChannelConnection {
    id: ConnectionId,
    address: String,
    local: bool,
    requests: mpsc::UnboundedSender<ReplicaRequest>,
    packets: mpsc::UnboundedReceiver<Packet>,
    /// Packet taken off the channel by `ready` and not yet handed out
    pending: Option<Packet>,
    closed: bool,
}

/// Replica half of an in-process session
pub struct ReplicaEndpoint {
    address: String,
    requests: mpsc::UnboundedReceiver<ReplicaRequest>,
    packets: mpsc::UnboundedSender<Packet>,
}

struct ChannelCancel {
    address: String,
    requests: mpsc::UnboundedSender<ReplicaRequest>,
}

impl CancelSink for ChannelCancel {
    fn send_cancel(&self) -> Result<()> {
        self.requests
            .send(ReplicaRequest::Cancel)
            .map_err(|_| ReplicaError::connection(&self.address, "replica endpoint is gone"))
    }
}

impl ChannelConnection {
    /// Create a connected pair for a replica at `address`
    pub fn new(address: impl Into<String>) -> (Self, ReplicaEndpoint) {
        let address = address.into();
        let (request_tx, request_rx) = mpsc::unbounded_channel();
        let (packet_tx, packet_rx) = mpsc::unbounded_channel();

        let connection = Self {
            id: ConnectionId::next(),
            address: address.clone(),
            local: false,
            requests: request_tx,
            packets: packet_rx,
            pending: None,
            closed: false,
        };
        let endpoint = ReplicaEndpoint {
            address,
            requests: request_rx,
            packets: packet_tx,
        };
        (connection, endpoint)
    }

    /// Mark the replica as running in this process
    pub fn with_local(mut self, local: bool) -> Self {
        self.local = local;
        self
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed {
            return Err(ReplicaError::connection(
                &self.address,
                "connection was disconnected",
            ));
        }
        Ok(())
    }

    fn send_request(&self, request: ReplicaRequest) -> Result<()> {
        self.ensure_open()?;
        self.requests
            .send(request)
            .map_err(|_| ReplicaError::connection(&self.address, "replica endpoint is gone"))
    }
}

#[async_trait]
impl Connection for ChannelConnection {
    fn id(&self) -> ConnectionId {
        self.id
    }

    fn address(&self) -> &str {
        &self.address
    }

    fn is_local(&self) -> bool {
        self.local
    }

    fn canceller(&self) -> Arc<dyn CancelSink> {
        Arc::new(ChannelCancel {
            address: self.address.clone(),
            requests: self.requests.clone(),
        })
    }

    async fn send_query(&mut self, request: &QueryRequest) -> Result<()> {
        self.send_request(ReplicaRequest::Query(request.clone()))
    }

    async fn send_external_tables(&mut self, tables: &[ExternalTable]) -> Result<()> {
        self.send_request(ReplicaRequest::ExternalTables(tables.to_vec()))
    }

    async fn ready(&mut self) -> Result<()> {
        self.ensure_open()?;
        if self.pending.is_some() {
            return Ok(());
        }
        // recv is cancel-safe and nothing is awaited after it, so a dropped
        // wait never loses a packet.
        match self.packets.recv().await {
            Some(packet) => {
                self.pending = Some(packet);
                Ok(())
            }
            None => Err(ReplicaError::connection(
                &self.address,
                "replica closed the connection",
            )),
        }
    }

    async fn receive_packet(&mut self) -> Result<Packet> {
        self.ready().await?;
        self.pending
            .take()
            .ok_or_else(|| ReplicaError::connection(&self.address, "no packet buffered"))
    }

    async fn disconnect(&mut self) {
        if !self.closed {
            tracing::debug!("Disconnecting {} ({})", self.address, self.id);
        }
        self.closed = true;
        self.pending = None;
        self.packets.close();
    }

    fn is_connected(&self) -> bool {
        !self.closed
    }
}

impl ReplicaEndpoint {
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Wait for the next request; `None` once the client side is dropped
    pub async fn next_request(&mut self) -> Option<ReplicaRequest> {
        self.requests.recv().await
    }

    /// Next request if one is already queued
    pub fn try_next_request(&mut self) -> Option<ReplicaRequest> {
        self.requests.try_recv().ok()
    }

    /// Push a packet to the client. Returns false if the client disconnected.
    pub fn send(&self, packet: Packet) -> bool {
        self.packets.send(packet).is_ok()
    }

    /// Push several packets in order
    pub fn send_all(&self, packets: impl IntoIterator<Item = Packet>) -> bool {
        packets.into_iter().all(|p| self.send(p))
    }

    /// Whether the client disconnected or was dropped
    pub fn is_disconnected(&self) -> bool {
        self.packets.is_closed()
    }
}
