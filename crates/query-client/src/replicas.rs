//! Reading one query's results from several replicas at once
//!
//! [`ParallelReplicas`] owns the leased connections of a single query and
//! multiplexes them: the query goes to every replica, packets come back from
//! whichever replica is ready first.
//!
//! Everything except cancellation runs on the task that executes the query.
//! [`ReplicaCanceller`] is the only handle meant for other threads; it shares
//! the cancel targets and the replica counters with the coordinator and
//! never touches the replica set itself.

use crate::config::{PoolMode, ReplicaSettings};
use crate::connection::{CancelSink, Connection};
use crate::error::{ReplicaError, Result};
use crate::packet::{BlockExtraInfo, Packet};
use crate::pool::{ConnectionPool, PoolEntry};
use crate::throttler::ThrottlerPtr;
use crate::types::{ConnectionId, ExternalTable, QueryRequest, QueryStage};
use futures::future::select_all;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Lifecycle of a [`ParallelReplicas`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplicasState {
    /// Connections registered, query not sent yet
    Created,
    /// Query sent; packets may be received, drained or cancelled
    QuerySent,
    /// All connections torn down
    Disconnected,
}

impl fmt::Display for ReplicasState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReplicasState::Created => write!(f, "Created"),
            ReplicasState::QuerySent => write!(f, "QuerySent"),
            ReplicasState::Disconnected => write!(f, "Disconnected"),
        }
    }
}

struct Replica {
    entry: PoolEntry,
    active: bool,
}

struct CancelTarget {
    address: String,
    sink: Arc<dyn CancelSink>,
}

struct CancelState {
    targets: Vec<CancelTarget>,
    query_sent: bool,
    cancelled: bool,
}

impl CancelState {
    fn broadcast(&self) {
        for target in &self.targets {
            if let Err(e) = target.sink.send_cancel() {
                tracing::warn!("Failed to send cancel to {}: {}", target.address, e);
            }
        }
        tracing::info!("Sent cancel to {} replica(s)", self.targets.len());
    }
}

struct SharedState {
    /// Guards the cancel broadcast and the address list, nothing else
    cancel: Mutex<CancelState>,
    size: usize,
    active: AtomicUsize,
}

/// Cross-thread handle of a [`ParallelReplicas`]
#[derive(Clone)]
pub struct ReplicaCanceller {
    shared: Arc<SharedState>,
}

impl ReplicaCanceller {
    /// Ask every registered replica to cancel the query.
    ///
    /// Idempotent. A cancel issued before the query is sent is remembered and
    /// broadcast right after sending. It does not wake a pending receive: the
    /// replicas ending their streams do.
    pub fn send_cancel(&self) {
        let mut cancel = self.shared.cancel.lock();
        if cancel.cancelled {
            return;
        }
        cancel.cancelled = true;
        if cancel.query_sent {
            cancel.broadcast();
        } else {
            tracing::debug!("Cancel requested before the query was sent, deferring");
        }
    }

    /// Addresses of all registered replicas, `"; "`-separated
    pub fn dump_addresses(&self) -> String {
        let cancel = self.shared.cancel.lock();
        cancel
            .targets
            .iter()
            .map(|t| t.address.as_str())
            .collect::<Vec<_>>()
            .join("; ")
    }

    pub fn is_cancelled(&self) -> bool {
        self.shared.cancel.lock().cancelled
    }

    /// Number of registered replicas. Lock-free: nothing ever changes it.
    pub fn size(&self) -> usize {
        self.shared.size
    }

    /// Lock-free: cancellation never changes the active count.
    pub fn has_active_replicas(&self) -> bool {
        self.shared.active.load(Ordering::Acquire) > 0
    }
}

/// Coordinator reading one query from several replica connections
pub struct ParallelReplicas {
    replicas: Vec<Replica>,
    index: HashMap<ConnectionId, usize>,
    handle: ReplicaCanceller,
    settings: ReplicaSettings,
    /// Limits network traffic when present
    throttler: ThrottlerPtr,
    /// Stamp each replica with its share of the data
    parallel_execution: bool,
    append_extra_info: bool,
    /// Extra info of the last received block
    block_extra_info: Option<BlockExtraInfo>,
    state: ReplicasState,
    /// Something was written to the connections
    sent_any: bool,
}

impl ParallelReplicas {
    /// Coordinate a single ready connection
    pub fn with_connection(
        connection: Box<dyn Connection>,
        settings: ReplicaSettings,
        throttler: ThrottlerPtr,
    ) -> Result<Self> {
        Self::build(
            vec![PoolEntry::unpooled(connection)],
            settings,
            throttler,
            false,
            false,
        )
    }

    /// Lease connections from `pool` according to `mode`.
    ///
    /// With [`PoolMode::GetMany`] each replica reads its own share of the
    /// data; with [`PoolMode::GetAll`] every replica runs the whole query.
    pub async fn from_pool(
        pool: &dyn ConnectionPool,
        settings: ReplicaSettings,
        throttler: ThrottlerPtr,
        mode: PoolMode,
        append_extra_info: bool,
    ) -> Result<Self> {
        let entries = match mode {
            PoolMode::GetOne => vec![pool.get(&settings).await?],
            PoolMode::GetMany | PoolMode::GetAll => pool.get_many(&settings, mode).await?,
        };
        let parallel_execution = mode == PoolMode::GetMany;
        Self::build(entries, settings, throttler, append_extra_info, parallel_execution)
    }

    /// Coordinate already leased connections
    pub fn from_entries(
        entries: Vec<PoolEntry>,
        settings: ReplicaSettings,
        throttler: ThrottlerPtr,
        append_extra_info: bool,
    ) -> Result<Self> {
        let parallel_execution = settings.max_parallel_replicas > 1;
        Self::build(entries, settings, throttler, append_extra_info, parallel_execution)
    }

    fn build(
        entries: Vec<PoolEntry>,
        settings: ReplicaSettings,
        throttler: ThrottlerPtr,
        append_extra_info: bool,
        parallel_execution: bool,
    ) -> Result<Self> {
        if entries.is_empty() {
            return Err(ReplicaError::NoConnectionAvailable);
        }

        let mut replicas = Vec::with_capacity(entries.len());
        let mut index = HashMap::with_capacity(entries.len());
        let mut targets = Vec::with_capacity(entries.len());

        for entry in entries {
            let id = entry.id();
            if index.insert(id, replicas.len()).is_some() {
                return Err(ReplicaError::DuplicateConnection(id));
            }
            targets.push(CancelTarget {
                address: entry.address().to_string(),
                sink: entry.canceller(),
            });
            replicas.push(Replica {
                entry,
                active: true,
            });
        }

        let size = replicas.len();
        let handle = ReplicaCanceller {
            shared: Arc::new(SharedState {
                cancel: Mutex::new(CancelState {
                    targets,
                    query_sent: false,
                    cancelled: false,
                }),
                size,
                active: AtomicUsize::new(size),
            }),
        };
        tracing::debug!(
            "Registered {} replica(s): {}",
            size,
            handle.dump_addresses()
        );

        Ok(Self {
            replicas,
            index,
            handle,
            settings,
            throttler,
            parallel_execution: parallel_execution && size > 1,
            append_extra_info,
            block_extra_info: None,
            state: ReplicasState::Created,
            sent_any: false,
        })
    }

    /// Handle for cancelling from another thread
    pub fn canceller(&self) -> ReplicaCanceller {
        self.handle.clone()
    }

    pub fn state(&self) -> ReplicasState {
        self.state
    }

    pub fn settings(&self) -> &ReplicaSettings {
        &self.settings
    }

    /// Number of registered replicas, constant for the coordinator's lifetime
    pub fn size(&self) -> usize {
        self.handle.size()
    }

    /// Whether some replica has not finished its stream yet
    pub fn has_active_replicas(&self) -> bool {
        self.handle.has_active_replicas()
    }

    /// Number of replicas still streaming
    pub fn active_count(&self) -> usize {
        self.handle.shared.active.load(Ordering::Acquire)
    }

    /// Whether the replica with this connection is still streaming
    pub fn is_active(&self, id: ConnectionId) -> bool {
        self.index
            .get(&id)
            .map(|&idx| self.replicas[idx].active)
            .unwrap_or(false)
    }

    pub fn dump_addresses(&self) -> String {
        self.handle.dump_addresses()
    }

    pub fn send_cancel(&self) {
        self.handle.send_cancel()
    }

    /// Extra info of the last Data packet, if it was requested
    pub fn block_extra_info(&self) -> Option<&BlockExtraInfo> {
        self.block_extra_info.as_ref()
    }

    /// Push external tables to every active replica ahead of the query.
    ///
    /// A replica that fails to accept them is invalidated; the others still
    /// get the data. Fails only if no replica is left.
    pub async fn send_external_tables_data(&mut self, tables: &[ExternalTable]) -> Result<()> {
        if self.state != ReplicasState::Created {
            return Err(ReplicaError::Precondition(format!(
                "cannot send external tables in state {}",
                self.state
            )));
        }

        let mut last_error = None;
        for idx in self.active_indices() {
            self.sent_any = true;
            if let Err(e) = self.replicas[idx].entry.send_external_tables(tables).await {
                self.fail_replica(idx, &e).await;
                last_error = Some(e);
            }
        }

        if !self.has_active_replicas() {
            return Err(last_error.unwrap_or_else(|| {
                ReplicaError::Precondition("no active replicas".to_string())
            }));
        }
        Ok(())
    }

    /// Send the query to every active replica. May be called once.
    pub async fn send_query(
        &mut self,
        query: &str,
        query_id: &str,
        stage: QueryStage,
        with_pending_data: bool,
    ) -> Result<()> {
        match self.state {
            ReplicasState::Created => {}
            ReplicasState::QuerySent => {
                return Err(ReplicaError::Precondition("query already sent".to_string()))
            }
            ReplicasState::Disconnected => {
                return Err(ReplicaError::Precondition(
                    "replicas are disconnected".to_string(),
                ))
            }
        }

        let active = self.active_indices();
        if active.is_empty() {
            return Err(ReplicaError::Precondition("no active replicas".to_string()));
        }

        let request = QueryRequest {
            query: query.to_string(),
            query_id: query_id.to_string(),
            stage,
            with_pending_data,
            assignment: None,
        };
        let count = active.len();

        let mut last_error = None;
        self.sent_any = true;
        for (offset, idx) in active.into_iter().enumerate() {
            let result = if self.parallel_execution {
                let stamped = request.for_replica(offset, count);
                self.replicas[idx].entry.send_query(&stamped).await
            } else {
                self.replicas[idx].entry.send_query(&request).await
            };
            if let Err(e) = result {
                self.fail_replica(idx, &e).await;
                last_error = Some(e);
            }
        }

        self.state = ReplicasState::QuerySent;
        {
            let mut cancel = self.handle.shared.cancel.lock();
            cancel.query_sent = true;
            if cancel.cancelled {
                cancel.broadcast();
            }
        }

        if !self.has_active_replicas() {
            return Err(last_error.unwrap_or_else(|| {
                ReplicaError::Precondition("no active replicas".to_string())
            }));
        }
        tracing::debug!(
            "Sent query {:?} to {} replica(s)",
            query_id,
            self.active_count()
        );
        Ok(())
    }

    /// Receive one packet from whichever active replica is ready.
    ///
    /// EndOfStream and Exception retire the replica that sent them; the
    /// packet is still returned. A transport failure retires only that
    /// replica and reading goes on with the rest; on the last replica the
    /// error is returned.
    pub async fn receive_packet(&mut self) -> Result<Packet> {
        self.check_receivable()?;

        loop {
            if !self.has_active_replicas() {
                return Err(ReplicaError::Precondition(
                    "no more packets are available".to_string(),
                ));
            }

            let (idx, ready) = self.replica_for_reading().await;
            let received = match ready {
                Ok(()) => self.replicas[idx].entry.receive_packet().await,
                Err(e) => Err(e),
            };

            match received {
                Ok(packet) => return self.accept_packet(idx, packet).await,
                Err(e) => {
                    self.fail_replica(idx, &e).await;
                    if !self.has_active_replicas() {
                        return Err(e);
                    }
                }
            }
        }
    }

    /// Read and discard packets until every replica has finished.
    ///
    /// Returns EndOfStream if no replica raised an exception, otherwise the
    /// last Exception packet received. When the last replica then fails on
    /// the transport, that exception is still returned instead of the
    /// connection error.
    pub async fn drain(&mut self) -> Result<Packet> {
        self.check_receivable()?;

        let mut result = Packet::EndOfStream;
        while self.has_active_replicas() {
            let packet = match self.receive_packet().await {
                Ok(packet) => packet,
                Err(e) if e.is_connection_error() && matches!(result, Packet::Exception(_)) => {
                    tracing::debug!("Drain ended by a connection error after an exception: {}", e);
                    return Ok(result);
                }
                Err(e) => return Err(e),
            };
            match packet {
                Packet::Data { .. }
                | Packet::Progress(_)
                | Packet::ProfileInfo(_)
                | Packet::Log(_)
                | Packet::EndOfStream => {}
                Packet::Exception(_) => result = packet,
            }
        }
        Ok(result)
    }

    /// Tear down every registered connection. Terminal.
    pub async fn disconnect(&mut self) {
        for idx in 0..self.replicas.len() {
            self.replicas[idx].entry.disconnect().await;
            self.invalidate(idx);
        }
        self.state = ReplicasState::Disconnected;
    }

    fn check_receivable(&self) -> Result<()> {
        match self.state {
            ReplicasState::QuerySent => Ok(()),
            ReplicasState::Created => Err(ReplicaError::Precondition(
                "cannot receive packets: no query sent".to_string(),
            )),
            ReplicasState::Disconnected => Err(ReplicaError::Precondition(
                "cannot receive packets: replicas are disconnected".to_string(),
            )),
        }
    }

    fn active_indices(&self) -> Vec<usize> {
        self.replicas
            .iter()
            .enumerate()
            .filter(|(_, r)| r.active)
            .map(|(idx, _)| idx)
            .collect()
    }

    /// Pick a replica to read from, with its readiness outcome.
    ///
    /// Which of several ready replicas wins is unspecified.
    async fn replica_for_reading(&mut self) -> (usize, Result<()>) {
        let active = self.active_indices();
        if active.len() == 1 {
            return (active[0], Ok(()));
        }

        let waits = self
            .replicas
            .iter_mut()
            .enumerate()
            .filter(|(_, r)| r.active)
            .map(|(idx, r)| Box::pin(async move { (idx, r.entry.ready().await) }));

        let ((idx, ready), _, _) = select_all(waits).await;
        (idx, ready)
    }

    async fn accept_packet(&mut self, idx: usize, packet: Packet) -> Result<Packet> {
        match packet {
            Packet::Data { block, .. } => {
                if let Some(throttler) = &self.throttler {
                    throttler.add(block.get_array_memory_size() as u64).await?;
                }
                let extra_info = if self.append_extra_info {
                    let entry = &self.replicas[idx].entry;
                    let info = BlockExtraInfo {
                        replica_num: idx,
                        address: entry.address().to_string(),
                        is_local: entry.is_local(),
                    };
                    self.block_extra_info = Some(info.clone());
                    Some(info)
                } else {
                    None
                };
                Ok(Packet::Data { block, extra_info })
            }
            Packet::Progress(_) | Packet::ProfileInfo(_) | Packet::Log(_) => Ok(packet),
            Packet::EndOfStream => {
                self.invalidate(idx);
                Ok(Packet::EndOfStream)
            }
            Packet::Exception(mut exception) => {
                let entry = &mut self.replicas[idx].entry;
                if exception.address.is_none() {
                    exception.address = Some(entry.address().to_string());
                }
                tracing::warn!("Replica {} raised exception: {}", entry.address(), exception);
                entry.disconnect().await;
                self.invalidate(idx);
                Ok(Packet::Exception(exception))
            }
        }
    }

    async fn fail_replica(&mut self, idx: usize, error: &ReplicaError) {
        let entry = &mut self.replicas[idx].entry;
        tracing::warn!("Invalidating replica {}: {}", entry.address(), error);
        entry.disconnect().await;
        self.invalidate(idx);
    }

    fn invalidate(&mut self, idx: usize) {
        let replica = &mut self.replicas[idx];
        if replica.active {
            replica.active = false;
            self.handle.shared.active.fetch_sub(1, Ordering::AcqRel);
        }
    }
}

impl Drop for ParallelReplicas {
    fn drop(&mut self) {
        if self.state == ReplicasState::Disconnected || !self.sent_any {
            return;
        }
        // Connections with unread replies or a half-sent query cannot be reused.
        for replica in self.replicas.iter_mut().filter(|r| r.active) {
            tracing::warn!(
                "Replica {} dropped mid-query, not returning it to the pool",
                replica.entry.address()
            );
            replica.entry.mark_broken();
        }
    }
}
