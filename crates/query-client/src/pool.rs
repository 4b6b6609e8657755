//! Connection leasing
//!
//! A [`PoolEntry`] owns its connection exclusively for as long as it lives
//! and hands it back to the pool it came from when dropped.

use crate::config::{PoolMode, ReplicaSettings};
use crate::connection::Connection;
use crate::error::{ReplicaError, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;

/// Receiver of released connections
pub trait PoolReturn: Send + Sync {
    fn release(&self, connection: Box<dyn Connection>);
}

/// Exclusive lease on one connection
pub struct PoolEntry {
    /// Always `Some` until the entry is dropped or detached
    connection: Option<Box<dyn Connection>>,
    home: Option<Arc<dyn PoolReturn>>,
}

impl PoolEntry {
    /// Lease that returns the connection to `home` on drop
    pub fn new(connection: Box<dyn Connection>, home: Arc<dyn PoolReturn>) -> Self {
        Self {
            connection: Some(connection),
            home: Some(home),
        }
    }

    /// Wrap a connection that does not belong to any pool
    pub fn unpooled(connection: Box<dyn Connection>) -> Self {
        Self {
            connection: Some(connection),
            home: None,
        }
    }

    pub fn is_pooled(&self) -> bool {
        self.home.is_some()
    }

    /// Drop the connection on release instead of returning it to the pool
    pub fn mark_broken(&mut self) {
        self.home = None;
    }

    /// Take the connection out without returning it to the pool
    pub fn detach(mut self) -> Box<dyn Connection> {
        self.home = None;
        self.connection
            .take()
            .expect("pool entry holds a connection until dropped")
    }
}

impl Deref for PoolEntry {
    type Target = dyn Connection;

    fn deref(&self) -> &Self::Target {
        self.connection
            .as_deref()
            .expect("pool entry holds a connection until dropped")
    }
}

impl DerefMut for PoolEntry {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.connection
            .as_deref_mut()
            .expect("pool entry holds a connection until dropped")
    }
}

impl Drop for PoolEntry {
    fn drop(&mut self) {
        if let (Some(connection), Some(home)) = (self.connection.take(), self.home.take()) {
            home.release(connection);
        }
    }
}

/// Source of leased connections
#[async_trait]
pub trait ConnectionPool: Send + Sync {
    /// Lease a single connection
    async fn get(&self, settings: &ReplicaSettings) -> Result<PoolEntry>;

    /// Lease as many connections as `mode` asks for, at least one
    async fn get_many(&self, settings: &ReplicaSettings, mode: PoolMode)
        -> Result<Vec<PoolEntry>>;
}

/// Pool over a fixed set of already established connections
pub struct FixedPool {
    inner: Arc<FixedPoolInner>,
}

struct FixedPoolInner {
    idle: Mutex<VecDeque<Box<dyn Connection>>>,
}

impl PoolReturn for FixedPoolInner {
    fn release(&self, connection: Box<dyn Connection>) {
        if connection.is_connected() {
            self.idle.lock().push_back(connection);
        } else {
            tracing::debug!(
                "Dropping disconnected connection to {} instead of pooling it",
                connection.address()
            );
        }
    }
}

impl FixedPool {
    /// Create a pool owning the given connections
    pub fn new(connections: Vec<Box<dyn Connection>>) -> Self {
        Self {
            inner: Arc::new(FixedPoolInner {
                idle: Mutex::new(connections.into_iter().collect()),
            }),
        }
    }

    /// Number of connections currently available for leasing
    pub fn idle_count(&self) -> usize {
        self.inner.idle.lock().len()
    }

    fn lease(&self, connection: Box<dyn Connection>) -> PoolEntry {
        let home: Arc<dyn PoolReturn> = self.inner.clone();
        PoolEntry::new(connection, home)
    }
}

#[async_trait]
impl ConnectionPool for FixedPool {
    async fn get(&self, _settings: &ReplicaSettings) -> Result<PoolEntry> {
        let connection = self
            .inner
            .idle
            .lock()
            .pop_front()
            .ok_or(ReplicaError::NoConnectionAvailable)?;
        Ok(self.lease(connection))
    }

    async fn get_many(
        &self,
        settings: &ReplicaSettings,
        mode: PoolMode,
    ) -> Result<Vec<PoolEntry>> {
        let wanted = match mode {
            PoolMode::GetOne => 1,
            PoolMode::GetMany => settings.max_parallel_replicas.max(1),
            PoolMode::GetAll => usize::MAX,
        };

        let connections: Vec<Box<dyn Connection>> = {
            let mut idle = self.inner.idle.lock();
            let n = wanted.min(idle.len());
            idle.drain(..n).collect()
        };

        if connections.is_empty() {
            return Err(ReplicaError::NoConnectionAvailable);
        }

        Ok(connections.into_iter().map(|c| self.lease(c)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::ChannelConnection;

    fn pool_of(n: usize) -> FixedPool {
        let connections = (0..n)
            .map(|i| {
                let (conn, _endpoint) = ChannelConnection::new(format!("r{}:9000", i));
                Box::new(conn) as Box<dyn Connection>
            })
            .collect();
        FixedPool::new(connections)
    }

    #[tokio::test]
    async fn test_entry_returns_on_drop() {
        let pool = pool_of(2);
        let settings = ReplicaSettings::default();

        let entry = pool.get(&settings).await.unwrap();
        assert!(entry.is_pooled());
        assert_eq!(entry.address(), "r0:9000");
        assert_eq!(pool.idle_count(), 1);

        drop(entry);
        assert_eq!(pool.idle_count(), 2);
    }

    #[tokio::test]
    async fn test_get_many_modes() {
        let pool = pool_of(4);
        let settings = ReplicaSettings::default().with_max_parallel_replicas(3);

        let one = pool.get_many(&settings, PoolMode::GetOne).await.unwrap();
        assert_eq!(one.len(), 1);
        drop(one);

        let many = pool.get_many(&settings, PoolMode::GetMany).await.unwrap();
        assert_eq!(many.len(), 3);
        drop(many);

        let all = pool.get_many(&settings, PoolMode::GetAll).await.unwrap();
        assert_eq!(all.len(), 4);
        assert!(matches!(
            pool.get_many(&settings, PoolMode::GetOne).await,
            Err(ReplicaError::NoConnectionAvailable)
        ));
    }

    #[tokio::test]
    async fn test_disconnected_connection_is_not_pooled() {
        let pool = pool_of(1);
        let mut entry = pool.get(&ReplicaSettings::default()).await.unwrap();
        entry.disconnect().await;
        drop(entry);

        assert_eq!(pool.idle_count(), 0);
    }

    #[tokio::test]
    async fn test_detach_keeps_connection_out_of_pool() {
        let pool = pool_of(1);
        let entry = pool.get(&ReplicaSettings::default()).await.unwrap();
        let connection = entry.detach();

        assert_eq!(connection.address(), "r0:9000");
        assert_eq!(pool.idle_count(), 0);
    }
}
