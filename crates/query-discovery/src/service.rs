//! Cluster discovery service
//!
//! Every non-observer process registers an ephemeral node
//! `<cluster root>/<node uuid>` holding its `host:port` and watches the child
//! list of each configured cluster. A single background worker turns watch
//! notifications and a periodic tick into refreshed [`TopologySnapshot`]s.
//!
//! Watch callbacks never touch cluster state: they mark the cluster in
//! [`PendingUpdates`] and wake the worker. When a node goes away its
//! ephemeral node disappears with its session, the watch fires on the other
//! members and they republish without it.

use crate::config::DiscoveryConfig;
use crate::coordination::{child_path, CoordinationService, WatchCallback, WatchEvent};
use crate::error::{DiscoveryError, Result};
use crate::pending::PendingUpdates;
use crate::topology::{TopologyRegistry, TopologySnapshot};
use crate::types::{NodeAddress, NodeId, NodeInfo, NodesInfo};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

/// Whether freshly fetched members differ from the known ones.
///
/// True iff the member names differ or a shared member changed its address.
pub fn need_update(known: &NodesInfo, fresh: &NodesInfo) -> bool {
    if known.len() != fresh.len() {
        return true;
    }
    fresh.iter().any(|(name, info)| match known.get(name) {
        Some(current) => current.address != info.address,
        None => true,
    })
}

struct ClusterInfo {
    name: String,
    root: String,
    observer: bool,
    /// Members of the last published snapshot
    nodes: NodesInfo,
    root_ready: bool,
    registered: bool,
    /// Set while a child watch on `root` is pending
    watch_armed: Arc<AtomicBool>,
}

struct Inner {
    coordination: Arc<dyn CoordinationService>,
    registry: Arc<TopologyRegistry>,
    /// Fixed at construction; each cluster is refreshed under its own lock
    clusters: HashMap<String, tokio::sync::Mutex<ClusterInfo>>,
    pending: Arc<PendingUpdates>,
    node_id: NodeId,
    address: NodeAddress,
    refresh_interval: Duration,
    operation_timeout: Duration,
    started: AtomicBool,
    stop: AtomicBool,
}

/// Keeps the published topology of the configured clusters up to date
pub struct ClusterDiscovery {
    inner: Arc<Inner>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl ClusterDiscovery {
    /// Create the service; nothing touches the coordination service until
    /// [`start`](Self::start) or [`update_cluster`](Self::update_cluster)
    pub fn new(
        config: DiscoveryConfig,
        coordination: Arc<dyn CoordinationService>,
        registry: Arc<TopologyRegistry>,
    ) -> Result<Self> {
        config.validate()?;

        let node_id = config
            .node_id
            .map(NodeId::from_uuid)
            .unwrap_or_default();
        let address = NodeAddress::new(config.host.clone(), config.port);

        let clusters = config
            .clusters
            .iter()
            .map(|c| {
                let info = ClusterInfo {
                    name: c.name.clone(),
                    root: c.path.trim_end_matches('/').to_string(),
                    observer: c.observer,
                    nodes: NodesInfo::new(),
                    root_ready: false,
                    registered: false,
                    watch_armed: Arc::new(AtomicBool::new(false)),
                };
                (c.name.clone(), tokio::sync::Mutex::new(info))
            })
            .collect();

        tracing::info!(
            "Cluster discovery for {} as {} ({} cluster(s))",
            address,
            node_id,
            config.clusters.len()
        );

        Ok(Self {
            inner: Arc::new(Inner {
                coordination,
                registry,
                clusters,
                pending: Arc::new(PendingUpdates::new()),
                node_id,
                address,
                refresh_interval: config.refresh_interval(),
                operation_timeout: config.operation_timeout(),
                started: AtomicBool::new(false),
                stop: AtomicBool::new(false),
            }),
            worker: Mutex::new(None),
        })
    }

    pub fn node_id(&self) -> NodeId {
        self.inner.node_id
    }

    pub fn address(&self) -> &NodeAddress {
        &self.inner.address
    }

    pub fn registry(&self) -> &Arc<TopologyRegistry> {
        &self.inner.registry
    }

    /// Latest published snapshot of a cluster
    pub fn snapshot(&self, cluster: &str) -> Option<Arc<TopologySnapshot>> {
        self.inner.registry.get(cluster)
    }

    /// Configured cluster names, sorted
    pub fn cluster_names(&self) -> Vec<String> {
        self.inner.cluster_names()
    }

    pub fn is_running(&self) -> bool {
        self.inner.started.load(Ordering::Acquire) && !self.inner.stop.load(Ordering::Acquire)
    }

    /// Register in every cluster, publish the initial topology and start the
    /// background worker.
    ///
    /// A cluster whose first refresh fails is logged and left to the worker.
    pub async fn start(&self) -> Result<()> {
        if self.inner.stop.load(Ordering::Acquire) {
            return Err(DiscoveryError::Stopped);
        }
        if self.inner.started.swap(true, Ordering::AcqRel) {
            return Err(DiscoveryError::AlreadyStarted);
        }

        for name in self.inner.cluster_names() {
            self.inner.refresh_logged(&name).await;
        }

        let inner = self.inner.clone();
        let handle = tokio::spawn(async move { inner.run().await });
        *self.worker.lock() = Some(handle);
        Ok(())
    }

    /// Refresh one cluster now. Returns whether a new snapshot was published.
    pub async fn update_cluster(&self, name: &str) -> Result<bool> {
        self.inner.refresh(name).await
    }

    /// Stop the worker, then remove this node from every cluster.
    ///
    /// Safe to call without `start` and more than once.
    pub async fn shutdown(&self) {
        if self.inner.stop.swap(true, Ordering::AcqRel) {
            return;
        }
        self.inner.pending.wake();

        let handle = self.worker.lock().take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                tracing::warn!("Cluster discovery worker ended abnormally: {}", e);
            }
        }

        self.inner.leave_clusters().await;
        tracing::info!("Cluster discovery stopped");
    }
}

impl Drop for ClusterDiscovery {
    fn drop(&mut self) {
        let already_stopped = self.inner.stop.swap(true, Ordering::AcqRel);
        self.inner.pending.wake();
        if let Some(handle) = self.worker.get_mut().take() {
            handle.abort();
        }
        if already_stopped {
            return;
        }

        // Dropped without shutdown: leave the clusters in the background.
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                let inner = self.inner.clone();
                runtime.spawn(async move { inner.leave_clusters().await });
            }
            Err(_) => {
                if self.inner.may_be_registered() {
                    tracing::warn!(
                        "Cluster discovery dropped outside a runtime, {} stays registered until its session ends",
                        self.inner.node_id
                    );
                }
            }
        }
    }
}

impl Inner {
    fn cluster_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.clusters.keys().cloned().collect();
        names.sort();
        names
    }

    fn stopped(&self) -> bool {
        self.stop.load(Ordering::Acquire)
    }

    /// Best-effort removal of this node's entries; each removal is bounded
    /// by the operation timeout.
    async fn leave_clusters(&self) {
        for cluster in self.clusters.values() {
            let mut info = cluster.lock().await;
            if !info.registered {
                continue;
            }
            let path = child_path(&info.root, &self.node_id.child_name());
            match self.call(self.coordination.remove(&path)).await {
                Ok(()) => tracing::info!("Left cluster {}", info.name),
                Err(e) => tracing::warn!("Failed to leave cluster {}: {}", info.name, e),
            }
            info.registered = false;
        }
    }

    /// A cluster locked by someone else counts as registered
    fn may_be_registered(&self) -> bool {
        self.clusters
            .values()
            .any(|cluster| cluster.try_lock().map(|info| info.registered).unwrap_or(true))
    }

    async fn run(&self) {
        tracing::info!("Cluster discovery worker started");
        let mut ticker = tokio::time::interval_at(
            Instant::now() + self.refresh_interval,
            self.refresh_interval,
        );
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        while !self.stopped() {
            if self.pending.take_session_expired() {
                self.recover_session().await;
            }

            for name in self.pending.take() {
                if self.stopped() {
                    break;
                }
                self.refresh_logged(&name).await;
            }

            if self.stopped() {
                break;
            }

            tokio::select! {
                _ = self.pending.wait() => {}
                _ = ticker.tick() => {
                    self.pending.insert_all(self.clusters.keys().map(String::as_str));
                }
            }
        }
        tracing::info!("Cluster discovery worker stopped");
    }

    async fn refresh_logged(&self, name: &str) {
        match self.refresh(name).await {
            Ok(true) => {}
            Ok(false) => tracing::debug!("Cluster {} unchanged", name),
            Err(DiscoveryError::SessionExpired) => {
                tracing::warn!("Session expired while refreshing cluster {}", name);
                self.pending.mark(name);
                self.pending.mark_session_expired();
            }
            Err(e) => tracing::warn!("Failed to update cluster {}: {}", name, e),
        }
    }

    async fn recover_session(&self) {
        tracing::warn!("Coordination session expired, reconnecting");
        if let Err(e) = self.call(self.coordination.reconnect()).await {
            tracing::warn!("Failed to reconnect to coordination service: {}", e);
            self.pending.defer_session_recovery();
            return;
        }

        for cluster in self.clusters.values() {
            let mut info = cluster.lock().await;
            info.registered = false;
            info.watch_armed.store(false, Ordering::Release);
        }
        self.pending
            .insert_all(self.clusters.keys().map(String::as_str));
        tracing::info!("Reconnected to coordination service");
    }

    /// Bound a coordination call by the operation timeout
    async fn call<T>(&self, op: impl Future<Output = Result<T>>) -> Result<T> {
        match tokio::time::timeout(self.operation_timeout, op).await {
            Ok(result) => result,
            Err(_) => Err(DiscoveryError::Timeout(
                self.operation_timeout.as_millis() as u64,
            )),
        }
    }

    async fn refresh(&self, name: &str) -> Result<bool> {
        let cluster = self
            .clusters
            .get(name)
            .ok_or_else(|| DiscoveryError::UnknownCluster(name.to_string()))?;
        let mut info = cluster.lock().await;

        if !info.root_ready {
            self.call(self.coordination.create_ancestors(&info.root))
                .await?;
            info.root_ready = true;
        }
        if !info.observer && !info.registered {
            self.register(&mut info).await?;
        }
        self.update(&mut info).await
    }

    async fn register(&self, info: &mut ClusterInfo) -> Result<()> {
        let path = child_path(&info.root, &self.node_id.child_name());
        self.call(
            self.coordination
                .create_ephemeral(&path, &self.address.to_payload()),
        )
        .await?;
        info.registered = true;
        tracing::info!(
            "Registered {} in cluster {} as {}",
            self.address,
            info.name,
            path
        );
        Ok(())
    }

    /// One-shot watch for the cluster's child list, unless one is pending
    fn arm_watch(&self, info: &ClusterInfo) -> Option<WatchCallback> {
        if info.watch_armed.swap(true, Ordering::AcqRel) {
            return None;
        }
        let armed = info.watch_armed.clone();
        let pending = self.pending.clone();
        let name = info.name.clone();
        Some(Box::new(move |event: WatchEvent| {
            armed.store(false, Ordering::Release);
            match event {
                WatchEvent::ChildrenChanged { .. } => pending.mark(&name),
                WatchEvent::SessionExpired => pending.mark_session_expired(),
            }
        }))
    }

    async fn update(&self, info: &mut ClusterInfo) -> Result<bool> {
        let watch = self.arm_watch(info);
        let armed_here = watch.is_some();
        let (names, version) = match self
            .call(self.coordination.list_children(&info.root, watch))
            .await
        {
            Ok(listed) => listed,
            Err(e) => {
                if armed_here {
                    info.watch_armed.store(false, Ordering::Release);
                }
                return Err(e);
            }
        };

        let fresh = self.fetch_nodes(&info.root, &names).await?;
        let published = self.registry.get(&info.name).is_some();
        if published && !need_update(&info.nodes, &fresh) {
            return Ok(false);
        }

        let (_, current) = self
            .call(self.coordination.list_children(&info.root, None))
            .await?;
        if current != version {
            // The armed watch already scheduled another refresh.
            tracing::debug!(
                "Members of cluster {} changed while fetching, skipping publish",
                info.name
            );
            return Ok(false);
        }

        let snapshot = self.registry.publish(&info.name, &fresh);
        info.nodes = fresh;
        tracing::info!(
            "Published cluster {} v{} with {} node(s): [{}]",
            info.name,
            snapshot.version(),
            snapshot.len(),
            snapshot.addresses().join(", ")
        );
        Ok(true)
    }

    /// Read and parse member payloads; unreadable members are skipped
    async fn fetch_nodes(&self, root: &str, names: &[String]) -> Result<NodesInfo> {
        let mut nodes = NodesInfo::with_capacity(names.len());
        for name in names {
            let path = child_path(root, name);
            let payload = match self.call(self.coordination.get_data(&path)).await? {
                Some(payload) => payload,
                None => {
                    tracing::debug!("Node {} disappeared while fetching", path);
                    continue;
                }
            };
            match NodeAddress::from_payload(&payload) {
                Ok(address) => {
                    nodes.insert(name.clone(), NodeInfo::new(address));
                }
                Err(e) => tracing::warn!("Skipping node {}: {}", path, e),
            }
        }
        Ok(nodes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ClusterConfig;
    use crate::memory::MemoryCoordination;
    use async_trait::async_trait;

    const ROOT: &str = "/discovery/c1";

    fn nodes(entries: &[(&str, &str)]) -> NodesInfo {
        entries
            .iter()
            .map(|(name, addr)| (name.to_string(), NodeInfo::new(addr.parse().unwrap())))
            .collect()
    }

    fn config(host: &str, observer: bool) -> DiscoveryConfig {
        DiscoveryConfig::default()
            .with_address(host, 9000)
            .with_cluster(ClusterConfig::new("c1", ROOT).with_observer(observer))
            .with_refresh_interval(Duration::from_millis(50))
            .with_operation_timeout(Duration::from_millis(500))
    }

    fn service(zk: &Arc<MemoryCoordination>, host: &str, observer: bool) -> ClusterDiscovery {
        let coordination: Arc<dyn CoordinationService> = zk.clone();
        ClusterDiscovery::new(
            config(host, observer),
            coordination,
            Arc::new(TopologyRegistry::new()),
        )
        .unwrap()
    }

    async fn wait_for(mut condition: impl FnMut() -> bool) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !condition() {
            assert!(Instant::now() < deadline, "condition not reached in time");
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    #[test]
    fn test_need_update() {
        let known = nodes(&[("n1", "h1:9000"), ("n2", "h2:9000")]);
        assert!(!need_update(&known, &known.clone()));
        assert!(need_update(&known, &nodes(&[("n1", "h1:9000"), ("n2", "h2:9001")])));
        assert!(need_update(&known, &nodes(&[("n1", "h1:9000")])));
        assert!(need_update(&known, &nodes(&[("n1", "h1:9000"), ("n3", "h2:9000")])));
        assert!(!need_update(&NodesInfo::new(), &NodesInfo::new()));
    }

    #[tokio::test]
    async fn test_refresh_publishes_only_changes() {
        let zk = Arc::new(MemoryCoordination::new());
        zk.set_persistent("/discovery/c1/n1", b"h1:9000").unwrap();
        zk.set_persistent("/discovery/c1/n2", b"h2:9000").unwrap();
        let discovery = service(&zk, "observer", true);

        assert!(discovery.update_cluster("c1").await.unwrap());
        let first = discovery.snapshot("c1").unwrap();
        assert_eq!(first.addresses(), vec!["h1:9000", "h2:9000"]);

        assert!(!discovery.update_cluster("c1").await.unwrap());
        assert!(Arc::ptr_eq(&first, &discovery.snapshot("c1").unwrap()));

        zk.set_persistent("/discovery/c1/n2", b"h2:9001").unwrap();
        assert!(discovery.update_cluster("c1").await.unwrap());
        let third = discovery.snapshot("c1").unwrap();
        assert!(!Arc::ptr_eq(&first, &third));
        assert_eq!(third.addresses(), vec!["h1:9000", "h2:9001"]);
        assert_eq!(third.version(), first.version() + 1);
        // the first snapshot was not touched
        assert_eq!(first.addresses(), vec!["h1:9000", "h2:9000"]);
    }

    #[tokio::test]
    async fn test_empty_cluster_is_published() {
        let zk = Arc::new(MemoryCoordination::new());
        let discovery = service(&zk, "observer", true);

        assert!(discovery.update_cluster("c1").await.unwrap());
        assert!(discovery.snapshot("c1").unwrap().is_empty());
        assert!(zk.exists(ROOT));
    }

    #[tokio::test]
    async fn test_malformed_payload_is_skipped() {
        let zk = Arc::new(MemoryCoordination::new());
        zk.set_persistent("/discovery/c1/n1", b"h1:9000").unwrap();
        zk.set_persistent("/discovery/c1/bad", b"not an address").unwrap();
        let discovery = service(&zk, "observer", true);

        assert!(discovery.update_cluster("c1").await.unwrap());
        let snapshot = discovery.snapshot("c1").unwrap();
        assert_eq!(snapshot.len(), 1);
        assert!(snapshot.contains("n1"));
        assert!(!snapshot.contains("bad"));
    }

    #[tokio::test]
    async fn test_unknown_cluster() {
        let zk = Arc::new(MemoryCoordination::new());
        let discovery = service(&zk, "h1", false);

        assert!(matches!(
            discovery.update_cluster("nope").await,
            Err(DiscoveryError::UnknownCluster(_))
        ));
    }

    #[tokio::test]
    async fn test_start_registers_and_publishes() {
        let zk = Arc::new(MemoryCoordination::new());
        let discovery = service(&zk, "h1", false);
        discovery.start().await.unwrap();
        assert!(discovery.is_running());

        let own_path = child_path(ROOT, &discovery.node_id().child_name());
        assert!(zk.exists(&own_path));
        let snapshot = discovery.snapshot("c1").unwrap();
        assert_eq!(snapshot.addresses(), vec!["h1:9000"]);
        assert!(snapshot.contains(&discovery.node_id().child_name()));

        assert!(matches!(
            discovery.start().await,
            Err(DiscoveryError::AlreadyStarted)
        ));

        discovery.shutdown().await;
        assert!(!zk.exists(&own_path));
        assert!(!discovery.is_running());
    }

    #[tokio::test]
    async fn test_drop_without_shutdown_leaves_cluster() {
        let zk = Arc::new(MemoryCoordination::new());
        let discovery = service(&zk, "h1", false);
        discovery.start().await.unwrap();
        let own_path = child_path(ROOT, &discovery.node_id().child_name());
        assert!(zk.exists(&own_path));

        drop(discovery);
        wait_for(|| !zk.exists(&own_path)).await;
    }

    #[test]
    fn test_drop_outside_runtime_keeps_registration() {
        let zk = Arc::new(MemoryCoordination::new());
        let runtime = tokio::runtime::Runtime::new().unwrap();
        let discovery = service(&zk, "h1", false);
        runtime.block_on(discovery.update_cluster("c1")).unwrap();
        let own_path = child_path(ROOT, &discovery.node_id().child_name());

        drop(discovery);
        assert!(zk.exists(&own_path));
    }

    #[tokio::test]
    async fn test_observer_does_not_register() {
        let zk = Arc::new(MemoryCoordination::new());
        zk.set_persistent("/discovery/c1/n1", b"h1:9000").unwrap();
        let discovery = service(&zk, "observer", true);
        discovery.start().await.unwrap();

        let (children, _) = zk.list_children(ROOT, None).await.unwrap();
        assert_eq!(children, vec!["n1".to_string()]);
        assert_eq!(discovery.snapshot("c1").unwrap().len(), 1);
        discovery.shutdown().await;
    }

    #[tokio::test]
    async fn test_members_see_each_other_join_and_leave() {
        let zk = Arc::new(MemoryCoordination::new());
        let a = service(&zk, "h1", false);
        let b = {
            let coordination: Arc<dyn CoordinationService> = Arc::new(zk.new_session());
            ClusterDiscovery::new(
                config("h2", false),
                coordination,
                Arc::new(TopologyRegistry::new()),
            )
            .unwrap()
        };

        a.start().await.unwrap();
        b.start().await.unwrap();

        wait_for(|| a.snapshot("c1").map(|s| s.len()) == Some(2)).await;
        assert_eq!(
            a.snapshot("c1").unwrap().addresses(),
            vec!["h1:9000", "h2:9000"]
        );
        assert_eq!(b.snapshot("c1").unwrap().len(), 2);

        b.shutdown().await;
        wait_for(|| a.snapshot("c1").map(|s| s.len()) == Some(1)).await;
        assert_eq!(a.snapshot("c1").unwrap().addresses(), vec!["h1:9000"]);

        a.shutdown().await;
    }

    #[tokio::test]
    async fn test_tick_picks_up_address_change() {
        let zk = Arc::new(MemoryCoordination::new());
        zk.set_persistent("/discovery/c1/n1", b"h1:9000").unwrap();
        let discovery = service(&zk, "observer", true);
        discovery.start().await.unwrap();

        // data changes do not fire child watches, only the tick sees them
        zk.set_persistent("/discovery/c1/n1", b"h1:9100").unwrap();
        wait_for(|| {
            discovery
                .snapshot("c1")
                .map(|s| s.addresses() == vec!["h1:9100".to_string()])
                .unwrap_or(false)
        })
        .await;
        discovery.shutdown().await;
    }

    #[tokio::test]
    async fn test_session_expiry_reregisters() {
        let zk = Arc::new(MemoryCoordination::new());
        let discovery = service(&zk, "h1", false);
        discovery.start().await.unwrap();
        let own_path = child_path(ROOT, &discovery.node_id().child_name());
        let first_session = zk.session_id();

        zk.expire_session();
        assert!(!zk.exists(&own_path));

        wait_for(|| zk.exists(&own_path)).await;
        assert_ne!(zk.session_id(), first_session);
        wait_for(|| discovery.snapshot("c1").map(|s| s.len()) == Some(1)).await;

        discovery.shutdown().await;
        assert!(!zk.exists(&own_path));
    }

    #[tokio::test]
    async fn test_shutdown_without_start() {
        let zk = Arc::new(MemoryCoordination::new());
        let discovery = service(&zk, "h1", false);

        discovery.shutdown().await;
        discovery.shutdown().await;
        assert!(matches!(discovery.start().await, Err(DiscoveryError::Stopped)));
        assert!(!zk.exists(ROOT));
    }

    /// Coordination service whose child listing never answers
    struct StalledCoordination;

    #[async_trait]
    impl CoordinationService for StalledCoordination {
        async fn create_ancestors(&self, _path: &str) -> Result<()> {
            Ok(())
        }

        async fn create_ephemeral(&self, _path: &str, _data: &[u8]) -> Result<()> {
            Ok(())
        }

        async fn remove(&self, _path: &str) -> Result<()> {
            Ok(())
        }

        async fn list_children(
            &self,
            _path: &str,
            _watch: Option<WatchCallback>,
        ) -> Result<(Vec<String>, i64)> {
            std::future::pending().await
        }

        async fn get_data(&self, _path: &str) -> Result<Option<Vec<u8>>> {
            Ok(None)
        }

        async fn reconnect(&self) -> Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_operation_timeout() {
        let discovery = ClusterDiscovery::new(
            config("h1", false).with_operation_timeout(Duration::from_millis(50)),
            Arc::new(StalledCoordination),
            Arc::new(TopologyRegistry::new()),
        )
        .unwrap();

        assert!(matches!(
            discovery.update_cluster("c1").await,
            Err(DiscoveryError::Timeout(50))
        ));
        assert!(discovery.snapshot("c1").is_none());

        // a stalled service does not hold up shutdown
        discovery.start().await.unwrap();
        tokio::time::timeout(Duration::from_secs(5), discovery.shutdown())
            .await
            .unwrap();
    }

    #[test]
    fn test_invalid_config_rejected() {
        let zk: Arc<dyn CoordinationService> = Arc::new(MemoryCoordination::new());
        let result = ClusterDiscovery::new(
            DiscoveryConfig::default().with_cluster(ClusterConfig::new("c1", "relative")),
            zk,
            Arc::new(TopologyRegistry::new()),
        );
        assert!(matches!(result, Err(DiscoveryError::Config(_))));
    }
}
