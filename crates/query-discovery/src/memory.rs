//! In-process coordination service
//!
//! A node tree shared by any number of sessions. Each [`MemoryCoordination`]
//! handle is one client session; [`MemoryCoordination::new_session`] opens
//! another one on the same tree, so several discovery services can be run
//! against each other in one process.

use crate::coordination::{CoordinationService, WatchCallback, WatchEvent};
use crate::error::{DiscoveryError, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

#[derive(Debug, Default)]
struct Node {
    data: Vec<u8>,
    /// Owning session for ephemeral nodes
    owner: Option<u64>,
    children: BTreeSet<String>,
    /// Bumped on every change of `children`
    cversion: i64,
}

struct PendingWatch {
    session: u64,
    callback: WatchCallback,
}

type Fired = Vec<(WatchCallback, WatchEvent)>;

struct Tree {
    nodes: HashMap<String, Node>,
    /// Child watches by path
    watches: HashMap<String, Vec<PendingWatch>>,
    next_session: u64,
}

impl Tree {
    fn new() -> Self {
        let mut nodes = HashMap::new();
        nodes.insert("/".to_string(), Node::default());
        Self {
            nodes,
            watches: HashMap::new(),
            next_session: 1,
        }
    }

    fn open_session(&mut self) -> u64 {
        let id = self.next_session;
        self.next_session += 1;
        id
    }

    fn children_changed(&mut self, parent: &str, fired: &mut Fired) {
        if let Some(watches) = self.watches.remove(parent) {
            for watch in watches {
                fired.push((
                    watch.callback,
                    WatchEvent::ChildrenChanged {
                        path: parent.to_string(),
                    },
                ));
            }
        }
    }

    fn insert(&mut self, path: &str, node: Node, fired: &mut Fired) -> Result<()> {
        let (parent, name) = split_path(path)?;
        let parent_node = self
            .nodes
            .get_mut(parent)
            .ok_or_else(|| DiscoveryError::NoNode(parent.to_string()))?;
        if parent_node.owner.is_some() {
            return Err(DiscoveryError::Coordination(format!(
                "ephemeral node {} cannot have children",
                parent
            )));
        }
        parent_node.children.insert(name.to_string());
        parent_node.cversion += 1;
        self.nodes.insert(path.to_string(), node);
        self.children_changed(parent, fired);
        Ok(())
    }

    /// Create or overwrite `path` with the given owner
    fn put(&mut self, path: &str, data: &[u8], owner: Option<u64>, fired: &mut Fired) -> Result<()> {
        if let Some(node) = self.nodes.get_mut(path) {
            if owner.is_some() && !node.children.is_empty() {
                return Err(DiscoveryError::Coordination(format!(
                    "node {} has children",
                    path
                )));
            }
            node.data = data.to_vec();
            node.owner = owner;
            return Ok(());
        }
        let node = Node {
            data: data.to_vec(),
            owner,
            ..Node::default()
        };
        self.insert(path, node, fired)
    }

    fn delete(&mut self, path: &str, fired: &mut Fired) -> Result<()> {
        let node = match self.nodes.get(path) {
            Some(node) => node,
            None => return Ok(()),
        };
        if !node.children.is_empty() {
            return Err(DiscoveryError::Coordination(format!(
                "node {} has children",
                path
            )));
        }
        let (parent, name) = split_path(path)?;
        self.nodes.remove(path);
        if let Some(parent_node) = self.nodes.get_mut(parent) {
            parent_node.children.remove(name);
            parent_node.cversion += 1;
        }
        self.children_changed(parent, fired);
        Ok(())
    }
}

fn split_path(path: &str) -> Result<(&str, &str)> {
    if !path.starts_with('/') || path.len() < 2 || path.ends_with('/') {
        return Err(DiscoveryError::Coordination(format!("invalid path {:?}", path)));
    }
    match path.rsplit_once('/') {
        Some(("", name)) => Ok(("/", name)),
        Some((parent, name)) if !name.is_empty() => Ok((parent, name)),
        _ => Err(DiscoveryError::Coordination(format!("invalid path {:?}", path))),
    }
}

fn fire(fired: Fired) {
    for (callback, event) in fired {
        callback(event);
    }
}

#[derive(Debug, Clone, Copy)]
struct Session {
    id: u64,
    expired: bool,
}

/// One session on an in-process coordination tree
pub struct MemoryCoordination {
    tree: Arc<Mutex<Tree>>,
    session: Mutex<Session>,
}

impl MemoryCoordination {
    /// Create an empty tree with one session on it
    pub fn new() -> Self {
        let mut tree = Tree::new();
        let id = tree.open_session();
        Self {
            tree: Arc::new(Mutex::new(tree)),
            session: Mutex::new(Session { id, expired: false }),
        }
    }

    /// Open another session on the same tree
    pub fn new_session(&self) -> Self {
        let id = self.tree.lock().open_session();
        Self {
            tree: self.tree.clone(),
            session: Mutex::new(Session { id, expired: false }),
        }
    }

    pub fn session_id(&self) -> u64 {
        self.session.lock().id
    }

    fn live_session(&self) -> Result<u64> {
        let session = *self.session.lock();
        if session.expired {
            return Err(DiscoveryError::SessionExpired);
        }
        Ok(session.id)
    }

    /// Create or overwrite a persistent node, creating its ancestors
    pub fn set_persistent(&self, path: &str, data: &[u8]) -> Result<()> {
        let mut fired = Vec::new();
        let result = {
            let mut tree = self.tree.lock();
            split_path(path).and_then(|(parent, _)| {
                Self::ensure_ancestors(&mut tree, parent, &mut fired)?;
                tree.put(path, data, None, &mut fired)
            })
        };
        fire(fired);
        result
    }

    pub fn exists(&self, path: &str) -> bool {
        self.tree.lock().nodes.contains_key(path)
    }

    /// Expire this session.
    ///
    /// Its ephemeral nodes disappear, its pending watches fire with
    /// [`WatchEvent::SessionExpired`] and every operation fails until
    /// [`CoordinationService::reconnect`] is called.
    pub fn expire_session(&self) {
        let mut fired = Vec::new();
        {
            let mut session = self.session.lock();
            if session.expired {
                return;
            }
            session.expired = true;
            let id = session.id;

            let mut tree = self.tree.lock();
            for watches in tree.watches.values_mut() {
                let (own, others): (Vec<_>, Vec<_>) =
                    watches.drain(..).partition(|w| w.session == id);
                *watches = others;
                fired.extend(own.into_iter().map(|w| (w.callback, WatchEvent::SessionExpired)));
            }

            let owned: Vec<String> = tree
                .nodes
                .iter()
                .filter(|(_, node)| node.owner == Some(id))
                .map(|(path, _)| path.clone())
                .collect();
            for path in owned {
                if let Err(e) = tree.delete(&path, &mut fired) {
                    tracing::warn!("Failed to drop ephemeral node {}: {}", path, e);
                }
            }
        }
        tracing::info!("Expired coordination session {}", self.session_id());
        fire(fired);
    }

    fn ensure_ancestors(tree: &mut Tree, path: &str, fired: &mut Fired) -> Result<()> {
        if path == "/" {
            return Ok(());
        }
        let mut current = String::new();
        for part in path.split('/').filter(|p| !p.is_empty()) {
            current.push('/');
            current.push_str(part);
            if !tree.nodes.contains_key(&current) {
                tree.insert(&current, Node::default(), fired)?;
            }
        }
        Ok(())
    }
}

impl Default for MemoryCoordination {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CoordinationService for MemoryCoordination {
    async fn create_ancestors(&self, path: &str) -> Result<()> {
        self.live_session()?;
        split_path(path)?;
        let mut fired = Vec::new();
        let result = Self::ensure_ancestors(&mut self.tree.lock(), path, &mut fired);
        fire(fired);
        result
    }

    async fn create_ephemeral(&self, path: &str, data: &[u8]) -> Result<()> {
        let session = self.live_session()?;
        let mut fired = Vec::new();
        let result = self
            .tree
            .lock()
            .put(path, data, Some(session), &mut fired);
        fire(fired);
        result
    }

    async fn remove(&self, path: &str) -> Result<()> {
        self.live_session()?;
        let mut fired = Vec::new();
        let result = self.tree.lock().delete(path, &mut fired);
        fire(fired);
        result
    }

    async fn list_children(
        &self,
        path: &str,
        watch: Option<WatchCallback>,
    ) -> Result<(Vec<String>, i64)> {
        let session = self.live_session()?;
        let mut tree = self.tree.lock();
        let node = tree
            .nodes
            .get(path)
            .ok_or_else(|| DiscoveryError::NoNode(path.to_string()))?;
        let children = node.children.iter().cloned().collect();
        let version = node.cversion;

        if let Some(callback) = watch {
            tree.watches
                .entry(path.to_string())
                .or_default()
                .push(PendingWatch { session, callback });
        }
        Ok((children, version))
    }

    async fn get_data(&self, path: &str) -> Result<Option<Vec<u8>>> {
        self.live_session()?;
        Ok(self.tree.lock().nodes.get(path).map(|n| n.data.clone()))
    }

    async fn reconnect(&self) -> Result<()> {
        let id = self.tree.lock().open_session();
        let mut session = self.session.lock();
        *session = Session { id, expired: false };
        tracing::info!("Opened coordination session {}", id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting_watch(counter: &Arc<AtomicUsize>, expected: WatchEvent) -> WatchCallback {
        let counter = counter.clone();
        Box::new(move |event: WatchEvent| {
            assert_eq!(event, expected);
            counter.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[tokio::test]
    async fn test_ephemeral_lifecycle() {
        let zk = MemoryCoordination::new();
        zk.create_ancestors("/discovery/c1").await.unwrap();
        assert!(zk.exists("/discovery"));

        zk.create_ephemeral("/discovery/c1/n1", b"h1:9000").await.unwrap();
        let (children, v1) = zk.list_children("/discovery/c1", None).await.unwrap();
        assert_eq!(children, vec!["n1".to_string()]);

        // overwriting does not change the child list
        zk.create_ephemeral("/discovery/c1/n1", b"h1:9001").await.unwrap();
        let (_, v2) = zk.list_children("/discovery/c1", None).await.unwrap();
        assert_eq!(v1, v2);
        assert_eq!(
            zk.get_data("/discovery/c1/n1").await.unwrap(),
            Some(b"h1:9001".to_vec())
        );

        zk.remove("/discovery/c1/n1").await.unwrap();
        zk.remove("/discovery/c1/n1").await.unwrap();
        assert_eq!(zk.get_data("/discovery/c1/n1").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_missing_parent() {
        let zk = MemoryCoordination::new();
        assert!(matches!(
            zk.create_ephemeral("/nope/n1", b"x").await,
            Err(DiscoveryError::NoNode(_))
        ));
        assert!(matches!(
            zk.list_children("/nope", None).await,
            Err(DiscoveryError::NoNode(_))
        ));
    }

    #[tokio::test]
    async fn test_watch_fires_once() {
        let zk = MemoryCoordination::new();
        zk.create_ancestors("/d/c").await.unwrap();
        let fired = Arc::new(AtomicUsize::new(0));
        let expected = WatchEvent::ChildrenChanged {
            path: "/d/c".to_string(),
        };

        zk.list_children("/d/c", Some(counting_watch(&fired, expected)))
            .await
            .unwrap();
        zk.set_persistent("/d/c/n1", b"h1:9000").unwrap();
        zk.set_persistent("/d/c/n2", b"h2:9000").unwrap();

        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_session_expiry() {
        let zk = MemoryCoordination::new();
        let other = zk.new_session();
        zk.create_ancestors("/d/c").await.unwrap();
        zk.create_ephemeral("/d/c/mine", b"h1:9000").await.unwrap();
        other.create_ephemeral("/d/c/theirs", b"h2:9000").await.unwrap();

        let expired = Arc::new(AtomicUsize::new(0));
        let changed = Arc::new(AtomicUsize::new(0));
        zk.list_children("/d/c", Some(counting_watch(&expired, WatchEvent::SessionExpired)))
            .await
            .unwrap();
        let expected = WatchEvent::ChildrenChanged {
            path: "/d/c".to_string(),
        };
        other
            .list_children("/d/c", Some(counting_watch(&changed, expected)))
            .await
            .unwrap();

        zk.expire_session();
        assert_eq!(expired.load(Ordering::SeqCst), 1);
        assert_eq!(changed.load(Ordering::SeqCst), 1);
        assert!(!zk.exists("/d/c/mine"));
        assert!(zk.exists("/d/c/theirs"));
        assert!(matches!(
            zk.get_data("/d/c/theirs").await,
            Err(DiscoveryError::SessionExpired)
        ));

        let old_session = zk.session_id();
        zk.reconnect().await.unwrap();
        assert_ne!(zk.session_id(), old_session);
        let (children, _) = zk.list_children("/d/c", None).await.unwrap();
        assert_eq!(children, vec!["theirs".to_string()]);
    }

    #[test]
    fn test_split_path() {
        assert_eq!(split_path("/a").unwrap(), ("/", "a"));
        assert_eq!(split_path("/a/b").unwrap(), ("/a", "b"));
        assert!(split_path("a/b").is_err());
        assert!(split_path("/a/").is_err());
        assert!(split_path("/").is_err());
    }
}
