//! Clusters waiting for a refresh
//!
//! Shared between the discovery worker and watch callbacks. Callbacks only
//! mark and wake; the worker takes the marked names and does the I/O.

use dashmap::DashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Notify;

/// Set of cluster names to refresh plus a wake-up for the worker
#[derive(Debug, Default)]
pub struct PendingUpdates {
    names: DashSet<String>,
    session_expired: AtomicBool,
    notify: Notify,
}

impl PendingUpdates {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark a cluster and wake the worker
    pub fn mark(&self, name: &str) {
        self.names.insert(name.to_string());
        self.notify.notify_one();
    }

    /// Mark clusters without waking the worker
    pub fn insert_all<'a>(&self, names: impl IntoIterator<Item = &'a str>) {
        for name in names {
            self.names.insert(name.to_string());
        }
    }

    /// Record a session expiration and wake the worker
    pub fn mark_session_expired(&self) {
        self.session_expired.store(true, Ordering::Release);
        self.notify.notify_one();
    }

    /// Record a session expiration to be handled on the next wake-up
    pub fn defer_session_recovery(&self) {
        self.session_expired.store(true, Ordering::Release);
    }

    pub fn take_session_expired(&self) -> bool {
        self.session_expired.swap(false, Ordering::AcqRel)
    }

    /// Remove and return every marked cluster, sorted
    pub fn take(&self) -> Vec<String> {
        let mut names: Vec<String> = self.names.iter().map(|n| n.key().clone()).collect();
        for name in &names {
            self.names.remove(name);
        }
        names.sort();
        names
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.contains(name)
    }

    /// Wake the worker without marking anything
    pub fn wake(&self) {
        self.notify.notify_one();
    }

    /// Wait for the next wake-up. A wake-up sent while nobody waits is kept.
    pub async fn wait(&self) {
        self.notify.notified().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn test_take_drains() {
        let pending = PendingUpdates::new();
        pending.mark("c2");
        pending.mark("c1");
        pending.mark("c1");
        pending.insert_all(["c3"]);

        assert!(pending.contains("c3"));
        assert_eq!(pending.take(), vec!["c1", "c2", "c3"]);
        assert!(pending.is_empty());
        assert!(pending.take().is_empty());
    }

    #[test]
    fn test_session_flag() {
        let pending = PendingUpdates::new();
        assert!(!pending.take_session_expired());
        pending.mark_session_expired();
        assert!(pending.take_session_expired());
        assert!(!pending.take_session_expired());
    }

    #[tokio::test]
    async fn test_wake_before_wait_is_kept() {
        let pending = PendingUpdates::new();
        pending.mark("c1");
        tokio::time::timeout(Duration::from_secs(1), pending.wait())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_mark_from_another_thread() {
        let pending = Arc::new(PendingUpdates::new());
        let marker = pending.clone();
        std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(20));
            marker.mark("c1");
        });

        tokio::time::timeout(Duration::from_secs(5), pending.wait())
            .await
            .unwrap();
        assert_eq!(pending.take(), vec!["c1"]);
    }
}
