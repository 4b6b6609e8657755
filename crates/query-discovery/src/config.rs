//! Discovery configuration

use crate::error::{DiscoveryError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;
use uuid::Uuid;

/// One cluster whose members are discovered
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterConfig {
    /// Cluster name used by topology consumers
    pub name: String,
    /// Root path of the member list in the coordination service
    pub path: String,
    /// Watch the cluster without registering this node in it
    #[serde(default)]
    pub observer: bool,
}

impl ClusterConfig {
    pub fn new(name: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            observer: false,
        }
    }

    pub fn with_observer(mut self, observer: bool) -> Self {
        self.observer = observer;
        self
    }
}

/// Discovery service configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    /// Host this node advertises
    pub host: String,
    /// Port this node advertises
    pub port: u16,
    /// Stable node identity; random when unset
    pub node_id: Option<Uuid>,
    pub clusters: Vec<ClusterConfig>,
    /// Fallback refresh of every cluster, in milliseconds
    pub refresh_interval_ms: u64,
    /// Bound on each coordination call, in milliseconds
    pub operation_timeout_ms: u64,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 9000,
            node_id: None,
            clusters: Vec::new(),
            refresh_interval_ms: 5000,
            operation_timeout_ms: 10000,
        }
    }
}

impl DiscoveryConfig {
    /// Set the advertised address
    pub fn with_address(mut self, host: impl Into<String>, port: u16) -> Self {
        self.host = host.into();
        self.port = port;
        self
    }

    pub fn with_node_id(mut self, node_id: Uuid) -> Self {
        self.node_id = Some(node_id);
        self
    }

    /// Add a cluster to discover
    pub fn with_cluster(mut self, cluster: ClusterConfig) -> Self {
        self.clusters.push(cluster);
        self
    }

    pub fn with_refresh_interval(mut self, interval: Duration) -> Self {
        self.refresh_interval_ms = interval.as_millis() as u64;
        self
    }

    pub fn with_operation_timeout(mut self, timeout: Duration) -> Self {
        self.operation_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_millis(self.refresh_interval_ms)
    }

    pub fn operation_timeout(&self) -> Duration {
        Duration::from_millis(self.operation_timeout_ms)
    }

    /// Load configuration from a JSON file
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: DiscoveryConfig = serde_json::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.host.is_empty() {
            return Err(DiscoveryError::Config("host must not be empty".to_string()));
        }
        if self.port == 0 {
            return Err(DiscoveryError::Config("port must not be 0".to_string()));
        }
        if self.refresh_interval_ms == 0 || self.operation_timeout_ms == 0 {
            return Err(DiscoveryError::Config(
                "refresh interval and operation timeout must be positive".to_string(),
            ));
        }

        let mut names = HashSet::new();
        for cluster in &self.clusters {
            if cluster.name.is_empty() {
                return Err(DiscoveryError::Config("cluster name must not be empty".to_string()));
            }
            if !names.insert(cluster.name.as_str()) {
                return Err(DiscoveryError::Config(format!(
                    "cluster {} configured twice",
                    cluster.name
                )));
            }
            if !cluster.path.starts_with('/') || cluster.path.len() < 2 {
                return Err(DiscoveryError::Config(format!(
                    "cluster {} path must be absolute and not the root: {:?}",
                    cluster.name, cluster.path
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = DiscoveryConfig::default();
        assert_eq!(config.refresh_interval(), Duration::from_secs(5));
        assert_eq!(config.operation_timeout(), Duration::from_secs(10));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validation() {
        let dup = DiscoveryConfig::default()
            .with_cluster(ClusterConfig::new("c", "/clickhouse/discovery/c"))
            .with_cluster(ClusterConfig::new("c", "/other"));
        assert!(matches!(dup.validate(), Err(DiscoveryError::Config(_))));

        let relative =
            DiscoveryConfig::default().with_cluster(ClusterConfig::new("c", "discovery/c"));
        assert!(relative.validate().is_err());

        let no_port = DiscoveryConfig::default().with_address("h1", 0);
        assert!(no_port.validate().is_err());
    }

    #[test]
    fn test_from_file() {
        let path = std::env::temp_dir().join(format!("discovery-{}.json", Uuid::new_v4()));
        std::fs::write(
            &path,
            r#"{
                "host": "h1",
                "port": 9440,
                "clusters": [
                    {"name": "analytics", "path": "/discovery/analytics"},
                    {"name": "logs", "path": "/discovery/logs", "observer": true}
                ]
            }"#,
        )
        .unwrap();

        let config = DiscoveryConfig::from_file(&path).unwrap();
        std::fs::remove_file(&path).unwrap();

        assert_eq!(config.port, 9440);
        assert_eq!(config.refresh_interval_ms, 5000);
        assert!(config.node_id.is_none());
        assert!(!config.clusters[0].observer);
        assert!(config.clusters[1].observer);
    }

    #[test]
    fn test_from_file_invalid_json() {
        let path = std::env::temp_dir().join(format!("discovery-{}.json", Uuid::new_v4()));
        std::fs::write(&path, "{ not json").unwrap();

        let result = DiscoveryConfig::from_file(&path);
        std::fs::remove_file(&path).unwrap();
        assert!(matches!(result, Err(DiscoveryError::Config(_))));
    }
}
