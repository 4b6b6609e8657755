//! Replica execution settings

use crate::error::{ReplicaError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Settings for one replica-parallel query
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReplicaSettings {
    /// Upper bound on replicas leased in [`PoolMode::GetMany`]
    pub max_parallel_replicas: usize,
}

impl Default for ReplicaSettings {
    fn default() -> Self {
        Self {
            max_parallel_replicas: 1,
        }
    }
}

impl ReplicaSettings {
    /// Set the maximum number of parallel replicas
    pub fn with_max_parallel_replicas(mut self, max: usize) -> Self {
        self.max_parallel_replicas = max;
        self
    }

    /// Load settings from a JSON file
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let settings: ReplicaSettings = serde_json::from_str(&contents)?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_parallel_replicas == 0 {
            return Err(ReplicaError::Config(
                "max_parallel_replicas must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// How many connections to lease from a pool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PoolMode {
    /// Exactly one connection
    GetOne,
    /// Up to `max_parallel_replicas` connections
    GetMany,
    /// Every available replica
    GetAll,
}
