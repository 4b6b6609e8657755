//! Core request types for replica execution

use arrow::record_batch::RecordBatch;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Identity of one live replica session (the socket identity)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ConnectionId(pub u64);

impl ConnectionId {
    /// Allocate a process-unique connection ID
    pub fn next() -> Self {
        Self(NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// How far a replica should process the query before sending results back
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum QueryStage {
    /// Only read the requested columns
    FetchColumns,
    /// Stop at the state that can still be merged across replicas
    WithMergeableState,
    /// Run the query to completion
    #[default]
    Complete,
}

impl fmt::Display for QueryStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueryStage::FetchColumns => write!(f, "FetchColumns"),
            QueryStage::WithMergeableState => write!(f, "WithMergeableState"),
            QueryStage::Complete => write!(f, "Complete"),
        }
    }
}

/// Which share of the data a replica reads when the query runs on several replicas
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplicaAssignment {
    /// Position of this replica among the participating replicas
    pub offset: usize,
    /// Number of participating replicas
    pub count: usize,
}

/// Query as sent to one replica
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryRequest {
    /// Query text
    pub query: String,
    /// Client-supplied query ID, may be empty
    pub query_id: String,
    /// Processing stage
    pub stage: QueryStage,
    /// Whether external table data follows the query
    pub with_pending_data: bool,
    /// Share of the data to read, set only for parallel execution
    pub assignment: Option<ReplicaAssignment>,
}

impl QueryRequest {
    /// Create a request that runs to completion
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            query_id: String::new(),
            stage: QueryStage::Complete,
            with_pending_data: false,
            assignment: None,
        }
    }

    /// Same request, stamped with a replica assignment
    pub fn for_replica(&self, offset: usize, count: usize) -> Self {
        Self {
            assignment: Some(ReplicaAssignment { offset, count }),
            ..self.clone()
        }
    }
}

/// Temporary table shipped to replicas ahead of the query
#[derive(Debug, Clone)]
pub struct ExternalTable {
    /// Table name as referenced by the query
    pub name: String,
    /// Table contents
    pub blocks: Vec<RecordBatch>,
}

impl ExternalTable {
    /// Create an external table
    pub fn new(name: impl Into<String>, blocks: Vec<RecordBatch>) -> Self {
        Self {
            name: name.into(),
            blocks,
        }
    }

    /// Total rows across all blocks
    pub fn num_rows(&self) -> usize {
        self.blocks.iter().map(|b| b.num_rows()).sum()
    }
}
