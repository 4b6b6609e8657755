//! Packets received from replicas
//!
//! A replica answers a query with a stream of packets terminated by either
//! [`Packet::EndOfStream`] or [`Packet::Exception`].

use arrow::record_batch::RecordBatch;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Metadata attached to a data block when the caller asked for it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockExtraInfo {
    /// Registration number of the replica that produced the block
    pub replica_num: usize,
    /// Address of that replica
    pub address: String,
    /// Whether the replica runs in this process
    pub is_local: bool,
}

/// Query progress counters reported by a replica
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Progress {
    /// Rows processed since the previous progress packet
    pub rows: u64,
    /// Bytes processed since the previous progress packet
    pub bytes: u64,
    /// Estimated total rows to process, 0 if unknown
    pub total_rows: u64,
}

impl Progress {
    /// Accumulate another progress increment
    pub fn increment(&mut self, other: &Progress) {
        self.rows += other.rows;
        self.bytes += other.bytes;
        self.total_rows = self.total_rows.max(other.total_rows);
    }
}

/// Execution profile of a finished query on one replica
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ProfileInfo {
    pub rows: u64,
    pub blocks: u64,
    pub bytes: u64,
    pub applied_limit: bool,
    pub rows_before_limit: u64,
}

/// Exception raised on a replica and shipped back to the client
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteException {
    pub code: i32,
    pub message: String,
    /// Address of the replica that raised it, filled in by the receiver
    pub address: Option<String>,
}

impl RemoteException {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            address: None,
        }
    }
}

impl fmt::Display for RemoteException {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.address {
            Some(address) => write!(f, "Code: {}. {} (from {})", self.code, self.message, address),
            None => write!(f, "Code: {}. {}", self.code, self.message),
        }
    }
}

impl std::error::Error for RemoteException {}

/// One unit received from a replica
#[derive(Debug, Clone)]
pub enum Packet {
    /// A block of result data
    Data {
        block: RecordBatch,
        extra_info: Option<BlockExtraInfo>,
    },
    /// Progress counters
    Progress(Progress),
    /// Execution profile
    ProfileInfo(ProfileInfo),
    /// Server log entries, as a block
    Log(RecordBatch),
    /// Remote failure; terminates the replica's stream
    Exception(RemoteException),
    /// Normal end of the replica's stream
    EndOfStream,
}

/// Discriminant of a [`Packet`], for logging and assertions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PacketKind {
    Data,
    Progress,
    ProfileInfo,
    Log,
    Exception,
    EndOfStream,
}

impl fmt::Display for PacketKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PacketKind::Data => write!(f, "Data"),
            PacketKind::Progress => write!(f, "Progress"),
            PacketKind::ProfileInfo => write!(f, "ProfileInfo"),
            PacketKind::Log => write!(f, "Log"),
            PacketKind::Exception => write!(f, "Exception"),
            PacketKind::EndOfStream => write!(f, "EndOfStream"),
        }
    }
}

impl Packet {
    /// Data packet without extra info
    pub fn data(block: RecordBatch) -> Self {
        Packet::Data {
            block,
            extra_info: None,
        }
    }

    /// Exception packet
    pub fn exception(code: i32, message: impl Into<String>) -> Self {
        Packet::Exception(RemoteException::new(code, message))
    }

    pub fn kind(&self) -> PacketKind {
        match self {
            Packet::Data { .. } => PacketKind::Data,
            Packet::Progress(_) => PacketKind::Progress,
            Packet::ProfileInfo(_) => PacketKind::ProfileInfo,
            Packet::Log(_) => PacketKind::Log,
            Packet::Exception(_) => PacketKind::Exception,
            Packet::EndOfStream => PacketKind::EndOfStream,
        }
    }

    /// Whether this packet ends the replica's stream
    pub fn is_terminal(&self) -> bool {
        matches!(self, Packet::Exception(_) | Packet::EndOfStream)
    }

    /// Approximate in-memory size of the payload, used for throttling
    pub fn byte_size(&self) -> usize {
        match self {
            Packet::Data { block, .. } | Packet::Log(block) => block.get_array_memory_size(),
            Packet::Progress(_)
            | Packet::ProfileInfo(_)
            | Packet::Exception(_)
            | Packet::EndOfStream => 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::Int64Array;
    use arrow::datatypes::{DataType, Field, Schema};
    use std::sync::Arc;

    #[test]
    fn test_packet_kinds() {
        let schema = Arc::new(Schema::new(vec![Field::new("x", DataType::Int64, false)]));
        let block =
            RecordBatch::try_new(schema, vec![Arc::new(Int64Array::from(vec![1, 2]))]).unwrap();

        let data = Packet::data(block);
        assert_eq!(data.kind(), PacketKind::Data);
        assert!(!data.is_terminal());
        assert!(data.byte_size() > 0);

        assert!(Packet::EndOfStream.is_terminal());
        assert!(Packet::exception(1, "boom").is_terminal());
        assert_eq!(Packet::Progress(Progress::default()).byte_size(), 0);
    }

    #[test]
    fn test_progress_increment() {
        let mut total = Progress::default();
        total.increment(&Progress {
            rows: 10,
            bytes: 100,
            total_rows: 50,
        });
        total.increment(&Progress {
            rows: 5,
            bytes: 40,
            total_rows: 0,
        });
        assert_eq!(total.rows, 15);
        assert_eq!(total.bytes, 140);
        assert_eq!(total.total_rows, 50);
    }

    #[test]
    fn test_remote_exception_display() {
        let mut e = RemoteException::new(241, "Memory limit exceeded");
        assert_eq!(e.to_string(), "Code: 241. Memory limit exceeded");
        e.address = Some("r1:9000".into());
        assert!(e.to_string().ends_with("(from r1:9000)"));
    }
}
