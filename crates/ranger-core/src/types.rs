// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (c) 2025 The Ranger Authors

//! Backup wire types exchanged with the cluster.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::key::KeyRange;

/// Descriptor of one file a storage node wrote for a backup.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BackupFile {
    /// File name, unique per node and backup path.
    pub name: String,
    /// First key contained in the file.
    pub start_key: Vec<u8>,
    /// Exclusive upper bound of the file's keys.
    pub end_key: Vec<u8>,
    /// XOR of the CRC64 of every key/value pair in the file.
    pub crc64xor: u64,
    /// Number of key/value pairs.
    pub total_kvs: u64,
    /// Number of bytes of key/value data.
    pub total_bytes: u64,
}

impl BackupFile {
    /// Creates a file descriptor with empty checksums.
    pub fn new(name: impl Into<String>, start_key: Vec<u8>, end_key: Vec<u8>) -> Self {
        Self { name: name.into(), start_key, end_key, crc64xor: 0, total_kvs: 0, total_bytes: 0 }
    }
}

/// Lifecycle state of a store as reported by the metadata service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreState {
    /// Serving requests.
    #[default]
    Up,
    /// Temporarily unavailable.
    Offline,
    /// Permanently removed from the cluster.
    Tombstone,
}

/// A storage node known to the metadata service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreDescriptor {
    /// Store identifier.
    pub id: u64,
    /// Network address of the store.
    pub address: String,
    /// Current lifecycle state.
    pub state: StoreState,
}

impl StoreDescriptor {
    /// Creates a descriptor for a store in the `Up` state.
    pub fn new(id: u64, address: impl Into<String>) -> Self {
        Self { id, address: address.into(), state: StoreState::Up }
    }

    /// Sets the store state.
    pub fn with_state(mut self, state: StoreState) -> Self {
        self.state = state;
        self
    }
}

/// A replica of a region placed on a store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Peer {
    /// Peer identifier.
    pub id: u64,
    /// Store hosting the peer.
    pub store_id: u64,
}

/// Request asking a store to export a key range at one version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupRequest {
    /// Cluster the caller believes it is talking to.
    pub cluster_id: u64,
    /// Inclusive start key.
    pub start_key: Vec<u8>,
    /// Exclusive end key; empty means unbounded.
    pub end_key: Vec<u8>,
    /// Lower version bound. Equal to `end_version` for a full backup.
    pub start_version: u64,
    /// Snapshot version.
    pub end_version: u64,
    /// Destination path files are written to.
    pub path: String,
}

impl BackupRequest {
    /// Returns a copy of the request narrowed to `range`.
    #[must_use]
    pub fn with_range(&self, range: &KeyRange) -> Self {
        Self { start_key: range.start.clone(), end_key: range.end.clone(), ..self.clone() }
    }
}

/// One element of a store's response stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupResponse {
    /// Start of the range this response covers.
    pub start_key: Vec<u8>,
    /// End of the range this response covers.
    pub end_key: Vec<u8>,
    /// Files written for the range.
    pub files: Vec<BackupFile>,
    /// Failure detail; `None` when the range was exported.
    pub error: Option<BackupErrorDetail>,
}

impl BackupResponse {
    /// Creates a successful response.
    pub fn confirmed(start_key: Vec<u8>, end_key: Vec<u8>, files: Vec<BackupFile>) -> Self {
        Self { start_key, end_key, files, error: None }
    }

    /// Creates a failed response.
    pub fn failed(start_key: Vec<u8>, end_key: Vec<u8>, error: BackupErrorDetail) -> Self {
        Self { start_key, end_key, files: Vec::new(), error: Some(error) }
    }

    /// Returns the range the response refers to.
    #[must_use]
    pub fn range(&self) -> KeyRange {
        KeyRange::new_unchecked(self.start_key.clone(), self.end_key.clone())
    }
}

/// A lock left by an in-flight transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockInfo {
    /// Primary key of the owning transaction.
    pub primary_lock: Vec<u8>,
    /// Start version of the owning transaction.
    pub lock_version: u64,
    /// The locked key.
    pub key: Vec<u8>,
    /// Lock time-to-live in milliseconds.
    pub lock_ttl: u64,
    /// Number of keys written by the transaction.
    pub txn_size: u64,
}

/// Storage-layer error reported by a store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KvError {
    /// Set when a key is locked by another transaction.
    pub locked: Option<LockInfo>,
    /// Free-form description.
    pub message: String,
}

/// Shard-routing error reported by a store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RegionError {
    /// The store is not the leader of the region.
    NotLeader {
        /// Region the request was routed to.
        region_id: u64,
        /// Current leader if the store knows it.
        leader: Option<Peer>,
    },
    /// The region's epoch changed (split or merge).
    EpochNotMatch,
    /// The region is not on the store.
    RegionNotFound,
    /// The command was proposed by a stale leader.
    StaleCommand,
    /// The store is overloaded.
    ServerIsBusy {
        /// Reason reported by the store.
        reason: String,
    },
    /// The request was routed to the wrong store.
    StoreNotMatch,
    /// The key is outside the region.
    KeyNotInRegion,
    /// The write exceeded the raft entry limit.
    RaftEntryTooLarge,
    /// Any other routing error.
    Other(String),
}

impl RegionError {
    /// Returns true for routing churn that resolves on its own after a delay.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::NotLeader { .. }
                | Self::EpochNotMatch
                | Self::RegionNotFound
                | Self::StaleCommand
                | Self::ServerIsBusy { .. }
                | Self::StoreNotMatch
        )
    }
}

/// Why a store could not export (part of) a range.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum BackupErrorDetail {
    /// Storage-layer error.
    Kv(KvError),
    /// Shard-routing error.
    Region(RegionError),
    /// The store belongs to a different cluster.
    ClusterIdMismatch {
        /// Cluster id carried by the request.
        request: u64,
        /// Cluster id of the store.
        current: u64,
    },
    /// Unrecognized error.
    Unknown(String),
}

impl fmt::Display for BackupErrorDetail {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Kv(kv) => match &kv.locked {
                Some(lock) => write!(f, "key locked by txn {}", lock.lock_version),
                None => write!(f, "kv error: {}", kv.message),
            },
            Self::Region(region) => write!(f, "region error: {region:?}"),
            Self::ClusterIdMismatch { request, current } => {
                write!(f, "cluster id mismatch: request {request}, current {current}")
            }
            Self::Unknown(msg) => write!(f, "unknown error: {msg}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_with_range() {
        let req = BackupRequest {
            cluster_id: 7,
            start_key: b"a".to_vec(),
            end_key: b"z".to_vec(),
            start_version: 10,
            end_version: 10,
            path: "local:///tmp/backup".to_string(),
        };
        let narrowed = req.with_range(&KeyRange::new(b"c".to_vec(), b"d".to_vec()).unwrap());

        assert_eq!(narrowed.start_key, b"c");
        assert_eq!(narrowed.end_key, b"d");
        assert_eq!(narrowed.cluster_id, 7);
        assert_eq!(narrowed.end_version, 10);
        assert_eq!(narrowed.path, req.path);
    }

    #[test]
    fn test_transient_region_errors() {
        assert!(RegionError::NotLeader { region_id: 1, leader: None }.is_transient());
        assert!(RegionError::EpochNotMatch.is_transient());
        assert!(RegionError::RegionNotFound.is_transient());
        assert!(RegionError::StaleCommand.is_transient());
        assert!(RegionError::ServerIsBusy { reason: "busy".to_string() }.is_transient());
        assert!(RegionError::StoreNotMatch.is_transient());

        assert!(!RegionError::KeyNotInRegion.is_transient());
        assert!(!RegionError::RaftEntryTooLarge.is_transient());
        assert!(!RegionError::Other("x".to_string()).is_transient());
    }

    #[test]
    fn test_store_state_serialization() {
        let json = serde_json::to_string(&StoreState::Tombstone).unwrap();
        assert_eq!(json, "\"tombstone\"");

        let store = StoreDescriptor::new(1, "10.0.0.1:20160");
        assert_eq!(store.state, StoreState::Up);
        assert_eq!(store.with_state(StoreState::Offline).state, StoreState::Offline);
    }

    #[test]
    fn test_error_detail_display() {
        let detail = BackupErrorDetail::ClusterIdMismatch { request: 1, current: 2 };
        assert_eq!(detail.to_string(), "cluster id mismatch: request 1, current 2");

        let detail = BackupErrorDetail::Unknown("boom".to_string());
        assert_eq!(detail.to_string(), "unknown error: boom");
    }
}
