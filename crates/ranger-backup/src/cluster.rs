// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (c) 2025 The Ranger Authors

//! Interfaces to the cluster the backup runs against.
//!
//! The coordinator never talks to the network directly. It consumes three
//! services through these traits: the metadata service (timestamps, stores,
//! region leaders), the stores themselves (range export), and the lock
//! resolver.

use async_trait::async_trait;
use futures_util::stream::BoxStream;
use ranger_core::{
    BackupRequest, BackupResponse, LockInfo, Peer, SnapshotTimestamp, StoreDescriptor,
};

use crate::error::Result;

/// Lazily produced responses of one backup call.
///
/// The stream is finite. Calling [`StoreClient::backup`] again restarts the
/// export from the beginning of the requested range.
pub type ResponseStream = BoxStream<'static, Result<BackupResponse>>;

/// Client for the cluster metadata service.
#[async_trait]
pub trait MetadataClient: Send + Sync {
    /// Returns the identifier of the cluster.
    async fn cluster_id(&self) -> Result<u64>;

    /// Allocates a fresh timestamp from the timestamp oracle.
    async fn allocate_timestamp(&self) -> Result<SnapshotTimestamp>;

    /// Lists every store known to the cluster.
    async fn list_stores(&self) -> Result<Vec<StoreDescriptor>>;

    /// Returns the leader of the region containing `encoded_key`, if elected.
    ///
    /// The key must already be in the memcomparable encoding.
    async fn region_leader(&self, encoded_key: &[u8]) -> Result<Option<Peer>>;
}

/// Client for issuing backup requests to stores.
#[async_trait]
pub trait StoreClient: Send + Sync {
    /// Asks `store_id` to export `request` and returns its response stream.
    async fn backup(&self, store_id: u64, request: BackupRequest) -> Result<ResponseStream>;
}

/// Resolves transaction locks that block a snapshot read.
#[async_trait]
pub trait LockResolver: Send + Sync {
    /// Resolves `locks` on behalf of a reader at `caller_version`.
    ///
    /// Returns the number of milliseconds until the longest-lived unresolved
    /// lock expires, or 0 if every lock was cleaned up.
    async fn resolve_locks(&self, caller_version: u64, locks: &[LockInfo]) -> Result<u64>;
}
