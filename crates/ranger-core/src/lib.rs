// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (c) 2025 The Ranger Authors

//! Core types shared by the Ranger backup components.
//!
//! This crate provides the vocabulary used between the backup coordinator and
//! the cluster it talks to:
//! - Keys and half-open key ranges with an "infinity" end sentinel
//! - Memcomparable key encoding used by the metadata service's region index
//! - Snapshot timestamps allocated by the cluster's timestamp oracle
//! - Backup requests, responses, error details and produced file descriptors

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod codec;
pub mod error;
pub mod key;
pub mod timestamp;
pub mod types;

pub use codec::encode_bytes;
pub use error::{Error, Result};
pub use key::{before_end, cmp_end_bounds, KeyRange};
pub use timestamp::SnapshotTimestamp;
pub use types::{
    BackupErrorDetail, BackupFile, BackupRequest, BackupResponse, KvError, LockInfo, Peer,
    RegionError, StoreDescriptor, StoreState,
};
