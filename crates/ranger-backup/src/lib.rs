// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (c) 2025 The Ranger Authors

//! Consistent point-in-time backup of a sharded key range.
//!
//! A backup reads every key of `[start, end)` at one snapshot timestamp,
//! even though the range is spread over many regions whose leaders move
//! while the backup runs.
//!
//! # Architecture
//!
//! The coordinator runs two phases:
//! 1. **Broadcast**: the cluster-wide request goes to every store; each
//!    store exports the regions it leads.
//! 2. **Fine-grained rounds**: whatever is still missing is computed from the
//!    coverage ledger and fetched range by range from the current leaders,
//!    until nothing is missing or the backoff budget runs out.
//!
//! ```text
//! backup_range(start, end)
//!      │
//!      ▼
//! ┌──────────────┐   allocate ts, list stores
//! │ BackupClient │──────────────────────────────► MetadataClient
//! └──────┬───────┘
//!        │
//!        ├── PushDown ──── one task per store ──► StoreClient
//!        │        │
//!        │        ▼
//!        │   RangeLedger (ok)
//!        │        │
//!        ├── FineGrainedBackup ── N workers ────► LeaderResolver
//!        │        │                         ├───► StoreClient
//!        │        │                         └───► LockResolver
//!        │        ▼
//!        │   RangeLedger (complete)
//!        │
//!        ├── find_duplicate_files
//!        │
//!        └── ManifestWriter ──► backupmeta
//! ```
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use ranger_backup::{BackupClient, BackupConfig};
//!
//! let config = BackupConfig::load("ranger.toml".as_ref())?;
//! let client = BackupClient::with_file_manifest(config, pd, stores, resolver).await?;
//!
//! let report = client.backup_range(b"t_100", b"t_200", "s3://bucket/backup").await?;
//! println!("{} files in {:?}", report.manifest.files.len(), report.elapsed);
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod audit;
mod backoff;
mod classify;
mod client;
mod cluster;
mod config;
mod error;
mod fine_grained;
mod leader;
mod ledger;
mod manifest;
mod push;

// Re-export the coordinator
pub use client::{BackupClient, BackupReport};
// Re-export cluster interfaces
pub use cluster::{LockResolver, MetadataClient, ResponseStream, StoreClient};
// Re-export configuration
pub use config::{
    BackupConfig, ConfigValidationError, DEFAULT_FINE_GRAINED_WORKERS,
    DEFAULT_LEADER_LOOKUP_ATTEMPTS, DEFAULT_LEADER_LOOKUP_DELAY_MS, DEFAULT_MAX_BACKOFF_MS,
    DEFAULT_REGION_ERROR_BACKOFF_MS,
};
// Re-export error types
pub use error::{BackupError, Result};
// Re-export the phases and their building blocks
pub use audit::{find_duplicate_files, DuplicateFile};
pub use backoff::Backoffer;
pub use classify::{classify, Classification};
pub use fine_grained::FineGrainedBackup;
pub use leader::{LeaderResolver, RetryPolicy};
pub use ledger::{ConfirmedRange, RangeLedger};
pub use push::{PushDown, PushDownResult};
// Re-export manifest types
pub use manifest::{BackupManifest, FileManifestWriter, ManifestWriter, MANIFEST_FILE_NAME};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exports() {
        let config = BackupConfig::default();
        assert_eq!(config.fine_grained_workers, DEFAULT_FINE_GRAINED_WORKERS);
        assert_eq!(RetryPolicy::from(&config).max_attempts, DEFAULT_LEADER_LOOKUP_ATTEMPTS);
        assert!(RangeLedger::new().is_empty());
        assert_eq!(MANIFEST_FILE_NAME, "backupmeta");
    }

    #[test]
    fn test_config_serialization() {
        let config = BackupConfig::default().fail_on_duplicate_files(true);
        let json = serde_json::to_string(&config).unwrap();
        let parsed: BackupConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, config);
    }
}
