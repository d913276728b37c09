// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (c) 2025 The Ranger Authors

//! Error types for backup operations.
//!
//! Every variant is terminal for the invocation that produced it. Transient
//! conditions (lock conflicts, routing churn) never surface here; they are
//! absorbed by the retry rounds.

use thiserror::Error;

/// Result type for backup operations.
pub type Result<T> = std::result::Result<T, BackupError>;

/// Errors that abort a backup.
#[derive(Error, Debug, Clone)]
pub enum BackupError {
    /// The requested key range is empty or inverted.
    #[error("invalid backup range: {0}")]
    InvalidRange(ranger_core::Error),

    /// The metadata service failed to answer.
    #[error("metadata service error: {0}")]
    Metadata(String),

    /// No leader could be found for a key.
    #[error("can not find region leader for key {key:?} after {attempts} attempts")]
    NoLeader {
        /// Encoded key that was looked up.
        key: Vec<u8>,
        /// Number of lookups performed.
        attempts: u32,
    },

    /// Sending a request to, or streaming from, a store failed.
    #[error("transport error talking to store {store_id}: {reason}")]
    Transport {
        /// The store that failed.
        store_id: u64,
        /// The reason for failure.
        reason: String,
    },

    /// Resolving a lock failed.
    #[error("lock resolution failed: {0}")]
    LockResolution(String),

    /// A store belongs to a different cluster.
    #[error("cluster id mismatch: expected {expected}, store reported {actual}")]
    ClusterIdMismatch {
        /// Cluster id of this client.
        expected: u64,
        /// Cluster id reported by the store.
        actual: u64,
    },

    /// A storage-layer error other than a lock conflict.
    #[error("unexpected kv error: {0}")]
    UnexpectedKvError(String),

    /// A routing error outside the retryable set.
    #[error("unexpected region error: {0}")]
    UnexpectedRegionError(String),

    /// An unrecognized error from a store.
    #[error("unknown backup error: {0}")]
    Unknown(String),

    /// The total backoff budget of the invocation was spent.
    #[error("backoff budget exhausted: slept {slept_ms}ms of {budget_ms}ms")]
    BackoffExhausted {
        /// Configured budget in milliseconds.
        budget_ms: u64,
        /// Time already slept in milliseconds.
        slept_ms: u64,
    },

    /// The backup was cancelled.
    #[error("backup cancelled")]
    Cancelled,

    /// Confirmed ranges produced files with the same name.
    #[error("{count} duplicate backup files detected")]
    DuplicateFiles {
        /// Number of distinct file names produced more than once.
        count: usize,
    },

    /// The manifest could not be encoded or written.
    #[error("manifest error: {0}")]
    Manifest(String),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),
}

impl BackupError {
    /// Returns true if retrying the same invocation could succeed.
    ///
    /// Only cancellation and budget exhaustion are worth a fresh attempt;
    /// everything else points at a cluster or configuration problem.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Cancelled | Self::BackoffExhausted { .. })
    }
}

impl From<ranger_core::Error> for BackupError {
    fn from(err: ranger_core::Error) -> Self {
        match err {
            ranger_core::Error::InvalidRange { .. } => Self::InvalidRange(err),
            // Only the timestamp oracle produces malformed timestamps.
            ranger_core::Error::LogicalOverflow { .. } => {
                Self::Metadata(format!("malformed timestamp: {err}"))
            }
        }
    }
}

impl From<std::io::Error> for BackupError {
    fn from(err: std::io::Error) -> Self {
        Self::Manifest(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let error = BackupError::ClusterIdMismatch { expected: 1, actual: 2 };
        assert_eq!(error.to_string(), "cluster id mismatch: expected 1, store reported 2");

        let error = BackupError::BackoffExhausted { budget_ms: 80_000, slept_ms: 80_000 };
        assert_eq!(error.to_string(), "backoff budget exhausted: slept 80000ms of 80000ms");

        let error = BackupError::Transport { store_id: 4, reason: "refused".to_string() };
        assert_eq!(error.to_string(), "transport error talking to store 4: refused");
    }

    #[test]
    fn test_retryable() {
        assert!(BackupError::Cancelled.is_retryable());
        assert!(BackupError::BackoffExhausted { budget_ms: 1, slept_ms: 1 }.is_retryable());
        assert!(!BackupError::ClusterIdMismatch { expected: 1, actual: 2 }.is_retryable());
        assert!(!BackupError::Unknown("x".to_string()).is_retryable());
    }

    #[test]
    fn test_from_core_error() {
        let core = ranger_core::KeyRange::new(b"z".to_vec(), b"a".to_vec()).unwrap_err();
        let error: BackupError = core.into();
        assert!(matches!(error, BackupError::InvalidRange(_)));
    }

    #[test]
    fn test_timestamp_overflow_is_metadata_error() {
        let core = ranger_core::SnapshotTimestamp::from_parts(1, 1 << 18).unwrap_err();
        let error: BackupError = core.into();
        assert!(matches!(error, BackupError::Metadata(_)));
        assert!(error.to_string().starts_with("metadata service error: malformed timestamp"));
    }
}
