// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (c) 2025 The Ranger Authors

//! Classification of store responses.
//!
//! Every element of a store's response stream goes through [`classify`],
//! which decides whether the range was exported, whether the failure is
//! transient, or whether the whole backup has to stop.
//!
//! ```text
//! Reported condition                 | Outcome
//! -----------------------------------|----------------------------------
//! no error                           | Confirmed
//! kv error with a lock               | ResolveLocks
//! any other kv error                 | fatal UnexpectedKvError
//! transient region error             | Retry(region backoff)
//! any other region error             | fatal UnexpectedRegionError
//! cluster id mismatch                | fatal ClusterIdMismatch
//! unknown                            | fatal Unknown
//! ```

use std::time::Duration;

use ranger_core::{BackupErrorDetail, BackupResponse, LockInfo};
use tracing::{error, warn};

use crate::error::{BackupError, Result};

/// Non-fatal outcome of classifying one response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    /// The range was exported.
    Confirmed(BackupResponse),
    /// Locks must be resolved before the range can be read.
    ResolveLocks(Vec<LockInfo>),
    /// Routing churn; retry the range after the delay.
    Retry(Duration),
}

/// Classifies a store response.
///
/// `region_backoff` is the delay requested for transient routing errors.
///
/// # Errors
///
/// Returns the fatal error for kv errors other than lock conflicts, routing
/// errors outside the transient set, cluster id mismatches and unknown
/// errors.
pub fn classify(response: BackupResponse, region_backoff: Duration) -> Result<Classification> {
    let Some(detail) = response.error.as_ref() else {
        return Ok(Classification::Confirmed(response));
    };

    match detail {
        BackupErrorDetail::Kv(kv) => match &kv.locked {
            Some(lock) => {
                warn!(
                    lock_version = lock.lock_version,
                    lock_ttl = lock.lock_ttl,
                    key = ?lock.key,
                    "Backup hit a locked key"
                );
                Ok(Classification::ResolveLocks(vec![lock.clone()]))
            }
            None => {
                error!(error = %kv.message, "Unexpected kv error during backup");
                Err(BackupError::UnexpectedKvError(kv.message.clone()))
            }
        },
        BackupErrorDetail::Region(region) if region.is_transient() => {
            warn!(
                region_error = ?region,
                start_key = ?response.start_key,
                backoff_ms = region_backoff.as_millis() as u64,
                "Backup hit a region error, will retry"
            );
            Ok(Classification::Retry(region_backoff))
        }
        BackupErrorDetail::Region(region) => {
            error!(region_error = ?region, "Unexpected region error during backup");
            Err(BackupError::UnexpectedRegionError(format!("{region:?}")))
        }
        BackupErrorDetail::ClusterIdMismatch { request, current } => {
            error!(expected = request, actual = current, "Backup hit a cluster id mismatch");
            Err(BackupError::ClusterIdMismatch { expected: *request, actual: *current })
        }
        BackupErrorDetail::Unknown(msg) => {
            error!(error = %msg, "Unknown backup error");
            Err(BackupError::Unknown(msg.clone()))
        }
    }
}

#[cfg(test)]
mod tests {
    use ranger_core::{BackupFile, KvError, Peer, RegionError};

    use super::*;

    const BACKOFF: Duration = Duration::from_millis(1000);

    fn failed(detail: BackupErrorDetail) -> BackupResponse {
        BackupResponse::failed(b"a".to_vec(), b"b".to_vec(), detail)
    }

    fn lock() -> LockInfo {
        LockInfo {
            primary_lock: b"p".to_vec(),
            lock_version: 42,
            key: b"a1".to_vec(),
            lock_ttl: 3000,
            txn_size: 1,
        }
    }

    #[test]
    fn test_success_passes_through() {
        let resp = BackupResponse::confirmed(
            b"a".to_vec(),
            b"b".to_vec(),
            vec![BackupFile::new("f1", b"a".to_vec(), b"b".to_vec())],
        );
        assert_eq!(classify(resp.clone(), BACKOFF).unwrap(), Classification::Confirmed(resp));
    }

    #[test]
    fn test_lock_conflict_requests_resolution() {
        let resp = failed(BackupErrorDetail::Kv(KvError {
            locked: Some(lock()),
            message: String::new(),
        }));
        assert_eq!(classify(resp, BACKOFF).unwrap(), Classification::ResolveLocks(vec![lock()]));
    }

    #[test]
    fn test_other_kv_error_is_fatal() {
        let resp = failed(BackupErrorDetail::Kv(KvError {
            locked: None,
            message: "write conflict".to_string(),
        }));
        assert!(matches!(
            classify(resp, BACKOFF),
            Err(BackupError::UnexpectedKvError(msg)) if msg == "write conflict"
        ));
    }

    #[test]
    fn test_transient_region_errors_back_off() {
        let transient = [
            RegionError::NotLeader { region_id: 2, leader: Some(Peer { id: 3, store_id: 1 }) },
            RegionError::EpochNotMatch,
            RegionError::RegionNotFound,
            RegionError::StaleCommand,
            RegionError::ServerIsBusy { reason: "scheduler busy".to_string() },
            RegionError::StoreNotMatch,
        ];
        for region in transient {
            let resp = failed(BackupErrorDetail::Region(region));
            assert_eq!(classify(resp, BACKOFF).unwrap(), Classification::Retry(BACKOFF));
        }
    }

    #[test]
    fn test_other_region_errors_are_fatal() {
        for region in [RegionError::KeyNotInRegion, RegionError::Other("raft".to_string())] {
            let resp = failed(BackupErrorDetail::Region(region));
            assert!(matches!(classify(resp, BACKOFF), Err(BackupError::UnexpectedRegionError(_))));
        }
    }

    #[test]
    fn test_cluster_id_mismatch_is_fatal() {
        let resp = failed(BackupErrorDetail::ClusterIdMismatch { request: 1, current: 9 });
        assert!(matches!(
            classify(resp, BACKOFF),
            Err(BackupError::ClusterIdMismatch { expected: 1, actual: 9 })
        ));
    }

    #[test]
    fn test_unknown_is_fatal() {
        let resp = failed(BackupErrorDetail::Unknown("disk full".to_string()));
        assert!(matches!(classify(resp, BACKOFF), Err(BackupError::Unknown(_))));
    }
}
