// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (c) 2025 The Ranger Authors

//! Region leader lookup with a bounded retry policy.

use std::sync::Arc;
use std::time::Duration;

use ranger_core::{encode_bytes, Peer};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::cluster::MetadataClient;
use crate::config::BackupConfig;
use crate::error::{BackupError, Result};

/// Retry schedule for leader lookups.
///
/// Attempt `n` (counted from 0) waits `n * delay_step` before querying, so
/// the first lookup is immediate and later ones back off linearly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total number of lookups.
    pub max_attempts: u32,
    /// Increment of the delay between lookups.
    pub delay_step: Duration,
}

impl RetryPolicy {
    /// Creates a policy.
    pub fn new(max_attempts: u32, delay_step: Duration) -> Self {
        Self { max_attempts, delay_step }
    }

    /// Returns the delay before attempt `attempt`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.delay_step * attempt
    }
}

impl From<&BackupConfig> for RetryPolicy {
    fn from(config: &BackupConfig) -> Self {
        Self::new(config.leader_lookup_attempts, config.leader_lookup_delay_duration())
    }
}

/// Finds the store currently leading the region that owns a key.
pub struct LeaderResolver {
    metadata: Arc<dyn MetadataClient>,
    policy: RetryPolicy,
}

impl LeaderResolver {
    /// Creates a resolver.
    pub fn new(metadata: Arc<dyn MetadataClient>, policy: RetryPolicy) -> Self {
        Self { metadata, policy }
    }

    /// Returns the retry policy.
    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Resolves the leader for the raw application key `key`.
    ///
    /// # Errors
    ///
    /// Returns [`BackupError::NoLeader`] once every attempt failed or found
    /// no leader, and [`BackupError::Cancelled`] if `cancel` fires first.
    pub async fn resolve(&self, key: &[u8], cancel: &CancellationToken) -> Result<Peer> {
        let encoded = encode_bytes(key);

        for attempt in 0..self.policy.max_attempts {
            let delay = self.policy.delay_for(attempt);
            if !delay.is_zero() {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return Err(BackupError::Cancelled),
                    _ = tokio::time::sleep(delay) => {}
                }
            }

            match self.metadata.region_leader(&encoded).await {
                Ok(Some(leader)) => {
                    debug!(
                        store_id = leader.store_id,
                        peer_id = leader.id,
                        key = ?key,
                        "Found region leader"
                    );
                    return Ok(leader);
                }
                Ok(None) => {
                    warn!(key = ?key, attempt = attempt, "No leader for region");
                }
                Err(e) => {
                    warn!(key = ?key, attempt = attempt, error = %e, "Failed to find region");
                }
            }
        }

        Err(BackupError::NoLeader { key: encoded, attempts: self.policy.max_attempts })
    }
}
