// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (c) 2025 The Ranger Authors

//! Broadcast phase.
//!
//! The cluster-wide request goes to every store at once. Each store exports
//! the parts of the range it leads and streams back one response per
//! region. Whatever comes back confirmed seeds the ledger; everything else
//! is left for the fine-grained rounds.

use std::sync::Arc;

use futures_util::StreamExt;
use ranger_core::{BackupErrorDetail, BackupRequest, BackupResponse, StoreDescriptor};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::cluster::StoreClient;
use crate::error::{BackupError, Result};
use crate::ledger::RangeLedger;

/// Outcome of the broadcast phase.
#[derive(Debug, Default)]
pub struct PushDownResult {
    /// Ranges some store confirmed.
    pub ok: RangeLedger,
    /// Ranges a store reported an error for.
    pub err: RangeLedger,
    /// Stores whose call failed at the transport level.
    pub failed_stores: Vec<u64>,
}

enum PushEvent {
    Response { store_id: u64, response: BackupResponse },
    Failed { store_id: u64, error: BackupError },
}

/// Sends the cluster-wide request to every store.
pub struct PushDown {
    client: Arc<dyn StoreClient>,
}

impl PushDown {
    /// Creates a broadcaster over `client`.
    pub fn new(client: Arc<dyn StoreClient>) -> Self {
        Self { client }
    }

    /// Issues `request` to all `stores` concurrently and partitions the
    /// responses into confirmed and failed ranges.
    ///
    /// # Errors
    ///
    /// Returns [`BackupError::ClusterIdMismatch`] as soon as any store
    /// reports one, and [`BackupError::Cancelled`] if `cancel` fires.
    pub async fn push_backup(
        &self,
        request: &BackupRequest,
        stores: &[StoreDescriptor],
        cancel: &CancellationToken,
    ) -> Result<PushDownResult> {
        let token = cancel.child_token();
        let (tx, mut rx) = mpsc::channel(stores.len().max(1) * 16);

        // Send to all stores in parallel
        let mut handles = Vec::with_capacity(stores.len());
        for store in stores {
            let client = self.client.clone();
            let request = request.clone();
            let store_id = store.id;
            let tx = tx.clone();
            let token = token.clone();

            handles.push(tokio::spawn(async move {
                let mut stream = match client.backup(store_id, request).await {
                    Ok(stream) => stream,
                    Err(error) => {
                        let _ = tx.send(PushEvent::Failed { store_id, error }).await;
                        return;
                    }
                };

                loop {
                    let next = tokio::select! {
                        _ = token.cancelled() => return,
                        next = stream.next() => next,
                    };
                    let event = match next {
                        Some(Ok(response)) => PushEvent::Response { store_id, response },
                        Some(Err(error)) => PushEvent::Failed { store_id, error },
                        None => return,
                    };
                    let stop = matches!(event, PushEvent::Failed { .. });
                    if tx.send(event).await.is_err() || stop {
                        return;
                    }
                }
            }));
        }
        drop(tx);

        let mut result = PushDownResult::default();
        let outcome = loop {
            let event = tokio::select! {
                biased;
                _ = cancel.cancelled() => break Err(BackupError::Cancelled),
                event = rx.recv() => event,
            };
            let Some(event) = event else {
                break Ok(());
            };

            match event {
                PushEvent::Response { store_id, response } => {
                    if let Err(e) = Self::record(&mut result, store_id, response) {
                        break Err(e);
                    }
                }
                PushEvent::Failed { store_id, error } => {
                    warn!(store_id = store_id, error = %error, "Backup push to store failed");
                    result.failed_stores.push(store_id);
                }
            }
        };

        if let Err(e) = outcome {
            token.cancel();
            for handle in &handles {
                handle.abort();
            }
            return Err(e);
        }

        for handle in handles {
            if let Err(e) = handle.await {
                error!(error = %e, "Backup push task panicked");
            }
        }

        info!(
            stores = stores.len(),
            ok = result.ok.len(),
            err = result.err.len(),
            failed_stores = result.failed_stores.len(),
            "Finished backup push down"
        );
        Ok(result)
    }

    fn record(result: &mut PushDownResult, store_id: u64, response: BackupResponse) -> Result<()> {
        match &response.error {
            None => {
                debug!(
                    store_id = store_id,
                    start_key = ?response.start_key,
                    end_key = ?response.end_key,
                    files = response.files.len(),
                    "Store confirmed range"
                );
                result.ok.confirm(&response.start_key, &response.end_key, response.files);
            }
            Some(BackupErrorDetail::ClusterIdMismatch { request, current }) => {
                error!(
                    store_id = store_id,
                    expected = request,
                    actual = current,
                    "Store belongs to a different cluster"
                );
                return Err(BackupError::ClusterIdMismatch { expected: *request, actual: *current });
            }
            Some(detail) => {
                warn!(
                    store_id = store_id,
                    start_key = ?response.start_key,
                    end_key = ?response.end_key,
                    error = %detail,
                    "Store failed to back up range"
                );
                result.err.record_failure(&response.start_key, &response.end_key);
            }
        }
        Ok(())
    }
}
