// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (c) 2025 The Ranger Authors

//! Fine-grained retry rounds.
//!
//! After the broadcast phase some sub-ranges are usually still missing:
//! leadership moved, a region split, or a transaction held a lock. Each
//! round recomputes the missing sub-ranges from the ledger and backs each one
//! up from its current leader.
//!
//! ```text
//!            +-------------------+
//!   ledger ->| complement        |-- empty --> done
//!            +-------------------+
//!                     |
//!                     v
//!            +-------------------+   WorkerEvent   +-------------+
//!            | work queue        |--> worker 1 --->|             |
//!            | (sub-ranges)      |--> worker 2 --->| coordinator |
//!            |                   |--> worker N --->|             |
//!            +-------------------+                 +-------------+
//!                                                        |
//!                          confirm ranges, sleep round max backoff
//! ```
//!
//! Workers never touch the ledger. They report confirmed ranges and backoff
//! requests over a channel, and the coordinator applies them once the round
//! is over.

use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use metrics::counter;
use ranger_core::{BackupRequest, BackupResponse, KeyRange, LockInfo};
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::backoff::Backoffer;
use crate::classify::{classify, Classification};
use crate::cluster::{LockResolver, MetadataClient, StoreClient};
use crate::config::BackupConfig;
use crate::error::{BackupError, Result};
use crate::leader::{LeaderResolver, RetryPolicy};
use crate::ledger::RangeLedger;

/// What a worker reports back to the round coordinator.
#[derive(Debug)]
enum WorkerEvent {
    Confirmed(BackupResponse),
    Backoff(Duration),
    Failed(BackupError),
}

/// Results of one round.
#[derive(Debug, Default)]
struct RoundResult {
    confirmed: Vec<BackupResponse>,
    backoff: Duration,
    events: usize,
}

/// Runs retry rounds until the ledger covers the requested range.
pub struct FineGrainedBackup {
    worker: RangeWorker,
    workers: usize,
    max_backoff: Duration,
}

/// Per-range backup logic shared by all workers of a round.
#[derive(Clone)]
struct RangeWorker {
    stores: Arc<dyn StoreClient>,
    leaders: Arc<LeaderResolver>,
    lock_resolver: Arc<dyn LockResolver>,
    region_backoff: Duration,
}

impl FineGrainedBackup {
    /// Creates the retry engine.
    pub fn new(
        config: &BackupConfig,
        metadata: Arc<dyn MetadataClient>,
        stores: Arc<dyn StoreClient>,
        lock_resolver: Arc<dyn LockResolver>,
    ) -> Self {
        let leaders = Arc::new(LeaderResolver::new(metadata, RetryPolicy::from(config)));
        Self {
            worker: RangeWorker {
                stores,
                leaders,
                lock_resolver,
                region_backoff: config.region_error_backoff_duration(),
            },
            workers: config.fine_grained_workers.max(1),
            max_backoff: config.max_backoff_duration(),
        }
    }

    /// Fills the gaps of `ledger` inside the request's range.
    ///
    /// Returns the number of rounds that were needed.
    ///
    /// # Errors
    ///
    /// Returns the first fatal error any worker reported,
    /// [`BackupError::BackoffExhausted`] once the backoff budget is spent, or
    /// [`BackupError::Cancelled`].
    pub async fn run(
        &self,
        request: &BackupRequest,
        ledger: &mut RangeLedger,
        cancel: &CancellationToken,
    ) -> Result<u32> {
        let mut backoffer = Backoffer::new(self.max_backoff);
        let mut rounds = 0u32;

        loop {
            let incomplete = ledger.complement(&request.start_key, &request.end_key);
            if incomplete.is_empty() {
                debug!(rounds = rounds, "Fine-grained backup complete");
                return Ok(rounds);
            }

            rounds += 1;
            counter!("ranger_backup_rounds").increment(1);
            info!(
                round = rounds,
                incomplete = incomplete.len(),
                slept_ms = backoffer.slept().as_millis() as u64,
                "Starting fine-grained backup round"
            );

            let round = self.run_round(request, incomplete, cancel).await?;

            for response in round.confirmed {
                if ledger.confirm(&response.start_key, &response.end_key, response.files) {
                    counter!("ranger_backup_ranges_confirmed").increment(1);
                }
            }

            // Stores answered nothing for the missing ranges.
            let backoff =
                if round.events == 0 { self.worker.region_backoff } else { round.backoff };
            if !backoff.is_zero() {
                backoffer.backoff(backoff, cancel).await?;
            }
        }
    }

    async fn run_round(
        &self,
        request: &BackupRequest,
        incomplete: Vec<KeyRange>,
        cancel: &CancellationToken,
    ) -> Result<RoundResult> {
        let token = cancel.child_token();
        let workers = self.workers.min(incomplete.len());

        let (work_tx, work_rx) = mpsc::channel(incomplete.len());
        for range in incomplete {
            if work_tx.send(range).await.is_err() {
                break;
            }
        }
        drop(work_tx);
        let work_rx = Arc::new(Mutex::new(work_rx));

        let (event_tx, mut event_rx) = mpsc::channel(workers * 4);
        let mut handles = Vec::with_capacity(workers);
        for _ in 0..workers {
            let worker = self.worker.clone();
            let request = request.clone();
            let work_rx = work_rx.clone();
            let event_tx = event_tx.clone();
            let token = token.clone();

            handles.push(tokio::spawn(async move {
                loop {
                    let range = work_rx.lock().await.recv().await;
                    let Some(range) = range else {
                        return;
                    };
                    if let Err(e) = worker.backup_range(&request, range, &event_tx, &token).await {
                        let _ = event_tx.send(WorkerEvent::Failed(e)).await;
                        return;
                    }
                }
            }));
        }
        drop(event_tx);

        let mut round = RoundResult::default();
        let outcome = loop {
            let event = tokio::select! {
                biased;
                _ = cancel.cancelled() => break Err(BackupError::Cancelled),
                event = event_rx.recv() => event,
            };
            if event.is_some() {
                round.events += 1;
            }
            match event {
                None => break Ok(()),
                Some(WorkerEvent::Confirmed(response)) => round.confirmed.push(response),
                Some(WorkerEvent::Backoff(delay)) => round.backoff = round.backoff.max(delay),
                Some(WorkerEvent::Failed(e)) => break Err(e),
            }
        };

        if let Err(e) = outcome {
            error!(error = %e, "Fine-grained backup round failed");
            token.cancel();
            for handle in &handles {
                handle.abort();
            }
            return Err(e);
        }

        for handle in handles {
            if let Err(e) = handle.await {
                error!(error = %e, "Fine-grained backup worker panicked");
            }
        }

        debug!(
            confirmed = round.confirmed.len(),
            backoff_ms = round.backoff.as_millis() as u64,
            "Fine-grained backup round finished"
        );
        Ok(round)
    }
}

impl RangeWorker {
    async fn backup_range(
        &self,
        request: &BackupRequest,
        range: KeyRange,
        events: &mpsc::Sender<WorkerEvent>,
        token: &CancellationToken,
    ) -> Result<()> {
        let leader = self.leaders.resolve(&range.start, token).await?;
        debug!(store_id = leader.store_id, range = %range, "Backing up sub-range");

        let mut stream = self.stores.backup(leader.store_id, request.with_range(&range)).await?;
        loop {
            let next = tokio::select! {
                biased;
                _ = token.cancelled() => return Err(BackupError::Cancelled),
                next = stream.next() => next,
            };
            let Some(response) = next else {
                return Ok(());
            };

            let event = match classify(response?, self.region_backoff)? {
                Classification::Confirmed(response) => WorkerEvent::Confirmed(response),
                Classification::ResolveLocks(locks) => {
                    counter!("ranger_backup_lock_conflicts").increment(1);
                    let ms = self.resolve_locks(request.end_version, &locks).await?;
                    WorkerEvent::Backoff(Duration::from_millis(ms))
                }
                Classification::Retry(delay) => {
                    counter!("ranger_backup_region_errors").increment(1);
                    WorkerEvent::Backoff(delay)
                }
            };

            if events.send(event).await.is_err() {
                return Err(BackupError::Cancelled);
            }
        }
    }

    async fn resolve_locks(&self, version: u64, locks: &[LockInfo]) -> Result<u64> {
        match self.lock_resolver.resolve_locks(version, locks).await {
            Ok(ms) => {
                debug!(locks = locks.len(), ms_before_expired = ms, "Resolved locks");
                Ok(ms)
            }
            Err(BackupError::LockResolution(reason)) => Err(BackupError::LockResolution(reason)),
            Err(e) => {
                warn!(error = %e, "Failed to resolve locks");
                Err(BackupError::LockResolution(e.to_string()))
            }
        }
    }
}
