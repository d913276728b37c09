// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (c) 2025 The Ranger Authors

//! Snapshot coordinator.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use metrics::{counter, histogram};
use ranger_core::{BackupRequest, KeyRange, StoreDescriptor, StoreState};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::audit::{find_duplicate_files, DuplicateFile};
use crate::cluster::{LockResolver, MetadataClient, StoreClient};
use crate::config::BackupConfig;
use crate::error::{BackupError, Result};
use crate::fine_grained::FineGrainedBackup;
use crate::manifest::{BackupManifest, FileManifestWriter, ManifestWriter};
use crate::push::PushDown;

/// Summary of a finished backup.
#[derive(Debug, Clone)]
pub struct BackupReport {
    /// The manifest that was written.
    pub manifest: BackupManifest,
    /// Where the manifest was written.
    pub manifest_path: PathBuf,
    /// Files produced by more than one range.
    pub duplicates: Vec<DuplicateFile>,
    /// Number of fine-grained rounds after the broadcast.
    pub rounds: u32,
    /// Wall time of the whole backup.
    pub elapsed: Duration,
}

/// Coordinates consistent backups of key ranges across a cluster.
///
/// Every call to [`BackupClient::backup_range`] reads the whole range at a
/// single freshly allocated timestamp. The call either writes a manifest
/// covering the range exactly once or fails without writing anything.
pub struct BackupClient {
    config: BackupConfig,
    cluster_id: u64,
    metadata: Arc<dyn MetadataClient>,
    push: PushDown,
    fine_grained: FineGrainedBackup,
    writer: Arc<dyn ManifestWriter>,
    cancel: CancellationToken,
}

impl BackupClient {
    /// Creates a client and fetches the cluster id.
    ///
    /// # Errors
    ///
    /// Returns [`BackupError::Config`] for an invalid configuration and any
    /// error the metadata service returns for the cluster id.
    pub async fn new(
        config: BackupConfig,
        metadata: Arc<dyn MetadataClient>,
        stores: Arc<dyn StoreClient>,
        lock_resolver: Arc<dyn LockResolver>,
        writer: Arc<dyn ManifestWriter>,
    ) -> Result<Self> {
        config.validate()?;
        let cluster_id = metadata.cluster_id().await?;
        info!(
            cluster_id = cluster_id,
            workers = config.fine_grained_workers,
            "Backup client ready"
        );

        let fine_grained =
            FineGrainedBackup::new(&config, metadata.clone(), stores.clone(), lock_resolver);
        Ok(Self {
            config,
            cluster_id,
            metadata,
            push: PushDown::new(stores),
            fine_grained,
            writer,
            cancel: CancellationToken::new(),
        })
    }

    /// Creates a client that writes the manifest into `config.manifest_dir`.
    ///
    /// # Errors
    ///
    /// Same as [`BackupClient::new`].
    pub async fn with_file_manifest(
        config: BackupConfig,
        metadata: Arc<dyn MetadataClient>,
        stores: Arc<dyn StoreClient>,
        lock_resolver: Arc<dyn LockResolver>,
    ) -> Result<Self> {
        let writer = Arc::new(FileManifestWriter::new(config.manifest_dir.clone()));
        Self::new(config, metadata, stores, lock_resolver, writer).await
    }

    /// Returns the cluster id fetched at construction.
    pub fn cluster_id(&self) -> u64 {
        self.cluster_id
    }

    /// Returns the configuration.
    pub fn config(&self) -> &BackupConfig {
        &self.config
    }

    /// Aborts every running backup with [`BackupError::Cancelled`].
    ///
    /// The client stays cancelled; later calls fail immediately.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Backs up `[start_key, end_key)` to the storage location `path`.
    ///
    /// An empty `end_key` means the end of the keyspace.
    ///
    /// # Errors
    ///
    /// Returns [`BackupError::InvalidRange`] if `start_key` is not before
    /// `end_key`, and otherwise the first fatal error of the backup.
    pub async fn backup_range(
        &self,
        start_key: &[u8],
        end_key: &[u8],
        path: &str,
    ) -> Result<BackupReport> {
        let range = KeyRange::new(start_key.to_vec(), end_key.to_vec())?;
        let started = Instant::now();
        counter!("ranger_backup_started").increment(1);
        info!(range = %range, path = path, "Starting backup");

        let cancel = self.cancel.child_token();
        let result = self.run(range, path, &cancel, started).await;

        match &result {
            Ok(report) => {
                counter!("ranger_backup_completed").increment(1);
                histogram!("ranger_backup_duration_seconds").record(report.elapsed.as_secs_f64());
                info!(
                    files = report.manifest.files.len(),
                    rounds = report.rounds,
                    duplicates = report.duplicates.len(),
                    elapsed_ms = report.elapsed.as_millis() as u64,
                    "Finished backup"
                );
            }
            Err(e) => {
                counter!("ranger_backup_failed").increment(1);
                let elapsed_ms = started.elapsed().as_millis() as u64;
                error!(error = %e, elapsed_ms = elapsed_ms, "Backup failed");
            }
        }
        result
    }

    async fn run(
        &self,
        range: KeyRange,
        path: &str,
        cancel: &CancellationToken,
        started: Instant,
    ) -> Result<BackupReport> {
        let ts = self.metadata.allocate_timestamp().await?;
        let stores = self.live_stores().await?;

        let (start_key, end_key): (Vec<u8>, Vec<u8>) = range.into();
        // Every store reads at exactly the snapshot instant.
        let request = BackupRequest {
            cluster_id: self.cluster_id,
            start_key,
            end_key,
            start_version: ts.version(),
            end_version: ts.version(),
            path: path.to_string(),
        };
        info!(backup_ts = ?ts, stores = stores.len(), "Allocated backup timestamp");

        let pushed = self.push.push_backup(&request, &stores, cancel).await?;
        let mut ledger = pushed.ok;
        let rounds = self.fine_grained.run(&request, &mut ledger, cancel).await?;

        let duplicates = find_duplicate_files(&ledger);
        if !duplicates.is_empty() {
            counter!("ranger_backup_duplicate_files").increment(duplicates.len() as u64);
            for dup in &duplicates {
                warn!(file = %dup.name, ranges = dup.ranges.len(), "Duplicate backup file");
            }
            if self.config.fail_on_duplicate_files {
                return Err(BackupError::DuplicateFiles { count: duplicates.len() });
            }
        }

        if cancel.is_cancelled() {
            return Err(BackupError::Cancelled);
        }

        let manifest = BackupManifest {
            cluster_id: self.cluster_id,
            start_key: request.start_key,
            end_key: request.end_key,
            backup_ts: ts.version(),
            path: request.path,
            files: ledger.files(),
        };
        let manifest_path = self.writer.write(&manifest).await?;

        Ok(BackupReport { manifest, manifest_path, duplicates, rounds, elapsed: started.elapsed() })
    }

    async fn live_stores(&self) -> Result<Vec<StoreDescriptor>> {
        let stores = self.metadata.list_stores().await?;
        Ok(stores.into_iter().filter(|s| s.state != StoreState::Tombstone).collect())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use async_trait::async_trait;
    use futures_util::{stream, StreamExt};
    use ranger_core::{BackupFile, BackupResponse, LockInfo, Peer, SnapshotTimestamp};
    use tokio::sync::Mutex;

    use super::*;
    use crate::cluster::ResponseStream;

    /// Every store confirms exactly the range it is asked for.
    struct HealthyCluster {
        stores: Vec<StoreDescriptor>,
        backup_calls: Mutex<Vec<u64>>,
    }

    #[async_trait]
    impl MetadataClient for HealthyCluster {
        async fn cluster_id(&self) -> Result<u64> {
            Ok(9)
        }

        async fn allocate_timestamp(&self) -> Result<SnapshotTimestamp> {
            SnapshotTimestamp::from_parts(1_000, 3).map_err(BackupError::from)
        }

        async fn list_stores(&self) -> Result<Vec<StoreDescriptor>> {
            Ok(self.stores.clone())
        }

        async fn region_leader(&self, _encoded_key: &[u8]) -> Result<Option<Peer>> {
            Ok(Some(Peer { id: 1, store_id: 1 }))
        }
    }

    #[async_trait]
    impl StoreClient for HealthyCluster {
        async fn backup(&self, store_id: u64, request: BackupRequest) -> Result<ResponseStream> {
            self.backup_calls.lock().await.push(store_id);
            let file = BackupFile::new(
                format!("{store_id}.sst"),
                request.start_key.clone(),
                request.end_key.clone(),
            );
            let response =
                BackupResponse::confirmed(request.start_key, request.end_key, vec![file]);
            Ok(stream::iter(vec![Ok(response)]).boxed())
        }
    }

    #[async_trait]
    impl LockResolver for HealthyCluster {
        async fn resolve_locks(&self, _caller_version: u64, _locks: &[LockInfo]) -> Result<u64> {
            Ok(0)
        }
    }

    /// Manifest writer that only counts writes.
    #[derive(Default)]
    struct CountingWriter {
        writes: AtomicU32,
    }

    #[async_trait]
    impl ManifestWriter for CountingWriter {
        async fn write(&self, _manifest: &BackupManifest) -> Result<PathBuf> {
            self.writes.fetch_add(1, Ordering::SeqCst);
            Ok(PathBuf::from("backupmeta"))
        }
    }

    async fn client(
        stores: Vec<StoreDescriptor>,
    ) -> (BackupClient, Arc<HealthyCluster>, Arc<CountingWriter>) {
        let cluster = Arc::new(HealthyCluster { stores, backup_calls: Mutex::new(Vec::new()) });
        let writer = Arc::new(CountingWriter::default());
        let client = BackupClient::new(
            BackupConfig::default(),
            cluster.clone(),
            cluster.clone(),
            cluster.clone(),
            writer.clone(),
        )
        .await
        .unwrap();
        (client, cluster, writer)
    }

    #[tokio::test]
    async fn test_new_fetches_cluster_id() {
        let (client, _, _) = client(vec![]).await;
        assert_eq!(client.cluster_id(), 9);
    }

    #[tokio::test]
    async fn test_new_rejects_invalid_config() {
        let cluster = Arc::new(HealthyCluster { stores: vec![], backup_calls: Mutex::new(vec![]) });
        let result = BackupClient::new(
            BackupConfig::default().fine_grained_workers(0),
            cluster.clone(),
            cluster.clone(),
            cluster.clone(),
            Arc::new(CountingWriter::default()),
        )
        .await;
        assert!(matches!(result, Err(BackupError::Config(_))));
    }

    #[tokio::test]
    async fn test_invalid_range_rejected() {
        let (client, _, writer) = client(vec![]).await;
        let err = client.backup_range(b"m", b"a", "local:///tmp").await.unwrap_err();
        assert!(matches!(err, BackupError::InvalidRange(_)));
        assert_eq!(writer.writes.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_tombstoned_stores_are_skipped() {
        let stores = vec![
            StoreDescriptor::new(1, "store-1:20160"),
            StoreDescriptor::new(2, "store-2:20160").with_state(StoreState::Tombstone),
        ];
        let (client, cluster, writer) = client(stores).await;

        let report = client.backup_range(b"a", b"z", "local:///tmp").await.unwrap();

        assert_eq!(*cluster.backup_calls.lock().await, vec![1]);
        assert_eq!(report.rounds, 0);
        assert_eq!(report.manifest.cluster_id, 9);
        assert_eq!(report.manifest.backup_ts, (1_000 << 18) | 3);
        assert_eq!(report.manifest.files.len(), 1);
        assert_eq!(writer.writes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_file_manifest_uses_configured_dir() {
        let dir = tempfile::TempDir::new().unwrap();
        let cluster = Arc::new(HealthyCluster {
            stores: vec![StoreDescriptor::new(1, "store-1:20160")],
            backup_calls: Mutex::new(Vec::new()),
        });
        let client = BackupClient::with_file_manifest(
            BackupConfig::default().manifest_dir(dir.path()),
            cluster.clone(),
            cluster.clone(),
            cluster,
        )
        .await
        .unwrap();

        let report = client.backup_range(b"a", b"z", "local:///tmp").await.unwrap();
        assert_eq!(report.manifest_path, dir.path().join("backupmeta"));
        assert!(report.manifest_path.exists());
    }

    #[tokio::test]
    async fn test_cancelled_client_writes_nothing() {
        let (client, _, writer) = client(vec![StoreDescriptor::new(1, "store-1:20160")]).await;
        client.cancel();

        let err = client.backup_range(b"a", b"z", "local:///tmp").await.unwrap_err();
        assert!(matches!(err, BackupError::Cancelled));
        assert_eq!(writer.writes.load(Ordering::SeqCst), 0);
    }
}
