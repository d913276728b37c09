// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (c) 2025 The Ranger Authors

//! Backup manifest and its writers.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use ranger_core::BackupFile;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{BackupError, Result};

/// File name of the manifest inside the output directory.
pub const MANIFEST_FILE_NAME: &str = "backupmeta";

/// Description of a finished backup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupManifest {
    /// Cluster the data was read from.
    pub cluster_id: u64,
    /// Inclusive start of the backed up range.
    pub start_key: Vec<u8>,
    /// Exclusive end of the backed up range; empty means unbounded.
    pub end_key: Vec<u8>,
    /// Snapshot version every store read at.
    pub backup_ts: u64,
    /// Storage location the stores wrote their files to.
    pub path: String,
    /// Every file produced, in key order.
    pub files: Vec<BackupFile>,
}

impl BackupManifest {
    /// Encodes the manifest in its binary form.
    ///
    /// # Errors
    ///
    /// Returns [`BackupError::Manifest`] if serialization fails.
    pub fn encode(&self) -> Result<Vec<u8>> {
        bincode::serialize(self)
            .map_err(|e| BackupError::Manifest(format!("failed to encode manifest: {e}")))
    }

    /// Decodes a manifest produced by [`BackupManifest::encode`].
    ///
    /// # Errors
    ///
    /// Returns [`BackupError::Manifest`] if the bytes are not a manifest.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        bincode::deserialize(bytes)
            .map_err(|e| BackupError::Manifest(format!("failed to decode manifest: {e}")))
    }

    /// Total number of key-value pairs across all files.
    pub fn total_kvs(&self) -> u64 {
        self.files.iter().map(|f| f.total_kvs).sum()
    }

    /// Total size in bytes across all files.
    pub fn total_bytes(&self) -> u64 {
        self.files.iter().map(|f| f.total_bytes).sum()
    }
}

/// Persists a finished manifest.
#[async_trait]
pub trait ManifestWriter: Send + Sync {
    /// Writes the manifest and returns where it went.
    async fn write(&self, manifest: &BackupManifest) -> Result<PathBuf>;
}

/// Writes the manifest to `backupmeta` inside a directory.
///
/// An existing manifest is overwritten.
#[derive(Debug, Clone)]
pub struct FileManifestWriter {
    dir: PathBuf,
}

impl FileManifestWriter {
    /// Creates a writer for `dir`.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Output directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Full path of the manifest file.
    pub fn manifest_path(&self) -> PathBuf {
        self.dir.join(MANIFEST_FILE_NAME)
    }
}

#[async_trait]
impl ManifestWriter for FileManifestWriter {
    async fn write(&self, manifest: &BackupManifest) -> Result<PathBuf> {
        let bytes = manifest.encode()?;
        tokio::fs::create_dir_all(&self.dir).await?;

        let path = self.manifest_path();
        tokio::fs::write(&path, &bytes).await?;

        info!(
            path = %path.display(),
            files = manifest.files.len(),
            bytes = bytes.len(),
            "Wrote backup manifest"
        );
        Ok(path)
    }
}
