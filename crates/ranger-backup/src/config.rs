// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (c) 2025 The Ranger Authors

//! Configuration for the backup coordinator.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{BackupError, Result};

/// Default number of concurrent fine-grained workers per round.
pub const DEFAULT_FINE_GRAINED_WORKERS: usize = 4;

/// Default total backoff budget of one backup in milliseconds.
pub const DEFAULT_MAX_BACKOFF_MS: u64 = 80_000;

/// Default delay after a transient region error in milliseconds.
pub const DEFAULT_REGION_ERROR_BACKOFF_MS: u64 = 1_000;

/// Default number of leader lookups before giving up.
pub const DEFAULT_LEADER_LOOKUP_ATTEMPTS: u32 = 5;

/// Default step of the linear leader lookup delay in milliseconds.
pub const DEFAULT_LEADER_LOOKUP_DELAY_MS: u64 = 100;

/// Configuration for the backup coordinator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackupConfig {
    /// Number of workers retrying incomplete ranges in each round.
    pub fine_grained_workers: usize,

    /// Total time one backup may spend sleeping between rounds.
    pub max_backoff_ms: u64,

    /// Delay requested after a transient region error.
    pub region_error_backoff_ms: u64,

    /// Number of leader lookups before a range fails with no leader.
    pub leader_lookup_attempts: u32,

    /// Step of the linear delay between leader lookups.
    ///
    /// Lookup `n` (counted from 0) is preceded by a delay of `n * step`.
    pub leader_lookup_delay_ms: u64,

    /// Directory the manifest is written to by
    /// [`BackupClient::with_file_manifest`](crate::BackupClient::with_file_manifest).
    /// Ignored when the client is given its own writer.
    pub manifest_dir: PathBuf,

    /// Whether duplicate output files fail the backup instead of being reported.
    pub fail_on_duplicate_files: bool,
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            fine_grained_workers: DEFAULT_FINE_GRAINED_WORKERS,
            max_backoff_ms: DEFAULT_MAX_BACKOFF_MS,
            region_error_backoff_ms: DEFAULT_REGION_ERROR_BACKOFF_MS,
            leader_lookup_attempts: DEFAULT_LEADER_LOOKUP_ATTEMPTS,
            leader_lookup_delay_ms: DEFAULT_LEADER_LOOKUP_DELAY_MS,
            manifest_dir: PathBuf::from("."),
            fail_on_duplicate_files: false,
        }
    }
}

impl BackupConfig {
    /// Creates a new configuration with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| BackupError::Config(format!("{}: {e}", path.display())))?;
        Self::parse(&content)
    }

    /// Parses configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the string cannot be parsed.
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| BackupError::Config(e.to_string()))
    }

    /// Sets the number of fine-grained workers.
    pub fn fine_grained_workers(mut self, workers: usize) -> Self {
        self.fine_grained_workers = workers;
        self
    }

    /// Sets the total backoff budget.
    pub fn max_backoff(mut self, budget: Duration) -> Self {
        self.max_backoff_ms = budget.as_millis() as u64;
        self
    }

    /// Sets the delay applied after a transient region error.
    pub fn region_error_backoff(mut self, delay: Duration) -> Self {
        self.region_error_backoff_ms = delay.as_millis() as u64;
        self
    }

    /// Sets the number of leader lookup attempts.
    pub fn leader_lookup_attempts(mut self, attempts: u32) -> Self {
        self.leader_lookup_attempts = attempts;
        self
    }

    /// Sets the step of the linear leader lookup delay.
    pub fn leader_lookup_delay(mut self, delay: Duration) -> Self {
        self.leader_lookup_delay_ms = delay.as_millis() as u64;
        self
    }

    /// Sets the manifest directory.
    pub fn manifest_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.manifest_dir = dir.into();
        self
    }

    /// Sets whether duplicate files fail the backup.
    pub fn fail_on_duplicate_files(mut self, fail: bool) -> Self {
        self.fail_on_duplicate_files = fail;
        self
    }

    /// Returns the backoff budget as a Duration.
    pub fn max_backoff_duration(&self) -> Duration {
        Duration::from_millis(self.max_backoff_ms)
    }

    /// Returns the region error delay as a Duration.
    pub fn region_error_backoff_duration(&self) -> Duration {
        Duration::from_millis(self.region_error_backoff_ms)
    }

    /// Returns the leader lookup delay step as a Duration.
    pub fn leader_lookup_delay_duration(&self) -> Duration {
        Duration::from_millis(self.leader_lookup_delay_ms)
    }

    /// Validates the configuration.
    pub fn validate(&self) -> std::result::Result<(), ConfigValidationError> {
        if self.fine_grained_workers == 0 {
            return Err(ConfigValidationError::InvalidWorkerCount);
        }
        if self.max_backoff_ms == 0 {
            return Err(ConfigValidationError::InvalidBackoffBudget);
        }
        if self.leader_lookup_attempts == 0 {
            return Err(ConfigValidationError::InvalidLookupAttempts);
        }
        Ok(())
    }
}

/// Errors from configuration validation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigValidationError {
    /// At least one worker is required.
    #[error("fine grained workers must be at least 1")]
    InvalidWorkerCount,

    /// The backoff budget must be positive.
    #[error("max backoff must be positive")]
    InvalidBackoffBudget,

    /// At least one leader lookup is required.
    #[error("leader lookup attempts must be at least 1")]
    InvalidLookupAttempts,
}

impl From<ConfigValidationError> for BackupError {
    fn from(err: ConfigValidationError) -> Self {
        Self::Config(err.to_string())
    }
}
