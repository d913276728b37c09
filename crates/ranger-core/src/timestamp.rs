// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (c) 2025 The Ranger Authors

//! Snapshot timestamps allocated by the cluster's timestamp oracle.
//!
//! A backup reads every region at one version. The oracle hands out a
//! `(physical, logical)` pair which is packed into a single `u64` version:
//!
//! - Bits 18-63 (46 bits): physical time in milliseconds since Unix epoch
//! - Bits 0-17 (18 bits): logical counter
//!
//! Comparing the packed values orders timestamps by physical time first and
//! logical counter second.
//!
//! # Example
//!
//! ```
//! use ranger_core::SnapshotTimestamp;
//!
//! let ts = SnapshotTimestamp::from_parts(1_700_000_000_000, 7).unwrap();
//! assert_eq!(SnapshotTimestamp::from_version(ts.version()), ts);
//! assert_eq!(ts.logical(), 7);
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Number of bits reserved for the logical counter.
pub const LOGICAL_BITS: u32 = 18;

/// Mask for the logical counter component.
const LOGICAL_MASK: u64 = (1 << LOGICAL_BITS) - 1;

/// A snapshot timestamp packed as a single version number.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[repr(transparent)]
pub struct SnapshotTimestamp(u64);

impl SnapshotTimestamp {
    /// Packs a physical time and logical counter.
    ///
    /// # Errors
    ///
    /// Returns [`Error::LogicalOverflow`] if `logical` does not fit in
    /// [`LOGICAL_BITS`] bits.
    pub fn from_parts(physical_ms: u64, logical: u64) -> Result<Self> {
        if logical > LOGICAL_MASK {
            return Err(Error::LogicalOverflow { logical, max: LOGICAL_MASK });
        }
        Ok(Self((physical_ms << LOGICAL_BITS) | logical))
    }

    /// Wraps an already packed version.
    #[must_use]
    pub const fn from_version(version: u64) -> Self {
        Self(version)
    }

    /// Returns the packed version sent to storage nodes.
    #[must_use]
    pub const fn version(&self) -> u64 {
        self.0
    }

    /// Returns the physical component in milliseconds since Unix epoch.
    #[must_use]
    pub const fn physical_ms(&self) -> u64 {
        self.0 >> LOGICAL_BITS
    }

    /// Returns the logical component.
    #[must_use]
    pub const fn logical(&self) -> u64 {
        self.0 & LOGICAL_MASK
    }
}

impl fmt::Debug for SnapshotTimestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SnapshotTimestamp({}:{})", self.physical_ms(), self.logical())
    }
}

impl fmt::Display for SnapshotTimestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<SnapshotTimestamp> for u64 {
    fn from(ts: SnapshotTimestamp) -> Self {
        ts.version()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pack_layout() {
        let ts = SnapshotTimestamp::from_parts(1, 0).unwrap();
        assert_eq!(ts.version(), 1 << 18);

        let ts = SnapshotTimestamp::from_parts(1, 5).unwrap();
        assert_eq!(ts.version(), (1 << 18) + 5);
        assert_eq!(ts.physical_ms(), 1);
        assert_eq!(ts.logical(), 5);
    }

    #[test]
    fn test_logical_overflow() {
        assert!(SnapshotTimestamp::from_parts(1, LOGICAL_MASK).is_ok());
        let err = SnapshotTimestamp::from_parts(1, LOGICAL_MASK + 1).unwrap_err();
        assert!(matches!(err, Error::LogicalOverflow { .. }));
    }

    #[test]
    fn test_ordering() {
        let a = SnapshotTimestamp::from_parts(100, 9).unwrap();
        let b = SnapshotTimestamp::from_parts(101, 0).unwrap();
        let c = SnapshotTimestamp::from_parts(101, 1).unwrap();
        assert!(a < b);
        assert!(b < c);
    }

    #[test]
    fn test_display_is_version() {
        let ts = SnapshotTimestamp::from_version(42);
        assert_eq!(ts.to_string(), "42");
        assert_eq!(format!("{ts:?}"), "SnapshotTimestamp(0:42)");
    }
}
