// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (c) 2025 The Ranger Authors

//! Error types for core Ranger values.

use thiserror::Error;

/// A specialized `Result` type for core operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors produced while building core values.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    /// The start key does not sort before the end key.
    #[error("invalid key range: start {start:?} is not before end {end:?}")]
    InvalidRange {
        /// Requested start key.
        start: Vec<u8>,
        /// Requested end key.
        end: Vec<u8>,
    },

    /// The logical component does not fit in the timestamp layout.
    #[error("logical counter {logical} exceeds {max}")]
    LogicalOverflow {
        /// Requested logical value.
        logical: u64,
        /// Largest representable logical value.
        max: u64,
    },
}
