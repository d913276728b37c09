// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (c) 2025 The Ranger Authors

//! Keys and half-open key ranges.
//!
//! Keys are opaque byte strings ordered lexicographically. A range covers
//! `[start, end)`. An empty `end` is the infinity sentinel and sorts after
//! every key; an empty `start` is simply the smallest key.

use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Compares two range end bounds, treating an empty bound as infinity.
pub fn cmp_end_bounds(a: &[u8], b: &[u8]) -> Ordering {
    match (a.is_empty(), b.is_empty()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (false, false) => a.cmp(b),
    }
}

/// Returns true if `key` sorts strictly before the end bound `end`.
#[inline]
pub fn before_end(key: &[u8], end: &[u8]) -> bool {
    end.is_empty() || key < end
}

/// A half-open key interval `[start, end)`.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct KeyRange {
    /// Inclusive start key.
    pub start: Vec<u8>,
    /// Exclusive end key; empty means unbounded.
    pub end: Vec<u8>,
}

impl KeyRange {
    /// Creates a range, rejecting empty or inverted intervals.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidRange`] if `start >= end` and `end` is not the
    /// infinity sentinel.
    pub fn new(start: impl Into<Vec<u8>>, end: impl Into<Vec<u8>>) -> Result<Self> {
        let start = start.into();
        let end = end.into();
        if !before_end(&start, &end) {
            return Err(Error::InvalidRange { start, end });
        }
        Ok(Self { start, end })
    }

    /// Creates a range from bounds the caller already knows are ordered.
    #[must_use]
    pub fn new_unchecked(start: Vec<u8>, end: Vec<u8>) -> Self {
        Self { start, end }
    }

    /// Returns true if the range extends to infinity.
    #[must_use]
    pub fn is_unbounded(&self) -> bool {
        self.end.is_empty()
    }

    /// Returns true if `key` falls inside the range.
    #[must_use]
    pub fn contains(&self, key: &[u8]) -> bool {
        key >= self.start.as_slice() && before_end(key, &self.end)
    }

    /// Returns true if the two ranges share at least one key.
    #[must_use]
    pub fn overlaps(&self, other: &KeyRange) -> bool {
        before_end(&self.start, &other.end) && before_end(&other.start, &self.end)
    }

    /// Returns true if `other` lies entirely within this range.
    #[must_use]
    pub fn covers(&self, other: &KeyRange) -> bool {
        self.start <= other.start && cmp_end_bounds(&other.end, &self.end) != Ordering::Greater
    }
}

impl fmt::Debug for KeyRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, ", escape(&self.start))?;
        if self.end.is_empty() {
            write!(f, "+inf)")
        } else {
            write!(f, "{})", escape(&self.end))
        }
    }
}

impl fmt::Display for KeyRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

impl From<KeyRange> for (Vec<u8>, Vec<u8>) {
    fn from(range: KeyRange) -> Self {
        (range.start, range.end)
    }
}

/// Renders a key as printable ASCII with hex escapes.
pub fn escape(key: &[u8]) -> String {
    key.iter().flat_map(|b| std::ascii::escape_default(*b)).map(char::from).collect()
}
