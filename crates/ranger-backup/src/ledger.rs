// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (c) 2025 The Ranger Authors

//! Interval ledger of confirmed backup ranges.
//!
//! The ledger records which parts of the requested key range some store has
//! exported, together with the files produced for them. It answers one
//! question for the retry loop: which sub-ranges are still missing.
//!
//! Entries are kept in a `BTreeMap` keyed by start key and never overlap.
//! Touching entries are not merged; `complement` walks across them.

use std::collections::BTreeMap;
use std::ops::Bound;

use ranger_core::{before_end, BackupFile, KeyRange};
use tracing::debug;

/// A confirmed range and the files a single store produced for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfirmedRange {
    /// Inclusive start key.
    pub start: Vec<u8>,
    /// Exclusive end key; empty means unbounded.
    pub end: Vec<u8>,
    /// Files produced for the range.
    pub files: Vec<BackupFile>,
}

impl ConfirmedRange {
    /// Returns the key range of the entry.
    pub fn range(&self) -> KeyRange {
        KeyRange::new_unchecked(self.start.clone(), self.end.clone())
    }
}

/// Sorted, non-overlapping set of confirmed ranges.
#[derive(Debug, Default, Clone)]
pub struct RangeLedger {
    entries: BTreeMap<Vec<u8>, ConfirmedRange>,
}

impl RangeLedger {
    /// Creates an empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if nothing has been recorded.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates entries in key order.
    pub fn iter(&self) -> impl Iterator<Item = &ConfirmedRange> {
        self.entries.values()
    }

    /// Flattens the files of every entry in key order.
    pub fn files(&self) -> Vec<BackupFile> {
        self.entries.values().flat_map(|r| r.files.iter().cloned()).collect()
    }

    /// Returns the ordered sub-ranges of `[start, end)` not yet covered.
    pub fn complement(&self, start: &[u8], end: &[u8]) -> Vec<KeyRange> {
        let mut gaps = Vec::new();
        if !before_end(start, end) {
            return gaps;
        }
        let mut cursor = start.to_vec();

        for entry in self.candidates(start) {
            if !before_end(&entry.start, end) {
                break;
            }
            // Entry ends at or before the cursor; it contributes nothing.
            if !before_end(&cursor, &entry.end) {
                continue;
            }
            if entry.start > cursor {
                gaps.push(KeyRange::new_unchecked(cursor, entry.start.clone()));
            }
            if entry.end.is_empty() {
                return gaps;
            }
            cursor = entry.end.clone();
            if !before_end(&cursor, end) {
                return gaps;
            }
        }

        gaps.push(KeyRange::new_unchecked(cursor, end.to_vec()));
        gaps
    }

    /// Records that `[start, end)` was exported into `files`.
    ///
    /// Returns false if the range was already fully covered, in which case
    /// the ledger is unchanged. Entries lying entirely inside the new range
    /// are replaced by it; the new entry is clipped against neighbours that
    /// straddle its bounds so entries never overlap.
    pub fn confirm(&mut self, start: &[u8], end: &[u8], files: Vec<BackupFile>) -> bool {
        let gaps = self.complement(start, end);
        if gaps.is_empty() {
            debug!(start_key = ?start, end_key = ?end, "range already covered, skipping");
            return false;
        }

        let incoming = KeyRange::new_unchecked(start.to_vec(), end.to_vec());
        let contained: Vec<Vec<u8>> = self
            .candidates(start)
            .take_while(|entry| before_end(&entry.start, end))
            .filter(|entry| incoming.covers(&entry.range()))
            .map(|entry| entry.start.clone())
            .collect();
        for key in &contained {
            self.entries.remove(key);
        }

        // Only neighbours straddling the bounds remain, so the gap is contiguous.
        let gaps = if contained.is_empty() { gaps } else { self.complement(start, end) };
        let (clip_start, clip_end) = match (gaps.first(), gaps.last()) {
            (Some(first), Some(last)) => (first.start.clone(), last.end.clone()),
            _ => (start.to_vec(), end.to_vec()),
        };

        self.entries
            .insert(clip_start.clone(), ConfirmedRange { start: clip_start, end: clip_end, files });
        true
    }

    /// Records a range a store failed to export.
    pub fn record_failure(&mut self, start: &[u8], end: &[u8]) -> bool {
        self.confirm(start, end, Vec::new())
    }

    /// Entries that may overlap keys at or after `start`, in key order.
    fn candidates<'a>(&'a self, start: &'a [u8]) -> impl Iterator<Item = &'a ConfirmedRange> {
        let first = self
            .entries
            .range::<[u8], _>((Bound::Unbounded, Bound::Included(start)))
            .next_back()
            .map(|(key, _)| key.as_slice())
            .unwrap_or(start);
        self.entries.range::<[u8], _>((Bound::Included(first), Bound::Unbounded)).map(|(_, r)| r)
    }
}
