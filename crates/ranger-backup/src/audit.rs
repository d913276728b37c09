// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (c) 2025 The Ranger Authors

//! Duplicate file detection over a completed ledger.

use std::collections::BTreeMap;

use ranger_core::KeyRange;

use crate::ledger::RangeLedger;

/// A file name reported by more than one confirmed range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DuplicateFile {
    /// The file name.
    pub name: String,
    /// Every confirmed range that listed the file, in key order.
    pub ranges: Vec<KeyRange>,
}

/// Returns the files that appear under more than one ledger entry, sorted by
/// name.
pub fn find_duplicate_files(ledger: &RangeLedger) -> Vec<DuplicateFile> {
    let mut seen: BTreeMap<&str, Vec<KeyRange>> = BTreeMap::new();
    for entry in ledger.iter() {
        for file in &entry.files {
            let ranges = seen.entry(file.name.as_str()).or_default();
            // A range listing the same file twice is one producer.
            if ranges.last().map_or(true, |r| r.start != entry.start) {
                ranges.push(entry.range());
            }
        }
    }

    seen.into_iter()
        .filter(|(_, ranges)| ranges.len() > 1)
        .map(|(name, ranges)| DuplicateFile { name: name.to_string(), ranges })
        .collect()
}

#[cfg(test)]
mod tests {
    use ranger_core::BackupFile;

    use super::*;

    fn file(name: &str) -> BackupFile {
        BackupFile::new(name, Vec::new(), Vec::new())
    }

    #[test]
    fn test_distinct_files_are_clean() {
        let mut ledger = RangeLedger::new();
        ledger.confirm(b"a", b"h", vec![file("1_a_write.sst"), file("1_a_default.sst")]);
        ledger.confirm(b"h", b"m", vec![file("2_h_write.sst")]);

        assert!(find_duplicate_files(&ledger).is_empty());
    }

    #[test]
    fn test_reports_file_listed_by_two_ranges() {
        let mut ledger = RangeLedger::new();
        ledger.confirm(b"a", b"h", vec![file("shared.sst"), file("1_a.sst")]);
        ledger.confirm(b"h", b"m", vec![file("2_h.sst")]);
        ledger.confirm(b"m", b"", vec![file("shared.sst")]);

        let dups = find_duplicate_files(&ledger);
        assert_eq!(dups.len(), 1);
        assert_eq!(dups[0].name, "shared.sst");
        assert_eq!(
            dups[0].ranges,
            vec![
                KeyRange::new_unchecked(b"a".to_vec(), b"h".to_vec()),
                KeyRange::new_unchecked(b"m".to_vec(), Vec::new()),
            ]
        );
    }

    #[test]
    fn test_same_range_listing_twice_is_not_duplicate() {
        let mut ledger = RangeLedger::new();
        ledger.confirm(b"a", b"h", vec![file("x.sst"), file("x.sst")]);

        assert!(find_duplicate_files(&ledger).is_empty());
    }

    #[test]
    fn test_empty_ledger() {
        assert!(find_duplicate_files(&RangeLedger::new()).is_empty());
    }
}
