//! Sliding every barcode length across a read.
//!
//! For each candidate length, ascending, the leftmost window is hashed and looked up, then the
//! window slides one base at a time to the end of the read with its key and validity updated
//! incrementally.  The policy is fixed:
//!
//! - a hit on the very first window of a length ends the scan of the whole read,
//! - a hit further along only ends the slide for that length; longer lengths are still tried and
//!   a later (longer) hit replaces the earlier one,
//! - lengths longer than the read end the scan.
//!
//! The reported match is therefore the one for the longest length that matches anywhere, unless
//! some length matches at offset zero first.
//!
//! With deletions enabled, a read starting with an exact barcode of length `L` also starts with
//! one of that barcode's deletion variants at length `L - 1`.  The shorter length is tried first,
//! so the read is reported as a [`MatchKind::Deletion`] costing one mismatch, and that count is
//! what strand and candidate selection see.

use crate::{
    dictionary::{Dictionary, Lookup, MatchKind},
    hasher::RollingWindow,
};

/// A barcode found within a read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanMatch {
    /// The index of the barcode in the pool.
    pub barcode_index: usize,
    pub kind: MatchKind,
    /// The offset of the matching window in the read.
    pub position: usize,
    /// The length of the matching window.
    pub length: usize,
}

/// The outcome of scanning a read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanResult {
    Match(ScanMatch),
    /// No window matched, but at least one window hit a key shared by several barcodes.
    Ambiguous,
    NoMatch,
}

impl ScanResult {
    pub fn is_match(&self) -> bool {
        matches!(self, Self::Match(_))
    }

    /// The matched barcode, if any.
    pub fn barcode_index(&self) -> Option<usize> {
        match self {
            Self::Match(m) => Some(m.barcode_index),
            Self::Ambiguous | Self::NoMatch => None,
        }
    }
}

/// Scan `read` for barcodes in `dictionary`, trying each of `lengths` (ascending) in turn.
pub fn scan_read(read: &[u8], dictionary: &Dictionary, lengths: &[usize]) -> ScanResult {
    debug_assert!(lengths.windows(2).all(|w| w[0] < w[1]), "lengths must be ascending");

    let mut found: Option<ScanMatch> = None;
    let mut saw_ambiguous = false;

    for &length in lengths {
        if length > read.len() {
            break;
        }
        let mut window = match RollingWindow::new(read, length) {
            Some(window) => window,
            None => continue,
        };

        // The first window: a hit here ends the scan entirely.
        if window.is_valid() {
            match dictionary.lookup(length, window.key()) {
                Lookup::Hit { barcode_index, kind } => {
                    return ScanResult::Match(ScanMatch {
                        barcode_index,
                        kind,
                        position: 0,
                        length,
                    });
                }
                Lookup::Ambiguous => saw_ambiguous = true,
                Lookup::Miss => (),
            }
        }

        while window.advance() {
            if !window.is_valid() {
                continue;
            }
            match dictionary.lookup(length, window.key()) {
                Lookup::Hit { barcode_index, kind } => {
                    found = Some(ScanMatch {
                        barcode_index,
                        kind,
                        position: window.start(),
                        length,
                    });
                    break;
                }
                Lookup::Ambiguous => saw_ambiguous = true,
                Lookup::Miss => (),
            }
        }
    }

    match found {
        Some(m) => ScanResult::Match(m),
        None if saw_ambiguous => ScanResult::Ambiguous,
        None => ScanResult::NoMatch,
    }
}
