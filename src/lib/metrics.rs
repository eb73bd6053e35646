//! Count tables and diagnostics.
//!
//! Every counting call produces a [`CountTable`]: the number of reads (or read pairs) attributed
//! to each key plus the [`Diagnostics`] describing the reads that were not counted.  Tables from
//! different workers (or different batches of a session) are combined with
//! [`CountTable::update_with`]; since this is a plain sum the result does not depend on how reads
//! were split up.
//!
//! All tables are writable to TSV files.

use std::{hash::Hash, path::Path};

use ahash::AHashMap;
use anyhow::Result;
use bstr::BString;
use fgoxide::io::DelimFile;
use itertools::Itertools;
use serde::{Deserialize, Serialize};

use crate::{
    design::Pairing,
    matcher::{MatchResult, Unmatched},
};

/// The name given to the row of reads that matched no barcode.
pub const UNMATCHED_NAME: &str = "Unmatched";

/// Tallies of how reads were classified.
///
/// `total`, `matched` and `unmatched` are always kept; the per-reason counters are only filled
/// when detailed diagnostics are requested.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostics {
    /// The number of reads (or read pairs) examined.
    pub total: u64,
    /// The number counted against a key.
    pub matched: u64,
    /// The number not counted.
    pub unmatched: u64,
    pub too_short: u64,
    pub no_anchor: u64,
    pub no_barcode: u64,
    /// Reads where more than one barcode (or candidate position) fit equally well.
    pub ambiguous: u64,
    pub first_only: u64,
    pub second_only: u64,
    pub invalid_pair: u64,
}

impl Diagnostics {
    /// Record one unmatched read, tallying its reason if `detailed`.
    fn record_unmatched(&mut self, reason: Unmatched, detailed: bool) {
        self.unmatched += 1;
        if !detailed {
            return;
        }
        let counter = match reason {
            Unmatched::TooShort => &mut self.too_short,
            Unmatched::NoAnchor => &mut self.no_anchor,
            Unmatched::NoBarcode => &mut self.no_barcode,
            Unmatched::Ambiguous => &mut self.ambiguous,
            Unmatched::FirstOnly => &mut self.first_only,
            Unmatched::SecondOnly => &mut self.second_only,
            Unmatched::InvalidPair => &mut self.invalid_pair,
        };
        *counter += 1;
    }

    /// Add the tallies of another [`Diagnostics`] to this one.
    pub fn update_with(&mut self, other: &Self) {
        self.total += other.total;
        self.matched += other.matched;
        self.unmatched += other.unmatched;
        self.too_short += other.too_short;
        self.no_anchor += other.no_anchor;
        self.no_barcode += other.no_barcode;
        self.ambiguous += other.ambiguous;
        self.first_only += other.first_only;
        self.second_only += other.second_only;
        self.invalid_pair += other.invalid_pair;
    }

    /// Write a `diagnostics.tsv` file to the specified directory.
    pub fn write<P: AsRef<Path>>(&self, output_dir: P, prefix: &str) -> Result<()> {
        let filename = [prefix.to_string(), "diagnostics.tsv".to_string()].concat();
        let output_path = output_dir.as_ref().join(filename);
        let delim = DelimFile::default();
        delim.write_tsv(&output_path, std::iter::once(*self))?;
        Ok(())
    }
}

/// The number of reads counted against each key, with the diagnostics of the rest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CountTable<K: Eq + Hash> {
    counts: AHashMap<K, u64>,
    diagnostics: Diagnostics,
    detailed: bool,
}

impl<K: Eq + Hash> Default for CountTable<K> {
    fn default() -> Self {
        Self::new(false)
    }
}

impl<K: Eq + Hash> CountTable<K> {
    /// Create an empty table, tallying the reasons reads are unmatched if `detailed`.
    pub fn new(detailed: bool) -> Self {
        Self { counts: AHashMap::new(), diagnostics: Diagnostics::default(), detailed }
    }

    /// Record the result of matching one read (or read pair).
    pub fn record(&mut self, result: MatchResult<K>) {
        self.diagnostics.total += 1;
        match result {
            MatchResult::Match { key, .. } => {
                self.diagnostics.matched += 1;
                *self.counts.entry(key).or_insert(0) += 1;
            }
            MatchResult::NoMatch { reason } => {
                self.diagnostics.record_unmatched(reason, self.detailed);
            }
        }
    }

    /// Add the counts of another table to this one.
    pub fn update_with(&mut self, other: Self) {
        for (key, count) in other.counts {
            *self.counts.entry(key).or_insert(0) += count;
        }
        self.diagnostics.update_with(&other.diagnostics);
    }

    /// The count for `key`, zero if never seen.
    pub fn get(&self, key: &K) -> u64 {
        self.counts.get(key).copied().unwrap_or(0)
    }

    /// The number of distinct keys counted.
    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    /// The number of reads that matched no key.
    pub fn unmatched(&self) -> u64 {
        self.diagnostics.unmatched
    }

    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    pub fn iter(&self) -> impl Iterator<Item = (&K, u64)> {
        self.counts.iter().map(|(k, c)| (k, *c))
    }

    /// The counted keys in ascending order.
    pub fn sorted(&self) -> Vec<(&K, u64)>
    where
        K: Ord,
    {
        self.iter().sorted_unstable_by(|a, b| a.0.cmp(b.0)).collect()
    }

    /// The counted keys from most to least frequent, ties in ascending key order.
    pub fn most_frequent(&self) -> Vec<(&K, u64)>
    where
        K: Ord,
    {
        self.iter().sorted_unstable_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0))).collect()
    }
}

impl CountTable<usize> {
    /// The count of every barcode in a pool of `n`, zeros included.
    pub fn counts_by_index(&self, n: usize) -> Vec<u64> {
        (0..n).map(|i| self.get(&i)).collect()
    }
}

/// A row of a single-barcode count table.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct BarcodeCount {
    /// The index of the barcode in the pool; empty for the unmatched row.
    pub index: Option<usize>,
    pub barcode: String,
    pub count: u64,
}

/// A row of a two-barcode count table.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct PairCount {
    pub index1: usize,
    pub barcode1: String,
    pub index2: usize,
    pub barcode2: String,
    pub count: u64,
}

/// A row of a random-barcode count table.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct SequenceCount {
    pub sequence: String,
    pub count: u64,
}

/// The path of a file named `name` with `prefix` in `output_dir`.
fn output_path<P: AsRef<Path>>(output_dir: P, prefix: &str, name: &str) -> std::path::PathBuf {
    output_dir.as_ref().join([prefix, name].concat())
}

/// Write a `counts.tsv` file with one row per barcode in `pool` (zeros included) followed by the
/// unmatched row.
pub fn write_single_counts<P: AsRef<Path>>(
    table: &CountTable<usize>,
    pool: &[BString],
    output_dir: P,
    prefix: &str,
) -> Result<()> {
    let rows = pool
        .iter()
        .zip(table.counts_by_index(pool.len()))
        .enumerate()
        .map(|(index, (barcode, count))| BarcodeCount {
            index: Some(index),
            barcode: barcode.to_string(),
            count,
        })
        .chain(std::iter::once(BarcodeCount {
            index: None,
            barcode: UNMATCHED_NAME.to_string(),
            count: table.unmatched(),
        }));
    let delim = DelimFile::default();
    delim.write_tsv(&output_path(output_dir, prefix, "counts.tsv"), rows)?;
    Ok(())
}

/// Write a `counts.tsv` file with one row per pair of barcodes.
///
/// With listed combinations every listed pair is written, zeros included.  Otherwise only the
/// observed pairs are written.  Rows are in ascending index order.
pub fn write_pair_counts<P: AsRef<Path>>(
    table: &CountTable<(usize, usize)>,
    pools: (&[BString], &[BString]),
    pairing: &Pairing,
    output_dir: P,
    prefix: &str,
) -> Result<()> {
    let keys: Vec<(usize, usize)> = match pairing {
        Pairing::Listed(pairs) => pairs.iter().copied().sorted_unstable().dedup().collect(),
        Pairing::AnyCombination => table.sorted().into_iter().map(|(key, _)| *key).collect(),
    };
    let rows = keys.into_iter().map(|(index1, index2)| PairCount {
        index1,
        barcode1: pools.0[index1].to_string(),
        index2,
        barcode2: pools.1[index2].to_string(),
        count: table.get(&(index1, index2)),
    });
    let delim = DelimFile::default();
    delim.write_tsv(&output_path(output_dir, prefix, "counts.tsv"), rows)?;
    Ok(())
}

/// Write a `counts.tsv` file with one row per observed sequence, most frequent first.
pub fn write_sequence_counts<P: AsRef<Path>>(
    table: &CountTable<BString>,
    output_dir: P,
    prefix: &str,
) -> Result<()> {
    let rows = table
        .most_frequent()
        .into_iter()
        .map(|(sequence, count)| SequenceCount { sequence: sequence.to_string(), count });
    let delim = DelimFile::default();
    delim.write_tsv(&output_path(output_dir, prefix, "counts.tsv"), rows)?;
    Ok(())
}
