//! Structured configuration of a screen: which reads carry which barcode regions, how those
//! regions are anchored, and which barcode combinations are expected.

use ahash::AHashMap;
use anyhow::anyhow;
use bstr::BString;
use clap::{ArgEnum, PossibleValue};

use crate::errors::ConfigError;

/// Which orientation(s) of a read to search.
#[derive(ArgEnum, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Strand {
    /// The read as sequenced.
    Forward,
    /// The reverse complement of the read.
    Reverse,
    /// The read as sequenced, then its reverse complement.
    Both,
}

impl Strand {
    pub fn possible_values<'a>() -> impl Iterator<Item = PossibleValue<'a>> {
        Strand::value_variants().iter().filter_map(ArgEnum::to_possible_value)
    }

    /// The orientations to search, in order; `true` is the reverse complement.
    pub fn orientations(self) -> &'static [bool] {
        match self {
            Self::Forward => &[false],
            Self::Reverse => &[true],
            Self::Both => &[false, true],
        }
    }
}

impl Default for Strand {
    fn default() -> Self {
        Self::Forward
    }
}

impl std::str::FromStr for Strand {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        for variant in Self::value_variants() {
            if variant.to_possible_value().map_or(false, |v| v.matches(s, true)) {
                return Ok(*variant);
            }
        }
        Err(anyhow!("Invalid strand: {}", s))
    }
}

/// One barcode region within one read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Region {
    /// The constant region with `N` runs for the variable region(s).  Empty for an unanchored
    /// region, which is found by scanning the whole read.
    pub constant: BString,
    /// The default orientation(s) to search.
    pub strand: Strand,
    /// The mismatch budget, shared by the constant bases and the barcode(s).
    pub max_mismatches: usize,
}

impl Region {
    pub fn new<C: Into<BString>>(constant: C, strand: Strand, max_mismatches: usize) -> Self {
        Self { constant: constant.into(), strand, max_mismatches }
    }

    /// A region searched for by sliding the barcodes across the whole read.
    pub fn unanchored(strand: Strand, max_mismatches: usize) -> Self {
        Self::new("", strand, max_mismatches)
    }

    pub fn is_anchored(&self) -> bool {
        !self.constant.is_empty()
    }
}

/// Which pairs of barcodes (one from each pool) are valid combinations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Pairing {
    /// Every pair of barcodes is counted (combinatorial screens).
    AnyCombination,
    /// Only the listed `(first, second)` index pairs are counted; any other pair is an invalid
    /// combination (dual-barcode screens).
    Listed(Vec<(usize, usize)>),
}

impl Pairing {
    /// Split two parallel columns of barcodes, where row `i` is an expected combination, into two
    /// pools of distinct barcodes (in order of first appearance) and the listed combinations.
    ///
    /// # Errors
    ///
    /// - [`ConfigError::UnequalPoolColumns`] if the columns have different lengths
    /// - [`ConfigError::EmptyPool`] if the columns are empty
    pub fn from_paired_columns<S: AsRef<[u8]>>(
        first: &[S],
        second: &[S],
    ) -> Result<(Vec<BString>, Vec<BString>, Pairing), ConfigError> {
        if first.len() != second.len() {
            return Err(ConfigError::UnequalPoolColumns {
                first: first.len(),
                second: second.len(),
            });
        }
        if first.is_empty() {
            return Err(ConfigError::EmptyPool);
        }
        let (pool1, indices1) = dedup_column(first);
        let (pool2, indices2) = dedup_column(second);
        let mut pairs: Vec<(usize, usize)> = indices1.into_iter().zip(indices2).collect();
        pairs.sort_unstable();
        pairs.dedup();
        Ok((pool1, pool2, Pairing::Listed(pairs)))
    }

    /// Check that every listed combination refers to barcodes within pools of the given sizes.
    pub(crate) fn validate(&self, len1: usize, len2: usize) -> Result<(), ConfigError> {
        if let Pairing::Listed(pairs) = self {
            if let Some((first, second)) = pairs.iter().find(|(i, j)| *i >= len1 || *j >= len2) {
                return Err(ConfigError::CombinationOutOfRange { first: *first, second: *second });
            }
        }
        Ok(())
    }
}

/// The distinct values of a column, in order of first appearance, and each row's index into them.
fn dedup_column<S: AsRef<[u8]>>(column: &[S]) -> (Vec<BString>, Vec<usize>) {
    let mut seen: AHashMap<&[u8], usize> = AHashMap::new();
    let mut pool = vec![];
    let indices = column
        .iter()
        .map(|value| {
            let value = value.as_ref();
            *seen.entry(value).or_insert_with(|| {
                pool.push(BString::from(value));
                pool.len() - 1
            })
        })
        .collect();
    (pool, indices)
}

/// A screen with one barcode per read.
#[derive(Debug, Clone)]
pub struct SingleDesign {
    pub pool: Vec<BString>,
    pub region: Region,
}

/// Where the two barcode regions of a paired design are found.
#[derive(Debug, Clone)]
pub enum PairLayout {
    /// Both regions are in the same read, described by one constant with two `N` runs.
    SingleEnd { region: Region },
    /// The first region is in read 1, the second in read 2.
    PairedEnd { read1: Region, read2: Region },
}

/// A screen with two barcodes per fragment, one from each pool.
#[derive(Debug, Clone)]
pub struct PairDesign {
    pub layout: PairLayout,
    pub pools: (Vec<BString>, Vec<BString>),
    pub pairing: Pairing,
    /// If the two barcodes may appear in either order, the swapped order is tried when the
    /// expected order does not yield both barcodes.
    pub randomized: bool,
}

/// A screen with no known barcodes: the sequence of the variable region is the count key.
#[derive(Debug, Clone)]
pub struct RandomDesign {
    pub region: Region,
}

/// Options shared by every design.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CountOptions {
    /// Take the first barcode found rather than the best one across all candidate positions.
    pub use_first: bool,
    /// Also match barcodes with a single deleted base (unanchored regions only).
    pub allow_deletion: bool,
    /// Tally why reads did not match.
    pub diagnostics: bool,
    /// The number of worker threads, zero is treated as one.
    pub threads: usize,
}

impl CountOptions {
    /// The number of worker threads to use, at least one.
    pub fn threads(&self) -> usize {
        self.threads.max(1)
    }
}

impl Default for CountOptions {
    fn default() -> Self {
        Self { use_first: false, allow_deletion: false, diagnostics: false, threads: 1 }
    }
}
