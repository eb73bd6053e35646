//! Mismatch-tolerant lookup tables built from a barcode pool.
//!
//! For every distinct barcode length the [`Dictionary`] holds three tables keyed by
//! [`WindowKey`]:
//!
//! - the exact table, mapping each barcode's own key to its index in the pool,
//! - the (optional) substitution table, mapping every single-base substitution of a barcode,
//! - the (optional) deletion table, mapping every single-base deletion of a barcode.  Deletion
//!   variants are one base shorter, so they live with the tables of the shorter length.
//!
//! A key that would map to two different barcodes is marked ambiguous and never reported as a
//! match: it is better to drop a read than to attribute it to the wrong barcode.  Variants that
//! collide with another barcode's exact key, or a deletion variant that collides with a
//! substitution variant of a different barcode, are ambiguous too.  Exact keys are always looked
//! up first, so a barcode remains matchable even when it is also a variant of another barcode.

use std::collections::BTreeMap;

use ahash::AHashMap;
use bstr::{BStr, BString, ByteSlice};
use log::{debug, warn};

use crate::{
    alphabet::{code, is_valid, BASES},
    errors::ConfigError,
    hasher::{hash, WindowKey, MAX_WINDOW_LENGTH},
};

/// How a window matched a barcode.
#[derive(Debug, Hash, PartialEq, Eq, Copy, Clone)]
pub enum MatchKind {
    Exact,
    Substitution,
    Deletion,
}

impl MatchKind {
    /// The number of mismatches this kind of match costs.
    pub fn mismatches(self) -> usize {
        match self {
            Self::Exact => 0,
            Self::Substitution | Self::Deletion => 1,
        }
    }
}

/// The value stored for a key.
#[derive(Debug, PartialEq, Eq, Copy, Clone)]
enum Entry {
    Barcode(usize),
    Ambiguous,
}

impl Entry {
    fn as_lookup(self, kind: MatchKind) -> Lookup {
        match self {
            Self::Barcode(barcode_index) => Lookup::Hit { barcode_index, kind },
            Self::Ambiguous => Lookup::Ambiguous,
        }
    }

    /// True if `other` (the entry for the same key in another table) maps to a different barcode.
    fn conflicts_with(self, other: Option<&Entry>) -> bool {
        match (self, other) {
            (Self::Barcode(_), Some(other)) => *other != self,
            _ => false,
        }
    }
}

/// The result of looking a key up in a [`Dictionary`].
#[derive(Debug, PartialEq, Eq, Copy, Clone)]
pub enum Lookup {
    Hit { barcode_index: usize, kind: MatchKind },
    Ambiguous,
    Miss,
}

type Table = AHashMap<WindowKey, Entry>;

/// Insert `barcode_index` under `key`, marking the key ambiguous if it already maps elsewhere.
///
/// Returns false if the key became (or already was) ambiguous.
fn insert(table: &mut Table, key: WindowKey, barcode_index: usize) -> bool {
    let entry = table.entry(key).or_insert(Entry::Barcode(barcode_index));
    if *entry != Entry::Barcode(barcode_index) {
        *entry = Entry::Ambiguous;
        return false;
    }
    true
}

/// The three tables for windows of one length.
#[derive(Debug, Default)]
struct LengthTables {
    exact: Table,
    substitution: Table,
    deletion: Table,
}

impl LengthTables {
    fn is_empty(&self) -> bool {
        self.exact.is_empty() && self.substitution.is_empty() && self.deletion.is_empty()
    }

    fn num_keys(&self) -> usize {
        self.exact.len() + self.substitution.len() + self.deletion.len()
    }

    fn num_ambiguous(&self) -> usize {
        [&self.exact, &self.substitution, &self.deletion]
            .iter()
            .map(|t| t.values().filter(|e| **e == Entry::Ambiguous).count())
            .sum()
    }

    /// Mark variant keys that collide with a different barcode in another table.
    fn mark_cross_table_collisions(&mut self) {
        let Self { exact, substitution, deletion } = self;
        for (key, entry) in substitution.iter_mut() {
            if entry.conflicts_with(exact.get(key)) || entry.conflicts_with(deletion.get(key)) {
                *entry = Entry::Ambiguous;
            }
        }
        for (key, entry) in deletion.iter_mut() {
            if entry.conflicts_with(exact.get(key)) || entry.conflicts_with(substitution.get(key))
            {
                *entry = Entry::Ambiguous;
            }
        }
    }

    fn lookup(&self, key: WindowKey, fuzzy: bool) -> Lookup {
        if let Some(entry) = self.exact.get(&key) {
            return entry.as_lookup(MatchKind::Exact);
        }
        if fuzzy {
            if let Some(entry) = self.substitution.get(&key) {
                return entry.as_lookup(MatchKind::Substitution);
            }
            if let Some(entry) = self.deletion.get(&key) {
                return entry.as_lookup(MatchKind::Deletion);
            }
        }
        Lookup::Miss
    }
}

/// Check that every barcode in the pool is non-empty, uses only `ACGT`, and (if given) is no
/// longer than `max_length`.
pub(crate) fn validate_pool<S: AsRef<[u8]>>(
    pool: &[S],
    max_length: Option<usize>,
) -> Result<(), ConfigError> {
    if pool.is_empty() {
        return Err(ConfigError::EmptyPool);
    }
    for (index, barcode) in pool.iter().enumerate() {
        let barcode = barcode.as_ref();
        if barcode.is_empty() {
            return Err(ConfigError::EmptyBarcode { index });
        }
        if let Some(position) = barcode.iter().position(|b| !is_valid(*b)) {
            return Err(ConfigError::InvalidBase {
                index,
                barcode: BString::from(barcode),
                position,
                base: char::from(barcode[position]),
            });
        }
        match max_length {
            Some(max) if barcode.len() > max => {
                return Err(ConfigError::BarcodeTooLong { index, length: barcode.len(), max });
            }
            _ => (),
        }
    }
    Ok(())
}

/// The keys of every single-base substitution of `barcode`.
fn substitution_keys(barcode: &[u8]) -> impl Iterator<Item = WindowKey> + '_ {
    let key = hash(barcode, barcode.len());
    barcode.iter().copied().enumerate().flat_map(move |(position, original)| {
        let shift = 2 * (barcode.len() - 1 - position);
        BASES
            .into_iter()
            .filter(move |alt| *alt != original)
            .map(move |alt| key ^ ((code(original) ^ code(alt)) << shift))
    })
}

/// The keys of every single-base deletion of `barcode`, each one base shorter than the barcode.
fn deletion_keys(barcode: &[u8]) -> impl Iterator<Item = WindowKey> + '_ {
    (0..barcode.len()).map(move |position| {
        let variant = [&barcode[..position], &barcode[position + 1..]].concat();
        hash(&variant, variant.len())
    })
}

/// Lookup tables for all barcodes in a pool.
#[derive(Debug)]
pub struct Dictionary {
    /// The pool, in order; a barcode's index is its identifier.
    barcodes: Vec<BString>,
    /// Tables by window length.
    tables: BTreeMap<usize, LengthTables>,
    /// The window lengths with at least one key, ascending.
    lengths: Vec<usize>,
}

impl Dictionary {
    /// Build the tables for `pool`.
    ///
    /// # Errors
    ///
    /// - [`ConfigError::EmptyPool`] if the pool has no barcodes
    /// - [`ConfigError::EmptyBarcode`] if a barcode is an empty string
    /// - [`ConfigError::InvalidBase`] if a barcode contains anything but `ACGT`
    /// - [`ConfigError::BarcodeTooLong`] if a barcode does not fit in a [`WindowKey`]
    pub fn build<S: AsRef<[u8]>>(
        pool: &[S],
        allow_substitution: bool,
        allow_deletion: bool,
    ) -> Result<Self, ConfigError> {
        validate_pool(pool, Some(MAX_WINDOW_LENGTH))?;

        let mut tables: BTreeMap<usize, LengthTables> = BTreeMap::new();
        for (index, barcode) in pool.iter().enumerate() {
            let barcode = barcode.as_ref();
            let length = barcode.len();

            let length_tables = tables.entry(length).or_default();
            if !insert(&mut length_tables.exact, hash(barcode, length), index) {
                warn!(
                    "Barcode number {} ({}) appears more than once in the pool and can never match",
                    index,
                    barcode.as_bstr()
                );
            }
            if allow_substitution {
                for key in substitution_keys(barcode) {
                    insert(&mut length_tables.substitution, key, index);
                }
            }
            if allow_deletion && length > 1 {
                let shorter = tables.entry(length - 1).or_default();
                for key in deletion_keys(barcode) {
                    insert(&mut shorter.deletion, key, index);
                }
            }
        }

        tables.retain(|_, t| !t.is_empty());
        for t in tables.values_mut() {
            t.mark_cross_table_collisions();
        }

        let dictionary = Self {
            barcodes: pool.iter().map(|b| BString::from(b.as_ref())).collect(),
            lengths: tables.keys().copied().collect(),
            tables,
        };

        debug!(
            "Built dictionary for {} barcodes with {} keys across lengths {:?}",
            dictionary.len(),
            dictionary.num_keys(),
            dictionary.lengths
        );
        let ambiguous = dictionary.num_ambiguous_keys();
        if ambiguous > 0 {
            warn!("{} dictionary keys map to more than one barcode and will not match", ambiguous);
        }
        Ok(dictionary)
    }

    /// Look up the key of a window of `length` bases in all tables.
    #[inline]
    pub fn lookup(&self, length: usize, key: WindowKey) -> Lookup {
        self.tables.get(&length).map_or(Lookup::Miss, |t| t.lookup(key, true))
    }

    /// Look up the key of a window of `length` bases in the exact table only.
    #[inline]
    pub fn lookup_exact(&self, length: usize, key: WindowKey) -> Lookup {
        self.tables.get(&length).map_or(Lookup::Miss, |t| t.lookup(key, false))
    }

    /// Hash and look up a whole window, consulting the variant tables only if `fuzzy` is set.
    ///
    /// Windows containing an invalid base, or too long to hash, never match.
    pub fn lookup_window(&self, window: &[u8], fuzzy: bool) -> Lookup {
        if window.is_empty()
            || window.len() > MAX_WINDOW_LENGTH
            || !window.iter().all(|b| is_valid(*b))
        {
            return Lookup::Miss;
        }
        let key = hash(window, window.len());
        if fuzzy {
            self.lookup(window.len(), key)
        } else {
            self.lookup_exact(window.len(), key)
        }
    }

    /// The window lengths to scan, ascending.
    pub fn lengths(&self) -> &[usize] {
        &self.lengths
    }

    /// The number of barcodes in the pool.
    pub fn len(&self) -> usize {
        self.barcodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.barcodes.is_empty()
    }

    pub fn barcode(&self, index: usize) -> &BStr {
        self.barcodes[index].as_bstr()
    }

    pub fn barcodes(&self) -> &[BString] {
        &self.barcodes
    }

    /// The total number of keys across all tables.
    pub fn num_keys(&self) -> usize {
        self.tables.values().map(LengthTables::num_keys).sum()
    }

    /// The number of keys excluded from matching because they map to more than one barcode.
    pub fn num_ambiguous_keys(&self) -> usize {
        self.tables.values().map(LengthTables::num_ambiguous).sum()
    }
}

/// Build a [`Dictionary`] for `pool`, see [`Dictionary::build`].
pub fn build_dictionary<S: AsRef<[u8]>>(
    pool: &[S],
    allow_substitution: bool,
    allow_deletion: bool,
) -> Result<Dictionary, ConfigError> {
    Dictionary::build(pool, allow_substitution, allow_deletion)
}
