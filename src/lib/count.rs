//! Counting barcodes across many reads.
//!
//! Every design is expressed as a [`Classifier`] that turns one [`Fragment`] (a read, or a read
//! pair) into a [`MatchResult`].  One generic engine, [`count_fragments`], splits the fragments
//! into chunks, classifies each chunk on a worker thread into a private [`CountTable`], and sums
//! the tables.  The classifiers, and the dictionaries inside them, are shared read-only by all
//! workers.

use std::hash::Hash;

use ahash::AHashSet;
use bstr::BString;
use log::debug;
use rayon::{prelude::*, ThreadPool};

use crate::{
    design::{CountOptions, PairDesign, PairLayout, Pairing, RandomDesign, SingleDesign, Strand},
    errors::{ConfigError, CountError},
    matcher::{BarcodeMatcher, ComboMatcher, MatchResult, Matcher, RandomMatcher, Unmatched},
    metrics::CountTable,
};

/// The number of fragments classified by a worker at one time.
pub const CHUNK_SIZE: usize = 1_000;

/// A single read or a pair of reads.
pub trait Fragment: Sync {
    fn read1(&self) -> &[u8];

    /// The second read, if any.
    fn read2(&self) -> Option<&[u8]> {
        None
    }
}

impl Fragment for &[u8] {
    fn read1(&self) -> &[u8] {
        self
    }
}

impl Fragment for Vec<u8> {
    fn read1(&self) -> &[u8] {
        self
    }
}

impl Fragment for &str {
    fn read1(&self) -> &[u8] {
        self.as_bytes()
    }
}

impl Fragment for String {
    fn read1(&self) -> &[u8] {
        self.as_bytes()
    }
}

impl Fragment for BString {
    fn read1(&self) -> &[u8] {
        self.as_slice()
    }
}

impl<A, B> Fragment for (A, B)
where
    A: AsRef<[u8]> + Sync,
    B: AsRef<[u8]> + Sync,
{
    fn read1(&self) -> &[u8] {
        self.0.as_ref()
    }

    fn read2(&self) -> Option<&[u8]> {
        Some(self.1.as_ref())
    }
}

/// A fragment that owns its bases, as extracted from FASTQ records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OwnedFragment {
    pub read1: Vec<u8>,
    pub read2: Option<Vec<u8>>,
}

impl OwnedFragment {
    pub fn single(read1: Vec<u8>) -> Self {
        Self { read1, read2: None }
    }

    pub fn paired(read1: Vec<u8>, read2: Vec<u8>) -> Self {
        Self { read1, read2: Some(read2) }
    }
}

impl Fragment for OwnedFragment {
    fn read1(&self) -> &[u8] {
        &self.read1
    }

    fn read2(&self) -> Option<&[u8]> {
        self.read2.as_deref()
    }
}

/// Turns a fragment into a count key.
pub trait Classifier: Sync {
    type Key: Eq + Hash + Send;

    /// Classify one fragment.  `strands` overrides, per region, the orientation(s) configured
    /// for that region; regions without an override use their configured strand.
    fn classify<F: Fragment>(&self, fragment: &F, strands: &[Strand]) -> MatchResult<Self::Key>;

    /// True if every fragment must have a second read.
    fn requires_mate(&self) -> bool {
        false
    }
}

/// The strand for region `index`: the override if given, otherwise the region's own.
#[inline]
fn strand_for(strands: &[Strand], index: usize, configured: Strand) -> Strand {
    strands.get(index).copied().unwrap_or(configured)
}

/// Classifies single reads with one barcode.
#[derive(Debug)]
pub struct SingleClassifier {
    matcher: BarcodeMatcher,
}

impl SingleClassifier {
    /// # Errors
    ///
    /// - any error from [`BarcodeMatcher::new`]
    pub fn new(design: &SingleDesign, options: &CountOptions) -> Result<Self, ConfigError> {
        Ok(Self { matcher: BarcodeMatcher::new(&design.pool, &design.region, options)? })
    }

    pub fn num_barcodes(&self) -> usize {
        self.matcher.num_barcodes()
    }

    pub fn pool(&self) -> &[BString] {
        self.matcher.dictionary().barcodes()
    }
}

impl Classifier for SingleClassifier {
    type Key = usize;

    fn classify<F: Fragment>(&self, fragment: &F, strands: &[Strand]) -> MatchResult<usize> {
        let strand = strand_for(strands, 0, self.matcher.default_strand());
        self.matcher.find(fragment.read1(), strand)
    }
}

/// Where a [`PairClassifier`] looks for its two barcodes.
#[derive(Debug)]
enum PairMatchers {
    SingleEnd(ComboMatcher),
    PairedEnd(BarcodeMatcher, BarcodeMatcher),
}

/// Classifies fragments with two barcodes, one from each pool.
#[derive(Debug)]
pub struct PairClassifier {
    matchers: PairMatchers,
    /// The expected combinations; `None` if any combination is valid.
    valid: Option<AHashSet<(usize, usize)>>,
    randomized: bool,
}

impl PairClassifier {
    /// # Errors
    ///
    /// - any error from [`BarcodeMatcher::new`] or [`ComboMatcher::new`]
    /// - [`ConfigError::CombinationOutOfRange`] if a listed combination is not within the pools
    pub fn new(design: &PairDesign, options: &CountOptions) -> Result<Self, ConfigError> {
        let (pool1, pool2) = &design.pools;
        let matchers = match &design.layout {
            PairLayout::SingleEnd { region } => PairMatchers::SingleEnd(ComboMatcher::new(
                (pool1.as_slice(), pool2.as_slice()),
                region,
                options,
            )?),
            PairLayout::PairedEnd { read1, read2 } => PairMatchers::PairedEnd(
                BarcodeMatcher::new(pool1, read1, options)?,
                BarcodeMatcher::new(pool2, read2, options)?,
            ),
        };
        design.pairing.validate(pool1.len(), pool2.len())?;
        let valid = match &design.pairing {
            Pairing::AnyCombination => None,
            Pairing::Listed(pairs) => Some(pairs.iter().copied().collect()),
        };
        Ok(Self { matchers, valid, randomized: design.randomized })
    }

    /// Both barcodes in the expected order, or in swapped order.
    fn find<F: Fragment>(
        &self,
        fragment: &F,
        strands: &[Strand],
        swapped: bool,
    ) -> MatchResult<(usize, usize)> {
        match &self.matchers {
            PairMatchers::SingleEnd(matcher) => {
                let strand = strand_for(strands, 0, matcher.default_strand());
                if swapped {
                    matcher.find_swapped(fragment.read1(), strand)
                } else {
                    matcher.find(fragment.read1(), strand)
                }
            }
            PairMatchers::PairedEnd(first, second) => {
                let strand1 = strand_for(strands, 0, first.default_strand());
                let strand2 = strand_for(strands, 1, second.default_strand());
                let read1 = fragment.read1();
                let read2 = fragment.read2().unwrap_or_default();
                if swapped {
                    join_mates(first.find(read2, strand1), second.find(read1, strand2))
                } else {
                    join_mates(first.find(read1, strand1), second.find(read2, strand2))
                }
            }
        }
    }

    /// Reject pairs that are not an expected combination.
    fn check(&self, result: MatchResult<(usize, usize)>) -> MatchResult<(usize, usize)> {
        match (&self.valid, result.key()) {
            (Some(valid), Some(key)) if !valid.contains(key) => {
                MatchResult::no_match(Unmatched::InvalidPair)
            }
            _ => result,
        }
    }
}

/// Combine the independent results for the two barcodes of a pair.
fn join_mates(first: MatchResult<usize>, second: MatchResult<usize>) -> MatchResult<(usize, usize)> {
    match (first, second) {
        (
            MatchResult::Match { key: i, mismatches: m1, reverse },
            MatchResult::Match { key: j, mismatches: m2, .. },
        ) => MatchResult::Match { key: (i, j), mismatches: m1 + m2, reverse },
        (MatchResult::Match { .. }, MatchResult::NoMatch { .. }) => {
            MatchResult::no_match(Unmatched::FirstOnly)
        }
        (MatchResult::NoMatch { .. }, MatchResult::Match { .. }) => {
            MatchResult::no_match(Unmatched::SecondOnly)
        }
        (MatchResult::NoMatch { reason: a }, MatchResult::NoMatch { reason: b }) => {
            if b == Unmatched::Ambiguous {
                MatchResult::no_match(b)
            } else {
                MatchResult::no_match(a)
            }
        }
    }
}

impl Classifier for PairClassifier {
    type Key = (usize, usize);

    fn classify<F: Fragment>(
        &self,
        fragment: &F,
        strands: &[Strand],
    ) -> MatchResult<(usize, usize)> {
        let result = self.check(self.find(fragment, strands, false));
        if result.is_match() || !self.randomized {
            return result;
        }
        match self.check(self.find(fragment, strands, true)) {
            swapped @ MatchResult::Match { .. } => swapped,
            MatchResult::NoMatch { .. } => result,
        }
    }

    fn requires_mate(&self) -> bool {
        matches!(self.matchers, PairMatchers::PairedEnd(..))
    }
}

/// Classifies reads by the raw sequence of their variable region.
#[derive(Debug)]
pub struct RandomClassifier {
    matcher: RandomMatcher,
}

impl RandomClassifier {
    /// # Errors
    ///
    /// - any error from [`RandomMatcher::new`]
    pub fn new(design: &RandomDesign, options: &CountOptions) -> Result<Self, ConfigError> {
        Ok(Self { matcher: RandomMatcher::new(&design.region, options)? })
    }
}

impl Classifier for RandomClassifier {
    type Key = BString;

    fn classify<F: Fragment>(&self, fragment: &F, strands: &[Strand]) -> MatchResult<BString> {
        let strand = strand_for(strands, 0, self.matcher.default_strand());
        self.matcher.find(fragment.read1(), strand)
    }
}

/// Build a worker pool of `threads` threads (at least one).
pub(crate) fn build_thread_pool(threads: usize) -> Result<ThreadPool, ConfigError> {
    Ok(rayon::ThreadPoolBuilder::new().num_threads(threads.max(1)).build()?)
}

/// Merge two partial results, keeping the first error.
fn merge<K: Eq + Hash>(
    all: Result<CountTable<K>, CountError>,
    other: Result<CountTable<K>, CountError>,
) -> Result<CountTable<K>, CountError> {
    match (all, other) {
        (Ok(mut all), Ok(other)) => {
            all.update_with(other);
            Ok(all)
        }
        (Ok(_), Err(e)) => Err(e),
        (Err(e), _) => Err(e),
    }
}

/// Classify and count `fragments` on the workers of `pool`.
pub(crate) fn count_in_pool<C: Classifier, F: Fragment>(
    pool: &ThreadPool,
    classifier: &C,
    fragments: &[F],
    strands: &[Strand],
    detailed: bool,
) -> Result<CountTable<C::Key>, CountError> {
    let table = pool.install(|| {
        fragments
            .par_chunks(CHUNK_SIZE)
            .enumerate()
            .map(|(chunk_index, chunk)| {
                let mut table = CountTable::new(detailed);
                for (i, fragment) in chunk.iter().enumerate() {
                    if classifier.requires_mate() && fragment.read2().is_none() {
                        return Err(CountError::MissingMate {
                            index: chunk_index * CHUNK_SIZE + i,
                        });
                    }
                    table.record(classifier.classify(fragment, strands));
                }
                Ok(table)
            })
            .fold(|| Ok(CountTable::new(detailed)), merge)
            .reduce(|| Ok(CountTable::new(detailed)), merge)
    })?;
    debug!(
        "Counted {} fragments: {} matched to {} keys, {} unmatched",
        table.diagnostics().total,
        table.diagnostics().matched,
        table.len(),
        table.unmatched()
    );
    Ok(table)
}

/// Classify and count `fragments` with `classifier` using `options.threads` workers.
///
/// # Errors
///
/// - [`ConfigError::ThreadPool`] if the workers cannot be started
/// - [`CountError::MissingMate`] if the classifier needs read pairs and a fragment has one read
pub fn count_fragments<C: Classifier, F: Fragment>(
    classifier: &C,
    fragments: &[F],
    strands: &[Strand],
    options: &CountOptions,
) -> Result<CountTable<C::Key>, CountError> {
    let pool = build_thread_pool(options.threads())?;
    count_in_pool(&pool, classifier, fragments, strands, options.diagnostics)
}

/// Count the barcodes of a single-barcode design in `reads`.
///
/// # Errors
///
/// - any configuration error of the design (see [`BarcodeMatcher::new`])
/// - [`ConfigError::ThreadPool`] if the workers cannot be started
pub fn count_single<F: Fragment>(
    reads: &[F],
    design: &SingleDesign,
    options: &CountOptions,
) -> Result<CountTable<usize>, CountError> {
    let classifier = SingleClassifier::new(design, options)?;
    count_fragments(&classifier, reads, &[], options)
}

/// Count the barcode pairs of a combinatorial or dual-barcode design in `fragments`.
///
/// # Errors
///
/// - any configuration error of the design (see [`PairClassifier::new`])
/// - [`ConfigError::ThreadPool`] if the workers cannot be started
/// - [`CountError::MissingMate`] if the design is paired-end and a fragment has one read
pub fn count_pairs<F: Fragment>(
    fragments: &[F],
    design: &PairDesign,
    options: &CountOptions,
) -> Result<CountTable<(usize, usize)>, CountError> {
    let classifier = PairClassifier::new(design, options)?;
    count_fragments(&classifier, fragments, &[], options)
}

/// Count the sequences found in the variable region of a random-barcode design in `reads`.
///
/// # Errors
///
/// - any configuration error of the design (see [`RandomMatcher::new`])
/// - [`ConfigError::ThreadPool`] if the workers cannot be started
pub fn count_random<F: Fragment>(
    reads: &[F],
    design: &RandomDesign,
    options: &CountOptions,
) -> Result<CountTable<BString>, CountError> {
    let classifier = RandomClassifier::new(design, options)?;
    count_fragments(&classifier, reads, &[], options)
}
