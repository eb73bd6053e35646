//! Finding the barcode(s) of one region within one read.
//!
//! Three matchers share the [`Matcher`] trait:
//!
//! - [`BarcodeMatcher`] finds one barcode from a pool, either by sliding every barcode length
//!   across the read (unanchored) or by first locating a constant region and reading the barcode
//!   out of its variable region (anchored),
//! - [`ComboMatcher`] finds two barcodes, one from each of two pools, in the two variable regions
//!   of a single constant region,
//! - [`RandomMatcher`] reads the raw sequence of the variable region without any pool.
//!
//! Anchored matchers examine every position where the constant region fits within the mismatch
//! budget.  With `use_first` the first position (forward strand first) that yields a result wins.
//! Otherwise all positions on all requested strands are examined and the result with the fewest
//! total mismatches wins; two different results with the same number of mismatches make the read
//! ambiguous.

use std::ops::Range;

use bstr::BString;
use cached::{Cached, SizedCache};
use strum::Display;

use crate::{
    alphabet::{count_invalid, is_valid, reverse_complement},
    anchor::{Anchor, Template},
    design::{CountOptions, Region, Strand},
    dictionary::{validate_pool, Dictionary, Lookup},
    errors::{ConfigError, ReasonConstantInvalid},
    scanner::{scan_read, ScanResult},
};

/// The largest mismatch budget for an unanchored region, whose variants are precomputed.
pub const MAX_UNANCHORED_MISMATCHES: usize = 1;

/// Why a read (or read pair) was not counted.
#[derive(Debug, Display, Hash, PartialEq, Eq, Copy, Clone)]
#[strum(serialize_all = "snake_case")]
pub enum Unmatched {
    /// The read is shorter than the constant region or every barcode.
    TooShort,
    /// The constant region was not found within the mismatch budget.
    NoAnchor,
    /// No barcode was found (at any anchor, if anchored).
    NoBarcode,
    /// More than one barcode fits equally well.
    Ambiguous,
    /// Only the first of two barcodes was found.
    FirstOnly,
    /// Only the second of two barcodes was found.
    SecondOnly,
    /// Both barcodes were found but are not an expected combination.
    InvalidPair,
}

/// The result of matching a read.
#[derive(Debug, Hash, PartialEq, Eq, Clone)]
pub enum MatchResult<K> {
    /// A barcode (or pair, or raw sequence) was found with `mismatches` total mismatches, in the
    /// reverse complement of the read if `reverse` is set.
    Match { key: K, mismatches: usize, reverse: bool },
    NoMatch { reason: Unmatched },
}

impl<K> MatchResult<K> {
    pub fn no_match(reason: Unmatched) -> Self {
        Self::NoMatch { reason }
    }

    pub fn is_match(&self) -> bool {
        matches!(self, Self::Match { .. })
    }

    pub fn is_no_match(&self) -> bool {
        !self.is_match()
    }

    pub fn key(&self) -> Option<&K> {
        match self {
            Self::Match { key, .. } => Some(key),
            Self::NoMatch { .. } => None,
        }
    }

    pub fn reason(&self) -> Option<Unmatched> {
        match self {
            Self::Match { .. } => None,
            Self::NoMatch { reason } => Some(*reason),
        }
    }

    pub fn map_key<T>(self, f: impl FnOnce(K) -> T) -> MatchResult<T> {
        match self {
            Self::Match { key, mismatches, reverse } => {
                MatchResult::Match { key: f(key), mismatches, reverse }
            }
            Self::NoMatch { reason } => MatchResult::NoMatch { reason },
        }
    }
}

/// The base trait for all matching algorithms.
pub trait Matcher {
    type Key;

    fn find(&self, read: &[u8], strand: Strand) -> MatchResult<Self::Key>;

    /// The orientation(s) searched when no other is given.
    fn default_strand(&self) -> Strand;
}

/// What a single anchor position yields.
#[derive(Debug, PartialEq, Eq, Clone)]
enum Candidate<K> {
    /// A result, with its total number of mismatches.
    Resolved(K, usize),
    Ambiguous,
    Unresolved,
    /// Part of a multi-barcode result was found.
    Partial(Unmatched),
}

/// The running best over all candidates.
struct Selection<K> {
    best: Option<(K, usize, bool)>,
    tied: bool,
    saw_anchor: bool,
    saw_ambiguous: bool,
    partial: Option<Unmatched>,
}

impl<K: PartialEq> Selection<K> {
    fn new() -> Self {
        Self { best: None, tied: false, saw_anchor: false, saw_ambiguous: false, partial: None }
    }

    /// Record a candidate, returning true if it should be reported immediately.
    fn offer(&mut self, candidate: Candidate<K>, reverse: bool, use_first: bool) -> bool {
        match candidate {
            Candidate::Resolved(key, mismatches) => {
                if use_first {
                    self.best = Some((key, mismatches, reverse));
                    return true;
                }
                let replace = match &self.best {
                    Some((best_key, best, _)) => {
                        if mismatches == *best && *best_key != key {
                            self.tied = true;
                        }
                        mismatches < *best
                    }
                    None => true,
                };
                if replace {
                    self.best = Some((key, mismatches, reverse));
                    self.tied = false;
                }
            }
            Candidate::Ambiguous => self.saw_ambiguous = true,
            Candidate::Partial(reason) => {
                self.partial.get_or_insert(reason);
            }
            Candidate::Unresolved => (),
        }
        false
    }

    fn finish(self) -> MatchResult<K> {
        match self.best {
            Some(_) if self.tied => MatchResult::no_match(Unmatched::Ambiguous),
            Some((key, mismatches, reverse)) => MatchResult::Match { key, mismatches, reverse },
            None if !self.saw_anchor => MatchResult::no_match(Unmatched::NoAnchor),
            None if self.saw_ambiguous => MatchResult::no_match(Unmatched::Ambiguous),
            None => MatchResult::no_match(self.partial.unwrap_or(Unmatched::NoBarcode)),
        }
    }
}

/// Examine every anchor of `template` in `read` (and/or its reverse complement), resolving each
/// with `resolve`.
fn search_anchored<K: PartialEq>(
    template: &Template,
    read: &[u8],
    strand: Strand,
    max_mismatches: usize,
    use_first: bool,
    resolve: impl Fn(&[u8], Anchor) -> Candidate<K>,
) -> MatchResult<K> {
    if read.len() < template.len() {
        return MatchResult::no_match(Unmatched::TooShort);
    }
    let mut selection = Selection::new();
    for &reverse in strand.orientations() {
        let revcomp;
        let seq = if reverse {
            revcomp = reverse_complement(read);
            &revcomp[..]
        } else {
            read
        };
        for anchor in template.candidates(seq, max_mismatches) {
            selection.saw_anchor = true;
            if selection.offer(resolve(seq, anchor), reverse, use_first) {
                return selection.finish();
            }
        }
    }
    selection.finish()
}

/// Look up the barcode in `window`, spending at most `budget` mismatches.
///
/// The returned mismatches are those of the barcode alone.
fn resolve_window(dictionary: &Dictionary, window: &[u8], budget: usize) -> Candidate<usize> {
    if count_invalid(window) > 0 {
        return Candidate::Unresolved;
    }
    match dictionary.lookup_window(window, budget > 0) {
        Lookup::Hit { barcode_index, kind } => Candidate::Resolved(barcode_index, kind.mismatches()),
        Lookup::Ambiguous => Candidate::Ambiguous,
        Lookup::Miss => Candidate::Unresolved,
    }
}

/// Parse `constant` and check it has `expected` variable regions.
fn parse_template(constant: &[u8], expected: usize) -> Result<Template, ConfigError> {
    let template = Template::new(constant)?;
    let found = template.variable_regions().len();
    if found != expected {
        return Err(ConfigError::VariableRegionCount {
            constant: BString::from(constant),
            expected,
            found,
        });
    }
    Ok(template)
}

/// Check that an anchored mismatch budget does not exceed the template length.
fn check_anchored_budget(template: &Template, max_mismatches: usize) -> Result<(), ConfigError> {
    if max_mismatches > template.len() {
        return Err(ConfigError::MismatchesOutOfRange {
            mismatches: max_mismatches,
            max: template.len(),
        });
    }
    Ok(())
}

/// Check that every barcode in `pool` fits the variable region `region`.
fn check_region_lengths<S: AsRef<[u8]>>(
    pool: &[S],
    region: &Range<usize>,
) -> Result<(), ConfigError> {
    let expected = region.len();
    match pool.iter().map(AsRef::as_ref).find(|b| b.len() != expected) {
        Some(barcode) => Err(ConfigError::VariableRegionLength {
            barcode: BString::from(barcode),
            expected,
            found: barcode.len(),
        }),
        None => Ok(()),
    }
}

/// How a [`BarcodeMatcher`] finds its region.
#[derive(Debug)]
enum Placement {
    /// Slide every barcode length across the read.
    Unanchored,
    /// Locate the template, then read the barcode from its variable region.
    Anchored { template: Template, barcode_region: Range<usize> },
}

/// Matches one barcode from a pool.
#[derive(Debug)]
pub struct BarcodeMatcher {
    dictionary: Dictionary,
    placement: Placement,
    strand: Strand,
    max_mismatches: usize,
    use_first: bool,
}

impl BarcodeMatcher {
    /// Build the dictionary for `pool` and prepare to find it in `region`.
    ///
    /// # Errors
    ///
    /// - any error from [`Dictionary::build`]
    /// - [`ConfigError::InvalidConstant`] or [`ConfigError::VariableRegionCount`] if an anchored
    ///   region's constant is not a template with exactly one variable region
    /// - [`ConfigError::VariableRegionLength`] if a barcode does not fit the variable region
    /// - [`ConfigError::MismatchesOutOfRange`] if the budget is more than one for an unanchored
    ///   region, or longer than the template for an anchored one
    pub fn new<S: AsRef<[u8]>>(
        pool: &[S],
        region: &Region,
        options: &CountOptions,
    ) -> Result<Self, ConfigError> {
        let substitution = region.max_mismatches > 0;
        let (dictionary, placement) = if region.is_anchored() {
            let template = parse_template(&region.constant, 1)?;
            check_anchored_budget(&template, region.max_mismatches)?;
            let barcode_region = template.variable_regions()[0].clone();
            validate_pool(pool, None)?;
            check_region_lengths(pool, &barcode_region)?;
            let dictionary = Dictionary::build(pool, substitution, false)?;
            (dictionary, Placement::Anchored { template, barcode_region })
        } else {
            if region.max_mismatches > MAX_UNANCHORED_MISMATCHES {
                return Err(ConfigError::MismatchesOutOfRange {
                    mismatches: region.max_mismatches,
                    max: MAX_UNANCHORED_MISMATCHES,
                });
            }
            let dictionary = Dictionary::build(pool, substitution, options.allow_deletion)?;
            (dictionary, Placement::Unanchored)
        };
        Ok(Self {
            dictionary,
            placement,
            strand: region.strand,
            max_mismatches: region.max_mismatches,
            use_first: options.use_first,
        })
    }

    pub fn dictionary(&self) -> &Dictionary {
        &self.dictionary
    }

    /// The number of barcodes in the pool.
    pub fn num_barcodes(&self) -> usize {
        self.dictionary.len()
    }

    fn find_unanchored(&self, read: &[u8], strand: Strand) -> MatchResult<usize> {
        let lengths = self.dictionary.lengths();
        if lengths.first().map_or(true, |shortest| read.len() < *shortest) {
            return MatchResult::no_match(Unmatched::TooShort);
        }
        let mut selection = Selection::new();
        selection.saw_anchor = true;
        let mut resolved: Option<usize> = None;
        for &reverse in strand.orientations() {
            let result = if reverse {
                scan_read(&reverse_complement(read), &self.dictionary, lengths)
            } else {
                scan_read(read, &self.dictionary, lengths)
            };
            let candidate = match result {
                ScanResult::Match(m) => Candidate::Resolved(m.barcode_index, m.kind.mismatches()),
                ScanResult::Ambiguous => Candidate::Ambiguous,
                ScanResult::NoMatch => Candidate::Unresolved,
            };
            // Different barcodes on the two strands are ambiguous whatever their mismatches.
            if let Candidate::Resolved(index, _) = &candidate {
                if !self.use_first && resolved.map_or(false, |previous| previous != *index) {
                    return MatchResult::no_match(Unmatched::Ambiguous);
                }
                resolved = Some(*index);
            }
            if selection.offer(candidate, reverse, self.use_first) {
                break;
            }
        }
        selection.finish()
    }
}

impl Matcher for BarcodeMatcher {
    type Key = usize;

    fn find(&self, read: &[u8], strand: Strand) -> MatchResult<usize> {
        match &self.placement {
            Placement::Unanchored => self.find_unanchored(read, strand),
            Placement::Anchored { template, barcode_region } => search_anchored(
                template,
                read,
                strand,
                self.max_mismatches,
                self.use_first,
                |seq, anchor| {
                    let start = anchor.offset + barcode_region.start;
                    let window = &seq[start..start + barcode_region.len()];
                    match resolve_window(
                        &self.dictionary,
                        window,
                        self.max_mismatches - anchor.mismatches,
                    ) {
                        Candidate::Resolved(index, mismatches) => {
                            Candidate::Resolved(index, anchor.mismatches + mismatches)
                        }
                        other => other,
                    }
                },
            ),
        }
    }

    fn default_strand(&self) -> Strand {
        self.strand
    }
}

/// Matches two barcodes, one from each pool, in the two variable regions of one template.
#[derive(Debug)]
pub struct ComboMatcher {
    dictionaries: (Dictionary, Dictionary),
    template: Template,
    regions: (Range<usize>, Range<usize>),
    strand: Strand,
    max_mismatches: usize,
    use_first: bool,
}

impl ComboMatcher {
    /// Build the dictionaries for both pools and prepare to find them in `region`.
    ///
    /// # Errors
    ///
    /// - any error from [`Dictionary::build`]
    /// - [`ConfigError::InvalidConstant`] or [`ConfigError::VariableRegionCount`] if the
    ///   constant is not a template with exactly two variable regions
    /// - [`ConfigError::VariableRegionLength`] if a barcode does not fit its variable region
    /// - [`ConfigError::MismatchesOutOfRange`] if the budget is longer than the template
    pub fn new<S: AsRef<[u8]>>(
        pools: (&[S], &[S]),
        region: &Region,
        options: &CountOptions,
    ) -> Result<Self, ConfigError> {
        if !region.is_anchored() {
            return Err(ConfigError::InvalidConstant {
                constant: region.constant.clone(),
                reason: ReasonConstantInvalid::Empty,
            });
        }
        let template = parse_template(&region.constant, 2)?;
        check_anchored_budget(&template, region.max_mismatches)?;
        let first = template.variable_regions()[0].clone();
        let second = template.variable_regions()[1].clone();
        validate_pool(pools.0, None)?;
        validate_pool(pools.1, None)?;
        check_region_lengths(pools.0, &first)?;
        check_region_lengths(pools.1, &second)?;

        let substitution = region.max_mismatches > 0;
        let dictionaries = (
            Dictionary::build(pools.0, substitution, false)?,
            Dictionary::build(pools.1, substitution, false)?,
        );
        Ok(Self {
            dictionaries,
            template,
            regions: (first, second),
            strand: region.strand,
            max_mismatches: region.max_mismatches,
            use_first: options.use_first,
        })
    }

    /// The number of barcodes in each pool.
    pub fn num_barcodes(&self) -> (usize, usize) {
        (self.dictionaries.0.len(), self.dictionaries.1.len())
    }

    /// Search with `first` in the first variable region and `second` in the second.
    fn find_ordered(
        &self,
        read: &[u8],
        strand: Strand,
        first: &Dictionary,
        second: &Dictionary,
    ) -> MatchResult<(usize, usize)> {
        let (region1, region2) = &self.regions;
        search_anchored(
            &self.template,
            read,
            strand,
            self.max_mismatches,
            self.use_first,
            |seq, anchor| {
                let budget = self.max_mismatches - anchor.mismatches;
                let start1 = anchor.offset + region1.start;
                let start2 = anchor.offset + region2.start;
                let a = resolve_window(first, &seq[start1..start1 + region1.len()], budget);
                let budget2 = match a {
                    Candidate::Resolved(_, mismatches) => budget - mismatches,
                    _ => budget,
                };
                let b = resolve_window(second, &seq[start2..start2 + region2.len()], budget2);
                match (a, b) {
                    (Candidate::Resolved(i, m1), Candidate::Resolved(j, m2)) => {
                        Candidate::Resolved((i, j), anchor.mismatches + m1 + m2)
                    }
                    (Candidate::Ambiguous, _) | (_, Candidate::Ambiguous) => Candidate::Ambiguous,
                    (Candidate::Resolved(..), _) => Candidate::Partial(Unmatched::FirstOnly),
                    (_, Candidate::Resolved(..)) => Candidate::Partial(Unmatched::SecondOnly),
                    _ => Candidate::Unresolved,
                }
            },
        )
    }

    /// Find the barcodes in swapped order: the second pool in the first variable region and the
    /// first pool in the second.  Keys are still `(first pool index, second pool index)`.
    pub fn find_swapped(&self, read: &[u8], strand: Strand) -> MatchResult<(usize, usize)> {
        let (d1, d2) = &self.dictionaries;
        self.find_ordered(read, strand, d2, d1).map_key(|(j, i)| (i, j))
    }
}

impl Matcher for ComboMatcher {
    type Key = (usize, usize);

    fn find(&self, read: &[u8], strand: Strand) -> MatchResult<(usize, usize)> {
        let (d1, d2) = &self.dictionaries;
        self.find_ordered(read, strand, d1, d2)
    }

    fn default_strand(&self) -> Strand {
        self.strand
    }
}

/// Reads the raw sequence of the single variable region of a template.
#[derive(Debug)]
pub struct RandomMatcher {
    template: Template,
    region: Range<usize>,
    strand: Strand,
    max_mismatches: usize,
    use_first: bool,
}

impl RandomMatcher {
    /// # Errors
    ///
    /// - [`ConfigError::InvalidConstant`] or [`ConfigError::VariableRegionCount`] if the
    ///   constant is not a template with exactly one variable region
    /// - [`ConfigError::MismatchesOutOfRange`] if the budget is longer than the template
    pub fn new(region: &Region, options: &CountOptions) -> Result<Self, ConfigError> {
        if !region.is_anchored() {
            return Err(ConfigError::InvalidConstant {
                constant: region.constant.clone(),
                reason: ReasonConstantInvalid::Empty,
            });
        }
        let template = parse_template(&region.constant, 1)?;
        check_anchored_budget(&template, region.max_mismatches)?;
        let variable = template.variable_regions()[0].clone();
        Ok(Self {
            template,
            region: variable,
            strand: region.strand,
            max_mismatches: region.max_mismatches,
            use_first: options.use_first,
        })
    }
}

impl Matcher for RandomMatcher {
    type Key = BString;

    fn find(&self, read: &[u8], strand: Strand) -> MatchResult<BString> {
        search_anchored(
            &self.template,
            read,
            strand,
            self.max_mismatches,
            self.use_first,
            |seq, anchor| {
                let start = anchor.offset + self.region.start;
                let window = &seq[start..start + self.region.len()];
                if count_invalid(window) > 0 {
                    Candidate::Unresolved
                } else {
                    Candidate::Resolved(BString::from(window), anchor.mismatches)
                }
            },
        )
    }

    fn default_strand(&self) -> Strand {
        self.strand
    }
}

/// The best choice for one sequence: its index, distance and whether the reverse complement
/// matched.
type Choice = Option<(usize, usize, bool)>;

/// Match whole `sequences` against `choices` by Hamming distance.
///
/// Each sequence is compared with every choice of the same length; if `reverse` is set the
/// reverse complement of the sequence is compared instead of the sequence.  The choice with
/// the smallest distance is reported if that distance is at most `substitutions` and no other
/// choice is as close; otherwise the sequence is unmatched.  Repeated sequences are only
/// compared once.
///
/// # Errors
///
/// - any error validating `choices` as a barcode pool (see [`Dictionary::build`])
pub fn match_sequences<S: AsRef<[u8]>, C: AsRef<[u8]>>(
    sequences: &[S],
    choices: &[C],
    substitutions: usize,
    reverse: bool,
) -> Result<Vec<MatchResult<usize>>, ConfigError> {
    validate_pool(choices, None)?;
    let choices: Vec<&[u8]> = choices.iter().map(AsRef::as_ref).collect();
    let mut cache: SizedCache<Vec<u8>, Choice> = SizedCache::with_size(100_000);

    let results = sequences
        .iter()
        .map(|sequence| {
            let sequence = sequence.as_ref();
            let best = match cache.cache_get(&sequence.to_vec()) {
                Some(hit) => *hit,
                None => {
                    let best = find_closest(sequence, &choices, substitutions, reverse);
                    cache.cache_set(sequence.to_vec(), best);
                    best
                }
            };
            match best {
                Some((key, mismatches, reverse)) => MatchResult::Match { key, mismatches, reverse },
                None if sequence.is_empty() => MatchResult::no_match(Unmatched::TooShort),
                None => MatchResult::no_match(Unmatched::NoBarcode),
            }
        })
        .collect();
    Ok(results)
}

/// Find the unique closest choice to `sequence`, or to its reverse complement if `reverse`.
fn find_closest(sequence: &[u8], choices: &[&[u8]], max_mismatches: usize, reverse: bool) -> Choice {
    let revcomp;
    let query = if reverse {
        revcomp = reverse_complement(sequence);
        &revcomp[..]
    } else {
        sequence
    };
    let mut best: Choice = None;
    let mut best_dist = usize::MAX;
    let mut next_best_dist = usize::MAX;
    for (i, choice) in choices.iter().enumerate() {
        if choice.len() != query.len() {
            continue;
        }
        let dist = hamming_distance(query, choice);
        if dist < best_dist {
            best = Some((i, dist, reverse));
            next_best_dist = best_dist;
            best_dist = dist;
        } else if dist < next_best_dist {
            next_best_dist = dist;
        }
    }
    if best_dist > max_mismatches || next_best_dist == best_dist {
        None
    } else {
        best
    }
}

/// Hamming distance on slices of bytes; any base other than `ACGT` counts as a mismatch.
fn hamming_distance(alpha: &[u8], beta: &[u8]) -> usize {
    alpha.iter().zip(beta.iter()).filter(|(a, b)| a != b || !is_valid(**a)).count()
}

#[cfg(test)]
mod test {
    use bstr::BString;
    use matches::assert_matches;
    use rstest::rstest;

    use super::{
        hamming_distance, match_sequences, BarcodeMatcher, ComboMatcher, MatchResult, Matcher,
        RandomMatcher, Unmatched,
    };
    use crate::{
        design::{CountOptions, Region, Strand},
        errors::ConfigError,
    };

    fn options(use_first: bool) -> CountOptions {
        CountOptions { use_first, ..CountOptions::default() }
    }

    fn key<K: Clone>(result: &MatchResult<K>) -> Option<K> {
        result.key().cloned()
    }

    #[test]
    fn test_unmatched_display() {
        assert_eq!(Unmatched::TooShort.to_string(), "too_short");
        assert_eq!(Unmatched::InvalidPair.to_string(), "invalid_pair");
    }

    #[test]
    fn test_unanchored_match() {
        let region = Region::unanchored(Strand::Forward, 0);
        let matcher = BarcodeMatcher::new(&["ACGT", "TTTT"], &region, &options(true)).unwrap();
        assert_eq!(
            matcher.find(b"GGACGTCC", Strand::Forward),
            MatchResult::Match { key: 0, mismatches: 0, reverse: false }
        );
        assert_eq!(
            matcher.find(b"GGCCGGCC", Strand::Forward),
            MatchResult::no_match(Unmatched::NoBarcode)
        );
        assert_eq!(matcher.find(b"ACG", Strand::Forward), MatchResult::no_match(Unmatched::TooShort));
    }

    #[test]
    fn test_unanchored_substitution_costs_one_mismatch() {
        let region = Region::unanchored(Strand::Forward, 1);
        let matcher = BarcodeMatcher::new(&["ACGT"], &region, &options(true)).unwrap();
        assert_eq!(
            matcher.find(b"TTACGATT", Strand::Forward),
            MatchResult::Match { key: 0, mismatches: 1, reverse: false }
        );
    }

    #[test]
    fn test_unanchored_deletion_requires_option() {
        let region = Region::unanchored(Strand::Forward, 0);
        let read = b"TTACTTT";
        let matcher = BarcodeMatcher::new(&["ACGT"], &region, &options(true)).unwrap();
        assert!(matcher.find(read, Strand::Forward).is_no_match());

        let with_deletion = CountOptions { allow_deletion: true, ..options(true) };
        let matcher = BarcodeMatcher::new(&["ACGT"], &region, &with_deletion).unwrap();
        assert_eq!(
            matcher.find(read, Strand::Forward),
            MatchResult::Match { key: 0, mismatches: 1, reverse: false }
        );
    }

    #[test]
    fn test_unanchored_budget_limit() {
        let region = Region::unanchored(Strand::Forward, 2);
        assert_matches!(
            BarcodeMatcher::new(&["ACGT"], &region, &options(true)),
            Err(ConfigError::MismatchesOutOfRange { mismatches: 2, max: 1 })
        );
    }

    #[rstest]
    #[case(Strand::Forward, None)]
    #[case(Strand::Reverse, Some(0))]
    #[case(Strand::Both, Some(0))]
    fn test_unanchored_strands(#[case] strand: Strand, #[case] expected: Option<usize>) {
        // the reverse complement of AACCGG is CCGGTT
        let region = Region::unanchored(Strand::Forward, 0);
        let matcher = BarcodeMatcher::new(&["AACC"], &region, &options(false)).unwrap();
        assert_eq!(key(&matcher.find(b"CCGGTT", strand)), expected);
    }

    #[test]
    fn test_unanchored_different_barcodes_on_each_strand_are_ambiguous() {
        // forward has AAAA, reverse complement (GGTTTT) has GGTT
        let region = Region::unanchored(Strand::Both, 0);
        let read = b"AAAACC";
        let matcher = BarcodeMatcher::new(&["AAAA", "GGTT"], &region, &options(false)).unwrap();
        assert_eq!(matcher.find(read, Strand::Both), MatchResult::no_match(Unmatched::Ambiguous));

        let matcher = BarcodeMatcher::new(&["AAAA", "GGTT"], &region, &options(true)).unwrap();
        assert_eq!(key(&matcher.find(read, Strand::Both)), Some(0));
    }

    #[test]
    fn test_unanchored_different_barcodes_with_unequal_mismatches_are_ambiguous() {
        // forward has AAAA exactly, reverse complement (GATTTT) has GATT, one from GGTT
        let region = Region::unanchored(Strand::Both, 1);
        let read = b"AAAATC";
        let matcher = BarcodeMatcher::new(&["AAAA", "GGTT"], &region, &options(false)).unwrap();
        assert_eq!(matcher.find(read, Strand::Both), MatchResult::no_match(Unmatched::Ambiguous));
        assert_eq!(
            matcher.find(read, Strand::Forward),
            MatchResult::Match { key: 0, mismatches: 0, reverse: false }
        );

        let matcher = BarcodeMatcher::new(&["AAAA", "GGTT"], &region, &options(true)).unwrap();
        assert_eq!(key(&matcher.find(read, Strand::Both)), Some(0));
    }

    #[test]
    fn test_anchored_match() {
        let region = Region::new("CACCGNNNNGTTT", Strand::Forward, 0);
        let matcher = BarcodeMatcher::new(&["ACGT", "TTAA"], &region, &options(true)).unwrap();
        assert_eq!(
            matcher.find(b"GGCACCGTTAAGTTTGG", Strand::Forward),
            MatchResult::Match { key: 1, mismatches: 0, reverse: false }
        );
        assert_eq!(
            matcher.find(b"GGCACAGTTAAGTTTGG", Strand::Forward),
            MatchResult::no_match(Unmatched::NoAnchor)
        );
        assert_eq!(
            matcher.find(b"GGCACCGCCCCGTTTGG", Strand::Forward),
            MatchResult::no_match(Unmatched::NoBarcode)
        );
        assert_eq!(
            matcher.find(b"CACCG", Strand::Forward),
            MatchResult::no_match(Unmatched::TooShort)
        );
    }

    #[test]
    fn test_anchored_budget_is_shared() {
        let region = Region::new("CACCGNNNNGTTT", Strand::Forward, 1);
        let matcher = BarcodeMatcher::new(&["ACGT", "TTAA"], &region, &options(true)).unwrap();
        // one mismatch in the constant
        assert_eq!(
            matcher.find(b"CACAGTTAAGTTT", Strand::Forward),
            MatchResult::Match { key: 1, mismatches: 1, reverse: false }
        );
        // one mismatch in the barcode
        assert_eq!(
            matcher.find(b"CACCGTTACGTTT", Strand::Forward),
            MatchResult::Match { key: 1, mismatches: 1, reverse: false }
        );
        // one in each is too many
        assert!(matcher.find(b"CACAGTTACGTTT", Strand::Forward).is_no_match());
    }

    #[test]
    fn test_anchored_best_candidate_wins() {
        let region = Region::new("ANNNNA", Strand::Forward, 1);
        let pool = ["CCCC", "GGGG"];
        // CCCC at offset 0 with one mismatch in the constant, GGGG at offset 6 exactly
        let read = b"ACCCCTAGGGGA";
        let matcher = BarcodeMatcher::new(&pool, &region, &options(false)).unwrap();
        assert_eq!(
            matcher.find(read, Strand::Forward),
            MatchResult::Match { key: 1, mismatches: 0, reverse: false }
        );
        let matcher = BarcodeMatcher::new(&pool, &region, &options(true)).unwrap();
        assert_eq!(
            matcher.find(read, Strand::Forward),
            MatchResult::Match { key: 0, mismatches: 1, reverse: false }
        );
    }

    #[test]
    fn test_anchored_tie_is_ambiguous() {
        let region = Region::new("ANNNNA", Strand::Forward, 0);
        let matcher = BarcodeMatcher::new(&["CCCC", "GGGG"], &region, &options(false)).unwrap();
        assert_eq!(
            matcher.find(b"ACCCCATAGGGGA", Strand::Forward),
            MatchResult::no_match(Unmatched::Ambiguous)
        );
        // the same barcode twice is not a tie
        assert_eq!(key(&matcher.find(b"ACCCCATACCCCA", Strand::Forward)), Some(0));
    }

    #[test]
    fn test_anchored_reverse_strand() {
        let region = Region::new("CACCGNNNN", Strand::Reverse, 0);
        let matcher = BarcodeMatcher::new(&["ACGT", "TTAA"], &region, &options(true)).unwrap();
        // reverse complement of TTAACGGTG is CACCGTTAA
        assert_eq!(
            matcher.find(b"TTAACGGTG", Strand::Reverse),
            MatchResult::Match { key: 1, mismatches: 0, reverse: true }
        );
        assert!(matcher.find(b"TTAACGGTG", Strand::Forward).is_no_match());
        assert_eq!(matcher.default_strand(), Strand::Reverse);
    }

    #[test]
    fn test_anchored_configuration_errors() {
        let opts = options(true);
        assert_matches!(
            BarcodeMatcher::new(&["ACGT"], &Region::new("CACCG", Strand::Forward, 0), &opts),
            Err(ConfigError::VariableRegionCount { expected: 1, found: 0, .. })
        );
        assert_matches!(
            BarcodeMatcher::new(&["ACG"], &Region::new("CNNNNG", Strand::Forward, 0), &opts),
            Err(ConfigError::VariableRegionLength { expected: 4, found: 3, .. })
        );
        assert_matches!(
            BarcodeMatcher::new(&["ACGT"], &Region::new("CNNNNG", Strand::Forward, 7), &opts),
            Err(ConfigError::MismatchesOutOfRange { mismatches: 7, max: 6 })
        );
        assert_matches!(
            BarcodeMatcher::new(&["ACGT"], &Region::new("CNNNNx", Strand::Forward, 0), &opts),
            Err(ConfigError::InvalidConstant { .. })
        );
    }

    #[test]
    fn test_combo_match() {
        let region = Region::new("ANNGNNA", Strand::Forward, 0);
        let pools: (&[&str], &[&str]) = (&["CC", "TT"], &["AC", "GT"]);
        let matcher = ComboMatcher::new(pools, &region, &options(true)).unwrap();
        assert_eq!(
            matcher.find(b"TTATTGGTATT", Strand::Forward),
            MatchResult::Match { key: (1, 1), mismatches: 0, reverse: false }
        );
        assert_eq!(
            matcher.find(b"ACCGCCA", Strand::Forward),
            MatchResult::no_match(Unmatched::FirstOnly)
        );
        assert_eq!(
            matcher.find(b"AGGGACA", Strand::Forward),
            MatchResult::no_match(Unmatched::SecondOnly)
        );
        assert_eq!(matcher.num_barcodes(), (2, 2));
    }

    #[test]
    fn test_combo_randomized_order() {
        let region = Region::new("ANNGNNA", Strand::Forward, 0);
        let pools: (&[&str], &[&str]) = (&["CC"], &["GT"]);
        // GT in the first region and CC in the second
        let read = b"AGTGCCA";
        let matcher = ComboMatcher::new(pools, &region, &options(true)).unwrap();
        assert!(matcher.find(read, Strand::Forward).is_no_match());
        assert_eq!(key(&matcher.find_swapped(read, Strand::Forward)), Some((0, 0)));
        assert!(matcher.find_swapped(b"ACCGGTA", Strand::Forward).is_no_match());
    }

    #[test]
    fn test_combo_requires_two_regions() {
        let pools: (&[&str], &[&str]) = (&["CC"], &["GT"]);
        let region = Region::new("ANNNNA", Strand::Forward, 0);
        assert_matches!(
            ComboMatcher::new(pools, &region, &options(true)),
            Err(ConfigError::VariableRegionCount { expected: 2, found: 1, .. })
        );
        let region = Region::unanchored(Strand::Forward, 0);
        assert_matches!(
            ComboMatcher::new(pools, &region, &options(true)),
            Err(ConfigError::InvalidConstant { .. })
        );
    }

    #[test]
    fn test_random_matcher() {
        let region = Region::new("CACCGNNNNNGTTT", Strand::Forward, 0);
        let matcher = RandomMatcher::new(&region, &options(true)).unwrap();
        assert_eq!(
            matcher.find(b"GGCACCGATTACGTTTGG", Strand::Forward),
            MatchResult::Match { key: BString::from("ATTAC"), mismatches: 0, reverse: false }
        );
        // no-calls in the variable region are not counted
        assert_eq!(
            matcher.find(b"GGCACCGATNACGTTTGG", Strand::Forward),
            MatchResult::no_match(Unmatched::NoBarcode)
        );
        assert_eq!(
            matcher.find(b"GGCACGGATTACGTTTGG", Strand::Forward),
            MatchResult::no_match(Unmatched::NoAnchor)
        );
    }

    #[test]
    fn test_random_matcher_requires_constant() {
        let region = Region::unanchored(Strand::Forward, 0);
        assert_matches!(
            RandomMatcher::new(&region, &options(true)),
            Err(ConfigError::InvalidConstant { .. })
        );
    }

    #[test]
    fn test_match_sequences() {
        let choices = ["AAAA", "AACC", "GGGG"];
        let sequences = ["AAAA", "AAAT", "AACA", "TTTT", "GGG", "AAAA"];
        let results = match_sequences(&sequences, &choices, 1, false).unwrap();
        assert_eq!(
            results,
            vec![
                MatchResult::Match { key: 0, mismatches: 0, reverse: false },
                MatchResult::Match { key: 0, mismatches: 1, reverse: false },
                // one from both AAAA and AACC
                MatchResult::no_match(Unmatched::NoBarcode),
                MatchResult::no_match(Unmatched::NoBarcode),
                MatchResult::no_match(Unmatched::NoBarcode),
                MatchResult::Match { key: 0, mismatches: 0, reverse: false },
            ]
        );
    }

    #[test]
    fn test_match_sequences_reverse() {
        let choices = ["AACG", "GGGG"];
        // reverse complement of CGTT is AACG
        let results = match_sequences(&["CGTT"], &choices, 0, false).unwrap();
        assert!(results[0].is_no_match());
        let results = match_sequences(&["CGTT"], &choices, 0, true).unwrap();
        assert_eq!(results[0], MatchResult::Match { key: 0, mismatches: 0, reverse: true });
        // only the reverse complement is compared, so a forward hit no longer matches
        let results = match_sequences(&["AACG"], &choices, 0, true).unwrap();
        assert_eq!(results[0], MatchResult::no_match(Unmatched::NoBarcode));
    }

    #[test]
    fn test_match_sequences_rejects_bad_choices() {
        assert_matches!(
            match_sequences(&["ACGT"], &["ACGT", "AC-T"], 0, false),
            Err(ConfigError::InvalidBase { index: 1, .. })
        );
    }

    #[test]
    fn test_hamming_distance() {
        assert_eq!(hamming_distance(b"GATTACA", b"GATTACA"), 0);
        assert_eq!(hamming_distance(b"GATTACA", b"GACCACA"), 2);
        assert_eq!(hamming_distance(b"GATTACA", b"GANNACA"), 2);
        // N-N counts as a mismatch
        assert_eq!(hamming_distance(b"GATTACN", b"GATTACN"), 1);
    }
}
