//! Locating constant regions (anchors) within reads.
//!
//! A constant region is given as a [`Template`]: a string of `ACGT` with runs of `N` marking the
//! variable (barcode) regions.  Candidate offsets in a read are checked position by position
//! against the constant bases only, counting substitutions; the `N` positions never count as
//! mismatches.  This is a fixed-budget linear scan, not an alignment.

use std::ops::Range;

use bstr::BString;
use lazy_static::lazy_static;
use regex::bytes::Regex;

use crate::{
    alphabet::reverse_complement,
    errors::{ConfigError, ReasonConstantInvalid},
};

lazy_static! {
    /// A run of placeholder bases.
    static ref VARIABLE_REGION: Regex = Regex::new("N+").unwrap();
}

/// A constant region with zero or more variable regions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    /// The full template, including `N` placeholders.
    bases: Vec<u8>,
    /// The variable regions, in order, as ranges into `bases`.
    variable_regions: Vec<Range<usize>>,
}

/// An offset in a read where the constant bases of a [`Template`] fit within budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Anchor {
    pub offset: usize,
    pub mismatches: usize,
}

impl Template {
    /// Parse a template.
    ///
    /// # Errors
    ///
    /// - [`ConfigError::InvalidConstant`] if the template contains anything but `ACGTN`
    pub fn new(constant: &[u8]) -> Result<Self, ConfigError> {
        if let Some(position) = constant.iter().position(|b| !b"ACGTN".contains(b)) {
            return Err(ConfigError::InvalidConstant {
                constant: BString::from(constant),
                reason: ReasonConstantInvalid::InvalidCharacter {
                    position,
                    character: char::from(constant[position]),
                },
            });
        }
        let variable_regions = VARIABLE_REGION.find_iter(constant).map(|m| m.range()).collect();
        Ok(Self { bases: constant.to_vec(), variable_regions })
    }

    /// The full length of the template.
    pub fn len(&self) -> usize {
        self.bases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bases.is_empty()
    }

    pub fn bases(&self) -> &[u8] {
        &self.bases
    }

    pub fn variable_regions(&self) -> &[Range<usize>] {
        &self.variable_regions
    }

    /// The number of constant (non-placeholder) bases.
    pub fn num_constant_bases(&self) -> usize {
        self.bases.len() - bytecount::count(&self.bases, b'N')
    }

    /// The number of mismatches between the constant bases and `read` at `offset`, or `None` if
    /// the template does not fit or there are more than `max_mismatches`.
    #[inline]
    pub fn mismatches_at(&self, read: &[u8], offset: usize, max_mismatches: usize) -> Option<usize> {
        let window = read.get(offset..offset + self.bases.len())?;
        let mut mismatches = 0;
        for (expected, observed) in self.bases.iter().zip(window.iter()) {
            if *expected != b'N' && expected != observed {
                mismatches += 1;
                if mismatches > max_mismatches {
                    return None;
                }
            }
        }
        Some(mismatches)
    }

    /// All offsets where the template fits within `max_mismatches`, in increasing order.
    pub fn candidates<'a>(
        &'a self,
        read: &'a [u8],
        max_mismatches: usize,
    ) -> impl Iterator<Item = Anchor> + 'a {
        let last = (read.len() + 1).saturating_sub(self.bases.len());
        (0..last).filter_map(move |offset| {
            self.mismatches_at(read, offset, max_mismatches)
                .map(|mismatches| Anchor { offset, mismatches })
        })
    }

    /// The first offset where the template fits within `max_mismatches`.
    pub fn locate(&self, read: &[u8], max_mismatches: usize) -> Option<Anchor> {
        self.candidates(read, max_mismatches).next()
    }
}

/// Find the first offset of `constant` in `read` with at most `max_mismatches` substitutions.
///
/// If `reverse` is set the reverse complement of the read is searched and the offset is relative
/// to the start of the reverse complement.
///
/// # Errors
///
/// - [`ConfigError::InvalidConstant`] if the constant contains anything but `ACGTN`
pub fn locate_anchor(
    read: &[u8],
    constant: &[u8],
    max_mismatches: usize,
    reverse: bool,
) -> Result<Option<usize>, ConfigError> {
    let template = Template::new(constant)?;
    let anchor = if reverse {
        template.locate(&reverse_complement(read), max_mismatches)
    } else {
        template.locate(read, max_mismatches)
    };
    Ok(anchor.map(|a| a.offset))
}

#[cfg(test)]
mod test {
    use matches::assert_matches;
    use rstest::rstest;

    use super::{locate_anchor, Anchor, Template};
    use crate::errors::ConfigError;

    #[test]
    fn test_template_variable_regions() {
        let template = Template::new(b"ACGNNNNTTNNA").unwrap();
        assert_eq!(template.variable_regions(), &[3..7, 9..11]);
        assert_eq!(template.num_constant_bases(), 6);
        assert_eq!(template.len(), 12);

        let template = Template::new(b"ACGT").unwrap();
        assert!(template.variable_regions().is_empty());

        let template = Template::new(b"").unwrap();
        assert!(template.is_empty());
    }

    #[test]
    fn test_template_rejects_invalid_characters() {
        assert_matches!(Template::new(b"ACGTx"), Err(ConfigError::InvalidConstant { .. }));
        assert_matches!(Template::new(b"acgt"), Err(ConfigError::InvalidConstant { .. }));
    }

    #[test]
    fn test_mismatches_ignore_placeholders() {
        let template = Template::new(b"AANNTT").unwrap();
        assert_eq!(template.mismatches_at(b"AAGGTT", 0, 0), Some(0));
        assert_eq!(template.mismatches_at(b"AAGGTA", 0, 1), Some(1));
        assert_eq!(template.mismatches_at(b"AAGGTA", 0, 0), None);
        // a no-call in a constant position is a mismatch
        assert_eq!(template.mismatches_at(b"NAGGTT", 0, 1), Some(1));
        // does not fit
        assert_eq!(template.mismatches_at(b"AAGGT", 0, 6), None);
    }

    #[test]
    fn test_candidates_in_order() {
        let template = Template::new(b"ACNN").unwrap();
        let anchors: Vec<Anchor> = template.candidates(b"ACGGACTTAGAC", 1).collect();
        assert_eq!(
            anchors,
            vec![
                Anchor { offset: 0, mismatches: 0 },
                Anchor { offset: 4, mismatches: 0 },
                Anchor { offset: 8, mismatches: 1 },
            ]
        );
    }

    #[test]
    fn test_candidates_on_short_read() {
        let template = Template::new(b"ACGTACGT").unwrap();
        assert_eq!(template.candidates(b"ACGT", 8).count(), 0);
        assert_eq!(template.candidates(b"ACGTACGT", 0).count(), 1);
    }

    #[rstest]
    #[case(b"TTTTACGTTTTT", b"ACGT", 0, false, Some(4))]
    #[case(b"TTTTACGATTTT", b"ACGT", 0, false, None)]
    #[case(b"TTTTACGATTTT", b"ACGT", 1, false, Some(4))]
    #[case(b"AAAAAAAA", b"", 0, false, Some(0))]
    #[case(b"ACG", b"ACGT", 0, false, None)]
    // reverse complement of GGGACGTCCCA is TGGGACGTCCC
    #[case(b"GGGACGTCCCA", b"TGGG", 0, true, Some(0))]
    #[case(b"GGGACGTCCCA", b"TGGG", 0, false, None)]
    fn test_locate_anchor(
        #[case] read: &[u8],
        #[case] constant: &[u8],
        #[case] max_mismatches: usize,
        #[case] reverse: bool,
        #[case] expected: Option<usize>,
    ) {
        assert_eq!(locate_anchor(read, constant, max_mismatches, reverse).unwrap(), expected);
    }
}
