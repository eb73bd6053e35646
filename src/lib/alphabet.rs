//! Classification and 2-bit encoding of DNA bases.
//!
//! Only the upper-case canonical bases `A`, `C`, `G` and `T` are valid.  Everything else,
//! including `N` and lower-case ambiguity codes, is invalid and poisons any window containing it.

/// The canonical bases, in the order of their 2-bit codes.
pub const BASES: [u8; 4] = [b'A', b'C', b'G', b'T'];

/// Returns true if `base` is one of the four canonical bases.
#[inline]
pub fn is_valid(base: u8) -> bool {
    matches!(base, b'A' | b'C' | b'G' | b'T')
}

/// The 2-bit code of a base, `None` for invalid bases.
#[inline]
pub fn encode(base: u8) -> Option<u64> {
    match base {
        b'A' => Some(0),
        b'C' => Some(1),
        b'G' => Some(2),
        b'T' => Some(3),
        _ => None,
    }
}

/// The 2-bit code of a base.
///
/// Invalid bases are coded as `A`; callers track validity separately (see
/// [`crate::hasher::RollingWindow`]) so the code of an invalid base is never looked up.
#[inline]
pub fn code(base: u8) -> u64 {
    encode(base).unwrap_or(0)
}

/// The complement of a base; invalid bases complement to `N`.
#[inline]
pub fn complement(base: u8) -> u8 {
    match base {
        b'A' => b'T',
        b'C' => b'G',
        b'G' => b'C',
        b'T' => b'A',
        _ => b'N',
    }
}

/// Reverse complement a sequence.
pub fn reverse_complement(seq: &[u8]) -> Vec<u8> {
    seq.iter().rev().map(|b| complement(*b)).collect()
}

/// Count the invalid bases in a sequence.
#[inline]
pub fn count_invalid(seq: &[u8]) -> usize {
    seq.iter().filter(|b| !is_valid(**b)).count()
}
