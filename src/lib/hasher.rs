//! Rolling 2-bit window keys.
//!
//! A window of `length` bases is packed into a [`WindowKey`] two bits per base, most significant
//! base first.  Sliding the window one base to the right is O(1): the leftmost base's bits are
//! masked off, the key is shifted and the incoming base is appended.  The number of invalid bases
//! in the window is tracked alongside the key, and a window is only matchable when that count is
//! zero.

use crate::alphabet::{code, count_invalid, is_valid};

/// The integer encoding of a window.
pub type WindowKey = u64;

/// The longest window that fits in a [`WindowKey`].
pub const MAX_WINDOW_LENGTH: usize = 32;

/// The mask that keeps the bits of `length` bases.
#[inline]
fn mask(length: usize) -> WindowKey {
    if length >= MAX_WINDOW_LENGTH {
        WindowKey::MAX
    } else {
        (1 << (2 * length)) - 1
    }
}

/// Compute the key of the first `length` bases of `seq`.
///
/// `length` must be no longer than `seq` or [`MAX_WINDOW_LENGTH`].  Invalid bases are hashed as
/// `A`, so validity must be checked separately.
#[inline]
pub fn hash(seq: &[u8], length: usize) -> WindowKey {
    debug_assert!(length <= MAX_WINDOW_LENGTH && length <= seq.len());
    seq[..length].iter().fold(0, |key, base| (key << 2) | code(*base))
}

/// Slide the window of `length` bases encoded by `key` one base to the right.
#[inline]
pub fn shift(key: WindowKey, length: usize, incoming: u8) -> WindowKey {
    debug_assert!(length > 0);
    ((key & mask(length - 1)) << 2) | code(incoming)
}

/// A window sliding across a sequence, keeping its key and invalid-base count up to date.
#[derive(Debug, Clone)]
pub struct RollingWindow<'a> {
    seq: &'a [u8],
    length: usize,
    start: usize,
    key: WindowKey,
    invalid: usize,
}

impl<'a> RollingWindow<'a> {
    /// Create a window over the first `length` bases of `seq`.
    ///
    /// Returns `None` if `length` is zero, longer than [`MAX_WINDOW_LENGTH`], or longer than `seq`.
    pub fn new(seq: &'a [u8], length: usize) -> Option<Self> {
        if length == 0 || length > MAX_WINDOW_LENGTH || length > seq.len() {
            return None;
        }
        Some(Self {
            seq,
            length,
            start: 0,
            key: hash(seq, length),
            invalid: count_invalid(&seq[..length]),
        })
    }

    #[inline]
    pub fn key(&self) -> WindowKey {
        self.key
    }

    /// The offset of the first base of the window.
    #[inline]
    pub fn start(&self) -> usize {
        self.start
    }

    #[inline]
    pub fn length(&self) -> usize {
        self.length
    }

    /// True if the window contains only canonical bases.
    #[inline]
    pub fn is_valid(&self) -> bool {
        self.invalid == 0
    }

    /// The bases currently in the window.
    pub fn bases(&self) -> &'a [u8] {
        &self.seq[self.start..self.start + self.length]
    }

    /// Move the window one base to the right, returning false if it already ends at the end of
    /// the sequence.
    #[inline]
    pub fn advance(&mut self) -> bool {
        let end = self.start + self.length;
        if end >= self.seq.len() {
            return false;
        }
        if !is_valid(self.seq[self.start]) {
            self.invalid -= 1;
        }
        let incoming = self.seq[end];
        self.key = shift(self.key, self.length, incoming);
        if !is_valid(incoming) {
            self.invalid += 1;
        }
        self.start += 1;
        true
    }
}
