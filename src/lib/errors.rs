//! Errors raised while configuring or running barcode counting.
//!
//! Per-read outcomes (no anchor, no barcode, ambiguous matches, ...) are never errors, they are
//! recorded in [`crate::metrics::Diagnostics`].  Only problems that make every count meaningless
//! are surfaced here, and they abort the whole call.

use bstr::BString;
use thiserror::Error;

/// The reason a constant region (template) has been deemed invalid.
#[derive(Debug, PartialEq, Eq)]
#[non_exhaustive]
pub enum ReasonConstantInvalid {
    /// The template contains a character other than `A`, `C`, `G`, `T` or the `N` placeholder.
    InvalidCharacter { position: usize, character: char },
    /// The design needs a constant region but none was given.
    Empty,
}

impl std::fmt::Display for ReasonConstantInvalid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidCharacter { position, character } => {
                write!(f, "invalid character '{}' at position {}", character, position)
            }
            Self::Empty => write!(f, "a constant region is required"),
        }
    }
}

/// Fatal configuration problems, detected before any read is examined.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("The barcode pool must contain at least one barcode")]
    EmptyPool,

    #[error("Barcode number {index} in the pool is an empty string")]
    EmptyBarcode { index: usize },

    #[error("Barcode number {index} `{barcode}` has an invalid base '{base}' at position {position}")]
    InvalidBase { index: usize, barcode: BString, position: usize, base: char },

    #[error("Barcode number {index} has length {length}, longer than the supported maximum of {max}")]
    BarcodeTooLong { index: usize, length: usize, max: usize },

    #[error("A mismatch budget of {mismatches} is out of range, at most {max} is supported here")]
    MismatchesOutOfRange { mismatches: usize, max: usize },

    #[error("Invalid constant region `{constant}`: {reason}")]
    InvalidConstant { constant: BString, reason: ReasonConstantInvalid },

    #[error("The constant region `{constant}` has {found} variable region(s), expected {expected}")]
    VariableRegionCount { constant: BString, expected: usize, found: usize },

    #[error("Barcode `{barcode}` has length {found} but its variable region has length {expected}")]
    VariableRegionLength { barcode: BString, expected: usize, found: usize },

    #[error("Barcode columns have unequal lengths: {first} and {second}")]
    UnequalPoolColumns { first: usize, second: usize },

    #[error("Combination ({first}, {second}) refers to a barcode outside the pools")]
    CombinationOutOfRange { first: usize, second: usize },

    #[error("Unable to build the worker thread pool")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

/// Errors raised while counting a batch of reads.
#[derive(Error, Debug)]
pub enum CountError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Fragment number {index} has no second read but the design is paired-end")]
    MissingMate { index: usize },
}
