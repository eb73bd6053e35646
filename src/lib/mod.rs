//! A library for counting barcodes in reads from pooled genetic screens.
//!
//! # Overview
//!
//! Barcodes are matched exactly or with a small number of mismatches, optionally anchored by a
//! constant region around them.  The pieces build on each other:
//!
//! - [`alphabet`] and [`hasher`] pack bases two bits at a time into rolling window keys.
//! - [`dictionary`] precomputes the keys of every barcode and its one-mismatch variants.
//! - [`anchor`] finds a constant region template in a read; [`scanner`] slides the dictionary
//!   across a read when there is no anchor.
//! - [`matcher`] turns a read into a barcode (or pair of barcodes, or random sequence) and
//!   [`count`] tallies many reads in parallel into a [`metrics::CountTable`].
//! - [`session`] counts reads incrementally in batches, as the CLI ([`run`]) does while
//!   [`thread_reader::ThreadReader`] streams chunks of FASTQ records.
#![deny(unsafe_code)]
#![allow(
    clippy::must_use_candidate,
    clippy::missing_panics_doc,
    clippy::missing_errors_doc,
    clippy::module_name_repetitions
)]
pub mod alphabet;
pub mod anchor;
pub mod count;
pub mod design;
pub mod dictionary;
pub mod errors;
pub mod hasher;
pub mod matcher;
pub mod metrics;
pub mod opts;
pub mod run;
pub mod scanner;
pub mod session;
pub mod thread_reader;
pub mod utils;
