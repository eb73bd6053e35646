//! Utility functions.
use std::{
    fs::File,
    io::{BufReader, Read},
    path::Path,
};

use anyhow::{anyhow, bail, Context, Result};
use bstr::BString;
use core::fmt::Display;
use fgoxide::io::Io;
use gzp::{deflate::Bgzf, BlockFormatSpec, GzpError, BUFSIZE};
use lazy_static::lazy_static;

lazy_static! {
    /// Return the number of cpus as a String
    pub static ref NUM_CPU: String = num_cpus::get().to_string();
}

pub mod built_info {
    use lazy_static::lazy_static;
    include!(concat!(env!("OUT_DIR"), "/built.rs"));

    /// Get a software version string including
    ///   - Git commit hash
    ///   - Git dirty info (whether the repo had uncommitted changes)
    ///   - Cargo package version if no git info found
    fn get_software_version() -> String {
        let prefix = if let Some(s) = GIT_COMMIT_HASH {
            format!("{}-{}", PKG_VERSION, s[0..8].to_owned())
        } else {
            // This shouldn't happen
            PKG_VERSION.to_string()
        };
        let suffix = match GIT_DIRTY {
            Some(true) => "-dirty",
            _ => "",
        };
        format!("{}{}", prefix, suffix)
    }

    lazy_static! {
        /// Version of the software with git hash
        pub static ref VERSION: String = get_software_version();
    }
}

/// A `MultiZip` object allows for zipping over N items.
///
/// For example, if you have a `Vec` of length 10 of `Vec`s this will pull one item from
/// each of the 10 inner vecs and return a `Vec` of length 10 with those items.
///
/// This will stop iteration as soon as the first of the inner vecs runs out of items.
pub struct MultiZip<T>(Vec<T>);

impl<T> MultiZip<T> {
    /// Create a new [`MultiZip`] iterator over a `Vec` of items.
    #[must_use]
    pub fn new(items: Vec<T>) -> Self {
        Self(items)
    }
}

impl<T> Iterator for MultiZip<T>
where
    T: Iterator,
{
    type Item = Vec<T::Item>;
    fn next(&mut self) -> Option<Self::Item> {
        self.0.iter_mut().map(Iterator::next).collect()
    }
}

/// How an input FASTQ is stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputFormat {
    Plain,
    Bgzf,
}

/// Determine whether `file` is plain text or BGZF.  GZIP files that are not BGZF are an error,
/// as they cannot be decompressed in parallel.
pub fn sniff_format(file: &Path) -> Result<InputFormat> {
    let mut reader = match File::open(&file) {
        Ok(f) => BufReader::with_capacity(BUFSIZE, f),
        Err(error) => {
            return Err(error).with_context(|| format!("Failed to open {}", file.to_string_lossy()))
        }
    };
    let mut bytes = Vec::with_capacity(Bgzf::HEADER_SIZE);
    reader
        .by_ref()
        .take(Bgzf::HEADER_SIZE as u64)
        .read_to_end(&mut bytes)
        .with_context(|| format!("Error reading from: {}", file.to_string_lossy()))?;

    if bytes.len() < 2 || bytes[0] != 31 || bytes[1] != 139 {
        // not GZIP at all, so read as plain text
        Ok(InputFormat::Plain)
    } else if bytes.len() < Bgzf::HEADER_SIZE {
        let message = format!("Error reading from: {}\nIs it truncated?", file.to_string_lossy());
        Err(anyhow!(message))
    } else if bytes[2] != 8 || bytes[3] & 4 != 4 || bytes[12] != b'B' || bytes[13] != b'C' {
        // non-BGZF GZIP file
        report_bgzf_error(file, GzpError::InvalidHeader("Header in GZIP but not BGZF format"))
    } else {
        Ok(InputFormat::Bgzf)
    }
}

/// Creates an error message when a compressed file is not in BGZF format.
fn report_bgzf_error<C, T>(file: &Path, context: C) -> Result<T>
where
    C: Display + Send + Sync + 'static,
{
    let filename = file.to_string_lossy();
    let message = format!(
        "
Error reading from: {}

Compressed input must be in BGZF (bgzip) format!

The input was found to be in GZIP format.

To re-compress a GZIP file with bgzip:
  1. install with `conda install -c bioconda htslib`
     or from http://www.htslib.org/download/
  2. `gunzip -c {} > tmp.fastq`
  3. `bgzip --stdout --threads tmp.fastq > {}`

Alternatively, decompress it and count the plain FASTQ.
",
        filename, filename, filename,
    );
    Err(anyhow!(message).context(context))
}

/// Read a barcode pool: one barcode per line, surrounding whitespace ignored.  Blank lines and
/// lines starting with `#` are skipped.
pub fn read_pool(path: &Path) -> Result<Vec<BString>> {
    let io = Io::default();
    let lines = io
        .read_lines(&path)
        .with_context(|| format!("Failed to read barcodes from {}", path.to_string_lossy()))?;
    let pool: Vec<BString> = lines
        .iter()
        .map(|line| line.trim())
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(BString::from)
        .collect();
    if pool.is_empty() {
        bail!("No barcodes found in {}", path.to_string_lossy());
    }
    Ok(pool)
}

/// The part of a FASTQ header that names the read: everything before the first space.
pub fn read_name(head: &[u8]) -> &[u8] {
    head.split(|b| *b == b' ').next().unwrap_or(head)
}
