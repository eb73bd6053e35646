#![forbid(unsafe_code)]

use std::{num::NonZeroUsize, path::PathBuf, vec::Vec};

use anyhow::{anyhow, ensure, Result};
use clap::{ArgEnum, Parser, PossibleValue};
use env_logger::Env;

use crate::{
    design::{CountOptions, Region, Strand},
    utils::{built_info, NUM_CPU},
};

pub static TOOL_NAME: &str = "screencount";

/// The value of `--constants` for a region that is found without an anchor.
pub static UNANCHORED: &str = "-";

static SHORT_USAGE: &str = "Counts barcodes from pooled screens in FASTQs.";

static LONG_USAGE: &str = "
Counts barcodes from pooled screens in FASTQs.

Reads may be plain FASTQ or block compressed (e.g. with `bgzip`).  One FASTQ is given for
single-end data, two for paired-end data (read names must agree up to the first space).

Barcode pools are text files with one barcode per line.  Blank lines and lines starting with
`#` are ignored.

Designs:
  single       one barcode per read, one pool
  combination  two barcodes per fragment, two pools, every pair of barcodes is counted
  dual         two barcodes per fragment, two pools of equal length where line i of each pool
               together make the i-th expected pair; any other pair is an invalid pair
  random       no pool, the sequence in the variable region is counted

A constant region anchors a barcode: it is written as the bases around the barcode with a run
of `N` where the barcode is (e.g. `CACCGNNNNNNNNNNNNNNNNNNNNGTTT`).  A single-end
combination or dual design uses one constant with two runs of `N`.  Use `-` (or give no
constants) for a barcode that should be found anywhere in the read.

Mismatches are shared by the constant bases and the barcode(s) of a region.  Regions without a
constant allow at most one mismatch.

Outputs written to --output-dir:
  <prefix>counts.tsv       the number of reads counted per barcode (or pair, or sequence)
  <prefix>diagnostics.tsv  how many reads were matched and why the others were not

Example invocation:

screencount \\
  --design single \\
  --fastqs reads.fastq.gz \\
  --pools library.txt \\
  --constants CACCGNNNNNNNNNNNNNNNNNNNNGTTT \\
  --mismatches 1 \\
  --output-dir counts/
";

/// The kind of screen being counted.
#[derive(ArgEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum DesignKind {
    Single,
    Combination,
    Dual,
    Random,
}

impl DesignKind {
    pub fn possible_values<'a>() -> impl Iterator<Item = PossibleValue<'a>> {
        DesignKind::value_variants().iter().filter_map(ArgEnum::to_possible_value)
    }

    /// The number of barcode pool files the design takes.
    pub fn num_pools(self) -> usize {
        match self {
            Self::Single => 1,
            Self::Combination | Self::Dual => 2,
            Self::Random => 0,
        }
    }

    /// True if the design counts pairs of barcodes.
    pub fn is_pair(self) -> bool {
        matches!(self, Self::Combination | Self::Dual)
    }
}

impl std::str::FromStr for DesignKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        for variant in Self::value_variants() {
            if variant.to_possible_value().map_or(false, |v| v.matches(s, false)) {
                return Ok(*variant);
            }
        }
        Err(anyhow!("Invalid design: {}", s))
    }
}

#[derive(Parser, Debug, Clone)]
#[clap(name = TOOL_NAME, version = built_info::VERSION.as_str(), about=SHORT_USAGE, long_about=LONG_USAGE, term_width=0)]
pub struct Opts {
    /// The kind of screen.
    #[clap(long, short = 'd', possible_values=DesignKind::possible_values(), display_order = 1)]
    pub design: DesignKind,

    /// Path to the input FASTQs: one, or two for paired-end reads.
    #[clap(long, short = 'f', display_order = 2, required = true, multiple_values = true)]
    pub fastqs: Vec<PathBuf>,

    /// Path to the barcode pools, one per barcode region.
    #[clap(long, short = 'p', display_order = 3, multiple_values = true)]
    pub pools: Vec<PathBuf>,

    /// The constant region(s) around the barcode(s), one per region (or one per read for
    /// paired-end designs).  `-` for none.
    #[clap(long, short = 'c', display_order = 4, multiple_values = true)]
    pub constants: Vec<String>,

    /// The directory to write outputs, the directory must exist.
    ///
    /// This tool will overwrite existing files.
    #[clap(long, short, display_order = 5)]
    pub output_dir: PathBuf,

    /// A prefix for the output file names.
    #[clap(long, default_value = "", display_order = 6)]
    pub prefix: String,

    /// The number of mismatches allowed per region: one value, or one per region.
    #[clap(long, short = 'm', default_value = "1", multiple_values = true, display_order = 11)]
    pub mismatches: Vec<usize>,

    /// Which orientation(s) of the reads to search: one value, or one per region.
    #[clap(long, short = 's', possible_values=Strand::possible_values(), multiple_values = true, display_order = 11)]
    pub strands: Vec<Strand>,

    /// Take the first barcode found in a read rather than the best one.
    #[clap(long, display_order = 11)]
    pub use_first: bool,

    /// Also match barcodes with one deleted base (regions without a constant only).
    #[clap(long, display_order = 11)]
    pub allow_deletion: bool,

    /// The two barcodes of a pair may appear in either order.
    #[clap(long, display_order = 11)]
    pub randomized: bool,

    /// Count why reads were not matched.
    #[clap(long, display_order = 21)]
    pub diagnostics: bool,

    /// Number of threads for counting.
    #[clap(long, short = 't', default_value = NUM_CPU.as_str(), display_order = 31)]
    pub threads: usize,

    /// The number of reads to extract from a FASTQ at one time.
    #[clap(long, default_value = "10000", display_order = 31, hide = true)]
    pub chunksize: NonZeroUsize,

    /// The number of threads to use for decompression for each reader.
    #[clap(long, default_value = "4", display_order = 31, hide = true)]
    pub decompression_threads_per_reader: usize,
}

impl Opts {
    /// True if the reads are paired-end.
    pub fn is_paired_end(&self) -> bool {
        self.fastqs.len() == 2
    }

    /// The number of barcode regions: one per read for paired-end reads, otherwise one.
    pub fn num_regions(&self) -> usize {
        if self.design.is_pair() && self.is_paired_end() {
            2
        } else {
            1
        }
    }

    /// Check that the options are consistent with each other and the design.
    pub fn validate(&self) -> Result<()> {
        let regions = self.num_regions();
        ensure!(
            self.fastqs.len() == 1 || (self.fastqs.len() == 2 && self.design.is_pair()),
            "Expected one FASTQ{}, found {}",
            if self.design.is_pair() { " or two" } else { "" },
            self.fastqs.len()
        );
        ensure!(
            self.pools.len() == self.design.num_pools(),
            "Expected {} barcode pool(s) for a {:?} design, found {}",
            self.design.num_pools(),
            self.design,
            self.pools.len()
        );
        ensure!(
            self.constants.is_empty() || self.constants.len() == regions,
            "Expected {} constant region(s), found {}",
            regions,
            self.constants.len()
        );
        ensure!(
            self.mismatches.len() == 1 || self.mismatches.len() == regions,
            "Expected 1 or {} mismatch value(s), found {}",
            regions,
            self.mismatches.len()
        );
        ensure!(
            self.strands.len() <= 1 || self.strands.len() == regions,
            "Expected at most 1 or {} strand value(s), found {}",
            regions,
            self.strands.len()
        );
        ensure!(
            !self.randomized || self.design.is_pair(),
            "--randomized is only valid for combination and dual designs"
        );
        ensure!(
            self.design != DesignKind::Random || self.regions().iter().all(Region::is_anchored),
            "A random design needs a constant region"
        );
        Ok(())
    }

    /// The barcode region(s), one per region.
    pub fn regions(&self) -> Vec<Region> {
        (0..self.num_regions())
            .map(|i| {
                let constant = match self.constants.get(i).map(String::as_str) {
                    None => "",
                    Some(c) if c == UNANCHORED => "",
                    Some(c) => c,
                };
                let strand = broadcast(&self.strands, i).unwrap_or_default();
                let mismatches = broadcast(&self.mismatches, i).unwrap_or(0);
                Region::new(constant.to_ascii_uppercase(), strand, mismatches)
            })
            .collect()
    }

    /// The options shared by every design.
    pub fn count_options(&self) -> CountOptions {
        CountOptions {
            use_first: self.use_first,
            allow_deletion: self.allow_deletion,
            diagnostics: self.diagnostics,
            threads: self.threads,
        }
    }
}

/// The `i`-th value, or the single value if only one was given.
fn broadcast<T: Copy>(values: &[T], i: usize) -> Option<T> {
    if values.len() == 1 {
        values.first().copied()
    } else {
        values.get(i).copied()
    }
}

/// Implement defaults that match the CLI options to allow for easier testing.
///
/// Note that these defaults exist only within test code.
#[cfg(test)]
impl Default for Opts {
    fn default() -> Self {
        Self {
            design: DesignKind::Single,
            fastqs: vec![],
            pools: vec![],
            constants: vec![],
            output_dir: PathBuf::default(),
            prefix: String::new(),
            mismatches: vec![1],
            strands: vec![],
            use_first: false,
            allow_deletion: false,
            randomized: false,
            diagnostics: false,
            threads: 2,
            chunksize: NonZeroUsize::new(500).unwrap(),
            decompression_threads_per_reader: 2,
        }
    }
}

/// Parse args and set up logging / tracing
pub fn setup() -> Opts {
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "info");
    }
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    Opts::parse()
}
