//! A [`ThreadReader`] allows for pushing the reading of a FASTQ file onto a separate thread.
//!
//! Plain FASTQ is read directly; BGZF input is decompressed by a pooled decompressor.  Records
//! are parsed in N sized chunks and sent to the counting thread over a bounded channel.

use std::{
    fs::File,
    io::{BufReader, Read},
    num::NonZeroUsize,
    path::{Path, PathBuf},
    thread::JoinHandle,
};

use anyhow::{Context, Result};
use flume::{bounded, Receiver};
use gzp::{deflate::Bgzf, par::decompress::ParDecompressBuilder, BUFSIZE};
use log::debug;
use seq_io::fastq::{self, RecordSet};

use crate::utils::{sniff_format, InputFormat};

/// The number of chunks to allow in the reader channel at one time.
const READER_CHANNEL_SIZE: usize = 100;

/// A struct to hold onto the handle for a thread that is reading chunks of FASTQ from a file.
pub struct ThreadReader {
    /// The [`JoinHandle`] for the thread that is reading.
    pub handle: JoinHandle<Result<()>>,
    /// The channel that will be receiving [`RecordSet`]s.
    pub rx: Receiver<RecordSet>,
}

/// Open `file` for reading, decompressing it if it is BGZF.
fn open_input(file: &Path, decompression_threads: usize) -> Result<Box<dyn Read>> {
    let format = sniff_format(file)?;
    debug!("Reading {} as {:?}", file.to_string_lossy(), format);
    let reader = BufReader::with_capacity(
        BUFSIZE,
        File::open(file).with_context(|| format!("Failed to open {}", file.to_string_lossy()))?,
    );
    Ok(match format {
        InputFormat::Plain => Box::new(reader),
        InputFormat::Bgzf => Box::new(
            ParDecompressBuilder::<Bgzf>::new()
                .num_threads(decompression_threads)
                .with_context(|| {
                    format!(
                        "Error in setting threads when creating decompressor for {}",
                        file.to_string_lossy()
                    )
                })?
                .from_reader(reader),
        ),
    })
}

impl ThreadReader {
    /// Create a new [`ThreadReader`] for a given file that will read `chunksize` records at a time.
    ///
    /// Any error opening or parsing the file is returned when the thread is joined; the channel
    /// is closed early in that case.
    // Chunksize can't be zero or `seq_io` would try to read the whole file into one record set.
    pub fn new(file: PathBuf, chunksize: NonZeroUsize, decompression_threads: usize) -> Self {
        let (tx, rx) = bounded(READER_CHANNEL_SIZE);
        let handle = std::thread::spawn(move || {
            let mut reader =
                fastq::Reader::with_capacity(open_input(&file, decompression_threads)?, BUFSIZE);

            let mut record_set = RecordSet::default();
            while reader
                .read_record_set_exact(&mut record_set, usize::from(chunksize))
                .with_context(|| {
                    format!("Failed reading record set from {}", file.to_string_lossy())
                })?
            {
                tx.send(record_set).context("Failed to send record set from reader")?;
                record_set = RecordSet::default();
            }
            Ok(())
        });

        Self { handle, rx }
    }

    /// Wait for the reading thread to finish, surfacing any error it hit.
    pub fn join(self) -> Result<()> {
        match self.handle.join() {
            Ok(result) => result,
            Err(e) => std::panic::resume_unwind(e),
        }
    }
}

#[cfg(test)]
mod test {
    use std::num;

    use rstest::rstest;
    use seq_io::fastq::OwnedRecord;
    use tempfile::tempdir;

    use crate::utils::test_commons::{generate_reads, write_reads_to_file};

    #[rstest]
    #[case(1, 10, "reads.fastq.gz")]
    #[case(10, 1, "reads.fastq.gz")]
    #[case(0, 100, "reads.fastq.gz")]
    #[should_panic]
    #[case(100, 0, "reads.fastq.gz")] // 0 is an illegal chunksize
    #[case(100, 1, "reads.fastq")]
    #[case(10_000, 500, "reads.fastq")]
    #[case(10_000, 500, "reads.fastq.gz")]
    fn test_thread_reader(
        #[case] reads_in_file: usize,
        #[case] chunksize: usize,
        #[case] name: &str,
    ) {
        let dir = tempdir().unwrap();
        let file = dir.path().join(name);
        let reads = generate_reads("frag", b"ACGTACGTAC", reads_in_file);
        write_reads_to_file(reads.clone().into_iter(), &file);

        let reader = super::ThreadReader::new(file, num::NonZeroUsize::new(chunksize).unwrap(), 4);
        let seen_reads: Vec<OwnedRecord> = reader
            .rx
            .iter()
            .flat_map(|chunk| {
                chunk.into_iter().map(|record| record.to_owned_record()).collect::<Vec<_>>()
            })
            .collect();
        assert_eq!(seen_reads, reads);
        reader.join().unwrap();
    }

    #[test]
    fn test_thread_reader_malformed_fastq() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("bad.fastq");
        std::fs::write(&file, "not a fastq file\n").unwrap();
        let reader = super::ThreadReader::new(file, num::NonZeroUsize::new(10).unwrap(), 1);
        assert_eq!(reader.rx.iter().count(), 0);
        assert!(reader.join().is_err());
    }
}
