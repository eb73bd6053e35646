use std::vec::Vec;

use anyhow::{bail, ensure, Context, Result};
use bstr::ByteSlice;
use log::info;
use seq_io::{fastq::RecordSet, BaseRecord};

use crate::{
    count::{Classifier, OwnedFragment, PairClassifier, RandomClassifier, SingleClassifier},
    design::{PairDesign, PairLayout, Pairing, RandomDesign, SingleDesign},
    metrics::{write_pair_counts, write_sequence_counts, write_single_counts, CountTable},
    opts::{DesignKind, Opts},
    session::Session,
    thread_reader::ThreadReader,
    utils::{read_name, read_pool, sniff_format, MultiZip},
};

/// Convert one chunk per input FASTQ into fragments, checking that mates agree.
fn to_fragments(chunks: &[RecordSet]) -> Result<Vec<OwnedFragment>> {
    match chunks {
        [reads] => Ok(reads.into_iter().map(|r| OwnedFragment::single(r.seq().to_vec())).collect()),
        [reads1, reads2] => {
            ensure!(
                reads1.len() == reads2.len(),
                "Unequal number of reads in each record set (likely uneven input FASTQs)"
            );
            reads1
                .into_iter()
                .zip(reads2.into_iter())
                .map(|(r1, r2)| {
                    let (name1, name2) = (read_name(r1.head()), read_name(r2.head()));
                    ensure!(
                        name1 == name2,
                        "Mate names do not match: {} and {}",
                        name1.as_bstr(),
                        name2.as_bstr()
                    );
                    Ok(OwnedFragment::paired(r1.seq().to_vec(), r2.seq().to_vec()))
                })
                .collect()
        }
        _ => bail!("Expected one or two FASTQs, found {}", chunks.len()),
    }
}

/// Stream every read of the input FASTQs through a counting session.
fn count_fastqs<C: Classifier>(opts: &Opts, classifier: C) -> Result<CountTable<C::Key>>
where
    C::Key: Clone,
{
    let mut session = Session::setup(classifier, &opts.count_options())?;

    info!("Creating reader threads");
    let readers = opts
        .fastqs
        .iter()
        .map(|f| {
            ThreadReader::new(f.clone(), opts.chunksize, opts.decompression_threads_per_reader)
        })
        .collect::<Vec<_>>();

    info!("Counting reads");
    let iterators = readers.iter().map(|r| r.rx.iter()).collect();
    for chunks in MultiZip::new(iterators) {
        let fragments = to_fragments(&chunks)?;
        session.update(&fragments)?;
    }

    // A reader with records left over means the inputs are uneven, unless another reader
    // stopped early on an error.
    info!("Joining reader threads");
    let mut uneven = false;
    let mut finished = vec![];
    for reader in readers {
        if reader.rx.recv().is_ok() {
            uneven = true;
        } else {
            finished.push(reader);
        }
    }
    for reader in finished {
        reader.join()?;
    }
    ensure!(!uneven, "Unequal number of reads in each FASTQ (likely uneven input FASTQs)");

    let table = session.finalize();
    info!(
        "Counted {} reads: {} matched, {} unmatched",
        table.diagnostics().total,
        table.diagnostics().matched,
        table.unmatched()
    );
    Ok(table)
}

/// Load the design described by `opts`, count the reads, and write the reports.
pub fn run(opts: Opts) -> Result<(), anyhow::Error> {
    // Preflight checks
    opts.validate()?;
    ensure!(
        opts.output_dir.exists(),
        "Output directory does not exist: {}",
        &opts.output_dir.to_string_lossy()
    );
    for fastq in &opts.fastqs {
        sniff_format(fastq)?;
    }

    let options = opts.count_options();
    let mut regions = opts.regions().into_iter();
    let diagnostics = match opts.design {
        DesignKind::Single => {
            info!("Loading barcodes from {}", opts.pools[0].to_string_lossy());
            let pool = read_pool(&opts.pools[0])?;
            let region = regions.next().context("Missing barcode region")?;
            let design = SingleDesign { pool, region };
            let classifier = SingleClassifier::new(&design, &options)?;
            let table = count_fastqs(&opts, classifier)?;

            info!("Writing counts");
            write_single_counts(&table, &design.pool, &opts.output_dir, &opts.prefix)?;
            *table.diagnostics()
        }
        DesignKind::Combination | DesignKind::Dual => {
            info!(
                "Loading barcodes from {} and {}",
                opts.pools[0].to_string_lossy(),
                opts.pools[1].to_string_lossy()
            );
            let (first, second) = (read_pool(&opts.pools[0])?, read_pool(&opts.pools[1])?);
            let (pools, pairing) = if opts.design == DesignKind::Dual {
                let (pool1, pool2, pairing) = Pairing::from_paired_columns(&first, &second)?;
                ((pool1, pool2), pairing)
            } else {
                ((first, second), Pairing::AnyCombination)
            };
            let layout = match (regions.next(), regions.next()) {
                (Some(read1), Some(read2)) => PairLayout::PairedEnd { read1, read2 },
                (Some(region), None) => PairLayout::SingleEnd { region },
                _ => bail!("Missing barcode region"),
            };
            let design = PairDesign { layout, pools, pairing, randomized: opts.randomized };
            let classifier = PairClassifier::new(&design, &options)?;
            let table = count_fastqs(&opts, classifier)?;

            info!("Writing counts");
            let pools = (design.pools.0.as_slice(), design.pools.1.as_slice());
            write_pair_counts(&table, pools, &design.pairing, &opts.output_dir, &opts.prefix)?;
            *table.diagnostics()
        }
        DesignKind::Random => {
            let region = regions.next().context("Missing barcode region")?;
            let classifier = RandomClassifier::new(&RandomDesign { region }, &options)?;
            let table = count_fastqs(&opts, classifier)?;

            info!("Writing counts");
            write_sequence_counts(&table, &opts.output_dir, &opts.prefix)?;
            *table.diagnostics()
        }
    };

    info!("Writing diagnostics");
    diagnostics.write(&opts.output_dir, &opts.prefix)?;
    Ok(())
}

#[cfg(test)]
mod test {
    use std::{fs::create_dir, path::Path};

    use fgoxide::io::DelimFile;
    use rstest::rstest;
    use seq_io::fastq::OwnedRecord;

    use super::run;
    use crate::{
        design::Strand,
        metrics::{BarcodeCount, Diagnostics, PairCount, SequenceCount, UNMATCHED_NAME},
        opts::{DesignKind, Opts},
        utils::test_commons::{fq, generate_reads, write_pool, write_reads_to_file},
    };

    fn read_counts<T: serde::de::DeserializeOwned>(output: &Path) -> Vec<T> {
        DelimFile::default().read_tsv(&output.join("counts.tsv")).unwrap()
    }

    fn read_diagnostics(output: &Path) -> Diagnostics {
        let mut rows: Vec<Diagnostics> =
            DelimFile::default().read_tsv(&output.join("diagnostics.tsv")).unwrap();
        assert_eq!(rows.len(), 1);
        rows.remove(0)
    }

    #[rstest]
    fn test_end_to_end_single(
        #[values("reads.fastq", "reads.fastq.gz")] name: &str,
        #[values(1, 2)] threads: usize,
    ) {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("output");
        create_dir(&output).unwrap();

        let pool = dir.path().join("pool.txt");
        write_pool(&["ACGTAC", "TTGGCC", "GATTAC"], &pool);

        let fastq = dir.path().join(name);
        let reads: Vec<OwnedRecord> = [
            generate_reads("exact", b"CACCGACGTACGTTT", 5),
            generate_reads("one_mismatch", b"CACCGACGAACGTTT", 3),
            generate_reads("other", b"CACCGTTGGCCGTTT", 2),
            generate_reads("no_anchor", b"TTTTTTTTTTTTTTT", 4),
        ]
        .concat();
        write_reads_to_file(reads.into_iter(), &fastq);

        let opts = Opts {
            design: DesignKind::Single,
            fastqs: vec![fastq],
            pools: vec![pool],
            constants: vec!["CACCGNNNNNNGTTT".to_string()],
            output_dir: output.clone(),
            diagnostics: true,
            threads,
            ..Opts::default()
        };
        run(opts).unwrap();

        let counts: Vec<BarcodeCount> = read_counts(&output);
        let actual: Vec<(Option<usize>, &str, u64)> =
            counts.iter().map(|c| (c.index, c.barcode.as_str(), c.count)).collect();
        assert_eq!(
            actual,
            vec![
                (Some(0), "ACGTAC", 8),
                (Some(1), "TTGGCC", 2),
                (Some(2), "GATTAC", 0),
                (None, UNMATCHED_NAME, 4)
            ]
        );

        let diagnostics = read_diagnostics(&output);
        assert_eq!(diagnostics.total, 14);
        assert_eq!(diagnostics.matched, 10);
        assert_eq!(diagnostics.no_anchor, 4);
    }

    #[test]
    fn test_end_to_end_single_unanchored_with_prefix() {
        let dir = tempfile::tempdir().unwrap();
        let pool = dir.path().join("pool.txt");
        write_pool(&["ACGT", "TTTT"], &pool);
        let fastq = dir.path().join("reads.fastq");
        write_reads_to_file([fq("r1", b"GGACGTCC"), fq("r2", b"GGCC")].into_iter(), &fastq);

        let opts = Opts {
            fastqs: vec![fastq],
            pools: vec![pool],
            output_dir: dir.path().to_path_buf(),
            prefix: "sample1.".to_string(),
            mismatches: vec![0],
            ..Opts::default()
        };
        run(opts).unwrap();

        let counts: Vec<BarcodeCount> =
            DelimFile::default().read_tsv(&dir.path().join("sample1.counts.tsv")).unwrap();
        assert_eq!(counts.iter().map(|c| c.count).collect::<Vec<_>>(), vec![1, 0, 1]);
        assert!(dir.path().join("sample1.diagnostics.tsv").exists());
    }

    #[rstest]
    fn test_end_to_end_dual_paired_end(#[values(false, true)] randomized: bool) {
        let dir = tempfile::tempdir().unwrap();
        let pool1 = dir.path().join("pool1.txt");
        let pool2 = dir.path().join("pool2.txt");
        write_pool(&["AAAAAA", "CCCCCC", "AAAAAA"], &pool1);
        write_pool(&["GGGGGG", "TTTTTT", "TTTTTT"], &pool2);

        let r1 = dir.path().join("r1.fastq.gz");
        let r2 = dir.path().join("r2.fastq.gz");
        write_reads_to_file(
            [
                fq("frag1 1:N", b"GTAAAAAAGT"),
                fq("frag2 1:N", b"GTCCCCCCGT"),
                fq("frag3 1:N", b"GTCCCCCCGT"),
                fq("frag4 1:N", b"ATGGGGGGAT"),
            ]
            .into_iter(),
            &r1,
        );
        write_reads_to_file(
            [
                fq("frag1 2:N", b"ATGGGGGGAT"),
                fq("frag2 2:N", b"ATTTTTTTAT"),
                fq("frag3 2:N", b"ATGGGGGGAT"),
                fq("frag4 2:N", b"GTAAAAAAGT"),
            ]
            .into_iter(),
            &r2,
        );

        let opts = Opts {
            design: DesignKind::Dual,
            fastqs: vec![r1, r2],
            pools: vec![pool1, pool2],
            constants: vec!["GTNNNNNNGT".to_string(), "ATNNNNNNAT".to_string()],
            output_dir: dir.path().to_path_buf(),
            randomized,
            diagnostics: true,
            ..Opts::default()
        };
        run(opts).unwrap();

        let counts: Vec<PairCount> = read_counts(dir.path());
        let actual: Vec<(&str, &str, u64)> =
            counts.iter().map(|c| (c.barcode1.as_str(), c.barcode2.as_str(), c.count)).collect();
        // pools are deduplicated: AAAAAA/CCCCCC and GGGGGG/TTTTTT
        let swapped = if randomized { 1 } else { 0 };
        assert_eq!(
            actual,
            vec![("AAAAAA", "GGGGGG", 1 + swapped), ("AAAAAA", "TTTTTT", 0), ("CCCCCC", "TTTTTT", 1)]
        );
        let diagnostics = read_diagnostics(dir.path());
        assert_eq!(diagnostics.invalid_pair, 1);
    }

    #[test]
    fn test_end_to_end_combination_single_end() {
        let dir = tempfile::tempdir().unwrap();
        let pool1 = dir.path().join("pool1.txt");
        let pool2 = dir.path().join("pool2.txt");
        write_pool(&["CC", "TT"], &pool1);
        write_pool(&["AC", "GT"], &pool2);
        let fastq = dir.path().join("reads.fastq");
        write_reads_to_file(
            [fq("r1", b"ACCGACA"), fq("r2", b"ATTGGTA"), fq("r3", b"ATTGGTA")].into_iter(),
            &fastq,
        );

        let opts = Opts {
            design: DesignKind::Combination,
            fastqs: vec![fastq],
            pools: vec![pool1, pool2],
            constants: vec!["ANNGNNA".to_string()],
            mismatches: vec![0],
            output_dir: dir.path().to_path_buf(),
            ..Opts::default()
        };
        run(opts).unwrap();

        let counts: Vec<PairCount> = read_counts(dir.path());
        let actual: Vec<(usize, usize, u64)> =
            counts.iter().map(|c| (c.index1, c.index2, c.count)).collect();
        assert_eq!(actual, vec![(0, 0, 1), (1, 1, 2)]);
    }

    #[test]
    fn test_end_to_end_random() {
        let dir = tempfile::tempdir().unwrap();
        let fastq = dir.path().join("reads.fastq.gz");
        let reads: Vec<OwnedRecord> = [
            generate_reads("a", b"GGCACCGATTACGTTTGG", 3),
            generate_reads("b", b"CACCGGATTAGTTT", 1),
            generate_reads("c", b"AAAAAAAAAAAAAA", 1),
        ]
        .concat();
        write_reads_to_file(reads.into_iter(), &fastq);

        let opts = Opts {
            design: DesignKind::Random,
            fastqs: vec![fastq],
            constants: vec!["CACCGNNNNNGTTT".to_string()],
            strands: vec![Strand::Forward],
            mismatches: vec![0],
            output_dir: dir.path().to_path_buf(),
            ..Opts::default()
        };
        run(opts).unwrap();

        let counts: Vec<SequenceCount> = read_counts(dir.path());
        let actual: Vec<(&str, u64)> =
            counts.iter().map(|c| (c.sequence.as_str(), c.count)).collect();
        assert_eq!(actual, vec![("ATTAC", 3), ("GATTA", 1)]);
        assert_eq!(read_diagnostics(dir.path()).unmatched, 1);
    }

    #[rstest]
    #[should_panic(expected = "Unequal number of reads")]
    fn test_uneven_fastqs_fail(#[values(1, 2)] extra: usize) {
        let dir = tempfile::tempdir().unwrap();
        let pool1 = dir.path().join("pool1.txt");
        let pool2 = dir.path().join("pool2.txt");
        write_pool(&["AAAA"], &pool1);
        write_pool(&["GGGG"], &pool2);
        let r1 = dir.path().join("r1.fastq");
        let r2 = dir.path().join("r2.fastq");
        write_reads_to_file(generate_reads("frag", b"AAAA", 3).into_iter(), &r1);
        let reads2 =
            [generate_reads("frag", b"GGGG", 3), generate_reads("extra", b"GGGG", extra)].concat();
        write_reads_to_file(reads2.into_iter(), &r2);

        let opts = Opts {
            design: DesignKind::Combination,
            fastqs: vec![r1, r2],
            pools: vec![pool1, pool2],
            output_dir: dir.path().to_path_buf(),
            chunksize: std::num::NonZeroUsize::new(3).unwrap(),
            ..Opts::default()
        };
        run(opts).unwrap();
    }

    #[test]
    fn test_mismatched_mate_names_fail() {
        let dir = tempfile::tempdir().unwrap();
        let pool1 = dir.path().join("pool1.txt");
        let pool2 = dir.path().join("pool2.txt");
        write_pool(&["AAAA"], &pool1);
        write_pool(&["GGGG"], &pool2);
        let r1 = dir.path().join("r1.fastq");
        let r2 = dir.path().join("r2.fastq");
        write_reads_to_file([fq("frag1 1:N", b"AAAA")].into_iter(), &r1);
        write_reads_to_file([fq("frag2 2:N", b"GGGG")].into_iter(), &r2);

        let opts = Opts {
            design: DesignKind::Combination,
            fastqs: vec![r1, r2],
            pools: vec![pool1, pool2],
            output_dir: dir.path().to_path_buf(),
            ..Opts::default()
        };
        let error = run(opts).unwrap_err();
        assert!(format!("{:#}", error).contains("Mate names do not match"));
    }

    #[test]
    fn test_invalid_pool_fails() {
        let dir = tempfile::tempdir().unwrap();
        let pool = dir.path().join("pool.txt");
        write_pool(&["ACGT", "AC-T"], &pool);
        let fastq = dir.path().join("reads.fastq");
        write_reads_to_file([fq("r1", b"ACGT")].into_iter(), &fastq);

        let opts = Opts {
            fastqs: vec![fastq],
            pools: vec![pool],
            output_dir: dir.path().to_path_buf(),
            ..Opts::default()
        };
        let error = run(opts).unwrap_err();
        assert!(format!("{:#}", error).contains("invalid base"));
    }

    #[test]
    fn test_missing_output_dir_fails() {
        let dir = tempfile::tempdir().unwrap();
        let pool = dir.path().join("pool.txt");
        write_pool(&["ACGT"], &pool);
        let fastq = dir.path().join("reads.fastq");
        write_reads_to_file([fq("r1", b"ACGT")].into_iter(), &fastq);

        let opts = Opts {
            fastqs: vec![fastq],
            pools: vec![pool],
            output_dir: dir.path().join("missing"),
            ..Opts::default()
        };
        assert!(run(opts).is_err());
    }
}
