use std::collections::hash_map::{self, HashMap};
use std::fs::File;
use std::io::{self, BufRead, BufWriter, Write};
use std::ops::{Add, AddAssign};
use std::path::{Path, PathBuf};

use rayon::prelude::*;
use rayon::ThreadPool;
use serde::Serialize;

use crate::errors::{PipelineError, Result};
use crate::modifiers::ModifierChain;
use crate::seqreader::{open_sequence_file, BatchSequenceReader, Sequence};

pub const READS_PER_BATCH: usize = 10_000;
pub const READS_PER_WINDOW: usize = 1_000_000;
pub const DEFAULT_MIN_LENGTH: usize = 16;

/// Counts of unique sequences. Merging sums counts, so the result does not
/// depend on how reads were split into batches or in which order batches finish.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FrequencyTable {
    counts: HashMap<String, u64>,
}

impl FrequencyTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, key: String, count: u64) {
        *self.counts.entry(key).or_insert(0) += count;
    }

    pub fn get(&self, key: &str) -> u64 {
        self.counts.get(key).copied().unwrap_or(0)
    }

    pub fn merge(&mut self, other: FrequencyTable) {
        if self.counts.is_empty() {
            self.counts = other.counts;
            return;
        }
        for (key, count) in other.counts {
            self.add(key, count);
        }
    }

    /// Sum of all counts.
    pub fn total(&self) -> u64 {
        self.counts.values().sum()
    }

    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    pub fn iter(&self) -> hash_map::Iter<'_, String, u64> {
        self.counts.iter()
    }

    /// Most abundant first; equal counts ordered by key.
    pub fn sorted_by_abundance(&self) -> Vec<(&str, u64)> {
        let mut entries: Vec<(&str, u64)> =
            self.counts.iter().map(|(k, &v)| (k.as_str(), v)).collect();
        entries.sort_unstable_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
        entries
    }
}

impl AddAssign for FrequencyTable {
    fn add_assign(&mut self, other: Self) {
        self.merge(other);
    }
}

impl Add for FrequencyTable {
    type Output = Self;

    fn add(mut self, other: Self) -> Self {
        self.merge(other);
        self
    }
}

impl Extend<(String, u64)> for FrequencyTable {
    fn extend<I: IntoIterator<Item = (String, u64)>>(&mut self, iter: I) {
        for (key, count) in iter {
            self.add(key, count);
        }
    }
}

impl FromIterator<(String, u64)> for FrequencyTable {
    fn from_iter<I: IntoIterator<Item = (String, u64)>>(iter: I) -> Self {
        let mut table = FrequencyTable::new();
        table.extend(iter);
        table
    }
}

impl IntoIterator for FrequencyTable {
    type Item = (String, u64);
    type IntoIter = hash_map::IntoIter<String, u64>;

    fn into_iter(self) -> Self::IntoIter {
        self.counts.into_iter()
    }
}

impl<'a> IntoIterator for &'a FrequencyTable {
    type Item = (&'a String, &'a u64);
    type IntoIter = hash_map::Iter<'a, String, u64>;

    fn into_iter(self) -> Self::IntoIter {
        self.counts.iter()
    }
}

/// Fixed-length UMI regions at both ends of a trimmed read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UmiSpec {
    pub front: usize,
    pub back: usize,
}

impl UmiSpec {
    /// Parses `"F,B"`.
    pub fn parse(s: &str) -> Result<Self> {
        let bad = || {
            PipelineError::config(format!(
                "UMI spec '{}' must be two non-negative integers separated by a comma",
                s
            ))
        };
        let (front, back) = s.split_once(',').ok_or_else(bad)?;
        let front = front.trim().parse::<usize>().map_err(|_| bad())?;
        let back = back.trim().parse::<usize>().map_err(|_| bad())?;
        Ok(Self { front, back })
    }

    /// The read with both UMI regions removed; empty if the read is too short.
    pub fn strip<'a>(&self, seq: &'a str) -> &'a str {
        let stop = seq.len().saturating_sub(self.back);
        if self.front >= stop {
            ""
        } else {
            &seq[self.front..stop]
        }
    }
}

#[derive(Debug, Clone)]
pub struct CollapseOptions {
    pub batch_size: usize,
    pub buffer_size: usize,
    pub min_length: usize,
    pub umi: Option<UmiSpec>,
}

impl Default for CollapseOptions {
    fn default() -> Self {
        Self {
            batch_size: READS_PER_BATCH,
            buffer_size: READS_PER_WINDOW,
            min_length: DEFAULT_MIN_LENGTH,
            umi: None,
        }
    }
}

impl CollapseOptions {
    pub fn validate(&self) -> Result<()> {
        if self.min_length == 0 {
            return Err(PipelineError::config("minimum read length must be at least 1"));
        }
        if self.batch_size == 0 || self.buffer_size == 0 {
            return Err(PipelineError::config("batch and buffer sizes must be positive"));
        }
        Ok(())
    }

    fn batches_per_window(&self) -> usize {
        (self.buffer_size / self.batch_size).max(1)
    }
}

/// Trims one read and returns its collapse key, or `None` if it is filtered out.
pub fn collapse_key(read: Sequence, chain: &ModifierChain, opts: &CollapseOptions) -> Option<String> {
    let read = chain.apply(read);
    if read.len() < opts.min_length {
        return None;
    }
    match opts.umi {
        Some(umi) => {
            let core = umi.strip(&read.seq);
            // checked again: the UMI regions may take the read under the minimum
            (core.len() >= opts.min_length).then(|| core.to_string())
        }
        None => Some(read.seq),
    }
}

/// Tallies one batch of raw reads. Runs on a worker thread.
pub fn collapse_batch(batch: Vec<Sequence>, chain: &ModifierChain, opts: &CollapseOptions) -> FrequencyTable {
    batch
        .into_iter()
        .filter_map(|read| collapse_key(read, chain, opts))
        .map(|key| (key, 1))
        .collect()
}

/// Per-sample summary written to `read_counts.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SampleReadCounts {
    pub sample: String,
    pub raw_reads: u64,
    pub trimmed_reads: u64,
    pub unique_sequences: u64,
}

#[derive(Debug, Clone)]
pub struct CollapsedSample {
    pub name: String,
    pub path: PathBuf,
    pub table: FrequencyTable,
    pub raw_reads: u64,
}

impl CollapsedSample {
    pub fn retained_reads(&self) -> u64 {
        self.table.total()
    }

    pub fn unique_sequences(&self) -> usize {
        self.table.len()
    }

    pub fn read_counts(&self) -> SampleReadCounts {
        SampleReadCounts {
            sample: self.name.clone(),
            raw_reads: self.raw_reads,
            trimmed_reads: self.retained_reads(),
            unique_sequences: self.unique_sequences() as u64,
        }
    }
}

fn read_error(path: &Path, err: io::Error) -> PipelineError {
    match err.kind() {
        io::ErrorKind::InvalidData | io::ErrorKind::InvalidInput | io::ErrorKind::UnexpectedEof => {
            PipelineError::MalformedInput {
                path: path.to_path_buf(),
                message: err.to_string(),
            }
        }
        io::ErrorKind::NotFound => PipelineError::MissingInput(path.to_path_buf()),
        _ => PipelineError::Io(err),
    }
}

/// Collapses every read from `reader`, a window of batches at a time.
/// Returns the merged table and the number of raw reads seen.
/// `opts` is validated on entry, whether or not the caller already did.
pub fn collapse_reader<R: BufRead>(
    reader: &mut BatchSequenceReader<R>,
    source: &Path,
    chain: &ModifierChain,
    opts: &CollapseOptions,
    pool: &ThreadPool,
) -> Result<(FrequencyTable, u64)> {
    opts.validate()?;
    let batches_per_window = opts.batches_per_window();
    let show_progress = atty::is(atty::Stream::Stderr);
    let mut table = FrequencyTable::new();
    let mut raw_reads = 0u64;

    loop {
        let mut window = Vec::with_capacity(batches_per_window);
        while window.len() < batches_per_window {
            let batch = reader
                .load_batch(opts.batch_size)
                .map_err(|e| read_error(source, e))?;
            if batch.is_empty() {
                break;
            }
            window.push(batch);
        }
        if window.is_empty() {
            break;
        }
        raw_reads += window.iter().map(|b| b.len() as u64).sum::<u64>();

        let tables: Vec<FrequencyTable> = pool.install(|| {
            window
                .into_par_iter()
                .map(|batch| collapse_batch(batch, chain, opts))
                .collect()
        });
        for batch_table in tables {
            table += batch_table;
        }

        if show_progress {
            eprint!("\rProcessed {} reads ...", raw_reads);
        }
    }
    if show_progress && raw_reads > 0 {
        eprint!("\r");
    }

    Ok((table, raw_reads))
}

pub fn collapse_file(
    path: &Path,
    name: &str,
    chain: &ModifierChain,
    opts: &CollapseOptions,
    pool: &ThreadPool,
) -> Result<CollapsedSample> {
    if !path.is_file() {
        return Err(PipelineError::MissingInput(path.to_path_buf()));
    }
    let mut reader = open_sequence_file(path).map_err(|e| read_error(path, e))?;
    let (table, raw_reads) = collapse_reader(&mut reader, path, chain, opts, pool)?;
    log::debug!(
        "{}: {} raw reads, {} retained, {} unique",
        name,
        raw_reads,
        table.total(),
        table.len()
    );
    Ok(CollapsedSample {
        name: name.to_string(),
        path: path.to_path_buf(),
        table,
        raw_reads,
    })
}

/// Writes `>seqN_COUNT` records, most abundant first.
pub fn write_collapsed_fasta(table: &FrequencyTable, path: &Path) -> Result<()> {
    let mut out = BufWriter::new(File::create(path)?);
    for (i, (seq, count)) in table.sorted_by_abundance().into_iter().enumerate() {
        writeln!(out, ">seq{}_{}", i + 1, count)?;
        writeln!(out, "{}", seq)?;
    }
    out.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::AdapterKind;
    use crate::modifiers::TrimConfig;

    fn pool(threads: usize) -> ThreadPool {
        rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build()
            .unwrap()
    }

    fn fastq(reads: &[&str]) -> String {
        reads
            .iter()
            .enumerate()
            .map(|(i, s)| format!("@r{}\n{}\n+\n{}\n", i, s, "I".repeat(s.len())))
            .collect()
    }

    #[test]
    fn test_frequency_table_merge() {
        let mut a: FrequencyTable = vec![("AAA".to_string(), 2), ("CCC".to_string(), 1)]
            .into_iter()
            .collect();
        let b: FrequencyTable = vec![("CCC".to_string(), 4), ("GGG".to_string(), 1)]
            .into_iter()
            .collect();
        a += b;
        assert_eq!(a.get("AAA"), 2);
        assert_eq!(a.get("CCC"), 5);
        assert_eq!(a.get("GGG"), 1);
        assert_eq!(a.get("TTT"), 0);
        assert_eq!(a.total(), 8);
        assert_eq!(a.len(), 3);
    }

    #[test]
    fn test_sorted_by_abundance_breaks_ties_by_key() {
        let table: FrequencyTable = vec![
            ("GGG".to_string(), 2),
            ("AAA".to_string(), 2),
            ("CCC".to_string(), 9),
        ]
        .into_iter()
        .collect();
        assert_eq!(
            table.sorted_by_abundance(),
            vec![("CCC", 9), ("AAA", 2), ("GGG", 2)]
        );
    }

    #[test]
    fn test_umi_spec() {
        let umi = UmiSpec::parse("4,4").unwrap();
        assert_eq!(umi.strip("AAAACCCCCCGGGG"), "CCCCCC");
        assert_eq!(UmiSpec::parse("3,0").unwrap().strip("AAACCC"), "CCC");
        assert_eq!(umi.strip("AAAAGG"), "");
        assert!(UmiSpec::parse("4").is_err());
        assert!(UmiSpec::parse("a,1").is_err());
        assert!(UmiSpec::parse("-1,2").is_err());
    }

    #[test]
    fn test_umi_double_length_check() {
        let chain = ModifierChain::default();
        let opts = CollapseOptions {
            min_length: 6,
            umi: Some(UmiSpec { front: 2, back: 2 }),
            ..CollapseOptions::default()
        };
        // 8 bases pass the first check, but only 4 remain after stripping
        let short_core = Sequence::new_fastq("r", "AACCGGTT", "IIIIIIII");
        assert_eq!(collapse_key(short_core, &chain, &opts), None);
        let long = Sequence::new_fastq("r", "AACCGGTTAA", "IIIIIIIIII");
        assert_eq!(collapse_key(long, &chain, &opts), Some("CCGGTT".to_string()));
        let too_short = Sequence::new_fastq("r", "AACCG", "IIIII");
        assert_eq!(collapse_key(too_short, &chain, &opts), None);
    }

    #[test]
    fn test_collapse_reader_counts_and_filters() {
        let chain = ModifierChain::build(&TrimConfig {
            adapters: vec![(AdapterKind::Back, "TGGAATTCTCGG".into())],
            ..TrimConfig::default()
        })
        .unwrap();
        let data = fastq(&[
            "TAGCTTATCAGACTGATGTTGATGGAATTCTCGG",
            "TAGCTTATCAGACTGATGTTGATGGAATTCTCGGGTGC",
            "CCCCTGGAATTCTCGG",
            "TAGCTTATCAGACTGATGTTGA",
            "GGGGGGGGGGGGGGGGGGGG",
        ]);
        let opts = CollapseOptions {
            batch_size: 2,
            buffer_size: 4,
            ..CollapseOptions::default()
        };
        let mut reader = BatchSequenceReader::new(data.as_bytes());
        let (table, raw) =
            collapse_reader(&mut reader, Path::new("mem"), &chain, &opts, &pool(2)).unwrap();
        assert_eq!(raw, 5);
        assert_eq!(table.get("TAGCTTATCAGACTGATGTTGA"), 3);
        assert_eq!(table.get("GGGGGGGGGGGGGGGGGGGG"), 1);
        assert_eq!(table.len(), 2);
        assert!(table.iter().all(|(k, _)| k.len() >= 16));
    }

    #[test]
    fn test_malformed_read_aborts_file() {
        let chain = ModifierChain::default();
        let data = "@r1\nACGTACGTACGTACGTAC\n+\nIIIIIIIIIIIIIIIIII\n@r2\nACGT\nIIII\n";
        let mut reader = BatchSequenceReader::new(data.as_bytes());
        let err = collapse_reader(
            &mut reader,
            Path::new("bad.fq"),
            &chain,
            &CollapseOptions::default(),
            &pool(1),
        )
        .unwrap_err();
        assert!(matches!(err, PipelineError::MalformedInput { .. }));
    }

    #[test]
    fn test_non_ascii_read_is_malformed_not_a_panic() {
        let chain = ModifierChain::build(&TrimConfig {
            cut: vec![4],
            ..TrimConfig::default()
        })
        .unwrap();
        let data = "@r1\nACG\u{e9}\n+\nIIIII\n";
        let mut reader = BatchSequenceReader::new(data.as_bytes());
        let err = collapse_reader(
            &mut reader,
            Path::new("utf8.fq"),
            &chain,
            &CollapseOptions::default(),
            &pool(2),
        )
        .unwrap_err();
        assert!(matches!(err, PipelineError::MalformedInput { .. }));
    }

    #[test]
    fn test_collapse_file_and_dump() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("s1.fastq");
        std::fs::write(
            &input,
            fastq(&[
                "ACGTACGTACGTACGTAA",
                "CCCCCCCCCCCCCCCCCC",
                "ACGTACGTACGTACGTAA",
            ]),
        )
        .unwrap();

        let chain = ModifierChain::default();
        let sample = collapse_file(&input, "s1", &chain, &CollapseOptions::default(), &pool(2)).unwrap();
        assert_eq!(
            sample.read_counts(),
            SampleReadCounts {
                sample: "s1".into(),
                raw_reads: 3,
                trimmed_reads: 3,
                unique_sequences: 2,
            }
        );

        let dump = dir.path().join("s1.trim.collapse.fa");
        write_collapsed_fasta(&sample.table, &dump).unwrap();
        assert_eq!(
            std::fs::read_to_string(&dump).unwrap(),
            ">seq1_2\nACGTACGTACGTACGTAA\n>seq2_1\nCCCCCCCCCCCCCCCCCC\n"
        );
    }

    #[test]
    fn test_missing_file() {
        let err = collapse_file(
            Path::new("/nonexistent/reads.fq"),
            "x",
            &ModifierChain::default(),
            &CollapseOptions::default(),
            &pool(1),
        )
        .unwrap_err();
        assert!(matches!(err, PipelineError::MissingInput(_)));
    }

    #[test]
    fn test_zero_min_length_is_rejected() {
        let opts = CollapseOptions {
            min_length: 0,
            ..CollapseOptions::default()
        };
        assert!(opts.validate().is_err());
    }
}
