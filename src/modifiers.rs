//! Read modifiers and the chain that applies them in order.

use crate::adapters::{warn_duplicate_adapters, Adapter, AdapterKind, AdapterMatch, MatchParams};
use crate::errors::{PipelineError, Result};
use crate::seqreader::Sequence;

/// One read-transformation step. Steps never fail; a read may come out empty.
pub trait Modifier: Send + Sync {
    fn name(&self) -> &'static str;
    fn modify(&self, read: Sequence, matches: &mut Vec<AdapterMatch>) -> Sequence;
}

/// Parses `INT[,INT]` into `[front, back]` quality cutoffs.
pub fn parse_cutoffs(s: &str) -> Result<[i32; 2]> {
    let cutoffs = s
        .split(',')
        .map(|v| v.trim().parse::<i32>())
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| PipelineError::config(format!("quality cutoff value not recognized: {}", e)))?;
    match cutoffs.as_slice() {
        [back] => Ok([0, *back]),
        [front, back] => Ok([*front, *back]),
        _ => Err(PipelineError::config(
            "expected one value or two values separated by comma for the quality cutoff",
        )),
    }
}

/// Returns the `(start, stop)` range left after BWA-style quality trimming.
pub fn quality_trim_index(quals: &[u8], cutoff_front: i32, cutoff_back: i32, base: i32) -> (usize, usize) {
    let mut start = 0;
    let mut stop = quals.len();

    let mut s = 0;
    let mut max_qual = 0;
    for (i, &q) in quals.iter().enumerate() {
        s += cutoff_front - (q as i32 - base);
        if s < 0 {
            break;
        }
        if s > max_qual {
            max_qual = s;
            start = i + 1;
        }
    }

    let mut s = 0;
    let mut max_qual = 0;
    for (i, &q) in quals.iter().enumerate().rev() {
        s += cutoff_back - (q as i32 - base);
        if s < 0 {
            break;
        }
        if s > max_qual {
            max_qual = s;
            stop = i;
        }
    }

    if start >= stop {
        (0, 0)
    } else {
        (start, stop)
    }
}

/// Like the 3' part of [`quality_trim_index`], but a `G` (no signal on
/// two-color chemistry) always counts as `cutoff - 1`.
pub fn nextseq_trim_index(seq: &[u8], quals: &[u8], cutoff: i32, base: i32) -> usize {
    let mut s = 0;
    let mut max_qual = 0;
    let mut max_i = quals.len();
    for i in (0..quals.len()).rev() {
        let q = if seq[i] == b'G' {
            cutoff - 1
        } else {
            quals[i] as i32 - base
        };
        s += cutoff - q;
        if s < 0 {
            break;
        }
        if s > max_qual {
            max_qual = s;
            max_i = i;
        }
    }
    max_i
}

pub struct QualityTrimmer {
    pub cutoff_front: i32,
    pub cutoff_back: i32,
    pub base: i32,
}

impl Modifier for QualityTrimmer {
    fn name(&self) -> &'static str {
        "quality trimmer"
    }

    fn modify(&self, mut read: Sequence, _matches: &mut Vec<AdapterMatch>) -> Sequence {
        if !read.has_qualities() {
            return read;
        }
        let (start, stop) = quality_trim_index(
            read.quals.as_bytes(),
            self.cutoff_front,
            self.cutoff_back,
            self.base,
        );
        read.keep_range(start, stop);
        read
    }
}

pub struct NextseqQualityTrimmer {
    pub cutoff: i32,
    pub base: i32,
}

impl Modifier for NextseqQualityTrimmer {
    fn name(&self) -> &'static str {
        "nextseq trimmer"
    }

    fn modify(&self, mut read: Sequence, _matches: &mut Vec<AdapterMatch>) -> Sequence {
        if !read.has_qualities() {
            return read;
        }
        let stop = nextseq_trim_index(
            read.seq.as_bytes(),
            read.quals.as_bytes(),
            self.cutoff,
            self.base,
        );
        read.keep_range(0, stop);
        read
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AdapterAction {
    #[default]
    Trim,
    Mask,
    None,
}

impl AdapterAction {
    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "trim" => Ok(AdapterAction::Trim),
            "mask" => Ok(AdapterAction::Mask),
            "none" => Ok(AdapterAction::None),
            other => Err(PipelineError::config(format!(
                "unknown adapter action '{}' (expected trim, mask or none)",
                other
            ))),
        }
    }
}

pub struct AdapterCutter {
    pub adapters: Vec<Adapter>,
    pub times: usize,
    pub action: AdapterAction,
}

impl AdapterCutter {
    fn best_match(&self, seq: &[u8]) -> Option<AdapterMatch> {
        let mut best: Option<AdapterMatch> = None;
        for adapter in &self.adapters {
            if let Some(m) = adapter.match_to(seq) {
                if best.as_ref().map_or(true, |b| m.is_better_than(b)) {
                    best = Some(m);
                }
            }
        }
        best
    }
}

impl Modifier for AdapterCutter {
    fn name(&self) -> &'static str {
        "adapter cutter"
    }

    fn modify(&self, mut read: Sequence, matches: &mut Vec<AdapterMatch>) -> Sequence {
        for _ in 0..self.times {
            let Some(m) = self.best_match(read.seq.as_bytes()) else {
                break;
            };
            let (start, stop) = m.remainder_range(read.len());
            matches.push(m);
            match self.action {
                AdapterAction::Trim => read.keep_range(start, stop),
                AdapterAction::Mask => {
                    let masked: String = read
                        .seq
                        .char_indices()
                        .map(|(i, c)| if i < start || i >= stop { 'N' } else { c })
                        .collect();
                    read.seq = masked;
                    // masking keeps the length, so a second round would hit the same site
                    break;
                }
                AdapterAction::None => break,
            }
        }
        read
    }
}

pub struct NEndTrimmer;

impl Modifier for NEndTrimmer {
    fn name(&self) -> &'static str {
        "N-end trimmer"
    }

    fn modify(&self, mut read: Sequence, _matches: &mut Vec<AdapterMatch>) -> Sequence {
        let bytes = read.seq.as_bytes();
        let start = bytes.iter().position(|&b| b != b'N').unwrap_or(bytes.len());
        let stop = bytes
            .iter()
            .rposition(|&b| b != b'N')
            .map_or(start, |i| i + 1);
        read.keep_range(start, stop);
        read
    }
}

/// Removes a fixed number of bases: from the 5' end if `length > 0`,
/// from the 3' end if negative.
pub struct UnconditionalCutter {
    pub length: i32,
}

impl Modifier for UnconditionalCutter {
    fn name(&self) -> &'static str {
        "unconditional cutter"
    }

    fn modify(&self, mut read: Sequence, _matches: &mut Vec<AdapterMatch>) -> Sequence {
        let len = read.len();
        let n = self.length.unsigned_abs() as usize;
        if self.length > 0 {
            read.keep_range(n, len);
        } else {
            read.keep_range(0, len.saturating_sub(n));
        }
        read
    }
}

/// Everything needed to build a [`ModifierChain`].
#[derive(Debug, Clone)]
pub struct TrimConfig {
    pub adapters: Vec<(AdapterKind, String)>,
    pub error_rate: f64,
    pub overlap: usize,
    pub match_read_wildcards: bool,
    pub match_adapter_wildcards: bool,
    pub indels: bool,
    pub times: usize,
    pub action: AdapterAction,
    pub nextseq_trim: Option<i32>,
    pub quality_cutoff: Option<String>,
    pub phred64: bool,
    pub trim_n: bool,
    pub cut: Vec<i32>,
}

impl Default for TrimConfig {
    fn default() -> Self {
        Self {
            adapters: Vec::new(),
            error_rate: 0.1,
            overlap: 3,
            match_read_wildcards: false,
            match_adapter_wildcards: true,
            indels: true,
            times: 1,
            action: AdapterAction::Trim,
            nextseq_trim: None,
            quality_cutoff: None,
            phred64: false,
            trim_n: false,
            cut: Vec::new(),
        }
    }
}

impl TrimConfig {
    fn quality_base(&self) -> i32 {
        if self.phred64 {
            64
        } else {
            33
        }
    }

    fn match_params(&self) -> MatchParams {
        MatchParams {
            max_error_rate: self.error_rate,
            min_overlap: self.overlap,
            read_wildcards: self.match_read_wildcards,
            adapter_wildcards: self.match_adapter_wildcards,
            indels: self.indels,
        }
    }
}

fn check_cuts(cut: &[i32]) -> Result<()> {
    if cut.len() > 2 {
        return Err(PipelineError::config(
            "you cannot remove bases from more than two ends",
        ));
    }
    if cut.len() == 2 && (cut[0] as i64) * (cut[1] as i64) > 0 {
        return Err(PipelineError::config(
            "you cannot remove bases from the same end twice",
        ));
    }
    Ok(())
}

#[derive(Default)]
pub struct ModifierChain {
    steps: Vec<Box<dyn Modifier>>,
}

impl ModifierChain {
    /// Builds the chain once per run. Any configuration problem is reported
    /// here, before a single read is processed.
    pub fn build(config: &TrimConfig) -> Result<Self> {
        if !(0.0..1.0).contains(&config.error_rate) {
            return Err(PipelineError::config(format!(
                "adapter error rate must be in [0, 1), got {}",
                config.error_rate
            )));
        }
        if config.overlap == 0 {
            return Err(PipelineError::config("minimum overlap must be at least 1"));
        }
        if config.times == 0 {
            return Err(PipelineError::config("adapter removal rounds must be at least 1"));
        }
        check_cuts(&config.cut)?;

        let base = config.quality_base();
        let mut steps: Vec<Box<dyn Modifier>> = Vec::new();

        if let Some(cutoff) = config.nextseq_trim {
            steps.push(Box::new(NextseqQualityTrimmer { cutoff, base }));
        }
        if let Some(spec) = &config.quality_cutoff {
            let [cutoff_front, cutoff_back] = parse_cutoffs(spec)?;
            steps.push(Box::new(QualityTrimmer {
                cutoff_front,
                cutoff_back,
                base,
            }));
        }

        let params = config.match_params();
        let adapters = config
            .adapters
            .iter()
            .enumerate()
            .map(|(i, (kind, spec))| Adapter::parse(*kind, spec, i, params))
            .collect::<Result<Vec<_>>>()?;
        if !adapters.is_empty() {
            warn_duplicate_adapters(&adapters);
            steps.push(Box::new(AdapterCutter {
                adapters,
                times: config.times,
                action: config.action,
            }));
        }

        if config.trim_n {
            steps.push(Box::new(NEndTrimmer));
        }
        for &length in config.cut.iter().filter(|&&c| c != 0) {
            steps.push(Box::new(UnconditionalCutter { length }));
        }

        Ok(Self { steps })
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn step_names(&self) -> Vec<&'static str> {
        self.steps.iter().map(|s| s.name()).collect()
    }

    pub fn apply(&self, read: Sequence) -> Sequence {
        let mut matches = Vec::new();
        self.apply_with_matches(read, &mut matches)
    }

    pub fn apply_with_matches(&self, mut read: Sequence, matches: &mut Vec<AdapterMatch>) -> Sequence {
        for step in &self.steps {
            read = step.modify(read, matches);
        }
        read
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn read(seq: &str) -> Sequence {
        Sequence::new_fastq("r", seq, &"I".repeat(seq.len()))
    }

    #[test]
    fn test_parse_cutoffs() {
        assert_eq!(parse_cutoffs("5").unwrap(), [0, 5]);
        assert_eq!(parse_cutoffs("6,7").unwrap(), [6, 7]);
        assert!(parse_cutoffs("1,2,3").is_err());
        assert!(parse_cutoffs("x").is_err());
    }

    #[test]
    fn test_quality_trim_index() {
        // '#' = Q2, 'I' = Q40
        assert_eq!(quality_trim_index(b"IIIIIIII##", 0, 10, 33), (0, 8));
        assert_eq!(quality_trim_index(b"##IIIIIIII", 10, 0, 33), (2, 10));
        assert_eq!(quality_trim_index(b"##########", 10, 10, 33), (0, 0));
        assert_eq!(quality_trim_index(b"IIIIIIIIII", 10, 10, 33), (0, 10));
    }

    #[test]
    fn test_nextseq_treats_g_as_low_quality() {
        let seq = b"ACGTACGGGGGG";
        let quals = b"IIIIIIIIIIII";
        assert_eq!(nextseq_trim_index(seq, quals, 20, 33), 6);
    }

    #[test]
    fn test_cut_validation() {
        let too_many = TrimConfig {
            cut: vec![1, -1, 2],
            ..TrimConfig::default()
        };
        assert!(matches!(
            ModifierChain::build(&too_many),
            Err(PipelineError::Config(_))
        ));

        let same_end = TrimConfig {
            cut: vec![2, 3],
            ..TrimConfig::default()
        };
        assert!(ModifierChain::build(&same_end).is_err());

        let both_ends = TrimConfig {
            cut: vec![2, -3],
            ..TrimConfig::default()
        };
        let chain = ModifierChain::build(&both_ends).unwrap();
        assert_eq!(chain.apply(read("AACCCCCCGGG")).seq, "CCCCCC");
    }

    #[test]
    fn test_chain_order() {
        let config = TrimConfig {
            adapters: vec![(AdapterKind::Back, "illumina".into())],
            nextseq_trim: Some(20),
            quality_cutoff: Some("20".into()),
            trim_n: true,
            cut: vec![0, 4],
            ..TrimConfig::default()
        };
        let chain = ModifierChain::build(&config).unwrap();
        assert_eq!(
            chain.step_names(),
            vec![
                "nextseq trimmer",
                "quality trimmer",
                "adapter cutter",
                "N-end trimmer",
                "unconditional cutter"
            ]
        );
    }

    #[test]
    fn test_adapter_then_n_trim() {
        let config = TrimConfig {
            adapters: vec![(AdapterKind::Back, "TGGAATTCTCGG".into())],
            trim_n: true,
            ..TrimConfig::default()
        };
        let chain = ModifierChain::build(&config).unwrap();
        let mut matches = Vec::new();
        let out = chain.apply_with_matches(read("NNTAGCTTATCAGACTGNTGGAATTCTCGGGTGC"), &mut matches);
        assert_eq!(out.seq, "TAGCTTATCAGACTG");
        assert_eq!(out.quals.len(), out.seq.len());
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].adapter, "1");
    }

    #[test]
    fn test_mask_action_keeps_length() {
        let config = TrimConfig {
            adapters: vec![(AdapterKind::Back, "TGGAATTCTCGG".into())],
            action: AdapterAction::Mask,
            ..TrimConfig::default()
        };
        let chain = ModifierChain::build(&config).unwrap();
        let out = chain.apply(read("ACGTACGTTGGAATTCTCGG"));
        assert_eq!(out.seq, "ACGTACGTNNNNNNNNNNNN");
    }

    #[test]
    fn test_times_removes_both_adapters() {
        let adapters = vec![
            (AdapterKind::Back, "TGGAATTCTCGG".to_string()),
            (AdapterKind::Front, "GTTCAGAGTTC".to_string()),
        ];
        let input = "GTTCAGAGTTCACGTACGTACGTTGGAATTCTCGG";

        let once = ModifierChain::build(&TrimConfig {
            adapters: adapters.clone(),
            ..TrimConfig::default()
        })
        .unwrap();
        assert_eq!(once.apply(read(input)).seq, "GTTCAGAGTTCACGTACGTACGT");

        let twice = ModifierChain::build(&TrimConfig {
            adapters,
            times: 2,
            ..TrimConfig::default()
        })
        .unwrap();
        let mut matches = Vec::new();
        let out = twice.apply_with_matches(read(input), &mut matches);
        assert_eq!(out.seq, "ACGTACGTACGT");
        assert_eq!(matches.len(), 2);
        assert!(matches[1].removes_front);
    }

    #[test]
    fn test_invalid_thresholds() {
        for config in [
            TrimConfig {
                error_rate: 1.5,
                ..TrimConfig::default()
            },
            TrimConfig {
                overlap: 0,
                ..TrimConfig::default()
            },
            TrimConfig {
                quality_cutoff: Some("a,b".into()),
                ..TrimConfig::default()
            },
            TrimConfig {
                adapters: vec![(AdapterKind::Back, "ACGTXX".into())],
                ..TrimConfig::default()
            },
        ] {
            assert!(ModifierChain::build(&config).is_err());
        }
    }

    #[test]
    fn test_fasta_reads_skip_quality_steps() {
        let config = TrimConfig {
            quality_cutoff: Some("30".into()),
            ..TrimConfig::default()
        };
        let chain = ModifierChain::build(&config).unwrap();
        let mut fasta = read("ACGTACGT");
        fasta.quals.clear();
        assert_eq!(chain.apply(fasta).seq, "ACGTACGT");
    }
}
