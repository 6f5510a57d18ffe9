use std::path::PathBuf;

use clap::{Args, Parser};

use crate::adapters::AdapterKind;
use crate::collapse::{CollapseOptions, UmiSpec, DEFAULT_MIN_LENGTH, READS_PER_BATCH, READS_PER_WINDOW};
use crate::errors;
use crate::inputs::resolve_samples;
use crate::libraries::{MirDatabase, ReferenceLibraries};
use crate::modifiers::{AdapterAction, TrimConfig};
use crate::pipeline::{default_run_dir_name, CollapseConfig, PipelineConfig};

/// Options shared by every binary: inputs, outputs, trimming and collapsing.
#[derive(Debug, Args)]
pub struct CommonArgs {
    #[arg(
        short = 's',
        long = "samples",
        value_name = "FILES|DIR|LIST",
        help = "Comma-separated read files, a directory of read files, or a .txt/.csv file listing them"
    )]
    pub samples: String,

    #[arg(short = 'o', long = "outdir", value_name = "DIR", default_value = ".")]
    pub outdir: PathBuf,

    #[arg(
        long = "outdir-name",
        value_name = "NAME",
        help = "Run directory name inside --outdir [default: smallrna.<timestamp>]"
    )]
    pub outdir_name: Option<String>,

    #[arg(
        short = 't',
        long = "threads",
        value_name = "THREADS",
        default_value_t = 0,
        help = "Worker threads (0 = all hardware threads)"
    )]
    pub threads: usize,

    #[arg(short = 'a', long = "adapter", value_name = "ADAPTER", help = "3' adapter (SEQ, SEQ$, name=SEQ or illumina)")]
    pub back: Vec<String>,

    #[arg(short = 'g', long = "front", value_name = "ADAPTER", help = "5' adapter (SEQ, ^SEQ, name=SEQ or illumina)")]
    pub front: Vec<String>,

    #[arg(short = 'b', long = "anywhere", value_name = "ADAPTER", help = "Adapter that may occur at either end")]
    pub anywhere: Vec<String>,

    #[arg(short = 'e', long = "error-rate", default_value_t = 0.1)]
    pub error_rate: f64,

    #[arg(short = 'O', long = "overlap", default_value_t = 3, help = "Minimum overlap for partial adapter matches")]
    pub overlap: usize,

    #[arg(long = "match-read-wildcards")]
    pub match_read_wildcards: bool,

    #[arg(short = 'N', long = "no-match-adapter-wildcards")]
    pub no_match_adapter_wildcards: bool,

    #[arg(long = "no-indels")]
    pub no_indels: bool,

    #[arg(short = 'n', long = "times", default_value_t = 1, help = "Adapter removal rounds per read")]
    pub times: usize,

    #[arg(long = "action", default_value = "trim", value_parser = ["trim", "mask", "none"])]
    pub action: String,

    #[arg(long = "nextseq-trim", value_name = "CUTOFF")]
    pub nextseq_trim: Option<i32>,

    #[arg(short = 'q', long = "quality-cutoff", value_name = "[5'CUTOFF,]3'CUTOFF")]
    pub quality_cutoff: Option<String>,

    #[arg(long = "phred64")]
    pub phred64: bool,

    #[arg(long = "trim-n")]
    pub trim_n: bool,

    #[arg(
        short = 'u',
        long = "cut",
        value_name = "LENGTH",
        allow_hyphen_values = true,
        help = "Remove LENGTH bases from the 5' end (positive) or 3' end (negative)"
    )]
    pub cut: Vec<i32>,

    #[arg(short = 'm', long = "minimum-length", default_value_t = DEFAULT_MIN_LENGTH)]
    pub min_length: usize,

    #[arg(long = "umi", value_name = "FRONT,BACK", help = "Strip UMI bases from both ends before collapsing")]
    pub umi: Option<String>,

    #[arg(long = "batch-size", default_value_t = READS_PER_BATCH, hide = true)]
    pub batch_size: usize,

    #[arg(long = "buffer-size", default_value_t = READS_PER_WINDOW, hide = true)]
    pub buffer_size: usize,

    #[arg(long = "tcf", help = "Write <sample>.trim.collapse.fa for every sample")]
    pub write_collapsed: bool,

    #[arg(long = "quiet")]
    pub quiet: bool,
}

impl CommonArgs {
    pub fn out_dir(&self) -> PathBuf {
        let name = self.outdir_name.clone().unwrap_or_else(default_run_dir_name);
        self.outdir.join(name)
    }

    pub fn trim_config(&self) -> errors::Result<TrimConfig> {
        let adapters = [
            (AdapterKind::Back, &self.back),
            (AdapterKind::Front, &self.front),
            (AdapterKind::Anywhere, &self.anywhere),
        ]
        .into_iter()
        .flat_map(|(kind, specs)| specs.iter().map(move |s| (kind, s.clone())))
        .collect();

        Ok(TrimConfig {
            adapters,
            error_rate: self.error_rate,
            overlap: self.overlap,
            match_read_wildcards: self.match_read_wildcards,
            match_adapter_wildcards: !self.no_match_adapter_wildcards,
            indels: !self.no_indels,
            times: self.times,
            action: AdapterAction::parse(&self.action)?,
            nextseq_trim: self.nextseq_trim,
            quality_cutoff: self.quality_cutoff.clone(),
            phred64: self.phred64,
            trim_n: self.trim_n,
            cut: self.cut.clone(),
        })
    }

    pub fn collapse_options(&self) -> errors::Result<CollapseOptions> {
        let umi = self.umi.as_deref().map(UmiSpec::parse).transpose()?;
        let options = CollapseOptions {
            batch_size: self.batch_size,
            buffer_size: self.buffer_size,
            min_length: self.min_length,
            umi,
        };
        options.validate()?;
        Ok(options)
    }

    /// `out_dir` is passed in so the timestamped default is computed once.
    pub fn collapse_config(&self, out_dir: PathBuf) -> errors::Result<CollapseConfig> {
        Ok(CollapseConfig {
            trim: self.trim_config()?,
            options: self.collapse_options()?,
            samples: resolve_samples(&self.samples)?,
            threads: self.threads,
            out_dir,
            write_collapsed: self.write_collapsed,
        })
    }
}

/// Collapse, assemble and classify small-RNA reads.
#[derive(Debug, Parser)]
#[command(name = "smallrna", version, about)]
pub struct PipelineArgs {
    #[command(flatten)]
    pub common: CommonArgs,

    #[arg(long = "libraries", value_name = "DIR", help = "Root of the reference libraries")]
    pub libraries: PathBuf,

    #[arg(long = "organism", value_name = "NAME")]
    pub organism: String,

    #[arg(long = "mir-db", value_name = "DB", default_value = "miRBase", help = "miRBase or MirGeneDB")]
    pub mir_db: String,

    #[arg(long = "spike-in", help = "Also align against the spike-in library")]
    pub spike_in: bool,

    #[arg(long = "bowtie-path", value_name = "DIR", help = "Directory holding the bowtie binary")]
    pub bowtie_path: Option<PathBuf>,
}

impl PipelineArgs {
    pub fn pipeline_config(&self, out_dir: PathBuf) -> errors::Result<PipelineConfig> {
        let db = MirDatabase::parse(&self.mir_db)?;
        Ok(PipelineConfig {
            collapse: self.common.collapse_config(out_dir)?,
            libraries: ReferenceLibraries::new(&self.libraries, &self.organism, db),
            spike_in: self.spike_in,
        })
    }
}

/// Trim and collapse reads into a count matrix, without classification.
#[derive(Debug, Parser)]
#[command(name = "collapse", version, about)]
pub struct CollapseArgs {
    #[command(flatten)]
    pub common: CommonArgs,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_commands_are_well_formed() {
        PipelineArgs::command().debug_assert();
        CollapseArgs::command().debug_assert();
    }

    #[test]
    fn test_trim_config_from_args() {
        let args = CollapseArgs::parse_from([
            "collapse", "-s", "x.fq", "-a", "illumina", "-g", "^ACGT", "-u", "-3", "-u", "2",
            "-q", "10,20", "--action", "mask",
        ]);
        let trim = args.common.trim_config().unwrap();
        assert_eq!(trim.adapters.len(), 2);
        assert_eq!(trim.adapters[0], (AdapterKind::Back, "illumina".to_string()));
        assert_eq!(trim.adapters[1].0, AdapterKind::Front);
        assert_eq!(trim.cut, vec![-3, 2]);
        assert_eq!(trim.action, AdapterAction::Mask);
        assert!(trim.match_adapter_wildcards);
    }

    #[test]
    fn test_umi_and_min_length() {
        let args = CollapseArgs::parse_from(["collapse", "-s", "x.fq", "--umi", "4,4", "-m", "18"]);
        let opts = args.common.collapse_options().unwrap();
        assert_eq!(opts.umi, Some(UmiSpec { front: 4, back: 4 }));
        assert_eq!(opts.min_length, 18);

        let bad = CollapseArgs::parse_from(["collapse", "-s", "x.fq", "-m", "0"]);
        assert!(bad.common.collapse_options().is_err());
    }

    #[test]
    fn test_out_dir() {
        let args = CollapseArgs::parse_from(["collapse", "-s", "x.fq", "-o", "/tmp/out", "--outdir-name", "run1"]);
        assert_eq!(args.common.out_dir(), PathBuf::from("/tmp/out/run1"));
        let args = CollapseArgs::parse_from(["collapse", "-s", "x.fq"]);
        assert!(args
            .common
            .out_dir()
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with("smallrna."));
    }
}
