use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::time::Instant;

use rayon::ThreadPool;

use crate::aligner::Aligner;
use crate::classify::{Classifier, StageReport};
use crate::collapse::{collapse_file, write_collapsed_fasta, CollapseOptions, SampleReadCounts};
use crate::inputs::SampleInput;
use crate::libraries::ReferenceLibraries;
use crate::matrix::{AbundanceMatrix, MatrixAssembler};
use crate::modifiers::{ModifierChain, TrimConfig};
use crate::runlog::RunLog;
use crate::stages::default_stages;

/// Everything the collapse step needs.
#[derive(Debug, Clone)]
pub struct CollapseConfig {
    pub samples: Vec<SampleInput>,
    pub trim: TrimConfig,
    pub options: CollapseOptions,
    /// Worker threads; 0 uses every hardware thread.
    pub threads: usize,
    pub out_dir: PathBuf,
    /// Also write `<sample>.trim.collapse.fa`.
    pub write_collapsed: bool,
}

impl CollapseConfig {
    pub fn thread_count(&self) -> usize {
        if self.threads == 0 {
            num_cpus::get()
        } else {
            self.threads
        }
    }
}

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub collapse: CollapseConfig,
    pub libraries: ReferenceLibraries,
    pub spike_in: bool,
}

pub struct CollapseOutput {
    pub matrix: AbundanceMatrix,
    pub read_counts: Vec<SampleReadCounts>,
}

pub struct PipelineOutput {
    pub matrix: AbundanceMatrix,
    pub read_counts: Vec<SampleReadCounts>,
    pub stages: Vec<StageReport>,
}

/// Directory name used when the user does not pick one.
pub fn default_run_dir_name() -> String {
    format!(
        "smallrna.{}",
        chrono::Local::now().format("%Y-%m-%d_%H-%M-%S")
    )
}

fn build_pool(threads: usize) -> Result<ThreadPool> {
    rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build()
        .context("Failed to build worker thread pool")
}

fn collapse_all(
    config: &CollapseConfig,
    chain: &ModifierChain,
    runlog: &mut RunLog,
) -> Result<CollapseOutput> {
    let threads = config.thread_count();
    let pool = build_pool(threads)?;
    runlog.line(&format!(
        "Collapsing {} sample(s) with {} thread(s)",
        config.samples.len(),
        threads
    ))?;

    let mut assembler = MatrixAssembler::new();
    let mut read_counts = Vec::with_capacity(config.samples.len());
    for sample in &config.samples {
        let start = Instant::now();
        let collapsed = collapse_file(&sample.path, &sample.name, chain, &config.options, &pool)
            .with_context(|| format!("Failed to collapse {}", sample.path.display()))?;
        runlog.timing(
            &format!(
                "Trimming and collapsing finished for file {} ({} reads, {} unique)",
                sample.name,
                collapsed.raw_reads,
                collapsed.unique_sequences()
            ),
            start.elapsed(),
        )?;

        if config.write_collapsed {
            let dump = config
                .out_dir
                .join(format!("{}.trim.collapse.fa", sample.name));
            write_collapsed_fasta(&collapsed.table, &dump)
                .with_context(|| format!("Failed to write {}", dump.display()))?;
        }

        read_counts.push(collapsed.read_counts());
        let start = Instant::now();
        assembler.fold(&sample.name, collapsed.table)?;
        runlog.timing(&format!("Matrix merge finished for file {}", sample.name), start.elapsed())?;
    }

    let matrix = assembler.finish();
    runlog.line(&format!(
        "Matrix holds {} unique sequences across {} sample(s)",
        matrix.len(),
        matrix.samples().len()
    ))?;
    Ok(CollapseOutput {
        matrix,
        read_counts,
    })
}

fn prepare(config: &CollapseConfig) -> Result<(ModifierChain, RunLog)> {
    let chain = ModifierChain::build(&config.trim)?;
    config.options.validate()?;
    std::fs::create_dir_all(&config.out_dir)
        .with_context(|| format!("Failed to create {}", config.out_dir.display()))?;
    let runlog = RunLog::open(&config.out_dir)?;
    Ok((chain, runlog))
}

/// Trims and collapses every sample into one abundance matrix.
pub fn run_collapse(config: &CollapseConfig) -> Result<CollapseOutput> {
    let begin = Instant::now();
    let (chain, mut runlog) = prepare(config)?;
    let output = collapse_all(config, &chain, &mut runlog)?;
    runlog.timing("Data pre-processing completed", begin.elapsed())?;
    Ok(output)
}

/// Collapses every sample, then classifies the matrix stage by stage.
/// Configuration and reference libraries are checked before any read is touched.
pub fn run(config: &PipelineConfig, aligner: &dyn Aligner) -> Result<PipelineOutput> {
    let begin = Instant::now();
    let (chain, mut runlog) = prepare(&config.collapse)?;

    let classifier = Classifier::new(
        aligner,
        &config.libraries,
        default_stages(config.spike_in),
        &config.collapse.out_dir,
    );
    classifier.check_libraries()?;

    let CollapseOutput {
        mut matrix,
        read_counts,
    } = collapse_all(&config.collapse, &chain, &mut runlog)?;
    runlog.timing("Data pre-processing completed", begin.elapsed())?;

    runlog.line("Alignment in progress ...")?;
    let start = Instant::now();
    let stages = classifier.run(&mut matrix)?;
    for report in &stages {
        if report.skipped() {
            runlog.line(&format!("{}: no eligible sequences", report.category))?;
        } else {
            runlog.timing(
                &format!(
                    "{}: {} of {} sequences aligned",
                    report.category, report.claimed, report.eligible
                ),
                report.elapsed,
            )?;
        }
    }
    runlog.timing("Alignment completed", start.elapsed())?;
    runlog.line(&crate::reports::classification_summary(&matrix))?;

    Ok(PipelineOutput {
        matrix,
        read_counts,
        stages,
    })
}

/// Writes the command line that started the run, as the first line of a run.
pub fn log_invocation(out_dir: &Path, args: &[String]) -> Result<()> {
    std::fs::create_dir_all(out_dir)
        .with_context(|| format!("Failed to create {}", out_dir.display()))?;
    RunLog::open(out_dir)?.line(&args.join(" "))?;
    Ok(())
}
