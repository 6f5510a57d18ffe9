use std::time::Instant;

use anyhow::Result;
use clap::Parser;
use log::{info, Level};
use simple_logger::init_with_level;

use smallrna_rs::aligner::BowtieAligner;
use smallrna_rs::cli::PipelineArgs;
use smallrna_rs::errors::exit_with_error;
use smallrna_rs::pipeline::{self, log_invocation};
use smallrna_rs::reports::write_reports;

fn run() -> Result<()> {
    let start = Instant::now();
    let args = PipelineArgs::parse();
    init_with_level(if args.common.quiet {
        Level::Warn
    } else {
        Level::Info
    })?;

    let out_dir = args.common.out_dir();
    log_invocation(&out_dir, &std::env::args().collect::<Vec<_>>())?;

    let config = args.pipeline_config(out_dir.clone())?;
    let aligner = BowtieAligner::new(
        args.bowtie_path.as_deref(),
        config.collapse.thread_count(),
    );

    let output = pipeline::run(&config, &aligner)?;
    let paths = write_reports(output.matrix, &output.read_counts, &out_dir)?;
    info!("Results written to {}", paths.mapped.display());
    info!("Unclassified sequences written to {}", paths.unmapped.display());
    info!("Elapsed time: {:?}", start.elapsed());
    Ok(())
}

fn main() {
    if let Err(e) = run() {
        exit_with_error(&e);
    }
}
