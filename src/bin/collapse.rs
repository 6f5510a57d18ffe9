use std::time::Instant;

use anyhow::Result;
use clap::Parser;
use log::{info, Level};
use simple_logger::init_with_level;

use smallrna_rs::cli::CollapseArgs;
use smallrna_rs::errors::exit_with_error;
use smallrna_rs::matrix::Category;
use smallrna_rs::pipeline::{log_invocation, run_collapse};
use smallrna_rs::reports::{write_matrix_csv, write_read_counts, READ_COUNTS_JSON};

fn run() -> Result<()> {
    let start = Instant::now();
    let args = CollapseArgs::parse();
    init_with_level(if args.common.quiet {
        Level::Warn
    } else {
        Level::Info
    })?;

    let out_dir = args.common.out_dir();
    log_invocation(&out_dir, &std::env::args().collect::<Vec<_>>())?;

    let config = args.common.collapse_config(out_dir.clone())?;
    let mut output = run_collapse(&config)?;
    for category in Category::ALL {
        output.matrix.drop_category(category);
    }

    let matrix_path = out_dir.join("collapsed.csv");
    write_matrix_csv(&output.matrix, &matrix_path)?;
    write_read_counts(&output.read_counts, &out_dir.join(READ_COUNTS_JSON))?;
    info!("Collapsed matrix written to {}", matrix_path.display());
    info!("Elapsed time: {:?}", start.elapsed());
    Ok(())
}

fn main() {
    if let Err(e) = run() {
        exit_with_error(&e);
    }
}
