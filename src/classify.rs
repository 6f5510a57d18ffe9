use std::collections::HashSet;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use crate::aligner::Aligner;
use crate::errors::Result;
use crate::libraries::ReferenceLibraries;
use crate::matrix::{AbundanceMatrix, Category};
use crate::sam;
use crate::stages::StageDescriptor;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageReport {
    pub category: Category,
    pub eligible: usize,
    pub claimed: usize,
    pub elapsed: Duration,
}

impl StageReport {
    /// No rows qualified, so the aligner was never started.
    pub fn skipped(&self) -> bool {
        self.eligible == 0
    }
}

/// Runs the classification stages over an abundance matrix, in order.
pub struct Classifier<'a> {
    aligner: &'a dyn Aligner,
    libraries: &'a ReferenceLibraries,
    stages: Vec<StageDescriptor>,
    scratch_dir: PathBuf,
}

impl<'a> Classifier<'a> {
    pub fn new(
        aligner: &'a dyn Aligner,
        libraries: &'a ReferenceLibraries,
        stages: Vec<StageDescriptor>,
        scratch_dir: &Path,
    ) -> Self {
        Self {
            aligner,
            libraries,
            stages,
            scratch_dir: scratch_dir.to_path_buf(),
        }
    }

    pub fn stages(&self) -> &[StageDescriptor] {
        &self.stages
    }

    fn index_for(&self, stage: &StageDescriptor) -> PathBuf {
        self.libraries.index_prefix(stage.library, stage.with_db)
    }

    /// Fails on the first stage whose index is missing.
    pub fn check_libraries(&self) -> Result<()> {
        for stage in &self.stages {
            self.libraries.ensure_exists(&self.index_for(stage))?;
        }
        Ok(())
    }

    /// Runs every stage in priority order. Libraries are checked first here as
    /// well, so a classifier used outside `pipeline::run` still fails before
    /// the first alignment.
    pub fn run(&self, matrix: &mut AbundanceMatrix) -> Result<Vec<StageReport>> {
        self.check_libraries()?;
        let mut reports = Vec::with_capacity(self.stages.len());
        for stage in &self.stages {
            let report = self.run_stage(stage, matrix)?;
            if report.skipped() {
                log::info!("{}: no eligible sequences, stage skipped", stage.category);
            } else {
                log::info!(
                    "{}: {} of {} sequences classified in {:.4} s",
                    stage.category,
                    report.claimed,
                    report.eligible,
                    report.elapsed.as_secs_f64()
                );
            }
            reports.push(report);
        }
        if !self.stages.iter().any(|s| s.category == Category::SpikeIn) {
            matrix.drop_category(Category::SpikeIn);
        }
        Ok(reports)
    }

    fn run_stage(&self, stage: &StageDescriptor, matrix: &mut AbundanceMatrix) -> Result<StageReport> {
        let start = Instant::now();
        let selected: Vec<(&str, &str)> = matrix
            .rows()
            .filter(|(_, row)| !row.annot_flag)
            .filter_map(|(key, _)| stage.eligibility.select(key).map(|seq| (key.as_str(), seq)))
            .collect();
        let eligible = selected.len();
        if eligible == 0 {
            return Ok(StageReport {
                category: stage.category,
                eligible,
                claimed: 0,
                elapsed: start.elapsed(),
            });
        }

        // removed when it goes out of scope, including on error
        let mut scratch = tempfile::Builder::new()
            .prefix("bwtInput")
            .suffix(".fasta")
            .tempfile_in(&self.scratch_dir)?;
        {
            let mut writer = BufWriter::new(scratch.as_file_mut());
            for (key, seq) in &selected {
                writeln!(writer, ">{}\n{}", key, seq)?;
            }
            writer.flush()?;
        }

        let index = self.index_for(stage);
        log::debug!("aligning {} sequences against {}", eligible, index.display());
        let report = self.aligner.align(&index, &stage.params, scratch.path())?;

        // a read reported several times in this stage keeps its last alignment
        let mut claimed_here: HashSet<String> = HashSet::new();
        for record in sam::parse_report(&report)? {
            if !record.is_aligned() {
                continue;
            }
            if claimed_here.contains(&record.qname) {
                matrix.relabel(&record.qname, stage.category, &record.rname)?;
            } else if matrix.claim(&record.qname, stage.category, &record.rname)? {
                claimed_here.insert(record.qname);
            }
        }
        let claimed = claimed_here.len();

        Ok(StageReport {
            category: stage.category,
            eligible,
            claimed,
            elapsed: start.elapsed(),
        })
    }
}
