use std::path::{Path, PathBuf};
use std::process::Command;

use crate::errors::{PipelineError, Result};

/// Mismatch policy of one bowtie run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MismatchMode {
    /// `-n`: mismatches allowed in the seed.
    Seed(u8),
    /// `-v`: mismatches allowed over the whole read.
    EndToEnd(u8),
}

/// Sensitivity profile of one alignment stage. Reads are always FASTA,
/// forward-strand only, and the report is always SAM.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AlignParams {
    pub mismatches: MismatchMode,
    pub trim5: u32,
    pub trim3: u32,
    pub report_all: bool,
    pub best: bool,
    pub strata: bool,
}

impl AlignParams {
    pub const fn seed(n: u8) -> Self {
        Self {
            mismatches: MismatchMode::Seed(n),
            trim5: 0,
            trim3: 0,
            report_all: false,
            best: false,
            strata: false,
        }
    }

    pub const fn end_to_end(v: u8) -> Self {
        Self {
            mismatches: MismatchMode::EndToEnd(v),
            ..Self::seed(0)
        }
    }

    pub fn to_args(&self, threads: usize) -> Vec<String> {
        let mut args = Vec::new();
        if self.trim5 > 0 {
            args.extend(["-5".to_string(), self.trim5.to_string()]);
        }
        if self.trim3 > 0 {
            args.extend(["-3".to_string(), self.trim3.to_string()]);
        }
        match self.mismatches {
            MismatchMode::Seed(n) => args.extend(["-n".to_string(), n.to_string()]),
            MismatchMode::EndToEnd(v) => args.extend(["-v".to_string(), v.to_string()]),
        }
        args.push("-f".to_string());
        if self.report_all {
            args.push("-a".to_string());
        }
        if self.best {
            args.push("--best".to_string());
        }
        if self.strata {
            args.push("--strata".to_string());
        }
        args.push("--norc".to_string());
        args.push("-S".to_string());
        args.push("--threads".to_string());
        args.push(threads.to_string());
        args
    }
}

/// Aligns a FASTA file of reads against one index and returns the SAM report.
pub trait Aligner {
    fn align(&self, index: &Path, params: &AlignParams, reads: &Path) -> Result<String>;
}

pub struct BowtieAligner {
    pub binary: PathBuf,
    pub threads: usize,
}

impl BowtieAligner {
    /// `bowtie` from `bin_dir`, or from `PATH` when no directory is given.
    pub fn new(bin_dir: Option<&Path>, threads: usize) -> Self {
        let binary = match bin_dir {
            Some(dir) => dir.join("bowtie"),
            None => PathBuf::from("bowtie"),
        };
        Self {
            binary,
            threads: threads.max(1),
        }
    }
}

impl Aligner for BowtieAligner {
    fn align(&self, index: &Path, params: &AlignParams, reads: &Path) -> Result<String> {
        let output = Command::new(&self.binary)
            .args(params.to_args(self.threads))
            .arg(index)
            .arg(reads)
            .output()
            .map_err(|e| PipelineError::Aligner {
                index: index.to_path_buf(),
                message: format!("failed to run {}: {}", self.binary.display(), e),
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(PipelineError::Aligner {
                index: index.to_path_buf(),
                message: format!("{} ({})", stderr.trim(), output.status),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args() {
        assert_eq!(
            AlignParams::seed(0).to_args(4).join(" "),
            "-n 0 -f --norc -S --threads 4"
        );
        let trna = AlignParams {
            report_all: true,
            best: true,
            strata: true,
            ..AlignParams::end_to_end(1)
        };
        assert_eq!(
            trna.to_args(1).join(" "),
            "-v 1 -f -a --best --strata --norc -S --threads 1"
        );
        let isomir = AlignParams {
            trim5: 1,
            trim3: 2,
            best: true,
            ..AlignParams::end_to_end(2)
        };
        assert_eq!(
            isomir.to_args(2).join(" "),
            "-5 1 -3 2 -v 2 -f --best --norc -S --threads 2"
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_command_line() {
        let aligner = BowtieAligner {
            binary: PathBuf::from("echo"),
            threads: 3,
        };
        let out = aligner
            .align(Path::new("idx/human_rrna"), &AlignParams::seed(1), Path::new("reads.fa"))
            .unwrap();
        assert_eq!(out.trim_end(), "-n 1 -f --norc -S --threads 3 idx/human_rrna reads.fa");
    }

    #[cfg(unix)]
    #[test]
    fn test_failing_aligner() {
        let aligner = BowtieAligner {
            binary: PathBuf::from("false"),
            threads: 1,
        };
        let err = aligner
            .align(Path::new("idx"), &AlignParams::seed(0), Path::new("reads.fa"))
            .unwrap_err();
        assert!(matches!(err, PipelineError::Aligner { .. }));
    }

    #[test]
    fn test_missing_binary() {
        let aligner = BowtieAligner::new(Some(Path::new("/nonexistent/bin")), 0);
        assert_eq!(aligner.threads, 1);
        let err = aligner
            .align(Path::new("idx"), &AlignParams::seed(0), Path::new("reads.fa"))
            .unwrap_err();
        assert!(err.to_string().contains("failed to run"));
    }
}
