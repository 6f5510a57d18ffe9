use std::fs;
use std::path::{Path, PathBuf};

use crate::errors::{PipelineError, Result};

const READ_EXTENSIONS: [&str; 4] = [".fastq", ".fq", ".fasta", ".fa"];
const MANIFEST_EXTENSIONS: [&str; 2] = ["txt", "csv"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SampleInput {
    pub path: PathBuf,
    /// Column name in the matrix: the file name without its read extensions.
    pub name: String,
}

/// File name with `.gz` and one read-file extension removed, or `None` if
/// the file is not a FASTQ/FASTA file.
pub fn sample_name(path: &Path) -> Option<String> {
    let file_name = path.file_name()?.to_str()?;
    let stem = file_name.strip_suffix(".gz").unwrap_or(file_name);
    READ_EXTENSIONS
        .iter()
        .find_map(|ext| stem.strip_suffix(ext))
        .filter(|name| !name.is_empty())
        .map(str::to_string)
}

/// Resolves the sample argument: a comma-separated list of read files, a
/// directory of read files, or a `.txt`/`.csv` manifest with one path per line.
pub fn resolve_samples(spec: &str) -> Result<Vec<SampleInput>> {
    let entries: Vec<&str> = spec
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect();
    let first = entries
        .first()
        .map(Path::new)
        .ok_or_else(|| PipelineError::config("no input samples given"))?;

    let candidates: Vec<PathBuf> = if first.is_dir() {
        let mut files = Vec::new();
        for entry in fs::read_dir(first)? {
            let path = entry?.path();
            if path.is_file() {
                files.push(path);
            }
        }
        files.sort();
        files
    } else if first.is_file()
        && first
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| MANIFEST_EXTENSIONS.contains(&e))
    {
        fs::read_to_string(first)?
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(PathBuf::from)
            .collect()
    } else {
        entries.iter().map(PathBuf::from).collect()
    };

    let total = candidates.len();
    let mut samples: Vec<SampleInput> = Vec::with_capacity(total);
    for path in candidates {
        let Some(name) = sample_name(&path) else {
            log::warn!("skipping {}: not a FASTQ/FASTA file", path.display());
            continue;
        };
        if !path.is_file() {
            return Err(PipelineError::MissingInput(path));
        }
        if let Some(other) = samples.iter().find(|s| s.name == name) {
            return Err(PipelineError::config(format!(
                "{} and {} both map to sample name '{}'",
                other.path.display(),
                path.display(),
                name
            )));
        }
        samples.push(SampleInput { path, name });
    }
    if samples.is_empty() {
        return Err(PipelineError::config(format!(
            "none of the {} input file(s) is a FASTQ/FASTA file",
            total
        )));
    }
    log::info!("processing {} out of {} input file(s)", samples.len(), total);
    Ok(samples)
}
