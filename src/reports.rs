use anyhow::{Context, Result};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::collapse::SampleReadCounts;
use crate::matrix::AbundanceMatrix;

pub const MAPPED_CSV: &str = "mapped.csv";
pub const UNMAPPED_CSV: &str = "unmapped.csv";
pub const READ_COUNTS_JSON: &str = "read_counts.json";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportPaths {
    pub mapped: PathBuf,
    pub unmapped: PathBuf,
    pub read_counts: PathBuf,
}

pub fn write_matrix_csv(matrix: &AbundanceMatrix, path: &Path) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("Failed to create {}", path.display()))?;
    writer.write_record(matrix.header())?;
    for record in matrix.records() {
        writer.write_record(&record)?;
    }
    writer.flush()?;
    Ok(())
}

pub fn write_read_counts(counts: &[SampleReadCounts], path: &Path) -> Result<()> {
    let file =
        File::create(path).with_context(|| format!("Failed to create {}", path.display()))?;
    let mut ofs = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut ofs, counts)?;
    writeln!(ofs)?;
    ofs.flush()?;
    Ok(())
}

/// One-line overview of how much of the matrix was classified, by unique
/// sequence and by read.
pub fn classification_summary(matrix: &AbundanceMatrix) -> String {
    let (mut classified_reads, mut total_reads) = (0u64, 0u64);
    for (_, row) in matrix.rows() {
        let reads = row.total();
        total_reads += reads;
        if row.annot_flag {
            classified_reads += reads;
        }
    }
    let percent = |part: u64, whole: u64| {
        if whole == 0 {
            0.0
        } else {
            part as f64 * 100.0 / whole as f64
        }
    };
    let classified = matrix.classified_count() as u64;
    let unique = matrix.len() as u64;
    format!(
        "{} of {} unique sequences classified ({:.2}%), {} of {} reads ({:.2}%)",
        classified,
        unique,
        percent(classified, unique),
        classified_reads,
        total_reads,
        percent(classified_reads, total_reads)
    )
}

/// Writes the classified and unclassified rows and the per-sample read counts.
pub fn write_reports(
    matrix: AbundanceMatrix,
    counts: &[SampleReadCounts],
    out_dir: &Path,
) -> Result<ReportPaths> {
    let paths = ReportPaths {
        mapped: out_dir.join(MAPPED_CSV),
        unmapped: out_dir.join(UNMAPPED_CSV),
        read_counts: out_dir.join(READ_COUNTS_JSON),
    };
    let (mapped, unmapped) = matrix.split_by_flag();
    write_matrix_csv(&mapped, &paths.mapped)?;
    write_matrix_csv(&unmapped, &paths.unmapped)?;
    write_read_counts(counts, &paths.read_counts)?;
    Ok(paths)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collapse::FrequencyTable;
    use crate::matrix::{Category, MatrixAssembler};

    fn matrix() -> AbundanceMatrix {
        let mut assembler = MatrixAssembler::new();
        let a: FrequencyTable = vec![("ACGTACGTAC".to_string(), 3)].into_iter().collect();
        let b: FrequencyTable = vec![("TTTTGGGGCC".to_string(), 5)].into_iter().collect();
        assembler.fold("A", a).unwrap();
        assembler.fold("B", b).unwrap();
        let mut matrix = assembler.finish();
        matrix.claim("TTTTGGGGCC", Category::Rrna, "RNA5S1").unwrap();
        matrix.drop_category(Category::SpikeIn);
        matrix
    }

    #[test]
    fn test_write_reports() {
        let dir = tempfile::tempdir().unwrap();
        let counts = vec![SampleReadCounts {
            sample: "A".into(),
            raw_reads: 10,
            trimmed_reads: 3,
            unique_sequences: 1,
        }];
        let paths = write_reports(matrix(), &counts, dir.path()).unwrap();

        let mut reader = csv::Reader::from_path(&paths.mapped).unwrap();
        let header = reader.headers().unwrap().clone();
        assert_eq!(&header[0], "Sequence");
        assert_eq!(&header[1], "annotFlag");
        assert_eq!(header.len(), 2 + 9 + 2);
        let rows: Vec<csv::StringRecord> = reader.records().map(|r| r.unwrap()).collect();
        assert_eq!(rows.len(), 1);
        assert_eq!(&rows[0][0], "TTTTGGGGCC");
        assert_eq!(&rows[0][1], "1");
        assert_eq!(&rows[0][7], "RNA5S1");
        assert_eq!(&rows[0][2], "");
        assert_eq!(&rows[0][12], "5");

        let unmapped = std::fs::read_to_string(&paths.unmapped).unwrap();
        assert!(unmapped.contains("ACGTACGTAC,0,"));

        let json: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&paths.read_counts).unwrap()).unwrap();
        assert_eq!(json[0]["sample"], "A");
        assert_eq!(json[0]["raw_reads"], 10);
    }

    #[test]
    fn test_classification_summary() {
        assert_eq!(
            classification_summary(&matrix()),
            "1 of 2 unique sequences classified (50.00%), 5 of 8 reads (62.50%)"
        );
    }
}
