//! Decoding of the SAM text the aligner writes to stdout.

use crate::errors::{PipelineError, Result};

pub const UNALIGNED: &str = "*";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlignmentRecord {
    pub qname: String,
    pub flag: u16,
    pub rname: String,
}

impl AlignmentRecord {
    pub fn is_aligned(&self) -> bool {
        self.rname != UNALIGNED
    }

    /// Decodes one tab-separated record line.
    pub fn parse(line: &str, line_no: usize) -> Result<Self> {
        let mut fields = line.split('\t');
        let (Some(qname), Some(flag), Some(rname)) = (fields.next(), fields.next(), fields.next())
        else {
            return Err(PipelineError::Report(format!(
                "line {}: expected at least 3 tab-separated fields",
                line_no
            )));
        };
        let flag = flag.parse::<u16>().map_err(|_| {
            PipelineError::Report(format!("line {}: invalid flag '{}'", line_no, flag))
        })?;
        Ok(Self {
            qname: qname.to_string(),
            flag,
            rname: rname.to_string(),
        })
    }
}

/// Parses every record of a SAM report, skipping `@` header lines and blank lines.
pub fn parse_report(text: &str) -> Result<Vec<AlignmentRecord>> {
    text.lines()
        .enumerate()
        .filter(|(_, line)| !line.is_empty() && !line.starts_with('@'))
        .map(|(i, line)| AlignmentRecord::parse(line, i + 1))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const REPORT: &str = "@HD\tVN:1.0\tSO:unsorted\n\
@SQ\tSN:hsa-let-7a-5p\tLN:22\n\
@PG\tID:Bowtie\n\
TGAGGTAGTAGGTTGTATAGTT\t0\thsa-let-7a-5p\t1\t255\t22M\t*\t0\t0\tTGAGGTAGTAGGTTGTATAGTT\tIIIIIIIIIIIIIIIIIIIIII\tXA:i:0\n\
CCCCCCCCCCCCCCCCCCCC\t4\t*\t0\t0\t*\t*\t0\t0\tCCCCCCCCCCCCCCCCCCCC\tIIIIIIIIIIIIIIIIIIII\tXM:i:0\n\
\n";

    #[test]
    fn test_parse_report() {
        let records = parse_report(REPORT).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].qname, "TGAGGTAGTAGGTTGTATAGTT");
        assert_eq!(records[0].rname, "hsa-let-7a-5p");
        assert!(records[0].is_aligned());
        assert_eq!(records[1].flag, 4);
        assert!(!records[1].is_aligned());
    }

    #[test]
    fn test_short_record_is_an_error() {
        let err = parse_report("@HD\tVN:1.0\nACGT\t0\n").unwrap_err();
        assert!(matches!(err, PipelineError::Report(_)));
        assert!(err.to_string().contains("line 2"));
    }

    #[test]
    fn test_empty_report() {
        assert!(parse_report("").unwrap().is_empty());
        assert!(parse_report("@HD\tVN:1.0\n").unwrap().is_empty());
    }
}
