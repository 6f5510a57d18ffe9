use std::fmt;
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::Path;

use flate2::read::MultiGzDecoder;

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum SequenceFormat {
    #[default]
    AutoDetect,
    Fasta,
    Fastq,
}

fn strip_string(s: &mut String) {
    while s.ends_with(char::is_whitespace) {
        s.pop();
    }
}

fn malformed<S: Into<String>>(message: S) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, message.into())
}

#[derive(Default, Debug, Clone, PartialEq)]
pub struct Sequence {
    pub format: SequenceFormat,
    pub header: String, // header line, including @/>, but not newline
    pub id: String,     // from first char. after @/> up to first whitespace
    pub seq: String,
    pub quals: String, // only meaningful for FASTQ seqs
}

impl Sequence {
    pub fn new_fastq(id: &str, seq: &str, quals: &str) -> Self {
        Self {
            format: SequenceFormat::Fastq,
            header: format!("@{}", id),
            id: id.to_string(),
            seq: seq.to_string(),
            quals: quals.to_string(),
        }
    }

    pub fn len(&self) -> usize {
        self.seq.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seq.is_empty()
    }

    pub fn has_qualities(&self) -> bool {
        !self.quals.is_empty()
    }

    /// Keeps `seq[start..stop]`, slicing the qualities in step.
    pub fn keep_range(&mut self, start: usize, stop: usize) {
        let stop = stop.min(self.seq.len());
        let start = start.min(stop);
        self.seq.truncate(stop);
        self.seq.drain(..start);
        if self.has_qualities() {
            self.quals.truncate(stop);
            self.quals.drain(..start);
        }
    }
}

impl fmt::Display for Sequence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.format {
            SequenceFormat::Fastq => {
                writeln!(f, "{}", self.header)?;
                writeln!(f, "{}", self.seq)?;
                writeln!(f, "+")?;
                writeln!(f, "{}", self.quals)
            }
            _ => {
                writeln!(f, "{}", self.header)?;
                writeln!(f, "{}", self.seq)
            }
        }
    }
}

/// Opens a plain or gzip-compressed FASTA/FASTQ file.
pub fn open_sequence_file(path: &Path) -> io::Result<BatchSequenceReader<Box<dyn BufRead + Send>>> {
    let mut file = BufReader::new(File::open(path)?);
    let is_gzip = file.fill_buf()?.starts_with(&GZIP_MAGIC);
    let reader: Box<dyn BufRead + Send> = if is_gzip {
        Box::new(BufReader::new(MultiGzDecoder::new(file)))
    } else {
        Box::new(file)
    };
    Ok(BatchSequenceReader::new(reader))
}

pub struct BatchSequenceReader<R: BufRead> {
    reader: R,
    line: String,
    file_format: SequenceFormat,
    records_read: u64,
}

impl<R: BufRead> BatchSequenceReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            line: String::with_capacity(512),
            file_format: SequenceFormat::AutoDetect,
            records_read: 0,
        }
    }

    pub fn records_read(&self) -> u64 {
        self.records_read
    }

    fn read_line(&mut self) -> io::Result<bool> {
        self.line.clear();
        if self.reader.read_line(&mut self.line)? == 0 {
            return Ok(false);
        }
        strip_string(&mut self.line);
        Ok(true)
    }

    fn check_ascii(&self, record_no: u64, what: &str) -> io::Result<()> {
        if self.line.is_ascii() {
            Ok(())
        } else {
            Err(malformed(format!(
                "record {}: non-ASCII {} line",
                record_no, what
            )))
        }
    }

    /// Reads up to `record_count` records. An empty vector means end of input.
    pub fn load_batch(&mut self, record_count: usize) -> io::Result<Vec<Sequence>> {
        let mut batch = Vec::with_capacity(record_count.min(1 << 16));
        while batch.len() < record_count {
            let mut sequence = Sequence::default();
            if !self.next_sequence(&mut sequence)? {
                break;
            }
            batch.push(sequence);
        }
        Ok(batch)
    }

    pub fn next_sequence(&mut self, sequence: &mut Sequence) -> io::Result<bool> {
        sequence.header.clear();
        sequence.id.clear();
        sequence.seq.clear();
        sequence.quals.clear();

        // skip blank lines between records
        loop {
            if !self.read_line()? {
                return Ok(false);
            }
            if !self.line.is_empty() {
                break;
            }
        }

        let record_no = self.records_read + 1;
        match (self.file_format, self.line.chars().next()) {
            (SequenceFormat::AutoDetect, Some('@')) => self.file_format = SequenceFormat::Fastq,
            (SequenceFormat::AutoDetect, Some('>')) => self.file_format = SequenceFormat::Fasta,
            (SequenceFormat::AutoDetect, _) => {
                return Err(malformed("unrecognized file format"));
            }
            (SequenceFormat::Fastq, Some('@')) | (SequenceFormat::Fasta, Some('>')) => {}
            (format, _) => {
                return Err(malformed(format!(
                    "record {}: malformed {} header line",
                    record_no,
                    if format == SequenceFormat::Fastq {
                        "FASTQ"
                    } else {
                        "FASTA"
                    }
                )));
            }
        }
        sequence.format = self.file_format;
        sequence.header.push_str(&self.line);
        sequence.id = sequence.header[1..]
            .split_whitespace()
            .next()
            .unwrap_or_default()
            .to_string();

        match sequence.format {
            SequenceFormat::Fastq => {
                if !self.read_line()? {
                    return Err(malformed(format!("record {}: truncated record", record_no)));
                }
                self.check_ascii(record_no, "sequence")?;
                sequence.seq.push_str(&self.line);

                if !self.read_line()? || !self.line.starts_with('+') {
                    return Err(malformed(format!(
                        "record {}: missing '+' separator",
                        record_no
                    )));
                }

                if !self.read_line()? {
                    return Err(malformed(format!("record {}: truncated record", record_no)));
                }
                self.check_ascii(record_no, "quality")?;
                sequence.quals.push_str(&self.line);
                if sequence.quals.len() != sequence.seq.len() {
                    return Err(malformed(format!(
                        "record {}: sequence and quality lengths differ ({} vs {})",
                        record_no,
                        sequence.seq.len(),
                        sequence.quals.len()
                    )));
                }
            }
            SequenceFormat::Fasta => loop {
                match self.reader.fill_buf()? {
                    buf if buf.is_empty() => break,
                    buf if buf[0] == b'>' => break,
                    _ => {
                        if !self.read_line()? {
                            break;
                        }
                        self.check_ascii(record_no, "sequence")?;
                        sequence.seq.push_str(&self.line);
                    }
                }
            },
            SequenceFormat::AutoDetect => unreachable!(),
        }

        self.records_read += 1;
        Ok(true)
    }
}

impl<R: BufRead> Iterator for BatchSequenceReader<R> {
    type Item = io::Result<Sequence>;

    fn next(&mut self) -> Option<Self::Item> {
        let mut sequence = Sequence::default();
        match self.next_sequence(&mut sequence) {
            Ok(true) => Some(Ok(sequence)),
            Ok(false) => None,
            Err(e) => Some(Err(e)),
        }
    }
}
