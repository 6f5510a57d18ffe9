//! Adapter sequences and the error-tolerant aligner used to locate them in reads.
//!
//! An adapter is aligned semi-globally: the adapter always contributes a prefix
//! (3' adapters) or a suffix (5' adapters), the read side may start anywhere,
//! and a partial adapter is accepted only where it runs off the end of the read.
//! Errors are bounded by `floor(error_rate * aligned_adapter_length)`.

use std::fmt;

use crate::errors::{PipelineError, Result};

pub const ILLUMINA_BACK: &str = "TGGAATTCTCGGGTGCCAAGGAACTCCAG";
pub const ILLUMINA_FRONT: &str = "GTTCAGAGTTCTACAGTCCGACGATC";

const IUPAC_CODES: &[u8] = b"ACGTURYSWKMBDHVN";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdapterKind {
    /// 3' adapter: the match and everything after it is removed.
    Back,
    /// 5' adapter: the match and everything before it is removed.
    Front,
    Anywhere,
}

impl fmt::Display for AdapterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AdapterKind::Back => "back",
            AdapterKind::Front => "front",
            AdapterKind::Anywhere => "anywhere",
        };
        f.write_str(s)
    }
}

/// Replaces a platform preset name with its literal sequence.
pub fn resolve_adapter_alias(kind: AdapterKind, spec: &str) -> String {
    if spec.eq_ignore_ascii_case("illumina") {
        match kind {
            AdapterKind::Front => ILLUMINA_FRONT.to_string(),
            AdapterKind::Back | AdapterKind::Anywhere => ILLUMINA_BACK.to_string(),
        }
    } else {
        spec.to_string()
    }
}

/// Bitmask of the bases an IUPAC symbol stands for (A=1, C=2, G=4, T=8).
fn iupac_bits(b: u8) -> u8 {
    match b.to_ascii_uppercase() {
        b'A' => 1,
        b'C' => 2,
        b'G' => 4,
        b'T' | b'U' => 8,
        b'R' => 1 | 4,
        b'Y' => 2 | 8,
        b'S' => 2 | 4,
        b'W' => 1 | 8,
        b'K' => 4 | 8,
        b'M' => 1 | 2,
        b'B' => 2 | 4 | 8,
        b'D' => 1 | 4 | 8,
        b'H' => 1 | 2 | 8,
        b'V' => 1 | 2 | 4,
        b'N' => 15,
        _ => 0,
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MatchParams {
    pub max_error_rate: f64,
    pub min_overlap: usize,
    pub read_wildcards: bool,
    pub adapter_wildcards: bool,
    pub indels: bool,
}

impl Default for MatchParams {
    fn default() -> Self {
        Self {
            max_error_rate: 0.1,
            min_overlap: 3,
            read_wildcards: false,
            adapter_wildcards: true,
            indels: true,
        }
    }
}

impl MatchParams {
    fn compatible(&self, adapter_base: u8, read_base: u8) -> bool {
        let a = adapter_base.to_ascii_uppercase();
        let r = read_base.to_ascii_uppercase();
        if a == r {
            return true;
        }
        if self.read_wildcards && r == b'N' {
            return true;
        }
        if self.adapter_wildcards {
            let bits = iupac_bits(a);
            let read_bits = iupac_bits(r);
            return read_bits != 0 && read_bits.count_ones() == 1 && bits & read_bits != 0;
        }
        false
    }

    fn max_errors(&self, aligned_len: usize) -> usize {
        (self.max_error_rate * aligned_len as f64 + 1e-9).floor() as usize
    }
}

/// Location of an adapter occurrence within a read (half-open ranges).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdapterMatch {
    pub adapter: String,
    pub astart: usize,
    pub astop: usize,
    pub rstart: usize,
    pub rstop: usize,
    pub matches: usize,
    pub errors: usize,
    /// Whether the read is cut before (`true`) or after the match.
    pub removes_front: bool,
}

impl AdapterMatch {
    /// `true` when `self` beats `other`: more matching bases, then fewer errors.
    pub fn is_better_than(&self, other: &AdapterMatch) -> bool {
        self.matches > other.matches
            || (self.matches == other.matches && self.errors < other.errors)
    }

    /// The part of the read that survives trimming.
    pub fn remainder_range(&self, read_len: usize) -> (usize, usize) {
        if self.removes_front {
            (self.rstop, read_len)
        } else {
            (0, self.rstart)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Alignment {
    astop: usize,
    rstart: usize,
    rstop: usize,
    matches: usize,
    errors: usize,
}

#[derive(Clone, Copy)]
struct Cell {
    cost: usize,
    matches: usize,
    origin: usize,
}

const INF: usize = usize::MAX / 4;

/// Aligns a prefix of `adapter` against `read`.
///
/// With `free_start` the alignment may begin at any read position, otherwise it
/// starts at read position 0. The full adapter may end anywhere in the read; a
/// partial adapter is only reported when it reaches the end of the read and
/// `allow_partial` is set.
fn align_prefix(
    adapter: &[u8],
    read: &[u8],
    params: &MatchParams,
    free_start: bool,
    allow_partial: bool,
) -> Option<Alignment> {
    let m = adapter.len();
    let n = read.len();
    if m == 0 {
        return None;
    }
    let width = n + 1;
    let mut dp = vec![
        Cell {
            cost: INF,
            matches: 0,
            origin: 0,
        };
        (m + 1) * width
    ];

    for j in 0..=n {
        let cost = if free_start {
            0
        } else if params.indels {
            j
        } else if j == 0 {
            0
        } else {
            INF
        };
        dp[j] = Cell {
            cost,
            matches: 0,
            origin: if free_start { j } else { 0 },
        };
    }

    for i in 1..=m {
        let row = i * width;
        let prev = (i - 1) * width;
        dp[row] = Cell {
            cost: if params.indels { i } else { INF },
            matches: 0,
            origin: 0,
        };
        for j in 1..=n {
            let diag = dp[prev + j - 1];
            let is_match = params.compatible(adapter[i - 1], read[j - 1]);
            let mut best = Cell {
                cost: diag.cost.saturating_add(usize::from(!is_match)),
                matches: diag.matches + usize::from(is_match),
                origin: diag.origin,
            };
            if params.indels {
                for cand in [dp[prev + j], dp[row + j - 1]] {
                    let cost = cand.cost.saturating_add(1);
                    if cost < best.cost || (cost == best.cost && cand.matches > best.matches) {
                        best = Cell {
                            cost,
                            matches: cand.matches,
                            origin: cand.origin,
                        };
                    }
                }
            }
            dp[row + j] = best;
        }
    }

    let min_overlap = params.min_overlap.min(m).max(1);
    let mut best: Option<Alignment> = None;
    let mut consider = |i: usize, j: usize| {
        let cell = dp[i * width + j];
        if cell.cost >= INF || i < min_overlap || cell.cost > params.max_errors(i) {
            return;
        }
        let cand = Alignment {
            astop: i,
            rstart: cell.origin,
            rstop: j,
            matches: cell.matches,
            errors: cell.cost,
        };
        let replace = match &best {
            None => true,
            Some(b) => {
                cand.matches > b.matches || (cand.matches == b.matches && cand.errors < b.errors)
            }
        };
        if replace {
            best = Some(cand);
        }
    };

    for j in 0..=n {
        consider(m, j);
    }
    if allow_partial {
        for i in (1..m).rev() {
            consider(i, n);
        }
    }
    best
}

#[derive(Debug, Clone, PartialEq)]
pub struct Adapter {
    pub name: String,
    pub sequence: Vec<u8>,
    pub kind: AdapterKind,
    pub anchored: bool,
    pub params: MatchParams,
}

impl Adapter {
    /// Parses an adapter specification: `[name=]SEQUENCE`, where a leading `^`
    /// anchors a front adapter and a trailing `$` anchors a back adapter.
    pub fn parse(kind: AdapterKind, spec: &str, index: usize, params: MatchParams) -> Result<Self> {
        let (name, raw) = match spec.split_once('=') {
            Some((name, seq)) => (name.trim().to_string(), seq.trim()),
            None => (format!("{}", index + 1), spec.trim()),
        };
        let raw = resolve_adapter_alias(kind, raw);

        let mut anchored = false;
        let mut body = raw.as_str();
        if let Some(rest) = body.strip_prefix('^') {
            if kind != AdapterKind::Front {
                return Err(PipelineError::config(format!(
                    "adapter '{}': '^' anchoring is only valid for front adapters",
                    spec
                )));
            }
            anchored = true;
            body = rest;
        }
        if let Some(rest) = body.strip_suffix('$') {
            if kind != AdapterKind::Back {
                return Err(PipelineError::config(format!(
                    "adapter '{}': '$' anchoring is only valid for back adapters",
                    spec
                )));
            }
            anchored = true;
            body = rest;
        }

        let sequence: Vec<u8> = body
            .bytes()
            .map(|b| match b.to_ascii_uppercase() {
                b'U' => b'T',
                other => other,
            })
            .collect();
        if sequence.is_empty() {
            return Err(PipelineError::config(format!(
                "adapter '{}' has an empty sequence",
                spec
            )));
        }
        if let Some(bad) = sequence.iter().find(|b| !IUPAC_CODES.contains(b)) {
            return Err(PipelineError::config(format!(
                "adapter '{}' contains invalid character '{}'",
                spec, *bad as char
            )));
        }

        Ok(Self {
            name,
            sequence,
            kind,
            anchored,
            params,
        })
    }

    pub fn sequence_str(&self) -> &str {
        std::str::from_utf8(&self.sequence).unwrap_or_default()
    }

    fn to_match(&self, aln: Alignment, removes_front: bool) -> AdapterMatch {
        AdapterMatch {
            adapter: self.name.clone(),
            astart: 0,
            astop: aln.astop,
            rstart: aln.rstart,
            rstop: aln.rstop,
            matches: aln.matches,
            errors: aln.errors,
            removes_front,
        }
    }

    fn match_back(&self, read: &[u8]) -> Option<AdapterMatch> {
        if self.anchored {
            // whole adapter, flush with the read end
            let rev = self.reversed_front(read, false)?;
            return Some(AdapterMatch {
                removes_front: false,
                ..rev
            });
        }
        let aln = align_prefix(&self.sequence, read, &self.params, true, true)?;
        Some(self.to_match(aln, false))
    }

    /// Runs the prefix aligner on reversed sequences, which aligns an adapter
    /// suffix against the read with partial matches allowed at the read start.
    fn reversed_front(&self, read: &[u8], free_start: bool) -> Option<AdapterMatch> {
        let m = self.sequence.len();
        let n = read.len();
        let adapter_rev: Vec<u8> = self.sequence.iter().rev().copied().collect();
        let read_rev: Vec<u8> = read.iter().rev().copied().collect();
        let aln = align_prefix(&adapter_rev, &read_rev, &self.params, free_start, free_start)?;
        Some(AdapterMatch {
            adapter: self.name.clone(),
            astart: m - aln.astop,
            astop: m,
            rstart: n - aln.rstop,
            rstop: n - aln.rstart,
            matches: aln.matches,
            errors: aln.errors,
            removes_front: true,
        })
    }

    fn match_front(&self, read: &[u8]) -> Option<AdapterMatch> {
        if self.anchored {
            let aln = align_prefix(&self.sequence, read, &self.params, false, false)?;
            return Some(self.to_match(aln, true));
        }
        self.reversed_front(read, true)
    }

    /// Finds the best occurrence of this adapter in `read`.
    pub fn match_to(&self, read: &[u8]) -> Option<AdapterMatch> {
        match self.kind {
            AdapterKind::Back => self.match_back(read),
            AdapterKind::Front => self.match_front(read),
            AdapterKind::Anywhere => {
                let back = self.match_back(read);
                let front = self.match_front(read);
                let best = match (back, front) {
                    (Some(b), Some(f)) => {
                        if f.is_better_than(&b) {
                            f
                        } else {
                            b
                        }
                    }
                    (Some(b), None) => b,
                    (None, Some(f)) => f,
                    (None, None) => return None,
                };
                let removes_front = best.rstart == 0;
                Some(AdapterMatch {
                    removes_front,
                    ..best
                })
            }
        }
    }
}

/// Warns about adapters given more than once; they are still used.
pub fn warn_duplicate_adapters(adapters: &[Adapter]) {
    for (i, a) in adapters.iter().enumerate() {
        if adapters[..i]
            .iter()
            .any(|b| b.kind == a.kind && b.anchored == a.anchored && b.sequence == a.sequence)
        {
            log::warn!(
                "adapter {} ({} {}) is given more than once",
                a.name,
                a.kind,
                a.sequence_str()
            );
        }
    }
}
