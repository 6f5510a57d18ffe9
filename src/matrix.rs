use std::collections::btree_map::{self, BTreeMap};
use std::fmt;

use crate::collapse::FrequencyTable;
use crate::errors::{PipelineError, Result};

/// Reference categories in classification priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Category {
    ExactMirna,
    HairpinMirna,
    MatureTrna,
    PrimaryTrna,
    Snorna,
    Rrna,
    NcrnaOthers,
    Mrna,
    IsomirMirna,
    SpikeIn,
}

impl Category {
    pub const ALL: [Category; 10] = [
        Category::ExactMirna,
        Category::HairpinMirna,
        Category::MatureTrna,
        Category::PrimaryTrna,
        Category::Snorna,
        Category::Rrna,
        Category::NcrnaOthers,
        Category::Mrna,
        Category::IsomirMirna,
        Category::SpikeIn,
    ];

    pub fn column_name(self) -> &'static str {
        match self {
            Category::ExactMirna => "exact miRNA",
            Category::HairpinMirna => "hairpin miRNA",
            Category::MatureTrna => "mature tRNA",
            Category::PrimaryTrna => "primary tRNA",
            Category::Snorna => "snoRNA",
            Category::Rrna => "rRNA",
            Category::NcrnaOthers => "ncrna others",
            Category::Mrna => "mRNA",
            Category::IsomirMirna => "isomiR miRNA",
            Category::SpikeIn => "spike-in",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.column_name())
    }
}

pub const SEQUENCE_COLUMN: &str = "Sequence";
pub const FLAG_COLUMN: &str = "annotFlag";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatrixRow {
    pub annot_flag: bool,
    /// One cell per matrix category; at most one is set.
    pub classes: Vec<Option<String>>,
    /// One count per sample.
    pub counts: Vec<u64>,
}

impl MatrixRow {
    pub fn total(&self) -> u64 {
        self.counts.iter().sum()
    }
}

/// Outer-joins per-sample frequency tables into one count matrix.
#[derive(Debug, Default)]
pub struct MatrixAssembler {
    samples: Vec<String>,
    rows: BTreeMap<String, Vec<u64>>,
}

impl MatrixAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fold(&mut self, sample: &str, table: FrequencyTable) -> Result<()> {
        if self.samples.iter().any(|s| s == sample) {
            return Err(PipelineError::config(format!(
                "sample name '{}' appears more than once",
                sample
            )));
        }
        let col = self.samples.len();
        let width = col + 1;
        self.samples.push(sample.to_string());

        for (key, count) in table {
            let counts = self.rows.entry(key).or_default();
            counts.resize(width, 0);
            counts[col] = count;
        }
        // keys missing from this sample
        for counts in self.rows.values_mut() {
            counts.resize(width, 0);
        }
        Ok(())
    }

    pub fn samples(&self) -> &[String] {
        &self.samples
    }

    /// Adds the unclassified flag and one empty cell per category.
    pub fn finish(self) -> AbundanceMatrix {
        let categories = Category::ALL.to_vec();
        let rows = self
            .rows
            .into_iter()
            .map(|(key, counts)| {
                let row = MatrixRow {
                    annot_flag: false,
                    classes: vec![None; categories.len()],
                    counts,
                };
                (key, row)
            })
            .collect();
        AbundanceMatrix {
            samples: self.samples,
            categories,
            rows,
        }
    }
}

/// Rows keyed by unique sequence in lexicographic order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AbundanceMatrix {
    samples: Vec<String>,
    categories: Vec<Category>,
    rows: BTreeMap<String, MatrixRow>,
}

impl AbundanceMatrix {
    pub fn samples(&self) -> &[String] {
        &self.samples
    }

    pub fn categories(&self) -> &[Category] {
        &self.categories
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&MatrixRow> {
        self.rows.get(key)
    }

    pub fn rows(&self) -> btree_map::Iter<'_, String, MatrixRow> {
        self.rows.iter()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.rows.keys().map(String::as_str)
    }

    pub fn classified_count(&self) -> usize {
        self.rows.values().filter(|r| r.annot_flag).count()
    }

    /// The reference name stored for `key` under `category`, if any.
    pub fn class_of(&self, key: &str, category: Category) -> Option<&str> {
        let idx = self.category_index(category)?;
        self.rows.get(key)?.classes[idx].as_deref()
    }

    fn category_index(&self, category: Category) -> Option<usize> {
        self.categories.iter().position(|&c| c == category)
    }

    /// Marks `key` as classified. Returns `false`, changing nothing, if the row
    /// was already claimed.
    pub fn claim(&mut self, key: &str, category: Category, reference: &str) -> Result<bool> {
        let idx = self.category_index(category).ok_or_else(|| {
            PipelineError::Report(format!("category '{}' is not in the matrix", category))
        })?;
        let row = self.rows.get_mut(key).ok_or_else(|| {
            PipelineError::Report(format!("read name '{}' is not a matrix row", key))
        })?;
        if row.annot_flag {
            return Ok(false);
        }
        row.annot_flag = true;
        row.classes[idx] = Some(reference.to_string());
        Ok(true)
    }

    /// Replaces the reference recorded for `key` under `category`. Only a row
    /// already classified in that category can be relabelled.
    pub fn relabel(&mut self, key: &str, category: Category, reference: &str) -> Result<()> {
        let idx = self.category_index(category).ok_or_else(|| {
            PipelineError::Report(format!("category '{}' is not in the matrix", category))
        })?;
        match self.rows.get_mut(key) {
            Some(row) if row.annot_flag && row.classes[idx].is_some() => {
                row.classes[idx] = Some(reference.to_string());
                Ok(())
            }
            Some(_) => Err(PipelineError::Report(format!(
                "'{}' is not classified as {}",
                key, category
            ))),
            None => Err(PipelineError::Report(format!(
                "read name '{}' is not a matrix row",
                key
            ))),
        }
    }

    pub fn drop_category(&mut self, category: Category) {
        let Some(idx) = self.category_index(category) else {
            return;
        };
        self.categories.remove(idx);
        for row in self.rows.values_mut() {
            row.classes.remove(idx);
        }
    }

    /// Splits into (classified, unclassified) matrices with the same columns.
    pub fn split_by_flag(self) -> (AbundanceMatrix, AbundanceMatrix) {
        let (mapped, unmapped): (BTreeMap<_, _>, BTreeMap<_, _>) =
            self.rows.into_iter().partition(|(_, row)| row.annot_flag);
        (
            AbundanceMatrix {
                samples: self.samples.clone(),
                categories: self.categories.clone(),
                rows: mapped,
            },
            AbundanceMatrix {
                samples: self.samples,
                categories: self.categories,
                rows: unmapped,
            },
        )
    }

    pub fn header(&self) -> Vec<String> {
        let mut header = Vec::with_capacity(2 + self.categories.len() + self.samples.len());
        header.push(SEQUENCE_COLUMN.to_string());
        header.push(FLAG_COLUMN.to_string());
        header.extend(self.categories.iter().map(|c| c.column_name().to_string()));
        header.extend(self.samples.iter().cloned());
        header
    }

    /// One record per row, in [`AbundanceMatrix::header`] column order.
    pub fn records(&self) -> impl Iterator<Item = Vec<String>> + '_ {
        self.rows.iter().map(|(key, row)| {
            let mut record = Vec::with_capacity(2 + row.classes.len() + row.counts.len());
            record.push(key.clone());
            record.push(if row.annot_flag { "1" } else { "0" }.to_string());
            record.extend(row.classes.iter().map(|c| c.clone().unwrap_or_default()));
            record.extend(row.counts.iter().map(u64::to_string));
            record
        })
    }
}
