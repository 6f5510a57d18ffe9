use lazy_static::lazy_static;
use regex::Regex;

use crate::aligner::{AlignParams, MismatchMode};
use crate::matrix::Category;

lazy_static! {
    static ref TRAILING_T: Regex = Regex::new(r"T{3,}$").unwrap();
}

/// Which still-unclassified rows a stage aligns, and what it sends to the aligner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Eligibility {
    ShorterThan(usize),
    LongerThan(usize),
    Unclassified,
    /// Rows ending in a run of at least three `T`, aligned with the run removed.
    UnclassifiedTrailingT,
}

impl Eligibility {
    /// The sequence to align for an unclassified row, or `None` if the row
    /// is not part of this stage.
    pub fn select<'a>(&self, key: &'a str) -> Option<&'a str> {
        match *self {
            Eligibility::ShorterThan(n) => (key.len() < n).then_some(key),
            Eligibility::LongerThan(n) => (key.len() > n).then_some(key),
            Eligibility::Unclassified => Some(key),
            Eligibility::UnclassifiedTrailingT => {
                let run = TRAILING_T.find(key)?;
                let core = &key[..run.start()];
                (!core.is_empty()).then_some(core)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageDescriptor {
    pub category: Category,
    /// Index name suffix after the organism, e.g. `_rrna`.
    pub library: &'static str,
    /// Whether the miRNA database family is appended to the index name.
    pub with_db: bool,
    pub params: AlignParams,
    pub eligibility: Eligibility,
}

const fn stage(
    category: Category,
    library: &'static str,
    with_db: bool,
    params: AlignParams,
    eligibility: Eligibility,
) -> StageDescriptor {
    StageDescriptor {
        category,
        library,
        with_db,
        params,
        eligibility,
    }
}

const TRNA_PARAMS: AlignParams = AlignParams {
    report_all: true,
    best: true,
    strata: true,
    ..AlignParams::end_to_end(0)
};

/// Classification stages in priority order. The spike-in stage is only
/// included when requested.
pub fn default_stages(spike_in: bool) -> Vec<StageDescriptor> {
    use Category::*;
    use Eligibility::*;

    let mut stages = vec![
        stage(ExactMirna, "_mirna_", true, AlignParams::seed(0), ShorterThan(26)),
        stage(HairpinMirna, "_hairpin_", true, AlignParams::seed(1), LongerThan(25)),
        stage(
            MatureTrna,
            "_mature_trna",
            false,
            AlignParams {
                mismatches: MismatchMode::EndToEnd(1),
                ..TRNA_PARAMS
            },
            Unclassified,
        ),
        stage(PrimaryTrna, "_pre_trna", false, TRNA_PARAMS, Unclassified),
        stage(Snorna, "_snorna", false, AlignParams::seed(1), Unclassified),
        stage(Rrna, "_rrna", false, AlignParams::seed(1), Unclassified),
        stage(NcrnaOthers, "_ncrna_others", false, AlignParams::seed(1), Unclassified),
        stage(Mrna, "_mrna", false, AlignParams::seed(0), Unclassified),
        stage(
            IsomirMirna,
            "_mirna_",
            true,
            AlignParams {
                trim5: 1,
                trim3: 2,
                best: true,
                ..AlignParams::end_to_end(2)
            },
            UnclassifiedTrailingT,
        ),
    ];
    if spike_in {
        stages.push(stage(SpikeIn, "_spike-in", false, AlignParams::seed(0), Unclassified));
    }
    stages
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trailing_t_selection() {
        let e = Eligibility::UnclassifiedTrailingT;
        assert_eq!(e.select("ACGTACGTACGTTTT"), Some("ACGTACGTACG"));
        assert_eq!(e.select("ACGTACGTACGATT"), None);
        assert_eq!(e.select("TTTTT"), None);
    }

    #[test]
    fn test_length_predicates() {
        let short = "A".repeat(25);
        let long = "A".repeat(26);
        assert!(Eligibility::ShorterThan(26).select(&short).is_some());
        assert!(Eligibility::ShorterThan(26).select(&long).is_none());
        assert!(Eligibility::LongerThan(25).select(&long).is_some());
        assert!(Eligibility::LongerThan(25).select(&short).is_none());
    }

    #[test]
    fn test_stage_table() {
        let stages = default_stages(false);
        assert_eq!(stages.len(), 9);
        let order: Vec<Category> = stages.iter().map(|s| s.category).collect();
        assert_eq!(order, Category::ALL[..9].to_vec());

        assert_eq!(
            stages[2].params.to_args(1).join(" "),
            "-v 1 -f -a --best --strata --norc -S --threads 1"
        );
        assert_eq!(
            stages[3].params.to_args(1).join(" "),
            "-v 0 -f -a --best --strata --norc -S --threads 1"
        );
        assert_eq!(stages[8].library, "_mirna_");
        assert!(stages[8].with_db);

        let with_spike = default_stages(true);
        assert_eq!(with_spike.last().unwrap().category, Category::SpikeIn);
    }
}
