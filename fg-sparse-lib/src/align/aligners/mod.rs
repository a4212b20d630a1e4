pub mod constants;
pub mod sparse_aligner;

pub use sparse_aligner::SparseAligner;

use anyhow::{ensure, Result};
use bio::alignment::pairwise::{MatchFunc, MatchParams};
use derive_builder::Builder;
use derive_getters::Getters;
use log::debug;

use crate::{
    align::{
        aligners::constants::{
            DEFAULT_INDEL, DEFAULT_INDEL_LOOP, DEFAULT_INDEL_OPENING, DEFAULT_INDEL_OPENING_LOOP,
            DEFAULT_MATCH_SCORE, DEFAULT_MAX_DIFF_AM, DEFAULT_MIN_PROB, DEFAULT_MISMATCH_SCORE,
            DEFAULT_PROB_BASEPAIR_IN_LOOP_THRESHOLD, DEFAULT_PROB_UNPAIRED_IN_LOOP_THRESHOLD,
            DEFAULT_STRUCT_WEIGHT, DEFAULT_TAU_FACTOR,
        },
        scoring::{Scoring, ScoringParams},
    },
    rna::{
        anchors::AnchorConstraints, arc_matches::ArcMatches, base_pairs::BasePairs, coords::Side,
        rna_data::RnaData, sparsification::SparsificationMapper,
    },
};

/// Alignment options.  Build with [`Builder`]; every option has a default.
#[derive(Copy, Clone, Debug, Builder, Getters)]
#[builder(name = "Builder", build_fn(name = "build_options"))]
pub struct Options {
    #[builder(default = "DEFAULT_MATCH_SCORE")]
    match_score: i32,
    #[builder(default = "DEFAULT_MISMATCH_SCORE")]
    mismatch_score: i32,
    #[builder(default = "DEFAULT_INDEL")]
    indel: i32,
    #[builder(default = "DEFAULT_INDEL_LOOP")]
    indel_loop: i32,
    #[builder(default = "DEFAULT_INDEL_OPENING")]
    indel_opening: i32,
    #[builder(default = "DEFAULT_INDEL_OPENING_LOOP")]
    indel_opening_loop: i32,
    #[builder(default = "DEFAULT_STRUCT_WEIGHT")]
    struct_weight: i32,
    #[builder(default = "DEFAULT_TAU_FACTOR")]
    tau_factor: i32,
    #[builder(default)]
    exp_prob: Option<f64>,
    #[builder(default = "DEFAULT_MIN_PROB")]
    min_prob: f64,
    #[builder(default)]
    max_bp_span: Option<usize>,
    #[builder(default = "DEFAULT_PROB_UNPAIRED_IN_LOOP_THRESHOLD")]
    prob_unpaired_in_loop_threshold: f64,
    #[builder(default = "DEFAULT_PROB_BASEPAIR_IN_LOOP_THRESHOLD")]
    prob_basepair_in_loop_threshold: f64,
    #[builder(default = "Some(DEFAULT_MAX_DIFF_AM)")]
    max_diff_am: Option<usize>,
    #[builder(default)]
    max_diff_at_am: Option<usize>,
    /// Minimum span of an arc to be deleted as a whole domain; zero disables domain deletion.
    #[builder(default = "0")]
    multiloop_deletion: usize,
    #[builder(default = "true")]
    track_closing_bp: bool,
    #[builder(default = "false")]
    struct_local: bool,
    #[builder(default = "false")]
    sequ_local: bool,
    #[builder(default = "false")]
    stacking: bool,
    #[builder(default = "false")]
    no_lonely_pairs: bool,
    #[builder(default = "false")]
    suboptimal: bool,
    #[builder(default)]
    normalized: Option<i32>,
}

impl Options {
    /// Checks that the options only request supported features and that the scores are sane.
    pub fn validate(&self) -> Result<()> {
        ensure!(
            !self.struct_local,
            "Structure local alignment is not supported"
        );
        ensure!(!self.sequ_local, "Sequence local alignment is not supported");
        ensure!(!self.stacking, "Stacking terms are not supported");
        ensure!(
            !self.no_lonely_pairs,
            "Disallowing lonely base pairs is not supported"
        );
        ensure!(!self.suboptimal, "Suboptimal alignment is not supported");
        ensure!(
            self.normalized.is_none(),
            "Normalized alignment is not supported"
        );
        ensure!(
            self.track_closing_bp,
            "Alignment without tracking of closing base pairs is not supported"
        );
        for (name, score) in [
            ("indel", self.indel),
            ("indel-loop", self.indel_loop),
            ("indel-opening", self.indel_opening),
            ("indel-opening-loop", self.indel_opening_loop),
        ] {
            ensure!(score <= 0, "The {name} score can't be positive: {score}");
        }
        for (name, prob) in [
            ("min-prob", self.min_prob),
            (
                "prob-unpaired-in-loop-threshold",
                self.prob_unpaired_in_loop_threshold,
            ),
            (
                "prob-basepair-in-loop-threshold",
                self.prob_basepair_in_loop_threshold,
            ),
        ] {
            ensure!(
                (0.0..=1.0).contains(&prob),
                "The {name} must be between zero and one: {prob}"
            );
        }
        if let Some(exp_prob) = self.exp_prob {
            ensure!(
                exp_prob > 0.0 && exp_prob < 1.0,
                "The expected base pair probability must be strictly between zero and one: {exp_prob}"
            );
        }
        Ok(())
    }

    pub fn match_params(&self) -> MatchParams {
        MatchParams::new(self.match_score, self.mismatch_score)
    }

    pub fn scoring_params(&self) -> ScoringParams {
        ScoringParams {
            indel: self.indel,
            indel_loop: self.indel_loop,
            indel_opening: self.indel_opening,
            indel_opening_loop: self.indel_opening_loop,
            struct_weight: self.struct_weight,
            tau_factor: self.tau_factor,
            exp_prob: self.exp_prob,
        }
    }
}

impl Builder {
    /// Prepares the alignment of two RNAs: filters their base pairs, sparsifies their loops,
    /// enumerates the admissible arc matches and precomputes the scoring.
    pub fn build_problem(
        &self,
        rna_a: &RnaData,
        rna_b: &RnaData,
        anchors: AnchorConstraints,
    ) -> Result<AlignmentProblem<MatchParams>> {
        let opts = self.build_options()?;
        AlignmentProblem::new(opts, opts.match_params(), rna_a, rna_b, anchors)
    }
}

/// Everything the aligner reads but never modifies.
#[derive(Debug, Getters)]
pub struct AlignmentProblem<F: MatchFunc> {
    opts: Options,
    name_a: String,
    name_b: String,
    seq_a: Vec<u8>,
    seq_b: Vec<u8>,
    bps_a: BasePairs,
    bps_b: BasePairs,
    mapper_a: SparsificationMapper,
    mapper_b: SparsificationMapper,
    arc_matches: ArcMatches,
    scoring: Scoring<F>,
    anchors: AnchorConstraints,
}

impl<F: MatchFunc> AlignmentProblem<F> {
    /// Filters the base pairs of both RNAs, sparsifies their loops, enumerates the admissible arc
    /// matches and precomputes the scoring.  Fails if `opts` don't validate.
    pub fn new(
        opts: Options,
        match_fn: F,
        rna_a: &RnaData,
        rna_b: &RnaData,
        anchors: AnchorConstraints,
    ) -> Result<Self> {
        opts.validate()?;
        ensure!(
            anchors.len(Side::A) == rna_a.len() && anchors.len(Side::B) == rna_b.len(),
            "Anchor constraints for lengths {} and {} don't fit sequences of lengths {} and {}",
            anchors.len(Side::A),
            anchors.len(Side::B),
            rna_a.len(),
            rna_b.len()
        );

        let bps_a = BasePairs::new(
            rna_a.len(),
            rna_a.bp_probs().iter().copied(),
            opts.min_prob,
            opts.max_bp_span,
        )?;
        let bps_b = BasePairs::new(
            rna_b.len(),
            rna_b.bp_probs().iter().copied(),
            opts.min_prob,
            opts.max_bp_span,
        )?;
        let mapper_a = SparsificationMapper::new(
            &bps_a,
            rna_a,
            opts.prob_unpaired_in_loop_threshold,
            opts.prob_basepair_in_loop_threshold,
        );
        let mapper_b = SparsificationMapper::new(
            &bps_b,
            rna_b,
            opts.prob_unpaired_in_loop_threshold,
            opts.prob_basepair_in_loop_threshold,
        );
        let arc_matches = ArcMatches::new(&bps_a, &bps_b, opts.max_diff_am, opts.max_diff_at_am);
        let scoring = Scoring::new(
            opts.scoring_params(),
            match_fn,
            rna_a.seq(),
            rna_b.seq(),
            &bps_a,
            &bps_b,
        );
        debug!(
            "{} has {} base pairs, {} has {} base pairs, {} arc matches are admissible",
            rna_a.name(),
            bps_a.num_bps(),
            rna_b.name(),
            bps_b.num_bps(),
            arc_matches.len()
        );

        Ok(Self {
            opts,
            name_a: rna_a.name().to_string(),
            name_b: rna_b.name().to_string(),
            seq_a: rna_a.seq().to_vec(),
            seq_b: rna_b.seq().to_vec(),
            bps_a,
            bps_b,
            mapper_a,
            mapper_b,
            arc_matches,
            scoring,
            anchors,
        })
    }

    /// Creates an aligner that borrows this problem.
    pub fn aligner(&self) -> Result<SparseAligner<'_, F>> {
        SparseAligner::new(self)
    }
}
