use bio::alignment::pairwise::MatchFunc;

use crate::{
    align::score::Score,
    rna::{
        base_pairs::{Arc, BasePairs},
        coords::{SeqPos, Side},
    },
};

/// The scalar scoring parameters.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct ScoringParams {
    /// Score for deleting a single base outside of an arc deletion
    pub indel: Score,
    /// Score for deleting a single base inside a deleted loop
    pub indel_loop: Score,
    /// Score for opening a gap
    pub indel_opening: Score,
    /// Score for opening a gap that deletes a loop
    pub indel_opening_loop: Score,
    /// Weight of the structure contribution of an arc with probability one
    pub struct_weight: Score,
    /// Contribution of the sequence similarity of matched arc ends, in percent
    pub tau_factor: Score,
    /// Expected base pair probability; arcs at this probability have weight zero.  If not given,
    /// `1 / (2 * len)` is used for a sequence of length `len`.
    pub exp_prob: Option<f64>,
}

/// Details of scoring are encapsulated in this structure.
///
/// Unpaired bases are scored with `match_fn`.  An arc is weighted by its probability `p` as
/// `struct_weight * (1 - ln(p) / ln(p_exp))`, so likely arcs get a bonus and arcs at the expected
/// probability `p_exp` get none.  Gaps follow an affine model with separate costs inside deleted
/// loops.
#[derive(Clone, Debug)]
pub struct Scoring<F: MatchFunc> {
    params: ScoringParams,
    match_fn: F,
    seq_a: Vec<u8>,
    seq_b: Vec<u8>,
    weights_a: Vec<Score>,
    weights_b: Vec<Score>,
}

/// The expected probability of a base pair in a sequence of the given length.
pub fn prob_exp(len: usize) -> f64 {
    1.0 / (2.0 * len.max(1) as f64)
}

/// Converts a base pair probability into a structure weight.
pub fn prob_to_weight(prob: f64, prob_exp: f64, struct_weight: Score) -> Score {
    if prob <= 0.0 {
        return 0;
    }
    let weight = f64::from(struct_weight) * (1.0 - prob.ln() / prob_exp.ln());
    weight.round() as Score
}

impl<F: MatchFunc> Scoring<F> {
    /// Create new Scoring instance for aligning the two given sequences.
    ///
    /// # Arguments
    ///
    /// * `params` - the gap and structure parameters (gap scores should not be positive)
    /// * `match_fn` - function that returns the score for aligning two unpaired bases
    ///    (see also [`bio::alignment::pairwise::Scoring`](struct.Scoring.html))
    /// * `seq_a` - the first sequence
    /// * `seq_b` - the second sequence
    /// * `bps_a` - the base pairs of the first sequence
    /// * `bps_b` - the base pairs of the second sequence
    pub fn new(
        params: ScoringParams,
        match_fn: F,
        seq_a: &[u8],
        seq_b: &[u8],
        bps_a: &BasePairs,
        bps_b: &BasePairs,
    ) -> Self {
        assert!(params.indel <= 0, "indel can't be positive");
        assert!(params.indel_loop <= 0, "indel_loop can't be positive");
        assert!(params.indel_opening <= 0, "indel_opening can't be positive");
        assert!(
            params.indel_opening_loop <= 0,
            "indel_opening_loop can't be positive"
        );

        let weights = |bps: &BasePairs| {
            let exp = params.exp_prob.unwrap_or_else(|| prob_exp(bps.len()));
            bps.arcs()
                .iter()
                .map(|arc| prob_to_weight(bps.prob(arc.idx()), exp, params.struct_weight))
                .collect::<Vec<Score>>()
        };

        Self {
            params,
            match_fn,
            seq_a: seq_a.to_vec(),
            seq_b: seq_b.to_vec(),
            weights_a: weights(bps_a),
            weights_b: weights(bps_b),
        }
    }

    pub fn params(&self) -> &ScoringParams {
        &self.params
    }

    /// The score for aligning unpaired position `i` of A to unpaired position `j` of B.
    #[inline(always)]
    pub fn basematch(&self, i: SeqPos, j: SeqPos) -> Score {
        self.match_fn
            .score(self.seq_a[i.0 - 1], self.seq_b[j.0 - 1])
    }

    /// The score for deleting `pos` of the given sequence.
    #[inline(always)]
    pub fn gap_x(&self, _pos: SeqPos, _side: Side) -> Score {
        self.params.indel
    }

    #[inline(always)]
    pub fn indel_opening(&self) -> Score {
        self.params.indel_opening
    }

    #[inline(always)]
    pub fn indel_opening_loop(&self) -> Score {
        self.params.indel_opening_loop
    }

    /// Converts a gap score computed with the regular indel cost into one computed with the loop
    /// indel cost.
    pub fn loop_indel_score(&self, gap_score: Score) -> Score {
        if self.params.indel == 0 {
            return gap_score;
        }
        let scaled =
            f64::from(gap_score) * f64::from(self.params.indel_loop) / f64::from(self.params.indel);
        scaled.round() as Score
    }

    /// The structure weight of an arc.
    pub fn weight(&self, arc: &Arc, side: Side) -> Score {
        match side {
            Side::A => self.weights_a[arc.idx().0],
            Side::B => self.weights_b[arc.idx().0],
        }
    }

    /// The score for deleting an arc of the given sequence: its weight plus deleting both ends.
    pub fn arc_del(&self, arc: &Arc, side: Side) -> Score {
        self.weight(arc, side) + self.gap_x(arc.left(), side) + self.gap_x(arc.right(), side)
    }

    /// The score for matching `arc_a` with `arc_b`: both structure weights plus the sequence
    /// similarity of the matched ends scaled by `tau_factor` percent.
    pub fn arcmatch(&self, arc_a: &Arc, arc_b: &Arc) -> Score {
        let sequence = self.basematch(arc_a.left(), arc_b.left())
            + self.basematch(arc_a.right(), arc_b.right());
        self.weight(arc_a, Side::A)
            + self.weight(arc_b, Side::B)
            + (self.params.tau_factor * sequence) / 100
    }
}

#[cfg(test)]
pub mod tests {
    use super::{prob_exp, prob_to_weight, Scoring, ScoringParams};
    use crate::rna::{
        base_pairs::BasePairs,
        coords::{ArcIdx, SeqPos, Side},
    };
    use bio::alignment::pairwise::MatchParams;
    use rstest::rstest;

    pub fn default_params() -> ScoringParams {
        ScoringParams {
            indel: -350,
            indel_loop: -350,
            indel_opening: -600,
            indel_opening_loop: -900,
            struct_weight: 200,
            tau_factor: 100,
            exp_prob: None,
        }
    }

    fn scoring(params: ScoringParams) -> Scoring<MatchParams> {
        let bps_a = BasePairs::new(4, vec![(1, 4, 1.0)], 0.0, None).unwrap();
        let bps_b = BasePairs::new(5, vec![(1, 5, 0.5), (2, 4, 1.0)], 0.0, None).unwrap();
        Scoring::new(
            params,
            MatchParams::new(50, 0),
            b"GAAC",
            b"GGAUC",
            &bps_a,
            &bps_b,
        )
    }

    #[rstest]
    #[case(1.0, 0.125, 200, 200)]
    #[case(0.125, 0.125, 200, 0)]
    #[case(0.5, 0.125, 200, 133)]
    #[case(0.0, 0.125, 200, 0)]
    fn test_prob_to_weight(
        #[case] prob: f64,
        #[case] exp: f64,
        #[case] struct_weight: i32,
        #[case] expected: i32,
    ) {
        assert_eq!(prob_to_weight(prob, exp, struct_weight), expected);
    }

    #[test]
    fn test_prob_exp() {
        assert!((prob_exp(4) - 0.125).abs() < f64::EPSILON);
        assert!((prob_exp(0) - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_basematch() {
        let scoring = scoring(default_params());
        assert_eq!(scoring.basematch(SeqPos(1), SeqPos(1)), 50);
        assert_eq!(scoring.basematch(SeqPos(2), SeqPos(1)), 0);
        assert_eq!(scoring.gap_x(SeqPos(2), Side::B), -350);
    }

    #[rstest]
    #[case(-350, -350, -700, -700)]
    #[case(-350, -175, -700, -350)]
    #[case(-300, -100, -700, -233)]
    #[case(0, -100, 0, 0)]
    fn test_loop_indel_score(
        #[case] indel: i32,
        #[case] indel_loop: i32,
        #[case] gap: i32,
        #[case] expected: i32,
    ) {
        let params = ScoringParams {
            indel,
            indel_loop,
            ..default_params()
        };
        assert_eq!(scoring(params).loop_indel_score(gap), expected);
    }

    #[test]
    fn test_arc_scores() {
        let scoring = scoring(default_params());
        let bps_a = BasePairs::new(4, vec![(1, 4, 1.0)], 0.0, None).unwrap();
        let bps_b = BasePairs::new(5, vec![(1, 5, 0.5), (2, 4, 1.0)], 0.0, None).unwrap();
        let arc_a = bps_a.arc(ArcIdx(0));
        let outer_b = bps_b.arc(ArcIdx(0));
        let inner_b = bps_b.arc(ArcIdx(1));
        // exp prob for length 5 is 0.1: weight(0.5) = 200 * (1 - ln 0.5 / ln 0.1)
        assert_eq!(scoring.weight(&outer_b, Side::B), 140);
        assert_eq!(scoring.weight(&inner_b, Side::B), 200);
        assert_eq!(scoring.arc_del(&arc_a, Side::A), 200 - 700);
        // G-G and C-C match
        assert_eq!(scoring.arcmatch(&arc_a, &outer_b), 200 + 140 + 100);
        // G-G and C-U
        assert_eq!(scoring.arcmatch(&arc_a, &inner_b), 200 + 200 + 50);
    }
}
