use bio::alignment::pairwise::MatchFunc;

use crate::{
    align::{
        matrix::ArcPairMatrix,
        score::{InftyScore, Score},
        scoring::Scoring,
    },
    rna::{base_pairs::ArcRef, coords::Side},
};

/// How the recursion sees the scoring and the D matrix.
///
/// The default view passes both through unchanged.  Alternative views shift scores, e.g. to
/// search for length-normalized alignments by parametric optimization.
pub trait ScoringView<F: MatchFunc> {
    fn scoring(&self) -> &Scoring<F>;

    /// The D matrix entry of the arc pair as seen through this view.
    fn d(&self, d_mat: &ArcPairMatrix, arc_a: &ArcRef, arc_b: &ArcRef) -> InftyScore;

    /// The D matrix entry for `arc_x` of sequence `side` and `arc_y` of the other sequence.
    fn d_side(&self, d_mat: &ArcPairMatrix, arc_x: &ArcRef, arc_y: &ArcRef, side: Side) -> InftyScore {
        match side {
            Side::A => self.d(d_mat, arc_x, arc_y),
            Side::B => self.d(d_mat, arc_y, arc_x),
        }
    }
}

/// The unmodified view.
pub struct DefaultScoringView<'a, F: MatchFunc> {
    scoring: &'a Scoring<F>,
}

impl<'a, F: MatchFunc> DefaultScoringView<'a, F> {
    pub fn new(scoring: &'a Scoring<F>) -> Self {
        Self { scoring }
    }
}

impl<F: MatchFunc> ScoringView<F> for DefaultScoringView<'_, F> {
    fn scoring(&self) -> &Scoring<F> {
        self.scoring
    }

    #[inline(always)]
    fn d(&self, d_mat: &ArcPairMatrix, arc_a: &ArcRef, arc_b: &ArcRef) -> InftyScore {
        d_mat.get(arc_a, arc_b)
    }
}

/// A view that charges `lambda` per position covered by the two arcs of every D entry.
pub struct ModifiedScoringView<'a, F: MatchFunc> {
    scoring: &'a Scoring<F>,
    lambda: Score,
}

impl<'a, F: MatchFunc> ModifiedScoringView<'a, F> {
    pub fn new(scoring: &'a Scoring<F>, lambda: Score) -> Self {
        Self { scoring, lambda }
    }
}

impl<F: MatchFunc> ScoringView<F> for ModifiedScoringView<'_, F> {
    fn scoring(&self) -> &Scoring<F> {
        self.scoring
    }

    fn d(&self, d_mat: &ArcPairMatrix, arc_a: &ArcRef, arc_b: &ArcRef) -> InftyScore {
        let covered = (arc_a.span() + arc_b.span()) as Score;
        d_mat.get(arc_a, arc_b) + -(self.lambda * covered)
    }
}
