use bio::alignment::pairwise::MatchFunc;

use crate::{
    align::{matrix::Matrix, score::InftyScore, scoring::Scoring},
    rna::{
        anchors::AnchorConstraints,
        coords::{SeqPos, Side},
    },
};

/// Precomputed costs of deleting every contiguous stretch of positions, per sequence.
///
/// The table entry `(left, right)` holds the summed gap score of the positions strictly between
/// `left` and `right`.  It is negative infinity as soon as the stretch contains a position that
/// anchor constraints force to be aligned.
#[derive(Clone, Debug)]
pub struct GapCosts {
    table_a: Matrix<SeqPos, SeqPos, InftyScore>,
    table_b: Matrix<SeqPos, SeqPos, InftyScore>,
}

impl GapCosts {
    pub fn new(len_a: usize, len_b: usize) -> Self {
        Self {
            table_a: Matrix::new(len_a + 3, len_a + 3, InftyScore::NEG_INFTY),
            table_b: Matrix::new(len_b + 3, len_b + 3, InftyScore::NEG_INFTY),
        }
    }

    /// (Re)computes the table of the given sequence.
    pub fn compute<F: MatchFunc>(
        &mut self,
        side: Side,
        scoring: &Scoring<F>,
        anchors: &AnchorConstraints,
    ) {
        let len = anchors.len(side);
        let table = match side {
            Side::A => &mut self.table_a,
            Side::B => &mut self.table_b,
        };
        table.fill(len + 3, len + 3, InftyScore::NEG_INFTY);

        for left in (0..=len).map(SeqPos) {
            table.set(left, left, InftyScore::ZERO);
            table.set(left, left.next(), InftyScore::ZERO);
            let mut gap_score = InftyScore::ZERO;
            for last in SeqPos::after_up_to(left, SeqPos(len)) {
                if anchors.aligned_pos(last, side) {
                    gap_score = InftyScore::NEG_INFTY;
                } else {
                    gap_score += scoring.gap_x(last, side);
                }
                table.set(left, last.next(), gap_score);
            }
        }
    }

    /// The score of deleting all positions strictly between `left` and `right` (`left < right`).
    #[inline(always)]
    pub fn between(&self, left: SeqPos, right: SeqPos, side: Side) -> InftyScore {
        debug_assert!(left < right, "gap cost lookup requires {left} < {right}");
        match side {
            Side::A => self.table_a.get(left, right),
            Side::B => self.table_b.get(left, right),
        }
    }
}
