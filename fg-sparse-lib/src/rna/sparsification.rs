//! Sparsification of the loops of one sequence.
//!
//! For every arc (and the pseudo-arc enclosing the whole sequence) only a subset of the inner
//! positions is kept: those likely to be unpaired inside the loop, and the right ends of nested
//! arcs likely to close a sub-structure of the loop.  The kept positions are renumbered
//! consecutively into matrix positions, with matrix position zero standing for the arc's left
//! end.  Positions that are not kept can only be skipped over by a gap.

use std::iter::once;

use itertools::Itertools;

use super::{
    base_pairs::{Arc, ArcRef, BasePairs},
    coords::{MatPos, SeqPos},
    rna_data::LoopProbabilities,
};

#[derive(Clone, Debug)]
struct ValidPos {
    seq_pos: SeqPos,
    unpaired: bool,
    arcs_right_adj: Vec<Arc>,
}

/// Maps between the sequence positions and the matrix positions of every loop of one sequence.
#[derive(Clone, Debug)]
pub struct SparsificationMapper {
    num_bps: usize,
    loops: Vec<Vec<ValidPos>>,
}

impl SparsificationMapper {
    /// Builds the valid positions of every loop closed by an arc of `bps` or by the pseudo-arc.
    ///
    /// # Arguments
    ///
    /// * `bps` - the candidate base pairs of the sequence
    /// * `probs` - the loop probabilities of the sequence
    /// * `prob_unpaired_in_loop_threshold` - the minimum probability for a position to be kept as
    ///    an unpaired position of a loop
    /// * `prob_basepair_in_loop_threshold` - the minimum probability for a nested arc to be kept
    ///    as a sub-structure of a loop
    pub fn new<P: LoopProbabilities>(
        bps: &BasePairs,
        probs: &P,
        prob_unpaired_in_loop_threshold: f64,
        prob_basepair_in_loop_threshold: f64,
    ) -> Self {
        let loops = bps
            .arcs()
            .iter()
            .map(|&arc| ArcRef::Real(arc))
            .chain(once(bps.pseudo_arc()))
            .map(|closing| {
                Self::valid_positions(
                    bps,
                    probs,
                    &closing,
                    prob_unpaired_in_loop_threshold,
                    prob_basepair_in_loop_threshold,
                )
            })
            .collect_vec();
        Self {
            num_bps: bps.num_bps(),
            loops,
        }
    }

    fn valid_positions<P: LoopProbabilities>(
        bps: &BasePairs,
        probs: &P,
        closing: &ArcRef,
        unpaired_threshold: f64,
        basepair_threshold: f64,
    ) -> Vec<ValidPos> {
        let mut positions = vec![ValidPos {
            seq_pos: closing.left(),
            unpaired: false,
            arcs_right_adj: Vec::new(),
        }];
        for pos in SeqPos::strictly_between(closing.left(), closing.right()) {
            let unpaired = probs.prob_unpaired_in_loop(pos, closing) >= unpaired_threshold;
            let arcs_right_adj = bps
                .right_adjlist(pos)
                .filter(|arc| {
                    arc.left() > closing.left()
                        && probs.prob_basepair_in_loop(&ArcRef::Real(*arc), closing)
                            >= basepair_threshold
                })
                .collect_vec();
            if unpaired || !arcs_right_adj.is_empty() {
                positions.push(ValidPos {
                    seq_pos: pos,
                    unpaired,
                    arcs_right_adj,
                });
            }
        }
        positions
    }

    #[inline(always)]
    fn loop_of(&self, arc: &ArcRef) -> &[ValidPos] {
        debug_assert!(!arc.is_empty(), "the empty arc has no loop");
        &self.loops[arc.slot(self.num_bps).0]
    }

    /// The number of valid matrix positions of the loop, including position zero.
    pub fn number_of_valid_mat_pos(&self, arc: &ArcRef) -> usize {
        self.loop_of(arc).len()
    }

    /// The last valid matrix position strictly inside the arc.
    pub fn last_mat_pos(&self, arc: &ArcRef) -> MatPos {
        MatPos(self.number_of_valid_mat_pos(arc) - 1)
    }

    /// The largest number of valid matrix positions over all loops.
    pub fn max_valid_mat_pos(&self) -> usize {
        self.loops.iter().map(Vec::len).max().unwrap_or(1)
    }

    #[inline(always)]
    pub fn pos_in_seq(&self, arc: &ArcRef, mat_pos: MatPos) -> SeqPos {
        self.loop_of(arc)[mat_pos.0].seq_pos
    }

    /// True if the position may be aligned as an unpaired base.
    #[inline(always)]
    pub fn pos_unpaired(&self, arc: &ArcRef, mat_pos: MatPos) -> bool {
        self.loop_of(arc)[mat_pos.0].unpaired
    }

    /// The valid nested arcs whose right end is the given matrix position.
    #[inline(always)]
    pub fn valid_arcs_right_adj(&self, arc: &ArcRef, mat_pos: MatPos) -> &[Arc] {
        &self.loop_of(arc)[mat_pos.0].arcs_right_adj
    }

    /// The last valid matrix position whose sequence position lies strictly before `pos`.
    pub fn mat_pos_before(&self, arc: &ArcRef, pos: SeqPos) -> MatPos {
        let positions = self.loop_of(arc);
        let count = positions.partition_point(|p| p.seq_pos < pos);
        debug_assert!(count > 0, "no valid position before {pos}");
        MatPos(count - 1)
    }
}

#[cfg(test)]
mod tests {
    use super::SparsificationMapper;
    use crate::rna::{
        base_pairs::{ArcRef, BasePairs},
        coords::{ArcIdx, MatPos, SeqPos},
        rna_data::RnaData,
    };
    use itertools::Itertools;
    use rstest::rstest;

    fn hairpin() -> (RnaData, BasePairs) {
        let rna = RnaData::from_structure("hp", b"GGAAACC", "((...))").unwrap();
        let bps = BasePairs::new(rna.len(), rna.bp_probs().to_vec(), 0.0005, None).unwrap();
        (rna, bps)
    }

    fn seq_positions(mapper: &SparsificationMapper, arc: &ArcRef) -> Vec<usize> {
        (0..mapper.number_of_valid_mat_pos(arc))
            .map(|k| mapper.pos_in_seq(arc, MatPos(k)).0)
            .collect_vec()
    }

    #[test]
    fn test_valid_positions() {
        let (rna, bps) = hairpin();
        let mapper = SparsificationMapper::new(&bps, &rna, 0.00005, 0.0001);
        let outer = ArcRef::Real(bps.arc(ArcIdx(0)));
        let inner = ArcRef::Real(bps.arc(ArcIdx(1)));
        assert_eq!(seq_positions(&mapper, &bps.pseudo_arc()), vec![0, 3, 4, 5, 6, 7]);
        assert_eq!(seq_positions(&mapper, &outer), vec![1, 3, 4, 5, 6]);
        assert_eq!(seq_positions(&mapper, &inner), vec![2, 3, 4, 5]);
        assert_eq!(mapper.max_valid_mat_pos(), 6);
        assert_eq!(mapper.last_mat_pos(&outer), MatPos(4));
    }

    #[test]
    fn test_unpaired_and_right_adjacent_arcs() {
        let (rna, bps) = hairpin();
        let mapper = SparsificationMapper::new(&bps, &rna, 0.00005, 0.0001);
        let pseudo = bps.pseudo_arc();
        assert!(mapper.pos_unpaired(&pseudo, MatPos(1)));
        assert!(!mapper.pos_unpaired(&pseudo, MatPos(4)));
        let arcs = mapper.valid_arcs_right_adj(&pseudo, MatPos(4));
        assert_eq!(arcs.len(), 1);
        assert_eq!((arcs[0].left().0, arcs[0].right().0), (2, 6));
        let arcs = mapper.valid_arcs_right_adj(&pseudo, MatPos(5));
        assert_eq!((arcs[0].left().0, arcs[0].right().0), (1, 7));
        assert!(mapper.valid_arcs_right_adj(&pseudo, MatPos(2)).is_empty());
        // the outer arc is not nested inside itself
        let outer = ArcRef::Real(bps.arc(ArcIdx(0)));
        assert!(mapper
            .valid_arcs_right_adj(&outer, MatPos(4))
            .iter()
            .all(|arc| arc.left().0 > 1));
    }

    #[rstest]
    #[case(1, 0)]
    #[case(3, 0)]
    #[case(4, 1)]
    #[case(6, 3)]
    #[case(8, 5)]
    fn test_mat_pos_before(#[case] pos: usize, #[case] expected: usize) {
        let (rna, bps) = hairpin();
        let mapper = SparsificationMapper::new(&bps, &rna, 0.00005, 0.0001);
        assert_eq!(
            mapper.mat_pos_before(&bps.pseudo_arc(), SeqPos(pos)),
            MatPos(expected)
        );
    }

    #[test]
    fn test_zero_thresholds_keep_every_position() {
        let (rna, bps) = hairpin();
        let mapper = SparsificationMapper::new(&bps, &rna, 0.0, 0.0);
        assert_eq!(seq_positions(&mapper, &bps.pseudo_arc()), (0..=7).collect_vec());
        let outer = ArcRef::Real(bps.arc(ArcIdx(0)));
        assert_eq!(seq_positions(&mapper, &outer), (1..=6).collect_vec());
    }

    #[test]
    fn test_dense_probabilities() {
        let len = 60;
        let pairs = (1..=len)
            .flat_map(|i| (i + 4..=len).map(move |j| (i, j, 0.01)))
            .collect_vec();
        let rna = RnaData::new("dense", &vec![b'A'; len], pairs).unwrap();
        let bps = BasePairs::new(len, rna.bp_probs().to_vec(), 0.0005, None).unwrap();
        assert_eq!(bps.num_bps(), 56 * 57 / 2);
        let mapper = SparsificationMapper::new(&bps, &rna, 0.00005, 0.0001);
        let pseudo = bps.pseudo_arc();
        assert_eq!(seq_positions(&mapper, &pseudo), (0..=len).collect_vec());
        assert_eq!(mapper.max_valid_mat_pos(), len + 1);
        assert_eq!(mapper.valid_arcs_right_adj(&pseudo, MatPos(len)).len(), 56);
    }
}
