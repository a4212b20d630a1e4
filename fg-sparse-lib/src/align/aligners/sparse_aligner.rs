//! The sparsified Sankoff recursion.
//!
//! For every admissible pair of arcs `(a, b)`, processed from the inside out, the loops enclosed
//! by the two arcs are aligned with an affine-gap recursion over their valid matrix positions
//! (matrices M, E and F), and the best score is memoized in D.  Arcs deleted from one side only
//! are handled by the IA/IB matrices, whose final entries are memoized in IAD/IBD.  The top level
//! finally aligns the two pseudo-arcs enclosing the whole sequences.
//!
//! M, E, F, IA and IB are transient: they are overwritten for every arc pair and recomputed on
//! demand by the traceback.  D, IAD and IBD persist for the lifetime of the aligner.

use anyhow::{bail, ensure, Result};
use bio::alignment::pairwise::MatchFunc;
use log::{debug, trace};

use super::{AlignmentProblem, Options};
use crate::{
    align::{
        alignment::Alignment,
        gap_costs::GapCosts,
        matrix::{ArcPairMatrix, Matrix},
        score::{InftyScore, Score},
        scoring::Scoring,
        view::{DefaultScoringView, ScoringView},
    },
    rna::{
        anchors::AnchorConstraints,
        arc_matches::ArcMatches,
        base_pairs::{Arc, ArcRef, BasePairs},
        coords::{ArcSlot, MatPos, SeqPos, Side},
        sparsification::SparsificationMapper,
    },
};

type LoopMatrix = Matrix<MatPos, MatPos, InftyScore>;

/// Aligns two RNAs with the sparsified Sankoff recursion.
pub struct SparseAligner<'a, F: MatchFunc> {
    pub(crate) opts: Options,
    pub(crate) scoring: &'a Scoring<F>,
    pub(crate) bps_a: &'a BasePairs,
    pub(crate) bps_b: &'a BasePairs,
    pub(crate) mapper_a: &'a SparsificationMapper,
    pub(crate) mapper_b: &'a SparsificationMapper,
    arc_matches: &'a ArcMatches,
    anchors: &'a AnchorConstraints,
    gap_costs: GapCosts,
    pub(crate) d_mat: ArcPairMatrix,
    pub(crate) iad_mat: ArcPairMatrix,
    pub(crate) ibd_mat: ArcPairMatrix,
    ia_mat: Matrix<MatPos, ArcSlot, InftyScore>,
    ib_mat: Matrix<ArcSlot, MatPos, InftyScore>,
    pub(crate) m_mat: LoopMatrix,
    pub(crate) e_mat: LoopMatrix,
    pub(crate) f_mat: LoopMatrix,
    d_created: bool,
    pub(crate) alignment: Alignment,
}

impl<'a, F: MatchFunc> SparseAligner<'a, F> {
    /// Creates an aligner for the given problem; fails if the problem's options request an
    /// unsupported feature.
    pub fn new(problem: &'a AlignmentProblem<F>) -> Result<Self> {
        problem.opts().validate()?;
        let bps_a = problem.bps_a();
        let bps_b = problem.bps_b();
        let rows = problem.mapper_a().max_valid_mat_pos();
        let cols = problem.mapper_b().max_valid_mat_pos();
        Ok(Self {
            opts: *problem.opts(),
            scoring: problem.scoring(),
            bps_a,
            bps_b,
            mapper_a: problem.mapper_a(),
            mapper_b: problem.mapper_b(),
            arc_matches: problem.arc_matches(),
            anchors: problem.anchors(),
            gap_costs: GapCosts::new(bps_a.len(), bps_b.len()),
            d_mat: ArcPairMatrix::new(bps_a.num_bps(), bps_b.num_bps()),
            iad_mat: ArcPairMatrix::new(bps_a.num_bps(), bps_b.num_bps()),
            ibd_mat: ArcPairMatrix::new(bps_a.num_bps(), bps_b.num_bps()),
            ia_mat: Matrix::new(rows, bps_b.num_bps() + 1, InftyScore::NEG_INFTY),
            ib_mat: Matrix::new(bps_a.num_bps() + 1, cols, InftyScore::NEG_INFTY),
            m_mat: Matrix::new(rows, cols, InftyScore::NEG_INFTY),
            e_mat: Matrix::new(rows, cols, InftyScore::NEG_INFTY),
            f_mat: Matrix::new(rows, cols, InftyScore::NEG_INFTY),
            d_created: false,
            alignment: Alignment::new(bps_a.len(), bps_b.len()),
        })
    }

    pub fn alignment(&self) -> &Alignment {
        &self.alignment
    }

    pub fn scoring(&self) -> &'a Scoring<F> {
        self.scoring
    }

    /// The D matrix entry of two arcs, or negative infinity if it was never computed.
    pub fn d(&self, arc_a: &ArcRef, arc_b: &ArcRef) -> InftyScore {
        self.d_mat.get(arc_a, arc_b)
    }

    #[inline(always)]
    pub(crate) fn bps(&self, side: Side) -> &'a BasePairs {
        match side {
            Side::A => self.bps_a,
            Side::B => self.bps_b,
        }
    }

    #[inline(always)]
    pub(crate) fn mapper(&self, side: Side) -> &'a SparsificationMapper {
        match side {
            Side::A => self.mapper_a,
            Side::B => self.mapper_b,
        }
    }

    /// Computes the gap cost tables of both sequences.
    pub fn compute_gap_costs(&mut self) {
        if !self.anchors.is_empty() {
            debug!("Anchor constraints restrict the gaps of both sequences");
        }
        for side in [Side::A, Side::B] {
            self.gap_costs.compute(side, self.scoring, self.anchors);
        }
    }

    /// The cost of deleting the positions strictly between `left` and `right`.
    #[inline(always)]
    pub fn gap_cost_between(&self, left: SeqPos, right: SeqPos, side: Side) -> InftyScore {
        self.gap_costs.between(left, right, side)
    }

    /// Like [`Self::gap_cost_between`], with the finite cost converted to loop indel costs.
    #[inline(always)]
    pub(crate) fn loop_gap_cost_between(
        &self,
        left: SeqPos,
        right: SeqPos,
        side: Side,
        scoring: &Scoring<F>,
    ) -> InftyScore {
        self.gap_cost_between(left, right, side)
            .map(|gap| scoring.loop_indel_score(gap))
    }

    /// The cost of deleting `pos` together with the positions skipped since `prev`; negative
    /// infinity if `pos` is anchored.
    #[inline(always)]
    pub(crate) fn step_gap_cost(
        &self,
        prev: SeqPos,
        pos: SeqPos,
        side: Side,
        scoring: &Scoring<F>,
    ) -> InftyScore {
        if self.anchors.aligned_pos(pos, side) {
            InftyScore::NEG_INFTY
        } else {
            self.gap_cost_between(prev, pos, side) + scoring.gap_x(pos, side)
        }
    }

    /// The cost of deleting both ends of `arc`; negative infinity if either end is anchored.
    #[inline(always)]
    pub(crate) fn arc_del_cost(&self, arc: &Arc, side: Side, scoring: &Scoring<F>) -> InftyScore {
        if self.anchors.aligned_pos(arc.left(), side) || self.anchors.aligned_pos(arc.right(), side)
        {
            InftyScore::NEG_INFTY
        } else {
            InftyScore::new(scoring.arc_del(arc, side))
        }
    }

    /// IA(i, arc_y) for side A, IB(arc_y, i) for side B.
    #[inline(always)]
    pub(crate) fn ix(&self, side: Side, i: MatPos, arc_y: &ArcRef) -> InftyScore {
        match side {
            Side::A => self.ia_mat.get(i, arc_y.slot(self.bps_b.num_bps())),
            Side::B => self.ib_mat.get(arc_y.slot(self.bps_a.num_bps()), i),
        }
    }

    #[inline(always)]
    fn set_ix(&mut self, side: Side, i: MatPos, arc_y: &ArcRef, value: InftyScore) {
        match side {
            Side::A => self
                .ia_mat
                .set(i, arc_y.slot(self.bps_b.num_bps()), value),
            Side::B => self
                .ib_mat
                .set(arc_y.slot(self.bps_a.num_bps()), i, value),
        }
    }

    /// IAD(arc_x, arc_y) for side A, IBD(arc_y, arc_x) for side B.
    #[inline(always)]
    pub(crate) fn ixd(&self, arc_x: &ArcRef, arc_y: &ArcRef, side: Side) -> InftyScore {
        match side {
            Side::A => self.iad_mat.get_side(arc_x, arc_y, side),
            Side::B => self.ibd_mat.get_side(arc_x, arc_y, side),
        }
    }

    /// The score of aligning the positions of `arc_x` (of sequence `side`) up to matrix position
    /// `i` while the loop of `arc_y` (of the other sequence) is aligned inside a nested arc of
    /// `arc_x` whose ends are deleted.
    pub(crate) fn compute_ix<V: ScoringView<F>>(
        &self,
        side: Side,
        arc_x: &ArcRef,
        arc_y: &ArcRef,
        i: MatPos,
        sv: &V,
    ) -> InftyScore {
        let scoring = sv.scoring();
        let mapper = self.mapper(side);
        let xl = arc_x.left();
        let i_seq = mapper.pos_in_seq(arc_x, i);
        let i_prev_seq = mapper.pos_in_seq(arc_x, i.prev());

        let gap = self.step_gap_cost(i_prev_seq, i_seq, side, scoring)
            .map(|g| scoring.loop_indel_score(g));
        let mut max_score = self.ix(side, i.prev(), arc_y) + gap;

        for nested in mapper.valid_arcs_right_adj(arc_x, i) {
            let nested_ref = ArcRef::Real(*nested);
            let gap = self.loop_gap_cost_between(xl, nested.left(), side, scoring);
            let arc_del = self.arc_del_cost(nested, side, scoring);
            // extend the deletion into the nested arc
            max_score.improve(self.ixd(&nested_ref, arc_y, side) + arc_del + gap);
            // align the loop of arc_y to the loop of the nested arc
            max_score.improve(
                sv.d_side(&self.d_mat, &nested_ref, arc_y, side)
                    + arc_del
                    + gap
                    + scoring.indel_opening_loop(),
            );
        }
        max_score
    }

    pub(crate) fn fill_ix_entries<V: ScoringView<F>>(
        &mut self,
        side: Side,
        arc_x: &ArcRef,
        arc_y: &ArcRef,
        sv: &V,
    ) {
        let start = if self.opts.multiloop_deletion > 0 && arc_y.is_empty() {
            InftyScore::ZERO
        } else {
            InftyScore::NEG_INFTY
        };
        self.set_ix(side, MatPos::ZERO, arc_y, start);
        let num_pos = self.mapper(side).number_of_valid_mat_pos(arc_x);
        for i in MatPos::inner(num_pos) {
            let score = self.compute_ix(side, arc_x, arc_y, i, sv);
            self.set_ix(side, i, arc_y, score);
        }
    }

    /// Fills IA for the loop of `arc_a` against `arc_b`.
    pub fn fill_ia_entries<V: ScoringView<F>>(&mut self, arc_a: &ArcRef, arc_b: &ArcRef, sv: &V) {
        self.fill_ix_entries(Side::A, arc_a, arc_b, sv);
    }

    /// Fills IB for the loop of `arc_b` against `arc_a`.
    pub fn fill_ib_entries<V: ScoringView<F>>(&mut self, arc_a: &ArcRef, arc_b: &ArcRef, sv: &V) {
        self.fill_ix_entries(Side::B, arc_b, arc_a, sv);
    }

    /// The score of ending in a deletion of position `i` of A.
    fn compute_e_entry(
        &self,
        arc_a: &ArcRef,
        i: MatPos,
        j: MatPos,
        i_seq: SeqPos,
        i_prev_seq: SeqPos,
        scoring: &Scoring<F>,
    ) -> InftyScore {
        if i_seq <= arc_a.left() {
            return InftyScore::NEG_INFTY;
        }
        let gap = self.step_gap_cost(i_prev_seq, i_seq, Side::A, scoring);
        let extend = gap + self.e_mat.get(i.prev(), j);
        let open = self.m_mat.get(i.prev(), j) + gap + scoring.indel_opening();
        extend.max(open)
    }

    /// The score of ending in an insertion of position `j` of B.
    fn compute_f_entry(
        &self,
        arc_b: &ArcRef,
        i: MatPos,
        j: MatPos,
        j_seq: SeqPos,
        j_prev_seq: SeqPos,
        scoring: &Scoring<F>,
    ) -> InftyScore {
        if j_seq <= arc_b.left() {
            return InftyScore::NEG_INFTY;
        }
        let gap = self.step_gap_cost(j_prev_seq, j_seq, Side::B, scoring);
        let extend = gap + self.f_mat.get(i, j.prev());
        let open = self.m_mat.get(i, j.prev()) + gap + scoring.indel_opening();
        extend.max(open)
    }

    /// The gap opening score charged when moving from `prev` to `next` skips positions.
    #[inline(always)]
    pub(crate) fn skip_opening(prev: SeqPos, next: SeqPos, scoring: &Scoring<F>) -> Score {
        if prev.skips_to(next) {
            scoring.indel_opening()
        } else {
            0
        }
    }

    fn init_m_e_f(&mut self, arc_a: &ArcRef, arc_b: &ArcRef, scoring: &Scoring<F>) {
        let mapper_a = self.mapper_a;
        let mapper_b = self.mapper_b;
        self.m_mat.set(MatPos::ZERO, MatPos::ZERO, InftyScore::ZERO);
        self.e_mat.set(MatPos::ZERO, MatPos::ZERO, InftyScore::NEG_INFTY);
        self.f_mat.set(MatPos::ZERO, MatPos::ZERO, InftyScore::NEG_INFTY);

        let mut indel = InftyScore::new(scoring.indel_opening());
        for i in MatPos::inner(mapper_a.number_of_valid_mat_pos(arc_a)) {
            let i_seq = mapper_a.pos_in_seq(arc_a, i);
            let i_prev_seq = mapper_a.pos_in_seq(arc_a, i.prev());
            indel = indel + self.step_gap_cost(i_prev_seq, i_seq, Side::A, scoring);
            self.e_mat.set(i, MatPos::ZERO, indel);
            self.f_mat.set(i, MatPos::ZERO, InftyScore::NEG_INFTY);
            self.m_mat.set(i, MatPos::ZERO, indel);
        }

        let mut indel = InftyScore::new(scoring.indel_opening());
        for j in MatPos::inner(mapper_b.number_of_valid_mat_pos(arc_b)) {
            let j_seq = mapper_b.pos_in_seq(arc_b, j);
            let j_prev_seq = mapper_b.pos_in_seq(arc_b, j.prev());
            indel = indel + self.step_gap_cost(j_prev_seq, j_seq, Side::B, scoring);
            self.e_mat.set(MatPos::ZERO, j, InftyScore::NEG_INFTY);
            self.f_mat.set(MatPos::ZERO, j, indel);
            self.m_mat.set(MatPos::ZERO, j, indel);
        }
    }

    /// The score of the domain deletion of `arc` (of sequence `side`) ending at the current
    /// position, not counting the prefix alignment before the arc.  Negative infinity if the arc
    /// is too short to be deleted as a domain.
    pub(crate) fn domain_indel_score<V: ScoringView<F>>(
        &self,
        enclosing: &ArcRef,
        arc: &Arc,
        side: Side,
        sv: &V,
    ) -> (MatPos, InftyScore) {
        let scoring = sv.scoring();
        let mapper = self.mapper(side);
        let before = mapper.mat_pos_before(enclosing, arc.left());
        if arc.span() < self.opts.multiloop_deletion {
            return (before, InftyScore::NEG_INFTY);
        }
        let before_seq = mapper.pos_in_seq(enclosing, before);
        let score = sv.d_side(&self.d_mat, &ArcRef::Real(*arc), &ArcRef::Empty, side)
            + self.loop_gap_cost_between(before_seq, arc.left(), side, scoring)
            + self.arc_del_cost(arc, side, scoring)
            + scoring.indel_opening_loop();
        (before, score)
    }

    /// The score of matching `arc_a` with `arc_b`, not counting the prefix alignment before the
    /// arcs, together with the matrix positions before the arcs and the opening scores charged
    /// when the jumps to the arcs skip positions.
    pub(crate) fn arc_match_score<V: ScoringView<F>>(
        &self,
        enclosing_a: &ArcRef,
        enclosing_b: &ArcRef,
        arc_a: &Arc,
        arc_b: &Arc,
        sv: &V,
    ) -> ArcMatchScore {
        let scoring = sv.scoring();
        let before_a = self.mapper_a.mat_pos_before(enclosing_a, arc_a.left());
        let before_b = self.mapper_b.mat_pos_before(enclosing_b, arc_b.left());
        let before_a_seq = self.mapper_a.pos_in_seq(enclosing_a, before_a);
        let before_b_seq = self.mapper_b.pos_in_seq(enclosing_b, before_b);
        let score = self.gap_cost_between(before_a_seq, arc_a.left(), Side::A)
            + self.gap_cost_between(before_b_seq, arc_b.left(), Side::B)
            + sv.d(&self.d_mat, &ArcRef::Real(*arc_a), &ArcRef::Real(*arc_b))
            + scoring.arcmatch(arc_a, arc_b);
        ArcMatchScore {
            before_a,
            before_b,
            before_a_seq,
            before_b_seq,
            opening_a: Self::skip_opening(before_a_seq, arc_a.left(), scoring),
            opening_b: Self::skip_opening(before_b_seq, arc_b.left(), scoring),
            score,
        }
    }

    /// Computes M(i, j) of the loops of `arc_a` and `arc_b`, storing E(i, j) and F(i, j) on the
    /// way.
    fn compute_m_entry<V: ScoringView<F>>(
        &mut self,
        arc_a: &ArcRef,
        arc_b: &ArcRef,
        i: MatPos,
        j: MatPos,
        sv: &V,
    ) -> InftyScore {
        let scoring = sv.scoring();
        let mapper_a = self.mapper_a;
        let mapper_b = self.mapper_b;
        let i_seq = mapper_a.pos_in_seq(arc_a, i);
        let j_seq = mapper_b.pos_in_seq(arc_b, j);
        let i_prev_seq = mapper_a.pos_in_seq(arc_a, i.prev());
        let j_prev_seq = mapper_b.pos_in_seq(arc_b, j.prev());
        let opening_a = Self::skip_opening(i_prev_seq, i_seq, scoring);
        let opening_b = Self::skip_opening(j_prev_seq, j_seq, scoring);

        let mut max_score = InftyScore::NEG_INFTY;

        // base match
        if mapper_a.pos_unpaired(arc_a, i) && mapper_b.pos_unpaired(arc_b, j) {
            let gap_match = self.gap_cost_between(i_prev_seq, i_seq, Side::A)
                + self.gap_cost_between(j_prev_seq, j_seq, Side::B)
                + scoring.basematch(i_seq, j_seq);
            max_score.improve(gap_match + opening_b + self.e_mat.get(i.prev(), j.prev()));
            max_score.improve(gap_match + opening_a + self.f_mat.get(i.prev(), j.prev()));
            max_score.improve(
                gap_match + opening_a + opening_b + self.m_mat.get(i.prev(), j.prev()),
            );
        }

        // base deletion and insertion
        let e = self.compute_e_entry(arc_a, i, j, i_seq, i_prev_seq, scoring);
        self.e_mat.set(i, j, e);
        max_score.improve(e);
        let f = self.compute_f_entry(arc_b, i, j, j_seq, j_prev_seq, scoring);
        self.f_mat.set(i, j, f);
        max_score.improve(f);

        let arcs_a = mapper_a.valid_arcs_right_adj(arc_a, i);
        let arcs_b = mapper_b.valid_arcs_right_adj(arc_b, j);

        if self.opts.multiloop_deletion > 0 {
            for nested_a in arcs_a {
                let (before, score) = self.domain_indel_score(arc_a, nested_a, Side::A, sv);
                max_score.improve(score + self.m_mat.get(before, j));
            }
            for nested_b in arcs_b {
                let (before, score) = self.domain_indel_score(arc_b, nested_b, Side::B, sv);
                max_score.improve(score + self.m_mat.get(i, before));
            }
        }

        // arc match
        for nested_a in arcs_a {
            for nested_b in arcs_b {
                let am = self.arc_match_score(arc_a, arc_b, nested_a, nested_b, sv);
                let mut score = am.score
                    + am.opening_a
                    + am.opening_b
                    + self.m_mat.get(am.before_a, am.before_b);
                score.improve(am.score + am.opening_b + self.e_mat.get(am.before_a, am.before_b));
                score.improve(am.score + am.opening_a + self.f_mat.get(am.before_a, am.before_b));
                max_score.improve(score);
            }
        }

        max_score
    }

    /// Fills M, E and F for the loops enclosed by `arc_a` and `arc_b`.
    pub fn fill_m_entries<V: ScoringView<F>>(&mut self, arc_a: &ArcRef, arc_b: &ArcRef, sv: &V) {
        self.init_m_e_f(arc_a, arc_b, sv.scoring());
        let num_pos_a = self.mapper_a.number_of_valid_mat_pos(arc_a);
        let num_pos_b = self.mapper_b.number_of_valid_mat_pos(arc_b);
        for i in MatPos::inner(num_pos_a) {
            for j in MatPos::inner(num_pos_b) {
                let score = self.compute_m_entry(arc_a, arc_b, i, j, sv);
                self.m_mat.set(i, j, score);
            }
        }
    }

    /// Computes D, IAD and IBD of an arc pair from the M, E, F, IA and IB entries of its loops,
    /// which must have been filled just before.
    fn fill_d_entry(&mut self, arc_a: &Arc, arc_b: &Arc) -> Result<()> {
        let scoring = self.scoring;
        let a = ArcRef::Real(*arc_a);
        let b = ArcRef::Real(*arc_b);
        let last_a = self.mapper_a.last_mat_pos(&a);
        let last_b = self.mapper_b.last_mat_pos(&b);
        let last_a_seq = self.mapper_a.pos_in_seq(&a, last_a);
        let last_b_seq = self.mapper_b.pos_in_seq(&b, last_b);
        let jump_a = self.gap_cost_between(last_a_seq, arc_a.right(), Side::A);
        let jump_b = self.gap_cost_between(last_b_seq, arc_b.right(), Side::B);
        let opening_a = Self::skip_opening(last_a_seq, arc_a.right(), scoring);
        let opening_b = Self::skip_opening(last_b_seq, arc_b.right(), scoring);
        let jump = jump_a + jump_b;

        let mut d = jump + opening_a + opening_b + self.m_mat.get(last_a, last_b);
        d.improve(jump + opening_b + self.e_mat.get(last_a, last_b));
        d.improve(jump + opening_a + self.f_mat.get(last_a, last_b));

        let ia = self.ix(Side::A, last_a, &b) + jump_a;
        let ib = self.ix(Side::B, last_b, &a) + jump_b;
        let iad = self.iad_mat.get(&a, &b);
        let ibd = self.ibd_mat.get(&a, &b);
        ensure!(
            iad.is_neg_infty() || iad == ia,
            "IAD of arcs {arc_a:?} and {arc_b:?} was {iad} but recomputed as {ia}"
        );
        ensure!(
            ibd.is_neg_infty() || ibd == ib,
            "IBD of arcs {arc_a:?} and {arc_b:?} was {ibd} but recomputed as {ib}"
        );
        self.iad_mat.set(&a, &b, ia);
        self.ibd_mat.set(&a, &b, ib);
        d.improve(ia);
        d.improve(ib);
        self.d_mat.set(&a, &b, d);
        trace!("D({arc_a:?}, {arc_b:?}) = {d}");
        Ok(())
    }

    /// Computes the scores of deleting whole arcs of one sequence as domains, i.e. D against the
    /// empty arc.
    fn compute_ix_entries_domain(&mut self, side: Side) {
        let sv = DefaultScoringView::new(self.scoring);
        let bps = self.bps(side);
        let mapper = self.mapper(side);
        let mut num_domains = 0;
        for left in (1..=bps.len()).rev().map(SeqPos) {
            for arc in bps.left_adjlist(left) {
                if arc.span() < self.opts.multiloop_deletion {
                    continue;
                }
                let x = ArcRef::Real(arc);
                self.fill_ix_entries(side, &x, &ArcRef::Empty, &sv);
                let last = mapper.last_mat_pos(&x);
                let last_seq = mapper.pos_in_seq(&x, last);
                let jump = self.loop_gap_cost_between(last_seq, arc.right(), side, sv.scoring());
                let ix = self.ix(side, last, &ArcRef::Empty) + jump;
                match side {
                    Side::A => self.iad_mat.set_side(&x, &ArcRef::Empty, side, ix),
                    Side::B => self.ibd_mat.set_side(&x, &ArcRef::Empty, side, ix),
                }
                self.d_mat.set_side(&x, &ArcRef::Empty, side, ix);
                num_domains += 1;
            }
        }
        debug!("Computed domain deletion scores for {num_domains} arcs of {side:?}");
    }

    /// Fills the D matrix for every admissible arc match, from the innermost arcs outwards.
    pub fn align_d(&mut self) -> Result<()> {
        self.compute_gap_costs();
        if self.opts.multiloop_deletion > 0 {
            self.compute_ix_entries_domain(Side::A);
            self.compute_ix_entries_domain(Side::B);
        }

        let sv = DefaultScoringView::new(self.scoring);
        let arc_matches = self.arc_matches;
        debug!("Filling D for {} arc matches", arc_matches.len());
        for am in arc_matches.iter() {
            let a = ArcRef::Real(am.arc_a);
            let b = ArcRef::Real(am.arc_b);
            self.fill_m_entries(&a, &b, &sv);
            self.fill_ia_entries(&a, &b, &sv);
            self.fill_ib_entries(&a, &b, &sv);
            self.fill_d_entry(&am.arc_a, &am.arc_b)?;
        }
        self.d_created = true;
        Ok(())
    }

    /// Computes the optimal alignment score.  The D matrix is filled on the first call; every
    /// call recomputes the top level, leaving its M, E and F in place for the traceback.
    pub fn align(&mut self) -> Result<InftyScore> {
        if !self.d_created {
            self.align_d()?;
        }
        let sv = DefaultScoringView::new(self.scoring);
        let pseudo_a = self.bps_a.pseudo_arc();
        let pseudo_b = self.bps_b.pseudo_arc();
        self.fill_m_entries(&pseudo_a, &pseudo_b, &sv);

        let last_a = self.mapper_a.last_mat_pos(&pseudo_a);
        let last_b = self.mapper_b.last_mat_pos(&pseudo_b);
        let last_a_seq = self.mapper_a.pos_in_seq(&pseudo_a, last_a);
        let last_b_seq = self.mapper_b.pos_in_seq(&pseudo_b, last_b);
        let score = self.m_mat.get(last_a, last_b)
            + self.gap_cost_between(last_a_seq, pseudo_a.right(), Side::A)
            + self.gap_cost_between(last_b_seq, pseudo_b.right(), Side::B);
        debug!("Optimal alignment score: {score}");
        Ok(score)
    }

    /// Length-normalized alignment is not supported.
    pub fn align_normalized(&mut self, lambda: Score) -> Result<InftyScore> {
        bail!("Normalized alignment is not supported (lambda = {lambda})")
    }
}

/// The parts of an arc match candidate of the M recursion.
pub(crate) struct ArcMatchScore {
    pub before_a: MatPos,
    pub before_b: MatPos,
    pub before_a_seq: SeqPos,
    pub before_b_seq: SeqPos,
    pub opening_a: Score,
    pub opening_b: Score,
    pub score: InftyScore,
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use crate::{
        align::{
            aligners::{AlignmentProblem, Builder},
            alignment::{AlignedPos, Alignment, Column, GapKind},
            score::InftyScore,
        },
        rna::{
            anchors::AnchorConstraints,
            base_pairs::{Arc, ArcRef},
            coords::{ArcIdx, SeqPos, Side},
            rna_data::RnaData,
        },
    };
    use bio::alignment::pairwise::MatchParams;
    use itertools::Itertools;
    use rstest::rstest;

    fn problem(
        builder: &Builder,
        a: (&str, &str),
        b: (&str, &str),
        anchored_a: &[usize],
    ) -> AlignmentProblem<MatchParams> {
        let rna_a = RnaData::from_structure("a", a.0.as_bytes(), a.1).unwrap();
        let rna_b = RnaData::from_structure("b", b.0.as_bytes(), b.1).unwrap();
        let anchors = AnchorConstraints::new(rna_a.len(), rna_b.len(), anchored_a, &[]).unwrap();
        builder.build_problem(&rna_a, &rna_b, anchors).unwrap()
    }

    fn score(builder: &Builder, a: (&str, &str), b: (&str, &str)) -> InftyScore {
        let problem = problem(builder, a, b, &[]);
        let mut aligner = problem.aligner().unwrap();
        aligner.align().unwrap()
    }

    fn trace(builder: &Builder, a: (&str, &str), b: (&str, &str)) -> Alignment {
        let problem = problem(builder, a, b, &[]);
        let mut aligner = problem.aligner().unwrap();
        aligner.trace().unwrap().clone()
    }

    /// Scores an alignment without structure by its columns.
    fn rescore(alignment: &Alignment, seq_a: &[u8], seq_b: &[u8]) -> i32 {
        let mut score = 0;
        let mut previous: Option<(bool, bool)> = None;
        for column in alignment.columns() {
            let gaps = (column.a.is_gap(), column.b.is_gap());
            match (column.a, column.b) {
                (AlignedPos::Pos(i), AlignedPos::Pos(j)) => {
                    score += if seq_a[i.0 - 1] == seq_b[j.0 - 1] { 50 } else { 0 };
                }
                _ => {
                    if previous != Some(gaps) {
                        score -= 600;
                    }
                    score -= 350;
                }
            }
            previous = Some(gaps);
        }
        score
    }

    fn arc_of(problem: &AlignmentProblem<MatchParams>, side: Side, bp: (SeqPos, SeqPos)) -> Arc {
        let bps = match side {
            Side::A => problem.bps_a(),
            Side::B => problem.bps_b(),
        };
        bps.left_adjlist(bp.0).find(|arc| arc.right() == bp.1).unwrap()
    }

    /// Scores an alignment with structure from its columns and base pairs alone.  Every run of
    /// regular or sparsification gaps of one side opens a gap, matched base pairs score as arc
    /// matches, and every deleted base pair is charged as an arc deletion.  A deleted base pair
    /// opens a loop deletion unless it continues the deletion of its enclosing base pair.
    /// Assumes equal indel scores inside and outside of deleted loops.
    fn rescore_structured(problem: &AlignmentProblem<MatchParams>, alignment: &Alignment) -> i32 {
        let scoring = problem.scoring();
        let params = *scoring.params();
        assert_eq!(params.indel, params.indel_loop);
        let mut score = 0;

        // column index and gap kind of every deleted or inserted position
        let mut column_of = HashMap::new();
        for (k, column) in alignment.columns().iter().enumerate() {
            match (column.a, column.b) {
                (AlignedPos::Pos(pos), AlignedPos::Gap(kind)) => {
                    column_of.insert((Side::A, pos), (k, kind));
                }
                (AlignedPos::Gap(kind), AlignedPos::Pos(pos)) => {
                    column_of.insert((Side::B, pos), (k, kind));
                }
                _ => (),
            }
        }
        let gapped_by = |column: &Column, side: Side, kind: GapKind| match side {
            Side::A => column.a.pos().is_some() && column.b == AlignedPos::Gap(kind),
            Side::B => column.b.pos().is_some() && column.a == AlignedPos::Gap(kind),
        };

        let mut arc_ends = HashMap::new();
        let mut loop_columns = vec![false; alignment.len()];
        for (&bp_a, &bp_b) in alignment
            .basepairs(Side::A)
            .iter()
            .zip(alignment.basepairs(Side::B))
        {
            score += scoring.arcmatch(
                &arc_of(problem, Side::A, bp_a),
                &arc_of(problem, Side::B, bp_b),
            );
            for (side, bp) in [(Side::A, bp_a), (Side::B, bp_b)] {
                arc_ends.insert((side, bp.0), false);
                arc_ends.insert((side, bp.1), false);
            }
        }
        for side in [Side::A, Side::B] {
            let deleted = alignment.deleted_basepairs(side);
            for &bp in deleted {
                score += scoring.arc_del(&arc_of(problem, side, bp), side);
                arc_ends.insert((side, bp.0), true);
                arc_ends.insert((side, bp.1), true);
                let (left_column, kind) = column_of[&(side, bp.0)];
                let parent_deleted = alignment
                    .basepairs(side)
                    .iter()
                    .map(|&p| (p, false))
                    .chain(deleted.iter().map(|&p| (p, true)))
                    .filter(|&(p, _)| p.0 < bp.0 && bp.1 < p.1)
                    .max_by_key(|&(p, _)| p.0)
                    .map_or(false, |(_, is_deleted)| is_deleted);
                if kind == GapKind::Regular {
                    // skipped positions right before a domain are part of its deletion
                    let mut k = left_column;
                    while k > 0 && gapped_by(&alignment.columns()[k - 1], side, GapKind::Sparse) {
                        k -= 1;
                        loop_columns[k] = true;
                    }
                }
                if !(kind == GapKind::Loop && parent_deleted) {
                    score += params.indel_opening_loop;
                }
            }
        }

        let mut open_run: Option<Side> = None;
        for (k, column) in alignment.columns().iter().enumerate() {
            let (side, pos, kind) = match (column.a, column.b) {
                (AlignedPos::Pos(i), AlignedPos::Pos(j)) => {
                    if !arc_ends.contains_key(&(Side::A, i)) {
                        score += scoring.basematch(i, j);
                    }
                    open_run = None;
                    continue;
                }
                (AlignedPos::Pos(i), AlignedPos::Gap(kind)) => (Side::A, i, kind),
                (AlignedPos::Gap(kind), AlignedPos::Pos(j)) => (Side::B, j, kind),
                (AlignedPos::Gap(_), AlignedPos::Gap(_)) => panic!("empty column {k}"),
            };
            if arc_ends.get(&(side, pos)) == Some(&true) {
                open_run = None;
                continue;
            }
            score += params.indel;
            if kind == GapKind::Loop || loop_columns[k] {
                open_run = None;
            } else if open_run != Some(side) {
                score += params.indel_opening;
                open_run = Some(side);
            }
        }
        score
    }

    #[rstest]
    #[case("A", "A", 0, 50)]
    #[case("A", "C", -10, -10)]
    #[case("AC", "A", 0, -900)]
    #[case("AAAA", "A", 0, -1600)]
    #[case("GACU", "GACU", 0, 200)]
    fn test_sequence_only_scores(
        #[case] seq_a: &str,
        #[case] seq_b: &str,
        #[case] mismatch: i32,
        #[case] expected: i32,
    ) {
        let builder = Builder::default().mismatch_score(mismatch).clone();
        let structure_a = ".".repeat(seq_a.len());
        let structure_b = ".".repeat(seq_b.len());
        assert_eq!(
            score(&builder, (seq_a, structure_a.as_str()), (seq_b, structure_b.as_str())),
            InftyScore::new(expected)
        );
    }

    #[test]
    fn test_arc_match() {
        let builder = Builder::default();
        let problem = problem(&builder, ("GAAC", "(..)"), ("GAAC", "(..)"), &[]);
        let mut aligner = problem.aligner().unwrap();
        // two arcs of weight 200, matching end bases, two matched unpaired bases
        assert_eq!(aligner.align().unwrap(), InftyScore::new(600));
        let arc_a = ArcRef::Real(problem.bps_a().arc(ArcIdx(0)));
        let arc_b = ArcRef::Real(problem.bps_b().arc(ArcIdx(0)));
        assert_eq!(aligner.d(&arc_a, &arc_b), InftyScore::new(100));

        let alignment = aligner.trace().unwrap();
        assert_eq!(alignment.score, InftyScore::new(600));
        assert_eq!(alignment.to_string(), "(1,1)(2,2)(3,3)(4,4)");
        assert_eq!(alignment.structure_string(Side::A), "(..)");
        assert_eq!(alignment.structure_string(Side::B), "(..)");
    }

    #[test]
    fn test_anchors() {
        let builder = Builder::default();
        let unanchored = problem(&builder, ("AC", ".."), ("A", "."), &[]);
        assert_eq!(
            unanchored.aligner().unwrap().align().unwrap(),
            InftyScore::new(-900)
        );

        let anchored = problem(&builder, ("AC", ".."), ("A", "."), &[2]);
        let mut aligner = anchored.aligner().unwrap();
        assert_eq!(aligner.align().unwrap(), InftyScore::new(-950));
        assert_eq!(aligner.trace().unwrap().to_string(), "(1,-)(2,1)");

        let infeasible = problem(&builder, ("AA", ".."), ("A", "."), &[1, 2]);
        let mut aligner = infeasible.aligner().unwrap();
        let alignment = aligner.trace().unwrap();
        assert!(alignment.score.is_neg_infty());
        assert!(alignment.is_empty());
    }

    #[rstest]
    #[case(("ACGUAC", "......"), ("AGUC", "...."))]
    #[case(("GGGAAA", "......"), ("AAAGGG", "......"))]
    #[case(("ACGU", "...."), ("UUUUUUU", "......."))]
    fn test_trace_reproduces_score(#[case] a: (&str, &str), #[case] b: (&str, &str)) {
        let builder = Builder::default();
        let alignment = trace(&builder, a, b);
        assert!(alignment.validate().is_ok());
        assert_eq!(
            InftyScore::new(rescore(&alignment, a.0.as_bytes(), b.0.as_bytes())),
            alignment.score
        );
    }

    #[rstest]
    #[case(("GGACAUCC", "((....))"), ("GACUUC", "(....)"))]
    #[case(("ACGGAAACCA", "..((...))."), ("AGGAACCU", ".((..))."))]
    #[case(("GCAAAGCGAAAGCAA", "((...))(....).."), ("GCAAAGCUUC", "((...))..."))]
    fn test_symmetry(#[case] a: (&str, &str), #[case] b: (&str, &str)) {
        let builder = Builder::default();
        assert_eq!(score(&builder, a, b), score(&builder, b, a));
    }

    #[rstest]
    #[case(("GGACAUCC", "((....))"), ("GACUUC", "(....)"))]
    #[case(("GCAAAGCGAAAGCAA", "((...))(....).."), ("GCAAAGCUUC", "((...))..."))]
    fn test_arc_match_filter_is_monotone(#[case] a: (&str, &str), #[case] b: (&str, &str)) {
        let unrestricted = Builder::default().max_diff_am(None).clone();
        let restricted = Builder::default().max_diff_am(Some(0)).clone();
        assert!(score(&unrestricted, a, b) >= score(&restricted, a, b));
    }

    #[rstest]
    #[case(("GAAC", "(..)"), ("GAAC", "(..)"), 0)]
    #[case(("GGACAUCC", "((....))"), ("GACUUC", "(....)"), 0)]
    #[case(("ACGGAAACCA", "..((...))."), ("AGGAACCU", ".((..))."), 0)]
    #[case(("GCAAAGCGAAAGCAA", "((...))(....).."), ("GCAAAGCUUC", "((...))..."), 0)]
    #[case(("GGGAAACCC", "(((...)))"), ("AGAAACA", "......."), 0)]
    #[case(("AAGGGAAAACCCAA", "..(((....))).."), ("AAAA", "...."), 1)]
    #[case(("AAAA", "...."), ("AAGGGAAAACCCAA", "..(((....))).."), 1)]
    #[case(("ACGGAAACCA", "..((...))."), ("ACA", "..."), 1)]
    fn test_trace_reproduces_structured_score(
        #[case] a: (&str, &str),
        #[case] b: (&str, &str),
        #[case] multiloop_deletion: usize,
    ) {
        let builder = Builder::default()
            .multiloop_deletion(multiloop_deletion)
            .clone();
        let problem = problem(&builder, a, b, &[]);
        let mut aligner = problem.aligner().unwrap();
        let score = aligner.align().unwrap();
        let alignment = aligner.trace().unwrap();
        assert!(alignment.validate().is_ok());
        assert_eq!(InftyScore::new(rescore_structured(&problem, alignment)), score);
    }

    #[rstest]
    #[case(Side::A)]
    #[case(Side::B)]
    fn test_domain_deletion_of_a_stem(#[case] side: Side) {
        let stem = ("AAGGGAAAACCCAA", "..(((....)))..");
        let unstructured = ("AAAA", "....");
        let (a, b) = match side {
            Side::A => (stem, unstructured),
            Side::B => (unstructured, stem),
        };
        let without = Builder::default();
        let with = Builder::default().multiloop_deletion(1).clone();
        assert_eq!(score(&without, a, b), InftyScore::new(-3900));
        assert_eq!(score(&with, a, b), InftyScore::new(-3600));

        let alignment = trace(&with, a, b);
        let deleted = alignment
            .deleted_basepairs(side)
            .iter()
            .map(|&(left, right)| (left.0, right.0))
            .collect_vec();
        assert_eq!(deleted, vec![(3, 12), (4, 11), (5, 10)]);
        assert!(alignment.deleted_basepairs(match side {
            Side::A => Side::B,
            Side::B => Side::A,
        })
        .is_empty());
        assert!(alignment.basepairs(side).is_empty());
    }

    #[rstest]
    #[case(("ACGGAAACCA", "..((...))."), ("ACA", "..."))]
    #[case(("GCAAAGCGAAAGCAA", "((...))(....).."), ("GCAAAGCUUC", "((...))..."))]
    fn test_domain_deletion(#[case] a: (&str, &str), #[case] b: (&str, &str)) {
        let without = Builder::default();
        let with = Builder::default().multiloop_deletion(1).clone();
        let with_score = score(&with, a, b);
        assert!(with_score >= score(&without, a, b));
        assert!(with_score >= score(&without, b, a));

        for (a, b) in [(a, b), (b, a)] {
            let problem = problem(&with, a, b, &[]);
            let mut aligner = problem.aligner().unwrap();
            let alignment = aligner.trace().unwrap();
            assert!(alignment.validate().is_ok());
            assert_eq!(InftyScore::new(rescore_structured(&problem, alignment)), with_score);
        }
    }

    #[test]
    fn test_repeated_alignment() {
        let builder = Builder::default();
        let problem = problem(
            &builder,
            ("GGACAUCC", "((....))"),
            ("GACUUC", "(....)"),
            &[],
        );
        let mut aligner = problem.aligner().unwrap();
        let first = aligner.align().unwrap();
        assert!(first.is_finite());
        assert_eq!(aligner.align().unwrap(), first);
        let alignment = aligner.trace().unwrap().clone();
        assert_eq!(alignment.score, first);
        assert_eq!(aligner.trace().unwrap(), &alignment);
    }

    #[test]
    fn test_normalized_alignment_is_unsupported() {
        let builder = Builder::default();
        let problem = problem(&builder, ("GAAC", "(..)"), ("GAAC", "(..)"), &[]);
        let mut aligner = problem.aligner().unwrap();
        let err = aligner.align_normalized(2).unwrap_err();
        assert!(err.to_string().contains("not supported"));
    }
}
