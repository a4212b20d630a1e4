//! Traceback of the sparsified Sankoff recursion.
//!
//! Only D, IAD and IBD survive the forward pass, so the traceback recomputes the loop matrices of
//! every arc pair it descends into.  Each frame decides on its case by comparing the stored score
//! with the recomputed candidates, and only then recurses; the recursion may overwrite the loop
//! matrices of the current frame.

use anyhow::{bail, ensure, Result};
use bio::alignment::pairwise::MatchFunc;
use log::{debug, warn};

use crate::{
    align::{
        aligners::SparseAligner,
        alignment::{Alignment, GapKind},
        view::{DefaultScoringView, ScoringView},
    },
    rna::{
        base_pairs::{Arc, ArcRef},
        coords::{MatPos, SeqPos, Side},
    },
};

impl<'a, F: MatchFunc> SparseAligner<'a, F> {
    /// Computes an optimal alignment.  If no alignment with a finite score exists, the returned
    /// alignment is empty and its score is negative infinity.
    pub fn trace(&mut self) -> Result<&Alignment> {
        let score = self.align()?;
        self.alignment.clear();
        if score.is_neg_infty() {
            warn!("No alignment with a finite score exists, e.g. due to contradicting anchors");
            return Ok(&self.alignment);
        }

        let sv = DefaultScoringView::new(self.scoring);
        let pseudo_a = self.bps_a.pseudo_arc();
        let pseudo_b = self.bps_b.pseudo_arc();
        let last_a = self.mapper_a.last_mat_pos(&pseudo_a);
        let last_b = self.mapper_b.last_mat_pos(&pseudo_b);
        self.trace_m(&pseudo_a, &pseudo_b, last_a, last_b, &sv)?;

        let last_a_seq = self.mapper_a.pos_in_seq(&pseudo_a, last_a);
        let last_b_seq = self.mapper_b.pos_in_seq(&pseudo_b, last_b);
        self.emit_gaps(Side::A, last_a_seq, pseudo_a.right(), GapKind::Regular);
        self.emit_gaps(Side::B, last_b_seq, pseudo_b.right(), GapKind::Regular);

        self.alignment.score = score;
        self.alignment.validate()?;
        debug!(
            "Traced an alignment of {} columns with score {score}",
            self.alignment.len()
        );
        Ok(&self.alignment)
    }

    /// Aligns every position strictly between `left` and `right` of one sequence to a gap.
    fn emit_gaps(&mut self, side: Side, left: SeqPos, right: SeqPos, kind: GapKind) {
        for pos in SeqPos::strictly_between(left, right) {
            self.alignment.append_gapped(side, pos, kind);
        }
    }

    /// Emits the positions skipped by sparsification on both sides.  The side whose gap run
    /// continues from the predecessor goes first, so that every gap run stays contiguous.
    fn emit_skipped(
        &mut self,
        skip_a: (SeqPos, SeqPos),
        skip_b: (SeqPos, SeqPos),
        b_first: bool,
    ) {
        if b_first {
            self.emit_gaps(Side::B, skip_b.0, skip_b.1, GapKind::Sparse);
        }
        self.emit_gaps(Side::A, skip_a.0, skip_a.1, GapKind::Sparse);
        if !b_first {
            self.emit_gaps(Side::B, skip_b.0, skip_b.1, GapKind::Sparse);
        }
    }

    fn trace_m<V: ScoringView<F>>(
        &mut self,
        arc_a: &ArcRef,
        arc_b: &ArcRef,
        i: MatPos,
        j: MatPos,
        sv: &V,
    ) -> Result<()> {
        if i == MatPos::ZERO && j == MatPos::ZERO {
            return Ok(());
        } else if j == MatPos::ZERO {
            return self.trace_e(arc_a, arc_b, i, j, sv);
        } else if i == MatPos::ZERO {
            return self.trace_f(arc_a, arc_b, i, j, sv);
        }

        let scoring = sv.scoring();
        let mapper_a = self.mapper_a;
        let mapper_b = self.mapper_b;
        let target = self.m_mat.get(i, j);
        let i_seq = mapper_a.pos_in_seq(arc_a, i);
        let j_seq = mapper_b.pos_in_seq(arc_b, j);
        let i_prev_seq = mapper_a.pos_in_seq(arc_a, i.prev());
        let j_prev_seq = mapper_b.pos_in_seq(arc_b, j.prev());
        let opening_a = Self::skip_opening(i_prev_seq, i_seq, scoring);
        let opening_b = Self::skip_opening(j_prev_seq, j_seq, scoring);

        // base match
        if mapper_a.pos_unpaired(arc_a, i) && mapper_b.pos_unpaired(arc_b, j) {
            let gap_match = self.gap_cost_between(i_prev_seq, i_seq, Side::A)
                + self.gap_cost_between(j_prev_seq, j_seq, Side::B)
                + scoring.basematch(i_seq, j_seq);
            let (i_prev, j_prev) = (i.prev(), j.prev());
            let traced = if target == gap_match + opening_b + self.e_mat.get(i_prev, j_prev) {
                self.trace_e(arc_a, arc_b, i_prev, j_prev, sv)?;
                Some(false)
            } else if target == gap_match + opening_a + self.f_mat.get(i_prev, j_prev) {
                self.trace_f(arc_a, arc_b, i_prev, j_prev, sv)?;
                Some(true)
            } else if target
                == gap_match + opening_a + opening_b + self.m_mat.get(i_prev, j_prev)
            {
                self.trace_m(arc_a, arc_b, i_prev, j_prev, sv)?;
                Some(false)
            } else {
                None
            };
            if let Some(b_first) = traced {
                self.emit_skipped((i_prev_seq, i_seq), (j_prev_seq, j_seq), b_first);
                self.alignment.append_match(i_seq, j_seq);
                return Ok(());
            }
        }

        // base deletion and insertion
        if target == self.e_mat.get(i, j) {
            return self.trace_e(arc_a, arc_b, i, j, sv);
        }
        if target == self.f_mat.get(i, j) {
            return self.trace_f(arc_a, arc_b, i, j, sv);
        }

        let arcs_a = mapper_a.valid_arcs_right_adj(arc_a, i);
        let arcs_b = mapper_b.valid_arcs_right_adj(arc_b, j);

        if *self.opts.multiloop_deletion() > 0 {
            for nested_a in arcs_a {
                let (before, score) = self.domain_indel_score(arc_a, nested_a, Side::A, sv);
                if target == score + self.m_mat.get(before, j) {
                    self.trace_m(arc_a, arc_b, before, j, sv)?;
                    let before_seq = mapper_a.pos_in_seq(arc_a, before);
                    return self.trace_domain_indel(Side::A, before_seq, nested_a, sv);
                }
            }
            for nested_b in arcs_b {
                let (before, score) = self.domain_indel_score(arc_b, nested_b, Side::B, sv);
                if target == score + self.m_mat.get(i, before) {
                    self.trace_m(arc_a, arc_b, i, before, sv)?;
                    let before_seq = mapper_b.pos_in_seq(arc_b, before);
                    return self.trace_domain_indel(Side::B, before_seq, nested_b, sv);
                }
            }
        }

        // arc match
        for nested_a in arcs_a {
            for nested_b in arcs_b {
                let am = self.arc_match_score(arc_a, arc_b, nested_a, nested_b, sv);
                let (before_a, before_b) = (am.before_a, am.before_b);
                let b_first = if target
                    == am.score + am.opening_a + am.opening_b + self.m_mat.get(before_a, before_b)
                {
                    self.trace_m(arc_a, arc_b, before_a, before_b, sv)?;
                    false
                } else if target == am.score + am.opening_b + self.e_mat.get(before_a, before_b)
                {
                    self.trace_e(arc_a, arc_b, before_a, before_b, sv)?;
                    false
                } else if target == am.score + am.opening_a + self.f_mat.get(before_a, before_b)
                {
                    self.trace_f(arc_a, arc_b, before_a, before_b, sv)?;
                    true
                } else {
                    continue;
                };
                self.emit_skipped(
                    (am.before_a_seq, nested_a.left()),
                    (am.before_b_seq, nested_b.left()),
                    b_first,
                );
                self.alignment
                    .add_basepair(Side::A, nested_a.left(), nested_a.right());
                self.alignment
                    .add_basepair(Side::B, nested_b.left(), nested_b.right());
                self.alignment.append_match(nested_a.left(), nested_b.left());
                self.trace_d(&ArcRef::Real(*nested_a), &ArcRef::Real(*nested_b), sv)?;
                self.alignment
                    .append_match(nested_a.right(), nested_b.right());
                return Ok(());
            }
        }

        bail!("No case of M reproduces the score {target} at ({i}, {j}) of loops {arc_a:?} and {arc_b:?}")
    }

    /// Emits the deletion of `arc` of sequence `side` as a whole domain, preceded by the skipped
    /// positions after `before_seq`.
    fn trace_domain_indel<V: ScoringView<F>>(
        &mut self,
        side: Side,
        before_seq: SeqPos,
        arc: &Arc,
        sv: &V,
    ) -> Result<()> {
        self.emit_gaps(side, before_seq, arc.left(), GapKind::Sparse);
        self.alignment
            .add_deleted_basepair(side, arc.left(), arc.right());
        self.alignment
            .append_gapped(side, arc.left(), GapKind::Regular);
        match side {
            Side::A => self.trace_d(&ArcRef::Real(*arc), &ArcRef::Empty, sv)?,
            Side::B => self.trace_d(&ArcRef::Empty, &ArcRef::Real(*arc), sv)?,
        }
        self.alignment
            .append_gapped(side, arc.right(), GapKind::Regular);
        Ok(())
    }

    fn trace_e<V: ScoringView<F>>(
        &mut self,
        arc_a: &ArcRef,
        arc_b: &ArcRef,
        i: MatPos,
        j: MatPos,
        sv: &V,
    ) -> Result<()> {
        let scoring = sv.scoring();
        let target = self.e_mat.get(i, j);
        let i_seq = self.mapper_a.pos_in_seq(arc_a, i);
        ensure!(
            i_seq > arc_a.left() && target.is_finite(),
            "Deletion of {i_seq} in loop {arc_a:?} has no finite score"
        );
        let i_prev_seq = self.mapper_a.pos_in_seq(arc_a, i.prev());
        let gap = self.step_gap_cost(i_prev_seq, i_seq, Side::A, scoring);
        if target == gap + self.e_mat.get(i.prev(), j) {
            self.trace_e(arc_a, arc_b, i.prev(), j, sv)?;
        } else if target == self.m_mat.get(i.prev(), j) + gap + scoring.indel_opening() {
            self.trace_m(arc_a, arc_b, i.prev(), j, sv)?;
        } else {
            bail!("No case of E reproduces the score {target} at ({i}, {j})");
        }
        self.emit_gaps(Side::A, i_prev_seq, i_seq, GapKind::Sparse);
        self.alignment
            .append_gapped(Side::A, i_seq, GapKind::Regular);
        Ok(())
    }

    fn trace_f<V: ScoringView<F>>(
        &mut self,
        arc_a: &ArcRef,
        arc_b: &ArcRef,
        i: MatPos,
        j: MatPos,
        sv: &V,
    ) -> Result<()> {
        let scoring = sv.scoring();
        let target = self.f_mat.get(i, j);
        let j_seq = self.mapper_b.pos_in_seq(arc_b, j);
        ensure!(
            j_seq > arc_b.left() && target.is_finite(),
            "Insertion of {j_seq} in loop {arc_b:?} has no finite score"
        );
        let j_prev_seq = self.mapper_b.pos_in_seq(arc_b, j.prev());
        let gap = self.step_gap_cost(j_prev_seq, j_seq, Side::B, scoring);
        if target == gap + self.f_mat.get(i, j.prev()) {
            self.trace_f(arc_a, arc_b, i, j.prev(), sv)?;
        } else if target == self.m_mat.get(i, j.prev()) + gap + scoring.indel_opening() {
            self.trace_m(arc_a, arc_b, i, j.prev(), sv)?;
        } else {
            bail!("No case of F reproduces the score {target} at ({i}, {j})");
        }
        self.emit_gaps(Side::B, j_prev_seq, j_seq, GapKind::Sparse);
        self.alignment
            .append_gapped(Side::B, j_seq, GapKind::Regular);
        Ok(())
    }

    /// Traces the alignment of the loops of `arc_a` and `arc_b`, excluding the arc ends.  One of
    /// the arcs may be empty, in which case the other arc is deleted as a domain.
    fn trace_d<V: ScoringView<F>>(&mut self, arc_a: &ArcRef, arc_b: &ArcRef, sv: &V) -> Result<()> {
        match (arc_a.is_empty(), arc_b.is_empty()) {
            (false, true) => return self.trace_ixd(Side::A, arc_a, arc_b, sv),
            (true, false) => return self.trace_ixd(Side::B, arc_b, arc_a, sv),
            (true, true) => bail!("Cannot trace two empty arcs"),
            (false, false) => (),
        }

        let scoring = sv.scoring();
        let target = self.d_mat.get(arc_a, arc_b);
        ensure!(
            target.is_finite(),
            "D of arcs {arc_a:?} and {arc_b:?} has no finite score"
        );
        self.fill_m_entries(arc_a, arc_b, sv);

        let mapper_a = self.mapper_a;
        let mapper_b = self.mapper_b;
        let last_a = mapper_a.last_mat_pos(arc_a);
        let last_b = mapper_b.last_mat_pos(arc_b);
        let last_a_seq = mapper_a.pos_in_seq(arc_a, last_a);
        let last_b_seq = mapper_b.pos_in_seq(arc_b, last_b);
        let jump_a = self.gap_cost_between(last_a_seq, arc_a.right(), Side::A);
        let jump_b = self.gap_cost_between(last_b_seq, arc_b.right(), Side::B);
        let opening_a = Self::skip_opening(last_a_seq, arc_a.right(), scoring);
        let opening_b = Self::skip_opening(last_b_seq, arc_b.right(), scoring);
        let jump = jump_a + jump_b;

        let b_first = if target == jump + opening_a + opening_b + self.m_mat.get(last_a, last_b) {
            self.trace_m(arc_a, arc_b, last_a, last_b, sv)?;
            false
        } else if target == jump + opening_b + self.e_mat.get(last_a, last_b) {
            self.trace_e(arc_a, arc_b, last_a, last_b, sv)?;
            false
        } else if target == jump + opening_a + self.f_mat.get(last_a, last_b) {
            self.trace_f(arc_a, arc_b, last_a, last_b, sv)?;
            true
        } else {
            self.fill_ia_entries(arc_a, arc_b, sv);
            let ia = self.ix(Side::A, last_a, arc_b) + jump_a;
            let iad = self.iad_mat.get(arc_a, arc_b);
            ensure!(
                iad.is_neg_infty() || iad == ia,
                "IAD of arcs {arc_a:?} and {arc_b:?} was {iad} but recomputed as {ia}"
            );
            if target == ia {
                self.trace_ix(Side::A, arc_a, arc_b, last_a, sv)?;
                self.emit_gaps(Side::A, last_a_seq, arc_a.right(), GapKind::Loop);
                return Ok(());
            }
            self.fill_ib_entries(arc_a, arc_b, sv);
            let ib = self.ix(Side::B, last_b, arc_a) + jump_b;
            if target == ib {
                self.trace_ix(Side::B, arc_b, arc_a, last_b, sv)?;
                self.emit_gaps(Side::B, last_b_seq, arc_b.right(), GapKind::Loop);
                return Ok(());
            }
            bail!("No case of D reproduces the score {target} of arcs {arc_a:?} and {arc_b:?}");
        };

        self.emit_skipped(
            (last_a_seq, arc_a.right()),
            (last_b_seq, arc_b.right()),
            b_first,
        );
        Ok(())
    }

    /// Traces IAD (side A) or IBD (side B) of `arc_x` and `arc_y`: the loop of `arc_x` is deleted
    /// except for a nested arc whose loop holds the alignment of `arc_y`'s loop.
    fn trace_ixd<V: ScoringView<F>>(
        &mut self,
        side: Side,
        arc_x: &ArcRef,
        arc_y: &ArcRef,
        sv: &V,
    ) -> Result<()> {
        let scoring = sv.scoring();
        let mapper = self.mapper(side);
        let target = self.ixd(arc_x, arc_y, side);
        self.fill_ix_entries(side, arc_x, arc_y, sv);
        let last = mapper.last_mat_pos(arc_x);
        let last_seq = mapper.pos_in_seq(arc_x, last);
        let jump = if arc_y.is_empty() {
            self.loop_gap_cost_between(last_seq, arc_x.right(), side, scoring)
        } else {
            self.gap_cost_between(last_seq, arc_x.right(), side)
        };
        let recomputed = self.ix(side, last, arc_y) + jump;
        ensure!(
            target.is_finite() && target == recomputed,
            "I{side:?}D of arcs {arc_x:?} and {arc_y:?} was {target} but recomputed as {recomputed}"
        );
        self.trace_ix(side, arc_x, arc_y, last, sv)?;
        self.emit_gaps(side, last_seq, arc_x.right(), GapKind::Loop);
        Ok(())
    }

    fn trace_ix<V: ScoringView<F>>(
        &mut self,
        side: Side,
        arc_x: &ArcRef,
        arc_y: &ArcRef,
        i: MatPos,
        sv: &V,
    ) -> Result<()> {
        let target = self.ix(side, i, arc_y);
        if i == MatPos::ZERO {
            ensure!(
                target.is_finite(),
                "Loop {arc_x:?} of {side:?} cannot be deleted against {arc_y:?}"
            );
            return Ok(());
        }

        let scoring = sv.scoring();
        let mapper = self.mapper(side);
        let xl = arc_x.left();
        let i_seq = mapper.pos_in_seq(arc_x, i);
        let i_prev_seq = mapper.pos_in_seq(arc_x, i.prev());

        let gap = self.step_gap_cost(i_prev_seq, i_seq, side, scoring)
            .map(|g| scoring.loop_indel_score(g));
        if target == self.ix(side, i.prev(), arc_y) + gap {
            self.trace_ix(side, arc_x, arc_y, i.prev(), sv)?;
            for pos in SeqPos::after_up_to(i_prev_seq, i_seq) {
                self.alignment.append_gapped(side, pos, GapKind::Loop);
            }
            return Ok(());
        }

        for nested in mapper.valid_arcs_right_adj(arc_x, i) {
            let nested_ref = ArcRef::Real(*nested);
            let gap = self.loop_gap_cost_between(xl, nested.left(), side, scoring);
            let arc_del = self.arc_del_cost(nested, side, scoring);
            let extend = target == self.ixd(&nested_ref, arc_y, side) + arc_del + gap;
            let open = !extend
                && target
                    == sv.d_side(&self.d_mat, &nested_ref, arc_y, side)
                        + arc_del
                        + gap
                        + scoring.indel_opening_loop();
            if !(extend || open) {
                continue;
            }

            self.alignment
                .add_deleted_basepair(side, nested.left(), nested.right());
            for pos in SeqPos::after_up_to(xl, nested.left()) {
                self.alignment.append_gapped(side, pos, GapKind::Loop);
            }
            if extend {
                self.trace_ixd(side, &nested_ref, arc_y, sv)?;
            } else {
                match side {
                    Side::A => self.trace_d(&nested_ref, arc_y, sv)?,
                    Side::B => self.trace_d(arc_y, &nested_ref, sv)?,
                }
            }
            self.alignment
                .append_gapped(side, nested.right(), GapKind::Loop);
            return Ok(());
        }

        bail!("No case of I{side:?} reproduces the score {target} at {i} of loop {arc_x:?}")
    }
}
