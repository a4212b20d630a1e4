use anyhow::{ensure, Result};
use itertools::Itertools;

use super::coords::{ArcIdx, ArcSlot, SeqPos};

/// A base pair `(left, right)` of one sequence, with `left < right`.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct Arc {
    idx: ArcIdx,
    left: SeqPos,
    right: SeqPos,
}

impl Arc {
    pub fn new(idx: ArcIdx, left: SeqPos, right: SeqPos) -> Self {
        debug_assert!(left < right);
        Self { idx, left, right }
    }

    pub fn idx(&self) -> ArcIdx {
        self.idx
    }

    pub fn left(&self) -> SeqPos {
        self.left
    }

    pub fn right(&self) -> SeqPos {
        self.right
    }

    /// The number of positions covered by the arc, including both ends.
    pub fn span(&self) -> usize {
        self.right.0 - self.left.0 + 1
    }
}

/// An arc parameter of the recursion, tagged with the role it plays.
///
/// * `Real` - a base pair of the sequence.
/// * `Empty` - the sentinel opposite arc used for one-sided domain deletions.  It encloses no
///   positions.
/// * `Pseudo` - the arc `(0, len + 1)` enclosing the whole sequence, used for the top level.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum ArcRef {
    Real(Arc),
    Empty,
    Pseudo(Arc),
}

impl ArcRef {
    pub fn left(&self) -> SeqPos {
        match self {
            ArcRef::Real(arc) | ArcRef::Pseudo(arc) => arc.left(),
            ArcRef::Empty => SeqPos(0),
        }
    }

    pub fn right(&self) -> SeqPos {
        match self {
            ArcRef::Real(arc) | ArcRef::Pseudo(arc) => arc.right(),
            ArcRef::Empty => SeqPos(0),
        }
    }

    /// The number of positions covered by the arc; zero for the empty arc.
    pub fn span(&self) -> usize {
        match self {
            ArcRef::Real(arc) | ArcRef::Pseudo(arc) => arc.span(),
            ArcRef::Empty => 0,
        }
    }

    /// The storage slot of this arc, given the number of real arcs of its sequence.
    #[inline(always)]
    pub fn slot(&self, num_bps: usize) -> ArcSlot {
        match self {
            ArcRef::Real(arc) => ArcSlot(arc.idx().0),
            ArcRef::Empty | ArcRef::Pseudo(_) => ArcSlot(num_bps),
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, ArcRef::Empty)
    }
}

/// The candidate base pairs of one sequence.
///
/// Arcs are indexed in order of increasing left end, then increasing right end, so that the
/// indices are deterministic for a given input.
#[derive(Clone, Debug)]
pub struct BasePairs {
    len: usize,
    arcs: Vec<Arc>,
    probs: Vec<f64>,
    left_adj: Vec<Vec<ArcIdx>>,
    right_adj: Vec<Vec<ArcIdx>>,
}

impl BasePairs {
    /// Builds the base pairs of a sequence of length `len` from `(i, j, p)` triples.  Pairs with
    /// probability below `min_prob`, or spanning more than `max_bp_span` positions, are dropped.
    /// Duplicated pairs keep the highest probability.
    pub fn new<I>(len: usize, pairs: I, min_prob: f64, max_bp_span: Option<usize>) -> Result<Self>
    where
        I: IntoIterator<Item = (usize, usize, f64)>,
    {
        let mut kept: Vec<(usize, usize, f64)> = Vec::new();
        for (i, j, p) in pairs {
            ensure!(
                1 <= i && i < j && j <= len,
                "Invalid base pair ({i}, {j}) for a sequence of length {len}"
            );
            ensure!(
                (0.0..=1.0).contains(&p),
                "Invalid probability {p} for base pair ({i}, {j})"
            );
            if p < min_prob || max_bp_span.map_or(false, |span| j - i + 1 > span) {
                continue;
            }
            kept.push((i, j, p));
        }

        let kept = kept
            .into_iter()
            .sorted_by(|a, b| (a.0, a.1).cmp(&(b.0, b.1)).then(b.2.total_cmp(&a.2)))
            .dedup_by(|a, b| a.0 == b.0 && a.1 == b.1)
            .collect_vec();

        let mut arcs = Vec::with_capacity(kept.len());
        let mut probs = Vec::with_capacity(kept.len());
        let mut left_adj = vec![Vec::new(); len + 2];
        let mut right_adj = vec![Vec::new(); len + 2];
        for (idx, &(i, j, p)) in kept.iter().enumerate() {
            let arc = Arc::new(ArcIdx(idx), SeqPos(i), SeqPos(j));
            left_adj[i].push(arc.idx());
            right_adj[j].push(arc.idx());
            arcs.push(arc);
            probs.push(p);
        }

        Ok(Self {
            len,
            arcs,
            probs,
            left_adj,
            right_adj,
        })
    }

    /// The length of the underlying sequence.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn num_bps(&self) -> usize {
        self.arcs.len()
    }

    pub fn arc(&self, idx: ArcIdx) -> Arc {
        self.arcs[idx.0]
    }

    pub fn prob(&self, idx: ArcIdx) -> f64 {
        self.probs[idx.0]
    }

    pub fn arcs(&self) -> &[Arc] {
        &self.arcs
    }

    /// The arcs with left end `pos`, by increasing right end.
    pub fn left_adjlist(&self, pos: SeqPos) -> impl Iterator<Item = Arc> + '_ {
        self.left_adj[pos.0].iter().map(|&idx| self.arc(idx))
    }

    /// The arcs with right end `pos`, by increasing left end.
    pub fn right_adjlist(&self, pos: SeqPos) -> impl Iterator<Item = Arc> + '_ {
        self.right_adj[pos.0].iter().map(|&idx| self.arc(idx))
    }

    /// The arc `(0, len + 1)` enclosing the whole sequence.
    pub fn pseudo_arc(&self) -> ArcRef {
        ArcRef::Pseudo(Arc::new(
            ArcIdx(self.num_bps()),
            SeqPos(0),
            SeqPos(self.len + 1),
        ))
    }
}
