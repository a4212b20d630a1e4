//! Coordinate spaces used throughout the aligner.
//!
//! Sequence positions and matrix positions are both small unsigned integers, but they live in
//! different spaces: a [`SeqPos`] is a 1-based position in an RNA sequence (with `0` and `len + 1`
//! marking the ends of the pseudo-arc), whereas a [`MatPos`] indexes the compacted list of valid
//! positions inside one arc after sparsification.  Keeping them as distinct types prevents
//! mixing the two in the same expression.

use std::fmt;

/// A 1-based position in a sequence.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SeqPos(pub usize);

impl SeqPos {
    #[inline(always)]
    pub fn get(self) -> usize {
        self.0
    }

    #[inline(always)]
    pub fn prev(self) -> Self {
        debug_assert!(self.0 > 0);
        Self(self.0 - 1)
    }

    #[inline(always)]
    pub fn next(self) -> Self {
        Self(self.0 + 1)
    }

    /// True if at least one position lies strictly between `self` and `next`.
    #[inline(always)]
    pub fn skips_to(self, next: SeqPos) -> bool {
        self.0 + 1 < next.0
    }

    /// Iterates over the positions strictly between `left` and `right`.
    pub fn strictly_between(left: SeqPos, right: SeqPos) -> impl Iterator<Item = SeqPos> {
        (left.0 + 1..right.0).map(SeqPos)
    }

    /// Iterates over the positions after `left` up to and including `right`.
    pub fn after_up_to(left: SeqPos, right: SeqPos) -> impl Iterator<Item = SeqPos> {
        (left.0 + 1..=right.0).map(SeqPos)
    }
}

impl fmt::Display for SeqPos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An index into the compacted list of valid positions of one arc.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MatPos(pub usize);

impl MatPos {
    pub const ZERO: MatPos = MatPos(0);

    #[inline(always)]
    pub fn get(self) -> usize {
        self.0
    }

    #[inline(always)]
    pub fn prev(self) -> Self {
        debug_assert!(self.0 > 0);
        Self(self.0 - 1)
    }

    /// Iterates over matrix positions `1..end`.
    pub fn inner(end: usize) -> impl Iterator<Item = MatPos> {
        (1..end).map(MatPos)
    }
}

impl fmt::Display for MatPos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// The index of a base pair (arc) within its [`BasePairs`](crate::rna::base_pairs::BasePairs).
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ArcIdx(pub usize);

/// The storage slot of an arc in per-arc matrices.  Real arcs use their own index, while the
/// empty arc and the pseudo-arc share the slot one past the last real arc.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ArcSlot(pub usize);

/// Which of the two sequences of a pairwise alignment is meant.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Side {
    A,
    B,
}
