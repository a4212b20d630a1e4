use anyhow::{ensure, Result};
use bit_set::BitSet;

use super::coords::{SeqPos, Side};

/// Positions of both sequences that must be aligned to a position of the other sequence, i.e.
/// that may never be skipped inside a gap.
#[derive(Clone, Debug, Default)]
pub struct AnchorConstraints {
    len_a: usize,
    len_b: usize,
    anchored_a: BitSet,
    anchored_b: BitSet,
}

impl AnchorConstraints {
    /// No anchors at all.
    pub fn empty(len_a: usize, len_b: usize) -> Self {
        Self {
            len_a,
            len_b,
            anchored_a: BitSet::with_capacity(len_a + 1),
            anchored_b: BitSet::with_capacity(len_b + 1),
        }
    }

    /// Anchors the given 1-based positions of either sequence.
    pub fn new(len_a: usize, len_b: usize, anchored_a: &[usize], anchored_b: &[usize]) -> Result<Self> {
        let mut constraints = Self::empty(len_a, len_b);
        for &pos in anchored_a {
            ensure!(
                1 <= pos && pos <= len_a,
                "Anchored position {pos} is outside of sequence A of length {len_a}"
            );
            constraints.anchored_a.insert(pos);
        }
        for &pos in anchored_b {
            ensure!(
                1 <= pos && pos <= len_b,
                "Anchored position {pos} is outside of sequence B of length {len_b}"
            );
            constraints.anchored_b.insert(pos);
        }
        Ok(constraints)
    }

    pub fn is_empty(&self) -> bool {
        self.anchored_a.is_empty() && self.anchored_b.is_empty()
    }

    /// True if `pos` of the given sequence has to be aligned.
    pub fn aligned_pos(&self, pos: SeqPos, side: Side) -> bool {
        match side {
            Side::A => self.anchored_a.contains(pos.0),
            Side::B => self.anchored_b.contains(pos.0),
        }
    }

    pub fn len(&self, side: Side) -> usize {
        match side {
            Side::A => self.len_a,
            Side::B => self.len_b,
        }
    }
}
