use itertools::Itertools;

use super::{
    base_pairs::{Arc, BasePairs},
    coords::SeqPos,
};

/// A pair of arcs, one from each sequence, that may be matched.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ArcMatch {
    pub arc_a: Arc,
    pub arc_b: Arc,
}

/// The admissible arc matches, in the order the D matrix has to be filled: by decreasing left end
/// in A, then by decreasing left end in B.  Every pair of arcs nested inside a given pair comes
/// before it.
#[derive(Clone, Debug, Default)]
pub struct ArcMatches {
    matches: Vec<ArcMatch>,
}

impl ArcMatches {
    /// Enumerates the arc pairs whose spans differ by at most `max_diff_am` and whose ends are at
    /// most `max_diff_at_am` positions apart.  `None` disables the respective filter.
    pub fn new(
        bps_a: &BasePairs,
        bps_b: &BasePairs,
        max_diff_am: Option<usize>,
        max_diff_at_am: Option<usize>,
    ) -> Self {
        let admissible = |a: &Arc, b: &Arc| {
            let span_ok = max_diff_am.map_or(true, |d| a.span().abs_diff(b.span()) <= d);
            let ends_ok = max_diff_at_am.map_or(true, |d| {
                a.left().0.abs_diff(b.left().0) <= d && a.right().0.abs_diff(b.right().0) <= d
            });
            span_ok && ends_ok
        };

        let mut matches = Vec::new();
        for al in (1..=bps_a.len()).rev().map(SeqPos) {
            for bl in (1..=bps_b.len()).rev().map(SeqPos) {
                for (arc_a, arc_b) in bps_a
                    .left_adjlist(al)
                    .cartesian_product(bps_b.left_adjlist(bl).collect_vec())
                {
                    if admissible(&arc_a, &arc_b) {
                        matches.push(ArcMatch { arc_a, arc_b });
                    }
                }
            }
        }
        Self { matches }
    }

    pub fn len(&self) -> usize {
        self.matches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.matches.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ArcMatch> {
        self.matches.iter()
    }
}
