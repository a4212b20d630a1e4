use std::fmt;

use anyhow::{ensure, Result};

use crate::{
    align::score::InftyScore,
    rna::coords::{SeqPos, Side},
};

/// Why a position is aligned to a gap.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum GapKind {
    /// An explicit base insertion or deletion
    Regular,
    /// A base deleted together with an enclosing arc
    Loop,
    /// A base skipped over because sparsification left it out of every matrix
    Sparse,
}

impl GapKind {
    pub fn symbol(self) -> char {
        match self {
            GapKind::Regular => '-',
            GapKind::Loop => '~',
            GapKind::Sparse => '_',
        }
    }
}

/// One side of an alignment column.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum AlignedPos {
    Pos(SeqPos),
    Gap(GapKind),
}

impl AlignedPos {
    pub fn pos(self) -> Option<SeqPos> {
        match self {
            AlignedPos::Pos(pos) => Some(pos),
            AlignedPos::Gap(_) => None,
        }
    }

    pub fn is_gap(self) -> bool {
        matches!(self, AlignedPos::Gap(_))
    }
}

/// A column of a pairwise alignment.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct Column {
    pub a: AlignedPos,
    pub b: AlignedPos,
}

impl Column {
    pub fn get(&self, side: Side) -> AlignedPos {
        match side {
            Side::A => self.a,
            Side::B => self.b,
        }
    }
}

/// A structural alignment of two RNAs: the aligned columns in order plus the base pairs of
/// either sequence that take part in the alignment.  Base pairs that were matched to a base pair
/// of the other sequence are kept separately from base pairs that were deleted.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Alignment {
    /// Alignment score
    pub score: InftyScore,

    /// Length of the first sequence
    pub len_a: usize,

    /// Length of the second sequence
    pub len_b: usize,

    columns: Vec<Column>,
    basepairs_a: Vec<(SeqPos, SeqPos)>,
    basepairs_b: Vec<(SeqPos, SeqPos)>,
    deleted_basepairs_a: Vec<(SeqPos, SeqPos)>,
    deleted_basepairs_b: Vec<(SeqPos, SeqPos)>,
}

impl Alignment {
    pub fn new(len_a: usize, len_b: usize) -> Self {
        Self {
            score: InftyScore::NEG_INFTY,
            len_a,
            len_b,
            columns: Vec::with_capacity(len_a + len_b),
            basepairs_a: Vec::new(),
            basepairs_b: Vec::new(),
            deleted_basepairs_a: Vec::new(),
            deleted_basepairs_b: Vec::new(),
        }
    }

    pub fn clear(&mut self) {
        self.score = InftyScore::NEG_INFTY;
        self.columns.clear();
        self.basepairs_a.clear();
        self.basepairs_b.clear();
        self.deleted_basepairs_a.clear();
        self.deleted_basepairs_b.clear();
    }

    pub fn append(&mut self, a: AlignedPos, b: AlignedPos) {
        debug_assert!(!(a.is_gap() && b.is_gap()), "a column must align a base");
        self.columns.push(Column { a, b });
    }

    /// Appends a column aligning `pos` of sequence `side` to a gap.
    pub fn append_gapped(&mut self, side: Side, pos: SeqPos, gap: GapKind) {
        match side {
            Side::A => self.append(AlignedPos::Pos(pos), AlignedPos::Gap(gap)),
            Side::B => self.append(AlignedPos::Gap(gap), AlignedPos::Pos(pos)),
        }
    }

    pub fn append_match(&mut self, i: SeqPos, j: SeqPos) {
        self.append(AlignedPos::Pos(i), AlignedPos::Pos(j));
    }

    pub fn add_basepair(&mut self, side: Side, left: SeqPos, right: SeqPos) {
        match side {
            Side::A => self.basepairs_a.push((left, right)),
            Side::B => self.basepairs_b.push((left, right)),
        }
    }

    pub fn add_deleted_basepair(&mut self, side: Side, left: SeqPos, right: SeqPos) {
        match side {
            Side::A => self.deleted_basepairs_a.push((left, right)),
            Side::B => self.deleted_basepairs_b.push((left, right)),
        }
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn basepairs(&self, side: Side) -> &[(SeqPos, SeqPos)] {
        match side {
            Side::A => &self.basepairs_a,
            Side::B => &self.basepairs_b,
        }
    }

    pub fn deleted_basepairs(&self, side: Side) -> &[(SeqPos, SeqPos)] {
        match side {
            Side::A => &self.deleted_basepairs_a,
            Side::B => &self.deleted_basepairs_b,
        }
    }

    fn seq_len(&self, side: Side) -> usize {
        match side {
            Side::A => self.len_a,
            Side::B => self.len_b,
        }
    }

    /// Checks that every position of both sequences is aligned exactly once, in increasing
    /// order, and that every recorded base pair refers to positions of its sequence.
    pub fn validate(&self) -> Result<()> {
        for side in [Side::A, Side::B] {
            let mut expected = 1;
            for (col, column) in self.columns.iter().enumerate() {
                if let Some(pos) = column.get(side).pos() {
                    ensure!(
                        pos.0 == expected,
                        "Column {col} aligns position {pos} of {side:?}, expected {expected}"
                    );
                    expected += 1;
                }
            }
            ensure!(
                expected == self.seq_len(side) + 1,
                "Only {} of {} positions of {side:?} are aligned",
                expected - 1,
                self.seq_len(side)
            );
            for &(left, right) in self
                .basepairs(side)
                .iter()
                .chain(self.deleted_basepairs(side))
            {
                ensure!(
                    left.0 >= 1 && left < right && right.0 <= self.seq_len(side),
                    "Invalid base pair ({left}, {right}) of {side:?}"
                );
            }
        }
        Ok(())
    }

    /// Renders both rows of the alignment.  With `special_gap_symbols` loop and sparsification
    /// gaps are told apart from regular gaps, otherwise every gap is a `-`.
    pub fn aligned_strings(
        &self,
        seq_a: &[u8],
        seq_b: &[u8],
        special_gap_symbols: bool,
    ) -> (String, String) {
        let row = |side: Side, seq: &[u8]| {
            self.columns
                .iter()
                .map(|column| match column.get(side) {
                    AlignedPos::Pos(pos) => seq[pos.0 - 1] as char,
                    AlignedPos::Gap(kind) if special_gap_symbols => kind.symbol(),
                    AlignedPos::Gap(_) => '-',
                })
                .collect::<String>()
        };
        (row(Side::A, seq_a), row(Side::B, seq_b))
    }

    /// Renders the structure of one sequence along the alignment in dot-bracket notation; deleted
    /// base pairs are shown with square brackets.
    pub fn structure_string(&self, side: Side) -> String {
        let len = self.seq_len(side);
        let mut symbols = vec!['.'; len + 1];
        for &(left, right) in self.basepairs(side) {
            symbols[left.0] = '(';
            symbols[right.0] = ')';
        }
        for &(left, right) in self.deleted_basepairs(side) {
            symbols[left.0] = '[';
            symbols[right.0] = ']';
        }
        self.columns
            .iter()
            .map(|column| match column.get(side) {
                AlignedPos::Pos(pos) => symbols[pos.0],
                AlignedPos::Gap(_) => '-',
            })
            .collect()
    }
}

impl fmt::Display for Alignment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for column in &self.columns {
            let render = |p: AlignedPos| match p {
                AlignedPos::Pos(pos) => pos.to_string(),
                AlignedPos::Gap(kind) => kind.symbol().to_string(),
            };
            write!(f, "({},{})", render(column.a), render(column.b))?;
        }
        Ok(())
    }
}
