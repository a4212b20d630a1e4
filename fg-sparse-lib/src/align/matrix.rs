use std::marker::PhantomData;

use crate::{
    align::score::InftyScore,
    rna::{
        base_pairs::ArcRef,
        coords::{ArcSlot, MatPos, SeqPos, Side},
    },
};

/// A coordinate type that may index one dimension of a [`Matrix`].
pub trait MatrixIndex: Copy {
    fn index(self) -> usize;
}

impl MatrixIndex for SeqPos {
    #[inline(always)]
    fn index(self) -> usize {
        self.0
    }
}

impl MatrixIndex for MatPos {
    #[inline(always)]
    fn index(self) -> usize {
        self.0
    }
}

impl MatrixIndex for ArcSlot {
    #[inline(always)]
    fn index(self) -> usize {
        self.0
    }
}

/// A dense two-dimensional matrix stored row-major, indexed by typed coordinates `R` (rows) and
/// `C` (columns) so that, e.g., a matrix over sequence positions cannot be read with matrix
/// positions.
#[derive(Clone, Debug)]
pub struct Matrix<R: MatrixIndex, C: MatrixIndex, T: Copy> {
    rows: usize,
    cols: usize,
    cells: Vec<T>,
    _index: PhantomData<(R, C)>,
}

impl<R: MatrixIndex, C: MatrixIndex, T: Copy> Matrix<R, C, T> {
    /// Creates a `rows` by `cols` matrix with every cell set to `value`.
    pub fn new(rows: usize, cols: usize, value: T) -> Self {
        Self {
            rows,
            cols,
            cells: vec![value; rows * cols],
            _index: PhantomData,
        }
    }

    #[inline(always)]
    pub fn get(&self, i: R, j: C) -> T {
        debug_assert!(i.index() < self.rows);
        debug_assert!(j.index() < self.cols);
        self.cells[i.index() * self.cols + j.index()]
    }

    #[inline(always)]
    pub fn set(&mut self, i: R, j: C, value: T) {
        debug_assert!(i.index() < self.rows);
        debug_assert!(j.index() < self.cols);
        self.cells[i.index() * self.cols + j.index()] = value;
    }

    /// Resizes to `rows` by `cols` and sets every cell to `value`.
    pub fn fill(&mut self, rows: usize, cols: usize, value: T) {
        self.rows = rows;
        self.cols = cols;
        self.cells.clear();
        self.cells.resize(rows * cols, value);
    }
}

/// Scores indexed by a pair of arcs, one of A and one of B.  Either arc may be the empty arc,
/// which is stored one past the last real arc of its sequence.
#[derive(Clone, Debug)]
pub struct ArcPairMatrix {
    num_bps_a: usize,
    num_bps_b: usize,
    cells: Matrix<ArcSlot, ArcSlot, InftyScore>,
}

impl ArcPairMatrix {
    pub fn new(num_bps_a: usize, num_bps_b: usize) -> Self {
        Self {
            num_bps_a,
            num_bps_b,
            cells: Matrix::new(num_bps_a + 1, num_bps_b + 1, InftyScore::NEG_INFTY),
        }
    }

    #[inline(always)]
    pub fn get(&self, arc_a: &ArcRef, arc_b: &ArcRef) -> InftyScore {
        self.cells
            .get(arc_a.slot(self.num_bps_a), arc_b.slot(self.num_bps_b))
    }

    #[inline(always)]
    pub fn set(&mut self, arc_a: &ArcRef, arc_b: &ArcRef, value: InftyScore) {
        self.cells
            .set(arc_a.slot(self.num_bps_a), arc_b.slot(self.num_bps_b), value);
    }

    /// Looks up the entry for `arc_x` of sequence `side` and `arc_y` of the other sequence.
    #[inline(always)]
    pub fn get_side(&self, arc_x: &ArcRef, arc_y: &ArcRef, side: Side) -> InftyScore {
        match side {
            Side::A => self.get(arc_x, arc_y),
            Side::B => self.get(arc_y, arc_x),
        }
    }

    pub fn set_side(&mut self, arc_x: &ArcRef, arc_y: &ArcRef, side: Side, value: InftyScore) {
        match side {
            Side::A => self.set(arc_x, arc_y, value),
            Side::B => self.set(arc_y, arc_x, value),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{ArcPairMatrix, Matrix};
    use crate::{
        align::score::InftyScore,
        rna::{
            base_pairs::{Arc, ArcRef},
            coords::{ArcIdx, ArcSlot, MatPos, SeqPos, Side},
        },
    };

    #[test]
    fn test_get_and_set() {
        let mut matrix: Matrix<MatPos, ArcSlot, i32> = Matrix::new(3, 2, -1);
        assert_eq!(matrix.get(MatPos(2), ArcSlot(1)), -1);
        matrix.set(MatPos(2), ArcSlot(1), 7);
        matrix.set(MatPos(0), ArcSlot(0), 3);
        assert_eq!(matrix.get(MatPos(2), ArcSlot(1)), 7);
        assert_eq!(matrix.get(MatPos(0), ArcSlot(0)), 3);
        assert_eq!(matrix.get(MatPos(1), ArcSlot(1)), -1);
    }

    #[test]
    fn test_fill() {
        let mut matrix: Matrix<MatPos, MatPos, i32> = Matrix::new(1, 1, 0);
        matrix.fill(4, 5, 9);
        assert_eq!(matrix.get(MatPos(3), MatPos(4)), 9);
    }

    #[test]
    fn test_arc_pair_matrix() {
        let arc_a = ArcRef::Real(Arc::new(ArcIdx(1), SeqPos(2), SeqPos(9)));
        let arc_b = ArcRef::Real(Arc::new(ArcIdx(0), SeqPos(1), SeqPos(4)));
        let mut matrix = ArcPairMatrix::new(2, 1);
        assert_eq!(matrix.get(&arc_a, &arc_b), InftyScore::NEG_INFTY);
        matrix.set(&arc_a, &arc_b, InftyScore::new(5));
        matrix.set(&arc_a, &ArcRef::Empty, InftyScore::new(-3));
        matrix.set_side(&arc_b, &ArcRef::Empty, Side::B, InftyScore::new(-8));
        assert_eq!(matrix.get(&arc_a, &arc_b), InftyScore::new(5));
        assert_eq!(matrix.get_side(&arc_b, &arc_a, Side::B), InftyScore::new(5));
        assert_eq!(matrix.get(&arc_a, &ArcRef::Empty), InftyScore::new(-3));
        assert_eq!(matrix.get(&ArcRef::Empty, &arc_b), InftyScore::new(-8));
    }
}
