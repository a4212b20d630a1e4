use std::{
    cmp::max,
    fmt,
    ops::{Add, AddAssign},
};

/// A finite alignment score.
pub type Score = i32;

/// A score of the max-plus semiring: either a finite [`Score`] or negative infinity.
///
/// Negative infinity absorbs additions (`-inf + x == -inf`) and is smaller than every finite
/// score, so taking the maximum over candidates ignores impossible ones.  Comparisons between
/// finite values and negative infinity are well defined, which the traceback relies on when it
/// re-derives which branch produced a stored optimum.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct InftyScore(Option<Score>);

impl InftyScore {
    pub const NEG_INFTY: InftyScore = InftyScore(None);
    pub const ZERO: InftyScore = InftyScore(Some(0));

    pub const fn new(score: Score) -> Self {
        Self(Some(score))
    }

    pub fn is_neg_infty(self) -> bool {
        self.0.is_none()
    }

    pub fn is_finite(self) -> bool {
        self.0.is_some()
    }

    /// Applies `f` to a finite value; negative infinity stays negative infinity.
    pub fn map<F: FnOnce(Score) -> Score>(self, f: F) -> Self {
        Self(self.0.map(f))
    }

    /// Replaces `self` by `other` if `other` is strictly greater.
    #[inline(always)]
    pub fn improve(&mut self, other: InftyScore) {
        *self = max(*self, other);
    }
}

impl Add for InftyScore {
    type Output = InftyScore;

    #[inline(always)]
    fn add(self, rhs: InftyScore) -> InftyScore {
        match (self.0, rhs.0) {
            (Some(a), Some(b)) => InftyScore(Some(a + b)),
            _ => InftyScore::NEG_INFTY,
        }
    }
}

impl Add<Score> for InftyScore {
    type Output = InftyScore;

    #[inline(always)]
    fn add(self, rhs: Score) -> InftyScore {
        InftyScore(self.0.map(|a| a + rhs))
    }
}

impl AddAssign<Score> for InftyScore {
    fn add_assign(&mut self, rhs: Score) {
        *self = *self + rhs;
    }
}

impl fmt::Debug for InftyScore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl fmt::Display for InftyScore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(score) => write!(f, "{score}"),
            None => write!(f, "-inf"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::InftyScore;
    use rstest::rstest;
    use std::cmp::max;

    const NEG: InftyScore = InftyScore::NEG_INFTY;

    #[rstest]
    #[case(InftyScore::new(3), InftyScore::new(-5), InftyScore::new(-2))]
    #[case(InftyScore::new(3), NEG, NEG)]
    #[case(NEG, InftyScore::new(3), NEG)]
    #[case(NEG, NEG, NEG)]
    fn test_add(#[case] a: InftyScore, #[case] b: InftyScore, #[case] expected: InftyScore) {
        assert_eq!(a + b, expected);
    }

    #[test]
    fn test_add_finite() {
        assert_eq!(InftyScore::new(10) + -4, InftyScore::new(6));
        assert_eq!(NEG + 1_000_000, NEG);
        let mut score = InftyScore::ZERO;
        score += 7;
        assert_eq!(score, InftyScore::new(7));
    }

    #[test]
    fn test_ordering() {
        assert!(NEG < InftyScore::new(i32::MIN));
        assert!(InftyScore::new(-1) < InftyScore::ZERO);
        assert_eq!(max(NEG, InftyScore::new(-100)), InftyScore::new(-100));
        let mut best = NEG;
        best.improve(InftyScore::new(-3));
        best.improve(NEG);
        best.improve(InftyScore::new(-5));
        assert_eq!(best, InftyScore::new(-3));
    }

    #[test]
    fn test_map_and_display() {
        assert_eq!(InftyScore::new(4).map(|s| s * 2), InftyScore::new(8));
        assert_eq!(NEG.map(|s| s * 2), NEG);
        assert_eq!(NEG.to_string(), "-inf");
        assert_eq!(InftyScore::new(-12).to_string(), "-12");
        assert!(NEG.is_neg_infty());
        assert!(InftyScore::ZERO.is_finite());
    }
}
