//! Default scoring parameters and sparsification heuristics.

/// Score of aligning two identical bases.
pub const DEFAULT_MATCH_SCORE: i32 = 50;

/// Score of aligning two different bases.
pub const DEFAULT_MISMATCH_SCORE: i32 = 0;

/// Score per deleted or inserted base.
pub const DEFAULT_INDEL: i32 = -350;

/// Score per base deleted together with an enclosing arc.
pub const DEFAULT_INDEL_LOOP: i32 = -350;

/// Score of opening a gap.
pub const DEFAULT_INDEL_OPENING: i32 = -600;

/// Score of opening a gap by deleting an arc.
pub const DEFAULT_INDEL_OPENING_LOOP: i32 = -900;

/// Maximal weight of a single arc, reached by arcs of probability one.
pub const DEFAULT_STRUCT_WEIGHT: i32 = 200;

/// Contribution of the sequence similarity of the arc ends to an arc match, in percent.
pub const DEFAULT_TAU_FACTOR: i32 = 100;

/// Base pairs with a lower probability are discarded when the input is read.
pub const DEFAULT_MIN_PROB: f64 = 0.0005;

/// Positions with a lower probability of being unpaired inside a loop are left out of the
/// recursion for that loop.
pub const DEFAULT_PROB_UNPAIRED_IN_LOOP_THRESHOLD: f64 = 0.00005;

/// Arcs with a lower probability of occurring inside a loop are not matched inside that loop.
pub const DEFAULT_PROB_BASEPAIR_IN_LOOP_THRESHOLD: f64 = 0.0001;

/// Arcs whose spans differ by more are never matched.
pub const DEFAULT_MAX_DIFF_AM: usize = 30;
