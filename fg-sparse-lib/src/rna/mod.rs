//! RNA inputs of the aligner: sequences with base pair probabilities, the candidate arcs of each
//! sequence, the admissible arc matches between them, and the sparsified loops.

pub mod anchors;
pub mod arc_matches;
pub mod base_pairs;
pub mod coords;
pub mod io;
pub mod rna_data;
pub mod sparsification;
