use std::collections::HashMap;

use anyhow::{bail, ensure, Result};

use super::{base_pairs::ArcRef, coords::SeqPos};

/// Probabilities the sparsification consults when deciding which positions and arcs are valid
/// inside a loop.
pub trait LoopProbabilities {
    /// The probability that `pos` is unpaired in the loop closed by `closing`.
    fn prob_unpaired_in_loop(&self, pos: SeqPos, closing: &ArcRef) -> f64;

    /// The probability that `inner` is a base pair directly inside the loop closed by `closing`.
    fn prob_basepair_in_loop(&self, inner: &ArcRef, closing: &ArcRef) -> f64;
}

/// An RNA sequence together with its base pair probabilities.
#[derive(Clone, Debug)]
pub struct RnaData {
    name: String,
    seq: Vec<u8>,
    bp_probs: Vec<(usize, usize, f64)>,
    bp_index: HashMap<(usize, usize), f64>,
    unpaired: Vec<f64>,
}

/// Upper-cases the sequence and converts DNA to RNA.
pub fn normalize_rna_sequence(seq: &[u8]) -> Vec<u8> {
    seq.iter()
        .map(|b| match b.to_ascii_uppercase() {
            b'T' => b'U',
            other => other,
        })
        .collect()
}

impl RnaData {
    /// Builds the RNA from its sequence and `(i, j, p)` base pair probabilities (1-based, i < j).
    pub fn new(name: &str, seq: &[u8], bp_probs: Vec<(usize, usize, f64)>) -> Result<Self> {
        let seq = normalize_rna_sequence(seq);
        let len = seq.len();
        let mut paired = vec![0.0; len + 1];
        let mut bp_index = HashMap::with_capacity(bp_probs.len());
        for &(i, j, p) in &bp_probs {
            ensure!(
                1 <= i && i < j && j <= len,
                "Base pair ({i}, {j}) is out of range for '{name}' of length {len}"
            );
            ensure!(
                (0.0..=1.0).contains(&p),
                "Base pair ({i}, {j}) of '{name}' has invalid probability {p}"
            );
            paired[i] += p;
            paired[j] += p;
            let entry = bp_index.entry((i, j)).or_insert(0.0);
            *entry = f64::max(*entry, p);
        }
        let unpaired = paired.iter().map(|p| (1.0 - p).clamp(0.0, 1.0)).collect();
        Ok(Self {
            name: name.to_string(),
            seq,
            bp_probs,
            bp_index,
            unpaired,
        })
    }

    /// Builds the RNA from a fixed dot-bracket structure; every pair gets probability one.
    pub fn from_structure(name: &str, seq: &[u8], structure: &str) -> Result<Self> {
        ensure!(
            structure.len() == seq.len(),
            "Structure length {} does not match sequence length {} for '{name}'",
            structure.len(),
            seq.len()
        );
        let mut stack = Vec::new();
        let mut pairs = Vec::new();
        for (offset, c) in structure.chars().enumerate() {
            let pos = offset + 1;
            match c {
                '(' => stack.push(pos),
                ')' => match stack.pop() {
                    Some(left) => pairs.push((left, pos, 1.0)),
                    None => bail!("Unbalanced ')' at position {pos} in structure of '{name}'"),
                },
                '.' | '-' | ' ' => (),
                _ => bail!("Unexpected character '{c}' in structure of '{name}'"),
            }
        }
        ensure!(
            stack.is_empty(),
            "Unbalanced '(' in structure of '{name}'"
        );
        Self::new(name, seq, pairs)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn seq(&self) -> &[u8] {
        &self.seq
    }

    pub fn len(&self) -> usize {
        self.seq.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seq.is_empty()
    }

    pub fn bp_probs(&self) -> &[(usize, usize, f64)] {
        &self.bp_probs
    }

    /// The probability that `pos` is unpaired.
    pub fn prob_unpaired(&self, pos: SeqPos) -> f64 {
        self.unpaired[pos.0]
    }

    /// The probability of the base pair `(i, j)`, or zero if it was not given.
    pub fn prob_basepair(&self, i: SeqPos, j: SeqPos) -> f64 {
        self.bp_index.get(&(i.0, j.0)).copied().unwrap_or(0.0)
    }
}

// Loop-conditional probabilities are approximated by the unconditional ones, so the closing arc
// does not change the answer.
impl LoopProbabilities for RnaData {
    fn prob_unpaired_in_loop(&self, pos: SeqPos, _closing: &ArcRef) -> f64 {
        self.prob_unpaired(pos)
    }

    fn prob_basepair_in_loop(&self, inner: &ArcRef, _closing: &ArcRef) -> f64 {
        self.prob_basepair(inner.left(), inner.right())
    }
}
