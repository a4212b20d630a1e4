use super::command::Command;
use anyhow::{ensure, Result};
use clap::Parser;
use itertools::Itertools;
use log::info;
use sparse::{
    align::{
        aligners::{constants::DEFAULT_MAX_DIFF_AM, Builder},
        io::{AlignmentWriter, DEFAULT_WIDTH},
    },
    rna::{
        anchors::AnchorConstraints,
        io::{read_bp_probs_path, read_fasta_path, NamedSeq},
        rna_data::RnaData,
    },
    util::version::built_info,
};
use std::{io, path::PathBuf};

////////////////////////////////////////////////////////////////////////////////
// Align (main class) and it's impls
////////////////////////////////////////////////////////////////////////////////

/// Aligns two RNAs by sequence and structure with the sparsified Sankoff recursion.
///
/// Both RNAs are read from a single FASTA file with exactly two records.  The structure of each
/// RNA is given as base pair probabilities (`--bp-probs-a`, `--bp-probs-b`), one `i j p` triple
/// per line with 1-based positions.  Without a probability file an RNA has no base pairs and is
/// aligned by sequence only.
///
/// The alignment is written to standard output: first the score, then blocks of `--width`
/// columns.
///
/// ## Sparsification
///
/// Inside the loop closed by a base pair, only positions that are likely unpaired in that loop
/// (`--prob-unpaired-in-loop-threshold`) and base pairs that are likely in that loop
/// (`--prob-basepair-in-loop-threshold`) are considered.  Setting both thresholds to zero yields
/// the full Sankoff recursion.
#[derive(Parser, Debug, Clone)]
#[clap(version = built_info::VERSION.as_str(), term_width=0)]
pub struct Align {
    /// The path to the input FASTA with the two RNA sequences.
    #[clap(long, short = 'f', display_order = 1)]
    fasta: PathBuf,

    /// Base pair probabilities of the first RNA.
    #[clap(long, short = 'a', display_order = 2)]
    bp_probs_a: Option<PathBuf>,

    /// Base pair probabilities of the second RNA.
    #[clap(long, short = 'b', display_order = 3)]
    bp_probs_b: Option<PathBuf>,

    /// Positions (1-based) of the first RNA that must not be aligned to a gap.
    #[clap(long, num_args = 1.., display_order = 4)]
    anchors_a: Vec<usize>,

    /// Positions (1-based) of the second RNA that must not be aligned to a gap.
    #[clap(long, num_args = 1.., display_order = 5)]
    anchors_b: Vec<usize>,

    /// Score for a base match
    #[clap(long, short = 'A', default_value = "50", display_order = 6)]
    match_score: i32,

    /// Score for a base mismatch
    #[clap(
        long,
        short = 'B',
        default_value = "0",
        allow_hyphen_values = true,
        display_order = 7
    )]
    mismatch_score: i32,

    /// Score per deleted or inserted base (must not be positive)
    #[clap(
        long,
        short = 'E',
        default_value = "-350",
        allow_hyphen_values = true,
        display_order = 8
    )]
    indel: i32,

    /// Score per base deleted with an enclosing base pair (must not be positive)
    #[clap(long, default_value = "-350", allow_hyphen_values = true, display_order = 9)]
    indel_loop: i32,

    /// Score for opening a gap (must not be positive); a gap of size k costs '{O} + {E}*k'
    #[clap(
        long,
        short = 'O',
        default_value = "-600",
        allow_hyphen_values = true,
        display_order = 10
    )]
    indel_opening: i32,

    /// Score for opening a gap by deleting a base pair (must not be positive)
    #[clap(long, default_value = "-900", allow_hyphen_values = true, display_order = 11)]
    indel_opening_loop: i32,

    /// Maximal weight of a base pair, reached by base pairs of probability one
    #[clap(long, short = 's', default_value = "200", display_order = 12)]
    struct_weight: i32,

    /// Contribution of the sequence similarity of matched base pairs, in percent
    #[clap(long, short = 't', default_value = "100", display_order = 13)]
    tau: i32,

    /// Expected base pair probability, defaults to 1/(2*length) per RNA
    #[clap(long, display_order = 14)]
    exp_prob: Option<f64>,

    /// Ignore base pairs with a lower probability
    #[clap(long, short = 'p', default_value = "0.0005", display_order = 15)]
    min_prob: f64,

    /// Ignore base pairs spanning more positions
    #[clap(long, display_order = 16)]
    max_bp_span: Option<usize>,

    /// Minimum probability of a position to be unpaired in a loop to be considered in that loop
    #[clap(long, default_value = "0.00005", display_order = 17)]
    prob_unpaired_in_loop_threshold: f64,

    /// Minimum probability of a base pair in a loop to be considered in that loop
    #[clap(long, default_value = "0.0001", display_order = 18)]
    prob_basepair_in_loop_threshold: f64,

    /// Maximal difference of the spans of two matched base pairs
    #[clap(long, default_value_t = DEFAULT_MAX_DIFF_AM, display_order = 19)]
    max_diff_am: usize,

    /// Match base pairs regardless of the difference of their spans
    #[clap(long, default_value = "false", display_order = 20)]
    no_max_diff_am: bool,

    /// Maximal distance of the ends of two matched base pairs
    #[clap(long, display_order = 21)]
    max_diff_at_am: Option<usize>,

    /// Delete base pairs of at least this span as whole domains; zero disables domain deletion
    #[clap(long, default_value = "0", display_order = 22)]
    multiloop_deletion: usize,

    /// Write loop deletions and sparsified positions with their own gap symbols
    #[clap(long, default_value = "false", display_order = 23)]
    special_gap_symbols: bool,

    /// Write the structures of both RNAs below the alignment
    #[clap(long, default_value = "false", display_order = 24)]
    write_structure: bool,

    /// Number of alignment columns per block, zero for a single block
    #[clap(long, short = 'w', default_value_t = DEFAULT_WIDTH, display_order = 25)]
    width: usize,

    /// Structure local alignment (not supported)
    #[clap(long, default_value = "false", display_order = 26)]
    struct_local: bool,

    /// Sequence local alignment (not supported)
    #[clap(long, default_value = "false", display_order = 27)]
    sequ_local: bool,

    /// Stacking terms (not supported)
    #[clap(long, default_value = "false", display_order = 28)]
    stacking: bool,

    /// Forbid base pairs without a stacked neighbor (not supported)
    #[clap(long, default_value = "false", display_order = 29)]
    no_lonely_pairs: bool,

    /// Report suboptimal alignments (not supported)
    #[clap(long, default_value = "false", display_order = 30)]
    suboptimal: bool,

    /// Length-normalized alignment with the given lambda (not supported)
    #[clap(long, display_order = 31)]
    normalized: Option<i32>,
}

impl Align {
    /// Reads one RNA, with base pair probabilities if given.
    fn read_rna(record: &NamedSeq, bp_probs: &Option<PathBuf>) -> Result<RnaData> {
        let probs = match bp_probs {
            Some(path) => {
                info!(
                    "Reading base pair probabilities of {} from {}",
                    record.name,
                    path.display()
                );
                read_bp_probs_path(path)?
            }
            None => Vec::new(),
        };
        RnaData::new(&record.name, &record.seq, probs)
    }

    /// Executes the align command
    pub fn execute(&self) -> anyhow::Result<()> {
        info!("Reading sequences from {}", self.fasta.display());
        let records = read_fasta_path(&self.fasta)?;
        ensure!(
            records.len() == 2,
            "Expected two sequences in {}, found {}: {}",
            self.fasta.display(),
            records.len(),
            records.iter().map(|record| &record.name).join(", ")
        );
        let rna_a = Self::read_rna(&records[0], &self.bp_probs_a)?;
        let rna_b = Self::read_rna(&records[1], &self.bp_probs_b)?;
        let anchors =
            AnchorConstraints::new(rna_a.len(), rna_b.len(), &self.anchors_a, &self.anchors_b)?;

        let max_diff_am = if self.no_max_diff_am {
            None
        } else {
            Some(self.max_diff_am)
        };
        let problem = Builder::default()
            .match_score(self.match_score)
            .mismatch_score(self.mismatch_score)
            .indel(self.indel)
            .indel_loop(self.indel_loop)
            .indel_opening(self.indel_opening)
            .indel_opening_loop(self.indel_opening_loop)
            .struct_weight(self.struct_weight)
            .tau_factor(self.tau)
            .exp_prob(self.exp_prob)
            .min_prob(self.min_prob)
            .max_bp_span(self.max_bp_span)
            .prob_unpaired_in_loop_threshold(self.prob_unpaired_in_loop_threshold)
            .prob_basepair_in_loop_threshold(self.prob_basepair_in_loop_threshold)
            .max_diff_am(max_diff_am)
            .max_diff_at_am(self.max_diff_at_am)
            .multiloop_deletion(self.multiloop_deletion)
            .struct_local(self.struct_local)
            .sequ_local(self.sequ_local)
            .stacking(self.stacking)
            .no_lonely_pairs(self.no_lonely_pairs)
            .suboptimal(self.suboptimal)
            .normalized(self.normalized)
            .build_problem(&rna_a, &rna_b, anchors)?;

        info!(
            "Aligning {} ({} nt) and {} ({} nt)",
            rna_a.name(),
            rna_a.len(),
            rna_b.name(),
            rna_b.len()
        );
        let mut aligner = problem.aligner()?;
        let alignment = aligner.trace()?;
        info!("Alignment score: {}", alignment.score);

        let mut writer = AlignmentWriter::new(
            io::stdout().lock(),
            self.width,
            self.special_gap_symbols,
            self.write_structure,
        );
        writer.write(
            alignment,
            (rna_a.name(), rna_b.name()),
            (rna_a.seq(), rna_b.seq()),
        )?;
        Ok(())
    }
}

impl Command for Align {
    fn execute(&self) -> anyhow::Result<()> {
        Align::execute(self)
    }
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::Align;

    /// Check that the argument parser works
    #[test]
    fn test_parse() {
        let align = Align::parse_from(["align", "-f", ".", "--anchors-a", "1", "3", "-B", "-10"]);
        assert_eq!(align.anchors_a, vec![1, 3]);
        assert_eq!(align.mismatch_score, -10);
        assert_eq!(align.max_diff_am, 30);
        assert!(align.bp_probs_b.is_none());
    }
}
