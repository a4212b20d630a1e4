use std::io::Write;

use anyhow::{Context, Result};
use itertools::Itertools;

use super::alignment::Alignment;
use crate::rna::coords::Side;

/// Default number of columns per block.
pub const DEFAULT_WIDTH: usize = 120;

/// Writes alignments as blocks of named rows, optionally followed by the structure of either
/// sequence along the alignment.
pub struct AlignmentWriter<W: Write> {
    writer: W,
    width: usize,
    special_gap_symbols: bool,
    write_structure: bool,
}

impl<W: Write> AlignmentWriter<W> {
    /// Creates a writer breaking rows after `width` columns; zero writes every row on one line.
    pub fn new(writer: W, width: usize, special_gap_symbols: bool, write_structure: bool) -> Self {
        Self {
            writer,
            width,
            special_gap_symbols,
            write_structure,
        }
    }

    pub fn write(
        &mut self,
        alignment: &Alignment,
        names: (&str, &str),
        seqs: (&[u8], &[u8]),
    ) -> Result<()> {
        let (row_a, row_b) = alignment.aligned_strings(seqs.0, seqs.1, self.special_gap_symbols);
        let mut rows = vec![(names.0.to_string(), row_a), (names.1.to_string(), row_b)];
        if self.write_structure {
            rows.push((format!("#S {}", names.0), alignment.structure_string(Side::A)));
            rows.push((format!("#S {}", names.1), alignment.structure_string(Side::B)));
        }
        let name_width = rows.iter().map(|(name, _)| name.len()).max().unwrap_or(0) + 2;
        let width = if self.width == 0 {
            alignment.len().max(1)
        } else {
            self.width
        };

        writeln!(self.writer, "score: {}", alignment.score).context("Error writing alignment")?;
        for start in (0..alignment.len()).step_by(width) {
            writeln!(self.writer)?;
            for (name, row) in &rows {
                let block = row.chars().skip(start).take(width).join("");
                writeln!(self.writer, "{name:<name_width$}{block}")?;
            }
        }
        self.writer.flush()?;
        Ok(())
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

#[cfg(test)]
mod tests {
    use super::AlignmentWriter;
    use crate::{
        align::{
            alignment::{Alignment, GapKind},
            score::InftyScore,
        },
        rna::coords::{SeqPos, Side},
    };

    fn alignment() -> Alignment {
        let mut alignment = Alignment::new(4, 5);
        alignment.add_basepair(Side::A, SeqPos(1), SeqPos(4));
        alignment.add_basepair(Side::B, SeqPos(1), SeqPos(5));
        alignment.append_match(SeqPos(1), SeqPos(1));
        alignment.append_match(SeqPos(2), SeqPos(2));
        alignment.append_gapped(Side::B, SeqPos(3), GapKind::Loop);
        alignment.append_match(SeqPos(3), SeqPos(4));
        alignment.append_match(SeqPos(4), SeqPos(5));
        alignment.score = InftyScore::new(420);
        alignment
    }

    fn write(width: usize, special: bool, structure: bool) -> String {
        let mut writer = AlignmentWriter::new(Vec::new(), width, special, structure);
        writer
            .write(&alignment(), ("seq1", "s2"), (b"GAAC", b"GAUAC"))
            .unwrap();
        String::from_utf8(writer.into_inner()).unwrap()
    }

    #[test]
    fn test_single_block() {
        assert_eq!(
            write(0, false, false),
            "score: 420\n\nseq1  GA-AC\ns2    GAUAC\n"
        );
    }

    #[test]
    fn test_blocks_with_structure() {
        let expected = "score: 420\n\n\
            seq1     GA~\n\
            s2       GAU\n\
            #S seq1  (.-\n\
            #S s2    (..\n\
            \n\
            seq1     AC\n\
            s2       AC\n\
            #S seq1  .)\n\
            #S s2    .)\n";
        assert_eq!(write(3, true, true), expected);
    }
}
