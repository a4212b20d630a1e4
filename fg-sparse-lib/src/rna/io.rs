use std::{io::BufRead, path::Path};

use anyhow::{bail, ensure, Context, Result};
use fgoxide::io::Io;
use itertools::Itertools;
use seq_io::fasta::{Reader as FastaReader, Record as FastaRecord};

pub const BUFFER_SIZE: usize = 1024 * 1024;

/// A named sequence read from a FASTA file.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NamedSeq {
    pub name: String,
    pub seq: Vec<u8>,
}

/// Converts the FASTA header (which may contain whitespaces) to a sequence name.
fn header_to_name(header: &[u8]) -> Result<String> {
    let header = String::from_utf8_lossy(header);
    header
        .split_whitespace()
        .next()
        .map(std::string::ToString::to_string)
        .context("empty sequence name")
}

/// Reads all records of a FASTA stream.
pub fn read_fasta<R: BufRead>(reader: R) -> Result<Vec<NamedSeq>> {
    let source = FastaReader::with_capacity(reader, BUFFER_SIZE);
    source
        .into_records()
        .map(|record| {
            let record = record.context("Error reading FASTA")?;
            Ok(NamedSeq {
                name: header_to_name(record.head())?,
                seq: record.seq().to_vec(),
            })
        })
        .collect()
}

/// Reads all records of a (possibly gzipped) FASTA file.
pub fn read_fasta_path<P: AsRef<Path>>(path: P) -> Result<Vec<NamedSeq>> {
    let fg_io: Io = Io::new(5, BUFFER_SIZE);
    let reader = fg_io
        .new_reader(&path)
        .with_context(|| format!("Could not open {}", path.as_ref().display()))?;
    let sequences = read_fasta(reader)?;
    ensure!(
        !sequences.is_empty(),
        "Found no sequences in {}",
        path.as_ref().display()
    );
    Ok(sequences)
}

/// Parses base pair probabilities, one `i j p` triple per line with 1-based positions.  Empty
/// lines and lines starting with `#` are skipped.
pub fn read_bp_probs<R: BufRead>(reader: R) -> Result<Vec<(usize, usize, f64)>> {
    let mut probs = Vec::new();
    for (line_number, line) in reader.lines().enumerate() {
        let line = line?;
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let fields = line.split_whitespace().collect_vec();
        if fields.len() != 3 {
            bail!(
                "Expected three fields on line {} but found {}: '{line}'",
                line_number + 1,
                fields.len()
            );
        }
        let i: usize = fields[0]
            .parse()
            .with_context(|| format!("Invalid position on line {}", line_number + 1))?;
        let j: usize = fields[1]
            .parse()
            .with_context(|| format!("Invalid position on line {}", line_number + 1))?;
        let p: f64 = fields[2]
            .parse()
            .with_context(|| format!("Invalid probability on line {}", line_number + 1))?;
        probs.push((i, j, p));
    }
    Ok(probs)
}

/// Reads base pair probabilities from a (possibly gzipped) file.
pub fn read_bp_probs_path<P: AsRef<Path>>(path: P) -> Result<Vec<(usize, usize, f64)>> {
    let fg_io: Io = Io::new(5, BUFFER_SIZE);
    let reader = fg_io
        .new_reader(&path)
        .with_context(|| format!("Could not open {}", path.as_ref().display()))?;
    read_bp_probs(reader).with_context(|| format!("Could not parse {}", path.as_ref().display()))
}

#[cfg(test)]
mod tests {
    use super::{read_bp_probs, read_fasta};
    use rstest::rstest;

    #[test]
    fn test_read_fasta() {
        let fasta = b">first some description\nGGAC\nUUCC\n>second\nacgu\n";
        let seqs = read_fasta(&fasta[..]).unwrap();
        assert_eq!(seqs.len(), 2);
        assert_eq!(seqs[0].name, "first");
        assert_eq!(seqs[0].seq, b"GGACUUCC".to_vec());
        assert_eq!(seqs[1].name, "second");
        assert_eq!(seqs[1].seq, b"acgu".to_vec());
    }

    #[test]
    fn test_read_bp_probs() {
        let text = b"# i j p\n1 10 0.9\n\n  2 9 0.25  \n";
        let probs = read_bp_probs(&text[..]).unwrap();
        assert_eq!(probs, vec![(1, 10, 0.9), (2, 9, 0.25)]);
    }

    #[rstest]
    #[case("1 10\n")]
    #[case("1 10 0.5 3\n")]
    #[case("a 10 0.5\n")]
    #[case("1 10 high\n")]
    fn test_read_bp_probs_errors(#[case] text: &str) {
        assert!(read_bp_probs(text.as_bytes()).is_err());
    }
}
