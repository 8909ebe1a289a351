use crate::{
    error::{FastqError, Result},
    reader::{PrefetchReader, SequenceReader},
    record::{SeqFormat, SequenceRecord},
};
use std::fmt;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Mate {
    R1,
    R2,
}

impl Mate {
    pub fn label(&self) -> &'static str {
        match self {
            Mate::R1 => "R1",
            Mate::R2 => "R2",
        }
    }
}

impl fmt::Display for Mate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Reads forward and reverse files in lockstep. The reverse file is parsed
/// on a background thread; pairs are still yielded strictly in file order.
pub struct PairedEndReader {
    r1: SequenceReader,
    r2: PrefetchReader,
    format: Option<SeqFormat>,
    strict_pairing: bool,
    failed: bool,
}

impl PairedEndReader {
    pub fn from_paths<P: AsRef<Path>, Q: AsRef<Path>>(r1_path: P, r2_path: Q) -> Result<Self> {
        let r1 = SequenceReader::from_path(r1_path)?;
        let r2 = SequenceReader::from_path(r2_path)?;
        Self::new(r1, r2)
    }

    pub fn new(mut r1: SequenceReader, mut r2: SequenceReader) -> Result<Self> {
        let format = match (r1.format()?, r2.format()?) {
            (Some(f1), Some(f2)) if f1 != f2 => {
                return Err(FastqError::UnsupportedConfiguration(format!(
                    "{} is {:?} but {} is {:?}",
                    r1.source(),
                    f1,
                    r2.source(),
                    f2
                )))
            }
            (f1, f2) => f1.or(f2),
        };

        Ok(PairedEndReader {
            r1,
            r2: r2.prefetch(),
            format,
            strict_pairing: true,
            failed: false,
        })
    }

    pub fn strict_pairing(mut self, strict: bool) -> Self {
        self.strict_pairing = strict;
        self
    }

    pub fn format(&self) -> Option<SeqFormat> {
        self.format
    }

    fn next_pair(&mut self) -> Option<Result<(SequenceRecord, SequenceRecord)>> {
        match (self.r1.next(), self.r2.next()) {
            (Some(Ok(r1)), Some(Ok(r2))) => {
                if self.strict_pairing && base_id(r1.id()) != base_id(r2.id()) {
                    return Some(Err(FastqError::PairedEndMismatch {
                        r1_id: r1.id().to_string(),
                        r2_id: r2.id().to_string(),
                    }));
                }
                Some(Ok((r1, r2)))
            }
            (Some(Err(e)), _) | (_, Some(Err(e))) => Some(Err(e)),
            (None, None) => None,
            (Some(_), None) | (None, Some(_)) => Some(Err(FastqError::PairedEndLengthMismatch)),
        }
    }
}

impl Iterator for PairedEndReader {
    type Item = Result<(SequenceRecord, SequenceRecord)>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        let item = self.next_pair();
        if matches!(item, Some(Err(_))) {
            self.failed = true;
        }
        item
    }
}

/// Identifier shared by both mates: the id up to a `/1` or `/2` suffix.
pub fn base_id(id: &str) -> &str {
    match id.rfind('/') {
        Some(pos) => &id[..pos],
        None => id,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reader(data: &'static [u8], name: &str) -> SequenceReader {
        SequenceReader::from_reader(data, name)
    }

    #[test]
    fn test_pairs_in_order() {
        let r1 = reader(b"@READ1/1\nACGT\n+\nIIII\n@READ2/1\nTGCA\n+\nIIII\n", "r1");
        let r2 = reader(b"@READ1/2\nGGGG\n+\nIIII\n@READ2/2\nCCCC\n+\nIIII\n", "r2");
        let pairs: Vec<_> = PairedEndReader::new(r1, r2)
            .unwrap()
            .collect::<Result<_>>()
            .unwrap();
        assert_eq!(pairs.len(), 2);
        assert_eq!(pairs[1].0.id(), "READ2/1");
        assert_eq!(pairs[1].1.seq(), b"CCCC");
    }

    #[test]
    fn test_mismatched_ids() {
        let r1 = reader(b"@READ1/1\nACGT\n+\nIIII\n", "r1");
        let r2 = reader(b"@READ9/2\nGGGG\n+\nIIII\n", "r2");
        let mut pairs = PairedEndReader::new(r1, r2).unwrap();
        assert!(matches!(pairs.next(), Some(Err(FastqError::PairedEndMismatch { .. }))));
        assert!(pairs.next().is_none());
    }

    #[test]
    fn test_relaxed_pairing_accepts_any_ids() {
        let r1 = reader(b"@READ1/1\nACGT\n+\nIIII\n", "r1");
        let r2 = reader(b"@other\nGGGG\n+\nIIII\n", "r2");
        let pairs: Vec<_> = PairedEndReader::new(r1, r2)
            .unwrap()
            .strict_pairing(false)
            .collect();
        assert!(pairs[0].is_ok());
    }

    #[test]
    fn test_unequal_record_counts() {
        let r1 = reader(b"@A\nACGT\n+\nIIII\n@B\nACGT\n+\nIIII\n", "r1");
        let r2 = reader(b"@A\nGGGG\n+\nIIII\n", "r2");
        let results: Vec<_> = PairedEndReader::new(r1, r2).unwrap().collect();
        assert_eq!(results.len(), 2);
        assert!(matches!(results[1], Err(FastqError::PairedEndLengthMismatch)));
    }

    #[test]
    fn test_mixed_formats_rejected() {
        let r1 = reader(b"@A\nACGT\n+\nIIII\n", "r1");
        let r2 = reader(b">A\nGGGG\n", "r2");
        assert!(matches!(
            PairedEndReader::new(r1, r2),
            Err(FastqError::UnsupportedConfiguration(_))
        ));
    }

    #[test]
    fn test_base_id() {
        assert_eq!(base_id("READ1/1"), "READ1");
        assert_eq!(base_id("READ1"), "READ1");
    }
}
