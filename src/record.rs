use crate::{
    encoding::QualityEncoding,
    error::{FastqError, Result},
    filter::expected_errors,
};
use std::fmt;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SeqFormat {
    Fastq,
    Fasta,
}

impl SeqFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            SeqFormat::Fastq => "fastq",
            SeqFormat::Fasta => "fasta",
        }
    }
}

/// One FASTA or FASTQ entry. FASTQ records always carry a quality string of
/// the same length as the sequence; FASTA records never do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SequenceRecord {
    id: String,
    desc: Option<String>,
    seq: Vec<u8>,
    qual: Option<Vec<u8>>,
    source: Arc<str>,
}

impl SequenceRecord {
    pub fn fastq(
        id: impl Into<String>,
        desc: Option<String>,
        seq: Vec<u8>,
        qual: Vec<u8>,
        source: Arc<str>,
    ) -> Result<Self> {
        if seq.len() != qual.len() {
            return Err(FastqError::LengthMismatch {
                seq_len: seq.len(),
                qual_len: qual.len(),
            });
        }

        Ok(SequenceRecord {
            id: id.into(),
            desc,
            seq,
            qual: Some(qual),
            source,
        })
    }

    pub fn fasta(id: impl Into<String>, desc: Option<String>, seq: Vec<u8>, source: Arc<str>) -> Self {
        SequenceRecord {
            id: id.into(),
            desc,
            seq,
            qual: None,
            source,
        }
    }

    #[inline]
    pub fn id(&self) -> &str {
        &self.id
    }

    #[inline]
    pub fn desc(&self) -> Option<&str> {
        self.desc.as_deref()
    }

    #[inline]
    pub fn seq(&self) -> &[u8] {
        &self.seq
    }

    #[inline]
    pub fn qual(&self) -> Option<&[u8]> {
        self.qual.as_deref()
    }

    #[inline]
    pub fn source_filename(&self) -> &str {
        &self.source
    }

    #[inline]
    pub fn format(&self) -> SeqFormat {
        if self.qual.is_some() {
            SeqFormat::Fastq
        } else {
            SeqFormat::Fasta
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.seq.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.seq.is_empty()
    }

    /// Returns a copy with the first `n` bases (and quality values) removed.
    pub fn without_prefix(&self, n: usize) -> SequenceRecord {
        let n = n.min(self.seq.len());
        SequenceRecord {
            id: self.id.clone(),
            desc: self.desc.clone(),
            seq: self.seq[n..].to_vec(),
            qual: self.qual.as_ref().map(|q| q[n..].to_vec()),
            source: Arc::clone(&self.source),
        }
    }

    pub fn phred_scores(&self, encoding: QualityEncoding) -> Option<Vec<u8>> {
        self.qual().map(|q| encoding.to_phred_scores(q))
    }

    pub fn expected_errors(&self, encoding: QualityEncoding) -> Option<f64> {
        self.qual().map(|q| expected_errors(q, encoding))
    }

    pub fn mean_quality(&self, encoding: QualityEncoding) -> Option<f64> {
        let scores = self.phred_scores(encoding)?;
        if scores.is_empty() {
            return Some(0.0);
        }
        Some(scores.iter().map(|&q| q as f64).sum::<f64>() / scores.len() as f64)
    }
}

impl fmt::Display for SequenceRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let marker = match self.format() {
            SeqFormat::Fastq => '@',
            SeqFormat::Fasta => '>',
        };
        write!(f, "{}{}", marker, self.id)?;
        if let Some(desc) = &self.desc {
            write!(f, " {}", desc)?;
        }
        writeln!(f)?;
        f.write_str(&String::from_utf8_lossy(&self.seq))?;
        if let Some(qual) = &self.qual {
            write!(f, "\n+\n{}", String::from_utf8_lossy(qual))?;
        }
        Ok(())
    }
}
