use crate::{
    error::{FastqError, Result},
    reader::SequenceReader,
    record::SequenceRecord,
};
use log::debug;
use serde::Deserialize;
use std::path::Path;

/// Characters that only occur in realistic Phred+64 quality strings.
const PHRED64_MARKERS: [u8; 4] = [b'^', b'a', b']', b'f'];

const DEFAULT_SAMPLE_SIZE: usize = 10_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum QualityEncoding {
    Phred33,
    Phred64,
    Unknown,
}

impl QualityEncoding {
    /// Classifies a single quality string. An empty string gives `Unknown`.
    pub fn detect(qual_string: &[u8]) -> Self {
        detect_encoding(std::iter::once(qual_string))
    }

    pub fn to_phred_scores(&self, qual_string: &[u8]) -> Vec<u8> {
        let offset = self.offset();
        qual_string.iter().map(|&q| q.saturating_sub(offset)).collect()
    }

    /// `Unknown` falls back to the Phred+33 offset; callers reject it before scoring.
    pub fn offset(&self) -> u8 {
        match self {
            QualityEncoding::Phred33 => 33,
            QualityEncoding::Phred64 => 64,
            QualityEncoding::Unknown => 33,
        }
    }

    pub fn is_known(&self) -> bool {
        !matches!(self, QualityEncoding::Unknown)
    }
}

pub fn detect_encoding<'a, I>(quality_strings: I) -> QualityEncoding
where
    I: IntoIterator<Item = &'a [u8]>,
{
    let mut seen_quality = false;

    for qual in quality_strings {
        if qual.is_empty() {
            continue;
        }
        seen_quality = true;
        if qual.iter().any(|q| PHRED64_MARKERS.contains(q)) {
            return QualityEncoding::Phred64;
        }
    }

    if seen_quality {
        QualityEncoding::Phred33
    } else {
        QualityEncoding::Unknown
    }
}

/// Infers the quality encoding of an input from a bounded sample of its records.
#[derive(Debug, Clone)]
pub struct EncodingDetector {
    sample_size: usize,
}

impl Default for EncodingDetector {
    fn default() -> Self {
        EncodingDetector {
            sample_size: DEFAULT_SAMPLE_SIZE,
        }
    }
}

impl EncodingDetector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records to inspect; `0` scans the whole input.
    pub fn sample_size(mut self, records: usize) -> Self {
        self.sample_size = records;
        self
    }

    pub fn detect_records<I>(&self, records: I, file: &str) -> Result<QualityEncoding>
    where
        I: IntoIterator<Item = Result<SequenceRecord>>,
    {
        let limit = if self.sample_size == 0 {
            usize::MAX
        } else {
            self.sample_size
        };

        let mut seen_quality = false;
        let mut inspected = 0;

        for record in records.into_iter().take(limit) {
            let record = record?;
            inspected += 1;
            if let Some(qual) = record.qual() {
                match detect_encoding(std::iter::once(qual)) {
                    QualityEncoding::Phred64 => {
                        debug!("{}: Phred+64 marker found in record {}", file, inspected);
                        return Ok(QualityEncoding::Phred64);
                    }
                    QualityEncoding::Phred33 => seen_quality = true,
                    QualityEncoding::Unknown => {}
                }
            }
        }

        if seen_quality {
            debug!("{}: no Phred+64 markers in {} records", file, inspected);
            Ok(QualityEncoding::Phred33)
        } else {
            Err(FastqError::EncodingAmbiguous {
                file: file.to_string(),
            })
        }
    }

    pub fn detect_file<P: AsRef<Path>>(&self, path: P) -> Result<QualityEncoding> {
        let path = path.as_ref();
        let reader = SequenceReader::from_path(path)?;
        self.detect_records(reader, &path.display().to_string())
    }

    /// Uses `fixed` when given, otherwise inspects the file.
    pub fn resolve<P: AsRef<Path>>(
        &self,
        fixed: Option<QualityEncoding>,
        path: P,
    ) -> Result<QualityEncoding> {
        match fixed {
            Some(encoding) if encoding.is_known() => Ok(encoding),
            Some(_) => Err(FastqError::UnsupportedConfiguration(
                "quality encoding must be Phred33 or Phred64 when set explicitly".to_string(),
            )),
            None => self.detect_file(path),
        }
    }
}
