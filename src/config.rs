use crate::{
    encoding::QualityEncoding,
    error::{FastqError, Result},
};
use serde::Deserialize;

pub const DEFAULT_MAX_EE: f64 = 1.0;
pub const DEFAULT_PROGRESS_INTERVAL: u64 = 100_000;

/// Which barcodes are searched for at the start of R2.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum R2Barcodes {
    /// R2 is never searched; pairs are assigned by R1 alone.
    None,
    /// R2 is searched for the same barcodes as R1.
    #[default]
    Same,
    /// R2 is searched for the reverse complement of each barcode.
    ReverseComplement,
}

/// How many mates must carry a barcode for a pair to be assigned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PairMatch {
    #[default]
    Either,
    /// Dual-index matching; rejected by `validate`.
    Both,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DemuxConfig {
    pub mismatch: usize,
    pub r2_barcodes: R2Barcodes,
    pub pair_match: PairMatch,
    pub strict_pairing: bool,
    pub compress: bool,
    pub debug: bool,
    pub verbose: bool,
    pub progress_interval: u64,
}

impl Default for DemuxConfig {
    fn default() -> Self {
        DemuxConfig {
            mismatch: 0,
            r2_barcodes: R2Barcodes::Same,
            pair_match: PairMatch::Either,
            strict_pairing: true,
            compress: false,
            debug: false,
            verbose: false,
            progress_interval: DEFAULT_PROGRESS_INTERVAL,
        }
    }
}

impl DemuxConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mismatch(mut self, mismatch: usize) -> Self {
        self.mismatch = mismatch;
        self
    }

    pub fn r2_barcodes(mut self, r2_barcodes: R2Barcodes) -> Self {
        self.r2_barcodes = r2_barcodes;
        self
    }

    pub fn pair_match(mut self, pair_match: PairMatch) -> Self {
        self.pair_match = pair_match;
        self
    }

    pub fn strict_pairing(mut self, strict: bool) -> Self {
        self.strict_pairing = strict;
        self
    }

    pub fn compress(mut self, compress: bool) -> Self {
        self.compress = compress;
        self
    }

    pub fn debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    pub fn progress_interval(mut self, reads: u64) -> Self {
        self.progress_interval = reads;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.mismatch > 1 {
            return Err(FastqError::UnsupportedConfiguration(format!(
                "mismatch must be 0 or 1, got {}",
                self.mismatch
            )));
        }
        if self.pair_match == PairMatch::Both {
            return Err(FastqError::UnsupportedConfiguration(
                "dual-index matching (barcode required on both mates) is not supported".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    pub max_ee: f64,
    pub quality_encoding: Option<QualityEncoding>,
    pub encoding_sample_size: usize,
    pub strict_pairing: bool,
    pub compress: bool,
    pub debug: bool,
    pub verbose: bool,
    pub progress_interval: u64,
}

impl Default for FilterConfig {
    fn default() -> Self {
        FilterConfig {
            max_ee: DEFAULT_MAX_EE,
            quality_encoding: None,
            encoding_sample_size: 10_000,
            strict_pairing: true,
            compress: false,
            debug: false,
            verbose: false,
            progress_interval: DEFAULT_PROGRESS_INTERVAL,
        }
    }
}

impl FilterConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn max_ee(mut self, max_ee: f64) -> Self {
        self.max_ee = max_ee;
        self
    }

    pub fn quality_encoding(mut self, encoding: Option<QualityEncoding>) -> Self {
        self.quality_encoding = encoding;
        self
    }

    pub fn encoding_sample_size(mut self, records: usize) -> Self {
        self.encoding_sample_size = records;
        self
    }

    pub fn strict_pairing(mut self, strict: bool) -> Self {
        self.strict_pairing = strict;
        self
    }

    pub fn compress(mut self, compress: bool) -> Self {
        self.compress = compress;
        self
    }

    pub fn debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    pub fn progress_interval(mut self, reads: u64) -> Self {
        self.progress_interval = reads;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if !self.max_ee.is_finite() || self.max_ee <= 0.0 {
            return Err(FastqError::UnsupportedConfiguration(format!(
                "maxEE must be a positive number, got {}",
                self.max_ee
            )));
        }
        Ok(())
    }
}
