use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FastqError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Malformed record in {file} at line {line}: {msg}")]
    MalformedRecord {
        file: String,
        line: usize,
        msg: String,
    },

    #[error("Sequence and quality lengths don't match (seq: {seq_len}, qual: {qual_len})")]
    LengthMismatch { seq_len: usize, qual_len: usize },

    #[error("Cannot infer quality encoding of {file}: no quality data to inspect")]
    EncodingAmbiguous { file: String },

    #[error("Invalid mapping file {path}: {msg}")]
    MappingFileInvalid { path: String, msg: String },

    #[error("Output directory {path} is not writable: {source}")]
    OutputDirectoryUnwritable {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("Unsupported configuration: {0}")]
    UnsupportedConfiguration(String),

    #[error("Paired-end reads don't match: R1 '{r1_id}' vs R2 '{r2_id}'")]
    PairedEndMismatch { r1_id: String, r2_id: String },

    #[error("Paired-end files contain different numbers of records")]
    PairedEndLengthMismatch,
}

impl FastqError {
    pub(crate) fn malformed(file: &str, line: usize, msg: impl Into<String>) -> Self {
        FastqError::MalformedRecord {
            file: file.to_string(),
            line,
            msg: msg.into(),
        }
    }

    pub(crate) fn mapping(path: &str, msg: impl Into<String>) -> Self {
        FastqError::MappingFileInvalid {
            path: path.to_string(),
            msg: msg.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, FastqError>;
