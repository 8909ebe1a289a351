pub mod barcode;
pub mod config;
pub mod demux;
pub mod encoding;
pub mod error;
pub mod filter;
pub mod mapping;
pub mod paired;
pub mod parser;
pub mod progress;
pub mod reader;
pub mod record;
pub mod router;
pub mod writer;

pub use barcode::{potential_mismatches, reverse_complement, BarcodeMatch, BarcodeTable};
pub use config::{DemuxConfig, FilterConfig, PairMatch, R2Barcodes};
pub use demux::{DemultiplexResult, DemultiplexStats, Demultiplexer, PairResult, PairedDemultiplexStats};
pub use encoding::{detect_encoding, EncodingDetector, QualityEncoding};
pub use error::{FastqError, Result};
pub use filter::{
    expected_errors, filter_paired, filter_single, ExpectedErrorFilter, FilterStats, PairFilter,
    PairOutcome, PairedFilterStats,
};
pub use mapping::{SampleEntry, SampleSheet};
pub use paired::{Mate, PairedEndReader};
pub use parser::Parser;
pub use reader::{PrefetchReader, SequenceReader};
pub use record::{SeqFormat, SequenceRecord};
pub use router::{OutputRouter, SinkKey, SinkSummary};
pub use writer::RecordWriter;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic_parsing() {
        let data = b"@SEQ_ID\nGATTTGGGGTTCAAAGCAGTATCG\n+\n!''*((((***+))%%%++)(%%%\n";
        let records: Vec<_> = Parser::new(&data[..], "inline").collect::<Result<_>>().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].id(), "SEQ_ID");
        assert_eq!(records[0].format(), SeqFormat::Fastq);
    }
}
