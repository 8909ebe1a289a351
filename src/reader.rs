use crate::{
    error::Result,
    parser::Parser,
    record::{SeqFormat, SequenceRecord},
};
use crossbeam_channel::{bounded, Receiver};
use flate2::read::MultiGzDecoder;
use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;
use std::thread;

const DEFAULT_BUFFER_SIZE: usize = 64 * 1024;
const DEFAULT_QUEUE_SIZE: usize = 1024;

/// Record stream over a plain or gzip-compressed FASTQ/FASTA file.
pub struct SequenceReader {
    parser: Parser<Box<dyn BufRead + Send>>,
}

impl SequenceReader {
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)?;
        let source = path.display().to_string();

        if path.extension().and_then(|s| s.to_str()) == Some("gz") {
            Ok(Self::from_reader(MultiGzDecoder::new(file), source))
        } else {
            Ok(Self::from_reader(file, source))
        }
    }

    pub fn from_reader<R: Read + Send + 'static>(reader: R, source: impl AsRef<str>) -> Self {
        let buffered: Box<dyn BufRead + Send> =
            Box::new(BufReader::with_capacity(DEFAULT_BUFFER_SIZE, reader));
        SequenceReader {
            parser: Parser::new(buffered, source.as_ref()),
        }
    }

    pub fn source(&self) -> &str {
        self.parser.source()
    }

    pub fn format(&mut self) -> Result<Option<SeqFormat>> {
        self.parser.format()
    }

    /// Moves parsing onto a background thread feeding a bounded queue.
    pub fn prefetch(self) -> PrefetchReader {
        PrefetchReader::spawn(self, DEFAULT_QUEUE_SIZE)
    }
}

impl Iterator for SequenceReader {
    type Item = Result<SequenceRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        self.parser.next()
    }
}

/// Records parsed ahead on a worker thread, delivered in file order.
pub struct PrefetchReader {
    receiver: Receiver<Result<SequenceRecord>>,
}

impl PrefetchReader {
    pub fn spawn(reader: SequenceReader, queue_size: usize) -> Self {
        let (sender, receiver) = bounded(queue_size.max(1));

        thread::spawn(move || {
            for result in reader {
                let failed = result.is_err();
                if sender.send(result).is_err() || failed {
                    break;
                }
            }
        });

        PrefetchReader { receiver }
    }
}

impl Iterator for PrefetchReader {
    type Item = Result<SequenceRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        self.receiver.recv().ok()
    }
}
