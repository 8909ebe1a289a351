use crate::{error::Result, record::SequenceRecord};
use flate2::write::GzEncoder;
use flate2::Compression;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// Writes records as FASTQ when they carry quality, FASTA otherwise.
pub enum RecordWriter<W: Write> {
    Plain(BufWriter<W>),
    Gzip(GzEncoder<BufWriter<W>>),
}

impl RecordWriter<File> {
    pub fn to_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = File::create(path)?;

        if path.extension().and_then(|s| s.to_str()) == Some("gz") {
            Ok(RecordWriter::Gzip(GzEncoder::new(
                BufWriter::new(file),
                Compression::default(),
            )))
        } else {
            Ok(RecordWriter::Plain(BufWriter::new(file)))
        }
    }
}

impl<W: Write> RecordWriter<W> {
    pub fn new(writer: W) -> Self {
        RecordWriter::Plain(BufWriter::new(writer))
    }

    pub fn new_gzip(writer: W, compression: Compression) -> Self {
        RecordWriter::Gzip(GzEncoder::new(BufWriter::new(writer), compression))
    }

    pub fn write_record(&mut self, record: &SequenceRecord) -> Result<()> {
        let writer: &mut dyn Write = match self {
            RecordWriter::Plain(w) => w,
            RecordWriter::Gzip(w) => w,
        };

        let marker: &[u8] = if record.qual().is_some() { b"@" } else { b">" };
        writer.write_all(marker)?;
        writer.write_all(record.id().as_bytes())?;
        if let Some(desc) = record.desc() {
            writer.write_all(b" ")?;
            writer.write_all(desc.as_bytes())?;
        }
        writer.write_all(b"\n")?;
        writer.write_all(record.seq())?;
        writer.write_all(b"\n")?;
        if let Some(qual) = record.qual() {
            writer.write_all(b"+\n")?;
            writer.write_all(qual)?;
            writer.write_all(b"\n")?;
        }

        Ok(())
    }

    pub fn flush(&mut self) -> Result<()> {
        match self {
            RecordWriter::Plain(w) => w.flush()?,
            RecordWriter::Gzip(w) => w.flush()?,
        }
        Ok(())
    }

    /// Flushes buffered data and, for gzip output, writes the stream trailer.
    pub fn finish(&mut self) -> Result<()> {
        match self {
            RecordWriter::Plain(w) => w.flush()?,
            RecordWriter::Gzip(w) => {
                w.try_finish()?;
                w.get_mut().flush()?;
            }
        }
        Ok(())
    }
}

impl<W: Write> Drop for RecordWriter<W> {
    fn drop(&mut self) {
        let _ = self.finish();
    }
}
