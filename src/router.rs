use crate::{
    error::{FastqError, Result},
    paired::Mate,
    record::{SeqFormat, SequenceRecord},
    writer::RecordWriter,
};
use log::{debug, warn};
use std::collections::HashMap;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Destination of a routed record. Each key maps to exactly one output file.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SinkKey {
    Sample(Arc<str>),
    SampleMate(Arc<str>, Mate),
    Unassigned,
    UnassignedMate(Mate),
    Filtered(Arc<str>),
    PairedFiltered(Mate),
    UnpairedFiltered(Mate),
}

impl SinkKey {
    pub fn file_stem(&self) -> String {
        match self {
            SinkKey::Sample(sample) => sample.to_string(),
            SinkKey::SampleMate(sample, mate) => format!("{}_{}", sample, mate),
            SinkKey::Unassigned => "unassigned".to_string(),
            SinkKey::UnassignedMate(mate) => format!("{}_unassigned", mate),
            SinkKey::Filtered(stem) => format!("{}_FilteredReads", stem),
            SinkKey::PairedFiltered(mate) => format!("{}_Paired_filtered", mate),
            SinkKey::UnpairedFiltered(mate) => format!("{}_Unpaired_filtered", mate),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SinkSummary {
    pub key: SinkKey,
    pub path: PathBuf,
    pub records: u64,
}

struct Sink {
    path: PathBuf,
    writer: RecordWriter<File>,
    records: u64,
}

/// Owns every output file of a run. Files are created on first write and
/// all of them are closed by `finish`, `abort` or drop.
pub struct OutputRouter {
    dir: PathBuf,
    format: SeqFormat,
    compress: bool,
    sinks: HashMap<SinkKey, Sink>,
    opened: Vec<SinkKey>,
}

impl OutputRouter {
    /// Creates `dir` if needed and checks that files can be created in it.
    pub fn new<P: AsRef<Path>>(dir: P, format: SeqFormat) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        ensure_writable(&dir)?;

        Ok(OutputRouter {
            dir,
            format,
            compress: false,
            sinks: HashMap::new(),
            opened: Vec::new(),
        })
    }

    pub fn compress(mut self, compress: bool) -> Self {
        self.compress = compress;
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, key: &SinkKey) -> PathBuf {
        sink_path(&self.dir, self.format, self.compress, key)
    }

    pub fn write(&mut self, key: &SinkKey, record: &SequenceRecord) -> Result<()> {
        if !self.sinks.contains_key(key) {
            let path = sink_path(&self.dir, self.format, self.compress, key);
            debug!("Opening output {}", path.display());
            let writer = RecordWriter::to_file(&path)?;
            self.opened.push(key.clone());
            self.sinks.insert(
                key.clone(),
                Sink {
                    path,
                    writer,
                    records: 0,
                },
            );
        }

        if let Some(sink) = self.sinks.get_mut(key) {
            sink.writer.write_record(record)?;
            sink.records += 1;
        }
        Ok(())
    }

    pub fn records_written(&self, key: &SinkKey) -> u64 {
        self.sinks.get(key).map_or(0, |sink| sink.records)
    }

    pub fn open_sinks(&self) -> usize {
        self.sinks.len()
    }

    /// Closes every sink in opening order. The first close error is returned
    /// after all sinks have been attempted.
    pub fn finish(mut self) -> Result<Vec<SinkSummary>> {
        let mut summaries = Vec::with_capacity(self.opened.len());
        let mut first_error = None;

        for key in std::mem::take(&mut self.opened) {
            if let Some(mut sink) = self.sinks.remove(&key) {
                if let Err(e) = sink.writer.finish() {
                    first_error.get_or_insert(e);
                }
                summaries.push(SinkSummary {
                    key,
                    path: sink.path,
                    records: sink.records,
                });
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(summaries),
        }
    }

    /// Closes every sink after a failed run. The files are left in place and
    /// reported as incomplete.
    pub fn abort(mut self) {
        self.close_incomplete();
    }

    fn close_incomplete(&mut self) {
        for key in std::mem::take(&mut self.opened) {
            if let Some(mut sink) = self.sinks.remove(&key) {
                let _ = sink.writer.finish();
                warn!(
                    "Run aborted, {} is incomplete ({} records written)",
                    sink.path.display(),
                    sink.records
                );
            }
        }
    }
}

impl Drop for OutputRouter {
    fn drop(&mut self) {
        self.close_incomplete();
    }
}

fn sink_path(dir: &Path, format: SeqFormat, compress: bool, key: &SinkKey) -> PathBuf {
    let mut name = format!("{}.{}", key.file_stem(), format.extension());
    if compress {
        name.push_str(".gz");
    }
    dir.join(name)
}

fn ensure_writable(dir: &Path) -> Result<()> {
    let unwritable = |source| FastqError::OutputDirectoryUnwritable {
        path: dir.display().to_string(),
        source,
    };

    fs::create_dir_all(dir).map_err(unwritable)?;
    tempfile::Builder::new()
        .prefix(".write-check")
        .tempfile_in(dir)
        .map_err(unwritable)?;
    Ok(())
}
