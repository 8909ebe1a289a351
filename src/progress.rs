//! Side-channel feedback for a processing run.
//!
//! Observers never return errors and never see anything but copies of the
//! run's decisions, so switching them on or off cannot change what is written.

use log::{info, warn};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

pub trait RunObserver {
    fn on_start(&mut self, _description: &str) {}

    /// Whether `on_decision` should be called. Checked before the decision
    /// text is formatted.
    fn wants_decisions(&self) -> bool {
        false
    }

    fn on_decision(&mut self, _read_id: &str, _decision: &str) {}

    fn on_progress(&mut self, _processed: u64) {}

    fn on_finish(&mut self, _summary: &str) {}
}

pub struct Quiet;

impl RunObserver for Quiet {}

/// Reports progress through the `log` facade every `interval` reads.
pub struct ProgressLogger {
    interval: u64,
}

impl ProgressLogger {
    pub fn new(interval: u64) -> Self {
        ProgressLogger {
            interval: interval.max(1),
        }
    }
}

impl RunObserver for ProgressLogger {
    fn on_start(&mut self, description: &str) {
        info!("{}", description);
    }

    fn on_progress(&mut self, processed: u64) {
        if processed % self.interval == 0 {
            info!("Processed {} reads...", processed);
        }
    }

    fn on_finish(&mut self, summary: &str) {
        info!("{}", summary);
    }
}

/// Plain-text run log written next to the outputs when debugging.
pub struct RunLog {
    path: PathBuf,
    writer: Option<BufWriter<File>>,
}

impl RunLog {
    pub fn create<P: AsRef<Path>>(path: P) -> std::io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let writer = BufWriter::new(File::create(&path)?);
        Ok(RunLog {
            path,
            writer: Some(writer),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write_line(&mut self, line: std::fmt::Arguments<'_>) {
        let result = match self.writer.as_mut() {
            Some(writer) => writer.write_fmt(line).and_then(|_| writer.write_all(b"\n")),
            None => return,
        };
        if let Err(e) = result {
            warn!("Run log {} disabled: {}", self.path.display(), e);
            self.writer = None;
        }
    }
}

impl RunObserver for RunLog {
    fn on_start(&mut self, description: &str) {
        self.write_line(format_args!("# {}", description));
    }

    fn wants_decisions(&self) -> bool {
        self.writer.is_some()
    }

    fn on_decision(&mut self, read_id: &str, decision: &str) {
        self.write_line(format_args!("{}\t{}", read_id, decision));
    }

    fn on_finish(&mut self, summary: &str) {
        self.write_line(format_args!("# {}", summary));
        if let Some(writer) = self.writer.as_mut() {
            if let Err(e) = writer.flush() {
                warn!("Could not flush run log {}: {}", self.path.display(), e);
            }
        }
    }
}

/// Fans every event out to several observers.
#[derive(Default)]
pub struct Observers {
    observers: Vec<Box<dyn RunObserver>>,
}

impl Observers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, observer: Box<dyn RunObserver>) -> Self {
        self.observers.push(observer);
        self
    }

    /// Builds the observer set for the `verbose`/`debug` switches.
    pub fn for_run(verbose: bool, debug: bool, interval: u64, log_path: &Path) -> std::io::Result<Self> {
        let mut observers = Observers::new();
        if verbose {
            observers = observers.with(Box::new(ProgressLogger::new(interval)));
        }
        if debug {
            observers = observers.with(Box::new(RunLog::create(log_path)?));
        }
        Ok(observers)
    }

    pub fn is_empty(&self) -> bool {
        self.observers.is_empty()
    }
}

impl RunObserver for Observers {
    fn on_start(&mut self, description: &str) {
        self.observers.iter_mut().for_each(|o| o.on_start(description));
    }

    fn wants_decisions(&self) -> bool {
        self.observers.iter().any(|o| o.wants_decisions())
    }

    fn on_decision(&mut self, read_id: &str, decision: &str) {
        for observer in self.observers.iter_mut().filter(|o| o.wants_decisions()) {
            observer.on_decision(read_id, decision);
        }
    }

    fn on_progress(&mut self, processed: u64) {
        self.observers.iter_mut().for_each(|o| o.on_progress(processed));
    }

    fn on_finish(&mut self, summary: &str) {
        self.observers.iter_mut().for_each(|o| o.on_finish(summary));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_log_records_decisions() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.log");
        {
            let mut log = RunLog::create(&path).unwrap();
            log.on_start("demultiplexing reads.fastq");
            assert!(log.wants_decisions());
            log.on_decision("read1", "S1");
            log.on_finish("1 read");
        }
        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text, "# demultiplexing reads.fastq\nread1\tS1\n# 1 read\n");
    }

    #[test]
    fn test_observer_set_for_switches() {
        let dir = tempfile::tempdir().unwrap();
        let log_path = dir.path().join("run.log");

        let quiet = Observers::for_run(false, false, 10, &log_path).unwrap();
        assert!(quiet.is_empty());
        assert!(!quiet.wants_decisions());
        assert!(!log_path.exists());

        let debug = Observers::for_run(true, true, 10, &log_path).unwrap();
        assert!(debug.wants_decisions());
        assert!(log_path.exists());
    }
}
