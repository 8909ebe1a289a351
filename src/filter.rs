use crate::{
    config::FilterConfig,
    encoding::{EncodingDetector, QualityEncoding},
    error::{FastqError, Result},
    paired::{Mate, PairedEndReader},
    progress::{Observers, RunObserver},
    reader::SequenceReader,
    record::{SeqFormat, SequenceRecord},
    router::{OutputRouter, SinkKey},
};
use log::{info, warn};
use std::path::Path;
use std::sync::Arc;

/// Probability that a base with Phred score `score` was called wrongly.
#[inline]
pub fn error_probability(score: u8) -> f64 {
    10f64.powf(-(score as f64) / 10.0)
}

pub fn expected_errors(qual: &[u8], encoding: QualityEncoding) -> f64 {
    let offset = encoding.offset();
    qual.iter()
        .map(|&q| error_probability(q.saturating_sub(offset)))
        .sum()
}

/// Accepts reads whose expected error count is at most `max_ee`.
#[derive(Debug, Clone)]
pub struct ExpectedErrorFilter {
    max_ee: f64,
    encoding: QualityEncoding,
}

impl ExpectedErrorFilter {
    pub fn new(encoding: QualityEncoding) -> Result<Self> {
        if !encoding.is_known() {
            return Err(FastqError::UnsupportedConfiguration(
                "expected-error filtering needs a known quality encoding".to_string(),
            ));
        }
        Ok(ExpectedErrorFilter {
            max_ee: crate::config::DEFAULT_MAX_EE,
            encoding,
        })
    }

    pub fn max_ee(mut self, max_ee: f64) -> Self {
        self.max_ee = max_ee;
        self
    }

    pub fn encoding(&self) -> QualityEncoding {
        self.encoding
    }

    pub fn expected_errors(&self, record: &SequenceRecord) -> Option<f64> {
        record.expected_errors(self.encoding)
    }

    /// Records without quality never pass.
    pub fn passes(&self, record: &SequenceRecord) -> bool {
        self.expected_errors(record)
            .map_or(false, |ee| ee <= self.max_ee)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PairOutcome {
    BothPass,
    ForwardOnly,
    ReverseOnly,
    NeitherPass,
}

/// Evaluates the two mates of a pair independently, each with its own
/// file's quality encoding.
#[derive(Debug, Clone)]
pub struct PairFilter {
    forward: ExpectedErrorFilter,
    reverse: ExpectedErrorFilter,
}

impl PairFilter {
    pub fn new(forward: ExpectedErrorFilter, reverse: ExpectedErrorFilter) -> Self {
        PairFilter { forward, reverse }
    }

    pub fn classify(&self, r1: &SequenceRecord, r2: &SequenceRecord) -> PairOutcome {
        match (self.forward.passes(r1), self.reverse.passes(r2)) {
            (true, true) => PairOutcome::BothPass,
            (true, false) => PairOutcome::ForwardOnly,
            (false, true) => PairOutcome::ReverseOnly,
            (false, false) => PairOutcome::NeitherPass,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterStats {
    pub total_reads: u64,
    pub passed_reads: u64,
}

impl FilterStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failed_reads(&self) -> u64 {
        self.total_reads - self.passed_reads
    }

    pub fn summary_line(&self) -> String {
        format!(
            "{} of {} reads passed the expected-error filter",
            self.passed_reads, self.total_reads
        )
    }

    pub fn print_summary(&self) {
        println!("Filtering Statistics:");
        println!("  Total reads: {}", self.total_reads);
        println!("  Passed reads: {}", self.passed_reads);
        println!("  Failed reads: {}", self.failed_reads());
        println!("  Pass rate: {:.2}%", percent(self.passed_reads, self.total_reads));
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PairedFilterStats {
    pub total_pairs: u64,
    pub both_passed: u64,
    pub forward_only: u64,
    pub reverse_only: u64,
    pub neither_passed: u64,
}

impl PairedFilterStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, outcome: PairOutcome) {
        self.total_pairs += 1;
        match outcome {
            PairOutcome::BothPass => self.both_passed += 1,
            PairOutcome::ForwardOnly => self.forward_only += 1,
            PairOutcome::ReverseOnly => self.reverse_only += 1,
            PairOutcome::NeitherPass => self.neither_passed += 1,
        }
    }

    pub fn summary_line(&self) -> String {
        format!(
            "{} pairs: {} both passed, {} forward only, {} reverse only, {} dropped",
            self.total_pairs, self.both_passed, self.forward_only, self.reverse_only, self.neither_passed
        )
    }

    pub fn print_summary(&self) {
        println!("Paired Filtering Statistics:");
        println!("  Total pairs: {}", self.total_pairs);
        println!(
            "  Both passed: {} ({:.2}%)",
            self.both_passed,
            percent(self.both_passed, self.total_pairs)
        );
        println!("  Forward only: {}", self.forward_only);
        println!("  Reverse only: {}", self.reverse_only);
        println!("  Neither passed: {}", self.neither_passed);
    }
}

pub(crate) fn percent(part: u64, total: u64) -> f64 {
    if total == 0 {
        0.0
    } else {
        part as f64 / total as f64 * 100.0
    }
}

pub fn filter_records<I>(
    filter: &ExpectedErrorFilter,
    records: I,
    router: &mut OutputRouter,
    key: &SinkKey,
    observer: &mut dyn RunObserver,
) -> Result<FilterStats>
where
    I: IntoIterator<Item = Result<SequenceRecord>>,
{
    let mut stats = FilterStats::new();
    let log_decisions = observer.wants_decisions();

    for record in records {
        let record = record?;
        stats.total_reads += 1;

        let passed = filter.passes(&record);
        if passed {
            stats.passed_reads += 1;
            router.write(key, &record)?;
        }

        if log_decisions {
            let ee = filter.expected_errors(&record).unwrap_or(f64::NAN);
            let verdict = if passed { "pass" } else { "fail" };
            observer.on_decision(record.id(), &format!("EE={:.4}\t{}", ee, verdict));
        }
        observer.on_progress(stats.total_reads);
    }

    Ok(stats)
}

pub fn filter_pairs<I>(
    filter: &PairFilter,
    pairs: I,
    router: &mut OutputRouter,
    observer: &mut dyn RunObserver,
) -> Result<PairedFilterStats>
where
    I: IntoIterator<Item = Result<(SequenceRecord, SequenceRecord)>>,
{
    let mut stats = PairedFilterStats::new();
    let log_decisions = observer.wants_decisions();

    let paired = [SinkKey::PairedFiltered(Mate::R1), SinkKey::PairedFiltered(Mate::R2)];
    let unpaired = [SinkKey::UnpairedFiltered(Mate::R1), SinkKey::UnpairedFiltered(Mate::R2)];

    for pair in pairs {
        let (r1, r2) = pair?;
        let outcome = filter.classify(&r1, &r2);
        stats.record(outcome);

        match outcome {
            PairOutcome::BothPass => {
                router.write(&paired[0], &r1)?;
                router.write(&paired[1], &r2)?;
            }
            PairOutcome::ForwardOnly => router.write(&unpaired[0], &r1)?,
            PairOutcome::ReverseOnly => router.write(&unpaired[1], &r2)?,
            PairOutcome::NeitherPass => {}
        }

        if log_decisions {
            observer.on_decision(r1.id(), &format!("{:?}", outcome));
        }
        observer.on_progress(stats.total_pairs);
    }

    Ok(stats)
}

/// Filters a single-end FASTQ file into `<stem>_FilteredReads.fastq`.
pub fn filter_single<P: AsRef<Path>, Q: AsRef<Path>>(
    input: P,
    output_dir: Q,
    config: &FilterConfig,
) -> Result<FilterStats> {
    let input = input.as_ref();
    config.validate()?;

    let detector = EncodingDetector::new().sample_size(config.encoding_sample_size);
    let encoding = detector.resolve(config.quality_encoding, input)?;
    info!("{}: quality encoding {:?}", input.display(), encoding);
    let filter = ExpectedErrorFilter::new(encoding)?.max_ee(config.max_ee);

    let mut reader = SequenceReader::from_path(input)?;
    require_fastq(reader.format()?, input)?;

    let mut router = OutputRouter::new(output_dir, SeqFormat::Fastq)?.compress(config.compress);
    let mut observer = Observers::for_run(
        config.verbose,
        config.debug,
        config.progress_interval,
        &router.dir().join("filter.log"),
    )?;
    observer.on_start(&format!(
        "filtering {} with maxEE {} ({:?})",
        input.display(),
        config.max_ee,
        encoding
    ));

    let key = SinkKey::Filtered(Arc::from(file_stem(input)));
    match filter_records(&filter, reader, &mut router, &key, &mut observer) {
        Ok(stats) => {
            router.finish()?;
            observer.on_finish(&stats.summary_line());
            Ok(stats)
        }
        Err(e) => {
            router.abort();
            observer.on_finish(&format!("aborted: {}", e));
            Err(e)
        }
    }
}

pub fn filter_paired<P: AsRef<Path>, Q: AsRef<Path>, O: AsRef<Path>>(
    r1_path: P,
    r2_path: Q,
    output_dir: O,
    config: &FilterConfig,
) -> Result<PairedFilterStats> {
    let (r1_path, r2_path) = (r1_path.as_ref(), r2_path.as_ref());
    config.validate()?;

    let detector = EncodingDetector::new().sample_size(config.encoding_sample_size);
    let (r1_encoding, r2_encoding) = rayon::join(
        || detector.resolve(config.quality_encoding, r1_path),
        || detector.resolve(config.quality_encoding, r2_path),
    );
    let (r1_encoding, r2_encoding) = (r1_encoding?, r2_encoding?);
    if r1_encoding != r2_encoding {
        warn!(
            "R1 looks like {:?} but R2 looks like {:?}; scoring each file with its own encoding",
            r1_encoding, r2_encoding
        );
    }
    let filter = PairFilter::new(
        ExpectedErrorFilter::new(r1_encoding)?.max_ee(config.max_ee),
        ExpectedErrorFilter::new(r2_encoding)?.max_ee(config.max_ee),
    );

    let pairs = PairedEndReader::from_paths(r1_path, r2_path)?.strict_pairing(config.strict_pairing);
    require_fastq(pairs.format(), r1_path)?;

    let mut router = OutputRouter::new(output_dir, SeqFormat::Fastq)?.compress(config.compress);
    let mut observer = Observers::for_run(
        config.verbose,
        config.debug,
        config.progress_interval,
        &router.dir().join("filter.log"),
    )?;
    observer.on_start(&format!(
        "filtering {} + {} with maxEE {}",
        r1_path.display(),
        r2_path.display(),
        config.max_ee
    ));

    match filter_pairs(&filter, pairs, &mut router, &mut observer) {
        Ok(stats) => {
            router.finish()?;
            observer.on_finish(&stats.summary_line());
            Ok(stats)
        }
        Err(e) => {
            router.abort();
            observer.on_finish(&format!("aborted: {}", e));
            Err(e)
        }
    }
}

fn require_fastq(format: Option<SeqFormat>, path: &Path) -> Result<()> {
    match format {
        Some(SeqFormat::Fasta) => Err(FastqError::UnsupportedConfiguration(format!(
            "{} is FASTA; expected-error filtering needs FASTQ quality scores",
            path.display()
        ))),
        _ => Ok(()),
    }
}

/// File name without directory and without `.gz` and sequence extensions.
pub(crate) fn file_stem(path: &Path) -> String {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let name = name.strip_suffix(".gz").unwrap_or(&name);
    match name.rfind('.') {
        Some(pos) if pos > 0 => name[..pos].to_string(),
        _ => name.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::Quiet;

    fn fastq(id: &str, qual: &[u8]) -> SequenceRecord {
        let seq = vec![b'A'; qual.len()];
        SequenceRecord::fastq(id, None, seq, qual.to_vec(), Arc::from("t.fastq")).unwrap()
    }

    fn phred33(scores: &[u8]) -> Vec<u8> {
        scores.iter().map(|s| s + 33).collect()
    }

    #[test]
    fn test_expected_errors_example() {
        let ee = expected_errors(&phred33(&[40, 40, 40, 10]), QualityEncoding::Phred33);
        assert!((ee - 0.1003).abs() < 1e-9);
        let filter = ExpectedErrorFilter::new(QualityEncoding::Phred33).unwrap();
        assert!(filter.passes(&fastq("r", &phred33(&[40, 40, 40, 10]))));
    }

    #[test]
    fn test_threshold_is_inclusive() {
        let filter = ExpectedErrorFilter::new(QualityEncoding::Phred33).unwrap();
        // Q0 has error probability exactly 1.
        assert!(filter.passes(&fastq("r", &phred33(&[0]))));
        assert!(!filter.passes(&fastq("r", &phred33(&[0, 10]))));
        assert!(filter.clone().max_ee(2.0).passes(&fastq("r", &phred33(&[0, 10]))));
    }

    #[test]
    fn test_encoding_offset_changes_result() {
        // 'J' is Q41 in Phred+33 but Q10 in Phred+64.
        let record = fastq("r", b"JJJJJJJJJJJ");
        assert!(ExpectedErrorFilter::new(QualityEncoding::Phred33).unwrap().passes(&record));
        assert!(!ExpectedErrorFilter::new(QualityEncoding::Phred64).unwrap().passes(&record));
    }

    #[test]
    fn test_fasta_never_passes() {
        let filter = ExpectedErrorFilter::new(QualityEncoding::Phred33).unwrap();
        let record = SequenceRecord::fasta("c", None, b"ACGT".to_vec(), Arc::from("x.fa"));
        assert!(!filter.passes(&record));
    }

    #[test]
    fn test_unknown_encoding_rejected() {
        assert!(ExpectedErrorFilter::new(QualityEncoding::Unknown).is_err());
    }

    #[test]
    fn test_pair_outcomes() {
        let filter = ExpectedErrorFilter::new(QualityEncoding::Phred33).unwrap();
        let pair = PairFilter::new(filter.clone(), filter);
        let good = fastq("g", b"IIII");
        let bad = fastq("b", b"!!!!");
        assert_eq!(pair.classify(&good, &good), PairOutcome::BothPass);
        assert_eq!(pair.classify(&good, &bad), PairOutcome::ForwardOnly);
        assert_eq!(pair.classify(&bad, &good), PairOutcome::ReverseOnly);
        assert_eq!(pair.classify(&bad, &bad), PairOutcome::NeitherPass);
    }

    #[test]
    fn test_filter_pairs_routes_by_outcome() {
        let dir = tempfile::tempdir().unwrap();
        let mut router = OutputRouter::new(dir.path(), SeqFormat::Fastq).unwrap();
        let filter = ExpectedErrorFilter::new(QualityEncoding::Phred33).unwrap();
        let pair = PairFilter::new(filter.clone(), filter);

        let good = fastq("g", b"IIII");
        let bad = fastq("b", b"!!!!");
        let pairs = vec![
            Ok((good.clone(), good.clone())),
            Ok((good.clone(), bad.clone())),
            Ok((bad.clone(), good.clone())),
            Ok((bad.clone(), bad)),
        ];
        let stats = filter_pairs(&pair, pairs, &mut router, &mut Quiet).unwrap();
        assert_eq!(stats.total_pairs, 4);
        assert_eq!(
            (stats.both_passed, stats.forward_only, stats.reverse_only, stats.neither_passed),
            (1, 1, 1, 1)
        );
        assert_eq!(router.records_written(&SinkKey::PairedFiltered(Mate::R1)), 1);
        assert_eq!(router.records_written(&SinkKey::PairedFiltered(Mate::R2)), 1);
        assert_eq!(router.records_written(&SinkKey::UnpairedFiltered(Mate::R1)), 1);
        assert_eq!(router.records_written(&SinkKey::UnpairedFiltered(Mate::R2)), 1);
        router.finish().unwrap();
    }

    #[test]
    fn test_file_stem() {
        assert_eq!(file_stem(Path::new("/data/run1.fastq.gz")), "run1");
        assert_eq!(file_stem(Path::new("reads.fq")), "reads");
        assert_eq!(file_stem(Path::new("reads")), "reads");
    }
}
