use crate::{
    barcode::{BarcodeMatch, BarcodeTable},
    config::{DemuxConfig, R2Barcodes},
    error::Result,
    filter::percent,
    mapping::SampleSheet,
    paired::{Mate, PairedEndReader},
    progress::{Observers, RunObserver},
    reader::SequenceReader,
    record::{SeqFormat, SequenceRecord},
    router::{OutputRouter, SinkKey},
};
use log::{debug, info};
use std::path::Path;
use std::sync::Arc;

/// `sample_id` is `None` for unassigned reads, whose record is passed
/// through unchanged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DemultiplexResult {
    pub sample_index: Option<usize>,
    pub sample_id: Option<Arc<str>>,
    pub record: SequenceRecord,
    pub exact: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PairResult {
    pub sample_index: Option<usize>,
    pub sample_id: Option<Arc<str>>,
    pub forward: SequenceRecord,
    pub reverse: SequenceRecord,
    pub forward_matched: bool,
    pub reverse_matched: bool,
    // R2 carried the barcode of a different sample than R1
    pub conflict: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SampleCount {
    pub sample_id: Arc<str>,
    pub reads: u64,
}

fn sample_counts(table: &BarcodeTable) -> Vec<SampleCount> {
    table
        .samples()
        .iter()
        .map(|s| SampleCount {
            sample_id: Arc::clone(s.sample_id()),
            reads: 0,
        })
        .collect()
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DemultiplexStats {
    pub total_reads: u64,
    pub assigned_reads: u64,
    pub unassigned_reads: u64,
    pub exact_matches: u64,
    pub corrected_matches: u64,
    // mapping-file order
    pub sample_counts: Vec<SampleCount>,
}

impl DemultiplexStats {
    pub fn for_table(table: &BarcodeTable) -> Self {
        DemultiplexStats {
            sample_counts: sample_counts(table),
            ..Default::default()
        }
    }

    pub fn reads_for(&self, sample_id: &str) -> u64 {
        self.sample_counts
            .iter()
            .find(|c| c.sample_id.as_ref() == sample_id)
            .map_or(0, |c| c.reads)
    }

    pub fn summary_line(&self) -> String {
        format!(
            "{} reads: {} assigned ({} exact, {} with one edit), {} unassigned",
            self.total_reads,
            self.assigned_reads,
            self.exact_matches,
            self.corrected_matches,
            self.unassigned_reads
        )
    }

    pub fn print_summary(&self) {
        println!("Demultiplexing Statistics:");
        println!("  Total reads: {}", self.total_reads);
        println!(
            "  Assigned reads: {} ({:.2}%)",
            self.assigned_reads,
            percent(self.assigned_reads, self.total_reads)
        );
        println!("    Exact barcode: {}", self.exact_matches);
        println!("    One edit: {}", self.corrected_matches);
        println!(
            "  Unassigned reads: {} ({:.2}%)",
            self.unassigned_reads,
            percent(self.unassigned_reads, self.total_reads)
        );
        println!("\nSample distribution:");
        for count in &self.sample_counts {
            println!(
                "  {}: {} ({:.2}%)",
                count.sample_id,
                count.reads,
                percent(count.reads, self.total_reads)
            );
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PairedDemultiplexStats {
    pub total_pairs: u64,
    pub assigned_pairs: u64,
    pub unassigned_pairs: u64,
    pub forward_matched: u64,
    pub reverse_matched: u64,
    pub conflicting_pairs: u64,
    // mapping-file order
    pub sample_counts: Vec<SampleCount>,
}

impl PairedDemultiplexStats {
    pub fn for_table(table: &BarcodeTable) -> Self {
        PairedDemultiplexStats {
            sample_counts: sample_counts(table),
            ..Default::default()
        }
    }

    pub fn pairs_for(&self, sample_id: &str) -> u64 {
        self.sample_counts
            .iter()
            .find(|c| c.sample_id.as_ref() == sample_id)
            .map_or(0, |c| c.reads)
    }

    pub fn summary_line(&self) -> String {
        format!(
            "{} pairs: {} assigned, {} unassigned, {} with conflicting mate barcodes",
            self.total_pairs, self.assigned_pairs, self.unassigned_pairs, self.conflicting_pairs
        )
    }

    pub fn print_summary(&self) {
        println!("Paired Demultiplexing Statistics:");
        println!("  Total pairs: {}", self.total_pairs);
        println!(
            "  Assigned pairs: {} ({:.2}%)",
            self.assigned_pairs,
            percent(self.assigned_pairs, self.total_pairs)
        );
        println!("    R1 barcode found: {}", self.forward_matched);
        println!("    R2 barcode found: {}", self.reverse_matched);
        println!("    Conflicting mates: {}", self.conflicting_pairs);
        println!("  Unassigned pairs: {}", self.unassigned_pairs);
        println!("\nSample distribution:");
        for count in &self.sample_counts {
            println!(
                "  {}: {} ({:.2}%)",
                count.sample_id,
                count.reads,
                percent(count.reads, self.total_pairs)
            );
        }
    }
}

pub struct Demultiplexer {
    forward: BarcodeTable,
    reverse: Option<BarcodeTable>,
    config: DemuxConfig,
}

impl Demultiplexer {
    pub fn new(sheet: &SampleSheet, config: DemuxConfig) -> Result<Self> {
        config.validate()?;

        let forward = BarcodeTable::from_sheet(sheet, config.mismatch)?;
        let reverse = match config.r2_barcodes {
            R2Barcodes::None => None,
            R2Barcodes::Same => Some(forward.clone()),
            R2Barcodes::ReverseComplement => {
                Some(BarcodeTable::reverse_complement_of(sheet, config.mismatch)?)
            }
        };

        info!(
            "Loaded {} samples from {} (mismatch {})",
            forward.len(),
            sheet.source(),
            config.mismatch
        );

        Ok(Demultiplexer {
            forward,
            reverse,
            config,
        })
    }

    pub fn from_mapping_file<P: AsRef<Path>>(mapping: P, config: DemuxConfig) -> Result<Self> {
        let sheet = SampleSheet::from_path(mapping)?;
        Self::new(&sheet, config)
    }

    pub fn config(&self) -> &DemuxConfig {
        &self.config
    }

    pub fn forward_table(&self) -> &BarcodeTable {
        &self.forward
    }

    pub fn reverse_table(&self) -> Option<&BarcodeTable> {
        self.reverse.as_ref()
    }

    pub fn assign(&self, record: SequenceRecord) -> DemultiplexResult {
        match self.forward.find(record.seq()) {
            Some(m) => DemultiplexResult {
                sample_index: Some(m.sample_index),
                sample_id: Some(Arc::clone(m.sample_id)),
                record: record.without_prefix(m.matched_len),
                exact: m.exact,
            },
            None => DemultiplexResult {
                sample_index: None,
                sample_id: None,
                record,
                exact: false,
            },
        }
    }

    /// R1's sample wins when the mates disagree. A mate is only trimmed when
    /// its barcode belongs to the pair's sample.
    pub fn assign_pair(&self, r1: SequenceRecord, r2: SequenceRecord) -> PairResult {
        let forward_match = self.forward.find(r1.seq());
        let reverse_match = self.reverse.as_ref().and_then(|table| table.find(r2.seq()));

        let chosen: Option<&BarcodeMatch<'_>> = forward_match.as_ref().or(reverse_match.as_ref());
        let sample_index = chosen.map(|m| m.sample_index);
        let sample_id = chosen.map(|m| Arc::clone(m.sample_id));

        let conflict = match (&forward_match, &reverse_match) {
            (Some(f), Some(r)) => f.sample_index != r.sample_index,
            _ => false,
        };

        PairResult {
            forward_matched: forward_match.is_some(),
            reverse_matched: reverse_match.is_some(),
            forward: trim_for_sample(r1, forward_match.as_ref(), sample_index),
            reverse: trim_for_sample(r2, reverse_match.as_ref(), sample_index),
            sample_index,
            sample_id,
            conflict,
        }
    }

    pub fn demultiplex_records<I>(
        &self,
        records: I,
        router: &mut OutputRouter,
        observer: &mut dyn RunObserver,
    ) -> Result<DemultiplexStats>
    where
        I: IntoIterator<Item = Result<SequenceRecord>>,
    {
        let mut stats = DemultiplexStats::for_table(&self.forward);
        let log_decisions = observer.wants_decisions();

        for record in records {
            let result = self.assign(record?);
            stats.total_reads += 1;

            match (result.sample_index, &result.sample_id) {
                (Some(index), Some(sample_id)) => {
                    stats.assigned_reads += 1;
                    if result.exact {
                        stats.exact_matches += 1;
                    } else {
                        stats.corrected_matches += 1;
                    }
                    stats.sample_counts[index].reads += 1;
                    router.write(&SinkKey::Sample(Arc::clone(sample_id)), &result.record)?;
                }
                _ => {
                    stats.unassigned_reads += 1;
                    router.write(&SinkKey::Unassigned, &result.record)?;
                }
            }

            if log_decisions {
                let decision = result.sample_id.as_deref().unwrap_or("unassigned");
                observer.on_decision(result.record.id(), decision);
            }
            observer.on_progress(stats.total_reads);
        }

        Ok(stats)
    }

    pub fn demultiplex_pairs<I>(
        &self,
        pairs: I,
        router: &mut OutputRouter,
        observer: &mut dyn RunObserver,
    ) -> Result<PairedDemultiplexStats>
    where
        I: IntoIterator<Item = Result<(SequenceRecord, SequenceRecord)>>,
    {
        let mut stats = PairedDemultiplexStats::for_table(&self.forward);
        let log_decisions = observer.wants_decisions();

        for pair in pairs {
            let (r1, r2) = pair?;
            let result = self.assign_pair(r1, r2);
            stats.total_pairs += 1;
            stats.forward_matched += result.forward_matched as u64;
            stats.reverse_matched += result.reverse_matched as u64;
            stats.conflicting_pairs += result.conflict as u64;

            let (forward_key, reverse_key) = match (result.sample_index, &result.sample_id) {
                (Some(index), Some(sample_id)) => {
                    stats.assigned_pairs += 1;
                    stats.sample_counts[index].reads += 1;
                    (
                        SinkKey::SampleMate(Arc::clone(sample_id), Mate::R1),
                        SinkKey::SampleMate(Arc::clone(sample_id), Mate::R2),
                    )
                }
                _ => {
                    stats.unassigned_pairs += 1;
                    (
                        SinkKey::UnassignedMate(Mate::R1),
                        SinkKey::UnassignedMate(Mate::R2),
                    )
                }
            };

            if result.conflict {
                debug!(
                    "{}: R1 and R2 carry barcodes of different samples, using R1",
                    result.forward.id()
                );
            }

            router.write(&forward_key, &result.forward)?;
            router.write(&reverse_key, &result.reverse)?;

            if log_decisions {
                let decision = format!(
                    "{}\tR1={}\tR2={}{}",
                    result.sample_id.as_deref().unwrap_or("unassigned"),
                    result.forward_matched,
                    result.reverse_matched,
                    if result.conflict { "\tconflict" } else { "" }
                );
                observer.on_decision(result.forward.id(), &decision);
            }
            observer.on_progress(stats.total_pairs);
        }

        Ok(stats)
    }

    /// Writes `<SampleID>.fastq` files plus `unassigned.fastq` into `output_dir`.
    pub fn demultiplex_single<P: AsRef<Path>, Q: AsRef<Path>>(
        &self,
        input: P,
        output_dir: Q,
    ) -> Result<DemultiplexStats> {
        let input = input.as_ref();
        let mut reader = SequenceReader::from_path(input)?;
        let format = reader.format()?.unwrap_or(SeqFormat::Fastq);

        let mut router = OutputRouter::new(output_dir, format)?.compress(self.config.compress);
        let mut observer = self.observers(&router)?;
        observer.on_start(&format!(
            "demultiplexing {} against {} samples (mismatch {})",
            input.display(),
            self.forward.len(),
            self.config.mismatch
        ));

        match self.demultiplex_records(reader, &mut router, &mut observer) {
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

    pub fn demultiplex_paired<P: AsRef<Path>, Q: AsRef<Path>, O: AsRef<Path>>(
        &self,
        r1_path: P,
        r2_path: Q,
        output_dir: O,
    ) -> Result<PairedDemultiplexStats> {
        let (r1_path, r2_path) = (r1_path.as_ref(), r2_path.as_ref());
        let pairs =
            PairedEndReader::from_paths(r1_path, r2_path)?.strict_pairing(self.config.strict_pairing);
        let format = pairs.format().unwrap_or(SeqFormat::Fastq);

        let mut router = OutputRouter::new(output_dir, format)?.compress(self.config.compress);
        let mut observer = self.observers(&router)?;
        observer.on_start(&format!(
            "demultiplexing {} + {} against {} samples (mismatch {}, R2 barcodes {:?})",
            r1_path.display(),
            r2_path.display(),
            self.forward.len(),
            self.config.mismatch,
            self.config.r2_barcodes
        ));

        match self.demultiplex_pairs(pairs, &mut router, &mut observer) {
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

    fn observers(&self, router: &OutputRouter) -> Result<Observers> {
        Ok(Observers::for_run(
            self.config.verbose,
            self.config.debug,
            self.config.progress_interval,
            &router.dir().join("demultiplex.log"),
        )?)
    }
}

fn trim_for_sample(
    record: SequenceRecord,
    found: Option<&BarcodeMatch<'_>>,
    sample_index: Option<usize>,
) -> SequenceRecord {
    match found {
        Some(m) if Some(m.sample_index) == sample_index => record.without_prefix(m.matched_len),
        _ => record,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapping::SampleEntry;
    use crate::progress::Quiet;

    fn sheet(samples: &[(&str, &str)]) -> SampleSheet {
        let entries = samples
            .iter()
            .map(|(id, bc)| SampleEntry {
                sample_id: id.to_string(),
                barcode: bc.as_bytes().to_vec(),
            })
            .collect();
        SampleSheet::from_entries(entries, "test.csv").unwrap()
    }

    fn read(id: &str, seq: &str, qual: &str) -> SequenceRecord {
        SequenceRecord::fastq(
            id,
            None,
            seq.as_bytes().to_vec(),
            qual.as_bytes().to_vec(),
            Arc::from("reads.fastq"),
        )
        .unwrap()
    }

    #[test]
    fn test_exact_match_trims_barcode_and_quality() {
        let demux = Demultiplexer::new(&sheet(&[("S1", "GCGT")]), DemuxConfig::new()).unwrap();
        let result = demux.assign(read("r", "GCGTAACC", "ABCDEFGH"));
        assert_eq!(result.sample_id.as_deref(), Some("S1"));
        assert_eq!(result.sample_index, Some(0));
        assert!(result.exact);
        assert_eq!(result.record.seq(), b"AACC");
        assert_eq!(result.record.qual(), Some(&b"EFGH"[..]));
    }

    #[test]
    fn test_deletion_match_trims_one_base_less() {
        let demux = Demultiplexer::new(&sheet(&[("S1", "GCGT")]), DemuxConfig::new().mismatch(1))
            .unwrap();
        // Barcode read with its second base deleted: GGT.
        let result = demux.assign(read("r", "GGTAACC", "ABCDEFG"));
        assert_eq!(result.sample_id.as_deref(), Some("S1"));
        assert!(!result.exact);
        assert_eq!(result.record.seq(), b"AACC");
        assert_eq!(result.record.qual(), Some(&b"DEFG"[..]));
    }

    #[test]
    fn test_mismatch_zero_rejects_variants() {
        let demux = Demultiplexer::new(&sheet(&[("S1", "GCGT")]), DemuxConfig::new()).unwrap();
        let result = demux.assign(read("r", "GCGAAACC", "ABCDEFGH"));
        assert_eq!(result.sample_id, None);
        assert_eq!(result.record.seq(), b"GCGAAACC");
        assert_eq!(result.record.qual(), Some(&b"ABCDEFGH"[..]));
    }

    #[test]
    fn test_pair_assigned_by_either_mate() {
        let demux = Demultiplexer::new(&sheet(&[("S1", "GCGT"), ("S2", "AATT")]), DemuxConfig::new())
            .unwrap();

        let result = demux.assign_pair(read("p/1", "CCCCCC", "IIIIII"), read("p/2", "AATTGG", "ABCDEF"));
        assert_eq!(result.sample_id.as_deref(), Some("S2"));
        assert!(!result.forward_matched);
        assert!(result.reverse_matched);
        assert_eq!(result.forward.seq(), b"CCCCCC");
        assert_eq!(result.reverse.seq(), b"GG");
        assert_eq!(result.reverse.qual(), Some(&b"EF"[..]));

        let result = demux.assign_pair(read("p/1", "CCCCCC", "IIIIII"), read("p/2", "CCCCCC", "IIIIII"));
        assert_eq!(result.sample_id, None);
    }

    #[test]
    fn test_conflicting_mates_follow_r1() {
        let demux = Demultiplexer::new(&sheet(&[("S1", "GCGT"), ("S2", "AATT")]), DemuxConfig::new())
            .unwrap();
        let result = demux.assign_pair(read("p/1", "AATTCC", "IIIIII"), read("p/2", "GCGTCC", "IIIIII"));
        assert_eq!(result.sample_id.as_deref(), Some("S2"));
        assert!(result.conflict);
        assert_eq!(result.forward.seq(), b"CC");
        // R2's barcode belongs to S1, so it stays in place.
        assert_eq!(result.reverse.seq(), b"GCGTCC");
    }

    #[test]
    fn test_reverse_complement_r2_barcodes() {
        let config = DemuxConfig::new().r2_barcodes(R2Barcodes::ReverseComplement);
        let demux = Demultiplexer::new(&sheet(&[("S1", "GCGT")]), config).unwrap();
        let result = demux.assign_pair(read("p/1", "CCCCCC", "IIIIII"), read("p/2", "ACGCTT", "IIIIII"));
        assert_eq!(result.sample_id.as_deref(), Some("S1"));
        assert_eq!(result.reverse.seq(), b"TT");
    }

    #[test]
    fn test_r2_not_searched_when_disabled() {
        let config = DemuxConfig::new().r2_barcodes(R2Barcodes::None);
        let demux = Demultiplexer::new(&sheet(&[("S1", "GCGT")]), config).unwrap();
        assert!(demux.reverse_table().is_none());
        let result = demux.assign_pair(read("p/1", "CCCCCC", "IIIIII"), read("p/2", "GCGTTT", "IIIIII"));
        assert_eq!(result.sample_id, None);
        assert_eq!(result.reverse.seq(), b"GCGTTT");
    }

    #[test]
    fn test_records_routed_and_counted() {
        let dir = tempfile::tempdir().unwrap();
        let demux = Demultiplexer::new(&sheet(&[("S1", "GCGT"), ("S2", "AATT")]), DemuxConfig::new())
            .unwrap();
        let mut router = OutputRouter::new(dir.path(), SeqFormat::Fastq).unwrap();

        let records = vec![
            Ok(read("a", "GCGTAC", "IIIIII")),
            Ok(read("b", "AATTAC", "IIIIII")),
            Ok(read("c", "TTTTAC", "IIIIII")),
            Ok(read("d", "GCGTGG", "IIIIII")),
        ];
        let stats = demux.demultiplex_records(records, &mut router, &mut Quiet).unwrap();
        assert_eq!(stats.total_reads, 4);
        assert_eq!(stats.assigned_reads, 3);
        assert_eq!(stats.unassigned_reads, 1);
        assert_eq!(stats.reads_for("S1"), 2);
        assert_eq!(stats.reads_for("S2"), 1);
        assert_eq!(router.records_written(&SinkKey::Sample(Arc::from("S1"))), 2);
        assert_eq!(router.records_written(&SinkKey::Unassigned), 1);
        router.finish().unwrap();
    }

    #[test]
    fn test_pair_counts_follow_sample_order() {
        let dir = tempfile::tempdir().unwrap();
        let config = DemuxConfig::new().r2_barcodes(R2Barcodes::ReverseComplement);
        let demux = Demultiplexer::new(&sheet(&[("S1", "GCGT"), ("S2", "AATT")]), config).unwrap();
        let mut router = OutputRouter::new(dir.path(), SeqFormat::Fastq).unwrap();

        // The second pair is found through R2 only (AATT reverse complemented).
        let pairs = vec![
            Ok((read("a/1", "GCGTAC", "IIIIII"), read("a/2", "CCCCCC", "IIIIII"))),
            Ok((read("b/1", "CCCCCC", "IIIIII"), read("b/2", "AATTGG", "IIIIII"))),
            Ok((read("c/1", "AATTAC", "IIIIII"), read("c/2", "CCCCCC", "IIIIII"))),
            Ok((read("d/1", "CCCCCC", "IIIIII"), read("d/2", "CCCCCC", "IIIIII"))),
        ];
        let stats = demux.demultiplex_pairs(pairs, &mut router, &mut Quiet).unwrap();
        assert_eq!(stats.assigned_pairs, 3);
        assert_eq!(stats.unassigned_pairs, 1);
        assert_eq!(stats.pairs_for("S1"), 1);
        assert_eq!(stats.pairs_for("S2"), 2);
        assert_eq!(
            stats.sample_counts.iter().map(|c| c.reads).sum::<u64>(),
            stats.assigned_pairs
        );
        router.finish().unwrap();
    }

    #[test]
    fn test_malformed_record_aborts_pass() {
        let dir = tempfile::tempdir().unwrap();
        let demux = Demultiplexer::new(&sheet(&[("S1", "GCGT")]), DemuxConfig::new()).unwrap();
        let mut router = OutputRouter::new(dir.path(), SeqFormat::Fastq).unwrap();

        let records = vec![
            Ok(read("a", "GCGTAC", "IIIIII")),
            Err(crate::error::FastqError::malformed("reads.fastq", 8, "truncated")),
            Ok(read("c", "GCGTAC", "IIIIII")),
        ];
        let err = demux.demultiplex_records(records, &mut router, &mut Quiet).unwrap_err();
        assert!(matches!(err, crate::error::FastqError::MalformedRecord { line: 8, .. }));
        assert_eq!(router.records_written(&SinkKey::Sample(Arc::from("S1"))), 1);
        router.abort();
    }

    #[test]
    fn test_invalid_config_rejected_at_setup() {
        assert!(Demultiplexer::new(&sheet(&[("S1", "GCGT")]), DemuxConfig::new().mismatch(3)).is_err());
    }
}
