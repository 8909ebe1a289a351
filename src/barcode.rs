use crate::{
    error::{FastqError, Result},
    mapping::SampleSheet,
};
use log::{debug, warn};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

const SUBSTITUTION_BASES: [u8; 4] = [b'G', b'C', b'A', b'T'];

// Barcode first, then substitutions in G, C, A, T order per position, then
// deletions. Duplicate deletions from homopolymer runs keep their first slot.
pub fn potential_mismatches(barcode: &[u8], mismatch: usize) -> Result<Vec<Vec<u8>>> {
    match mismatch {
        0 => Ok(vec![barcode.to_vec()]),
        1 => {
            let mut seen = HashSet::new();
            let mut variants = Vec::with_capacity(1 + barcode.len() * 4);
            let mut push = |variant: Vec<u8>| {
                if seen.insert(variant.clone()) {
                    variants.push(variant);
                }
            };

            push(barcode.to_vec());

            for (pos, &base) in barcode.iter().enumerate() {
                for &alt in SUBSTITUTION_BASES.iter().filter(|&&alt| alt != base) {
                    let mut variant = barcode.to_vec();
                    variant[pos] = alt;
                    push(variant);
                }
            }

            for pos in 0..barcode.len() {
                let mut variant = Vec::with_capacity(barcode.len() - 1);
                variant.extend_from_slice(&barcode[..pos]);
                variant.extend_from_slice(&barcode[pos + 1..]);
                push(variant);
            }

            Ok(variants)
        }
        _ => Err(FastqError::UnsupportedConfiguration(format!(
            "mismatch must be 0 or 1, got {}",
            mismatch
        ))),
    }
}

pub fn reverse_complement(seq: &[u8]) -> Vec<u8> {
    seq.iter()
        .rev()
        .map(|&base| match base {
            b'A' => b'T',
            b'C' => b'G',
            b'G' => b'C',
            b'T' => b'A',
            b'a' => b't',
            b'c' => b'g',
            b'g' => b'c',
            b't' => b'a',
            b'n' => b'n',
            _ => b'N',
        })
        .collect()
}

#[derive(Debug, Clone)]
pub struct SampleBarcodes {
    sample_id: Arc<str>,
    barcode: Vec<u8>,
    accepted: Vec<Vec<u8>>,
}

impl SampleBarcodes {
    pub fn sample_id(&self) -> &Arc<str> {
        &self.sample_id
    }

    pub fn barcode(&self) -> &[u8] {
        &self.barcode
    }

    pub fn accepted(&self) -> &[Vec<u8>] {
        &self.accepted
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BarcodeMatch<'a> {
    pub sample_index: usize,
    pub sample_id: &'a Arc<str>,
    pub matched_len: usize,
    pub exact: bool,
}

/// Samples in mapping order with their accepted barcode sequences. A read
/// goes to the first sample with an accepted prefix of it.
#[derive(Debug, Clone)]
pub struct BarcodeTable {
    samples: Vec<SampleBarcodes>,
    // accepted sequence -> (sample index, rank within the sample), first insert wins
    lookup: HashMap<Vec<u8>, (usize, usize)>,
    lengths: Vec<usize>,
    collisions: usize,
    mismatch: usize,
}

impl BarcodeTable {
    pub fn build<I, S>(entries: I, mismatch: usize) -> Result<Self>
    where
        I: IntoIterator<Item = (S, Vec<u8>)>,
        S: Into<Arc<str>>,
    {
        let mut samples: Vec<SampleBarcodes> = Vec::new();
        let mut lookup: HashMap<Vec<u8>, (usize, usize)> = HashMap::new();
        let mut collisions = 0;

        for (sample_index, (sample_id, barcode)) in entries.into_iter().enumerate() {
            let sample_id: Arc<str> = sample_id.into();
            // A one-base barcode would leave an empty deletion variant that
            // prefixes every read.
            if mismatch > 0 && barcode.len() < 2 {
                return Err(FastqError::UnsupportedConfiguration(format!(
                    "barcode {} of {} is too short for mismatch {}",
                    String::from_utf8_lossy(&barcode),
                    sample_id,
                    mismatch
                )));
            }
            let accepted = potential_mismatches(&barcode, mismatch)?;

            for (rank, variant) in accepted.iter().enumerate() {
                match lookup.get(variant) {
                    Some(&(owner, _)) => {
                        collisions += 1;
                        let owner_id = &samples[owner].sample_id;
                        debug!(
                            "{} is accepted for both {} and {}; {} takes precedence",
                            String::from_utf8_lossy(variant),
                            owner_id,
                            sample_id,
                            owner_id
                        );
                    }
                    None => {
                        lookup.insert(variant.clone(), (sample_index, rank));
                    }
                }
            }

            samples.push(SampleBarcodes {
                sample_id,
                barcode,
                accepted,
            });
        }

        if collisions > 0 {
            warn!(
                "{} accepted barcode sequences are shared between samples; \
                 reads matching them go to the sample listed first",
                collisions
            );
        }

        let mut lengths: Vec<usize> = lookup.keys().map(|k| k.len()).collect();
        lengths.sort_unstable();
        lengths.dedup();

        Ok(BarcodeTable {
            samples,
            lookup,
            lengths,
            collisions,
            mismatch,
        })
    }

    pub fn from_sheet(sheet: &SampleSheet, mismatch: usize) -> Result<Self> {
        Self::build(
            sheet
                .entries()
                .iter()
                .map(|e| (e.sample_id.as_str(), e.barcode.clone())),
            mismatch,
        )
    }

    pub fn reverse_complement_of(sheet: &SampleSheet, mismatch: usize) -> Result<Self> {
        Self::build(
            sheet
                .entries()
                .iter()
                .map(|e| (e.sample_id.as_str(), reverse_complement(&e.barcode))),
            mismatch,
        )
    }

    pub fn find(&self, seq: &[u8]) -> Option<BarcodeMatch<'_>> {
        let mut best: Option<(usize, usize, usize)> = None;

        for &len in &self.lengths {
            if len > seq.len() {
                break;
            }
            if let Some(&(sample, rank)) = self.lookup.get(&seq[..len]) {
                let better = match best {
                    Some((best_sample, best_rank, _)) => (sample, rank) < (best_sample, best_rank),
                    None => true,
                };
                if better {
                    best = Some((sample, rank, len));
                }
            }
        }

        best.map(|(sample_index, rank, matched_len)| BarcodeMatch {
            sample_index,
            sample_id: &self.samples[sample_index].sample_id,
            matched_len,
            exact: rank == 0,
        })
    }

    pub fn samples(&self) -> &[SampleBarcodes] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn collisions(&self) -> usize {
        self.collisions
    }

    pub fn mismatch(&self) -> usize {
        self.mismatch
    }
}
