use crate::error::{FastqError, Result};
use serde::Deserialize;
use std::collections::HashSet;
use std::fs;
use std::path::Path;

const SAMPLE_COLUMN: &str = "SampleID";
const BARCODE_COLUMN: &str = "BarcodeSequence";

/// Sample names that would collide with the run's own output files.
const RESERVED_SAMPLE_IDS: [&str; 1] = ["unassigned"];

#[derive(Debug, Deserialize)]
struct MappingRow {
    #[serde(rename = "SampleID")]
    sample_id: String,
    #[serde(rename = "BarcodeSequence")]
    barcode_sequence: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SampleEntry {
    pub sample_id: String,
    pub barcode: Vec<u8>,
}

/// Validated contents of a sample mapping file, in file order.
#[derive(Debug, Clone)]
pub struct SampleSheet {
    source: String,
    entries: Vec<SampleEntry>,
}

impl SampleSheet {
    /// Reads a `.csv` (comma separated) or `.txt` (tab or space separated)
    /// mapping file with a `SampleID` and a `BarcodeSequence` column.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let source = path.display().to_string();
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase());

        let text = fs::read_to_string(path)
            .map_err(|e| FastqError::mapping(&source, format!("cannot read file: {}", e)))?;

        match extension.as_deref() {
            Some("csv") => Self::from_delimited(text.as_bytes(), b',', &source),
            Some("txt") => Self::from_delimited(normalize_whitespace(&text).as_bytes(), b'\t', &source),
            _ => Err(FastqError::mapping(&source, "expected a .csv or .txt file")),
        }
    }

    pub fn from_delimited(data: &[u8], delimiter: u8, source: &str) -> Result<Self> {
        let mut reader = csv::ReaderBuilder::new()
            .delimiter(delimiter)
            .trim(csv::Trim::All)
            .from_reader(data);

        let headers = reader
            .headers()
            .map_err(|e| FastqError::mapping(source, e.to_string()))?;
        let columns: Vec<&str> = headers.iter().collect();
        if columns != [SAMPLE_COLUMN, BARCODE_COLUMN] {
            return Err(FastqError::mapping(
                source,
                format!(
                    "expected columns '{}' and '{}', found {:?}",
                    SAMPLE_COLUMN, BARCODE_COLUMN, columns
                ),
            ));
        }

        let mut entries = Vec::new();
        for row in reader.deserialize::<MappingRow>() {
            let row = row.map_err(|e| FastqError::mapping(source, e.to_string()))?;
            entries.push(SampleEntry {
                sample_id: row.sample_id,
                barcode: row.barcode_sequence.to_ascii_uppercase().into_bytes(),
            });
        }

        Self::from_entries(entries, source)
    }

    pub fn from_entries(entries: Vec<SampleEntry>, source: &str) -> Result<Self> {
        if entries.is_empty() {
            return Err(FastqError::mapping(source, "no samples listed"));
        }

        let mut sample_ids = HashSet::new();
        let mut barcodes = HashSet::new();

        for entry in &entries {
            validate_sample_id(&entry.sample_id).map_err(|msg| FastqError::mapping(source, msg))?;

            if !sample_ids.insert(entry.sample_id.as_str()) {
                return Err(FastqError::mapping(
                    source,
                    format!("duplicate SampleID '{}'", entry.sample_id),
                ));
            }

            if entry.barcode.is_empty() {
                return Err(FastqError::mapping(
                    source,
                    format!("sample '{}' has an empty barcode", entry.sample_id),
                ));
            }
            if let Some(&base) = entry
                .barcode
                .iter()
                .find(|&&b| !matches!(b, b'A' | b'C' | b'G' | b'T' | b'N'))
            {
                return Err(FastqError::mapping(
                    source,
                    format!(
                        "sample '{}' has invalid barcode base '{}'",
                        entry.sample_id, base as char
                    ),
                ));
            }
            if !barcodes.insert(entry.barcode.as_slice()) {
                return Err(FastqError::mapping(
                    source,
                    format!(
                        "barcode {} is listed for more than one sample",
                        String::from_utf8_lossy(&entry.barcode)
                    ),
                ));
            }
        }

        Ok(SampleSheet {
            source: source.to_string(),
            entries,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn entries(&self) -> &[SampleEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn validate_sample_id(sample_id: &str) -> std::result::Result<(), String> {
    if sample_id.is_empty() {
        return Err("empty SampleID".to_string());
    }
    if sample_id == "." || sample_id == ".." || sample_id.contains(['/', '\\']) {
        return Err(format!("SampleID '{}' cannot be used as a file name", sample_id));
    }
    if RESERVED_SAMPLE_IDS
        .iter()
        .any(|reserved| reserved.eq_ignore_ascii_case(sample_id))
    {
        return Err(format!("SampleID '{}' is reserved", sample_id));
    }
    Ok(())
}

/// Rewrites runs of spaces/tabs as single tabs so `.txt` sheets may use either.
fn normalize_whitespace(text: &str) -> String {
    text.lines()
        .map(|line| line.split_whitespace().collect::<Vec<_>>().join("\t"))
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn sheet_file(suffix: &str, contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(suffix).tempfile().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_csv_sheet() {
        let file = sheet_file(".csv", "SampleID,BarcodeSequence\nS1,acgt\nS2,GGCC\n");
        let sheet = SampleSheet::from_path(file.path()).unwrap();
        assert_eq!(sheet.len(), 2);
        assert_eq!(sheet.entries()[0].sample_id, "S1");
        assert_eq!(sheet.entries()[0].barcode, b"ACGT");
        assert_eq!(sheet.entries()[1].sample_id, "S2");
    }

    #[test]
    fn test_txt_sheet_with_spaces_and_tabs() {
        let file = sheet_file(".txt", "SampleID BarcodeSequence\nSample1   ACGT\nSample2\tGGCC\n\n");
        let sheet = SampleSheet::from_path(file.path()).unwrap();
        assert_eq!(sheet.len(), 2);
        assert_eq!(sheet.entries()[1].barcode, b"GGCC");
    }

    #[test]
    fn test_hash_prefixed_sample_id_is_kept() {
        let file = sheet_file(".csv", "SampleID,BarcodeSequence\n#1,GCGT\nS2,AATT\n");
        let sheet = SampleSheet::from_path(file.path()).unwrap();
        assert_eq!(sheet.len(), 2);
        assert_eq!(sheet.entries()[0].sample_id, "#1");
        assert_eq!(sheet.entries()[0].barcode, b"GCGT");
    }

    #[test]
    fn test_wrong_columns() {
        let file = sheet_file(".csv", "Sample,Barcode\nS1,ACGT\n");
        let err = SampleSheet::from_path(file.path()).unwrap_err();
        assert!(matches!(err, FastqError::MappingFileInvalid { .. }));

        let file = sheet_file(".csv", "SampleID,BarcodeSequence,Extra\nS1,ACGT,x\n");
        assert!(SampleSheet::from_path(file.path()).is_err());
    }

    #[test]
    fn test_duplicate_sample_ids() {
        let file = sheet_file(".csv", "SampleID,BarcodeSequence\nS1,ACGT\nS1,GGCC\n");
        let err = SampleSheet::from_path(file.path()).unwrap_err();
        assert!(err.to_string().contains("duplicate SampleID"));
    }

    #[test]
    fn test_duplicate_barcodes() {
        let file = sheet_file(".csv", "SampleID,BarcodeSequence\nS1,ACGT\nS2,acgt\n");
        assert!(SampleSheet::from_path(file.path()).is_err());
    }

    #[test]
    fn test_invalid_rows() {
        for contents in [
            "SampleID,BarcodeSequence\n",
            "SampleID,BarcodeSequence\nS1,ACXT\n",
            "SampleID,BarcodeSequence\nS1,\n",
            "SampleID,BarcodeSequence\nS1\n",
            "SampleID,BarcodeSequence\n../S1,ACGT\n",
            "SampleID,BarcodeSequence\nUnassigned,ACGT\n",
        ] {
            let file = sheet_file(".csv", contents);
            assert!(
                matches!(
                    SampleSheet::from_path(file.path()),
                    Err(FastqError::MappingFileInvalid { .. })
                ),
                "accepted {:?}",
                contents
            );
        }
    }

    #[test]
    fn test_unsupported_extension() {
        let file = sheet_file(".tsv", "SampleID\tBarcodeSequence\nS1\tACGT\n");
        assert!(matches!(
            SampleSheet::from_path(file.path()),
            Err(FastqError::MappingFileInvalid { .. })
        ));
    }
}
