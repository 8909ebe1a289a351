use crate::{
    error::{FastqError, Result},
    record::{SeqFormat, SequenceRecord},
};
use std::io::BufRead;
use std::sync::Arc;

/// Streaming FASTQ/FASTA parser. Holds at most one record in memory.
pub struct Parser<R: BufRead> {
    reader: R,
    source: Arc<str>,
    line: usize,
    format: Option<SeqFormat>,
    buf: Vec<u8>,
    failed: bool,
}

impl<R: BufRead> Parser<R> {
    pub fn new(reader: R, source: impl Into<Arc<str>>) -> Self {
        Parser {
            reader,
            source: source.into(),
            line: 0,
            format: None,
            buf: Vec::with_capacity(256),
            failed: false,
        }
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Recognizes the format from the first non-blank byte. `None` for empty input.
    pub fn format(&mut self) -> Result<Option<SeqFormat>> {
        if self.format.is_none() {
            self.skip_blank_lines()?;
            self.format = match self.peek_byte()? {
                None => None,
                Some(b'@') => Some(SeqFormat::Fastq),
                Some(b'>') => Some(SeqFormat::Fasta),
                Some(other) => {
                    return Err(self.malformed(
                        self.line + 1,
                        format!("expected '@' or '>' but found '{}'", other as char),
                    ))
                }
            };
        }
        Ok(self.format)
    }

    pub fn parse_record(&mut self) -> Result<Option<SequenceRecord>> {
        match self.format()? {
            None => Ok(None),
            Some(SeqFormat::Fastq) => self.parse_fastq(),
            Some(SeqFormat::Fasta) => self.parse_fasta(),
        }
    }

    fn parse_fastq(&mut self) -> Result<Option<SequenceRecord>> {
        self.skip_blank_lines()?;
        if !self.read_line()? {
            return Ok(None);
        }

        let header_line = self.line;
        if self.buf.first() != Some(&b'@') {
            return Err(self.malformed(header_line, "invalid header: expected '@'"));
        }
        let (id, desc) = self.parse_header()?;

        if !self.read_line()? {
            return Err(self.malformed(header_line, "unexpected end of file after header"));
        }
        let seq = self.buf.clone();

        if !self.read_line()? {
            return Err(self.malformed(self.line, "unexpected end of file before separator"));
        }
        if self.buf.first() != Some(&b'+') {
            return Err(self.malformed(self.line, "invalid separator: expected '+'"));
        }

        if !self.read_line()? {
            return Err(self.malformed(self.line, "unexpected end of file before quality"));
        }
        if seq.len() != self.buf.len() {
            return Err(self.malformed(
                self.line,
                format!(
                    "sequence and quality lengths don't match (seq: {}, qual: {})",
                    seq.len(),
                    self.buf.len()
                ),
            ));
        }
        if let Some(&q) = self.buf.iter().find(|q| !(b'!'..=b'~').contains(*q)) {
            return Err(self.malformed(self.line, format!("invalid quality character: {}", q)));
        }
        let qual = self.buf.clone();

        SequenceRecord::fastq(id, desc, seq, qual, Arc::clone(&self.source)).map(Some)
    }

    fn parse_fasta(&mut self) -> Result<Option<SequenceRecord>> {
        self.skip_blank_lines()?;
        if !self.read_line()? {
            return Ok(None);
        }

        if self.buf.first() != Some(&b'>') {
            return Err(self.malformed(self.line, "invalid header: expected '>'"));
        }
        let (id, desc) = self.parse_header()?;

        let mut seq = Vec::new();
        loop {
            match self.peek_byte()? {
                None | Some(b'>') => break,
                Some(_) => {
                    self.read_line()?;
                    seq.extend(self.buf.iter().filter(|b| !b.is_ascii_whitespace()));
                }
            }
        }

        Ok(Some(SequenceRecord::fasta(id, desc, seq, Arc::clone(&self.source))))
    }

    fn parse_header(&self) -> Result<(String, Option<String>)> {
        let header = &self.buf[1..];
        let (id, desc) = match memchr::memchr2(b' ', b'\t', header) {
            Some(pos) => (&header[..pos], Some(&header[pos + 1..])),
            None => (header, None),
        };

        if id.is_empty() {
            return Err(self.malformed(self.line, "empty record identifier"));
        }

        let decode = |bytes: &[u8]| {
            String::from_utf8(bytes.to_vec())
                .map_err(|_| self.malformed(self.line, "header is not valid UTF-8"))
        };
        Ok((decode(id)?, desc.map(decode).transpose()?))
    }

    /// Reads the next line into `buf` without its terminator.
    fn read_line(&mut self) -> Result<bool> {
        self.buf.clear();
        if self.reader.read_until(b'\n', &mut self.buf)? == 0 {
            return Ok(false);
        }
        self.line += 1;

        if self.buf.last() == Some(&b'\n') {
            self.buf.pop();
        }
        if self.buf.last() == Some(&b'\r') {
            self.buf.pop();
        }
        Ok(true)
    }

    fn peek_byte(&mut self) -> Result<Option<u8>> {
        Ok(self.reader.fill_buf()?.first().copied())
    }

    fn skip_blank_lines(&mut self) -> Result<()> {
        while let Some(b'\n' | b'\r') = self.peek_byte()? {
            self.read_line()?;
        }
        Ok(())
    }

    fn malformed(&self, line: usize, msg: impl Into<String>) -> FastqError {
        FastqError::malformed(&self.source, line, msg)
    }
}

impl<R: BufRead> Iterator for Parser<R> {
    type Item = Result<SequenceRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        let result = self.parse_record().transpose();
        if matches!(result, Some(Err(_))) {
            self.failed = true;
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(data: &[u8]) -> Vec<Result<SequenceRecord>> {
        Parser::new(data, "test.fastq").collect()
    }

    #[test]
    fn test_basic_fastq() {
        let records = parse(b"@SEQ_1\nACGT\n+\nIIII\n@SEQ_2 some desc\nTGCA\n+SEQ_2\nJJJJ\n");
        assert_eq!(records.len(), 2);
        let second = records[1].as_ref().unwrap();
        assert_eq!(second.id(), "SEQ_2");
        assert_eq!(second.desc(), Some("some desc"));
        assert_eq!(second.seq(), b"TGCA");
        assert_eq!(second.qual(), Some(&b"JJJJ"[..]));
        assert_eq!(second.source_filename(), "test.fastq");
    }

    #[test]
    fn test_windows_line_endings_and_blank_lines() {
        let records = parse(b"\n@SEQ_1\r\nACGT\r\n+\r\nIIII\r\n\n");
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].as_ref().unwrap().seq(), b"ACGT");
    }

    #[test]
    fn test_missing_trailing_newline() {
        let records = parse(b"@SEQ_1\nACGT\n+\nIIII");
        assert_eq!(records[0].as_ref().unwrap().qual(), Some(&b"IIII"[..]));
    }

    #[test]
    fn test_empty_input() {
        let mut parser = Parser::new(&b""[..], "empty.fastq");
        assert_eq!(parser.format().unwrap(), None);
        assert!(parser.next().is_none());
    }

    #[test]
    fn test_length_mismatch_reports_line() {
        let records = parse(b"@SEQ_1\nACGT\n+\nIIII\n@SEQ_2\nACGT\n+\nIII\n");
        assert_eq!(records.len(), 2);
        match &records[1] {
            Err(FastqError::MalformedRecord { file, line, msg }) => {
                assert_eq!(file, "test.fastq");
                assert_eq!(*line, 8);
                assert!(msg.contains("lengths don't match"));
            }
            other => panic!("expected MalformedRecord, got {:?}", other),
        }
    }

    #[test]
    fn test_parsing_stops_after_error() {
        let records = parse(b"@SEQ_1\nACGT\nIIII\n@SEQ_2\nACGT\n+\nIIII\n");
        assert_eq!(records.len(), 1);
        assert!(matches!(records[0], Err(FastqError::MalformedRecord { line: 3, .. })));
    }

    #[test]
    fn test_truncated_record() {
        let records = parse(b"@SEQ_1\nACGT\n");
        assert!(matches!(records[0], Err(FastqError::MalformedRecord { .. })));
    }

    #[test]
    fn test_unknown_format() {
        let mut parser = Parser::new(&b"SEQ_1\nACGT\n"[..], "bad.txt");
        assert!(matches!(parser.format(), Err(FastqError::MalformedRecord { line: 1, .. })));
    }

    #[test]
    fn test_multiline_fasta() {
        let data = b">chr1 first\nACGT\nTTGG\n\n>chr2\nCC\n";
        let records: Vec<_> = Parser::new(&data[..], "ref.fasta")
            .collect::<Result<Vec<_>>>()
            .unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].id(), "chr1");
        assert_eq!(records[0].desc(), Some("first"));
        assert_eq!(records[0].seq(), b"ACGTTTGG");
        assert_eq!(records[0].qual(), None);
        assert_eq!(records[1].seq(), b"CC");
    }
}
