//! Tabular export of lexed records

use crate::{Error, Result};
use edi_ir::{LexedRecord, TokenKind};
use serde::Serialize;
use std::io::Write;
use tracing::{debug, trace};

/// One lexed token as a table row
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LexedRow<'a> {
    /// 1-based record number
    pub record: usize,
    pub line: usize,
    pub column: usize,
    pub kind: &'static str,
    pub value: &'a str,
}

fn kind_name(kind: TokenKind) -> &'static str {
    match kind {
        TokenKind::Field => "field",
        TokenKind::Subfield => "subfield",
        TokenKind::Repeat => "repeat",
    }
}

/// Writer for lexed records, one row per token
pub struct LexedTableWriter {
    delimiter: u8,
    has_header: bool,
}

impl LexedTableWriter {
    /// Create a new writer: comma separated, with header row
    pub fn new() -> Self {
        Self {
            delimiter: b',',
            has_header: true,
        }
    }

    /// Set delimiter character
    pub fn with_delimiter(mut self, delimiter: u8) -> Self {
        self.delimiter = delimiter;
        self
    }

    /// Configure header writing
    pub fn has_header(mut self, has_header: bool) -> Self {
        self.has_header = has_header;
        self
    }

    /// Write all tokens of `records`
    ///
    /// # Errors
    ///
    /// Fails when the underlying writer fails.
    pub fn write<W: Write>(&self, writer: W, records: &[LexedRecord]) -> Result<()> {
        let mut csv_writer = csv::WriterBuilder::new()
            .delimiter(self.delimiter)
            .has_headers(self.has_header)
            .from_writer(writer);

        for (index, record) in records.iter().enumerate() {
            for token in &record.tokens {
                let row = LexedRow {
                    record: index + 1,
                    line: token.line,
                    column: token.column,
                    kind: kind_name(token.kind),
                    value: &token.value,
                };
                csv_writer
                    .serialize(&row)
                    .map_err(|e| Error::write(e.to_string()))?;
                trace!(?row, "wrote lexed token");
            }
        }

        csv_writer
            .flush()
            .map_err(|e| Error::write(e.to_string()))?;
        debug!(record_count = records.len(), "finished writing lexed records");
        Ok(())
    }
}

impl Default for LexedTableWriter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use edi_ir::LexedToken;

    fn records() -> Vec<LexedRecord> {
        vec![
            LexedRecord::new(vec![
                LexedToken::new("UNH", TokenKind::Field, 1, 1),
                LexedToken::new("1", TokenKind::Field, 1, 5),
                LexedToken::new("ORDERS", TokenKind::Field, 1, 7),
                LexedToken::new("D", TokenKind::Subfield, 1, 14),
            ]),
            LexedRecord::new(vec![
                LexedToken::new("FTX", TokenKind::Field, 2, 1),
                LexedToken::new("a,b", TokenKind::Field, 2, 5),
            ]),
        ]
    }

    #[test]
    fn test_rows_per_token() {
        let mut out = Vec::new();
        LexedTableWriter::new().write(&mut out, &records()).unwrap();
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines[0], "record,line,column,kind,value");
        assert_eq!(lines[4], "1,1,14,subfield,D");
        assert_eq!(lines[6], "2,2,5,field,\"a,b\"");
        assert_eq!(lines.len(), 7);
    }

    #[test]
    fn test_without_header_and_tab_delimited() {
        let mut out = Vec::new();
        LexedTableWriter::new()
            .with_delimiter(b'\t')
            .has_header(false)
            .write(&mut out, &records()[..1])
            .unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.starts_with("1\t1\t1\tfield\tUNH\n"));
    }
}
