//! # edi-adapter-csv
//!
//! CSV specifics for the translation engine.
//!
//! CSV files are lexed like any other delimited format. This crate applies
//! the CSV record options afterwards (header lines to skip, records without
//! a type marker) and exports lexed records as a table for inspection.
//!
//! ## Example Usage
//!
//! ```rust
//! use edi_adapter_csv::{apply_record_options, LexedTableWriter};
//! use edi_grammar::Syntax;
//! use edi_ir::{LexedRecord, LexedToken, TokenKind};
//!
//! let mut records = vec![LexedRecord::new(vec![
//!     LexedToken::new("4711", TokenKind::Field, 1, 1),
//!     LexedToken::new("5", TokenKind::Field, 1, 6),
//! ])];
//! let mut syntax = Syntax::default();
//! syntax.no_botsid = edi_grammar::NoBotsid::Flag(true);
//! apply_record_options(&mut records, &syntax, "LINE").unwrap();
//! assert_eq!(records[0].id(), Some("LINE"));
//!
//! let mut out = Vec::new();
//! LexedTableWriter::new().write(&mut out, &records).unwrap();
//! ```

pub mod records;
pub mod table;

pub use records::apply_record_options;
pub use table::{LexedRow, LexedTableWriter};

use thiserror::Error;

/// Errors that can occur when handling CSV records
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// A record lacks the column configured to hold its type marker
    #[error("Record at line {line} has no column {column} holding the record type")]
    MissingTag { line: usize, column: usize },

    /// Writing the table failed
    #[error("CSV write error: {0}")]
    Write(String),
}

impl Error {
    /// Create a write error
    pub fn write(message: impl Into<String>) -> Self {
        Self::Write(message.into())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
