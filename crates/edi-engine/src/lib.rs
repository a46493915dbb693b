#![deny(warnings)]
#![deny(rust_2018_idioms)]
#![deny(unsafe_op_in_unsafe_fn)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

//! # edi-engine
//!
//! Translation core: lexing, structural parsing against a compiled grammar,
//! message checking, serializing and message splitting.
//!
//! One [`Engine`] serves every editype. Editype specifics (sniffing,
//! envelope checks, escape rules) are selected through a closed match on
//! [`edi_grammar::Editype`] in [`handler`]; the algorithms themselves are
//! shared.
//!
//! ## Example Usage
//!
//! ```rust
//! use edi_engine::{Engine, EngineConfig};
//! use edi_grammar::{Editype, MemoryProvider};
//! use std::sync::Arc;
//!
//! let provider = Arc::new(MemoryProvider::new());
//! provider
//!     .insert_yaml(
//!         Editype::Csv,
//!         "lines",
//!         r#"
//! syntax: { field_sep: ",", noBOTSID: true, quote_char: '"' }
//! structure:
//!   - { ID: LINE, MIN: 1, MAX: 999 }
//! recorddefs:
//!   LINE:
//!     - [BOTSID, M, 4, A]
//!     - [ARTICLE, M, 10, A]
//!     - [QTY, C, 5, R]
//! "#,
//!     )
//!     .unwrap();
//! let engine = Engine::with_provider(EngineConfig::default(), provider);
//! let document = engine.parse(b"4711,5\n4712,\"7\"\n", Editype::Csv, "lines").unwrap();
//! assert_eq!(document.root.children.len(), 2);
//! assert_eq!(document.root.children[1].text("QTY"), Some("7"));
//! ```

/// Character sets for reading and writing files.
pub mod charset;
/// Message checker: record occurrences, mandatory fields, field formats.
pub mod checker;
/// Engine configuration.
pub mod config;
/// Parse, serialize and split entry points.
pub mod engine;
/// Editype-specific behavior around the shared algorithms.
pub mod handler;
/// JSON documents to node trees and back.
pub mod json;
/// Lexers for delimited and fixed records.
pub mod lexer;
/// Matching lexed records against the grammar structure.
pub mod parser;
/// Node trees to records and records to text.
pub mod serializer;
/// Splitting a parsed interchange into messages.
pub mod splitter;
/// XML documents to node trees and back.
pub mod xml;

pub use charset::Charset;
pub use checker::{FieldCheck, MessageChecker};
pub use config::EngineConfig;
pub use engine::Engine;
pub use handler::FormatHandler;
pub use lexer::{check_separators, lex_fixed, DelimitedLexer};
pub use parser::{MessageTypeResolver, StructuralParser};
pub use serializer::Serializer;
pub use splitter::{split, SplitMessage};

use edi_ir::{FieldError, Position};
use thiserror::Error;

/// Document-level errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// Processing of the document stopped; `code` is the machine-readable code.
    #[error("[{code}]: {message}")]
    Fatal {
        code: &'static str,
        position: Option<Position>,
        message: String,
    },

    /// The document was read, but fields or records are not valid.
    #[error("{}", render_field_errors(.0))]
    FieldErrors(Vec<FieldError>),

    /// Nothing to translate; the whole file should be dropped.
    #[error("Discarded: {0}")]
    Discard(String),

    #[error(transparent)]
    Grammar(#[from] edi_grammar::Error),

    #[error(transparent)]
    Mpath(#[from] edi_ir::Error),

    #[error("No (valid) grammar for editype \"{editype}\" messagetype \"{messagetype}\".")]
    TranslationNotFound { editype: String, messagetype: String },

    /// The sub-message type of a record could not be read from the record.
    #[error("Could not find SUBTRANSLATION \"{lookup}\" in record \"{record}\".")]
    SubTranslationNotFound { record: String, lookup: String },

    #[error("IO error during {operation} for '{path}': {message}")]
    Io {
        operation: String,
        path: String,
        message: String,
    },
}

fn render_field_errors(errors: &[FieldError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("\n")
}

impl Error {
    /// Create a fatal error with its source position
    pub fn fatal(code: &'static str, position: Option<Position>, message: impl Into<String>) -> Self {
        Self::Fatal {
            code,
            position,
            message: message.into(),
        }
    }

    pub fn translation_not_found(editype: impl Into<String>, messagetype: impl Into<String>) -> Self {
        Self::TranslationNotFound {
            editype: editype.into(),
            messagetype: messagetype.into(),
        }
    }

    /// Create a structured IO error with operation/path context.
    pub fn io(operation: impl Into<String>, path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Io {
            operation: operation.into(),
            path: path.into(),
            message: message.into(),
        }
    }

    /// Machine-readable code of a fatal error
    #[must_use]
    pub fn code(&self) -> Option<&'static str> {
        match self {
            Self::Fatal { code, .. } => Some(code),
            _ => None,
        }
    }
}

impl From<edi_adapter_edifact::Error> for Error {
    fn from(err: edi_adapter_edifact::Error) -> Self {
        match err {
            edi_adapter_edifact::Error::Fatal { code, message } => Self::fatal(code, None, message),
            edi_adapter_edifact::Error::Mpath(err) => Self::Mpath(err),
        }
    }
}

impl From<edi_adapter_x12::Error> for Error {
    fn from(err: edi_adapter_x12::Error) -> Self {
        match err {
            edi_adapter_x12::Error::Fatal { code, message } => Self::fatal(code, None, message),
            edi_adapter_x12::Error::Mpath(err) => Self::Mpath(err),
        }
    }
}

impl From<edi_adapter_csv::Error> for Error {
    fn from(err: edi_adapter_csv::Error) -> Self {
        match err {
            edi_adapter_csv::Error::MissingTag { line, column } => Self::fatal(
                "A61",
                Some(Position::new(line, 0)),
                format!("line {line}: record has no column {column} holding the record type."),
            ),
            edi_adapter_csv::Error::Write(message) => Self::io("write", "<table>", message),
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Self::io("io", "<unknown>", err.to_string())
    }
}

/// Crate-local result type
pub type Result<T> = std::result::Result<T, Error>;
