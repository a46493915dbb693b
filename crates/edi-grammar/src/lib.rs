#![deny(warnings)]
#![deny(rust_2018_idioms)]
#![deny(unsafe_op_in_unsafe_fn)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

//! # edi-grammar
//!
//! Grammar model, loader, compiler and field formatting for EDI translation.
//!
//! A grammar describes one message type of one editype: its syntax
//! parameters (separators, charset, envelope), its record structure (which
//! records may follow which, how often, nested how deep) and its record
//! definitions (the fields of every record). Grammar sources are read through
//! a [`GrammarProvider`], checked and normalized by the [`GrammarCompiler`]
//! and cached per `(editype, name, kind)`.

/// Cache of compiled grammars.
pub mod cache;
/// Ambiguity checks on the record structure.
pub mod collision;
/// Source to compiled grammar.
pub mod compiler;
/// Per-editype defaults and format tables.
pub mod editype;
/// Field-level format checking and conversion.
pub mod formatter;
/// Compiled grammar model.
pub mod model;
/// Grammar sources and providers.
pub mod source;
/// Syntax parameters.
pub mod syntax;

pub use cache::{CacheKey, GrammarCache};
pub use compiler::GrammarCompiler;
pub use editype::{Editype, EditypeRules, FormatSpec};
pub use formatter::{FieldFormatter, FormatIssue, Formatted};
pub use model::{
    Align, BaseFormat, FieldDescriptor, Grammar, GrammarKind, RecordStructureNode, SplitCriteria,
};
pub use source::{
    DirectoryProvider, GrammarProvider, GrammarSource, MemoryProvider, RawLookup,
    RawStructureNode, RawValue,
};
pub use syntax::{ForceQuote, NoBotsid, RawSyntax, SkipFirstLine, Syntax};

use thiserror::Error;

/// Errors raised while loading or compiling a grammar.
///
/// Clonable so a failed compilation can be replayed from the cache.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("Grammar not found: {editype} \"{name}\"")]
    NotFound { editype: String, name: String },

    #[error("Grammar \"{grammar}\": cannot read source: {message}")]
    Source { grammar: String, message: String },

    #[error("Grammar \"{grammar}\": syntax: {message}")]
    Syntax { grammar: String, message: String },

    #[error("Grammar \"{grammar}\", in recorddefs, record \"{record}\", field \"{field}\": {message}")]
    Field {
        grammar: String,
        record: String,
        field: String,
        message: String,
    },

    #[error("Grammar \"{grammar}\", in structure, {location}: {message}")]
    Structure {
        grammar: String,
        location: String,
        message: String,
    },

    #[error("Grammar \"{grammar}\", in structure: {kind} collision detected at record \"{path}\"")]
    Collision {
        grammar: String,
        kind: String,
        path: String,
    },
}

impl Error {
    pub fn not_found(editype: impl Into<String>, name: impl Into<String>) -> Self {
        Self::NotFound {
            editype: editype.into(),
            name: name.into(),
        }
    }

    pub fn source(grammar: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Source {
            grammar: grammar.into(),
            message: message.into(),
        }
    }

    pub fn syntax(grammar: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Syntax {
            grammar: grammar.into(),
            message: message.into(),
        }
    }

    pub fn field(
        grammar: impl Into<String>,
        record: impl Into<String>,
        field: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::Field {
            grammar: grammar.into(),
            record: record.into(),
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn structure(
        grammar: impl Into<String>,
        location: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::Structure {
            grammar: grammar.into(),
            location: location.into(),
            message: message.into(),
        }
    }

    pub fn collision(
        grammar: impl Into<String>,
        kind: impl Into<String>,
        path: impl Into<String>,
    ) -> Self {
        Self::Collision {
            grammar: grammar.into(),
            kind: kind.into(),
            path: path.into(),
        }
    }

    /// True when no grammar source exists for the requested name.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn field_error_names_record_and_field() {
        let error = Error::field("orders", "UNH", "0062", "length has to be at least 1");
        assert_eq!(
            error.to_string(),
            "Grammar \"orders\", in recorddefs, record \"UNH\", field \"0062\": length has to be at least 1"
        );
    }

    #[test]
    fn not_found_is_recognized() {
        assert!(Error::not_found("edifact", "ORDERSD96A").is_not_found());
        assert!(!Error::syntax("x", "y").is_not_found());
    }
}
