//! Source positions and collected field errors
#![allow(clippy::must_use_candidate)] // Constructor helpers are clear at call sites without #[must_use].
#![allow(clippy::return_self_not_must_use)] // Fluent setters are designed for chaining.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Source position of a lexed token or record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    /// Line number (1-indexed)
    pub line: usize,

    /// Column number (1-indexed)
    pub column: usize,
}

impl Position {
    /// Create a new position
    pub fn new(line: usize, column: usize) -> Self {
        Self { line, column }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {} pos {}", self.line, self.column)
    }
}

/// A non-fatal violation found while formatting or checking a document.
///
/// Field errors are collected; the document is rejected once parsing is
/// complete, reporting every entry rather than just the first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
    /// Machine-readable code (`F05`, `S03`, `E02`, ...)
    pub code: String,

    /// Human-readable message
    pub message: String,

    /// Record path (`UNH/LIN`) where the violation was found
    pub record: Option<String>,

    /// Field id, if the error concerns a single field
    pub field: Option<String>,

    /// Source position, when the document came from a lexed stream
    pub position: Option<Position>,
}

impl FieldError {
    /// Create a new field error
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            record: None,
            field: None,
            position: None,
        }
    }

    /// Attach the record path
    pub fn in_record(mut self, record: impl Into<String>) -> Self {
        self.record = Some(record.into());
        self
    }

    /// Attach the field id
    pub fn for_field(mut self, field: impl Into<String>) -> Self {
        self.field = Some(field.into());
        self
    }

    /// Attach a source position
    pub fn at(mut self, position: Option<Position>) -> Self {
        self.position = position;
        self
    }
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]", self.code)?;
        if let Some(record) = &self.record {
            write!(f, " record \"{record}\"")?;
        }
        if let Some(field) = &self.field {
            write!(f, " field \"{field}\"")?;
        }
        if let Some(position) = &self.position {
            write!(f, " {position}")?;
        }
        write!(f, ": {}", self.message)
    }
}
