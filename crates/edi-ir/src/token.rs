//! Lexed tokens and records
#![allow(clippy::must_use_candidate)]

use crate::metadata::Position;
use serde::{Deserialize, Serialize};

/// Separator that preceded a token
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TokenKind {
    /// Starts a new field
    Field,
    /// Starts a new subfield within a composite
    Subfield,
    /// Starts a new repeat of the previous field
    Repeat,
}

/// One value from the wire, tagged with how it was separated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LexedToken {
    pub value: String,
    pub kind: TokenKind,
    pub line: usize,
    pub column: usize,
    /// Set on outgoing tokens whose field is alphanumeric (drives quoting)
    #[serde(default)]
    pub alphanumeric: bool,
}

impl LexedToken {
    /// Token read from input
    pub fn new(value: impl Into<String>, kind: TokenKind, line: usize, column: usize) -> Self {
        Self {
            value: value.into(),
            kind,
            line,
            column,
            alphanumeric: false,
        }
    }

    /// Token produced for output
    pub fn outgoing(value: impl Into<String>, kind: TokenKind, alphanumeric: bool) -> Self {
        Self {
            value: value.into(),
            kind,
            line: 0,
            column: 0,
            alphanumeric,
        }
    }

    /// Source position
    pub fn position(&self) -> Position {
        Position::new(self.line, self.column)
    }
}

/// A flat record as found on the wire, before structural matching.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LexedRecord {
    pub tokens: Vec<LexedToken>,

    /// Raw text of the record for fixed-width formats
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw: Option<String>,
}

impl LexedRecord {
    pub fn new(tokens: Vec<LexedToken>) -> Self {
        Self { tokens, raw: None }
    }

    /// Fixed-width record: the id token plus the raw line
    pub fn fixed(id: LexedToken, raw: impl Into<String>) -> Self {
        Self {
            tokens: vec![id],
            raw: Some(raw.into()),
        }
    }

    /// Value of the first token (the record type marker)
    pub fn id(&self) -> Option<&str> {
        self.tokens.first().map(|t| t.value.as_str())
    }

    /// Position of the first token
    pub fn position(&self) -> Option<Position> {
        self.tokens.first().map(LexedToken::position)
    }

    /// Values of tokens that start a field, in order
    pub fn field_values(&self) -> impl Iterator<Item = &str> {
        self.tokens
            .iter()
            .filter(|t| t.kind == TokenKind::Field)
            .map(|t| t.value.as_str())
    }
}
