#![deny(warnings)]
#![deny(rust_2018_idioms)]
#![deny(unsafe_op_in_unsafe_fn)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

//! # edi-ir
//!
//! Node tree, mpath query language and lexed-record structures for EDI documents.
//!
//! A parsed interchange is held as a tree of [`Node`]s. Each node owns one
//! record (field id to value) and its ordered children. Nodes are located and
//! mutated with mpaths: ordered sequences of [`Criteria`], one per tree level.

/// Parsed document plus the attribute set handed to downstream consumers.
pub mod document;
/// Source positions and collected (non-fatal) field errors.
pub mod metadata;
/// mpath criteria, textual mpath syntax and lookups.
pub mod mpath;
/// Core tree node model.
pub mod node;
/// Query and mutation operations on the node tree.
pub mod query;
/// Tokens and records produced by the lexers.
pub mod token;

pub use document::{Document, DocumentMetadata};
pub use metadata::{FieldError, Position};
pub use mpath::{display_path, Criteria, Lookup, Mpath, Selector, DEFAULT_OCCURRENCE, OCCURRENCE_KEY, TYPE_MARKER};
pub use node::{FieldValue, Node, Queries, Record};
pub use query::{CheckedNode, Loop, MpathCheck, SortOptions};
pub use token::{LexedRecord, LexedToken, TokenKind};

use thiserror::Error;

/// Errors raised by mpath operations on the node tree.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("Invalid mpath '{path}': {reason}")]
    MpathFormat { path: String, reason: String },

    #[error("Root record does not match first step of '{path}'")]
    PutRoot { path: String },

    #[error("mpath '{path}' does not fit the grammar: {reason}")]
    Grammar { path: String, reason: String },
}

impl Error {
    /// Build an mpath format error.
    pub fn mpath_format(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::MpathFormat {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Build a root mismatch error for `put`/`put_loop`.
    pub fn put_root(path: impl Into<String>) -> Self {
        Self::PutRoot { path: path.into() }
    }

    /// Build a grammar check failure.
    pub fn grammar(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Grammar {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

/// Crate-local result type for tree operations.
pub type Result<T> = std::result::Result<T, Error>;
