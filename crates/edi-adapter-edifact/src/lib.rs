//! # edi-adapter-edifact
//!
//! EDIFACT and Tradacoms specifics for the translation engine.
//!
//! This crate reads the service string advice (UNA) and interchange header
//! (UNB) of an EDIFACT file to find its separators, character set and syntax
//! version, checks interchange, group and message envelopes of a parsed
//! tree, and recovers partner information from lexed records when parsing
//! fails.

pub mod envelope;
pub mod sniff;
pub mod tradacoms;

pub use envelope::{check_envelope, retrieve_info};
pub use sniff::{sniff, Separators};
pub use tradacoms::check_envelope as check_tradacoms_envelope;

use thiserror::Error;

/// Errors that can occur when examining EDIFACT data
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// The file cannot be processed; `code` is the machine-readable code.
    #[error("[{code}]: {message}")]
    Fatal { code: &'static str, message: String },

    #[error(transparent)]
    Mpath(#[from] edi_ir::Error),
}

impl Error {
    pub fn fatal(code: &'static str, message: impl Into<String>) -> Self {
        Self::Fatal {
            code,
            message: message.into(),
        }
    }

    /// Machine-readable code of a fatal error
    pub fn code(&self) -> Option<&'static str> {
        match self {
            Self::Fatal { code, .. } => Some(code),
            Self::Mpath(_) => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// Grammar name for a message type found in the data.
///
/// Older directories carry versions like `90.1`; the dot is not usable in a
/// grammar name.
pub fn message_type(found: &str) -> String {
    found.replace('.', "_")
}
