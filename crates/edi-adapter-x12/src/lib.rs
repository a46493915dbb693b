//! # edi-adapter-x12
//!
//! X12 specifics for the translation engine.
//!
//! The ISA interchange header has a fixed layout: its separators are found
//! at fixed positions instead of being declared. This crate reads them,
//! checks ISA/IEA, GS/GE and ST/SE envelopes of a parsed tree and recovers
//! partner information from lexed records when parsing fails.

pub mod envelope;
pub mod sniff;

pub use envelope::{check_envelope, retrieve_info};
pub use sniff::sniff;

use edi_ir::Node;
use thiserror::Error;

/// Errors that can occur when examining X12 data
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

/// Grammar name for a transaction set: the ST01 value plus the version
/// (GS08) of the enclosing functional group.
pub fn message_type(found: &str, group: &Node) -> String {
    let version = group.text("GS08").unwrap_or_default();
    format!("{found}{version}")
}
