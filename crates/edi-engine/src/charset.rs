//! Character sets for reading and writing files
//!
//! EDI files name their character set (`UNOA`, `UNOC`, `iso-8859-1`, ...).
//! The sets in use map onto three encodings.

use crate::{Error, Result};
use std::fmt;

/// Encoding behind a character set name
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Charset {
    /// 7-bit; EDIFACT levels A and B
    Ascii,
    /// ISO 8859-1; EDIFACT level C
    Latin1,
    Utf8,
}

impl Charset {
    /// Look up a character set by name, case-insensitive.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        let name = name.trim().to_ascii_lowercase().replace('_', "-");
        match name.as_str() {
            "unoa" | "unob" | "ascii" | "us-ascii" => Some(Self::Ascii),
            "unoc" | "latin-1" | "latin1" | "iso-8859-1" | "iso8859-1" => Some(Self::Latin1),
            "unoy" | "unow" | "utf-8" | "utf8" => Some(Self::Utf8),
            _ => None,
        }
    }

    /// Decode `raw` into text.
    ///
    /// # Errors
    ///
    /// `A59` on a byte sequence that is not valid in this character set.
    pub fn decode(self, raw: &[u8]) -> Result<String> {
        match self {
            Self::Ascii => match raw.iter().position(|b| !b.is_ascii()) {
                Some(index) => Err(decode_error(self, index, raw[index])),
                None => Ok(raw.iter().map(|b| char::from(*b)).collect()),
            },
            Self::Latin1 => Ok(raw.iter().map(|b| char::from(*b)).collect()),
            Self::Utf8 => {
                let text = std::str::from_utf8(raw).map_err(|e| {
                    let index = e.valid_up_to();
                    decode_error(self, index, raw[index])
                })?;
                Ok(text.strip_prefix('\u{feff}').unwrap_or(text).to_string())
            }
        }
    }

    /// Encode `text` for writing.
    ///
    /// # Errors
    ///
    /// `F50` when a character cannot be written in this character set.
    pub fn encode(self, text: &str) -> Result<Vec<u8>> {
        let limit = match self {
            Self::Utf8 => return Ok(text.as_bytes().to_vec()),
            Self::Ascii => 0x7f,
            Self::Latin1 => 0xff,
        };
        text.chars()
            .map(|c| {
                u8::try_from(u32::from(c))
                    .ok()
                    .filter(|b| u32::from(*b) <= limit)
                    .ok_or_else(|| {
                        Error::fatal(
                            "F50",
                            None,
                            format!("Characters not in character-set \"{self}\": \"{c}\" in \"{}\".", excerpt(text, c)),
                        )
                    })
            })
            .collect()
    }
}

impl fmt::Display for Charset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Ascii => "us-ascii",
            Self::Latin1 => "iso-8859-1",
            Self::Utf8 => "utf-8",
        })
    }
}

fn decode_error(charset: Charset, index: usize, byte: u8) -> Error {
    Error::fatal(
        "A59",
        None,
        format!("Characterset problem in file. At/after position {index}: byte 0x{byte:02x} is not valid in \"{charset}\"."),
    )
}

/// Some context around the first occurrence of `c`.
fn excerpt(text: &str, c: char) -> String {
    let chars: Vec<char> = text.chars().collect();
    let at = chars.iter().position(|x| *x == c).unwrap_or(0);
    let start = at.saturating_sub(20);
    let end = (at + 20).min(chars.len());
    chars[start..end].iter().collect()
}

/// Resolve a character set name.
///
/// # Errors
///
/// `A58` for a name that is not known.
pub fn lookup(name: &str) -> Result<Charset> {
    Charset::from_name(name)
        .ok_or_else(|| Error::fatal("A58", None, format!("File has unknown characterset \"{name}\".")))
}

/// Decode `raw` using the character set called `name`.
///
/// # Errors
///
/// `A58` for an unknown name, `A59` for undecodable content.
pub fn decode(raw: &[u8], name: &str) -> Result<String> {
    lookup(name)?.decode(raw)
}

/// Encode `text` using the character set called `name`.
///
/// # Errors
///
/// `A58` for an unknown name, `F50` for unencodable characters.
pub fn encode(text: &str, name: &str) -> Result<Vec<u8>> {
    lookup(name)?.encode(text)
}
