//! EDIFACT separator and character set detection
//!
//! The start of an EDIFACT file is examined before lexing: an optional
//! service string advice (UNA) declares the separators, the interchange
//! header (UNB) names the character set and syntax version. Without UNA the
//! file must use the standard (UNOA) or the UNOB separator set.

use crate::{Error, Result};
use edi_grammar::Syntax;
use tracing::debug;

const BOM: &[u8] = &[0xEF, 0xBB, 0xBF];

/// Number of bytes examined.
const SNIFF_LENGTH: usize = 99;

/// Separators of an EDIFACT interchange
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Separators {
    /// Component (subfield) separator
    pub component: char,
    /// Data element (field) separator
    pub element: char,
    /// Decimal mark
    pub decimal: char,
    /// Release (escape) character
    pub release: Option<char>,
    /// Repetition separator
    pub repetition: char,
    /// Segment terminator
    pub segment: char,
}

impl Separators {
    /// Separators assumed when there is no UNA and UNB uses `+` and `:`.
    pub const STANDARD: Self = Self {
        component: ':',
        element: '+',
        decimal: '.',
        release: Some('?'),
        repetition: '*',
        segment: '\'',
    };

    /// Separators of the UNOB character set (information separators).
    pub const UNOB: Self = Self {
        component: '\x1F',
        element: '\x1D',
        decimal: '.',
        release: None,
        repetition: '*',
        segment: '\x1C',
    };

    /// Read the six characters following `UNA`.
    ///
    /// Order: component, element, decimal, release, repetition, segment.
    pub fn from_una(advice: &[char]) -> Option<Self> {
        match advice {
            [component, element, decimal, release, repetition, segment, ..] => Some(Self {
                component: *component,
                element: *element,
                decimal: *decimal,
                release: Some(*release),
                repetition: *repetition,
                segment: *segment,
            }),
            _ => None,
        }
    }

    /// Write these separators into the syntax used for lexing.
    pub fn apply(&self, syntax: &mut Syntax) {
        syntax.sfield_sep = self.component.to_string();
        syntax.field_sep = self.element.to_string();
        syntax.decimal = self.decimal.to_string();
        syntax.escape = self.release.map(String::from).unwrap_or_default();
        syntax.repeat_sep = self.repetition.to_string();
        syntax.record_sep = self.segment.to_string();
    }
}

/// Examine the start of `raw` and update `syntax` with the separators,
/// character set and version found there.
///
/// With `strict` a space as repetition separator is kept (and later rejected
/// by the separator check) instead of being treated as absent.
///
/// # Errors
///
/// Fatal errors `A53` to `A57` and `A68` for a file that does not start as
/// EDIFACT should.
pub fn sniff(raw: &[u8], syntax: &mut Syntax, strict: bool) -> Result<()> {
    if raw.starts_with(BOM) {
        return Err(Error::fatal("A68", "Edifact file starts with BOM."));
    }
    // Latin-1 maps every byte to one char, whatever the real charset is.
    let head: Vec<char> = raw.iter().take(SNIFF_LENGTH).map(|b| char::from(*b)).collect();
    let mut pos = skip_whitespace(&head, 0);

    let declared = if head[pos..].starts_with(&['U', 'N', 'A']) {
        let separators = Separators::from_una(&head[pos + 3..]).ok_or_else(|| {
            Error::fatal("A53", "Edifact file contains \"UNA\" and than garbage.")
        })?;
        pos = skip_whitespace(&head, pos + 9);
        Some(separators)
    } else {
        None
    };

    if !head[pos..].starts_with(&['U', 'N', 'B']) {
        return Err(Error::fatal(
            "A54",
            "Found no \"UNB\" at the start of edifact file. Probably not be edifact.",
        ));
    }

    let header = scan_header(&head[pos..], &syntax.skip_char)?;
    let separators = match declared {
        Some(separators) => {
            if header.field_sep != separators.element || header.sfield_sep != separators.component {
                return Err(Error::fatal(
                    "A56",
                    "Separators as used in edifact file are different from values as in UNA-segment.",
                ));
            }
            separators
        }
        None if header.field_sep == '+' && header.sfield_sep == ':' => Separators::STANDARD,
        None if header.field_sep == '\x1D' && header.sfield_sep == '\x1F' => Separators::UNOB,
        None => {
            return Err(Error::fatal(
                "A57",
                "Edifact file has non-standard separators. An UNA segment is required.",
            ));
        }
    };
    separators.apply(syntax);
    syntax.charset = header.charset;
    syntax.version = header.version.to_string();

    // Repetition separator exists from syntax version 4 on.
    if header.version < '4' || (syntax.repeat_sep == " " && !strict) {
        syntax.repeat_sep.clear();
    }
    debug!(
        charset = %syntax.charset,
        version = %syntax.version,
        una = declared.is_some(),
        "sniffed edifact separators"
    );
    Ok(())
}

struct Header {
    field_sep: char,
    charset: String,
    sfield_sep: char,
    version: char,
}

/// Read `UNB`, the element separator, the four-letter syntax identifier,
/// the component separator and the version digit, ignoring `skip_char`.
fn scan_header(chars: &[char], skip_char: &str) -> Result<Header> {
    let mut significant = chars.iter().copied().filter(|c| !skip_char.contains(*c));
    let too_many_line_breaks =
        || Error::fatal("A55", "Problems with UNB-segment; too many <CR/LF>.");
    let mut next = || significant.next().ok_or_else(too_many_line_breaks);
    for _ in 0..3 {
        next()?;
    }
    let field_sep = next()?;
    let mut charset = String::with_capacity(4);
    for _ in 0..4 {
        charset.push(next()?);
    }
    let sfield_sep = next()?;
    let version = next()?;
    Ok(Header {
        field_sep,
        charset,
        sfield_sep,
        version,
    })
}

fn skip_whitespace(chars: &[char], from: usize) -> usize {
    chars[from.min(chars.len())..]
        .iter()
        .position(|c| !c.is_whitespace())
        .map_or(chars.len(), |offset| from + offset)
}

#[cfg(test)]
mod tests {
    use super::*;
    use edi_grammar::Editype;

    fn syntax() -> Syntax {
        Editype::Edifact.rules().syntax
    }

    #[test]
    fn test_una_declares_separators() {
        let mut syntax = syntax();
        sniff(b"UNA:+,? 'UNB+UNOC:4+SENDER+RECEIVER+210101:1200+REF1'", &mut syntax, false).unwrap();
        assert_eq!(syntax.field_sep, "+");
        assert_eq!(syntax.sfield_sep, ":");
        assert_eq!(syntax.decimal, ",");
        assert_eq!(syntax.escape, "?");
        assert_eq!(syntax.record_sep, "'");
        assert_eq!(syntax.charset, "UNOC");
        assert_eq!(syntax.version, "4");
        // space as repetition separator in version 4 is taken as absent
        assert_eq!(syntax.repeat_sep, "");
    }

    #[test]
    fn test_strict_keeps_space_repetition_separator() {
        let mut syntax = syntax();
        sniff(b"UNA:+.? 'UNB+UNOC:4+S+R+210101:1200+REF1'", &mut syntax, true).unwrap();
        assert_eq!(syntax.repeat_sep, " ");
    }

    #[test]
    fn test_version_3_has_no_repetition_separator() {
        let mut syntax = syntax();
        sniff(b"UNA:+.?*'UNB+UNOA:3+S+R+210101:1200+REF1'", &mut syntax, false).unwrap();
        assert_eq!(syntax.repeat_sep, "");
        assert_eq!(syntax.version, "3");
    }

    #[test]
    fn test_standard_separators_without_una() {
        let mut syntax = syntax();
        syntax.decimal = ",".to_string();
        sniff(b"\r\n  UNB+UNOB:2+S+R+210101:1200+REF1'", &mut syntax, false).unwrap();
        assert_eq!(syntax.decimal, ".");
        assert_eq!(syntax.charset, "UNOB");
        assert_eq!(syntax.version, "2");
    }

    #[test]
    fn test_line_breaks_in_unb_are_skipped() {
        let mut syntax = syntax();
        syntax.skip_char = "\r\n".to_string();
        sniff(b"UNB+\r\nUNOA:1+S+R'", &mut syntax, false).unwrap();
        assert_eq!(syntax.charset, "UNOA");
    }

    #[test]
    fn test_sniff_errors() {
        let cases: [(&[u8], &str); 6] = [
            (b"\xEF\xBB\xBFUNB+UNOA:1", "A68"),
            (b"UNA:+", "A53"),
            (b"ISA*00*", "A54"),
            (b"UNB+UNO", "A55"),
            (b"UNA:*.? 'UNB+UNOA:1+S'", "A56"),
            (b"UNB*UNOA:1*S'", "A57"),
        ];
        for (input, code) in cases {
            let error = sniff(input, &mut syntax(), false).unwrap_err();
            assert_eq!(error.code(), Some(code), "{}", String::from_utf8_lossy(input));
        }
    }
}
