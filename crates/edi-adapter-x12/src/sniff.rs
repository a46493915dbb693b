//! ISA header examination
//!
//! ISA is 106 characters long. The element separator follows `ISA` and must
//! reappear at eight more fixed positions; the repetition separator, the
//! version, the component separator and the segment terminator sit at fixed
//! positions too. Line breaks inside the header are ignored, except as
//! segment terminator.

use crate::{Error, Result};
use edi_grammar::Syntax;
use tracing::debug;

/// Characters examined.
const SNIFF_LENGTH: usize = 200;

/// 1-based positions in ISA that hold the element separator.
const SEPARATOR_POSITIONS: [usize; 8] = [7, 18, 21, 32, 35, 51, 54, 70];
const REPETITION_POSITION: usize = 83;
const VERSION_POSITIONS: std::ops::RangeInclusive<usize> = 85..=89;
const COMPONENT_POSITION: usize = 105;
const TERMINATOR_POSITION: usize = 106;

/// Read separators and version from the ISA header at the start of `text`.
///
/// With `strict` an alphanumeric repetition separator is kept (and later
/// rejected by the separator check) instead of being treated as absent.
///
/// # Errors
///
/// Fatal errors `A60`, `A62` and `A63` for a header that is not a valid ISA.
pub fn sniff(text: &str, syntax: &mut Syntax, strict: bool) -> Result<()> {
    let head: String = text.trim_start().chars().take(SNIFF_LENGTH).collect();
    let mut count = 0;
    let mut record_id = String::new();
    let mut version = String::new();
    let mut field_sep = '\0';
    let mut repetition = '\0';
    let mut component = '\0';
    let mut terminator = None;

    for c in head.chars() {
        if (c == '\r' || c == '\n') && count != COMPONENT_POSITION {
            continue;
        }
        count += 1;
        match count {
            1..=3 => record_id.push(c),
            4 => {
                field_sep = c;
                if record_id != "ISA" {
                    let found: String = text.chars().take(7).collect();
                    return Err(Error::fatal(
                        "A60",
                        format!("Expect \"ISA\", found \"{found}\". Probably no x12?"),
                    ));
                }
            }
            n if SEPARATOR_POSITIONS.contains(&n) => {
                if c != field_sep {
                    return Err(Error::fatal(
                        "A63",
                        format!(
                            "Non-valid ISA header; position {n} of ISA is \"{c}\", expect here element separator \"{field_sep}\"."
                        ),
                    ));
                }
            }
            REPETITION_POSITION => repetition = c,
            n if VERSION_POSITIONS.contains(&n) => version.push(c),
            COMPONENT_POSITION => component = c,
            TERMINATOR_POSITION => {
                terminator = Some(c);
                break;
            }
            _ => {}
        }
    }
    let Some(terminator) = terminator else {
        return Err(Error::fatal("A62", "Expect X12 file but envelope is not right."));
    };

    syntax.field_sep = field_sep.to_string();
    syntax.sfield_sep = component.to_string();
    syntax.record_sep = terminator.to_string();
    // Before 00403 the position holds a standards identifier, not a separator.
    syntax.repeat_sep = if version.as_str() < "00403" || (repetition.is_alphanumeric() && !strict) {
        String::new()
    } else {
        repetition.to_string()
    };
    syntax.version = version;
    syntax.skip_char = syntax.skip_char.replace(terminator, "");
    debug!(
        field_sep = %syntax.field_sep,
        record_sep = ?syntax.record_sep,
        version = %syntax.version,
        "sniffed x12 separators"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use edi_grammar::Editype;

    const ISA: &str = "ISA*00*          *00*          *ZZ*SENDER         *ZZ*RECEIVER       *210101*1200*^*00501*000000001*0*P*>~";

    fn syntax() -> Syntax {
        Editype::X12.rules().syntax
    }

    #[test]
    fn test_separators_from_isa() {
        let mut syntax = syntax();
        sniff(ISA, &mut syntax, false).unwrap();
        assert_eq!(syntax.field_sep, "*");
        assert_eq!(syntax.sfield_sep, ">");
        assert_eq!(syntax.record_sep, "~");
        assert_eq!(syntax.repeat_sep, "^");
        assert_eq!(syntax.version, "00501");
    }

    #[test]
    fn test_old_version_has_no_repetition_separator() {
        let mut syntax = syntax();
        let isa = ISA.replace("*^*00501*", "*U*00200*");
        sniff(&isa, &mut syntax, false).unwrap();
        assert_eq!(syntax.repeat_sep, "");
        assert_eq!(syntax.version, "00200");
    }

    #[test]
    fn test_alphanumeric_repetition_separator() {
        let isa = ISA.replace("*^*", "*U*");
        let mut lenient = syntax();
        sniff(&isa, &mut lenient, false).unwrap();
        assert_eq!(lenient.repeat_sep, "");

        let mut strict = syntax();
        sniff(&isa, &mut strict, true).unwrap();
        assert_eq!(strict.repeat_sep, "U");
    }

    #[test]
    fn test_newline_as_terminator() {
        let mut syntax = syntax();
        let isa = format!("{}\nGS*PO", ISA.trim_end_matches('~'));
        sniff(&isa, &mut syntax, false).unwrap();
        assert_eq!(syntax.record_sep, "\n");
        assert_eq!(syntax.skip_char, "\r");
    }

    #[test]
    fn test_sniff_errors() {
        let broken = ISA.replacen("*ZZ*SENDER", "|ZZ*SENDER", 1);
        let cases = [
            ("UNB+UNOA:1", "A60"),
            ("ISA*00*", "A62"),
            (broken.as_str(), "A63"),
        ];
        for (input, code) in cases {
            let error = sniff(input, &mut syntax(), false).unwrap_err();
            assert_eq!(error.code(), Some(code), "{input}");
        }
    }
}
