//! Editype-specific behavior around the shared algorithms
//!
//! Every editype has one handler. The engine asks it to decode the raw
//! input (sniffing separators where the format declares them in its
//! header), to lex, to recover header information, to check envelopes and
//! to name the characters that need escaping on output. Handlers are
//! selected with [`for_editype`].

use crate::charset;
use crate::lexer::{check_separators, lex_fixed, DelimitedLexer};
use crate::Result;
use edi_grammar::{Editype, Grammar, Syntax};
use edi_ir::{DocumentMetadata, FieldError, LexedRecord, Node};
use tracing::debug;

/// Decoded input, ready for lexing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decoded {
    pub text: String,
    /// Line number of the first character of `text` in the file
    pub first_line: usize,
}

impl Decoded {
    fn whole(text: String) -> Self {
        Self { text, first_line: 1 }
    }
}

/// Editype behavior used by [`crate::Engine`]
pub trait FormatHandler: Send + Sync {
    fn editype(&self) -> Editype;

    /// Decode raw bytes; sniffing handlers update `syntax` with what the
    /// file declares.
    ///
    /// # Errors
    ///
    /// Fatal errors for unreadable headers, unknown or violated character
    /// sets and degenerate separators.
    fn decode(&self, raw: &[u8], syntax: &mut Syntax, _strict: bool) -> Result<Decoded> {
        charset::decode(raw, &syntax.charset).map(Decoded::whole)
    }

    /// Split decoded input into lexed records.
    ///
    /// # Errors
    ///
    /// Fatal lexing errors.
    fn lex(&self, input: &Decoded, _grammar: &Grammar, syntax: &Syntax, strict: bool) -> Result<Vec<LexedRecord>> {
        DelimitedLexer::new(syntax)
            .strict(strict)
            .starting_line(input.first_line)
            .lex(&input.text)
    }

    /// Copy sender, receiver and reference from the header record.
    fn header_info(&self, _records: &[LexedRecord], _metadata: &mut DocumentMetadata) {}

    /// Check interchange, group and message envelopes of a parsed tree.
    ///
    /// # Errors
    ///
    /// Only fails on an internal mpath error.
    fn check_envelope(&self, _root: &mut Node) -> Result<Vec<FieldError>> {
        Ok(Vec::new())
    }

    /// Characters that must be escaped (or replaced) in written content.
    fn escape_chars(&self, _syntax: &Syntax) -> String {
        String::new()
    }

    /// Grammar name for a message type found in a sub-message.
    fn message_type(&self, found: &str, _parent: &Node) -> String {
        found.to_string()
    }
}

pub struct EdifactHandler;
pub struct X12Handler;
pub struct TradacomsHandler;
pub struct CsvHandler;
pub struct FixedHandler;
pub struct XmlHandler;
pub struct JsonHandler;

/// The handler for `editype`
#[must_use]
pub fn for_editype(editype: Editype) -> &'static dyn FormatHandler {
    match editype {
        Editype::Edifact => &EdifactHandler,
        Editype::X12 => &X12Handler,
        Editype::Tradacoms => &TradacomsHandler,
        Editype::Csv => &CsvHandler,
        Editype::Fixed => &FixedHandler,
        Editype::Xml => &XmlHandler,
        Editype::Json => &JsonHandler,
    }
}

impl FormatHandler for EdifactHandler {
    fn editype(&self) -> Editype {
        Editype::Edifact
    }

    fn decode(&self, raw: &[u8], syntax: &mut Syntax, strict: bool) -> Result<Decoded> {
        edi_adapter_edifact::sniff(raw, syntax, strict)?;
        let text = charset::decode(raw, &syntax.charset)?;
        check_separators(&format!(
            "{}{}{}{}{}{}",
            syntax.sfield_sep, syntax.field_sep, syntax.decimal, syntax.escape, syntax.repeat_sep, syntax.record_sep
        ))?;
        // UNA is not lexed.
        let offset = text.find("UNB").unwrap_or(0);
        let first_line = 1 + text[..offset].matches('\n').count();
        Ok(Decoded {
            text: text[offset..].to_string(),
            first_line,
        })
    }

    fn header_info(&self, records: &[LexedRecord], metadata: &mut DocumentMetadata) {
        edi_adapter_edifact::retrieve_info(records, metadata);
    }

    fn check_envelope(&self, root: &mut Node) -> Result<Vec<FieldError>> {
        Ok(edi_adapter_edifact::check_envelope(root)?)
    }

    fn escape_chars(&self, syntax: &Syntax) -> String {
        let mut chars = format!("{}{}{}{}", syntax.record_sep, syntax.field_sep, syntax.sfield_sep, syntax.escape);
        if syntax.version.as_str() >= "4" {
            chars.push_str(&syntax.repeat_sep);
        }
        chars
    }

    fn message_type(&self, found: &str, _parent: &Node) -> String {
        edi_adapter_edifact::message_type(found)
    }
}

impl FormatHandler for X12Handler {
    fn editype(&self) -> Editype {
        Editype::X12
    }

    fn decode(&self, raw: &[u8], syntax: &mut Syntax, strict: bool) -> Result<Decoded> {
        let text = charset::decode(raw, &syntax.charset)?;
        edi_adapter_x12::sniff(&text, syntax, strict)?;
        check_separators(&format!(
            "{}{}{}{}",
            syntax.sfield_sep, syntax.field_sep, syntax.repeat_sep, syntax.record_sep
        ))?;
        Ok(Decoded::whole(text))
    }

    fn header_info(&self, records: &[LexedRecord], metadata: &mut DocumentMetadata) {
        edi_adapter_x12::retrieve_info(records, metadata);
    }

    fn check_envelope(&self, root: &mut Node) -> Result<Vec<FieldError>> {
        Ok(edi_adapter_x12::check_envelope(root)?)
    }

    fn escape_chars(&self, syntax: &Syntax) -> String {
        let mut chars = format!("{}{}{}", syntax.record_sep, syntax.field_sep, syntax.sfield_sep);
        if syntax.version.as_str() >= "00403" {
            chars.push_str(&syntax.repeat_sep);
        }
        chars
    }

    fn message_type(&self, found: &str, parent: &Node) -> String {
        edi_adapter_x12::message_type(found, parent)
    }
}

impl FormatHandler for TradacomsHandler {
    fn editype(&self) -> Editype {
        Editype::Tradacoms
    }

    fn check_envelope(&self, root: &mut Node) -> Result<Vec<FieldError>> {
        Ok(edi_adapter_edifact::check_tradacoms_envelope(root)?)
    }

    fn escape_chars(&self, syntax: &Syntax) -> String {
        format!(
            "{}{}{}{}{}",
            syntax.record_sep, syntax.field_sep, syntax.sfield_sep, syntax.escape, syntax.record_tag_sep
        )
    }
}

impl FormatHandler for CsvHandler {
    fn editype(&self) -> Editype {
        Editype::Csv
    }

    fn lex(&self, input: &Decoded, grammar: &Grammar, syntax: &Syntax, strict: bool) -> Result<Vec<LexedRecord>> {
        let mut records = DelimitedLexer::new(syntax)
            .strict(strict)
            .significant_whitespace(true)
            .starting_line(input.first_line)
            .lex(&input.text)?;
        let root_id = &grammar.structure()?.id;
        edi_adapter_csv::apply_record_options(&mut records, syntax, root_id)?;
        debug!(record_count = records.len(), "applied csv record options");
        Ok(records)
    }

    fn escape_chars(&self, syntax: &Syntax) -> String {
        syntax.escape.clone()
    }
}

impl FormatHandler for FixedHandler {
    fn editype(&self) -> Editype {
        Editype::Fixed
    }

    fn lex(&self, input: &Decoded, grammar: &Grammar, _syntax: &Syntax, _strict: bool) -> Result<Vec<LexedRecord>> {
        lex_fixed(&input.text, grammar)
    }
}

impl FormatHandler for XmlHandler {
    fn editype(&self) -> Editype {
        Editype::Xml
    }
}

impl FormatHandler for JsonHandler {
    fn editype(&self) -> Editype {
        Editype::Json
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_is_closed_over_editypes() {
        for editype in Editype::ALL {
            assert_eq!(for_editype(editype).editype(), editype);
        }
    }

    #[test]
    fn test_edifact_decode_starts_at_unb() {
        let mut syntax = Editype::Edifact.rules().syntax;
        let decoded = for_editype(Editype::Edifact)
            .decode(b"UNA:+.? '\nUNB+UNOC:3+A+B+210101:1200+1'", &mut syntax, false)
            .unwrap();
        assert!(decoded.text.starts_with("UNB+"));
        assert_eq!(decoded.first_line, 2);
        assert_eq!(syntax.charset, "UNOC");
        assert_eq!(syntax.repeat_sep, "");
    }

    #[test]
    fn test_edifact_separator_check() {
        let mut syntax = Editype::Edifact.rules().syntax;
        let error = for_editype(Editype::Edifact)
            .decode(b"UNA:+:? 'UNB+UNOA:3+A+B+210101:1200+1'", &mut syntax, false)
            .unwrap_err();
        assert_eq!(error.code(), Some("A64"));
    }

    #[test]
    fn test_escape_chars() {
        let mut syntax = Editype::Edifact.rules().syntax;
        assert_eq!(for_editype(Editype::Edifact).escape_chars(&syntax), "'+:?");
        syntax.version = "4".into();
        assert_eq!(for_editype(Editype::Edifact).escape_chars(&syntax), "'+:?*");

        let syntax = Editype::X12.rules().syntax;
        assert_eq!(for_editype(Editype::X12).escape_chars(&syntax), "~*>^");

        let syntax = Editype::Tradacoms.rules().syntax;
        assert_eq!(for_editype(Editype::Tradacoms).escape_chars(&syntax), "'+:?=");

        let syntax = Editype::Fixed.rules().syntax;
        assert_eq!(for_editype(Editype::Fixed).escape_chars(&syntax), "");
    }

    #[test]
    fn test_message_type_per_editype() {
        let gs = Node::new("GS").with_field("GS08", "004010");
        assert_eq!(for_editype(Editype::X12).message_type("850", &gs), "850004010");
        assert_eq!(for_editype(Editype::Edifact).message_type("INVOIC90.1", &gs), "INVOIC90_1");
        assert_eq!(for_editype(Editype::Csv).message_type("orders", &gs), "orders");
    }
}
