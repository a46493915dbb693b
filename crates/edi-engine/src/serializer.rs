//! Node trees to records, records to text
//!
//! [`Serializer::tree_to_records`] walks the grammar structure and turns
//! every node into a flat record of outgoing tokens. Empty fields are
//! buffered and only written when a later field in the same record has
//! data, so delimited formats lose their trailing separators.
//! [`Serializer::records_to_string`] renders those tokens with separators,
//! quotes and escapes.

use crate::checker::{FieldCheck, MessageChecker};
use crate::handler::{for_editype, FormatHandler};
use crate::{charset, json, xml, Error, Result};
use edi_grammar::{Align, BaseFormat, Editype, FieldDescriptor, FieldFormatter, ForceQuote, Grammar, NoBotsid, RecordStructureNode, Syntax};
use edi_ir::{FieldValue, LexedRecord, LexedToken, Node, Record, TokenKind};
use tracing::debug;

/// Writes node trees in the format of one grammar
pub struct Serializer<'a> {
    grammar: &'a Grammar,
    syntax: &'a Syntax,
    handler: &'static dyn FormatHandler,
    formatter: FieldFormatter<'a>,
}

impl<'a> Serializer<'a> {
    pub fn new(grammar: &'a Grammar, syntax: &'a Syntax) -> Self {
        Self {
            grammar,
            syntax,
            handler: for_editype(grammar.editype),
            formatter: FieldFormatter::new(syntax, grammar.editype.is_fixed()),
        }
    }

    /// Check, format and render `root`, then encode it in the syntax
    /// character set.
    ///
    /// # Errors
    ///
    /// [`Error::Discard`] for a tree without records,
    /// [`Error::FieldErrors`] when the tree does not fit the grammar,
    /// `F50` for unencodable characters and `F51` for an X12 separator in
    /// content.
    pub fn write(&self, root: &mut Node) -> Result<Vec<u8>> {
        if !root.has_record() && root.children.is_empty() {
            return Err(Error::Discard("No outgoing message".to_string()));
        }
        let errors = MessageChecker::new(self.grammar, self.syntax, FieldCheck::Outgoing).check_tree(root)?;
        if !errors.is_empty() {
            return Err(Error::FieldErrors(errors));
        }
        let text = match self.grammar.editype {
            Editype::Xml => xml::write(root, self.grammar, self.syntax)?,
            Editype::Json => json::write(root, self.grammar, self.syntax)?,
            _ => {
                let records = self.tree_to_records(root)?;
                self.records_to_string(records)?
            }
        };
        let text = wrap(&text, self.syntax.wrap_length);
        let bytes = charset::encode(&text, &self.syntax.charset)?;
        debug!(grammar = %self.grammar.name, bytes = bytes.len(), "serialized message");
        Ok(bytes)
    }

    /// Flatten a tree into outgoing records, in grammar order.
    ///
    /// A root without record is written child by child.
    ///
    /// # Errors
    ///
    /// [`Error::Discard`] when there is nothing to write; grammar errors for
    /// a grammar without structure.
    pub fn tree_to_records(&self, root: &Node) -> Result<Vec<LexedRecord>> {
        let structure = self.grammar.structure()?;
        let mut records = Vec::new();
        if root.has_record() {
            self.flatten(root, structure, &mut records);
        } else {
            if root.children.is_empty() {
                return Err(Error::Discard("No outgoing message".to_string()));
            }
            for child in &root.children {
                self.flatten(child, structure, &mut records);
            }
        }
        debug!(record_count = records.len(), "flattened tree");
        Ok(records)
    }

    fn flatten(&self, node: &Node, structure: &RecordStructureNode, records: &mut Vec<LexedRecord>) {
        records.push(LexedRecord::new(self.record_tokens(&node.record, structure)));
        for child in &node.children {
            let definition = structure
                .children()
                .iter()
                .find(|def| child.id() == Some(def.id.as_str()) && child.occurrence == def.occurrence);
            if let Some(definition) = definition {
                self.flatten(child, definition, records);
            }
        }
    }

    fn record_tokens(&self, record: &Record, structure: &RecordStructureNode) -> Vec<LexedToken> {
        let mut tokens = Vec::new();
        // Empty fields, written only when a later field has data
        let mut pending = Vec::new();
        for field in structure.fields.iter() {
            let has_data = match (field.is_composite(), field.is_repeating()) {
                (false, false) => self.simple_field(record, field, &mut pending),
                (false, true) => repeated_field(record, field, &mut pending),
                (true, false) => composite_field(record, field, &mut pending),
                (true, true) => repeated_composite(record, field, &mut pending),
            };
            if has_data {
                tokens.append(&mut pending);
            }
        }
        tokens
    }

    fn simple_field(&self, record: &Record, field: &FieldDescriptor, pending: &mut Vec<LexedToken>) -> bool {
        match record.get(&field.id).and_then(FieldValue::as_text) {
            Some(value) if !value.is_empty() => {
                pending.push(token(value, TokenKind::Field, field));
                true
            }
            _ if self.syntax.strip_field_sep => {
                pending.push(token("", TokenKind::Field, field));
                false
            }
            _ => {
                pending.push(token(&self.initial(field), TokenKind::Field, field));
                true
            }
        }
    }

    /// Value for a field the tree does not have, in formats that write
    /// every position.
    fn initial(&self, field: &FieldDescriptor) -> String {
        let value = self.formatter.initial(field);
        if !self.grammar.editype.is_fixed() {
            return value;
        }
        let width = field.min_length;
        match (field.base, field.align) {
            (BaseFormat::Alphanumeric, Align::Right) => format!("{value:>width$}"),
            (BaseFormat::Alphanumeric | BaseFormat::Date | BaseFormat::Time, _) => format!("{value:<width$}"),
            _ => value,
        }
    }

    /// Render records as text.
    ///
    /// # Errors
    ///
    /// `F51` when X12 content holds a separator and no replacement
    /// character is configured.
    pub fn records_to_string(&self, records: Vec<LexedRecord>) -> Result<String> {
        let syntax = self.syntax;
        let record_tag_sep = if syntax.record_tag_sep.is_empty() {
            &syntax.field_sep
        } else {
            &syntax.record_tag_sep
        };
        let mut record_sep = syntax.record_sep.clone();
        if !"\r\n".contains(record_sep.as_str()) {
            record_sep.push_str(&syntax.add_crlf_after_record_sep);
        }
        let escape_chars = self.handler.escape_chars(syntax);
        let quote = syntax.quote_char.chars().next();
        let drop_tag = syntax.no_botsid == NoBotsid::Flag(true);

        let mut out = String::new();
        for record in records {
            let mut tokens = record.tokens.into_iter();
            if drop_tag {
                tokens.next();
            }
            let mut fields_written = 0;
            for token in tokens {
                match token.kind {
                    TokenKind::Field => {
                        match fields_written {
                            0 => {}
                            1 => out.push_str(record_tag_sep),
                            _ => out.push_str(&syntax.field_sep),
                        }
                        fields_written += 1;
                    }
                    TokenKind::Subfield => out.push_str(&syntax.sfield_sep),
                    TokenKind::Repeat => out.push_str(&syntax.repeat_sep),
                }
                let quoted = quote.is_some_and(|_| self.needs_quotes(&token, &record_sep));
                if quoted {
                    out.push_str(&syntax.quote_char);
                }
                for c in token.value.chars() {
                    if escape_chars.contains(c) {
                        if self.grammar.editype == Editype::X12 {
                            match &syntax.replace_char {
                                Some(replacement) => out.push_str(replacement),
                                None => {
                                    return Err(Error::fatal(
                                        "F51",
                                        None,
                                        format!(
                                            "Character \"{c}\" is used as separator in this x12 file, so it can not be used in content. Field: \"{}\".",
                                            token.value
                                        ),
                                    ));
                                }
                            }
                            continue;
                        }
                        out.push_str(&syntax.escape);
                    } else if quoted && Some(c) == quote {
                        out.push(c);
                    }
                    out.push(c);
                }
                if quoted {
                    out.push_str(&syntax.quote_char);
                }
            }
            out.push_str(&record_sep);
        }
        Ok(out)
    }

    fn needs_quotes(&self, token: &LexedToken, record_sep: &str) -> bool {
        let syntax = self.syntax;
        match syntax.force_quote {
            ForceQuote::Always => true,
            ForceQuote::Alphanumeric => token.alphanumeric,
            ForceQuote::Never => {
                let value = token.value.as_str();
                [syntax.field_sep.as_str(), syntax.quote_char.as_str(), record_sep]
                    .iter()
                    .any(|sep| !sep.is_empty() && value.contains(sep))
            }
        }
    }
}

fn token(value: &str, kind: TokenKind, field: &FieldDescriptor) -> LexedToken {
    LexedToken::outgoing(value, kind, matches!(field.format.as_str(), "AN" | "A" | "AR"))
}

fn repeated_field(record: &Record, field: &FieldDescriptor, pending: &mut Vec<LexedToken>) -> bool {
    let values: Vec<&str> = match record.get(&field.id) {
        Some(FieldValue::Repeated(values)) => values.iter().map(String::as_str).collect(),
        Some(FieldValue::Text(value)) => vec![value.as_str()],
        _ => Vec::new(),
    };
    let mut has_data = false;
    let mut buffer = Vec::new();
    for (index, value) in values.into_iter().enumerate() {
        let kind = if index == 0 { TokenKind::Field } else { TokenKind::Repeat };
        buffer.push(token(value, kind, field));
        if !value.is_empty() {
            has_data = true;
            pending.append(&mut buffer);
        }
    }
    if !has_data {
        pending.push(token("", TokenKind::Field, field));
    }
    has_data
}

fn composite_field(record: &Record, field: &FieldDescriptor, pending: &mut Vec<LexedToken>) -> bool {
    let mut has_data = false;
    let mut buffer = Vec::new();
    for (index, sub) in field.subfields().iter().enumerate() {
        let kind = if index == 0 { TokenKind::Field } else { TokenKind::Subfield };
        let value = record.get(&sub.id).and_then(FieldValue::as_text).unwrap_or_default();
        buffer.push(token(value, kind, sub));
        if !value.is_empty() {
            has_data = true;
            pending.append(&mut buffer);
        }
    }
    if !has_data {
        pending.push(token("", TokenKind::Field, field));
    }
    has_data
}

fn repeated_composite(record: &Record, field: &FieldDescriptor, pending: &mut Vec<LexedToken>) -> bool {
    let Some(FieldValue::Composites(repeats)) = record.get(&field.id) else {
        pending.push(token("", TokenKind::Field, field));
        return false;
    };
    let mut has_data = false;
    let mut buffer = Vec::new();
    for (repeat_index, repeat) in repeats.iter().enumerate() {
        let mut repeat_has_data = false;
        let mut repeat_buffer = Vec::new();
        for (index, sub) in field.subfields().iter().enumerate() {
            let kind = match (repeat_index, index) {
                (0, 0) => TokenKind::Field,
                (_, 0) => TokenKind::Repeat,
                _ => TokenKind::Subfield,
            };
            let value = repeat.get(&sub.id).map_or("", String::as_str);
            repeat_buffer.push(token(value, kind, sub));
            if !value.is_empty() {
                repeat_has_data = true;
                buffer.append(&mut repeat_buffer);
            }
        }
        if repeat_has_data {
            has_data = true;
            pending.append(&mut buffer);
        } else {
            let kind = if repeat_index == 0 { TokenKind::Field } else { TokenKind::Repeat };
            buffer.push(token("", kind, field));
        }
    }
    if !has_data {
        pending.push(token("", TokenKind::Field, field));
    }
    has_data
}

/// Cut `text` into lines of `length` characters; 0 leaves it as is.
fn wrap(text: &str, length: usize) -> String {
    if length == 0 {
        return text.to_string();
    }
    let chars: Vec<char> = text.chars().collect();
    chars
        .chunks(length)
        .map(|chunk| {
            let mut line: String = chunk.iter().collect();
            line.push_str("\r\n");
            line
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use edi_grammar::{GrammarCompiler, GrammarKind, MemoryProvider};
    use std::collections::BTreeMap;
    use std::sync::Arc;

    const ORDERS: &str = r"
structure:
  - ID: UNH
    MIN: 1
    MAX: 1
    LEVEL:
      - { ID: BGM, MIN: 1, MAX: 1 }
      - { ID: UNT, MIN: 1, MAX: 1 }
recorddefs:
  UNH:
    - [BOTSID, M, 3, AN]
    - ['0062', M, 14, AN]
    - [S009, M, [['0065', M, 6, AN], ['0052', M, 3, AN], ['0054', M, 3, AN], ['0051', C, 2, AN]]]
  BGM:
    - [BOTSID, M, 3, AN]
    - [C002, C, [['1001', C, 3, AN], ['1131', C, 17, AN], ['3055', C, 3, AN]]]
    - ['1004', C, 35, AN]
    - ['1225', C, 3, AN]
    - [FTX, [C, 3], 10, AN]
    - [REF, [C, 3], [[REF.1, M, 3, AN], [REF.2, C, 10, AN]]]
  UNT:
    - [BOTSID, M, 3, AN]
    - ['0074', M, 6, N]
    - ['0062', M, 14, AN]
";

    fn grammar(editype: Editype, name: &str, yaml: &str) -> Arc<Grammar> {
        let provider = Arc::new(MemoryProvider::new());
        provider.insert_yaml(editype, name, yaml).unwrap();
        GrammarCompiler::new(provider)
            .compile(editype, name, GrammarKind::Message)
            .unwrap()
    }

    fn message(bgm: Node) -> Node {
        let mut unh = Node::new("UNH")
            .with_field("0062", "1")
            .with_field("0065", "ORDERS")
            .with_field("0052", "D")
            .with_field("0054", "96A");
        unh.append(bgm);
        unh.append(Node::new("UNT").with_field("0074", "3").with_field("0062", "1"));
        unh
    }

    fn edifact_text(bgm: Node) -> Result<String> {
        let grammar = grammar(Editype::Edifact, "ORDERS", ORDERS);
        let mut syntax = grammar.syntax.clone();
        syntax.add_crlf_after_record_sep = String::new();
        let serializer = Serializer::new(&grammar, &syntax);
        let records = serializer.tree_to_records(&message(bgm))?;
        serializer.records_to_string(records)
    }

    #[test]
    fn test_trailing_empty_fields_are_dropped() {
        let bgm = Node::new("BGM").with_field("1001", "220").with_field("3055", "9").with_field("1004", "PO1");
        let text = edifact_text(bgm).unwrap();
        assert_eq!(text, "UNH+1+ORDERS:D:96A'BGM+220::9+PO1'UNT+3+1'");
    }

    #[test]
    fn test_repeats_and_escapes() {
        let bgm = Node::new("BGM")
            .with_field("1225", "9")
            .with_field("FTX", FieldValue::Repeated(vec!["a+b".into(), String::new(), "c?".into()]))
            .with_field(
                "REF",
                FieldValue::Composites(vec![
                    BTreeMap::from([("REF.1".to_string(), "ON".to_string()), ("REF.2".to_string(), "12:3".to_string())]),
                    BTreeMap::from([("REF.1".to_string(), "VN".to_string())]),
                ]),
            );
        let text = edifact_text(bgm).unwrap();
        assert_eq!(text, "UNH+1+ORDERS:D:96A'BGM+++9+a?+b**c??+ON:12?:3*VN'UNT+3+1'");
    }

    #[test]
    fn test_crlf_after_segment_terminator() {
        let grammar = grammar(Editype::Edifact, "ORDERS", ORDERS);
        let serializer = Serializer::new(&grammar, &grammar.syntax);
        let records = vec![LexedRecord::new(vec![
            LexedToken::outgoing("UNT", TokenKind::Field, true),
            LexedToken::outgoing("2", TokenKind::Field, false),
        ])];
        assert_eq!(serializer.records_to_string(records).unwrap(), "UNT+2'\r\n");
    }

    const X12: &str = r"
structure:
  - ID: ST
    MIN: 1
    MAX: 1
    LEVEL:
      - { ID: SE, MIN: 1, MAX: 1 }
recorddefs:
  ST:
    - [BOTSID, M, 3, AN]
    - [ST01, M, 3, ID]
    - [ST02, M, 9, AN]
  SE:
    - [BOTSID, M, 3, AN]
    - [SE01, M, 10, N0]
    - [SE02, M, 9, AN]
";

    #[test]
    fn test_x12_separator_in_content() {
        let grammar = grammar(Editype::X12, "850", X12);
        let mut st = Node::new("ST").with_field("ST01", "850").with_field("ST02", "00*01");
        st.append(Node::new("SE").with_field("SE01", "2").with_field("SE02", "0001"));

        let mut syntax = grammar.syntax.clone();
        syntax.add_crlf_after_record_sep = String::new();
        let serializer = Serializer::new(&grammar, &syntax);
        let records = serializer.tree_to_records(&st).unwrap();
        assert_eq!(
            serializer.records_to_string(records.clone()).unwrap(),
            "ST*850*0001~SE*2*0001~"
        );

        syntax.replace_char = None;
        let serializer = Serializer::new(&grammar, &syntax);
        let error = serializer.records_to_string(records).unwrap_err();
        assert_eq!(error.code(), Some("F51"));
    }

    const CSV: &str = r#"
syntax: { field_sep: ",", quote_char: '"', forcequote: 0, noBOTSID: true }
structure:
  - { ID: LINE, MIN: 1, MAX: 99 }
recorddefs:
  LINE:
    - [BOTSID, M, 4, A]
    - [NAME, C, 20, A]
    - [QTY, C, 5, R]
    - [NOTE, C, 20, A]
"#;

    #[test]
    fn test_csv_quotes_only_when_needed() {
        let grammar = grammar(Editype::Csv, "lines", CSV);
        let mut root = Node::root();
        root.append(Node::new("LINE").with_field("NAME", "Smith, J").with_field("QTY", "2"));
        root.append(Node::new("LINE").with_field("NAME", "say \"hi\"").with_field("NOTE", "x"));
        let bytes = Serializer::new(&grammar, &grammar.syntax).write(&mut root).unwrap();
        assert_eq!(
            String::from_utf8(bytes).unwrap(),
            "\"Smith, J\",2,\r\n\"say \"\"hi\"\"\",0,x\r\n"
        );
    }

    const FIXED: &str = r"
structure:
  - ID: HDR
    MIN: 1
    MAX: 1
    LEVEL:
      - { ID: LIN, MIN: 1, MAX: 9 }
recorddefs:
  HDR:
    - [BOTSID, M, 3, A]
    - [NUMBER, M, 6, AR]
    - [DATE, C, 8, D]
  LIN:
    - [BOTSID, M, 3, A]
    - [QTY, C, 6.2, N]
    - [PRICE, C, 7.2, I]
";

    #[test]
    fn test_fixed_records_are_padded() {
        let grammar = grammar(Editype::Fixed, "invoice", FIXED);
        let mut hdr = Node::new("HDR").with_field("NUMBER", "42");
        hdr.append(Node::new("LIN").with_field("QTY", "12.3"));
        hdr.append(Node::new("LIN").with_field("PRICE", "1.5"));
        let bytes = Serializer::new(&grammar, &grammar.syntax).write(&mut hdr).unwrap();
        assert_eq!(
            String::from_utf8(bytes).unwrap(),
            "HDR    42        \r\nLIN012.300000000\r\nLIN000.000000150\r\n"
        );
    }

    #[test]
    fn test_write_reports_field_errors() {
        let grammar = grammar(Editype::Fixed, "invoice", FIXED);
        let mut hdr = Node::new("HDR").with_field("NUMBER", "1234567");
        hdr.append(Node::new("LIN"));
        match Serializer::new(&grammar, &grammar.syntax).write(&mut hdr).unwrap_err() {
            Error::FieldErrors(errors) => assert_eq!(errors[0].code, "F20"),
            other => panic!("expected field errors, got {other:?}"),
        }
    }

    #[test]
    fn test_empty_tree_is_discarded() {
        let grammar = grammar(Editype::Fixed, "invoice", FIXED);
        let error = Serializer::new(&grammar, &grammar.syntax).write(&mut Node::root()).unwrap_err();
        assert_eq!(error, Error::Discard("No outgoing message".to_string()));
    }

    #[test]
    fn test_wrap() {
        assert_eq!(wrap("UNA:+.? 'UNB", 5), "UNA:+\r\n.? 'U\r\nNB\r\n");
        assert_eq!(wrap("abc", 0), "abc");
    }
}
