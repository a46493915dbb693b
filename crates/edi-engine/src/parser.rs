//! Matching lexed records against the grammar structure
//!
//! The parser walks one structure level at a time. A record that matches
//! the current structure record is turned into a node; a record that does
//! not match moves the parser to the next structure record, after checking
//! the minimum occurrence. A record not found at this level is handed back
//! to the enclosing level.

use crate::checker::{FieldCheck, MessageChecker};
use crate::handler::{for_editype, FormatHandler};
use crate::{Error, Result};
use edi_grammar::{
    Editype, FieldDescriptor, FieldFormatter, Grammar, GrammarCompiler, GrammarKind, RecordStructureNode, Syntax,
};
use edi_ir::{FieldError, FieldValue, LexedRecord, LexedToken, Lookup, Node, Queries, Record, TokenKind, TYPE_MARKER};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, trace};

/// Finds a grammar for a sub-message whose own type has none.
pub trait MessageTypeResolver: Send + Sync {
    /// Alternative grammar name for `messagetype`, if there is one.
    fn resolve(&self, editype: Editype, messagetype: &str) -> Option<String>;
}

/// Builds a node tree from lexed records
pub struct StructuralParser<'a> {
    compiler: &'a GrammarCompiler,
    grammar: &'a Grammar,
    syntax: &'a Syntax,
    handler: &'static dyn FormatHandler,
    resolver: Option<&'a dyn MessageTypeResolver>,
    check_messages: bool,
    records: std::vec::IntoIter<LexedRecord>,
    errors: Vec<FieldError>,
    message_count: usize,
    context: String,
}

/// Result of parsing: the tree and the collected field errors
#[derive(Debug)]
pub struct Parsed {
    pub root: Node,
    pub errors: Vec<FieldError>,
    /// Number of sub-messages parsed with their own grammar
    pub message_count: usize,
}

impl<'a> StructuralParser<'a> {
    /// `syntax` is the syntax in effect for the file, after sniffing.
    pub fn new(compiler: &'a GrammarCompiler, grammar: &'a Grammar, syntax: &'a Syntax) -> Self {
        Self {
            compiler,
            grammar,
            syntax,
            handler: for_editype(grammar.editype),
            resolver: None,
            check_messages: true,
            records: Vec::new().into_iter(),
            errors: Vec::new(),
            message_count: 0,
            context: String::new(),
        }
    }

    /// Ask `resolver` when a sub-message type has no grammar
    #[must_use]
    pub fn with_resolver(mut self, resolver: &'a dyn MessageTypeResolver) -> Self {
        self.resolver = Some(resolver);
        self
    }

    /// Run the message checker on every sub-message (default: true)
    #[must_use]
    pub fn check_messages(mut self, check: bool) -> Self {
        self.check_messages = check;
        self
    }

    /// Parse `records` into a tree under a root without record.
    ///
    /// # Errors
    ///
    /// Structure errors (`S50`..`S53`), a sub-message without grammar, or a
    /// grammar that does not compile. Field errors are collected in the
    /// result instead.
    pub fn parse(mut self, records: Vec<LexedRecord>) -> Result<Parsed> {
        let grammar = self.grammar;
        let structure = grammar.structure()?;
        let count = records.len();
        self.records = records.into_iter();
        let mut root = Node::root();
        let first = self.records.next();
        self.parse_level(std::slice::from_ref(structure), &mut root, first, true)?;
        debug!(
            grammar = %grammar.name,
            record_count = count,
            errors = self.errors.len(),
            messages = self.message_count,
            "parsed records"
        );
        Ok(Parsed {
            root,
            errors: self.errors,
            message_count: self.message_count,
        })
    }

    fn parse_level(
        &mut self,
        level: &[RecordStructureNode],
        parent: &mut Node,
        mut current: Option<LexedRecord>,
        top: bool,
    ) -> Result<Option<LexedRecord>> {
        if level.is_empty() {
            if let (Some(record), true) = (&current, top) {
                return Err(self.left_over(record));
            }
            return Ok(current);
        }
        let mut index = 0;
        let mut count = 0;
        loop {
            let structure = &level[index];
            let record = match current.take() {
                Some(record) if record.id() == Some(structure.id.as_str()) => record,
                other => {
                    current = other;
                    if structure.min > 0 && count == 0 {
                        return Err(match &current {
                            Some(record) => self.not_allowed(record, structure),
                            None => self.missing(structure),
                        });
                    }
                    index += 1;
                    if index == level.len() {
                        if let (Some(record), true) = (&current, top) {
                            return Err(self.not_allowed(record, structure));
                        }
                        return Ok(current);
                    }
                    count = 0;
                    continue;
                }
            };

            count += 1;
            let mut node = Node::from_record(self.parse_fields(&record, structure)?)
                .with_occurrence(structure.occurrence.as_str());
            if let Some(position) = record.position() {
                node = node.at(position);
            }
            trace!(record = %structure.display_path(), "matched record");

            if let Some(lookup) = &structure.subtranslation {
                current = self.subtranslate(node, structure, lookup, parent)?;
                continue;
            }
            let node = parent.append(node);
            current = self.records.next();
            if structure.has_level() {
                current = self.parse_level(structure.children(), node, current, false)?;
            }
            // A fixed count is complete: go on, so a record with the same id
            // right after a group is matched at the next position.
            if structure.min == structure.max && structure.max == count && index + 1 < level.len() {
                index += 1;
                count = 0;
            }
        }
    }

    fn subtranslate(
        &mut self,
        mut node: Node,
        structure: &RecordStructureNode,
        lookup: &Lookup,
        parent: &mut Node,
    ) -> Result<Option<LexedRecord>> {
        let editype = self.grammar.editype;
        let found = node
            .enhanced_get(lookup)?
            .filter(|found| !found.trim().is_empty())
            .ok_or_else(|| Error::SubTranslationNotFound {
                record: structure.display_path(),
                lookup: lookup.to_string(),
            })?;
        let messagetype = self.handler.message_type(found.trim(), parent);
        let sub = self.sub_grammar(editype, &messagetype)?;

        self.message_count += 1;
        self.context = format!("Message nr {}, type {messagetype}, ", self.message_count);
        debug!(%messagetype, number = self.message_count, "parsing sub-message");

        node.update_queries(&sub_queries(&messagetype, &sub));
        let node = parent.append(node);
        let next = self.records.next();
        let current = self.parse_level(sub.structure()?.children(), node, next, false)?;
        if self.check_messages {
            let errors = MessageChecker::new(&sub, self.syntax, FieldCheck::Keep).check(node)?;
            self.errors.extend(errors);
        }
        self.context.clear();
        Ok(current)
    }

    fn sub_grammar(&self, editype: Editype, messagetype: &str) -> Result<Arc<Grammar>> {
        match self.compiler.compile(editype, messagetype, GrammarKind::Message) {
            Ok(grammar) => Ok(grammar),
            Err(err) if err.is_not_found() => {
                let alternative = self
                    .resolver
                    .and_then(|resolver| resolver.resolve(editype, messagetype))
                    .ok_or_else(|| Error::translation_not_found(editype.as_str(), messagetype))?;
                debug!(%messagetype, %alternative, "resolved message type");
                self.compiler
                    .compile(editype, &alternative, GrammarKind::Message)
                    .map_err(|err| {
                        if err.is_not_found() {
                            Error::translation_not_found(editype.as_str(), messagetype)
                        } else {
                            Error::Grammar(err)
                        }
                    })
            }
            Err(err) => Err(Error::Grammar(err)),
        }
    }

    fn not_allowed(&self, record: &LexedRecord, structure: &RecordStructureNode) -> Error {
        let position = record.position();
        let (line, column) = position.map_or((0, 0), |p| (p.line, p.column));
        Error::fatal(
            "S50",
            position,
            format!(
                "{}Line:{line} pos:{column} record:\"{}\": message has an error in its structure; this record is not allowed here. Scanned in message definition until mandatory record: \"{}\".",
                self.context,
                record.id().unwrap_or_default(),
                structure.display_path()
            ),
        )
    }

    fn left_over(&self, record: &LexedRecord) -> Error {
        let position = record.position();
        let (line, column) = position.map_or((0, 0), |p| (p.line, p.column));
        Error::fatal(
            "S50",
            position,
            format!(
                "{}Line:{line} pos:{column} record:\"{}\": message has an error in its structure; this record is not allowed here.",
                self.context,
                record.id().unwrap_or_default(),
            ),
        )
    }

    fn missing(&self, structure: &RecordStructureNode) -> Error {
        Error::fatal(
            "S51",
            None,
            format!("{}Missing mandatory record \"{}\".", self.context, structure.display_path()),
        )
    }

    fn parse_fields(&mut self, record: &LexedRecord, structure: &RecordStructureNode) -> Result<Record> {
        if self.grammar.editype.is_fixed() {
            check_fixed_length(self.syntax, record, structure)?;
            Ok(self.fixed_fields(record, structure))
        } else {
            Ok(self.delimited_fields(record, structure))
        }
    }

    fn fixed_fields(&mut self, record: &LexedRecord, structure: &RecordStructureNode) -> Record {
        let mut fields = Record::new();
        let id = record.id().unwrap_or_default();
        let raw: Vec<char> = record.raw.as_deref().unwrap_or_default().chars().collect();
        let formatter = FieldFormatter::new(self.syntax, true);
        let mut start = 0;
        for field in structure.fields.iter() {
            if field.id == TYPE_MARKER && self.syntax.no_botsid.is_set() {
                fields.insert(TYPE_MARKER.to_string(), FieldValue::Text(id.to_string()));
                continue;
            }
            let end = (start + field.length).min(raw.len());
            let value: String = raw[start.min(end)..end].iter().collect();
            let value = value.trim();
            if !value.is_empty() {
                let value = self.format(&formatter, value, field, structure, record.tokens.first());
                fields.insert(field.id.clone(), FieldValue::Text(value));
            }
            start += field.length;
        }
        fields
    }

    fn delimited_fields(&mut self, record: &LexedRecord, structure: &RecordStructureNode) -> Record {
        let mut fields = Record::new();
        let formatter = FieldFormatter::new(self.syntax, false);
        let keep_spaces = self.grammar.editype == Editype::X12 && structure.id == "ISA";
        let path = structure.display_path();
        let mut next_field = 0;
        // Field the last token was assigned to, and its current subfield.
        let mut current: Option<(&FieldDescriptor, usize)> = None;

        for token in &record.tokens {
            let value = if keep_spaces { token.value.as_str() } else { token.value.trim() };
            match token.kind {
                TokenKind::Field => {
                    let Some(field) = structure.fields.get(next_field) else {
                        self.token_error("F19", token, &path, format!("too many fields in record; unknown field \"{}\".", token.value));
                        current = None;
                        continue;
                    };
                    next_field += 1;
                    current = Some((field, 0));
                    let target = field.subfields().first().unwrap_or(field);
                    let value = self.format_nonempty(&formatter, value, target, structure, token);
                    match (field.is_repeating(), field.is_composite()) {
                        (false, _) => {
                            if !value.is_empty() {
                                fields.insert(target.id.clone(), FieldValue::Text(value));
                            }
                        }
                        (true, false) => {
                            fields.insert(field.id.clone(), FieldValue::Repeated(vec![value]));
                        }
                        (true, true) => {
                            let composite = BTreeMap::from([(target.id.clone(), value)]);
                            fields.insert(field.id.clone(), FieldValue::Composites(vec![composite]));
                        }
                    }
                }
                TokenKind::Subfield => {
                    let Some((field, subindex)) = current.filter(|(field, _)| field.is_composite()) else {
                        self.token_error("F17", token, &path, format!("expect field but \"{}\" is a subfield.", token.value));
                        continue;
                    };
                    let subindex = subindex + 1;
                    let Some(sub) = field.subfields().get(subindex) else {
                        self.token_error(
                            "F18",
                            token,
                            &path,
                            format!("too many subfields in composite; unknown subfield \"{}\".", token.value),
                        );
                        continue;
                    };
                    current = Some((field, subindex));
                    let value = self.format_nonempty(&formatter, value, sub, structure, token);
                    if value.is_empty() {
                        continue;
                    }
                    if field.is_repeating() {
                        if let Some(FieldValue::Composites(repeats)) = fields.get_mut(&field.id) {
                            if let Some(last) = repeats.last_mut() {
                                last.insert(sub.id.clone(), value);
                            }
                        }
                    } else {
                        fields.insert(sub.id.clone(), FieldValue::Text(value));
                    }
                }
                TokenKind::Repeat => {
                    let Some((field, _)) = current else {
                        continue;
                    };
                    if !field.is_repeating() {
                        if !(path == "ISA" && field.id == "ISA11") {
                            self.token_error(
                                "F40",
                                token,
                                &path,
                                format!("expect not-repeating element, but \"{}\" is repeating.", token.value),
                            );
                        }
                        continue;
                    }
                    current = Some((field, 0));
                    let target = field.subfields().first().unwrap_or(field);
                    let value = self.format_nonempty(&formatter, value, target, structure, token);
                    match fields.get_mut(&field.id) {
                        Some(FieldValue::Repeated(values)) => values.push(value),
                        Some(FieldValue::Composites(repeats)) => {
                            repeats.push(BTreeMap::from([(target.id.clone(), value)]));
                        }
                        _ => {}
                    }
                }
            }
        }
        fields
    }

    fn format_nonempty(
        &mut self,
        formatter: &FieldFormatter<'_>,
        value: &str,
        field: &FieldDescriptor,
        structure: &RecordStructureNode,
        token: &LexedToken,
    ) -> String {
        if value.is_empty() {
            String::new()
        } else {
            self.format(formatter, value, field, structure, Some(token))
        }
    }

    fn format(
        &mut self,
        formatter: &FieldFormatter<'_>,
        value: &str,
        field: &FieldDescriptor,
        structure: &RecordStructureNode,
        token: Option<&LexedToken>,
    ) -> String {
        let formatted = formatter.incoming(value, field);
        for issue in formatted.issues {
            self.errors.push(
                FieldError::new(issue.code, format!("{}{}", self.context, issue.message))
                    .in_record(structure.display_path())
                    .for_field(&field.id)
                    .at(token.map(LexedToken::position)),
            );
        }
        formatted.value
    }

    fn token_error(&mut self, code: &str, token: &LexedToken, path: &str, message: String) {
        self.errors.push(
            FieldError::new(code, format!("{}{message}", self.context))
                .in_record(path)
                .at(Some(token.position())),
        );
    }
}

/// Check a fixed record's length; `S52`/`S53` when the grammar asks.
fn check_fixed_length(syntax: &Syntax, record: &LexedRecord, structure: &RecordStructureNode) -> Result<()> {
    let length = record.raw.as_deref().unwrap_or_default().chars().count();
    let defined = structure.fixed_record_length;
    let line = record.position().map_or(0, |p| p.line);
    let id = record.id().unwrap_or_default();
    if defined > length && syntax.check_fixed_record_too_short {
        return Err(Error::fatal(
            "S52",
            record.position(),
            format!("line {line}: Record \"{id}\" too short; is {length} pos, defined is {defined} pos."),
        ));
    }
    if defined < length && syntax.check_fixed_record_too_long {
        return Err(Error::fatal(
            "S53",
            record.position(),
            format!("line {line}: Record \"{id}\" too long; is {length} pos, defined is {defined} pos."),
        ));
    }
    Ok(())
}

/// Queries of the first record of a sub-message: its type plus the syntax
/// its grammar declares.
fn sub_queries(messagetype: &str, grammar: &Grammar) -> Queries {
    let declared = &grammar.declared_syntax;
    let mut queries = Queries::new();
    queries.insert("messagetype".to_string(), messagetype.to_string());
    for (key, value) in [
        ("charset", &declared.charset),
        ("version", &declared.version),
        ("envelope", &declared.envelope),
    ] {
        if let Some(value) = value {
            queries.insert(key.to_string(), value.clone());
        }
    }
    for (key, value) in &declared.extra {
        let text = match value {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        queries.insert(key.clone(), text);
    }
    queries
}
