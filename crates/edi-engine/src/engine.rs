//! Parse, serialize and split entry points

use crate::checker::{FieldCheck, MessageChecker};
use crate::config::{EngineConfig, MpathCheckLevel};
use crate::handler::for_editype;
use crate::parser::{MessageTypeResolver, StructuralParser};
use crate::serializer::Serializer;
use crate::{charset, json, splitter, xml, Error, Result};
use edi_grammar::{DirectoryProvider, Editype, Grammar, GrammarCompiler, GrammarKind, GrammarProvider, Syntax};
use edi_ir::{Document, DocumentMetadata, LexedRecord, Mpath, Node, Queries};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Translation engine: compiles grammars on demand and runs documents
/// through them.
///
/// The engine is cheap to share; compiled grammars are cached per
/// `(editype, name, kind)` for its whole lifetime.
pub struct Engine {
    config: EngineConfig,
    compiler: GrammarCompiler,
    resolver: Option<Arc<dyn MessageTypeResolver>>,
}

impl Engine {
    /// Engine reading grammars from the configured search paths
    #[must_use]
    pub fn new(config: EngineConfig) -> Self {
        let provider = Arc::new(DirectoryProvider::new(config.grammar_paths.clone()));
        Self::with_provider(config, provider)
    }

    /// Engine reading grammars from `provider`
    #[must_use]
    pub fn with_provider(config: EngineConfig, provider: Arc<dyn GrammarProvider>) -> Self {
        Self {
            config,
            compiler: GrammarCompiler::new(provider),
            resolver: None,
        }
    }

    /// Ask `resolver` for a grammar when a sub-message type has none
    #[must_use]
    pub fn with_resolver(mut self, resolver: Arc<dyn MessageTypeResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Compiled message grammar.
    ///
    /// # Errors
    ///
    /// Grammar errors; a missing grammar is reported as
    /// [`Error::TranslationNotFound`].
    pub fn grammar(&self, editype: Editype, name: &str) -> Result<Arc<Grammar>> {
        self.compiler
            .compile(editype, name, GrammarKind::Message)
            .map_err(|e| {
                if e.is_not_found() {
                    Error::translation_not_found(editype.as_str(), name)
                } else {
                    Error::Grammar(e)
                }
            })
    }

    /// Syntax for reading a file: the grammar's, with the configured
    /// fallback charset and the one declared by the sender applied.
    fn incoming_syntax(&self, grammar: &Grammar, incoming: &DocumentMetadata) -> Syntax {
        let mut syntax = grammar.syntax.clone();
        if let Some(charset) = incoming.charset.as_ref().or(self.config.default_charset.as_ref()) {
            syntax.charset.clone_from(charset);
        }
        syntax
    }

    /// Lex `raw` into records without matching them against the structure.
    ///
    /// # Errors
    ///
    /// `A71` for tree-native editypes, which are not lexed; decoding and
    /// lexing errors otherwise.
    pub fn lex(&self, raw: &[u8], editype: Editype, name: &str) -> Result<Vec<LexedRecord>> {
        let grammar = self.grammar(editype, name)?;
        let mut syntax = self.incoming_syntax(&grammar, &DocumentMetadata::default());
        self.lex_with(raw, &grammar, &mut syntax)
    }

    fn lex_with(&self, raw: &[u8], grammar: &Grammar, syntax: &mut Syntax) -> Result<Vec<LexedRecord>> {
        if grammar.editype.is_tree() {
            return Err(Error::fatal(
                "A71",
                None,
                format!("Editype \"{}\" is read as a tree, not lexed.", grammar.editype),
            ));
        }
        let handler = for_editype(grammar.editype);
        let strict = self.config.strict_syntax_check;
        let decoded = handler.decode(raw, syntax, strict)?;
        let records = handler.lex(&decoded, grammar, syntax, strict)?;
        debug!(editype = %grammar.editype, grammar = %grammar.name, record_count = records.len(), "lexed");
        Ok(records)
    }

    /// Sender, receiver and reference from the interchange header.
    ///
    /// Useful when [`Engine::parse`] failed and the interchange still has to
    /// be identified, e.g. to send a negative acknowledgement.
    ///
    /// # Errors
    ///
    /// Decoding and lexing errors.
    pub fn header_info(&self, raw: &[u8], editype: Editype, name: &str) -> Result<DocumentMetadata> {
        let grammar = self.grammar(editype, name)?;
        let mut syntax = self.incoming_syntax(&grammar, &DocumentMetadata::default());
        let records = self.lex_with(raw, &grammar, &mut syntax)?;
        let mut metadata = DocumentMetadata::for_message(editype.as_str(), name);
        metadata.charset = Some(syntax.charset);
        for_editype(editype).header_info(&records, &mut metadata);
        Ok(metadata)
    }

    /// Parse `raw` with grammar `name`.
    ///
    /// # Errors
    ///
    /// See [`Engine::parse_with_metadata`].
    pub fn parse(&self, raw: &[u8], editype: Editype, name: &str) -> Result<Document> {
        self.parse_with_metadata(raw, editype, name, &DocumentMetadata::default())
    }

    /// Parse `raw` with grammar `name`; `incoming` holds what the transport
    /// knows about the file (declared charset, partners) and is merged into
    /// the document metadata.
    ///
    /// # Errors
    ///
    /// [`Error::Discard`] for an empty file, [`Error::Fatal`] when the
    /// file cannot be read as this editype, [`Error::FieldErrors`] with every
    /// field, structure and envelope error found once parsing completed.
    pub fn parse_with_metadata(
        &self,
        raw: &[u8],
        editype: Editype,
        name: &str,
        incoming: &DocumentMetadata,
    ) -> Result<Document> {
        let grammar = self.grammar(editype, name)?;
        let mut syntax = self.incoming_syntax(&grammar, incoming);
        if raw.iter().all(u8::is_ascii_whitespace) {
            return Err(Error::Discard("Edi file is empty.".to_string()));
        }

        let mut metadata = DocumentMetadata::for_message(editype.as_str(), name);
        let (root, mut errors) = if editype.is_tree() {
            let text = charset::decode(raw, &syntax.charset)?;
            let (mut root, mut errors) = match editype {
                Editype::Xml => xml::read(&text, &grammar, &syntax)?,
                _ => (json::read(&text, &grammar, &syntax)?, Vec::new()),
            };
            errors.extend(MessageChecker::new(&grammar, &syntax, FieldCheck::Incoming).check_tree(&mut root)?);
            (root, errors)
        } else {
            let records = self.lex_with(raw, &grammar, &mut syntax)?;
            let handler = for_editype(editype);
            handler.header_info(&records, &mut metadata);
            let mut parser = StructuralParser::new(&self.compiler, &grammar, &syntax)
                .check_messages(self.config.check_message);
            if let Some(resolver) = &self.resolver {
                parser = parser.with_resolver(resolver.as_ref());
            }
            let parsed = parser.parse(records)?;
            let mut root = parsed.root;
            let mut errors = parsed.errors;
            if self.config.check_envelope {
                errors.extend(handler.check_envelope(&mut root)?);
            }
            if self.config.check_message {
                errors.extend(MessageChecker::new(&grammar, &syntax, FieldCheck::Keep).check_tree(&mut root)?);
            }
            (root, errors)
        };
        metadata.merge_missing(incoming);

        if !errors.is_empty() {
            errors.sort_by_key(|e| e.position.map(|p| (p.line, p.column)));
            warn!(editype = %editype, grammar = name, errors = errors.len(), "document rejected");
            return Err(Error::FieldErrors(errors));
        }
        metadata.charset = Some(syntax.charset.clone());
        metadata.record_count = root.count_records();
        if let Some(first) = root.top_level().first() {
            apply_queries(&mut metadata, first.queries());
        }
        info!(
            editype = %editype,
            grammar = name,
            record_count = metadata.record_count,
            sender = metadata.sender.as_deref().unwrap_or_default(),
            "document parsed"
        );
        Ok(Document::with_metadata(root, metadata))
    }

    /// Write a tree with grammar `name`.
    ///
    /// # Errors
    ///
    /// See [`Serializer::write`].
    pub fn serialize(&self, root: &mut Node, editype: Editype, name: &str) -> Result<Vec<u8>> {
        self.serialize_for_partner(root, editype, name, None)
    }

    /// Write a tree with grammar `name`, applying the syntax of the partner
    /// grammar `partner` when one exists.
    ///
    /// # Errors
    ///
    /// See [`Serializer::write`]; an invalid partner grammar is an error, a
    /// missing one is not.
    pub fn serialize_for_partner(
        &self,
        root: &mut Node,
        editype: Editype,
        name: &str,
        partner: Option<&str>,
    ) -> Result<Vec<u8>> {
        let grammar = self.grammar(editype, name)?;
        let mut syntax = grammar.syntax.clone();
        if let Some(partner) = partner {
            match self.compiler.compile(editype, partner, GrammarKind::Partner) {
                Ok(partner_grammar) => syntax.overlay(&partner_grammar.declared_syntax),
                Err(e) if e.is_not_found() => debug!(partner, "no partner syntax"),
                Err(e) => return Err(e.into()),
            }
        }
        Serializer::new(&grammar, &syntax).write(root)
    }

    /// Cut a parsed document into messages with the split criteria of
    /// grammar `name`.
    ///
    /// Every message gets the document metadata, its number and the total,
    /// and its queries as attributes.
    ///
    /// # Errors
    ///
    /// Grammar errors and malformed split criteria.
    pub fn split(&self, document: &mut Document, editype: Editype, name: &str) -> Result<Vec<Document>> {
        let grammar = self.grammar(editype, name)?;
        let messages = splitter::split(&mut document.root, &grammar)?;
        Ok(messages
            .into_iter()
            .map(|message| {
                let mut metadata = document.metadata.clone();
                metadata.message_number = Some(message.number);
                metadata.total_messages = Some(message.total);
                metadata.record_count = message.root.count_records();
                apply_queries(&mut metadata, &message.queries);
                Document::with_metadata(message.root, metadata)
            })
            .collect())
    }

    /// Parse with one grammar, split, and write every message with another.
    ///
    /// Both grammars describe the same records; only the editype or syntax
    /// differ.
    ///
    /// # Errors
    ///
    /// Any parse, split or serialize error.
    pub fn translate(
        &self,
        raw: &[u8],
        from: (Editype, &str),
        to: (Editype, &str),
    ) -> Result<Vec<Vec<u8>>> {
        let mut document = self.parse(raw, from.0, from.1)?;
        let messages = self.split(&mut document, from.0, from.1)?;
        let mut outputs = Vec::with_capacity(messages.len());
        for mut message in messages {
            let partner = message.metadata.receiver.clone();
            outputs.push(self.serialize_for_partner(&mut message.root, to.0, to.1, partner.as_deref())?);
        }
        info!(from = %from.0, to = %to.0, messages = outputs.len(), "translated");
        Ok(outputs)
    }

    /// Value found with `mpath` in the first top-level record that has it.
    ///
    /// With [`MpathCheckLevel::Grammar`] the mpath is checked against
    /// grammar `name` first.
    ///
    /// # Errors
    ///
    /// Malformed mpath, or one the grammar does not know.
    pub fn query(&self, document: &mut Document, editype: Editype, name: &str, mpath: &str) -> Result<Option<String>> {
        let mpath: Mpath = mpath.parse()?;
        let grammar = match self.config.mpath_check {
            MpathCheckLevel::Grammar => Some(self.grammar(editype, name)?),
            MpathCheckLevel::Off => None,
        };
        for node in document.root.top_level_mut() {
            let found = match &grammar {
                Some(grammar) => node.checked(grammar.as_ref()).get(&mpath)?,
                None => node.get(&mpath)?,
            };
            if found.is_some() {
                return Ok(found);
            }
        }
        Ok(None)
    }
}

/// Copy queries into metadata: well-known keys fill the envelope fields,
/// all of them land in the attributes.
fn apply_queries(metadata: &mut DocumentMetadata, queries: &Queries) {
    for (key, value) in queries {
        if value.is_empty() {
            continue;
        }
        let slot = match key.as_str() {
            "frompartner" => Some(&mut metadata.sender),
            "topartner" => Some(&mut metadata.receiver),
            "reference" => Some(&mut metadata.reference),
            "testindicator" => Some(&mut metadata.test_indicator),
            // A sub-message type replaces the envelope grammar name.
            "messagetype" => {
                metadata.messagetype = Some(value.clone());
                None
            }
            _ => None,
        };
        if let Some(slot) = slot {
            slot.get_or_insert_with(|| value.clone());
        }
        metadata.attributes.insert(key.clone(), value.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use edi_grammar::MemoryProvider;

    const LINES: &str = r#"
syntax: { field_sep: ",", noBOTSID: true, quote_char: '"', forcequote: 0 }
structure:
  - { ID: LINE, MIN: 1, MAX: 999, QUERIES: { reference: { BOTSID: LINE, ORDER: null } } }
recorddefs:
  LINE:
    - [BOTSID, M, 4, A]
    - [ORDER, M, 10, A]
    - [QTY, C, 5, R]
"#;

    fn engine() -> Engine {
        let provider = Arc::new(MemoryProvider::new());
        provider.insert_yaml(Editype::Csv, "lines", LINES).unwrap();
        provider
            .insert_yaml(Editype::Csv, "lines_semicolon", &LINES.replace("field_sep: \",\"", "field_sep: \";\""))
            .unwrap();
        Engine::with_provider(EngineConfig::default(), provider)
    }

    #[test]
    fn test_parse_sets_metadata() {
        let document = engine().parse(b"PO1,1.5\nPO1,2\n", Editype::Csv, "lines").unwrap();
        assert_eq!(document.root.children.len(), 2);
        assert_eq!(document.metadata.record_count, 2);
        assert_eq!(document.metadata.reference.as_deref(), Some("PO1"));
        assert_eq!(document.metadata.editype.as_deref(), Some("csv"));
        assert_eq!(document.metadata.charset.as_deref(), Some("utf-8"));
    }

    #[test]
    fn test_empty_file_is_discarded() {
        let error = engine().parse(b"  \r\n", Editype::Csv, "lines").unwrap_err();
        assert!(matches!(error, Error::Discard(_)));
    }

    #[test]
    fn test_unknown_grammar() {
        let error = engine().parse(b"x", Editype::Csv, "nope").unwrap_err();
        assert!(matches!(error, Error::TranslationNotFound { ref messagetype, .. } if messagetype == "nope"));
    }

    #[test]
    fn test_field_errors_collected() {
        let error = engine().parse(b"PO1,1.5x\nPO1,123456\n", Editype::Csv, "lines").unwrap_err();
        match error {
            Error::FieldErrors(errors) => {
                assert!(!errors.is_empty());
                assert!(errors.iter().all(|e| e.field.as_deref() == Some("QTY")), "{errors:?}");
            }
            other => panic!("expected field errors, got {other:?}"),
        }
    }

    #[test]
    fn test_translate_changes_separator() {
        let outputs = engine()
            .translate(b"PO1,1.5\nPO2,2\n", (Editype::Csv, "lines"), (Editype::Csv, "lines_semicolon"))
            .unwrap();
        assert_eq!(outputs, vec![b"PO1;1.5\r\nPO2;2\r\n".to_vec()]);
    }

    #[test]
    fn test_query_with_grammar_check() {
        let provider = Arc::new(MemoryProvider::new());
        provider.insert_yaml(Editype::Csv, "lines", LINES).unwrap();
        let config = EngineConfig::default().with_mpath_check(MpathCheckLevel::Grammar);
        let engine = Engine::with_provider(config, provider);
        let mut document = engine.parse(b"PO1,1.5\nPO2,2\n", Editype::Csv, "lines").unwrap();

        let found = engine.query(&mut document, Editype::Csv, "lines", "LINE[ORDER=PO2,QTY=?]").unwrap();
        assert_eq!(found.as_deref(), Some("2"));
        let error = engine.query(&mut document, Editype::Csv, "lines", "LINE[PRICE=?]").unwrap_err();
        assert!(matches!(error, Error::Mpath(_)));
    }

    #[test]
    fn test_tree_editypes_are_not_lexed() {
        let provider = Arc::new(MemoryProvider::new());
        provider
            .insert_yaml(
                Editype::Json,
                "lines",
                "structure: [{ID: LINE, MIN: 1, MAX: 9}]\nrecorddefs:\n  LINE:\n    - [BOTSID, M, 4, A]\n",
            )
            .unwrap();
        let engine = Engine::with_provider(EngineConfig::default(), provider);
        assert_eq!(engine.lex(b"{}", Editype::Json, "lines").unwrap_err().code(), Some("A71"));
    }
}
