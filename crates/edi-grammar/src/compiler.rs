//! Source to compiled grammar
//!
//! Compilation resolves the syntax (editype defaults, then the envelope
//! grammar's declared syntax, then the message's), normalizes and checks the
//! record definitions, checks the structure, runs the collision checks and
//! links every structure node to its fields.

use crate::cache::{CacheKey, GrammarCache};
use crate::collision;
use crate::editype::{Editype, EditypeRules};
use crate::model::{
    Align, BaseFormat, FieldDescriptor, Grammar, GrammarKind, RecordStructureNode, SplitCriteria,
};
use crate::source::{GrammarProvider, GrammarSource, RawStructureNode, RawValue};
use crate::syntax::Syntax;
use crate::{Error, Result};
use edi_ir::TYPE_MARKER;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info};

/// Compiles grammars from a provider, once per `(editype, name, kind)`.
pub struct GrammarCompiler {
    provider: Arc<dyn GrammarProvider>,
    cache: GrammarCache,
}

impl GrammarCompiler {
    pub fn new(provider: Arc<dyn GrammarProvider>) -> Self {
        Self {
            provider,
            cache: GrammarCache::new(),
        }
    }

    pub fn cache(&self) -> &GrammarCache {
        &self.cache
    }

    /// Compiled grammar for `name`, from the cache when available.
    ///
    /// # Errors
    ///
    /// [`Error::NotFound`] when no source exists, any other variant when the
    /// source is invalid. Errors are cached like results.
    pub fn compile(&self, editype: Editype, name: &str, kind: GrammarKind) -> Result<Arc<Grammar>> {
        let key = CacheKey::new(editype, name, kind);
        self.cache
            .get_or_compile(&key, || self.build(editype, name, kind).map(Arc::new))
    }

    fn required(&self, editype: Editype, name: &str, kind: GrammarKind) -> Result<GrammarSource> {
        self.provider
            .load(editype, name, kind)?
            .ok_or_else(|| Error::not_found(editype.as_str(), name))
    }

    fn build(&self, editype: Editype, name: &str, kind: GrammarKind) -> Result<Grammar> {
        let rules = editype.rules();
        if kind == GrammarKind::Partner {
            let source = self.required(editype, name, kind)?;
            let mut syntax = rules.syntax.clone();
            syntax.overlay(&source.syntax);
            return Ok(Grammar {
                editype,
                name: name.to_string(),
                kind,
                syntax,
                declared_syntax: source.syntax,
                root: None,
                recorddefs: BTreeMap::new(),
                split: SplitCriteria::None,
                record_id_span: None,
            });
        }

        let message = self.required(editype, name, GrammarKind::Message)?;
        let envelope_name = message
            .syntax
            .envelope
            .clone()
            .filter(|e| !e.is_empty())
            .unwrap_or_else(|| rules.syntax.envelope.clone());
        let envelope = if envelope_name.is_empty()
            || (kind == GrammarKind::Message && envelope_name == name)
        {
            None
        } else {
            self.provider.load(editype, &envelope_name, GrammarKind::Message)?
        };

        let mut syntax = rules.syntax.clone();
        if let Some(envelope) = &envelope {
            syntax.overlay(&envelope.syntax);
        }
        syntax.overlay(&message.syntax);

        let (grammar_name, source) = match (kind, envelope) {
            (GrammarKind::Envelope, Some(envelope)) => (envelope_name, envelope),
            _ => (name.to_string(), message),
        };
        let grammar = Builder::new(&grammar_name, &rules, syntax).build(source, kind)?;
        info!(editype = %editype, grammar = %grammar.name, %kind, "grammar compiled");
        Ok(grammar)
    }
}

/// Length as written: a number, possibly with a decimal part.
#[derive(Debug, Clone, Copy)]
enum Length {
    Whole(usize),
    Fractional(f64),
}

impl Length {
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    fn whole(self) -> usize {
        match self {
            Self::Whole(n) => n,
            Self::Fractional(f) => f.trunc() as usize,
        }
    }

    /// Decimal count encoded in the fraction: `5.2` is 5 long with 2 decimals.
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    fn decimals(self) -> Option<usize> {
        match self {
            Self::Whole(_) => None,
            Self::Fractional(f) => Some((f.fract() * 10.0001).trunc() as usize),
        }
    }
}

fn as_length(value: &RawValue) -> Option<Length> {
    match value {
        RawValue::Int(n) => usize::try_from(*n).ok().map(Length::Whole),
        RawValue::Float(f) if *f >= 0.0 => Some(Length::Fractional(*f)),
        _ => None,
    }
}

struct Builder<'a> {
    grammar: String,
    rules: &'a EditypeRules,
    syntax: Syntax,
}

impl<'a> Builder<'a> {
    fn new(grammar: &str, rules: &'a EditypeRules, syntax: Syntax) -> Self {
        Self {
            grammar: grammar.to_string(),
            rules,
            syntax,
        }
    }

    fn field_error(&self, record: &str, field: &str, message: impl Into<String>) -> Error {
        Error::field(&self.grammar, record, field, message)
    }

    fn build(self, source: GrammarSource, kind: GrammarKind) -> Result<Grammar> {
        let split = self.split_criteria(&source)?;
        let raw_recorddefs = source
            .recorddefs
            .as_ref()
            .ok_or_else(|| Error::structure(&self.grammar, "recorddefs", "no recorddefs, is required"))?;
        let recorddefs = self.recorddefs(raw_recorddefs)?;
        let raw_structure = source
            .structure
            .as_ref()
            .ok_or_else(|| Error::structure(&self.grammar, "structure", "no structure, is required"))?;
        if raw_structure.len() != 1 {
            return Err(Error::structure(
                &self.grammar,
                "root",
                "structure must have exactly one root record",
            ));
        }
        let mut structure = self.structure(raw_structure, &[])?;
        if self.syntax.check_collision {
            collision::check_back_collision(&self.grammar, &structure)?;
            collision::check_nested_collision(&self.grammar, &structure)?;
        }
        collision::assign_occurrences(&mut structure);
        let mut record_id_span = None;
        self.link(&mut structure, &recorddefs, &mut record_id_span)?;
        self.editype_checks(&recorddefs, &split)?;

        let root = structure.pop();
        debug!(grammar = %self.grammar, records = recorddefs.len(), "grammar checked");
        Ok(Grammar {
            editype: self.rules.editype,
            name: self.grammar,
            kind,
            syntax: self.syntax,
            declared_syntax: source.syntax,
            root,
            recorddefs,
            split,
            record_id_span,
        })
    }

    fn split_criteria(&self, source: &GrammarSource) -> Result<SplitCriteria> {
        let to_error = |e: edi_ir::Error| Error::structure(&self.grammar, "split criteria", e.to_string());
        match (&source.nextmessage, &source.nextmessage2, &source.nextmessageblock) {
            (None, Some(_), _) => Err(Error::structure(
                &self.grammar,
                "nextmessage2",
                "if nextmessage2: nextmessage has to be used",
            )),
            (Some(_), _, Some(_)) => Err(Error::structure(
                &self.grammar,
                "nextmessageblock",
                "nextmessageblock and nextmessage not both allowed",
            )),
            (Some(first), second, None) => Ok(SplitCriteria::NextMessage {
                first: first.to_mpath().map_err(to_error)?,
                second: second
                    .as_ref()
                    .map(|s| s.to_mpath().map_err(to_error))
                    .transpose()?,
            }),
            (None, None, Some(block)) => Ok(SplitCriteria::NextMessageBlock(
                block.to_lookup().map_err(to_error)?,
            )),
            (None, None, None) => Ok(SplitCriteria::None),
        }
    }

    fn recorddefs(
        &self,
        raw: &BTreeMap<String, Vec<RawValue>>,
    ) -> Result<BTreeMap<String, Arc<[FieldDescriptor]>>> {
        let mut recorddefs = BTreeMap::new();
        for (record, raw_fields) in raw {
            if record.is_empty() {
                return Err(self.field_error(record, "", "recordid with empty string"));
            }
            if raw_fields.len() < self.rules.min_fields {
                return Err(Error::field(&self.grammar, record, "", "too few fields"));
            }
            let mut fields = Vec::with_capacity(raw_fields.len());
            let mut names: HashSet<String> = HashSet::new();
            let mut has_botsid = false;
            for raw_field in raw_fields {
                let field = self.field(record, raw_field, true)?;
                if field.is_composite() {
                    for sub in field.subfields() {
                        if !names.insert(sub.id.clone()) {
                            return Err(self.field_error(
                                record,
                                &sub.id,
                                "appears twice. Field names should be unique within a record",
                            ));
                        }
                    }
                } else {
                    has_botsid |= field.id == TYPE_MARKER;
                    if !names.insert(field.id.clone()) {
                        return Err(self.field_error(
                            record,
                            &field.id,
                            "appears twice. Field names should be unique within a record",
                        ));
                    }
                }
                fields.push(field);
            }
            if !has_botsid {
                return Err(self.field_error(record, TYPE_MARKER, "no field BOTSID"));
            }
            recorddefs.insert(record.clone(), Arc::from(fields));
        }
        Ok(recorddefs)
    }

    /// Normalize one compact field definition.
    #[allow(clippy::too_many_lines)]
    fn field(&self, record: &str, raw: &RawValue, allow_composite: bool) -> Result<FieldDescriptor> {
        let RawValue::List(items) = raw else {
            return Err(self.field_error(record, "?", "field definition has to be a list"));
        };
        let id = items.first().and_then(RawValue::as_text).unwrap_or_default();
        if items.len() != 3 && items.len() != 4 {
            return Err(self.field_error(record, id, "list has invalid number of arguments"));
        }
        if id.is_empty() {
            return Err(self.field_error(record, id, "fieldID has to be a non-empty string"));
        }
        let (mandatory, max_repeat) = self.mandatory(record, id, &items[1])?;

        if items.len() == 3 {
            if !allow_composite {
                return Err(self.field_error(record, id, "subfield can not be a composite"));
            }
            let RawValue::List(raw_subfields) = &items[2] else {
                return Err(self.field_error(record, id, "is a composite field, has to have subfields"));
            };
            if raw_subfields.len() < 2 {
                return Err(self.field_error(record, id, "has < 2 sfields"));
            }
            let subfields = raw_subfields
                .iter()
                .map(|sub| self.field(record, sub, false))
                .collect::<Result<Vec<_>>>()?;
            return Ok(FieldDescriptor {
                id: id.to_string(),
                mandatory,
                max_repeat,
                length: subfields.iter().map(|s| s.length).sum(),
                min_length: 0,
                format: String::new(),
                base: BaseFormat::Alphanumeric,
                align: Align::Default,
                decimals: 0,
                subfields: Some(subfields),
            });
        }

        let (mut min_length, length) = match &items[2] {
            RawValue::List(pair) if pair.len() == 2 => {
                let min = as_length(&pair[0]).ok_or_else(|| {
                    self.field_error(record, id, format!("min length \"{:?}\" has to be a number", pair[0]))
                })?;
                let max = as_length(&pair[1]).ok_or_else(|| {
                    self.field_error(record, id, format!("max length \"{:?}\" has to be a number", pair[1]))
                })?;
                if min.whole() > max.whole() {
                    return Err(self.field_error(
                        record,
                        id,
                        format!("min length \"{}\" must be <= max length \"{}\"", min.whole(), max.whole()),
                    ));
                }
                (Some(min), max)
            }
            other => {
                let length = as_length(other).ok_or_else(|| {
                    self.field_error(record, id, "length has to be number or [min, max]")
                })?;
                (None, length)
            }
        };
        if self.rules.editype.is_fixed() && min_length.is_none() {
            min_length = Some(length);
        }
        if length.whole() < 1 {
            return Err(self.field_error(record, id, "length has to be at least 1"));
        }

        let Some(code) = items[3].as_text() else {
            return Err(self.field_error(record, id, "format has to be a string"));
        };
        let Some(spec) = self.rules.format(code) else {
            let allowed: Vec<&str> = self.rules.formats.keys().copied().collect();
            return Err(self.field_error(
                record,
                id,
                format!("format \"{code}\" has to be one of {allowed:?}"),
            ));
        };

        let mut decimals = spec.decimals.unwrap_or(0);
        if spec.base.is_numeric() {
            if let Some(from_length) = length.decimals() {
                decimals = from_length;
                if decimals >= length.whole() {
                    return Err(self.field_error(
                        record,
                        id,
                        format!(
                            "field length \"{}\" has to be greater that nr of decimals \"{decimals}\"",
                            length.whole()
                        ),
                    ));
                }
            }
        } else if matches!(length, Length::Fractional(_))
            || matches!(min_length, Some(Length::Fractional(_)))
        {
            return Err(self.field_error(
                record,
                id,
                format!("if format \"{code}\", no decimals in length"),
            ));
        }

        Ok(FieldDescriptor {
            id: id.to_string(),
            mandatory,
            max_repeat,
            length: length.whole(),
            min_length: min_length.map_or(0, Length::whole),
            format: code.to_string(),
            base: spec.base,
            align: spec.align,
            decimals,
            subfields: None,
        })
    }

    fn mandatory(&self, record: &str, id: &str, raw: &RawValue) -> Result<(bool, usize)> {
        let flag = |value: &str| match value {
            "M" => Ok(true),
            "C" => Ok(false),
            _ => Err(self.field_error(record, id, "mandatory/conditional must be \"M\" or \"C\"")),
        };
        match raw {
            RawValue::Text(value) => Ok((flag(value)?, 1)),
            RawValue::List(pair) if pair.len() == 2 => {
                let Some(value) = pair[0].as_text() else {
                    return Err(self.field_error(record, id, "mandatory/conditional must be \"M\" or \"C\""));
                };
                let RawValue::Int(repeat) = pair[1] else {
                    return Err(self.field_error(record, id, "number of repeats must be integer"));
                };
                let repeat = usize::try_from(repeat)
                    .ok()
                    .filter(|r| *r >= 1)
                    .ok_or_else(|| self.field_error(record, id, "number of repeats must be at least 1"))?;
                Ok((flag(value)?, repeat))
            }
            _ => Err(self.field_error(
                record,
                id,
                "mandatory/conditional has to be a string (or [M|C, repeats] for a repeating field)",
            )),
        }
    }

    fn structure(&self, raw: &[RawStructureNode], parent: &[String]) -> Result<Vec<RecordStructureNode>> {
        let at = || {
            if parent.is_empty() {
                "root".to_string()
            } else {
                format!("at \"{}\"", parent.join("/"))
            }
        };
        let mut level = Vec::with_capacity(raw.len());
        for node in raw {
            let id = match node.id.as_deref() {
                None => return Err(Error::structure(&self.grammar, at(), "record without ID")),
                Some("") => return Err(Error::structure(&self.grammar, at(), "recordid of record is empty")),
                Some(id) => id.to_string(),
            };
            let min = node
                .min
                .ok_or_else(|| Error::structure(&self.grammar, at(), format!("record \"{id}\" without MIN")))?;
            let max = node
                .max
                .ok_or_else(|| Error::structure(&self.grammar, at(), format!("record \"{id}\" without MAX")))?;
            let (Ok(min), Ok(max)) = (usize::try_from(min), usize::try_from(max)) else {
                return Err(Error::structure(
                    &self.grammar,
                    at(),
                    format!("record \"{id}\" where MIN or MAX is not a whole number"),
                ));
            };
            if max == 0 {
                return Err(Error::structure(&self.grammar, at(), format!("record \"{id}\": MAX is zero")));
            }
            if min > max {
                return Err(Error::structure(&self.grammar, at(), format!("record \"{id}\" where MIN > MAX")));
            }
            let mut path = parent.to_vec();
            path.push(id.clone());
            let lookup_error = |e: edi_ir::Error| Error::structure(&self.grammar, path.join("/"), e.to_string());
            let subtranslation = node
                .subtranslation
                .as_ref()
                .map(|l| l.to_lookup().map_err(lookup_error))
                .transpose()?;
            let queries = node
                .queries
                .iter()
                .map(|(k, l)| Ok((k.clone(), l.to_lookup().map_err(lookup_error)?)))
                .collect::<Result<BTreeMap<_, _>>>()?;
            if node.level.as_ref().is_some_and(Vec::is_empty) {
                return Err(Error::structure(
                    &self.grammar,
                    path.join("/"),
                    format!("record \"{id}\" has an empty LEVEL"),
                ));
            }
            let children = node
                .level
                .as_ref()
                .map(|children| self.structure(children, &path))
                .transpose()?;
            level.push(RecordStructureNode {
                id,
                min,
                max,
                path,
                occurrence: edi_ir::DEFAULT_OCCURRENCE.to_string(),
                fields: Arc::from(Vec::new()),
                level: children,
                subtranslation,
                queries,
                fixed_record_length: 0,
            });
        }
        Ok(level)
    }

    fn link(
        &self,
        level: &mut [RecordStructureNode],
        recorddefs: &BTreeMap<String, Arc<[FieldDescriptor]>>,
        span: &mut Option<(usize, usize)>,
    ) -> Result<()> {
        for node in level {
            let Some(fields) = recorddefs.get(&node.id) else {
                return Err(Error::structure(
                    &self.grammar,
                    node.display_path(),
                    format!("record \"{}\" is in structure but not in recorddefs", node.id),
                ));
            };
            node.fields = Arc::clone(fields);
            if self.rules.editype.is_fixed() {
                let mut position = 0;
                for field in fields.iter() {
                    if field.id == TYPE_MARKER {
                        let here = (position, position + field.length);
                        match *span {
                            None => *span = Some(here),
                            Some(first) if first != here => {
                                return Err(Error::structure(
                                    &self.grammar,
                                    node.display_path(),
                                    "position and length of BOTSID should be equal in all records",
                                ));
                            }
                            Some(_) => {}
                        }
                        break;
                    }
                    position += field.length;
                }
                node.fixed_record_length = fields.iter().map(|f| f.length).sum();
                if self.syntax.no_botsid.is_set() {
                    if let Some((start, end)) = *span {
                        node.fixed_record_length = node.fixed_record_length.saturating_sub(end - start);
                    }
                }
            }
            if let Some(children) = node.level.as_mut() {
                self.link(children, recorddefs, span)?;
            }
        }
        Ok(())
    }

    fn editype_checks(
        &self,
        recorddefs: &BTreeMap<String, Arc<[FieldDescriptor]>>,
        split: &SplitCriteria,
    ) -> Result<()> {
        if !matches!(self.rules.editype, Editype::Csv | Editype::Fixed) || recorddefs.len() == 1 {
            return Ok(());
        }
        if self.syntax.no_botsid.is_set() {
            return Err(Error::syntax(
                &self.grammar,
                "if noBOTSID: there can be only one record in recorddefs",
            ));
        }
        if matches!(split, SplitCriteria::NextMessageBlock(_)) {
            return Err(Error::syntax(
                &self.grammar,
                "if nextmessageblock: there can be only one record in recorddefs",
            ));
        }
        Ok(())
    }
}
