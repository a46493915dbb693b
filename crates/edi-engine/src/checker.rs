//! Message checker
//!
//! Walks a node tree alongside the grammar structure. Children are put in
//! grammar order, occurrence counts are compared with min/max, fields are
//! compared with the record definition and grammar `QUERIES` are gathered
//! into the node queries. In [`FieldCheck::Incoming`] and
//! [`FieldCheck::Outgoing`] mode every field value is also passed through
//! the [`FieldFormatter`] and replaced by its formatted form.

use crate::Result;
use edi_grammar::{FieldDescriptor, FieldFormatter, Grammar, RecordStructureNode, Syntax};
use edi_ir::{FieldError, FieldValue, Node, Position, TYPE_MARKER};
use std::collections::BTreeMap;
use tracing::debug;

/// What to do with field values while checking
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldCheck {
    /// Values were formatted by the parser already
    Keep,
    /// Values come from a tree-native document and still need formatting
    Incoming,
    /// Values are about to be written
    Outgoing,
}

/// Checks node trees against one grammar
pub struct MessageChecker<'a> {
    grammar: &'a Grammar,
    formatter: FieldFormatter<'a>,
    mode: FieldCheck,
    check_unknown: bool,
}

impl<'a> MessageChecker<'a> {
    pub fn new(grammar: &'a Grammar, syntax: &'a Syntax, mode: FieldCheck) -> Self {
        Self {
            grammar,
            formatter: FieldFormatter::new(syntax, grammar.editype.is_fixed()),
            mode,
            check_unknown: syntax.check_unknown_entities,
        }
    }

    /// Check `node`, which must be the record the grammar starts with.
    ///
    /// # Errors
    ///
    /// Fails for a grammar without structure or a malformed `QUERIES`
    /// lookup. Problems with the message itself are returned as field
    /// errors.
    pub fn check(&self, node: &mut Node) -> Result<Vec<FieldError>> {
        let structure = self.grammar.structure()?;
        let mut errors = Vec::new();
        if node.id() == Some(structure.id.as_str()) {
            self.check_record(node, structure, &mut errors)?;
        } else {
            errors.push(
                FieldError::new(
                    "S01",
                    format!(
                        "Grammar \"{}\" starts with record \"{}\"; but found record \"{}\".",
                        self.grammar.name,
                        structure.id,
                        node.id().unwrap_or_default()
                    ),
                )
                .at(node.position),
            );
        }
        debug!(grammar = %self.grammar.name, errors = errors.len(), mode = ?self.mode, "checked message");
        Ok(errors)
    }

    /// Check a whole tree: the root itself when it carries a record,
    /// otherwise each of its children.
    ///
    /// # Errors
    ///
    /// As [`MessageChecker::check`].
    pub fn check_tree(&self, root: &mut Node) -> Result<Vec<FieldError>> {
        if root.has_record() {
            return self.check(root);
        }
        let mut errors = Vec::new();
        for child in &mut root.children {
            errors.extend(self.check(child)?);
        }
        Ok(errors)
    }

    fn check_record(&self, node: &mut Node, structure: &RecordStructureNode, errors: &mut Vec<FieldError>) -> Result<()> {
        self.check_fields(node, structure, errors);
        node.gather_queries(&structure.queries)?;
        // Children of a sub-message record were checked with their own grammar.
        if structure.subtranslation.is_some() {
            return Ok(());
        }

        let definitions = structure.children();
        let mut groups: Vec<Vec<Node>> = vec![Vec::new(); definitions.len()];
        for child in std::mem::take(&mut node.children) {
            let found = definitions
                .iter()
                .position(|def| child.id() == Some(def.id.as_str()) && child.occurrence == def.occurrence);
            match found {
                Some(index) => groups[index].push(child),
                None => errors.push(
                    FieldError::new(
                        "S01",
                        format!(
                            "Record \"{}\" in message, but not in grammar as child of \"{}\".",
                            child.id().unwrap_or_default(),
                            structure.display_path()
                        ),
                    )
                    .at(child.position),
                ),
            }
        }

        for (definition, mut group) in definitions.iter().zip(groups) {
            let count = group.len();
            let position = group.first().and_then(|n| n.position).or(node.position);
            if count < definition.min {
                errors.push(occurrence_error(definition, count, "min", definition.min, position));
            } else if count > definition.max {
                errors.push(occurrence_error(definition, count, "max", definition.max, position));
            }
            for child in &mut group {
                self.check_record(child, definition, errors)?;
            }
            node.children.extend(group);
        }
        Ok(())
    }

    fn check_fields(&self, node: &mut Node, structure: &RecordStructureNode, errors: &mut Vec<FieldError>) {
        let path = structure.display_path();
        let position = node.position;
        let error = |code: &str, field: &str, message: String| {
            FieldError::new(code, message).in_record(&path).for_field(field).at(position)
        };

        let unknown: Vec<String> = node
            .record
            .keys()
            .filter(|key| key.as_str() != TYPE_MARKER && structure.field(key).is_none())
            .cloned()
            .collect();
        for key in unknown {
            if self.check_unknown {
                errors.push(error("F01", key.as_str(), "field is not in the grammar.".to_string()));
            }
            node.record.remove(&key);
        }

        for field in structure.fields.iter() {
            if field.is_repeating() {
                self.check_repeating(node, field, &error, errors);
            } else if field.is_composite() {
                let present = field
                    .subfields()
                    .iter()
                    .any(|sub| node.record.get(&sub.id).is_some_and(|v| !v.is_empty()));
                if !present {
                    if field.mandatory {
                        errors.push(error("F03", field.id.as_str(), "composite is mandatory.".to_string()));
                    }
                    continue;
                }
                for sub in field.subfields() {
                    self.check_single(node, sub, "F04", &error, errors);
                }
            } else {
                self.check_single(node, field, "F02", &error, errors);
            }
        }
    }

    fn check_single(
        &self,
        node: &mut Node,
        field: &FieldDescriptor,
        mandatory_code: &str,
        error: &dyn Fn(&str, &str, String) -> FieldError,
        errors: &mut Vec<FieldError>,
    ) {
        match node.record.get_mut(&field.id) {
            Some(FieldValue::Text(value)) if !value.is_empty() => {
                if let Some(formatted) = self.format(value, field, error, errors) {
                    *value = formatted;
                }
            }
            Some(FieldValue::Repeated(_) | FieldValue::Composites(_)) => {
                errors.push(error("F40", field.id.as_str(), "expect not-repeating element, but field is repeating.".to_string()));
            }
            _ => {
                if field.mandatory && field.id != TYPE_MARKER {
                    errors.push(error(mandatory_code, field.id.as_str(), "field is mandatory.".to_string()));
                }
            }
        }
    }

    fn check_repeating(
        &self,
        node: &mut Node,
        field: &FieldDescriptor,
        error: &dyn Fn(&str, &str, String) -> FieldError,
        errors: &mut Vec<FieldError>,
    ) {
        if let Some(FieldValue::Text(text)) = node.record.get(&field.id) {
            let value = if field.is_composite() {
                let first = field.subfields().first().map(|sub| sub.id.clone()).unwrap_or_default();
                FieldValue::Composites(vec![BTreeMap::from([(first, text.clone())])])
            } else {
                FieldValue::Repeated(vec![text.clone()])
            };
            node.record.insert(field.id.clone(), value);
        }

        let mut present = false;
        match node.record.get_mut(&field.id) {
            Some(FieldValue::Repeated(values)) => {
                if values.len() > field.max_repeat {
                    errors.push(too_many_repeats(field, values.len(), error));
                }
                for value in values.iter_mut().filter(|v| !v.is_empty()) {
                    present = true;
                    if let Some(formatted) = self.format(value, field, error, errors) {
                        *value = formatted;
                    }
                }
            }
            Some(FieldValue::Composites(repeats)) => {
                if repeats.len() > field.max_repeat {
                    errors.push(too_many_repeats(field, repeats.len(), error));
                }
                for repeat in repeats.iter_mut() {
                    repeat.retain(|_, v| !v.is_empty());
                    if repeat.is_empty() {
                        continue;
                    }
                    present = true;
                    for key in repeat.keys().filter(|k| !field.subfields().iter().any(|s| &s.id == *k)) {
                        if self.check_unknown {
                            errors.push(error("F01", key.as_str(), "subfield is not in the grammar.".to_string()));
                        }
                    }
                    repeat.retain(|k, _| field.subfields().iter().any(|s| &s.id == k));
                    for sub in field.subfields() {
                        match repeat.get_mut(&sub.id) {
                            Some(value) => {
                                if let Some(formatted) = self.format(value, sub, error, errors) {
                                    *value = formatted;
                                }
                            }
                            None if sub.mandatory => {
                                errors.push(error("F04", sub.id.as_str(), "subfield is mandatory.".to_string()));
                            }
                            None => {}
                        }
                    }
                }
            }
            _ => {}
        }
        if !present && field.mandatory {
            let code = if field.is_composite() { "F03" } else { "F02" };
            errors.push(error(code, field.id.as_str(), "field is mandatory.".to_string()));
        }
    }

    /// Formatted value, or `None` when values are kept as they are.
    fn format(
        &self,
        value: &str,
        field: &FieldDescriptor,
        error: &dyn Fn(&str, &str, String) -> FieldError,
        errors: &mut Vec<FieldError>,
    ) -> Option<String> {
        let formatted = match self.mode {
            FieldCheck::Keep => return None,
            FieldCheck::Incoming => self.formatter.incoming(value, field),
            FieldCheck::Outgoing => self.formatter.outgoing(value, field),
        };
        for issue in formatted.issues {
            errors.push(error(issue.code, field.id.as_str(), issue.message));
        }
        Some(formatted.value)
    }
}

fn occurrence_error(
    definition: &RecordStructureNode,
    count: usize,
    bound: &str,
    limit: usize,
    position: Option<Position>,
) -> FieldError {
    FieldError::new("S03", format!("occurs {count} times, {bound} is {limit}."))
        .in_record(definition.display_path())
        .at(position)
}

fn too_many_repeats(
    field: &FieldDescriptor,
    count: usize,
    error: &dyn Fn(&str, &str, String) -> FieldError,
) -> FieldError {
    error(
        "F41",
        field.id.as_str(),
        format!("repeats {count} times, max is {}.", field.max_repeat),
    )
}
