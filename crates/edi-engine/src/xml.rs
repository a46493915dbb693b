//! XML documents to node trees and back
//!
//! An element the grammar knows as a record becomes a node; any other
//! element without element children is a field of the enclosing record.
//! Attributes are stored as fields named `element` + marker + `attribute`
//! (`DATE__format` with the default marker), the text of a record element
//! goes into [`Node::content`].

use crate::{Error, Result};
use edi_grammar::{Grammar, RecordStructureNode, Syntax};
use edi_ir::{FieldError, FieldValue, Node, Position};
use roxmltree::{Document, ParsingOptions};
use std::collections::BTreeMap;
use tracing::debug;

/// Read an XML document into a node tree.
///
/// Returns the tree and the unknown-tag errors (`S02`) found on the way.
/// Values are not formatted or checked here.
///
/// # Errors
///
/// `A70` when the document is not well-formed.
pub fn read(text: &str, grammar: &Grammar, syntax: &Syntax) -> Result<(Node, Vec<FieldError>)> {
    let options = ParsingOptions {
        allow_dtd: true,
        ..ParsingOptions::default()
    };
    let document = Document::parse_with_options(text, options).map_err(|e| {
        let pos = e.pos();
        Error::fatal(
            "A70",
            Some(Position::new(pos.row as usize, pos.col as usize)),
            format!("XML is not well-formed: {e}"),
        )
    })?;
    let mut reader = Reader {
        document: &document,
        marker: &syntax.attribute_marker,
        check_unknown: syntax.check_unknown_entities,
        errors: Vec::new(),
    };
    let root = reader.record(document.root_element(), grammar.structure()?);
    debug!(records = root.count_records(), unknown = reader.errors.len(), "read xml document");
    Ok((root, reader.errors))
}

struct Reader<'a, 'input> {
    document: &'a Document<'input>,
    marker: &'a str,
    check_unknown: bool,
    errors: Vec<FieldError>,
}

impl Reader<'_, '_> {
    fn position(&self, element: roxmltree::Node<'_, '_>) -> Position {
        let pos = self.document.text_pos_at(element.range().start);
        Position::new(pos.row as usize, pos.col as usize)
    }

    fn record(&mut self, element: roxmltree::Node<'_, '_>, structure: &RecordStructureNode) -> Node {
        let tag = element.tag_name().name();
        let mut node = Node::new(tag)
            .with_occurrence(structure.occurrence.clone())
            .at(self.position(element));
        self.add_attributes(&mut node, tag, element);
        node.content = element
            .text()
            .map(str::trim)
            .filter(|text| !text.is_empty())
            .map(str::to_string);

        for child in element.children().filter(roxmltree::Node::is_element) {
            let child_tag = child.tag_name().name();
            if let Some(definition) = structure.children().iter().find(|def| def.id == child_tag) {
                let record = self.record(child, definition);
                node.append(record);
            } else if child.children().any(|n| n.is_element()) {
                if self.check_unknown {
                    self.errors.push(
                        FieldError::new(
                            "S02",
                            format!(
                                "Unknown xml-tag \"{child_tag}\" (within \"{tag}\") in message."
                            ),
                        )
                        .at(Some(self.position(child))),
                    );
                }
            } else {
                if let Some(text) = child.text().map(str::trim).filter(|text| !text.is_empty()) {
                    add_value(&mut node, child_tag, text);
                }
                self.add_attributes(&mut node, child_tag, child);
            }
        }
        node
    }

    fn add_attributes(&self, node: &mut Node, owner: &str, element: roxmltree::Node<'_, '_>) {
        for attribute in element.attributes() {
            let value = attribute.value().trim();
            if !value.is_empty() {
                node.set(format!("{owner}{}{}", self.marker, attribute.name()), value);
            }
        }
    }
}

/// A field element seen twice becomes a repeated value.
fn add_value(node: &mut Node, id: &str, value: &str) {
    match node.record.get_mut(id) {
        Some(FieldValue::Text(first)) => {
            let first = std::mem::take(first);
            node.set(id, FieldValue::Repeated(vec![first, value.to_string()]));
        }
        Some(FieldValue::Repeated(values)) => values.push(value.to_string()),
        _ => node.set(id, value),
    }
}

/// Render a checked tree as an XML document.
///
/// Field elements are written in grammar order, attributes in alphabetical
/// order. With `indented` every element starts on its own line.
///
/// # Errors
///
/// `F52` when the tree holds more than one message.
pub fn write(root: &Node, grammar: &Grammar, syntax: &Syntax) -> Result<String> {
    let message = match root.top_level() {
        [message] => message,
        many => {
            return Err(Error::fatal(
                "F52",
                None,
                format!("XML output holds one message; found {}.", many.len()),
            ));
        }
    };
    let mut writer = Writer {
        grammar,
        marker: &syntax.attribute_marker,
        indented: syntax.indented,
        out: format!(
            "<?xml version=\"{}\" encoding=\"{}\"?>",
            syntax.version, syntax.charset
        ),
    };
    writer.element(message, 0);
    Ok(writer.out)
}

type Attributes<'n> = BTreeMap<&'n str, Vec<(&'n str, &'n str)>>;

struct Writer<'a> {
    grammar: &'a Grammar,
    marker: &'a str,
    indented: bool,
    out: String,
}

impl Writer<'_> {
    fn attributes<'n>(&self, node: &'n Node) -> Attributes<'n> {
        let mut attributes = Attributes::new();
        if self.marker.is_empty() {
            return attributes;
        }
        for (key, value) in &node.record {
            if let (Some((owner, name)), Some(value)) = (key.split_once(self.marker), value.as_text()) {
                attributes.entry(owner).or_default().push((name, value));
            }
        }
        attributes
    }

    fn element(&mut self, node: &Node, depth: usize) {
        let tag = node.id().unwrap_or_default();
        let attributes = self.attributes(node);
        let grammar = self.grammar;
        let mut leaves: Vec<(&str, Option<&str>)> = Vec::new();
        if let Some(fields) = grammar.recorddefs.get(tag) {
            for field in fields.iter().skip(1) {
                if !self.marker.is_empty() && field.id.contains(self.marker) {
                    continue;
                }
                match node.field(&field.id) {
                    Some(FieldValue::Text(value)) => leaves.push((field.id.as_str(), Some(value.as_str()))),
                    Some(FieldValue::Repeated(values)) => {
                        leaves.extend(values.iter().map(|v| (field.id.as_str(), Some(v.as_str()))));
                    }
                    _ if attributes.contains_key(field.id.as_str()) => leaves.push((field.id.as_str(), None)),
                    _ => {}
                }
            }
        }

        self.newline(depth);
        self.start_tag(tag, attributes.get(tag));
        if leaves.is_empty() && node.children.is_empty() && node.content.is_none() {
            self.out.push_str("/>");
            return;
        }
        self.out.push('>');
        if let Some(content) = &node.content {
            self.out.push_str(&escape(content, false));
        }
        for (id, value) in &leaves {
            self.newline(depth + 1);
            self.start_tag(id, attributes.get(id));
            match value {
                Some(value) => {
                    self.out.push('>');
                    self.out.push_str(&escape(value, false));
                    self.out.push_str(&format!("</{id}>"));
                }
                None => self.out.push_str("/>"),
            }
        }
        for child in &node.children {
            self.element(child, depth + 1);
        }
        if !(leaves.is_empty() && node.children.is_empty()) {
            self.newline(depth);
        }
        self.out.push_str(&format!("</{tag}>"));
    }

    fn start_tag(&mut self, tag: &str, attributes: Option<&Vec<(&str, &str)>>) {
        self.out.push('<');
        self.out.push_str(tag);
        for (name, value) in attributes.into_iter().flatten() {
            self.out.push_str(&format!(" {name}=\"{}\"", escape(value, true)));
        }
    }

    fn newline(&mut self, depth: usize) {
        if self.indented {
            self.out.push('\n');
            self.out.push_str(&"  ".repeat(depth));
        }
    }
}

fn escape(value: &str, in_attribute: bool) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' if in_attribute => escaped.push_str("&quot;"),
            _ => escaped.push(c),
        }
    }
    escaped
}
