//! Node types for the document tree
#![allow(clippy::must_use_candidate)]
#![allow(clippy::return_self_not_must_use)]

use crate::metadata::Position;
use crate::mpath::{DEFAULT_OCCURRENCE, TYPE_MARKER};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Business fields of one record, keyed by field id.
pub type Record = BTreeMap<String, FieldValue>;

/// Values extracted for downstream consumers (message type, references, ...).
pub type Queries = BTreeMap<String, String>;

/// Value of one field in a record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    /// Scalar value (simple field or subfield of a non-repeating composite)
    Text(String),

    /// Repeating simple field
    Repeated(Vec<String>),

    /// Repeating composite: one subfield map per repeat
    Composites(Vec<BTreeMap<String, String>>),
}

impl FieldValue {
    /// Scalar text, if this is a simple value
    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Text(s) => Some(s),
            _ => None,
        }
    }

    /// True when the value carries no data at all
    pub fn is_empty(&self) -> bool {
        match self {
            FieldValue::Text(s) => s.is_empty(),
            FieldValue::Repeated(values) => values.iter().all(String::is_empty),
            FieldValue::Composites(repeats) => repeats
                .iter()
                .all(|composite| composite.values().all(String::is_empty)),
        }
    }

    fn strip(&mut self) {
        match self {
            FieldValue::Text(s) => trim_in_place(s),
            FieldValue::Repeated(values) => values.iter_mut().for_each(trim_in_place),
            FieldValue::Composites(repeats) => repeats
                .iter_mut()
                .flat_map(BTreeMap::values_mut)
                .for_each(trim_in_place),
        }
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::Text(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::Text(value)
    }
}

fn trim_in_place(s: &mut String) {
    let trimmed = s.trim();
    if trimmed.len() != s.len() {
        *s = trimmed.to_string();
    }
}

fn default_occurrence() -> String {
    DEFAULT_OCCURRENCE.to_string()
}

/// A node in the document tree.
///
/// The business record and the bookkeeping (occurrence index, source
/// position, queries) are kept apart so no real field id can collide with
/// them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    /// Business fields; empty for a root that carries no record of its own
    pub record: Record,

    /// Disambiguation index among same-id records at one level
    #[serde(default = "default_occurrence")]
    pub occurrence: String,

    /// Where the record started in the source stream
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<Position>,

    /// Text content of an XML record element
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,

    /// Child nodes, in document order
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<Node>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    queries: Option<Queries>,
}

impl Default for Node {
    fn default() -> Self {
        Self {
            record: Record::new(),
            occurrence: default_occurrence(),
            position: None,
            content: None,
            children: Vec::new(),
            queries: None,
        }
    }
}

impl Node {
    /// Create a root node without a record
    pub fn root() -> Self {
        Self::default()
    }

    /// Create a node whose record carries only the type marker
    pub fn new(id: impl Into<String>) -> Self {
        let mut node = Self::default();
        node.record
            .insert(TYPE_MARKER.to_string(), FieldValue::Text(id.into()));
        node
    }

    /// Create a node from a complete record
    pub fn from_record(record: Record) -> Self {
        Self {
            record,
            ..Self::default()
        }
    }

    /// Builder: add a scalar field
    pub fn with_field(mut self, id: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.record.insert(id.into(), value.into());
        self
    }

    /// Builder: set the occurrence index
    pub fn with_occurrence(mut self, occurrence: impl Into<String>) -> Self {
        self.occurrence = occurrence.into();
        self
    }

    /// Builder: set the source position
    pub fn at(mut self, position: Position) -> Self {
        self.position = Some(position);
        self
    }

    /// Value of the type marker, if the node has a record
    pub fn id(&self) -> Option<&str> {
        self.record.get(TYPE_MARKER).and_then(FieldValue::as_text)
    }

    /// True when the node carries a record of its own
    pub fn has_record(&self) -> bool {
        !self.record.is_empty()
    }

    /// Raw field value
    pub fn field(&self, id: &str) -> Option<&FieldValue> {
        self.record.get(id)
    }

    /// Scalar field value
    pub fn text(&self, id: &str) -> Option<&str> {
        self.record.get(id).and_then(FieldValue::as_text)
    }

    /// Set a field value
    pub fn set(&mut self, id: impl Into<String>, value: impl Into<FieldValue>) {
        self.record.insert(id.into(), value.into());
    }

    /// Nodes holding the top-level records: the node itself when it carries
    /// a record, otherwise its children.
    pub fn top_level(&self) -> &[Node] {
        if self.has_record() {
            std::slice::from_ref(self)
        } else {
            &self.children
        }
    }

    /// Mutable form of [`Node::top_level`].
    pub fn top_level_mut(&mut self) -> &mut [Node] {
        if self.has_record() {
            std::slice::from_mut(self)
        } else {
            &mut self.children
        }
    }

    /// Append a child and return a reference to it
    pub fn append(&mut self, child: Node) -> &mut Node {
        let index = self.children.len();
        self.children.push(child);
        &mut self.children[index]
    }

    /// Queries gathered for this node (empty when none were set)
    pub fn queries(&self) -> &Queries {
        static EMPTY: Queries = Queries::new();
        self.queries.as_ref().unwrap_or(&EMPTY)
    }

    /// Merge queries: keys that already carry a non-empty value are kept.
    pub fn update_queries(&mut self, update: &Queries) {
        if update.is_empty() {
            return;
        }
        let queries = self.queries.get_or_insert_with(Queries::new);
        for (key, value) in update {
            let keep = queries.get(key).is_some_and(|current| !current.is_empty());
            if !keep {
                queries.insert(key.clone(), value.clone());
            }
        }
    }

    /// Copy queries down the tree so split messages see envelope-level data.
    ///
    /// Propagation stops at the first record node reached after `depth`
    /// levels.
    pub fn process_queries(&mut self, inherited: &Queries, depth: usize) {
        self.update_queries(inherited);
        if self.has_record() && depth == 0 {
            return;
        }
        let own = self.queries().clone();
        for child in &mut self.children {
            child.process_queries(&own, depth.saturating_sub(1));
        }
    }

    /// Number of records in this subtree, the node itself included.
    pub fn count_records(&self) -> usize {
        usize::from(self.has_record())
            + self
                .children
                .iter()
                .map(Node::count_records)
                .sum::<usize>()
    }

    /// Remove leading and trailing whitespace from every value in the subtree.
    pub fn strip(&mut self) {
        for value in self.record.values_mut() {
            value.strip();
        }
        for child in &mut self.children {
            child.strip();
        }
    }
}
