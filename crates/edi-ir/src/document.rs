//! Parsed document and its attribute set
#![allow(clippy::must_use_candidate)]
#![allow(clippy::return_self_not_must_use)]

use crate::metadata::FieldError;
use crate::node::Node;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A parsed (or to-be-serialized) document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    /// Root node of the tree
    pub root: Node,

    /// Attributes for downstream consumers
    pub metadata: DocumentMetadata,

    /// Envelope errors and other collected findings that did not stop parsing
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<FieldError>,
}

/// Attributes of a document: what came in with it and what parsing found.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentMetadata {
    /// Format family
    pub editype: Option<String>,

    /// Message (grammar) name
    pub messagetype: Option<String>,

    /// Character set detected or declared
    pub charset: Option<String>,

    /// Interchange sender
    pub sender: Option<String>,

    /// Interchange receiver
    pub receiver: Option<String>,

    /// Interchange control reference
    pub reference: Option<String>,

    /// Test indicator from the interchange header
    pub test_indicator: Option<String>,

    /// Number of records in the tree
    pub record_count: usize,

    /// Sequence number of this message within its interchange (1-based)
    pub message_number: Option<usize>,

    /// Total number of messages in the interchange
    pub total_messages: Option<usize>,

    /// Opaque context from the caller, passed through
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: BTreeMap<String, String>,
}

impl Document {
    /// Create a new document with the given root node
    pub fn new(root: Node) -> Self {
        Self {
            root,
            metadata: DocumentMetadata::default(),
            warnings: Vec::new(),
        }
    }

    /// Create a document with metadata
    pub fn with_metadata(root: Node, metadata: DocumentMetadata) -> Self {
        Self {
            root,
            metadata,
            warnings: Vec::new(),
        }
    }

    /// Recount records after the tree changed
    pub fn refresh_record_count(&mut self) {
        self.metadata.record_count = self.root.count_records();
    }
}

impl DocumentMetadata {
    /// Builder: set the format family and message name
    pub fn for_message(editype: impl Into<String>, messagetype: impl Into<String>) -> Self {
        Self {
            editype: Some(editype.into()),
            messagetype: Some(messagetype.into()),
            ..Self::default()
        }
    }

    /// Fill unset envelope fields from `other`, keeping values already present.
    pub fn merge_missing(&mut self, other: &DocumentMetadata) {
        fn fill(target: &mut Option<String>, source: &Option<String>) {
            if target.is_none() {
                target.clone_from(source);
            }
        }
        fill(&mut self.charset, &other.charset);
        fill(&mut self.sender, &other.sender);
        fill(&mut self.receiver, &other.receiver);
        fill(&mut self.reference, &other.reference);
        fill(&mut self.test_indicator, &other.test_indicator);
        for (key, value) in &other.attributes {
            self.attributes
                .entry(key.clone())
                .or_insert_with(|| value.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_creation() {
        let mut root = Node::root();
        root.append(Node::new("UNH")).append(Node::new("BGM"));
        let mut doc = Document::with_metadata(root, DocumentMetadata::for_message("edifact", "ORDERSD96AUNEDI"));
        doc.refresh_record_count();

        assert_eq!(doc.metadata.record_count, 2);
        assert_eq!(doc.metadata.editype.as_deref(), Some("edifact"));
        assert!(doc.warnings.is_empty());
    }

    #[test]
    fn test_merge_missing_keeps_existing() {
        let mut parsed = DocumentMetadata {
            sender: Some("SENDER".into()),
            ..DocumentMetadata::default()
        };
        let mut context = DocumentMetadata {
            sender: Some("OTHER".into()),
            receiver: Some("RECEIVER".into()),
            ..DocumentMetadata::default()
        };
        context.attributes.insert("command".into(), "new".into());

        parsed.merge_missing(&context);
        assert_eq!(parsed.sender.as_deref(), Some("SENDER"));
        assert_eq!(parsed.receiver.as_deref(), Some("RECEIVER"));
        assert_eq!(parsed.attributes["command"], "new");
    }

    #[test]
    fn test_document_serialization() {
        let doc = Document::new(Node::new("HDR").with_field("ORDER", "1"));
        let json = serde_json::to_string(&doc).unwrap();
        let back: Document = serde_json::from_str(&json).unwrap();
        assert_eq!(back.root, doc.root);
    }
}
