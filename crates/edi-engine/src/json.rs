//! JSON documents to node trees and back
//!
//! Accepted layouts, with `ORDER` as the first record of the grammar:
//!
//! ```text
//! {"ORDER": {...}}          one message, named
//! {...}                     one message, name from the grammar
//! {"ORDER": [{...}, ...]}   list of messages, named
//! [{"ORDER": {...}}, ...]   list of messages, each named
//! [{...}, ...]              list of messages, name from the grammar
//! ```
//!
//! Inside a message an object is a record, a list of objects is a
//! repeating record and a list of scalars a repeating field. Numbers are
//! read as their text. Empty strings, nulls and records without any data
//! are dropped.

use crate::{Error, Result};
use edi_grammar::{Grammar, RecordStructureNode, Syntax};
use edi_ir::{FieldValue, Node};
use serde_json::{Map, Value};
use tracing::debug;

/// Read a JSON document into a node tree.
///
/// A single message becomes a root node with a record; a list of messages
/// a root without record holding one child per message. Values are not
/// formatted or checked here.
///
/// # Errors
///
/// `J51` for malformed JSON, `J53` for a document that is neither object
/// nor list, `J54`/`J55` for unusable values (only with
/// `check_unknown_entities`) and `J56` for a list of something else than
/// objects.
pub fn read(text: &str, grammar: &Grammar, syntax: &Syntax) -> Result<Node> {
    let document: Value = serde_json::from_str(text)
        .map_err(|e| Error::fatal("J51", None, format!("Content of json not OK: {e}.")))?;
    let name = grammar
        .root
        .as_ref()
        .map_or(syntax.default_root_id.as_str(), |root| root.id.as_str());
    let reader = Reader {
        check_unknown: syntax.check_unknown_entities,
    };

    let mut root = match document {
        Value::Array(items) => {
            if items.iter().any(|item| !item.is_object()) {
                return Err(Error::fatal(
                    "J56",
                    None,
                    "Content of json not OK. Content is expected to be a list of objects, but is list of something else.",
                ));
            }
            let named = matches!(items.first(), Some(Value::Object(first)) if first.len() == 1 && first.contains_key(name));
            let mut root = Node::root();
            if named {
                for item in items {
                    let Value::Object(mut item) = item else { continue };
                    match item.remove(name) {
                        Some(Value::Object(message)) => {
                            if let Some(node) = reader.object(message, name)? {
                                root.append(node);
                            }
                        }
                        _ => {
                            return Err(Error::fatal(
                                "J56",
                                None,
                                format!("Content of json not OK. Every list item should hold an object \"{name}\"."),
                            ));
                        }
                    }
                }
            } else {
                root.children = reader.list(items, name)?.nodes;
            }
            root
        }
        Value::Object(mut object) if object.len() == 1 && object.contains_key(name) => {
            match object.remove(name) {
                Some(Value::Object(message)) => reader.object(message, name)?.unwrap_or_else(|| Node::new(name)),
                Some(Value::Array(items)) => {
                    let mut root = Node::root();
                    root.children = reader.list(items, name)?.nodes;
                    root
                }
                _ => return Err(not_list_or_object()),
            }
        }
        Value::Object(object) => reader.object(object, name)?.unwrap_or_else(|| Node::new(name)),
        _ => return Err(not_list_or_object()),
    };

    if let Some(structure) = &grammar.root {
        for message in root.top_level_mut() {
            assign_occurrences(message, structure);
        }
    }
    debug!(records = root.count_records(), "read json document");
    Ok(root)
}

fn not_list_or_object() -> Error {
    Error::fatal("J53", None, "Content of json not OK. Content is not a \"list\" or \"object\".")
}

struct Reader {
    check_unknown: bool,
}

#[derive(Default)]
struct Listed {
    nodes: Vec<Node>,
    values: Vec<String>,
}

impl Reader {
    fn list(&self, items: Vec<Value>, name: &str) -> Result<Listed> {
        let mut listed = Listed::default();
        for item in items {
            match item {
                Value::Object(object) => listed.nodes.extend(self.object(object, name)?),
                Value::String(value) => listed.values.push(value),
                Value::Number(number) => listed.values.push(number.to_string()),
                Value::Bool(flag) => listed.values.push(flag.to_string()),
                _ if self.check_unknown => {
                    return Err(Error::fatal(
                        "J54",
                        None,
                        "List content must be a object, string, int or float - but it is not.",
                    ));
                }
                _ => {}
            }
        }
        Ok(listed)
    }

    fn object(&self, object: Map<String, Value>, name: &str) -> Result<Option<Node>> {
        let mut node = Node::new(name);
        for (key, value) in object {
            match value {
                Value::Null => {}
                Value::String(text) => {
                    if !text.trim().is_empty() {
                        node.set(key, text);
                    }
                }
                Value::Object(child) => node.children.extend(self.object(child, &key)?),
                Value::Array(items) => {
                    let listed = self.list(items, &key)?;
                    if !listed.values.is_empty() {
                        node.set(key, FieldValue::Repeated(listed.values));
                    }
                    node.children.extend(listed.nodes);
                }
                Value::Number(number) => node.set(key, number.to_string()),
                Value::Bool(flag) => {
                    if self.check_unknown {
                        return Err(Error::fatal(
                            "J55",
                            None,
                            format!("Key \"{key}\" value \"{flag}\": is not string, list or dict."),
                        ));
                    }
                    node.set(key, flag.to_string());
                }
            }
        }
        if node.record.len() == 1 && node.children.is_empty() {
            return Ok(None);
        }
        Ok(Some(node))
    }
}

fn assign_occurrences(node: &mut Node, structure: &RecordStructureNode) {
    for child in &mut node.children {
        if let Some(definition) = structure.children().iter().find(|def| child.id() == Some(def.id.as_str())) {
            child.occurrence.clone_from(&definition.occurrence);
            assign_occurrences(child, definition);
        }
    }
}

/// Render a checked tree as JSON.
///
/// Records that occur at most once are written as objects, others as lists
/// of objects keyed by record id. Several messages, or a grammar whose first
/// record may repeat, give a list of messages.
///
/// # Errors
///
/// Only fails for a grammar without structure.
pub fn write(root: &Node, grammar: &Grammar, syntax: &Syntax) -> Result<String> {
    let structure = grammar.structure()?;
    let messages: Vec<Value> = root
        .top_level()
        .iter()
        .map(|message| {
            let object = Value::Object(to_object(message, Some(structure)));
            if syntax.named_root_object {
                let mut named = Map::new();
                named.insert(message.id().unwrap_or_default().to_string(), object);
                Value::Object(named)
            } else {
                object
            }
        })
        .collect();
    let document = match <[Value; 1]>::try_from(messages) {
        Ok([message]) if structure.max <= 1 => message,
        Ok(one) => Value::Array(one.into()),
        Err(many) => Value::Array(many),
    };
    let text = if syntax.indented {
        serde_json::to_string_pretty(&document)
    } else {
        serde_json::to_string(&document)
    };
    text.map_err(|e| Error::io("write", "<json>", e.to_string()))
}

fn to_object(node: &Node, structure: Option<&RecordStructureNode>) -> Map<String, Value> {
    let mut object = Map::new();
    for (key, value) in &node.record {
        if key == edi_ir::TYPE_MARKER {
            continue;
        }
        let value = match value {
            FieldValue::Text(text) => Value::String(text.clone()),
            FieldValue::Repeated(values) => Value::Array(values.iter().cloned().map(Value::String).collect()),
            FieldValue::Composites(repeats) => Value::Array(
                repeats
                    .iter()
                    .map(|composite| {
                        Value::Object(
                            composite
                                .iter()
                                .map(|(id, text)| (id.clone(), Value::String(text.clone())))
                                .collect(),
                        )
                    })
                    .collect(),
            ),
        };
        object.insert(key.clone(), value);
    }
    for child in &node.children {
        let key = child.id().unwrap_or_default().to_string();
        let definition = structure.and_then(|s| {
            s.children()
                .iter()
                .find(|def| def.id == key && def.occurrence == child.occurrence)
        });
        let value = Value::Object(to_object(child, definition));
        if definition.is_some_and(|def| def.max == 1) {
            object.insert(key, value);
        } else if let Some(Value::Array(list)) = object.get_mut(&key) {
            list.push(value);
        } else {
            object.insert(key, Value::Array(vec![value]));
        }
    }
    object
}

#[cfg(test)]
mod tests {
    use super::*;
    use edi_grammar::{Editype, GrammarCompiler, GrammarKind, MemoryProvider};
    use serde_json::json;
    use std::sync::Arc;

    const ORDERS: &str = r"
structure:
  - ID: ORDER
    MIN: 1
    MAX: 1
    LEVEL:
      - { ID: PARTY, MIN: 0, MAX: 1 }
      - { ID: LINE, MIN: 1, MAX: 99 }
recorddefs:
  ORDER:
    - [BOTSID, M, 5, AN]
    - [NUMBER, M, 10, AN]
    - [CODES, [C, 5], 3, AN]
  PARTY:
    - [BOTSID, M, 5, AN]
    - [NAME, M, 35, AN]
  LINE:
    - [BOTSID, M, 4, AN]
    - [ARTICLE, M, 10, AN]
    - [QTY, C, 5, R]
";

    fn grammar() -> Arc<Grammar> {
        let provider = Arc::new(MemoryProvider::new());
        provider.insert_yaml(Editype::Json, "orders", ORDERS).unwrap();
        GrammarCompiler::new(provider)
            .compile(Editype::Json, "orders", GrammarKind::Message)
            .unwrap()
    }

    fn parse(text: &str) -> Result<Node> {
        let grammar = grammar();
        read(text, &grammar, &grammar.syntax)
    }

    #[test]
    fn test_read_named_message() {
        let root = parse(
            r#"{"ORDER": {"NUMBER": "PO-1", "QTY": 5, "NOTE": "  ", "GONE": null,
                "LINE": [{"ARTICLE": "4711", "QTY": 2.5}, {"ARTICLE": "4712"}],
                "PARTY": {"NAME": "ACME"}, "EMPTY": {}, "CODES": ["a", "b"]}}"#,
        )
        .unwrap();
        assert_eq!(root.id(), Some("ORDER"));
        assert_eq!(root.text("NUMBER"), Some("PO-1"));
        assert_eq!(root.text("QTY"), Some("5"));
        assert_eq!(root.field("NOTE"), None);
        assert_eq!(root.field("GONE"), None);
        assert_eq!(
            root.field("CODES"),
            Some(&FieldValue::Repeated(vec!["a".to_string(), "b".to_string()]))
        );
        let mut ids: Vec<_> = root.children.iter().filter_map(Node::id).collect();
        ids.sort_unstable();
        assert_eq!(ids, vec!["LINE", "LINE", "PARTY"]);
        let first_line = root.children.iter().find(|n| n.text("ARTICLE") == Some("4711")).unwrap();
        assert_eq!(first_line.text("QTY"), Some("2.5"));
    }

    #[test]
    fn test_read_message_lists() {
        for text in [
            r#"[{"NUMBER": "1"}, {"NUMBER": "2"}]"#,
            r#"[{"ORDER": {"NUMBER": "1"}}, {"ORDER": {"NUMBER": "2"}}]"#,
            r#"{"ORDER": [{"NUMBER": "1"}, {"NUMBER": "2"}]}"#,
        ] {
            let root = parse(text).unwrap();
            assert!(!root.has_record(), "{text}");
            let numbers: Vec<_> = root.children.iter().filter_map(|n| n.text("NUMBER")).collect();
            assert_eq!(numbers, vec!["1", "2"], "{text}");
            assert!(root.children.iter().all(|n| n.id() == Some("ORDER")));
        }

        let root = parse(r#"{"NUMBER": "1"}"#).unwrap();
        assert_eq!(root.id(), Some("ORDER"));
    }

    #[test]
    fn test_read_rejects_unusable_content() {
        let code = |text: &str| parse(text).unwrap_err().code();
        assert_eq!(code("{"), Some("J51"));
        assert_eq!(code(r#""text""#), Some("J53"));
        assert_eq!(code(r#"{"ORDER": "text"}"#), Some("J53"));
        assert_eq!(code(r#"{"ORDER": {"LINE": [null]}}"#), Some("J54"));
        assert_eq!(code(r#"{"ORDER": {"NUMBER": true}}"#), Some("J55"));
        assert_eq!(code("[1, 2]"), Some("J56"));

        let grammar = grammar();
        let mut syntax = grammar.syntax.clone();
        syntax.check_unknown_entities = false;
        let root = read(r#"{"NUMBER": true, "LINE": [null]}"#, &grammar, &syntax).unwrap();
        assert_eq!(root.text("NUMBER"), Some("true"));
    }

    fn order(number: &str) -> Node {
        let mut root = Node::new("ORDER")
            .with_field("NUMBER", number)
            .with_field("CODES", FieldValue::Repeated(vec!["a".into(), "b".into()]));
        root.append(Node::new("PARTY").with_field("NAME", "ACME"));
        root.append(Node::new("LINE").with_field("ARTICLE", "4711").with_field("QTY", "2"));
        root
    }

    #[test]
    fn test_write_named_message() {
        let grammar = grammar();
        let text = write(&order("PO-1"), &grammar, &grammar.syntax).unwrap();
        let written: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(
            written,
            json!({"ORDER": {
                "NUMBER": "PO-1",
                "CODES": ["a", "b"],
                "PARTY": {"NAME": "ACME"},
                "LINE": [{"ARTICLE": "4711", "QTY": "2"}]
            }})
        );
    }

    #[test]
    fn test_write_several_messages_as_list() {
        let grammar = grammar();
        let mut syntax = grammar.syntax.clone();
        syntax.named_root_object = false;
        let mut root = Node::root();
        root.append(Node::new("ORDER").with_field("NUMBER", "1"));
        root.append(Node::new("ORDER").with_field("NUMBER", "2"));
        let text = write(&root, &grammar, &syntax).unwrap();
        assert_eq!(text, r#"[{"NUMBER":"1"},{"NUMBER":"2"}]"#);

        let back = read(&text, &grammar, &syntax).unwrap();
        assert_eq!(back.children.len(), 2);
    }
}
