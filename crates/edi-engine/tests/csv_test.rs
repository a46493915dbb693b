//! Integration tests for delimited files with quoting and decimals

use std::sync::Arc;

use edi_engine::{Engine, EngineConfig, Error};
use edi_grammar::{Editype, MemoryProvider};
use edi_ir::Node;

const LINES: &str = r#"
syntax: { field_sep: ",", quote_char: '"', forcequote: 0, noBOTSID: true }
structure:
  - { ID: LINE, MIN: 1, MAX: 999 }
recorddefs:
  LINE:
    - [BOTSID, M, 4, A]
    - [ARTICLE, M, 10, A]
    - [NAME, C, 20, A]
    - [PRICE, C, 8.2, N]
"#;

fn engine() -> Engine {
    let provider = Arc::new(MemoryProvider::new());
    provider.insert_yaml(Editype::Csv, "lines", LINES).unwrap();
    Engine::with_provider(EngineConfig::default(), provider)
}

#[test]
fn test_quoted_fields_survive_translation() {
    let input = "4711,\"Smith, J\",1.00\r\n4712,\"say \"\"hi\"\"\",2.50\r\n";
    let outputs = engine()
        .translate(input.as_bytes(), (Editype::Csv, "lines"), (Editype::Csv, "lines"))
        .unwrap();
    assert_eq!(String::from_utf8(outputs[0].clone()).unwrap(), input);
}

#[test]
fn test_fixed_decimals_are_written_with_all_digits() {
    let engine = engine();
    let mut root = Node::root();
    root.append(Node::new("LINE").with_field("ARTICLE", "4711").with_field("PRICE", "12.3"));
    let bytes = engine.serialize(&mut root, Editype::Csv, "lines").unwrap();
    assert_eq!(String::from_utf8(bytes).unwrap(), "4711,,12.30\r\n");
}

#[test]
fn test_decimals_are_checked_on_input() {
    match engine().parse(b"4711,,12.3\r\n", Editype::Csv, "lines").unwrap_err() {
        Error::FieldErrors(errors) => {
            assert_eq!(errors[0].code, "F14");
            assert_eq!(errors[0].field.as_deref(), Some("PRICE"));
        }
        other => panic!("expected field errors, got {other:?}"),
    }
}

#[test]
fn test_too_many_fields() {
    match engine().parse(b"4711,a,1.00,extra\r\n", Editype::Csv, "lines").unwrap_err() {
        Error::FieldErrors(errors) => {
            assert_eq!(errors[0].code, "F19");
            assert_eq!(errors[0].position.map(|p| p.line), Some(1));
        }
        other => panic!("expected field errors, got {other:?}"),
    }
}

#[test]
fn test_lex_only() {
    let records = engine().lex(b"4711,a\r\n4712,b\r\n", Editype::Csv, "lines").unwrap();
    assert_eq!(records.len(), 2);
    let values: Vec<_> = records[1].field_values().collect();
    assert_eq!(values, vec!["LINE", "4712", "b"]);
}
