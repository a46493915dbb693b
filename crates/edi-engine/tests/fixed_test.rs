//! Integration tests for fixed-length record files

use std::sync::Arc;

use edi_engine::{Engine, EngineConfig};
use edi_grammar::{Editype, MemoryProvider};

const INVOICE: &str = r"
structure:
  - ID: HDR
    MIN: 1
    MAX: 1
    LEVEL:
      - { ID: LIN, MIN: 1, MAX: 99 }
recorddefs:
  HDR:
    - [BOTSID, M, 3, A]
    - [NUMBER, M, 6, A]
  LIN:
    - [BOTSID, M, 3, A]
    - [ARTICLE, M, 10, A]
    - [PRICE, C, 7.2, I]
";

const FILE: &str = "HDRPO0001\r\nLIN4711      0012345\r\nLIN4712      0000150\r\n";

fn engine() -> Engine {
    let provider = Arc::new(MemoryProvider::new());
    provider.insert_yaml(Editype::Fixed, "invoice", INVOICE).unwrap();
    provider
        .insert_yaml(
            Editype::Fixed,
            "invoice_strict",
            &format!("syntax: {{checkfixedrecordtooshort: true}}\n{INVOICE}"),
        )
        .unwrap();
    Engine::with_provider(EngineConfig::default(), provider)
}

fn price(text: Option<&str>) -> f64 {
    text.unwrap_or_default().parse().unwrap()
}

#[test]
fn test_implicit_decimals_are_read() {
    let document = engine().parse(FILE.as_bytes(), Editype::Fixed, "invoice").unwrap();
    let hdr = &document.root.top_level()[0];
    assert_eq!(hdr.text("NUMBER"), Some("PO0001"));
    assert_eq!(hdr.children.len(), 2);
    assert_eq!(hdr.children[0].text("ARTICLE"), Some("4711"));
    assert!((price(hdr.children[0].text("PRICE")) - 123.45).abs() < f64::EPSILON);
    assert!((price(hdr.children[1].text("PRICE")) - 1.5).abs() < f64::EPSILON);
}

#[test]
fn test_round_trip_keeps_layout() {
    let outputs = engine()
        .translate(FILE.as_bytes(), (Editype::Fixed, "invoice"), (Editype::Fixed, "invoice"))
        .unwrap();
    assert_eq!(outputs.len(), 1);
    assert_eq!(String::from_utf8(outputs[0].clone()).unwrap(), FILE);
}

#[test]
fn test_short_record() {
    let short = FILE.replace("0000150", "00150");
    let engine = engine();

    let document = engine.parse(short.as_bytes(), Editype::Fixed, "invoice").unwrap();
    let hdr = &document.root.top_level()[0];
    assert!((price(hdr.children[1].text("PRICE")) - 1.5).abs() < f64::EPSILON);

    let error = engine.parse(short.as_bytes(), Editype::Fixed, "invoice_strict").unwrap_err();
    assert_eq!(error.code(), Some("S52"));
    assert!(error.to_string().contains("line 3"), "{error}");
}

#[test]
fn test_long_record() {
    let long = FILE.replace("0000150", "0000150XX");
    let error = engine().parse(long.as_bytes(), Editype::Fixed, "invoice").unwrap_err();
    assert_eq!(error.code(), Some("S53"));
}

#[test]
fn test_unknown_record() {
    let text = FILE.replace("LIN4712", "XYZ4712");
    let error = engine().parse(text.as_bytes(), Editype::Fixed, "invoice").unwrap_err();
    assert_eq!(error.code(), Some("S50"));
}
