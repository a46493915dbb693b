//! Integration tests for EDIFACT interchanges through the engine

use std::sync::Arc;

use edi_engine::{Engine, EngineConfig, Error};
use edi_grammar::{Editype, MemoryProvider};
use edi_ir::DocumentMetadata;

const ENVELOPE: &str = r"
structure:
  - ID: UNB
    MIN: 1
    MAX: 1
    QUERIES:
      frompartner: {BOTSID: UNB, S002.0004: null}
      topartner: {BOTSID: UNB, S003.0010: null}
    LEVEL:
      - ID: UNH
        MIN: 1
        MAX: 9999
        SUBTRANSLATION: [[{BOTSID: UNH, S009.0065: null}], [{BOTSID: UNH, S009.0052: null}], [{BOTSID: UNH, S009.0054: null}]]
      - { ID: UNZ, MIN: 1, MAX: 1 }
recorddefs:
  UNB:
    - [BOTSID, M, 3, AN]
    - [S001, M, [[S001.0001, M, 4, AN], [S001.0002, M, 1, N]]]
    - [S002, M, [[S002.0004, M, 35, AN], [S002.0007, C, 4, AN]]]
    - [S003, M, [[S003.0010, M, 35, AN], [S003.0007, C, 4, AN]]]
    - [S004, M, [[S004.0017, M, 6, N], [S004.0019, M, 4, N]]]
    - ['0020', M, 14, AN]
  UNH:
    - [BOTSID, M, 3, AN]
    - ['0062', M, 14, AN]
    - [S009, M, [[S009.0065, M, 6, AN], [S009.0052, M, 3, AN], [S009.0054, M, 3, AN], [S009.0051, M, 2, AN]]]
  UNZ:
    - [BOTSID, M, 3, AN]
    - ['0036', M, 6, N]
    - ['0020', M, 14, AN]
nextmessage: [{BOTSID: UNB}, {BOTSID: UNH}]
";

const ORDERS: &str = r"
structure:
  - ID: UNH
    MIN: 1
    MAX: 1
    LEVEL:
      - { ID: BGM, MIN: 1, MAX: 1 }
      - ID: LIN
        MIN: 0
        MAX: 99
        LEVEL:
          - { ID: QTY, MIN: 0, MAX: 9 }
      - { ID: UNT, MIN: 1, MAX: 1 }
recorddefs:
  UNH:
    - [BOTSID, M, 3, AN]
    - ['0062', M, 14, AN]
    - [S009, M, [[S009.0065, M, 6, AN], [S009.0052, M, 3, AN], [S009.0054, M, 3, AN], [S009.0051, M, 2, AN]]]
  BGM:
    - [BOTSID, M, 3, AN]
    - ['1001', M, 3, AN]
    - ['1004', M, 35, AN]
  LIN:
    - [BOTSID, M, 3, AN]
    - ['1082', M, 6, AN]
  QTY:
    - [BOTSID, M, 3, AN]
    - [C186, M, [[C186.6063, M, 3, AN], [C186.6060, M, 15, N]]]
  UNT:
    - [BOTSID, M, 3, AN]
    - ['0074', M, 6, N]
    - ['0062', M, 14, AN]
";

const INTERCHANGE: &str = "UNA:+.? '\
UNB+UNOA:3+SENDER+RECEIVER+200101:1200+REF1'\
UNH+1+ORDERS:D:96A:UN'BGM+220+PO1'LIN+1'QTY+21:5'UNT+5+1'\
UNH+2+ORDERS:D:96A:UN'BGM+220+PO?+2'UNT+3+2'\
UNZ+2+REF1'";

fn engine() -> Engine {
    let provider = Arc::new(MemoryProvider::new());
    provider.insert_yaml(Editype::Edifact, "edifact", ENVELOPE).unwrap();
    provider.insert_yaml(Editype::Edifact, "ORDERSD96A", ORDERS).unwrap();
    Engine::with_provider(EngineConfig::default(), provider)
}

#[test]
fn test_interchange_metadata() {
    let document = engine().parse(INTERCHANGE.as_bytes(), Editype::Edifact, "edifact").unwrap();
    let metadata = &document.metadata;
    assert_eq!(metadata.sender.as_deref(), Some("SENDER"));
    assert_eq!(metadata.receiver.as_deref(), Some("RECEIVER"));
    assert_eq!(metadata.reference.as_deref(), Some("REF1"));
    assert_eq!(metadata.charset.as_deref(), Some("UNOA"));
    assert_eq!(metadata.record_count, 10);
}

#[test]
fn test_release_character_is_removed() {
    let mut document = engine().parse(INTERCHANGE.as_bytes(), Editype::Edifact, "edifact").unwrap();
    let found = engine()
        .query(&mut document, Editype::Edifact, "edifact", "UNB/UNH[0062=2]/BGM[1004=?]")
        .unwrap();
    assert_eq!(found.as_deref(), Some("PO+2"));
}

#[test]
fn test_split_into_messages() {
    let engine = engine();
    let mut document = engine.parse(INTERCHANGE.as_bytes(), Editype::Edifact, "edifact").unwrap();
    let messages = engine.split(&mut document, Editype::Edifact, "edifact").unwrap();
    assert_eq!(messages.len(), 2);

    let second = &messages[1];
    assert_eq!(second.metadata.message_number, Some(2));
    assert_eq!(second.metadata.total_messages, Some(2));
    assert_eq!(second.root.id(), Some("UNH"));
    assert_eq!(second.root.text("0062"), Some("2"));
    assert_eq!(second.metadata.attributes.get("messagetype").map(String::as_str), Some("ORDERSD96A"));
    assert_eq!(second.metadata.attributes.get("frompartner").map(String::as_str), Some("SENDER"));
    assert_eq!(second.metadata.attributes.get("topartner").map(String::as_str), Some("RECEIVER"));
}

#[test]
fn test_envelope_reference_mismatch() {
    let text = INTERCHANGE.replace("UNZ+2+REF1'", "UNZ+2+REF2'");
    match engine().parse(text.as_bytes(), Editype::Edifact, "edifact").unwrap_err() {
        Error::FieldErrors(errors) => {
            assert_eq!(errors.len(), 1, "{errors:?}");
            assert_eq!(errors[0].code, "E01");
            assert!(errors[0].message.contains("\"REF1\""));
        }
        other => panic!("expected envelope errors, got {other:?}"),
    }
}

#[test]
fn test_envelope_check_can_be_disabled() {
    let provider = Arc::new(MemoryProvider::new());
    provider.insert_yaml(Editype::Edifact, "edifact", ENVELOPE).unwrap();
    provider.insert_yaml(Editype::Edifact, "ORDERSD96A", ORDERS).unwrap();
    let engine = Engine::with_provider(EngineConfig::default().check_envelope(false), provider);
    let text = INTERCHANGE.replace("UNZ+2+REF1'", "UNZ+3+REF1'");
    assert!(engine.parse(text.as_bytes(), Editype::Edifact, "edifact").is_ok());
}

#[test]
fn test_segment_count_mismatch() {
    let text = INTERCHANGE.replace("UNT+5+1'", "UNT+4+1'");
    match engine().parse(text.as_bytes(), Editype::Edifact, "edifact").unwrap_err() {
        Error::FieldErrors(errors) => assert_eq!(errors[0].code, "E05"),
        other => panic!("expected envelope errors, got {other:?}"),
    }
}

#[test]
fn test_header_info_without_parse() {
    // The message type has no grammar; the header is still readable.
    let text = INTERCHANGE.replace("ORDERS:D:96A", "INVOIC:D:96A");
    let engine = engine();
    assert!(matches!(
        engine.parse(text.as_bytes(), Editype::Edifact, "edifact"),
        Err(Error::TranslationNotFound { .. })
    ));
    let metadata: DocumentMetadata = engine.header_info(text.as_bytes(), Editype::Edifact, "edifact").unwrap();
    assert_eq!(metadata.sender.as_deref(), Some("SENDER"));
    assert_eq!(metadata.reference.as_deref(), Some("REF1"));
}

#[test]
fn test_garbage_after_una() {
    let error = engine().parse(b"UNA:+", Editype::Edifact, "edifact").unwrap_err();
    assert_eq!(error.code(), Some("A53"));
}
