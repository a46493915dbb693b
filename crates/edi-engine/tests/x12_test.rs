//! Integration tests for X12 sniffing and header information

use std::sync::Arc;

use edi_engine::{Engine, EngineConfig};
use edi_grammar::{Editype, MemoryProvider};

const ENVELOPE: &str = r"
structure:
  - ID: ISA
    MIN: 1
    MAX: 1
    LEVEL:
      - { ID: IEA, MIN: 1, MAX: 1 }
recorddefs:
  ISA:
    - [BOTSID, M, 3, AN]
    - [ISA01, M, 2, AN]
    - [ISA02, M, 10, AN]
    - [ISA03, M, 2, AN]
    - [ISA04, M, 10, AN]
    - [ISA05, M, 2, AN]
    - [ISA06, M, 15, AN]
    - [ISA07, M, 2, AN]
    - [ISA08, M, 15, AN]
    - [ISA09, M, 6, DT]
    - [ISA10, M, 4, TM]
    - [ISA11, M, 1, AN]
    - [ISA12, M, 5, AN]
    - [ISA13, M, 9, N0]
    - [ISA14, M, 1, AN]
    - [ISA15, M, 1, AN]
    - [ISA16, M, 1, AN]
  IEA:
    - [BOTSID, M, 3, AN]
    - [IEA01, M, 5, N0]
    - [IEA02, M, 9, N0]
";

const ISA: &str = "ISA*00*          *00*          *ZZ*SENDER         *ZZ*RECEIVER       *210101*1200*U*00401*000000001*0*P*>~";

fn engine() -> Engine {
    let provider = Arc::new(MemoryProvider::new());
    provider.insert_yaml(Editype::X12, "x12", ENVELOPE).unwrap();
    Engine::with_provider(EngineConfig::default(), provider)
}

#[test]
fn test_header_info_from_isa() {
    let text = format!("{ISA}IEA*0*000000001~");
    let metadata = engine().header_info(text.as_bytes(), Editype::X12, "x12").unwrap();
    assert_eq!(metadata.sender.as_deref(), Some("SENDER"));
    assert_eq!(metadata.receiver.as_deref(), Some("RECEIVER"));
    assert_eq!(metadata.reference.as_deref(), Some("000000001"));
}

#[test]
fn test_lex_uses_sniffed_separators() {
    let text = format!("{ISA}\r\nIEA*0*000000001~\r\n");
    let records = engine().lex(text.as_bytes(), Editype::X12, "x12").unwrap();
    assert_eq!(records.len(), 2);
    assert_eq!(records[1].id(), Some("IEA"));
    assert_eq!(records[1].tokens[2].value, "000000001");
}

#[test]
fn test_not_an_interchange() {
    let error = engine().lex(b"ISA*00*", Editype::X12, "x12").unwrap_err();
    assert_eq!(error.code(), Some("A62"));
}
