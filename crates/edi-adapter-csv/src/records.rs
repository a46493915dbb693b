//! Record options applied to lexed CSV records

use crate::{Error, Result};
use edi_grammar::{NoBotsid, Syntax};
use edi_ir::{LexedRecord, LexedToken, TokenKind};
use tracing::debug;

/// Drop header lines and put a type marker in front of every record.
///
/// With `noBOTSID: true` records carry no type marker and `root_id` (the id
/// of the single record definition) is inserted. With a column number the
/// marker is moved from that column to the front.
///
/// # Errors
///
/// Fails when a record is too short to hold the configured marker column.
pub fn apply_record_options(records: &mut Vec<LexedRecord>, syntax: &Syntax, root_id: &str) -> Result<()> {
    let skip = syntax.skip_first_lines.min(records.len());
    if skip > 0 {
        records.drain(..skip);
        debug!(skipped = skip, "skipped csv header lines");
    }
    match syntax.no_botsid {
        NoBotsid::Flag(false) => {}
        NoBotsid::Flag(true) => {
            for record in records.iter_mut() {
                let (line, column) = record
                    .position()
                    .map_or((0, 0), |position| (position.line, position.column));
                record
                    .tokens
                    .insert(0, LexedToken::new(root_id, TokenKind::Field, line, column));
            }
        }
        NoBotsid::Column(column) => {
            for record in records.iter_mut() {
                move_tag_to_front(record, column)?;
            }
        }
    }
    Ok(())
}

fn move_tag_to_front(record: &mut LexedRecord, column: usize) -> Result<()> {
    let index = record
        .tokens
        .iter()
        .enumerate()
        .filter(|(_, t)| t.kind == TokenKind::Field)
        .nth(column)
        .map(|(i, _)| i);
    let Some(index) = index else {
        let line = record.position().map_or(0, |p| p.line);
        return Err(Error::MissingTag { line, column });
    };
    let tag = record.tokens.remove(index);
    record.tokens.insert(0, tag);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(line: usize, values: &[&str]) -> LexedRecord {
        LexedRecord::new(
            values
                .iter()
                .enumerate()
                .map(|(i, v)| LexedToken::new(*v, TokenKind::Field, line, i + 1))
                .collect(),
        )
    }

    #[test]
    fn test_skip_header_lines() {
        let mut records = vec![record(1, &["id", "qty"]), record(2, &["ORD", "5"])];
        let mut syntax = Syntax::default();
        syntax.skip_first_lines = 1;
        apply_record_options(&mut records, &syntax, "ORD").unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].id(), Some("ORD"));

        syntax.skip_first_lines = 5;
        apply_record_options(&mut records, &syntax, "ORD").unwrap();
        assert!(records.is_empty());
    }

    #[test]
    fn test_insert_missing_type_marker() {
        let mut records = vec![record(3, &["4711", "5"])];
        let mut syntax = Syntax::default();
        syntax.no_botsid = NoBotsid::Flag(true);
        apply_record_options(&mut records, &syntax, "LINE").unwrap();
        let values: Vec<_> = records[0].field_values().collect();
        assert_eq!(values, vec!["LINE", "4711", "5"]);
        assert_eq!(records[0].tokens[0].line, 3);
    }

    #[test]
    fn test_type_marker_from_column() {
        let mut records = vec![record(1, &["4711", "HDR", "5"])];
        let mut syntax = Syntax::default();
        syntax.no_botsid = NoBotsid::Column(1);
        apply_record_options(&mut records, &syntax, "ignored").unwrap();
        let values: Vec<_> = records[0].field_values().collect();
        assert_eq!(values, vec!["HDR", "4711", "5"]);

        let mut short = vec![record(7, &["4711"])];
        let error = apply_record_options(&mut short, &syntax, "ignored").unwrap_err();
        assert_eq!(error, Error::MissingTag { line: 7, column: 1 });
    }
}
