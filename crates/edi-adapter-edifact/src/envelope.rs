//! EDIFACT envelope checks (UNB/UNZ, UNG/UNE, UNH/UNT)
//!
//! Trailer references must equal header references and trailer counts must
//! match what is actually in the envelope. Findings are collected; they do
//! not stop processing.

use crate::Result;
use edi_ir::{Criteria, DocumentMetadata, FieldError, LexedRecord, Node, TokenKind};
use tracing::debug;

/// Check every interchange in the parsed tree.
///
/// # Errors
///
/// Only fails on an internal mpath error; envelope findings are returned.
pub fn check_envelope(root: &Node) -> Result<Vec<FieldError>> {
    let mut errors = Vec::new();
    let unb = [Criteria::new("UNB")];
    let unb_unz_reference = [Criteria::new("UNB"), Criteria::new("UNZ").unbound("0020")];
    let unb_unz_count = [Criteria::new("UNB"), Criteria::new("UNZ").unbound("0036")];
    let unb_unh = [Criteria::new("UNB"), Criteria::new("UNH")];
    let unb_ung = [Criteria::new("UNB"), Criteria::new("UNG")];
    let ung_une_reference = [Criteria::new("UNG"), Criteria::new("UNE").unbound("0048")];
    let ung_une_count = [Criteria::new("UNG"), Criteria::new("UNE").unbound("0060")];
    let ung_unh = [Criteria::new("UNG"), Criteria::new("UNH")];

    for top in root.top_level() {
        for interchange in top.get_loop(&unb)? {
            debug!("checking edifact interchange envelope");
            let header = interchange.get(&[Criteria::new("UNB").unbound("0020")])?;
            let trailer = interchange.get(&unb_unz_reference)?;
            if let Some((header, trailer)) = differing(header, trailer) {
                errors.push(FieldError::new(
                    "E01",
                    format!("UNB-reference is \"{header}\"; should be equal to UNZ-reference \"{trailer}\"."),
                ));
            }
            let count = interchange.get(&unb_unz_count)?;
            let messages = interchange.children.len().saturating_sub(1);
            check_count(&mut errors, count, messages, ("E02", "E03"), "Count of messages in UNZ", |count| {
                format!("Count of messages in UNZ is {count}; should be equal to number of messages {messages}.")
            });

            for message in interchange.get_loop(&unb_unh)? {
                check_message(&mut errors, message, ("E04", "E05", "E06"))?;
            }
            for group in interchange.get_loop(&unb_ung)? {
                let header = group.get(&[Criteria::new("UNG").unbound("0048")])?;
                let trailer = group.get(&ung_une_reference)?;
                if let Some((header, trailer)) = differing(header, trailer) {
                    errors.push(FieldError::new(
                        "E07",
                        format!("UNG-reference is \"{header}\"; should be equal to UNE-reference \"{trailer}\"."),
                    ));
                }
                let count = group.get(&ung_une_count)?;
                let groups = group.children.len().saturating_sub(1);
                check_count(&mut errors, count, groups, ("E08", "E09"), "Groupcount in UNE", |count| {
                    format!("Groupcount in UNE is {count}; should be equal to number of groups {groups}.")
                });
                for message in group.get_loop(&ung_unh)? {
                    check_message(&mut errors, message, ("E10", "E11", "E12"))?;
                }
            }
        }
    }
    Ok(errors)
}

fn check_message(
    errors: &mut Vec<FieldError>,
    message: &Node,
    codes: (&'static str, &'static str, &'static str),
) -> Result<()> {
    let header = message.get(&[Criteria::new("UNH").unbound("0062")])?;
    let trailer = message.get(&[Criteria::new("UNH"), Criteria::new("UNT").unbound("0062")])?;
    if let Some((header, trailer)) = differing(header, trailer) {
        errors.push(FieldError::new(
            codes.0,
            format!("UNH-reference is \"{header}\"; should be equal to UNT-reference \"{trailer}\"."),
        ));
    }
    let count = message.get(&[Criteria::new("UNH"), Criteria::new("UNT").unbound("0074")])?;
    let segments = message.count_records();
    check_count(errors, count, segments, (codes.1, codes.2), "Count of segments in UNT", |count| {
        format!("Segmentcount in UNT is {count}; should be equal to number of segments {segments}.")
    });
    Ok(())
}

/// Both references present, non-empty and different.
fn differing(header: Option<String>, trailer: Option<String>) -> Option<(String, String)> {
    match (header, trailer) {
        (Some(h), Some(t)) if !h.is_empty() && !t.is_empty() && h != t => Some((h, t)),
        _ => None,
    }
}

/// Compare a trailer count with the actual count: first code on mismatch,
/// second when the count is missing or not a number.
pub(crate) fn check_count(
    errors: &mut Vec<FieldError>,
    found: Option<String>,
    actual: usize,
    codes: (&'static str, &'static str),
    what: &str,
    mismatch: impl FnOnce(usize) -> String,
) {
    let found = found.unwrap_or_default();
    match found.trim().parse::<usize>() {
        Ok(count) if count == actual => {}
        Ok(count) => errors.push(FieldError::new(codes.0, mismatch(count))),
        Err(_) => errors.push(FieldError::new(
            codes.1,
            format!("{what} is invalid: \"{found}\"."),
        )),
    }
}

/// Recover sender, receiver and reference from the first UNB record.
///
/// Works on lexed records so the information is available even when the
/// file does not parse.
pub fn retrieve_info(records: &[LexedRecord], metadata: &mut DocumentMetadata) {
    let Some(unb) = records.iter().find(|r| r.id() == Some("UNB")) else {
        return;
    };
    let fields = unb.tokens.iter().filter(|t| t.kind == TokenKind::Field);
    for (index, token) in fields.enumerate() {
        match index + 1 {
            3 => metadata.sender = Some(token.value.clone()),
            4 => metadata.receiver = Some(token.value.clone()),
            6 => {
                metadata.reference = Some(token.value.clone());
                return;
            }
            _ => {}
        }
    }
}
