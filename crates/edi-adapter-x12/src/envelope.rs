//! X12 envelope checks (ISA/IEA, GS/GE, ST/SE)

use crate::Result;
use edi_ir::{Criteria, DocumentMetadata, FieldError, LexedRecord, Node};
use tracing::debug;

/// Check every interchange in the parsed tree.
///
/// Control numbers in trailers must equal those in headers; trailer counts
/// must match the number of groups, transaction sets and segments.
///
/// # Errors
///
/// Only fails on an internal mpath error; envelope findings are returned.
pub fn check_envelope(root: &Node) -> Result<Vec<FieldError>> {
    let mut errors = Vec::new();
    let isa = [Criteria::new("ISA")];
    let isa_gs = [Criteria::new("ISA"), Criteria::new("GS")];
    let gs_st = [Criteria::new("GS"), Criteria::new("ST")];

    for top in root.top_level() {
        for interchange in top.get_loop(&isa)? {
            debug!("checking x12 interchange envelope");
            let header = interchange.get(&[Criteria::new("ISA").unbound("ISA13")])?;
            let trailer = interchange.get(&[Criteria::new("ISA"), Criteria::new("IEA").unbound("IEA02")])?;
            if header != trailer {
                errors.push(FieldError::new(
                    "E13",
                    format!(
                        "ISA-reference is \"{}\"; should be equal to IEA-reference \"{}\".",
                        header.unwrap_or_default(),
                        trailer.unwrap_or_default()
                    ),
                ));
            }
            let count = interchange.get(&[Criteria::new("ISA"), Criteria::new("IEA").unbound("IEA01")])?;
            let groups = interchange.count_occurrences(&isa_gs)?;
            check_count(&mut errors, count, groups, ("E14", "E15"), "Groupcount in IEA-IEA01", |count| {
                format!("Groupcount in IEA-IEA01 is {count}; should be equal to number of groups {groups}.")
            });

            for group in interchange.get_loop(&isa_gs)? {
                let header = group.get(&[Criteria::new("GS").unbound("GS06")])?;
                let trailer = group.get(&[Criteria::new("GS"), Criteria::new("GE").unbound("GE02")])?;
                if header != trailer {
                    errors.push(FieldError::new(
                        "E16",
                        format!(
                            "GS-reference is \"{}\"; should be equal to GE-reference \"{}\".",
                            header.unwrap_or_default(),
                            trailer.unwrap_or_default()
                        ),
                    ));
                }
                let count = group.get(&[Criteria::new("GS"), Criteria::new("GE").unbound("GE01")])?;
                let messages = group.children.len().saturating_sub(1);
                check_count(&mut errors, count, messages, ("E17", "E18"), "Messagecount in GE-GE01", |count| {
                    format!("Messagecount in GE-GE01 is {count}; should be equal to number of messages {messages}.")
                });

                for message in group.get_loop(&gs_st)? {
                    check_transaction_set(&mut errors, message)?;
                }
            }
        }
    }
    Ok(errors)
}

fn check_transaction_set(errors: &mut Vec<FieldError>, message: &Node) -> Result<()> {
    let header = message.get(&[Criteria::new("ST").unbound("ST02")])?;
    let trailer = message.get(&[Criteria::new("ST"), Criteria::new("SE").unbound("SE02")])?;
    if header != trailer {
        errors.push(FieldError::new(
            "E19",
            format!(
                "ST-reference is \"{}\"; should be equal to SE-reference \"{}\".",
                header.unwrap_or_default(),
                trailer.unwrap_or_default()
            ),
        ));
    }
    let count = message.get(&[Criteria::new("ST"), Criteria::new("SE").unbound("SE01")])?;
    let segments = message.count_records();
    check_count(errors, count, segments, ("E20", "E21"), "Segmentcount in SE-SE01", |count| {
        format!("Segmentcount in SE-SE01 is {count}; should be equal to number of segments {segments}.")
    });
    Ok(())
}

fn check_count(
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
        Err(_) => errors.push(FieldError::new(codes.1, format!("{what} is invalid: \"{found}\"."))),
    }
}

/// Recover sender, receiver and control number from the first ISA record.
///
/// ISA has no composites, so tokens are counted regardless of kind.
pub fn retrieve_info(records: &[LexedRecord], metadata: &mut DocumentMetadata) {
    let Some(isa) = records.iter().find(|r| r.id() == Some("ISA")) else {
        return;
    };
    let value = |index: usize| isa.tokens.get(index).map(|t| t.value.trim().to_string());
    if let Some(sender) = value(6) {
        metadata.sender = Some(sender);
    }
    if let Some(receiver) = value(8) {
        metadata.receiver = Some(receiver);
    }
    if let Some(reference) = value(13) {
        metadata.reference = Some(reference);
    }
}
