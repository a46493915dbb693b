//! Tradacoms envelope checks (STX/END, MHD/MTR)
//!
//! Tradacoms uses the EDIFACT separator model without a UNA, so there is no
//! sniffing; only the envelope needs checking after parsing.

use crate::envelope::check_count;
use crate::Result;
use edi_ir::{Criteria, FieldError, Node, Queries};
use tracing::debug;

/// Check every STX envelope and copy the type of its first message into
/// the queries of the STX record.
///
/// # Errors
///
/// Only fails on an internal mpath error; envelope findings are returned.
pub fn check_envelope(root: &mut Node) -> Result<Vec<FieldError>> {
    let mut errors = Vec::new();
    let stx_end_count = [Criteria::new("STX"), Criteria::new("END").unbound("NMST")];
    let stx_mhd = [Criteria::new("STX"), Criteria::new("MHD")];
    let mhd_mtr_count = [Criteria::new("MHD"), Criteria::new("MTR").unbound("NOSG")];

    for stx in root.top_level_mut() {
        if stx.id() != Some("STX") {
            continue;
        }
        debug!("checking tradacoms envelope");
        let count = stx.get(&stx_end_count)?;
        let messages = stx.children.len().saturating_sub(1);
        check_count(&mut errors, count, messages, ("E22", "E23"), "Count of messages in END", |count| {
            format!("Count in END is {count}; should be equal to number of messages {messages}.")
        });

        let mut first_type = None;
        for mhd in stx.get_loop(&stx_mhd)? {
            if first_type.is_none() {
                first_type = mhd.queries().get("messagetype").cloned();
            }
            let count = mhd.get(&mhd_mtr_count)?;
            let segments = mhd.count_records();
            check_count(&mut errors, count, segments, ("E24", "E25"), "Count of segments in MTR", |count| {
                format!("Count in MTR is {count}; should be equal to number of segments {segments}.")
            });
        }
        if let Some(messagetype) = first_type {
            let mut queries = Queries::new();
            queries.insert("messagetype".to_string(), messagetype);
            stx.update_queries(&queries);
        }
    }
    Ok(errors)
}
