//! Ambiguity checks on the record structure
//!
//! A structure is ambiguous when a record, read from the input, could belong
//! to more than one position. Two shapes are detected:
//!
//! ```text
//! back collision         nested collision
//!   AAA (optional)         LIN (repeating group)
//!   BBB (optional)           QTY
//!   AAA                      LIN (optional)
//! ```
//!
//! Records with a fixed number of occurrences (`MIN == MAX`) and mandatory
//! records close the window in which a collision can happen.

use crate::model::RecordStructureNode;
use crate::{Error, Result};
use std::collections::HashMap;

/// Fail on a record id that can follow an optional record with the same id
/// on the same or a lower level.
///
/// # Errors
///
/// Returns [`Error::Collision`] naming the first offending record.
pub fn check_back_collision(grammar: &str, level: &[RecordStructureNode]) -> Result<()> {
    back_collision(grammar, level, Vec::new()).map(|_| ())
}

fn back_collision(
    grammar: &str,
    level: &[RecordStructureNode],
    mut open: Vec<String>,
) -> Result<(Vec<String>, bool)> {
    let mut header_is_safe = false;
    for record in level {
        if open.contains(&record.id) {
            return Err(Error::collision(grammar, "back", record.display_path()));
        }
        if record.min > 0 {
            header_is_safe = true;
            open = if record.min == record.max {
                Vec::new()
            } else {
                vec![record.id.clone()]
            };
        } else {
            open.push(record.id.clone());
        }
        if let Some(children) = &record.level {
            let inherited = if record.min == 1 && record.max == 1 {
                Vec::new()
            } else {
                vec![record.id.clone()]
            };
            let (from_children, child_safe) = back_collision(grammar, children, inherited)?;
            open.extend(from_children);
            if child_safe {
                if let Some(pos) = open.iter().position(|id| *id == record.id) {
                    open.remove(pos);
                }
            }
        }
    }
    Ok((open, header_is_safe))
}

/// Fail on an optional record nested inside a repeating group with the
/// same id, where it could also start the next occurrence of the group.
///
/// # Errors
///
/// Returns [`Error::Collision`] naming the first offending record.
pub fn check_nested_collision(grammar: &str, level: &[RecordStructureNode]) -> Result<()> {
    nested_collision(grammar, level, &[]).map(|_| ())
}

fn nested_collision(
    grammar: &str,
    level: &[RecordStructureNode],
    inherited: &[String],
) -> Result<bool> {
    let mut open: Vec<String> = inherited.to_vec();
    for record in level.iter().rev() {
        let safe_header = match &record.level {
            Some(children) if record.max == 1 => nested_collision(grammar, children, &open)?,
            Some(children) => {
                let mut with_self = open.clone();
                with_self.push(record.id.clone());
                nested_collision(grammar, children, &with_self)?
            }
            None => false,
        };
        if !(safe_header || record.min == record.max) && open.contains(&record.id) {
            return Err(Error::collision(grammar, "nesting", record.display_path()));
        }
        if record.min > 0 {
            open.clear();
        }
    }
    Ok(open.is_empty())
}

/// Number records sharing an id within one level: "1", "2", ...
pub fn assign_occurrences(level: &mut [RecordStructureNode]) {
    let mut seen: HashMap<String, usize> = HashMap::new();
    for record in level {
        let count = seen.entry(record.id.clone()).or_insert(0);
        *count += 1;
        record.occurrence = count.to_string();
        if let Some(children) = record.level.as_mut() {
            assign_occurrences(children);
        }
    }
}
