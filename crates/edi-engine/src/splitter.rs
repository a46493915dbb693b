//! Cutting a parsed interchange into messages

use crate::Result;
use edi_grammar::{Grammar, SplitCriteria};
use edi_ir::{Criteria, Lookup, Node, Queries, Record};
use tracing::{debug, info};

/// One message cut from an interchange
#[derive(Debug, Clone, PartialEq)]
pub struct SplitMessage {
    pub root: Node,
    /// 1-based position among the messages of the same pass
    pub number: usize,
    pub total: usize,
    /// Records of the envelope nodes above the message, outermost first
    pub envelope: Vec<Record>,
    /// Queries of the message node, including those copied down from the
    /// envelope
    pub queries: Queries,
}

/// Split `root` into messages as the grammar prescribes.
///
/// With `nextmessage`, every node matched by the path is a message; a
/// `nextmessage2` path is applied afterwards as a second pass with its own
/// numbering. With `nextmessageblock`, consecutive top-level records with
/// the same lookup value form one message. Otherwise the whole tree is one
/// message when the root has a record or the syntax sets `pass_all`, and
/// every top-level record is a message when not.
///
/// # Errors
///
/// Fails on a malformed split path or lookup.
pub fn split(root: &mut Node, grammar: &Grammar) -> Result<Vec<SplitMessage>> {
    let messages = match &grammar.split {
        SplitCriteria::NextMessage { first, second } => {
            let mut messages = by_path(root, first.steps())?;
            if let Some(second) = second {
                messages.extend(by_path(root, second.steps())?);
            }
            messages
        }
        SplitCriteria::NextMessageBlock(lookup) => by_block(root, lookup)?,
        SplitCriteria::None => whole(root, grammar.syntax.pass_all),
    };
    info!(grammar = %grammar.name, messages = messages.len(), "split interchange");
    Ok(messages)
}

fn by_path(root: &mut Node, mpath: &[Criteria]) -> Result<Vec<SplitMessage>> {
    root.process_queries(&Queries::new(), mpath.len());
    let mut found = Vec::new();
    for top in root.top_level() {
        found.extend(top.get_loop_with_path(mpath)?);
    }
    let total = found.len();
    debug!(total, "messages found by path");
    Ok(found
        .into_iter()
        .enumerate()
        .map(|(index, (ancestors, node))| SplitMessage {
            root: node.clone(),
            number: index + 1,
            total,
            envelope: ancestors.into_iter().map(|n| n.record.clone()).collect(),
            queries: node.queries().clone(),
        })
        .collect())
}

fn by_block(root: &Node, lookup: &Lookup) -> Result<Vec<SplitMessage>> {
    let mut blocks: Vec<(Option<String>, Node)> = Vec::new();
    for line in &root.children {
        let key = line.enhanced_get(lookup)?;
        match blocks.last_mut() {
            Some((previous, block)) if *previous == key => {
                block.append(line.clone());
            }
            _ => {
                let mut block = Node::root();
                block.append(line.clone());
                blocks.push((key, block));
            }
        }
    }
    let total = blocks.len();
    Ok(blocks
        .into_iter()
        .enumerate()
        .map(|(index, (_, block))| {
            let queries = block.children.last().map(|n| n.queries().clone()).unwrap_or_default();
            SplitMessage {
                root: block,
                number: index + 1,
                total,
                envelope: Vec::new(),
                queries,
            }
        })
        .collect())
}

fn whole(root: &Node, pass_all: bool) -> Vec<SplitMessage> {
    if root.has_record() || pass_all {
        return vec![SplitMessage {
            root: root.clone(),
            number: 1,
            total: 1,
            envelope: Vec::new(),
            queries: root.queries().clone(),
        }];
    }
    let total = root.children.len();
    root.children
        .iter()
        .enumerate()
        .map(|(index, child)| SplitMessage {
            root: child.clone(),
            number: index + 1,
            total,
            envelope: Vec::new(),
            queries: child.queries().clone(),
        })
        .collect()
}
