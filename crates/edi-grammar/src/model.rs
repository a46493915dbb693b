//! Compiled grammar model

#![allow(clippy::must_use_candidate)]

use crate::editype::Editype;
use crate::syntax::{RawSyntax, Syntax};
use edi_ir::{display_path, Criteria, Lookup, Mpath, MpathCheck, OCCURRENCE_KEY};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Internal format a grammar format code maps to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum BaseFormat {
    /// `A`
    Alphanumeric,
    /// `D`: `YYMMDD` or `CCYYMMDD`
    Date,
    /// `T`: `HHMM`, `HHMMSS` with optional fraction digits
    Time,
    /// `N`: fixed number of decimals
    FixedDecimal,
    /// `R`: any number of decimals
    FloatDecimal,
    /// `I`: decimals implied by the grammar, no decimal mark
    ImplicitDecimal,
}

impl BaseFormat {
    pub fn is_numeric(self) -> bool {
        matches!(
            self,
            Self::FixedDecimal | Self::FloatDecimal | Self::ImplicitDecimal
        )
    }

    /// One letter code used in messages.
    pub fn code(self) -> char {
        match self {
            Self::Alphanumeric => 'A',
            Self::Date => 'D',
            Self::Time => 'T',
            Self::FixedDecimal => 'N',
            Self::FloatDecimal => 'R',
            Self::ImplicitDecimal => 'I',
        }
    }
}

/// Padding direction for fixed-width output.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
pub enum Align {
    /// Alphanumerics left, numerics zero filled
    #[default]
    Default,
    Left,
    Right,
}

/// One field, or one composite with its subfields.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldDescriptor {
    pub id: String,
    pub mandatory: bool,
    /// 1 for a non repeating field
    pub max_repeat: usize,
    pub length: usize,
    pub min_length: usize,
    /// Format code as written in the grammar (`AN`, `N2`, `9V9`)
    pub format: String,
    pub base: BaseFormat,
    pub align: Align,
    pub decimals: usize,
    /// Present for a composite; its own length and format are unused
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subfields: Option<Vec<FieldDescriptor>>,
}

impl FieldDescriptor {
    pub fn is_composite(&self) -> bool {
        self.subfields.is_some()
    }

    pub fn is_repeating(&self) -> bool {
        self.max_repeat > 1
    }

    /// Subfields of a composite; empty for a plain field.
    pub fn subfields(&self) -> &[FieldDescriptor] {
        self.subfields.as_deref().unwrap_or(&[])
    }

    /// True when `key` names this field, this composite or one of its
    /// subfields.
    pub fn answers_to(&self, key: &str) -> bool {
        self.id == key || self.subfields().iter().any(|sub| sub.id == key)
    }
}

/// One record position in the structure tree.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecordStructureNode {
    pub id: String,
    pub min: usize,
    pub max: usize,
    /// Record ids from the root down to and including this record
    pub path: Vec<String>,
    /// Distinguishes same-id records within one level ("1", "2", ...)
    pub occurrence: String,
    pub fields: Arc<[FieldDescriptor]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub level: Option<Vec<RecordStructureNode>>,
    #[serde(skip)]
    pub subtranslation: Option<Lookup>,
    #[serde(skip)]
    pub queries: BTreeMap<String, Lookup>,
    /// Sum of field lengths, for fixed records
    pub fixed_record_length: usize,
}

impl RecordStructureNode {
    /// Nested records; empty for a leaf.
    pub fn children(&self) -> &[RecordStructureNode] {
        self.level.as_deref().unwrap_or(&[])
    }

    pub fn has_level(&self) -> bool {
        self.level.is_some()
    }

    /// Field, composite or subfield named `id`.
    pub fn field(&self, id: &str) -> Option<&FieldDescriptor> {
        self.fields.iter().find_map(|field| {
            if field.id == id {
                Some(field)
            } else {
                field.subfields().iter().find(|sub| sub.id == id)
            }
        })
    }

    /// Path in `A/B/C` form for messages.
    pub fn display_path(&self) -> String {
        self.path.join("/")
    }

    fn matches(&self, criteria: &Criteria) -> bool {
        self.id == criteria.id && self.occurrence == criteria.occurrence
    }

    fn knows_key(&self, key: &str) -> bool {
        key == OCCURRENCE_KEY || self.fields.iter().any(|f| f.answers_to(key))
    }
}

/// Which grammar to produce for a name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum GrammarKind {
    /// The message grammar with envelope syntax folded in
    Message,
    /// The envelope grammar named by the message's syntax
    Envelope,
    /// Partner-specific syntax only; no structure
    Partner,
}

impl fmt::Display for GrammarKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Message => "message",
            Self::Envelope => "envelope",
            Self::Partner => "partner",
        })
    }
}

/// How an interchange is cut into messages.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SplitCriteria {
    /// One message per top-level child, or the whole tree
    #[default]
    None,
    /// Every node found with `first`; `second` is a further path searched
    /// from the root in a pass of its own
    NextMessage { first: Mpath, second: Option<Mpath> },
    /// Consecutive children with the same lookup value form one message
    NextMessageBlock(Lookup),
}

/// A checked, ready to use grammar.
#[derive(Debug, Clone)]
pub struct Grammar {
    pub editype: Editype,
    pub name: String,
    pub kind: GrammarKind,
    pub syntax: Syntax,
    /// Syntax as written in the source, without defaults
    pub declared_syntax: RawSyntax,
    /// `None` only for partner grammars
    pub root: Option<RecordStructureNode>,
    pub recorddefs: BTreeMap<String, Arc<[FieldDescriptor]>>,
    pub split: SplitCriteria,
    /// Byte span of the record tag in fixed records
    pub record_id_span: Option<(usize, usize)>,
}

impl Grammar {
    /// Root of the record structure.
    ///
    /// # Errors
    ///
    /// Fails for grammars compiled without structure.
    pub fn structure(&self) -> crate::Result<&RecordStructureNode> {
        self.root.as_ref().ok_or_else(|| {
            crate::Error::structure(&self.name, "root", "grammar has no structure")
        })
    }

    /// Structure node at the given id path, or `None`.
    pub fn find(&self, path: &[&str]) -> Option<&RecordStructureNode> {
        let (first, rest) = path.split_first()?;
        let mut node = self.root.as_ref().filter(|root| root.id == *first)?;
        for id in rest {
            node = node.children().iter().find(|child| child.id == *id)?;
        }
        Some(node)
    }
}

fn mpath_fits(level: &[RecordStructureNode], mpath: &[Criteria]) -> bool {
    let Some((step, rest)) = mpath.split_first() else {
        return true;
    };
    let Some(record) = level.iter().find(|r| r.matches(step)) else {
        return false;
    };
    if !step.fields.keys().all(|key| record.knows_key(key)) {
        return false;
    }
    if rest.is_empty() {
        return true;
    }
    record.has_level() && mpath_fits(record.children(), rest)
}

impl MpathCheck for Grammar {
    fn check_mpath(&self, mpath: &[Criteria]) -> edi_ir::Result<()> {
        let Some(root) = &self.root else {
            return Ok(());
        };
        if mpath_fits(std::slice::from_ref(root), mpath) {
            Ok(())
        } else {
            Err(edi_ir::Error::grammar(
                display_path(mpath),
                format!("not valid according to grammar \"{}\"", self.name),
            ))
        }
    }
}
