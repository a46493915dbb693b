//! mpath criteria and lookups
//!
//! An mpath is an ordered list of [`Criteria`], one per tree level. Each
//! criteria names the record type (`BOTSID`), the occurrence index
//! (`BOTSIDnr`, default `"1"`) and any number of field selectors.
//!
//! The textual form used on the command line separates steps with `/`:
//!
//! ```text
//! UNB/UNH[0062=?]
//! STX/MHD#2[TYPE.0065=INVOIC,MSRF=?]
//! ```
//!
//! `?` marks an unbound selector (the value being asked for).
#![allow(clippy::must_use_candidate)]
#![allow(clippy::return_self_not_must_use)]

use crate::{Error, Result};
use std::collections::BTreeMap;
use std::fmt;
use std::ops::Deref;
use std::str::FromStr;

/// Field id of the record type marker.
pub const TYPE_MARKER: &str = "BOTSID";

/// Key naming the occurrence index in criteria maps.
pub const OCCURRENCE_KEY: &str = "BOTSIDnr";

/// Occurrence index used when none is given.
pub const DEFAULT_OCCURRENCE: &str = "1";

/// Selector for one field in a criteria
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selector {
    /// Field must carry exactly this value
    Value(String),

    /// Field must be present; its value is requested
    Unbound,
}

/// One step of an mpath
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Criteria {
    /// Record type marker
    pub id: String,

    /// Occurrence index
    pub occurrence: String,

    /// Field selectors
    pub fields: BTreeMap<String, Selector>,
}

impl Criteria {
    /// Criteria matching records of type `id`
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            occurrence: DEFAULT_OCCURRENCE.to_string(),
            fields: BTreeMap::new(),
        }
    }

    /// Require a field value
    pub fn with(mut self, field: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields
            .insert(field.into(), Selector::Value(value.into()));
        self
    }

    /// Request a field value
    pub fn unbound(mut self, field: impl Into<String>) -> Self {
        self.fields.insert(field.into(), Selector::Unbound);
        self
    }

    /// Set the occurrence index
    pub fn nr(mut self, occurrence: impl Into<String>) -> Self {
        self.occurrence = occurrence.into();
        self
    }

    /// Build a criteria from a declarative map where `None` is unbound.
    ///
    /// # Errors
    ///
    /// Fails when the map has no type marker or the type marker is unbound.
    pub fn from_map(map: &BTreeMap<String, Option<String>>) -> Result<Self> {
        let Some(Some(id)) = map.get(TYPE_MARKER) else {
            return Err(Error::mpath_format(
                format!("{map:?}"),
                format!("section without bound \"{TYPE_MARKER}\""),
            ));
        };
        let mut criteria = Criteria::new(id.clone());
        for (key, value) in map {
            match (key.as_str(), value) {
                (TYPE_MARKER, _) => {}
                (OCCURRENCE_KEY, Some(nr)) => criteria.occurrence.clone_from(nr),
                (OCCURRENCE_KEY, None) => {
                    return Err(Error::mpath_format(
                        criteria.to_string(),
                        format!("\"{OCCURRENCE_KEY}\" can not be unbound"),
                    ));
                }
                (_, Some(v)) => {
                    criteria.fields.insert(key.clone(), Selector::Value(v.clone()));
                }
                (_, None) => {
                    criteria.fields.insert(key.clone(), Selector::Unbound);
                }
            }
        }
        Ok(criteria)
    }

    /// Number of unbound selectors
    pub fn unbound_count(&self) -> usize {
        self.fields
            .values()
            .filter(|s| matches!(s, Selector::Unbound))
            .count()
    }

    /// Id of the first unbound selector
    pub fn unbound_field(&self) -> Option<&str> {
        self.fields
            .iter()
            .find(|(_, s)| matches!(s, Selector::Unbound))
            .map(|(k, _)| k.as_str())
    }

    /// Copy with every bound value trimmed
    pub(crate) fn stripped(&self) -> Self {
        let mut copy = self.clone();
        copy.id = copy.id.trim().to_string();
        for selector in copy.fields.values_mut() {
            if let Selector::Value(v) = selector {
                *v = v.trim().to_string();
            }
        }
        copy
    }
}

impl fmt::Display for Criteria {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.id)?;
        if self.occurrence != DEFAULT_OCCURRENCE {
            write!(f, "#{}", self.occurrence)?;
        }
        if !self.fields.is_empty() {
            let parts: Vec<String> = self
                .fields
                .iter()
                .map(|(k, s)| match s {
                    Selector::Value(v) => format!("{k}={v}"),
                    Selector::Unbound => format!("{k}=?"),
                })
                .collect();
            write!(f, "[{}]", parts.join(","))?;
        }
        Ok(())
    }
}

impl FromStr for Criteria {
    type Err = Error;

    fn from_str(step: &str) -> Result<Self> {
        let step = step.trim();
        let (head, body) = match step.find('[') {
            Some(open) => {
                let Some(inner) = step[open + 1..].strip_suffix(']') else {
                    return Err(Error::mpath_format(step, "unclosed '['"));
                };
                (&step[..open], Some(inner))
            }
            None => (step, None),
        };
        let (id, occurrence) = match head.split_once('#') {
            Some((id, nr)) => (id, Some(nr)),
            None => (head, None),
        };
        if id.is_empty() {
            return Err(Error::mpath_format(step, "empty record type"));
        }
        let mut criteria = Criteria::new(id);
        if let Some(nr) = occurrence {
            criteria.occurrence = nr.to_string();
        }
        for pair in body.into_iter().flat_map(|b| b.split(',')) {
            if pair.trim().is_empty() {
                continue;
            }
            let Some((key, value)) = pair.split_once('=') else {
                return Err(Error::mpath_format(step, format!("expected key=value in '{pair}'")));
            };
            let selector = if value == "?" {
                Selector::Unbound
            } else {
                Selector::Value(value.to_string())
            };
            criteria.fields.insert(key.trim().to_string(), selector);
        }
        Ok(criteria)
    }
}

/// An ordered sequence of criteria
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Mpath(Vec<Criteria>);

impl Mpath {
    /// Create an mpath from its steps
    pub fn new(steps: Vec<Criteria>) -> Self {
        Self(steps)
    }

    /// Build from declarative maps (see [`Criteria::from_map`]).
    ///
    /// # Errors
    ///
    /// Fails when any step lacks a bound type marker.
    pub fn from_maps(maps: &[BTreeMap<String, Option<String>>]) -> Result<Self> {
        maps.iter()
            .map(Criteria::from_map)
            .collect::<Result<Vec<_>>>()
            .map(Self)
    }

    /// Steps of this mpath
    pub fn steps(&self) -> &[Criteria] {
        &self.0
    }
}

impl Deref for Mpath {
    type Target = [Criteria];

    fn deref(&self) -> &[Criteria] {
        &self.0
    }
}

impl From<Vec<Criteria>> for Mpath {
    fn from(steps: Vec<Criteria>) -> Self {
        Self(steps)
    }
}

impl fmt::Display for Mpath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&display_path(&self.0))
    }
}

impl FromStr for Mpath {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let mut steps = Vec::new();
        let mut depth = 0usize;
        let mut start = 0usize;
        for (i, c) in s.char_indices() {
            match c {
                '[' => depth += 1,
                ']' => depth = depth.saturating_sub(1),
                '/' if depth == 0 => {
                    steps.push(s[start..i].parse::<Criteria>()?);
                    start = i + 1;
                }
                _ => {}
            }
        }
        steps.push(s[start..].parse::<Criteria>()?);
        Ok(Self(steps))
    }
}

/// Render a slice of criteria in textual mpath form.
pub fn display_path(steps: &[Criteria]) -> String {
    steps
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("/")
}

/// A value lookup against a node: literal, single mpath, or concatenation.
///
/// Used for sub-message type detection, grammar-declared queries and the
/// block split criterion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup {
    /// Fixed value
    Literal(String),

    /// Value of the unbound selector of one mpath
    Path(Mpath),

    /// Stripped results of several mpaths, joined; misses are skipped
    Concat(Vec<Mpath>),
}

impl fmt::Display for Lookup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Literal(value) => f.write_str(value),
            Self::Path(mpath) => write!(f, "{mpath}"),
            Self::Concat(mpaths) => {
                let parts: Vec<String> = mpaths.iter().map(ToString::to_string).collect();
                f.write_str(&parts.join(" + "))
            }
        }
    }
}
