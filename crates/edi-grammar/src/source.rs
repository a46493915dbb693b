//! Grammar sources and providers
//!
//! A grammar source is a YAML or JSON document with the keys `syntax`,
//! `structure`, `recorddefs`, `nextmessage`, `nextmessage2` and
//! `nextmessageblock`. Fields in `recorddefs` use the compact list form
//! `[id, M|C, length, format]`, or `[id, M|C, [subfields...]]` for a
//! composite.

use crate::editype::Editype;
use crate::model::GrammarKind;
use crate::syntax::RawSyntax;
use crate::{Error, Result};
use edi_ir::{Lookup, Mpath};
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use tracing::{debug, trace};

/// Scalar or list as found in a compact field definition.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum RawValue {
    Int(i64),
    Float(f64),
    Text(String),
    List(Vec<RawValue>),
}

impl RawValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }
}

/// One step of a declarative mpath: field id to value, `null` is unbound.
pub type RawStep = BTreeMap<String, Option<String>>;

/// A lookup as written in a grammar source.
///
/// A string is a literal, a single map one mpath step, a list of maps a
/// multi-step mpath and a list of such lists a concatenation.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum RawLookup {
    Literal(String),
    Step(RawStep),
    Path(Vec<RawStep>),
    Concat(Vec<Vec<RawStep>>),
}

impl RawLookup {
    /// Convert to the runtime form.
    ///
    /// # Errors
    ///
    /// Fails when a step has no bound record id.
    pub fn to_lookup(&self) -> edi_ir::Result<Lookup> {
        Ok(match self {
            Self::Literal(value) => Lookup::Literal(value.clone()),
            Self::Step(step) => Lookup::Path(Mpath::from_maps(std::slice::from_ref(step))?),
            Self::Path(steps) => Lookup::Path(Mpath::from_maps(steps)?),
            Self::Concat(paths) => Lookup::Concat(
                paths
                    .iter()
                    .map(|steps| Mpath::from_maps(steps))
                    .collect::<edi_ir::Result<_>>()?,
            ),
        })
    }
}

/// An mpath as written in a grammar source: one step or a list of steps.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum RawMpath {
    Step(RawStep),
    Path(Vec<RawStep>),
}

impl RawMpath {
    /// # Errors
    ///
    /// Fails when a step has no bound record id.
    pub fn to_mpath(&self) -> edi_ir::Result<Mpath> {
        match self {
            Self::Step(step) => Mpath::from_maps(std::slice::from_ref(step)),
            Self::Path(steps) => Mpath::from_maps(steps),
        }
    }
}

/// A record position in the structure as written in a source.
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
pub struct RawStructureNode {
    #[serde(rename = "ID", alias = "id")]
    pub id: Option<String>,
    #[serde(rename = "MIN", alias = "min")]
    pub min: Option<i64>,
    #[serde(rename = "MAX", alias = "max")]
    pub max: Option<i64>,
    #[serde(rename = "LEVEL", alias = "level")]
    pub level: Option<Vec<RawStructureNode>>,
    #[serde(rename = "SUBTRANSLATION", alias = "subtranslation")]
    pub subtranslation: Option<RawLookup>,
    #[serde(rename = "QUERIES", alias = "queries", default)]
    pub queries: BTreeMap<String, RawLookup>,
}

/// A grammar document before checking.
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
pub struct GrammarSource {
    #[serde(default)]
    pub syntax: RawSyntax,
    pub structure: Option<Vec<RawStructureNode>>,
    pub recorddefs: Option<BTreeMap<String, Vec<RawValue>>>,
    pub nextmessage: Option<RawMpath>,
    pub nextmessage2: Option<RawMpath>,
    pub nextmessageblock: Option<RawLookup>,
}

impl GrammarSource {
    /// Parse a YAML document.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Source`] on malformed input.
    pub fn from_yaml(name: &str, yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml)
            .map_err(|e| Error::source(name, format!("YAML parse error: {e}")))
    }

    /// Parse a JSON document.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Source`] on malformed input.
    pub fn from_json(name: &str, json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| Error::source(name, format!("JSON parse error: {e}")))
    }

    /// Read a source file; the extension selects YAML or JSON.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Source`] when the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self> {
        let name = path.display().to_string();
        trace!("Loading grammar source from file: {:?}", path);
        let content = std::fs::read_to_string(path).map_err(|e| Error::source(&name, e.to_string()))?;
        if path
            .extension()
            .is_some_and(|e| e == "yaml" || e == "yml")
        {
            Self::from_yaml(&name, &content)
        } else {
            Self::from_json(&name, &content)
        }
    }
}

/// Where grammar sources come from.
pub trait GrammarProvider: Send + Sync {
    /// The source for `name`, or `None` when there is none.
    ///
    /// Message and envelope grammars share one namespace; partner grammars
    /// have their own.
    ///
    /// # Errors
    ///
    /// Fails when a source exists but cannot be read or parsed.
    fn load(&self, editype: Editype, name: &str, kind: GrammarKind) -> Result<Option<GrammarSource>>;
}

const EXTENSIONS: [&str; 3] = ["yaml", "yml", "json"];

/// Reads `<root>/<editype>/<name>.{yaml,yml,json}`, and
/// `<root>/partners/<editype>/<name>.*` for partner grammars. Roots are
/// searched in order.
#[derive(Debug, Clone)]
pub struct DirectoryProvider {
    roots: Vec<PathBuf>,
}

impl DirectoryProvider {
    pub fn new(roots: Vec<PathBuf>) -> Self {
        Self { roots }
    }

    fn candidates(&self, editype: Editype, name: &str, kind: GrammarKind) -> Vec<PathBuf> {
        let mut paths = Vec::new();
        for root in &self.roots {
            let dir = match kind {
                GrammarKind::Partner => root.join("partners").join(editype.as_str()),
                GrammarKind::Message | GrammarKind::Envelope => root.join(editype.as_str()),
            };
            for ext in EXTENSIONS {
                paths.push(dir.join(format!("{name}.{ext}")));
            }
        }
        paths
    }
}

impl GrammarProvider for DirectoryProvider {
    fn load(&self, editype: Editype, name: &str, kind: GrammarKind) -> Result<Option<GrammarSource>> {
        if name.is_empty() || name.contains(['/', '\\']) || name.starts_with('.') {
            return Err(Error::source(name, "grammar name is not a plain file name"));
        }
        for path in self.candidates(editype, name, kind) {
            if path.is_file() {
                debug!(editype = %editype, name, path = %path.display(), "found grammar source");
                return GrammarSource::from_file(&path).map(Some);
            }
        }
        trace!(editype = %editype, name, %kind, "no grammar source");
        Ok(None)
    }
}

/// Sources registered in memory, for tests and embedding.
#[derive(Debug, Default)]
pub struct MemoryProvider {
    sources: RwLock<HashMap<(Editype, String, bool), GrammarSource>>,
}

impl MemoryProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a message or envelope grammar.
    pub fn insert(&self, editype: Editype, name: impl Into<String>, source: GrammarSource) {
        self.put((editype, name.into(), false), source);
    }

    /// Register a partner grammar.
    pub fn insert_partner(&self, editype: Editype, name: impl Into<String>, source: GrammarSource) {
        self.put((editype, name.into(), true), source);
    }

    /// Parse and register a YAML message or envelope grammar.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Source`] on malformed YAML.
    pub fn insert_yaml(&self, editype: Editype, name: &str, yaml: &str) -> Result<()> {
        let source = GrammarSource::from_yaml(name, yaml)?;
        self.insert(editype, name, source);
        Ok(())
    }

    fn put(&self, key: (Editype, String, bool), source: GrammarSource) {
        let mut sources = match self.sources.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        sources.insert(key, source);
    }
}

impl GrammarProvider for MemoryProvider {
    fn load(&self, editype: Editype, name: &str, kind: GrammarKind) -> Result<Option<GrammarSource>> {
        let sources = match self.sources.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let key = (editype, name.to_string(), kind == GrammarKind::Partner);
        Ok(sources.get(&key).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ORDERS: &str = r"
syntax:
  charset: UNOC
structure:
  - ID: UNH
    MIN: 1
    MAX: 1
    QUERIES:
      reference: {BOTSID: UNH, '0062': null}
    LEVEL:
      - {ID: BGM, MIN: 1, MAX: 1}
recorddefs:
  UNH:
    - [BOTSID, M, 3, AN]
    - ['0062', M, 14, AN]
    - [S009, M, [['0065', M, 6, AN], ['0052', M, 3, AN]]]
  BGM:
    - [BOTSID, M, 3, AN]
    - ['1004', C, [1, 35], AN]
nextmessage: [{BOTSID: UNH}]
";

    #[test]
    fn yaml_source_shapes() {
        let source = GrammarSource::from_yaml("orders", ORDERS).unwrap();
        assert_eq!(source.syntax.charset.as_deref(), Some("UNOC"));
        let structure = source.structure.unwrap();
        assert_eq!(structure[0].id.as_deref(), Some("UNH"));
        assert!(matches!(
            structure[0].queries.get("reference"),
            Some(RawLookup::Step(_))
        ));
        let recorddefs = source.recorddefs.unwrap();
        assert!(matches!(
            &recorddefs["UNH"][2],
            RawValue::List(items) if items.len() == 3
        ));
        assert!(matches!(source.nextmessage, Some(RawMpath::Path(ref p)) if p.len() == 1));
    }

    #[test]
    fn lookups_convert() {
        let lookup: RawLookup = serde_yaml::from_str(
            "[[{BOTSID: UNH, '0065': null}], [{BOTSID: UNH, '0052': null}]]",
        )
        .unwrap();
        assert!(matches!(lookup.to_lookup().unwrap(), Lookup::Concat(paths) if paths.len() == 2));
        let literal: RawLookup = serde_yaml::from_str("'ORDERS'").unwrap();
        assert_eq!(literal.to_lookup().unwrap(), Lookup::Literal("ORDERS".to_string()));
        let unbound_id: RawLookup = serde_yaml::from_str("{BOTSID: null}").unwrap();
        assert!(unbound_id.to_lookup().is_err());
    }

    #[test]
    fn directory_provider_finds_yaml_and_partner_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("edifact")).unwrap();
        std::fs::create_dir_all(dir.path().join("partners/edifact")).unwrap();
        std::fs::write(dir.path().join("edifact/ORDERS.yaml"), ORDERS).unwrap();
        std::fs::write(dir.path().join("partners/edifact/ACME.json"), r#"{"syntax": {"charset": "UNOB"}}"#).unwrap();

        let provider = DirectoryProvider::new(vec![dir.path().to_path_buf()]);
        assert!(provider.load(Editype::Edifact, "ORDERS", GrammarKind::Message).unwrap().is_some());
        assert!(provider.load(Editype::Edifact, "INVOIC", GrammarKind::Message).unwrap().is_none());
        let partner = provider
            .load(Editype::Edifact, "ACME", GrammarKind::Partner)
            .unwrap()
            .unwrap();
        assert_eq!(partner.syntax.charset.as_deref(), Some("UNOB"));
        assert!(provider.load(Editype::Edifact, "../x", GrammarKind::Message).is_err());
    }

    #[test]
    fn malformed_source_is_a_source_error() {
        let error = GrammarSource::from_yaml("bad", "structure: {").unwrap_err();
        assert!(matches!(error, Error::Source { .. }));
    }
}
