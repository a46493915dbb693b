//! Engine configuration options

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

/// How mpaths handed to [`crate::Engine::query`] are checked
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MpathCheckLevel {
    /// Use the mpath as given (default)
    #[default]
    Off,
    /// Reject mpaths naming records or fields the grammar does not know
    Grammar,
}

/// Configuration for the translation engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Directories searched for `<editype>/<name>.{yaml,yml,json}` grammars
    pub grammar_paths: Vec<PathBuf>,
    /// Reject whitespace between records, double record separators and
    /// alphanumeric repetition separators (default: false)
    pub strict_syntax_check: bool,
    /// Checking of mpath queries (default: off)
    pub mpath_check: MpathCheckLevel,
    /// Character set used instead of the grammar's for files that do not
    /// declare their own
    pub default_charset: Option<String>,
    /// Run envelope checks after parsing (default: true)
    pub check_envelope: bool,
    /// Run the message checker after parsing (default: true)
    pub check_message: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            grammar_paths: vec![PathBuf::from("grammars")],
            strict_syntax_check: false,
            mpath_check: MpathCheckLevel::Off,
            default_charset: None,
            check_envelope: true,
            check_message: true,
        }
    }
}

impl EngineConfig {
    /// Load configuration from a YAML or JSON file, chosen by extension.
    ///
    /// # Errors
    ///
    /// Fails when the file cannot be read, has another extension, or does
    /// not parse.
    pub fn from_path(path: &Path) -> Result<Self> {
        let shown = path.display().to_string();
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::io("read config", &shown, e.to_string()))?;
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase);
        let config = match extension.as_deref() {
            Some("yaml" | "yml") => Self::from_yaml_str(&content),
            Some("json") => Self::from_json_str(&content),
            _ => Err(Error::io(
                "read config",
                &shown,
                "expected a .yaml, .yml or .json file",
            )),
        }
        .map_err(|e| match e {
            Error::Io { message, .. } => Error::io("read config", &shown, message),
            other => other,
        })?;
        debug!(path = %shown, "loaded engine configuration");
        Ok(config)
    }

    /// Parse YAML configuration.
    ///
    /// # Errors
    ///
    /// Fails on malformed YAML or unknown option values.
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml).map_err(|e| Error::io("parse config", "<yaml>", e.to_string()))
    }

    /// Parse JSON configuration.
    ///
    /// # Errors
    ///
    /// Fails on malformed JSON or unknown option values.
    pub fn from_json_str(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| Error::io("parse config", "<json>", e.to_string()))
    }

    /// Replace the grammar search paths
    #[must_use]
    pub fn with_grammar_paths(mut self, paths: Vec<PathBuf>) -> Self {
        self.grammar_paths = paths;
        self
    }

    /// Enable or disable strict syntax checking
    #[must_use]
    pub fn strict(mut self, strict: bool) -> Self {
        self.strict_syntax_check = strict;
        self
    }

    /// Set the mpath checking level
    #[must_use]
    pub fn with_mpath_check(mut self, level: MpathCheckLevel) -> Self {
        self.mpath_check = level;
        self
    }

    /// Set the fallback character set
    #[must_use]
    pub fn with_default_charset(mut self, charset: impl Into<String>) -> Self {
        self.default_charset = Some(charset.into());
        self
    }

    /// Enable or disable envelope checks
    #[must_use]
    pub fn check_envelope(mut self, enabled: bool) -> Self {
        self.check_envelope = enabled;
        self
    }

    /// Enable or disable the message checker
    #[must_use]
    pub fn check_message(mut self, enabled: bool) -> Self {
        self.check_message = enabled;
        self
    }
}
