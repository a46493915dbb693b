//! Syntax parameters of a grammar
//!
//! [`RawSyntax`] is what a grammar source declares: every key optional, the
//! historical key names accepted as aliases. [`Syntax`] is the resolved set,
//! built from the editype defaults with one or more raw layers on top.

use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;

/// When the csv writer quotes a value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum ForceQuote {
    /// Only when the value contains a separator or the quote character
    #[default]
    Never,
    /// Every value
    Always,
    /// Alphanumeric values
    Alphanumeric,
}

impl TryFrom<u8> for ForceQuote {
    type Error = String;

    fn try_from(value: u8) -> std::result::Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Never),
            1 => Ok(Self::Always),
            2 => Ok(Self::Alphanumeric),
            other => Err(format!("forcequote must be 0, 1 or 2, not {other}")),
        }
    }
}

impl From<ForceQuote> for u8 {
    fn from(value: ForceQuote) -> Self {
        match value {
            ForceQuote::Never => 0,
            ForceQuote::Always => 1,
            ForceQuote::Alphanumeric => 2,
        }
    }
}

/// Records without a record tag (csv, fixed).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum NoBotsid {
    /// `true`: no tag at all, every record is the structure root record
    Flag(bool),
    /// The tag is found in this (zero based) column instead of the first
    Column(usize),
}

impl Default for NoBotsid {
    fn default() -> Self {
        Self::Flag(false)
    }
}

impl NoBotsid {
    /// Records carry no tag in the first position.
    pub fn is_set(self) -> bool {
        !matches!(self, Self::Flag(false))
    }
}

/// Leading lines to skip (csv headers).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum SkipFirstLine {
    Flag(bool),
    Lines(usize),
}

impl SkipFirstLine {
    fn lines(self) -> usize {
        match self {
            Self::Flag(true) => 1,
            Self::Flag(false) => 0,
            Self::Lines(n) => n,
        }
    }
}

/// Accept `version: 3` as well as `version: "3"`.
fn lenient_string<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Lenient {
        Text(String),
        Int(i64),
        Float(f64),
    }

    Ok(Option::<Lenient>::deserialize(deserializer)?.map(|v| match v {
        Lenient::Text(s) => s,
        Lenient::Int(i) => i.to_string(),
        Lenient::Float(f) => f.to_string(),
    }))
}

/// Syntax as declared in a grammar source.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct RawSyntax {
    pub charset: Option<String>,
    pub field_sep: Option<String>,
    pub sfield_sep: Option<String>,
    pub record_sep: Option<String>,
    pub record_tag_sep: Option<String>,
    #[serde(alias = "reserve")]
    pub repeat_sep: Option<String>,
    pub escape: Option<String>,
    pub quote_char: Option<String>,
    pub skip_char: Option<String>,
    #[serde(alias = "decimaal")]
    pub decimal: Option<String>,
    pub triad: Option<String>,
    #[serde(alias = "add_crlfafterrecord_sep")]
    pub add_crlf_after_record_sep: Option<String>,
    #[serde(alias = "forcequote")]
    pub force_quote: Option<ForceQuote>,
    pub envelope: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    pub version: Option<String>,
    #[serde(alias = "replacechar")]
    pub replace_char: Option<String>,
    pub wrap_length: Option<usize>,
    #[serde(alias = "checkcollision")]
    pub check_collision: Option<bool>,
    #[serde(alias = "stripfield_sep")]
    pub strip_field_sep: Option<bool>,
    #[serde(alias = "lengthnumericbare")]
    pub length_numeric_bare: Option<bool>,
    #[serde(alias = "noBOTSID")]
    pub no_botsid: Option<NoBotsid>,
    #[serde(alias = "skip_firstline")]
    pub skip_first_lines: Option<SkipFirstLine>,
    pub pass_all: Option<bool>,
    #[serde(alias = "allow_lastrecordnotclosedproperly")]
    pub allow_last_record_not_closed: Option<bool>,
    #[serde(alias = "checkfixedrecordtoolong")]
    pub check_fixed_record_too_long: Option<bool>,
    #[serde(alias = "checkfixedrecordtooshort")]
    pub check_fixed_record_too_short: Option<bool>,
    #[serde(alias = "checkunknownentities")]
    pub check_unknown_entities: Option<bool>,
    #[serde(alias = "forceUNA")]
    pub force_una: Option<bool>,
    #[serde(alias = "attributemarker")]
    pub attribute_marker: Option<String>,
    pub indented: Option<bool>,
    pub named_root_object: Option<bool>,
    #[serde(alias = "defaultBOTSIDroot")]
    pub default_root_id: Option<String>,

    /// Envelope header defaults (`UNB.S002.0007`, `ISA05`, ...) and any key
    /// not known above
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

/// Resolved syntax of a grammar.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Syntax {
    pub charset: String,
    pub field_sep: String,
    pub sfield_sep: String,
    pub record_sep: String,
    pub record_tag_sep: String,
    pub repeat_sep: String,
    pub escape: String,
    pub quote_char: String,
    pub skip_char: String,
    pub decimal: String,
    pub triad: String,
    pub add_crlf_after_record_sep: String,
    pub force_quote: ForceQuote,
    pub envelope: String,
    pub version: String,
    /// Substitute for separators found in x12 content; `None` makes that an error
    pub replace_char: Option<String>,
    pub wrap_length: usize,
    pub check_collision: bool,
    pub strip_field_sep: bool,
    pub length_numeric_bare: bool,
    pub no_botsid: NoBotsid,
    pub skip_first_lines: usize,
    pub pass_all: bool,
    pub allow_last_record_not_closed: bool,
    pub check_fixed_record_too_long: bool,
    pub check_fixed_record_too_short: bool,
    pub check_unknown_entities: bool,
    pub force_una: bool,
    pub attribute_marker: String,
    pub indented: bool,
    pub named_root_object: bool,
    pub default_root_id: String,
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl Default for Syntax {
    fn default() -> Self {
        Self {
            charset: "utf-8".to_string(),
            field_sep: String::new(),
            sfield_sep: String::new(),
            record_sep: String::new(),
            record_tag_sep: String::new(),
            repeat_sep: String::new(),
            escape: String::new(),
            quote_char: String::new(),
            skip_char: String::new(),
            decimal: ".".to_string(),
            triad: String::new(),
            add_crlf_after_record_sep: String::new(),
            force_quote: ForceQuote::Never,
            envelope: String::new(),
            version: String::new(),
            replace_char: None,
            wrap_length: 0,
            check_collision: true,
            strip_field_sep: false,
            length_numeric_bare: false,
            no_botsid: NoBotsid::default(),
            skip_first_lines: 0,
            pass_all: false,
            allow_last_record_not_closed: false,
            check_fixed_record_too_long: false,
            check_fixed_record_too_short: false,
            check_unknown_entities: true,
            force_una: false,
            attribute_marker: String::new(),
            indented: false,
            named_root_object: false,
            default_root_id: String::new(),
            extra: BTreeMap::new(),
        }
    }
}

macro_rules! overlay {
    ($target:ident, $raw:ident, clone: [$($c:ident),* $(,)?], copy: [$($p:ident),* $(,)?]) => {
        $(if let Some(v) = &$raw.$c { $target.$c = v.clone(); })*
        $(if let Some(v) = $raw.$p { $target.$p = v; })*
    };
}

impl Syntax {
    /// Apply the keys present in `raw` on top of `self`.
    pub fn overlay(&mut self, raw: &RawSyntax) {
        overlay!(self, raw,
            clone: [
                charset, field_sep, sfield_sep, record_sep, record_tag_sep, repeat_sep,
                escape, quote_char, skip_char, decimal, triad, add_crlf_after_record_sep,
                envelope, version, attribute_marker, default_root_id,
            ],
            copy: [
                force_quote, wrap_length, check_collision, strip_field_sep,
                length_numeric_bare, no_botsid, pass_all, allow_last_record_not_closed,
                check_fixed_record_too_long, check_fixed_record_too_short,
                check_unknown_entities, force_una, indented, named_root_object,
            ]
        );
        if let Some(replace) = &raw.replace_char {
            self.replace_char = Some(replace.clone());
        }
        if let Some(skip) = raw.skip_first_lines {
            self.skip_first_lines = skip.lines();
        }
        for (key, value) in &raw.extra {
            self.extra.insert(key.clone(), value.clone());
        }
    }

    /// Envelope default for `key` (`UNB.S002.0007`, `ISA05`), as text.
    pub fn extra_text(&self, key: &str) -> Option<String> {
        self.extra.get(key).map(|value| match value {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        })
    }

    /// Decimal mark as a char; `.` when unset.
    pub fn decimal_char(&self) -> char {
        self.decimal.chars().next().unwrap_or('.')
    }

    /// The version compared numerically, for `version >= 4` style checks.
    /// Non numeric versions compare as 0.
    pub fn version_number(&self) -> u32 {
        self.version.trim().parse().unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn historical_keys_are_accepted() {
        let raw: RawSyntax = serde_yaml::from_str(
            "decimaal: ','\nreserve: '*'\nforcequote: 2\nnoBOTSID: true\nskip_firstline: 2\nversion: 4\n",
        )
        .unwrap();
        assert_eq!(raw.decimal.as_deref(), Some(","));
        assert_eq!(raw.repeat_sep.as_deref(), Some("*"));
        assert_eq!(raw.force_quote, Some(ForceQuote::Alphanumeric));
        assert_eq!(raw.no_botsid, Some(NoBotsid::Flag(true)));
        assert_eq!(raw.skip_first_lines, Some(SkipFirstLine::Lines(2)));
        assert_eq!(raw.version.as_deref(), Some("4"));
        assert!(raw.extra.is_empty());
    }

    #[test]
    fn unknown_keys_land_in_extra() {
        let raw: RawSyntax =
            serde_json::from_str(r#"{"UNB.S002.0007": "14", "charset": "UNOC"}"#).unwrap();
        let mut syntax = Syntax::default();
        syntax.overlay(&raw);
        assert_eq!(syntax.charset, "UNOC");
        assert_eq!(syntax.extra_text("UNB.S002.0007").as_deref(), Some("14"));
    }

    #[test]
    fn overlay_keeps_undeclared_values() {
        let mut syntax = Syntax {
            field_sep: "+".to_string(),
            ..Syntax::default()
        };
        let raw = RawSyntax {
            record_sep: Some("~".to_string()),
            skip_first_lines: Some(SkipFirstLine::Flag(true)),
            ..RawSyntax::default()
        };
        syntax.overlay(&raw);
        assert_eq!(syntax.field_sep, "+");
        assert_eq!(syntax.record_sep, "~");
        assert_eq!(syntax.skip_first_lines, 1);
    }

    #[test]
    fn invalid_force_quote_is_rejected() {
        assert!(serde_yaml::from_str::<RawSyntax>("forcequote: 7").is_err());
    }

    #[test]
    fn no_botsid_column() {
        let raw: RawSyntax = serde_yaml::from_str("noBOTSID: 3").unwrap();
        assert_eq!(raw.no_botsid, Some(NoBotsid::Column(3)));
        assert!(NoBotsid::Column(3).is_set());
        assert!(!NoBotsid::Flag(false).is_set());
    }
}
