//! Per-editype defaults and format tables

use crate::model::{Align, BaseFormat};
use crate::syntax::{ForceQuote, Syntax};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// The family of data formats a grammar belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Editype {
    Edifact,
    X12,
    Tradacoms,
    Csv,
    Fixed,
    Xml,
    Json,
}

impl Editype {
    pub const ALL: [Editype; 7] = [
        Editype::Edifact,
        Editype::X12,
        Editype::Tradacoms,
        Editype::Csv,
        Editype::Fixed,
        Editype::Xml,
        Editype::Json,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Edifact => "edifact",
            Self::X12 => "x12",
            Self::Tradacoms => "tradacoms",
            Self::Csv => "csv",
            Self::Fixed => "fixed",
            Self::Xml => "xml",
            Self::Json => "json",
        }
    }

    /// Records are identified by position rather than by separators.
    pub fn is_fixed(self) -> bool {
        self == Self::Fixed
    }

    /// Tree formats: records are nested objects, not lexed lines.
    pub fn is_tree(self) -> bool {
        matches!(self, Self::Xml | Self::Json)
    }

    pub fn rules(self) -> EditypeRules {
        EditypeRules::for_editype(self)
    }
}

impl fmt::Display for Editype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Editype {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Editype::ALL
            .into_iter()
            .find(|e| e.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown editype \"{s}\""))
    }
}

/// What a grammar format code maps to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FormatSpec {
    pub base: BaseFormat,
    pub align: Align,
    /// Implied decimals, for codes that carry them (`N2`)
    pub decimals: Option<usize>,
}

impl FormatSpec {
    fn new(base: BaseFormat) -> Self {
        Self {
            base,
            align: Align::Default,
            decimals: None,
        }
    }

    fn aligned(base: BaseFormat, align: Align) -> Self {
        Self {
            base,
            align,
            decimals: None,
        }
    }
}

/// Defaults and format table of one editype.
#[derive(Debug, Clone)]
pub struct EditypeRules {
    pub editype: Editype,
    pub syntax: Syntax,
    pub formats: BTreeMap<&'static str, FormatSpec>,
    /// A record definition needs at least this many fields
    pub min_fields: usize,
}

fn s(value: &str) -> String {
    value.to_string()
}

fn extras(pairs: &[(&str, &str)]) -> BTreeMap<String, serde_json::Value> {
    pairs
        .iter()
        .map(|(k, v)| ((*k).to_string(), serde_json::Value::String((*v).to_string())))
        .collect()
}

fn generic_formats() -> BTreeMap<&'static str, FormatSpec> {
    use BaseFormat::{Alphanumeric, Date, FixedDecimal, FloatDecimal, ImplicitDecimal, Time};
    BTreeMap::from([
        ("A", FormatSpec::new(Alphanumeric)),
        ("AN", FormatSpec::new(Alphanumeric)),
        ("D", FormatSpec::new(Date)),
        ("DT", FormatSpec::new(Date)),
        ("T", FormatSpec::new(Time)),
        ("TM", FormatSpec::new(Time)),
        ("N", FormatSpec::new(FixedDecimal)),
        ("R", FormatSpec::new(FloatDecimal)),
        ("I", FormatSpec::new(ImplicitDecimal)),
    ])
}

fn fixed_formats() -> BTreeMap<&'static str, FormatSpec> {
    use BaseFormat::{Alphanumeric, FixedDecimal, FloatDecimal};
    let mut formats = generic_formats();
    formats.insert("AR", FormatSpec::aligned(Alphanumeric, Align::Right));
    formats.insert("NL", FormatSpec::aligned(FixedDecimal, Align::Left));
    formats.insert("NR", FormatSpec::aligned(FixedDecimal, Align::Right));
    formats.insert("RL", FormatSpec::aligned(FloatDecimal, Align::Left));
    formats.insert("RR", FormatSpec::aligned(FloatDecimal, Align::Right));
    formats
}

fn edifact_formats() -> BTreeMap<&'static str, FormatSpec> {
    BTreeMap::from([
        ("A", FormatSpec::new(BaseFormat::Alphanumeric)),
        ("AN", FormatSpec::new(BaseFormat::Alphanumeric)),
        ("N", FormatSpec::new(BaseFormat::FloatDecimal)),
    ])
}

const X12_IMPLIED: [&str; 10] = ["N0", "N1", "N2", "N3", "N4", "N5", "N6", "N7", "N8", "N9"];

fn x12_formats() -> BTreeMap<&'static str, FormatSpec> {
    let mut formats = BTreeMap::from([
        ("AN", FormatSpec::new(BaseFormat::Alphanumeric)),
        ("B", FormatSpec::new(BaseFormat::Alphanumeric)),
        ("ID", FormatSpec::new(BaseFormat::Alphanumeric)),
        ("DT", FormatSpec::new(BaseFormat::Date)),
        ("TM", FormatSpec::new(BaseFormat::Time)),
        ("R", FormatSpec::new(BaseFormat::FloatDecimal)),
        (
            "N",
            FormatSpec {
                decimals: Some(0),
                ..FormatSpec::new(BaseFormat::ImplicitDecimal)
            },
        ),
    ]);
    for (digits, code) in X12_IMPLIED.into_iter().enumerate() {
        formats.insert(
            code,
            FormatSpec {
                decimals: Some(digits),
                ..FormatSpec::new(BaseFormat::ImplicitDecimal)
            },
        );
    }
    formats
}

fn tradacoms_formats() -> BTreeMap<&'static str, FormatSpec> {
    BTreeMap::from([
        ("X", FormatSpec::new(BaseFormat::Alphanumeric)),
        ("9", FormatSpec::new(BaseFormat::FloatDecimal)),
        ("9V9", FormatSpec::new(BaseFormat::ImplicitDecimal)),
    ])
}

impl EditypeRules {
    pub fn for_editype(editype: Editype) -> Self {
        let (syntax, formats) = match editype {
            Editype::Edifact => (edifact_syntax(), edifact_formats()),
            Editype::X12 => (x12_syntax(), x12_formats()),
            Editype::Tradacoms => (tradacoms_syntax(), tradacoms_formats()),
            Editype::Csv => (csv_syntax(), generic_formats()),
            Editype::Fixed => (fixed_syntax(), fixed_formats()),
            Editype::Xml => (xml_syntax(), generic_formats()),
            Editype::Json => (json_syntax(), generic_formats()),
        };
        Self {
            editype,
            syntax,
            formats,
            min_fields: if editype.is_tree() { 1 } else { 2 },
        }
    }

    pub fn format(&self, code: &str) -> Option<FormatSpec> {
        self.formats.get(code).copied()
    }
}

fn edifact_syntax() -> Syntax {
    Syntax {
        add_crlf_after_record_sep: s("\r\n"),
        charset: s("UNOA"),
        envelope: s("edifact"),
        escape: s("?"),
        field_sep: s("+"),
        record_sep: s("'"),
        repeat_sep: s("*"),
        sfield_sep: s(":"),
        skip_char: s("\r\n"),
        version: s("3"),
        strip_field_sep: true,
        length_numeric_bare: true,
        extra: extras(&[
            ("UNB.S001.0080", ""),
            ("UNB.S001.0133", ""),
            ("UNB.S002.0007", "14"),
            ("UNB.S002.0008", ""),
            ("UNB.S002.0042", ""),
            ("UNB.S003.0007", "14"),
            ("UNB.S003.0014", ""),
            ("UNB.S003.0046", ""),
            ("UNB.S005.0022", ""),
            ("UNB.S005.0025", ""),
            ("UNB.0026", ""),
            ("UNB.0029", ""),
            ("UNB.0031", ""),
            ("UNB.0032", ""),
            ("UNB.0035", "0"),
        ]),
        ..Syntax::default()
    }
}

fn x12_syntax() -> Syntax {
    Syntax {
        add_crlf_after_record_sep: s("\r\n"),
        charset: s("us-ascii"),
        envelope: s("x12"),
        field_sep: s("*"),
        record_sep: s("~"),
        replace_char: Some(String::new()),
        repeat_sep: s("^"),
        sfield_sep: s(">"),
        skip_char: s("\r\n"),
        version: s("00403"),
        strip_field_sep: true,
        length_numeric_bare: true,
        extra: extras(&[
            ("ISA01", "00"),
            ("ISA02", "          "),
            ("ISA03", "00"),
            ("ISA04", "          "),
            ("ISA05", "01"),
            ("ISA07", "01"),
            ("ISA11", "U"),
            ("ISA14", "0"),
            ("ISA15", "P"),
            ("GS07", "X"),
            ("functionalgroup", "XX"),
        ]),
        ..Syntax::default()
    }
}

fn tradacoms_syntax() -> Syntax {
    Syntax {
        add_crlf_after_record_sep: s("\r\n"),
        charset: s("us-ascii"),
        envelope: s("tradacoms"),
        escape: s("?"),
        field_sep: s("+"),
        record_sep: s("'"),
        record_tag_sep: s("="),
        sfield_sep: s(":"),
        skip_char: s("\r\n"),
        strip_field_sep: true,
        length_numeric_bare: true,
        extra: extras(&[
            ("STX.STDS1", "ANA"),
            ("STX.STDS2", "1"),
            ("STX.FROM.02", ""),
            ("STX.UNTO.02", ""),
            ("STX.APRF", ""),
            ("STX.PRCD", ""),
        ]),
        ..Syntax::default()
    }
}

fn csv_syntax() -> Syntax {
    Syntax {
        charset: s("utf-8"),
        field_sep: s(":"),
        quote_char: s("'"),
        force_quote: ForceQuote::Always,
        record_sep: s("\r\n"),
        pass_all: true,
        ..Syntax::default()
    }
}

fn fixed_syntax() -> Syntax {
    Syntax {
        charset: s("us-ascii"),
        record_sep: s("\r\n"),
        check_fixed_record_too_long: true,
        check_fixed_record_too_short: false,
        ..Syntax::default()
    }
}

fn xml_syntax() -> Syntax {
    Syntax {
        charset: s("utf-8"),
        attribute_marker: s("__"),
        version: s("1.0"),
        check_collision: false,
        ..Syntax::default()
    }
}

fn json_syntax() -> Syntax {
    Syntax {
        charset: s("utf-8"),
        named_root_object: true,
        default_root_id: s("ROOT"),
        check_collision: false,
        ..Syntax::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn editype_names_round_trip() {
        for editype in Editype::ALL {
            assert_eq!(editype.as_str().parse::<Editype>(), Ok(editype));
        }
        assert!("idoc".parse::<Editype>().is_err());
    }

    #[test]
    fn x12_implied_decimals_come_from_the_code() {
        let rules = Editype::X12.rules();
        assert_eq!(rules.format("N2").and_then(|f| f.decimals), Some(2));
        assert_eq!(rules.format("N").and_then(|f| f.decimals), Some(0));
        assert_eq!(rules.format("R").map(|f| f.base), Some(BaseFormat::FloatDecimal));
        assert!(rules.format("A").is_none());
    }

    #[test]
    fn edifact_numeric_is_floating() {
        let rules = Editype::Edifact.rules();
        assert_eq!(rules.format("N").map(|f| f.base), Some(BaseFormat::FloatDecimal));
        assert_eq!(rules.syntax.repeat_sep, "*");
        assert!(rules.syntax.length_numeric_bare);
        assert_eq!(rules.min_fields, 2);
    }

    #[test]
    fn fixed_alignment_codes() {
        let rules = Editype::Fixed.rules();
        assert_eq!(rules.format("AR").map(|f| f.align), Some(Align::Right));
        assert_eq!(rules.format("NL").map(|f| f.align), Some(Align::Left));
        assert!(rules.syntax.check_fixed_record_too_long);
    }

    #[test]
    fn tree_formats_allow_single_field_records() {
        assert_eq!(Editype::Json.rules().min_fields, 1);
        assert!(!Editype::Xml.rules().syntax.check_collision);
    }
}
