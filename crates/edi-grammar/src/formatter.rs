//! Field-level format checking and conversion
//!
//! Incoming values are checked against the field definition and converted
//! to the canonical form used in the node tree: `.` as decimal mark, no
//! triad separators, sign in front, implied decimals made explicit.
//! Outgoing values go the other way and are padded for fixed records.
//!
//! Problems never abort formatting; they are returned as [`FormatIssue`]s
//! next to the (possibly unconverted) value.

use crate::model::{Align, BaseFormat, FieldDescriptor};
use crate::syntax::Syntax;
use chrono::{NaiveDate, NaiveTime};
use regex::Regex;
use std::fmt;
use std::sync::OnceLock;

/// One problem found while formatting a value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormatIssue {
    /// Error code, `F05` and up
    pub code: &'static str,
    pub message: String,
}

impl FormatIssue {
    fn new(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for FormatIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

/// A formatted value plus what was wrong with it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Formatted {
    pub value: String,
    pub issues: Vec<FormatIssue>,
}

impl Formatted {
    fn new(value: String) -> Self {
        Self {
            value,
            issues: Vec::new(),
        }
    }

    fn issue(&mut self, code: &'static str, message: impl Into<String>) {
        self.issues.push(FormatIssue::new(code, message));
    }

    pub fn is_clean(&self) -> bool {
        self.issues.is_empty()
    }
}

/// Exact decimal: sign, coefficient digits and number of fraction digits.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Decimal {
    negative: bool,
    digits: Vec<u8>,
    scale: usize,
}

fn numeric_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"^([+-]?)([0-9]*)(?:\.([0-9]*))?$").ok())
        .as_ref()
}

impl Decimal {
    /// Parse `[+-]digits[.digits]`; at least one digit is required.
    fn parse(value: &str) -> Option<Self> {
        let captures = numeric_pattern()?.captures(value)?;
        let int = captures.get(2).map_or("", |m| m.as_str());
        let frac = captures.get(3).map_or("", |m| m.as_str());
        if int.is_empty() && frac.is_empty() {
            return None;
        }
        Some(Self {
            negative: captures.get(1).is_some_and(|m| m.as_str() == "-"),
            digits: int.bytes().chain(frac.bytes()).collect(),
            scale: frac.len(),
        })
    }

    /// Multiply by `10^places`.
    fn shift_left(mut self, places: usize) -> Self {
        if self.scale >= places {
            self.scale -= places;
        } else {
            self.digits
                .extend(std::iter::repeat_n(b'0', places - self.scale));
            self.scale = 0;
        }
        self
    }

    /// Divide by `10^places`.
    fn shift_right(mut self, places: usize) -> Self {
        self.scale += places;
        self
    }

    /// Round half to even to exactly `places` fraction digits.
    fn quantize(mut self, places: usize) -> Self {
        if self.scale <= places {
            self.digits
                .extend(std::iter::repeat_n(b'0', places - self.scale));
            self.scale = places;
            return self;
        }
        let drop = self.scale - places;
        while self.digits.len() < drop + 1 {
            self.digits.insert(0, b'0');
        }
        let keep = self.digits.len() - drop;
        let dropped = self.digits.split_off(keep);
        let first = dropped[0];
        let rest_nonzero = dropped[1..].iter().any(|&d| d != b'0');
        let last_odd = self.digits.last().is_some_and(|&d| (d - b'0') % 2 == 1);
        let round_up = first > b'5' || (first == b'5' && (rest_nonzero || last_odd));
        if round_up {
            let mut carry = true;
            for digit in self.digits.iter_mut().rev() {
                if *digit == b'9' {
                    *digit = b'0';
                } else {
                    *digit += 1;
                    carry = false;
                    break;
                }
            }
            if carry {
                self.digits.insert(0, b'1');
            }
        }
        self.scale = places;
        self
    }
}

impl fmt::Display for Decimal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut digits = self.digits.clone();
        while digits.len() <= self.scale {
            digits.insert(0, b'0');
        }
        let split = digits.len() - self.scale;
        let int = &digits[..split];
        let first_significant = int
            .iter()
            .position(|&d| d != b'0')
            .unwrap_or(int.len() - 1);
        if self.negative {
            f.write_str("-")?;
        }
        for &d in &int[first_significant..] {
            write!(f, "{}", char::from(d))?;
        }
        if self.scale > 0 {
            f.write_str(".")?;
            for &d in &digits[split..] {
                write!(f, "{}", char::from(d))?;
            }
        }
        Ok(())
    }
}

fn valid_date(value: &str) -> bool {
    if !value.bytes().all(|b| b.is_ascii_digit()) {
        return false;
    }
    let pattern = match value.len() {
        6 => "%y%m%d",
        8 => "%Y%m%d",
        _ => return false,
    };
    NaiveDate::parse_from_str(value, pattern).is_ok()
}

fn valid_time(value: &str, allow_fraction: bool) -> bool {
    if !value.bytes().all(|b| b.is_ascii_digit()) {
        return false;
    }
    match value.len() {
        4 => NaiveTime::parse_from_str(value, "%H%M").is_ok(),
        6 => NaiveTime::parse_from_str(value, "%H%M%S").is_ok(),
        7 | 8 if allow_fraction => NaiveTime::parse_from_str(&value[..6], "%H%M%S").is_ok(),
        _ => false,
    }
}

/// Pad with zeros to `width`, keeping a leading sign in front.
fn zfill(value: &str, width: usize) -> String {
    let len = value.chars().count();
    if len >= width {
        return value.to_string();
    }
    let zeros = "0".repeat(width - len);
    match value.strip_prefix(['-', '+']) {
        Some(rest) => format!("{}{zeros}{rest}", &value[..1]),
        None => format!("{zeros}{value}"),
    }
}

fn ljust(value: &str, width: usize) -> String {
    format!("{value:<width$}")
}

fn rjust(value: &str, width: usize) -> String {
    format!("{value:>width$}")
}

fn pad_numeric(value: &str, width: usize, align: Align) -> String {
    match align {
        Align::Left => ljust(value, width),
        Align::Right => rjust(value, width),
        Align::Default => zfill(value, width),
    }
}

/// Checks and converts field values for one syntax and record layout.
#[derive(Debug, Clone, Copy)]
pub struct FieldFormatter<'a> {
    syntax: &'a Syntax,
    fixed: bool,
}

impl<'a> FieldFormatter<'a> {
    /// `fixed` selects fixed-width behavior: no length checks on incoming
    /// values, padding on outgoing ones.
    pub fn new(syntax: &'a Syntax, fixed: bool) -> Self {
        Self { syntax, fixed }
    }

    /// Check and convert a value read from a file.
    pub fn incoming(&self, value: &str, field: &FieldDescriptor) -> Formatted {
        match field.base {
            BaseFormat::Alphanumeric => {
                let mut out = Formatted::new(value.to_string());
                if !self.fixed {
                    let len = value.chars().count();
                    if len > field.length {
                        out.issue("F05", format!("too big (max {}): \"{value}\"", field.length));
                    }
                    if len < field.min_length {
                        out.issue("F06", format!("too small (min {}): \"{value}\"", field.min_length));
                    }
                }
                out
            }
            BaseFormat::Date => {
                let mut out = Formatted::new(value.to_string());
                if !valid_date(value) {
                    out.issue("F07", format!("not a valid date: \"{value}\""));
                }
                out
            }
            BaseFormat::Time => {
                let mut out = Formatted::new(value.to_string());
                if !valid_time(value, true) {
                    out.issue("F08", format!("not a valid time: \"{value}\""));
                }
                out
            }
            BaseFormat::FixedDecimal | BaseFormat::FloatDecimal | BaseFormat::ImplicitDecimal => {
                self.incoming_numeric(value, field)
            }
        }
    }

    fn bare_length(&self, value: &str) -> usize {
        if self.syntax.length_numeric_bare {
            value
                .chars()
                .filter(|c| *c != '-' && *c != '+' && !self.syntax.decimal.contains(*c))
                .count()
        } else {
            value.chars().count()
        }
    }

    fn incoming_numeric(&self, value: &str, field: &FieldDescriptor) -> Formatted {
        let mut out = Formatted::new(value.to_string());
        if !self.fixed {
            let length = self.bare_length(value);
            if length > field.length {
                out.issue("F10", format!("too big (max {}): \"{value}\"", field.length));
            }
            if length < field.min_length {
                out.issue("F11", format!("too small (min {}): \"{value}\"", field.min_length));
            }
        }
        let mut canonical = match value.strip_suffix('-') {
            Some(rest) => format!("-{rest}"),
            None => value.to_string(),
        };
        if !self.syntax.triad.is_empty() {
            canonical = canonical.replace(self.syntax.triad.as_str(), "");
        }
        if !self.syntax.decimal.is_empty() {
            canonical = canonical.replacen(self.syntax.decimal.as_str(), ".", 1);
        }
        if canonical.contains(['E', 'e']) {
            out.issue("F09", format!("has non-numerical content (exponent): \"{canonical}\""));
            out.value = canonical;
            return out;
        }
        let written_decimals = canonical.split_once('.').map_or(0, |(_, frac)| frac.len());
        match field.base {
            BaseFormat::FloatDecimal => match Decimal::parse(&canonical) {
                Some(number) => out.value = number.to_string(),
                None => {
                    out.issue("F16", format!("has non-numerical content: \"{canonical}\""));
                    out.value = canonical;
                }
            },
            BaseFormat::FixedDecimal => {
                if written_decimals != field.decimals {
                    out.issue("F14", format!("has invalid nr of decimals: \"{canonical}\""));
                }
                match Decimal::parse(&canonical) {
                    Some(number) => out.value = number.to_string(),
                    None => {
                        out.issue("F15", format!("has non-numerical content: \"{canonical}\""));
                        out.value = canonical;
                    }
                }
            }
            _ => {
                if canonical.contains('.') {
                    out.issue(
                        "F12",
                        format!("has format \"I\" but contains decimal sign: \"{canonical}\""),
                    );
                    out.value = canonical;
                } else {
                    match Decimal::parse(&canonical) {
                        Some(number) => out.value = number.shift_right(field.decimals).to_string(),
                        None => {
                            out.issue("F13", format!("has non-numerical content: \"{canonical}\""));
                            out.value = canonical;
                        }
                    }
                }
            }
        }
        out
    }

    /// Check and convert a value from the node tree for writing.
    pub fn outgoing(&self, value: &str, field: &FieldDescriptor) -> Formatted {
        match field.base {
            BaseFormat::Alphanumeric => {
                let padded = if self.fixed {
                    match field.align {
                        Align::Right => rjust(value, field.min_length),
                        _ => ljust(value, field.min_length),
                    }
                } else {
                    value.to_string()
                };
                let mut out = Formatted::new(padded);
                let len = out.value.chars().count();
                if len > field.length {
                    out.issue("F20", format!("too big (max {}): \"{}\"", field.length, out.value));
                }
                if len < field.min_length {
                    out.issue("F21", format!("too small (min {}): \"{}\"", field.min_length, out.value));
                }
                out
            }
            BaseFormat::Date => {
                let mut out = Formatted::new(value.to_string());
                if !valid_date(value) {
                    out.issue("F22", format!("not a valid date: \"{value}\""));
                }
                Self::check_length(&mut out, field, ("F31", "F32"));
                out
            }
            BaseFormat::Time => {
                let mut out = Formatted::new(value.to_string());
                if !valid_time(value, false) {
                    out.issue("F23", format!("not a valid time: \"{value}\""));
                }
                Self::check_length(&mut out, field, ("F33", "F34"));
                out
            }
            BaseFormat::FixedDecimal | BaseFormat::FloatDecimal | BaseFormat::ImplicitDecimal => {
                self.outgoing_numeric(value, field)
            }
        }
    }

    fn check_length(out: &mut Formatted, field: &FieldDescriptor, codes: (&'static str, &'static str)) {
        let len = out.value.chars().count();
        if len > field.length {
            let message = format!("too big (max {}): \"{}\"", field.length, out.value);
            out.issue(codes.0, message);
        }
        if len < field.min_length {
            let message = format!("too small (min {}): \"{}\"", field.min_length, out.value);
            out.issue(codes.1, message);
        }
    }

    fn outgoing_numeric(&self, value: &str, field: &FieldDescriptor) -> Formatted {
        let mut out = Formatted::new(value.to_string());
        let bare = self.syntax.length_numeric_bare;
        let mut correction = 0;
        if bare && value.starts_with('-') {
            correction += 1;
        }
        let parsed = Decimal::parse(value.trim());
        match field.base {
            BaseFormat::FloatDecimal => {
                if bare && value.contains('.') {
                    correction += 1;
                }
                match parsed {
                    Some(number) => out.value = number.to_string(),
                    None => out.issue("F25", format!("numerical format not valid: \"{value}\"")),
                }
                out.value = pad_numeric(&out.value, field.min_length + correction, field.align);
                out.value = self.localize(&out.value);
            }
            BaseFormat::FixedDecimal => {
                if bare && field.decimals > 0 {
                    correction += 1;
                }
                match parsed {
                    Some(number) => out.value = number.quantize(field.decimals).to_string(),
                    None => out.issue("F26", format!("numerical format not valid: \"{value}\"")),
                }
                out.value = pad_numeric(&out.value, field.min_length + correction, field.align);
                out.value = self.localize(&out.value);
            }
            _ => {
                match parsed {
                    Some(number) => {
                        out.value = number.shift_left(field.decimals).quantize(0).to_string();
                    }
                    None => out.issue("F27", format!("numerical format not valid: \"{value}\"")),
                }
                out.value = zfill(&out.value, field.min_length + correction);
            }
        }
        if out.value.chars().count().saturating_sub(correction) > field.length {
            let message = format!("too big: \"{}\"", out.value);
            out.issue("F28", message);
        }
        out
    }

    fn localize(&self, value: &str) -> String {
        if self.syntax.decimal == "." || self.syntax.decimal.is_empty() {
            value.to_string()
        } else {
            value.replacen('.', &self.syntax.decimal, 1)
        }
    }

    /// Value written for a field that is absent from the node tree, when
    /// the syntax requires every field position to be filled.
    pub fn initial(&self, field: &FieldDescriptor) -> String {
        match field.base {
            BaseFormat::Alphanumeric | BaseFormat::Date | BaseFormat::Time => String::new(),
            BaseFormat::FloatDecimal | BaseFormat::ImplicitDecimal => zfill("0", field.min_length),
            BaseFormat::FixedDecimal => {
                let zero = Decimal::parse("0").map(|d| d.quantize(field.decimals).to_string());
                let zero = zero.unwrap_or_else(|| "0".to_string());
                self.localize(&zfill(&zero, field.min_length))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::editype::Editype;

    fn numeric(base: BaseFormat, length: usize, decimals: usize) -> FieldDescriptor {
        FieldDescriptor {
            id: "5004".to_string(),
            mandatory: false,
            max_repeat: 1,
            length,
            min_length: 0,
            format: base.code().to_string(),
            base,
            align: Align::Default,
            decimals,
            subfields: None,
        }
    }

    fn alpha(length: usize, min_length: usize) -> FieldDescriptor {
        FieldDescriptor {
            min_length,
            format: "AN".to_string(),
            ..numeric(BaseFormat::Alphanumeric, length, 0)
        }
    }

    #[test]
    fn implicit_decimals_both_ways() {
        let syntax = Editype::X12.rules().syntax;
        let formatter = FieldFormatter::new(&syntax, false);
        let field = numeric(BaseFormat::ImplicitDecimal, 10, 2);
        let read = formatter.incoming("12345", &field);
        assert!(read.is_clean());
        assert_eq!(read.value, "123.45");
        let written = formatter.outgoing("123.45", &field);
        assert!(written.is_clean());
        assert_eq!(written.value, "12345");
    }

    #[test]
    fn implicit_decimal_rejects_decimal_sign() {
        let syntax = Syntax::default();
        let formatter = FieldFormatter::new(&syntax, false);
        let read = formatter.incoming("12.5", &numeric(BaseFormat::ImplicitDecimal, 10, 2));
        assert_eq!(read.issues[0].code, "F12");
    }

    #[test]
    fn fixed_decimal_is_quantized_on_output() {
        let syntax = Syntax::default();
        let formatter = FieldFormatter::new(&syntax, false);
        let field = numeric(BaseFormat::FixedDecimal, 10, 2);
        assert_eq!(formatter.outgoing("12.3", &field).value, "12.30");
        assert_eq!(formatter.outgoing("0.125", &field).value, "0.12");
        assert_eq!(formatter.outgoing("0.135", &field).value, "0.14");
        assert_eq!(formatter.outgoing("99.999", &field).value, "100.00");
    }

    #[test]
    fn fixed_decimal_checks_decimal_count_on_input() {
        let syntax = Syntax::default();
        let formatter = FieldFormatter::new(&syntax, false);
        let read = formatter.incoming("12.3", &numeric(BaseFormat::FixedDecimal, 10, 2));
        assert_eq!(read.issues.len(), 1);
        assert_eq!(read.issues[0].code, "F14");
    }

    #[test]
    fn trailing_minus_triad_and_decimal_mark() {
        let syntax = Syntax {
            decimal: ",".to_string(),
            triad: ".".to_string(),
            ..Syntax::default()
        };
        let formatter = FieldFormatter::new(&syntax, false);
        let read = formatter.incoming("1.234,50-", &numeric(BaseFormat::FloatDecimal, 15, 0));
        assert!(read.is_clean(), "{:?}", read.issues);
        assert_eq!(read.value, "-1234.50");
    }

    #[test]
    fn bare_length_ignores_sign_and_mark() {
        let syntax = Editype::Edifact.rules().syntax;
        let formatter = FieldFormatter::new(&syntax, false);
        let field = numeric(BaseFormat::FloatDecimal, 3, 0);
        assert!(formatter.incoming("-1.25", &field).is_clean());
        assert_eq!(formatter.incoming("1.250", &field).issues[0].code, "F10");
    }

    #[test]
    fn exponent_is_rejected() {
        let syntax = Syntax::default();
        let formatter = FieldFormatter::new(&syntax, false);
        let read = formatter.incoming("1E3", &numeric(BaseFormat::FloatDecimal, 10, 0));
        assert_eq!(read.issues[0].code, "F09");
    }

    #[test]
    fn float_decimal_normalizes() {
        let syntax = Syntax::default();
        let formatter = FieldFormatter::new(&syntax, false);
        let field = numeric(BaseFormat::FloatDecimal, 10, 0);
        assert_eq!(formatter.incoming("+007.50", &field).value, "7.50");
        assert_eq!(formatter.incoming(".5", &field).value, "0.5");
        assert_eq!(formatter.incoming("abc", &field).issues[0].code, "F16");
    }

    #[test]
    fn dates_and_times() {
        let syntax = Syntax::default();
        let formatter = FieldFormatter::new(&syntax, false);
        let date = numeric(BaseFormat::Date, 8, 0);
        assert!(formatter.incoming("20240229", &date).is_clean());
        assert!(formatter.incoming("240229", &date).is_clean());
        assert_eq!(formatter.incoming("20230229", &date).issues[0].code, "F07");
        assert_eq!(formatter.incoming("2024022", &date).issues[0].code, "F07");
        let time = numeric(BaseFormat::Time, 8, 0);
        assert!(formatter.incoming("1230", &time).is_clean());
        assert!(formatter.incoming("12304599", &time).is_clean());
        assert_eq!(formatter.incoming("2460", &time).issues[0].code, "F08");
        assert_eq!(formatter.outgoing("1230459", &time).issues[0].code, "F23");
    }

    #[test]
    fn alphanumeric_length_only_checked_for_delimited_input() {
        let syntax = Syntax::default();
        let field = alpha(3, 2);
        let delimited = FieldFormatter::new(&syntax, false);
        assert_eq!(delimited.incoming("ABCD", &field).issues[0].code, "F05");
        assert_eq!(delimited.incoming("A", &field).issues[0].code, "F06");
        let fixed = FieldFormatter::new(&syntax, true);
        assert!(fixed.incoming("ABCD", &field).is_clean());
    }

    #[test]
    fn fixed_output_is_padded() {
        let syntax = Editype::Fixed.rules().syntax;
        let formatter = FieldFormatter::new(&syntax, true);
        assert_eq!(formatter.outgoing("AB", &alpha(5, 5)).value, "AB   ");
        let right = FieldFormatter::new(&syntax, true).outgoing(
            "AB",
            &FieldDescriptor {
                align: Align::Right,
                ..alpha(5, 5)
            },
        );
        assert_eq!(right.value, "   AB");
        let amount = FieldDescriptor {
            min_length: 6,
            ..numeric(BaseFormat::FixedDecimal, 6, 2)
        };
        assert_eq!(formatter.outgoing("-1.5", &amount).value, "-01.50");
        assert_eq!(formatter.outgoing("1234.5", &amount).issues[0].code, "F28");
    }

    #[test]
    fn initial_values() {
        let syntax = Editype::Fixed.rules().syntax;
        let formatter = FieldFormatter::new(&syntax, true);
        let amount = FieldDescriptor {
            min_length: 6,
            ..numeric(BaseFormat::FixedDecimal, 6, 2)
        };
        assert_eq!(formatter.initial(&amount), "000.00");
        assert_eq!(formatter.initial(&alpha(5, 5)), "");
        let count = FieldDescriptor {
            min_length: 4,
            ..numeric(BaseFormat::ImplicitDecimal, 4, 0)
        };
        assert_eq!(formatter.initial(&count), "0000");
    }
}
