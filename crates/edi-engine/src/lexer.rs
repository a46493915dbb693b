//! Lexers for delimited and fixed records
//!
//! The delimited lexer is a single pass over the characters with four
//! modes: between records, in a record, in a quote, and after an escape
//! character. Every separator closes the current token; the kind of the
//! next token (field, subfield, repeat) is set by the separator that
//! opened it.

use crate::{Error, Result};
use edi_grammar::{Grammar, Syntax};
use edi_ir::{LexedRecord, LexedToken, Position, TokenKind};
use std::collections::BTreeSet;
use tracing::debug;

/// Lexer for records of variable length
#[derive(Debug, Clone)]
pub struct DelimitedLexer<'a> {
    syntax: &'a Syntax,
    strict: bool,
    significant_whitespace: bool,
    first_line: usize,
}

struct State {
    records: Vec<LexedRecord>,
    tokens: Vec<LexedToken>,
    value: String,
    kind: TokenKind,
    value_line: usize,
    value_column: usize,
}

impl State {
    fn close_token(&mut self, next: TokenKind) {
        let value = std::mem::take(&mut self.value);
        self.tokens
            .push(LexedToken::new(value, self.kind, self.value_line, self.value_column));
        self.kind = next;
    }

    fn close_record(&mut self) {
        self.close_token(TokenKind::Field);
        self.records
            .push(LexedRecord::new(std::mem::take(&mut self.tokens)));
    }
}

impl<'a> DelimitedLexer<'a> {
    pub fn new(syntax: &'a Syntax) -> Self {
        Self {
            syntax,
            strict: false,
            significant_whitespace: false,
            first_line: 1,
        }
    }

    /// Reject whitespace between records and empty records
    #[must_use]
    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    /// Whitespace field separators between records start a record
    /// (tab-delimited files with an empty first field)
    #[must_use]
    pub fn significant_whitespace(mut self, significant: bool) -> Self {
        self.significant_whitespace = significant;
        self
    }

    /// Line number of the first character of the input
    #[must_use]
    pub fn starting_line(mut self, line: usize) -> Self {
        self.first_line = line;
        self
    }

    /// Split `text` into lexed records.
    ///
    /// # Errors
    ///
    /// `A67` for whitespace between records and `A69` for an empty record
    /// (both only when strict); `A51` for data after the last record.
    pub fn lex(&self, text: &str) -> Result<Vec<LexedRecord>> {
        let syntax = self.syntax;
        // Tradacoms' tag separator ends a field like the field separator.
        let field_sep = format!("{}{}", syntax.field_sep, syntax.record_tag_sep);
        let record_sep = syntax.record_sep.as_str();
        let skip = syntax.skip_char.as_str();
        let sfield = syntax.sfield_sep.chars().next();
        let escape = syntax.escape.chars().next();
        let repeat = syntax.repeat_sep.chars().next();
        let quote = syntax.quote_char.chars().next();
        let is_separator = |c: char| {
            field_sep.contains(c)
                || record_sep.contains(c)
                || Some(c) == sfield
                || Some(c) == escape
                || Some(c) == repeat
        };

        let mut state = State {
            records: Vec::new(),
            tokens: Vec::new(),
            value: String::new(),
            kind: TokenKind::Field,
            value_line: self.first_line,
            value_column: 1,
        };
        let mut line = self.first_line;
        let mut column = 0;
        let mut in_record = false;
        let mut in_quote = false;
        let mut quote_pending = false;
        let mut escaping = false;

        for c in text.chars() {
            if c == '\n' {
                line += 1;
                column = 0;
            } else {
                column += 1;
            }
            if in_quote {
                if quote_pending {
                    quote_pending = false;
                    if Some(c) == quote {
                        state.value.push(c);
                        continue;
                    }
                    in_quote = false;
                } else if escaping {
                    escaping = false;
                    state.value.push(c);
                    continue;
                } else if Some(c) == quote {
                    quote_pending = true;
                    continue;
                } else if Some(c) == escape {
                    escaping = true;
                    continue;
                } else {
                    state.value.push(c);
                    continue;
                }
            }
            if skip.contains(c) {
                continue;
            }
            if !in_record {
                if c.is_whitespace() {
                    if self.significant_whitespace && field_sep.contains(c) {
                        // an empty first field
                    } else if self.strict {
                        return Err(Error::fatal(
                            "A67",
                            Some(Position::new(line, column)),
                            format!("Found whitespace characters between segments. Line {line}, position {column}."),
                        ));
                    } else {
                        continue;
                    }
                }
                in_record = true;
            }
            if escaping {
                escaping = false;
                state.value.push(c);
                continue;
            }
            if state.value.is_empty() {
                state.value_line = line;
                state.value_column = column;
            }
            if Some(c) == quote && state.value.chars().all(char::is_whitespace) {
                in_quote = true;
                continue;
            }
            if !is_separator(c) {
                state.value.push(c);
            } else if field_sep.contains(c) {
                state.close_token(TokenKind::Field);
            } else if Some(c) == sfield {
                state.close_token(TokenKind::Subfield);
            } else if record_sep.contains(c) {
                if self.strict && state.tokens.is_empty() {
                    return Err(Error::fatal(
                        "A69",
                        Some(Position::new(line, column)),
                        format!("Found double record separator. Line {line}, position {column}."),
                    ));
                }
                state.close_record();
                in_record = false;
            } else if Some(c) == escape {
                escaping = true;
            } else {
                state.close_token(TokenKind::Repeat);
            }
        }

        if in_record && syntax.allow_last_record_not_closed {
            state.close_record();
        } else {
            let leftover = state.value.trim_matches(['\0', '\x1a']);
            if !leftover.is_empty() {
                return Err(Error::fatal(
                    "A51",
                    Some(Position::new(state.value_line, state.value_column)),
                    format!(
                        "Found non-valid data at end of edi file; probably a problem with separators or message structure: \"{leftover}\"."
                    ),
                ));
            }
        }
        debug!(record_count = state.records.len(), "lexed delimited records");
        Ok(state.records)
    }
}

/// Split fixed-width `text` into one record per non-blank line.
///
/// The record id is sliced from the type marker position of the grammar,
/// or is the root record id when records carry no type marker.
///
/// # Errors
///
/// Fails when the grammar has no structure or no type marker position.
pub fn lex_fixed(text: &str, grammar: &Grammar) -> Result<Vec<LexedRecord>> {
    let root_id = grammar.structure()?.id.clone();
    let span = if grammar.syntax.no_botsid.is_set() {
        None
    } else {
        Some(grammar.record_id_span.ok_or_else(|| {
            edi_grammar::Error::structure(&grammar.name, &root_id, "no position of BOTSID in fixed records")
        })?)
    };

    let mut records = Vec::new();
    for (index, line) in text.split_inclusive('\n').enumerate() {
        if line.chars().all(char::is_whitespace) {
            continue;
        }
        let line = line.trim_end_matches(['\r', '\n']);
        let id = match span {
            None => root_id.clone(),
            Some((start, end)) => line
                .chars()
                .skip(start)
                .take(end.saturating_sub(start))
                .collect::<String>()
                .trim()
                .to_string(),
        };
        records.push(LexedRecord::fixed(
            LexedToken::new(id, TokenKind::Field, index + 1, 0),
            line,
        ));
    }
    debug!(record_count = records.len(), "lexed fixed records");
    Ok(records)
}

/// Reject a degenerate separator set: a character used twice, a space, or
/// an alphanumeric character.
///
/// # Errors
///
/// `A64`, `A65` or `A66`.
pub fn check_separators(separators: &str) -> Result<()> {
    let distinct: BTreeSet<char> = separators.chars().collect();
    if distinct.len() != separators.chars().count() {
        return Err(Error::fatal(
            "A64",
            None,
            "Separator problem in edi file: same separator is used twice.",
        ));
    }
    if separators.contains(' ') {
        return Err(Error::fatal(
            "A65",
            None,
            "Separator problem in edi file: space is used as separator.",
        ));
    }
    if separators.chars().any(char::is_alphanumeric) {
        return Err(Error::fatal(
            "A66",
            None,
            "Separator problem in edi file: separator is alfanumeric.",
        ));
    }
    Ok(())
}
