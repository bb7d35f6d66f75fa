//! Predicate evaluation for the in-memory store
//!
//! Supports conditions of the form `path op literal` joined by `and`.
//! Operators: `=`, `!=`, `<`, `<=`, `>`, `>=`. Literals: single-quoted text
//! (`''` escapes a quote), integers, decimals, `true`, `false`, `null`.
//!
//! The grammar is deliberately minimal: it covers the filters the mapping
//! layer and its tests compose, and real stores bring their own query
//! language through [`DatasetView::scan`](crate::backends::DatasetView::scan).

use std::cmp::Ordering;
use std::collections::BTreeMap;

use crate::backends::core::FieldValue;
use crate::error::{StoreError, StoreResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Comparison {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

#[derive(Debug, Clone, PartialEq)]
struct Condition {
    path: String,
    comparison: Comparison,
    literal: FieldValue,
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Word(String),
    Op(Comparison),
    Literal(FieldValue),
}

/// Parsed predicate: a conjunction of conditions
#[derive(Debug, Clone, PartialEq)]
pub struct Predicate {
    conditions: Vec<Condition>,
}

impl Predicate {
    pub fn parse(text: &str) -> StoreResult<Self> {
        let invalid = |message: &str| StoreError::InvalidPredicate {
            predicate: text.to_string(),
            message: message.to_string(),
        };

        let tokens = tokenize(text).map_err(|m| invalid(&m))?;
        let mut conditions = Vec::new();
        let mut iter = tokens.into_iter().peekable();

        loop {
            let path = match iter.next() {
                Some(Token::Word(w)) => w,
                _ => return Err(invalid("expected a field path")),
            };
            let comparison = match iter.next() {
                Some(Token::Op(op)) => op,
                _ => return Err(invalid("expected a comparison operator")),
            };
            let literal = match iter.next() {
                Some(Token::Literal(value)) => value,
                _ => return Err(invalid("expected a literal")),
            };
            conditions.push(Condition {
                path,
                comparison,
                literal,
            });

            match iter.next() {
                None => break,
                Some(Token::Word(w)) if w.eq_ignore_ascii_case("and") => continue,
                _ => return Err(invalid("expected 'and' between conditions")),
            }
        }

        Ok(Self { conditions })
    }

    /// Check a record's values against every condition. Absent fields
    /// compare as null.
    pub fn matches(&self, values: &BTreeMap<String, FieldValue>) -> bool {
        self.conditions.iter().all(|condition| {
            let actual = values.get(&condition.path).unwrap_or(&FieldValue::Null);
            let ordering = actual.compare(&condition.literal);
            match condition.comparison {
                Comparison::Eq => ordering == Some(Ordering::Equal),
                Comparison::Ne => ordering != Some(Ordering::Equal),
                Comparison::Lt => ordering == Some(Ordering::Less) && !actual.is_null(),
                Comparison::Le => {
                    matches!(ordering, Some(Ordering::Less | Ordering::Equal)) && !actual.is_null()
                }
                Comparison::Gt => ordering == Some(Ordering::Greater),
                Comparison::Ge => matches!(ordering, Some(Ordering::Greater | Ordering::Equal)),
            }
        })
    }
}

fn tokenize(text: &str) -> Result<Vec<Token>, String> {
    let chars: Vec<char> = text.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            c if c.is_whitespace() => i += 1,
            '\'' => {
                let mut literal = String::new();
                i += 1;
                loop {
                    match chars.get(i) {
                        None => return Err("unterminated text literal".to_string()),
                        Some('\'') if chars.get(i + 1) == Some(&'\'') => {
                            literal.push('\'');
                            i += 2;
                        }
                        Some('\'') => {
                            i += 1;
                            break;
                        }
                        Some(other) => {
                            literal.push(*other);
                            i += 1;
                        }
                    }
                }
                tokens.push(Token::Literal(FieldValue::Text(literal)));
            }
            '=' => {
                tokens.push(Token::Op(Comparison::Eq));
                i += 1;
            }
            '!' if chars.get(i + 1) == Some(&'=') => {
                tokens.push(Token::Op(Comparison::Ne));
                i += 2;
            }
            '<' | '>' => {
                let or_equal = chars.get(i + 1) == Some(&'=');
                let comparison = match (c, or_equal) {
                    ('<', false) => Comparison::Lt,
                    ('<', true) => Comparison::Le,
                    ('>', false) => Comparison::Gt,
                    _ => Comparison::Ge,
                };
                tokens.push(Token::Op(comparison));
                i += if or_equal { 2 } else { 1 };
            }
            c if c.is_ascii_digit() || c == '-' => {
                let start = i;
                i += 1;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    i += 1;
                }
                let number: String = chars[start..i].iter().collect();
                let value = if number.contains('.') {
                    number.parse::<f64>().map(FieldValue::Decimal)
                        .map_err(|_| format!("invalid number '{}'", number))?
                } else {
                    number.parse::<i64>().map(FieldValue::Int)
                        .map_err(|_| format!("invalid number '{}'", number))?
                };
                tokens.push(Token::Literal(value));
            }
            _ => {
                let start = i;
                while i < chars.len()
                    && !chars[i].is_whitespace()
                    && !matches!(chars[i], '=' | '!' | '<' | '>' | '\'')
                {
                    i += 1;
                }
                if i == start {
                    return Err(format!("unexpected character '{}'", c));
                }
                let word: String = chars[start..i].iter().collect();
                let token = match word.to_ascii_lowercase().as_str() {
                    "true" => Token::Literal(FieldValue::Bool(true)),
                    "false" => Token::Literal(FieldValue::Bool(false)),
                    "null" => Token::Literal(FieldValue::Null),
                    _ => Token::Word(word),
                };
                tokens.push(token);
            }
        }
    }

    Ok(tokens)
}
