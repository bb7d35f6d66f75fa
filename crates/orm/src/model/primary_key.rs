//! Primary Key System - Record identity as an ordered sequence of components
//!
//! A [`Key`] is never empty. Its external form joins components with
//! [`KEY_SEPARATOR`]; a literal separator or escape character inside a
//! component is escaped with a backslash, so [`Key::parse`] is the exact
//! inverse of formatting.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Separator between components in the formatted key
pub const KEY_SEPARATOR: char = '|';

const ESCAPE: char = '\\';

/// Errors raised while building or parsing keys
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KeyError {
    #[error("A key needs at least one component")]
    Empty,

    #[error("Malformed key '{key}': {reason}")]
    Malformed { key: String, reason: String },

    #[error("Key '{key}' has {found} components but table '{table}' declares {expected}")]
    ShapeMismatch {
        table: String,
        key: String,
        expected: usize,
        found: usize,
    },

    #[error("Invalid value '{value}' for key component '{field}': {reason}")]
    InvalidComponent {
        field: String,
        value: String,
        reason: String,
    },
}

/// Identity of a record within its table
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Key {
    components: Vec<String>,
}

impl Key {
    /// Build a key from its components in declaration order
    pub fn new<I, S>(components: I) -> Result<Self, KeyError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let components: Vec<String> = components.into_iter().map(Into::into).collect();
        if components.is_empty() {
            return Err(KeyError::Empty);
        }
        Ok(Self { components })
    }

    /// Single-component key
    pub fn single(component: impl Into<String>) -> Self {
        Self {
            components: vec![component.into()],
        }
    }

    pub fn components(&self) -> &[String] {
        &self.components
    }

    pub fn component(&self, index: usize) -> Option<&str> {
        self.components.get(index).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.components.len()
    }

    /// Always false; kept for API symmetry with `len`
    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    pub fn into_components(self) -> Vec<String> {
        self.components
    }

    /// Parse the external form produced by `Display`
    pub fn parse(text: &str) -> Result<Self, KeyError> {
        let mut components = Vec::new();
        let mut current = String::new();
        let mut chars = text.chars();

        while let Some(c) = chars.next() {
            match c {
                ESCAPE => match chars.next() {
                    Some(escaped @ (ESCAPE | KEY_SEPARATOR)) => current.push(escaped),
                    Some(other) => {
                        return Err(KeyError::Malformed {
                            key: text.to_string(),
                            reason: format!("unknown escape sequence '\\{}'", other),
                        })
                    }
                    None => {
                        return Err(KeyError::Malformed {
                            key: text.to_string(),
                            reason: "dangling escape at end of key".to_string(),
                        })
                    }
                },
                KEY_SEPARATOR => components.push(std::mem::take(&mut current)),
                other => current.push(other),
            }
        }
        components.push(current);

        Ok(Self { components })
    }
}

fn write_escaped(f: &mut fmt::Formatter<'_>, component: &str) -> fmt::Result {
    for c in component.chars() {
        if c == ESCAPE || c == KEY_SEPARATOR {
            write!(f, "{}", ESCAPE)?;
        }
        write!(f, "{}", c)?;
    }
    Ok(())
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, component) in self.components.iter().enumerate() {
            if i > 0 {
                write!(f, "{}", KEY_SEPARATOR)?;
            }
            write_escaped(f, component)?;
        }
        Ok(())
    }
}

impl FromStr for Key {
    type Err = KeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Key::parse(s)
    }
}
