// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Opaque attribute values.
use std::fmt;

use serde::{Deserialize, Serialize};

/// Attribute value stored on graph elements and bound to pattern variables.
///
/// Values are compared structurally; the engine never interprets them beyond
/// equality and the small arithmetic the default evaluator offers.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Value {
    /// Boolean flag.
    Bool(bool),
    /// Signed integer.
    Int(i64),
    /// Free-form text.
    Str(String),
}

impl Value {
    /// Returns the integer payload, if any.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(n) => Some(*n),
            _ => None,
        }
    }

    /// Returns the string payload, if any.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the boolean payload, if any.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Self::Int(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Self::Int(i64::from(n))
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::Str(s.to_owned())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::Str(s)
    }
}

/// Renders the value the way the expression parser reads it back.
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(n) => write!(f, "{n}"),
            Self::Str(s) => write!(f, "\"{}\"", s.replace('\\', "\\\\").replace('"', "\\\"")),
        }
    }
}

impl Value {
    /// Equality used by attribute criteria.
    ///
    /// Host attributes are frequently stored as text, so a string compares
    /// equal to a number or flag whose literal rendering it spells.
    pub fn matches(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Str(s), Self::Int(n)) | (Self::Int(n), Self::Str(s)) => {
                s.trim().parse::<i64>().is_ok_and(|v| v == *n)
            }
            (Self::Str(s), Self::Bool(b)) | (Self::Bool(b), Self::Str(s)) => {
                s.trim().parse::<bool>().is_ok_and(|v| v == *b)
            }
            _ => self == other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn textual_numbers_match_integers() {
        assert!(Value::from("5").matches(&Value::Int(5)));
        assert!(Value::Int(5).matches(&Value::from(" 5 ")));
        assert!(!Value::from("05x").matches(&Value::Int(5)));
        assert!(Value::from("true").matches(&Value::Bool(true)));
        assert!(!Value::Int(1).matches(&Value::Bool(true)));
    }

    #[test]
    fn display_quotes_strings() {
        assert_eq!(Value::from("a\"b").to_string(), "\"a\\\"b\"");
        assert_eq!(Value::Int(-3).to_string(), "-3");
    }
}
