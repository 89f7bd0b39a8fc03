//! Literal node arguments.
//!
//! Arguments are used twice: once when a node's constructor builds its UGen,
//! and again by [`align`](crate::align) to decide whether two nodes from
//! successive graphs are the same node. Equality is structural, so
//! `Sequence` arguments compare element by element.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A literal constructor argument.
///
/// Deserializes untagged: TOML integers become [`Arg::Int`], floats
/// [`Arg::Number`], strings [`Arg::String`] and arrays [`Arg::Sequence`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Arg {
    /// Integer literal.
    Int(i64),
    /// Floating-point literal.
    Number(f64),
    /// String literal (keywords and names).
    String(String),
    /// Nested sequence of arguments.
    Sequence(Vec<Arg>),
}

impl Arg {
    /// Numeric value of a scalar argument.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Arg::Int(v) => Some(*v as f64),
            Arg::Number(v) => Some(*v),
            _ => None,
        }
    }

    /// Non-negative integral value, as used for channel indices.
    pub fn as_index(&self) -> Option<usize> {
        match self {
            Arg::Int(v) => usize::try_from(*v).ok(),
            Arg::Number(v) if *v >= 0.0 && v.fract() == 0.0 && *v <= u32::MAX as f64 => {
                Some(*v as usize)
            }
            _ => None,
        }
    }

    /// String value, if this is a string argument.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Arg::String(s) => Some(s),
            _ => None,
        }
    }
}

impl From<f64> for Arg {
    fn from(v: f64) -> Self {
        Arg::Number(v)
    }
}

impl From<i64> for Arg {
    fn from(v: i64) -> Self {
        Arg::Int(v)
    }
}

impl From<usize> for Arg {
    fn from(v: usize) -> Self {
        Arg::Int(v as i64)
    }
}

impl From<&str> for Arg {
    fn from(v: &str) -> Self {
        Arg::String(v.to_string())
    }
}

impl From<String> for Arg {
    fn from(v: String) -> Self {
        Arg::String(v)
    }
}

impl From<Vec<Arg>> for Arg {
    fn from(v: Vec<Arg>) -> Self {
        Arg::Sequence(v)
    }
}

impl fmt::Display for Arg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Arg::Int(v) => write!(f, "{v}"),
            Arg::Number(v) => write!(f, "{v:?}"),
            Arg::String(s) => write!(f, "{s:?}"),
            Arg::Sequence(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str("]")
            }
        }
    }
}

/// Reads the numeric argument at `index`, falling back to `default`.
pub fn number_or(args: &[Arg], index: usize, default: f64) -> f64 {
    args.get(index).and_then(Arg::as_f64).unwrap_or(default)
}
