use std::fmt::Display;

use serde::{Deserialize, Serialize};

/// Scalar values produced and consumed by pipelines.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PsPrimitiveValue {
    Str(String),
    Bool(bool),
    I32(i32),
    I64(i64),
    Double(f64),
    Char(char),
    Nil,
    /// Output of a masked read. Never rendered in clear text.
    SecureString(Vec<u8>),
    /// Unevaluated script block text, without the surrounding braces.
    ScriptBlock(String),
}

impl PsPrimitiveValue {
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Str(_) => "System.String",
            Self::Bool(_) => "System.Boolean",
            Self::I32(_) => "System.Int32",
            Self::I64(_) => "System.Int64",
            Self::Double(_) => "System.Double",
            Self::Char(_) => "System.Char",
            Self::Nil => "$null",
            Self::SecureString(_) => "System.Security.SecureString",
            Self::ScriptBlock(_) => "System.Management.Automation.ScriptBlock",
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, Self::I32(_) | Self::I64(_) | Self::Double(_))
    }
}

/// Invariant-culture rendering of a double, the way the console prints it.
#[expect(clippy::float_cmp)]
pub fn format_double(d: f64) -> String {
    if d.is_nan() {
        "NaN".to_string()
    } else if d.is_infinite() {
        if d.is_sign_positive() {
            "Infinity".to_string()
        } else {
            "-Infinity".to_string()
        }
    } else if d == d.trunc() && d.abs() < 1e15 {
        format!("{}", d as i64)
    } else {
        format!("{d}")
    }
}

impl Display for PsPrimitiveValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Str(s) => write!(f, "{s}"),
            Self::Bool(true) => write!(f, "True"),
            Self::Bool(false) => write!(f, "False"),
            Self::I32(i) => write!(f, "{i}"),
            Self::I64(i) => write!(f, "{i}"),
            Self::Double(d) => write!(f, "{}", format_double(*d)),
            Self::Char(c) => write!(f, "{c}"),
            Self::Nil => Ok(()), // $null stringifies to empty string
            Self::SecureString(_) => write!(f, "System.Security.SecureString"),
            Self::ScriptBlock(text) => write!(f, "{text}"),
        }
    }
}

impl From<()> for PsPrimitiveValue {
    fn from((): ()) -> Self {
        Self::Nil
    }
}

impl From<&str> for PsPrimitiveValue {
    fn from(s: &str) -> Self {
        Self::Str(s.to_string())
    }
}

impl From<String> for PsPrimitiveValue {
    fn from(s: String) -> Self {
        Self::Str(s)
    }
}

impl From<bool> for PsPrimitiveValue {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<i32> for PsPrimitiveValue {
    fn from(i: i32) -> Self {
        Self::I32(i)
    }
}

impl From<i64> for PsPrimitiveValue {
    fn from(i: i64) -> Self {
        Self::I64(i)
    }
}

impl From<f64> for PsPrimitiveValue {
    fn from(d: f64) -> Self {
        Self::Double(d)
    }
}

impl From<char> for PsPrimitiveValue {
    fn from(c: char) -> Self {
        Self::Char(c)
    }
}
