use std::fmt::Display;

use serde::{Deserialize, Serialize};

use super::{PsObject, PsPrimitiveValue};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PsValue {
    Primitive(PsPrimitiveValue),
    List(Vec<PsValue>),
    Object(PsObject),
}

impl<IntoPrimitive> From<IntoPrimitive> for PsValue
where
    IntoPrimitive: Into<PsPrimitiveValue>,
{
    fn from(p: IntoPrimitive) -> Self {
        Self::Primitive(p.into())
    }
}

impl Display for PsValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Primitive(p) => p.fmt(f),
            Self::Object(o) => o.fmt(f),
            // "$array" joins with the default output field separator
            Self::List(items) => {
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, " ")?;
                    }
                    item.fmt(f)?;
                }
                Ok(())
            }
        }
    }
}

impl PsValue {
    pub const NULL: Self = Self::Primitive(PsPrimitiveValue::Nil);

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Primitive(PsPrimitiveValue::Nil))
    }

    pub fn as_object(&self) -> Option<&PsObject> {
        if let Self::Object(obj) = self {
            Some(obj)
        } else {
            None
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Primitive(PsPrimitiveValue::Str(s)) => Some(s),
            _ => None,
        }
    }

    pub fn as_i32(&self) -> Option<i32> {
        match self {
            Self::Primitive(PsPrimitiveValue::I32(v)) => Some(*v),
            Self::Primitive(PsPrimitiveValue::I64(v)) => i32::try_from(*v).ok(),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Primitive(PsPrimitiveValue::I32(v)) => Some(i64::from(*v)),
            Self::Primitive(PsPrimitiveValue::I64(v)) => Some(*v),
            _ => None,
        }
    }

    /// Numeric view used by arithmetic and comparisons. Strings that parse
    /// as numbers convert, like the language's implicit coercion.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Primitive(PsPrimitiveValue::I32(v)) => Some(f64::from(*v)),
            Self::Primitive(PsPrimitiveValue::I64(v)) => Some(*v as f64),
            Self::Primitive(PsPrimitiveValue::Double(v)) => Some(*v),
            Self::Primitive(PsPrimitiveValue::Str(s)) => s.trim().parse().ok(),
            Self::Primitive(PsPrimitiveValue::Bool(b)) => Some(if *b { 1.0 } else { 0.0 }),
            _ => None,
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, Self::Primitive(p) if p.is_numeric())
    }

    pub fn is_string(&self) -> bool {
        matches!(self, Self::Primitive(PsPrimitiveValue::Str(_)))
    }

    /// Boolean coercion: empty strings, zero, `$null` and empty lists are false.
    pub fn is_truthy(&self) -> bool {
        match self {
            Self::Primitive(p) => match p {
                PsPrimitiveValue::Str(s) => !s.is_empty(),
                PsPrimitiveValue::Bool(b) => *b,
                PsPrimitiveValue::I32(v) => *v != 0,
                PsPrimitiveValue::I64(v) => *v != 0,
                PsPrimitiveValue::Double(v) => *v != 0.0,
                PsPrimitiveValue::Char(c) => *c != '\0',
                PsPrimitiveValue::Nil => false,
                PsPrimitiveValue::SecureString(_) | PsPrimitiveValue::ScriptBlock(_) => true,
            },
            Self::List(items) => match items.as_slice() {
                [] => false,
                [single] => single.is_truthy(),
                _ => true,
            },
            Self::Object(_) => true,
        }
    }

    pub fn type_name(&self) -> &str {
        match self {
            Self::Primitive(p) => p.type_name(),
            Self::List(_) => "System.Object[]",
            Self::Object(o) => o.type_name(),
        }
    }

    /// Flattens one level of list, which is how pipelines enumerate values.
    pub fn into_items(self) -> Vec<Self> {
        match self {
            Self::List(items) => items,
            other => vec![other],
        }
    }

    /// Collapses pipeline output into a single value: nothing is `$null`,
    /// one object stays scalar, several become a list.
    pub fn from_output(mut values: Vec<Self>) -> Self {
        match values.len() {
            0 => Self::NULL,
            1 => values.remove(0),
            _ => Self::List(values),
        }
    }
}
