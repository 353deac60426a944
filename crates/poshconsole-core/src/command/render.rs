use std::fmt::{self, Display, Write};

use poshconsole_types::{PsPrimitiveValue, PsValue, format_double};

use super::{Command, Parameter, SubCommand};

/// Single-quoted literal with embedded quotes doubled.
pub fn quote_literal(text: &str) -> String {
    format!("'{}'", text.replace('\'', "''"))
}

/// Source form of a bound parameter value, as it would be typed.
pub fn render_value(value: &PsValue) -> String {
    match value {
        PsValue::Primitive(p) => match p {
            PsPrimitiveValue::Str(s) => quote_literal(s),
            PsPrimitiveValue::Char(c) => quote_literal(&c.to_string()),
            PsPrimitiveValue::Bool(true) => "$true".to_string(),
            PsPrimitiveValue::Bool(false) => "$false".to_string(),
            PsPrimitiveValue::I32(v) => v.to_string(),
            PsPrimitiveValue::I64(v) => v.to_string(),
            PsPrimitiveValue::Double(v) => format_double(*v),
            PsPrimitiveValue::Nil => "$null".to_string(),
            PsPrimitiveValue::SecureString(_) => quote_literal("********"),
            PsPrimitiveValue::ScriptBlock(text) => format!("{{{text}}}"),
        },
        PsValue::List(items) => {
            let inner = items.iter().map(render_value).collect::<Vec<_>>();
            format!("@({})", inner.join(", "))
        }
        PsValue::Object(obj) => quote_literal(&obj.to_string()),
    }
}

impl Display for Parameter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Named { name, value } => write!(f, "-{name} {}", render_value(value)),
            Self::Positional { value } => f.write_str(&render_value(value)),
            Self::Switch { name, value: true } => write!(f, "-{name}"),
            Self::Switch { name, value: false } => write!(f, "-{name}:$false"),
        }
    }
}

impl Display for Command {
    /// The text echoed back when a submission asks for it. Script stages
    /// feeding a pipe are grouped in parentheses so the result reads as one
    /// pipeline.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let last = self.sub_commands.len().saturating_sub(1);
        let mut out = String::new();
        for (i, sub) in self.sub_commands.iter().enumerate() {
            if i > 0 {
                out.push_str(" | ");
            }
            match sub {
                SubCommand::Script(text) if i < last => {
                    let _ = write!(out, "({})", text.trim());
                }
                SubCommand::Script(text) => out.push_str(text.trim()),
                SubCommand::Command { name, parameters } => {
                    out.push_str(name);
                    for parameter in parameters {
                        let _ = write!(out, " {parameter}");
                    }
                }
            }
        }
        f.write_str(&out)
    }
}
