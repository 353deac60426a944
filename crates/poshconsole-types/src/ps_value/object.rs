use std::fmt::Display;

use serde::{Deserialize, Serialize};

use super::PsValue;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PsProperty {
    pub name: String,
    pub value: PsValue,
}

/// A property bag with type names, the shape every non-scalar result takes.
///
/// Properties keep insertion order since that is the column order the
/// default formatter uses.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PsObject {
    pub type_names: Vec<String>,
    pub properties: Vec<PsProperty>,
    pub to_string: Option<String>,
}

impl PsObject {
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_names: vec![type_name.into(), "System.Object".to_string()],
            properties: Vec::new(),
            to_string: None,
        }
    }

    pub fn with_property(mut self, name: impl Into<String>, value: impl Into<PsValue>) -> Self {
        self.set(name, value);
        self
    }

    pub fn with_to_string(mut self, text: impl Into<String>) -> Self {
        self.to_string = Some(text.into());
        self
    }

    /// Case-insensitive property lookup.
    pub fn get(&self, name: &str) -> Option<&PsValue> {
        self.properties
            .iter()
            .find(|p| p.name.eq_ignore_ascii_case(name))
            .map(|p| &p.value)
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<PsValue>) {
        let name = name.into();
        let value = value.into();
        if let Some(existing) = self
            .properties
            .iter_mut()
            .find(|p| p.name.eq_ignore_ascii_case(&name))
        {
            existing.value = value;
        } else {
            self.properties.push(PsProperty { name, value });
        }
    }

    pub fn type_name(&self) -> &str {
        self.type_names
            .first()
            .map_or("System.Object", String::as_str)
    }
}

impl Display for PsObject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.to_string {
            Some(s) => write!(f, "{s}"),
            None => write!(f, "{}", self.type_name()),
        }
    }
}
