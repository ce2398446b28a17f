// SPDX-License-Identifier: MIT OR Apache-2.0
//! The runtime value type templates operate on.

use std::collections::BTreeMap;

/// A value flowing through template evaluation.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// The absence of a value.
    Null,
    /// A boolean.
    Bool(bool),
    /// A number (integers and floats share a representation).
    Number(f64),
    /// A string.
    String(String),
    /// An ordered list.
    List(Vec<Value>),
    /// A string-keyed map, including `_blocks` and nested records.
    Map(BTreeMap<String, Value>),
}

impl Value {
    /// Build a [`Value`] from a parsed JSON value, e.g. a schema values
    /// map entry.
    #[must_use]
    pub fn from_json(json: &serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Self::Null,
            serde_json::Value::Bool(b) => Self::Bool(*b),
            serde_json::Value::Number(n) => Self::Number(n.as_f64().unwrap_or(0.0)),
            serde_json::Value::String(s) => Self::String(s.clone()),
            serde_json::Value::Array(items) => Self::List(items.iter().map(Value::from_json).collect()),
            serde_json::Value::Object(map) => {
                Self::Map(map.iter().map(|(k, v)| (k.clone(), Value::from_json(v))).collect())
            }
        }
    }

    /// Go-template truthiness: zero values of each kind are falsy.
    #[must_use]
    pub fn is_truthy(&self) -> bool {
        match self {
            Self::Null => false,
            Self::Bool(b) => *b,
            Self::Number(n) => *n != 0.0,
            Self::String(s) => !s.is_empty(),
            Self::List(items) => !items.is_empty(),
            Self::Map(map) => !map.is_empty(),
        }
    }

    /// Render this value as it would appear when printed directly by an
    /// action, e.g. `{{ .Name }}`.
    #[must_use]
    pub fn display(&self) -> String {
        match self {
            Self::Null => String::new(),
            Self::Bool(b) => b.to_string(),
            Self::Number(n) => format_number(*n),
            Self::String(s) => s.clone(),
            Self::List(items) => {
                let parts: Vec<String> = items.iter().map(Value::display).collect();
                format!("[{}]", parts.join(" "))
            }
            Self::Map(_) => "<map>".to_string(),
        }
    }

    /// Field access for `.a.b` style paths. Returns `None` if this value
    /// is not a map or has no such key.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&Value> {
        match self {
            Self::Map(map) => map.get(name),
            _ => None,
        }
    }

    /// Index access for `index .List 0` style lookups.
    #[must_use]
    pub fn index(&self, idx: usize) -> Option<&Value> {
        match self {
            Self::List(items) => items.get(idx),
            _ => None,
        }
    }

    /// Iterate a list or map's values for `range`, in a stable order.
    #[must_use]
    pub fn iter_range(&self) -> Vec<Value> {
        match self {
            Self::List(items) => items.clone(),
            Self::Map(map) => map.values().cloned().collect(),
            _ => Vec::new(),
        }
    }
}

fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        n.to_string()
    }
}
