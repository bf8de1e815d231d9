//! # Patterns
//!
//! A [`Pattern`] is a set of `key → scalar` constraints. A message satisfies a
//! pattern when every constrained key is present in the message with the same
//! canonical text, so `id:5` matches both `5` and `"5"`.
//!
//! Patterns are kept in a `BTreeMap`, which gives them a deterministic display
//! (`cmd:get,role:users`) and makes equality independent of insertion order.

use crate::error::{DispatchError, Result};
use crate::message::{scalar_text, IntoMessage, Message};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// Registration-order identifier handed out by the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PatternId(pub usize);

impl fmt::Display for PatternId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Primitive constraint value.
#[derive(Debug, Clone, PartialEq)]
pub enum PatternValue {
    Str(String),
    Num(serde_json::Number),
    Bool(bool),
}

impl PatternValue {
    fn from_value(key: &str, value: &Value) -> Result<Self> {
        match value {
            Value::String(s) => Ok(PatternValue::Str(s.clone())),
            Value::Number(n) => Ok(PatternValue::Num(n.clone())),
            Value::Bool(b) => Ok(PatternValue::Bool(*b)),
            other => Err(DispatchError::InvalidPattern(format!(
                "value for '{key}' must be a string, number or boolean, got {other}"
            ))),
        }
    }

    fn text(&self) -> String {
        match self {
            PatternValue::Str(s) => s.clone(),
            PatternValue::Num(n) => n.to_string(),
            PatternValue::Bool(b) => b.to_string(),
        }
    }

    /// Compares against a message field by canonical text.
    pub fn matches(&self, value: &Value) -> bool {
        scalar_text(value).is_some_and(|text| text == self.text())
    }
}

/// An ordered set of key/value constraints.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Pattern {
    constraints: BTreeMap<String, PatternValue>,
}

impl Pattern {
    /// Builds a pattern from a message-like input (`"role:users,cmd:get"` or a
    /// JSON object). Reserved keys are ignored; nested values are rejected.
    pub fn parse(input: impl IntoMessage) -> Result<Self> {
        Self::from_message(&input.into_message()?)
    }

    pub fn from_message(message: &Message) -> Result<Self> {
        let mut constraints = BTreeMap::new();
        for (key, value) in message.fields() {
            constraints.insert(key.clone(), PatternValue::from_value(key, value)?);
        }
        Ok(Self { constraints })
    }

    /// Number of constrained keys; a higher count is more specific.
    pub fn specificity(&self) -> usize {
        self.constraints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.constraints.is_empty()
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.constraints.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.constraints.keys()
    }

    /// True when every constraint is satisfied by the message.
    pub fn matches(&self, message: &Message) -> bool {
        self.constraints.iter().all(|(key, expected)| {
            message
                .get(key)
                .is_some_and(|actual| expected.matches(actual))
        })
    }

    /// Converts the constraints back into a message, e.g. to act on the pattern.
    pub fn to_message(&self) -> Message {
        let mut message = Message::new();
        for (key, value) in &self.constraints {
            let json = match value {
                PatternValue::Str(s) => Value::String(s.clone()),
                PatternValue::Num(n) => Value::Number(n.clone()),
                PatternValue::Bool(b) => Value::Bool(*b),
            };
            message.insert(key.clone(), json);
        }
        message
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rendered: Vec<String> = self
            .constraints
            .iter()
            .map(|(k, v)| format!("{k}:{}", v.text()))
            .collect();
        f.write_str(&rendered.join(","))
    }
}
