//! # Messages
//!
//! A [`Message`] is the unit of work handed to the dispatcher: a JSON object whose
//! top-level fields are matched against registered patterns. Messages are
//! constructed from JSON objects, from `(key, value)` pairs, or from the compact
//! pattern syntax `"role:users,cmd:get,id:5"`.
//!
//! Keys ending in `$` are reserved for transport metadata. They ride along with the
//! message (so an action can inspect the originating request) but never take part
//! in pattern matching or cache key derivation. The request that produced a message
//! lives under [`REQUEST_KEY`] as a serialized [`RequestMeta`].

use crate::error::{DispatchError, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};
use std::collections::BTreeMap;
use std::fmt;

/// Reserved key holding the originating request description.
pub const REQUEST_KEY: &str = "req$";

/// Returns true for keys that carry transport metadata.
pub fn is_reserved(key: &str) -> bool {
    key.ends_with('$')
}

/// Canonical text of a scalar JSON value, `None` for objects and arrays.
pub fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Null => Some("null".to_string()),
        Value::Array(_) | Value::Object(_) => None,
    }
}

/// Description of the inbound request a message was built from.
///
/// The dispatcher treats this as opaque pass-through data.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RequestMeta {
    pub method: String,
    pub path: String,
    #[serde(default)]
    pub params: BTreeMap<String, String>,
    #[serde(default)]
    pub query: BTreeMap<String, String>,
    #[serde(default)]
    pub payload: Value,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
}

/// A routed message: a JSON object with string keys.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Message(Map<String, Value>);

impl Message {
    pub fn new() -> Self {
        Self(Map::new())
    }

    /// Parses the compact `key:value,key:value` syntax.
    ///
    /// Values that look like integers, floats or booleans become JSON numbers or
    /// booleans; everything else is kept as a string.
    pub fn parse(text: &str) -> Result<Self> {
        let mut map = Map::new();
        for segment in text.split(',') {
            let segment = segment.trim();
            if segment.is_empty() {
                continue;
            }
            let (key, value) = segment.split_once(':').ok_or_else(|| {
                DispatchError::InvalidPattern(format!("expected key:value, got '{segment}'"))
            })?;
            let key = key.trim();
            if key.is_empty() {
                return Err(DispatchError::InvalidPattern(format!(
                    "empty key in '{segment}'"
                )));
            }
            map.insert(key.to_string(), parse_scalar(value.trim()));
        }
        Ok(Self(map))
    }

    /// Wraps a JSON value, which must be an object.
    pub fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Object(map) => Ok(Self(map)),
            other => Err(DispatchError::InvalidPattern(format!(
                "message must be a JSON object, got {other}"
            ))),
        }
    }

    /// Builder-style insert.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.0.insert(key.into(), value.into())
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_str)
    }

    /// Reads an integer field, accepting numeric strings as well.
    pub fn get_i64(&self, key: &str) -> Option<i64> {
        match self.0.get(key)? {
            Value::Number(n) => n.as_i64(),
            Value::String(s) => s.parse().ok(),
            _ => None,
        }
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Fields that take part in routing, i.e. everything except reserved metadata.
    pub fn fields(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter().filter(|(k, _)| !is_reserved(k))
    }

    /// Copies every field of `additions` over this message.
    pub fn merge(&mut self, additions: Message) {
        for (key, value) in additions.0 {
            self.0.insert(key, value);
        }
    }

    /// Consuming variant of [`Message::merge`].
    pub fn merged(mut self, additions: Message) -> Self {
        self.merge(additions);
        self
    }

    /// Attaches the originating request under [`REQUEST_KEY`].
    pub fn with_request(mut self, request: &RequestMeta) -> Result<Self> {
        self.0
            .insert(REQUEST_KEY.to_string(), serde_json::to_value(request)?);
        Ok(self)
    }

    /// The originating request, when the message came through a gateway.
    pub fn request(&self) -> Option<RequestMeta> {
        self.0
            .get(REQUEST_KEY)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }
}

/// Renders the routable fields as `key:value` pairs in key order.
impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut fields: Vec<_> = self.fields().collect();
        fields.sort_by(|a, b| a.0.cmp(b.0));
        let mut first = true;
        for (key, value) in fields {
            if !first {
                f.write_str(",")?;
            }
            first = false;
            match scalar_text(value) {
                Some(text) => write!(f, "{key}:{text}")?,
                None => write!(f, "{key}:{value}")?,
            }
        }
        Ok(())
    }
}

impl From<Map<String, Value>> for Message {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

/// Anything that can be turned into a [`Message`]: messages, JSON objects and
/// pattern strings.
pub trait IntoMessage {
    fn into_message(self) -> Result<Message>;
}

impl IntoMessage for Message {
    fn into_message(self) -> Result<Message> {
        Ok(self)
    }
}

impl IntoMessage for &Message {
    fn into_message(self) -> Result<Message> {
        Ok(self.clone())
    }
}

impl IntoMessage for &str {
    fn into_message(self) -> Result<Message> {
        Message::parse(self)
    }
}

impl IntoMessage for String {
    fn into_message(self) -> Result<Message> {
        Message::parse(&self)
    }
}

impl IntoMessage for Value {
    fn into_message(self) -> Result<Message> {
        match self {
            Value::String(s) => Message::parse(&s),
            other => Message::from_value(other),
        }
    }
}

pub(crate) fn parse_scalar(raw: &str) -> Value {
    if let Ok(i) = raw.parse::<i64>() {
        return Value::Number(i.into());
    }
    if let Ok(f) = raw.parse::<f64>() {
        if let Some(n) = Number::from_f64(f) {
            return Value::Number(n);
        }
    }
    match raw {
        "true" => Value::Bool(true),
        "false" => Value::Bool(false),
        _ => Value::String(raw.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_compact_syntax() {
        let msg = Message::parse("role:users, cmd:get,id:5,active:true").unwrap();
        assert_eq!(msg.get_str("role"), Some("users"));
        assert_eq!(msg.get_str("cmd"), Some("get"));
        assert_eq!(msg.get("id"), Some(&json!(5)));
        assert_eq!(msg.get("active"), Some(&json!(true)));
    }

    #[test]
    fn test_parse_rejects_missing_colon() {
        let err = Message::parse("role:users,oops").unwrap_err();
        assert!(matches!(err, DispatchError::InvalidPattern(_)));
        assert!(Message::parse("").unwrap().is_empty());
    }

    #[test]
    fn test_merge_overrides_base() {
        let base = Message::parse("generate:id,name:anon").unwrap();
        let merged = base.merged(Message::parse("name:steve").unwrap());
        assert_eq!(merged.get_str("name"), Some("steve"));
        assert_eq!(merged.get_str("generate"), Some("id"));
    }

    #[test]
    fn test_reserved_fields_are_hidden() {
        let request = RequestMeta {
            method: "GET".into(),
            path: "/route".into(),
            query: [("some".to_string(), "action".to_string())].into(),
            ..Default::default()
        };
        let msg = Message::parse("verify:request")
            .unwrap()
            .with_request(&request)
            .unwrap();
        assert_eq!(msg.fields().count(), 1);
        assert_eq!(msg.to_string(), "verify:request");
        assert_eq!(msg.request().unwrap().query["some"], "action");
    }

    #[test]
    fn test_into_message_from_json() {
        let msg = json!({"name": "steve", "pre": "mr"}).into_message().unwrap();
        assert_eq!(msg.to_string(), "name:steve,pre:mr");
        assert!(json!([1, 2]).into_message().is_err());
    }
}
