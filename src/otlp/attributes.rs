use std::collections::HashMap;

use serde_json::Value as JsonValue;

/// Unwrapped form of an OTLP `AnyValue`. Keeping this as a tagged enum
/// (rather than going straight to `serde_json::Value`) lets the transform
/// distinguish "was a string" from "was serialized to a string" when
/// building span/trace input and output fields.
#[derive(Debug, Clone, PartialEq)]
pub enum AttributeValue {
    String(String),
    Int(i64),
    Bool(bool),
    Double(f64),
    List(Vec<AttributeValue>),
    Map(HashMap<String, AttributeValue>),
}

impl AttributeValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            AttributeValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// JSON-encodes unless already a string, matching the convention that
    /// stored `input`/`output` columns are bare strings or JSON text.
    pub fn to_input_output_string(&self) -> String {
        match self {
            AttributeValue::String(s) => s.clone(),
            other => serde_json::to_string(&other.to_json()).unwrap_or_default(),
        }
    }

    pub fn to_json(&self) -> JsonValue {
        match self {
            AttributeValue::String(s) => JsonValue::String(s.clone()),
            AttributeValue::Int(i) => JsonValue::from(*i),
            AttributeValue::Bool(b) => JsonValue::Bool(*b),
            AttributeValue::Double(d) => serde_json::Number::from_f64(*d).map(JsonValue::Number).unwrap_or(JsonValue::Null),
            AttributeValue::List(items) => JsonValue::Array(items.iter().map(|v| v.to_json()).collect()),
            AttributeValue::Map(map) => JsonValue::Object(map.iter().map(|(k, v)| (k.clone(), v.to_json())).collect()),
        }
    }
}

pub type AttributeMap = HashMap<String, AttributeValue>;

/// Looks up the first present key among several precedence-ordered
/// candidates, skipping empty strings the same way the original treats a
/// falsy attribute value as absent.
pub fn first_present<'a>(attrs: &'a AttributeMap, keys: &[&str]) -> Option<&'a str> {
    keys.iter().find_map(|k| attrs.get(*k).and_then(AttributeValue::as_str).filter(|s| !s.is_empty()))
}
