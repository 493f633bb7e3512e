//! Wire payload encodings and their canonical form.
//!
//! A request payload can reach the hub in one of three encodings depending on
//! which transport and sender produced it. [`WirePayload`] names each encoding
//! explicitly, and [`WirePayload::normalize`] converts all of them into one
//! canonical [`serde_json::Value`] tree. Parsing happens here exactly once —
//! no later stage inspects payload types.

use serde_json::{Map, Value};

use crate::error::HubError;

/// A request payload as it arrived on the wire.
///
/// Equal logical values reaching the hub through different variants
/// normalize to structurally equal trees.
#[derive(Debug, Clone)]
pub enum WirePayload {
    /// Raw JSON text straight off the wire, not yet parsed.
    Text(String),
    /// A value tree the transport layer already parsed.
    Tree(Value),
    /// A structured object captured as named fields (server-side senders),
    /// converted field-by-field into the same tree shape.
    Fields(Vec<(String, Value)>),
}

impl WirePayload {
    /// Converts this payload into the canonical tree representation.
    ///
    /// Primitive scalars and strings pass through unchanged: text that is not
    /// valid JSON but does not look structured is kept as a plain string.
    ///
    /// # Errors
    ///
    /// Returns [`HubError::Serialization`] when [`WirePayload::Text`] opens
    /// like an object or array but fails to parse.
    pub fn normalize(self) -> Result<Value, HubError> {
        match self {
            Self::Text(text) => normalize_text(text),
            Self::Tree(value) => Ok(value),
            Self::Fields(fields) => {
                let mut map = Map::new();
                for (key, value) in fields {
                    map.insert(key, value);
                }
                Ok(Value::Object(map))
            }
        }
    }
}

/// Parses raw JSON text, falling back to a plain string for bare scalars.
fn normalize_text(text: String) -> Result<Value, HubError> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Ok(Value::Null);
    }
    match serde_json::from_str(trimmed) {
        Ok(value) => Ok(value),
        // A leading brace or bracket promises a structured document.
        Err(err) if trimmed.starts_with('{') || trimmed.starts_with('[') => {
            Err(HubError::Serialization(err.to_string()))
        }
        Err(_) => Ok(Value::String(text)),
    }
}

/// Normalizes each value of an update patch and folds the result into one
/// canonical object tree, keeping the last value for a repeated key.
///
/// # Errors
///
/// Returns [`HubError::Serialization`] if any patch value fails to normalize.
pub fn normalize_fields(
    fields: Vec<(String, WirePayload)>,
) -> Result<Value, HubError> {
    let mut map = Map::new();
    for (key, payload) in fields {
        map.insert(key, payload.normalize()?);
    }
    Ok(Value::Object(map))
}
