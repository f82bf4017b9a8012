use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use super::ResourceKind;

/// Field the remote API nests collections under.
pub const COLLECTION_FIELD: &str = "data";

/// EnvelopeShape
///
/// The known ways the remote API wraps a collection, in the order they are tried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvelopeShape {
    /// `[...]`
    Bare,
    /// `{"data": [...]}`
    Nested,
    /// `{"data": {"data": [...]}}`
    DoubleNested,
    /// None of the above; normalizes to an empty collection.
    Unrecognized,
}

/// RawCollection
///
/// A normalized collection before item decoding. `paging` holds the sibling fields of
/// the object the sequence was found in (cursors, page counters), if any.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RawCollection {
    pub items: Vec<Value>,
    pub paging: Option<Value>,
}

/// detect
///
/// Tries each known shape in fixed priority order.
pub fn detect(body: &Value) -> EnvelopeShape {
    if body.is_array() {
        return EnvelopeShape::Bare;
    }
    let nested = body.get(COLLECTION_FIELD);
    if nested.is_some_and(Value::is_array) {
        return EnvelopeShape::Nested;
    }
    if nested
        .and_then(|inner| inner.get(COLLECTION_FIELD))
        .is_some_and(Value::is_array)
    {
        return EnvelopeShape::DoubleNested;
    }
    EnvelopeShape::Unrecognized
}

/// normalize
///
/// Flattens any known envelope into a `RawCollection`. Unknown shapes degrade to an
/// empty collection and are logged; this never fails.
pub fn normalize(kind: ResourceKind, body: Value) -> RawCollection {
    match (detect(&body), body) {
        (EnvelopeShape::Bare, Value::Array(items)) => RawCollection {
            items,
            paging: None,
        },
        (EnvelopeShape::Nested, Value::Object(mut outer)) => {
            let items = take_sequence(&mut outer);
            RawCollection {
                items,
                paging: non_empty(outer),
            }
        }
        (EnvelopeShape::DoubleNested, Value::Object(mut outer)) => {
            let mut inner = match outer.remove(COLLECTION_FIELD) {
                Some(Value::Object(inner)) => inner,
                _ => Map::new(),
            };
            let items = take_sequence(&mut inner);
            // Inner pagination fields win over outer ones of the same name.
            outer.extend(inner);
            RawCollection {
                items,
                paging: non_empty(outer),
            }
        }
        (shape, body) => {
            tracing::warn!(
                resource = %kind,
                ?shape,
                body_type = json_type(&body),
                "unrecognized response envelope, treating as empty"
            );
            RawCollection::default()
        }
    }
}

/// decode_items
///
/// Decodes each item into `T`. Items that do not match the expected record are
/// skipped and logged rather than failing the whole list.
pub fn decode_items<T: DeserializeOwned>(kind: ResourceKind, raw: &RawCollection) -> Vec<T> {
    raw.items
        .iter()
        .enumerate()
        .filter_map(|(index, item)| match T::deserialize(item) {
            Ok(decoded) => Some(decoded),
            Err(e) => {
                tracing::warn!(resource = %kind, index, error = %e, "skipping malformed item");
                None
            }
        })
        .collect()
}

fn take_sequence(object: &mut Map<String, Value>) -> Vec<Value> {
    match object.remove(COLLECTION_FIELD) {
        Some(Value::Array(items)) => items,
        _ => Vec::new(),
    }
}

fn non_empty(object: Map<String, Value>) -> Option<Value> {
    (!object.is_empty()).then_some(Value::Object(object))
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
