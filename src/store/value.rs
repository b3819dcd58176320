//! Typed document values
//!
//! Firestore fields carry a closed set of value types. This module models them
//! as [`DocumentValue`] and owns the JSON projection used in tool results, so
//! that timestamps and references always render the same way regardless of
//! which store backend produced them.

use chrono::{DateTime, Utc};
use serde_json::{Map, Number, Value, json};
use std::cmp::Ordering;
use std::collections::BTreeMap;

/// Field name to value mapping of a single document
pub type FieldMap = BTreeMap<String, DocumentValue>;

/// A single value stored in a document field
#[derive(Debug, Clone, PartialEq)]
pub enum DocumentValue {
    Null,
    Boolean(bool),
    Integer(i64),
    Double(f64),
    Timestamp(DateTime<Utc>),
    String(String),
    /// Base64 payload exactly as delivered by the store
    Bytes(String),
    /// Document path relative to the database root, e.g. `users/abc`
    Reference(String),
    GeoPoint {
        latitude: f64,
        longitude: f64,
    },
    Array(Vec<DocumentValue>),
    Map(FieldMap),
}

impl DocumentValue {
    /// Build a value from caller-supplied JSON.
    ///
    /// Integers that fit in an `i64` stay integers, every other number becomes
    /// a double. Strings are never reinterpreted as timestamps. Callers that
    /// must not lose precision check [`oversized_integer`] first.
    #[inline]
    pub fn from_json(value: Value) -> Self {
        match value {
            Value::Null => Self::Null,
            Value::Bool(b) => Self::Boolean(b),
            Value::Number(n) => n
                .as_i64()
                .map_or_else(|| Self::Double(n.as_f64().unwrap_or(f64::NAN)), Self::Integer),
            Value::String(s) => Self::String(s),
            Value::Array(items) => Self::Array(items.into_iter().map(Self::from_json).collect()),
            Value::Object(map) => Self::Map(fields_from_json(map)),
        }
    }

    /// Render the value for tool output.
    #[inline]
    pub fn to_json(&self) -> Value {
        match self {
            Self::Null => Value::Null,
            Self::Boolean(b) => Value::Bool(*b),
            Self::Integer(i) => Value::Number((*i).into()),
            Self::Double(d) => Number::from_f64(*d).map_or(Value::Null, Value::Number),
            Self::Timestamp(ts) => Value::String(ts.to_rfc3339()),
            Self::String(s) | Self::Bytes(s) | Self::Reference(s) => Value::String(s.clone()),
            Self::GeoPoint {
                latitude,
                longitude,
            } => json!({ "latitude": latitude, "longitude": longitude }),
            Self::Array(items) => Value::Array(items.iter().map(Self::to_json).collect()),
            Self::Map(fields) => fields_to_json(fields),
        }
    }

    /// Position of the value's type in Firestore's cross-type ordering
    #[inline]
    pub fn type_rank(&self) -> u8 {
        match self {
            Self::Null => 0,
            Self::Boolean(_) => 1,
            Self::Integer(_) | Self::Double(_) => 2,
            Self::Timestamp(_) => 3,
            Self::String(_) => 4,
            Self::Bytes(_) => 5,
            Self::Reference(_) => 6,
            Self::GeoPoint { .. } => 7,
            Self::Array(_) => 8,
            Self::Map(_) => 9,
        }
    }

    #[inline]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    #[inline]
    pub fn is_nan(&self) -> bool {
        matches!(self, Self::Double(d) if d.is_nan())
    }

    fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Integer(i) => Some(*i as f64),
            Self::Double(d) => Some(*d),
            _ => None,
        }
    }

    /// Compare two values of the same type class.
    ///
    /// Returns `None` when the types differ (integers and doubles share a
    /// class) or when a NaN is involved. Filters only ever match within a
    /// type class.
    #[inline]
    pub fn compare(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Self::Null, Self::Null) => Some(Ordering::Equal),
            (Self::Boolean(a), Self::Boolean(b)) => Some(a.cmp(b)),
            (Self::Integer(a), Self::Integer(b)) => Some(a.cmp(b)),
            (Self::Timestamp(a), Self::Timestamp(b)) => Some(a.cmp(b)),
            (Self::String(a), Self::String(b))
            | (Self::Bytes(a), Self::Bytes(b))
            | (Self::Reference(a), Self::Reference(b)) => Some(a.cmp(b)),
            (
                Self::GeoPoint {
                    latitude: lat_a,
                    longitude: lng_a,
                },
                Self::GeoPoint {
                    latitude: lat_b,
                    longitude: lng_b,
                },
            ) => match lat_a.partial_cmp(lat_b)? {
                Ordering::Equal => lng_a.partial_cmp(lng_b),
                ordering => Some(ordering),
            },
            (Self::Array(a), Self::Array(b)) => {
                for (left, right) in a.iter().zip(b) {
                    match left.total_cmp(right) {
                        Ordering::Equal => {}
                        ordering => return Some(ordering),
                    }
                }
                Some(a.len().cmp(&b.len()))
            }
            (Self::Map(a), Self::Map(b)) => {
                for ((key_a, left), (key_b, right)) in a.iter().zip(b) {
                    match key_a.cmp(key_b).then_with(|| left.total_cmp(right)) {
                        Ordering::Equal => {}
                        ordering => return Some(ordering),
                    }
                }
                Some(a.len().cmp(&b.len()))
            }
            _ => self.as_f64()?.partial_cmp(&other.as_f64()?),
        }
    }

    /// Total ordering across all values, used for sorting query results
    #[inline]
    pub fn total_cmp(&self, other: &Self) -> Ordering {
        self.type_rank()
            .cmp(&other.type_rank())
            .then_with(|| self.compare(other).unwrap_or(Ordering::Equal))
    }

    /// Equality with numeric cross-type semantics (`1 == 1.0`)
    #[inline]
    pub fn matches(&self, other: &Self) -> bool {
        self.compare(other) == Some(Ordering::Equal)
    }
}

/// First integer literal that does not fit a signed 64-bit integer
#[inline]
pub fn oversized_integer(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64().filter(|v| i64::try_from(*v).is_err()),
        Value::Array(items) => items.iter().find_map(oversized_integer),
        Value::Object(map) => map.values().find_map(oversized_integer),
        _ => None,
    }
}

/// Convert a JSON object into a field map
#[inline]
pub fn fields_from_json(map: Map<String, Value>) -> FieldMap {
    map.into_iter()
        .map(|(key, value)| (key, DocumentValue::from_json(value)))
        .collect()
}

/// Render a field map as a JSON object
#[inline]
pub fn fields_to_json(fields: &FieldMap) -> Value {
    Value::Object(
        fields
            .iter()
            .map(|(key, value)| (key.clone(), value.to_json()))
            .collect(),
    )
}

/// Resolve a dotted field path (`address.city`) through nested maps
#[inline]
pub fn lookup_path<'a>(fields: &'a FieldMap, path: &str) -> Option<&'a DocumentValue> {
    let mut segments = path.split('.');
    let mut current = fields.get(segments.next()?)?;
    for segment in segments {
        match current {
            DocumentValue::Map(inner) => current = inner.get(segment)?,
            _ => return None,
        }
    }
    Some(current)
}
