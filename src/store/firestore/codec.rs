//! Firestore REST wire format
//!
//! Values travel as single-key objects (`{"integerValue": "42"}`); documents
//! carry their full resource name. Structured queries are built here from a
//! [`QuerySpec`].

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{Map, Value, json};

use crate::store::query::{Direction, FilterClause, FilterOp, QuerySpec};
use crate::store::value::{DocumentValue, FieldMap};
use crate::store::{Document, StoreError};

/// Encoder/decoder bound to one database, needed to translate references
/// between full resource names and relative paths.
#[derive(Debug, Clone)]
pub struct WireCodec {
    /// `projects/{project}/databases/{database}/documents`
    documents_root: String,
}

fn wire_operator(op: FilterOp) -> &'static str {
    match op {
        FilterOp::Equal => "EQUAL",
        FilterOp::NotEqual => "NOT_EQUAL",
        FilterOp::LessThan => "LESS_THAN",
        FilterOp::LessThanOrEqual => "LESS_THAN_OR_EQUAL",
        FilterOp::GreaterThan => "GREATER_THAN",
        FilterOp::GreaterThanOrEqual => "GREATER_THAN_OR_EQUAL",
        FilterOp::ArrayContains => "ARRAY_CONTAINS",
        FilterOp::In => "IN",
        FilterOp::NotIn => "NOT_IN",
        FilterOp::ArrayContainsAny => "ARRAY_CONTAINS_ANY",
    }
}

fn invalid(message: impl Into<String>) -> StoreError {
    StoreError::InvalidResponse(message.into())
}

impl WireCodec {
    #[inline]
    pub fn new(project_id: &str, database_id: &str) -> Self {
        Self {
            documents_root: format!("projects/{}/databases/{}/documents", project_id, database_id),
        }
    }

    #[inline]
    pub fn documents_root(&self) -> &str {
        &self.documents_root
    }

    #[inline]
    pub fn encode_value(&self, value: &DocumentValue) -> Value {
        match value {
            DocumentValue::Null => json!({ "nullValue": null }),
            DocumentValue::Boolean(b) => json!({ "booleanValue": b }),
            DocumentValue::Integer(i) => json!({ "integerValue": i.to_string() }),
            DocumentValue::Double(d) if d.is_finite() => json!({ "doubleValue": d }),
            DocumentValue::Double(d) => {
                let text = if d.is_nan() {
                    "NaN"
                } else if d.is_sign_positive() {
                    "Infinity"
                } else {
                    "-Infinity"
                };
                json!({ "doubleValue": text })
            }
            DocumentValue::Timestamp(ts) => {
                json!({ "timestampValue": ts.to_rfc3339_opts(SecondsFormat::AutoSi, true) })
            }
            DocumentValue::String(s) => json!({ "stringValue": s }),
            DocumentValue::Bytes(b) => json!({ "bytesValue": b }),
            DocumentValue::Reference(path) => {
                json!({ "referenceValue": format!("{}/{}", self.documents_root, path) })
            }
            DocumentValue::GeoPoint {
                latitude,
                longitude,
            } => json!({ "geoPointValue": { "latitude": latitude, "longitude": longitude } }),
            DocumentValue::Array(items) => {
                let values: Vec<Value> = items.iter().map(|v| self.encode_value(v)).collect();
                json!({ "arrayValue": { "values": values } })
            }
            DocumentValue::Map(fields) => json!({ "mapValue": { "fields": self.encode_fields(fields) } }),
        }
    }

    #[inline]
    pub fn encode_fields(&self, fields: &FieldMap) -> Value {
        Value::Object(
            fields
                .iter()
                .map(|(key, value)| (key.clone(), self.encode_value(value)))
                .collect(),
        )
    }

    #[inline]
    pub fn decode_value(&self, value: &Value) -> Result<DocumentValue, StoreError> {
        let object = value
            .as_object()
            .ok_or_else(|| invalid(format!("Expected a typed value object, got {}", value)))?;
        let (kind, inner) = object
            .iter()
            .next()
            .ok_or_else(|| invalid("Empty typed value object"))?;

        match kind.as_str() {
            "nullValue" => Ok(DocumentValue::Null),
            "booleanValue" => inner
                .as_bool()
                .map(DocumentValue::Boolean)
                .ok_or_else(|| invalid(format!("Invalid booleanValue: {}", inner))),
            "integerValue" => match inner {
                Value::String(s) => s.parse().map(DocumentValue::Integer).ok(),
                Value::Number(n) => n.as_i64().map(DocumentValue::Integer),
                _ => None,
            }
            .ok_or_else(|| invalid(format!("Invalid integerValue: {}", inner))),
            "doubleValue" => match inner {
                Value::Number(n) => n.as_f64(),
                Value::String(s) => match s.as_str() {
                    "NaN" => Some(f64::NAN),
                    "Infinity" => Some(f64::INFINITY),
                    "-Infinity" => Some(f64::NEG_INFINITY),
                    other => other.parse().ok(),
                },
                _ => None,
            }
            .map(DocumentValue::Double)
            .ok_or_else(|| invalid(format!("Invalid doubleValue: {}", inner))),
            "timestampValue" => inner
                .as_str()
                .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
                .map(|ts| DocumentValue::Timestamp(ts.with_timezone(&Utc)))
                .ok_or_else(|| invalid(format!("Invalid timestampValue: {}", inner))),
            "stringValue" => Ok(DocumentValue::String(string_of(inner, kind)?)),
            "bytesValue" => Ok(DocumentValue::Bytes(string_of(inner, kind)?)),
            "referenceValue" => Ok(DocumentValue::Reference(
                self.relative_path(&string_of(inner, kind)?),
            )),
            "geoPointValue" => Ok(DocumentValue::GeoPoint {
                latitude: inner["latitude"].as_f64().unwrap_or_default(),
                longitude: inner["longitude"].as_f64().unwrap_or_default(),
            }),
            "arrayValue" => {
                let values = match inner.get("values") {
                    Some(Value::Array(values)) => values
                        .iter()
                        .map(|v| self.decode_value(v))
                        .collect::<Result<Vec<_>, _>>()?,
                    _ => Vec::new(),
                };
                Ok(DocumentValue::Array(values))
            }
            "mapValue" => Ok(DocumentValue::Map(self.decode_fields(inner.get("fields"))?)),
            other => Err(invalid(format!("Unsupported value type: {}", other))),
        }
    }

    #[inline]
    pub fn decode_fields(&self, fields: Option<&Value>) -> Result<FieldMap, StoreError> {
        match fields {
            Some(Value::Object(map)) => map
                .iter()
                .map(|(key, value)| Ok((key.clone(), self.decode_value(value)?)))
                .collect(),
            Some(Value::Null) | None => Ok(FieldMap::new()),
            Some(other) => Err(invalid(format!("Expected a fields object, got {}", other))),
        }
    }

    /// Decode a `Document` resource; the id is the last segment of its name
    #[inline]
    pub fn decode_document(&self, document: &Value) -> Result<Document, StoreError> {
        let name = document
            .get("name")
            .and_then(Value::as_str)
            .ok_or_else(|| invalid("Document without a name"))?;
        let id = name
            .rsplit('/')
            .next()
            .filter(|id| !id.is_empty())
            .ok_or_else(|| invalid(format!("Malformed document name: {}", name)))?;

        Ok(Document {
            id: id.to_string(),
            fields: self.decode_fields(document.get("fields"))?,
        })
    }

    /// Strip the database prefix from a full document resource name
    #[inline]
    pub fn relative_path(&self, name: &str) -> String {
        name.split_once("/documents/")
            .map_or_else(|| name.to_string(), |(_, path)| path.to_string())
    }

    /// Build the `runQuery` request body. `collection_id` is the last path
    /// segment of the queried collection.
    #[inline]
    pub fn run_query_body(&self, query: &QuerySpec, collection_id: &str) -> Value {
        let mut structured = Map::new();
        structured.insert("from".to_string(), json!([{ "collectionId": collection_id }]));

        let mut filters: Vec<Value> = query.filters.iter().map(|c| self.encode_filter(c)).collect();
        match filters.len() {
            0 => {}
            1 => {
                structured.insert("where".to_string(), filters.remove(0));
            }
            _ => {
                structured.insert(
                    "where".to_string(),
                    json!({ "compositeFilter": { "op": "AND", "filters": filters } }),
                );
            }
        }

        if let Some(order) = &query.order_by {
            let direction = match order.direction {
                Direction::Ascending => "ASCENDING",
                Direction::Descending => "DESCENDING",
            };
            structured.insert(
                "orderBy".to_string(),
                json!([{ "field": { "fieldPath": order.field }, "direction": direction }]),
            );
        }

        if let Some(limit) = query.limit {
            structured.insert("limit".to_string(), json!(limit));
        }

        json!({ "structuredQuery": structured })
    }

    fn encode_filter(&self, clause: &FilterClause) -> Value {
        // Null and NaN equality are only expressible as unary filters
        let unary = match (clause.op, &clause.value) {
            (FilterOp::Equal, v) if v.is_null() => Some("IS_NULL"),
            (FilterOp::NotEqual, v) if v.is_null() => Some("IS_NOT_NULL"),
            (FilterOp::Equal, v) if v.is_nan() => Some("IS_NAN"),
            (FilterOp::NotEqual, v) if v.is_nan() => Some("IS_NOT_NAN"),
            _ => None,
        };

        match unary {
            Some(op) => json!({
                "unaryFilter": { "op": op, "field": { "fieldPath": clause.field } }
            }),
            None => json!({
                "fieldFilter": {
                    "field": { "fieldPath": clause.field },
                    "op": wire_operator(clause.op),
                    "value": self.encode_value(&clause.value),
                }
            }),
        }
    }
}

fn string_of(value: &Value, kind: &str) -> Result<String, StoreError> {
    value
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| invalid(format!("Invalid {}: {}", kind, value)))
}
