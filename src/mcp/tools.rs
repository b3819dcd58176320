//! MCP Tools Implementation
//!
//! The closed catalog of Firestore tools. Incoming calls are parsed into a
//! [`ToolCall`] before anything touches the store; every outcome, including
//! validation and store failures, is reported as a `CallToolResult`.

use crate::mcp::protocol::*;
use crate::mcp::server::ToolHandler;
use crate::store::value::{fields_from_json, oversized_integer};
use crate::store::{
    Direction, Document, DocumentValue, FieldMap, FilterClause, FilterOp, OrderSpec, QuerySpec,
    StoreConnector,
};
use anyhow::Result;
use async_trait::async_trait;
use serde_json::{Map, Value, json};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, warn};

pub const LIST_COLLECTIONS: &str = "list-collections";
pub const GET_COLLECTION: &str = "get-collection";
pub const QUERY_COLLECTION: &str = "query-collection";
pub const CREATE_DOCUMENT: &str = "create-document";

/// Why a tool call was rejected before execution
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    #[error("Missing arguments")]
    MissingArguments,

    #[error("Missing required argument '{field}' for {tool}")]
    MissingArgument {
        tool: &'static str,
        field: &'static str,
    },

    #[error("Invalid argument '{field}' for {tool}: {reason}")]
    InvalidArgument {
        tool: &'static str,
        field: &'static str,
        reason: String,
    },
}

/// A validated tool invocation
#[derive(Debug, Clone, PartialEq)]
pub enum ToolCall {
    ListCollections,
    GetCollection { collection: String },
    QueryCollection(QuerySpec),
    CreateDocument { collection: String, data: FieldMap },
}

/// Argument bag of one call, bound to the tool it belongs to
struct Arguments<'a> {
    tool: &'static str,
    values: &'a Map<String, Value>,
}

impl<'a> Arguments<'a> {
    fn invalid(&self, field: &'static str, reason: impl Into<String>) -> ValidationError {
        ValidationError::InvalidArgument {
            tool: self.tool,
            field,
            reason: reason.into(),
        }
    }

    /// Present and non-null value of an argument
    fn get(&self, field: &str) -> Option<&'a Value> {
        self.values.get(field).filter(|v| !v.is_null())
    }

    fn required(&self, field: &'static str) -> Result<&'a Value, ValidationError> {
        self.get(field).ok_or(ValidationError::MissingArgument {
            tool: self.tool,
            field,
        })
    }

    fn collection(&self) -> Result<String, ValidationError> {
        let name = self
            .required("collection")?
            .as_str()
            .ok_or_else(|| self.invalid("collection", "expected a string"))?;
        if name.trim().is_empty() {
            return Err(self.invalid("collection", "must not be empty"));
        }
        Ok(name.to_string())
    }

    fn document_data(&self) -> Result<FieldMap, ValidationError> {
        match self.required("document_data")? {
            Value::Object(map) => match map.values().find_map(oversized_integer) {
                Some(n) => Err(self.invalid(
                    "document_data",
                    format!("integer {} is outside the signed 64-bit range", n),
                )),
                None => Ok(fields_from_json(map.clone())),
            },
            _ => Err(self.invalid("document_data", "expected an object")),
        }
    }

    fn filters(&self) -> Result<Vec<FilterClause>, ValidationError> {
        let Some(value) = self.get("where") else {
            return Ok(Vec::new());
        };
        let clauses = value
            .as_array()
            .ok_or_else(|| self.invalid("where", "expected an array of [field, operator, value]"))?;

        clauses
            .iter()
            .enumerate()
            .map(|(index, clause)| self.filter_clause(index, clause))
            .collect()
    }

    fn filter_clause(&self, index: usize, clause: &Value) -> Result<FilterClause, ValidationError> {
        let parts = match clause.as_array() {
            Some(parts) if parts.len() == 3 => parts,
            _ => {
                return Err(self.invalid(
                    "where",
                    format!("clause {} must be a [field, operator, value] tuple", index),
                ));
            }
        };

        let field = match parts[0].as_str() {
            Some(field) if !field.trim().is_empty() => field.to_string(),
            _ => {
                return Err(self.invalid(
                    "where",
                    format!("clause {} field must be a non-empty string", index),
                ));
            }
        };

        let op: FilterOp = parts[1]
            .as_str()
            .ok_or_else(|| self.invalid("where", format!("clause {} operator must be a string", index)))?
            .parse()
            .map_err(|e| self.invalid("where", format!("clause {}: {}", index, e)))?;

        if let Some(n) = oversized_integer(&parts[2]) {
            return Err(self.invalid(
                "where",
                format!("clause {}: integer {} is outside the signed 64-bit range", index, n),
            ));
        }

        if op.takes_list() && !parts[2].is_array() {
            return Err(self.invalid(
                "where",
                format!("clause {}: operator '{}' requires an array value", index, op),
            ));
        }

        Ok(FilterClause {
            field,
            op,
            value: DocumentValue::from_json(parts[2].clone()),
        })
    }

    fn limit(&self) -> Result<Option<u32>, ValidationError> {
        let Some(value) = self.get("limit") else {
            return Ok(None);
        };
        value
            .as_u64()
            .and_then(|limit| u32::try_from(limit).ok())
            .map(Some)
            .ok_or_else(|| self.invalid("limit", "expected a non-negative integer"))
    }

    fn order_by(&self) -> Result<Option<OrderSpec>, ValidationError> {
        let Some(value) = self.get("orderBy") else {
            return Ok(None);
        };
        let order = value
            .as_object()
            .ok_or_else(|| self.invalid("orderBy", "expected an object with 'field' and 'direction'"))?;

        let field = match order.get("field").and_then(Value::as_str) {
            Some(field) if !field.trim().is_empty() => field.to_string(),
            _ => return Err(self.invalid("orderBy", "'field' must be a non-empty string")),
        };

        Ok(Some(OrderSpec {
            field,
            direction: Direction::from_arg(order.get("direction").and_then(Value::as_str)),
        }))
    }
}

impl ToolCall {
    /// Validate a raw `tools/call` into a typed call
    #[inline]
    pub fn parse(name: &str, arguments: Option<&Map<String, Value>>) -> Result<Self, ValidationError> {
        let tool = match name {
            LIST_COLLECTIONS => return Ok(Self::ListCollections),
            GET_COLLECTION => GET_COLLECTION,
            QUERY_COLLECTION => QUERY_COLLECTION,
            CREATE_DOCUMENT => CREATE_DOCUMENT,
            other => return Err(ValidationError::UnknownTool(other.to_string())),
        };

        let values = arguments
            .filter(|args| !args.is_empty())
            .ok_or(ValidationError::MissingArguments)?;
        let args = Arguments { tool, values };

        match tool {
            GET_COLLECTION => Ok(Self::GetCollection {
                collection: args.collection()?,
            }),
            QUERY_COLLECTION => Ok(Self::QueryCollection(QuerySpec {
                collection: args.collection()?,
                filters: args.filters()?,
                order_by: args.order_by()?,
                limit: args.limit()?,
            })),
            _ => Ok(Self::CreateDocument {
                collection: args.collection()?,
                data: args.document_data()?,
            }),
        }
    }

    /// Wire name of the tool
    #[inline]
    pub fn name(&self) -> &'static str {
        match self {
            Self::ListCollections => LIST_COLLECTIONS,
            Self::GetCollection { .. } => GET_COLLECTION,
            Self::QueryCollection(_) => QUERY_COLLECTION,
            Self::CreateDocument { .. } => CREATE_DOCUMENT,
        }
    }
}

/// Tool handler backed by the shared store connector
pub struct FirestoreTools {
    connector: Arc<StoreConnector>,
}

fn documents_json(documents: &[Document]) -> Result<String> {
    let values: Vec<Value> = documents.iter().map(Document::to_json).collect();
    Ok(serde_json::to_string_pretty(&values)?)
}

impl FirestoreTools {
    #[inline]
    pub fn new(connector: Arc<StoreConnector>) -> Self {
        Self { connector }
    }

    /// Definitions advertised by `tools/list`
    #[inline]
    pub fn tool_definitions() -> Vec<Tool> {
        vec![
            Tool {
                name: LIST_COLLECTIONS.to_string(),
                description: Some("List all collections in the database".to_string()),
                input_schema: json!({
                    "type": "object",
                    "properties": {}
                }),
            },
            Tool {
                name: GET_COLLECTION.to_string(),
                description: Some("Get all documents from a collection".to_string()),
                input_schema: json!({
                    "type": "object",
                    "properties": {
                        "collection": {"type": "string"}
                    },
                    "required": ["collection"]
                }),
            },
            Tool {
                name: QUERY_COLLECTION.to_string(),
                description: Some(
                    "Query documents in a collection with filters, ordering and a limit"
                        .to_string(),
                ),
                input_schema: json!({
                    "type": "object",
                    "properties": {
                        "collection": {"type": "string"},
                        "where": {
                            "type": "array",
                            "description": "Filters as [field, operator, value] tuples, all of which must match. Operators: ==, !=, <, <=, >, >=, array-contains, in, not-in, array-contains-any",
                            "items": {
                                "type": "array",
                                "minItems": 3,
                                "maxItems": 3
                            }
                        },
                        "limit": {
                            "type": "integer",
                            "minimum": 0,
                            "description": "Maximum number of documents to return"
                        },
                        "orderBy": {
                            "type": "object",
                            "properties": {
                                "field": {"type": "string"},
                                "direction": {"type": "string", "enum": ["asc", "desc"]}
                            },
                            "required": ["field"]
                        }
                    },
                    "required": ["collection"]
                }),
            },
            Tool {
                name: CREATE_DOCUMENT.to_string(),
                description: Some("Create a new document in an existing collection".to_string()),
                input_schema: json!({
                    "type": "object",
                    "properties": {
                        "collection": {"type": "string"},
                        "document_data": {"type": "object"}
                    },
                    "required": ["collection", "document_data"]
                }),
            },
        ]
    }

    /// Run a validated call and render its success text
    #[inline]
    pub async fn execute(&self, call: ToolCall) -> Result<String> {
        match call {
            ToolCall::ListCollections => {
                let collections = self.connector.list_collections().await?;
                let values: Vec<Value> = collections
                    .iter()
                    .map(|collection| json!({ "name": collection.name }))
                    .collect();
                Ok(serde_json::to_string_pretty(&values)?)
            }
            ToolCall::GetCollection { collection } => {
                documents_json(&self.connector.list_documents(&collection).await?)
            }
            ToolCall::QueryCollection(query) => {
                documents_json(&self.connector.run_query(&query).await?)
            }
            ToolCall::CreateDocument { collection, data } => {
                let id = self
                    .connector
                    .create_document(&collection, data, None)
                    .await?;
                Ok(format!(
                    "Created new document with ID {} in '{}'",
                    id, collection
                ))
            }
        }
    }

    /// Parse, execute and wrap the outcome of one call
    #[inline]
    pub async fn dispatch(&self, name: &str, arguments: Option<&Map<String, Value>>) -> CallToolResult {
        let call = match ToolCall::parse(name, arguments) {
            Ok(call) => call,
            Err(e) => {
                warn!("Rejected call to {}: {}", name, e);
                return CallToolResult::error(format!("Error: {}", e));
            }
        };

        let tool = call.name();
        debug!("Executing {}: {:?}", tool, call);
        match self.execute(call).await {
            Ok(text) => CallToolResult::text(text),
            Err(e) => {
                error!("Error executing {}: {}", tool, e);
                CallToolResult::error(format!("Error executing {}: {}", tool, e))
            }
        }
    }
}

#[async_trait]
impl ToolHandler for FirestoreTools {
    #[inline]
    fn list_tools(&self) -> Vec<Tool> {
        Self::tool_definitions()
    }

    #[inline]
    async fn call_tool(&self, params: CallToolParams) -> Result<CallToolResult> {
        Ok(self.dispatch(&params.name, params.arguments.as_ref()).await)
    }
}
