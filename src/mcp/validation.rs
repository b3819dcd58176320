//! MCP Message Validation
//!
//! JSON schema validation of incoming JSON-RPC envelopes and of the
//! parameters of the methods this server routes. A message that passes
//! validation can be deserialized into the typed protocol structs without
//! surprises.

use crate::mcp::errors::{McpError, McpResult};
use crate::mcp::protocol::*;
use anyhow::{Result, anyhow};
use jsonschema::{Draft, JSONSchema};
use serde_json::{Value, json};
use std::collections::HashMap;
use tracing::debug;

const REQUEST_SCHEMA: &str = "jsonrpc_request";
const NOTIFICATION_SCHEMA: &str = "jsonrpc_notification";
const RESPONSE_SCHEMA: &str = "jsonrpc_response";
const ERROR_RESPONSE_SCHEMA: &str = "jsonrpc_error_response";

/// JSON Schema validator for MCP messages
pub struct McpValidator {
    schemas: HashMap<&'static str, JSONSchema>,
}

fn request_id_schema() -> Value {
    json!({
        "oneOf": [
            {"type": "string"},
            {"type": "integer"}
        ]
    })
}

/// Envelope failures are invalid requests rather than invalid params
fn as_invalid_request(error: McpError) -> McpError {
    match error {
        McpError::InvalidParameters { message } => McpError::InvalidRequest { message },
        other => other,
    }
}

impl McpValidator {
    /// Create a new MCP validator with built-in schemas
    #[inline]
    pub fn new() -> Result<Self> {
        let mut validator = Self {
            schemas: HashMap::new(),
        };

        validator.load_builtin_schemas()?;

        Ok(validator)
    }

    fn load_builtin_schemas(&mut self) -> Result<()> {
        let request_schema = json!({
            "type": "object",
            "properties": {
                "jsonrpc": {"type": "string", "const": JSONRPC_VERSION},
                "method": {"type": "string"},
                "params": {"type": ["object", "array", "null"]},
                "id": request_id_schema()
            },
            "required": ["jsonrpc", "method", "id"]
        });
        self.add_schema(REQUEST_SCHEMA, &request_schema)?;

        let notification_schema = json!({
            "type": "object",
            "properties": {
                "jsonrpc": {"type": "string", "const": JSONRPC_VERSION},
                "method": {"type": "string"},
                "params": {"type": ["object", "array", "null"]}
            },
            "required": ["jsonrpc", "method"]
        });
        self.add_schema(NOTIFICATION_SCHEMA, &notification_schema)?;

        let response_schema = json!({
            "type": "object",
            "properties": {
                "jsonrpc": {"type": "string", "const": JSONRPC_VERSION},
                "result": {},
                "id": request_id_schema()
            },
            "required": ["jsonrpc", "result", "id"]
        });
        self.add_schema(RESPONSE_SCHEMA, &response_schema)?;

        let error_response_schema = json!({
            "type": "object",
            "properties": {
                "jsonrpc": {"type": "string", "const": JSONRPC_VERSION},
                "error": {
                    "type": "object",
                    "properties": {
                        "code": {"type": "integer"},
                        "message": {"type": "string"},
                        "data": {}
                    },
                    "required": ["code", "message"]
                },
                "id": {
                    "oneOf": [
                        {"type": "string"},
                        {"type": "integer"},
                        {"type": "null"}
                    ]
                }
            },
            "required": ["jsonrpc", "error", "id"]
        });
        self.add_schema(ERROR_RESPONSE_SCHEMA, &error_response_schema)?;

        let initialize_schema = json!({
            "type": "object",
            "properties": {
                "protocolVersion": {"type": "string"},
                "capabilities": {"type": "object"},
                "clientInfo": {
                    "type": "object",
                    "properties": {
                        "name": {"type": "string"},
                        "version": {"type": "string"}
                    },
                    "required": ["name", "version"]
                }
            },
            "required": ["protocolVersion", "clientInfo"]
        });
        self.add_schema("initialize", &initialize_schema)?;

        let tool_call_schema = json!({
            "type": "object",
            "properties": {
                "name": {"type": "string"},
                "arguments": {"type": ["object", "null"]}
            },
            "required": ["name"]
        });
        self.add_schema("tools/call", &tool_call_schema)?;

        let read_resource_schema = json!({
            "type": "object",
            "properties": {
                "uri": {"type": "string"}
            },
            "required": ["uri"]
        });
        self.add_schema("resources/read", &read_resource_schema)?;

        debug!("Loaded {} built-in JSON schemas", self.schemas.len());
        Ok(())
    }

    fn add_schema(&mut self, name: &'static str, schema: &Value) -> Result<()> {
        let compiled = JSONSchema::options()
            .with_draft(Draft::Draft7)
            .compile(schema)
            .map_err(|e| anyhow!("Failed to compile schema '{}': {}", name, e))?;

        self.schemas.insert(name, compiled);
        Ok(())
    }

    /// Validate a value against a named schema
    #[inline]
    pub fn validate_with_schema(&self, schema_name: &str, value: &Value) -> McpResult<()> {
        let schema = self
            .schemas
            .get(schema_name)
            .ok_or_else(|| McpError::InternalError {
                message: format!("Schema '{}' not found", schema_name),
            })?;

        match schema.validate(value) {
            Ok(()) => Ok(()),
            Err(mut errors) => Err(errors.next().map_or_else(
                || McpError::InvalidParameters {
                    message: format!("Schema validation failed for '{}'", schema_name),
                },
                McpError::from,
            )),
        }
    }

    /// Validate a raw JSON value as a JSON-RPC message and classify it
    #[inline]
    pub fn validate_raw_message(&self, value: &Value) -> McpResult<JsonRpcMessage> {
        let schema_name = if value.get("method").is_some() {
            if value.get("id").is_some() {
                REQUEST_SCHEMA
            } else {
                NOTIFICATION_SCHEMA
            }
        } else if value.get("result").is_some() {
            RESPONSE_SCHEMA
        } else if value.get("error").is_some() {
            ERROR_RESPONSE_SCHEMA
        } else {
            return Err(McpError::InvalidRequest {
                message: "Value does not match any known JSON-RPC message type".to_string(),
            });
        };

        self.validate_with_schema(schema_name, value)
            .map_err(as_invalid_request)?;

        let message = match schema_name {
            REQUEST_SCHEMA => {
                let request: JsonRpcRequest = serde_json::from_value(value.clone())?;
                if let Some(params) = &request.params {
                    self.validate_method_params(&request.method, params)?;
                }
                JsonRpcMessage::Request(request)
            }
            NOTIFICATION_SCHEMA => JsonRpcMessage::Notification(serde_json::from_value(value.clone())?),
            RESPONSE_SCHEMA => JsonRpcMessage::Response(serde_json::from_value(value.clone())?),
            _ => JsonRpcMessage::ErrorResponse(serde_json::from_value(value.clone())?),
        };

        Ok(message)
    }

    /// Validate method-specific parameters
    fn validate_method_params(&self, method: &str, params: &Value) -> McpResult<()> {
        if self.schemas.contains_key(method) {
            self.validate_with_schema(method, params)
        } else {
            debug!("No parameter validation schema for method: {}", method);
            Ok(())
        }
    }

    /// Best-effort request id of a message that failed validation
    #[inline]
    pub fn request_id(&self, value: &Value) -> Option<RequestId> {
        value
            .get("id")
            .filter(|id| id.is_string() || id.as_i64().is_some())
            .and_then(|id| serde_json::from_value(id.clone()).ok())
    }

    /// Check if a protocol version is supported
    #[inline]
    pub fn is_protocol_version_supported(&self, version: &str) -> bool {
        SUPPORTED_PROTOCOL_VERSIONS.contains(&version)
    }

    /// Get supported protocol versions
    #[inline]
    pub fn supported_protocol_versions(&self) -> Vec<&'static str> {
        SUPPORTED_PROTOCOL_VERSIONS.to_vec()
    }
}
