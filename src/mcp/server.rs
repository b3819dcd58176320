//! MCP Server Implementation
//!
//! Connection handling, lifecycle bookkeeping and method routing. The serve
//! loop handles one line at a time: a request is answered before the next
//! line is read.

use crate::mcp::errors::{McpError, McpResult};
use crate::mcp::protocol::*;
use crate::mcp::validation::McpValidator;
use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::{self, AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

/// MCP Server state and configuration
pub struct McpServer {
    /// Server implementation information
    pub server_info: Implementation,
    /// Server capabilities
    pub capabilities: ServerCapabilities,
    instructions: Option<String>,
    tools: Arc<dyn ToolHandler>,
    resources: Arc<dyn ResourceHandler>,
    connection_state: Arc<RwLock<ConnectionState>>,
    negotiated_version: Arc<RwLock<Option<String>>>,
    validator: McpValidator,
    started_at: Instant,
}

/// Connection state tracking
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ConnectionState {
    Uninitialized,
    Initializing,
    Ready,
    Closed,
}

/// Tool catalog and execution
#[async_trait]
pub trait ToolHandler: Send + Sync {
    fn list_tools(&self) -> Vec<Tool>;

    /// Execute a tool. Failures of the tool itself belong in the returned
    /// result; `Err` is reserved for faults of the server.
    async fn call_tool(&self, params: CallToolParams) -> Result<CallToolResult>;
}

/// Resource enumeration and access
#[async_trait]
pub trait ResourceHandler: Send + Sync {
    async fn list_resources(&self) -> Vec<Resource>;

    fn list_templates(&self) -> Vec<ResourceTemplate>;

    async fn read_resource(&self, uri: &str) -> McpResult<ReadResourceResult>;
}

/// Uptime and registration summary
#[derive(Debug, Clone, Serialize)]
pub struct ServerHealthStatus {
    pub connection_state: ConnectionState,
    pub tools_registered: usize,
    pub uptime: Duration,
}

/// Serialize a method result; failures here are server faults
fn to_result<T: Serialize>(result: &T) -> McpResult<Value> {
    serde_json::to_value(result).map_err(|e| McpError::InternalError {
        message: format!("Failed to serialize result: {}", e),
    })
}

/// Message handler for processing incoming messages
pub struct MessageHandler {
    server: Arc<McpServer>,
}

impl McpServer {
    /// Create a new MCP server
    #[inline]
    pub fn new(
        name: impl Into<String>,
        version: impl Into<String>,
        tools: Arc<dyn ToolHandler>,
        resources: Arc<dyn ResourceHandler>,
    ) -> Result<Self> {
        let capabilities = ServerCapabilities {
            experimental: None,
            resources: Some(ResourcesCapability {
                subscribe: Some(false),
                list_changed: Some(false),
            }),
            tools: Some(ToolsCapability {
                list_changed: Some(false),
            }),
        };

        let validator = McpValidator::new()?;

        Ok(Self {
            server_info: Implementation {
                name: name.into(),
                version: version.into(),
            },
            capabilities,
            instructions: None,
            tools,
            resources,
            connection_state: Arc::new(RwLock::new(ConnectionState::Uninitialized)),
            negotiated_version: Arc::new(RwLock::new(None)),
            validator,
            started_at: Instant::now(),
        })
    }

    /// Instructions returned to the client on initialize
    #[inline]
    #[must_use]
    pub fn with_instructions(mut self, instructions: impl Into<String>) -> Self {
        self.instructions = Some(instructions.into());
        self
    }

    /// Start the server using stdio transport
    #[inline]
    pub async fn serve_stdio(self: Arc<Self>) -> Result<()> {
        info!("Starting MCP server with stdio transport");
        self.serve(BufReader::new(io::stdin()), io::stdout()).await
    }

    /// Serve newline-delimited JSON-RPC until the reader reaches EOF
    #[inline]
    pub async fn serve<R, W>(self: Arc<Self>, mut reader: R, mut writer: W) -> Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let handler = MessageHandler::new(Arc::clone(&self));
        let mut line = String::new();

        loop {
            line.clear();
            match reader.read_line(&mut line).await {
                Ok(0) => {
                    info!("EOF reached, closing connection");
                    break;
                }
                Ok(_) => {
                    let trimmed = line.trim();
                    if trimmed.is_empty() {
                        continue;
                    }

                    if let Some(reply) = handler.handle_line(trimmed).await {
                        self.send_message(&mut writer, &reply).await?;
                    }
                }
                Err(e) => {
                    error!("Error reading from transport: {}", e);
                    break;
                }
            }
        }

        *self.connection_state.write().await = ConnectionState::Closed;
        let health = self.health_status().await;
        info!("MCP server stopped after {:?}", health.uptime);
        Ok(())
    }

    /// Send a message to the client
    async fn send_message<W>(&self, writer: &mut W, message: &JsonRpcMessage) -> Result<()>
    where
        W: AsyncWrite + Unpin,
    {
        let json = serde_json::to_string(message)?;
        writer.write_all(json.as_bytes()).await?;
        writer.write_all(b"\n").await?;
        writer.flush().await?;
        Ok(())
    }

    /// Get current connection state
    #[inline]
    pub async fn connection_state(&self) -> ConnectionState {
        *self.connection_state.read().await
    }

    /// Protocol version agreed during initialize
    #[inline]
    pub async fn negotiated_version(&self) -> Option<String> {
        self.negotiated_version.read().await.clone()
    }

    #[inline]
    pub async fn health_status(&self) -> ServerHealthStatus {
        ServerHealthStatus {
            connection_state: self.connection_state().await,
            tools_registered: self.tools.list_tools().len(),
            uptime: self.started_at.elapsed(),
        }
    }
}

impl MessageHandler {
    /// Create a new message handler
    #[inline]
    pub fn new(server: Arc<McpServer>) -> Self {
        Self { server }
    }

    /// Handle one transport line, returning the reply to write, if any
    #[inline]
    pub async fn handle_line(&self, line: &str) -> Option<JsonRpcMessage> {
        let raw_value: Value = match serde_json::from_str(line) {
            Ok(value) => value,
            Err(e) => {
                let error = McpError::ParseError {
                    message: e.to_string(),
                };
                error.log();
                return Some(error.to_error_response(None));
            }
        };

        match self.server.validator.validate_raw_message(&raw_value) {
            Ok(message) => self.process_message(message).await,
            Err(e) => {
                e.log();
                Some(e.to_error_response(self.server.validator.request_id(&raw_value)))
            }
        }
    }

    /// Process an incoming message
    #[inline]
    pub async fn process_message(&self, message: JsonRpcMessage) -> Option<JsonRpcMessage> {
        match message {
            JsonRpcMessage::Request(request) => Some(self.handle_request(request).await),
            JsonRpcMessage::Notification(notification) => {
                self.handle_notification(notification).await;
                None
            }
            JsonRpcMessage::Response(_) | JsonRpcMessage::ErrorResponse(_) => {
                warn!("Received unexpected response message from client");
                None
            }
        }
    }

    /// Handle a JSON-RPC request
    async fn handle_request(&self, request: JsonRpcRequest) -> JsonRpcMessage {
        debug!("Handling request {}", request.method);
        let response = match request.method.as_str() {
            "initialize" => self.handle_initialize(request.params).await,
            "ping" => Ok(json!({})),
            "tools/list" => self.handle_list_tools(),
            "tools/call" => self.handle_call_tool(request.params).await,
            "resources/list" => self.handle_list_resources().await,
            "resources/templates/list" => self.handle_list_resource_templates(),
            "resources/read" => self.handle_read_resource(request.params).await,
            other => Err(McpError::MethodNotFound {
                method: other.to_string(),
            }),
        };

        match response {
            Ok(result) => JsonRpcMessage::Response(JsonRpcResponse::new(result, request.id)),
            Err(e) => {
                e.log();
                e.to_error_response(Some(request.id))
            }
        }
    }

    /// Handle a JSON-RPC notification
    async fn handle_notification(&self, notification: JsonRpcNotification) {
        match notification.method.as_str() {
            "notifications/initialized" | "initialized" => {
                *self.server.connection_state.write().await = ConnectionState::Ready;
                info!("Server ready to handle requests");
            }
            "notifications/cancelled" => {
                debug!("Received cancellation notification");
            }
            _ => {
                warn!("Unknown notification method: {}", notification.method);
            }
        }
    }

    /// Handle initialize request
    async fn handle_initialize(&self, params: Option<Value>) -> McpResult<Value> {
        let params: InitializeParams = match params {
            Some(p) => serde_json::from_value(p)?,
            None => {
                return Err(McpError::InvalidParameters {
                    message: "Initialize request missing parameters".to_string(),
                });
            }
        };

        let validator = &self.server.validator;
        if !validator.is_protocol_version_supported(&params.protocol_version) {
            return Err(McpError::UnsupportedProtocolVersion {
                version: params.protocol_version,
                supported: validator
                    .supported_protocol_versions()
                    .into_iter()
                    .map(str::to_string)
                    .collect(),
            });
        }

        *self.server.connection_state.write().await = ConnectionState::Initializing;
        *self.server.negotiated_version.write().await = Some(params.protocol_version.clone());

        let result = InitializeResult {
            protocol_version: params.protocol_version,
            capabilities: self.server.capabilities.clone(),
            server_info: self.server.server_info.clone(),
            instructions: self.server.instructions.clone(),
        };

        info!(
            "Client initialized: {} {}",
            params.client_info.name, params.client_info.version
        );
        to_result(&result)
    }

    /// Handle list tools request
    fn handle_list_tools(&self) -> McpResult<Value> {
        let result = ListToolsResult {
            tools: self.server.tools.list_tools(),
        };
        to_result(&result)
    }

    /// Handle call tool request
    async fn handle_call_tool(&self, params: Option<Value>) -> McpResult<Value> {
        let params: CallToolParams = match params {
            Some(p) => serde_json::from_value(p)?,
            None => {
                return Err(McpError::InvalidParameters {
                    message: "Tool call request missing parameters".to_string(),
                });
            }
        };

        debug!("Calling tool {}", params.name);
        let result = self.server.tools.call_tool(params).await?;
        to_result(&result)
    }

    /// Handle list resources request
    async fn handle_list_resources(&self) -> McpResult<Value> {
        let result = ListResourcesResult {
            resources: self.server.resources.list_resources().await,
        };
        to_result(&result)
    }

    fn handle_list_resource_templates(&self) -> McpResult<Value> {
        let result = ListResourceTemplatesResult {
            resource_templates: self.server.resources.list_templates(),
        };
        to_result(&result)
    }

    /// Handle read resource request
    async fn handle_read_resource(&self, params: Option<Value>) -> McpResult<Value> {
        let uri = params
            .as_ref()
            .and_then(|p| p.get("uri"))
            .and_then(Value::as_str)
            .ok_or_else(|| McpError::InvalidParameters {
                message: "Missing required parameter: uri".to_string(),
            })?;

        let result = self.server.resources.read_resource(uri).await?;
        to_result(&result)
    }
}
