//! MCP (Model Context Protocol) Server Implementation
//!
//! JSON-RPC 2.0 server exposing Firestore collections as tools and resources.


pub mod errors;
pub mod protocol;
pub mod resources;
pub mod server;
pub mod tools;
pub mod validation;

pub use errors::{McpError, McpResult};
pub use resources::CollectionResources;
pub use server::McpServer;
pub use tools::{FirestoreTools, ToolCall, ValidationError};
