//! Orderly MCP - Model Context Protocol client
//!
//! The tool server that exposes cart, inventory and the other capabilities
//! speaks MCP. This crate provides the JSON-RPC protocol types, the stdio and
//! SSE transports, and a client that performs the handshake, lists tools and
//! calls them.

pub mod client;
pub mod protocol;
pub mod transport;

pub use client::{ClientInfo, ContentItem, McpClient, McpError, ServerInfo, ToolCallResult};
pub use transport::{SseTransport, StdioTransport, Transport};

use serde::{Deserialize, Serialize};

/// MCP protocol version
pub const PROTOCOL_VERSION: &str = "2024-11-05";

/// Tool definition in MCP format
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpTool {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(rename = "inputSchema", default)]
    pub input_schema: serde_json::Value,
}

/// Server capabilities
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServerCapabilities {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<ToolsCapability>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ToolsCapability {
    #[serde(rename = "listChanged", default)]
    pub list_changed: bool,
}
