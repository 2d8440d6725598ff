//! MCP tool registry
//!
//! Bridges an MCP server session to the [`ToolRegistry`] contract. Results
//! flagged `isError` become [`ToolError::ExecutionFailed`]; a lost transport
//! becomes [`ToolError::Unavailable`].

use std::sync::Arc;

use async_trait::async_trait;
use orderly_mcp::{ClientInfo, McpClient, McpError, SseTransport, StdioTransport, ToolCallResult, Transport};
use serde_json::Value;
use tracing::{debug, info};

use super::{ToolConnector, ToolDescriptor, ToolRegistry};
use crate::config::{McpConfig, McpTransportKind};
use crate::error::{Error, Result, ToolError};

/// Registry backed by a live MCP client session
pub struct McpToolRegistry {
    client: McpClient<Box<dyn Transport>>,
}

impl McpToolRegistry {
    pub fn new(client: McpClient<Box<dyn Transport>>) -> Self {
        Self { client }
    }
}

/// Payload handed back to the model: parsed JSON when the text is JSON
fn result_value(result: &ToolCallResult) -> Value {
    let text = result.text();
    serde_json::from_str(&text).unwrap_or(Value::String(text))
}

fn map_call_error(name: &str, error: McpError) -> ToolError {
    match error {
        McpError::Transport(msg) => ToolError::Unavailable(msg),
        McpError::InvalidParams(msg) => ToolError::InvalidParams(format!("{}: {}", name, msg)),
        McpError::Server(msg) if msg.to_lowercase().contains("unknown tool") => {
            ToolError::NotFound(name.to_string())
        }
        McpError::Server(msg) | McpError::Protocol(msg) => {
            ToolError::ExecutionFailed(format!("MCP tool '{}' failed: {}", name, msg))
        }
    }
}

#[async_trait]
impl ToolRegistry for McpToolRegistry {
    async fn list_tools(&self) -> Result<Vec<ToolDescriptor>> {
        let tools = self
            .client
            .list_tools()
            .await
            .map_err(|e| Error::Session(format!("Failed to list tools: {}", e)))?;

        Ok(tools
            .into_iter()
            .map(|t| ToolDescriptor::new(t.name, t.description, t.input_schema))
            .collect())
    }

    async fn invoke(&self, name: &str, arguments: Value) -> std::result::Result<Value, ToolError> {
        let result = self
            .client
            .call_tool(name, arguments)
            .await
            .map_err(|e| map_call_error(name, e))?;

        if result.is_error {
            let message = result.text();
            return Err(ToolError::ExecutionFailed(if message.is_empty() {
                format!("MCP tool '{}' reported an error", name)
            } else {
                message
            }));
        }

        Ok(result_value(&result))
    }

    async fn disconnect(&self) -> Result<()> {
        debug!("Closing MCP session");
        self.client
            .close()
            .await
            .map_err(|e| Error::Session(format!("Failed to close MCP session: {}", e)))
    }
}

/// Opens MCP sessions as configured in `[mcp]`
#[derive(Debug, Clone)]
pub struct McpConnector {
    config: McpConfig,
}

impl McpConnector {
    pub fn new(config: McpConfig) -> Self {
        Self { config }
    }

    async fn open_transport(&self) -> Result<Box<dyn Transport>> {
        match self.config.transport {
            McpTransportKind::Sse => {
                let transport = SseTransport::connect(self.config.url.as_str())
                    .await
                    .map_err(|e| Error::Session(format!("Failed to connect to {}: {}", self.config.url, e)))?;
                Ok(Box::new(transport))
            }
            McpTransportKind::Stdio => {
                let command = self.config.command.as_deref().ok_or_else(|| {
                    Error::Config("mcp.command is required for the stdio transport".to_string())
                })?;
                let args: Vec<&str> = self.config.args.iter().map(String::as_str).collect();
                let transport = StdioTransport::spawn(command, &args)
                    .await
                    .map_err(|e| Error::Session(format!("Failed to spawn {}: {}", command, e)))?;
                Ok(Box::new(transport))
            }
        }
    }
}

#[async_trait]
impl ToolConnector for McpConnector {
    async fn connect(&self) -> Result<Arc<dyn ToolRegistry>> {
        let transport = self.open_transport().await?;
        let mut client = McpClient::new(transport);

        let client_info = ClientInfo {
            name: self.config.client_name.clone(),
            ..Default::default()
        };
        let server = match client.initialize(client_info).await {
            Ok(server) => server,
            Err(e) => {
                let _ = client.close().await;
                return Err(Error::Session(format!("MCP handshake failed: {}", e)));
            }
        };

        info!(server = %server.name, version = %server.version, "Connected to MCP server");
        Ok(Arc::new(McpToolRegistry::new(client)))
    }
}
