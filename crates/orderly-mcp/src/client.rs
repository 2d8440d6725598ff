//! MCP Client implementation

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::protocol::{
    methods, notification, response_id, JsonRpcError, JsonRpcRequest, JsonRpcResponse, RequestId, INVALID_PARAMS,
};
use crate::transport::Transport;
use crate::{McpTool, ServerCapabilities, PROTOCOL_VERSION};

/// MCP Client for connecting to MCP servers
pub struct McpClient<T: Transport> {
    transport: Arc<Mutex<T>>,
    request_id: AtomicI64,
    server_capabilities: Option<ServerCapabilities>,
}

impl<T: Transport> McpClient<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport: Arc::new(Mutex::new(transport)),
            request_id: AtomicI64::new(1),
            server_capabilities: None,
        }
    }

    fn next_id(&self) -> RequestId {
        RequestId::Number(self.request_id.fetch_add(1, Ordering::SeqCst))
    }

    /// Capabilities announced by the server during `initialize`
    pub fn server_capabilities(&self) -> Option<&ServerCapabilities> {
        self.server_capabilities.as_ref()
    }

    /// Initialize the connection
    pub async fn initialize(&mut self, client_info: ClientInfo) -> Result<ServerInfo, McpError> {
        let params = serde_json::json!({
            "protocolVersion": PROTOCOL_VERSION,
            "capabilities": {},
            "clientInfo": {
                "name": client_info.name,
                "version": client_info.version
            }
        });

        let request = JsonRpcRequest::new(self.next_id(), methods::INITIALIZE).with_params(params);

        let response = self.send_request(request).await?;

        if let Some(result) = response.result {
            let server_info: InitializeResult =
                serde_json::from_value(result).map_err(|e| McpError::Protocol(e.to_string()))?;

            self.server_capabilities = Some(server_info.capabilities.clone());

            let mut transport = self.transport.lock().await;
            transport
                .send(notification(methods::INITIALIZED))
                .await
                .map_err(|e| McpError::Transport(e.to_string()))?;

            Ok(ServerInfo {
                name: server_info.server_info.name,
                version: server_info.server_info.version,
            })
        } else if let Some(error) = response.error {
            Err(McpError::from(error))
        } else {
            Err(McpError::Protocol("Empty response".to_string()))
        }
    }

    /// List available tools
    pub async fn list_tools(&self) -> Result<Vec<McpTool>, McpError> {
        let request = JsonRpcRequest::new(self.next_id(), methods::TOOLS_LIST);
        let response = self.send_request(request).await?;

        if let Some(result) = response.result {
            let tools_result: ToolsListResult =
                serde_json::from_value(result).map_err(|e| McpError::Protocol(e.to_string()))?;
            Ok(tools_result.tools)
        } else if let Some(error) = response.error {
            Err(McpError::from(error))
        } else {
            Ok(Vec::new())
        }
    }

    /// Call a tool
    ///
    /// A tool that ran and reported failure comes back as `Ok` with
    /// `is_error` set; `Err` means the call itself could not be made.
    pub async fn call_tool(
        &self,
        name: &str,
        arguments: serde_json::Value,
    ) -> Result<ToolCallResult, McpError> {
        let params = serde_json::json!({
            "name": name,
            "arguments": arguments
        });

        let request = JsonRpcRequest::new(self.next_id(), methods::TOOLS_CALL).with_params(params);

        let response = self.send_request(request).await?;

        if let Some(result) = response.result {
            serde_json::from_value(result).map_err(|e| McpError::Protocol(e.to_string()))
        } else if let Some(error) = response.error {
            Err(McpError::from(error))
        } else {
            Err(McpError::Protocol("Empty response".to_string()))
        }
    }

    /// Close the underlying transport
    pub async fn close(&self) -> Result<(), McpError> {
        let mut transport = self.transport.lock().await;
        transport
            .close()
            .await
            .map_err(|e| McpError::Transport(e.to_string()))
    }

    async fn send_request(&self, request: JsonRpcRequest) -> Result<JsonRpcResponse, McpError> {
        let mut transport = self.transport.lock().await;
        let expected = request.id.clone();

        let request_value =
            serde_json::to_value(&request).map_err(|e| McpError::Protocol(e.to_string()))?;

        debug!(method = %request.method, id = ?expected, "Sending MCP request");

        transport
            .send(request_value)
            .await
            .map_err(|e| McpError::Transport(e.to_string()))?;

        // Skip notifications and stale responses until ours arrives
        loop {
            let response_value = transport
                .receive()
                .await
                .map_err(|e| McpError::Transport(e.to_string()))?
                .ok_or_else(|| McpError::Transport("Connection closed".to_string()))?;

            match response_id(&response_value) {
                Some(id) if id == expected => {
                    return serde_json::from_value(response_value)
                        .map_err(|e| McpError::Protocol(e.to_string()));
                }
                Some(id) => warn!(?id, ?expected, "Discarding MCP response for another request"),
                None => debug!("Skipping MCP notification"),
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct ClientInfo {
    pub name: String,
    pub version: String,
}

impl Default for ClientInfo {
    fn default() -> Self {
        Self {
            name: "orderly".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ServerInfo {
    pub name: String,
    pub version: String,
}

#[derive(Debug, serde::Deserialize)]
struct InitializeResult {
    #[serde(rename = "protocolVersion")]
    #[allow(dead_code)]
    protocol_version: String,
    #[serde(default)]
    capabilities: ServerCapabilities,
    #[serde(rename = "serverInfo")]
    server_info: ServerInfoInner,
}

#[derive(Debug, serde::Deserialize)]
struct ServerInfoInner {
    name: String,
    #[serde(default)]
    version: String,
}

#[derive(Debug, serde::Deserialize)]
struct ToolsListResult {
    tools: Vec<McpTool>,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ToolCallResult {
    #[serde(default)]
    pub content: Vec<ContentItem>,
    #[serde(rename = "isError", default)]
    pub is_error: bool,
}

impl ToolCallResult {
    /// All text content items joined by newlines
    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter_map(|item| item.text.as_deref())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ContentItem {
    #[serde(rename = "type")]
    pub content_type: String,
    pub text: Option<String>,
}

/// MCP errors
#[derive(Debug, thiserror::Error)]
pub enum McpError {
    #[error("Transport error: {0}")]
    Transport(String),
    #[error("Protocol error: {0}")]
    Protocol(String),
    #[error("Server error: {0}")]
    Server(String),
    /// The server rejected the request parameters (JSON-RPC -32602)
    #[error("Invalid params: {0}")]
    InvalidParams(String),
}

impl From<JsonRpcError> for McpError {
    fn from(error: JsonRpcError) -> Self {
        match error.code {
            INVALID_PARAMS => McpError::InvalidParams(error.message),
            _ => McpError::Server(error.message),
        }
    }
}
