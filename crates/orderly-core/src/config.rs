//! Configuration management for Orderly
//!
//! Handles loading and saving the TOML configuration: reasoning provider,
//! tool server connection, orchestration limits, fallback tool names and the
//! agent type → tool table.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::provider::ProviderType;
use crate::task::AgentType;

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Reasoning provider
    #[serde(default)]
    pub provider: ProviderConfig,
    /// Tool server connection
    #[serde(default)]
    pub mcp: McpConfig,
    /// Orchestration limits and success detection
    #[serde(default)]
    pub orchestration: OrchestrationConfig,
    /// Tool names used by the order fallback policy
    #[serde(default)]
    pub fallback: FallbackConfig,
    /// Agent type → tool names
    #[serde(default = "default_capabilities")]
    pub capabilities: HashMap<AgentType, Vec<String>>,
    /// General application settings
    #[serde(default)]
    pub general: GeneralConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            provider: ProviderConfig::default(),
            mcp: McpConfig::default(),
            orchestration: OrchestrationConfig::default(),
            fallback: FallbackConfig::default(),
            capabilities: default_capabilities(),
            general: GeneralConfig::default(),
        }
    }
}

fn default_capabilities() -> HashMap<AgentType, Vec<String>> {
    let entries: [(AgentType, &[&str]); 5] = [
        (
            AgentType::Order,
            &["create_order", "add_to_cart", "view_cart", "remove_from_cart", "checkout"],
        ),
        (AgentType::Inventory, &["find_inventory", "get_part_details"]),
        (AgentType::Document, &["write_document", "create_document"]),
        (AgentType::Information, &["get_weather", "lookup", "web_search"]),
        (AgentType::Communication, &["send_email", "reply_email"]),
    ];

    entries
        .into_iter()
        .map(|(agent_type, tools)| (agent_type, tools.iter().map(|t| t.to_string()).collect()))
        .collect()
}

/// LLM Provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    /// Provider type: "openai", "anthropic", "gemini", etc.
    pub provider_type: String,
    /// Model to use (provider default when empty)
    pub model: String,
    /// API key (can be loaded from env)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    /// Environment variable name for API key
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key_env: Option<String>,
    /// Base URL for the API (optional, for self-hosted)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            provider_type: "openai".to_string(),
            model: "gpt-4.1-mini".to_string(),
            api_key: None,
            api_key_env: Some("OPENAI_API_KEY".to_string()),
            base_url: None,
        }
    }
}

impl ProviderConfig {
    /// Parsed provider type
    pub fn provider(&self) -> Result<ProviderType> {
        self.provider_type.parse::<ProviderType>().map_err(Error::Config)
    }

    /// Configured model, or the provider's default
    pub fn model_or_default(&self) -> Result<String> {
        if self.model.trim().is_empty() {
            Ok(self.provider()?.default_model().to_string())
        } else {
            Ok(self.model.clone())
        }
    }

    /// Get the API key, checking environment variable if not set directly
    pub fn get_api_key(&self) -> Option<String> {
        if let Some(key) = &self.api_key
            && !key.is_empty()
        {
            return Some(key.clone());
        }

        let env_name = self
            .api_key_env
            .clone()
            .or_else(|| self.provider().ok().and_then(|p| p.api_key_env()).map(String::from))?;

        std::env::var(env_name).ok().filter(|key| !key.is_empty())
    }
}

/// How the tool server is reached
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum McpTransportKind {
    Sse,
    Stdio,
}

/// Tool server (MCP) connection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct McpConfig {
    pub transport: McpTransportKind,
    /// SSE endpoint (transport = "sse")
    pub url: String,
    /// Server command (transport = "stdio")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    pub args: Vec<String>,
    /// Name announced during the MCP handshake
    pub client_name: String,
}

impl Default for McpConfig {
    fn default() -> Self {
        Self {
            transport: McpTransportKind::Sse,
            url: "http://localhost:8050/sse".to_string(),
            command: None,
            args: Vec::new(),
            client_name: "orderly".to_string(),
        }
    }
}

/// Orchestration limits and success detection
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestrationConfig {
    /// Maximum reasoning turns per task (plan mode) or per run (stream mode)
    pub max_iterations: usize,
    /// Upper bound on a single tool invocation
    pub tool_timeout_secs: u64,
    /// Case-insensitive terms that mark a streamed run as fulfilled
    pub success_markers: Vec<String>,
}

impl Default for OrchestrationConfig {
    fn default() -> Self {
        Self {
            max_iterations: 25,
            tool_timeout_secs: 30,
            success_markers: vec!["order".to_string()],
        }
    }
}

/// Tool and argument names the order fallback policy works with
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FallbackConfig {
    pub create_order_tool: String,
    pub add_to_cart_tool: String,
    pub find_inventory_tool: String,
    /// Argument of the add-to-cart tool that carries the cart reference
    pub cart_argument: String,
    /// Fields of the create-order result that hold the cart reference
    pub cart_result_keys: Vec<String>,
    /// Arguments that identify the item of an item-level call, first match wins
    pub item_keys: Vec<String>,
    /// Argument of the find-inventory tool that receives the item
    pub search_argument: String,
}

impl Default for FallbackConfig {
    fn default() -> Self {
        Self {
            create_order_tool: "create_order".to_string(),
            add_to_cart_tool: "add_to_cart".to_string(),
            find_inventory_tool: "find_inventory".to_string(),
            cart_argument: "cart".to_string(),
            cart_result_keys: ["cart", "cart_id", "order_id", "id"].map(String::from).to_vec(),
            item_keys: ["stock_item_id", "item_id", "part_id", "sku", "item", "query", "name"]
                .map(String::from)
                .to_vec(),
            search_argument: "query".to_string(),
        }
    }
}

/// General application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log level
    pub log_level: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "warn".to_string(),
        }
    }
}

/// Configuration manager for loading and saving config
pub struct ConfigManager {
    config_path: PathBuf,
    config: Config,
}

impl ConfigManager {
    /// Create a new config manager with default path
    pub fn new() -> Result<Self> {
        let config_path = Self::default_config_path()?;
        Self::with_path(config_path)
    }

    /// Create a config manager with a specific path
    pub fn with_path(config_path: PathBuf) -> Result<Self> {
        let config = if config_path.exists() {
            Self::load_from_path(&config_path)?
        } else {
            Config::default()
        };

        Ok(Self { config_path, config })
    }

    /// Get the default config path
    pub fn default_config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| Error::Config("Could not find config directory".to_string()))?;

        Ok(config_dir.join("orderly").join("config.toml"))
    }

    /// Load configuration from a file
    fn load_from_path(path: &Path) -> Result<Config> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Failed to read config: {}", e)))?;

        toml::from_str(&content).map_err(|e| Error::Config(format!("Failed to parse config: {}", e)))
    }

    pub fn path(&self) -> &Path {
        &self.config_path
    }

    /// Get the current configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Get mutable access to configuration
    pub fn config_mut(&mut self) -> &mut Config {
        &mut self.config
    }

    pub fn into_config(self) -> Config {
        self.config
    }

    /// Save the current configuration to disk
    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.config_path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| Error::Config(format!("Failed to create config dir: {}", e)))?;
        }

        let content = toml::to_string_pretty(&self.config)
            .map_err(|e| Error::Config(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(&self.config_path, content)
            .map_err(|e| Error::Config(format!("Failed to write config: {}", e)))?;

        Ok(())
    }
}
