//! Reasoning provider abstraction
//!
//! The orchestration layer talks to a language model through the
//! [`Reasoner`] trait only. [`GenAIProvider`] implements it on top of the
//! genai framework, which covers:
//! - OpenAI (GPT-4.1, GPT-4o, etc.)
//! - Anthropic (Claude)
//! - Google Gemini
//! - Groq
//! - DeepSeek
//! - xAI
//! - Ollama (local)

mod genai_provider;

pub use genai_provider::{create_reasoner, GenAIProvider};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;
use crate::tools::ToolDescriptor;

/// Message in a reasoning conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "snake_case")]
pub enum LlmMessage {
    System { content: String },
    User { content: String },
    Assistant { content: String },
    /// Assistant turn that requested tool calls
    AssistantToolCalls {
        content: Option<String>,
        tool_calls: Vec<PendingToolCall>,
    },
    /// Result of one tool call, answered by call id
    ToolResult { call_id: String, content: String },
}

impl LlmMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self::System { content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::User { content: content.into() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::Assistant { content: content.into() }
    }

    pub fn assistant_with_tool_calls(content: Option<String>, tool_calls: Vec<PendingToolCall>) -> Self {
        Self::AssistantToolCalls { content, tool_calls }
    }

    pub fn tool_result(call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self::ToolResult {
            call_id: call_id.into(),
            content: content.into(),
        }
    }

    /// Get text content as a string (for logging/display)
    pub fn content_as_text(&self) -> &str {
        match self {
            Self::System { content } | Self::User { content } | Self::Assistant { content } => content,
            Self::AssistantToolCalls { content, .. } => content.as_deref().unwrap_or(""),
            Self::ToolResult { content, .. } => content,
        }
    }
}

/// Tool call requested by the model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingToolCall {
    pub call_id: String,
    pub name: String,
    pub arguments: Value,
}

impl PendingToolCall {
    pub fn new(call_id: impl Into<String>, name: impl Into<String>, arguments: Value) -> Self {
        Self {
            call_id: call_id.into(),
            name: name.into(),
            arguments,
        }
    }
}

/// One reasoning step: instruction, conversation so far and offered tools
#[derive(Debug, Clone, Default)]
pub struct ReasoningRequest {
    pub system: Option<String>,
    pub messages: Vec<LlmMessage>,
    pub tools: Vec<ToolDescriptor>,
}

impl ReasoningRequest {
    pub fn new(messages: Vec<LlmMessage>) -> Self {
        Self {
            system: None,
            messages,
            tools: Vec::new(),
        }
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    pub fn with_tools(mut self, tools: Vec<ToolDescriptor>) -> Self {
        self.tools = tools;
        self
    }
}

/// Reply of one reasoning step
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Completion {
    /// Text content from the assistant (may be present even with tool calls)
    pub content: Option<String>,
    pub tool_calls: Vec<PendingToolCall>,
}

impl Completion {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            tool_calls: Vec::new(),
        }
    }

    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }

    pub fn has_content(&self) -> bool {
        self.content.as_ref().map(|c| !c.is_empty()).unwrap_or(false)
    }
}

/// Language model boundary
#[async_trait]
pub trait Reasoner: Send + Sync {
    fn name(&self) -> &str;

    async fn complete(&self, request: ReasoningRequest) -> Result<Completion>;
}

/// Supported LLM provider types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderType {
    OpenAI,
    Anthropic,
    Gemini,
    Groq,
    DeepSeek,
    /// xAI (Grok)
    XAI,
    /// Ollama (local, no key)
    Ollama,
}

impl ProviderType {
    pub const ALL: [ProviderType; 7] = [
        ProviderType::OpenAI,
        ProviderType::Anthropic,
        ProviderType::Gemini,
        ProviderType::Groq,
        ProviderType::DeepSeek,
        ProviderType::XAI,
        ProviderType::Ollama,
    ];

    /// Get the default model for this provider
    pub fn default_model(&self) -> &'static str {
        match self {
            ProviderType::OpenAI => "gpt-4.1-mini",
            ProviderType::Anthropic => "claude-sonnet-4-5-20250929",
            ProviderType::Gemini => "gemini-2.5-flash",
            ProviderType::Groq => "llama-3.3-70b-versatile",
            ProviderType::DeepSeek => "deepseek-chat",
            ProviderType::XAI => "grok-3-mini",
            ProviderType::Ollama => "llama3.1",
        }
    }

    /// Get the environment variable name for API key
    pub fn api_key_env(&self) -> Option<&'static str> {
        match self {
            ProviderType::OpenAI => Some("OPENAI_API_KEY"),
            ProviderType::Anthropic => Some("ANTHROPIC_API_KEY"),
            ProviderType::Gemini => Some("GEMINI_API_KEY"),
            ProviderType::Groq => Some("GROQ_API_KEY"),
            ProviderType::DeepSeek => Some("DEEPSEEK_API_KEY"),
            ProviderType::XAI => Some("XAI_API_KEY"),
            ProviderType::Ollama => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderType::OpenAI => "openai",
            ProviderType::Anthropic => "anthropic",
            ProviderType::Gemini => "gemini",
            ProviderType::Groq => "groq",
            ProviderType::DeepSeek => "deepseek",
            ProviderType::XAI => "xai",
            ProviderType::Ollama => "ollama",
        }
    }
}

impl std::fmt::Display for ProviderType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ProviderType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "openai" => Ok(ProviderType::OpenAI),
            "anthropic" => Ok(ProviderType::Anthropic),
            "gemini" | "google" => Ok(ProviderType::Gemini),
            "groq" => Ok(ProviderType::Groq),
            "deepseek" => Ok(ProviderType::DeepSeek),
            "xai" | "grok" => Ok(ProviderType::XAI),
            "ollama" => Ok(ProviderType::Ollama),
            _ => Err(format!("Unknown provider: {}", s)),
        }
    }
}
