//! GenAI-based reasoning provider
//!
//! Uses the genai framework with manual tool control: the model only proposes
//! tool calls, the orchestrator decides what actually runs.
//!
//! ## LLM Request/Response Logging
//!
//! Set the `LLM_LOG_FILE` environment variable to append every request and
//! response to a JSON-lines file.
//!
//! Example: `LLM_LOG_FILE=/tmp/llm.log orderly run "..."`

use std::io::Write;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use genai::chat::{ChatMessage, ChatRequest, ChatStreamEvent, Tool, ToolCall, ToolResponse};
use genai::resolver::{AuthData, AuthResolver};
use genai::Client;
use genai::WebConfig;
use tracing::{debug, warn};

use super::{Completion, LlmMessage, PendingToolCall, ProviderType, Reasoner, ReasoningRequest};
use crate::config::ProviderConfig;
use crate::error::{Error, Result};

/// Log LLM request/response to file if LLM_LOG_FILE is set
fn log_llm_interaction(
    model: &str,
    request: &ReasoningRequest,
    result: Option<&Completion>,
    error: Option<&str>,
) {
    let Ok(log_file) = std::env::var("LLM_LOG_FILE") else {
        return;
    };

    let entry = serde_json::json!({
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "model": model,
        "request": {
            "system": request.system,
            "messages": request.messages,
            "message_count": request.messages.len(),
            "tools": request.tools.iter().map(|t| &t.name).collect::<Vec<_>>(),
        },
        "response": result.map(|r| serde_json::json!({
            "type": if r.has_tool_calls() { "tool_calls" } else { "message" },
            "content": r.content,
            "tool_calls": r.tool_calls,
        })),
        "error": error,
    });

    match std::fs::OpenOptions::new().create(true).append(true).open(&log_file) {
        Ok(mut file) => {
            if let Err(e) = writeln!(file, "{}", entry) {
                warn!("Failed to write to LLM log file: {}", e);
            }
        }
        Err(e) => warn!("Failed to open LLM log file {}: {}", log_file, e),
    }
}

fn to_genai_tool_calls(calls: &[PendingToolCall]) -> Vec<ToolCall> {
    calls
        .iter()
        .map(|tc| ToolCall {
            call_id: tc.call_id.clone(),
            fn_name: tc.name.clone(),
            fn_arguments: tc.arguments.clone(),
            thought_signatures: None,
        })
        .collect()
}

/// A reasoner implementation using genai
pub struct GenAIProvider {
    client: Client,
    provider_type: ProviderType,
    model: String,
}

impl GenAIProvider {
    /// Default timeout for LLM API requests (5 minutes)
    const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);

    fn default_web_config() -> WebConfig {
        WebConfig::default()
            .with_timeout(Self::DEFAULT_TIMEOUT)
            .with_connect_timeout(Duration::from_secs(30))
    }

    /// Create a provider that resolves credentials from the environment
    pub fn new(provider_type: ProviderType, model: Option<&str>) -> Self {
        let client = Client::builder().with_web_config(Self::default_web_config()).build();
        Self {
            client,
            provider_type,
            model: model.unwrap_or(provider_type.default_model()).to_string(),
        }
    }

    /// Create a provider with a specific API key
    pub fn with_api_key(provider_type: ProviderType, api_key: &str, model: Option<&str>) -> Self {
        let api_key = api_key.to_string();
        let auth_resolver = AuthResolver::from_resolver_fn(
            move |_model_iden| -> std::result::Result<Option<AuthData>, genai::resolver::Error> {
                Ok(Some(AuthData::from_single(api_key.clone())))
            },
        );

        let client = Client::builder()
            .with_web_config(Self::default_web_config())
            .with_auth_resolver(auth_resolver)
            .build();

        Self {
            client,
            provider_type,
            model: model.unwrap_or(provider_type.default_model()).to_string(),
        }
    }

    pub fn provider_type(&self) -> ProviderType {
        self.provider_type
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn build_chat_request(request: &ReasoningRequest) -> ChatRequest {
        let mut chat_req = ChatRequest::default();
        if let Some(system) = &request.system {
            chat_req = chat_req.with_system(system.as_str());
        }

        for msg in &request.messages {
            chat_req = match msg {
                LlmMessage::System { content } => chat_req.append_message(ChatMessage::system(content)),
                LlmMessage::User { content } => chat_req.append_message(ChatMessage::user(content)),
                LlmMessage::Assistant { content } => {
                    chat_req.append_message(ChatMessage::assistant(content))
                }
                // OpenAI-style APIs need the calls in a single assistant message
                LlmMessage::AssistantToolCalls { tool_calls, .. } => {
                    chat_req.append_message(to_genai_tool_calls(tool_calls))
                }
                LlmMessage::ToolResult { call_id, content } => {
                    chat_req.append_message(ToolResponse::new(call_id.clone(), content.clone()))
                }
            };
        }

        if !request.tools.is_empty() {
            let tools: Vec<Tool> = request
                .tools
                .iter()
                .map(|t| {
                    Tool::new(&t.name)
                        .with_description(&t.description)
                        .with_schema(t.input_schema.clone())
                })
                .collect();
            chat_req = chat_req.with_tools(tools);
        }

        chat_req
    }

    /// Stream the chat and accumulate content and tool calls
    async fn stream_completion(&self, chat_req: ChatRequest) -> Result<Completion> {
        let response = self
            .client
            .exec_chat_stream(&self.model, chat_req, None)
            .await
            .map_err(|e| {
                tracing::error!(error = ?e, model = %self.model, "LLM request failed");
                Error::Provider(format!("GenAI error: {:?}", e))
            })?;

        let mut content = String::new();
        let mut tool_calls = Vec::new();
        let mut stream = response.stream;

        while let Some(event) = stream.next().await {
            match event {
                Ok(ChatStreamEvent::Chunk(chunk)) => content.push_str(&chunk.content),
                Ok(ChatStreamEvent::ToolCallChunk(tc)) => {
                    let call = tc.tool_call;
                    tool_calls.push(PendingToolCall {
                        call_id: call.call_id,
                        name: call.fn_name,
                        arguments: call.fn_arguments,
                    });
                }
                Ok(ChatStreamEvent::End(_)) => break,
                // Reasoning chunks stay out of the visible content
                Ok(_) => {}
                Err(e) => {
                    tracing::error!(error = ?e, model = %self.model, "LLM stream error");
                    return Err(Error::Provider(format!("GenAI stream error: {:?}", e)));
                }
            }
        }

        Ok(Completion {
            content: if content.is_empty() { None } else { Some(content) },
            tool_calls,
        })
    }
}

#[async_trait]
impl Reasoner for GenAIProvider {
    fn name(&self) -> &str {
        self.provider_type.as_str()
    }

    async fn complete(&self, request: ReasoningRequest) -> Result<Completion> {
        debug!(
            model = %self.model,
            messages = request.messages.len(),
            tools = request.tools.len(),
            "Sending reasoning request"
        );

        let chat_req = Self::build_chat_request(&request);
        let result = self.stream_completion(chat_req).await;

        match &result {
            Ok(completion) => log_llm_interaction(&self.model, &request, Some(completion), None),
            Err(e) => log_llm_interaction(&self.model, &request, None, Some(&e.to_string())),
        }

        result
    }
}

/// Create a reasoner from the provider section of the configuration
pub fn create_reasoner(config: &ProviderConfig) -> Result<GenAIProvider> {
    let provider_type = config.provider()?;
    let model = config.model_or_default()?;

    if config.base_url.is_some() {
        warn!(provider = %provider_type, "Custom base_url is not supported by the genai backend, using the default endpoint");
    }

    let provider = match config.get_api_key() {
        Some(key) => GenAIProvider::with_api_key(provider_type, &key, Some(&model)),
        None => {
            if provider_type.api_key_env().is_some() {
                warn!(provider = %provider_type, "No API key configured, relying on the provider's environment");
            }
            GenAIProvider::new(provider_type, Some(&model))
        }
    };

    Ok(provider)
}
