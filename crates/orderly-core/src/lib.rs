//! Orderly Core - plan/execute orchestration for request fulfilment
//!
//! This crate provides the core functionality for Orderly:
//! - Plan model and the model-backed planner
//! - Orchestrator with plan-execution and streaming modes
//! - Order fallback policy applied to every tool call
//! - Completion detection
//! - Tool registry contract and its MCP adapter
//! - Configuration and the lifecycle driver

pub mod completion;
pub mod config;
pub mod error;
pub mod orchestration;
pub mod provider;
pub mod task;
pub mod tools;
pub mod workflow;

pub use completion::{CompletionDetector, KeywordDetector, Outcome, Verdict};
pub use config::{Config, ConfigManager, FallbackConfig, McpConfig, McpTransportKind, OrchestrationConfig, ProviderConfig};
pub use error::{Error, Result, ToolError};
pub use orchestration::{EventStream, ExecutionEvent, Orchestrator, ToolCallRecord};
pub use provider::{create_reasoner, Completion, GenAIProvider, LlmMessage, PendingToolCall, ProviderType, Reasoner, ReasoningRequest};
pub use task::{AgentType, Plan, Task, TaskId, TaskPlanner, TaskStatus};
pub use tools::{CapabilityMap, LeaseGuard, SessionLease, ToolCatalog, ToolConnector, ToolDescriptor, ToolRegistry};
pub use workflow::{RunMode, Workflow};
