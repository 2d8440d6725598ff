//! Execution events published by the orchestrator

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ToolError;
use crate::task::TaskId;

/// One tool invocation (or refusal) made during a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallRecord {
    pub tool_name: String,
    pub arguments: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Invoked by the fallback policy rather than requested by the model
    #[serde(default)]
    pub fallback: bool,
    /// Refused before reaching the registry
    #[serde(default)]
    pub blocked: bool,
}

impl ToolCallRecord {
    pub fn succeeded(tool_name: impl Into<String>, arguments: Value, result: Value) -> Self {
        Self {
            tool_name: tool_name.into(),
            arguments,
            result: Some(result),
            error: None,
            fallback: false,
            blocked: false,
        }
    }

    pub fn failed(tool_name: impl Into<String>, arguments: Value, error: &ToolError) -> Self {
        Self {
            tool_name: tool_name.into(),
            arguments,
            result: None,
            error: Some(error.to_string()),
            fallback: false,
            blocked: matches!(error, ToolError::Blocked(_)),
        }
    }

    pub fn as_fallback(mut self) -> Self {
        self.fallback = true;
        self
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Unit of streamed progress
///
/// Exactly one event per run has `is_task_complete` set, and it is the last.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutionEvent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCallRecord>,
    pub is_task_complete: bool,
    /// Plan task the event belongs to (plan-execution mode)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<TaskId>,
}

impl ExecutionEvent {
    pub fn progress(content: Option<String>, tool_calls: Vec<ToolCallRecord>) -> Self {
        Self {
            content,
            tool_calls,
            is_task_complete: false,
            task_id: None,
        }
    }

    pub fn terminal(content: Option<String>) -> Self {
        Self {
            content,
            tool_calls: Vec::new(),
            is_task_complete: true,
            task_id: None,
        }
    }

    pub fn for_task(mut self, task_id: TaskId) -> Self {
        self.task_id = Some(task_id);
        self
    }
}
