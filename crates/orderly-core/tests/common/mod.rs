//! Test doubles shared by the integration tests

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use orderly_core::provider::{Completion, PendingToolCall, Reasoner, ReasoningRequest};
use orderly_core::tools::{ToolConnector, ToolDescriptor, ToolRegistry};
use orderly_core::{AgentType, Error, Result, ToolError};
use serde_json::{json, Value};

/// Replays canned completions and records every request
#[derive(Default)]
pub struct ScriptedReasoner {
    replies: Mutex<VecDeque<Result<Completion>>>,
    requests: Mutex<Vec<ReasoningRequest>>,
}

impl ScriptedReasoner {
    pub fn new(replies: Vec<Result<Completion>>) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.into()),
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn requests(&self) -> Vec<ReasoningRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn remaining(&self) -> usize {
        self.replies.lock().unwrap().len()
    }
}

#[async_trait]
impl Reasoner for ScriptedReasoner {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, request: ReasoningRequest) -> Result<Completion> {
        self.requests.lock().unwrap().push(request);
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(Error::Provider("script exhausted".to_string())))
    }
}

/// Reasoner whose reply never arrives
pub struct StalledReasoner;

#[async_trait]
impl Reasoner for StalledReasoner {
    fn name(&self) -> &str {
        "stalled"
    }

    async fn complete(&self, _request: ReasoningRequest) -> Result<Completion> {
        futures::future::pending().await
    }
}

pub fn text(content: &str) -> Result<Completion> {
    Ok(Completion::text(content))
}

pub fn calls(calls: &[(&str, Value)]) -> Result<Completion> {
    Ok(Completion {
        content: None,
        tool_calls: calls
            .iter()
            .enumerate()
            .map(|(i, (name, args))| PendingToolCall::new(format!("call_{}", i), *name, args.clone()))
            .collect(),
    })
}

pub fn plan_reply(tasks: &[(u32, &str, &str)]) -> Result<Completion> {
    let tasks: Vec<Value> = tasks
        .iter()
        .map(|(id, description, agent_type)| json!({ "id": id, "description": description, "agent_type": agent_type }))
        .collect();
    Ok(Completion::text(format!("```json\n{}\n```", json!({ "tasks": tasks }))))
}

/// Shop-like registry that records invocations
///
/// `create_order` answers with cart `C-1`; other tools answer `{"ok": true}`
/// unless a failure rule matches.
pub struct RecordingRegistry {
    tools: Vec<ToolDescriptor>,
    failures: Vec<(String, String, Value)>,
    unavailable_after: Option<usize>,
    calls: Mutex<Vec<(String, Value)>>,
    disconnects: AtomicUsize,
}

impl RecordingRegistry {
    pub fn new(tool_names: &[&str]) -> Self {
        Self {
            tools: tool_names
                .iter()
                .map(|name| ToolDescriptor::new(*name, format!("{} tool", name), json!({ "type": "object" })))
                .collect(),
            failures: Vec::new(),
            unavailable_after: None,
            calls: Mutex::new(Vec::new()),
            disconnects: AtomicUsize::new(0),
        }
    }

    pub fn shop() -> Self {
        Self::new(&["create_order", "add_to_cart", "find_inventory", "send_email"])
    }

    /// Fail `tool` whenever `arguments[key] == value`
    pub fn failing(mut self, tool: &str, key: &str, value: Value) -> Self {
        self.failures.push((tool.to_string(), key.to_string(), value));
        self
    }

    /// Lose the session once `n` calls have been made
    pub fn unavailable_after(mut self, n: usize) -> Self {
        self.unavailable_after = Some(n);
        self
    }

    pub fn calls(&self) -> Vec<(String, Value)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_names(&self) -> Vec<String> {
        self.calls().into_iter().map(|(name, _)| name).collect()
    }

    pub fn count(&self, tool: &str, key: &str, value: &Value) -> usize {
        self.calls()
            .iter()
            .filter(|(name, args)| name == tool && args.get(key) == Some(value))
            .count()
    }

    pub fn disconnects(&self) -> usize {
        self.disconnects.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ToolRegistry for RecordingRegistry {
    async fn list_tools(&self) -> Result<Vec<ToolDescriptor>> {
        Ok(self.tools.clone())
    }

    async fn invoke(&self, name: &str, arguments: Value) -> std::result::Result<Value, ToolError> {
        let mut calls = self.calls.lock().unwrap();
        if self.unavailable_after.is_some_and(|n| calls.len() >= n) {
            return Err(ToolError::Unavailable("connection reset".to_string()));
        }
        calls.push((name.to_string(), arguments.clone()));

        let fails = self
            .failures
            .iter()
            .any(|(tool, key, value)| tool == name && arguments.get(key) == Some(value));
        if fails {
            return Err(ToolError::ExecutionFailed(format!("{} failed", name)));
        }

        Ok(match name {
            "create_order" => json!({ "cart_id": "C-1" }),
            _ => json!({ "ok": true }),
        })
    }

    async fn disconnect(&self) -> Result<()> {
        self.disconnects.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Hands out the same registry on every connect
pub struct StaticConnector {
    pub registry: Arc<RecordingRegistry>,
}

#[async_trait]
impl ToolConnector for StaticConnector {
    async fn connect(&self) -> Result<Arc<dyn ToolRegistry>> {
        Ok(self.registry.clone())
    }
}

/// Connector whose server is down
pub struct RefusingConnector;

#[async_trait]
impl ToolConnector for RefusingConnector {
    async fn connect(&self) -> Result<Arc<dyn ToolRegistry>> {
        Err(Error::Session("connection refused".to_string()))
    }
}

pub fn shop_capabilities() -> HashMap<AgentType, Vec<String>> {
    let mut table = HashMap::new();
    table.insert(AgentType::Order, vec!["create_order".to_string(), "add_to_cart".to_string()]);
    table.insert(AgentType::Inventory, vec!["find_inventory".to_string()]);
    table.insert(AgentType::Communication, vec!["send_email".to_string()]);
    table
}
