//! Plan model
//!
//! A request is decomposed into a [`Plan`]: the verbatim request plus an
//! ordered list of [`Task`]s. The planner creates plans; the orchestrator is
//! the only component that moves task statuses forward:
//! - `pending → in_progress → completed | failed`
//! - `pending → failed` when the run aborts before reaching the task
//!
//! The serialized form is consumed structurally by other components, so the
//! field names and enum spellings below are part of the contract.

mod planner;

pub use planner::{parse_plan_reply, TaskPlanner, PLANNER_PROMPT};

use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Task identifier, unique within one plan (starts at 1)
pub type TaskId = u32;

/// Capability category a task is routed through
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentType {
    /// Order/cart handling: create order, add to cart, checkout
    Order,
    /// Stock lookups and alternatives
    Inventory,
    /// Writing documents
    Document,
    /// Looking up information (weather, facts, ...)
    Information,
    /// Replying to or notifying people
    Communication,
}

impl AgentType {
    pub const ALL: [AgentType; 5] = [
        AgentType::Order,
        AgentType::Inventory,
        AgentType::Document,
        AgentType::Information,
        AgentType::Communication,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AgentType::Order => "order",
            AgentType::Inventory => "inventory",
            AgentType::Document => "document",
            AgentType::Information => "information",
            AgentType::Communication => "communication",
        }
    }
}

impl fmt::Display for AgentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for AgentType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        AgentType::ALL
            .into_iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("Unknown agent type: {}", s))
    }
}

/// Current status of a task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    #[default]
    Pending,
    InProgress,
    Completed,
    Failed,
}

impl TaskStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed)
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskStatus::Pending => write!(f, "pending"),
            TaskStatus::InProgress => write!(f, "in_progress"),
            TaskStatus::Completed => write!(f, "completed"),
            TaskStatus::Failed => write!(f, "failed"),
        }
    }
}

/// One actionable unit within a plan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub description: String,
    pub agent_type: AgentType,
    #[serde(default)]
    pub status: TaskStatus,
}

impl Task {
    pub fn new(id: TaskId, description: impl Into<String>, agent_type: AgentType) -> Self {
        Self {
            id,
            description: description.into(),
            agent_type,
            status: TaskStatus::Pending,
        }
    }

    /// Move the task forward. Terminal statuses are never revised.
    pub(crate) fn transition(&mut self, next: TaskStatus) -> bool {
        let allowed = match (self.status, next) {
            (TaskStatus::Pending, TaskStatus::InProgress) => true,
            (TaskStatus::Pending, TaskStatus::Failed) => true,
            (TaskStatus::InProgress, TaskStatus::Completed) => true,
            (TaskStatus::InProgress, TaskStatus::Failed) => true,
            _ => false,
        };
        if allowed {
            self.status = next;
        }
        allowed
    }
}

/// Ordered decomposition of a request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    /// The request text exactly as received
    pub original_content: String,
    pub tasks: Vec<Task>,
}

impl Plan {
    pub fn new(original_content: impl Into<String>, tasks: Vec<Task>) -> Self {
        Self {
            original_content: original_content.into(),
            tasks,
        }
    }

    /// Plan for a request that needs no action
    pub fn empty(original_content: impl Into<String>) -> Self {
        Self::new(original_content, Vec::new())
    }

    /// Check ids (≥ 1, unique) and descriptions (non-empty)
    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for task in &self.tasks {
            if task.id == 0 {
                return Err(Error::PlanParse("task ids start at 1".to_string()));
            }
            if !seen.insert(task.id) {
                return Err(Error::PlanParse(format!("duplicate task id {}", task.id)));
            }
            if task.description.trim().is_empty() {
                return Err(Error::PlanParse(format!("task {} has an empty description", task.id)));
            }
        }
        Ok(())
    }

    pub fn task(&self, id: TaskId) -> Option<&Task> {
        self.tasks.iter().find(|t| t.id == id)
    }

    pub fn is_finished(&self) -> bool {
        self.tasks.iter().all(|t| t.status.is_terminal())
    }

    pub fn completed_count(&self) -> usize {
        self.count(TaskStatus::Completed)
    }

    pub fn failed_count(&self) -> usize {
        self.count(TaskStatus::Failed)
    }

    fn count(&self, status: TaskStatus) -> usize {
        self.tasks.iter().filter(|t| t.status == status).count()
    }

    /// One line per task, used in prompts and logs
    pub fn progress_lines(&self) -> String {
        self.tasks
            .iter()
            .map(|t| format!("{}. [{}] ({}) {}", t.id, t.status, t.agent_type, t.description))
            .collect::<Vec<_>>()
            .join("\n")
    }
}
