//! Completion detection
//!
//! Turns what a run produced into a binary [`Outcome`]. Streaming runs are
//! judged on their terminal event, plan runs on their final task statuses.
//! The two rules stay separate.
//!
//! Keyword matching on the terminal event's text is fragile; it sits behind
//! [`CompletionDetector`] so it can be swapped for a structured success flag.

use serde::{Deserialize, Serialize};

use crate::orchestration::ExecutionEvent;
use crate::task::{Plan, TaskStatus};

/// Result of one request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Outcome {
    pub success: bool,
    pub summary: String,
}

impl Outcome {
    pub fn success(summary: impl Into<String>) -> Self {
        Self {
            success: true,
            summary: summary.into(),
        }
    }

    pub fn failure(summary: impl Into<String>) -> Self {
        Self {
            success: false,
            summary: summary.into(),
        }
    }
}

/// Detailed judgement behind an outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Success,
    /// Run completed but its final text carries no success marker
    MissingMarker,
    /// Not every step finished
    Incomplete,
    Failed,
}

impl Verdict {
    pub fn is_success(&self) -> bool {
        matches!(self, Verdict::Success)
    }
}

pub trait CompletionDetector: Send + Sync {
    /// Judge a streaming run by its terminal event
    fn judge_event(&self, event: &ExecutionEvent) -> Verdict;

    /// Judge a plan run by its final task statuses
    fn judge_plan(&self, plan: &Plan) -> Verdict;

    /// Outcome of a streaming run; `None` when no terminal event arrived
    fn outcome_for_event(&self, event: Option<&ExecutionEvent>) -> Outcome {
        let Some(event) = event else {
            return Outcome::failure("run ended without a final answer");
        };
        let content = event.content.clone().unwrap_or_default();
        match self.judge_event(event) {
            Verdict::Success => Outcome::success(content),
            Verdict::MissingMarker => Outcome::failure(format!("completed without confirmation: {}", content)),
            Verdict::Incomplete => Outcome::failure("run did not complete"),
            Verdict::Failed => Outcome::failure(content),
        }
    }

    fn outcome_for_plan(&self, plan: &Plan) -> Outcome {
        let summary = format!(
            "{} of {} tasks completed, {} failed",
            plan.completed_count(),
            plan.tasks.len(),
            plan.failed_count()
        );
        if self.judge_plan(plan).is_success() {
            Outcome::success(summary)
        } else {
            Outcome::failure(summary)
        }
    }
}

/// Keyword-based detector
///
/// A streaming run succeeds when its terminal event mentions one of the
/// markers, case-insensitively.
#[derive(Debug, Clone)]
pub struct KeywordDetector {
    markers: Vec<String>,
}

impl KeywordDetector {
    pub fn new<I, S>(markers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            markers: markers
                .into_iter()
                .map(|m| m.as_ref().trim().to_lowercase())
                .filter(|m| !m.is_empty())
                .collect(),
        }
    }

    pub fn markers(&self) -> &[String] {
        &self.markers
    }
}

impl Default for KeywordDetector {
    fn default() -> Self {
        Self::new(["order"])
    }
}

impl CompletionDetector for KeywordDetector {
    fn judge_event(&self, event: &ExecutionEvent) -> Verdict {
        if !event.is_task_complete {
            return Verdict::Incomplete;
        }
        let content = event.content.as_deref().unwrap_or("").to_lowercase();
        if self.markers.iter().any(|m| content.contains(m.as_str())) {
            Verdict::Success
        } else {
            Verdict::MissingMarker
        }
    }

    fn judge_plan(&self, plan: &Plan) -> Verdict {
        if plan.tasks.iter().any(|t| t.status == TaskStatus::Failed) {
            Verdict::Failed
        } else if plan.tasks.iter().all(|t| t.status == TaskStatus::Completed) {
            Verdict::Success
        } else {
            Verdict::Incomplete
        }
    }
}
