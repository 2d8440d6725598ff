//! Plan execution
//!
//! Walks a plan's tasks in list order. Each task gets its own tool loop with
//! the model, restricted to the tools of its category. The fallback policy
//! state is shared by all tasks of one run.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use super::events::{ExecutionEvent, ToolCallRecord};
use super::router::ToolRouter;
use super::stream::{event_stream, EventStream, StreamRun};
use super::system_prompt::{task_instruction, SystemPrompt};
use super::tool_result::format_tool_result_for_llm;
use crate::completion::{CompletionDetector, KeywordDetector, Outcome};
use crate::config::{FallbackConfig, OrchestrationConfig};
use crate::error::{Error, Result};
use crate::provider::{LlmMessage, Reasoner, ReasoningRequest};
use crate::task::{Plan, Task, TaskStatus};
use crate::tools::{CapabilityMap, SessionLease, ToolCatalog, ToolDescriptor};

/// How one task's tool loop ended
#[derive(Debug)]
struct TaskRun {
    completed: bool,
    content: Option<String>,
}

/// Executes plans and streams single reasoning runs against one tool session
pub struct Orchestrator {
    reasoner: Arc<dyn Reasoner>,
    lease: SessionLease,
    catalog: Arc<ToolCatalog>,
    capabilities: Arc<CapabilityMap>,
    config: OrchestrationConfig,
    fallback: FallbackConfig,
    detector: Arc<dyn CompletionDetector>,
    event_tx: Option<mpsc::Sender<ExecutionEvent>>,
}

impl Orchestrator {
    pub fn new(
        reasoner: Arc<dyn Reasoner>,
        lease: SessionLease,
        catalog: Arc<ToolCatalog>,
        capabilities: Arc<CapabilityMap>,
    ) -> Self {
        Self {
            reasoner,
            lease,
            catalog,
            capabilities,
            config: OrchestrationConfig::default(),
            fallback: FallbackConfig::default(),
            detector: Arc::new(KeywordDetector::default()),
            event_tx: None,
        }
    }

    pub fn with_config(mut self, config: OrchestrationConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_fallback(mut self, fallback: FallbackConfig) -> Self {
        self.fallback = fallback;
        self
    }

    pub fn with_detector(mut self, detector: Arc<dyn CompletionDetector>) -> Self {
        self.detector = detector;
        self
    }

    /// Publish plan-execution progress on a channel
    pub fn with_events(mut self, tx: mpsc::Sender<ExecutionEvent>) -> Self {
        self.event_tx = Some(tx);
        self
    }

    fn router(&self) -> ToolRouter {
        ToolRouter::new(
            self.lease.clone(),
            self.catalog.clone(),
            self.fallback.clone(),
            Duration::from_secs(self.config.tool_timeout_secs),
        )
    }

    async fn emit(&self, event: ExecutionEvent) {
        if let Some(tx) = &self.event_tx {
            let _ = tx.send(event).await;
        }
    }

    /// Execute every task of `plan` in order
    ///
    /// Never fails: a run-level error marks the current and all remaining
    /// tasks failed, and the outcome reports it.
    pub async fn execute_plan(&self, plan: &mut Plan) -> Outcome {
        let mut router = self.router();
        let mut aborted: Option<Error> = None;

        for index in 0..plan.tasks.len() {
            if aborted.is_some() {
                plan.tasks[index].transition(TaskStatus::Failed);
                continue;
            }

            plan.tasks[index].transition(TaskStatus::InProgress);
            let task = plan.tasks[index].clone();
            let tools = self.capabilities.descriptors_for(task.agent_type, &self.catalog);
            info!(task_id = task.id, agent_type = %task.agent_type, "Starting task");

            if tools.is_empty() {
                warn!(task_id = task.id, agent_type = %task.agent_type, "No tools serve this task");
                plan.tasks[index].transition(TaskStatus::Failed);
                self.emit(
                    ExecutionEvent::progress(Some(format!("No tools available for {}", task.agent_type)), vec![])
                        .for_task(task.id),
                )
                .await;
                continue;
            }

            let system = SystemPrompt::new().with_plan(plan).build();
            match self.run_task(&task, &system, &tools, &mut router).await {
                Ok(run) => {
                    let status = if run.completed { TaskStatus::Completed } else { TaskStatus::Failed };
                    plan.tasks[index].transition(status);
                    info!(task_id = task.id, %status, "Task finished");
                    if run.content.is_some() {
                        self.emit(ExecutionEvent::progress(run.content, vec![]).for_task(task.id)).await;
                    }
                }
                Err(e) => {
                    error!(task_id = task.id, class = e.class(), error = %e, "Run aborted");
                    plan.tasks[index].transition(TaskStatus::Failed);
                    aborted = Some(e);
                }
            }
        }

        let mut outcome = self.detector.outcome_for_plan(plan);
        if let Some(e) = aborted {
            outcome = Outcome::failure(format!("{} (run aborted: {})", outcome.summary, e));
        }
        self.emit(ExecutionEvent::terminal(Some(outcome.summary.clone()))).await;
        outcome
    }

    /// Tool loop for one task
    async fn run_task(
        &self,
        task: &Task,
        system: &str,
        tools: &[ToolDescriptor],
        router: &mut ToolRouter,
    ) -> Result<TaskRun> {
        let mut messages = vec![LlmMessage::user(task_instruction(task))];
        let mut unhandled = false;

        for turn in 1..=self.config.max_iterations {
            let request = ReasoningRequest::new(messages.clone())
                .with_system(system)
                .with_tools(tools.to_vec());
            let completion = self
                .reasoner
                .complete(request)
                .await
                .map_err(|e| Error::Orchestration(format!("reasoning step failed: {}", e)))?;

            if !completion.has_tool_calls() {
                debug!(task_id = task.id, turn, "Model finished task");
                return Ok(TaskRun {
                    completed: !unhandled,
                    content: completion.content,
                });
            }

            messages.push(LlmMessage::assistant_with_tool_calls(
                completion.content.clone(),
                completion.tool_calls.clone(),
            ));

            let mut records: Vec<ToolCallRecord> = Vec::new();
            for call in &completion.tool_calls {
                let routed = router.route(call, tools).await?;
                unhandled |= routed.unhandled_failure;
                messages.push(LlmMessage::tool_result(
                    &call.call_id,
                    format_tool_result_for_llm(&call.call_id, &routed.records),
                ));
                records.extend(routed.records);
            }

            self.emit(ExecutionEvent::progress(completion.content, records).for_task(task.id))
                .await;
        }

        warn!(task_id = task.id, max_iterations = self.config.max_iterations, "Task hit the turn limit");
        Ok(TaskRun {
            completed: false,
            content: None,
        })
    }

    /// Stream a single reasoning run over the whole catalog
    ///
    /// Consumes the orchestrator: its session moves into the run and is
    /// released when the stream ends after the terminal event or the first
    /// error, or when the stream is dropped early.
    pub fn stream(self, request: &str) -> EventStream {
        let run = StreamRun {
            router: self.router(),
            reasoner: self.reasoner,
            tools: self.catalog.descriptors(),
            system: SystemPrompt::new().build(),
            messages: vec![LlmMessage::user(request)],
            turns: 0,
            max_iterations: self.config.max_iterations,
            finished: false,
        };
        event_stream(run)
    }
}
