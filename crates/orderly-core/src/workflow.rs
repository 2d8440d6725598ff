//! Lifecycle driver
//!
//! Feeds one request through the pipeline: connect the tool session, build
//! the catalog, plan and execute (or stream), judge, and release the session
//! on every exit path.

use std::fmt;
use std::sync::Arc;

use futures::StreamExt;
use tokio::sync::mpsc;
use tracing::{error, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::completion::{CompletionDetector, KeywordDetector, Outcome, Verdict};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::orchestration::{ExecutionEvent, Orchestrator};
use crate::provider::Reasoner;
use crate::task::TaskPlanner;
use crate::tools::{CapabilityMap, LeaseGuard, SessionLease, ToolCatalog, ToolConnector, ToolDescriptor};

/// Which orchestration mode handles the request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RunMode {
    /// Plan first, then execute task by task
    #[default]
    Plan,
    /// One streamed reasoning run over the whole catalog
    Stream,
}

impl fmt::Display for RunMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunMode::Plan => write!(f, "plan"),
            RunMode::Stream => write!(f, "stream"),
        }
    }
}

impl std::str::FromStr for RunMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "plan" => Ok(RunMode::Plan),
            "stream" => Ok(RunMode::Stream),
            _ => Err(format!("Unknown run mode: {}", s)),
        }
    }
}

/// Owns the collaborators of one or more sequential runs
pub struct Workflow {
    config: Config,
    reasoner: Arc<dyn Reasoner>,
    connector: Arc<dyn ToolConnector>,
    detector: Arc<dyn CompletionDetector>,
    event_tx: Option<mpsc::Sender<ExecutionEvent>>,
}

impl Workflow {
    pub fn new(config: Config, reasoner: Arc<dyn Reasoner>, connector: Arc<dyn ToolConnector>) -> Self {
        let detector = Arc::new(KeywordDetector::new(&config.orchestration.success_markers));
        Self {
            config,
            reasoner,
            connector,
            detector,
            event_tx: None,
        }
    }

    /// Build the genai reasoner and MCP connector described by `config`
    #[cfg(feature = "mcp")]
    pub fn from_config(config: Config) -> Result<Self> {
        let reasoner = crate::provider::create_reasoner(&config.provider)?;
        let connector = crate::tools::mcp::McpConnector::new(config.mcp.clone());
        Ok(Self::new(config, Arc::new(reasoner), Arc::new(connector)))
    }

    pub fn with_detector(mut self, detector: Arc<dyn CompletionDetector>) -> Self {
        self.detector = detector;
        self
    }

    /// Receive progress events while a run is going
    pub fn with_events(mut self, tx: mpsc::Sender<ExecutionEvent>) -> Self {
        self.event_tx = Some(tx);
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Run one request to an outcome
    ///
    /// Never fails: errors are logged with their class and reported as an
    /// unsuccessful outcome. The tool session is released exactly once, also
    /// when the returned future is dropped before completion.
    pub async fn run(&self, request: &str, mode: RunMode) -> Outcome {
        let run_id = Uuid::new_v4();
        let span = info_span!("run", %run_id, %mode);
        self.run_inner(request, mode).instrument(span).await
    }

    async fn run_inner(&self, request: &str, mode: RunMode) -> Outcome {
        let registry = match self.connector.connect().await {
            Ok(registry) => registry,
            Err(e) => {
                error!(class = e.class(), error = %e, "Failed to connect to the tool registry");
                return Outcome::failure(format!("{} error: {}", e.class(), e));
            }
        };
        let guard = LeaseGuard::new(SessionLease::new(registry));

        let outcome = match self.drive(guard.lease(), request, mode).await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!(class = e.class(), error = %e, "Run failed");
                Outcome::failure(format!("{} error: {}", e.class(), e))
            }
        };

        guard.release().await;

        if outcome.success {
            info!(summary = %outcome.summary, "Request fulfilled");
        } else {
            warn!(summary = %outcome.summary, "Request not fulfilled");
        }
        outcome
    }

    async fn drive(&self, lease: &SessionLease, request: &str, mode: RunMode) -> Result<Outcome> {
        let descriptors = lease.list_tools().await?;
        let catalog = Arc::new(ToolCatalog::new(descriptors));
        let capabilities = Arc::new(CapabilityMap::build(&self.config.capabilities, &catalog));
        info!(tools = catalog.len(), categories = capabilities.available().len(), "Tool catalog loaded");

        let mut orchestrator = Orchestrator::new(
            self.reasoner.clone(),
            lease.clone(),
            catalog.clone(),
            capabilities.clone(),
        )
        .with_config(self.config.orchestration.clone())
        .with_fallback(self.config.fallback.clone())
        .with_detector(self.detector.clone());
        if let Some(tx) = &self.event_tx {
            orchestrator = orchestrator.with_events(tx.clone());
        }

        match mode {
            RunMode::Plan => {
                let planner = TaskPlanner::new(self.reasoner.clone(), catalog, capabilities);
                let mut plan = planner.plan(request).await?;
                self.emit(ExecutionEvent::progress(Some(format!("Plan:\n{}", plan.progress_lines())), vec![]))
                    .await;

                let outcome = orchestrator.execute_plan(&mut plan).await;
                if self.detector.judge_plan(&plan) == Verdict::Incomplete {
                    warn!("Plan finished with unfinished tasks");
                }
                Ok(outcome)
            }
            RunMode::Stream => {
                let mut stream = orchestrator.stream(request);
                let mut terminal = None;
                while let Some(item) = stream.next().await {
                    let event = item?;
                    self.emit(event.clone()).await;
                    if event.is_task_complete {
                        terminal = Some(event);
                    }
                }

                let Some(event) = terminal else {
                    return Err(Error::Orchestration("stream ended without a terminal event".to_string()));
                };
                match self.detector.judge_event(&event) {
                    Verdict::MissingMarker => {
                        warn!("Run completed but its answer carries no success marker");
                    }
                    Verdict::Success => {}
                    verdict => warn!(?verdict, "Run did not complete"),
                }
                Ok(self.detector.outcome_for_event(Some(&event)))
            }
        }
    }

    async fn emit(&self, event: ExecutionEvent) {
        if let Some(tx) = &self.event_tx {
            let _ = tx.send(event).await;
        }
    }

    /// Connect, list the catalog and disconnect
    pub async fn list_tools(&self) -> Result<Vec<ToolDescriptor>> {
        let lease = SessionLease::new(self.connector.connect().await?);
        let tools = lease.list_tools().await;
        lease.release().await;
        let mut tools = tools?;
        tools.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(tools)
    }
}
