//! Pull-based streaming run

use std::pin::Pin;
use std::sync::Arc;

use futures::Stream;
use tracing::{debug, warn};

use super::events::ExecutionEvent;
use super::router::ToolRouter;
use super::tool_result::format_tool_result_for_llm;
use crate::error::{Error, Result};
use crate::provider::{LlmMessage, Reasoner, ReasoningRequest};
use crate::tools::ToolDescriptor;

/// Lazy sequence of execution events for one run
pub type EventStream = Pin<Box<dyn Stream<Item = Result<ExecutionEvent>> + Send>>;

/// State carried between pulls
pub(crate) struct StreamRun {
    pub(crate) reasoner: Arc<dyn Reasoner>,
    pub(crate) router: ToolRouter,
    pub(crate) tools: Vec<ToolDescriptor>,
    pub(crate) system: String,
    pub(crate) messages: Vec<LlmMessage>,
    pub(crate) turns: usize,
    pub(crate) max_iterations: usize,
    pub(crate) finished: bool,
}

impl StreamRun {
    /// One reasoning step plus the tool calls it requests
    async fn step(&mut self) -> Result<ExecutionEvent> {
        if self.turns >= self.max_iterations {
            return Err(Error::Orchestration(format!(
                "no final answer after {} turns",
                self.max_iterations
            )));
        }
        self.turns += 1;

        let request = ReasoningRequest::new(self.messages.clone())
            .with_system(self.system.as_str())
            .with_tools(self.tools.clone());
        let completion = self
            .reasoner
            .complete(request)
            .await
            .map_err(|e| Error::Orchestration(format!("reasoning step failed: {}", e)))?;

        if !completion.has_tool_calls() {
            debug!(turns = self.turns, "Model produced its final answer");
            return Ok(ExecutionEvent::terminal(completion.content));
        }

        self.messages.push(LlmMessage::assistant_with_tool_calls(
            completion.content.clone(),
            completion.tool_calls.clone(),
        ));

        let mut records = Vec::new();
        for call in &completion.tool_calls {
            let routed = self.router.route(call, &self.tools).await?;
            self.messages.push(LlmMessage::tool_result(
                &call.call_id,
                format_tool_result_for_llm(&call.call_id, &routed.records),
            ));
            records.extend(routed.records);
        }

        Ok(ExecutionEvent::progress(completion.content, records))
    }

    async fn finish(&mut self) {
        self.finished = true;
        self.router.lease().release().await;
    }
}

impl Drop for StreamRun {
    fn drop(&mut self) {
        if !self.finished {
            debug!("Stream dropped before its end, releasing session");
            self.router.lease().release_in_background();
        }
    }
}

pub(crate) fn event_stream(run: StreamRun) -> EventStream {
    Box::pin(futures::stream::unfold(run, |mut run| async move {
        if run.finished {
            return None;
        }

        let item = run.step().await;
        match &item {
            Ok(event) if event.is_task_complete => run.finish().await,
            Ok(_) => {}
            Err(e) => {
                warn!(class = e.class(), error = %e, "Streaming run failed");
                run.finish().await;
            }
        }
        Some((item, run))
    }))
}
