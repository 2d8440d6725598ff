//! Orchestration: executing plans and streaming reasoning runs
//!
//! - [`Orchestrator`] walks a plan task by task, or streams one run
//! - [`ToolRouter`] sends every model-requested call through the
//!   [`FallbackPolicy`] before it reaches the registry
//! - [`ExecutionEvent`]s report progress; exactly one per run is terminal

mod events;
mod fallback;
mod orchestrator;
mod router;
mod stream;
mod system_prompt;
mod tool_result;

pub use events::{ExecutionEvent, ToolCallRecord};
pub use fallback::{FallbackPolicy, ToolRole};
pub use orchestrator::Orchestrator;
pub use router::{RoutedCall, ToolRouter};
pub use stream::EventStream;
pub use system_prompt::{task_instruction, SystemPrompt, DEFAULT_SYSTEM_PROMPT};
pub use tool_result::{format_record, format_tool_result_for_llm};
