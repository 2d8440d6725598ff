//! System prompt management
//!
//! Single source of truth for the instructions given to the model during
//! execution, in both plan-execution and streaming mode.

use crate::task::{Plan, Task};

/// System prompt configuration and generation
#[derive(Debug, Clone)]
pub struct SystemPrompt {
    /// Base system prompt
    base: String,
    /// Additional context (e.g. the plan being executed)
    context: Option<String>,
}

impl Default for SystemPrompt {
    fn default() -> Self {
        Self::new()
    }
}

impl SystemPrompt {
    /// Create a new system prompt with the default content
    pub fn new() -> Self {
        Self {
            base: DEFAULT_SYSTEM_PROMPT.to_string(),
            context: None,
        }
    }

    /// Create with custom base prompt
    pub fn with_base(base: impl Into<String>) -> Self {
        Self {
            base: base.into(),
            context: None,
        }
    }

    /// Add the plan being executed as context
    pub fn with_plan(mut self, plan: &Plan) -> Self {
        let context = format!(
            "\n\n## Request\n{}\n\n## Plan\n{}",
            plan.original_content,
            plan.progress_lines()
        );
        self.context = Some(context);
        self
    }

    /// Add custom context
    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    /// Build the final system prompt
    pub fn build(&self) -> String {
        match &self.context {
            Some(ctx) => format!("{}{}", self.base, ctx),
            None => self.base.clone(),
        }
    }
}

/// User turn that starts the tool loop for one task
pub fn task_instruction(task: &Task) -> String {
    format!(
        "Carry out task {} ({}): {}\n\nUse the tools provided. When the task is done, reply with a short summary and no tool calls.",
        task.id, task.agent_type, task.description
    )
}

/// Default system prompt used in both execution modes
pub const DEFAULT_SYSTEM_PROMPT: &str = r#"You are Orderly, an assistant that fulfils requests by calling tools.

## Fulfilling Orders

1. Make sure an order/cart exists before adding any item. If none exists, one is created for you.
2. For each requested item, call add_to_cart first. This is the primary way to fulfil an order.
3. Only when add_to_cart fails for a specific item, find_inventory is used for that item to find an alternative. Never search inventory for items that were added successfully, and never search for all items up front.
4. Never repeat a call that already failed with the same arguments.

## Tool Result Handling

Tool results arrive as messages starting with "[Tool result for". Results marked [fallback] come from calls made on your behalf. A call that "was not run" was refused; do not try it again, adjust instead.

## Finishing

When everything that can be done is done, reply without tool calls. Summarise what happened, and if an order was placed, say so explicitly and include the order or cart reference."#;
