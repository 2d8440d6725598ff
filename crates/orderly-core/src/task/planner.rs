//! Task planner - turns a free-form request into a [`Plan`]

use std::sync::Arc;

use serde::Deserialize;
use tracing::{debug, info};

use super::{AgentType, Plan, Task, TaskStatus};
use crate::error::{Error, Result};
use crate::provider::{LlmMessage, Reasoner, ReasoningRequest};
use crate::tools::{CapabilityMap, ToolCatalog};

/// Instruction given to the model for the planning call
pub const PLANNER_PROMPT: &str = r#"You are an expert fulfilment planner.
You take in a request (often an email asking for a purchase, a written document or some information) and create a plan that breaks the request down into smaller, actionable tasks.

CORE PRINCIPLE: Be direct and action-oriented. Never ask follow-up questions.

## Planning Rules

1. Always produce a plan with at least one task.
2. Each task must be specific and actionable, and must be doable with the tools of its category.
3. Order the tasks in the order they must run. Later tasks may rely on earlier ones (e.g. an order must exist before items are added).
4. Assign every task one category from the list below. Only use categories that are listed.
5. Decide yourself how many tasks are sufficient to address the request.

## Purchase Requests

- One task to make sure an order/cart exists, then one task per requested item to add it to the cart.
- Do NOT plan inventory searches up front. Searching is only done for an item whose add to cart has failed.

## Vague Requests

For vague input such as a single word or a greeting, pick one concrete, useful interpretation of the intent, restate it in the task description and plan for it. Do not return a plan that only asks a question."#;

const OUTPUT_FORMAT: &str = r#"## Output Format

Reply with a single JSON object and nothing else:

```json
{"tasks": [{"id": 1, "description": "...", "agent_type": "order"}]}
```

- `id` starts at 1 and increases by one per task.
- `agent_type` is one of the category names listed above."#;

#[derive(Debug, Deserialize)]
struct PlanReply {
    tasks: Vec<Task>,
}

/// Plans how to fulfil a request
pub struct TaskPlanner {
    reasoner: Arc<dyn Reasoner>,
    catalog: Arc<ToolCatalog>,
    capabilities: Arc<CapabilityMap>,
}

impl TaskPlanner {
    pub fn new(reasoner: Arc<dyn Reasoner>, catalog: Arc<ToolCatalog>, capabilities: Arc<CapabilityMap>) -> Self {
        Self {
            reasoner,
            catalog,
            capabilities,
        }
    }

    /// Create a plan for a request
    ///
    /// A blank request yields an empty plan without consulting the model.
    /// Anything the model returns that does not fit the plan schema is a
    /// [`Error::PlanParse`]; planning is not retried.
    pub async fn plan(&self, request: &str) -> Result<Plan> {
        if request.trim().is_empty() {
            debug!("Blank request, nothing to plan");
            return Ok(Plan::empty(request));
        }

        if self.capabilities.available().is_empty() {
            return Err(Error::PlanParse("no tool category is available to plan with".to_string()));
        }

        let reasoning = ReasoningRequest::new(vec![LlmMessage::user(request)]).with_system(self.system_prompt());
        let completion = self.reasoner.complete(reasoning).await?;
        let reply = completion
            .content
            .ok_or_else(|| Error::PlanParse("planner reply has no text".to_string()))?;

        let plan = parse_plan_reply(request, &reply, &self.capabilities)?;
        info!(tasks = plan.tasks.len(), "Plan created");
        Ok(plan)
    }

    fn system_prompt(&self) -> String {
        let mut prompt = String::from(PLANNER_PROMPT);
        prompt.push_str("\n\n## Categories and Their Tools\n");
        for agent_type in self.capabilities.available() {
            prompt.push_str(&format!("\n### {}\n", agent_type));
            for tool in self.capabilities.descriptors_for(agent_type, &self.catalog) {
                prompt.push_str(&format!("- {}: {}\n", tool.name, tool.description));
            }
        }
        prompt.push('\n');
        prompt.push_str(OUTPUT_FORMAT);
        prompt
    }
}

/// Locate the JSON object in a reply: a ```json fence, or the outermost braces
fn extract_json(reply: &str) -> Option<&str> {
    if let Some(start) = reply.find("```json") {
        let body = &reply[start + "```json".len()..];
        if let Some(end) = body.find("```") {
            return Some(body[..end].trim());
        }
    }

    let start = reply.find('{')?;
    let end = reply.rfind('}')?;
    (end > start).then(|| &reply[start..=end])
}

/// Parse the planner's reply into a validated plan for `request`
pub fn parse_plan_reply(request: &str, reply: &str, capabilities: &CapabilityMap) -> Result<Plan> {
    let json = extract_json(reply)
        .ok_or_else(|| Error::PlanParse("no JSON object in planner reply".to_string()))?;

    let parsed: PlanReply =
        serde_json::from_str(json).map_err(|e| Error::PlanParse(format!("plan does not match schema: {}", e)))?;

    if parsed.tasks.is_empty() {
        return Err(Error::PlanParse("planner returned no tasks".to_string()));
    }

    let tasks: Vec<Task> = parsed
        .tasks
        .into_iter()
        .map(|task| Task {
            status: TaskStatus::Pending,
            ..task
        })
        .collect();

    let plan = Plan::new(request, tasks);
    plan.validate()?;

    let unassignable: Vec<AgentType> = plan
        .tasks
        .iter()
        .map(|t| t.agent_type)
        .filter(|t| !capabilities.is_assignable(*t))
        .collect();
    if let Some(agent_type) = unassignable.first() {
        return Err(Error::PlanParse(format!("no tool serves category '{}'", agent_type)));
    }

    Ok(plan)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::ToolDescriptor;
    use serde_json::json;
    use std::collections::HashMap;

    fn order_only() -> CapabilityMap {
        let catalog = ToolCatalog::new(vec![ToolDescriptor::new("add_to_cart", "", json!({}))]);
        let mut configured = HashMap::new();
        configured.insert(AgentType::Order, vec!["add_to_cart".to_string()]);
        CapabilityMap::build(&configured, &catalog)
    }

    #[test]
    fn test_fenced_reply() {
        let reply = "Here is the plan:\n```json\n{\"tasks\": [{\"id\": 1, \"description\": \"Add 2 brake pads\", \"agent_type\": \"order\"}]}\n```";
        let plan = parse_plan_reply("order brake pads", reply, &order_only()).unwrap();
        assert_eq!(plan.original_content, "order brake pads");
        assert_eq!(plan.tasks.len(), 1);
        assert_eq!(plan.tasks[0].status, TaskStatus::Pending);
    }

    #[test]
    fn test_model_supplied_content_and_status_are_ignored() {
        let reply = r#"{"original_content": "paraphrased", "tasks": [{"id": 1, "description": "Add item", "agent_type": "order", "status": "completed"}]}"#;
        let plan = parse_plan_reply("  Exact request\n", reply, &order_only()).unwrap();
        assert_eq!(plan.original_content, "  Exact request\n");
        assert_eq!(plan.tasks[0].status, TaskStatus::Pending);
    }

    #[test]
    fn test_question_without_plan_is_parse_error() {
        let err = parse_plan_reply("hello", "What would you like to order?", &order_only()).unwrap_err();
        assert!(matches!(err, Error::PlanParse(_)));
    }

    #[test]
    fn test_empty_task_list_is_parse_error() {
        let err = parse_plan_reply("order pads", r#"{"tasks": []}"#, &order_only()).unwrap_err();
        assert!(matches!(err, Error::PlanParse(_)));
    }

    #[test]
    fn test_category_without_tools_is_parse_error() {
        let reply = r#"{"tasks": [{"id": 1, "description": "Write a memo", "agent_type": "document"}]}"#;
        let err = parse_plan_reply("write a memo", reply, &order_only()).unwrap_err();
        assert!(err.to_string().contains("document"));
    }

    #[test]
    fn test_extract_json_outermost_braces() {
        assert_eq!(extract_json("x {\"a\": {\"b\": 1}} y"), Some("{\"a\": {\"b\": 1}}"));
        assert_eq!(extract_json("} nothing {"), None);
    }
}
