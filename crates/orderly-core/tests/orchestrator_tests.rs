//! Plan execution tests

mod common;

use std::sync::Arc;

use common::{calls, shop_capabilities, text, RecordingRegistry, ScriptedReasoner};
use orderly_core::tools::{CapabilityMap, SessionLease, ToolCatalog, ToolRegistry};
use orderly_core::{
    AgentType, Completion, ExecutionEvent, OrchestrationConfig, Orchestrator, Plan, Result, Task, TaskStatus,
};
use serde_json::json;
use tokio::sync::mpsc;

async fn orchestrator(reasoner: Arc<ScriptedReasoner>, registry: Arc<RecordingRegistry>) -> Orchestrator {
    let catalog = Arc::new(ToolCatalog::new(registry.list_tools().await.unwrap()));
    let capabilities = Arc::new(CapabilityMap::build(&shop_capabilities(), &catalog));
    Orchestrator::new(reasoner, SessionLease::new(registry), catalog, capabilities)
}

fn drain(rx: &mut mpsc::Receiver<ExecutionEvent>) -> Vec<ExecutionEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

fn statuses(plan: &Plan) -> Vec<TaskStatus> {
    plan.tasks.iter().map(|t| t.status).collect()
}

/// Create an order, add item 7 (out of stock) and item 9
fn shop_plan() -> Plan {
    Plan::new(
        "Please order one of part 7 and one of part 9",
        vec![
            Task::new(1, "Create an order", AgentType::Order),
            Task::new(2, "Add 1 of stock item 7 to the cart", AgentType::Order),
            Task::new(3, "Add 1 of stock item 9 to the cart", AgentType::Order),
        ],
    )
}

fn shop_script() -> Vec<Result<Completion>> {
    vec![
        calls(&[("create_order", json!({}))]),
        text("Order created with cart C-1"),
        calls(&[("add_to_cart", json!({ "stock_item_id": 7, "quantity": 1 }))]),
        text("Item 7 is out of stock, alternatives were looked up"),
        calls(&[("add_to_cart", json!({ "stock_item_id": 9, "quantity": 1 }))]),
        text("Item 9 added to the order"),
    ]
}

fn out_of_stock_registry() -> Arc<RecordingRegistry> {
    Arc::new(RecordingRegistry::shop().failing("add_to_cart", "stock_item_id", json!(7)))
}

mod fallback_tests {
    use super::*;

    #[tokio::test]
    async fn test_search_only_for_the_failed_item() {
        let registry = out_of_stock_registry();
        let reasoner = ScriptedReasoner::new(shop_script());
        let orchestrator = orchestrator(reasoner, registry.clone()).await;

        let mut plan = shop_plan();
        let outcome = orchestrator.execute_plan(&mut plan).await;

        assert!(outcome.success, "{}", outcome.summary);
        assert_eq!(registry.count("find_inventory", "query", &json!("7")), 1);
        assert_eq!(registry.count("find_inventory", "query", &json!("9")), 0);
        assert_eq!(registry.count("add_to_cart", "stock_item_id", &json!(9)), 1);
        assert_eq!(registry.call_names().iter().filter(|n| *n == "create_order").count(), 1);
    }

    #[tokio::test]
    async fn test_cart_is_injected_into_adds() {
        let registry = out_of_stock_registry();
        let orchestrator = orchestrator(ScriptedReasoner::new(shop_script()), registry.clone()).await;

        orchestrator.execute_plan(&mut shop_plan()).await;

        let adds: Vec<_> = registry.calls().into_iter().filter(|(name, _)| name == "add_to_cart").collect();
        assert_eq!(adds.len(), 2);
        assert!(adds.iter().all(|(_, args)| args["cart"] == json!("C-1")));
    }

    #[tokio::test]
    async fn test_search_before_a_failed_add_is_refused() {
        let registry = out_of_stock_registry();
        let reasoner = ScriptedReasoner::new(vec![
            calls(&[("add_to_cart", json!({ "stock_item_id": 7 }))]),
            calls(&[("find_inventory", json!({ "query": "7" }))]),
            text("Nothing more to do for item 7"),
        ]);
        let orchestrator = orchestrator(reasoner, registry.clone()).await;

        let mut plan = Plan::new(
            "part 7 please",
            vec![Task::new(1, "Add stock item 7, look for alternatives if needed", AgentType::Inventory)],
        );
        // inventory tasks are not offered add_to_cart
        orchestrator.execute_plan(&mut plan).await;
        assert_eq!(registry.count("find_inventory", "query", &json!("7")), 0);
    }

    #[tokio::test]
    async fn test_refused_search_does_not_reach_the_registry() {
        let registry = out_of_stock_registry();
        let reasoner = ScriptedReasoner::new(vec![
            calls(&[("add_to_cart", json!({ "stock_item_id": 7 }))]),
            text("Item 7 could not be added"),
            calls(&[("find_inventory", json!({ "query": "7" }))]),
            text("Already searched"),
        ]);
        let orchestrator = orchestrator(reasoner, registry.clone()).await;

        let mut plan = Plan::new(
            "part 7 please",
            vec![
                Task::new(1, "Add stock item 7 to the cart", AgentType::Order),
                Task::new(2, "Find alternatives for stock item 7", AgentType::Inventory),
            ],
        );
        let outcome = orchestrator.execute_plan(&mut plan).await;

        assert_eq!(registry.count("find_inventory", "query", &json!("7")), 1);
        assert_eq!(statuses(&plan), vec![TaskStatus::Completed, TaskStatus::Completed]);
        assert!(outcome.success);
    }

    #[tokio::test]
    async fn test_call_order_is_deterministic() {
        let mut sequences = Vec::new();
        for _ in 0..2 {
            let registry = out_of_stock_registry();
            let orchestrator = orchestrator(ScriptedReasoner::new(shop_script()), registry.clone()).await;
            orchestrator.execute_plan(&mut shop_plan()).await;
            sequences.push(registry.calls());
        }

        assert_eq!(sequences[0], sequences[1]);
        let names: Vec<_> = sequences[0].iter().map(|(name, _)| name.as_str()).collect();
        assert_eq!(
            names,
            ["create_order", "add_to_cart", "find_inventory", "add_to_cart"]
        );
    }
}

mod task_status_tests {
    use super::*;

    #[tokio::test]
    async fn test_failed_middle_task_fails_the_outcome() {
        let registry = Arc::new(RecordingRegistry::shop().failing("send_email", "to", json!("nobody")));
        let reasoner = ScriptedReasoner::new(vec![
            calls(&[("create_order", json!({}))]),
            text("Order created"),
            calls(&[("send_email", json!({ "to": "nobody", "body": "Your order" }))]),
            text("The email could not be sent"),
            calls(&[("add_to_cart", json!({ "stock_item_id": 9 }))]),
            text("Item 9 added"),
        ]);
        let orchestrator = orchestrator(reasoner, registry.clone()).await;

        let mut plan = Plan::new(
            "order part 9 and tell nobody",
            vec![
                Task::new(1, "Create an order", AgentType::Order),
                Task::new(2, "Email the confirmation", AgentType::Communication),
                Task::new(3, "Add stock item 9", AgentType::Order),
            ],
        );
        let outcome = orchestrator.execute_plan(&mut plan).await;

        assert!(!outcome.success);
        assert_eq!(
            statuses(&plan),
            vec![TaskStatus::Completed, TaskStatus::Failed, TaskStatus::Completed]
        );
        assert_eq!(outcome.summary, "2 of 3 tasks completed, 1 failed");
    }

    #[tokio::test]
    async fn test_lost_session_fails_remaining_tasks() {
        let registry = Arc::new(RecordingRegistry::shop().unavailable_after(1));
        let reasoner = ScriptedReasoner::new(vec![
            calls(&[("create_order", json!({}))]),
            text("Order created"),
            calls(&[("add_to_cart", json!({ "stock_item_id": 9 }))]),
        ]);
        let orchestrator = orchestrator(reasoner.clone(), registry.clone()).await;

        let mut plan = Plan::new(
            "order parts 9 and 10",
            vec![
                Task::new(1, "Create an order", AgentType::Order),
                Task::new(2, "Add stock item 9", AgentType::Order),
                Task::new(3, "Add stock item 10", AgentType::Order),
            ],
        );
        let outcome = orchestrator.execute_plan(&mut plan).await;

        assert!(!outcome.success);
        assert!(
            outcome
                .summary
                .ends_with("(run aborted: Orchestration error: Tool registry unavailable: connection reset)"),
            "{}",
            outcome.summary
        );
        assert_eq!(
            statuses(&plan),
            vec![TaskStatus::Completed, TaskStatus::Failed, TaskStatus::Failed]
        );
        assert_eq!(reasoner.remaining(), 0);
        assert_eq!(reasoner.requests().len(), 3);
    }

    #[tokio::test]
    async fn test_task_without_tools_fails_without_reasoning() {
        let registry = Arc::new(RecordingRegistry::shop());
        let reasoner = ScriptedReasoner::new(vec![text("Order is ready")]);
        let orchestrator = orchestrator(reasoner.clone(), registry).await;

        let mut plan = Plan::new(
            "write a memo, then confirm",
            vec![
                Task::new(1, "Write a memo", AgentType::Document),
                Task::new(2, "Confirm the order", AgentType::Order),
            ],
        );
        let outcome = orchestrator.execute_plan(&mut plan).await;

        assert!(!outcome.success);
        assert_eq!(statuses(&plan), vec![TaskStatus::Failed, TaskStatus::Completed]);
        assert_eq!(reasoner.requests().len(), 1);
    }

    #[tokio::test]
    async fn test_turn_limit_fails_the_task() {
        let registry = Arc::new(RecordingRegistry::shop());
        let reasoner = ScriptedReasoner::new(vec![
            calls(&[("send_email", json!({ "to": "a" }))]),
            calls(&[("send_email", json!({ "to": "b" }))]),
            text("Order confirmed"),
        ]);
        let orchestrator = orchestrator(reasoner.clone(), registry)
            .await
            .with_config(OrchestrationConfig {
                max_iterations: 2,
                ..Default::default()
            });

        let mut plan = Plan::new(
            "email twice then order",
            vec![
                Task::new(1, "Email everyone", AgentType::Communication),
                Task::new(2, "Confirm the order", AgentType::Order),
            ],
        );
        orchestrator.execute_plan(&mut plan).await;

        assert_eq!(statuses(&plan), vec![TaskStatus::Failed, TaskStatus::Completed]);
    }

    #[tokio::test]
    async fn test_empty_plan_succeeds() {
        let registry = Arc::new(RecordingRegistry::shop());
        let reasoner = ScriptedReasoner::new(vec![]);
        let orchestrator = orchestrator(reasoner.clone(), registry.clone()).await;

        let outcome = orchestrator.execute_plan(&mut Plan::empty("")).await;

        assert!(outcome.success);
        assert!(reasoner.requests().is_empty());
        assert!(registry.calls().is_empty());
    }
}

mod event_tests {
    use super::*;

    #[tokio::test]
    async fn test_events_end_with_one_terminal_event() {
        let (tx, mut rx) = mpsc::channel(64);
        let registry = out_of_stock_registry();
        let orchestrator = orchestrator(ScriptedReasoner::new(shop_script()), registry)
            .await
            .with_events(tx);

        orchestrator.execute_plan(&mut shop_plan()).await;
        let events = drain(&mut rx);

        let (last, rest) = events.split_last().unwrap();
        assert!(last.is_task_complete);
        assert!(rest.iter().all(|e| !e.is_task_complete));
        assert_eq!(last.content.as_deref(), Some("3 of 3 tasks completed, 0 failed"));
    }

    #[tokio::test]
    async fn test_fallback_calls_are_visible_in_events() {
        let (tx, mut rx) = mpsc::channel(64);
        let orchestrator = orchestrator(ScriptedReasoner::new(shop_script()), out_of_stock_registry())
            .await
            .with_events(tx);

        orchestrator.execute_plan(&mut shop_plan()).await;
        let events = drain(&mut rx);

        let task_two: Vec<_> = events
            .iter()
            .filter(|e| e.task_id == Some(2))
            .flat_map(|e| e.tool_calls.iter())
            .collect();
        let names: Vec<_> = task_two.iter().map(|r| (r.tool_name.as_str(), r.fallback)).collect();
        assert_eq!(names, [("add_to_cart", false), ("find_inventory", true)]);
        assert!(task_two[0].error.is_some());
    }
}

mod reuse_tests {
    use super::*;
    use futures::StreamExt;

    fn add_nine() -> Plan {
        Plan::new(
            "one of part 9",
            vec![Task::new(1, "Add 1 of stock item 9 to the cart", AgentType::Order)],
        )
    }

    fn add_nine_script() -> Vec<Result<Completion>> {
        vec![
            calls(&[("add_to_cart", json!({ "stock_item_id": 9, "quantity": 1 }))]),
            text("Item 9 added to the order"),
        ]
    }

    #[tokio::test]
    async fn test_plans_then_stream_on_one_orchestrator() {
        let registry = Arc::new(RecordingRegistry::shop());
        let mut script = add_nine_script();
        script.extend(add_nine_script());
        script.extend(add_nine_script());
        let orchestrator = orchestrator(ScriptedReasoner::new(script), registry.clone()).await;

        assert!(orchestrator.execute_plan(&mut add_nine()).await.success);
        assert!(orchestrator.execute_plan(&mut add_nine()).await.success);
        assert_eq!(registry.disconnects(), 0);
        // Each run starts with a fresh policy and so opens its own order
        assert_eq!(registry.call_names(), ["create_order", "add_to_cart", "create_order", "add_to_cart"]);

        let items: Vec<_> = orchestrator.stream("one of part 9").collect().await;

        assert!(items.iter().all(|item| item.is_ok()));
        assert!(items.last().unwrap().as_ref().unwrap().is_task_complete);
        assert_eq!(registry.call_names().len(), 6);
        assert_eq!(registry.disconnects(), 1);
    }
}
