//! Lifecycle driver tests

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{
    calls, plan_reply, text, RecordingRegistry, RefusingConnector, ScriptedReasoner, StalledReasoner, StaticConnector,
};
use orderly_core::{AgentType, Config, ExecutionEvent, RunMode, Workflow};
use serde_json::json;
use tokio::sync::mpsc;

/// Configuration whose capability table matches the shop registry
fn shop_config() -> Config {
    let mut config = Config::default();
    config.capabilities = common::shop_capabilities();
    config
}

fn workflow(reasoner: Arc<ScriptedReasoner>, registry: Arc<RecordingRegistry>) -> Workflow {
    Workflow::new(shop_config(), reasoner, Arc::new(StaticConnector { registry }))
}

mod plan_mode_tests {
    use super::*;

    #[tokio::test]
    async fn test_plan_run_end_to_end() {
        let registry = Arc::new(RecordingRegistry::shop().failing("add_to_cart", "stock_item_id", json!(7)));
        let reasoner = ScriptedReasoner::new(vec![
            plan_reply(&[
                (1, "Add 1 of stock item 7 to the cart", "order"),
                (2, "Add 2 of stock item 9 to the cart", "order"),
            ]),
            calls(&[("add_to_cart", json!({ "stock_item_id": 7, "quantity": 1 }))]),
            text("Item 7 is unavailable, alternatives listed"),
            calls(&[("add_to_cart", json!({ "stock_item_id": 9, "quantity": 2 }))]),
            text("Item 9 added to the order"),
        ]);
        let (tx, mut rx) = mpsc::channel(64);
        let workflow = workflow(reasoner, registry.clone()).with_events(tx);

        let outcome = workflow
            .run("Please send one of part 7 and two of part 9", RunMode::Plan)
            .await;

        assert!(outcome.success, "{}", outcome.summary);
        assert_eq!(registry.disconnects(), 1);
        assert_eq!(
            registry.call_names(),
            ["create_order", "add_to_cart", "find_inventory", "add_to_cart"]
        );

        let mut events: Vec<ExecutionEvent> = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        assert!(events[0].content.as_deref().is_some_and(|c| c.starts_with("Plan:")));
        assert!(events.last().unwrap().is_task_complete);
    }

    #[tokio::test]
    async fn test_unparseable_plan_fails_and_releases() {
        let registry = Arc::new(RecordingRegistry::shop());
        let reasoner = ScriptedReasoner::new(vec![text("What would you like me to do?")]);

        let outcome = workflow(reasoner, registry.clone()).run("hello", RunMode::Plan).await;

        assert!(!outcome.success);
        assert!(outcome.summary.starts_with("plan_parse"));
        assert!(registry.calls().is_empty());
        assert_eq!(registry.disconnects(), 1);
    }

    #[tokio::test]
    async fn test_blank_request() {
        let registry = Arc::new(RecordingRegistry::shop());
        let reasoner = ScriptedReasoner::new(vec![]);

        let outcome = workflow(reasoner.clone(), registry.clone()).run("   ", RunMode::Plan).await;

        assert!(outcome.success);
        assert!(reasoner.requests().is_empty());
        assert_eq!(registry.disconnects(), 1);
    }

    #[tokio::test]
    async fn test_failed_task_fails_the_run() {
        let registry = Arc::new(RecordingRegistry::shop().failing("send_email", "to", json!("ops")));
        let reasoner = ScriptedReasoner::new(vec![
            plan_reply(&[(1, "Tell ops about the order", "communication")]),
            calls(&[("send_email", json!({ "to": "ops" }))]),
            text("Email failed"),
        ]);

        let outcome = workflow(reasoner, registry.clone()).run("tell ops", RunMode::Plan).await;

        assert!(!outcome.success);
        assert_eq!(outcome.summary, "0 of 1 tasks completed, 1 failed");
        assert_eq!(registry.disconnects(), 1);
    }
}

mod stream_mode_tests {
    use super::*;

    #[tokio::test]
    async fn test_stream_run_with_confirmation() {
        let registry = Arc::new(RecordingRegistry::shop());
        let reasoner = ScriptedReasoner::new(vec![
            calls(&[("add_to_cart", json!({ "stock_item_id": 9 }))]),
            text("Order #C-1 confirmed"),
        ]);
        let (tx, mut rx) = mpsc::channel(64);
        let workflow = workflow(reasoner, registry.clone()).with_events(tx);

        let outcome = workflow.run("one of part 9", RunMode::Stream).await;

        assert!(outcome.success);
        assert_eq!(outcome.summary, "Order #C-1 confirmed");
        assert_eq!(registry.disconnects(), 1);

        let mut terminal = 0;
        while let Ok(event) = rx.try_recv() {
            terminal += usize::from(event.is_task_complete);
        }
        assert_eq!(terminal, 1);
    }

    #[tokio::test]
    async fn test_stream_run_without_confirmation() {
        let registry = Arc::new(RecordingRegistry::shop());
        let reasoner = ScriptedReasoner::new(vec![text("I could not find that item")]);

        let outcome = workflow(reasoner, registry.clone()).run("part 404", RunMode::Stream).await;

        assert!(!outcome.success);
        assert_eq!(registry.disconnects(), 1);
    }

    #[tokio::test]
    async fn test_stream_error_fails_and_releases_once() {
        let registry = Arc::new(RecordingRegistry::shop().unavailable_after(0));
        let reasoner = ScriptedReasoner::new(vec![calls(&[("send_email", json!({ "to": "ops" }))])]);

        let outcome = workflow(reasoner, registry.clone()).run("email ops", RunMode::Stream).await;

        assert!(!outcome.success);
        assert!(outcome.summary.starts_with("orchestration"));
        assert_eq!(registry.disconnects(), 1);
    }
}

mod cancellation_tests {
    use super::*;

    async fn cancelled_run(mode: RunMode) -> Arc<RecordingRegistry> {
        let registry = Arc::new(RecordingRegistry::shop());
        let workflow = Workflow::new(
            shop_config(),
            Arc::new(StalledReasoner),
            Arc::new(StaticConnector {
                registry: registry.clone(),
            }),
        );

        let run = tokio::time::timeout(Duration::from_millis(100), workflow.run("order part 9", mode)).await;
        assert!(run.is_err());
        tokio::time::sleep(Duration::from_millis(50)).await;
        registry
    }

    #[tokio::test]
    async fn test_cancelled_plan_run_releases_the_session() {
        let registry = cancelled_run(RunMode::Plan).await;
        assert_eq!(registry.disconnects(), 1);
    }

    #[tokio::test]
    async fn test_cancelled_stream_run_releases_the_session_once() {
        let registry = cancelled_run(RunMode::Stream).await;
        assert_eq!(registry.disconnects(), 1);
    }
}

mod connection_tests {
    use super::*;

    #[tokio::test]
    async fn test_refused_connection_is_a_failed_outcome() {
        let reasoner = ScriptedReasoner::new(vec![]);
        let workflow = Workflow::new(shop_config(), reasoner.clone(), Arc::new(RefusingConnector));

        let outcome = workflow.run("order part 9", RunMode::Plan).await;

        assert!(!outcome.success);
        assert!(outcome.summary.starts_with("session"));
        assert!(reasoner.requests().is_empty());
    }

    #[tokio::test]
    async fn test_list_tools_is_sorted_and_releases() {
        let registry = Arc::new(RecordingRegistry::new(&["send_email", "add_to_cart", "find_inventory"]));
        let workflow = workflow(ScriptedReasoner::new(vec![]), registry.clone());

        let names: Vec<_> = workflow.list_tools().await.unwrap().into_iter().map(|t| t.name).collect();

        assert_eq!(names, ["add_to_cart", "find_inventory", "send_email"]);
        assert_eq!(registry.disconnects(), 1);
    }

    #[tokio::test]
    async fn test_consecutive_runs_connect_afresh() {
        let registry = Arc::new(RecordingRegistry::shop());
        let reasoner = ScriptedReasoner::new(vec![text("Order 1 placed"), text("Order 2 placed")]);
        let workflow = workflow(reasoner, registry.clone());

        assert!(workflow.run("first", RunMode::Stream).await.success);
        assert!(workflow.run("second", RunMode::Stream).await.success);
        assert_eq!(registry.disconnects(), 2);
        assert!(workflow.config().capabilities.contains_key(&AgentType::Order));
    }
}
