//! Routes model-requested tool calls through the fallback policy

use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use tracing::{debug, warn};

use super::events::ToolCallRecord;
use super::fallback::{FallbackPolicy, ToolRole};
use crate::config::FallbackConfig;
use crate::error::{Error, Result, ToolError};
use crate::provider::PendingToolCall;
use crate::tools::{SessionLease, ToolCatalog, ToolDescriptor};

/// Everything that happened for one requested call
#[derive(Debug, Clone, Default)]
pub struct RoutedCall {
    /// Invocations and refusals in the order they happened
    pub records: Vec<ToolCallRecord>,
    /// A real invocation failed and no fallback made up for it
    pub unhandled_failure: bool,
}

impl RoutedCall {
    fn single(record: ToolCallRecord) -> Self {
        let unhandled_failure = !record.is_success() && !record.blocked;
        Self {
            records: vec![record],
            unhandled_failure,
        }
    }

    fn refused(call: &PendingToolCall, error: ToolError) -> Self {
        Self {
            records: vec![ToolCallRecord::failed(&call.name, call.arguments.clone(), &error)],
            unhandled_failure: false,
        }
    }
}

/// Per-run tool router
///
/// Owns the run's [`FallbackPolicy`] state; a fresh router starts a fresh run.
pub struct ToolRouter {
    lease: SessionLease,
    catalog: Arc<ToolCatalog>,
    policy: FallbackPolicy,
    timeout: Duration,
}

impl ToolRouter {
    pub fn new(lease: SessionLease, catalog: Arc<ToolCatalog>, fallback: FallbackConfig, timeout: Duration) -> Self {
        Self {
            lease,
            catalog,
            policy: FallbackPolicy::new(fallback),
            timeout,
        }
    }

    pub fn policy(&self) -> &FallbackPolicy {
        &self.policy
    }

    pub fn lease(&self) -> &SessionLease {
        &self.lease
    }

    /// Route one call the model asked for
    ///
    /// `offered` is the tool subset the model was given. Only a lost registry
    /// session is an error; tool failures come back inside the records.
    pub async fn route(&mut self, call: &PendingToolCall, offered: &[ToolDescriptor]) -> Result<RoutedCall> {
        if !offered.iter().any(|t| t.name == call.name) {
            debug!(tool = %call.name, "Model requested a tool it was not offered");
            return Ok(RoutedCall::refused(call, ToolError::NotFound(call.name.clone())));
        }

        match self.policy.role(&call.name) {
            ToolRole::AddToCart => self.route_add(call.arguments.clone()).await,
            ToolRole::FindInventory => self.route_search(call).await,
            ToolRole::CreateOrder => self.route_create(call).await,
            ToolRole::Other => {
                let record = self.invoke(&call.name, call.arguments.clone(), false).await?;
                Ok(RoutedCall::single(record))
            }
        }
    }

    async fn route_create(&mut self, call: &PendingToolCall) -> Result<RoutedCall> {
        if self.policy.order_exists() {
            let existing = self.policy.cart().map(|c| c.to_string()).unwrap_or_else(|| "unknown".to_string());
            return Ok(RoutedCall::refused(
                call,
                ToolError::Blocked(format!("an order already exists (cart {})", existing)),
            ));
        }

        let record = self.invoke(&call.name, call.arguments.clone(), false).await?;
        if let Some(result) = &record.result {
            self.adopt_order(result);
        }
        Ok(RoutedCall::single(record))
    }

    async fn route_add(&mut self, arguments: Value) -> Result<RoutedCall> {
        let mut routed = RoutedCall::default();
        let create_tool = self.policy.config().create_order_tool.clone();
        let add_tool = self.policy.config().add_to_cart_tool.clone();
        let find_tool = self.policy.config().find_inventory_tool.clone();

        if self.policy.needs_order(&arguments) && self.catalog.contains(&create_tool) {
            debug!("No order yet, creating one before adding items");
            let record = self.invoke(&create_tool, json!({}), true).await?;
            let created = record.is_success();
            if let Some(result) = &record.result {
                self.adopt_order(result);
            }
            routed.records.push(record);
            if !created {
                routed.unhandled_failure = true;
                return Ok(routed);
            }
        }

        self.policy.remember_cart_from_arguments(&arguments);
        let arguments = self.policy.with_cart(arguments);
        let item = self.policy.item_of(&arguments);

        let record = self.invoke(&add_tool, arguments, false).await?;
        let add_failed = !record.is_success() && !record.blocked;
        routed.records.push(record);
        if !add_failed {
            return Ok(routed);
        }

        let Some(item) = item else {
            warn!("Add to cart failed for an unidentifiable item, no fallback possible");
            routed.unhandled_failure = true;
            return Ok(routed);
        };
        self.policy.record_add_failure(&item);

        if self.policy.was_searched(&item) {
            debug!(%item, "Item already searched, not searching again");
            return Ok(routed);
        }
        if !self.catalog.contains(&find_tool) {
            routed.unhandled_failure = true;
            return Ok(routed);
        }

        debug!(%item, "Add failed, searching inventory for the item");
        self.policy.record_search(&item);
        let search_arguments = self.policy.search_arguments(&item);
        let search = self.invoke(&find_tool, search_arguments, true).await?;
        routed.unhandled_failure = !search.is_success();
        routed.records.push(search);
        Ok(routed)
    }

    async fn route_search(&mut self, call: &PendingToolCall) -> Result<RoutedCall> {
        let item = self.policy.item_of(&call.arguments);
        let adds_available = self.catalog.contains(&self.policy.config().add_to_cart_tool);

        if let Err(reason) = self.policy.admit_search(item.as_deref(), adds_available) {
            debug!(tool = %call.name, %reason, "Search refused");
            return Ok(RoutedCall::refused(call, ToolError::Blocked(reason)));
        }
        if let Some(item) = &item {
            self.policy.record_search(item);
        }

        let record = self.invoke(&call.name, call.arguments.clone(), false).await?;
        Ok(RoutedCall::single(record))
    }

    fn adopt_order(&mut self, result: &Value) {
        if !self.policy.order_created(result) {
            warn!("Create-order result carries no cart reference");
        }
    }

    /// Invoke through the session, refusing calls that already failed
    async fn invoke(&mut self, name: &str, arguments: Value, fallback: bool) -> Result<ToolCallRecord> {
        let record = if self.policy.is_repeat_failure(name, &arguments) {
            debug!(tool = %name, "Refusing to repeat a failed call");
            let error = ToolError::Blocked("an identical call already failed".to_string());
            ToolCallRecord::failed(name, arguments, &error)
        } else {
            debug!(tool = %name, fallback, "Invoking tool");
            match self.lease.invoke(name, arguments.clone(), self.timeout).await {
                Ok(result) => ToolCallRecord::succeeded(name, arguments, result),
                Err(e) if e.is_fatal() => {
                    return Err(Error::Orchestration(e.to_string()));
                }
                Err(e) => {
                    warn!(tool = %name, error = %e, "Tool call failed");
                    self.policy.record_failure(name, &arguments);
                    ToolCallRecord::failed(name, arguments, &e)
                }
            }
        };

        Ok(if fallback { record.as_fallback() } else { record })
    }
}
