//! Tool registry adapter
//!
//! Tools are opaque capabilities (add to cart, find inventory, ...) served by
//! an external registry. This module defines:
//! - [`ToolDescriptor`] and the name-indexed [`ToolCatalog`]
//! - the [`ToolRegistry`] contract every registry session implements
//! - [`SessionLease`], the release-once handle on a session
//! - [`CapabilityMap`], the explicit agent type → tool lookup table

mod capability;
#[cfg(feature = "mcp")]
pub mod mcp;

pub use capability::CapabilityMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::{Result, ToolError};

/// Tool definition for LLM consumption
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
}

impl ToolDescriptor {
    pub fn new(name: impl Into<String>, description: impl Into<String>, input_schema: Value) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            input_schema,
        }
    }
}

/// Contract of a tool registry session
#[async_trait]
pub trait ToolRegistry: Send + Sync {
    /// Catalog of callable tools
    async fn list_tools(&self) -> Result<Vec<ToolDescriptor>>;

    /// Invoke a tool. Capability failures must come back as `ToolError`.
    async fn invoke(&self, name: &str, arguments: Value) -> std::result::Result<Value, ToolError>;

    /// Tear the session down
    async fn disconnect(&self) -> Result<()>;
}

/// Establishes registry sessions
#[async_trait]
pub trait ToolConnector: Send + Sync {
    async fn connect(&self) -> Result<Arc<dyn ToolRegistry>>;
}

/// Name-indexed catalog, immutable for one run
#[derive(Debug, Clone, Default)]
pub struct ToolCatalog {
    tools: HashMap<String, ToolDescriptor>,
}

impl ToolCatalog {
    pub fn new(descriptors: Vec<ToolDescriptor>) -> Self {
        let mut tools = HashMap::new();
        for descriptor in descriptors {
            if tools.contains_key(&descriptor.name) {
                warn!(tool = %descriptor.name, "Duplicate tool name in catalog, keeping the first");
                continue;
            }
            tools.insert(descriptor.name.clone(), descriptor);
        }
        Self { tools }
    }

    pub fn get(&self, name: &str) -> Option<&ToolDescriptor> {
        self.tools.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Descriptors sorted by name
    pub fn descriptors(&self) -> Vec<ToolDescriptor> {
        let mut list: Vec<_> = self.tools.values().cloned().collect();
        list.sort_by(|a, b| a.name.cmp(&b.name));
        list
    }

    /// Descriptors for the given names, skipping unknown ones
    pub fn select<'a>(&self, names: impl IntoIterator<Item = &'a str>) -> Vec<ToolDescriptor> {
        names.into_iter().filter_map(|n| self.get(n).cloned()).collect()
    }
}

/// Shared handle on a registry session
///
/// Clones share one release flag, so however many owners call
/// [`SessionLease::release`], the registry is disconnected exactly once.
#[derive(Clone)]
pub struct SessionLease {
    registry: Arc<dyn ToolRegistry>,
    released: Arc<AtomicBool>,
}

impl SessionLease {
    pub fn new(registry: Arc<dyn ToolRegistry>) -> Self {
        Self {
            registry,
            released: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::SeqCst)
    }

    /// Invoke through the session, bounded by `timeout`
    pub async fn invoke(
        &self,
        name: &str,
        arguments: Value,
        timeout: Duration,
    ) -> std::result::Result<Value, ToolError> {
        if self.is_released() {
            return Err(ToolError::Unavailable("session already released".to_string()));
        }
        match tokio::time::timeout(timeout, self.registry.invoke(name, arguments)).await {
            Ok(result) => result,
            Err(_) => Err(ToolError::Timeout(timeout.as_secs())),
        }
    }

    pub async fn list_tools(&self) -> Result<Vec<ToolDescriptor>> {
        self.registry.list_tools().await
    }

    /// Disconnect the session if nobody has yet
    pub async fn release(&self) {
        if self.released.swap(true, Ordering::SeqCst) {
            return;
        }
        debug!("Releasing tool registry session");
        if let Err(e) = self.registry.disconnect().await {
            warn!(error = %e, "Tool registry disconnect failed");
        }
    }

    /// Release from a synchronous context (e.g. `Drop`)
    pub fn release_in_background(&self) {
        if self.is_released() {
            return;
        }
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let lease = self.clone();
                handle.spawn(async move { lease.release().await });
            }
            Err(_) => warn!("No runtime available to release tool registry session"),
        }
    }
}

/// Owns a lease for the span of one run
///
/// If the guard is dropped before [`LeaseGuard::release`] (the run future was
/// cancelled or panicked), the session is released in the background.
pub struct LeaseGuard {
    lease: SessionLease,
}

impl LeaseGuard {
    pub fn new(lease: SessionLease) -> Self {
        Self { lease }
    }

    pub fn lease(&self) -> &SessionLease {
        &self.lease
    }

    /// Release now and disarm the guard
    pub async fn release(self) {
        self.lease.release().await;
    }
}

impl Drop for LeaseGuard {
    fn drop(&mut self) {
        if !self.lease.is_released() {
            debug!("Run ended without releasing its session, releasing in background");
            self.lease.release_in_background();
        }
    }
}

impl std::fmt::Debug for SessionLease {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionLease")
            .field("released", &self.is_released())
            .finish()
    }
}
