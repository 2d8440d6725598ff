//! Agent type → tool lookup table

use std::collections::{BTreeMap, HashMap};

use tracing::debug;

use super::{ToolCatalog, ToolDescriptor};
use crate::task::AgentType;

/// Resolves a task's capability category to the tools that serve it
///
/// Built once per run from the configured table, keeping only tools the
/// registry actually offers.
#[derive(Debug, Clone, Default)]
pub struct CapabilityMap {
    table: BTreeMap<AgentType, Vec<String>>,
}

impl CapabilityMap {
    pub fn build(configured: &HashMap<AgentType, Vec<String>>, catalog: &ToolCatalog) -> Self {
        let mut table = BTreeMap::new();
        for agent_type in AgentType::ALL {
            let names: Vec<String> = configured
                .get(&agent_type)
                .into_iter()
                .flatten()
                .filter(|name| catalog.contains(name))
                .cloned()
                .collect();
            if !names.is_empty() {
                table.insert(agent_type, names);
            }
        }

        for tool in catalog.descriptors() {
            if !table.values().any(|names| names.contains(&tool.name)) {
                debug!(tool = %tool.name, "Tool not assigned to any agent type");
            }
        }

        Self { table }
    }

    /// Tool names for a category (empty when nothing serves it)
    pub fn tools_for(&self, agent_type: AgentType) -> &[String] {
        self.table.get(&agent_type).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn descriptors_for(&self, agent_type: AgentType, catalog: &ToolCatalog) -> Vec<ToolDescriptor> {
        catalog.select(self.tools_for(agent_type).iter().map(String::as_str))
    }

    pub fn is_assignable(&self, agent_type: AgentType) -> bool {
        !self.tools_for(agent_type).is_empty()
    }

    /// Categories with at least one tool, in declaration order
    pub fn available(&self) -> Vec<AgentType> {
        self.table.keys().copied().collect()
    }
}
