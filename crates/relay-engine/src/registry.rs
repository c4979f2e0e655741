use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use relay_core::tools::ToolDefinition;

use crate::context::Tool;

/// Which of the parent's tools a sub-agent type may call.
#[derive(Clone, Debug)]
pub enum ToolFilter {
    InheritAll,
    Explicit(HashSet<String>),
}

impl ToolFilter {
    fn allows(&self, name: &str) -> bool {
        match self {
            Self::InheritAll => true,
            Self::Explicit(names) => names.contains(name),
        }
    }
}

/// Tools callable in a run, keyed by name.
#[derive(Clone, Default)]
pub struct ToolRegistry {
    tools: BTreeMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Later registrations replace earlier ones of the same name.
    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        let _ = self.tools.insert(tool.name().to_string(), tool);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    pub fn names(&self) -> Vec<String> {
        self.tools.keys().cloned().collect()
    }

    /// Advertised shape of every tool, in name order.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools
            .values()
            .map(|tool| ToolDefinition {
                name: tool.name().to_string(),
                description: tool.description().to_string(),
                execution_mode: tool.execution_mode(),
                parameters_schema: tool.parameters_schema(),
            })
            .collect()
    }

    /// The subset a sub-agent gets to call.
    pub fn clone_for_subagent(&self, filter: &ToolFilter) -> Self {
        let tools = self
            .tools
            .iter()
            .filter(|(name, _)| filter.allows(name))
            .map(|(name, tool)| (name.clone(), Arc::clone(tool)))
            .collect();
        Self { tools }
    }
}
