pub mod list_files;
pub mod propose_write_file;
pub mod read_files;
pub mod spawn_agents;
pub mod suggest_followups;

use std::sync::Arc;

use crate::registry::ToolRegistry;
use crate::settings::RuntimeSettings;

/// Create a ToolRegistry with all built-in tools.
pub fn create_default_registry(settings: &RuntimeSettings) -> ToolRegistry {
    let mut registry = ToolRegistry::new();

    // File operations
    registry.register(Arc::new(read_files::ReadFilesTool));
    registry.register(Arc::new(list_files::ListFilesTool::new(
        settings.file_lister.clone(),
    )));
    registry.register(Arc::new(propose_write_file::ProposeWriteFileTool));

    // Sub-agents
    registry.register(Arc::new(spawn_agents::SpawnAgentsTool::new(
        settings.subagent_timeout(),
    )));

    // User interaction
    registry.register(Arc::new(suggest_followups::SuggestFollowupsTool));

    registry
}

#[cfg(test)]
pub(crate) fn test_ctx(run: crate::context::RunContext) -> crate::context::ToolContext {
    crate::context::ToolContext {
        run: Arc::new(run),
        agent_id: relay_core::ids::AgentId::new(),
        tool_call_id: relay_core::ids::ToolCallId::new(),
        ordering: crate::ordering::OrderingToken::ready(),
    }
}
