use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::broadcast;
use tracing::{debug, instrument};

use relay_core::events::RuntimeEvent;
use relay_core::messages::Message;
use relay_core::spawn::{SpawnRequest, SpawnResult};

use crate::error::EngineError;
use crate::registry::{ToolFilter, ToolRegistry};
use crate::scheduler::{AgentProgram, StepScheduler};
use crate::settings::RuntimeSettings;
use crate::spawn::{SubagentContext, SubagentInvoker};

/// Builds a fresh program for one spawn request.
pub type ProgramFactory = Arc<dyn Fn(&SpawnRequest) -> Box<dyn AgentProgram> + Send + Sync>;

struct AgentDefinition {
    factory: ProgramFactory,
    tools: Arc<ToolRegistry>,
}

/// Runs sub-agents as in-process programs on a nested scheduler.
///
/// The sub-agent's output is a `lastMessage` transcript: the spawn prompt
/// as a user message followed by one assistant message per text step.
pub struct ProgramInvoker {
    agents: HashMap<String, AgentDefinition>,
    tools: Arc<ToolRegistry>,
    settings: RuntimeSettings,
    event_tx: broadcast::Sender<RuntimeEvent>,
}

impl ProgramInvoker {
    pub fn new(
        tools: Arc<ToolRegistry>,
        settings: RuntimeSettings,
        event_tx: broadcast::Sender<RuntimeEvent>,
    ) -> Self {
        Self {
            agents: HashMap::new(),
            tools,
            settings,
            event_tx,
        }
    }

    /// Register an agent type that sees every tool.
    pub fn register(&mut self, agent_type: impl Into<String>, factory: ProgramFactory) {
        self.register_with_tools(agent_type, factory, &ToolFilter::InheritAll);
    }

    /// Register an agent type restricted to a subset of tools.
    pub fn register_with_tools(
        &mut self,
        agent_type: impl Into<String>,
        factory: ProgramFactory,
        filter: &ToolFilter,
    ) {
        let tools = Arc::new(self.tools.clone_for_subagent(filter));
        let _ = self
            .agents
            .insert(agent_type.into(), AgentDefinition { factory, tools });
    }

    pub fn agent_types(&self) -> Vec<String> {
        let mut types: Vec<String> = self.agents.keys().cloned().collect();
        types.sort();
        types
    }
}

#[async_trait]
impl SubagentInvoker for ProgramInvoker {
    #[instrument(skip_all, fields(agent_type = %request.agent_type, agent_id = %ctx.agent_id))]
    async fn invoke(
        &self,
        request: SpawnRequest,
        ctx: SubagentContext,
    ) -> Result<SpawnResult, EngineError> {
        let definition = self
            .agents
            .get(&request.agent_type)
            .ok_or_else(|| EngineError::UnknownAgent(request.agent_type.clone()))?;

        if ctx.parent.depth >= self.settings.max_spawn_depth {
            return Err(EngineError::SpawnDepthExceeded(self.settings.max_spawn_depth));
        }

        let run = Arc::new(ctx.parent.child(ctx.cancel.clone()));
        let scheduler = StepScheduler::new(
            Arc::clone(&definition.tools),
            Arc::clone(&run),
            self.event_tx.clone(),
            &self.settings,
        )
        .with_agent_id(ctx.agent_id.clone());

        let mut program = (definition.factory)(&request);
        let outcome = scheduler.run_turn(program.as_mut()).await;
        run.discard_proposals();
        let report = outcome?;
        debug!(steps = report.steps, texts = report.texts.len(), "sub-agent finished");

        let mut transcript = Vec::with_capacity(report.texts.len() + 1);
        transcript.push(Message::user_text(request.prompt));
        transcript.extend(report.texts.into_iter().map(Message::assistant_text));
        Ok(SpawnResult::LastMessage { value: transcript })
    }
}
