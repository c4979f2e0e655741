//! Drives one agent program through a turn.
//!
//! The program is a resumable state machine: each `resume` yields one
//! [`AgentStep`]. Tool calls go through a [`ToolDispatcher`] and the
//! program is resumed with the result; text steps are forwarded to the
//! event stream; a turn-end step stops the loop.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tracing::{debug, instrument, warn};

use relay_core::events::RuntimeEvent;
use relay_core::ids::AgentId;
use relay_core::steps::{AgentStep, Resume};
use relay_core::tools::ToolCall;

use crate::context::RunContext;
use crate::dispatcher::{emit, PendingToolCall, ToolDispatcher};
use crate::error::EngineError;
use crate::registry::ToolRegistry;
use crate::settings::RuntimeSettings;

/// Agent logic, written as an explicit resumable state machine.
///
/// `resume` is called with [`Resume::Start`] first, then with the result of
/// every tool call the program yields, or [`Resume::Continue`] after a
/// text step. An `Err` is a defect in the program and ends the turn.
pub trait AgentProgram: Send {
    fn resume(&mut self, input: Resume) -> anyhow::Result<AgentStep>;
}

/// One tool call as seen by the scheduler.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ToolCallRecord {
    pub tool_name: String,
    pub is_error: bool,
}

/// What happened during a turn.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TurnReport {
    pub texts: Vec<String>,
    pub tool_calls: Vec<ToolCallRecord>,
    pub steps: u32,
}

enum SchedulerState {
    Idle(Resume),
    AwaitingToolResult(PendingToolCall),
    Ended,
}

pub struct StepScheduler {
    tools: Arc<ToolRegistry>,
    run: Arc<RunContext>,
    agent_id: AgentId,
    event_tx: broadcast::Sender<RuntimeEvent>,
    tool_timeout: Duration,
    max_steps: u32,
}

impl StepScheduler {
    pub fn new(
        tools: Arc<ToolRegistry>,
        run: Arc<RunContext>,
        event_tx: broadcast::Sender<RuntimeEvent>,
        settings: &RuntimeSettings,
    ) -> Self {
        Self {
            tools,
            run,
            agent_id: AgentId::new(),
            event_tx,
            tool_timeout: settings.tool_timeout(),
            max_steps: settings.max_steps_per_turn,
        }
    }

    pub fn with_agent_id(mut self, agent_id: AgentId) -> Self {
        self.agent_id = agent_id;
        self
    }

    pub fn agent_id(&self) -> &AgentId {
        &self.agent_id
    }

    pub fn run(&self) -> &Arc<RunContext> {
        &self.run
    }

    /// Drive `program` until it ends its turn.
    #[instrument(skip_all, fields(run_id = %self.run.run_id, agent_id = %self.agent_id))]
    pub async fn run_turn(
        &self,
        program: &mut dyn AgentProgram,
    ) -> Result<TurnReport, EngineError> {
        let mut dispatcher = ToolDispatcher::new(
            Arc::clone(&self.tools),
            Arc::clone(&self.run),
            self.agent_id.clone(),
            self.event_tx.clone(),
            self.tool_timeout,
        );
        let mut report = TurnReport::default();
        let mut state = SchedulerState::Idle(Resume::Start);

        emit(
            &self.event_tx,
            RuntimeEvent::TurnStart {
                run_id: self.run.run_id.clone(),
                agent_id: self.agent_id.clone(),
            },
        );

        loop {
            state = match state {
                SchedulerState::Idle(input) => {
                    if self.run.cancel.is_cancelled() {
                        return Err(EngineError::Aborted);
                    }
                    if report.steps >= self.max_steps {
                        warn!(max_steps = self.max_steps, "turn exceeded max steps");
                        return Err(EngineError::MaxStepsExceeded(self.max_steps));
                    }

                    let step = program.resume(input).map_err(EngineError::Program)?;
                    report.steps += 1;
                    debug!(step = report.steps, kind = step.kind(), "program yielded");

                    match step {
                        AgentStep::ToolCall { tool_name, input } => {
                            let pending = dispatcher.submit(ToolCall::new(tool_name, input));
                            SchedulerState::AwaitingToolResult(pending)
                        }
                        AgentStep::Text { text } => {
                            emit(
                                &self.event_tx,
                                RuntimeEvent::StepText {
                                    run_id: self.run.run_id.clone(),
                                    agent_id: self.agent_id.clone(),
                                    text: text.clone(),
                                },
                            );
                            report.texts.push(text);
                            SchedulerState::Idle(Resume::Continue)
                        }
                        AgentStep::TurnEnd => SchedulerState::Ended,
                    }
                }
                SchedulerState::AwaitingToolResult(pending) => {
                    let tool_name = pending.tool_name.clone();
                    let result = pending.result().await;
                    report.tool_calls.push(ToolCallRecord {
                        tool_name,
                        is_error: result.is_error(),
                    });
                    SchedulerState::Idle(Resume::ToolResult(result))
                }
                SchedulerState::Ended => break,
            };
        }

        emit(
            &self.event_tx,
            RuntimeEvent::TurnEnd {
                run_id: self.run.run_id.clone(),
                agent_id: self.agent_id.clone(),
                steps: report.steps,
            },
        );
        Ok(report)
    }
}
