use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::info;

use relay_core::events::RuntimeEvent;
use relay_core::ids::AgentId;
use relay_core::tools::FileReader;

use crate::context::{DiskFileReader, RunContext};
use crate::dispatcher::ToolDispatcher;
use crate::error::EngineError;
use crate::invoker::ProgramInvoker;
use crate::programs::register_builtin_programs;
use crate::registry::ToolRegistry;
use crate::scheduler::{AgentProgram, StepScheduler, TurnReport};
use crate::settings::RuntimeSettings;
use crate::spawn::SpawnDispatcher;
use crate::tools::create_default_registry;

/// Everything needed to drive root runs against one working directory.
pub struct Runtime {
    settings: RuntimeSettings,
    tools: Arc<ToolRegistry>,
    spawner: Arc<SpawnDispatcher>,
    files: Arc<dyn FileReader>,
    working_directory: PathBuf,
    event_tx: broadcast::Sender<RuntimeEvent>,
}

impl Runtime {
    /// Runtime over the local filesystem rooted at `working_directory`.
    pub fn new(settings: RuntimeSettings, working_directory: impl Into<PathBuf>) -> Self {
        let working_directory = working_directory.into();
        let files = Arc::new(DiskFileReader::new(working_directory.clone()));
        Self::with_files(settings, working_directory, files)
    }

    pub fn with_files(
        settings: RuntimeSettings,
        working_directory: PathBuf,
        files: Arc<dyn FileReader>,
    ) -> Self {
        let (event_tx, _) = broadcast::channel(settings.event_buffer_size.max(1));
        let tools = Arc::new(create_default_registry(&settings));

        let mut invoker = ProgramInvoker::new(Arc::clone(&tools), settings.clone(), event_tx.clone());
        register_builtin_programs(&mut invoker);
        let spawner = Arc::new(SpawnDispatcher::new(
            Arc::new(invoker),
            settings.subagent_timeout(),
            event_tx.clone(),
        ));

        Self {
            settings,
            tools,
            spawner,
            files,
            working_directory,
            event_tx,
        }
    }

    pub fn settings(&self) -> &RuntimeSettings {
        &self.settings
    }

    pub fn tools(&self) -> &Arc<ToolRegistry> {
        &self.tools
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RuntimeEvent> {
        self.event_tx.subscribe()
    }

    /// A fresh root run.
    pub fn new_run(&self, cancel: CancellationToken) -> Arc<RunContext> {
        Arc::new(
            RunContext::new(self.working_directory.clone(), Arc::clone(&self.files))
                .with_spawner(Arc::clone(&self.spawner))
                .with_cancel(cancel),
        )
    }

    /// Scheduler for a turn of `run`.
    pub fn scheduler(&self, run: Arc<RunContext>) -> StepScheduler {
        StepScheduler::new(Arc::clone(&self.tools), run, self.event_tx.clone(), &self.settings)
    }

    /// Dispatcher for issuing tool calls in `run` outside a program.
    pub fn dispatcher(&self, run: Arc<RunContext>) -> ToolDispatcher {
        ToolDispatcher::new(
            Arc::clone(&self.tools),
            run,
            AgentId::new(),
            self.event_tx.clone(),
            self.settings.tool_timeout(),
        )
    }

    /// Drive one turn of `program` in a new root run, then discard the
    /// run's proposals.
    pub async fn run_program(
        &self,
        program: &mut dyn AgentProgram,
        cancel: CancellationToken,
    ) -> Result<TurnReport, EngineError> {
        let run = self.new_run(cancel);
        let outcome = self.scheduler(Arc::clone(&run)).run_turn(program).await;
        run.discard_proposals();
        if let Ok(report) = &outcome {
            info!(run_id = %run.run_id, steps = report.steps, "run finished");
        }
        outcome
    }
}
