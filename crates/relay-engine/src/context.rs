use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use relay_core::ids::{AgentId, RunId, ToolCallId};
use relay_core::tools::{ExecutionMode, FileReader, ToolError, ToolResult};

use crate::ordering::OrderingToken;
use crate::proposed::ProposedContentStore;
use crate::spawn::SpawnDispatcher;

/// State owned by one logical run.
pub struct RunContext {
    pub run_id: RunId,
    pub working_directory: PathBuf,
    pub files: Arc<dyn FileReader>,
    /// Shared with sub-agent runs; entries are keyed by run id.
    pub proposed: Arc<ProposedContentStore>,
    pub spawner: Option<Arc<SpawnDispatcher>>,
    pub cancel: CancellationToken,
    /// 0 for a root run, parent depth + 1 for a sub-agent run.
    pub depth: u32,
}

impl RunContext {
    pub fn new(working_directory: PathBuf, files: Arc<dyn FileReader>) -> Self {
        Self {
            run_id: RunId::new(),
            working_directory,
            files,
            proposed: Arc::new(ProposedContentStore::new()),
            spawner: None,
            cancel: CancellationToken::new(),
            depth: 0,
        }
    }

    /// Run context backed by the local filesystem under `root`.
    pub fn on_disk(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let files = Arc::new(DiskFileReader::new(root.clone()));
        Self::new(root, files)
    }

    pub fn with_spawner(mut self, spawner: Arc<SpawnDispatcher>) -> Self {
        self.spawner = Some(spawner);
        self
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Run for a sub-agent: new run id, same store, file access and
    /// spawner, one level deeper.
    pub fn child(&self, cancel: CancellationToken) -> Self {
        Self {
            run_id: RunId::new(),
            working_directory: self.working_directory.clone(),
            files: Arc::clone(&self.files),
            proposed: Arc::clone(&self.proposed),
            spawner: self.spawner.clone(),
            cancel,
            depth: self.depth + 1,
        }
    }

    /// Drop every proposal of this run. Called by the run owner at run end.
    pub fn discard_proposals(&self) {
        self.proposed.discard_run(&self.run_id);
    }
}

/// Context available to tools during execution.
pub struct ToolContext {
    pub run: Arc<RunContext>,
    pub agent_id: AgentId,
    pub tool_call_id: ToolCallId,
    /// Resolves when the previous call of this turn has finished.
    pub ordering: OrderingToken,
}

/// Trait implemented by each tool handler.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    fn parameters_schema(&self) -> serde_json::Value;

    fn execution_mode(&self) -> ExecutionMode {
        ExecutionMode::Sequential
    }

    async fn execute(
        &self,
        input: serde_json::Value,
        ctx: &ToolContext,
    ) -> Result<ToolResult, ToolError>;

    /// Overrides the dispatcher's default timeout for this tool.
    fn timeout(&self) -> Option<Duration> {
        None
    }
}

/// Reads files relative to a root directory.
pub struct DiskFileReader {
    root: PathBuf,
}

impl DiskFileReader {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    pub fn resolve(&self, path: &str) -> PathBuf {
        resolve_path(path, &self.root)
    }
}

#[async_trait]
impl FileReader for DiskFileReader {
    async fn read_optional(&self, path: &str) -> Result<Option<String>, ToolError> {
        let full = self.resolve(path);
        match tokio::fs::read_to_string(&full).await {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(ToolError::Io {
                path: full.display().to_string(),
                source,
            }),
        }
    }
}

pub(crate) fn resolve_path(file_path: &str, working_dir: &Path) -> PathBuf {
    let path = Path::new(file_path);
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        working_dir.join(path)
    }
}
