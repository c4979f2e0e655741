//! Tool call dispatch for one turn.
//!
//! Calls are submitted in program order. Each one runs on its own task and
//! is linked to its predecessor through an [`OrderingToken`]: sequential
//! tools wait for the token before starting, concurrent tools receive it
//! and await it before committing. Either way a call's completion signal
//! fires only after its predecessor's, so calls finish in submission order.

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::FutureExt;
use serde_json::Value;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use relay_core::events::RuntimeEvent;
use relay_core::ids::{AgentId, ToolCallId};
use relay_core::tools::{ExecutionMode, ToolCall, ToolError, ToolResult};

use crate::context::{RunContext, ToolContext};
use crate::ordering::OrderingChain;
use crate::registry::ToolRegistry;

const PREVIEW_CHARS: usize = 200;

/// Send an event, logging when nobody is listening.
pub(crate) fn emit(tx: &broadcast::Sender<RuntimeEvent>, event: RuntimeEvent) {
    let event_type = event.event_type();
    if tx.send(event).is_err() {
        warn!(event_type, "no event receivers, event dropped");
    }
}

/// A submitted call whose result has not been collected yet.
pub struct PendingToolCall {
    pub id: ToolCallId,
    pub tool_name: String,
    handle: JoinHandle<ToolResult>,
}

impl PendingToolCall {
    /// Wait for the call's result. A crashed task yields an error result.
    pub async fn result(self) -> ToolResult {
        match self.handle.await {
            Ok(result) => result,
            Err(join_err) => {
                error!(tool = %self.tool_name, error = %join_err, "tool task failed");
                ToolResult::error("Tool execution failed")
            }
        }
    }
}

/// Per-turn dispatcher. Owns the turn's ordering chain.
pub struct ToolDispatcher {
    registry: Arc<ToolRegistry>,
    run: Arc<RunContext>,
    agent_id: AgentId,
    event_tx: broadcast::Sender<RuntimeEvent>,
    chain: OrderingChain,
    tool_timeout: Duration,
}

impl ToolDispatcher {
    pub fn new(
        registry: Arc<ToolRegistry>,
        run: Arc<RunContext>,
        agent_id: AgentId,
        event_tx: broadcast::Sender<RuntimeEvent>,
        tool_timeout: Duration,
    ) -> Self {
        Self {
            registry,
            run,
            agent_id,
            event_tx,
            chain: OrderingChain::new(),
            tool_timeout,
        }
    }

    /// Start a call and return a handle to its eventual result.
    pub fn submit(&mut self, call: ToolCall) -> PendingToolCall {
        let (previous, signal) = self.chain.next_link();
        let tool = self.registry.get(&call.tool_name);
        let ctx = ToolContext {
            run: Arc::clone(&self.run),
            agent_id: self.agent_id.clone(),
            tool_call_id: call.id.clone(),
            ordering: previous.clone(),
        };
        let tx = self.event_tx.clone();
        let default_timeout = self.tool_timeout;
        let id = call.id.clone();
        let tool_name = call.tool_name.clone();

        let handle = tokio::spawn(async move {
            emit(
                &tx,
                RuntimeEvent::ToolStart {
                    run_id: ctx.run.run_id.clone(),
                    agent_id: ctx.agent_id.clone(),
                    tool_call_id: call.id.clone(),
                    tool_name: call.tool_name.clone(),
                },
            );

            let start = Instant::now();
            let result = match tool {
                None => {
                    warn!(tool = %call.tool_name, "unknown tool");
                    ToolResult::error(format!("Unknown tool: {}", call.tool_name))
                }
                Some(tool) => {
                    if tool.execution_mode() == ExecutionMode::Sequential {
                        previous.finished().await;
                    }
                    debug!(tool = %call.tool_name, "executing tool");
                    let timeout = tool.timeout().unwrap_or(default_timeout);
                    run_guarded(&call, tool.execute(call.input.clone(), &ctx), &ctx, timeout)
                        .await
                }
            };
            let duration = start.elapsed();

            previous.finished().await;

            emit(
                &tx,
                RuntimeEvent::ToolEnd {
                    run_id: ctx.run.run_id.clone(),
                    agent_id: ctx.agent_id.clone(),
                    tool_call_id: call.id.clone(),
                    is_error: result.is_error(),
                    result_preview: result.preview(PREVIEW_CHARS),
                    duration_ms: duration.as_millis() as u64,
                },
            );
            signal.complete();
            result
        });

        PendingToolCall {
            id,
            tool_name,
            handle,
        }
    }

    /// Submit a call and wait for its result.
    pub async fn dispatch(&mut self, tool_name: &str, input: Value) -> ToolResult {
        self.submit(ToolCall::new(tool_name, input)).result().await
    }
}

/// Run a handler future under its timeout, the run's cancellation token
/// and a panic guard. Every failure becomes an error result.
async fn run_guarded<F>(
    call: &ToolCall,
    fut: F,
    ctx: &ToolContext,
    timeout: Duration,
) -> ToolResult
where
    F: std::future::Future<Output = Result<ToolResult, ToolError>>,
{
    let guarded = tokio::time::timeout(timeout, std::panic::AssertUnwindSafe(fut).catch_unwind());
    let outcome = tokio::select! {
        () = ctx.run.cancel.cancelled() => {
            debug!(tool = %call.tool_name, "tool cancelled");
            Ok(Ok(Err(ToolError::Cancelled)))
        }
        outcome = guarded => outcome,
    };

    let failure = match outcome {
        Ok(Ok(Ok(result))) => return result,
        Ok(Ok(Err(e))) => {
            debug!(tool = %call.tool_name, error = %e, "tool returned error");
            e.to_string()
        }
        Ok(Err(panic)) => {
            let msg = panic_message(&panic);
            error!(tool = %call.tool_name, panic = %msg, "tool panicked during execution");
            "Internal error: tool crashed".to_string()
        }
        Err(_) => {
            warn!(
                tool = %call.tool_name,
                timeout_secs = timeout.as_secs(),
                "tool timed out"
            );
            ToolError::Timeout(timeout).to_string()
        }
    };
    ToolResult::error(failure)
}

pub(crate) fn panic_message(panic: &Box<dyn std::any::Any + Send>) -> String {
    panic
        .downcast_ref::<String>()
        .map(|s| s.as_str())
        .or_else(|| panic.downcast_ref::<&str>().copied())
        .unwrap_or("unknown panic")
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use serde_json::json;

    use crate::context::Tool;

    /// Sleeps for `input.delay_ms`, then appends `input.tag` to a shared log.
    struct LogTool {
        name: &'static str,
        mode: ExecutionMode,
        log: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl Tool for LogTool {
        fn name(&self) -> &str {
            self.name
        }
        fn description(&self) -> &str {
            "appends to a log"
        }
        fn parameters_schema(&self) -> Value {
            json!({"type": "object"})
        }
        fn execution_mode(&self) -> ExecutionMode {
            self.mode
        }
        async fn execute(&self, input: Value, ctx: &ToolContext) -> Result<ToolResult, ToolError> {
            let delay = input["delay_ms"].as_u64().unwrap_or(0);
            let tag = input["tag"].as_str().unwrap_or("?").to_string();
            tokio::time::sleep(Duration::from_millis(delay)).await;
            if self.mode == ExecutionMode::Concurrent {
                ctx.ordering.finished().await;
            }
            self.log.lock().push(tag.clone());
            Ok(ToolResult::text(tag))
        }
    }

    struct FailTool;

    #[async_trait]
    impl Tool for FailTool {
        fn name(&self) -> &str {
            "fail"
        }
        fn description(&self) -> &str {
            "always fails"
        }
        fn parameters_schema(&self) -> Value {
            json!({"type": "object"})
        }
        async fn execute(&self, _input: Value, _ctx: &ToolContext) -> Result<ToolResult, ToolError> {
            Err(ToolError::ExecutionFailed("disk on fire".into()))
        }
    }

    struct PanicTool;

    #[async_trait]
    impl Tool for PanicTool {
        fn name(&self) -> &str {
            "panic"
        }
        fn description(&self) -> &str {
            "panics"
        }
        fn parameters_schema(&self) -> Value {
            json!({"type": "object"})
        }
        async fn execute(&self, _input: Value, _ctx: &ToolContext) -> Result<ToolResult, ToolError> {
            panic!("handler bug");
        }
    }

    struct SlowTool;

    #[async_trait]
    impl Tool for SlowTool {
        fn name(&self) -> &str {
            "slow"
        }
        fn description(&self) -> &str {
            "never finishes in time"
        }
        fn parameters_schema(&self) -> Value {
            json!({"type": "object"})
        }
        async fn execute(&self, _input: Value, _ctx: &ToolContext) -> Result<ToolResult, ToolError> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(ToolResult::text("late"))
        }
    }

    /// Same hour-long sleep as `SlowTool`, with a timeout that allows it.
    struct PatientTool;

    #[async_trait]
    impl Tool for PatientTool {
        fn name(&self) -> &str {
            "patient"
        }
        fn description(&self) -> &str {
            "finishes within its own timeout"
        }
        fn parameters_schema(&self) -> Value {
            json!({"type": "object"})
        }
        fn timeout(&self) -> Option<Duration> {
            Some(Duration::from_secs(7200))
        }
        async fn execute(&self, _input: Value, _ctx: &ToolContext) -> Result<ToolResult, ToolError> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(ToolResult::text("late"))
        }
    }

    fn setup(log: &Arc<Mutex<Vec<String>>>) -> (ToolDispatcher, broadcast::Receiver<RuntimeEvent>) {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(LogTool {
            name: "seq",
            mode: ExecutionMode::Sequential,
            log: Arc::clone(log),
        }));
        registry.register(Arc::new(LogTool {
            name: "conc",
            mode: ExecutionMode::Concurrent,
            log: Arc::clone(log),
        }));
        registry.register(Arc::new(FailTool));
        registry.register(Arc::new(PanicTool));
        registry.register(Arc::new(SlowTool));
        registry.register(Arc::new(PatientTool));

        let (tx, rx) = broadcast::channel(64);
        let run = Arc::new(RunContext::on_disk(std::env::temp_dir()));
        let dispatcher = ToolDispatcher::new(
            Arc::new(registry),
            run,
            AgentId::new(),
            tx,
            Duration::from_secs(5),
        );
        (dispatcher, rx)
    }

    #[tokio::test]
    async fn sequential_calls_commit_in_submission_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let (mut d, _rx) = setup(&log);

        let first = d.submit(ToolCall::new("seq", json!({"tag": "c1", "delay_ms": 80})));
        let second = d.submit(ToolCall::new("seq", json!({"tag": "c2", "delay_ms": 0})));

        assert_eq!(second.result().await, ToolResult::text("c2"));
        assert_eq!(first.result().await, ToolResult::text("c1"));
        assert_eq!(*log.lock(), vec!["c1", "c2"]);
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_calls_start_early_but_commit_in_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let (mut d, _rx) = setup(&log);

        let started = tokio::time::Instant::now();
        let first = d.submit(ToolCall::new("conc", json!({"tag": "c1", "delay_ms": 100})));
        let second = d.submit(ToolCall::new("conc", json!({"tag": "c2", "delay_ms": 100})));
        let _ = first.result().await;
        let _ = second.result().await;

        assert_eq!(*log.lock(), vec!["c1", "c2"]);
        // Both slept in parallel.
        assert!(started.elapsed() < Duration::from_millis(150));
    }

    #[tokio::test]
    async fn failed_call_releases_the_chain() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let (mut d, _rx) = setup(&log);

        let first = d.submit(ToolCall::new("fail", json!({})));
        let second = d.submit(ToolCall::new("seq", json!({"tag": "after"})));

        let err = first.result().await;
        assert_eq!(err, ToolResult::error("execution failed: disk on fire"));
        assert_eq!(second.result().await, ToolResult::text("after"));
        assert_eq!(*log.lock(), vec!["after"]);
    }

    #[tokio::test]
    async fn unknown_tool_is_an_error_result() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let (mut d, _rx) = setup(&log);
        let result = d.dispatch("nope", json!({})).await;
        assert_eq!(result, ToolResult::error("Unknown tool: nope"));
    }

    #[tokio::test]
    async fn panicking_tool_is_contained() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let (mut d, _rx) = setup(&log);
        let first = d.submit(ToolCall::new("panic", json!({})));
        let second = d.submit(ToolCall::new("seq", json!({"tag": "ok"})));
        assert_eq!(first.result().await, ToolResult::error("Internal error: tool crashed"));
        assert_eq!(second.result().await, ToolResult::text("ok"));
    }

    #[tokio::test(start_paused = true)]
    async fn slow_tool_times_out() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let (mut d, _rx) = setup(&log);
        let result = d.dispatch("slow", json!({})).await;
        assert_eq!(result, ToolResult::error("Tool timed out after 5s"));
    }

    #[tokio::test(start_paused = true)]
    async fn tool_timeout_override_beats_the_default() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let (mut d, _rx) = setup(&log);
        assert_eq!(d.dispatch("patient", json!({})).await, ToolResult::text("late"));
    }

    #[tokio::test]
    async fn cancelled_run_aborts_in_flight_call() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let (mut d, _rx) = setup(&log);
        let pending = d.submit(ToolCall::new("slow", json!({})));
        d.run.cancel.cancel();
        assert_eq!(pending.result().await, ToolResult::error("Tool call cancelled"));
    }

    #[tokio::test]
    async fn emits_start_and_end_events() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let (mut d, mut rx) = setup(&log);
        let _ = d.dispatch("seq", json!({"tag": "x"})).await;

        let start = rx.recv().await.unwrap();
        assert_eq!(start.event_type(), "tool_start");
        match rx.recv().await.unwrap() {
            RuntimeEvent::ToolEnd {
                is_error,
                result_preview,
                ..
            } => {
                assert!(!is_error);
                assert_eq!(result_preview, "x");
            }
            other => panic!("expected tool_end, got {other:?}"),
        }
    }
}
