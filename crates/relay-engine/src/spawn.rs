use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, instrument, warn};

use relay_core::events::RuntimeEvent;
use relay_core::ids::{AgentId, RunId};
use relay_core::spawn::{SpawnRequest, SpawnResult};

use crate::context::RunContext;
use crate::dispatcher::emit;
use crate::error::EngineError;

/// What a sub-agent invocation gets to work with.
pub struct SubagentContext {
    pub parent: Arc<RunContext>,
    pub parent_agent_id: AgentId,
    pub agent_id: AgentId,
    /// Child of the parent run's token.
    pub cancel: CancellationToken,
}

/// Runs one sub-agent to completion.
#[async_trait]
pub trait SubagentInvoker: Send + Sync {
    async fn invoke(
        &self,
        request: SpawnRequest,
        ctx: SubagentContext,
    ) -> Result<SpawnResult, EngineError>;
}

/// Children of one batch whose results have not been collected.
///
/// Dropping the batch early (its caller timed out or was cancelled)
/// cancels whatever is still outstanding and clears it from the
/// dispatcher's active set.
struct Outstanding<'a> {
    dispatcher: &'a SpawnDispatcher,
    run_id: RunId,
    parent_agent_id: AgentId,
    children: Vec<AgentId>,
}

impl Outstanding<'_> {
    fn settle(&mut self, child: &AgentId, is_error: bool) {
        self.children.retain(|id| id != child);
        let _ = self.dispatcher.active.remove(child);
        self.complete(child.clone(), is_error);
    }

    fn complete(&self, child_agent_id: AgentId, is_error: bool) {
        emit(
            &self.dispatcher.event_tx,
            RuntimeEvent::SubagentComplete {
                run_id: self.run_id.clone(),
                parent_agent_id: self.parent_agent_id.clone(),
                child_agent_id,
                is_error,
            },
        );
    }
}

impl Drop for Outstanding<'_> {
    fn drop(&mut self) {
        for child in std::mem::take(&mut self.children) {
            if let Some((_, token)) = self.dispatcher.active.remove(&child) {
                token.cancel();
            }
            warn!(child = %child, "sub-agent abandoned, cancelling");
            self.complete(child, true);
        }
    }
}

/// Fans a batch of spawn requests out to concurrent sub-agents.
pub struct SpawnDispatcher {
    invoker: Arc<dyn SubagentInvoker>,
    subagent_timeout: Duration,
    event_tx: broadcast::Sender<RuntimeEvent>,
    active: DashMap<AgentId, CancellationToken>,
}

impl SpawnDispatcher {
    pub fn new(
        invoker: Arc<dyn SubagentInvoker>,
        subagent_timeout: Duration,
        event_tx: broadcast::Sender<RuntimeEvent>,
    ) -> Self {
        Self {
            invoker,
            subagent_timeout,
            event_tx,
            active: DashMap::new(),
        }
    }

    /// Start every request concurrently and wait for all of them.
    ///
    /// The returned results line up with `requests` by index. A failure,
    /// timeout or cancellation of one sub-agent becomes an error result in
    /// its slot and never affects its siblings. Dropping the returned future
    /// cancels every child still running.
    #[instrument(skip_all, fields(run_id = %run.run_id, parent = %parent_agent_id, count = requests.len()))]
    pub async fn spawn_all(
        &self,
        requests: Vec<SpawnRequest>,
        run: &Arc<RunContext>,
        parent_agent_id: &AgentId,
    ) -> Vec<SpawnResult> {
        let mut handles = Vec::with_capacity(requests.len());
        let mut outstanding = Outstanding {
            dispatcher: self,
            run_id: run.run_id.clone(),
            parent_agent_id: parent_agent_id.clone(),
            children: Vec::with_capacity(requests.len()),
        };

        for request in requests {
            let child_id = AgentId::new();
            let cancel = run.cancel.child_token();
            let _ = self.active.insert(child_id.clone(), cancel.clone());
            outstanding.children.push(child_id.clone());

            emit(
                &self.event_tx,
                RuntimeEvent::SubagentSpawned {
                    run_id: run.run_id.clone(),
                    parent_agent_id: parent_agent_id.clone(),
                    child_agent_id: child_id.clone(),
                    agent_type: request.agent_type.clone(),
                },
            );
            debug!(agent_type = %request.agent_type, child = %child_id, "spawning sub-agent");

            let invoker = Arc::clone(&self.invoker);
            let timeout = self.subagent_timeout;
            let ctx = SubagentContext {
                parent: Arc::clone(run),
                parent_agent_id: parent_agent_id.clone(),
                agent_id: child_id.clone(),
                cancel: cancel.clone(),
            };

            let handle = tokio::spawn(async move {
                let agent_type = request.agent_type.clone();
                tokio::select! {
                    () = cancel.cancelled() => SpawnResult::error("Sub-agent cancelled"),
                    outcome = tokio::time::timeout(timeout, invoker.invoke(request, ctx)) => {
                        match outcome {
                            Ok(Ok(result)) => result,
                            Ok(Err(e)) => {
                                warn!(agent_type = %agent_type, error = %e, "sub-agent failed");
                                SpawnResult::error(e.to_string())
                            }
                            Err(_) => {
                                warn!(
                                    agent_type = %agent_type,
                                    timeout_secs = timeout.as_secs(),
                                    "sub-agent timed out"
                                );
                                SpawnResult::error(format!(
                                    "Sub-agent timed out after {}s",
                                    timeout.as_secs()
                                ))
                            }
                        }
                    }
                }
            });
            handles.push((child_id, handle));
        }

        let mut results = Vec::with_capacity(handles.len());
        for (child_id, handle) in handles {
            let result = match handle.await {
                Ok(result) => result,
                Err(join_err) => {
                    error!(child = %child_id, error = %join_err, "sub-agent task failed");
                    SpawnResult::error("Sub-agent crashed")
                }
            };
            outstanding.settle(&child_id, result.is_error());
            results.push(result);
        }
        results
    }

    /// Cancel a running sub-agent. Returns false if it is not active.
    pub fn cancel(&self, agent_id: &AgentId) -> bool {
        match self.active.get(agent_id) {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    pub fn active_count(&self) -> usize {
        self.active.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_core::messages::Message;
    use serde_json::json;

    type InvokeFn = dyn Fn(SpawnRequest) -> Result<SpawnResult, EngineError> + Send + Sync;

    /// Sleeps for `params.delay_ms`, then answers via the closure.
    struct FnInvoker(Box<InvokeFn>);

    #[async_trait]
    impl SubagentInvoker for FnInvoker {
        async fn invoke(
            &self,
            request: SpawnRequest,
            _ctx: SubagentContext,
        ) -> Result<SpawnResult, EngineError> {
            let delay = request.params["delay_ms"].as_u64().unwrap_or(0);
            tokio::time::sleep(Duration::from_millis(delay)).await;
            (self.0)(request)
        }
    }

    fn dispatcher(
        f: impl Fn(SpawnRequest) -> Result<SpawnResult, EngineError> + Send + Sync + 'static,
    ) -> (SpawnDispatcher, broadcast::Receiver<RuntimeEvent>) {
        let (tx, rx) = broadcast::channel(64);
        let d = SpawnDispatcher::new(Arc::new(FnInvoker(Box::new(f))), Duration::from_secs(10), tx);
        (d, rx)
    }

    fn request(prompt: &str, delay_ms: u64) -> SpawnRequest {
        SpawnRequest::new("file-lister", prompt).with_params(json!({"delay_ms": delay_ms}))
    }

    fn echo(req: SpawnRequest) -> Result<SpawnResult, EngineError> {
        if req.prompt == "fail" {
            return Err(EngineError::Internal("lister exploded".into()));
        }
        Ok(SpawnResult::LastMessage {
            value: vec![Message::assistant_text(req.prompt)],
        })
    }

    #[tokio::test]
    async fn results_align_with_requests() {
        let (d, _rx) = dispatcher(echo);
        let run = Arc::new(RunContext::on_disk(std::env::temp_dir()));
        let results = d
            .spawn_all(vec![request("a", 30), request("b", 0)], &run, &AgentId::new())
            .await;

        assert_eq!(results.len(), 2);
        assert_eq!(
            results[0],
            SpawnResult::LastMessage {
                value: vec![Message::assistant_text("a")]
            }
        );
        assert_eq!(
            results[1],
            SpawnResult::LastMessage {
                value: vec![Message::assistant_text("b")]
            }
        );
    }

    #[tokio::test]
    async fn one_failure_does_not_affect_siblings() {
        let (d, _rx) = dispatcher(echo);
        let run = Arc::new(RunContext::on_disk(std::env::temp_dir()));
        let results = d
            .spawn_all(vec![request("fail", 0), request("ok", 0)], &run, &AgentId::new())
            .await;

        assert_eq!(results[0], SpawnResult::error("lister exploded"));
        assert!(!results[1].is_error());
    }

    #[tokio::test(start_paused = true)]
    async fn sub_agents_run_concurrently() {
        let (d, _rx) = dispatcher(echo);
        let run = Arc::new(RunContext::on_disk(std::env::temp_dir()));
        let started = tokio::time::Instant::now();
        let _ = d
            .spawn_all(vec![request("a", 100), request("b", 100)], &run, &AgentId::new())
            .await;
        assert!(started.elapsed() < Duration::from_millis(150));
    }

    #[tokio::test(start_paused = true)]
    async fn slow_sub_agent_times_out() {
        let (d, _rx) = dispatcher(echo);
        let run = Arc::new(RunContext::on_disk(std::env::temp_dir()));
        let results = d
            .spawn_all(vec![request("slow", 60_000), request("fast", 0)], &run, &AgentId::new())
            .await;
        assert_eq!(results[0], SpawnResult::error("Sub-agent timed out after 10s"));
        assert!(!results[1].is_error());
    }

    #[tokio::test(start_paused = true)]
    async fn parent_cancellation_reaches_children() {
        let (d, _rx) = dispatcher(echo);
        let run = Arc::new(RunContext::on_disk(std::env::temp_dir()));
        let cancel = run.cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            cancel.cancel();
        });
        let results = d
            .spawn_all(vec![request("a", 5_000)], &run, &AgentId::new())
            .await;
        assert_eq!(results[0], SpawnResult::error("Sub-agent cancelled"));
        assert_eq!(d.active_count(), 0);
    }

    /// Keeps each child's cancellation token, then never finishes.
    struct Stuck(Arc<parking_lot::Mutex<Vec<CancellationToken>>>);

    #[async_trait]
    impl SubagentInvoker for Stuck {
        async fn invoke(
            &self,
            _request: SpawnRequest,
            ctx: SubagentContext,
        ) -> Result<SpawnResult, EngineError> {
            self.0.lock().push(ctx.cancel.clone());
            std::future::pending().await
        }
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_the_batch_cancels_outstanding_children() {
        let tokens = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let (tx, mut rx) = broadcast::channel(16);
        let d = SpawnDispatcher::new(
            Arc::new(Stuck(Arc::clone(&tokens))),
            Duration::from_secs(600),
            tx,
        );
        let run = Arc::new(RunContext::on_disk(std::env::temp_dir()));

        let parent = AgentId::new();
        let batch = d.spawn_all(vec![request("a", 0), request("b", 0)], &run, &parent);
        assert!(tokio::time::timeout(Duration::from_secs(1), batch).await.is_err());

        assert_eq!(d.active_count(), 0);
        let tokens = tokens.lock();
        assert_eq!(tokens.len(), 2);
        assert!(tokens.iter().all(CancellationToken::is_cancelled));

        let mut completed = 0;
        while let Ok(event) = rx.try_recv() {
            if let RuntimeEvent::SubagentComplete { is_error, .. } = event {
                assert!(is_error);
                completed += 1;
            }
        }
        assert_eq!(completed, 2);
    }

    #[tokio::test]
    async fn emits_spawned_and_complete_events() {
        let (d, mut rx) = dispatcher(echo);
        let run = Arc::new(RunContext::on_disk(std::env::temp_dir()));
        let _ = d
            .spawn_all(vec![request("fail", 0)], &run, &AgentId::new())
            .await;

        match rx.recv().await.unwrap() {
            RuntimeEvent::SubagentSpawned { agent_type, .. } => assert_eq!(agent_type, "file-lister"),
            other => panic!("expected subagent_spawned, got {other:?}"),
        }
        match rx.recv().await.unwrap() {
            RuntimeEvent::SubagentComplete { is_error, .. } => assert!(is_error),
            other => panic!("expected subagent_complete, got {other:?}"),
        }
    }
}
