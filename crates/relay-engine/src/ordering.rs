//! Ordering tokens: completion handles that chain the tool calls of one turn.
//!
//! Every submitted call receives the token of the call submitted before it
//! and a [`CompletionSignal`] that resolves the token handed to the next
//! call. A dropped signal also resolves its token, so a crashed or failed
//! call never stalls the calls queued behind it.

use futures::future::{BoxFuture, FutureExt, Shared};
use tokio::sync::oneshot;

/// Resolves once the previous tool call of the same turn has finished.
#[derive(Clone)]
pub struct OrderingToken {
    inner: Shared<BoxFuture<'static, ()>>,
}

impl OrderingToken {
    /// A token with no predecessor.
    pub fn ready() -> Self {
        Self {
            inner: futures::future::ready(()).boxed().shared(),
        }
    }

    fn after(rx: oneshot::Receiver<()>) -> Self {
        Self {
            inner: async move {
                let _ = rx.await;
            }
            .boxed()
            .shared(),
        }
    }

    /// Wait for the previous call to finish. May be awaited any number of times.
    pub async fn finished(&self) {
        self.inner.clone().await;
    }
}

impl std::fmt::Debug for OrderingToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OrderingToken").finish_non_exhaustive()
    }
}

/// Held by a running call; firing it releases the next call in the chain.
pub struct CompletionSignal {
    tx: Option<oneshot::Sender<()>>,
}

impl CompletionSignal {
    pub fn complete(mut self) {
        self.fire();
    }

    fn fire(&mut self) {
        if let Some(tx) = self.tx.take() {
            let _ = tx.send(());
        }
    }
}

impl Drop for CompletionSignal {
    fn drop(&mut self) {
        self.fire();
    }
}

/// Per-turn chain of ordering tokens.
pub struct OrderingChain {
    last: OrderingToken,
}

impl OrderingChain {
    pub fn new() -> Self {
        Self {
            last: OrderingToken::ready(),
        }
    }

    /// Token for the next call (resolves when the previous call completes)
    /// and the signal that call must fire when it completes.
    pub fn next_link(&mut self) -> (OrderingToken, CompletionSignal) {
        let (tx, rx) = oneshot::channel();
        let previous = std::mem::replace(&mut self.last, OrderingToken::after(rx));
        (previous, CompletionSignal { tx: Some(tx) })
    }
}

impl Default for OrderingChain {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn first_link_is_ready() {
        let mut chain = OrderingChain::new();
        let (token, _signal) = chain.next_link();
        tokio::time::timeout(Duration::from_millis(100), token.finished())
            .await
            .expect("first token should be resolved");
    }

    #[tokio::test(start_paused = true)]
    async fn second_link_waits_for_first_completion() {
        let mut chain = OrderingChain::new();
        let (_t1, s1) = chain.next_link();
        let (t2, _s2) = chain.next_link();

        let pending = tokio::time::timeout(Duration::from_millis(50), t2.finished()).await;
        assert!(pending.is_err(), "second token resolved before first completed");

        s1.complete();
        tokio::time::timeout(Duration::from_millis(50), t2.finished())
            .await
            .expect("second token should resolve after first completes");
    }

    #[tokio::test]
    async fn dropped_signal_releases_next() {
        let mut chain = OrderingChain::new();
        let (_t1, s1) = chain.next_link();
        let (t2, _s2) = chain.next_link();
        drop(s1);
        tokio::time::timeout(Duration::from_millis(100), t2.finished())
            .await
            .expect("dropped signal should release the chain");
    }

    #[tokio::test]
    async fn token_can_be_awaited_twice() {
        let mut chain = OrderingChain::new();
        let (_t1, s1) = chain.next_link();
        let (t2, _s2) = chain.next_link();
        s1.complete();
        t2.finished().await;
        t2.finished().await;
    }
}
