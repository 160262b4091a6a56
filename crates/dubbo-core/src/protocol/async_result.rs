//! `AsyncRpcResult`: the protocol-layer container around an in-flight
//! response future, the invocation that produced it, and the
//! attachments a completion callback should see re-installed while it
//! runs.

use crate::error::Result;
use crate::exchange::AsyncResult;
use crate::message::Invocation;
use std::collections::HashMap;
use std::time::Duration;

tokio::task_local! {
    /// The invocation attachments of whichever call is currently
    /// completing on this task. `when_complete_with_context` installs
    /// this before running the callback and lets `task_local`'s own
    /// scoping restore whatever was there before - naturally
    /// re-entrant, since a callback that itself awaits another
    /// `when_complete_with_context` nests correctly.
    pub static RPC_CONTEXT: HashMap<String, String>;
}

/// Whether a caller wants the raw future back (`Future`) or the
/// resolved value/error (`Sync`) once the underlying call completes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvokeMode {
    Sync,
    Future,
}

/// What `recreate()` hands back, depending on `InvokeMode`.
pub enum RpcOutcome {
    Future(AsyncResult),
    Resolved(Result<serde_json::Value>),
}

pub struct AsyncRpcResult {
    inner: AsyncResult,
    invocation: Invocation,
    mode: InvokeMode,
}

impl AsyncRpcResult {
    pub fn new(inner: AsyncResult, invocation: Invocation, mode: InvokeMode) -> Self {
        Self { inner, invocation, mode }
    }

    pub fn invocation(&self) -> &Invocation {
        &self.invocation
    }

    /// Block the awaiting task until the call resolves, then collapse
    /// its terminal `Response` into a typed result.
    pub async fn get(self) -> Result<serde_json::Value> {
        self.inner.get().await?.into_result()
    }

    pub async fn get_timeout(self, timeout: Duration) -> Result<serde_json::Value> {
        self.inner.get_timeout(timeout).await?.into_result()
    }

    /// Install `invocation`'s attachments as the ambient `RPC_CONTEXT`
    /// for the duration of `callback`, then hand back the resolved
    /// result. The context is gone again the moment this future
    /// completes, regardless of how `callback` itself behaved.
    pub async fn when_complete_with_context<F>(self, callback: F) -> Result<serde_json::Value>
    where
        F: FnOnce(&Result<serde_json::Value>) + Send,
    {
        let attachments = self.invocation.attachments.clone();
        let outcome = self.inner.get().await.map(|r| r.into_result()).unwrap_or_else(Err);
        RPC_CONTEXT.scope(attachments, async { callback(&outcome) }).await;
        outcome
    }

    /// `Future` mode hands back the still-pending future; `Sync` mode
    /// awaits it here and returns the resolved value (or propagates the
    /// error, matching "rethrow the contained error").
    pub async fn recreate(self) -> RpcOutcome {
        match self.mode {
            InvokeMode::Future => RpcOutcome::Future(self.inner),
            InvokeMode::Sync => RpcOutcome::Resolved(self.inner.get().await.and_then(|r| r.into_result())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exchange::PendingRegistry;
    use crate::message::Response;
    use crate::transport::{Channel, ChannelRole};
    use std::time::Duration as StdDuration;
    use tokio::sync::mpsc;

    fn test_channel() -> Channel {
        let (tx, _rx) = mpsc::unbounded_channel();
        Channel::new(ChannelRole::Client, "127.0.0.1:1".parse().unwrap(), tx)
    }

    #[tokio::test]
    async fn sync_mode_recreate_resolves_value() {
        let registry = PendingRegistry::new();
        let channel = test_channel();
        let invocation = Invocation::new("echo");
        let req = crate::message::Request::invocation(invocation.clone());
        let id = req.id;
        let future = registry.new_call(channel, &req, StdDuration::from_secs(5));
        registry.received(Response::ok(id, serde_json::json!("hi")));

        let result = AsyncRpcResult::new(future, invocation, InvokeMode::Sync).recreate().await;
        match result {
            RpcOutcome::Resolved(Ok(value)) => assert_eq!(value, serde_json::json!("hi")),
            _ => panic!("expected resolved Ok"),
        }
    }

    #[tokio::test]
    async fn future_mode_recreate_hands_back_future() {
        let registry = PendingRegistry::new();
        let channel = test_channel();
        let invocation = Invocation::new("echo");
        let req = crate::message::Request::invocation(invocation.clone());
        let id = req.id;
        let future = registry.new_call(channel, &req, StdDuration::from_secs(5));
        registry.received(Response::ok(id, serde_json::json!(42)));

        let result = AsyncRpcResult::new(future, invocation, InvokeMode::Future).recreate().await;
        match result {
            RpcOutcome::Future(f) => {
                let resp = f.get().await.unwrap();
                assert!(resp.status.is_ok());
            }
            _ => panic!("expected future"),
        }
    }

    #[tokio::test]
    async fn when_complete_installs_context_for_callback_duration() {
        let registry = PendingRegistry::new();
        let channel = test_channel();
        let invocation = Invocation::new("echo").with_attachment("path", "com.acme.Echo");
        let req = crate::message::Request::invocation(invocation.clone());
        let id = req.id;
        let future = registry.new_call(channel, &req, StdDuration::from_secs(5));
        registry.received(Response::ok(id, serde_json::json!("hi")));

        let seen = std::sync::Arc::new(std::sync::Mutex::new(None));
        let seen_clone = seen.clone();
        AsyncRpcResult::new(future, invocation, InvokeMode::Sync)
            .when_complete_with_context(move |_| {
                *seen_clone.lock().unwrap() = RPC_CONTEXT.try_with(|ctx| ctx.get("path").cloned()).ok().flatten();
            })
            .await
            .unwrap();

        assert_eq!(seen.lock().unwrap().as_deref(), Some("com.acme.Echo"));
        assert!(RPC_CONTEXT.try_with(|_| ()).is_err());
    }
}
