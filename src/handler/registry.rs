//! Function registry for dispatching calls by name.
//!
//! The registry maps function names to handlers. It is shared by every
//! connection and may be updated while connections are being served:
//! registration takes the write lock, lookup the read lock, and neither is
//! held across an `.await`.
//!
//! # Example
//!
//! ```ignore
//! use wsrpc::handler::FunctionRegistry;
//! use wsrpc::protocol::Payload;
//!
//! let registry = FunctionRegistry::new();
//!
//! registry.register("echo", |data: Payload, ctx| async move {
//!     ctx.respond(&data).await
//! });
//!
//! registry.register("add", |(a, b): (i64, i64), ctx| async move {
//!     ctx.respond(&(a + b)).await
//! });
//! ```

use std::any::Any;
use std::collections::HashMap;
use std::future::Future;
use std::marker::PhantomData;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::Arc;

use futures::FutureExt;
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use tokio::task::JoinHandle;
use tokio_util::task::TaskTracker;

use super::RequestContext;
use crate::error::{Result, RpcError};
use crate::protocol::Payload;

/// Result type for handler functions.
pub type HandlerResult = Result<()>;

/// Boxed future for handler results.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Trait for handler functions.
pub trait Handler: Send + Sync + 'static {
    /// Handle a call with its decoded payload.
    fn call(&self, data: Payload, ctx: RequestContext) -> BoxFuture<'static, HandlerResult>;
}

/// Wrapper that converts the payload to `T` before calling the handler.
pub struct TypedHandler<F, T, Fut>
where
    F: Fn(T, RequestContext) -> Fut + Send + Sync + 'static,
    T: DeserializeOwned + Send + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    handler: F,
    _phantom: PhantomData<fn(T) -> Fut>,
}

impl<F, T, Fut> TypedHandler<F, T, Fut>
where
    F: Fn(T, RequestContext) -> Fut + Send + Sync + 'static,
    T: DeserializeOwned + Send + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    /// Create a new typed handler.
    pub fn new(handler: F) -> Self {
        Self {
            handler,
            _phantom: PhantomData,
        }
    }
}

impl<F, T, Fut> Handler for TypedHandler<F, T, Fut>
where
    F: Fn(T, RequestContext) -> Fut + Send + Sync + 'static,
    T: DeserializeOwned + Send + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    fn call(&self, data: Payload, ctx: RequestContext) -> BoxFuture<'static, HandlerResult> {
        let parsed: T = match serde_json::from_value(data) {
            Ok(v) => v,
            Err(source) => {
                let function = ctx.function().to_string();
                return Box::pin(async move { Err(RpcError::InvalidPayload { function, source }) });
            }
        };

        Box::pin((self.handler)(parsed, ctx))
    }
}

/// How a dispatched call ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Handler ran and returned `Ok`.
    Completed,
    /// Handler returned an error; the message was sent back to the caller.
    Failed(String),
    /// No handler under that name; an error was sent back to the caller.
    NotFound,
}

/// Registry mapping function names to handlers.
pub struct FunctionRegistry {
    functions: RwLock<HashMap<String, Arc<dyn Handler>>>,
}

impl FunctionRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self {
            functions: RwLock::new(HashMap::new()),
        }
    }

    /// Register a function handler, replacing any previous one of that name.
    ///
    /// The handler receives the payload converted to `T` (use [`Payload`]
    /// for the raw value) and a context for responding.
    pub fn register<F, T, Fut>(&self, name: impl Into<String>, handler: F)
    where
        F: Fn(T, RequestContext) -> Fut + Send + Sync + 'static,
        T: DeserializeOwned + Send + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.register_handler(name, Arc::new(TypedHandler::new(handler)));
    }

    /// Register a pre-built handler.
    pub fn register_handler(&self, name: impl Into<String>, handler: Arc<dyn Handler>) {
        let name = name.into();
        let replaced = self.functions.write().insert(name.clone(), handler).is_some();
        tracing::debug!(function = %name, replaced, "registered function");
    }

    /// Remove a function. Returns whether it was registered.
    pub fn remove(&self, name: &str) -> bool {
        self.functions.write().remove(name).is_some()
    }

    /// Get the handler registered under `name`.
    pub fn lookup(&self, name: &str) -> Result<Arc<dyn Handler>> {
        self.functions
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| RpcError::FunctionNotFound(name.to_string()))
    }

    /// Whether `name` is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.functions.read().contains_key(name)
    }

    /// Number of registered functions.
    pub fn len(&self) -> usize {
        self.functions.read().len()
    }

    /// Whether no function is registered.
    pub fn is_empty(&self) -> bool {
        self.functions.read().is_empty()
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.functions.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Dispatch a call to the handler named by `ctx`.
    ///
    /// The lookup happens now; the handler runs as its own task on `tasks`,
    /// so the caller never waits for it. A failing handler or a missing
    /// function produces an error response on the connection and a log
    /// event; neither affects the connection itself.
    pub fn dispatch(
        &self,
        tasks: &TaskTracker,
        ctx: RequestContext,
        payload: Payload,
    ) -> JoinHandle<DispatchOutcome> {
        let handler = self.lookup(ctx.function());

        tasks.spawn(async move {
            let connection = ctx.handle().id();
            let (outcome, error) = match handler {
                Ok(handler) => {
                    let call = AssertUnwindSafe(async { handler.call(payload, ctx.clone()).await });
                    match call.catch_unwind().await {
                        Ok(Ok(())) => return DispatchOutcome::Completed,
                        Ok(Err(e)) => {
                            tracing::warn!(connection, function = %ctx.function(), error = %e, "handler failed");
                            (DispatchOutcome::Failed(e.to_string()), e)
                        }
                        Err(panic) => {
                            let e = RpcError::handler(format!(
                                "function {:?} panicked: {}",
                                ctx.function(),
                                panic_message(panic.as_ref())
                            ));
                            tracing::warn!(connection, function = %ctx.function(), error = %e, "handler panicked");
                            (DispatchOutcome::Failed(e.to_string()), e)
                        }
                    }
                }
                Err(e) => {
                    tracing::warn!(connection, function = %ctx.function(), "function not found");
                    (DispatchOutcome::NotFound, e)
                }
            };

            if let Err(e) = ctx.error(&error.to_string()).await {
                tracing::debug!(connection, function = %ctx.function(), error = %e, "could not send error response");
            }
            outcome
        })
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message
    } else {
        "unknown panic"
    }
}

impl Default for FunctionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for FunctionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FunctionRegistry")
            .field("functions", &self.names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use serde_json::json;

    use super::*;
    use crate::codec::{Codec, Format};
    use crate::connection::ConnectionHandle;
    use crate::protocol::ErrorResponse;
    use crate::transport::{MemoryPeer, Transport};

    fn context(function: &str) -> (RequestContext, MemoryPeer) {
        let (transport, peer) = Transport::memory();
        let handle = Arc::new(ConnectionHandle::new(transport));
        (
            RequestContext::new(function, handle, Codec::new(Format::Json)),
            peer,
        )
    }

    #[test]
    fn test_register_and_lookup() {
        let registry = FunctionRegistry::new();
        registry.register("echo", |_data: Payload, _ctx| async { Ok(()) });

        assert!(registry.lookup("echo").is_ok());
        assert!(registry.contains("echo"));
        assert_eq!(registry.len(), 1);
        assert!(!registry.is_empty());
    }

    #[test]
    fn test_lookup_missing_names_function() {
        let registry = FunctionRegistry::new();
        match registry.lookup("nonexistent") {
            Err(RpcError::FunctionNotFound(name)) => assert_eq!(name, "nonexistent"),
            other => panic!("expected FunctionNotFound, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_lookup_is_exact() {
        let registry = FunctionRegistry::new();
        registry.register("Echo", |_: Payload, _ctx| async { Ok(()) });
        assert!(registry.lookup("echo").is_err());
        assert!(registry.lookup("Echo").is_ok());
    }

    #[test]
    fn test_names_and_remove() {
        let registry = FunctionRegistry::new();
        registry.register("b", |_: Payload, _ctx| async { Ok(()) });
        registry.register("a", |_: Payload, _ctx| async { Ok(()) });
        assert_eq!(registry.names(), vec!["a".to_string(), "b".to_string()]);

        assert!(registry.remove("a"));
        assert!(!registry.remove("a"));
        assert_eq!(registry.names(), vec!["b".to_string()]);
    }

    #[tokio::test]
    async fn test_last_registration_wins() {
        let registry = FunctionRegistry::new();
        let first = Arc::new(AtomicUsize::new(0));
        let second = Arc::new(AtomicUsize::new(0));

        let counter = first.clone();
        registry.register("f", move |_: Payload, _ctx| {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        });
        let counter = second.clone();
        registry.register("f", move |_: Payload, _ctx| {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        });

        let tasks = TaskTracker::new();
        let (ctx, _peer) = context("f");
        let outcome = registry.dispatch(&tasks, ctx, Payload::Null).await.unwrap();

        assert_eq!(outcome, DispatchOutcome::Completed);
        assert_eq!(first.load(Ordering::SeqCst), 0);
        assert_eq!(second.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_dispatch_passes_payload_to_only_that_handler() {
        let registry = FunctionRegistry::new();
        registry.register("echo", |data: Payload, ctx: RequestContext| async move {
            ctx.respond(&data).await
        });
        registry.register("other", |_: Payload, _ctx| async {
            Err(RpcError::handler("must not run"))
        });

        let tasks = TaskTracker::new();
        let (ctx, mut peer) = context("echo");
        let outcome = registry
            .dispatch(&tasks, ctx, json!({"k": [1, 2]}))
            .await
            .unwrap();
        assert_eq!(outcome, DispatchOutcome::Completed);

        let frame = peer.recv().await.unwrap();
        let value: Payload = Codec::new(Format::Json).decode(frame.payload()).unwrap();
        assert_eq!(value, json!({"k": [1, 2]}));
    }

    #[tokio::test]
    async fn test_dispatch_missing_sends_error() {
        let registry = FunctionRegistry::new();
        let tasks = TaskTracker::new();
        let (ctx, mut peer) = context("missing");

        let outcome = registry.dispatch(&tasks, ctx, Payload::Null).await.unwrap();
        assert_eq!(outcome, DispatchOutcome::NotFound);

        let frame = peer.recv().await.unwrap();
        let error: ErrorResponse = Codec::new(Format::Json).decode(frame.payload()).unwrap();
        assert_eq!(error.function, "missing");
        assert!(error.error.contains("missing"));
    }

    #[tokio::test]
    async fn test_dispatch_handler_failure_sends_error() {
        let registry = FunctionRegistry::new();
        registry.register("div", |(a, b): (i64, i64), ctx: RequestContext| async move {
            if b == 0 {
                return Err(RpcError::handler("division by zero"));
            }
            ctx.respond(&(a / b)).await
        });

        let tasks = TaskTracker::new();
        let (ctx, mut peer) = context("div");
        let outcome = registry.dispatch(&tasks, ctx, json!([1, 0])).await.unwrap();
        assert_eq!(outcome, DispatchOutcome::Failed("division by zero".into()));

        let frame = peer.recv().await.unwrap();
        let error: ErrorResponse = Codec::new(Format::Json).decode(frame.payload()).unwrap();
        assert_eq!(error, ErrorResponse::new("div", "division by zero"));
    }

    #[tokio::test]
    async fn test_typed_payload_mismatch_is_handler_failure() {
        let registry = FunctionRegistry::new();
        registry.register("add", |(a, b): (i64, i64), ctx: RequestContext| async move {
            ctx.respond(&(a + b)).await
        });

        let tasks = TaskTracker::new();
        let (ctx, mut peer) = context("add");
        let outcome = registry.dispatch(&tasks, ctx, json!("nope")).await.unwrap();
        assert!(matches!(outcome, DispatchOutcome::Failed(ref m) if m.contains("add")));

        let frame = peer.recv().await.unwrap();
        let error: ErrorResponse = Codec::new(Format::Json).decode(frame.payload()).unwrap();
        assert_eq!(error.function, "add");
    }

    #[tokio::test]
    async fn test_panicking_handler_sends_error() {
        let registry = FunctionRegistry::new();
        registry.register("boom", |_: Payload, _ctx: RequestContext| async move {
            if true {
                panic!("kaboom");
            }
            Ok(())
        });

        let tasks = TaskTracker::new();
        let (ctx, mut peer) = context("boom");
        let outcome = registry.dispatch(&tasks, ctx, Payload::Null).await.unwrap();
        assert!(matches!(outcome, DispatchOutcome::Failed(ref m) if m.contains("kaboom")));

        let frame = peer.recv().await.unwrap();
        let error: ErrorResponse = Codec::new(Format::Json).decode(frame.payload()).unwrap();
        assert_eq!(error.function, "boom");
        assert!(error.error.contains("panicked"));
    }

    #[tokio::test]
    async fn test_dispatch_does_not_wait_for_handler() {
        let registry = FunctionRegistry::new();
        registry.register("slow", |_: Payload, ctx: RequestContext| async move {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            ctx.respond(&"done").await
        });

        let tasks = TaskTracker::new();
        let (ctx, _peer) = context("slow");
        let task = registry.dispatch(&tasks, ctx, Payload::Null);

        assert_eq!(tasks.len(), 1);
        assert!(!task.is_finished());
        task.abort();
    }

    #[tokio::test]
    async fn test_register_while_dispatching() {
        let registry = Arc::new(FunctionRegistry::new());
        let tasks = TaskTracker::new();

        let writer = {
            let registry = registry.clone();
            tokio::spawn(async move {
                for i in 0..100 {
                    registry.register(format!("f{i}"), |_: Payload, _ctx| async { Ok(()) });
                    tokio::task::yield_now().await;
                }
            })
        };

        for _ in 0..100 {
            let (ctx, _peer) = context("f0");
            let _ = registry.dispatch(&tasks, ctx, Payload::Null).await.unwrap();
        }
        writer.await.unwrap();
        assert_eq!(registry.len(), 100);
    }
}
