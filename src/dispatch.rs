//! Per-connection dispatch loop.
//!
//! A [`Dispatcher`] turns a live [`Transport`] into a served connection:
//!
//! ```text
//! Connecting ──► Upgraded ──► Serving ──┬──► Draining ──► Closed
//!                                 ▲     │
//!                                 └─────┘ read, decode, dispatch
//!                                       └──► Closed (read failure)
//! ```
//!
//! Each iteration races the next read against the shared shutdown token.
//! Decoded requests are dispatched through the [`FunctionRegistry`] as their
//! own tasks, so a slow handler never stalls intake on its connection and
//! responses may leave in a different order than the requests arrived.
//!
//! Before a connection's handle is released or closed, the loop waits for the
//! handlers it dispatched. Shutdown therefore drains in-flight calls instead
//! of cutting them off, and a pooled slot is never rebound while an old
//! handler could still write to it.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use futures::SinkExt;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::codec::Codec;
use crate::connection::{ConnectionHandle, ConnectionPool};
use crate::error::{Result, RpcError};
use crate::handler::{FunctionRegistry, RequestContext};
use crate::protocol::Frame;
use crate::transport::Transport;

/// Lifecycle of one connection, as recorded in log events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Upgrade request received.
    Connecting,
    /// Transport handed over by the upgrade.
    Upgraded,
    /// Read loop running.
    Serving,
    /// Shutdown observed; waiting for in-flight handlers.
    Draining,
    /// Terminal.
    Closed,
}

impl ConnectionState {
    /// Lowercase name used in log fields.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Connecting => "connecting",
            Self::Upgraded => "upgraded",
            Self::Serving => "serving",
            Self::Draining => "draining",
            Self::Closed => "closed",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a connection's loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionExit {
    /// Shutdown was signalled.
    Drained,
    /// The peer closed the connection or the transport failed.
    Closed,
    /// No frame arrived within the read timeout.
    TimedOut,
    /// Every pool slot was taken; the connection was turned away.
    Rejected,
}

/// Serves connections against a shared registry.
///
/// Cheap to clone; clones share the registry, pool, shutdown token and task
/// tracker.
#[derive(Clone)]
pub struct Dispatcher {
    registry: Arc<FunctionRegistry>,
    codec: Codec,
    pool: Option<Arc<ConnectionPool>>,
    tasks: TaskTracker,
    shutdown: CancellationToken,
    read_timeout: Option<Duration>,
}

impl Dispatcher {
    /// Create an unpooled dispatcher with its own shutdown token.
    pub fn new(registry: Arc<FunctionRegistry>, codec: Codec) -> Self {
        Self {
            registry,
            codec,
            pool: None,
            tasks: TaskTracker::new(),
            shutdown: CancellationToken::new(),
            read_timeout: None,
        }
    }

    /// Draw handles from `pool` instead of wrapping each transport.
    pub fn with_pool(mut self, pool: Arc<ConnectionPool>) -> Self {
        self.pool = Some(pool);
        self
    }

    /// End a connection when no frame arrives within `timeout`.
    pub fn with_read_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.read_timeout = timeout;
        self
    }

    /// Observe `token` instead of a private one.
    pub fn with_shutdown(mut self, token: CancellationToken) -> Self {
        self.shutdown = token;
        self
    }

    /// Registry calls are dispatched through.
    pub fn registry(&self) -> &Arc<FunctionRegistry> {
        &self.registry
    }

    /// Codec for the configured format.
    pub fn codec(&self) -> Codec {
        self.codec
    }

    /// Pool handles are drawn from, if pooling is on.
    pub fn pool(&self) -> Option<&Arc<ConnectionPool>> {
        self.pool.as_ref()
    }

    /// Token every loop watches for shutdown.
    pub fn shutdown_token(&self) -> &CancellationToken {
        &self.shutdown
    }

    /// Signal every loop sharing this dispatcher's token to drain.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    /// Run the loop for `transport` as a tracked task.
    pub fn spawn(&self, transport: Transport) -> JoinHandle<ConnectionExit> {
        let dispatcher = self.clone();
        self.tasks
            .spawn(async move { dispatcher.run(transport).await })
    }

    /// Number of connection loops started with [`spawn`](Self::spawn) still running.
    pub fn active(&self) -> usize {
        self.tasks.len()
    }

    /// Wait for every spawned connection loop to finish.
    ///
    /// Call after signalling shutdown; loops started afterwards are not
    /// waited for.
    pub async fn wait(&self) {
        self.tasks.close();
        self.tasks.wait().await;
    }

    /// Serve `transport` until it closes, times out or shutdown is signalled.
    pub async fn run(&self, transport: Transport) -> ConnectionExit {
        let Some((handle, pooled)) = self.attach(transport).await else {
            return ConnectionExit::Rejected;
        };
        let connection = handle.id();
        tracing::debug!(connection, pooled, state = %ConnectionState::Serving, "connection serving");

        let inflight = TaskTracker::new();
        let exit = self.serve(&handle, &inflight).await;

        inflight.close();
        if !inflight.is_empty() {
            tracing::debug!(connection, pending = inflight.len(), "waiting for in-flight handlers");
        }
        inflight.wait().await;

        self.detach(&handle, pooled).await;
        tracing::debug!(connection, exit = ?exit, state = %ConnectionState::Closed, "connection closed");
        exit
    }

    async fn attach(&self, transport: Transport) -> Option<(Arc<ConnectionHandle>, bool)> {
        let Some(pool) = &self.pool else {
            let handle = Arc::new(ConnectionHandle::new(transport));
            tracing::debug!(connection = handle.id(), state = %ConnectionState::Upgraded, "connection upgraded");
            return Some((handle, false));
        };

        match pool.acquire(transport).await {
            Ok(handle) => {
                tracing::debug!(connection = handle.id(), state = %ConnectionState::Upgraded, "connection upgraded");
                Some((handle, true))
            }
            Err(exhausted) => {
                tracing::warn!(capacity = exhausted.capacity(), "connection rejected: pool exhausted");
                let (mut sink, _stream) = exhausted.into_transport().into_parts();
                if let Err(e) = sink.close().await {
                    tracing::debug!(error = %e, "close of rejected connection failed");
                }
                None
            }
        }
    }

    async fn serve(&self, handle: &Arc<ConnectionHandle>, inflight: &TaskTracker) -> ConnectionExit {
        let connection = handle.id();

        loop {
            let read = tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => {
                    tracing::debug!(connection, state = %ConnectionState::Draining, "shutdown observed");
                    return ConnectionExit::Drained;
                }
                read = self.next_frame(handle) => read,
            };

            match read {
                Ok(frame) => self.handle_frame(handle, inflight, frame),
                Err(RpcError::ReadTimeout) => {
                    tracing::debug!(connection, timeout = ?self.read_timeout, "read timed out");
                    return ConnectionExit::TimedOut;
                }
                Err(e) if e.is_closed() => return ConnectionExit::Closed,
                Err(e) => {
                    tracing::debug!(connection, error = %e, "read failed");
                    return ConnectionExit::Closed;
                }
            }
        }
    }

    async fn next_frame(&self, handle: &ConnectionHandle) -> Result<Frame> {
        match self.read_timeout {
            Some(limit) => tokio::time::timeout(limit, handle.receive())
                .await
                .map_err(|_| RpcError::ReadTimeout)?,
            None => handle.receive().await,
        }
    }

    fn handle_frame(&self, handle: &Arc<ConnectionHandle>, inflight: &TaskTracker, frame: Frame) {
        let connection = handle.id();

        let request = match self.codec.decode_request(frame.payload()) {
            Ok(request) => request,
            Err(e) => {
                tracing::debug!(connection, kind = %frame.kind(), len = frame.len(), error = %e, "dropping undecodable frame");
                return;
            }
        };

        let Some(function) = request.function else {
            tracing::debug!(connection, "ignoring request without function");
            return;
        };

        tracing::trace!(connection, function = %function, "dispatching");
        let ctx = RequestContext::new(function, Arc::clone(handle), self.codec);
        let _ = self.registry.dispatch(inflight, ctx, request.data);
    }

    async fn detach(&self, handle: &Arc<ConnectionHandle>, pooled: bool) {
        match (&self.pool, pooled) {
            (Some(pool), true) => pool.release(handle).await,
            _ => {
                if let Err(e) = handle.close().await {
                    tracing::debug!(connection = handle.id(), error = %e, "close failed");
                }
            }
        }
    }
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("format", &self.codec.format())
            .field("pool", &self.pool)
            .field("read_timeout", &self.read_timeout)
            .field("cancelled", &self.shutdown.is_cancelled())
            .finish_non_exhaustive()
    }
}
