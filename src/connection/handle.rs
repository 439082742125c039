//! Connection handle with exclusive writes.
//!
//! A [`ConnectionHandle`] owns one [`Transport`] at a time. Writes go through a
//! single async mutex, so two concurrent [`send`](ConnectionHandle::send)
//! calls never interleave on the wire. [`is_available`](ConnectionHandle::is_available)
//! and [`mark_in_use`](ConnectionHandle::mark_in_use) take the same mutex,
//! which keeps pool bookkeeping linearizable with respect to sends.
//!
//! ```text
//! Handler 1 ─┐
//! Handler 2 ─┼─► writer lock ─► sink ─► peer
//! Handler N ─┘
//!
//! read loop ───► reader lock ─► stream ◄─ peer
//! ```
//!
//! The reader has its own lock. Only the dispatch loop reads, so it is never
//! contended; it exists so the stream can be swapped when a pooled handle is
//! rebound.
//!
//! Every bind bumps a generation counter. Writers that captured an older
//! generation (see [`send_on`](ConnectionHandle::send_on)) are refused once
//! the handle has moved on to another peer. The in-use flag is an atomic so
//! the pool can claim a free slot without touching either lock.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use futures::{SinkExt, StreamExt};
use tokio::sync::Mutex;

use crate::error::{Result, RpcError};
use crate::protocol::Frame;
use crate::transport::{FrameSink, FrameStream, Transport};

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

/// Wrapper around one transport connection.
pub struct ConnectionHandle {
    id: u64,
    generation: AtomicU64,
    in_use: AtomicBool,
    writer: Mutex<Option<FrameSink>>,
    reader: Mutex<Option<FrameStream>>,
}

impl ConnectionHandle {
    /// Create an unbound, free handle (a pool slot).
    pub fn empty() -> Self {
        Self {
            id: NEXT_ID.fetch_add(1, Ordering::Relaxed),
            generation: AtomicU64::new(0),
            in_use: AtomicBool::new(false),
            writer: Mutex::new(None),
            reader: Mutex::new(None),
        }
    }

    /// Create a handle bound to `transport` and already marked in use.
    pub fn new(transport: Transport) -> Self {
        let (sink, stream) = transport.into_parts();
        Self {
            id: NEXT_ID.fetch_add(1, Ordering::Relaxed),
            generation: AtomicU64::new(0),
            in_use: AtomicBool::new(true),
            writer: Mutex::new(Some(sink)),
            reader: Mutex::new(Some(stream)),
        }
    }

    /// Process-unique id, used in log fields.
    #[inline]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Current binding generation; changes whenever the transport is swapped
    /// or released.
    #[inline]
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// Write one frame.
    ///
    /// Holds the writer lock for the whole write, flush included, and
    /// releases it whatever the outcome.
    pub async fn send(&self, frame: Frame) -> Result<()> {
        let mut writer = self.writer.lock().await;
        let sink = writer.as_mut().ok_or(RpcError::ConnectionClosed)?;
        sink.send(frame).await
    }

    /// Write one frame, but only to the binding `generation` was taken from.
    ///
    /// Fails with [`RpcError::ConnectionClosed`] once the handle has been
    /// released or rebound since.
    pub async fn send_on(&self, generation: u64, frame: Frame) -> Result<()> {
        let mut writer = self.writer.lock().await;
        if self.generation() != generation {
            return Err(RpcError::ConnectionClosed);
        }
        let sink = writer.as_mut().ok_or(RpcError::ConnectionClosed)?;
        sink.send(frame).await
    }

    /// Read the next frame.
    ///
    /// A stream that has ended reports [`RpcError::ConnectionClosed`].
    pub async fn receive(&self) -> Result<Frame> {
        let mut reader = self.reader.lock().await;
        let stream = reader.as_mut().ok_or(RpcError::ConnectionClosed)?;
        match stream.next().await {
            Some(frame) => frame,
            None => Err(RpcError::ConnectionClosed),
        }
    }

    /// Close the underlying transport.
    ///
    /// Idempotent: closing an unbound handle does nothing. The close
    /// handshake is best effort; the transport is dropped either way. A read
    /// in progress keeps its stream until the peer answers the close.
    pub async fn close(&self) -> Result<()> {
        let sink = self.writer.lock().await.take();
        if let Ok(mut reader) = self.reader.try_lock() {
            reader.take();
        }
        match sink {
            Some(mut sink) => sink.close().await,
            None => Ok(()),
        }
    }

    /// Replace the underlying transport.
    ///
    /// Waits for a read in progress to finish before swapping the stream;
    /// sends are not held up meanwhile. Writes made through an older
    /// generation are refused afterwards.
    pub async fn rebind(&self, transport: Transport) {
        let (sink, stream) = transport.into_parts();
        let mut reader = self.reader.lock().await;
        let mut writer = self.writer.lock().await;
        self.generation.fetch_add(1, Ordering::AcqRel);
        *writer = Some(sink);
        *reader = Some(stream);
    }

    /// Whether the handle is free for acquisition.
    pub async fn is_available(&self) -> bool {
        let _writer = self.writer.lock().await;
        !self.in_use.load(Ordering::Acquire)
    }

    /// Flip the in-use flag.
    pub async fn mark_in_use(&self, in_use: bool) {
        let _writer = self.writer.lock().await;
        self.in_use.store(in_use, Ordering::Release);
    }

    /// Whether a transport is currently bound.
    pub async fn is_bound(&self) -> bool {
        self.writer.lock().await.is_some()
    }

    /// Mark a free handle in use without waiting on either lock.
    ///
    /// Returns `false` if the handle was already in use.
    pub(crate) fn try_claim(&self) -> bool {
        self.in_use
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Close the transport and mark the handle free, as one step.
    pub(crate) async fn unbind(&self) {
        let mut reader = self.reader.lock().await;
        let mut writer = self.writer.lock().await;
        self.generation.fetch_add(1, Ordering::AcqRel);
        if let Some(mut sink) = writer.take() {
            if let Err(e) = sink.close().await {
                tracing::debug!(connection = self.id, error = %e, "close on release failed");
            }
        }
        reader.take();
        self.in_use.store(false, Ordering::Release);
    }
}

impl std::fmt::Debug for ConnectionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionHandle")
            .field("id", &self.id)
            .finish_non_exhaustive()
    }
}
