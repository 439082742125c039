//! Transport module - full-duplex, message-framed channels.
//!
//! A [`Transport`] is a boxed frame sink plus a boxed frame stream. Anything
//! that can send and receive [`Frame`]s fits:
//!
//! - [`websocket`] - upgraded axum WebSocket (server side)
//! - [`memory`] - channel-backed pair for tests and embedders
//! - [`Transport::new`] - any other `Sink`/`Stream` combination
//!
//! The stream ends (or yields [`RpcError::ConnectionClosed`]) when the peer
//! closes; any other stream error is a terminal transport failure.

pub mod memory;
pub mod websocket;

use std::pin::Pin;

use futures::{Sink, Stream};

use crate::error::{Result, RpcError};
use crate::protocol::Frame;

pub use memory::MemoryPeer;

/// Boxed outbound half of a transport.
pub type FrameSink = Pin<Box<dyn Sink<Frame, Error = RpcError> + Send>>;

/// Boxed inbound half of a transport.
pub type FrameStream = Pin<Box<dyn Stream<Item = Result<Frame>> + Send>>;

/// A live, framed connection to one peer.
pub struct Transport {
    sink: FrameSink,
    stream: FrameStream,
}

impl Transport {
    /// Build a transport from any frame sink and stream.
    pub fn new<Si, St>(sink: Si, stream: St) -> Self
    where
        Si: Sink<Frame, Error = RpcError> + Send + 'static,
        St: Stream<Item = Result<Frame>> + Send + 'static,
    {
        Self {
            sink: Box::pin(sink),
            stream: Box::pin(stream),
        }
    }

    /// Create an in-memory transport and the peer that drives its other end.
    pub fn memory() -> (Self, MemoryPeer) {
        memory::pair()
    }

    /// Split into the outbound and inbound halves.
    pub fn into_parts(self) -> (FrameSink, FrameStream) {
        (self.sink, self.stream)
    }
}

impl std::fmt::Debug for Transport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transport").finish_non_exhaustive()
    }
}
