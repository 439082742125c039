//! Request context for handlers.
//!
//! Provides methods for answering a call:
//! - `respond` - encode a value in the configured format and send it
//! - `respond_frame` - send a pre-built frame
//! - `error` - send an error record naming the function
//!
//! # Example
//!
//! ```ignore
//! async fn echo(data: Payload, ctx: RequestContext) -> Result<()> {
//!     ctx.respond(&data).await
//! }
//! ```

use std::sync::Arc;

use serde::Serialize;

use crate::codec::Codec;
use crate::connection::ConnectionHandle;
use crate::error::Result;
use crate::protocol::{ErrorResponse, Frame};

/// Context passed to function handlers.
///
/// `RequestContext` is `Clone` and can be moved into further tasks; every
/// clone writes through the same connection handle, so responses from
/// different tasks never interleave. A context stays tied to the peer the
/// call came from: once a pooled handle is released or rebound, writes
/// through an older context fail with [`RpcError::ConnectionClosed`].
///
/// [`RpcError::ConnectionClosed`]: crate::error::RpcError::ConnectionClosed
#[derive(Clone)]
pub struct RequestContext {
    function: Arc<str>,
    handle: Arc<ConnectionHandle>,
    generation: u64,
    codec: Codec,
}

impl RequestContext {
    /// Create a context for a call to `function` arriving on `handle`.
    pub fn new(function: impl Into<Arc<str>>, handle: Arc<ConnectionHandle>, codec: Codec) -> Self {
        Self {
            function: function.into(),
            generation: handle.generation(),
            handle,
            codec,
        }
    }

    /// Name of the function being called.
    #[inline]
    pub fn function(&self) -> &str {
        &self.function
    }

    /// Connection the call arrived on.
    #[inline]
    pub fn handle(&self) -> &Arc<ConnectionHandle> {
        &self.handle
    }

    /// Codec for the server's configured format.
    #[inline]
    pub fn codec(&self) -> Codec {
        self.codec
    }

    /// Send `value` as the response.
    pub async fn respond<T: Serialize>(&self, value: &T) -> Result<()> {
        let frame = self.codec.encode(value)?;
        self.respond_frame(frame).await
    }

    /// Send a frame as-is.
    pub async fn respond_frame(&self, frame: Frame) -> Result<()> {
        self.handle.send_on(self.generation, frame).await
    }

    /// Send an error response for this call.
    pub async fn error(&self, message: &str) -> Result<()> {
        self.respond(&ErrorResponse::new(&*self.function, message))
            .await
    }
}

impl std::fmt::Debug for RequestContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestContext")
            .field("function", &self.function)
            .field("connection", &self.handle.id())
            .field("format", &self.codec.format())
            .finish()
    }
}
