//! Frame struct with typed accessors.
//!
//! A frame is one discrete transport message, tagged as text or binary.
//! Uses `bytes::Bytes` for zero-copy payload sharing.
//!
//! # Example
//!
//! ```
//! use wsrpc::protocol::{Frame, FrameKind};
//!
//! let frame = Frame::text("hello");
//! assert_eq!(frame.kind(), FrameKind::Text);
//! assert_eq!(frame.payload(), b"hello");
//! ```

use bytes::Bytes;

use crate::error::{Result, RpcError};

/// Kind of a transport frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrameKind {
    /// UTF-8 text frame.
    Text,
    /// Opaque binary frame.
    Binary,
}

impl FrameKind {
    /// Lowercase name, used in log fields.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Binary => "binary",
        }
    }
}

impl std::fmt::Display for FrameKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A complete transport frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    kind: FrameKind,
    payload: Bytes,
}

impl Frame {
    /// Create a new frame from kind and payload.
    pub fn new(kind: FrameKind, payload: impl Into<Bytes>) -> Self {
        Self {
            kind,
            payload: payload.into(),
        }
    }

    /// Create a text frame.
    pub fn text(payload: impl Into<Bytes>) -> Self {
        Self::new(FrameKind::Text, payload)
    }

    /// Create a binary frame.
    pub fn binary(payload: impl Into<Bytes>) -> Self {
        Self::new(FrameKind::Binary, payload)
    }

    /// Get the frame kind.
    #[inline]
    pub fn kind(&self) -> FrameKind {
        self.kind
    }

    /// Check if this is a text frame.
    #[inline]
    pub fn is_text(&self) -> bool {
        self.kind == FrameKind::Text
    }

    /// Get a reference to the payload bytes.
    #[inline]
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Get the payload length.
    #[inline]
    pub fn len(&self) -> usize {
        self.payload.len()
    }

    /// Check if the payload is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }

    /// Consume the frame, returning the payload.
    pub fn into_payload(self) -> Bytes {
        self.payload
    }

    /// Payload as UTF-8, failing for text frames that are not valid UTF-8.
    pub fn as_text(&self) -> Result<&str> {
        std::str::from_utf8(&self.payload)
            .map_err(|e| RpcError::InvalidFrame(format!("text frame is not UTF-8: {e}")))
    }
}
