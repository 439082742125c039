//! Error types for wsrpc.

use thiserror::Error;

/// Main error type for all RPC operations.
#[derive(Debug, Error)]
pub enum RpcError {
    /// I/O error while binding or serving.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// MsgPack serialization error.
    #[error("MsgPack encode error: {0}")]
    MsgPackEncode(#[from] rmp_serde::encode::Error),

    /// MsgPack deserialization error.
    #[error("MsgPack decode error: {0}")]
    MsgPackDecode(#[from] rmp_serde::decode::Error),

    /// Configuration rejected before serving.
    #[error("configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),

    /// Error reported by the server-side WebSocket.
    #[error("transport error: {0}")]
    Transport(#[from] axum::Error),

    /// Error reported by the client-side WebSocket.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// Frame could not be turned into a transport message.
    #[error("invalid frame: {0}")]
    InvalidFrame(String),

    /// No handler is registered under the requested name.
    #[error("function {0:?} not found")]
    FunctionNotFound(String),

    /// Payload did not match the shape the handler expects.
    #[error("invalid payload for {function:?}: {source}")]
    InvalidPayload {
        function: String,
        #[source]
        source: serde_json::Error,
    },

    /// Failure reported by a handler.
    #[error("{0}")]
    Handler(String),

    /// Connection closed or never bound.
    #[error("connection closed")]
    ConnectionClosed,

    /// No frame arrived within the configured read timeout.
    #[error("read timed out")]
    ReadTimeout,

    /// Administrative add on a pool with no empty slot.
    #[error("connection pool is full")]
    PoolFull,
}

impl RpcError {
    /// Build a handler failure from any displayable message.
    pub fn handler(message: impl std::fmt::Display) -> Self {
        Self::Handler(message.to_string())
    }

    /// Whether this error means the peer is gone rather than something went wrong.
    pub fn is_closed(&self) -> bool {
        matches!(self, Self::ConnectionClosed)
    }
}

/// Result type alias using RpcError.
pub type Result<T> = std::result::Result<T, RpcError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_names_function() {
        let err = RpcError::FunctionNotFound("missing".into());
        assert!(err.to_string().contains("missing"));
    }

    #[test]
    fn test_handler_message_passthrough() {
        let err = RpcError::handler("division by zero");
        assert_eq!(err.to_string(), "division by zero");
        assert!(!err.is_closed());
        assert!(RpcError::ConnectionClosed.is_closed());
    }
}
