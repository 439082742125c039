//! WebSocket client for calling a wsrpc server.
//!
//! Speaks the same wire shape as the server: requests go out as
//! `{function, data}` records in the chosen format, and whatever the server
//! sends back is surfaced frame by frame. Responses carry no request id, so
//! a caller issuing several calls at once must tell the replies apart by
//! content.
//!
//! # Example
//!
//! ```ignore
//! use wsrpc::{Client, Format};
//!
//! let mut client = Client::connect("ws://127.0.0.1:8080/", Format::Json).await?;
//! client.call("echo", &"hi").await?;
//! let reply: String = client.recv_value().await?;
//! client.close().await?;
//! ```

use futures::{SinkExt, StreamExt};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use crate::codec::{Codec, Format};
use crate::error::{Result, RpcError};
use crate::protocol::{Frame, FrameKind, Request};

/// Connected client.
pub struct Client {
    socket: WebSocketStream<MaybeTlsStream<TcpStream>>,
    codec: Codec,
}

impl Client {
    /// Dial `url` and speak `format` on the connection.
    pub async fn connect(url: &str, format: Format) -> Result<Self> {
        let (socket, _response) = connect_async(url).await?;
        tracing::debug!(url, %format, "client connected");
        Ok(Self {
            socket,
            codec: Codec::new(format),
        })
    }

    /// Codec for the format chosen at connect time.
    pub fn codec(&self) -> Codec {
        self.codec
    }

    /// Send a call to `function` with `data` as its argument.
    pub async fn call<T: Serialize>(&mut self, function: &str, data: &T) -> Result<()> {
        let data = serde_json::to_value(data)?;
        let frame = self.codec.encode(&Request::new(function, data))?;
        self.send_frame(frame).await
    }

    /// Send a frame as-is.
    pub async fn send_frame(&mut self, frame: Frame) -> Result<()> {
        let message = match frame.kind() {
            FrameKind::Text => Message::Text(frame.as_text()?.to_owned().into()),
            FrameKind::Binary => Message::Binary(frame.into_payload()),
        };
        self.socket.send(message).await?;
        Ok(())
    }

    /// Next data frame from the server.
    ///
    /// Control messages are skipped. A close from the server, or the end of
    /// the stream, reports [`RpcError::ConnectionClosed`].
    pub async fn recv(&mut self) -> Result<Frame> {
        while let Some(message) = self.socket.next().await {
            match message? {
                Message::Text(text) => return Ok(Frame::text(text.as_str().to_owned())),
                Message::Binary(bytes) => return Ok(Frame::binary(bytes)),
                Message::Close(_) => return Err(RpcError::ConnectionClosed),
                Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => continue,
            }
        }
        Err(RpcError::ConnectionClosed)
    }

    /// Next data frame, decoded in the client's format.
    pub async fn recv_value<T: DeserializeOwned>(&mut self) -> Result<T> {
        let frame = self.recv().await?;
        self.codec.decode(frame.payload())
    }

    /// Start the close handshake.
    pub async fn close(&mut self) -> Result<()> {
        self.socket.close(None).await?;
        Ok(())
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("format", &self.codec.format())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_connect_refused() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let err = Client::connect(&format!("ws://{addr}/"), Format::Json)
            .await
            .unwrap_err();
        assert!(matches!(err, RpcError::WebSocket(_)));
    }

    #[tokio::test]
    async fn test_connect_bad_url() {
        assert!(Client::connect("not a url", Format::Json).await.is_err());
    }
}
