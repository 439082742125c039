//! Upgraded axum WebSocket as a [`Transport`].
//!
//! Text and binary messages become [`Frame`]s of the same kind. Ping and pong
//! are answered by the WebSocket layer itself and never reach the dispatch
//! loop. A close message is reported as [`RpcError::ConnectionClosed`] so the
//! loop treats it like any other hang-up.

use axum::extract::ws::{Message, WebSocket};
use bytes::Bytes;
use futures::future;
use futures::{SinkExt, StreamExt};

use super::Transport;
use crate::error::{Result, RpcError};
use crate::protocol::{Frame, FrameKind};

impl From<WebSocket> for Transport {
    fn from(socket: WebSocket) -> Self {
        let (sink, stream) = socket.split();

        let sink = sink
            .sink_map_err(RpcError::from)
            .with(|frame: Frame| future::ready(into_message(frame)));

        let stream = stream.filter_map(|message| future::ready(from_message(message)));

        Transport::new(sink, stream)
    }
}

fn into_message(frame: Frame) -> Result<Message> {
    match frame.kind() {
        FrameKind::Text => {
            let text = frame.as_text()?.to_owned();
            Ok(Message::Text(text.into()))
        }
        FrameKind::Binary => Ok(Message::Binary(frame.into_payload())),
    }
}

fn from_message(message: std::result::Result<Message, axum::Error>) -> Option<Result<Frame>> {
    match message {
        Ok(Message::Text(text)) => Some(Ok(Frame::text(Bytes::copy_from_slice(
            text.as_str().as_bytes(),
        )))),
        Ok(Message::Binary(bytes)) => Some(Ok(Frame::binary(bytes))),
        Ok(Message::Ping(_) | Message::Pong(_)) => None,
        Ok(Message::Close(_)) => Some(Err(RpcError::ConnectionClosed)),
        Err(e) => Some(Err(RpcError::from(e))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_frame_becomes_text_message() {
        let message = into_message(Frame::text("hi")).unwrap();
        assert!(matches!(message, Message::Text(ref t) if t.as_str() == "hi"));
    }

    #[test]
    fn test_binary_frame_becomes_binary_message() {
        let message = into_message(Frame::binary(vec![0x81u8, 0xa1])).unwrap();
        assert!(matches!(message, Message::Binary(ref b) if b[..] == [0x81u8, 0xa1]));
    }

    #[test]
    fn test_invalid_utf8_text_frame_rejected() {
        assert!(matches!(
            into_message(Frame::text(vec![0xffu8])),
            Err(RpcError::InvalidFrame(_))
        ));
    }

    #[test]
    fn test_control_messages_are_swallowed() {
        assert!(from_message(Ok(Message::Ping(Bytes::new()))).is_none());
        assert!(from_message(Ok(Message::Pong(Bytes::new()))).is_none());
    }

    #[test]
    fn test_close_message_is_closure() {
        assert!(matches!(
            from_message(Ok(Message::Close(None))),
            Some(Err(RpcError::ConnectionClosed))
        ));
    }

    #[test]
    fn test_data_messages_keep_kind() {
        let text = from_message(Ok(Message::Text("x".into()))).unwrap().unwrap();
        assert_eq!(text.kind(), FrameKind::Text);
        let binary = from_message(Ok(Message::Binary(Bytes::from_static(b"y"))))
            .unwrap()
            .unwrap();
        assert_eq!(binary.kind(), FrameKind::Binary);
    }
}
