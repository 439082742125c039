//! In-memory transport backed by unbounded channels.
//!
//! [`pair`] returns a [`Transport`] for the server side and a [`MemoryPeer`]
//! that plays the remote client: frames the peer sends show up on the
//! transport's stream, frames written to the transport's sink show up in
//! [`MemoryPeer::recv`].
//!
//! # Example
//!
//! ```ignore
//! let (transport, mut peer) = Transport::memory();
//! peer.send(Frame::text(r#"{"function":"echo","data":"hi"}"#));
//! tokio::spawn(dispatcher.run(transport));
//! let reply = peer.recv().await.unwrap();
//! ```

use futures::channel::mpsc;
use futures::{SinkExt, StreamExt};

use super::Transport;
use crate::error::{Result, RpcError};
use crate::protocol::Frame;

/// Remote end of an in-memory transport.
pub struct MemoryPeer {
    tx: Option<mpsc::UnboundedSender<Result<Frame>>>,
    rx: mpsc::UnboundedReceiver<Frame>,
}

impl MemoryPeer {
    /// Deliver a frame to the transport's stream.
    ///
    /// Returns `false` once the transport side has been dropped.
    pub fn send(&self, frame: Frame) -> bool {
        self.push(Ok(frame))
    }

    /// Deliver a transport error instead of a frame.
    pub fn fail(&self, error: RpcError) -> bool {
        self.push(Err(error))
    }

    /// Receive the next frame the transport wrote, or `None` once it closed.
    pub async fn recv(&mut self) -> Option<Frame> {
        self.rx.next().await
    }

    /// Close the inbound side, as a peer hanging up would.
    pub fn close(&mut self) {
        self.tx = None;
    }

    fn push(&self, item: Result<Frame>) -> bool {
        match &self.tx {
            Some(tx) => tx.unbounded_send(item).is_ok(),
            None => false,
        }
    }
}

/// Create a connected transport/peer pair.
pub fn pair() -> (Transport, MemoryPeer) {
    let (inbound_tx, inbound_rx) = mpsc::unbounded::<Result<Frame>>();
    let (outbound_tx, outbound_rx) = mpsc::unbounded::<Frame>();

    let sink = outbound_tx.sink_map_err(|_| RpcError::ConnectionClosed);
    let transport = Transport::new(sink, inbound_rx);

    let peer = MemoryPeer {
        tx: Some(inbound_tx),
        rx: outbound_rx,
    };
    (transport, peer)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_frames_flow_both_ways() {
        let (transport, mut peer) = pair();
        let (mut sink, mut stream) = transport.into_parts();

        assert!(peer.send(Frame::text("ping")));
        let inbound = stream.next().await.unwrap().unwrap();
        assert_eq!(inbound.payload(), b"ping");

        sink.send(Frame::binary(vec![1u8, 2])).await.unwrap();
        let outbound = peer.recv().await.unwrap();
        assert_eq!(outbound.payload(), &[1, 2]);
    }

    #[tokio::test]
    async fn test_peer_close_ends_stream() {
        let (transport, mut peer) = pair();
        let (_sink, mut stream) = transport.into_parts();

        peer.close();
        assert!(stream.next().await.is_none());
        assert!(!peer.send(Frame::text("late")));
    }

    #[tokio::test]
    async fn test_send_after_peer_dropped_fails() {
        let (transport, peer) = pair();
        let (mut sink, _stream) = transport.into_parts();
        drop(peer);

        let err = sink.send(Frame::text("x")).await.unwrap_err();
        assert!(err.is_closed());
    }

    #[tokio::test]
    async fn test_fail_surfaces_error() {
        let (transport, peer) = pair();
        let (_sink, mut stream) = transport.into_parts();

        peer.fail(RpcError::InvalidFrame("bad".into()));
        assert!(matches!(
            stream.next().await,
            Some(Err(RpcError::InvalidFrame(_)))
        ));
    }
}
