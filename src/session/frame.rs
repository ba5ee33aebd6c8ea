//! Websocket frame seam.
//!
//! Sessions read and write [`Frame`]s through [`FrameSource`] and
//! [`FrameSink`] so the protocol logic runs against warp websockets in
//! production and against in-memory channels in tests.

use bytes::Bytes;
use futures::stream::SplitSink;
use futures::stream::SplitStream;
use futures::SinkExt;
use futures::StreamExt;
#[cfg(test)]
use mockall::automock;
use tokio::sync::mpsc;
use tonic::async_trait;
use warp::ws::Message;
use warp::ws::WebSocket;

use crate::SessionError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Text(String),
    Binary(Bytes),
    Ping(Bytes),
    Pong(Bytes),
    Close,
}

#[cfg_attr(test, automock)]
#[async_trait]
pub trait FrameSink: Send + 'static {
    async fn send(
        &mut self,
        frame: Frame,
    ) -> Result<(), SessionError>;
}

#[async_trait]
pub trait FrameSource: Send + 'static {
    /// Next frame, or `None` once the peer is gone
    async fn next_frame(&mut self) -> Option<Result<Frame, SessionError>>;
}

/// Write half of a warp websocket
pub struct WsSink(pub SplitSink<WebSocket, Message>);

/// Read half of a warp websocket
pub struct WsSource(pub SplitStream<WebSocket>);

/// Splits an upgraded websocket into its frame halves
pub fn split_websocket(ws: WebSocket) -> (WsSink, WsSource) {
    let (sink, source) = ws.split();
    (WsSink(sink), WsSource(source))
}

#[async_trait]
impl FrameSink for WsSink {
    async fn send(
        &mut self,
        frame: Frame,
    ) -> Result<(), SessionError> {
        let message = match frame {
            Frame::Text(text) => Message::text(text),
            Frame::Binary(bytes) => Message::binary(bytes.to_vec()),
            Frame::Ping(bytes) => Message::ping(bytes.to_vec()),
            Frame::Pong(bytes) => Message::pong(bytes.to_vec()),
            Frame::Close => Message::close(),
        };
        self.0
            .send(message)
            .await
            .map_err(|e| SessionError::Transport(e.to_string()))
    }
}

#[async_trait]
impl FrameSource for WsSource {
    async fn next_frame(&mut self) -> Option<Result<Frame, SessionError>> {
        let message = match self.0.next().await? {
            Ok(message) => message,
            Err(e) => return Some(Err(SessionError::Transport(e.to_string()))),
        };

        let frame = if message.is_close() {
            Frame::Close
        } else if message.is_ping() {
            Frame::Ping(Bytes::from(message.into_bytes()))
        } else if message.is_pong() {
            Frame::Pong(Bytes::from(message.into_bytes()))
        } else if message.is_text() {
            match message.to_str() {
                Ok(text) => Frame::Text(text.to_string()),
                Err(()) => return Some(Err(SessionError::MalformedFrame("text frame is not utf-8".into()))),
            }
        } else {
            Frame::Binary(Bytes::from(message.into_bytes()))
        };
        Some(Ok(frame))
    }
}

/// Channel-backed sink used by embedded callers and tests
pub struct ChannelSink(pub mpsc::UnboundedSender<Frame>);

#[async_trait]
impl FrameSink for ChannelSink {
    async fn send(
        &mut self,
        frame: Frame,
    ) -> Result<(), SessionError> {
        self.0.send(frame).map_err(|_| SessionError::Closed)
    }
}

/// Channel-backed source used by embedded callers and tests
pub struct ChannelSource(pub mpsc::UnboundedReceiver<Frame>);

#[async_trait]
impl FrameSource for ChannelSource {
    async fn next_frame(&mut self) -> Option<Result<Frame, SessionError>> {
        self.0.recv().await.map(Ok)
    }
}

/// Connected pair of in-memory frame endpoints: what the control plane
/// writes shows up on the returned receiver, and frames sent on the
/// returned sender are read by the control plane.
pub fn channel_pair() -> (ChannelSink, ChannelSource, mpsc::UnboundedReceiver<Frame>, mpsc::UnboundedSender<Frame>) {
    let (out_tx, out_rx) = mpsc::unbounded_channel();
    let (in_tx, in_rx) = mpsc::unbounded_channel();
    (ChannelSink(out_tx), ChannelSource(in_rx), out_rx, in_tx)
}
