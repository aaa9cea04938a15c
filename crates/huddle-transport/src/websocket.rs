//! WebSocket adaptor.
//!
//! Splits an upgraded axum [`WebSocket`] into a frame sink and a frame
//! stream that the pumps can drive.

use crate::frame::{TransportError, WireFrame};
use axum::extract::ws::{Message, WebSocket};
use bytes::Bytes;
use futures_util::{future, Sink, SinkExt, Stream, StreamExt};

/// Split a WebSocket into its write and read halves.
///
/// Closing the write half runs the close handshake: it sends a close frame,
/// or flushes the reply to a close the peer already sent.
pub fn split(
    socket: WebSocket,
) -> (
    impl Sink<WireFrame, Error = TransportError> + Send + Unpin + 'static,
    impl Stream<Item = Result<WireFrame, TransportError>> + Send + Unpin + 'static,
) {
    let (sink, stream) = socket.split();

    let sink = sink
        .sink_map_err(|e| TransportError::SendFailed(e.to_string()))
        .with(|frame: WireFrame| future::ready(Ok::<_, TransportError>(into_message(frame))));

    let stream = stream.map(|item| {
        item.map(from_message)
            .map_err(|e| TransportError::ReceiveFailed(e.to_string()))
    });

    (sink, stream)
}

fn into_message(frame: WireFrame) -> Message {
    match frame {
        WireFrame::Text(text) => Message::Text(text),
        WireFrame::Binary(data) => Message::Binary(data.to_vec()),
        WireFrame::Ping(data) => Message::Ping(data.to_vec()),
        WireFrame::Pong(data) => Message::Pong(data.to_vec()),
        WireFrame::Close => Message::Close(None),
    }
}

fn from_message(message: Message) -> WireFrame {
    match message {
        Message::Text(text) => WireFrame::Text(text),
        Message::Binary(data) => WireFrame::Binary(Bytes::from(data)),
        Message::Ping(data) => WireFrame::Ping(Bytes::from(data)),
        Message::Pong(data) => WireFrame::Pong(Bytes::from(data)),
        Message::Close(_) => WireFrame::Close,
    }
}
