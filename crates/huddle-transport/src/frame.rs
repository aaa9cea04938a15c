//! Transport-agnostic frames and errors.
//!
//! The pumps speak [`WireFrame`] over any `Sink`/`Stream` pair, so a
//! connection can be driven by a WebSocket or by an in-memory channel.

use bytes::Bytes;
use thiserror::Error;

/// A single frame on a message-oriented socket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WireFrame {
    /// UTF-8 text frame.
    Text(String),
    /// Binary frame.
    Binary(Bytes),
    /// Keepalive ping.
    Ping(Bytes),
    /// Keepalive pong.
    Pong(Bytes),
    /// Close frame.
    Close,
}

/// Transport errors.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Connection was closed.
    #[error("Connection closed")]
    ConnectionClosed,

    /// A deadline expired.
    #[error("Connection timed out")]
    Timeout,

    /// Failed to send data.
    #[error("Send failed: {0}")]
    SendFailed(String),

    /// Failed to receive data.
    #[error("Receive failed: {0}")]
    ReceiveFailed(String),

    /// Protocol error.
    #[error("Protocol error: {0}")]
    Protocol(#[from] huddle_protocol::ProtocolError),
}
