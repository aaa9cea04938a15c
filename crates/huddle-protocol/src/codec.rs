//! JSON codec for Huddle frames.
//!
//! Each WebSocket frame holds one JSON object. Inbound frames larger than
//! [`MAX_FRAME_SIZE`] are rejected before parsing.

use thiserror::Error;

use crate::envelope::{Envelope, Inbound};

/// Maximum inbound frame size (512 KiB).
pub const MAX_FRAME_SIZE: usize = 512 * 1024;

/// Protocol errors that can occur during encoding/decoding.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Frame exceeds maximum size.
    #[error("Frame size {0} exceeds maximum {MAX_FRAME_SIZE}")]
    FrameTooLarge(usize),

    /// JSON encoding or decoding error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Encode an envelope to a JSON text frame.
///
/// # Errors
///
/// Returns an error if serialization fails.
pub fn encode(envelope: &Envelope) -> Result<String, ProtocolError> {
    Ok(serde_json::to_string(envelope)?)
}

/// Decode a client frame.
///
/// # Errors
///
/// Returns an error if the frame is too large or is not a JSON object of the
/// expected shape.
pub fn decode(data: &[u8]) -> Result<Inbound, ProtocolError> {
    decode_limited(data, MAX_FRAME_SIZE)
}

/// Decode a client frame with an explicit size limit.
///
/// # Errors
///
/// Returns an error if the frame is larger than `limit` or malformed.
pub fn decode_limited(data: &[u8], limit: usize) -> Result<Inbound, ProtocolError> {
    if data.len() > limit {
        return Err(ProtocolError::FrameTooLarge(data.len()));
    }
    Ok(serde_json::from_slice(data)?)
}

/// Decode a server envelope, as a client would.
///
/// # Errors
///
/// Returns an error if the frame is not a valid envelope.
pub fn decode_envelope(data: &[u8]) -> Result<Envelope, ProtocolError> {
    Ok(serde_json::from_slice(data)?)
}
