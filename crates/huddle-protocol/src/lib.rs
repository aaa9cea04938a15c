//! # huddle-protocol
//!
//! Wire protocol definitions for the Huddle chat hub.
//!
//! Frames are JSON objects of the shape
//! `{ "type", "room", "user_id", "content" }`:
//!
//! - `message` - application payload fanned out to a room
//! - `join` / `leave` - presence announcements emitted by the hub
//!
//! An empty `room` addresses every connected client.
//!
//! ## Example
//!
//! ```rust
//! use huddle_protocol::{codec, Envelope};
//!
//! let env = Envelope::message("lobby", "alice", serde_json::json!("hi"));
//! let text = codec::encode(&env).unwrap();
//! let inbound = codec::decode(text.as_bytes()).unwrap();
//! assert_eq!(inbound.content, serde_json::json!("hi"));
//! ```

pub mod codec;
pub mod envelope;

pub use codec::{decode, encode, ProtocolError, MAX_FRAME_SIZE};
pub use envelope::{Envelope, Inbound, MessageKind};
