//! # huddle-core
//!
//! Presence and broadcast hub for the Huddle chat server.
//!
//! This crate provides:
//!
//! - **Hub** - the single owner task for registry mutation and fanout
//! - **HubHandle** - submission points and read-only queries
//! - **Registry** - all clients plus room membership
//! - **SlotTable** - generation-tagged storage behind client handles
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────┐  join/leave/msg  ┌────────────┐      ┌────────────┐
//! │ Connection │─────────────────▶│    Hub     │─────▶│  Registry  │
//! └────────────┘                  └────────────┘      └────────────┘
//!       ▲                               │                    ▲
//!       │        outbound queue         │                    │ read lock
//!       └───────────────────────────────┘              ┌────────────┐
//!                                                      │  Queries   │
//!                                                      └────────────┘
//! ```

pub mod client;
pub mod hub;
pub mod registry;
pub mod room;
pub mod slots;

pub use client::{ClientEntry, ClientKey, ClientSession};
pub use hub::{Hub, HubConfig, HubError, HubHandle, HubStats};
pub use registry::Registry;
pub use room::{direct_room, validate_room_id, RoomId};
