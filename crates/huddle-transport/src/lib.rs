//! # huddle-transport
//!
//! Connection lifecycle for the Huddle chat hub.
//!
//! Each connected socket is driven by two independent pumps:
//!
//! - **read pump** - decodes client frames, tags them with the
//!   connection's identity and submits them to the hub
//! - **write pump** - drains the client's outbound queue to the socket and
//!   keeps the connection alive with pings
//!
//! Pumps work over any `Sink`/`Stream` of [`WireFrame`]s. The `websocket`
//! feature adds an adaptor for axum WebSockets.
//!
//! ```rust,ignore
//! use huddle_transport::{websocket, Connection, PumpConfig};
//!
//! async fn attach(socket: WebSocket, hub: HubHandle, user: String, room: String) {
//!     let session = hub.join(user, room).await?;
//!     let (sink, stream) = websocket::split(socket);
//!     Connection::new(session, hub, PumpConfig::default()).run(sink, stream).await;
//! }
//! ```

pub mod frame;
pub mod pump;

#[cfg(feature = "websocket")]
pub mod websocket;

pub use frame::{TransportError, WireFrame};
pub use pump::{read_pump, write_pump, Connection, DisconnectReason, Identity, PumpConfig};
