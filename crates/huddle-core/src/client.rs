//! Connected clients.

use crate::room::RoomId;
use crate::slots::Key;
use huddle_protocol::Envelope;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Default capacity of a client's outbound queue.
pub const DEFAULT_OUTBOUND_CAPACITY: usize = 256;

/// Stable handle identifying one registered client.
pub type ClientKey = Key;

/// Sending half of a client's outbound queue.
pub type Outbound = mpsc::Sender<Arc<Envelope>>;

/// Registry entry for a client.
///
/// The entry holds the only sender of the client's outbound queue, so
/// dropping the entry closes the queue.
#[derive(Debug)]
pub struct ClientEntry {
    user_id: String,
    room: RoomId,
    outbound: Outbound,
}

impl ClientEntry {
    /// Create a new entry.
    #[must_use]
    pub fn new(user_id: impl Into<String>, room: impl Into<RoomId>, outbound: Outbound) -> Self {
        Self {
            user_id: user_id.into(),
            room: room.into(),
            outbound,
        }
    }

    /// The client's user id.
    #[must_use]
    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    /// The client's room, empty if it is in no room.
    #[must_use]
    pub fn room(&self) -> &str {
        &self.room
    }

    /// The client's outbound queue.
    #[must_use]
    pub fn outbound(&self) -> &Outbound {
        &self.outbound
    }
}

/// A registered client as seen by its connection.
///
/// Returned by [`HubHandle::join`](crate::HubHandle::join). The `outbound`
/// receiver yields every envelope fanned out to this client and ends once
/// the hub unregisters it.
#[derive(Debug)]
pub struct ClientSession {
    /// Registry handle, used to request unregistration.
    pub key: ClientKey,
    /// Verified user id.
    pub user_id: String,
    /// Room joined at connection time.
    pub room: RoomId,
    /// Receiving half of the outbound queue.
    pub outbound: mpsc::Receiver<Arc<Envelope>>,
}
