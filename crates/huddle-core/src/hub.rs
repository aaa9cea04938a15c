//! The hub: single owner of the client registry and of message fanout.
//!
//! All mutations happen inside [`Hub::run`], which drains three intake
//! queues (joins, leaves, messages) one event per iteration. Queries made
//! through a [`HubHandle`] read the registry under a shared lock that the
//! owner task takes in write mode around each mutation.
//!
//! ```text
//!  join ──┐
//! leave ──┼──▶ owner task ──▶ registry (RwLock) ◀── queries
//!   msg ──┘        │
//!                  ▼
//!        client outbound queues
//! ```

use crate::client::{ClientEntry, ClientKey, ClientSession, DEFAULT_OUTBOUND_CAPACITY};
use crate::registry::Registry;
use crate::room::{validate_room_id, RoomId};
use huddle_protocol::Envelope;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use thiserror::Error;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, trace, warn};

/// Hub errors.
#[derive(Debug, Error)]
pub enum HubError {
    /// The owner task has stopped.
    #[error("Hub is not running")]
    Closed,

    /// Invalid room id.
    #[error("Invalid room id: {0}")]
    InvalidRoom(&'static str),
}

/// Hub configuration.
#[derive(Debug, Clone)]
pub struct HubConfig {
    /// Capacity of each client's outbound queue.
    pub client_queue_capacity: usize,
    /// Capacity of the join intake queue.
    pub join_queue_capacity: usize,
    /// Capacity of the message intake queue.
    pub message_queue_capacity: usize,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            client_queue_capacity: DEFAULT_OUTBOUND_CAPACITY,
            join_queue_capacity: 64,
            message_queue_capacity: 256,
        }
    }
}

/// Hub statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HubStats {
    /// Number of live rooms.
    pub room_count: usize,
    /// Number of registered clients.
    pub client_count: usize,
    /// Clients evicted for a full or closed outbound queue since start.
    pub evictions: u64,
}

/// State shared between the owner task and its handles.
#[derive(Debug, Default)]
struct Shared {
    registry: RwLock<Registry>,
    evictions: AtomicU64,
}

impl Shared {
    fn read(&self) -> RwLockReadGuard<'_, Registry> {
        self.registry.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Registry> {
        self.registry.write().unwrap_or_else(PoisonError::into_inner)
    }
}

struct JoinRequest {
    user_id: String,
    room: RoomId,
    reply: oneshot::Sender<ClientSession>,
}

/// Work the owner task schedules for itself while handling an event.
#[derive(Debug)]
enum Effect {
    Leave(ClientKey),
    Fanout(Arc<Envelope>),
}

/// The hub owner task.
///
/// Create with [`Hub::new`] and drive with [`Hub::run`], or use
/// [`Hub::spawn`] to do both.
pub struct Hub {
    config: HubConfig,
    shared: Arc<Shared>,
    joins: mpsc::Receiver<JoinRequest>,
    leaves: mpsc::UnboundedReceiver<ClientKey>,
    messages: mpsc::Receiver<Arc<Envelope>>,
    pending: VecDeque<Effect>,
}

impl Hub {
    /// Create a hub and the first handle to it.
    #[must_use]
    pub fn new(config: HubConfig) -> (Self, HubHandle) {
        let (join_tx, joins) = mpsc::channel(config.join_queue_capacity);
        let (leave_tx, leaves) = mpsc::unbounded_channel();
        let (message_tx, messages) = mpsc::channel(config.message_queue_capacity);
        let shared = Arc::new(Shared::default());

        let handle = HubHandle {
            joins: join_tx,
            leaves: leave_tx,
            messages: message_tx,
            shared: Arc::clone(&shared),
        };

        let hub = Self {
            config,
            shared,
            joins,
            leaves,
            messages,
            pending: VecDeque::new(),
        };

        (hub, handle)
    }

    /// Create a hub and spawn its owner task on the current runtime.
    #[must_use]
    pub fn spawn(config: HubConfig) -> HubHandle {
        let (hub, handle) = Self::new(config);
        tokio::spawn(hub.run());
        handle
    }

    /// Run the owner loop until every handle has been dropped.
    pub async fn run(mut self) {
        info!("Hub started with config: {:?}", self.config);

        loop {
            tokio::select! {
                Some(request) = self.joins.recv() => self.handle_join(request),
                Some(key) = self.leaves.recv() => self.handle_leave(key),
                Some(envelope) = self.messages.recv() => self.fanout(envelope),
                else => break,
            }
            self.drain_pending();
        }

        let closed = self.shared.write().clear();
        info!(clients = closed.len(), "Hub stopped");
    }

    fn drain_pending(&mut self) {
        while let Some(effect) = self.pending.pop_front() {
            match effect {
                Effect::Leave(key) => self.handle_leave(key),
                Effect::Fanout(envelope) => self.fanout(envelope),
            }
        }
    }

    fn handle_join(&mut self, request: JoinRequest) {
        let JoinRequest {
            user_id,
            room,
            reply,
        } = request;

        let (tx, rx) = mpsc::channel(self.config.client_queue_capacity);
        let inserted = self
            .shared
            .write()
            .insert(ClientEntry::new(user_id.clone(), room.clone(), tx));
        let key = inserted.key;

        if inserted.room_opened {
            debug!(room = %room, "Created room");
        }
        info!(client = %key, user = %user_id, room = %room, "Client registered");

        if !room.is_empty() {
            self.pending.push_back(Effect::Fanout(Arc::new(Envelope::join(
                room.clone(),
                user_id.clone(),
            ))));
        }

        let session = ClientSession {
            key,
            user_id,
            room,
            outbound: rx,
        };
        if reply.send(session).is_err() {
            debug!(client = %key, "Join requester went away");
            self.pending.push_back(Effect::Leave(key));
        }
    }

    fn handle_leave(&mut self, key: ClientKey) {
        let Some(removed) = self.shared.write().remove(key) else {
            trace!(client = %key, "Leave for unregistered client ignored");
            return;
        };

        let entry = removed.entry;
        if removed.room_closed {
            debug!(room = %entry.room(), "Deleted room");
        }
        info!(
            client = %key,
            user = %entry.user_id(),
            room = %entry.room(),
            "Client unregistered"
        );

        if !entry.room().is_empty() {
            self.pending.push_back(Effect::Fanout(Arc::new(Envelope::leave(
                entry.room(),
                entry.user_id(),
            ))));
        }

        // Dropping the entry closes the outbound queue.
        drop(entry);
    }

    fn fanout(&mut self, envelope: Arc<Envelope>) {
        let mut delivered = 0usize;
        let mut rejected = Vec::new();

        {
            let registry = self.shared.read();
            let mut offer = |key: ClientKey, entry: &ClientEntry| {
                match entry.outbound().try_send(Arc::clone(&envelope)) {
                    Ok(()) => delivered += 1,
                    Err(TrySendError::Full(_)) => {
                        warn!(client = %key, user = %entry.user_id(), "Outbound queue full, evicting");
                        rejected.push(key);
                    }
                    Err(TrySendError::Closed(_)) => {
                        debug!(client = %key, user = %entry.user_id(), "Outbound queue closed, evicting");
                        rejected.push(key);
                    }
                }
            };

            if envelope.is_broadcast() {
                for (key, entry) in registry.clients() {
                    offer(key, entry);
                }
            } else if registry.contains_room(&envelope.room) {
                for (key, entry) in registry.members(&envelope.room) {
                    offer(key, entry);
                }
            } else {
                trace!(room = %envelope.room, kind = %envelope.kind, "Fanout to empty room dropped");
            }
        }

        trace!(
            room = %envelope.room,
            kind = %envelope.kind,
            recipients = delivered,
            evicted = rejected.len(),
            "Fanout"
        );

        for key in rejected {
            self.shared.evictions.fetch_add(1, Ordering::Relaxed);
            self.pending.push_back(Effect::Leave(key));
        }
    }
}

/// Cloneable handle for submitting work to the hub and querying its state.
#[derive(Clone)]
pub struct HubHandle {
    joins: mpsc::Sender<JoinRequest>,
    leaves: mpsc::UnboundedSender<ClientKey>,
    messages: mpsc::Sender<Arc<Envelope>>,
    shared: Arc<Shared>,
}

impl HubHandle {
    /// Register a client and wait until the owner task has added it.
    ///
    /// An empty `room` registers the client without room membership.
    ///
    /// # Errors
    ///
    /// Returns an error if the room id is invalid or the hub has stopped.
    pub async fn join(
        &self,
        user_id: impl Into<String>,
        room: impl Into<RoomId>,
    ) -> Result<ClientSession, HubError> {
        let room = room.into();
        if !room.is_empty() {
            validate_room_id(&room).map_err(HubError::InvalidRoom)?;
        }

        let (reply, session) = oneshot::channel();
        self.joins
            .send(JoinRequest {
                user_id: user_id.into(),
                room,
                reply,
            })
            .await
            .map_err(|_| HubError::Closed)?;

        session.await.map_err(|_| HubError::Closed)
    }

    /// Request unregistration of a client.
    ///
    /// Unknown or already removed clients are ignored by the hub.
    pub fn leave(&self, key: ClientKey) {
        if self.leaves.send(key).is_err() {
            trace!(client = %key, "Leave after hub stopped");
        }
    }

    /// Submit an envelope for fanout.
    ///
    /// # Errors
    ///
    /// Returns an error if the hub has stopped.
    pub async fn submit(&self, envelope: Envelope) -> Result<(), HubError> {
        self.messages
            .send(Arc::new(envelope))
            .await
            .map_err(|_| HubError::Closed)
    }

    /// Request unregistration of every client of `user_id`.
    ///
    /// Returns the number of clients scheduled for removal.
    pub fn disconnect_user(&self, user_id: &str) -> usize {
        let keys = self.shared.read().keys_for_user(user_id);
        for key in &keys {
            self.leave(*key);
        }
        debug!(user = %user_id, sessions = keys.len(), "Disconnect requested");
        keys.len()
    }

    /// Whether the owner task has stopped.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.messages.is_closed()
    }

    /// User ids of the members of `room`.
    #[must_use]
    pub fn roster(&self, room: &str) -> Vec<String> {
        self.shared.read().roster(room)
    }

    /// Number of members in `room`.
    #[must_use]
    pub fn member_count(&self, room: &str) -> usize {
        self.shared.read().member_count(room)
    }

    /// Whether `room` currently has members.
    #[must_use]
    pub fn room_exists(&self, room: &str) -> bool {
        self.shared.read().contains_room(room)
    }

    /// Ids of all live rooms.
    #[must_use]
    pub fn rooms(&self) -> Vec<RoomId> {
        self.shared.read().room_ids()
    }

    /// Number of registered clients.
    #[must_use]
    pub fn client_count(&self) -> usize {
        self.shared.read().client_count()
    }

    /// Number of live rooms.
    #[must_use]
    pub fn room_count(&self) -> usize {
        self.shared.read().room_count()
    }

    /// Get hub statistics.
    #[must_use]
    pub fn stats(&self) -> HubStats {
        let registry = self.shared.read();
        HubStats {
            room_count: registry.room_count(),
            client_count: registry.client_count(),
            evictions: self.shared.evictions.load(Ordering::Relaxed),
        }
    }
}
