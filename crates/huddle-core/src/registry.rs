//! Client and room registry.
//!
//! The registry is plain data. The hub's owner task is its only writer;
//! readers go through the hub's shared lock.

use crate::client::{ClientEntry, ClientKey};
use crate::room::RoomId;
use crate::slots::SlotTable;
use std::collections::{HashMap, HashSet};
use tracing::debug;

/// Result of inserting a client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Inserted {
    /// Handle for the new client.
    pub key: ClientKey,
    /// Whether this client brought its room into existence.
    pub room_opened: bool,
}

/// Result of removing a client.
#[derive(Debug)]
pub struct Removed {
    /// The removed entry. Dropping it closes the client's outbound queue.
    pub entry: ClientEntry,
    /// Whether the client was the last member of its room.
    pub room_closed: bool,
}

/// All registered clients and their room membership.
///
/// A room id is present in the registry iff it has at least one member.
#[derive(Debug, Default)]
pub struct Registry {
    clients: SlotTable<ClientEntry>,
    rooms: HashMap<RoomId, HashSet<ClientKey>>,
}

impl Registry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a client, creating its room bucket if needed.
    pub fn insert(&mut self, entry: ClientEntry) -> Inserted {
        let room = entry.room().to_string();
        let key = self.clients.insert(entry);

        if room.is_empty() {
            return Inserted {
                key,
                room_opened: false,
            };
        }

        let members = self.rooms.entry(room).or_default();
        let room_opened = members.is_empty();
        members.insert(key);

        Inserted { key, room_opened }
    }

    /// Unregister a client, deleting its room bucket if it becomes empty.
    ///
    /// Returns `None` if `key` is not registered.
    pub fn remove(&mut self, key: ClientKey) -> Option<Removed> {
        let entry = self.clients.remove(key)?;
        let mut room_closed = false;

        if let Some(members) = self.rooms.get_mut(entry.room()) {
            members.remove(&key);
            if members.is_empty() {
                self.rooms.remove(entry.room());
                room_closed = true;
                debug!(room = %entry.room(), "Deleted empty room");
            }
        }

        Some(Removed { entry, room_closed })
    }

    /// Remove every client, returning their entries.
    pub fn clear(&mut self) -> Vec<ClientEntry> {
        self.rooms.clear();
        self.clients.drain()
    }

    /// Look up a client.
    #[must_use]
    pub fn get(&self, key: ClientKey) -> Option<&ClientEntry> {
        self.clients.get(key)
    }

    /// Iterate over all clients.
    pub fn clients(&self) -> impl Iterator<Item = (ClientKey, &ClientEntry)> {
        self.clients.iter()
    }

    /// Iterate over the members of `room`.
    pub fn members<'a>(
        &'a self,
        room: &str,
    ) -> impl Iterator<Item = (ClientKey, &'a ClientEntry)> + 'a {
        self.rooms
            .get(room)
            .into_iter()
            .flatten()
            .filter_map(|key| self.clients.get(*key).map(|entry| (*key, entry)))
    }

    /// User ids of the members of `room`.
    #[must_use]
    pub fn roster(&self, room: &str) -> Vec<String> {
        self.members(room)
            .map(|(_, entry)| entry.user_id().to_string())
            .collect()
    }

    /// Keys of every client belonging to `user_id`.
    #[must_use]
    pub fn keys_for_user(&self, user_id: &str) -> Vec<ClientKey> {
        self.clients
            .iter()
            .filter(|(_, entry)| entry.user_id() == user_id)
            .map(|(key, _)| key)
            .collect()
    }

    /// Number of members in `room`.
    #[must_use]
    pub fn member_count(&self, room: &str) -> usize {
        self.rooms.get(room).map(HashSet::len).unwrap_or(0)
    }

    /// Whether `room` currently exists.
    #[must_use]
    pub fn contains_room(&self, room: &str) -> bool {
        self.rooms.contains_key(room)
    }

    /// Number of registered clients.
    #[must_use]
    pub fn client_count(&self) -> usize {
        self.clients.len()
    }

    /// Number of live rooms.
    #[must_use]
    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    /// Ids of all live rooms.
    #[must_use]
    pub fn room_ids(&self) -> Vec<RoomId> {
        self.rooms.keys().cloned().collect()
    }
}
