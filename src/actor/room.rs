use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc::{self, error::TrySendError};

use crate::envelope::{ClientId, Envelope};

/// Producer side of an endpoint's outbound queue. Held only by the room the
/// endpoint is a member of; dropping it closes the queue.
pub type Outbound = mpsc::Sender<Envelope>;

/// Address of one live room instance.
///
/// A room that empties is gone for good; a later room under the same id gets
/// a fresh `key`, so stale references never reach it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RoomRef {
    id: Arc<str>,
    key: u64,
}

impl RoomRef {
    pub fn id(&self) -> &str { &self.id }
}

/// Who may distribute state in a room. Ownership never moves once claimed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Ownership {
    Unclaimed,
    Held(ClientId),
    Departed,
}

/// Read-only view of a room for status queries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RoomInfo {
    pub id: String,
    pub capacity: usize,
    pub members: usize,
    pub owner: Option<ClientId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Delivery {
    Queued,
    /// Target is not a member (anymore).
    Gone,
    /// Target's queue is full; the envelope was not queued.
    Full,
}

/// How an insert went.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Joined {
    /// First member; it now owns the room.
    Owner,
    Member,
    /// Already a member. The offered queue was dropped.
    AlreadyMember,
}

pub(crate) struct Room {
    id: Arc<str>,
    key: u64,
    secret: String,
    capacity: usize,
    members: HashMap<ClientId, Outbound>,
    ownership: Ownership,
}

impl Room {
    pub(crate) fn new(id: Arc<str>, key: u64, secret: String, capacity: usize) -> Self {
        Self { id, key, secret, capacity, members: HashMap::new(), ownership: Ownership::Unclaimed }
    }

    pub(crate) fn handle(&self) -> RoomRef {
        RoomRef { id: Arc::clone(&self.id), key: self.key }
    }

    pub(crate) fn id(&self) -> &Arc<str> { &self.id }

    pub(crate) fn is(&self, room: &RoomRef) -> bool { self.key == room.key }

    pub(crate) fn secret_matches(&self, secret: &str) -> bool { self.secret == secret }

    pub(crate) fn owner(&self) -> Option<ClientId> {
        match self.ownership {
            Ownership::Held(owner) => Some(owner),
            Ownership::Unclaimed | Ownership::Departed => None,
        }
    }

    pub(crate) fn is_owner(&self, client: ClientId) -> bool { self.owner() == Some(client) }

    pub(crate) fn contains(&self, client: ClientId) -> bool { self.members.contains_key(&client) }

    pub(crate) fn len(&self) -> usize { self.members.len() }

    pub(crate) fn member_ids(&self) -> impl Iterator<Item = ClientId> + '_ {
        self.members.keys().copied()
    }

    /// Adds a member. An existing member keeps its original queue.
    pub(crate) fn insert(&mut self, client: ClientId, outbound: Outbound) -> Joined {
        if self.members.contains_key(&client) { return Joined::AlreadyMember; }
        self.members.insert(client, outbound);
        if self.ownership == Ownership::Unclaimed {
            self.ownership = Ownership::Held(client);
            return Joined::Owner;
        }
        Joined::Member
    }

    /// Removes a member and hands back its queue, or `None` if it was not here.
    pub(crate) fn remove(&mut self, client: ClientId) -> Option<Outbound> {
        let outbound = self.members.remove(&client)?;
        if self.ownership == Ownership::Held(client) {
            self.ownership = Ownership::Departed;
        }
        Some(outbound)
    }

    pub(crate) fn deliver(&self, to: ClientId, envelope: Envelope) -> Delivery {
        let Some(outbound) = self.members.get(&to) else { return Delivery::Gone };
        match outbound.try_send(envelope) {
            Ok(()) => Delivery::Queued,
            Err(TrySendError::Full(_)) => Delivery::Full,
            Err(TrySendError::Closed(_)) => Delivery::Gone,
        }
    }

    pub(crate) fn info(&self) -> RoomInfo {
        RoomInfo { id: self.id.to_string(), capacity: self.capacity, members: self.len(), owner: self.owner() }
    }
}
