use async_trait::async_trait;
use std::error::Error;

use crate::envelope::ClientId;

pub type HookResult = Result<(), Box<dyn Error + Send + Sync>>;

// ============================================================================
// Payloads
// ============================================================================

pub struct OnRoomCreatedPayload<'a> {
    pub room_id: &'a str,
    pub capacity: usize,
}

pub struct OnPeerJoinedPayload<'a> {
    pub room_id: &'a str,
    pub client_id: ClientId,
    /// The peer claimed ownership of the room on joining.
    pub is_owner: bool,
    pub peer_count: usize,
}

pub struct OnPeerLeftPayload<'a> {
    pub room_id: &'a str,
    pub client_id: ClientId,
    pub was_owner: bool,
    /// Members still in the room; `0` means the room is being closed.
    pub peer_count: usize,
}

// ============================================================================
// Hook Trait
// ============================================================================

/// Observer of room lifecycle events, e.g. for metrics or audit logs.
///
/// Hooks run on their own tasks and cannot veto anything; errors are ignored.
#[async_trait]
pub trait Hook: Send + Sync {
    /// Called when a room id is first claimed.
    async fn on_room_created(&self, _payload: OnRoomCreatedPayload<'_>) -> HookResult { Ok(()) }

    /// Called after a peer has been admitted.
    async fn on_peer_joined(&self, _payload: OnPeerJoinedPayload<'_>) -> HookResult { Ok(()) }

    /// Called after a peer has been removed from its room.
    async fn on_peer_left(&self, _payload: OnPeerLeftPayload<'_>) -> HookResult { Ok(()) }

    /// Called once a room has emptied and left the registry.
    fn after_room_closed(&self, _room_id: &str) {}
}
