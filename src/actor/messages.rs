use crate::actor::room::{Outbound, RoomRef};
use crate::envelope::{ClientId, Event};

pub struct ResolveRoom {
    pub id: String,
    pub secret: String,
}

pub struct AdmitClient {
    pub client: ClientId,
    pub room: RoomRef,
    pub outbound: Outbound,
}

pub struct RemoveClient {
    pub client: ClientId,
    pub room: RoomRef,
}

pub struct DispatchEvent {
    pub from: ClientId,
    pub room: RoomRef,
    pub event: Event,
}

pub struct ListRoomIds;

pub struct GetRoomInfo(pub String);

/// Sent to itself once a new room's admission window has passed.
pub struct ReapUnclaimed(pub RoomRef);
