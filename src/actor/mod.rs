mod hub;
mod room;
mod dispatch;
pub(crate) mod messages;

pub(crate) use hub::HubActor;
pub(crate) use messages::{AdmitClient, DispatchEvent, GetRoomInfo, ListRoomIds, RemoveClient, ResolveRoom};
pub use room::{Outbound, RoomInfo, RoomRef};
