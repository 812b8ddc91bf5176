use kameo::{
    actor::{Actor, ActorRef},
    error::Infallible,
    message::{Context, Message},
};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::actor::dispatch::{dispatch, Dispatched};
use crate::actor::messages::{AdmitClient, DispatchEvent, GetRoomInfo, ListRoomIds, ReapUnclaimed, RemoveClient, ResolveRoom};
use crate::actor::room::{Joined, Room, RoomInfo, RoomRef};
use crate::config::{Config, OverflowPolicy};
use crate::envelope::{ClientId, Event};
use crate::hooks::{Hook, OnPeerJoinedPayload, OnPeerLeftPayload, OnRoomCreatedPayload};
use crate::hub::AdmissionError;

/// The coordinating task. Every room and every membership change lives here,
/// so admissions, removals and dispatches never interleave.
pub struct HubActor {
    config: Arc<Config>,
    hooks: Arc<Vec<Box<dyn Hook>>>,
    rooms: HashMap<Arc<str>, Room>,
    next_key: u64,
}

impl HubActor {
    pub fn new(config: Arc<Config>, hooks: Vec<Box<dyn Hook>>) -> Self {
        Self { config, hooks: Arc::new(hooks), rooms: HashMap::new(), next_key: 0 }
    }

    fn live_room(&self, room: &RoomRef) -> Option<&Room> {
        self.rooms.get(room.id()).filter(|live| live.is(room))
    }

    fn live_room_mut(&mut self, room: &RoomRef) -> Option<&mut Room> {
        self.rooms.get_mut(room.id()).filter(|live| live.is(room))
    }

    /// Applies the overflow policy and returns the peers to evict.
    fn overflow(&self, room: &RoomRef, dispatched: Dispatched) -> Vec<ClientId> {
        if dispatched.overflowed.is_empty() { return Vec::new(); }
        match self.config.overflow_policy {
            OverflowPolicy::DropNewest => {
                for client in &dispatched.overflowed {
                    warn!(room = %room.id(), %client, "outbound queue full, dropped envelope");
                }
                Vec::new()
            }
            OverflowPolicy::Disconnect => {
                for client in &dispatched.overflowed {
                    warn!(room = %room.id(), %client, "outbound queue full, evicting peer");
                }
                dispatched.overflowed
            }
        }
    }

    /// Removes members one by one. Each removal either closes the room or tells
    /// the remaining members, which may in turn overflow more queues.
    fn evict(&mut self, room_ref: &RoomRef, mut pending: Vec<ClientId>) {
        while let Some(client) = pending.pop() {
            let Some(room) = self.live_room_mut(room_ref) else { return };
            let was_owner = room.is_owner(client);
            if room.remove(client).is_none() { continue; }
            let peer_count = room.len();
            info!(room = %room_ref.id(), %client, peer_count, "peer left");
            self.peer_left(room_ref, client, was_owner, peer_count);

            if peer_count == 0 {
                self.close(room_ref);
                return;
            }
            let Some(room) = self.live_room(room_ref) else { return };
            let dispatched = dispatch(room, client, Event::Disconnect(client));
            pending.extend(self.overflow(room_ref, dispatched));
        }
    }

    /// A room nobody is admitted to within `window` is closed again.
    fn schedule_reap(actor: ActorRef<Self>, room: RoomRef, window: Duration) {
        tokio::spawn(async move { sleep(window).await; let _ = actor.tell(ReapUnclaimed(room)).send().await; });
    }

    fn close(&mut self, room: &RoomRef) {
        self.rooms.remove(room.id());
        info!(room = %room.id(), "room closed");
        for hook in self.hooks.iter() { hook.after_room_closed(room.id()); }
    }

    fn room_created(&self, room: &RoomRef, capacity: usize) {
        if self.hooks.is_empty() { return; }
        let hooks = Arc::clone(&self.hooks);
        let room_id = room.id().to_string();
        tokio::spawn(async move {
            for hook in hooks.iter() {
                let _ = hook.on_room_created(OnRoomCreatedPayload { room_id: &room_id, capacity }).await;
            }
        });
    }

    fn peer_joined(&self, room: &RoomRef, client_id: ClientId, is_owner: bool, peer_count: usize) {
        if self.hooks.is_empty() { return; }
        let hooks = Arc::clone(&self.hooks);
        let room_id = room.id().to_string();
        tokio::spawn(async move {
            for hook in hooks.iter() {
                let _ = hook.on_peer_joined(OnPeerJoinedPayload { room_id: &room_id, client_id, is_owner, peer_count }).await;
            }
        });
    }

    fn peer_left(&self, room: &RoomRef, client_id: ClientId, was_owner: bool, peer_count: usize) {
        if self.hooks.is_empty() { return; }
        let hooks = Arc::clone(&self.hooks);
        let room_id = room.id().to_string();
        tokio::spawn(async move {
            for hook in hooks.iter() {
                let _ = hook.on_peer_left(OnPeerLeftPayload { room_id: &room_id, client_id, was_owner, peer_count }).await;
            }
        });
    }
}

impl Actor for HubActor {
    type Args = Self;
    type Error = Infallible;

    async fn on_start(state: Self::Args, _: ActorRef<Self>) -> Result<Self, Self::Error> { Ok(state) }
}

impl Message<ResolveRoom> for HubActor {
    type Reply = Result<RoomRef, AdmissionError>;

    async fn handle(&mut self, msg: ResolveRoom, ctx: &mut Context<Self, Self::Reply>) -> Self::Reply {
        if let Some(room) = self.rooms.get(msg.id.as_str()) {
            if !room.secret_matches(&msg.secret) {
                info!(room = %msg.id, "secret mismatch");
                return Err(AdmissionError::WrongSecret);
            }
            return Ok(room.handle());
        }

        let id: Arc<str> = msg.id.into();
        let key = self.next_key;
        self.next_key += 1;
        let capacity = self.config.room_capacity;
        let room = Room::new(Arc::clone(&id), key, msg.secret, capacity);
        let handle = room.handle();
        self.rooms.insert(id, room);
        info!(room = %handle.id(), capacity, "room created");
        self.room_created(&handle, capacity);
        Self::schedule_reap(ctx.actor_ref().clone(), handle.clone(), self.config.admission_window);
        Ok(handle)
    }
}

impl Message<AdmitClient> for HubActor {
    type Reply = Result<(), AdmissionError>;

    async fn handle(&mut self, msg: AdmitClient, _: &mut Context<Self, Self::Reply>) -> Self::Reply {
        let AdmitClient { client, room: room_ref, outbound } = msg;
        let Some(room) = self.live_room_mut(&room_ref) else {
            debug!(room = %room_ref.id(), %client, "room closed before admission");
            return Err(AdmissionError::RoomClosed);
        };

        let is_owner = match room.insert(client, outbound) {
            Joined::Owner => true,
            Joined::Member => false,
            Joined::AlreadyMember => {
                debug!(room = %room_ref.id(), %client, "already a member");
                return Err(AdmissionError::AlreadyMember);
            }
        };
        let peer_count = room.len();
        info!(room = %room_ref.id(), %client, is_owner, peer_count, "peer joined");
        let dispatched = if is_owner { Dispatched::default() } else { dispatch(room, client, Event::Join(client)) };

        self.peer_joined(&room_ref, client, is_owner, peer_count);
        let evicted = self.overflow(&room_ref, dispatched);
        self.evict(&room_ref, evicted);
        Ok(())
    }
}

impl Message<RemoveClient> for HubActor {
    type Reply = ();

    async fn handle(&mut self, msg: RemoveClient, _: &mut Context<Self, Self::Reply>) {
        self.evict(&msg.room, vec![msg.client]);
    }
}

impl Message<DispatchEvent> for HubActor {
    type Reply = ();

    async fn handle(&mut self, msg: DispatchEvent, _: &mut Context<Self, Self::Reply>) {
        if matches!(msg.event, Event::Join(_) | Event::Disconnect(_)) {
            warn!(room = %msg.room.id(), client = %msg.from, "refusing system event from outside the lifecycle");
            return;
        }
        let Some(room) = self.live_room(&msg.room) else { return };
        let event = msg.event.name();
        let dispatched = dispatch(room, msg.from, msg.event);
        debug!(room = %msg.room.id(), client = %msg.from, event, delivered = dispatched.delivered, "dispatched");
        let evicted = self.overflow(&msg.room, dispatched);
        self.evict(&msg.room, evicted);
    }
}

impl Message<ReapUnclaimed> for HubActor {
    type Reply = ();

    async fn handle(&mut self, ReapUnclaimed(room): ReapUnclaimed, _: &mut Context<Self, Self::Reply>) {
        if self.live_room(&room).is_some_and(|live| live.len() == 0) {
            debug!(room = %room.id(), "nobody admitted in time");
            self.close(&room);
        }
    }
}

impl Message<ListRoomIds> for HubActor {
    type Reply = Vec<String>;

    async fn handle(&mut self, _: ListRoomIds, _: &mut Context<Self, Self::Reply>) -> Self::Reply {
        self.rooms.keys().map(|id| id.to_string()).collect()
    }
}

impl Message<GetRoomInfo> for HubActor {
    type Reply = Option<RoomInfo>;

    async fn handle(&mut self, GetRoomInfo(id): GetRoomInfo, _: &mut Context<Self, Self::Reply>) -> Self::Reply {
        self.rooms.get(id.as_str()).map(Room::info)
    }
}
