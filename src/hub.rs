use kameo::actor::ActorRef;
use kameo::Actor;
use kameo::error::SendError;
use std::sync::Arc;
use thiserror::Error;

use crate::actor::{AdmitClient, DispatchEvent, GetRoomInfo, HubActor, ListRoomIds, RemoveClient, ResolveRoom};
use crate::actor::{Outbound, RoomInfo, RoomRef};
use crate::config::Config;
use crate::envelope::{ClientId, Event};
use crate::hooks::Hook;

/// Why a peer could not be placed in a room. The transport never tells the
/// peer which one it was.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum AdmissionError {
    #[error("room secret does not match")]
    WrongSecret,
    #[error("room closed before the peer was admitted")]
    RoomClosed,
    #[error("peer is already a member of the room")]
    AlreadyMember,
    #[error("hub is not running")]
    HubUnavailable,
}

fn admission<M, T>(result: Result<T, SendError<M, AdmissionError>>) -> Result<T, AdmissionError> {
    result.map_err(|err| match err {
        SendError::HandlerError(err) => err,
        _ => AdmissionError::HubUnavailable,
    })
}

/// Handle to the process-wide room registry.
///
/// Cloning is cheap; every clone talks to the same coordinating actor.
#[derive(Clone)]
pub struct Hub {
    actor: ActorRef<HubActor>,
}

impl Hub {
    pub fn new(config: Arc<Config>) -> Self {
        Self::with_hooks(config, vec![])
    }

    pub fn with_hooks(config: Arc<Config>, hooks: Vec<Box<dyn Hook>>) -> Self {
        Self { actor: HubActor::spawn(HubActor::new(config, hooks)) }
    }

    /// Joins the live room `id` if `secret` matches, or creates it.
    ///
    /// Two racing calls for a new id cannot both create it: the second one
    /// sees the first one's room. A created room that nobody is admitted to
    /// within [`Config::admission_window`] is closed again.
    pub async fn create_or_join_room(&self, id: &str, secret: &str) -> Result<RoomRef, AdmissionError> {
        admission(self.actor.ask(ResolveRoom { id: id.to_string(), secret: secret.to_string() }).send().await)
    }

    /// Makes `client` a member of `room`. The first member becomes its owner;
    /// later members are announced to the owner. Admitting a current member
    /// again fails with [`AdmissionError::AlreadyMember`] and changes nothing.
    pub async fn admit(&self, client: ClientId, room: &RoomRef, outbound: Outbound) -> Result<(), AdmissionError> {
        admission(self.actor.ask(AdmitClient { client, room: room.clone(), outbound }).send().await)
    }

    /// Takes `client` out of `room`, closing its outbound queue. Removing a
    /// peer that is not a member does nothing.
    pub async fn remove(&self, client: ClientId, room: &RoomRef) {
        let _ = self.actor.tell(RemoveClient { client, room: room.clone() }).send().await;
    }

    pub async fn dispatch(&self, from: ClientId, room: &RoomRef, event: Event) {
        let _ = self.actor.tell(DispatchEvent { from, room: room.clone(), event }).send().await;
    }

    pub async fn list_room_ids(&self) -> Vec<String> {
        self.actor.ask(ListRoomIds).send().await.unwrap_or_default()
    }

    pub async fn room_info(&self, id: &str) -> Option<RoomInfo> {
        self.actor.ask(GetRoomInfo(id.to_string())).send().await.ok().flatten()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::Envelope;
    use crate::hooks::{HookResult, OnPeerLeftPayload};
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::sync::mpsc;

    struct Peer {
        id: ClientId,
        rx: mpsc::Receiver<Envelope>,
    }

    impl Peer {
        fn drain(&mut self) -> Vec<Envelope> {
            let mut got = Vec::new();
            while let Ok(env) = self.rx.try_recv() { got.push(env); }
            got
        }
    }

    fn hub() -> Hub { Hub::new(Arc::new(Config::default())) }

    async fn admit(hub: &Hub, room: &RoomRef, capacity: usize) -> Peer {
        let (tx, rx) = mpsc::channel(capacity);
        let id = ClientId::new();
        hub.admit(id, room, tx).await.unwrap();
        Peer { id, rx }
    }

    /// Told messages are processed in order, so an ask returning means every
    /// earlier tell has been handled.
    async fn settle(hub: &Hub) { hub.list_room_ids().await; }

    #[tokio::test]
    async fn fresh_id_creates_and_correct_secret_rejoins() {
        let hub = hub();
        let first = hub.create_or_join_room("chess", "pw").await.unwrap();
        let again = hub.create_or_join_room("chess", "pw").await.unwrap();
        assert_eq!(first, again);
        assert_eq!(hub.list_room_ids().await, vec!["chess".to_string()]);
    }

    #[tokio::test]
    async fn wrong_secret_fails_without_touching_rooms() {
        let hub = hub();
        let room = hub.create_or_join_room("chess", "pw").await.unwrap();
        admit(&hub, &room, 4).await;
        assert_eq!(hub.create_or_join_room("chess", "nope").await, Err(AdmissionError::WrongSecret));
        let info = hub.room_info("chess").await.unwrap();
        assert_eq!(info.members, 1);
        assert_eq!(hub.list_room_ids().await.len(), 1);
    }

    #[tokio::test]
    async fn racing_creators_share_one_room() {
        let hub = hub();
        let (a, b) = tokio::join!(hub.create_or_join_room("race", "s"), hub.create_or_join_room("race", "s"));
        assert_eq!(a.unwrap(), b.unwrap());
    }

    #[tokio::test]
    async fn first_member_owns_and_hears_later_joins() {
        let hub = hub();
        let room = hub.create_or_join_room("r", "s").await.unwrap();
        let mut owner = admit(&hub, &room, 4).await;
        assert!(owner.drain().is_empty());
        assert_eq!(hub.room_info("r").await.unwrap().owner, Some(owner.id));

        let mut second = admit(&hub, &room, 4).await;
        assert_eq!(owner.drain(), vec![Envelope::new("join response", json!(second.id))]);
        assert!(second.drain().is_empty());
    }

    #[tokio::test]
    async fn last_member_leaving_closes_room() {
        let hub = hub();
        let room = hub.create_or_join_room("r", "s").await.unwrap();
        let owner = admit(&hub, &room, 4).await;
        hub.remove(owner.id, &room).await;
        settle(&hub).await;
        assert!(hub.list_room_ids().await.is_empty());

        let reborn = hub.create_or_join_room("r", "other").await.unwrap();
        assert_ne!(reborn, room);
    }

    #[tokio::test]
    async fn leaving_member_is_announced_once() {
        let hub = hub();
        let room = hub.create_or_join_room("r", "s").await.unwrap();
        let mut owner = admit(&hub, &room, 4).await;
        let mut a = admit(&hub, &room, 4).await;
        let b = admit(&hub, &room, 4).await;
        owner.drain();

        hub.remove(b.id, &room).await;
        hub.remove(b.id, &room).await;
        settle(&hub).await;

        let expected = vec![Envelope::new("disconnect response", json!(b.id))];
        assert_eq!(owner.drain(), expected);
        assert_eq!(a.drain(), expected);
        assert_eq!(hub.room_info("r").await.unwrap().members, 2);
    }

    #[tokio::test]
    async fn removed_member_queue_is_closed() {
        let hub = hub();
        let room = hub.create_or_join_room("r", "s").await.unwrap();
        let _owner = admit(&hub, &room, 4).await;
        let mut a = admit(&hub, &room, 4).await;
        hub.remove(a.id, &room).await;
        settle(&hub).await;
        assert_eq!(a.rx.recv().await, None);
    }

    #[tokio::test]
    async fn owner_leaving_leaves_room_ownerless() {
        let hub = hub();
        let room = hub.create_or_join_room("r", "s").await.unwrap();
        let owner = admit(&hub, &room, 4).await;
        let a = admit(&hub, &room, 4).await;
        let mut b = admit(&hub, &room, 4).await;
        hub.remove(owner.id, &room).await;
        settle(&hub).await;
        assert_eq!(b.drain(), vec![Envelope::new("disconnect response", json!(owner.id))]);

        hub.dispatch(a.id, &room, Event::Sync { hydrate: json!(1) }).await;
        let _late = admit(&hub, &room, 4).await;
        settle(&hub).await;

        assert!(b.drain().is_empty());
        let info = hub.room_info("r").await.unwrap();
        assert_eq!(info.owner, None);
        assert_eq!(info.members, 3);
    }

    #[tokio::test]
    async fn sync_flows_through_the_hub() {
        let hub = hub();
        let room = hub.create_or_join_room("r", "s").await.unwrap();
        let mut owner = admit(&hub, &room, 4).await;
        let mut a = admit(&hub, &room, 4).await;
        owner.drain();

        hub.dispatch(a.id, &room, Event::Sync { hydrate: json!("forged") }).await;
        hub.dispatch(owner.id, &room, Event::Sync { hydrate: json!("real") }).await;
        settle(&hub).await;

        assert_eq!(a.drain(), vec![Envelope::new("hydrate response", json!("real"))]);
        assert!(owner.drain().is_empty());
    }

    #[tokio::test]
    async fn system_events_cannot_be_injected() {
        let hub = hub();
        let room = hub.create_or_join_room("r", "s").await.unwrap();
        let mut owner = admit(&hub, &room, 4).await;
        let a = admit(&hub, &room, 4).await;
        owner.drain();

        hub.dispatch(a.id, &room, Event::Join(a.id)).await;
        settle(&hub).await;
        assert!(owner.drain().is_empty());
    }

    #[tokio::test]
    async fn stale_room_reference_is_refused() {
        let hub = hub();
        let room = hub.create_or_join_room("r", "s").await.unwrap();
        let owner = admit(&hub, &room, 4).await;
        hub.remove(owner.id, &room).await;
        let (tx, _rx) = mpsc::channel(1);
        assert_eq!(hub.admit(ClientId::new(), &room, tx).await, Err(AdmissionError::RoomClosed));
    }

    #[tokio::test]
    async fn readmitting_a_member_is_refused_and_silent() {
        let hub = hub();
        let room = hub.create_or_join_room("r", "s").await.unwrap();
        let mut owner = admit(&hub, &room, 4).await;
        let mut guest = admit(&hub, &room, 4).await;
        assert_eq!(owner.drain().len(), 1);

        let (again, mut again_rx) = mpsc::channel(4);
        assert_eq!(hub.admit(guest.id, &room, again).await, Err(AdmissionError::AlreadyMember));
        settle(&hub).await;
        assert!(owner.drain().is_empty());
        assert_eq!(hub.room_info("r").await.unwrap().members, 2);
        assert_eq!(again_rx.recv().await, None);

        hub.dispatch(owner.id, &room, Event::Sync { hydrate: json!("state") }).await;
        settle(&hub).await;
        assert_eq!(guest.drain(), vec![Envelope::new("hydrate response", json!("state"))]);
    }

    #[tokio::test]
    async fn room_nobody_enters_is_closed_after_the_window() {
        let config = Config::default().with_admission_window(Duration::from_millis(50));
        let hub = Hub::new(Arc::new(config));
        let squatted = hub.create_or_join_room("empty", "mine").await.unwrap();
        let used = hub.create_or_join_room("used", "pw").await.unwrap();
        let _owner = admit(&hub, &used, 4).await;

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(hub.list_room_ids().await, vec!["used".to_string()]);

        let fresh = hub.create_or_join_room("empty", "theirs").await.unwrap();
        assert_ne!(fresh, squatted);
        let (tx, _rx) = mpsc::channel(1);
        assert_eq!(hub.admit(ClientId::new(), &squatted, tx).await, Err(AdmissionError::RoomClosed));
    }

    #[tokio::test]
    async fn slow_peer_is_evicted_under_disconnect_policy() {
        let hub = hub();
        let room = hub.create_or_join_room("r", "s").await.unwrap();
        let mut owner = admit(&hub, &room, 8).await;
        let slow = admit(&hub, &room, 1).await;
        owner.drain();

        hub.dispatch(owner.id, &room, Event::Sync { hydrate: json!(1) }).await;
        hub.dispatch(owner.id, &room, Event::Sync { hydrate: json!(2) }).await;
        settle(&hub).await;

        assert_eq!(hub.room_info("r").await.unwrap().members, 1);
        assert_eq!(owner.drain(), vec![Envelope::new("disconnect response", json!(slow.id))]);
    }

    #[tokio::test]
    async fn slow_peer_is_kept_under_drop_newest_policy() {
        let config = Config::default().with_overflow_policy(crate::config::OverflowPolicy::DropNewest);
        let hub = Hub::new(Arc::new(config));
        let room = hub.create_or_join_room("r", "s").await.unwrap();
        let owner = admit(&hub, &room, 8).await;
        let mut slow = admit(&hub, &room, 1).await;

        hub.dispatch(owner.id, &room, Event::Sync { hydrate: json!(1) }).await;
        hub.dispatch(owner.id, &room, Event::Sync { hydrate: json!(2) }).await;
        settle(&hub).await;

        assert_eq!(hub.room_info("r").await.unwrap().members, 2);
        assert_eq!(slow.drain(), vec![Envelope::new("hydrate response", json!(1))]);
    }

    #[derive(Default)]
    struct Counting {
        left: Arc<AtomicUsize>,
        closed: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Hook for Counting {
        async fn on_peer_left(&self, _payload: OnPeerLeftPayload<'_>) -> HookResult {
            self.left.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn after_room_closed(&self, _room_id: &str) {
            self.closed.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn hooks_observe_lifecycle() {
        let counting = Counting::default();
        let (left, closed) = (Arc::clone(&counting.left), Arc::clone(&counting.closed));
        let hub = Hub::with_hooks(Arc::new(Config::default()), vec![Box::new(counting)]);
        let room = hub.create_or_join_room("r", "s").await.unwrap();
        let owner = admit(&hub, &room, 4).await;
        hub.remove(owner.id, &room).await;
        settle(&hub).await;
        assert_eq!(closed.load(Ordering::SeqCst), 1);

        for _ in 0..50 {
            if left.load(Ordering::SeqCst) == 1 { return; }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("on_peer_left never ran");
    }
}
