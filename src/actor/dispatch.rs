use tracing::debug;

use crate::actor::room::{Delivery, Room};
use crate::envelope::{ClientId, Envelope, Event};

/// What a dispatch produced. `overflowed` lists members whose queue was full.
#[derive(Debug, Default)]
pub(crate) struct Dispatched {
    pub delivered: usize,
    pub overflowed: Vec<ClientId>,
}

impl Dispatched {
    fn send(&mut self, room: &Room, to: ClientId, envelope: Envelope) {
        match room.deliver(to, envelope) {
            Delivery::Queued => self.delivered += 1,
            Delivery::Full => self.overflowed.push(to),
            Delivery::Gone => {}
        }
    }

    fn send_all_except(&mut self, room: &Room, except: ClientId, envelope: &Envelope) {
        let targets: Vec<ClientId> = room.member_ids().filter(|id| *id != except).collect();
        for to in targets {
            self.send(room, to, envelope.clone());
        }
    }
}

/// Routes one event inside a room. `sender` is the peer the event came from,
/// or the subject of a `Join`/`Disconnect`.
///
/// `sync` and `hydrate` from anyone but the owner are dropped without a reply.
pub(crate) fn dispatch(room: &Room, sender: ClientId, event: Event) -> Dispatched {
    let mut out = Dispatched::default();
    match event {
        Event::Join(joined) => {
            if !room.contains(joined) { return out; }
            if let Some(owner) = room.owner().filter(|owner| *owner != joined) {
                out.send(room, owner, Envelope::join_response(joined));
            }
        }
        Event::Disconnect(departed) => {
            if room.contains(departed) { return out; }
            out.send_all_except(room, departed, &Envelope::disconnect_response(departed));
        }
        Event::Message(message) => {
            if !room.contains(sender) { return out; }
            out.send_all_except(room, sender, &Envelope::message_response(message, sender));
        }
        Event::Sync { hydrate } => {
            if !room.is_owner(sender) {
                debug!(room = %room.id(), client = %sender, "ignoring sync from non-owner");
                return out;
            }
            out.send_all_except(room, sender, &Envelope::hydrate_response(hydrate));
        }
        Event::Hydrate { target, hydrate } => {
            if !room.is_owner(sender) {
                debug!(room = %room.id(), client = %sender, "ignoring hydrate from non-owner");
                return out;
            }
            out.send(room, target, Envelope::hydrate_response(hydrate));
        }
    }
    out
}
