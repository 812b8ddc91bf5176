//! One peer's server-side endpoint: a read pump that decodes and dispatches
//! inbound frames, and a write pump that drains the outbound queue and keeps
//! the connection alive.
//!
//! The pumps are generic over the transport so anything that yields and
//! accepts WebSocket messages can be relayed, not just an axum socket.

use axum::extract::ws::Message;
use bytes::Bytes;
use futures::{Sink, SinkExt, Stream, StreamExt};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{interval_at, timeout, timeout_at, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::actor::RoomRef;
use crate::config::Config;
use crate::envelope::{ClientId, Envelope, Event};
use crate::hub::{AdmissionError, Hub};

#[derive(Debug, Error)]
enum TransportError {
    #[error("write deadline elapsed")]
    WriteTimeout,
    #[error("send failed: {0}")]
    Send(String),
}

/// A peer bound to a resolved room, not yet admitted.
pub struct Endpoint {
    id: ClientId,
    room: RoomRef,
    config: Arc<Config>,
}

impl Endpoint {
    pub fn new(room: RoomRef, config: Arc<Config>) -> Self {
        Self { id: ClientId::new(), room, config }
    }

    pub fn id(&self) -> ClientId { self.id }

    /// Admits the peer and starts both pumps. On rejection a close frame is
    /// sent and the transport is dropped.
    pub async fn connect<St, Si, E>(self, hub: &Hub, stream: St, mut sink: Si) -> Result<ClientId, AdmissionError>
    where
        St: Stream<Item = Result<Message, E>> + Unpin + Send + 'static,
        E: fmt::Display + Send + 'static,
        Si: Sink<Message> + Unpin + Send + 'static,
        Si::Error: fmt::Display + Send,
    {
        let Self { id, room, config } = self;
        let (outbound, queue) = mpsc::channel(config.outbound_capacity);
        if let Err(err) = hub.admit(id, &room, outbound).await {
            let _ = send_with_deadline(&mut sink, Message::Close(None), config.write_wait).await;
            return Err(err);
        }

        let (closed_tx, closed_rx) = oneshot::channel();
        tokio::spawn(write_pump(sink, queue, closed_tx, Arc::clone(&config), id));
        tokio::spawn(read_pump(stream, hub.clone(), room, id, closed_rx, config));
        Ok(id)
    }
}

/// Reads frames in arrival order until the transport fails, the read deadline
/// passes without a pong, a frame cannot be decoded, or the write pump stops.
/// Always ends by removing the peer from its room.
async fn read_pump<St, E>(
    mut stream: St,
    hub: Hub,
    room: RoomRef,
    id: ClientId,
    mut closed: oneshot::Receiver<()>,
    config: Arc<Config>,
) where
    St: Stream<Item = Result<Message, E>> + Unpin,
    E: fmt::Display,
{
    let mut deadline = Instant::now() + config.pong_wait;
    loop {
        let next = tokio::select! {
            _ = &mut closed => break,
            next = timeout_at(deadline, stream.next()) => next,
        };
        let frame = match next {
            Ok(Some(Ok(frame))) => frame,
            Ok(Some(Err(err))) => {
                debug!(room = %room.id(), client = %id, error = %err, "read failed");
                break;
            }
            Ok(None) => break,
            Err(_) => {
                debug!(room = %room.id(), client = %id, "read deadline elapsed");
                break;
            }
        };

        let data: &[u8] = match &frame {
            Message::Text(text) => text.as_str().as_bytes(),
            Message::Binary(data) => &data[..],
            Message::Pong(_) => {
                deadline = Instant::now() + config.pong_wait;
                continue;
            }
            Message::Ping(_) => continue,
            Message::Close(_) => break,
        };
        if data.len() > config.max_message_size {
            warn!(room = %room.id(), client = %id, len = data.len(), "frame exceeds read limit");
            break;
        }

        let envelope = match Envelope::decode(data) {
            Ok(envelope) => envelope,
            Err(err) => {
                debug!(room = %room.id(), client = %id, error = %err, "closing on undecodable frame");
                break;
            }
        };
        match Event::try_from(envelope) {
            Ok(event) => hub.dispatch(id, &room, event).await,
            Err(err) => debug!(room = %room.id(), client = %id, error = %err, "dropped event"),
        }
    }

    info!(room = %room.id(), client = %id, "connection closed");
    hub.remove(id, &room).await;
}

/// Sends queued envelopes in order and pings on every keepalive tick. A closed
/// queue ends the connection with a close frame. Dropping `_closed` on exit
/// stops the read pump.
async fn write_pump<Si>(
    mut sink: Si,
    mut queue: mpsc::Receiver<Envelope>,
    _closed: oneshot::Sender<()>,
    config: Arc<Config>,
    id: ClientId,
) where
    Si: Sink<Message> + Unpin,
    Si::Error: fmt::Display,
{
    let mut keepalive = interval_at(Instant::now() + config.ping_period, config.ping_period);
    keepalive.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        let written = tokio::select! {
            next = queue.recv() => match next {
                Some(first) => write_batch(&mut sink, first, &mut queue, config.write_wait).await,
                None => {
                    let _ = send_with_deadline(&mut sink, Message::Close(None), config.write_wait).await;
                    break;
                }
            },
            _ = keepalive.tick() => send_with_deadline(&mut sink, Message::Ping(Bytes::new()), config.write_wait).await,
        };
        if let Err(err) = written {
            debug!(client = %id, error = %err, "write failed");
            break;
        }
    }
}

/// Sends `first` plus the envelopes already queued when it arrived, flushing
/// once. Envelopes queued during the write wait for the next batch.
async fn write_batch<Si>(
    sink: &mut Si,
    first: Envelope,
    queue: &mut mpsc::Receiver<Envelope>,
    write_wait: Duration,
) -> Result<(), TransportError>
where
    Si: Sink<Message> + Unpin,
    Si::Error: fmt::Display,
{
    let queued = queue.len();
    let write = async {
        let mut next = Some(first);
        let mut remaining = queued;
        while let Some(envelope) = next.take() {
            match envelope.encode() {
                Ok(text) => sink.feed(Message::Text(text.into())).await?,
                Err(err) => warn!(event = %envelope.event_name, error = %err, "dropping unencodable envelope"),
            }
            if remaining > 0 {
                remaining -= 1;
                next = queue.try_recv().ok();
            }
        }
        sink.flush().await
    };
    match timeout(write_wait, write).await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(err)) => Err(TransportError::Send(err.to_string())),
        Err(_) => Err(TransportError::WriteTimeout),
    }
}

async fn send_with_deadline<Si>(sink: &mut Si, frame: Message, write_wait: Duration) -> Result<(), TransportError>
where
    Si: Sink<Message> + Unpin,
    Si::Error: fmt::Display,
{
    match timeout(write_wait, sink.send(frame)).await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(err)) => Err(TransportError::Send(err.to_string())),
        Err(_) => Err(TransportError::WriteTimeout),
    }
}
