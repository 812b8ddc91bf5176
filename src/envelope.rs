use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

pub const JOIN: &str = "join";
pub const DISCONNECT: &str = "disconnect";
pub const MESSAGE: &str = "message";
pub const SYNC: &str = "sync";
pub const HYDRATE: &str = "hydrate";

/// Process-unique id of a connected peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClientId(Uuid);

impl ClientId {
    pub fn new() -> Self { Self(Uuid::new_v4()) }
}

impl Default for ClientId { fn default() -> Self { Self::new() } }

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { fmt::Display::fmt(&self.0, f) }
}

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("malformed frame: {0}")]
    Frame(#[source] serde_json::Error),
    #[error("unrecognized event `{0}`")]
    UnknownEvent(String),
    #[error("bad `{event}` payload: {source}")]
    Payload { event: &'static str, #[source] source: serde_json::Error },
}

/// The unit exchanged with peers: `{"eventName": ..., "eventPayload": ...}`.
///
/// Any JSON object decodes; a missing name is left empty and fails later as
/// an unknown event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    #[serde(default)]
    pub event_name: String,
    #[serde(default)]
    pub event_payload: Value,
}

impl Envelope {
    pub fn new(event_name: impl Into<String>, event_payload: Value) -> Self {
        Self { event_name: event_name.into(), event_payload }
    }

    pub fn decode(frame: &[u8]) -> Result<Self, DecodeError> {
        serde_json::from_slice(frame).map_err(DecodeError::Frame)
    }

    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Outgoing events are named `"<name> response"`.
    fn response(name: &str, event_payload: Value) -> Self {
        Self::new(format!("{name} response"), event_payload)
    }

    pub(crate) fn join_response(joined: ClientId) -> Self {
        Self::response(JOIN, json!(joined))
    }

    pub(crate) fn disconnect_response(departed: ClientId) -> Self {
        Self::response(DISCONNECT, json!(departed))
    }

    pub(crate) fn message_response(message: Value, from: ClientId) -> Self {
        Self::response(MESSAGE, json!({ "message": message, "userID": from }))
    }

    pub(crate) fn hydrate_response(snapshot: Value) -> Self {
        Self::response(HYDRATE, snapshot)
    }
}

/// A decoded event. `Join` and `Disconnect` are raised by the membership
/// lifecycle only and never decode from a peer frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Join(ClientId),
    Disconnect(ClientId),
    Message(Value),
    Sync { hydrate: Value },
    Hydrate { target: ClientId, hydrate: Value },
}

#[derive(Deserialize)]
struct SyncPayload {
    hydrate: Value,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct HydratePayload {
    hydrate_user: ClientId,
    hydrate: Value,
}

impl Event {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Join(_) => JOIN,
            Self::Disconnect(_) => DISCONNECT,
            Self::Message(_) => MESSAGE,
            Self::Sync { .. } => SYNC,
            Self::Hydrate { .. } => HYDRATE,
        }
    }
}

impl TryFrom<Envelope> for Event {
    type Error = DecodeError;

    fn try_from(envelope: Envelope) -> Result<Self, Self::Error> {
        let payload = envelope.event_payload;
        match envelope.event_name.as_str() {
            MESSAGE => Ok(Self::Message(payload)),
            SYNC => {
                let p: SyncPayload = serde_json::from_value(payload)
                    .map_err(|source| DecodeError::Payload { event: SYNC, source })?;
                Ok(Self::Sync { hydrate: p.hydrate })
            }
            HYDRATE => {
                let p: HydratePayload = serde_json::from_value(payload)
                    .map_err(|source| DecodeError::Payload { event: HYDRATE, source })?;
                Ok(Self::Hydrate { target: p.hydrate_user, hydrate: p.hydrate })
            }
            _ => Err(DecodeError::UnknownEvent(envelope.event_name)),
        }
    }
}
