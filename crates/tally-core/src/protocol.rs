use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::state::ClientState;

/// Pub/sub channel carrying "this connection's state changed"
/// notifications between processes. The message payload is the connection
/// id and nothing else; receivers re-read the store so no stale state
/// rides the bus.
pub const STATE_UPDATES_CHANNEL: &str = "state_updates";

/// A state-mutating command addressed to the sender's own counters.
/// Command names and payload shapes are part of the wire contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum Command {
    /// Appends a counter with the given name at value zero. Duplicate
    /// names are allowed.
    #[serde(rename = "addCounter")]
    AddCounter(String),
    #[serde(rename = "incrementCounter")]
    IncrementCounter(i64),
    #[serde(rename = "decrementCounter")]
    DecrementCounter(i64),
    #[serde(rename = "resetCounter")]
    ResetCounter(i64),
    #[serde(rename = "renameCounter")]
    RenameCounter(RenamePayload),
    #[serde(rename = "removeCounter")]
    RemoveCounter(i64),
}

/// Indexes arrive as signed integers; anything outside the live range,
/// negatives included, is rejected by the reducer rather than the parser.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenamePayload {
    pub index: i64,
    pub new_name: String,
}

/// Out-of-band requests answered directly by the process holding the
/// connection, bypassing the dispatcher and the bus.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StateRequest {
    GetState,
}

/// Anything a client may send down the socket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ClientMessage {
    Command(Command),
    Request(StateRequest),
}

/// Messages pushed from server to client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum ServerMessage {
    /// The full refreshed state, pushed whenever the connection's state
    /// changes, regardless of which process applied the change.
    StateUpdated(ClientState),
    /// Direct reply to a `get_state` request.
    State(ClientState),
}

/// Mint the opaque identity for a new connection. Identities join store
/// keys, bus payloads, and registry entries; they are never reused while
/// the prior connection's state survives.
pub fn generate_connection_id() -> String {
    Uuid::new_v4().to_string()
}
