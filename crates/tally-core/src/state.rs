use serde::{Deserialize, Serialize};

/// A single named counter. Names are not unique within a client's state;
/// commands address counters by position, not by name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Counter {
    pub name: String,
    pub value: u64,
}

/// The complete per-connection state. One instance exists per live
/// connection, created empty on first contact and deleted when the
/// connection closes. `error` holds the outcome of the most recent
/// rejected command only; it is not cumulative.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientState {
    #[serde(default)]
    pub counters: Vec<Counter>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}
