pub mod protocol;
pub mod reducer;
pub mod state;

pub use protocol::{
    generate_connection_id, ClientMessage, Command, RenamePayload, ServerMessage, StateRequest,
    STATE_UPDATES_CHANNEL,
};
pub use state::{ClientState, Counter};
