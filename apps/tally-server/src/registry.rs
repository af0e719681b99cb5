use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, warn};

use sync_bus::Bus;
use tally_core::{ClientState, ServerMessage, STATE_UPDATES_CHANNEL};

use crate::storage::StateStore;

/// Per-process table of connection identity → live transport handle.
/// A connection appears here between open and close and nowhere else;
/// identities owned by other processes are simply absent.
#[derive(Debug, Default)]
pub struct Registry {
    connections: DashMap<String, mpsc::UnboundedSender<ServerMessage>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, connection_id: String, tx: mpsc::UnboundedSender<ServerMessage>) {
        self.connections.insert(connection_id, tx);
    }

    pub fn deregister(&self, connection_id: &str) {
        self.connections.remove(connection_id);
    }

    pub fn holds(&self, connection_id: &str) -> bool {
        self.connections.contains_key(connection_id)
    }

    /// Queues a message for the connection if it lives on this process.
    /// Returns false when the identity is unknown here or the socket's
    /// writer already went away.
    pub fn send(&self, connection_id: &str, message: ServerMessage) -> bool {
        match self.connections.get(connection_id) {
            Some(entry) => entry.value().send(message).is_ok(),
            None => false,
        }
    }

    pub fn connection_ids(&self) -> Vec<String> {
        self.connections
            .iter()
            .map(|entry| entry.key().clone())
            .collect()
    }

    /// Best-effort removal of every store entry this process is
    /// responsible for. Failures are logged and skipped so shutdown never
    /// blocks on a single bad key.
    pub async fn purge_store_entries(&self, store: &dyn StateStore) {
        for connection_id in self.connection_ids() {
            match store.remove(&connection_id).await {
                Ok(()) => debug!(connection = %connection_id, "purged state entry"),
                Err(err) => warn!(
                    connection = %connection_id,
                    error = %err,
                    "failed to purge state entry"
                ),
            }
        }
    }
}

/// Spawns the per-process fanout listener. Every state change anywhere in
/// the deployment arrives here as a bare connection id; if the registry
/// holds that connection locally, the state is re-read from the store and
/// pushed down the socket. Ids held elsewhere are ignored — the owning
/// process runs the same loop.
pub fn spawn_fanout_listener(
    bus: &dyn Bus,
    registry: Arc<Registry>,
    store: Arc<dyn StateStore>,
) -> tokio::task::JoinHandle<()> {
    // Subscribe before spawning so no notification can slip past startup.
    let mut updates = bus.subscribe(STATE_UPDATES_CHANNEL);

    tokio::spawn(async move {
        loop {
            let msg = match updates.recv().await {
                Ok(msg) => msg,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    // Skipped edges are tolerable: the next delivery
                    // re-reads the store and carries the latest state.
                    warn!(skipped, "fanout listener lagged behind the bus");
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => break,
            };

            let connection_id = match std::str::from_utf8(&msg.payload) {
                Ok(id) => id.to_string(),
                Err(err) => {
                    warn!(error = %err, "non-utf8 connection id on the bus");
                    continue;
                }
            };

            if !registry.holds(&connection_id) {
                continue;
            }

            let state = match store.get(&connection_id).await {
                Ok(Some((state, _))) => state,
                Ok(None) => ClientState::default(),
                Err(err) => {
                    warn!(
                        connection = %connection_id,
                        error = %err,
                        "failed to re-read state for fanout"
                    );
                    continue;
                }
            };

            if !registry.send(&connection_id, ServerMessage::StateUpdated(state)) {
                debug!(
                    connection = %connection_id,
                    "connection went away before fanout delivery"
                );
            }
        }
        debug!("fanout listener stopped");
    })
}
