use std::sync::Arc;

use bytes::Bytes;
use thiserror::Error;
use tracing::debug;

use sync_bus::{Bus, BusError};
use tally_core::{reducer, ClientState, Command, STATE_UPDATES_CHANNEL};

use crate::storage::{Revision, StateStore, StoreError};

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("bus publish failed: {0}")]
    Bus(#[from] BusError),
    #[error("gave up after {0} contended write attempts")]
    Contention(u32),
}

const MAX_WRITE_ATTEMPTS: u32 = 5;

/// Turns one inbound command into exactly one state transition and one
/// fanout notification. Store and bus handles are injected at
/// construction; the dispatcher holds no other state.
pub struct Dispatcher {
    store: Arc<dyn StateStore>,
    bus: Arc<dyn Bus>,
}

impl Dispatcher {
    pub fn new(store: Arc<dyn StateStore>, bus: Arc<dyn Bus>) -> Self {
        Self { store, bus }
    }

    /// Load, reduce, write back, publish — as one logical unit. The write
    /// is compare-and-swap against the revision read here; losing the swap
    /// means another process touched this identity, so re-read and
    /// re-apply against the fresh state. On any failure the command has no
    /// observable effect.
    pub async fn handle(
        &self,
        connection_id: &str,
        command: &Command,
    ) -> Result<(), DispatchError> {
        for attempt in 1..=MAX_WRITE_ATTEMPTS {
            let (state, revision) = match self.store.get(connection_id).await? {
                Some((state, revision)) => (state, revision),
                None => (ClientState::default(), Revision::Absent),
            };

            let next = reducer::apply(state, command);

            if self.store.put(connection_id, &next, &revision).await? {
                // Only the identity rides the bus; the delivering process
                // re-reads the store so no stale payload crosses it.
                self.bus
                    .publish(
                        STATE_UPDATES_CHANNEL,
                        Bytes::from(connection_id.to_owned()),
                    )
                    .await?;
                return Ok(());
            }

            debug!(
                connection = %connection_id,
                attempt,
                "state write contended, retrying against fresh state"
            );
        }

        Err(DispatchError::Contention(MAX_WRITE_ATTEMPTS))
    }
}
