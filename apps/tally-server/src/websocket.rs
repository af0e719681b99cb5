use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::Response,
};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use tally_core::{
    generate_connection_id, ClientMessage, ClientState, ServerMessage, StateRequest,
};

use crate::dispatcher::Dispatcher;
use crate::registry::Registry;
use crate::storage::{Revision, StateStore, StoreError};

/// Shared handles for the WebSocket endpoint.
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<Registry>,
    pub store: Arc<dyn StateStore>,
    pub dispatcher: Arc<Dispatcher>,
}

pub async fn websocket_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let connection_id = generate_connection_id();
    let (mut sender, mut receiver) = socket.split();

    // Outbound messages funnel through a channel so the fanout listener
    // and this loop share one writer.
    let (tx, mut rx) = mpsc::unbounded_channel::<ServerMessage>();

    let writer_id = connection_id.clone();
    tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if let Ok(json) = serde_json::to_string(&msg) {
                if sender.send(Message::Text(json)).await.is_err() {
                    break;
                }
            }
        }
        debug!(connection = %writer_id, "socket writer task ended");
    });

    state.registry.register(connection_id.clone(), tx.clone());
    debug!(connection = %connection_id, "websocket connected");

    if let Err(err) = initialize_entry(state.store.as_ref(), &connection_id).await {
        warn!(
            connection = %connection_id,
            error = %err,
            "failed to initialize state entry"
        );
    }

    while let Some(frame) = receiver.next().await {
        let frame = match frame {
            Ok(frame) => frame,
            Err(err) => {
                error!(connection = %connection_id, error = %err, "websocket error");
                break;
            }
        };

        match frame {
            Message::Text(text) => handle_text(&text, &connection_id, &state, &tx).await,
            Message::Close(_) => {
                debug!(connection = %connection_id, "received close frame");
                break;
            }
            // Ping/Pong are answered by the transport; binary frames are
            // not part of the protocol.
            _ => {}
        }
    }

    // Disconnect: the state does not outlive the connection. No publish
    // either — a deleted entry has no subscriber left to notify.
    state.registry.deregister(&connection_id);
    if let Err(err) = state.store.remove(&connection_id).await {
        warn!(
            connection = %connection_id,
            error = %err,
            "failed to delete state entry on disconnect"
        );
    }
    info!(connection = %connection_id, "websocket disconnected");
}

async fn handle_text(
    text: &str,
    connection_id: &str,
    state: &AppState,
    tx: &mpsc::UnboundedSender<ServerMessage>,
) {
    match serde_json::from_str::<ClientMessage>(text) {
        Ok(ClientMessage::Command(command)) => {
            if let Err(err) = state.dispatcher.handle(connection_id, &command).await {
                // Infrastructure failure: the command is abandoned without
                // effect and no update is pushed; the client keeps its
                // last-known state.
                error!(
                    connection = %connection_id,
                    error = %err,
                    "command dispatch failed"
                );
            }
        }
        Ok(ClientMessage::Request(StateRequest::GetState)) => {
            // Answered straight from the store; routing a self-request
            // through the bus would be a needless round trip.
            let snapshot = match state.store.get(connection_id).await {
                Ok(Some((snapshot, _))) => snapshot,
                Ok(None) => ClientState::default(),
                Err(err) => {
                    error!(
                        connection = %connection_id,
                        error = %err,
                        "failed to read state for get_state"
                    );
                    return;
                }
            };
            let _ = tx.send(ServerMessage::State(snapshot));
        }
        Err(err) => {
            // Protocol misuse, not a domain rejection: dropped with no
            // state change and nothing sent back.
            warn!(
                connection = %connection_id,
                error = %err,
                "unhandled message: {}",
                text
            );
        }
    }
}

async fn initialize_entry(
    store: &dyn StateStore,
    connection_id: &str,
) -> Result<(), StoreError> {
    if store.get(connection_id).await?.is_none() {
        // Losing this swap means a raced command already created the
        // entry, which is just as good.
        let _ = store
            .put(connection_id, &ClientState::default(), &Revision::Absent)
            .await?;
    }
    Ok(())
}
