use std::{net::SocketAddr, sync::Arc};

use axum::extract::ws::{Message, WebSocket};
use futures_util::{SinkExt, StreamExt, stream::SplitSink};
use tokio::{select, sync::mpsc::Receiver};
use tracing::{debug, info, warn};

use crate::{
    coordinator::Coordinator,
    error::RelayError,
    message::{ServerMessage, encode_server_message},
    registry::ConnectionId,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Open,
    Closed,
}

impl ConnectionState {
    pub fn can_transition_to(self, next: ConnectionState) -> bool {
        matches!(
            (self, next),
            (ConnectionState::Connecting, ConnectionState::Open)
                | (ConnectionState::Connecting, ConnectionState::Closed)
                | (ConnectionState::Open, ConnectionState::Closed)
        )
    }
}

struct Lifecycle {
    id: ConnectionId,
    state: ConnectionState,
}

impl Lifecycle {
    fn advance(&mut self, next: ConnectionState) {
        if !self.state.can_transition_to(next) {
            warn!(
                connection = self.id,
                from = ?self.state,
                to = ?next,
                "ignoring invalid transition"
            );
            return;
        }
        debug!(connection = self.id, from = ?self.state, to = ?next, "connection state changed");
        self.state = next;
    }
}

/// Drives one upgraded WebSocket from registration to removal.
///
/// Outbound frames flow through the connection's registry queue into a
/// writer task; inbound text frames go to the coordinator. When either side
/// stops, the connection is unregistered and anything still queued for it
/// is dropped.
pub async fn run_connection(socket: WebSocket, peer: SocketAddr, coordinator: Arc<Coordinator>) {
    let registry = Arc::clone(coordinator.registry());
    let (registration, outbox) = registry.join();
    let id = registration.id();
    let mut lifecycle = Lifecycle {
        id,
        state: ConnectionState::Connecting,
    };

    let (sink, mut stream) = socket.split();
    let mut writer = tokio::spawn(write_frames(id, sink, outbox));

    lifecycle.advance(ConnectionState::Open);
    info!(connection = id, %peer, clients = registry.len(), "client connected");

    let synced = coordinator.sync_connection(id).await;
    debug!(connection = id, polls = synced, "initial tallies queued");

    loop {
        select! {
            incoming = stream.next() => match incoming {
                Some(Ok(Message::Text(text))) => {
                    coordinator.handle_message(id, &text);
                }
                Some(Ok(Message::Binary(_))) => {
                    let error =
                        RelayError::MalformedMessage("Binary frames are not supported".into());
                    coordinator.reject(id, &error);
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(error)) => {
                    debug!(connection = id, %error, "socket error");
                    break;
                }
            },
            _ = &mut writer => {
                debug!(connection = id, "writer stopped");
                break;
            }
        }
    }

    lifecycle.advance(ConnectionState::Closed);
    drop(registration);
    writer.abort();
    info!(connection = id, %peer, clients = registry.len(), "client disconnected");
}

async fn write_frames(
    id: ConnectionId,
    mut sink: SplitSink<WebSocket, Message>,
    mut outbox: Receiver<ServerMessage>,
) {
    while let Some(message) = outbox.recv().await {
        let text = match encode_server_message(&message) {
            Ok(text) => text,
            Err(error) => {
                warn!(connection = id, %error, "failed to encode message");
                continue;
            }
        };

        if let Err(error) = sink.send(Message::Text(text)).await {
            debug!(connection = id, %error, "failed to deliver message to client");
            return;
        }
    }

    let _ = sink.close().await;
}
