//! Collaboration Connection Handler
//!
//! Drives one WebSocket connection through its lifecycle:
//! Connecting -> Authenticating -> Joined -> Closed. The credential and
//! target scan id arrive either as upgrade query parameters or as the
//! first in-band `auth` message; both forms are accepted.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{
        ws::{CloseFrame, Message, WebSocket},
        Query, State, WebSocketUpgrade,
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio::time::timeout;

use super::hub::CollaborationHub;
use super::messages::{close_codes, ClientMessage, ServerMessage};
use super::registry::{Connection, Outbound};
use crate::shared::error::AppError;
use crate::startup::AppState;

/// Connection-establishment query parameters.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectParams {
    pub session_id: Option<String>,
    pub token: Option<String>,
}

/// WebSocket upgrade handler for the collaboration endpoint.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<ConnectParams>,
    State(state): State<AppState>,
) -> Response {
    let ws = ws
        .max_message_size(state.settings.collab.max_message_size)
        .max_frame_size(state.settings.collab.max_frame_size);
    ws.on_upgrade(move |socket| handle_socket(socket, state, params))
}

/// Handle one collaboration connection.
async fn handle_socket(socket: WebSocket, state: AppState, params: ConnectParams) {
    let (mut ws_sender, mut receiver) = socket.split();

    // Writer task: the sole owner of the transport's send half. Everything
    // outbound flows through this channel, which also gives each peer
    // in-order delivery of whatever the server enqueued for it.
    let (tx, mut rx) = mpsc::unbounded_channel::<Outbound>();
    let writer = tokio::spawn(async move {
        while let Some(out) = rx.recv().await {
            match out {
                Outbound::Frame(msg) => {
                    let text = match serde_json::to_string(&msg) {
                        Ok(text) => text,
                        Err(e) => {
                            tracing::error!("Failed to serialize message: {}", e);
                            continue;
                        }
                    };
                    if ws_sender.send(Message::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                Outbound::Close(code) => {
                    let _ = ws_sender
                        .send(Message::Close(Some(CloseFrame {
                            code,
                            reason: "".into(),
                        })))
                        .await;
                    break;
                }
            }
        }
    });

    // ---- Authenticating ----
    let credentials = match (params.token, params.session_id) {
        (Some(token), Some(session_id)) => Some((token, session_id)),
        _ => await_auth_message(&mut receiver, state.settings.collab.auth_timeout()).await,
    };

    let Some((credential, scan_id)) = credentials else {
        tracing::debug!("Connection closed before presenting a credential");
        reject_unauthenticated(&tx, "missing credential");
        drop(tx);
        let _ = writer.await;
        return;
    };

    let identity = match state.verifier.verify(&credential).await {
        Ok(identity) => identity,
        Err(err) => {
            tracing::debug!(error = %err, scan_id = %scan_id, "Credential rejected");
            reject_unauthenticated(&tx, &err.to_string());
            drop(tx);
            let _ = writer.await;
            return;
        }
    };

    // ---- Joined ----
    let (conn, snapshot) = state.hub.join(identity, &scan_id, tx.clone()).await;
    conn.send(ServerMessage::SessionData {
        users: snapshot.users,
        locks: snapshot.locks,
        version: snapshot.version,
    });

    while let Some(msg) = receiver.next().await {
        match msg {
            Ok(Message::Text(text)) => {
                dispatch_message(&text, &conn, &state.hub).await;
            }
            Ok(Message::Close(_)) => {
                tracing::debug!(connection_id = %conn.id, "Connection closed by peer");
                break;
            }
            // Transport-level ping/pong is answered by axum; liveness
            // rides on the application-level probes instead.
            Ok(_) => {}
            Err(e) => {
                tracing::debug!(connection_id = %conn.id, error = %e, "WebSocket error");
                break;
            }
        }
    }

    // ---- Closed ----
    state.hub.disconnect(conn.id);
    let _ = tx.send(Outbound::Close(close_codes::NORMAL));
    drop(tx);
    let _ = writer.await;
}

/// Wait for the first in-band `auth` message. Other frames before
/// authentication are ignored; close or timeout yields `None`.
async fn await_auth_message(
    receiver: &mut futures::stream::SplitStream<WebSocket>,
    deadline: Duration,
) -> Option<(String, String)> {
    timeout(deadline, async {
        while let Some(msg) = receiver.next().await {
            match msg {
                Ok(Message::Text(text)) => {
                    if let Ok(ClientMessage::Auth {
                        credential,
                        session_id,
                        ..
                    }) = serde_json::from_str::<ClientMessage>(&text)
                    {
                        return Some((credential, session_id));
                    }
                }
                Ok(Message::Close(_)) | Err(_) => return None,
                _ => continue,
            }
        }
        None
    })
    .await
    .ok()
    .flatten()
}

/// Send the authentication failure reply and schedule the close frame.
/// The distinct close code tells clients not to retry with the same
/// credential.
fn reject_unauthenticated(tx: &mpsc::UnboundedSender<Outbound>, reason: &str) {
    let _ = tx.send(Outbound::Frame(ServerMessage::from_error(
        &AppError::Unauthorized(reason.to_string()),
    )));
    let _ = tx.send(Outbound::Close(close_codes::AUTH_FAILURE));
}

/// Interpret one inbound frame from a joined connection. Every request
/// ends in either a broadcast or an explicit reply; nothing is silently
/// dropped.
async fn dispatch_message(text: &str, conn: &Arc<Connection>, hub: &Arc<CollaborationHub>) {
    match serde_json::from_str::<ClientMessage>(text) {
        Ok(ClientMessage::DeviceLock { device_id }) => {
            hub.handle_device_lock(conn, device_id);
        }
        Ok(ClientMessage::DeviceUnlock { device_id }) => {
            hub.handle_device_unlock(conn, device_id).await;
        }
        Ok(ClientMessage::DeviceUpdate {
            device_id,
            changes,
            version,
        }) => {
            hub.handle_device_update(conn, device_id, changes, version).await;
        }
        Ok(ClientMessage::Ping) => {
            conn.send(ServerMessage::Pong);
        }
        Ok(ClientMessage::ServerPong { .. }) => {
            conn.note_pong();
        }
        Ok(ClientMessage::Auth { .. }) => {
            conn.send(ServerMessage::from_error(&AppError::Protocol(
                "already authenticated".into(),
            )));
        }
        Err(err) => {
            tracing::debug!(connection_id = %conn.id, error = %err, "Unparseable message");
            conn.send(ServerMessage::from_error(&AppError::Protocol(format!(
                "unrecognized message: {err}"
            ))));
        }
    }
}
