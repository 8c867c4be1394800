//! WebSocket handler — the relay loop.
//!
//! DESIGN
//! ======
//! On upgrade, generates a connection ID, registers an outbox, and enters a
//! `select!` loop:
//! - Inbound client frames → decode + dispatch by event kind
//! - Frames relayed from peers → forward to this client
//!
//! Dispatch lives in `process_inbound_text`, which applies fan-out through
//! the relay service and returns only the frames owed to the sender (the
//! retained-broadcast replay path). That split keeps protocol logic testable
//! without sockets.
//!
//! LIFECYCLE
//! =========
//! 1. Upgrade → register outbox under a fresh connection id
//! 2. Client sends events → dispatch → retain/record/fan out
//! 3. Close → drop outbox + session record (peers are NOT notified; absence
//!    is detected through explicit logouts or the ping/re-announce cycle)

use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::Response;
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

use events::{ActivityKey, Event};

use crate::services::{relay, retention, session};
use crate::state::{AppState, RetentionSlot};

// =============================================================================
// UPGRADE
// =============================================================================

pub async fn handle_ws(State(state): State<AppState>, ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(move |socket| run_ws(socket, state))
}

// =============================================================================
// CONNECTION
// =============================================================================

async fn run_ws(mut socket: WebSocket, state: AppState) {
    let conn_id = Uuid::new_v4();

    // Per-connection outbox for frames relayed from peers.
    let (client_tx, mut client_rx) = mpsc::channel::<String>(256);
    state.clients.write().await.insert(conn_id, client_tx);
    info!(%conn_id, "ws: client connected");

    'conn: loop {
        tokio::select! {
            msg = socket.recv() => {
                let Some(msg) = msg else { break 'conn };
                let Ok(msg) = msg else { break 'conn };
                match msg {
                    Message::Text(text) => {
                        for frame in process_inbound_text(&state, conn_id, &text).await {
                            if socket.send(Message::Text(frame.into())).await.is_err() {
                                break 'conn;
                            }
                        }
                    }
                    Message::Close(_) => break 'conn,
                    _ => {}
                }
            }
            Some(frame) = client_rx.recv() => {
                if socket.send(Message::Text(frame.into())).await.is_err() {
                    break 'conn;
                }
            }
        }
    }

    // Best-effort cleanup; peers rely on explicit logout events or the next
    // ping cycle to notice the absence.
    state.clients.write().await.remove(&conn_id);
    session::erase(&state, conn_id).await;
    info!(%conn_id, "ws: client disconnected");
}

// =============================================================================
// DISPATCH
// =============================================================================

/// Decode and process one inbound text frame. Fan-out happens inside; the
/// returned frames go to the sender only.
pub(crate) async fn process_inbound_text(state: &AppState, conn_id: Uuid, text: &str) -> Vec<String> {
    let event = match events::decode(text) {
        Ok(event) => event,
        Err(e) => {
            // Pass through frames this relay is too old to understand, as
            // long as they look like tagged events; drop everything else.
            let tagged = serde_json::from_str::<serde_json::Value>(text)
                .ok()
                .is_some_and(|v| v.get("type").is_some_and(serde_json::Value::is_string));
            if tagged {
                warn!(%conn_id, error = %e, "ws: passing through unknown event kind");
                relay::broadcast_text(state, text, Some(conn_id)).await;
            } else {
                warn!(%conn_id, error = %e, "ws: dropping invalid inbound frame");
            }
            return Vec::new();
        }
    };

    info!(%conn_id, kind = event.kind(), group_id = event.group_id(), "ws: recv event");

    match &event {
        Event::SessionLogin { group_id, role } => {
            session::record(state, conn_id, *group_id, *role).await;
            relay::broadcast_others(state, &event, conn_id).await;
        }
        Event::SessionLogout { .. } => {
            session::erase(state, conn_id).await;
            relay::broadcast_others(state, &event, conn_id).await;
        }
        Event::TeacherBroadcast { activity: ActivityKey::A2, .. } => {
            retention::retain(state, RetentionSlot::Activity2, event.clone()).await;
            relay::broadcast_others(state, &event, conn_id).await;
        }
        Event::TeacherDirectionsBroadcast { activity: ActivityKey::A3, .. } => {
            retention::retain(state, RetentionSlot::Activity3, event.clone()).await;
            relay::broadcast_others(state, &event, conn_id).await;
        }
        Event::RequestBroadcast { activity, .. } => {
            if let Some(slot) = retention::slot_for(*activity) {
                if let Some(retained) = retention::replay(state, slot).await {
                    info!(%conn_id, %slot, "ws: replaying retained broadcast to requester");
                    if let Ok(frame) = events::encode(&retained) {
                        return vec![frame];
                    }
                }
            }
        }
        Event::ClearBroadcasts | Event::TeacherLogout => {
            retention::clear(state).await;
            relay::broadcast_all(state, &Event::BroadcastsCleared).await;
        }
        Event::TeacherPing => {
            // Liveness probe goes to every connection, sender included, so
            // each client re-announces itself.
            relay::broadcast_all(state, &event).await;
        }
        _ => {
            relay::broadcast_others(state, &event, conn_id).await;
        }
    }

    Vec::new()
}

#[cfg(test)]
#[path = "ws_test.rs"]
mod tests;
