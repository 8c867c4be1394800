//! Event fan-out across the live connection registry.

use tracing::warn;
use uuid::Uuid;

use events::Event;

use crate::state::AppState;

/// Broadcast an event to every connection except `exclude`.
pub async fn broadcast_others(state: &AppState, event: &Event, exclude: Uuid) {
    let Ok(text) = events::encode(event) else {
        warn!(kind = event.kind(), "relay: failed to encode outbound event");
        return;
    };
    broadcast_text(state, &text, Some(exclude)).await;
}

/// Broadcast an event to every connection, sender included.
pub async fn broadcast_all(state: &AppState, event: &Event) {
    let Ok(text) = events::encode(event) else {
        warn!(kind = event.kind(), "relay: failed to encode outbound event");
        return;
    };
    broadcast_text(state, &text, None).await;
}

/// Broadcast a pre-encoded frame. Used for the passthrough path, where the
/// relay forwards frames it cannot decode itself so newer clients can still
/// talk through an older relay.
pub async fn broadcast_text(state: &AppState, text: &str, exclude: Option<Uuid>) {
    let clients = state.clients.read().await;
    for (conn_id, tx) in clients.iter() {
        if exclude == Some(*conn_id) {
            continue;
        }
        // Best-effort: if a client's outbox is full, skip it.
        let _ = tx.try_send(text.to_owned());
    }
}

#[cfg(test)]
#[path = "relay_test.rs"]
mod tests;
