//! Teacher broadcast retention.
//!
//! The relay keeps the latest teacher push per activity so late joiners and
//! reconnecting students can catch up. One record per slot, last-write-wins.
//! The whole store is wiped on teacher logout or an explicit clear.

use tracing::info;

use events::{ActivityKey, Event};

use crate::state::{AppState, RetainedBroadcast, RetentionSlot};

/// Map a requested activity onto its retention slot. The first activity has
/// no teacher push to retain.
#[must_use]
pub fn slot_for(activity: ActivityKey) -> Option<RetentionSlot> {
    match activity {
        ActivityKey::A1 => None,
        ActivityKey::A2 => Some(RetentionSlot::Activity2),
        ActivityKey::A3 => Some(RetentionSlot::Activity3),
    }
}

/// Store an event as the latest push for a slot, displacing any prior one.
pub async fn retain(state: &AppState, slot: RetentionSlot, event: Event) {
    info!(%slot, kind = event.kind(), "retention: stored latest broadcast");
    state
        .broadcasts
        .write()
        .await
        .insert(slot, RetainedBroadcast { event, stored_at: events::now_ms() });
}

/// The retained event for a slot, if any, for verbatim replay.
pub async fn replay(state: &AppState, slot: RetentionSlot) -> Option<Event> {
    state
        .broadcasts
        .read()
        .await
        .get(&slot)
        .map(|retained| retained.event.clone())
}

/// Drop every retained broadcast.
pub async fn clear(state: &AppState) {
    let mut broadcasts = state.broadcasts.write().await;
    if !broadcasts.is_empty() {
        info!(count = broadcasts.len(), "retention: cleared");
    }
    broadcasts.clear();
}

#[cfg(test)]
#[path = "retention_test.rs"]
mod tests;
