//! Shared relay state.
//!
//! DESIGN
//! ======
//! `AppState` is injected into Axum handlers via the `State` extractor. It
//! holds the live connection registry (one outbox per socket), the ephemeral
//! per-connection session records, and the retained teacher broadcasts. All
//! three maps are mutated only from event-handling tasks.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{RwLock, mpsc};
use uuid::Uuid;

use events::{Event, GroupId, Role};

// =============================================================================
// CONNECTION SESSION
// =============================================================================

/// What a connection told us at login. Purely for logging and disconnect
/// cleanup; peers learn about presence from the relayed events themselves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionSession {
    pub group_id: GroupId,
    pub role: Option<Role>,
}

// =============================================================================
// BROADCAST RETENTION
// =============================================================================

/// The two activities whose latest teacher push is retained for replay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RetentionSlot {
    Activity2,
    Activity3,
}

impl RetentionSlot {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            RetentionSlot::Activity2 => "activity2",
            RetentionSlot::Activity3 => "activity3",
        }
    }
}

impl std::fmt::Display for RetentionSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Last content the teacher pushed for one activity. Last-write-wins, no
/// history; replayed verbatim to any requesting student.
#[derive(Debug, Clone)]
pub struct RetainedBroadcast {
    pub event: Event,
    /// Milliseconds since the Unix epoch when the relay stored it.
    pub stored_at: i64,
}

// =============================================================================
// APP STATE
// =============================================================================

/// Shared relay state, injected into Axum handlers via the State extractor.
/// Clone is required by Axum; all inner fields are Arc-wrapped.
#[derive(Clone)]
pub struct AppState {
    /// Connected clients: connection id -> outbox of pre-encoded frames.
    pub clients: Arc<RwLock<HashMap<Uuid, mpsc::Sender<String>>>>,
    /// Session records keyed by connection id.
    pub sessions: Arc<RwLock<HashMap<Uuid, ConnectionSession>>>,
    /// Latest teacher push per retention slot.
    pub broadcasts: Arc<RwLock<HashMap<RetentionSlot, RetainedBroadcast>>>,
    /// Whether the TLS listener came up; reported by `/health`.
    pub https_enabled: bool,
}

impl AppState {
    #[must_use]
    pub fn new(https_enabled: bool) -> Self {
        Self {
            clients: Arc::new(RwLock::new(HashMap::new())),
            sessions: Arc::new(RwLock::new(HashMap::new())),
            broadcasts: Arc::new(RwLock::new(HashMap::new())),
            https_enabled,
        }
    }
}

// =============================================================================
// TEST HELPERS
// =============================================================================

#[cfg(test)]
pub mod test_helpers {
    use super::*;

    /// Create a bare test `AppState` (plain-only).
    #[must_use]
    pub fn test_app_state() -> AppState {
        AppState::new(false)
    }

    /// Register a fake connection and return its id plus the receiving end
    /// of its outbox.
    pub async fn register_client(state: &AppState) -> (Uuid, mpsc::Receiver<String>) {
        let conn_id = Uuid::new_v4();
        let (tx, rx) = mpsc::channel(32);
        state.clients.write().await.insert(conn_id, tx);
        (conn_id, rx)
    }
}

#[cfg(test)]
#[path = "state_test.rs"]
mod tests;
