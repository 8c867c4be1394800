//! Ephemeral per-connection session records.
//!
//! Records are written on `session:login`, erased on `session:logout` or
//! disconnect. They never drive broadcasts; peers detect absence through the
//! next explicit logout event or the ping/re-announce cycle.

use tracing::info;
use uuid::Uuid;

use events::{GroupId, Role};

use crate::state::{AppState, ConnectionSession};

/// Record the group/role a connection claimed at login.
pub async fn record(state: &AppState, conn_id: Uuid, group_id: GroupId, role: Option<Role>) {
    state
        .sessions
        .write()
        .await
        .insert(conn_id, ConnectionSession { group_id, role });
    info!(%conn_id, group_id, role = role.map(|r| r.to_string()).unwrap_or_default(), "session: recorded login");
}

/// Erase a connection's session record, if any. Best-effort.
pub async fn erase(state: &AppState, conn_id: Uuid) {
    if let Some(session) = state.sessions.write().await.remove(&conn_id) {
        info!(%conn_id, group_id = session.group_id, "session: erased");
    }
}

#[cfg(test)]
#[path = "session_test.rs"]
mod tests;
