//! Student/operator session store.
//!
//! Persistent login with advisory group locking: logging in claims the group
//! lock unconditionally (last writer wins — the asymmetry with the checked
//! teacher seat is deliberate and documented), persists the session, and
//! announces it on the bus. Reopening the store with a live persisted
//! session re-claims the lock and re-announces, which is what makes login
//! survive a reload with nothing re-entered.
//!
//! While logged in, the store answers `teacher:ping` by re-emitting
//! `session:login` and, for recorders, one `student:update` per activity
//! with a recorded score — a reloaded teacher dashboard rebuilds entirely
//! from these re-announcements.

#[cfg(test)]
#[path = "session_test.rs"]
mod session_test;

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};
use tracing::info;

use events::{ActivityKey, Event, GroupId, Role};

use crate::bus::{EventBus, Subscription};
use crate::locks::{Acquisition, LockStore};
use crate::storage::{self, Storage};

/// The activity tab restored after a reload.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TabKey {
    #[default]
    Activity1,
    Activity2,
    Activity3,
    Activity4,
}

/// Everything the store persists between reloads.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedSession {
    pub group_id: Option<GroupId>,
    pub current_tab: TabKey,
    pub role: Option<Role>,
    /// Arbitrary progress payloads keyed by group, then record name.
    pub records_by_group: HashMap<String, HashMap<String, serde_json::Value>>,
}

fn group_key(group_id: GroupId) -> String {
    group_id.to_string()
}

fn stars_key(activity: ActivityKey) -> String {
    format!("stars_{activity}")
}

pub struct SessionStore {
    locker_id: String,
    storage: Storage,
    locks: LockStore,
    bus: EventBus,
    state: Arc<Mutex<PersistedSession>>,
    // Held so the ping responder stays attached for the store's lifetime.
    _ping_sub: Subscription,
}

impl SessionStore {
    /// Open the store on shared storage. A persisted live session triggers
    /// auto-relogin: the group lock is re-claimed unconditionally and
    /// `session:login` re-announced.
    pub async fn open(storage: Storage, bus: EventBus) -> Self {
        let locker_id = storage::locker_id(&storage, storage::K_SESSION_LOCKER);
        let locks = LockStore::new(storage.clone(), storage::K_SESSION_LOCKS);
        let state: Arc<Mutex<PersistedSession>> = Arc::new(Mutex::new(
            storage.read_json(storage::K_SESSION_CURRENT, PersistedSession::default()),
        ));

        let relogin = {
            let s = lock(&state);
            s.group_id.map(|group_id| (group_id, s.role.unwrap_or(Role::Recorder)))
        };
        if let Some((group_id, role)) = relogin {
            locks.overwrite(&group_key(group_id), &locker_id);
            info!(group_id, "session: restored login from persisted state");
            bus.emit(Event::SessionLogin { group_id, role: Some(role) }).await;
        }

        let ping_sub = spawn_ping_responder(&bus, &state);

        Self { locker_id, storage, locks, bus, state, _ping_sub: ping_sub }
    }

    /// This profile's locker identity.
    #[must_use]
    pub fn locker_id(&self) -> &str {
        &self.locker_id
    }

    /// Whether a session is active. Deliberately checks only the persisted
    /// group id, NOT current lock ownership: possession of local state
    /// counts as proof of session even if another device has since taken
    /// the lock. Flagged for product review; do not "fix" silently.
    #[must_use]
    pub fn is_logged_in(&self) -> bool {
        lock(&self.state).group_id.is_some()
    }

    #[must_use]
    pub fn group_id(&self) -> Option<GroupId> {
        lock(&self.state).group_id
    }

    #[must_use]
    pub fn role(&self) -> Option<Role> {
        lock(&self.state).role
    }

    #[must_use]
    pub fn current_tab(&self) -> TabKey {
        lock(&self.state).current_tab
    }

    pub fn set_tab(&self, tab: TabKey) {
        let mut s = lock(&self.state);
        s.current_tab = tab;
        self.persist(&s);
    }

    /// Claim a group and go to `LoggedIn`. No rejection path: the group lock
    /// is overwritten even when someone else holds it, and the returned
    /// [`Acquisition`] tells the caller who was displaced.
    pub async fn login(&self, group_id: GroupId, role: Role) -> Acquisition {
        let acquisition = self.locks.overwrite(&group_key(group_id), &self.locker_id);
        if let Some(previous) = &acquisition.previous_owner {
            info!(group_id, previous, "session: displaced an existing group claim");
        }

        {
            let mut s = lock(&self.state);
            s.group_id = Some(group_id);
            s.role = Some(role);
            self.persist(&s);
        }

        self.bus.emit(Event::SessionLogin { group_id, role: Some(role) }).await;
        acquisition
    }

    /// Release the group (only if we own its lock), drop this group's
    /// accumulated records, and go to `LoggedOut`. The teacher-side copy of
    /// the records is intentionally untouched: a disconnect is not evidence
    /// of intent to discard progress.
    pub async fn logout(&self) {
        let (group_id, role) = {
            let mut s = lock(&self.state);
            let group_id = s.group_id.take();
            let role = s.role.take();
            if let Some(group_id) = group_id {
                s.records_by_group.remove(&group_key(group_id));
            }
            self.persist(&s);
            (group_id, role)
        };

        let Some(group_id) = group_id else { return };
        self.locks.release(&group_key(group_id), &self.locker_id);
        self.bus.emit(Event::SessionLogout { group_id, role }).await;
    }

    /// Read a record for the active group, falling back to `default` when
    /// logged out or unset.
    pub fn record<T: serde::de::DeserializeOwned>(&self, key: &str, default: T) -> T {
        let s = lock(&self.state);
        let Some(group_id) = s.group_id else { return default };
        s.records_by_group
            .get(&group_key(group_id))
            .and_then(|records| records.get(key))
            .and_then(|value| serde_json::from_value(value.clone()).ok())
            .unwrap_or(default)
    }

    /// Write a record for the active group. A no-op when logged out.
    pub fn set_record(&self, key: &str, value: serde_json::Value) {
        let mut s = lock(&self.state);
        let Some(group_id) = s.group_id else { return };
        s.records_by_group
            .entry(group_key(group_id))
            .or_default()
            .insert(key.to_owned(), value);
        self.persist(&s);
    }

    /// Persist a star score for the active group and announce it. This is
    /// the hook activity screens call on every grading change; the same
    /// records feed the ping responder's replay.
    pub async fn record_stars(
        &self,
        activity: ActivityKey,
        stars: u32,
        payload: Option<serde_json::Value>,
    ) {
        let group_id = {
            let mut s = lock(&self.state);
            let Some(group_id) = s.group_id else { return };
            s.records_by_group
                .entry(group_key(group_id))
                .or_default()
                .insert(stars_key(activity), serde_json::json!(stars));
            self.persist(&s);
            group_id
        };

        self.bus.emit(Event::StudentUpdate { group_id, activity, stars, payload }).await;
    }

    fn persist(&self, state: &PersistedSession) {
        self.storage.write_json(storage::K_SESSION_CURRENT, state);
    }
}

/// Answer `teacher:ping` while logged in: re-announce presence, and replay
/// recorded scores when this seat is the recorder.
fn spawn_ping_responder(bus: &EventBus, state: &Arc<Mutex<PersistedSession>>) -> Subscription {
    let bus_out = bus.clone();
    let state = Arc::clone(state);
    bus.subscribe(move |event| {
        if !matches!(event, Event::TeacherPing) {
            return;
        }

        // Snapshot under the lock, emit outside it.
        let replay = {
            let s = lock(&state);
            let Some(group_id) = s.group_id else { return };
            let role = s.role.unwrap_or(Role::Recorder);

            let mut stars = Vec::new();
            if role == Role::Recorder {
                if let Some(records) = s.records_by_group.get(&group_key(group_id)) {
                    for activity in ActivityKey::ALL {
                        if let Some(value) = records.get(&stars_key(activity)) {
                            if let Some(n) = value.as_u64() {
                                stars.push((activity, u32::try_from(n).unwrap_or(0)));
                            }
                        }
                    }
                }
            }
            (group_id, role, stars)
        };

        let (group_id, role, stars) = replay;
        let bus = bus_out.clone();
        tokio::spawn(async move {
            bus.emit(Event::SessionLogin { group_id, role: Some(role) }).await;
            for (activity, stars) in stars {
                bus.emit(Event::StudentUpdate { group_id, activity, stars, payload: None }).await;
            }
        });
    })
}

fn lock<'a>(state: &'a Mutex<PersistedSession>) -> MutexGuard<'a, PersistedSession> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}
