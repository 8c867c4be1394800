//! Teacher dashboard read model.
//!
//! A pure projection folded from the event stream: per-group star counts and
//! record payloads, plus the set of currently online groups. Never persisted
//! and never written back to the bus — after a reload it rebuilds entirely
//! from the re-announcements a `teacher:ping` provokes.
//!
//! Folding is idempotent by construction: `student:update` carries absolute
//! scores, so duplicate delivery over the bus's two legs lands on the same
//! state.

#[cfg(test)]
#[path = "dashboard_test.rs"]
mod dashboard_test;

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use events::{ActivityKey, Event, GroupId, Role};

use crate::bus::{EventBus, Subscription};

/// Groups the dashboard renders, whether or not they ever come online.
pub const GROUP_COUNT: GroupId = 13;

/// Absolute star scores for one group.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct GroupStars {
    pub a1: u32,
    pub a2: u32,
    pub a3: u32,
    pub total: u32,
}

/// One group's aggregate: scores plus the latest raw payload per activity.
#[derive(Clone, Debug, Default)]
pub struct GroupData {
    pub stars: GroupStars,
    pub records: HashMap<ActivityKey, serde_json::Value>,
}

#[derive(Debug, Default)]
struct DashboardState {
    data_by_group: HashMap<GroupId, GroupData>,
    online: BTreeSet<GroupId>,
}

pub struct Dashboard {
    bus: EventBus,
    state: Arc<Mutex<DashboardState>>,
    subscription: Mutex<Option<Subscription>>,
}

impl Dashboard {
    #[must_use]
    pub fn new(bus: EventBus) -> Self {
        Self {
            bus,
            state: Arc::new(Mutex::new(DashboardState::default())),
            subscription: Mutex::new(None),
        }
    }

    /// The fixed group roster, 1 through [`GROUP_COUNT`].
    #[must_use]
    pub fn roster() -> Vec<GroupId> {
        (1..=GROUP_COUNT).collect()
    }

    /// Begin folding the event stream. Idempotent: repeated calls keep the
    /// single existing subscription.
    pub fn start(&self) {
        let mut subscription = lock_sub(&self.subscription);
        if subscription.is_some() {
            return;
        }
        let state = Arc::clone(&self.state);
        *subscription = Some(self.bus.subscribe(move |event| {
            fold(&mut lock_state(&state), event);
        }));
    }

    /// Detach from the stream, permitting a later restart. Folded data stays.
    pub fn stop(&self) {
        if let Some(subscription) = lock_sub(&self.subscription).take() {
            subscription.unsubscribe();
        }
    }

    /// Fold one event directly. `start` wires this to the bus; tests and
    /// replay paths may call it on their own.
    pub fn apply(&self, event: &Event) {
        fold(&mut lock_state(&self.state), event);
    }

    #[must_use]
    pub fn stars(&self, group_id: GroupId) -> GroupStars {
        lock_state(&self.state)
            .data_by_group
            .get(&group_id)
            .map(|data| data.stars)
            .unwrap_or_default()
    }

    #[must_use]
    pub fn record(&self, group_id: GroupId, activity: ActivityKey) -> Option<serde_json::Value> {
        lock_state(&self.state)
            .data_by_group
            .get(&group_id)
            .and_then(|data| data.records.get(&activity))
            .cloned()
    }

    #[must_use]
    pub fn online_groups(&self) -> Vec<GroupId> {
        lock_state(&self.state).online.iter().copied().collect()
    }

    #[must_use]
    pub fn is_online(&self, group_id: GroupId) -> bool {
        lock_state(&self.state).online.contains(&group_id)
    }
}

fn fold(state: &mut DashboardState, event: &Event) {
    match event {
        // Only recorder (or role-less legacy) logins mark a group online;
        // an operator joining says nothing about the group's recorder.
        Event::SessionLogin { group_id, role } => {
            if matches!(role, Some(Role::Recorder) | None) {
                state.data_by_group.entry(*group_id).or_default();
                state.online.insert(*group_id);
            }
        }
        // Offline, but never forgotten: records and stars survive logout so
        // a flaky network cannot erase classroom progress.
        Event::SessionLogout { group_id, .. } => {
            state.online.remove(group_id);
        }
        Event::StudentUpdate { group_id, activity, stars, payload } => {
            let data = state.data_by_group.entry(*group_id).or_default();
            data.records
                .insert(*activity, payload.clone().unwrap_or(serde_json::Value::Null));
            match activity {
                ActivityKey::A1 => data.stars.a1 = *stars,
                ActivityKey::A2 => data.stars.a2 = *stars,
                ActivityKey::A3 => data.stars.a3 = *stars,
            }
            data.stars.total = data.stars.a1 + data.stars.a2 + data.stars.a3;
        }
        _ => {}
    }
}

fn lock_state<'a>(state: &'a Mutex<DashboardState>) -> MutexGuard<'a, DashboardState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

fn lock_sub<'a>(sub: &'a Mutex<Option<Subscription>>) -> MutexGuard<'a, Option<Subscription>> {
    sub.lock().unwrap_or_else(PoisonError::into_inner)
}
