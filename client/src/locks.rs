//! Advisory ownership locks.
//!
//! A lock map lives under one storage key: `slot → { by, at }`. Locks are
//! advisory — they exist so UIs can warn about contention, not to enforce
//! mutual exclusion. Two acquisition modes exist:
//!
//! - [`LockStore::overwrite`]: last writer wins, used for group sessions.
//! - [`LockStore::try_acquire`]: re-read-then-write with refusal, used for
//!   the teacher seat. The read-write window is not atomic across processes;
//!   that race is accepted for a classroom-sized deployment.
//!
//! Both report what happened through [`Acquisition`] so callers can surface
//! contention instead of discovering it later.

#[cfg(test)]
#[path = "locks_test.rs"]
mod locks_test;

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::storage::Storage;

/// One lock record: which locker claimed the slot, and when (epoch millis).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockEntry {
    pub by: String,
    pub at: i64,
}

/// Outcome of an acquisition attempt.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Acquisition {
    pub acquired: bool,
    /// The different locker that held (or still holds) the slot, if any.
    pub previous_owner: Option<String>,
}

/// Lock map handle bound to one storage key.
#[derive(Clone, Debug)]
pub struct LockStore {
    storage: Storage,
    map_key: &'static str,
}

impl LockStore {
    #[must_use]
    pub fn new(storage: Storage, map_key: &'static str) -> Self {
        Self { storage, map_key }
    }

    fn read_map(&self) -> HashMap<String, LockEntry> {
        self.storage.read_json(self.map_key, HashMap::new())
    }

    fn write_map(&self, map: &HashMap<String, LockEntry>) {
        self.storage.write_json(self.map_key, map);
    }

    /// Current owner of a slot, if any.
    #[must_use]
    pub fn owner(&self, slot: &str) -> Option<String> {
        self.read_map().get(slot).map(|entry| entry.by.clone())
    }

    /// Whether `locker` currently holds the slot.
    #[must_use]
    pub fn holds(&self, slot: &str, locker: &str) -> bool {
        self.owner(slot).is_some_and(|owner| owner == locker)
    }

    /// Claim a slot unconditionally; last writer wins. Reports whoever got
    /// displaced so the caller can warn.
    pub fn overwrite(&self, slot: &str, locker: &str) -> Acquisition {
        let mut map = self.read_map();
        let previous_owner = map
            .get(slot)
            .map(|entry| entry.by.clone())
            .filter(|owner| owner != locker);
        map.insert(slot.to_owned(), LockEntry { by: locker.to_owned(), at: events::now_ms() });
        self.write_map(&map);
        Acquisition { acquired: true, previous_owner }
    }

    /// Re-read the map, then claim the slot only when it is free or already
    /// ours. Refuses when a different locker holds it.
    pub fn try_acquire(&self, slot: &str, locker: &str) -> Acquisition {
        let mut map = self.read_map();
        if let Some(entry) = map.get(slot) {
            if entry.by != locker {
                return Acquisition { acquired: false, previous_owner: Some(entry.by.clone()) };
            }
        }
        map.insert(slot.to_owned(), LockEntry { by: locker.to_owned(), at: events::now_ms() });
        self.write_map(&map);
        Acquisition { acquired: true, previous_owner: None }
    }

    /// Release a slot, but only when `locker` owns it.
    pub fn release(&self, slot: &str, locker: &str) {
        let mut map = self.read_map();
        if map.get(slot).is_some_and(|entry| entry.by == locker) {
            map.remove(slot);
            self.write_map(&map);
        }
    }
}
