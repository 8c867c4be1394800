//! Teacher seat store.
//!
//! The teacher seat is a singleton lock slot shared by every console on the
//! same persistence scope. Unlike group login, acquisition here is checked:
//! `login` verifies the seat is free (or already ours), then the password,
//! then re-reads the lock map and claims it — refusing if someone slipped
//! in between. The read-write window is still racy; best-effort exclusivity
//! is the accepted contract for a classroom.
//!
//! This is the one store that surfaces errors: seat acquisition needs a
//! definitive yes/no before the console unlocks.

#[cfg(test)]
#[path = "teacher_test.rs"]
mod teacher_test;

use std::sync::{Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};
use tracing::info;

use events::Event;

use crate::bus::EventBus;
use crate::locks::LockStore;
use crate::storage::{self, Storage};

/// The singleton seat slot in the teacher lock map.
pub const TEACHER_SLOT: &str = "teacher";

// Hardcoded by design; authentication hardening is out of scope.
const TEACHER_PASSWORD: &str = "123456";

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum TeacherLoginError {
    #[error("teacher console is already signed in from another window")]
    HeldElsewhere,
    #[error("wrong password")]
    WrongPassword,
    #[error("teacher seat was claimed by another window during login")]
    RaceLost,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
struct TeacherSession {
    logged: bool,
}

pub struct TeacherStore {
    locker_id: String,
    storage: Storage,
    locks: LockStore,
    bus: EventBus,
    session: Mutex<TeacherSession>,
}

impl TeacherStore {
    /// Open the store using the locker identity persisted in `storage`.
    #[must_use]
    pub fn open(storage: Storage, bus: EventBus) -> Self {
        let locker_id = storage::locker_id(&storage, storage::K_TEACHER_LOCKER);
        Self::open_with_locker(storage, bus, locker_id)
    }

    /// Open the store under an explicit locker identity, for hosts that
    /// manage profile identity themselves.
    #[must_use]
    pub fn open_with_locker(storage: Storage, bus: EventBus, locker_id: String) -> Self {
        let locks = LockStore::new(storage.clone(), storage::K_TEACHER_LOCK);
        let session = storage.read_json(storage::K_TEACHER_SESSION, TeacherSession::default());

        let store = Self { locker_id, storage, locks, bus, session: Mutex::new(session) };
        store.auto_relogin();
        store
    }

    #[must_use]
    pub fn locker_id(&self) -> &str {
        &self.locker_id
    }

    /// Logged in means: this locker holds the seat AND the session flag is
    /// set. A seat held elsewhere always reads as logged out here.
    #[must_use]
    pub fn is_logged_in(&self) -> bool {
        self.locks.holds(TEACHER_SLOT, &self.locker_id) && lock(&self.session).logged
    }

    /// Whether a login attempt could succeed: seat free or already ours.
    #[must_use]
    pub fn can_login(&self) -> bool {
        match self.locks.owner(TEACHER_SLOT) {
            None => true,
            Some(owner) => owner == self.locker_id,
        }
    }

    /// Claim the teacher seat.
    ///
    /// # Errors
    ///
    /// Distinct errors for a seat held elsewhere, a wrong password, and a
    /// seat lost to a concurrent claimant between check and acquire.
    pub fn login(&self, password: &str) -> Result<(), TeacherLoginError> {
        if !self.can_login() {
            return Err(TeacherLoginError::HeldElsewhere);
        }
        if password != TEACHER_PASSWORD {
            return Err(TeacherLoginError::WrongPassword);
        }
        if !self.locks.try_acquire(TEACHER_SLOT, &self.locker_id).acquired {
            return Err(TeacherLoginError::RaceLost);
        }

        let mut session = lock(&self.session);
        session.logged = true;
        self.persist(&session);
        info!("teacher: seat acquired");
        Ok(())
    }

    /// Release the seat (only if ours), clear pushed-content artifacts, and
    /// tell the relay to drop its retained broadcasts.
    pub async fn logout(&self) {
        self.locks.release(TEACHER_SLOT, &self.locker_id);
        {
            let mut session = lock(&self.session);
            session.logged = false;
            self.persist(&session);
        }

        self.storage.remove(storage::K_TEACHER_DEMO_CODE);
        self.storage.remove(storage::K_TEACHER_DEMO_CODE_INFO);

        self.bus.emit(Event::TeacherLogout).await;
        info!("teacher: seat released");
    }

    /// Restore a prior session only while this locker still holds the seat.
    /// A seat taken over elsewhere while this console was asleep forces
    /// logout; an unclaimed seat leaves the persisted flag untouched.
    fn auto_relogin(&self) {
        match self.locks.owner(TEACHER_SLOT) {
            None => {}
            Some(owner) if owner == self.locker_id => {
                let mut session = lock(&self.session);
                session.logged = true;
                self.persist(&session);
            }
            Some(_) => {
                let mut session = lock(&self.session);
                session.logged = false;
                self.persist(&session);
            }
        }
    }

    fn persist(&self, session: &TeacherSession) {
        self.storage.write_json(storage::K_TEACHER_SESSION, session);
    }
}

fn lock<'a>(session: &'a Mutex<TeacherSession>) -> MutexGuard<'a, TeacherSession> {
    session.lock().unwrap_or_else(PoisonError::into_inner)
}
