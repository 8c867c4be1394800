//! Shared on-device storage.
//!
//! A directory of one-JSON-file-per-key, playing the role browser local
//! storage plays for the web front end: shared by every "tab" (store
//! instance) pointed at the same directory, surviving restarts. Reads fall
//! back to the caller's default on any corruption; writes are best-effort.
//! Nothing in this module ever fails the caller.

#[cfg(test)]
#[path = "storage_test.rs"]
mod storage_test;

use std::path::PathBuf;

use rand::Rng;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::warn;

// Stable storage keys; durability across reloads depends on these not moving.
pub const K_SESSION_LOCKER: &str = "session_locker";
pub const K_SESSION_LOCKS: &str = "session_locks";
pub const K_SESSION_CURRENT: &str = "session_current";
pub const K_TEACHER_LOCKER: &str = "teacher_locker_id";
pub const K_TEACHER_LOCK: &str = "teacher_lock";
pub const K_TEACHER_SESSION: &str = "teacher_session";
pub const K_TEACHER_DEMO_CODE: &str = "teacher_demo_code";
pub const K_TEACHER_DEMO_CODE_INFO: &str = "teacher_demo_code_info";

/// Directory-backed JSON key/value store.
#[derive(Clone, Debug)]
pub struct Storage {
    dir: PathBuf,
}

impl Storage {
    /// Open (and create if needed) a storage directory.
    ///
    /// # Errors
    ///
    /// Returns an IO error when the directory cannot be created.
    pub fn open(dir: impl Into<PathBuf>) -> std::io::Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }

    /// Read a value, falling back to `default` when the key is absent or the
    /// stored JSON is malformed.
    pub fn read_json<T: DeserializeOwned>(&self, key: &str, default: T) -> T {
        match std::fs::read_to_string(self.path_for(key)) {
            Ok(text) => serde_json::from_str(&text).unwrap_or_else(|e| {
                warn!(key, error = %e, "storage: malformed value, using default");
                default
            }),
            Err(_) => default,
        }
    }

    /// Write a value. Best-effort: failures are logged, never surfaced.
    pub fn write_json<T: Serialize>(&self, key: &str, value: &T) {
        let text = match serde_json::to_string(value) {
            Ok(text) => text,
            Err(e) => {
                warn!(key, error = %e, "storage: failed to serialize value");
                return;
            }
        };
        if let Err(e) = std::fs::write(self.path_for(key), text) {
            warn!(key, error = %e, "storage: failed to write value");
        }
    }

    /// Delete a key. Missing keys are fine.
    pub fn remove(&self, key: &str) {
        let _ = std::fs::remove_file(self.path_for(key));
    }
}

/// The locker identity stored under `key`: an opaque random string generated
/// once per profile and persisted. Never regenerated implicitly; it survives
/// logout so the same profile can reclaim its locks.
pub fn locker_id(storage: &Storage, key: &str) -> String {
    let existing: Option<String> = storage.read_json(key, None);
    if let Some(id) = existing {
        return id;
    }

    let id: String = rand::rng()
        .sample_iter(rand::distr::Alphanumeric)
        .take(16)
        .map(char::from)
        .collect();
    storage.write_json(key, &id);
    id
}
