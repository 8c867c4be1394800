//! Client-side realtime classroom library.
//!
//! ARCHITECTURE
//! ============
//! Everything a student or teacher front end needs to participate in the
//! classroom sync protocol, UI-framework agnostic:
//!
//! - [`storage`] — shared on-device JSON storage and the locker identity
//! - [`locks`] — advisory group/teacher seat locks over that storage
//! - [`bus`] — the dual-channel event bus (same-device hub + relay socket)
//! - [`transport`] — the production websocket transport
//! - [`session`] — the student/operator session store
//! - [`teacher`] — the singleton teacher seat store
//! - [`dashboard`] — the teacher-side read model folded from the stream
//!
//! Sync is best-effort by design: bus and storage failures degrade silently
//! so classroom activity keeps working offline. Only teacher login surfaces
//! errors, because seat acquisition needs a definitive answer.

pub mod bus;
pub mod dashboard;
pub mod locks;
pub mod session;
pub mod storage;
pub mod teacher;
pub mod transport;

#[cfg(test)]
pub mod test_support;

pub use bus::{EventBus, LocalHub, Subscription, Transport, TransportError, TransportLink};
pub use dashboard::{Dashboard, GroupData, GroupStars};
pub use locks::{Acquisition, LockEntry, LockStore};
pub use session::{PersistedSession, SessionStore, TabKey};
pub use storage::Storage;
pub use teacher::{TeacherLoginError, TeacherStore};
pub use transport::WsTransport;
