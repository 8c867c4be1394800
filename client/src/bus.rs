//! Dual-channel event bus.
//!
//! DESIGN
//! ======
//! `emit` publishes every event twice: synchronously onto the same-device
//! [`LocalHub`] (other "tabs" sharing the hub) and, after a lazily
//! established connection, onto the relay socket for remote devices. The two
//! legs give no ordering or single-delivery guarantee — a peer reachable
//! over both may see the same logical event twice, so every event in the
//! taxonomy is state-setting rather than a delta.
//!
//! The remote leg is an explicit connection manager with an injectable
//! [`Transport`]: `Idle` until the first `emit`/`subscribe`, `Connecting`
//! while the (mutex-guarded) dial is in flight, then `Connected` or
//! `Failed`. A failed dial is memoized: the bus stays offline for its
//! lifetime and keeps serving the local leg. Transport trouble is never
//! surfaced to callers — login and friends must keep working when sync is
//! degraded.

#[cfg(test)]
#[path = "bus_test.rs"]
mod bus_test;

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex, PoisonError, Weak};

use tokio::sync::{Mutex, broadcast, mpsc};
use tracing::{debug, warn};
use uuid::Uuid;

use events::Event;

// =============================================================================
// LOCAL HUB
// =============================================================================

/// The same-device leg: a process-wide broadcast channel shared by every bus
/// ("tab") on this device. Envelopes carry the publishing bus's origin so a
/// bus never redelivers its own publishes to itself — whether the sender
/// hears its own event back is the relay's decision, not the hub's.
#[derive(Clone)]
pub struct LocalHub {
    tx: broadcast::Sender<LocalEnvelope>,
}

#[derive(Clone, Debug)]
struct LocalEnvelope {
    origin: Uuid,
    event: Event,
}

impl LocalHub {
    #[must_use]
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(256);
        Self { tx }
    }

    fn publish(&self, origin: Uuid, event: Event) {
        // No subscribers is fine.
        let _ = self.tx.send(LocalEnvelope { origin, event });
    }

    fn listen(&self) -> broadcast::Receiver<LocalEnvelope> {
        self.tx.subscribe()
    }
}

impl Default for LocalHub {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// TRANSPORT SEAM
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("connect failed: {0}")]
    Connect(String),
    #[error("transport closed")]
    Closed,
}

/// A live remote link: push outbound events in, pull relayed events out.
/// Dropping either side tears the link down.
pub struct TransportLink {
    pub outgoing: mpsc::Sender<Event>,
    pub incoming: mpsc::Receiver<Event>,
}

/// The remote leg's dialing seam. The production implementation is
/// `transport::WsTransport`; tests inject loopbacks and failures.
#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    /// Dial once, applying the transport's own bounded retry policy.
    ///
    /// # Errors
    ///
    /// Returns a [`TransportError`] once retries are exhausted.
    async fn connect(&self) -> Result<TransportLink, TransportError>;
}

// =============================================================================
// EVENT BUS
// =============================================================================

type Handler = Arc<dyn Fn(&Event) + Send + Sync>;

enum RemoteState {
    Idle,
    Connected(mpsc::Sender<Event>),
    Failed,
}

struct BusInner {
    origin: Uuid,
    hub: LocalHub,
    transport: Arc<dyn Transport>,
    handlers: StdMutex<HashMap<u64, Handler>>,
    next_handler: AtomicU64,
    remote: Mutex<RemoteState>,
}

/// One tab's handle on the classroom event stream. Cheap to clone; clones
/// share the same connection and handler registry.
#[derive(Clone)]
pub struct EventBus {
    inner: Arc<BusInner>,
}

impl EventBus {
    /// Create a bus on a device hub with an injectable remote transport.
    /// Must be called within a Tokio runtime: the hub pump task starts here.
    #[must_use]
    pub fn new(hub: LocalHub, transport: Arc<dyn Transport>) -> Self {
        let inner = Arc::new(BusInner {
            origin: Uuid::new_v4(),
            hub: hub.clone(),
            transport,
            handlers: StdMutex::new(HashMap::new()),
            next_handler: AtomicU64::new(0),
            remote: Mutex::new(RemoteState::Idle),
        });

        // Pump hub envelopes from peer tabs into our handlers. Holding only
        // a weak reference lets a dropped bus wind the task down.
        let mut hub_rx = hub.listen();
        let weak = Arc::downgrade(&inner);
        tokio::spawn(async move {
            loop {
                match hub_rx.recv().await {
                    Ok(envelope) => {
                        let Some(inner) = weak.upgrade() else { break };
                        if envelope.origin != inner.origin {
                            dispatch(&inner, &envelope.event);
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        warn!(missed, "bus: hub receiver lagged, events skipped");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });

        Self { inner }
    }

    /// Fire-and-forget dual-path publish. Never fails and never blocks on a
    /// broken relay; at worst the remote copy is dropped.
    pub async fn emit(&self, event: Event) {
        self.inner.hub.publish(self.inner.origin, event.clone());

        if let Some(outgoing) = self.ensure_remote().await {
            if outgoing.send(event).await.is_err() {
                debug!("bus: remote link closed, event dropped");
            }
        }
    }

    /// Register a handler for both legs. Returns a [`Subscription`] whose
    /// `unsubscribe` detaches it; calling it twice is harmless. Handlers must
    /// tolerate duplicate delivery of the same logical event.
    pub fn subscribe(&self, handler: impl Fn(&Event) + Send + Sync + 'static) -> Subscription {
        let id = self.inner.next_handler.fetch_add(1, Ordering::Relaxed);
        lock(&self.inner.handlers).insert(id, Arc::new(handler));

        // Kick the remote leg so server-relayed events start flowing even
        // before the first emit.
        let bus = self.clone();
        tokio::spawn(async move {
            let _ = bus.ensure_remote().await;
        });

        Subscription { bus: Arc::downgrade(&self.inner), id, active: AtomicBool::new(true) }
    }

    /// The memoized remote sender. Dials at most once per bus lifetime: the
    /// mutex held across the attempt makes concurrent callers share it, and
    /// a failure parks the bus offline for good.
    async fn ensure_remote(&self) -> Option<mpsc::Sender<Event>> {
        let mut remote = self.inner.remote.lock().await;
        match &*remote {
            RemoteState::Connected(outgoing) => return Some(outgoing.clone()),
            RemoteState::Failed => return None,
            RemoteState::Idle => {}
        }

        match self.inner.transport.connect().await {
            Ok(TransportLink { outgoing, mut incoming }) => {
                let weak = Arc::downgrade(&self.inner);
                tokio::spawn(async move {
                    while let Some(event) = incoming.recv().await {
                        let Some(inner) = weak.upgrade() else { break };
                        dispatch(&inner, &event);
                    }
                });
                *remote = RemoteState::Connected(outgoing.clone());
                Some(outgoing)
            }
            Err(e) => {
                warn!(error = %e, "bus: remote connect failed, staying offline");
                *remote = RemoteState::Failed;
                None
            }
        }
    }
}

fn dispatch(inner: &BusInner, event: &Event) {
    // Snapshot under the lock, invoke outside it so handlers can subscribe
    // or unsubscribe reentrantly.
    let handlers: Vec<Handler> = lock(&inner.handlers).values().cloned().collect();
    for handler in handlers {
        handler(event);
    }
}

fn lock<T>(mutex: &StdMutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// =============================================================================
// SUBSCRIPTION
// =============================================================================

/// Detach handle returned by [`EventBus::subscribe`].
pub struct Subscription {
    bus: Weak<BusInner>,
    id: u64,
    active: AtomicBool,
}

impl Subscription {
    /// Remove the handler from both legs. Idempotent.
    pub fn unsubscribe(&self) {
        if self.active.swap(false, Ordering::SeqCst) {
            if let Some(inner) = self.bus.upgrade() {
                lock(&inner.handlers).remove(&self.id);
            }
        }
    }
}
