//! Shared fixtures for the crate's tests.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::mpsc;

use events::Event;

use crate::bus::{EventBus, LocalHub, Transport, TransportError, TransportLink};
use crate::storage::Storage;

/// A transport that always fails to connect. The bus must keep serving the
/// local leg regardless.
pub struct FailingTransport {
    pub attempts: Arc<AtomicU32>,
}

impl FailingTransport {
    pub fn new() -> (Arc<Self>, Arc<AtomicU32>) {
        let attempts = Arc::new(AtomicU32::new(0));
        (Arc::new(Self { attempts: Arc::clone(&attempts) }), attempts)
    }
}

#[async_trait::async_trait]
impl Transport for FailingTransport {
    async fn connect(&self) -> Result<TransportLink, TransportError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(TransportError::Connect("test transport is offline".to_owned()))
    }
}

/// A transport whose remote side the test scripts by hand: outbound events
/// land in `sent`, and the test injects "relayed" events through `inject`.
pub struct CaptureTransport {
    sent: Arc<Mutex<Vec<Event>>>,
    inject: Arc<Mutex<Option<mpsc::Sender<Event>>>>,
    attempts: Arc<AtomicU32>,
}

/// Test-side handle on a [`CaptureTransport`].
#[derive(Clone)]
pub struct RemoteHandle {
    pub sent: Arc<Mutex<Vec<Event>>>,
    inject: Arc<Mutex<Option<mpsc::Sender<Event>>>>,
    pub attempts: Arc<AtomicU32>,
}

impl RemoteHandle {
    /// Push an event down the link as if the relay had sent it.
    pub async fn inject(&self, event: Event) {
        let tx = self
            .inject
            .lock()
            .expect("inject slot")
            .clone()
            .expect("transport not connected yet");
        tx.send(event).await.expect("inject send");
    }

    pub fn sent_events(&self) -> Vec<Event> {
        self.sent.lock().expect("sent events").clone()
    }
}

impl CaptureTransport {
    pub fn new() -> (Arc<Self>, RemoteHandle) {
        let sent = Arc::new(Mutex::new(Vec::new()));
        let inject = Arc::new(Mutex::new(None));
        let attempts = Arc::new(AtomicU32::new(0));
        let transport = Arc::new(Self {
            sent: Arc::clone(&sent),
            inject: Arc::clone(&inject),
            attempts: Arc::clone(&attempts),
        });
        (transport, RemoteHandle { sent, inject, attempts })
    }
}

#[async_trait::async_trait]
impl Transport for CaptureTransport {
    async fn connect(&self) -> Result<TransportLink, TransportError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);

        let (outgoing_tx, mut outgoing_rx) = mpsc::channel::<Event>(64);
        let (incoming_tx, incoming_rx) = mpsc::channel::<Event>(64);

        let sent = Arc::clone(&self.sent);
        tokio::spawn(async move {
            while let Some(event) = outgoing_rx.recv().await {
                sent.lock().expect("sent events").push(event);
            }
        });

        *self.inject.lock().expect("inject slot") = Some(incoming_tx);
        Ok(TransportLink { outgoing: outgoing_tx, incoming: incoming_rx })
    }
}

/// A bus whose remote leg never comes up: local-only, like a classroom with
/// the relay down.
pub fn offline_bus(hub: &LocalHub) -> EventBus {
    let (transport, _attempts) = FailingTransport::new();
    EventBus::new(hub.clone(), transport)
}

/// Fresh scratch storage. Keep the guard alive for the test's duration.
pub fn temp_storage() -> (tempfile::TempDir, Storage) {
    let dir = tempfile::tempdir().expect("tempdir");
    let storage = Storage::open(dir.path()).expect("storage open");
    (dir, storage)
}

/// Record every event a bus delivers, for later assertions.
pub fn collect_events(bus: &EventBus) -> Arc<Mutex<Vec<Event>>> {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    // Dropping the subscription does not detach the handler; only an explicit
    // unsubscribe does, and these collectors listen for the whole test.
    let _sub = bus.subscribe(move |event| sink.lock().expect("seen events").push(event.clone()));
    seen
}

/// Poll until `predicate` holds or a 2s deadline passes.
pub async fn wait_until(mut predicate: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while !predicate() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "condition not reached within deadline"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
