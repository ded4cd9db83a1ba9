//! Sync Adaptor Interface (design §4.9): the core wraps a concrete,
//! transport-specific adaptor behind a `sync_enabled` gate so that no bytes
//! leave or are applied while the transport is connecting or tearing down
//! (design §6, "no HTTP surface; transports are the external collaborator's
//! concern").

mod state;

pub use state::{SyncState, SyncStatus};

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::{DocumentError, DocumentResult};

/// Channel half the adaptor uses to push bytes it received over the
/// transport back to the gate.
pub type SyncSender = mpsc::UnboundedSender<Vec<u8>>;
/// Channel half the adaptor drains for bytes the gate wants transmitted
/// over the transport.
pub type SyncReceiver = mpsc::UnboundedReceiver<Vec<u8>>;

/// Polymorphic transport contract a concrete collaborator implements
/// (design §4.9). The core never depends on a specific transport; it only
/// ever talks to this trait object.
#[async_trait]
pub trait SyncAdaptor: Send + Sync {
    /// Hands the adaptor its transport context: `send` is how it reports
    /// bytes it received over the wire, `recv` is where it picks up bytes
    /// the gate wants shipped out (design §4.9).
    async fn set_ctx(&self, send: SyncSender, recv: SyncReceiver);
    async fn handle_join_ok(&self, room_id: &str) -> DocumentResult<()>;
    async fn wait_for_reaching_server_version(&self) -> DocumentResult<()>;
    async fn apply_update(&self, bytes: &[u8]) -> DocumentResult<()>;
    fn cmp_version(&self, bytes: &[u8]) -> std::cmp::Ordering;
    fn get_version(&self) -> Vec<u8>;
    async fn destroy(&self);
}

type Listener = Box<dyn Fn(&SyncState) + Send + Sync>;

/// Gates a [`SyncAdaptor`] with the `sync_enabled` flag and the observable
/// [`SyncState`] listener set (design §4.9).
pub struct SyncGate {
    adaptor: Arc<dyn SyncAdaptor>,
    sync_enabled: AtomicBool,
    state: Mutex<SyncState>,
    listeners: Arc<Mutex<Vec<(u64, Listener)>>>,
    next_listener_id: std::sync::atomic::AtomicU64,
    /// The gate's half of the channel the adaptor drains via `set_ctx`'s
    /// `recv`; `None` while disconnected.
    outgoing: Mutex<Option<mpsc::UnboundedSender<Vec<u8>>>>,
}

impl SyncGate {
    pub fn new(adaptor: Arc<dyn SyncAdaptor>) -> Self {
        Self {
            adaptor,
            sync_enabled: AtomicBool::new(false),
            state: Mutex::new(SyncState::default()),
            listeners: Arc::new(Mutex::new(Vec::new())),
            next_listener_id: std::sync::atomic::AtomicU64::new(0),
            outgoing: Mutex::new(None),
        }
    }

    pub fn state(&self) -> SyncState {
        self.state.lock().unwrap().clone()
    }

    /// Registers a listener for `SyncState` transitions. Returns a
    /// disposer, matching the listener-set pattern used by
    /// [`crate::substrate::Substrate::subscribe`] (design §9).
    pub fn subscribe(&self, listener: impl Fn(&SyncState) + Send + Sync + 'static) -> Box<dyn FnOnce() + Send> {
        let id = self.next_listener_id.fetch_add(1, Ordering::Relaxed);
        self.listeners.lock().unwrap().push((id, Box::new(listener)));

        let listeners = self.listeners.clone();
        Box::new(move || {
            listeners.lock().unwrap().retain(|(lid, _)| *lid != id);
        })
    }

    fn set_state(&self, new_state: SyncState) {
        crate::observability::DocumentMetrics::record_sync_transition(new_state.status.as_str());
        *self.state.lock().unwrap() = new_state.clone();
        for (_, listener) in self.listeners.lock().unwrap().iter() {
            listener(&new_state);
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.sync_enabled.load(Ordering::Acquire)
    }

    /// Connects to `room_id`: sets `sync_enabled` true, does a blocking
    /// join-and-catch-up, then reports `Connected`. On failure, transitions
    /// directly to `Disconnected` with an error message (design §4.9).
    pub async fn connect(&self, room_id: &str, ping_interval: Option<Duration>) -> DocumentResult<()> {
        self.set_state(SyncState { status: SyncStatus::Connecting, room_id: Some(room_id.to_string()), ..SyncState::default() });
        self.sync_enabled.store(true, Ordering::Release);

        let (in_tx, in_rx) = mpsc::unbounded_channel();
        let (out_tx, out_rx) = mpsc::unbounded_channel();
        self.adaptor.set_ctx(in_tx, out_rx).await;
        *self.outgoing.lock().unwrap() = Some(out_tx);
        drop(in_rx); // no in-process consumer yet; inbound bytes arrive via apply_remote_update directly

        let started = std::time::Instant::now();
        let joined = self.adaptor.handle_join_ok(room_id).await;
        if let Err(err) = joined {
            self.sync_enabled.store(false, Ordering::Release);
            self.set_state(SyncState {
                status: SyncStatus::Disconnected,
                room_id: Some(room_id.to_string()),
                error: Some(err.to_string()),
                ..SyncState::default()
            });
            return Err(err);
        }

        if let Err(err) = self.adaptor.wait_for_reaching_server_version().await {
            self.sync_enabled.store(false, Ordering::Release);
            self.set_state(SyncState {
                status: SyncStatus::Disconnected,
                room_id: Some(room_id.to_string()),
                error: Some(err.to_string()),
                ..SyncState::default()
            });
            return Err(err);
        }

        let _ = ping_interval; // reserved for the transport's own heartbeat loop

        self.set_state(SyncState {
            status: SyncStatus::Connected,
            room_id: Some(room_id.to_string()),
            latency_ms: Some(started.elapsed().as_millis() as u64),
            error: None,
        });
        Ok(())
    }

    /// Clears `sync_enabled` before tearing the transport down, guaranteeing
    /// no race between a mid-flight apply/send and teardown (design §4.9).
    /// Idempotent and non-blocking from the caller's perspective; teardown
    /// errors are logged, not propagated (design §5).
    pub async fn disconnect(&self) {
        self.sync_enabled.store(false, Ordering::Release);
        self.outgoing.lock().unwrap().take();
        self.adaptor.destroy().await;
        self.set_state(SyncState { status: SyncStatus::Disconnected, ..self.state() });
    }

    /// Applies remote bytes if and only if the gate is open; silently
    /// ignored otherwise (design §4.9).
    pub async fn apply_remote_update(&self, bytes: &[u8]) -> DocumentResult<()> {
        if !self.is_enabled() {
            return Ok(());
        }
        self.adaptor.apply_update(bytes).await
    }

    /// Sends local bytes out if and only if the gate is open; dropped
    /// otherwise (design §4.9, "outgoing sends are dropped").
    pub fn send_if_enabled(&self, bytes: &[u8]) -> Option<&[u8]> {
        if self.is_enabled() {
            if let Some(tx) = self.outgoing.lock().unwrap().as_ref() {
                let _ = tx.send(bytes.to_vec());
            }
            Some(bytes)
        } else {
            None
        }
    }
}

/// No-op adaptor: always reports success and an up-to-date version. Used by
/// tests and as the default when a document is constructed without sync
/// (design §4.9's "polymorphic over transport" admits a trivial transport).
#[derive(Default)]
pub struct NullSyncAdaptor;

#[async_trait]
impl SyncAdaptor for NullSyncAdaptor {
    async fn set_ctx(&self, _send: SyncSender, _recv: SyncReceiver) {}

    async fn handle_join_ok(&self, _room_id: &str) -> DocumentResult<()> {
        Ok(())
    }

    async fn wait_for_reaching_server_version(&self) -> DocumentResult<()> {
        Ok(())
    }

    async fn apply_update(&self, _bytes: &[u8]) -> DocumentResult<()> {
        Ok(())
    }

    fn cmp_version(&self, _bytes: &[u8]) -> std::cmp::Ordering {
        std::cmp::Ordering::Equal
    }

    fn get_version(&self) -> Vec<u8> {
        Vec::new()
    }

    async fn destroy(&self) {}
}

/// Adaptor reporting an unrecoverable handshake failure, for exercising the
/// `SyncFatal` path (design §7).
pub struct FailingSyncAdaptor {
    pub reason: String,
}

#[async_trait]
impl SyncAdaptor for FailingSyncAdaptor {
    async fn set_ctx(&self, _send: SyncSender, _recv: SyncReceiver) {}

    async fn handle_join_ok(&self, _room_id: &str) -> DocumentResult<()> {
        Err(DocumentError::SyncFatal(self.reason.clone()))
    }

    async fn wait_for_reaching_server_version(&self) -> DocumentResult<()> {
        Ok(())
    }

    async fn apply_update(&self, _bytes: &[u8]) -> DocumentResult<()> {
        Ok(())
    }

    fn cmp_version(&self, _bytes: &[u8]) -> std::cmp::Ordering {
        std::cmp::Ordering::Equal
    }

    fn get_version(&self) -> Vec<u8> {
        Vec::new()
    }

    async fn destroy(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn connect_with_null_adaptor_reaches_connected() {
        let gate = SyncGate::new(Arc::new(NullSyncAdaptor));
        gate.connect("room-1", None).await.unwrap();
        assert_eq!(gate.state().status, SyncStatus::Connected);
        assert!(gate.is_enabled());
    }

    #[tokio::test]
    async fn failed_handshake_transitions_directly_to_disconnected() {
        let gate = SyncGate::new(Arc::new(FailingSyncAdaptor { reason: "bad auth".into() }));
        let err = gate.connect("room-1", None).await;
        assert!(err.is_err());
        assert_eq!(gate.state().status, SyncStatus::Disconnected);
        assert!(!gate.is_enabled());
    }

    #[tokio::test]
    async fn disconnect_clears_the_gate_before_teardown() {
        let gate = SyncGate::new(Arc::new(NullSyncAdaptor));
        gate.connect("room-1", None).await.unwrap();
        gate.disconnect().await;
        assert!(!gate.is_enabled());
        assert_eq!(gate.state().status, SyncStatus::Disconnected);
    }
}
