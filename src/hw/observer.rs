use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use tokio::sync::mpsc;
use tracing::{debug, trace};

use super::sdk::{DeviceHandle, ScannerSdk, SdkLinkState, SdkObserver};
use crate::error::SdkError;
use crate::pairing::SessionId;

/// SDK callback payloads.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum DeviceEvent {
    Link {
        state: SdkLinkState,
        device: Option<DeviceHandle>,
    },
    ScanData(Vec<u8>),
    Battery(u8),
    Error {
        code: i32,
        message: String,
    },
}

/// A device event stamped with the session that was live when the SDK
/// delivered it.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct StampedEvent {
    session: Option<SessionId>,
    event: DeviceEvent,
}

impl StampedEvent {
    #[must_use]
    pub fn new(session: Option<SessionId>, event: DeviceEvent) -> Self {
        Self { session, event }
    }

    #[must_use]
    pub fn session(&self) -> Option<SessionId> {
        self.session
    }

    #[must_use]
    pub fn event(&self) -> &DeviceEvent {
        &self.event
    }

    #[must_use]
    pub fn into_event(self) -> DeviceEvent {
        self.event
    }
}

/// The session id SDK callbacks are currently attributed to.
#[derive(Debug, Default)]
pub struct SessionGate {
    live: AtomicU64,
}

impl SessionGate {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn open(&self, session: SessionId) {
        self.live.store(session.into_raw(), Ordering::SeqCst);
    }

    pub fn close(&self) {
        self.live.store(0, Ordering::SeqCst);
    }

    #[must_use]
    pub fn current(&self) -> Option<SessionId> {
        SessionId::from_raw(self.live.load(Ordering::SeqCst))
    }
}

/// Observer that stamps SDK callbacks and forwards them into a queue.
pub struct EventForwarder<M> {
    gate: Arc<SessionGate>,
    sender: mpsc::UnboundedSender<M>,
}

impl<M> EventForwarder<M>
where
    M: From<StampedEvent> + Send + 'static,
{
    #[must_use]
    pub fn new(gate: Arc<SessionGate>, sender: mpsc::UnboundedSender<M>) -> Self {
        Self { gate, sender }
    }

    fn forward(&self, event: DeviceEvent) {
        let stamped = StampedEvent::new(self.gate.current(), event);
        if self.sender.send(M::from(stamped)).is_err() {
            trace!("dropping SDK callback after the event pump stopped");
        }
    }
}

impl<M> SdkObserver for EventForwarder<M>
where
    M: From<StampedEvent> + Send + 'static,
{
    fn on_connection_state_changed(&self, state: SdkLinkState, device: Option<DeviceHandle>) {
        self.forward(DeviceEvent::Link { state, device });
    }

    fn on_scan_data(&self, payload: Vec<u8>) {
        self.forward(DeviceEvent::ScanData(payload));
    }

    fn on_battery_level(&self, level: u8) {
        self.forward(DeviceEvent::Battery(level));
    }

    fn on_error(&self, code: i32, message: String) {
        self.forward(DeviceEvent::Error { code, message });
    }
}

/// An observer registration held with the SDK.
///
/// Released at most once, either explicitly or when dropped.
pub struct ObserverRegistration {
    sdk: Arc<dyn ScannerSdk>,
    released: AtomicBool,
}

impl std::fmt::Debug for ObserverRegistration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObserverRegistration")
            .field("released", &self.released)
            .finish_non_exhaustive()
    }
}

impl ObserverRegistration {
    /// Registers `observer` with `sdk`.
    ///
    /// # Errors
    ///
    /// Returns the SDK error if registration is refused.
    pub fn register(
        sdk: Arc<dyn ScannerSdk>,
        observer: Arc<dyn SdkObserver>,
    ) -> Result<Self, SdkError> {
        sdk.register_observer(observer)?;
        debug!("registered scanner SDK observer");
        Ok(Self {
            sdk,
            released: AtomicBool::new(false),
        })
    }

    /// Unregisters the observer. Later calls do nothing.
    ///
    /// # Errors
    ///
    /// Returns the SDK error from the first release attempt.
    pub fn release(&self) -> Result<(), SdkError> {
        if self.released.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        debug!("unregistering scanner SDK observer");
        self.sdk.unregister_observer()
    }

    #[must_use]
    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::SeqCst)
    }
}

impl Drop for ObserverRegistration {
    fn drop(&mut self) {
        if let Err(error) = self.release() {
            debug!(%error, "failed to unregister scanner SDK observer on drop");
        }
    }
}
