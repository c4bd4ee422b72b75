use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use strum::IntoEnumIterator;
use tokio::sync::watch;
use tokio::time::timeout;
use tokio_stream::StreamExt;
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::{debug, info, instrument, warn};

use super::backend::{BackendEvent, EventStream, ScannerBackend};
use super::camera::CameraBackend;
use crate::config::{ScanMode, ScannerSettings};
use crate::decode::ScanDecoder;
use crate::error::ScannerError;
use crate::model::{
    BUILTIN_CAMERA_ID, DeviceInfo, DeviceKind, DeviceListing, ScanEvent, ScanningState,
};

type ConnectOutcome = Option<Result<DeviceInfo, ScannerError>>;

/// Routes requests to scanner backends and merges what they report.
///
/// Exactly one device is the default at any time. The built-in camera is the
/// fallback: a newly linked external scanner replaces it, and losing the
/// default scanner reinstates it.
pub struct ScannerRegistry {
    inner: Arc<RegistryInner>,
    _fan_in: DropGuard,
}

struct RegistryInner {
    settings: ScannerSettings,
    backends: HashMap<DeviceKind, Arc<dyn ScannerBackend>>,
    camera: Arc<CameraBackend>,
    default_device: watch::Sender<DeviceInfo>,
    last_scan: watch::Sender<Option<ScanEvent>>,
    scanning: watch::Sender<ScanningState>,
    known_devices: Mutex<HashMap<String, DeviceKind>>,
    in_flight: Mutex<HashMap<String, watch::Receiver<ConnectOutcome>>>,
}

impl ScannerRegistry {
    /// Creates a registry over `backends` plus the built-in camera.
    ///
    /// A later backend of the same kind replaces an earlier one. Must be
    /// called from within a Tokio runtime.
    #[must_use]
    pub fn new(settings: ScannerSettings, backends: Vec<Arc<dyn ScannerBackend>>) -> Self {
        let camera = Arc::new(CameraBackend::new(ScanDecoder::from_settings(&settings)));
        let mut by_kind: HashMap<DeviceKind, Arc<dyn ScannerBackend>> = HashMap::new();
        by_kind.insert(DeviceKind::Camera, Arc::clone(&camera) as Arc<dyn ScannerBackend>);
        for backend in backends {
            by_kind.insert(backend.kind(), backend);
        }

        let inner = Arc::new(RegistryInner {
            settings,
            backends: by_kind,
            camera,
            default_device: watch::Sender::new(DeviceInfo::builtin_camera()),
            last_scan: watch::Sender::new(None),
            scanning: watch::Sender::new(ScanningState::Idle),
            known_devices: Mutex::new(HashMap::from([(
                BUILTIN_CAMERA_ID.to_string(),
                DeviceKind::Camera,
            )])),
            in_flight: Mutex::new(HashMap::new()),
        });

        let token = CancellationToken::new();
        for backend in inner.backends.values() {
            // Subscribe before returning so no event sent after `new` is missed.
            let events = backend.events();
            tokio::spawn(fan_in(Arc::clone(&inner), backend.kind(), events, token.clone()));
        }

        Self {
            inner,
            _fan_in: token.drop_guard(),
        }
    }

    /// The always-present built-in camera backend.
    #[must_use]
    pub fn camera(&self) -> &CameraBackend {
        &self.inner.camera
    }

    /// Lists devices from every backend, each bounded by the discovery
    /// timeout. Backends that fail or time out are left out.
    #[instrument(skip(self), level = "debug")]
    pub async fn list_available_devices(&self) -> DeviceListing {
        let limit = self.inner.settings.discovery_timeout();
        let mut merged: Vec<DeviceInfo> = Vec::new();

        for kind in DeviceKind::iter() {
            let Some(backend) = self.inner.backends.get(&kind) else {
                continue;
            };
            let devices = match timeout(limit, backend.list_devices()).await {
                Ok(Ok(devices)) => devices,
                Ok(Err(error)) => {
                    warn!(%kind, %error, "skipping scanner backend that failed to list devices");
                    continue;
                }
                Err(_elapsed) => {
                    warn!(%kind, "skipping scanner backend that did not list devices in time");
                    continue;
                }
            };

            self.inner.remember(&devices, kind);
            for device in devices {
                merge_device(&mut merged, device);
            }
        }

        DeviceListing::new(merged, self.default_device())
    }

    /// Connects `device_id` through the backend for `kind`.
    ///
    /// Concurrent calls for the same id wait for and share the first call's
    /// outcome instead of starting another attempt.
    ///
    /// # Errors
    ///
    /// Returns [`ScannerError::UnknownBackend`] if no backend handles `kind`,
    /// [`ScannerError::Timeout`] after the connection timeout, or the
    /// backend's failure.
    #[instrument(skip(self), level = "debug")]
    pub async fn connect(&self, device_id: &str, kind: DeviceKind) -> Result<DeviceInfo, ScannerError> {
        let backend = self.inner.backend(kind)?;

        let (mut outcome, leader) = {
            let mut in_flight = self.inner.lock_in_flight();
            match in_flight.get(device_id) {
                Some(outcome) => (outcome.clone(), None),
                None => {
                    let (sender, outcome) = watch::channel(None);
                    in_flight.insert(device_id.to_string(), outcome.clone());
                    (outcome, Some(sender))
                }
            }
        };

        let Some(sender) = leader else {
            debug!(device_id, "joining connect attempt already in flight");
            return match outcome.wait_for(Option::is_some).await {
                Ok(result) => result.clone().unwrap_or(Err(ScannerError::Shutdown)),
                Err(_abandoned) => Err(ScannerError::ConnectionFailed {
                    reason: "the concurrent connect attempt was abandoned".to_string(),
                }),
            };
        };

        let _in_flight = InFlightEntry {
            inner: &self.inner,
            device_id,
        };
        let limit = self.inner.settings.connection_timeout();
        let result = match timeout(limit, backend.connect(device_id)).await {
            Ok(result) => result,
            Err(_elapsed) => {
                if let Err(error) = backend.disconnect(device_id).await {
                    debug!(%error, "failed to abandon timed out connect attempt");
                }
                Err(ScannerError::Timeout {
                    operation: "scanner connect",
                    after: limit,
                })
            }
        };

        if let Ok(device) = &result {
            self.inner.remember(std::slice::from_ref(device), kind);
            self.inner.promote_if_fallback(device);
        }
        sender.send_replace(Some(result.clone()));
        result
    }

    /// Drops the link to `device_id`. Disconnecting an already disconnected
    /// device succeeds; the built-in camera stays connected.
    ///
    /// # Errors
    ///
    /// Returns [`ScannerError::UnknownDevice`] if the id was never listed or
    /// connected.
    #[instrument(skip(self), level = "debug")]
    pub async fn disconnect(&self, device_id: &str) -> Result<(), ScannerError> {
        if device_id == BUILTIN_CAMERA_ID {
            debug!("the built-in camera cannot be disconnected");
            return Ok(());
        }

        let kind = self
            .inner
            .lock_known()
            .get(device_id)
            .copied()
            .ok_or_else(|| ScannerError::UnknownDevice {
                device_id: device_id.to_string(),
            })?;
        self.inner.backend(kind)?.disconnect(device_id).await?;

        if self.inner.default_device.borrow().id() == device_id {
            self.inner.fall_back("default scanner disconnected");
        }
        Ok(())
    }

    #[must_use]
    pub fn default_device(&self) -> DeviceInfo {
        self.inner.default_device.borrow().clone()
    }

    #[must_use]
    pub fn subscribe_default_device(&self) -> watch::Receiver<DeviceInfo> {
        self.inner.default_device.subscribe()
    }

    /// Latest scan from any backend. Only the newest value is kept.
    #[must_use]
    pub fn last_scan(&self) -> Option<ScanEvent> {
        self.inner.last_scan.borrow().clone()
    }

    #[must_use]
    pub fn subscribe_last_scan(&self) -> watch::Receiver<Option<ScanEvent>> {
        self.inner.last_scan.subscribe()
    }

    #[must_use]
    pub fn scanning_state(&self) -> ScanningState {
        *self.inner.scanning.borrow()
    }

    #[must_use]
    pub fn subscribe_scanning_state(&self) -> watch::Receiver<ScanningState> {
        self.inner.scanning.subscribe()
    }

    pub fn start_scanning(&self) {
        self.inner.set_scanning(ScanningState::Scanning);
    }

    /// Pauses an active scanning phase; scans are dropped until resumed.
    pub fn pause_scanning(&self) {
        self.inner.scanning.send_if_modified(|state| {
            if *state == ScanningState::Scanning {
                *state = ScanningState::Paused;
                true
            } else {
                false
            }
        });
    }

    pub fn stop_scanning(&self) {
        self.inner.set_scanning(ScanningState::Idle);
    }
}

impl RegistryInner {
    fn backend(&self, kind: DeviceKind) -> Result<Arc<dyn ScannerBackend>, ScannerError> {
        self.backends
            .get(&kind)
            .cloned()
            .ok_or(ScannerError::UnknownBackend { kind })
    }

    fn lock_known(&self) -> std::sync::MutexGuard<'_, HashMap<String, DeviceKind>> {
        self.known_devices
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_in_flight(&self) -> std::sync::MutexGuard<'_, HashMap<String, watch::Receiver<ConnectOutcome>>> {
        self.in_flight.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn remember(&self, devices: &[DeviceInfo], kind: DeviceKind) {
        let mut known = self.lock_known();
        for device in devices {
            known.insert(device.id().to_string(), kind);
        }
    }

    fn set_scanning(&self, next: ScanningState) {
        let previous = self.scanning.send_replace(next);
        if previous != next {
            info!(from = %previous, to = %next, "scanning state changed");
        }
    }

    fn promote_if_fallback(&self, device: &DeviceInfo) {
        if device.kind() == DeviceKind::Camera || !device.is_connected() {
            return;
        }
        let promoted = self.default_device.send_if_modified(|current| {
            if current.id() == BUILTIN_CAMERA_ID {
                *current = device.clone();
                true
            } else {
                false
            }
        });
        if promoted {
            info!(device_id = device.id(), "scanner became the default device");
        }
    }

    fn fall_back(&self, reason: &str) {
        let previous = self.default_device.send_replace(DeviceInfo::builtin_camera());
        if previous.id() != BUILTIN_CAMERA_ID {
            info!(device_id = previous.id(), reason, "default device fell back to the built-in camera");
        }
    }

    fn on_backend_event(&self, kind: DeviceKind, event: BackendEvent) {
        match event {
            BackendEvent::Scan(scan) => self.on_scan(scan),
            BackendEvent::Links(devices) => self.on_links(kind, &devices),
        }
    }

    fn on_scan(&self, scan: ScanEvent) {
        let state = *self.scanning.borrow();
        if state == ScanningState::Paused {
            debug!("dropping scan while scanning is paused");
            return;
        }

        self.last_scan.send_replace(Some(scan));
        if state == ScanningState::Scanning && self.settings.scan_mode() == ScanMode::Single {
            self.set_scanning(ScanningState::Idle);
        }
    }

    fn on_links(&self, kind: DeviceKind, devices: &[DeviceInfo]) {
        self.remember(devices, kind);

        let default = self.default_device.borrow().clone();
        if default.kind() == kind && default.id() != BUILTIN_CAMERA_ID {
            let still_linked = devices
                .iter()
                .find(|device| device.id() == default.id() && device.is_connected());
            if let Some(current) = still_linked {
                self.default_device.send_if_modified(|snapshot| {
                    if *snapshot == *current {
                        false
                    } else {
                        *snapshot = current.clone();
                        true
                    }
                });
            } else {
                self.fall_back("default scanner link lost");
                if *self.scanning.borrow() == ScanningState::Scanning {
                    warn!(device_id = default.id(), "scanner link lost while scanning");
                    self.set_scanning(ScanningState::Error);
                }
            }
            return;
        }

        if let Some(linked) = devices.iter().find(|device| device.is_connected()) {
            self.promote_if_fallback(linked);
        }
    }
}

/// Removes a connect attempt from the in-flight table when the leading call
/// finishes or is dropped.
struct InFlightEntry<'a> {
    inner: &'a RegistryInner,
    device_id: &'a str,
}

impl Drop for InFlightEntry<'_> {
    fn drop(&mut self) {
        self.inner.lock_in_flight().remove(self.device_id);
    }
}

/// Keeps the connected entry when two backends report the same id.
fn merge_device(merged: &mut Vec<DeviceInfo>, device: DeviceInfo) {
    match merged.iter_mut().find(|existing| existing.id() == device.id()) {
        Some(existing) => {
            if device.is_connected() && !existing.is_connected() {
                *existing = device;
            }
        }
        None => merged.push(device),
    }
}

async fn fan_in(
    inner: Arc<RegistryInner>,
    kind: DeviceKind,
    mut events: EventStream,
    token: CancellationToken,
) {
    loop {
        tokio::select! {
            () = token.cancelled() => break,
            event = events.next() => match event {
                Some(event) => inner.on_backend_event(kind, event),
                None => break,
            },
        }
    }
    debug!(%kind, "scanner backend event fan-in stopped");
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use assert_matches::assert_matches;
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::registry::backend::{EventStream, watch_events};

    struct SlowBackend {
        attempts: AtomicUsize,
        delay: Duration,
        links: watch::Sender<Vec<DeviceInfo>>,
        scans: watch::Sender<Option<ScanEvent>>,
    }

    impl SlowBackend {
        fn new(delay: Duration) -> Self {
            Self {
                attempts: AtomicUsize::new(0),
                delay,
                links: watch::Sender::new(Vec::new()),
                scans: watch::Sender::new(None),
            }
        }

        fn device() -> DeviceInfo {
            DeviceInfo::new("AA:01", "Slow scanner", DeviceKind::BluetoothScanner)
        }
    }

    #[async_trait]
    impl ScannerBackend for SlowBackend {
        fn kind(&self) -> DeviceKind {
            DeviceKind::BluetoothScanner
        }

        async fn list_devices(&self) -> Result<Vec<DeviceInfo>, ScannerError> {
            tokio::time::sleep(self.delay).await;
            Ok(vec![Self::device()])
        }

        async fn connect(&self, _device_id: &str) -> Result<DeviceInfo, ScannerError> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            let device = Self::device().connected_now();
            self.links.send_replace(vec![device.clone()]);
            Ok(device)
        }

        async fn disconnect(&self, _device_id: &str) -> Result<(), ScannerError> {
            self.links.send_replace(Vec::new());
            Ok(())
        }

        fn events(&self) -> EventStream {
            watch_events(self.scans.subscribe(), self.links.subscribe())
        }
    }

    fn registry_with(backend: Arc<SlowBackend>, settings: ScannerSettings) -> ScannerRegistry {
        ScannerRegistry::new(settings, vec![backend as Arc<dyn ScannerBackend>])
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_connects_share_one_attempt() {
        let backend = Arc::new(SlowBackend::new(Duration::from_secs(1)));
        let registry = registry_with(Arc::clone(&backend), ScannerSettings::default());

        let (first, second) = tokio::join!(
            registry.connect("AA:01", DeviceKind::BluetoothScanner),
            registry.connect("AA:01", DeviceKind::BluetoothScanner),
        );

        assert_eq!(1, backend.attempts.load(Ordering::SeqCst));
        assert_eq!(
            first.expect("first connect should succeed"),
            second.expect("second connect should share the outcome")
        );
        assert_eq!("AA:01", registry.default_device().id());
    }

    #[tokio::test(start_paused = true)]
    async fn slow_backends_are_left_out_of_listings() {
        let backend = Arc::new(SlowBackend::new(Duration::from_secs(60)));
        let registry = registry_with(backend, ScannerSettings::default());

        let listing = registry.list_available_devices().await;

        assert_eq!(None, listing.find("AA:01"));
        assert_eq!(BUILTIN_CAMERA_ID, listing.default_device().id());
    }

    #[tokio::test(start_paused = true)]
    async fn connect_attempts_are_bounded_by_the_connection_timeout() {
        let backend = Arc::new(SlowBackend::new(Duration::from_secs(60)));
        let settings = ScannerSettings::builder()
            .connection_timeout(Duration::from_secs(5))
            .build();
        let registry = registry_with(backend, settings);

        assert_matches!(
            registry.connect("AA:01", DeviceKind::BluetoothScanner).await,
            Err(ScannerError::Timeout { after, .. }) if after == Duration::from_secs(5)
        );
        assert_eq!(BUILTIN_CAMERA_ID, registry.default_device().id());
    }

    #[tokio::test(start_paused = true)]
    async fn linked_default_tracks_battery_updates() {
        let backend = Arc::new(SlowBackend::new(Duration::ZERO));
        let registry = registry_with(Arc::clone(&backend), ScannerSettings::default());
        registry
            .connect("AA:01", DeviceKind::BluetoothScanner)
            .await
            .expect("connect should succeed");

        backend.links.send_replace(vec![
            SlowBackend::device()
                .connected_now()
                .with_battery_level(Some(42)),
        ]);

        let mut default = registry.subscribe_default_device();
        let current = default
            .wait_for(|device| device.battery_level() == Some(42))
            .await
            .expect("registry should stay alive")
            .clone();
        assert_eq!("AA:01", current.id());
        assert!(current.is_connected());
    }

    #[test]
    fn merging_prefers_connected_entries() {
        let mut merged = vec![SlowBackend::device()];

        merge_device(&mut merged, SlowBackend::device().connected_now());
        merge_device(&mut merged, SlowBackend::device());

        assert_eq!(1, merged.len());
        assert!(merged[0].is_connected());
    }
}
