use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use bon::Builder;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::timeout;
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::{debug, info, instrument, trace, warn};

use super::renderer::{PairingImage, PairingImageRenderer, QrTextRenderer};
use super::state::{ConnectionState, PairingSession, SessionId};
use crate::config::ScannerSettings;
use crate::decode::ScanDecoder;
use crate::error::ScannerError;
use crate::hw::{
    BeepTone, DeviceEvent, DeviceHandle, EventForwarder, ObserverRegistration, PairingPayload,
    PermissionProbe, ScannerSdk, SdkLinkState, SessionGate, StampedEvent, StaticPermissionProbe,
};
use crate::model::{DeviceInfo, DeviceKind, ScanEvent};

const FALLBACK_DEVICE_ID: &str = "ble-scanner";
const FALLBACK_DEVICE_NAME: &str = "BLE scanner";

/// Result of asking the machine to pair.
#[derive(Debug, Clone, PartialEq)]
pub enum PairingOutcome {
    /// A new pairing session was opened.
    Started(SessionId),
    /// A scanner is already linked; nothing changed.
    AlreadyConnected(DeviceInfo),
}

/// Collaborators of a [`PairingMachine`].
#[derive(Builder)]
pub struct PairingMachineOptions {
    sdk: Arc<dyn ScannerSdk>,
    #[builder(default)]
    settings: ScannerSettings,
    #[builder(default = Arc::new(QrTextRenderer) as Arc<dyn PairingImageRenderer>)]
    renderer: Arc<dyn PairingImageRenderer>,
    #[builder(default = Arc::new(StaticPermissionProbe::granted()) as Arc<dyn PermissionProbe>)]
    permissions: Arc<dyn PermissionProbe>,
}

/// Drives one BLE scanner slot through pairing, connection and scanning.
///
/// All SDK callbacks and caller requests are applied in order by a single
/// event pump, so transitions never interleave. Callbacks are attributed to
/// the session that was live when the SDK delivered them; anything from an
/// older session is dropped.
///
/// An unsolicited reconnect reported while disconnected moves the slot to
/// `Connecting`, but only a pairing session can complete a link. Such a slot
/// stays `Connecting` until it is disconnected.
///
/// Clones share the same slot. The pump stops when the last clone is dropped
/// or [`PairingMachine::shutdown`] is called.
#[derive(Clone)]
pub struct PairingMachine {
    inner: Arc<MachineHandle>,
}

struct MachineHandle {
    inputs: mpsc::UnboundedSender<MachineInput>,
    shared: Arc<Shared>,
    _pump: DropGuard,
}

struct Shared {
    state: watch::Sender<ConnectionState>,
    device: watch::Sender<Option<DeviceInfo>>,
    last_scan: watch::Sender<Option<ScanEvent>>,
    pairing: watch::Sender<Option<PairingSession>>,
    last_error: Mutex<Option<String>>,
}

enum MachineInput {
    Device(StampedEvent),
    PairingCodeReady {
        session: SessionId,
        result: Result<(PairingPayload, PairingImage), String>,
    },
    Request(Request),
}

impl From<StampedEvent> for MachineInput {
    fn from(event: StampedEvent) -> Self {
        Self::Device(event)
    }
}

enum Request {
    StartPairing(oneshot::Sender<Result<PairingOutcome, ScannerError>>),
    Disconnect(oneshot::Sender<()>),
    QueryBattery(oneshot::Sender<Result<(), ScannerError>>),
    Shutdown(oneshot::Sender<()>),
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
enum Flow {
    Continue,
    Stop,
}

impl PairingMachine {
    /// Starts the event pump for a new, disconnected slot.
    ///
    /// Must be called from within a Tokio runtime.
    #[must_use]
    pub fn spawn(options: PairingMachineOptions) -> Self {
        let (inputs, receiver) = mpsc::unbounded_channel();
        let shared = Arc::new(Shared {
            state: watch::Sender::new(ConnectionState::Disconnected),
            device: watch::Sender::new(None),
            last_scan: watch::Sender::new(None),
            pairing: watch::Sender::new(None),
            last_error: Mutex::new(None),
        });
        let token = CancellationToken::new();

        let core = MachineCore {
            decoder: ScanDecoder::from_settings(&options.settings),
            sdk: options.sdk,
            settings: options.settings,
            renderer: options.renderer,
            permissions: options.permissions,
            gate: Arc::new(SessionGate::new()),
            inputs: inputs.clone(),
            registration: None,
            session: None,
            next_session: SessionId::first(),
            shared: Arc::clone(&shared),
        };
        tokio::spawn(run_pump(core, receiver, token.clone()));

        Self {
            inner: Arc::new(MachineHandle {
                inputs,
                shared,
                _pump: token.drop_guard(),
            }),
        }
    }

    /// Begins the QR handshake.
    ///
    /// # Errors
    ///
    /// Returns [`ScannerError::PermissionRequired`] when platform permissions
    /// are missing, [`ScannerError::PairingInProgress`] when a handshake is
    /// already underway, or the SDK failure when the observer cannot be
    /// registered.
    #[instrument(skip(self), level = "debug")]
    pub async fn start_pairing(&self) -> Result<PairingOutcome, ScannerError> {
        let (reply, response) = oneshot::channel();
        self.request(Request::StartPairing(reply))?;
        response.await.map_err(|_closed| ScannerError::Shutdown)?
    }

    /// Drops any link or pairing attempt and returns to `Disconnected`.
    /// Does nothing when already disconnected.
    #[instrument(skip(self), level = "debug")]
    pub async fn disconnect(&self) {
        let (reply, response) = oneshot::channel();
        if self.request(Request::Disconnect(reply)).is_ok() && response.await.is_err() {
            trace!("scanner machine stopped before acknowledging disconnect");
        }
    }

    /// Asks the connected scanner for a battery report.
    ///
    /// # Errors
    ///
    /// Returns [`ScannerError::NotConnected`] without a linked scanner.
    pub async fn query_battery_level(&self) -> Result<(), ScannerError> {
        let (reply, response) = oneshot::channel();
        self.request(Request::QueryBattery(reply))?;
        response.await.map_err(|_closed| ScannerError::Shutdown)?
    }

    /// Resets the slot, releases the SDK observer and stops the event pump.
    #[instrument(skip(self), level = "debug")]
    pub async fn shutdown(&self) {
        let (reply, response) = oneshot::channel();
        if self.request(Request::Shutdown(reply)).is_ok() && response.await.is_err() {
            trace!("scanner machine already stopped");
        }
    }

    /// Waits until the slot is `Connected`, `Error` or `Disconnected`.
    ///
    /// # Errors
    ///
    /// Returns [`ScannerError::Timeout`] if the slot is still pairing after
    /// `limit`.
    pub async fn wait_until_settled(&self, limit: Duration) -> Result<ConnectionState, ScannerError> {
        let mut states = self.inner.shared.state.subscribe();
        match timeout(limit, states.wait_for(|state| state.is_settled())).await {
            Ok(Ok(state)) => Ok(*state),
            Ok(Err(_closed)) => Err(ScannerError::Shutdown),
            Err(_elapsed) => Err(ScannerError::Timeout {
                operation: "scanner pairing",
                after: limit,
            }),
        }
    }

    #[must_use]
    pub fn state(&self) -> ConnectionState {
        *self.inner.shared.state.borrow()
    }

    /// The linked scanner, if any.
    #[must_use]
    pub fn device(&self) -> Option<DeviceInfo> {
        self.inner.shared.device.borrow().clone()
    }

    /// Reason for the most recent failure, cleared when pairing restarts.
    #[must_use]
    pub fn last_error(&self) -> Option<String> {
        self.inner
            .shared
            .last_error
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    #[must_use]
    pub fn last_scan(&self) -> Option<ScanEvent> {
        self.inner.shared.last_scan.borrow().clone()
    }

    /// The pairing code currently waiting for the operator.
    #[must_use]
    pub fn pairing_session(&self) -> Option<PairingSession> {
        self.inner.shared.pairing.borrow().clone()
    }

    /// Forgets the last scan so the next one is observable as a change.
    pub fn clear_scan_result(&self) {
        self.inner.shared.last_scan.send_replace(None);
    }

    #[must_use]
    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.shared.state.subscribe()
    }

    #[must_use]
    pub fn subscribe_device(&self) -> watch::Receiver<Option<DeviceInfo>> {
        self.inner.shared.device.subscribe()
    }

    /// Latest decoded scan. Only the newest value is kept, so scans arriving
    /// faster than a reader polls are lost to that reader.
    #[must_use]
    pub fn subscribe_last_scan(&self) -> watch::Receiver<Option<ScanEvent>> {
        self.inner.shared.last_scan.subscribe()
    }

    #[must_use]
    pub fn subscribe_pairing_session(&self) -> watch::Receiver<Option<PairingSession>> {
        self.inner.shared.pairing.subscribe()
    }

    fn request(&self, request: Request) -> Result<(), ScannerError> {
        self.inner
            .inputs
            .send(MachineInput::Request(request))
            .map_err(|_closed| ScannerError::Shutdown)
    }

    #[cfg(test)]
    fn inject(&self, event: StampedEvent) {
        let _ = self.inner.inputs.send(MachineInput::Device(event));
    }
}

async fn run_pump(
    mut core: MachineCore,
    mut inputs: mpsc::UnboundedReceiver<MachineInput>,
    token: CancellationToken,
) {
    loop {
        let input = tokio::select! {
            () = token.cancelled() => break,
            input = inputs.recv() => match input {
                Some(input) => input,
                None => break,
            },
        };
        if core.handle(input).await == Flow::Stop {
            break;
        }
    }
    debug!("scanner event pump stopped");
}

struct MachineCore {
    sdk: Arc<dyn ScannerSdk>,
    settings: ScannerSettings,
    decoder: ScanDecoder,
    renderer: Arc<dyn PairingImageRenderer>,
    permissions: Arc<dyn PermissionProbe>,
    gate: Arc<SessionGate>,
    inputs: mpsc::UnboundedSender<MachineInput>,
    registration: Option<ObserverRegistration>,
    session: Option<SessionId>,
    next_session: SessionId,
    shared: Arc<Shared>,
}

impl MachineCore {
    async fn handle(&mut self, input: MachineInput) -> Flow {
        match input {
            MachineInput::Device(event) => self.on_device_event(event).await,
            MachineInput::PairingCodeReady { session, result } => {
                self.on_pairing_code_ready(session, result).await;
            }
            MachineInput::Request(Request::StartPairing(reply)) => {
                let outcome = self.start_pairing().await;
                let _ = reply.send(outcome);
            }
            MachineInput::Request(Request::Disconnect(reply)) => {
                self.disconnect().await;
                let _ = reply.send(());
            }
            MachineInput::Request(Request::QueryBattery(reply)) => {
                let outcome = self.query_battery().await;
                let _ = reply.send(outcome);
            }
            MachineInput::Request(Request::Shutdown(reply)) => {
                self.disconnect().await;
                if let Some(registration) = self.registration.take()
                    && let Err(error) = registration.release()
                {
                    debug!(%error, "failed to release scanner SDK observer");
                }
                let _ = reply.send(());
                return Flow::Stop;
            }
        }
        Flow::Continue
    }

    fn state(&self) -> ConnectionState {
        *self.shared.state.borrow()
    }

    fn set_state(&self, next: ConnectionState) {
        let previous = self.shared.state.send_replace(next);
        if previous != next {
            info!(from = %previous, to = %next, "scanner connection state changed");
        }
    }

    fn set_last_error(&self, reason: Option<String>) {
        *self
            .shared
            .last_error
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = reason;
    }

    fn is_live(&self, stamp: Option<SessionId>) -> bool {
        stamp.is_some() && stamp == self.session
    }

    async fn start_pairing(&mut self) -> Result<PairingOutcome, ScannerError> {
        let missing = self.permissions.missing();
        if !missing.is_empty() {
            return Err(ScannerError::PermissionRequired { missing });
        }

        let state = self.state();
        let linked = self.shared.device.borrow().clone();
        if state == ConnectionState::Connected
            && let Some(device) = linked
        {
            return Ok(PairingOutcome::AlreadyConnected(device));
        }
        if state.is_pairing() {
            return Err(ScannerError::PairingInProgress);
        }

        if let Err(error) = self.ensure_registered() {
            self.fail(error.to_string()).await;
            return Err(error.into());
        }

        let session = self.next_session;
        self.next_session = session.next();
        self.session = Some(session);
        self.gate.open(session);
        self.set_last_error(None);
        self.set_state(ConnectionState::GeneratingPairingCode);
        self.spawn_pairing_code(session);
        info!(%session, "scanner pairing started");
        Ok(PairingOutcome::Started(session))
    }

    fn ensure_registered(&mut self) -> Result<(), crate::error::SdkError> {
        if self.registration.is_some() {
            return Ok(());
        }
        let forwarder = EventForwarder::new(Arc::clone(&self.gate), self.inputs.clone());
        let registration = ObserverRegistration::register(Arc::clone(&self.sdk), Arc::new(forwarder))?;
        self.registration = Some(registration);
        Ok(())
    }

    fn spawn_pairing_code(&self, session: SessionId) {
        let sdk = Arc::clone(&self.sdk);
        let renderer = Arc::clone(&self.renderer);
        let inputs = self.inputs.clone();
        let limit = self.settings.pairing_code_timeout();

        tokio::spawn(async move {
            let mut job = tokio::spawn(async move {
                let payload = sdk
                    .generate_pairing_payload()
                    .await
                    .map_err(|error| error.to_string())?;
                let image = renderer
                    .render(&payload)
                    .map_err(|error| error.to_string())?;
                Ok::<_, String>((payload, image))
            });

            let result = match timeout(limit, &mut job).await {
                Ok(Ok(result)) => result,
                Ok(Err(join_error)) => Err(format!("pairing code generation crashed: {join_error}")),
                Err(_elapsed) => {
                    job.abort();
                    Err(format!(
                        "pairing code generation timed out after {}",
                        humantime::format_duration(limit)
                    ))
                }
            };
            if inputs
                .send(MachineInput::PairingCodeReady { session, result })
                .is_err()
            {
                trace!(%session, "pairing code finished after the event pump stopped");
            }
        });
    }

    async fn on_pairing_code_ready(
        &mut self,
        session: SessionId,
        result: Result<(PairingPayload, PairingImage), String>,
    ) {
        if self.session != Some(session) || self.state() != ConnectionState::GeneratingPairingCode {
            debug!(%session, "discarding pairing code from a stale session");
            return;
        }

        match result {
            Ok((payload, image)) => {
                self.shared
                    .pairing
                    .send_replace(Some(PairingSession::new(session, payload, image)));
                self.set_state(ConnectionState::WaitingForScan);
                if let Err(error) = self.sdk.start_scan_to_connect().await {
                    self.fail(format!("failed to open the connect window: {error}"))
                        .await;
                }
            }
            Err(reason) => self.fail(reason).await,
        }
    }

    async fn on_device_event(&mut self, stamped: StampedEvent) {
        if self.state() == ConnectionState::Error {
            trace!(event = ?stamped.event(), "ignoring SDK event while in error");
            return;
        }

        let stamp = stamped.session();
        match stamped.into_event() {
            DeviceEvent::Link {
                state: SdkLinkState::Connecting,
                ..
            } => self.on_link_connecting(stamp),
            DeviceEvent::Link {
                state: SdkLinkState::Connected,
                device,
            } => self.on_link_connected(stamp, device).await,
            DeviceEvent::Link {
                state: SdkLinkState::Disconnected,
                ..
            } => self.on_link_disconnected(stamp).await,
            DeviceEvent::ScanData(payload) => self.on_scan_data(stamp, payload).await,
            DeviceEvent::Battery(level) => self.on_battery(stamp, level),
            DeviceEvent::Error { code, message } => self.on_sdk_error(stamp, code, message).await,
        }
    }

    fn on_link_connecting(&mut self, stamp: Option<SessionId>) {
        let state = self.state();
        let accepts = match state {
            ConnectionState::Connected => self.is_live(stamp),
            ConnectionState::Disconnected => stamp == self.session,
            _ => false,
        };
        if accepts {
            self.set_state(ConnectionState::Connecting);
        } else {
            debug!(%state, ?stamp, "ignoring connecting report");
        }
    }

    async fn on_link_connected(&mut self, stamp: Option<SessionId>, handle: Option<DeviceHandle>) {
        let state = self.state();
        let awaiting = matches!(
            state,
            ConnectionState::WaitingForScan | ConnectionState::Connecting
        );
        if !awaiting || !self.is_live(stamp) {
            debug!(%state, ?stamp, "ignoring connected report");
            return;
        }

        if let Err(error) = self.sdk.stop_scan_to_connect().await {
            debug!(%error, "failed to close the connect window");
        }

        let id = handle
            .as_ref()
            .map_or(FALLBACK_DEVICE_ID, DeviceHandle::address);
        let name = handle
            .as_ref()
            .and_then(DeviceHandle::name)
            .unwrap_or(FALLBACK_DEVICE_NAME);
        let device = DeviceInfo::new(id, name, DeviceKind::BleScanner).connected_now();
        info!(device_id = device.id(), name = device.name(), "scanner connected");

        self.shared.pairing.send_replace(None);
        self.shared.device.send_replace(Some(device));
        self.set_state(ConnectionState::Connected);

        if let Err(error) = self.sdk.start_scan().await {
            warn!(%error, "failed to start scan data delivery");
        }
        if let Err(error) = self.sdk.query_battery_level().await {
            debug!(%error, "initial battery query failed");
        }
    }

    async fn on_link_disconnected(&mut self, stamp: Option<SessionId>) {
        let state = self.state();
        let linked = matches!(
            state,
            ConnectionState::Connected | ConnectionState::Connecting
        );
        if !linked || stamp != self.session {
            debug!(%state, ?stamp, "ignoring disconnected report");
            return;
        }

        if let Err(error) = self.sdk.stop_scan().await {
            debug!(%error, "failed to stop scan data delivery");
        }
        info!("scanner link dropped");
        self.clear();
    }

    async fn on_scan_data(&mut self, stamp: Option<SessionId>, payload: Vec<u8>) {
        if self.state() != ConnectionState::Connected || !self.is_live(stamp) {
            debug!(?stamp, bytes = payload.len(), "ignoring scan data outside a live link");
            return;
        }

        let decoded = self.decoder.decode_payload(&payload);
        if decoded.text().trim().is_empty() {
            warn!(bytes = payload.len(), "dropping empty scan");
            return;
        }
        let device_id = self
            .shared
            .device
            .borrow()
            .as_ref()
            .map(|device| device.id().to_string());
        let mut event = ScanEvent::new(payload, decoded);
        if let Some(device_id) = device_id {
            event = event.with_device_id(device_id);
        }
        debug!(encoding = %event.encoding(), "scan decoded");
        self.shared.last_scan.send_replace(Some(event));

        if self.settings.beep_on_scan()
            && let Err(error) = self.sdk.beep(BeepTone::SCAN_ACCEPTED).await
        {
            debug!(%error, "scan confirmation beep failed");
        }
    }

    fn on_battery(&mut self, stamp: Option<SessionId>, level: u8) {
        if level > 100 {
            warn!(level, "ignoring out-of-range battery report");
            return;
        }
        if !self.is_live(stamp) {
            debug!(?stamp, level, "ignoring battery report from another session");
            return;
        }

        self.shared.device.send_modify(|device| {
            if let Some(device) = device {
                device.set_battery_level(level);
            }
        });
    }

    async fn on_sdk_error(&mut self, stamp: Option<SessionId>, code: i32, message: String) {
        let state = self.state();
        if !self.is_live(stamp) {
            debug!(code, %message, "ignoring SDK error from another session");
            return;
        }
        if state.is_pairing() {
            self.fail(format!("{code}: {message}")).await;
        } else {
            warn!(code, %message, "scanner SDK reported an error");
        }
    }

    async fn query_battery(&self) -> Result<(), ScannerError> {
        if self.state() != ConnectionState::Connected {
            return Err(ScannerError::NotConnected);
        }
        self.sdk
            .query_battery_level()
            .await
            .map_err(ScannerError::from)
    }

    async fn disconnect(&mut self) {
        if self.state() == ConnectionState::Disconnected && self.session.is_none() {
            trace!("scanner already disconnected");
            return;
        }

        if let Err(error) = self.sdk.stop_scan_to_connect().await {
            debug!(%error, "failed to close the connect window");
        }
        if let Err(error) = self.sdk.stop_scan().await {
            debug!(%error, "failed to stop scan data delivery");
        }
        if let Err(error) = self.sdk.disconnect_device().await {
            debug!(%error, "failed to drop the scanner link");
        }
        self.clear();
    }

    /// Moves to `Error`, keeping nothing from the failed attempt.
    async fn fail(&mut self, reason: String) {
        let previous = self.state();
        if matches!(
            previous,
            ConnectionState::WaitingForScan | ConnectionState::Connecting
        ) && let Err(error) = self.sdk.stop_scan_to_connect().await
        {
            debug!(%error, "failed to close the connect window");
        }

        warn!(%reason, "scanner pairing failed");
        self.session = None;
        self.gate.close();
        self.shared.pairing.send_replace(None);
        self.set_last_error(Some(reason));
        self.set_state(ConnectionState::Error);
    }

    fn clear(&mut self) {
        self.session = None;
        self.gate.close();
        self.shared.pairing.send_replace(None);
        self.shared.device.send_replace(None);
        self.shared.last_scan.send_replace(None);
        self.set_state(ConnectionState::Disconnected);
    }
}
