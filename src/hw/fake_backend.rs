use std::collections::HashMap;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use bon::Builder;
use strum_macros::{Display, EnumIter};
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::sdk::{BeepTone, DeviceHandle, PairingPayload, ScannerSdk, SdkLinkState, SdkObserver};
use crate::error::{FixtureError, SdkError};

const DEFAULT_SCANNER_FIXTURE: &str = "FA:KE:00:00:00:01|Fake BLE Scanner|87";

/// SDK requests recorded by [`FakeScannerSdk`].
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Display, EnumIter)]
#[strum(serialize_all = "snake_case")]
pub enum FakeCall {
    RegisterObserver,
    UnregisterObserver,
    GeneratePairingPayload,
    StartScanToConnect,
    StopScanToConnect,
    StartScan,
    StopScan,
    QueryBatteryLevel,
    Beep,
    DisconnectDevice,
}

/// Parsed `address|name|battery` scanner fixture.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct ScannerFixture {
    address: String,
    name: String,
    battery_level: u8,
}

impl ScannerFixture {
    fn handle(&self) -> DeviceHandle {
        DeviceHandle::new(self.address.clone(), Some(self.name.clone()))
    }
}

impl Default for ScannerFixture {
    fn default() -> Self {
        parse_scanner_record(DEFAULT_SCANNER_FIXTURE).unwrap_or_else(|_error| Self {
            address: "FA:KE:00:00:00:01".to_string(),
            name: "Fake BLE Scanner".to_string(),
            battery_level: 87,
        })
    }
}

impl FromStr for ScannerFixture {
    type Err = FixtureError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        if value.trim().is_empty() {
            return Err(FixtureError::EmptyFixture);
        }
        parse_scanner_record(value)
    }
}

/// Parsed comma-separated hexadecimal scan payloads.
#[derive(Debug, Clone, Default, Eq, PartialEq, derive_more::Into)]
pub struct ScanPayloads {
    payloads: Vec<Vec<u8>>,
}

impl FromStr for ScanPayloads {
    type Err = FixtureError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let payloads = parse_scan_payloads(value)?;
        Ok(Self { payloads })
    }
}

/// Settings for constructing a fake scanner SDK.
#[derive(Debug, Clone, Builder)]
pub struct FakeSdkConfig {
    #[builder(default)]
    scanner: ScannerFixture,
    #[builder(default)]
    scans: ScanPayloads,
    /// Delay before a pairing payload is produced.
    #[builder(default)]
    pairing_delay: Duration,
    /// Makes pairing payload generation fail with this message.
    pairing_failure: Option<String>,
    /// Delay between opening the connect window and the scanner linking.
    #[builder(default)]
    connect_delay: Duration,
    #[builder(default = Duration::from_millis(200))]
    scan_interval: Duration,
    /// Simulates an operator: links after the connect window opens and plays
    /// the fixture scans once scanning starts.
    #[builder(default = true)]
    auto_connect: bool,
}

/// In-memory scanner SDK used in tests and non-hardware environments.
pub struct FakeScannerSdk {
    config: FakeSdkConfig,
    observer: Mutex<Option<Arc<dyn SdkObserver>>>,
    calls: Mutex<HashMap<FakeCall, usize>>,
    issued_payloads: AtomicU64,
    connect_window: Mutex<CancellationToken>,
    scan_feed: Mutex<CancellationToken>,
}

impl FakeScannerSdk {
    #[must_use]
    pub fn new(config: FakeSdkConfig) -> Self {
        Self {
            config,
            observer: Mutex::new(None),
            calls: Mutex::new(HashMap::new()),
            issued_payloads: AtomicU64::new(0),
            connect_window: Mutex::new(CancellationToken::new()),
            scan_feed: Mutex::new(CancellationToken::new()),
        }
    }

    /// A fake that only emits callbacks when told to.
    #[must_use]
    pub fn manual() -> Self {
        Self::new(FakeSdkConfig::builder().auto_connect(false).build())
    }

    /// Number of times `call` was issued.
    #[must_use]
    pub fn calls(&self, call: FakeCall) -> usize {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&call)
            .copied()
            .unwrap_or(0)
    }

    /// Returns whether an observer is registered.
    #[must_use]
    pub fn has_observer(&self) -> bool {
        self.observer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Handle of the fixture scanner.
    #[must_use]
    pub fn device_handle(&self) -> DeviceHandle {
        self.config.scanner.handle()
    }

    pub fn emit_link(&self, state: SdkLinkState) {
        let device = (state != SdkLinkState::Disconnected).then(|| self.device_handle());
        if let Some(observer) = self.current_observer() {
            observer.on_connection_state_changed(state, device);
        }
    }

    pub fn emit_scan(&self, payload: &[u8]) {
        if let Some(observer) = self.current_observer() {
            observer.on_scan_data(payload.to_vec());
        }
    }

    pub fn emit_battery(&self, level: u8) {
        if let Some(observer) = self.current_observer() {
            observer.on_battery_level(level);
        }
    }

    pub fn emit_error(&self, code: i32, message: &str) {
        if let Some(observer) = self.current_observer() {
            observer.on_error(code, message.to_string());
        }
    }

    fn current_observer(&self) -> Option<Arc<dyn SdkObserver>> {
        self.observer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn record(&self, call: FakeCall) {
        *self
            .calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(call)
            .or_default() += 1;
    }

    fn restart(slot: &Mutex<CancellationToken>) -> CancellationToken {
        let mut token = slot.lock().unwrap_or_else(PoisonError::into_inner);
        token.cancel();
        *token = CancellationToken::new();
        token.clone()
    }

    fn cancel(slot: &Mutex<CancellationToken>) {
        slot.lock().unwrap_or_else(PoisonError::into_inner).cancel();
    }
}

#[async_trait]
impl ScannerSdk for FakeScannerSdk {
    fn register_observer(&self, observer: Arc<dyn SdkObserver>) -> Result<(), SdkError> {
        self.record(FakeCall::RegisterObserver);
        let mut slot = self.observer.lock().unwrap_or_else(PoisonError::into_inner);
        if slot.is_some() {
            return Err(SdkError::AlreadyRegistered);
        }
        *slot = Some(observer);
        Ok(())
    }

    fn unregister_observer(&self) -> Result<(), SdkError> {
        self.record(FakeCall::UnregisterObserver);
        self.observer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .map(|_observer| ())
            .ok_or(SdkError::NotRegistered)
    }

    async fn generate_pairing_payload(&self) -> Result<PairingPayload, SdkError> {
        self.record(FakeCall::GeneratePairingPayload);
        if !self.config.pairing_delay.is_zero() {
            sleep(self.config.pairing_delay).await;
        }
        if let Some(message) = &self.config.pairing_failure {
            return Err(SdkError::Rejected {
                code: -1,
                message: message.clone(),
            });
        }

        let serial = self.issued_payloads.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(PairingPayload::new(format!(
            "scanlink-pair:{}:{serial}",
            self.config.scanner.address
        )))
    }

    async fn start_scan_to_connect(&self) -> Result<(), SdkError> {
        self.record(FakeCall::StartScanToConnect);
        let token = Self::restart(&self.connect_window);
        if !self.config.auto_connect {
            return Ok(());
        }

        let Some(observer) = self.current_observer() else {
            return Err(SdkError::NotRegistered);
        };
        let device = self.device_handle();
        let delay = self.config.connect_delay;
        info!(address = device.address(), "fake scanner will link after the connect delay");
        tokio::spawn(async move {
            tokio::select! {
                () = token.cancelled() => {}
                () = sleep(delay) => {
                    observer.on_connection_state_changed(SdkLinkState::Connecting, Some(device.clone()));
                    observer.on_connection_state_changed(SdkLinkState::Connected, Some(device));
                }
            }
        });
        Ok(())
    }

    async fn stop_scan_to_connect(&self) -> Result<(), SdkError> {
        self.record(FakeCall::StopScanToConnect);
        Self::cancel(&self.connect_window);
        Ok(())
    }

    async fn start_scan(&self) -> Result<(), SdkError> {
        self.record(FakeCall::StartScan);
        let token = Self::restart(&self.scan_feed);
        if !self.config.auto_connect || self.config.scans.payloads.is_empty() {
            return Ok(());
        }

        let Some(observer) = self.current_observer() else {
            return Err(SdkError::NotRegistered);
        };
        let payloads = self.config.scans.payloads.clone();
        let interval = self.config.scan_interval;
        tokio::spawn(async move {
            for payload in payloads {
                tokio::select! {
                    () = token.cancelled() => return,
                    () = sleep(interval) => observer.on_scan_data(payload),
                }
            }
            debug!("fake scan feed exhausted");
        });
        Ok(())
    }

    async fn stop_scan(&self) -> Result<(), SdkError> {
        self.record(FakeCall::StopScan);
        Self::cancel(&self.scan_feed);
        Ok(())
    }

    async fn query_battery_level(&self) -> Result<(), SdkError> {
        self.record(FakeCall::QueryBatteryLevel);
        self.emit_battery(self.config.scanner.battery_level);
        Ok(())
    }

    async fn beep(&self, _tone: BeepTone) -> Result<(), SdkError> {
        self.record(FakeCall::Beep);
        Ok(())
    }

    async fn disconnect_device(&self) -> Result<(), SdkError> {
        self.record(FakeCall::DisconnectDevice);
        Self::cancel(&self.connect_window);
        Self::cancel(&self.scan_feed);
        Ok(())
    }
}

fn parse_scanner_record(raw_record: &str) -> Result<ScannerFixture, FixtureError> {
    let fields: Vec<&str> = raw_record.split('|').map(str::trim).collect();
    let [address, name, battery] = fields.as_slice() else {
        return Err(FixtureError::InvalidRecordFieldCount { expected: 3 });
    };
    if address.is_empty() || name.is_empty() || battery.is_empty() {
        return Err(FixtureError::EmptyRecordField);
    }

    let battery_level = battery
        .parse::<u8>()
        .ok()
        .filter(|level| *level <= 100)
        .ok_or_else(|| FixtureError::InvalidBatteryLevel {
            value: (*battery).to_string(),
        })?;

    Ok(ScannerFixture {
        address: (*address).to_string(),
        name: (*name).to_string(),
        battery_level,
    })
}

fn parse_scan_payloads(raw_value: &str) -> Result<Vec<Vec<u8>>, FixtureError> {
    if raw_value.trim().is_empty() {
        return Ok(Vec::new());
    }

    raw_value
        .split(',')
        .map(|payload| {
            let cleaned: String = payload.chars().filter(|c| !c.is_whitespace()).collect();
            hex::decode(cleaned).map_err(|source| FixtureError::InvalidHex { source })
        })
        .collect()
}
