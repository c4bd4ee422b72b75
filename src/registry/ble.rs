use std::time::Duration;

use async_trait::async_trait;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::WatchStream;
use tracing::{info, instrument, warn};

use super::backend::{BackendEvent, EventStream, ScannerBackend};
use crate::error::ScannerError;
use crate::model::{DeviceInfo, DeviceKind};
use crate::pairing::{ConnectionState, PairingMachine, PairingOutcome};

/// Device id of the listing entry that starts a new QR handshake.
pub const PAIRING_ENTRY_ID: &str = "ble-pairing";

/// BLE scanners linked through the pairing machine.
pub struct BleScannerBackend {
    machine: PairingMachine,
    connection_timeout: Duration,
}

impl BleScannerBackend {
    #[must_use]
    pub fn new(machine: PairingMachine, connection_timeout: Duration) -> Self {
        Self {
            machine,
            connection_timeout,
        }
    }

    /// The pairing machine behind this backend.
    #[must_use]
    pub fn machine(&self) -> &PairingMachine {
        &self.machine
    }

    fn pairing_entry(&self) -> DeviceInfo {
        let state = self.machine.state();
        let shown_state = if state.is_pairing() {
            state
        } else {
            ConnectionState::Disconnected
        };
        DeviceInfo::new(PAIRING_ENTRY_ID, "Pair a BLE scanner", DeviceKind::BleScanner)
            .with_connection_state(shown_state)
    }

    fn owns(&self, device_id: &str) -> bool {
        device_id == PAIRING_ENTRY_ID
            || self
                .machine
                .device()
                .is_some_and(|device| device.id() == device_id)
    }
}

#[async_trait]
impl ScannerBackend for BleScannerBackend {
    fn kind(&self) -> DeviceKind {
        DeviceKind::BleScanner
    }

    async fn list_devices(&self) -> Result<Vec<DeviceInfo>, ScannerError> {
        let mut devices: Vec<DeviceInfo> = self.machine.device().into_iter().collect();
        devices.push(self.pairing_entry());
        Ok(devices)
    }

    #[instrument(skip(self), level = "debug")]
    async fn connect(&self, device_id: &str) -> Result<DeviceInfo, ScannerError> {
        if !self.owns(device_id) {
            return Err(ScannerError::UnknownDevice {
                device_id: device_id.to_string(),
            });
        }

        if let PairingOutcome::AlreadyConnected(device) = self.machine.start_pairing().await? {
            return Ok(device);
        }
        info!("waiting for the operator to scan the pairing code");

        match self.machine.wait_until_settled(self.connection_timeout).await {
            Ok(ConnectionState::Connected) => {
                self.machine
                    .device()
                    .ok_or_else(|| ScannerError::ConnectionFailed {
                        reason: "scanner link dropped right after connecting".to_string(),
                    })
            }
            Ok(ConnectionState::Disconnected) => Err(ScannerError::ConnectionFailed {
                reason: "pairing was cancelled".to_string(),
            }),
            Ok(_failed) => Err(ScannerError::ConnectionFailed {
                reason: self
                    .machine
                    .last_error()
                    .unwrap_or_else(|| "pairing failed".to_string()),
            }),
            Err(error) => {
                warn!(%error, "abandoning scanner pairing");
                self.machine.disconnect().await;
                Err(error)
            }
        }
    }

    async fn disconnect(&self, device_id: &str) -> Result<(), ScannerError> {
        if self.owns(device_id) {
            self.machine.disconnect().await;
        }
        Ok(())
    }

    fn events(&self) -> EventStream {
        let scans = WatchStream::from_changes(self.machine.subscribe_last_scan())
            .filter_map(|scan| scan.map(BackendEvent::Scan));
        let links = WatchStream::new(self.machine.subscribe_device())
            .map(|device| BackendEvent::Links(device.into_iter().collect()));
        Box::pin(links.merge(scans))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use assert_matches::assert_matches;
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::hw::{FakeScannerSdk, FakeSdkConfig};
    use crate::pairing::PairingMachineOptions;

    fn backend(config: FakeSdkConfig) -> BleScannerBackend {
        let sdk = Arc::new(FakeScannerSdk::new(config));
        let machine = PairingMachine::spawn(PairingMachineOptions::builder().sdk(sdk).build());
        BleScannerBackend::new(machine, Duration::from_secs(30))
    }

    #[tokio::test]
    async fn listing_offers_the_pairing_entry_when_nothing_is_linked() {
        let backend = backend(FakeSdkConfig::builder().auto_connect(false).build());

        let devices = backend.list_devices().await.expect("listing should succeed");

        assert_eq!(1, devices.len());
        assert_eq!(PAIRING_ENTRY_ID, devices[0].id());
    }

    #[tokio::test(start_paused = true)]
    async fn connecting_the_pairing_entry_links_the_scanner() {
        let backend = backend(FakeSdkConfig::builder().build());

        let device = backend
            .connect(PAIRING_ENTRY_ID)
            .await
            .expect("auto-linking fake should connect");

        assert_eq!("FA:KE:00:00:00:01", device.id());
        assert!(device.is_connected());
        let listed = backend.list_devices().await.expect("listing should succeed");
        assert_eq!(2, listed.len());
    }

    #[tokio::test(start_paused = true)]
    async fn pairing_failures_become_connection_failures() {
        let backend = backend(
            FakeSdkConfig::builder()
                .pairing_failure("adapter busy".to_string())
                .build(),
        );

        assert_matches!(
            backend.connect(PAIRING_ENTRY_ID).await,
            Err(ScannerError::ConnectionFailed { reason }) if reason.contains("adapter busy")
        );
    }

    #[tokio::test(start_paused = true)]
    async fn unanswered_pairing_times_out_and_resets() {
        let backend = backend(FakeSdkConfig::builder().auto_connect(false).build());

        assert_matches!(
            backend.connect(PAIRING_ENTRY_ID).await,
            Err(ScannerError::Timeout { .. })
        );
        assert_eq!(ConnectionState::Disconnected, backend.machine().state());
    }

    #[tokio::test]
    async fn unknown_ids_are_rejected() {
        let backend = backend(FakeSdkConfig::builder().auto_connect(false).build());

        assert_matches!(
            backend.connect("AA:BB").await,
            Err(ScannerError::UnknownDevice { device_id }) if device_id == "AA:BB"
        );
    }
}
