use std::sync::Arc;

use async_trait::async_trait;
use strum_macros::{Display, EnumString};

use crate::error::SdkError;

/// Link state reported by the scanner SDK.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Display, EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum SdkLinkState {
    Connecting,
    Connected,
    Disconnected,
}

/// Scanner identity attached to SDK link callbacks.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct DeviceHandle {
    address: String,
    name: Option<String>,
}

impl DeviceHandle {
    #[must_use]
    pub fn new(address: impl Into<String>, name: Option<String>) -> Self {
        Self {
            address: address.into(),
            name,
        }
    }

    #[must_use]
    pub fn address(&self) -> &str {
        &self.address
    }

    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }
}

/// One-time text a scanner reads to start the BLE link.
#[derive(Debug, Clone, Eq, PartialEq, derive_more::Display)]
pub struct PairingPayload(String);

impl PairingPayload {
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Tone parameters for the scanner buzzer.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct BeepTone {
    pub frequency_hz: u16,
    pub duration_ms: u16,
    pub volume: u8,
}

impl BeepTone {
    /// Short confirmation beep played after an accepted scan.
    pub const SCAN_ACCEPTED: Self = Self {
        frequency_hz: 2700,
        duration_ms: 100,
        volume: 15,
    };
}

/// Callbacks the scanner SDK delivers.
///
/// Implementations must be cheap and non-blocking; the SDK may invoke them
/// from any thread.
pub trait SdkObserver: Send + Sync {
    fn on_connection_state_changed(&self, state: SdkLinkState, device: Option<DeviceHandle>);

    fn on_scan_data(&self, payload: Vec<u8>);

    fn on_battery_level(&self, level: u8);

    fn on_error(&self, code: i32, message: String);
}

/// Requests the host can issue to a BLE scanner SDK.
///
/// Only one observer can be registered at a time.
#[async_trait]
pub trait ScannerSdk: Send + Sync {
    fn register_observer(&self, observer: Arc<dyn SdkObserver>) -> Result<(), SdkError>;

    fn unregister_observer(&self) -> Result<(), SdkError>;

    /// Produces the payload to render as a pairing code.
    async fn generate_pairing_payload(&self) -> Result<PairingPayload, SdkError>;

    /// Opens the window in which a scanner that read the pairing code may
    /// connect.
    async fn start_scan_to_connect(&self) -> Result<(), SdkError>;

    async fn stop_scan_to_connect(&self) -> Result<(), SdkError>;

    /// Starts delivery of scan data from the connected scanner.
    async fn start_scan(&self) -> Result<(), SdkError>;

    async fn stop_scan(&self) -> Result<(), SdkError>;

    /// Requests a battery report, delivered through the observer.
    async fn query_battery_level(&self) -> Result<(), SdkError>;

    async fn beep(&self, tone: BeepTone) -> Result<(), SdkError>;

    /// Drops the link to the connected scanner.
    async fn disconnect_device(&self) -> Result<(), SdkError>;
}
