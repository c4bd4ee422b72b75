use serde::Serialize;
use serde_with::{DisplayFromStr, hex::Hex, serde_as};
use strum_macros::{Display, EnumIter};
use time::OffsetDateTime;

use crate::decode::{Decoded, Encoding, Symbology};
use crate::pairing::ConnectionState;

/// Device id of the always-present built-in camera entry.
pub const BUILTIN_CAMERA_ID: &str = "builtin_camera";

/// Scanner families the registry can route to.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Display, EnumIter, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceKind {
    /// BLE scanner paired through the QR handshake.
    #[strum(to_string = "ble_scanner")]
    BleScanner,
    /// Classic Bluetooth scanner acting as a HID keyboard.
    #[strum(to_string = "bluetooth_scanner")]
    BluetoothScanner,
    /// Built-in camera recogniser.
    #[strum(to_string = "camera")]
    Camera,
    #[strum(to_string = "unknown")]
    Unknown,
}

/// Snapshot of one scanner as seen by the registry.
#[derive(Debug, Clone, Eq, PartialEq, Serialize)]
pub struct DeviceInfo {
    id: String,
    name: String,
    kind: DeviceKind,
    connection_state: ConnectionState,
    battery_level: Option<u8>,
    #[serde(with = "time::serde::rfc3339::option")]
    last_connected: Option<OffsetDateTime>,
}

impl DeviceInfo {
    /// Creates a disconnected device entry.
    #[must_use]
    pub fn new(id: impl Into<String>, name: impl Into<String>, kind: DeviceKind) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            kind,
            connection_state: ConnectionState::Disconnected,
            battery_level: None,
            last_connected: None,
        }
    }

    /// Returns the built-in camera entry, which is always connected.
    #[must_use]
    pub fn builtin_camera() -> Self {
        Self::new(BUILTIN_CAMERA_ID, "Built-in camera", DeviceKind::Camera)
            .with_connection_state(ConnectionState::Connected)
    }

    /// Marks the entry as connected now.
    #[must_use]
    pub fn connected_now(self) -> Self {
        let mut device = self.with_connection_state(ConnectionState::Connected);
        device.last_connected = Some(OffsetDateTime::now_utc());
        device
    }

    #[must_use]
    pub fn with_connection_state(mut self, connection_state: ConnectionState) -> Self {
        self.connection_state = connection_state;
        self
    }

    #[must_use]
    pub fn with_battery_level(mut self, battery_level: Option<u8>) -> Self {
        self.battery_level = battery_level;
        self
    }

    /// Stable address-like identifier.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn kind(&self) -> DeviceKind {
        self.kind
    }

    #[must_use]
    pub fn connection_state(&self) -> ConnectionState {
        self.connection_state
    }

    /// Last reported battery percentage.
    #[must_use]
    pub fn battery_level(&self) -> Option<u8> {
        self.battery_level
    }

    #[must_use]
    pub fn last_connected(&self) -> Option<OffsetDateTime> {
        self.last_connected
    }

    /// Returns whether the snapshot reports an established link.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.connection_state == ConnectionState::Connected
    }

    pub(crate) fn set_battery_level(&mut self, battery_level: u8) {
        self.battery_level = Some(battery_level);
    }

    pub(crate) fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }
}

/// Capture metadata forwarded from the source without interpretation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct ScanMetadata {
    quality: Option<f32>,
    orientation: Option<u16>,
}

impl ScanMetadata {
    #[must_use]
    pub fn new(quality: Option<f32>, orientation: Option<u16>) -> Self {
        Self {
            quality,
            orientation,
        }
    }

    #[must_use]
    pub fn quality(&self) -> Option<f32> {
        self.quality
    }

    #[must_use]
    pub fn orientation(&self) -> Option<u16> {
        self.orientation
    }
}

/// One decoded scan.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScanEvent {
    #[serde_as(as = "Hex")]
    raw: Vec<u8>,
    text: String,
    encoding: Encoding,
    #[serde_as(as = "Option<DisplayFromStr>")]
    symbology: Option<Symbology>,
    device_id: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    captured_at: OffsetDateTime,
    metadata: ScanMetadata,
}

impl ScanEvent {
    /// Creates a scan event captured now from a raw payload and its decoding.
    #[must_use]
    pub fn new(raw: Vec<u8>, decoded: Decoded) -> Self {
        let (text, encoding, symbology) = decoded.into_parts();
        Self {
            raw,
            text,
            encoding,
            symbology,
            device_id: None,
            captured_at: OffsetDateTime::now_utc(),
            metadata: ScanMetadata::default(),
        }
    }

    #[must_use]
    pub fn with_device_id(mut self, device_id: impl Into<String>) -> Self {
        self.device_id = Some(device_id.into());
        self
    }

    #[must_use]
    pub fn with_metadata(mut self, metadata: ScanMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    /// Payload bytes exactly as received.
    #[must_use]
    pub fn raw(&self) -> &[u8] {
        &self.raw
    }

    /// Decoded text.
    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    #[must_use]
    pub fn encoding(&self) -> Encoding {
        self.encoding
    }

    #[must_use]
    pub fn symbology(&self) -> Option<&Symbology> {
        self.symbology.as_ref()
    }

    #[must_use]
    pub fn device_id(&self) -> Option<&str> {
        self.device_id.as_deref()
    }

    #[must_use]
    pub fn captured_at(&self) -> OffsetDateTime {
        self.captured_at
    }

    #[must_use]
    pub fn metadata(&self) -> ScanMetadata {
        self.metadata
    }
}

/// Registry-wide scanning phase.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Display, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanningState {
    #[strum(to_string = "idle")]
    Idle,
    #[strum(to_string = "scanning")]
    Scanning,
    #[strum(to_string = "paused")]
    Paused,
    #[strum(to_string = "error")]
    Error,
}

/// Devices merged across all backends together with the current default.
#[derive(Debug, Clone, Eq, PartialEq, Serialize)]
pub struct DeviceListing {
    devices: Vec<DeviceInfo>,
    default_device: DeviceInfo,
}

impl DeviceListing {
    pub(crate) fn new(devices: Vec<DeviceInfo>, default_device: DeviceInfo) -> Self {
        Self {
            devices,
            default_device,
        }
    }

    #[must_use]
    pub fn devices(&self) -> &[DeviceInfo] {
        &self.devices
    }

    /// Returns the designated default device. Never absent.
    #[must_use]
    pub fn default_device(&self) -> &DeviceInfo {
        &self.default_device
    }

    /// Looks up a listed device by id.
    #[must_use]
    pub fn find(&self, device_id: &str) -> Option<&DeviceInfo> {
        self.devices.iter().find(|device| device.id() == device_id)
    }
}
