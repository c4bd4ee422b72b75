//! Barcode scanner connectivity: payload decoding, BLE pairing through a QR
//! handshake, and a registry routing between BLE, HID and camera scanners.

mod app;
mod cli;
mod config;
mod decode;
mod error;
mod hw;
mod model;
mod pairing;
mod protocol;
mod registry;
mod telemetry;
mod terminal;
mod utils;

pub use app::{
    ScannerClients, fake_scanner_clients, real_scanner_clients, run, run_with_clients,
    run_with_clients_and_log_level, run_with_log_level,
};
pub use cli::{Args, Command, DecodeArgs, FakeArgs, LogLevel, OutputFormat, PairArgs};
pub use config::{ScanMode, ScannerSettings};
pub use decode::{Decoded, Encoding, ScanDecoder, Symbology, decode, latin_to_cyrillic, split_prefix};
pub use error::{ConfigError, FixtureError, ScannerError, SdkError};
pub use hw::{
    BeepTone, BondedDevice, BtleplugScannerSdk, DeviceEvent, DeviceHandle, FakeCall,
    FakeScannerSdk, FakeSdkConfig, HidLinkProbe, ObserverRegistration, PairingPayload,
    Permission, PermissionProbe, ScanPayloads, ScannerFixture, ScannerSdk, SdkLinkState,
    SdkObserver, StaticHidProbe, StaticPermissionProbe, is_scanner_device,
};
pub use model::{
    BUILTIN_CAMERA_ID, DeviceInfo, DeviceKind, DeviceListing, ScanEvent, ScanMetadata,
    ScanningState,
};
pub use pairing::{
    ConnectionState, PairingImage, PairingImageRenderer, PairingMachine, PairingMachineOptions,
    PairingOutcome, PairingSession, QrTextRenderer, RenderError, SessionId,
};
pub use protocol::EndpointId;
pub use registry::{
    BackendEvent, BleScannerBackend, CameraBackend, EventStream, HidScannerBackend,
    PAIRING_ENTRY_ID, ScannerBackend, ScannerRegistry,
};
pub use terminal::TerminalClient;
