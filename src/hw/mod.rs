mod btleplug_backend;
mod fake_backend;
mod hid;
mod observer;
mod permissions;
mod sdk;

pub use self::btleplug_backend::BtleplugScannerSdk;
pub use self::fake_backend::{
    FakeCall, FakeScannerSdk, FakeSdkConfig, ScanPayloads, ScannerFixture,
};
pub use self::hid::{BondedDevice, HidLinkProbe, StaticHidProbe, is_scanner_device};
pub use self::observer::{
    DeviceEvent, EventForwarder, ObserverRegistration, SessionGate, StampedEvent,
};
pub use self::permissions::{Permission, PermissionProbe, StaticPermissionProbe};
pub use self::sdk::{
    BeepTone, DeviceHandle, PairingPayload, ScannerSdk, SdkLinkState, SdkObserver,
};
