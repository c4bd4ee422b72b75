mod backend;
mod ble;
mod camera;
mod hid;
mod manager;

pub use self::backend::{BackendEvent, EventStream, ScannerBackend};
pub use self::ble::{BleScannerBackend, PAIRING_ENTRY_ID};
pub use self::camera::CameraBackend;
pub use self::hid::HidScannerBackend;
pub use self::manager::ScannerRegistry;
