use strum::IntoEnumIterator;
use strum_macros::{Display, EnumIter};

/// Platform permissions the BLE scanner link depends on.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Display, EnumIter)]
pub enum Permission {
    #[strum(to_string = "bluetooth_connect")]
    BluetoothConnect,
    #[strum(to_string = "bluetooth_scan")]
    BluetoothScan,
    #[strum(to_string = "bluetooth_advertise")]
    BluetoothAdvertise,
    /// Location access, which some platforms require for BLE discovery.
    #[strum(to_string = "fine_location")]
    FineLocation,
}

impl Permission {
    /// Every permission the BLE pairing flow needs.
    #[must_use]
    pub fn bluetooth() -> Vec<Self> {
        Self::iter().collect()
    }
}

/// Answers which scanner permissions the platform has not granted.
pub trait PermissionProbe: Send + Sync {
    /// Returns the permissions still missing. Empty when pairing may proceed.
    fn missing(&self) -> Vec<Permission>;
}

/// Permission probe with a fixed answer.
///
/// Desktop platforms gate Bluetooth at the adapter rather than per process;
/// there the real SDK reports denial as an error instead.
#[derive(Debug, Clone, Default)]
pub struct StaticPermissionProbe {
    missing: Vec<Permission>,
}

impl StaticPermissionProbe {
    /// A probe reporting every permission as granted.
    #[must_use]
    pub fn granted() -> Self {
        Self::default()
    }

    /// A probe reporting `missing` as not granted.
    #[must_use]
    pub fn denied(missing: Vec<Permission>) -> Self {
        Self { missing }
    }
}

impl PermissionProbe for StaticPermissionProbe {
    fn missing(&self) -> Vec<Permission> {
        self.missing.clone()
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn bluetooth_permissions_cover_connect_scan_advertise_and_location() {
        assert_eq!(
            vec![
                Permission::BluetoothConnect,
                Permission::BluetoothScan,
                Permission::BluetoothAdvertise,
                Permission::FineLocation,
            ],
            Permission::bluetooth()
        );
    }

    #[test]
    fn static_probe_reports_configured_answer() {
        assert!(StaticPermissionProbe::granted().missing().is_empty());
        assert_eq!(
            vec![Permission::BluetoothScan],
            StaticPermissionProbe::denied(vec![Permission::BluetoothScan]).missing()
        );
    }
}
