use std::fmt::{self, Display, Formatter};

use crate::model::{DeviceInfo, DeviceListing};
use crate::utils::{format_battery, format_timestamp};

use super::painter::Painter;
use super::table::Table;

/// Renders one scanner as a key-value table.
pub(crate) struct DeviceView<'a> {
    device: &'a DeviceInfo,
    painter: &'a Painter,
}

impl<'a> DeviceView<'a> {
    pub(crate) fn new(device: &'a DeviceInfo, painter: &'a Painter) -> Self {
        Self { device, painter }
    }
}

impl Display for DeviceView<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let device = self.device;
        let table = Table::key_value(
            self.painter,
            vec![
                ("id", self.painter.value(device.id())),
                ("name", self.painter.value(device.name())),
                ("kind", self.painter.value(device.kind().to_string())),
                (
                    "state",
                    self.painter.connection_state(device.connection_state()),
                ),
                (
                    "battery",
                    self.painter.value(format_battery(device.battery_level())),
                ),
                (
                    "last_connected",
                    self.painter.value(format_timestamp(device.last_connected())),
                ),
            ],
        );
        write!(f, "{table}")
    }
}

/// Renders every listed scanner, marking the default device.
pub(crate) struct DeviceListView<'a> {
    listing: &'a DeviceListing,
    painter: &'a Painter,
}

impl<'a> DeviceListView<'a> {
    pub(crate) fn new(listing: &'a DeviceListing, painter: &'a Painter) -> Self {
        Self { listing, painter }
    }
}

impl Display for DeviceListView<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let default_device = self.listing.default_device();
        let rows = self
            .listing
            .devices()
            .iter()
            .map(|device| {
                let marker = if device.id() == default_device.id() {
                    self.painter.success("*")
                } else {
                    String::new()
                };
                vec![
                    marker,
                    self.painter.value(device.id()),
                    device.name().to_string(),
                    device.kind().to_string(),
                    self.painter.connection_state(device.connection_state()),
                    format_battery(device.battery_level()),
                ]
            })
            .collect();
        let table = Table::grid(["", "id", "name", "kind", "state", "battery"], rows);

        writeln!(f, "{}", self.painter.heading("Scanners:"))?;
        writeln!(f, "{table}")?;
        write!(
            f,
            "{} {} {}",
            self.painter.heading("Default device:"),
            self.painter.value(default_device.name()),
            self.painter.muted(format!("({})", default_device.id()))
        )
    }
}

#[cfg(test)]
mod tests {
    use insta::assert_snapshot;

    use super::*;
    use crate::model::DeviceKind;
    use crate::pairing::ConnectionState;

    #[test]
    fn device_view_renders_every_field() {
        let device = DeviceInfo::new("AA:BB:CC:DD:EE:FF", "HR32 Scanner", DeviceKind::BleScanner)
            .with_connection_state(ConnectionState::Connected)
            .with_battery_level(Some(87));
        let painter = Painter::new(false);

        assert_snapshot!(DeviceView::new(&device, &painter).to_string(), @r"
    ╭────────────────┬───────────────────╮
    │ field          │ value             │
    ├────────────────┼───────────────────┤
    │ id             │ AA:BB:CC:DD:EE:FF │
    │ name           │ HR32 Scanner      │
    │ kind           │ ble_scanner       │
    │ state          │ connected         │
    │ battery        │ 87%               │
    │ last_connected │ -                 │
    ╰────────────────┴───────────────────╯
    ");
    }

    #[test]
    fn device_list_marks_the_default_device() {
        let listing = DeviceListing::new(
            vec![
                DeviceInfo::builtin_camera(),
                DeviceInfo::new("ble-pairing", "Pair a BLE scanner", DeviceKind::BleScanner),
                DeviceInfo::new("11:22:33", "Keyboard Scanner", DeviceKind::BluetoothScanner)
                    .with_connection_state(ConnectionState::Connected),
            ],
            DeviceInfo::builtin_camera(),
        );
        let painter = Painter::new(false);

        assert_snapshot!(DeviceListView::new(&listing, &painter).to_string(), @r"
    Scanners:
    ╭───┬────────────────┬────────────────────┬───────────────────┬──────────────┬─────────╮
    │   │ id             │ name               │ kind              │ state        │ battery │
    ├───┼────────────────┼────────────────────┼───────────────────┼──────────────┼─────────┤
    │ * │ builtin_camera │ Built-in camera    │ camera            │ connected    │ -       │
    │   │ ble-pairing    │ Pair a BLE scanner │ ble_scanner       │ disconnected │ -       │
    │   │ 11:22:33       │ Keyboard Scanner   │ bluetooth_scanner │ connected    │ -       │
    ╰───┴────────────────┴────────────────────┴───────────────────┴──────────────┴─────────╯
    Default device: Built-in camera (builtin_camera)
    ");
    }
}
