use std::collections::HashMap;
use std::sync::LazyLock;

use strum::IntoEnumIterator;
use strum_macros::{Display, EnumIter};

/// GATT endpoints a BLE barcode scanner exposes.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, EnumIter, Display)]
pub enum EndpointId {
    /// Nordic UART service carrying scan data.
    #[strum(to_string = "uart_service")]
    UartService,
    /// Scanner-to-host notifications with raw scan payloads.
    #[strum(to_string = "uart_tx_characteristic")]
    UartTxCharacteristic,
    /// Host-to-scanner writes.
    #[strum(to_string = "uart_rx_characteristic")]
    UartRxCharacteristic,
    #[strum(to_string = "battery_service")]
    BatteryService,
    /// Battery percentage, readable and notifiable.
    #[strum(to_string = "battery_level_characteristic")]
    BatteryLevelCharacteristic,
}

/// Endpoint category in GATT.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Display)]
pub(crate) enum EndpointKind {
    #[strum(to_string = "service")]
    Service,
    #[strum(to_string = "characteristic")]
    Characteristic,
}

/// Descriptive metadata for one protocol endpoint.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub(crate) struct EndpointMetadata {
    name: &'static str,
    uuid: &'static str,
    kind: EndpointKind,
}

impl EndpointMetadata {
    pub(crate) fn name(self) -> &'static str {
        self.name
    }

    /// Lowercase endpoint UUID.
    pub(crate) fn uuid(self) -> &'static str {
        self.uuid
    }

    pub(crate) fn kind(self) -> EndpointKind {
        self.kind
    }

    /// Returns whether `uuid` names this endpoint, ignoring case.
    pub(crate) fn matches(self, uuid: &str) -> bool {
        self.uuid.eq_ignore_ascii_case(uuid)
    }
}

static ENDPOINTS_BY_ID: LazyLock<HashMap<EndpointId, EndpointMetadata>> = LazyLock::new(|| {
    EndpointId::iter()
        .map(|endpoint| (endpoint, metadata_for(endpoint)))
        .collect()
});

/// Returns metadata for one endpoint.
pub(crate) fn endpoint_metadata(endpoint: EndpointId) -> EndpointMetadata {
    *ENDPOINTS_BY_ID
        .get(&endpoint)
        .unwrap_or(&metadata_for(endpoint))
}

/// Returns the endpoint a UUID string names, if it is one of ours.
pub(crate) fn endpoint_for_uuid(uuid: &str) -> Option<EndpointId> {
    EndpointId::iter().find(|endpoint| endpoint_metadata(*endpoint).matches(uuid))
}

fn metadata_for(endpoint: EndpointId) -> EndpointMetadata {
    match endpoint {
        EndpointId::UartService => EndpointMetadata {
            name: "scanner UART service",
            uuid: "6e400001-b5a3-f393-e0a9-e50e24dcca9e",
            kind: EndpointKind::Service,
        },
        EndpointId::UartTxCharacteristic => EndpointMetadata {
            name: "scanner scan data",
            uuid: "6e400003-b5a3-f393-e0a9-e50e24dcca9e",
            kind: EndpointKind::Characteristic,
        },
        EndpointId::UartRxCharacteristic => EndpointMetadata {
            name: "scanner command input",
            uuid: "6e400002-b5a3-f393-e0a9-e50e24dcca9e",
            kind: EndpointKind::Characteristic,
        },
        EndpointId::BatteryService => EndpointMetadata {
            name: "battery service",
            uuid: "0000180f-0000-1000-8000-00805f9b34fb",
            kind: EndpointKind::Service,
        },
        EndpointId::BatteryLevelCharacteristic => EndpointMetadata {
            name: "battery level",
            uuid: "00002a19-0000-1000-8000-00805f9b34fb",
            kind: EndpointKind::Characteristic,
        },
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn endpoint_metadata_contains_expected_names() {
        let uart = endpoint_metadata(EndpointId::UartService);
        assert_eq!("scanner UART service", uart.name());
        assert_eq!(EndpointKind::Service, uart.kind());

        let battery = endpoint_metadata(EndpointId::BatteryLevelCharacteristic);
        assert_eq!(EndpointKind::Characteristic, battery.kind());
    }

    #[test]
    fn uuids_resolve_case_insensitively() {
        assert_eq!(
            Some(EndpointId::UartTxCharacteristic),
            endpoint_for_uuid("6E400003-B5A3-F393-E0A9-E50E24DCCA9E")
        );
        assert_eq!(None, endpoint_for_uuid("0000fa02-0000-1000-8000-00805f9b34fb"));
    }
}
