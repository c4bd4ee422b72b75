use std::str::FromStr;

use async_trait::async_trait;
use strum_macros::{Display, EnumString};

use crate::error::{FixtureError, SdkError};

/// Major and minor device class bits of a Class of Device value.
const DEVICE_CLASS_MASK: u32 = 0x1FFC;
const KEYBOARD_CLASSES: [u32; 3] = [0x0540, 0x05C0, 0x0580];
const NAME_HINTS: [&str; 6] = ["keyboard", "scanner", "barcode", "hid", "hr32", "newland"];

/// A classic Bluetooth device bonded with the host.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct BondedDevice {
    address: String,
    name: Option<String>,
    device_class: u32,
}

impl BondedDevice {
    #[must_use]
    pub fn new(address: impl Into<String>, name: Option<String>, device_class: u32) -> Self {
        Self {
            address: address.into(),
            name,
            device_class,
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

    /// Raw Class of Device value.
    #[must_use]
    pub fn device_class(&self) -> u32 {
        self.device_class
    }
}

/// Returns whether a bonded device looks like a keyboard-wedge scanner.
///
/// Keyboard and pointing peripheral classes match outright; anything else
/// matches on well-known name fragments.
#[must_use]
pub fn is_scanner_device(device: &BondedDevice) -> bool {
    if KEYBOARD_CLASSES.contains(&(device.device_class & DEVICE_CLASS_MASK)) {
        return true;
    }

    device.name().is_some_and(|name| {
        let name = name.to_lowercase();
        NAME_HINTS.iter().any(|hint| name.contains(hint))
    })
}

/// Platform capability answering questions about bonded HID devices.
#[async_trait]
pub trait HidLinkProbe: Send + Sync {
    /// Lists devices bonded with the host.
    async fn bonded_devices(&self) -> Result<Vec<BondedDevice>, SdkError>;

    /// Returns whether the bonded device at `address` holds an active HID link.
    async fn is_hid_connected(&self, address: &str) -> Result<bool, SdkError>;
}

/// Link state of a fixture device.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Display, EnumString)]
#[strum(serialize_all = "snake_case")]
pub(crate) enum HidLinkState {
    Connected,
    Bonded,
}

/// HID probe answering from a fixed device list.
#[derive(Debug, Clone, Default)]
pub struct StaticHidProbe {
    devices: Vec<(BondedDevice, HidLinkState)>,
}

impl StaticHidProbe {
    /// A probe that knows no bonded devices.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }
}

#[async_trait]
impl HidLinkProbe for StaticHidProbe {
    async fn bonded_devices(&self) -> Result<Vec<BondedDevice>, SdkError> {
        Ok(self
            .devices
            .iter()
            .map(|(device, _state)| device.clone())
            .collect())
    }

    async fn is_hid_connected(&self, address: &str) -> Result<bool, SdkError> {
        Ok(self.devices.iter().any(|(device, state)| {
            device.address() == address && *state == HidLinkState::Connected
        }))
    }
}

/// Parses `address|name|class|connected;...` where `class` is hexadecimal
/// and `name` may be `-`.
impl FromStr for StaticHidProbe {
    type Err = FixtureError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        if value.trim().is_empty() {
            return Err(FixtureError::EmptyFixture);
        }

        let devices = value
            .split(';')
            .map(parse_hid_record)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { devices })
    }
}

fn parse_hid_record(raw_record: &str) -> Result<(BondedDevice, HidLinkState), FixtureError> {
    let fields: Vec<&str> = raw_record.split('|').map(str::trim).collect();
    let [address, name, class, state] = fields.as_slice() else {
        return Err(FixtureError::InvalidRecordFieldCount { expected: 4 });
    };
    if [address, name, class, state].iter().any(|field| field.is_empty()) {
        return Err(FixtureError::EmptyRecordField);
    }

    let name = (*name != "-").then(|| (*name).to_string());
    let class_digits = class.trim_start_matches("0x").trim_start_matches("0X");
    let device_class =
        u32::from_str_radix(class_digits, 16).map_err(|_error| FixtureError::InvalidDeviceClass {
            value: (*class).to_string(),
        })?;
    let state = state
        .parse::<HidLinkState>()
        .map_err(|_error| FixtureError::InvalidLinkState {
            value: (*state).to_string(),
        })?;

    Ok((BondedDevice::new(*address, name, device_class), state))
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case::keyboard_class(Some("Thing"), 0x0540, true)]
    #[case::keyboard_class_with_service_bits(Some("Thing"), 0x0025_0540, true)]
    #[case::pointing_class(None, 0x0580, true)]
    #[case::name_hint(Some("HR32-BT Barcode"), 0x0404, true)]
    #[case::vendor_hint(Some("NEWLAND NLS"), 0x0000, true)]
    #[case::headset(Some("Headphones"), 0x0404, false)]
    #[case::anonymous(None, 0x0000, false)]
    fn scanner_heuristics(#[case] name: Option<&str>, #[case] class: u32, #[case] expected: bool) {
        let device = BondedDevice::new("AA:BB", name.map(String::from), class);
        assert_eq!(expected, is_scanner_device(&device));
    }

    #[tokio::test]
    async fn fixture_probe_answers_connection_questions() {
        let probe: StaticHidProbe = "AA:01|HR32|0x0540|connected;AA:02|-|0404|bonded"
            .parse()
            .expect("fixture should parse");

        let devices = probe.bonded_devices().await.expect("listing should succeed");
        assert_eq!(2, devices.len());
        assert_eq!(None, devices[1].name());
        assert!(probe.is_hid_connected("AA:01").await.expect("probe should answer"));
        assert!(!probe.is_hid_connected("AA:02").await.expect("probe should answer"));
        assert!(!probe.is_hid_connected("AA:03").await.expect("probe should answer"));
    }

    #[rstest]
    #[case::field_count("AA|B|0540", FixtureError::InvalidRecordFieldCount { expected: 4 })]
    #[case::empty_field("AA||0540|connected", FixtureError::EmptyRecordField)]
    #[case::bad_class("AA|B|zz|connected", FixtureError::InvalidDeviceClass { value: "zz".to_string() })]
    #[case::bad_state("AA|B|0540|paired", FixtureError::InvalidLinkState { value: "paired".to_string() })]
    fn fixture_rejects_malformed_records(#[case] fixture: &str, #[case] expected: FixtureError) {
        assert_matches!(fixture.parse::<StaticHidProbe>(), Err(error) if error == expected);
    }
}
