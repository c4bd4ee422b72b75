use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use tokio::sync::watch;
use tracing::{debug, info, instrument};

use super::backend::{EventStream, ScannerBackend, watch_events};
use crate::decode::ScanDecoder;
use crate::error::ScannerError;
use crate::hw::{BondedDevice, HidLinkProbe, is_scanner_device};
use crate::model::{DeviceInfo, DeviceKind, ScanEvent};

/// Classic Bluetooth scanners acting as HID keyboards.
///
/// The platform owns the HID link; this backend only tracks which bonded
/// scanners the user selected and turns their keystrokes into scans.
pub struct HidScannerBackend {
    probe: Arc<dyn HidLinkProbe>,
    decoder: ScanDecoder,
    linked: Mutex<BTreeMap<String, DeviceInfo>>,
    links: watch::Sender<Vec<DeviceInfo>>,
    scans: watch::Sender<Option<ScanEvent>>,
}

impl HidScannerBackend {
    #[must_use]
    pub fn new(probe: Arc<dyn HidLinkProbe>, decoder: ScanDecoder) -> Self {
        Self {
            probe,
            decoder,
            linked: Mutex::new(BTreeMap::new()),
            links: watch::Sender::new(Vec::new()),
            scans: watch::Sender::new(None),
        }
    }

    /// Feeds text typed by a linked scanner through the decoder.
    ///
    /// # Errors
    ///
    /// Returns [`ScannerError::NotConnected`] if `device_id` is not linked.
    pub fn submit_keystrokes(&self, device_id: &str, text: &str) -> Result<ScanEvent, ScannerError> {
        if !self.lock_linked().contains_key(device_id) {
            return Err(ScannerError::NotConnected);
        }

        let decoded = self.decoder.decode_text(text);
        let event = ScanEvent::new(text.as_bytes().to_vec(), decoded).with_device_id(device_id);
        self.scans.send_replace(Some(event.clone()));
        Ok(event)
    }

    /// Forgets a scanner whose HID link the platform reported as gone.
    pub fn report_link_lost(&self, device_id: &str) {
        if self.lock_linked().remove(device_id).is_some() {
            info!(device_id, "HID scanner link lost");
            self.publish_links();
        }
    }

    async fn scanner_devices(&self) -> Result<Vec<BondedDevice>, ScannerError> {
        let bonded = self.probe.bonded_devices().await?;
        Ok(bonded.into_iter().filter(is_scanner_device).collect())
    }

    fn lock_linked(&self) -> std::sync::MutexGuard<'_, BTreeMap<String, DeviceInfo>> {
        self.linked.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish_links(&self) {
        let devices: Vec<DeviceInfo> = self.lock_linked().values().cloned().collect();
        self.links.send_replace(devices);
    }
}

fn device_info(device: &BondedDevice) -> DeviceInfo {
    let name = device.name().unwrap_or(device.address());
    DeviceInfo::new(device.address(), name, DeviceKind::BluetoothScanner)
}

#[async_trait]
impl ScannerBackend for HidScannerBackend {
    fn kind(&self) -> DeviceKind {
        DeviceKind::BluetoothScanner
    }

    async fn list_devices(&self) -> Result<Vec<DeviceInfo>, ScannerError> {
        let mut devices = Vec::new();
        for bonded in self.scanner_devices().await? {
            let linked = self.lock_linked().get(bonded.address()).cloned();
            devices.push(linked.unwrap_or_else(|| device_info(&bonded)));
        }
        Ok(devices)
    }

    #[instrument(skip(self), level = "debug")]
    async fn connect(&self, device_id: &str) -> Result<DeviceInfo, ScannerError> {
        let bonded = self
            .scanner_devices()
            .await?
            .into_iter()
            .find(|device| device.address() == device_id)
            .ok_or_else(|| ScannerError::UnknownDevice {
                device_id: device_id.to_string(),
            })?;

        if !self.probe.is_hid_connected(device_id).await? {
            return Err(ScannerError::ConnectionFailed {
                reason: format!(
                    "`{device_id}` is bonded but has no active HID link; connect it from the system Bluetooth settings"
                ),
            });
        }

        let device = device_info(&bonded).connected_now();
        self.lock_linked()
            .insert(device_id.to_string(), device.clone());
        self.publish_links();
        info!(device_id, "HID scanner selected");
        Ok(device)
    }

    async fn disconnect(&self, device_id: &str) -> Result<(), ScannerError> {
        if self.lock_linked().remove(device_id).is_some() {
            self.publish_links();
        } else {
            debug!(device_id, "HID scanner was not linked");
        }
        Ok(())
    }

    fn events(&self) -> EventStream {
        watch_events(self.scans.subscribe(), self.links.subscribe())
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::decode::Encoding;
    use crate::hw::StaticHidProbe;

    fn backend(fixture: &str) -> HidScannerBackend {
        let probe: StaticHidProbe = fixture.parse().expect("fixture should parse");
        HidScannerBackend::new(Arc::new(probe), ScanDecoder::default())
    }

    #[tokio::test]
    async fn only_scanner_like_devices_are_listed() {
        let backend = backend("AA:01|HR32-BT|0404|connected;AA:02|Headphones|0404|connected;AA:03|-|0540|bonded");

        let devices = backend.list_devices().await.expect("listing should succeed");
        let ids: Vec<&str> = devices.iter().map(DeviceInfo::id).collect();

        assert_eq!(vec!["AA:01", "AA:03"], ids);
        assert_eq!("AA:03", devices[1].name());
    }

    #[tokio::test]
    async fn connect_requires_an_active_hid_link() {
        let backend = backend("AA:01|Scanner|0540|connected;AA:02|Scanner|0540|bonded");

        let device = backend.connect("AA:01").await.expect("linked scanner should connect");
        assert!(device.is_connected());
        assert_matches!(
            backend.connect("AA:02").await,
            Err(ScannerError::ConnectionFailed { .. })
        );
        assert_matches!(
            backend.connect("AA:09").await,
            Err(ScannerError::UnknownDevice { .. })
        );
    }

    #[tokio::test]
    async fn keystrokes_from_linked_scanners_are_decoded() {
        let backend = backend("AA:01|Scanner|0540|connected");
        assert_matches!(
            backend.submit_keystrokes("AA:01", "PART"),
            Err(ScannerError::NotConnected)
        );

        backend.connect("AA:01").await.expect("linked scanner should connect");
        let event = backend
            .submit_keystrokes("AA:01", "%D0%A2%D0%B5%D1%81%D1%82\n")
            .expect("linked scanner should accept keystrokes");

        assert_eq!("Тест", event.text());
        assert_eq!(Encoding::Percent, event.encoding());
        assert_eq!(Some("AA:01"), event.device_id());
    }
}
