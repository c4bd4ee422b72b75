use async_trait::async_trait;
use tokio::sync::watch;

use super::backend::{EventStream, ScannerBackend, watch_events};
use crate::decode::ScanDecoder;
use crate::error::ScannerError;
use crate::model::{BUILTIN_CAMERA_ID, DeviceInfo, DeviceKind, ScanEvent, ScanMetadata};

/// The built-in camera. Always present and always connected; recognition
/// itself happens elsewhere and results are pushed in as text.
pub struct CameraBackend {
    decoder: ScanDecoder,
    links: watch::Sender<Vec<DeviceInfo>>,
    scans: watch::Sender<Option<ScanEvent>>,
}

impl CameraBackend {
    #[must_use]
    pub fn new(decoder: ScanDecoder) -> Self {
        Self {
            decoder,
            links: watch::Sender::new(vec![DeviceInfo::builtin_camera()]),
            scans: watch::Sender::new(None),
        }
    }

    /// Publishes text recognised from a camera frame.
    pub fn submit_recognised(&self, text: &str, metadata: ScanMetadata) -> ScanEvent {
        let decoded = self.decoder.decode_text(text);
        let event = ScanEvent::new(text.as_bytes().to_vec(), decoded)
            .with_device_id(BUILTIN_CAMERA_ID)
            .with_metadata(metadata);
        self.scans.send_replace(Some(event.clone()));
        event
    }
}

#[async_trait]
impl ScannerBackend for CameraBackend {
    fn kind(&self) -> DeviceKind {
        DeviceKind::Camera
    }

    async fn list_devices(&self) -> Result<Vec<DeviceInfo>, ScannerError> {
        Ok(vec![DeviceInfo::builtin_camera()])
    }

    async fn connect(&self, device_id: &str) -> Result<DeviceInfo, ScannerError> {
        if device_id == BUILTIN_CAMERA_ID {
            Ok(DeviceInfo::builtin_camera())
        } else {
            Err(ScannerError::UnknownDevice {
                device_id: device_id.to_string(),
            })
        }
    }

    async fn disconnect(&self, _device_id: &str) -> Result<(), ScannerError> {
        Ok(())
    }

    fn events(&self) -> EventStream {
        watch_events(self.scans.subscribe(), self.links.subscribe())
    }
}
