use std::pin::Pin;

use async_trait::async_trait;
use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;
use tokio_stream::{Stream, StreamExt};

use crate::error::ScannerError;
use crate::model::{DeviceInfo, DeviceKind, ScanEvent};

/// Something a backend reports to the registry.
#[derive(Debug, Clone, PartialEq)]
pub enum BackendEvent {
    /// A decoded scan.
    Scan(ScanEvent),
    /// Every device the backend currently holds a link to.
    Links(Vec<DeviceInfo>),
}

pub type EventStream = Pin<Box<dyn Stream<Item = BackendEvent> + Send>>;

/// One family of scanners the registry can route requests to.
#[async_trait]
pub trait ScannerBackend: Send + Sync {
    fn kind(&self) -> DeviceKind;

    /// Lists the devices this backend can currently offer.
    async fn list_devices(&self) -> Result<Vec<DeviceInfo>, ScannerError>;

    /// Links `device_id`, returning once it is connected or has failed.
    async fn connect(&self, device_id: &str) -> Result<DeviceInfo, ScannerError>;

    /// Drops the link to `device_id`. Succeeds when there is none.
    async fn disconnect(&self, device_id: &str) -> Result<(), ScannerError>;

    /// Scans and link changes, starting with the current links.
    fn events(&self) -> EventStream;
}

/// Merges a scan mailbox and a link list into one backend event stream.
pub(crate) fn watch_events(
    scans: watch::Receiver<Option<ScanEvent>>,
    links: watch::Receiver<Vec<DeviceInfo>>,
) -> EventStream {
    let scans = WatchStream::from_changes(scans).filter_map(|scan| scan.map(BackendEvent::Scan));
    let links = WatchStream::new(links).map(BackendEvent::Links);
    Box::pin(links.merge(scans))
}
