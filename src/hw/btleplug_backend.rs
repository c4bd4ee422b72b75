use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use btleplug::api::{
    Central, CentralEvent, Characteristic, Manager as _, Peripheral as _, ScanFilter,
};
use btleplug::platform::{Adapter, Manager, Peripheral};
use time::OffsetDateTime;
use tokio::time::sleep;
use tokio_stream::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use super::sdk::{BeepTone, DeviceHandle, PairingPayload, ScannerSdk, SdkLinkState, SdkObserver};
use crate::error::SdkError;
use crate::protocol::{EndpointId, endpoint_for_uuid, endpoint_metadata};

const DISCOVERY_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Scanner SDK backed by `btleplug`.
///
/// Scanners advertising the UART scan-data service are picked up while the
/// connect window is open. The pairing payload only identifies this host;
/// scanners that need a vendor-signed pairing code cannot be paired here.
pub struct BtleplugScannerSdk {
    manager: Manager,
    observer: Mutex<Option<Arc<dyn SdkObserver>>>,
    link: Arc<Mutex<Option<Peripheral>>>,
    connect_window: Mutex<CancellationToken>,
    scan_feed: Mutex<CancellationToken>,
    nonce: AtomicU64,
}

impl BtleplugScannerSdk {
    /// Creates the real BLE scanner SDK.
    ///
    /// # Errors
    ///
    /// Returns an error when the platform Bluetooth manager is unavailable.
    pub async fn new() -> Result<Self, SdkError> {
        let manager = Manager::new().await?;
        Ok(Self {
            manager,
            observer: Mutex::new(None),
            link: Arc::new(Mutex::new(None)),
            connect_window: Mutex::new(CancellationToken::new()),
            scan_feed: Mutex::new(CancellationToken::new()),
            nonce: AtomicU64::new(0),
        })
    }

    #[instrument(skip(self), level = "trace")]
    async fn adapters(&self) -> Result<Vec<Adapter>, SdkError> {
        let adapters = self.manager.adapters().await?;
        if adapters.is_empty() {
            return Err(SdkError::NoAdapters);
        }
        Ok(adapters)
    }

    fn observer(&self) -> Result<Arc<dyn SdkObserver>, SdkError> {
        self.observer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or(SdkError::NotRegistered)
    }

    fn linked_peripheral(&self) -> Result<Peripheral, SdkError> {
        self.link
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or(SdkError::NoLink)
    }

    fn restart(slot: &Mutex<CancellationToken>) -> CancellationToken {
        let mut token = slot.lock().unwrap_or_else(PoisonError::into_inner);
        token.cancel();
        *token = CancellationToken::new();
        token.clone()
    }

    fn cancel(slot: &Mutex<CancellationToken>) {
        slot.lock().unwrap_or_else(PoisonError::into_inner).cancel();
    }
}

#[async_trait]
impl ScannerSdk for BtleplugScannerSdk {
    fn register_observer(&self, observer: Arc<dyn SdkObserver>) -> Result<(), SdkError> {
        let mut slot = self.observer.lock().unwrap_or_else(PoisonError::into_inner);
        if slot.is_some() {
            return Err(SdkError::AlreadyRegistered);
        }
        *slot = Some(observer);
        Ok(())
    }

    fn unregister_observer(&self) -> Result<(), SdkError> {
        self.observer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .map(|_observer| ())
            .ok_or(SdkError::NotRegistered)
    }

    #[instrument(skip(self), level = "debug")]
    async fn generate_pairing_payload(&self) -> Result<PairingPayload, SdkError> {
        let adapters = self.adapters().await?;
        let mut adapter_names = Vec::with_capacity(adapters.len());
        for adapter in &adapters {
            adapter_names.push(adapter.adapter_info().await?);
        }

        let nonce = self.nonce.fetch_add(1, Ordering::SeqCst);
        let issued_at = OffsetDateTime::now_utc().unix_timestamp();
        Ok(PairingPayload::new(format!(
            "scanlink-pair:{}:{issued_at}:{nonce}",
            adapter_names.join(",")
        )))
    }

    #[instrument(skip(self), level = "debug")]
    async fn start_scan_to_connect(&self) -> Result<(), SdkError> {
        let observer = self.observer()?;
        let adapters = self.adapters().await?;
        for adapter in &adapters {
            adapter.start_scan(ScanFilter::default()).await?;
        }
        info!(adapter_count = adapters.len(), "opened scanner connect window");

        let token = Self::restart(&self.connect_window);
        let link = Arc::clone(&self.link);
        tokio::spawn(async move {
            tokio::select! {
                () = token.cancelled() => debug!("scanner connect window closed"),
                result = connect_first_scanner(&adapters, observer.as_ref()) => match result {
                    Ok((peripheral, device)) => {
                        adopt_link(&link, peripheral, device, observer.as_ref());
                    }
                    Err(error) => {
                        warn!(%error, "scanner connect window failed");
                        observer.on_error(-1, error.to_string());
                    }
                },
            }
            for adapter in &adapters {
                if let Err(error) = adapter.stop_scan().await {
                    debug!(?error, "failed to stop adapter scan cleanly");
                }
            }
        });
        Ok(())
    }

    async fn stop_scan_to_connect(&self) -> Result<(), SdkError> {
        Self::cancel(&self.connect_window);
        Ok(())
    }

    #[instrument(skip(self), level = "debug")]
    async fn start_scan(&self) -> Result<(), SdkError> {
        let observer = self.observer()?;
        let peripheral = self.linked_peripheral()?;
        let scan_data = find_characteristic(&peripheral, EndpointId::UartTxCharacteristic)
            .ok_or(SdkError::Unsupported {
                operation: "scan data notifications",
            })?;
        peripheral.subscribe(&scan_data).await?;
        if let Some(battery) = find_characteristic(&peripheral, EndpointId::BatteryLevelCharacteristic)
            && let Err(error) = peripheral.subscribe(&battery).await
        {
            debug!(?error, "battery notifications are unavailable");
        }

        let mut notifications = peripheral.notifications().await?;
        let mut central_events = match self.adapters().await?.into_iter().next() {
            Some(adapter) => Some(adapter.events().await?),
            None => None,
        };
        let peripheral_id = peripheral.id();
        let token = Self::restart(&self.scan_feed);
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    () = token.cancelled() => break,
                    notification = notifications.next() => {
                        let Some(notification) = notification else {
                            observer.on_connection_state_changed(SdkLinkState::Disconnected, None);
                            break;
                        };
                        match endpoint_for_uuid(&notification.uuid.to_string()) {
                            Some(EndpointId::UartTxCharacteristic) => observer.on_scan_data(notification.value),
                            Some(EndpointId::BatteryLevelCharacteristic) => {
                                if let Some(level) = notification.value.first() {
                                    observer.on_battery_level(*level);
                                }
                            }
                            _ => {}
                        }
                    }
                    Some(event) = next_central_event(&mut central_events) => {
                        if let CentralEvent::DeviceDisconnected(id) = event && id == peripheral_id {
                            observer.on_connection_state_changed(SdkLinkState::Disconnected, None);
                            break;
                        }
                    }
                }
            }
        });
        Ok(())
    }

    async fn stop_scan(&self) -> Result<(), SdkError> {
        Self::cancel(&self.scan_feed);
        let Ok(peripheral) = self.linked_peripheral() else {
            return Ok(());
        };
        if let Some(scan_data) = find_characteristic(&peripheral, EndpointId::UartTxCharacteristic) {
            peripheral.unsubscribe(&scan_data).await?;
        }
        Ok(())
    }

    #[instrument(skip(self), level = "debug")]
    async fn query_battery_level(&self) -> Result<(), SdkError> {
        let observer = self.observer()?;
        let peripheral = self.linked_peripheral()?;
        let battery = find_characteristic(&peripheral, EndpointId::BatteryLevelCharacteristic)
            .ok_or(SdkError::Unsupported {
                operation: "battery level",
            })?;
        let value = peripheral.read(&battery).await?;
        if let Some(level) = value.first() {
            observer.on_battery_level(*level);
        }
        Ok(())
    }

    async fn beep(&self, _tone: BeepTone) -> Result<(), SdkError> {
        Err(SdkError::Unsupported { operation: "beep" })
    }

    #[instrument(skip(self), level = "debug")]
    async fn disconnect_device(&self) -> Result<(), SdkError> {
        Self::cancel(&self.connect_window);
        Self::cancel(&self.scan_feed);
        let peripheral = self
            .link
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(peripheral) = peripheral
            && peripheral.is_connected().await?
        {
            peripheral.disconnect().await?;
        }
        Ok(())
    }
}

/// Polls discovered peripherals until one advertises the scanner UART
/// service, then links to it. The caller reports the link as connected.
#[instrument(skip_all, level = "debug")]
async fn connect_first_scanner(
    adapters: &[Adapter],
    observer: &dyn SdkObserver,
) -> Result<(Peripheral, DeviceHandle), SdkError> {
    let uart_service = endpoint_metadata(EndpointId::UartService);
    loop {
        for adapter in adapters {
            for peripheral in adapter.peripherals().await? {
                let Some(properties) = peripheral.properties().await? else {
                    continue;
                };
                let advertises_uart = properties
                    .services
                    .iter()
                    .any(|uuid| uart_service.matches(&uuid.to_string()));
                if !advertises_uart {
                    continue;
                }

                let device = DeviceHandle::new(peripheral.address().to_string(), properties.local_name);
                info!(address = device.address(), "scanner answered the connect window");
                observer.on_connection_state_changed(SdkLinkState::Connecting, Some(device.clone()));
                if !peripheral.is_connected().await? {
                    peripheral.connect().await?;
                }
                peripheral.discover_services().await?;
                return Ok((peripheral, device));
            }
        }

        sleep(DISCOVERY_POLL_INTERVAL).await;
    }
}

/// Stores the linked peripheral before announcing it, so requests made in
/// response to the `Connected` callback find the link.
fn adopt_link<P>(
    link: &Mutex<Option<P>>,
    peripheral: P,
    device: DeviceHandle,
    observer: &dyn SdkObserver,
) {
    *link.lock().unwrap_or_else(PoisonError::into_inner) = Some(peripheral);
    observer.on_connection_state_changed(SdkLinkState::Connected, Some(device));
}

fn find_characteristic(peripheral: &Peripheral, endpoint: EndpointId) -> Option<Characteristic> {
    let metadata = endpoint_metadata(endpoint);
    peripheral
        .characteristics()
        .into_iter()
        .find(|characteristic| metadata.matches(&characteristic.uuid.to_string()))
}

async fn next_central_event(events: &mut Option<CentralEvents>) -> Option<CentralEvent> {
    match events {
        Some(events) => events.next().await,
        None => std::future::pending().await,
    }
}

type CentralEvents = std::pin::Pin<Box<dyn tokio_stream::Stream<Item = CentralEvent> + Send>>;

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn uart_service_is_matched_by_canonical_uuid_text() {
        let metadata = endpoint_metadata(EndpointId::UartService);
        assert!(metadata.matches("6E400001-B5A3-F393-E0A9-E50E24DCCA9E"));
        assert_eq!(DISCOVERY_POLL_INTERVAL, Duration::from_millis(250));
    }

    struct LinkCheckingObserver {
        link: Arc<Mutex<Option<&'static str>>>,
        linked_when_connected: Mutex<Vec<bool>>,
    }

    impl SdkObserver for LinkCheckingObserver {
        fn on_connection_state_changed(&self, state: SdkLinkState, _device: Option<DeviceHandle>) {
            if state == SdkLinkState::Connected {
                let linked = self
                    .link
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .is_some();
                self.linked_when_connected
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .push(linked);
            }
        }

        fn on_scan_data(&self, _payload: Vec<u8>) {}

        fn on_battery_level(&self, _level: u8) {}

        fn on_error(&self, _code: i32, _message: String) {}
    }

    #[test]
    fn link_is_stored_before_connected_is_reported() {
        let link = Arc::new(Mutex::new(None));
        let observer = LinkCheckingObserver {
            link: Arc::clone(&link),
            linked_when_connected: Mutex::new(Vec::new()),
        };

        adopt_link(
            &link,
            "peripheral",
            DeviceHandle::new("AA:BB:CC:DD:EE:01", Some("HR32".to_string())),
            &observer,
        );

        assert_eq!(
            vec![true],
            *observer
                .linked_when_connected
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
        );
        assert_eq!(Some("peripheral"), *link.lock().unwrap_or_else(PoisonError::into_inner));
    }

    #[test]
    fn permission_denial_maps_to_sdk_permission_error() {
        assert_eq!(
            SdkError::PermissionDenied,
            SdkError::from(btleplug::Error::PermissionDenied)
        );
    }
}
