use std::io;
use std::sync::Arc;

use anyhow::Result;
use tracing::{instrument, warn};
use tracing_indicatif::span_ext::IndicatifSpanExt;

use crate::app::ScannerClients;
use crate::cli::{OutputFormat, write_json_line};
use crate::config::ScannerSettings;
use crate::decode::ScanDecoder;
use crate::model::DeviceListing;
use crate::pairing::{PairingMachine, PairingMachineOptions};
use crate::registry::{BleScannerBackend, HidScannerBackend, ScannerBackend, ScannerRegistry};
use crate::terminal::TerminalClient;

use super::ui::{DeviceListView, Painter};

/// Executes the `devices` command.
///
/// BLE scanners are left out with a warning when no Bluetooth stack is
/// available; HID and camera devices are still listed.
#[instrument(skip_all, level = "info", fields(?output_format))]
pub(crate) async fn run<W>(
    clients: &ScannerClients,
    settings: ScannerSettings,
    out: &mut W,
    terminal_client: &dyn TerminalClient,
    output_format: OutputFormat,
) -> Result<()>
where
    W: io::Write,
{
    let mut backends = vec![Arc::new(HidScannerBackend::new(
        clients.hid_probe(),
        ScanDecoder::from_settings(&settings),
    )) as Arc<dyn ScannerBackend>];
    let machine = match clients.scanner_sdk().await {
        Ok(sdk) => {
            let machine = PairingMachine::spawn(
                PairingMachineOptions::builder()
                    .sdk(sdk)
                    .settings(settings.clone())
                    .build(),
            );
            backends.push(Arc::new(BleScannerBackend::new(
                machine.clone(),
                settings.connection_timeout(),
            )));
            Some(machine)
        }
        Err(error) => {
            warn!(%error, "BLE scanners are unavailable");
            None
        }
    };

    let registry = ScannerRegistry::new(settings, backends);
    let listing = discover(&registry).await;
    if let Some(machine) = machine {
        machine.shutdown().await;
    }

    match output_format {
        OutputFormat::Pretty => {
            let painter = Painter::new(terminal_client.stdout_is_terminal());
            writeln!(out, "{}", DeviceListView::new(&listing, &painter))?;
        }
        OutputFormat::Json => write_json_line(out, &listing)?,
    }
    Ok(())
}

#[instrument(skip_all, level = "info")]
async fn discover(registry: &ScannerRegistry) -> DeviceListing {
    tracing::Span::current().pb_set_message("Looking for scanners");
    registry.list_available_devices().await
}
