use std::io;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::Args;
use derive_more::Display;
use owo_colors::OwoColorize;
use serde::Serialize;
use tokio::sync::watch;
use tracing::{debug, instrument};
use tracing_indicatif::span_ext::IndicatifSpanExt;

use crate::app::ScannerClients;
use crate::cli::command::parse_duration;
use crate::cli::{OutputFormat, write_json_line};
use crate::config::ScannerSettings;
use crate::model::{DeviceInfo, DeviceKind, ScanEvent};
use crate::pairing::{ConnectionState, PairingMachine, PairingMachineOptions, PairingSession};
use crate::registry::{BleScannerBackend, PAIRING_ENTRY_ID, ScannerBackend, ScannerRegistry};
use crate::terminal::TerminalClient;

use super::ui::{DeviceView, Painter, PairSummaryView, PairingCodeView, ScanLineView};

/// Arguments for the `pair` command.
#[derive(Debug, Args)]
pub struct PairArgs {
    /// Stop after this many scans. If omitted, print scans until Ctrl+C.
    #[arg(long)]
    max_scans: Option<usize>,
    /// Give up if no scanner links within this time (e.g. `45s`).
    /// Defaults to the configured connection timeout.
    #[arg(long, value_parser = parse_duration)]
    timeout: Option<Duration>,
}

impl PairArgs {
    #[must_use]
    pub fn new(max_scans: Option<usize>, timeout: Option<Duration>) -> Self {
        Self { max_scans, timeout }
    }
}

/// Why the `pair` command stopped printing scans.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Display)]
pub(crate) enum PairStopReason {
    #[display("reached limit of {_0} scan(s)")]
    ReachedLimit(usize),
    #[display("interrupted")]
    Interrupted,
    #[display("scanner link lost")]
    LinkLost,
}

/// JSON events emitted by the `pair` command.
#[derive(Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
enum PairEvent<'a> {
    PairingCode {
        session: String,
        payload: &'a str,
    },
    Connected {
        device: &'a DeviceInfo,
    },
    Scan {
        index: usize,
        scan: &'a ScanEvent,
    },
    Stopped {
        reason: String,
        received_scans: usize,
    },
}

/// Executes the `pair` command.
#[instrument(skip_all, level = "info", fields(max_scans = ?args.max_scans, ?output_format))]
pub(crate) async fn run<W>(
    clients: &ScannerClients,
    settings: ScannerSettings,
    args: &PairArgs,
    out: &mut W,
    terminal_client: &dyn TerminalClient,
    output_format: OutputFormat,
) -> Result<()>
where
    W: io::Write,
{
    let settings = match args.timeout {
        Some(limit) => settings.with_connection_timeout(limit),
        None => settings,
    };
    let sdk = clients.scanner_sdk().await?;
    let machine = PairingMachine::spawn(
        PairingMachineOptions::builder()
            .sdk(sdk)
            .settings(settings.clone())
            .build(),
    );
    let backend = Arc::new(BleScannerBackend::new(
        machine.clone(),
        settings.connection_timeout(),
    ));
    let registry = ScannerRegistry::new(settings, vec![backend as Arc<dyn ScannerBackend>]);
    let painter = Painter::new(terminal_client.stdout_is_terminal());

    let result = pair_and_stream(
        &registry,
        &machine,
        args.max_scans,
        out,
        &painter,
        output_format,
    )
    .await;
    machine.shutdown().await;

    result
}

async fn pair_and_stream<W>(
    registry: &ScannerRegistry,
    machine: &PairingMachine,
    max_scans: Option<usize>,
    out: &mut W,
    painter: &Painter,
    output_format: OutputFormat,
) -> Result<()>
where
    W: io::Write,
{
    let mut scans = registry.subscribe_last_scan();
    let device = await_scanner(registry, machine, out, painter, output_format).await?;
    match output_format {
        OutputFormat::Pretty => {
            writeln!(out)?;
            writeln!(out, "{}", painter.heading("Connected scanner:"))?;
            writeln!(out, "{}", DeviceView::new(&device, painter))?;
            writeln!(out)?;
        }
        OutputFormat::Json => write_json_line(out, &PairEvent::Connected { device: &device })?,
    }

    registry.start_scanning();
    let mut states = machine.subscribe_state();
    let streamed = stream_scans(
        &mut scans,
        &mut states,
        max_scans,
        out,
        painter,
        output_format,
    )
    .await;
    registry.stop_scanning();
    if let Err(error) = registry.disconnect(device.id()).await {
        debug!(%error, "failed to disconnect scanner cleanly");
    }

    let (stop_reason, received_scans) = streamed?;
    match output_format {
        OutputFormat::Pretty => {
            writeln!(out)?;
            writeln!(
                out,
                "{}",
                PairSummaryView::new(&stop_reason, received_scans, painter)
            )?;
        }
        OutputFormat::Json => write_json_line(
            out,
            &PairEvent::Stopped {
                reason: stop_reason.to_string(),
                received_scans,
            },
        )?,
    }
    Ok(())
}

/// Starts the handshake through the registry and prints the pairing code
/// once it is ready.
#[instrument(skip_all, level = "info")]
async fn await_scanner<W>(
    registry: &ScannerRegistry,
    machine: &PairingMachine,
    out: &mut W,
    painter: &Painter,
    output_format: OutputFormat,
) -> Result<DeviceInfo>
where
    W: io::Write,
{
    let span = tracing::Span::current();
    span.pb_set_message("Generating pairing code");

    let mut sessions = machine.subscribe_pairing_session();
    let mut sessions_open = true;
    let connect = registry.connect(PAIRING_ENTRY_ID, DeviceKind::BleScanner);
    tokio::pin!(connect);

    loop {
        tokio::select! {
            result = &mut connect => {
                let finish_message = match &result {
                    Ok(_device) => format!("{} Scanner connected", "✓".green()),
                    Err(_error) => format!("{} Pairing failed", "✗".red()),
                };
                span.pb_set_finish_message(&finish_message);
                return Ok(result?);
            }
            changed = sessions.changed(), if sessions_open => {
                if changed.is_err() {
                    sessions_open = false;
                    continue;
                }
                let session = sessions.borrow_and_update().clone();
                if let Some(session) = session {
                    show_pairing_code(&session, out, painter, output_format)?;
                    span.pb_set_message("Waiting for the scanner to read the pairing code");
                }
            }
        }
    }
}

fn show_pairing_code<W>(
    session: &PairingSession,
    out: &mut W,
    painter: &Painter,
    output_format: OutputFormat,
) -> Result<()>
where
    W: io::Write,
{
    match output_format {
        OutputFormat::Pretty => writeln!(out, "{}", PairingCodeView::new(session, painter))?,
        OutputFormat::Json => write_json_line(
            out,
            &PairEvent::PairingCode {
                session: session.id().to_string(),
                payload: session.payload().as_str(),
            },
        )?,
    }
    Ok(())
}

async fn stream_scans<W>(
    scans: &mut watch::Receiver<Option<ScanEvent>>,
    states: &mut watch::Receiver<ConnectionState>,
    max_scans: Option<usize>,
    out: &mut W,
    painter: &Painter,
    output_format: OutputFormat,
) -> Result<(PairStopReason, usize)>
where
    W: io::Write,
{
    let mut received_scans = 0;
    loop {
        if let Some(limit) = max_scans
            && received_scans >= limit
        {
            return Ok((PairStopReason::ReachedLimit(limit), received_scans));
        }

        tokio::select! {
            changed = scans.changed() => {
                if changed.is_err() {
                    return Ok((PairStopReason::LinkLost, received_scans));
                }
                let scan = scans.borrow_and_update().clone();
                let Some(scan) = scan else {
                    continue;
                };
                received_scans += 1;
                match output_format {
                    OutputFormat::Pretty => {
                        writeln!(out, "{}", ScanLineView::new(received_scans, &scan, painter))?;
                    }
                    OutputFormat::Json => write_json_line(
                        out,
                        &PairEvent::Scan {
                            index: received_scans,
                            scan: &scan,
                        },
                    )?,
                }
            }
            _ = states.wait_for(|state| *state != ConnectionState::Connected) => {
                return Ok((PairStopReason::LinkLost, received_scans));
            }
            _ = tokio::signal::ctrl_c() => {
                return Ok((PairStopReason::Interrupted, received_scans));
            }
        }
    }
}
