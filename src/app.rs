use std::io;
use std::sync::Arc;

use anyhow::Result;
use tracing::instrument;

use crate::cli::{Command, FakeArgs, LogLevel, OutputFormat};
use crate::config::ScannerSettings;
use crate::error::SdkError;
use crate::hw::{
    BtleplugScannerSdk, FakeScannerSdk, HidLinkProbe, ScannerSdk, StaticHidProbe,
};
use crate::telemetry;
use crate::terminal::{SystemTerminalClient, TerminalClient};

/// Hardware capabilities the commands run against.
///
/// The Bluetooth SDK is only brought up when a command needs it, so decoding
/// works on hosts without a Bluetooth stack.
pub struct ScannerClients {
    sdk: SdkSource,
    hid_probe: Arc<dyn HidLinkProbe>,
}

enum SdkSource {
    Ready(Arc<dyn ScannerSdk>),
    Bluetooth,
}

impl ScannerClients {
    /// Wraps explicit SDK and HID probe implementations.
    #[must_use]
    pub fn new(sdk: Arc<dyn ScannerSdk>, hid_probe: Arc<dyn HidLinkProbe>) -> Self {
        Self {
            sdk: SdkSource::Ready(sdk),
            hid_probe,
        }
    }

    pub(crate) async fn scanner_sdk(&self) -> Result<Arc<dyn ScannerSdk>, SdkError> {
        match &self.sdk {
            SdkSource::Ready(sdk) => Ok(Arc::clone(sdk)),
            SdkSource::Bluetooth => {
                let sdk = BtleplugScannerSdk::new().await?;
                Ok(Arc::new(sdk) as Arc<dyn ScannerSdk>)
            }
        }
    }

    pub(crate) fn hid_probe(&self) -> Arc<dyn HidLinkProbe> {
        Arc::clone(&self.hid_probe)
    }
}

/// Creates clients backed by the host's Bluetooth stack.
///
/// The host exposes no bonded-HID query, so keyboard-wedge scanners are not
/// discovered in this mode.
#[must_use]
pub fn real_scanner_clients() -> ScannerClients {
    ScannerClients {
        sdk: SdkSource::Bluetooth,
        hid_probe: Arc::new(StaticHidProbe::empty()),
    }
}

/// Creates clients backed by fake fixtures.
#[must_use]
pub fn fake_scanner_clients(fake_args: FakeArgs) -> ScannerClients {
    let (config, hid_probe) = fake_args.into_sdk_config_and_hid();
    ScannerClients::new(
        Arc::new(FakeScannerSdk::new(config)),
        Arc::new(hid_probe),
    )
}

/// Runs the CLI command with injected clients.
///
/// ```
/// # async fn run() -> anyhow::Result<()> {
/// use clap::Parser;
///
/// let args = scanlink::Args::try_parse_from(["scanlink", "decode", r"\x0414"])?;
/// let (command, maybe_fake_args) = args.into_command_and_fake_args()?;
/// let clients = match maybe_fake_args {
///     Some(fake_args) => scanlink::fake_scanner_clients(fake_args),
///     None => scanlink::real_scanner_clients(),
/// };
/// let mut out = Vec::new();
/// scanlink::run(command, &mut out, &clients, scanlink::ScannerSettings::default()).await?;
/// # Ok(())
/// # }
/// ```
///
/// # Errors
///
/// Returns an error if tracing initialisation fails, scanner interaction
/// fails, or output writing fails.
pub async fn run<W>(
    command: Command,
    out: &mut W,
    clients: &ScannerClients,
    settings: ScannerSettings,
) -> Result<()>
where
    W: io::Write,
{
    run_with_log_level(command, out, clients, settings, None, OutputFormat::Pretty).await
}

/// Runs the CLI command with an explicit telemetry log-level override.
///
/// # Errors
///
/// Returns an error if tracing initialisation fails, scanner interaction
/// fails, or output writing fails.
pub async fn run_with_log_level<W>(
    command: Command,
    out: &mut W,
    clients: &ScannerClients,
    settings: ScannerSettings,
    log_level: Option<LogLevel>,
    output_format: OutputFormat,
) -> Result<()>
where
    W: io::Write,
{
    run_with_clients_and_log_level(
        command,
        out,
        &SystemTerminalClient,
        clients,
        settings,
        log_level,
        output_format,
    )
    .await
}

/// Runs the CLI command with injected clients.
///
/// # Errors
///
/// Returns an error if tracing initialisation fails, scanner interaction
/// fails, or output writing fails.
pub async fn run_with_clients<W>(
    command: Command,
    out: &mut W,
    terminal_client: &dyn TerminalClient,
    clients: &ScannerClients,
    output_format: OutputFormat,
) -> Result<()>
where
    W: io::Write,
{
    run_with_clients_and_log_level(
        command,
        out,
        terminal_client,
        clients,
        ScannerSettings::default(),
        None,
        output_format,
    )
    .await
}

/// Runs the CLI command with injected clients and explicit telemetry settings.
///
/// ```
/// # async fn run() -> anyhow::Result<()> {
/// use clap::Parser;
///
/// struct FakeTerminal;
/// impl scanlink::TerminalClient for FakeTerminal {
///     fn stdout_is_terminal(&self) -> bool { false }
///     fn stderr_is_terminal(&self) -> bool { false }
/// }
///
/// let args = scanlink::Args::try_parse_from([
///     "scanlink",
///     "--log-level",
///     "trace",
///     "--fake",
///     "--fake-scanner",
///     "AA:BB:CC|HR32|87",
///     "devices",
/// ])?;
/// let log_level = args.log_level();
/// let (command, maybe_fake_args) = args.into_command_and_fake_args()?;
/// let clients = match maybe_fake_args {
///     Some(fake_args) => scanlink::fake_scanner_clients(fake_args),
///     None => scanlink::real_scanner_clients(),
/// };
/// let mut out = Vec::new();
/// scanlink::run_with_clients_and_log_level(
///     command,
///     &mut out,
///     &FakeTerminal,
///     &clients,
///     scanlink::ScannerSettings::default(),
///     log_level,
///     scanlink::OutputFormat::Json,
/// ).await?;
/// # Ok(())
/// # }
/// ```
///
/// # Errors
///
/// Returns an error if tracing initialisation fails, scanner interaction
/// fails, or output writing fails.
#[instrument(
    skip(out, terminal_client, clients, settings),
    level = "info",
    fields(command = %command_name(&command), ?log_level, ?output_format)
)]
pub async fn run_with_clients_and_log_level<W>(
    command: Command,
    out: &mut W,
    terminal_client: &dyn TerminalClient,
    clients: &ScannerClients,
    settings: ScannerSettings,
    log_level: Option<LogLevel>,
    output_format: OutputFormat,
) -> Result<()>
where
    W: io::Write,
{
    telemetry::initialise_tracing(
        "scanlink",
        terminal_client.stderr_is_terminal(),
        log_level.map(LogLevel::as_level_filter),
    )?;

    match command {
        Command::Decode(args) => {
            crate::cli::decode::run(&settings, &args, out, terminal_client, output_format)
        }
        Command::Pair(args) => {
            crate::cli::pair::run(
                clients,
                settings,
                &args,
                out,
                terminal_client,
                output_format,
            )
            .await
        }
        Command::Devices => {
            crate::cli::devices::run(clients, settings, out, terminal_client, output_format).await
        }
    }
}

fn command_name(command: &Command) -> &'static str {
    match command {
        Command::Decode(_args) => "decode",
        Command::Pair(_args) => "pair",
        Command::Devices => "devices",
    }
}
