use std::path::PathBuf;
use std::time::Duration;

use bon::Builder;
use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::filter::LevelFilter;

use crate::cli::decode::DecodeArgs;
use crate::cli::pair::PairArgs;
use crate::error::{CliConfigError, FixtureError};
use crate::hw::{FakeSdkConfig, ScanPayloads, ScannerFixture, StaticHidProbe};

/// Command-line options for the scanner tool.
#[derive(Debug, Parser)]
#[command(
    name = "scanlink",
    about = "Pair barcode scanners and decode what they read."
)]
pub struct Args {
    /// Uses the fake scanner SDK with fixture-driven devices and scans.
    #[arg(long, global = true)]
    fake: bool,
    /// Fake BLE scanner in the form `address|name|battery`.
    #[arg(long, global = true, requires = "fake", required_if_eq("fake", "true"))]
    fake_scanner: Option<ScannerFixture>,
    /// Fake scan payloads as comma-separated hexadecimal payloads.
    #[arg(long, global = true, requires = "fake")]
    fake_scans: Option<ScanPayloads>,
    /// Artificial delay before the fake pairing code is produced (e.g. `250ms`).
    #[arg(long, global = true, requires = "fake", value_parser = parse_duration)]
    fake_pairing_delay: Option<Duration>,
    /// Artificial delay between showing the fake pairing code and the scanner linking.
    #[arg(long, global = true, requires = "fake", value_parser = parse_duration)]
    fake_connect_delay: Option<Duration>,
    /// Makes fake pairing code generation fail with this reason.
    #[arg(long, global = true, requires = "fake")]
    fake_pairing_failure: Option<String>,
    /// Fake bonded HID devices in the form `address|name|class|connected;...`.
    #[arg(long, global = true, requires = "fake")]
    fake_hid: Option<StaticHidProbe>,
    /// Scanner settings JSON file. Defaults to the per-user settings file.
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Log level; overrides `RUST_LOG`.
    #[arg(long, global = true, value_enum)]
    log_level: Option<LogLevel>,
    /// Output format. Defaults to `pretty` on terminals and `json` otherwise.
    #[arg(long, global = true, value_enum)]
    output: Option<OutputFormat>,
    #[command(subcommand)]
    command: Command,
}

impl Args {
    /// Creates argument values directly without CLI parsing.
    ///
    /// ```
    /// use scanlink::{Args, Command, DecodeArgs};
    ///
    /// let devices = Args::new(Command::Devices);
    /// let decode = Args::new(Command::Decode(DecodeArgs::new("4F4B", false)));
    /// let _ = (devices, decode);
    /// ```
    #[must_use]
    pub fn new(command: Command) -> Self {
        Self {
            fake: false,
            fake_scanner: None,
            fake_scans: None,
            fake_pairing_delay: None,
            fake_connect_delay: None,
            fake_pairing_failure: None,
            fake_hid: None,
            config: None,
            log_level: None,
            output: None,
            command,
        }
    }

    /// Enables fake SDK mode with pre-parsed fake configuration.
    #[must_use]
    pub fn with_fake(mut self, fake: FakeArgs) -> Self {
        let FakeArgs {
            scanner,
            scans,
            pairing_delay,
            connect_delay,
            pairing_failure,
            hid,
        } = fake;

        self.fake = true;
        self.fake_scanner = Some(scanner);
        self.fake_scans = scans;
        self.fake_pairing_delay = Some(pairing_delay);
        self.fake_connect_delay = Some(connect_delay);
        self.fake_pairing_failure = pairing_failure;
        self.fake_hid = hid;
        self
    }

    #[must_use]
    pub fn log_level(&self) -> Option<LogLevel> {
        self.log_level
    }

    #[must_use]
    pub fn output_format(&self) -> Option<OutputFormat> {
        self.output
    }

    /// Settings file requested with `--config`.
    #[must_use]
    pub fn config_path(&self) -> Option<&std::path::Path> {
        self.config.as_deref()
    }

    /// Splits parsed CLI arguments into command and optional fake-SDK settings.
    ///
    /// # Errors
    ///
    /// Returns an error if CLI backend configuration is invalid.
    pub fn into_command_and_fake_args(self) -> anyhow::Result<(Command, Option<FakeArgs>)> {
        let Args {
            fake,
            fake_scanner,
            fake_scans,
            fake_pairing_delay,
            fake_connect_delay,
            fake_pairing_failure,
            fake_hid,
            command,
            ..
        } = self;

        let fake_args = if fake {
            let Some(scanner) = fake_scanner else {
                return Err(CliConfigError::MissingFakeScannerFixture.into());
            };
            Some(FakeArgs {
                scanner,
                scans: fake_scans,
                pairing_delay: fake_pairing_delay.unwrap_or(Duration::ZERO),
                connect_delay: fake_connect_delay.unwrap_or(Duration::ZERO),
                pairing_failure: fake_pairing_failure,
                hid: fake_hid,
            })
        } else {
            None
        };

        Ok((command, fake_args))
    }
}

/// Fake SDK arguments for programmatic runs.
#[derive(Debug, Builder)]
pub struct FakeArgs {
    #[builder(with = |value: &str| -> std::result::Result<_, FixtureError> { value.parse() })]
    scanner: ScannerFixture,
    #[builder(with = |value: &str| -> std::result::Result<_, FixtureError> { value.parse() })]
    scans: Option<ScanPayloads>,
    #[builder(default)]
    pairing_delay: Duration,
    #[builder(default)]
    connect_delay: Duration,
    #[builder(into)]
    pairing_failure: Option<String>,
    #[builder(with = |value: &str| -> std::result::Result<_, FixtureError> { value.parse() })]
    hid: Option<StaticHidProbe>,
}

impl FakeArgs {
    pub(crate) fn into_sdk_config_and_hid(self) -> (FakeSdkConfig, StaticHidProbe) {
        let Self {
            scanner,
            scans,
            pairing_delay,
            connect_delay,
            pairing_failure,
            hid,
        } = self;

        let config = FakeSdkConfig::builder()
            .scanner(scanner)
            .scans(scans.unwrap_or_default())
            .pairing_delay(pairing_delay)
            .connect_delay(connect_delay)
            .maybe_pairing_failure(pairing_failure)
            .build();
        (config, hid.unwrap_or_default())
    }
}

/// Supported CLI commands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the decoding cascade over one payload and print the recovered text.
    Decode(DecodeArgs),
    /// Pair a BLE scanner through its QR handshake, then print what it scans.
    Pair(PairArgs),
    /// List scanners that can be connected and the current default device.
    Devices,
}

/// Log verbosity accepted by `--log-level`.
#[derive(Debug, Clone, Copy, Eq, PartialEq, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub(crate) fn as_level_filter(self) -> LevelFilter {
        match self {
            Self::Error => LevelFilter::ERROR,
            Self::Warn => LevelFilter::WARN,
            Self::Info => LevelFilter::INFO,
            Self::Debug => LevelFilter::DEBUG,
            Self::Trace => LevelFilter::TRACE,
        }
    }
}

/// Rendering of command results.
#[derive(Debug, Clone, Copy, Eq, PartialEq, ValueEnum)]
pub enum OutputFormat {
    /// Coloured tables for people.
    Pretty,
    /// One JSON document per result.
    Json,
}

pub(crate) fn parse_duration(value: &str) -> Result<Duration, String> {
    humantime::parse_duration(value).map_err(|error| error.to_string())
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use clap::error::ErrorKind;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    use super::*;

    #[test]
    fn fake_mode_requires_scanner_fixture() {
        let result = Args::try_parse_from(["scanlink", "--fake", "devices"]);

        let error = result.expect_err("missing --fake-scanner should fail argument parsing");
        assert_eq!(ErrorKind::MissingRequiredArgument, error.kind());
    }

    #[rstest]
    #[case::scans(["scanlink", "--fake-scans", "4F4B", "devices"])]
    #[case::scanner(["scanlink", "--fake-scanner", "AA:BB|Scanner|50", "devices"])]
    #[case::pairing_failure(["scanlink", "--fake-pairing-failure", "busy", "devices"])]
    fn fake_fixture_flags_require_fake_mode(#[case] argv: [&str; 4]) {
        let error = Args::try_parse_from(argv).expect_err("fake flags should require --fake");
        assert_eq!(ErrorKind::MissingRequiredArgument, error.kind());
    }

    #[test]
    fn invalid_scanner_fixture_is_rejected_while_parsing() {
        let error = Args::try_parse_from([
            "scanlink",
            "--fake",
            "--fake-scanner",
            "AA:BB|Scanner|150",
            "devices",
        ])
        .expect_err("battery above 100 should be rejected");
        assert_eq!(ErrorKind::ValueValidation, error.kind());
    }

    #[test]
    fn fake_mode_builds_fake_settings() {
        let cli = Args::try_parse_from([
            "scanlink",
            "--fake",
            "--fake-scanner",
            "AA:BB|Scanner|50",
            "--fake-pairing-delay",
            "250ms",
            "pair",
            "--max-scans",
            "2",
        ])
        .expect("valid fake arguments should parse");

        let (command, fake_args) = cli
            .into_command_and_fake_args()
            .expect("valid fake arguments should resolve fake settings");
        assert_matches!(command, Command::Pair(_));
        let fake_args = fake_args.expect("fake mode should produce fake arguments");
        assert_eq!(Duration::from_millis(250), fake_args.pairing_delay);
    }

    #[test]
    fn global_options_parse_after_the_subcommand() {
        let cli = Args::try_parse_from([
            "scanlink",
            "decode",
            "4F4B",
            "--log-level",
            "debug",
            "--output",
            "json",
        ])
        .expect("global options should be accepted after the subcommand");

        assert_eq!(Some(LogLevel::Debug), cli.log_level());
        assert_eq!(Some(OutputFormat::Json), cli.output_format());
    }

    #[rstest]
    #[case::error(LogLevel::Error, LevelFilter::ERROR)]
    #[case::info(LogLevel::Info, LevelFilter::INFO)]
    #[case::trace(LogLevel::Trace, LevelFilter::TRACE)]
    fn log_levels_map_to_filters(#[case] level: LogLevel, #[case] expected: LevelFilter) {
        assert_eq!(expected, level.as_level_filter());
    }
}
