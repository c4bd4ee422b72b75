use std::time::Duration;

use clap::Parser;
use clap::error::ErrorKind;
use insta::assert_snapshot;
use pretty_assertions::assert_eq;
use serde_json::Value;

#[derive(Debug, Default)]
struct FakeTerminalClient;

impl scanlink::TerminalClient for FakeTerminalClient {
    fn stdout_is_terminal(&self) -> bool {
        false
    }

    fn stderr_is_terminal(&self) -> bool {
        false
    }
}

async fn run_with_parsed_args(
    args: scanlink::Args,
    output_format: scanlink::OutputFormat,
) -> anyhow::Result<String> {
    let mut output = Vec::new();
    let (command, maybe_fake_args) = args.into_command_and_fake_args()?;
    let clients = match maybe_fake_args {
        Some(fake_args) => scanlink::fake_scanner_clients(fake_args),
        None => scanlink::real_scanner_clients(),
    };
    scanlink::run_with_clients(
        command,
        &mut output,
        &FakeTerminalClient,
        &clients,
        output_format,
    )
    .await?;
    Ok(String::from_utf8(output)?)
}

async fn run_with_argv<const N: usize>(argv: [&str; N]) -> anyhow::Result<String> {
    let parsed_args = scanlink::Args::try_parse_from(argv)?;
    run_with_parsed_args(parsed_args, scanlink::OutputFormat::Pretty).await
}

fn json_documents(output: &str) -> anyhow::Result<Vec<Value>> {
    let documents = serde_json::Deserializer::from_str(output)
        .into_iter::<Value>()
        .collect::<Result<Vec<_>, _>>()?;
    Ok(documents)
}

fn fake_pairing_args(max_scans: usize) -> anyhow::Result<scanlink::Args> {
    let fake = scanlink::FakeArgs::builder()
        .scanner("AA:BB:CC:DD:EE:01|HR32 Test|64")?
        .scans("4F4B,D1CAD3")?
        .connect_delay(Duration::from_millis(300))
        .build();
    let pair = scanlink::PairArgs::new(Some(max_scans), None);
    Ok(scanlink::Args::new(scanlink::Command::Pair(pair)).with_fake(fake))
}

#[tokio::test]
async fn decode_command_prints_recovered_text() -> anyhow::Result<()> {
    let stdout = run_with_argv(["scanlink", "decode", r"\x0442\x0435\x0441\x0442"]).await?;

    assert_snapshot!(stdout.trim_end(), @r"
    ╭───────────┬──────────────────────────╮
    │ field     │ value                    │
    ├───────────┼──────────────────────────┤
    │ input     │ \x0442\x0435\x0441\x0442 │
    │ text      │ тест                     │
    │ encoding  │ hex_escape               │
    │ symbology │ -                        │
    ╰───────────┴──────────────────────────╯
    ");

    Ok(())
}

#[tokio::test]
async fn decode_command_writes_json_report() -> anyhow::Result<()> {
    let args = scanlink::Args::new(scanlink::Command::Decode(scanlink::DecodeArgs::new(
        "privet", true,
    )));

    let stdout = run_with_parsed_args(args, scanlink::OutputFormat::Json).await?;
    let report: Value = serde_json::from_str(&stdout)?;

    assert_eq!("privet", report["input"]);
    assert_eq!("привет", report["text"]);
    assert_eq!("none", report["encoding"]);
    assert_eq!(true, report["transliterated"]);

    Ok(())
}

#[tokio::test]
async fn devices_command_lists_fake_scanners_and_default() -> anyhow::Result<()> {
    let stdout = run_with_argv([
        "scanlink",
        "--fake",
        "--fake-scanner",
        "AA:BB:CC:DD:EE:01|HR32 Test|64",
        "--fake-hid",
        "11:22:33:44:55:66|HR32 Keyboard|0x0540|connected",
        "devices",
    ])
    .await?;

    assert!(stdout.starts_with("Scanners:"), "{stdout}");
    assert!(stdout.contains("builtin_camera"), "{stdout}");
    assert!(stdout.contains("11:22:33:44:55:66"), "{stdout}");
    assert!(stdout.contains("HR32 Keyboard"), "{stdout}");
    assert!(stdout.contains("ble-pairing"), "{stdout}");
    assert!(
        stdout.trim_end().ends_with("Default device: Built-in camera (builtin_camera)"),
        "{stdout}"
    );

    Ok(())
}

#[tokio::test]
async fn devices_command_writes_json_listing() -> anyhow::Result<()> {
    let fake = scanlink::FakeArgs::builder()
        .scanner("AA:BB:CC:DD:EE:01|HR32 Test|64")?
        .build();
    let args = scanlink::Args::new(scanlink::Command::Devices).with_fake(fake);

    let stdout = run_with_parsed_args(args, scanlink::OutputFormat::Json).await?;
    let listing: Value = serde_json::from_str(&stdout)?;

    assert_eq!("builtin_camera", listing["default_device"]["id"]);
    let devices = listing["devices"]
        .as_array()
        .map(Vec::len)
        .unwrap_or_default();
    assert_eq!(2, devices);

    Ok(())
}

#[tokio::test(start_paused = true)]
async fn pair_command_shows_code_then_streams_scans() -> anyhow::Result<()> {
    let stdout =
        run_with_parsed_args(fake_pairing_args(2)?, scanlink::OutputFormat::Pretty).await?;

    let code_at = stdout.find("Pairing code").unwrap_or(usize::MAX);
    let connected_at = stdout.find("Connected scanner:").unwrap_or(usize::MAX);
    assert!(code_at < connected_at, "{stdout}");
    assert!(stdout.contains("HR32 Test"), "{stdout}");
    assert!(stdout.contains("[0001] OK encoding=none raw=4F 4B"), "{stdout}");
    assert!(
        stdout.contains("[0002] СКУ encoding=windows1251_bytes raw=D1 CA D3"),
        "{stdout}"
    );
    assert!(
        stdout
            .trim_end()
            .ends_with("Stopped: reached limit of 2 scan(s) - received 2 scan(s)"),
        "{stdout}"
    );

    Ok(())
}

#[tokio::test(start_paused = true)]
async fn pair_command_emits_json_events() -> anyhow::Result<()> {
    let stdout = run_with_parsed_args(fake_pairing_args(1)?, scanlink::OutputFormat::Json).await?;

    let events = json_documents(&stdout)?;
    let tags: Vec<&str> = events
        .iter()
        .filter_map(|event| event["event"].as_str())
        .collect();
    assert_eq!(vec!["pairing_code", "connected", "scan", "stopped"], tags);
    assert_eq!("AA:BB:CC:DD:EE:01", events[1]["device"]["id"]);
    assert_eq!(1, events[3]["received_scans"]);

    Ok(())
}

#[tokio::test]
async fn pair_command_reports_pairing_failure() -> anyhow::Result<()> {
    let fake = scanlink::FakeArgs::builder()
        .scanner("AA:BB:CC:DD:EE:01|HR32 Test|64")?
        .pairing_failure("pairing service busy")
        .build();
    let args = scanlink::Args::new(scanlink::Command::Pair(scanlink::PairArgs::new(
        Some(1),
        Some(Duration::from_secs(5)),
    )))
    .with_fake(fake);

    let error = run_with_parsed_args(args, scanlink::OutputFormat::Pretty)
        .await
        .expect_err("failing pairing code generation should fail the command");

    assert!(format!("{error:#}").contains("pairing service busy"), "{error:#}");

    Ok(())
}

#[test]
fn invalid_scanner_fixture_is_rejected() {
    let result = scanlink::FakeArgs::builder().scanner("invalid-record");

    assert!(matches!(
        result,
        Err(scanlink::FixtureError::InvalidRecordFieldCount { expected: 3 })
    ));
}

#[test]
fn pair_timeout_must_be_a_duration() {
    let error = scanlink::Args::try_parse_from(["scanlink", "pair", "--timeout", "soon"])
        .expect_err("non-duration timeout should be rejected");

    assert_eq!(ErrorKind::ValueValidation, error.kind());
}

#[test]
fn unknown_subcommand_is_rejected() {
    let error = scanlink::Args::try_parse_from(["scanlink", "inspect"])
        .expect_err("unknown subcommands should be rejected");

    assert_eq!(ErrorKind::InvalidSubcommand, error.kind());
}
