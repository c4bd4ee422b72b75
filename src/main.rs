use std::io::IsTerminal;
use std::path::Path;
use std::process::ExitCode;

use clap::Parser;

use scanlink::{
    Args, OutputFormat, ScannerSettings, fake_scanner_clients, real_scanner_clients,
    run_with_log_level,
};

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    let mut stdout = std::io::stdout();

    let run_result = async {
        let log_level = args.log_level();
        let output_format = args.output_format().unwrap_or(if stdout.is_terminal() {
            OutputFormat::Pretty
        } else {
            OutputFormat::Json
        });
        let config_path = args.config_path().map(Path::to_path_buf);
        let (command, maybe_fake_args) = args.into_command_and_fake_args()?;
        let settings = ScannerSettings::load_or_default(config_path.as_deref())?;
        let clients = match maybe_fake_args {
            Some(fake_args) => fake_scanner_clients(fake_args),
            None => real_scanner_clients(),
        };

        run_with_log_level(
            command,
            &mut stdout,
            &clients,
            settings,
            log_level,
            output_format,
        )
        .await
    }
    .await;

    match run_result {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            eprintln!("error: {error:#}");
            ExitCode::from(1)
        }
    }
}
