use std::io;

use anyhow::Result;
use clap::Args;
use serde::Serialize;
use tracing::instrument;

use crate::cli::OutputFormat;
use crate::cli::write_json_line;
use crate::config::ScannerSettings;
use crate::decode::{Decoded, Encoding, ScanDecoder, latin_to_cyrillic};
use crate::terminal::TerminalClient;

use super::ui::{DecodedView, Painter};

/// Arguments for the `decode` command.
#[derive(Debug, Args)]
pub struct DecodeArgs {
    /// Payload text exactly as the scanner delivered it.
    input: String,
    /// Transliterate the decoded Latin text into Cyrillic.
    #[arg(long)]
    translit: bool,
}

impl DecodeArgs {
    #[must_use]
    pub fn new(input: impl Into<String>, translit: bool) -> Self {
        Self {
            input: input.into(),
            translit,
        }
    }
}

/// Decoded payload as reported by the `decode` command.
#[derive(Debug, Serialize)]
pub(crate) struct DecodeReport {
    input: String,
    text: String,
    encoding: Encoding,
    symbology: Option<String>,
    transliterated: bool,
}

impl DecodeReport {
    pub(crate) fn new(input: &str, decoded: Decoded, transliterate: bool) -> Self {
        let symbology = decoded.symbology().map(ToString::to_string);
        let encoding = decoded.encoding();
        let text = if transliterate {
            latin_to_cyrillic(decoded.text())
        } else {
            decoded.into_text()
        };
        Self {
            input: input.to_string(),
            text,
            encoding,
            symbology,
            transliterated: transliterate,
        }
    }

    pub(crate) fn input(&self) -> &str {
        &self.input
    }

    pub(crate) fn text(&self) -> &str {
        &self.text
    }

    pub(crate) fn encoding(&self) -> Encoding {
        self.encoding
    }

    pub(crate) fn symbology(&self) -> Option<&str> {
        self.symbology.as_deref()
    }

    pub(crate) fn transliterated(&self) -> bool {
        self.transliterated
    }
}

/// Executes the `decode` command.
#[instrument(skip_all, level = "info", fields(translit = args.translit, ?output_format))]
pub(crate) fn run<W>(
    settings: &ScannerSettings,
    args: &DecodeArgs,
    out: &mut W,
    terminal_client: &dyn TerminalClient,
    output_format: OutputFormat,
) -> Result<()>
where
    W: io::Write,
{
    let decoded = ScanDecoder::from_settings(settings).decode_text(&args.input);
    let report = DecodeReport::new(&args.input, decoded, args.translit);

    match output_format {
        OutputFormat::Pretty => {
            let painter = Painter::new(terminal_client.stdout_is_terminal());
            writeln!(out, "{}", DecodedView::new(&report, &painter))?;
        }
        OutputFormat::Json => write_json_line(out, &report)?,
    }
    Ok(())
}
