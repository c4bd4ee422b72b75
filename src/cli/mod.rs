pub(crate) mod command;
pub(crate) mod decode;
pub(crate) mod devices;
pub(crate) mod pair;
pub(crate) mod ui;

use std::io;

use anyhow::Result;
use serde::Serialize;

pub use self::command::{Args, Command, FakeArgs, LogLevel, OutputFormat};
pub use self::decode::DecodeArgs;
pub use self::pair::PairArgs;

/// Writes one pretty-printed JSON document followed by a newline.
pub(crate) fn write_json_line(out: &mut impl io::Write, value: &impl Serialize) -> Result<()> {
    serde_json::to_writer_pretty(&mut *out, value)?;
    writeln!(out)?;
    Ok(())
}
