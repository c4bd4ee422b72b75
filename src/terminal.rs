use std::io::IsTerminal;

/// Answers whether the standard streams are attached to a terminal.
pub trait TerminalClient {
    fn stdout_is_terminal(&self) -> bool;
    fn stderr_is_terminal(&self) -> bool;
}

/// Terminal client backed by the process's real standard streams.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct SystemTerminalClient;

impl TerminalClient for SystemTerminalClient {
    fn stdout_is_terminal(&self) -> bool {
        std::io::stdout().is_terminal()
    }

    fn stderr_is_terminal(&self) -> bool {
        std::io::stderr().is_terminal()
    }
}
