use owo_colors::{OwoColorize, Style as OwoStyle};

use crate::pairing::ConnectionState;

/// Applies colour and style to terminal text.
#[derive(Debug)]
pub(crate) struct Painter {
    use_colour: bool,
}

impl Painter {
    /// Creates a painter with explicit colour control.
    pub(crate) fn new(use_colour: bool) -> Self {
        Self { use_colour }
    }

    pub(crate) fn heading<T: AsRef<str>>(&self, text: T) -> String {
        self.paint(text.as_ref(), OwoStyle::new().bold().cyan())
    }

    pub(crate) fn success<T: AsRef<str>>(&self, text: T) -> String {
        self.paint(text.as_ref(), OwoStyle::new().bold().green())
    }

    pub(crate) fn warning<T: AsRef<str>>(&self, text: T) -> String {
        self.paint(text.as_ref(), OwoStyle::new().bold().yellow())
    }

    pub(crate) fn failure<T: AsRef<str>>(&self, text: T) -> String {
        self.paint(text.as_ref(), OwoStyle::new().bold().red())
    }

    pub(crate) fn muted<T: AsRef<str>>(&self, text: T) -> String {
        self.paint(text.as_ref(), OwoStyle::new().dimmed())
    }

    pub(crate) fn value<T: AsRef<str>>(&self, text: T) -> String {
        self.paint(text.as_ref(), OwoStyle::new().bold())
    }

    /// Colours a connection state by how close it is to a usable link.
    pub(crate) fn connection_state(&self, state: ConnectionState) -> String {
        let label = state.to_string();
        match state {
            ConnectionState::Connected => self.success(label),
            ConnectionState::Error => self.failure(label),
            ConnectionState::Disconnected => self.muted(label),
            ConnectionState::Connecting
            | ConnectionState::GeneratingPairingCode
            | ConnectionState::WaitingForScan => self.warning(label),
        }
    }

    fn paint(&self, text: &str, style: OwoStyle) -> String {
        if self.use_colour {
            format!("{}", text.style(style))
        } else {
            text.to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use rstest::rstest;
    use strum::IntoEnumIterator;

    use super::*;

    fn apply(painter: &Painter, style: &str, text: &str) -> String {
        match style {
            "heading" => painter.heading(text),
            "success" => painter.success(text),
            "warning" => painter.warning(text),
            "failure" => painter.failure(text),
            "muted" => painter.muted(text),
            "value" => painter.value(text),
            other => panic!("unknown style: {other}"),
        }
    }

    #[rstest]
    #[case::heading("heading", "Scanners:")]
    #[case::success("success", "connected")]
    #[case::warning("warning", "waiting_for_scan")]
    #[case::failure("failure", "error")]
    #[case::muted("muted", "[0001]")]
    #[case::value("value", "тест")]
    fn plain_returns_unstyled_text(#[case] style: &str, #[case] input: &str) {
        let painter = Painter::new(false);
        assert_eq!(input, apply(&painter, style, input));
    }

    #[rstest]
    #[case::heading("heading", "Scanners:")]
    #[case::success("success", "connected")]
    #[case::failure("failure", "error")]
    #[case::value("value", "тест")]
    fn coloured_returns_styled_text(#[case] style: &str, #[case] input: &str) {
        let painter = Painter::new(true);
        let styled = apply(&painter, style, input);
        assert_ne!(styled, input);
        assert!(styled.contains(input));
    }

    #[test]
    fn connection_states_keep_their_labels() {
        let painter = Painter::new(true);
        for state in ConnectionState::iter() {
            assert!(painter.connection_state(state).contains(&state.to_string()));
        }
    }
}
