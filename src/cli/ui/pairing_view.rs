use std::fmt::{self, Display, Formatter};

use crate::cli::pair::PairStopReason;
use crate::pairing::PairingSession;

use super::painter::Painter;

/// Renders the pairing code the operator has to scan.
pub(crate) struct PairingCodeView<'a> {
    session: &'a PairingSession,
    painter: &'a Painter,
}

impl<'a> PairingCodeView<'a> {
    pub(crate) fn new(session: &'a PairingSession, painter: &'a Painter) -> Self {
        Self { session, painter }
    }
}

impl Display for PairingCodeView<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{} {}",
            self.painter.heading("Pairing code"),
            self.painter.muted(self.session.id().to_string())
        )?;
        for row in self.session.image().rows() {
            writeln!(f, "{row}")?;
        }
        write!(
            f,
            "{}",
            self.painter
                .muted("Scan the code above with the scanner to pair it.")
        )
    }
}

/// Renders why scan streaming ended.
pub(crate) struct PairSummaryView<'a> {
    stop_reason: &'a PairStopReason,
    received_scans: usize,
    painter: &'a Painter,
}

impl<'a> PairSummaryView<'a> {
    pub(crate) fn new(
        stop_reason: &'a PairStopReason,
        received_scans: usize,
        painter: &'a Painter,
    ) -> Self {
        Self {
            stop_reason,
            received_scans,
            painter,
        }
    }
}

impl Display for PairSummaryView<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let stop_reason = match self.stop_reason {
            PairStopReason::ReachedLimit(_) => self.painter.success(self.stop_reason.to_string()),
            PairStopReason::Interrupted | PairStopReason::LinkLost => {
                self.painter.warning(self.stop_reason.to_string())
            }
        };
        write!(
            f,
            "{} {} {}",
            self.painter.heading("Stopped:"),
            stop_reason,
            self.painter
                .value(format!("- received {} scan(s)", self.received_scans))
        )
    }
}
