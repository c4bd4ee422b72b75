use serde::Serialize;
use strum_macros::{Display, EnumIter};

use super::renderer::PairingImage;
use crate::hw::PairingPayload;

/// Connection lifecycle of one scanner slot.
#[derive(Debug, Clone, Copy, Default, Eq, PartialEq, Hash, Display, EnumIter, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    #[default]
    #[strum(to_string = "disconnected")]
    Disconnected,
    /// The SDK reported link establishment in progress.
    #[strum(to_string = "connecting")]
    Connecting,
    #[strum(to_string = "generating_pairing_code")]
    GeneratingPairingCode,
    /// A pairing code is on screen and the operator has to scan it.
    #[strum(to_string = "waiting_for_scan")]
    WaitingForScan,
    #[strum(to_string = "connected")]
    Connected,
    #[strum(to_string = "error")]
    Error,
}

impl ConnectionState {
    /// Returns whether a pairing attempt is underway.
    #[must_use]
    pub fn is_pairing(self) -> bool {
        matches!(
            self,
            Self::GeneratingPairingCode | Self::WaitingForScan | Self::Connecting
        )
    }

    /// Returns whether the state needs no further SDK input to resolve.
    #[must_use]
    pub fn is_settled(self) -> bool {
        matches!(self, Self::Connected | Self::Error | Self::Disconnected)
    }
}

/// Identifier of one pairing attempt.
///
/// Ids increase monotonically per machine and are never reused, so an event
/// stamped with an old id can always be told apart from the live session.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Hash, derive_more::Display)]
#[display("#{_0}")]
pub struct SessionId(u64);

impl SessionId {
    pub(crate) fn first() -> Self {
        Self(1)
    }

    pub(crate) fn next(self) -> Self {
        Self(self.0.saturating_add(1))
    }

    pub(crate) fn from_raw(raw: u64) -> Option<Self> {
        (raw != 0).then_some(Self(raw))
    }

    pub(crate) fn into_raw(self) -> u64 {
        self.0
    }
}

/// Artifacts of a pairing attempt that is waiting for the operator.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct PairingSession {
    id: SessionId,
    payload: PairingPayload,
    image: PairingImage,
}

impl PairingSession {
    pub(crate) fn new(id: SessionId, payload: PairingPayload, image: PairingImage) -> Self {
        Self { id, payload, image }
    }

    #[must_use]
    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Text the scanner has to read to initiate the link.
    #[must_use]
    pub fn payload(&self) -> &PairingPayload {
        &self.payload
    }

    /// Rendered pairing code.
    #[must_use]
    pub fn image(&self) -> &PairingImage {
        &self.image
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use rstest::rstest;
    use strum::IntoEnumIterator;

    use super::*;

    #[rstest]
    #[case(ConnectionState::Disconnected, false, true)]
    #[case(ConnectionState::Connecting, true, false)]
    #[case(ConnectionState::GeneratingPairingCode, true, false)]
    #[case(ConnectionState::WaitingForScan, true, false)]
    #[case(ConnectionState::Connected, false, true)]
    #[case(ConnectionState::Error, false, true)]
    fn state_classification(
        #[case] state: ConnectionState,
        #[case] pairing: bool,
        #[case] settled: bool,
    ) {
        assert_eq!(pairing, state.is_pairing());
        assert_eq!(settled, state.is_settled());
    }

    #[test]
    fn every_state_is_either_pairing_or_settled() {
        for state in ConnectionState::iter() {
            assert_ne!(state.is_pairing(), state.is_settled(), "{state}");
        }
    }

    #[test]
    fn session_ids_are_monotonic_and_never_zero() {
        let first = SessionId::first();
        let second = first.next();

        assert!(second > first);
        assert_eq!(None, SessionId::from_raw(0));
        assert_eq!(Some(second), SessionId::from_raw(second.into_raw()));
    }
}
