use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::hw::Permission;
use crate::model::DeviceKind;

/// Errors returned by scanner connection and registry operations.
///
/// Every failure reaching callers carries a human-readable reason; nothing
/// from the hardware boundary is surfaced raw.
#[derive(Debug, Clone, Error, Eq, PartialEq)]
pub enum ScannerError {
    #[error("missing scanner permissions: {missing}", missing = format_permissions(missing))]
    PermissionRequired { missing: Vec<Permission> },
    #[error("scanner pairing is already in progress")]
    PairingInProgress,
    #[error("no scanner with id `{device_id}` is known")]
    UnknownDevice { device_id: String },
    #[error("no scanner backend is registered for `{kind}` devices")]
    UnknownBackend { kind: DeviceKind },
    #[error("scanner is not connected")]
    NotConnected,
    #[error("{operation} timed out after {elapsed}", elapsed = humantime::format_duration(*after))]
    Timeout {
        operation: &'static str,
        after: Duration,
    },
    #[error("scanner connection failed: {reason}")]
    ConnectionFailed { reason: String },
    #[error("scanner SDK failure: {reason}")]
    Sdk { reason: String },
    #[error("no Bluetooth adapters were found")]
    NoAdapters,
    #[error("the scanner service has shut down")]
    Shutdown,
}

impl ScannerError {
    /// Returns whether granting permissions is the remedy for this failure.
    #[must_use]
    pub fn is_permission_error(&self) -> bool {
        matches!(self, Self::PermissionRequired { .. })
    }
}

impl From<SdkError> for ScannerError {
    fn from(error: SdkError) -> Self {
        match error {
            SdkError::PermissionDenied => Self::PermissionRequired {
                missing: Permission::bluetooth(),
            },
            SdkError::NoAdapters => Self::NoAdapters,
            other => Self::Sdk {
                reason: other.to_string(),
            },
        }
    }
}

/// Errors raised at the vendor SDK boundary.
#[derive(Debug, Clone, Error, Eq, PartialEq)]
pub enum SdkError {
    #[error("an event observer is already registered with the scanner SDK")]
    AlreadyRegistered,
    #[error("no event observer is registered with the scanner SDK")]
    NotRegistered,
    #[error("no scanner link is established")]
    NoLink,
    #[error("the scanner SDK does not support `{operation}`")]
    Unsupported { operation: &'static str },
    #[error("scanner SDK rejected the request (code {code}): {message}")]
    Rejected { code: i32, message: String },
    #[error("Bluetooth access was denied")]
    PermissionDenied,
    #[error("no Bluetooth adapters were found")]
    NoAdapters,
    #[error("Bluetooth transport failure: {reason}")]
    Transport { reason: String },
}

impl From<btleplug::Error> for SdkError {
    fn from(error: btleplug::Error) -> Self {
        match error {
            btleplug::Error::PermissionDenied => Self::PermissionDenied,
            other => Self::Transport {
                reason: other.to_string(),
            },
        }
    }
}

/// Errors returned when parsing fake SDK fixtures.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum FixtureError {
    #[error("the fake fixture is empty")]
    EmptyFixture,
    #[error("fixture records must contain {expected} pipe-delimited fields")]
    InvalidRecordFieldCount { expected: usize },
    #[error("fixture records cannot contain empty mandatory fields")]
    EmptyRecordField,
    #[error("battery level `{value}` is not a percentage between 0 and 100")]
    InvalidBatteryLevel { value: String },
    #[error("device class `{value}` is not a hexadecimal number")]
    InvalidDeviceClass { value: String },
    #[error("link state `{value}` must be `connected` or `bonded`")]
    InvalidLinkState { value: String },
    #[error("scan payload is not valid hexadecimal: {source}")]
    InvalidHex {
        #[source]
        source: hex::FromHexError,
    },
}

/// Errors returned when loading scanner settings.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read scanner settings from `{}`", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("scanner settings in `{}` are invalid", path.display())]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
}

/// Errors returned when validating runtime backend options.
#[derive(Debug, Error)]
pub(crate) enum CliConfigError {
    #[error("missing fake scanner fixture while fake mode is enabled")]
    MissingFakeScannerFixture,
}

/// Errors returned by telemetry initialisation.
#[derive(Debug, Error)]
pub(crate) enum TelemetryError {
    #[error("failed to install tracing subscriber")]
    Subscriber(#[from] tracing_subscriber::util::TryInitError),
}

fn format_permissions(missing: &[Permission]) -> String {
    missing
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn permission_denied_maps_to_distinct_permission_error() {
        let error = ScannerError::from(SdkError::PermissionDenied);

        assert!(error.is_permission_error());
        assert_matches!(error, ScannerError::PermissionRequired { missing } if !missing.is_empty());
    }

    #[test]
    fn sdk_rejection_keeps_human_readable_reason() {
        let error = ScannerError::from(SdkError::Rejected {
            code: 7,
            message: "pairing code unavailable".to_string(),
        });

        assert_eq!(
            "scanner SDK failure: scanner SDK rejected the request (code 7): pairing code unavailable",
            error.to_string()
        );
    }

    #[test]
    fn timeout_renders_humanised_duration() {
        let error = ScannerError::Timeout {
            operation: "scanner connection",
            after: Duration::from_secs(30),
        };

        assert_eq!("scanner connection timed out after 30s", error.to_string());
    }
}
