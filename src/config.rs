use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use bon::Builder;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use serde_with::{DurationMilliSeconds, DurationSeconds, serde_as};
use strum_macros::Display;
use tracing::debug;

use crate::error::ConfigError;

const SETTINGS_FILE_NAME: &str = "settings.json";

/// Whether a scan ends the scanning phase.
#[derive(Debug, Clone, Copy, Default, Eq, PartialEq, Display, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanMode {
    /// One scan returns the registry to idle.
    #[default]
    #[strum(to_string = "single")]
    Single,
    /// Keep scanning until told to stop.
    #[strum(to_string = "continuous")]
    Continuous,
}

/// Runtime scanner settings.
///
/// Loaded from JSON; every field is optional and falls back to its default.
///
/// ```
/// use std::time::Duration;
///
/// let settings = scanlink::ScannerSettings::builder()
///     .connection_timeout(Duration::from_secs(5))
///     .beep_on_scan(false)
///     .build();
/// assert_eq!(Duration::from_secs(5), settings.connection_timeout());
/// ```
#[serde_as]
#[derive(Debug, Clone, Eq, PartialEq, Builder, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct ScannerSettings {
    /// Upper bound for a registry `connect` call.
    #[serde(rename = "connection_timeout_secs")]
    #[serde_as(as = "DurationSeconds<u64>")]
    #[builder(default = Duration::from_secs(30))]
    connection_timeout: Duration,
    /// Upper bound for generating and rendering a pairing code.
    #[serde(rename = "pairing_code_timeout_ms")]
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    #[builder(default = Duration::from_secs(10))]
    pairing_code_timeout: Duration,
    /// Per-backend bound while listing devices.
    #[serde(rename = "discovery_timeout_ms")]
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    #[builder(default = Duration::from_secs(5))]
    discovery_timeout: Duration,
    #[builder(default = true)]
    beep_on_scan: bool,
    #[builder(default = true)]
    trim_payload: bool,
    #[builder(default)]
    strip_symbology_prefix: bool,
    #[builder(default)]
    scan_mode: ScanMode,
}

impl Default for ScannerSettings {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl ScannerSettings {
    /// Loads settings from a JSON file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or is not valid settings JSON.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Loads settings from `path`, or from the per-user settings file when it
    /// exists, or falls back to defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if a settings file exists but cannot be loaded.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = path {
            return Self::load(path);
        }

        match default_settings_path() {
            Some(path) if path.exists() => {
                debug!(path = %path.display(), "loading per-user scanner settings");
                Self::load(&path)
            }
            _ => Ok(Self::default()),
        }
    }

    #[must_use]
    pub fn connection_timeout(&self) -> Duration {
        self.connection_timeout
    }

    /// Replaces the connect bound, e.g. from a command-line override.
    #[must_use]
    pub fn with_connection_timeout(mut self, connection_timeout: Duration) -> Self {
        self.connection_timeout = connection_timeout;
        self
    }

    #[must_use]
    pub fn pairing_code_timeout(&self) -> Duration {
        self.pairing_code_timeout
    }

    #[must_use]
    pub fn discovery_timeout(&self) -> Duration {
        self.discovery_timeout
    }

    /// Whether the scanner should beep after each accepted scan.
    #[must_use]
    pub fn beep_on_scan(&self) -> bool {
        self.beep_on_scan
    }

    #[must_use]
    pub fn trim_payload(&self) -> bool {
        self.trim_payload
    }

    #[must_use]
    pub fn strip_symbology_prefix(&self) -> bool {
        self.strip_symbology_prefix
    }

    #[must_use]
    pub fn scan_mode(&self) -> ScanMode {
        self.scan_mode
    }
}

fn default_settings_path() -> Option<PathBuf> {
    ProjectDirs::from("", "", "scanlink")
        .map(|project_dirs| project_dirs.config_dir().join(SETTINGS_FILE_NAME))
}

#[cfg(test)]
mod tests {
    use std::time::{SystemTime, UNIX_EPOCH};

    use assert_matches::assert_matches;
    use pretty_assertions::assert_eq;

    use super::*;

    fn unique_temp_path(file_name: &str) -> PathBuf {
        let suffix = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("system time should be after unix epoch")
            .as_nanos();
        std::env::temp_dir().join(format!("scanlink-{file_name}-{suffix}.json"))
    }

    #[test]
    fn defaults_match_documented_values() {
        let settings = ScannerSettings::default();

        assert_eq!(Duration::from_secs(30), settings.connection_timeout());
        assert_eq!(Duration::from_secs(10), settings.pairing_code_timeout());
        assert!(settings.beep_on_scan());
        assert!(settings.trim_payload());
        assert!(!settings.strip_symbology_prefix());
        assert_eq!(ScanMode::Single, settings.scan_mode());
    }

    #[test]
    fn partial_json_keeps_defaults_for_missing_fields() {
        let settings: ScannerSettings = serde_json::from_str(
            r#"{"connection_timeout_secs": 12, "scan_mode": "continuous", "beep_on_scan": false}"#,
        )
        .expect("partial settings should parse");

        assert_eq!(Duration::from_secs(12), settings.connection_timeout());
        assert_eq!(ScanMode::Continuous, settings.scan_mode());
        assert!(!settings.beep_on_scan());
        assert_eq!(Duration::from_secs(5), settings.discovery_timeout());
    }

    #[test]
    fn load_reads_settings_file() {
        let path = unique_temp_path("load");
        fs::write(&path, r#"{"discovery_timeout_ms": 250}"#)
            .expect("temporary settings file should be writable");

        let loaded = ScannerSettings::load(&path);
        fs::remove_file(&path).expect("temporary settings file should be removable");

        let settings = loaded.expect("settings file should load");
        assert_eq!(Duration::from_millis(250), settings.discovery_timeout());
    }

    #[test]
    fn load_reports_missing_file() {
        let path = unique_temp_path("missing");

        assert_matches!(
            ScannerSettings::load(&path),
            Err(ConfigError::Read { path: reported, .. }) if reported == path
        );
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let result = serde_json::from_str::<ScannerSettings>(r#"{"beep": true}"#);

        assert!(result.is_err());
    }
}
