//! Station configuration.
//!
//! One JSON file describes a whole station: which port the reader hangs off,
//! who the administrator is, where the durable log lives and when the mirror
//! batch runs. Every field has a default, so an empty file (or no file at
//! all) yields a working single-station setup.
//!
//! # Example
//!
//! ```json
//! {
//!   "port": "/dev/ttyUSB0",
//!   "admin_uid": "AA-BB-CC-01",
//!   "station_id": 3,
//!   "batch_hour": 23,
//!   "batch_minute": 50
//! }
//! ```
//!
//! The station-wide struct aggregates; each layer keeps its own narrow
//! config ([`LinkConfig`], [`LogConfig`], `RegistryConfig`) and
//! `StationConfig` converts into them.

use crate::error::{EngineError, EngineResult};
use doorman_core::Uid;
use doorman_core::constants::{
    DEFAULT_ADMIN_UID, DEFAULT_ADMIN_WAIT_SECS, DEFAULT_BAUD_RATE, DEFAULT_ENROLL_SECS,
    DEFAULT_PROBE_TIMEOUT_MS, DEFAULT_STATION_ID, DEFAULT_SWEEP_INTERVAL_SECS,
};
use doorman_serial::LinkConfig;
use doorman_store::{LogConfig, RegistryConfig};
use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

/// Complete configuration of one access-control station.
///
/// Missing fields fall back to the defaults below, so partial files are
/// fine. Load with [`StationConfig::load`], which also validates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StationConfig {
    /// Serial port of the reader board. `None` means probe every port at
    /// startup and take the first one that answers the firmware ping.
    pub port: Option<String>,

    /// Serial line speed.
    pub baud_rate: u32,

    /// Identifier recorded with every access event.
    pub station_id: u32,

    /// The administrator tag that opens the enrollment flow.
    pub admin_uid: String,

    /// When set, probes only accept devices whose pong carries this tag.
    pub expected_firmware: Option<String>,

    /// Label of the session log opened at startup.
    pub session_label: String,

    /// Primary log and registry files, plus the pointer sidecar.
    pub data_dir: PathBuf,

    /// Mirror copies of every primary file.
    pub backup_dir: PathBuf,

    /// Where processed session files are archived after a batch run.
    pub history_dir: PathBuf,

    /// Seconds the station waits for the admin tag before reverting.
    pub admin_wait_secs: u64,

    /// Seconds an enrollment capture may stay open.
    pub enroll_secs: u64,

    /// Bounded wait for a pong during a connectivity probe.
    pub probe_timeout_ms: u64,

    /// Interval of the background file-restore sweep.
    pub sweep_interval_secs: u64,

    /// SQLite file the batch job mirrors into.
    pub db_path: PathBuf,

    /// Hour (0-23) of the nightly batch run.
    pub batch_hour: u8,

    /// Minute (0-59) of the nightly batch run.
    pub batch_minute: u8,
}

impl Default for StationConfig {
    fn default() -> Self {
        Self {
            port: None,
            baud_rate: DEFAULT_BAUD_RATE,
            station_id: DEFAULT_STATION_ID,
            admin_uid: DEFAULT_ADMIN_UID.to_string(),
            expected_firmware: None,
            session_label: "station".to_string(),
            data_dir: PathBuf::from("data_logs"),
            backup_dir: PathBuf::from("data_logs_backup"),
            history_dir: PathBuf::from("data_logs/history"),
            admin_wait_secs: DEFAULT_ADMIN_WAIT_SECS,
            enroll_secs: DEFAULT_ENROLL_SECS,
            probe_timeout_ms: DEFAULT_PROBE_TIMEOUT_MS,
            sweep_interval_secs: DEFAULT_SWEEP_INTERVAL_SECS,
            db_path: PathBuf::from("doorman.db"),
            batch_hour: 23,
            batch_minute: 50,
        }
    }
}

impl StationConfig {
    /// Load and validate a config file.
    ///
    /// A missing file is not an error: the station runs on defaults and
    /// logs that it did so. Unreadable or malformed files are rejected,
    /// silently ignoring a half-written config would be worse than
    /// refusing to start.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Config`] when the file exists but cannot be
    /// read or parsed, or when [`StationConfig::validate`] rejects it.
    pub fn load(path: impl AsRef<Path>) -> EngineResult<Self> {
        let path = path.as_ref();
        let config = match std::fs::read_to_string(path) {
            Ok(raw) => serde_json::from_str(&raw).map_err(|e| {
                EngineError::Config(format!("cannot parse {}: {e}", path.display()))
            })?,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                info!(path = %path.display(), "No station config file, using defaults");
                Self::default()
            }
            Err(e) => {
                return Err(EngineError::Config(format!(
                    "cannot read {}: {e}",
                    path.display()
                )));
            }
        };
        config.validate()?;
        Ok(config)
    }

    /// Reject configurations that cannot possibly run.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Config`] naming the offending field.
    pub fn validate(&self) -> EngineResult<()> {
        if self.baud_rate == 0 {
            return Err(EngineError::Config("baud rate must be positive".into()));
        }
        if let Err(e) = Uid::new(&self.admin_uid) {
            return Err(EngineError::Config(format!("admin uid: {e}")));
        }
        if self.admin_wait_secs == 0 || self.enroll_secs == 0 {
            return Err(EngineError::Config(
                "enrollment timeouts must be positive".into(),
            ));
        }
        if self.batch_hour > 23 {
            return Err(EngineError::Config(format!(
                "batch hour must be 0-23, got {}",
                self.batch_hour
            )));
        }
        if self.batch_minute > 59 {
            return Err(EngineError::Config(format!(
                "batch minute must be 0-59, got {}",
                self.batch_minute
            )));
        }
        Ok(())
    }

    /// The configured admin tag, normalized.
    ///
    /// # Errors
    ///
    /// Returns the underlying uid-format error when the configured string
    /// is not a valid uid. [`StationConfig::validate`] catches this at
    /// load time, so post-load calls do not fail in practice.
    pub fn admin_uid(&self) -> EngineResult<Uid> {
        Ok(Uid::new(&self.admin_uid)?)
    }

    /// Link settings for a concrete port.
    ///
    /// The port name is a parameter because the configured `port` may be
    /// `None`, in which case the caller probes for one first.
    pub fn link_config(&self, port_name: String) -> LinkConfig {
        LinkConfig {
            port_name,
            baud_rate: self.baud_rate,
            expected_firmware: self.expected_firmware.clone(),
            ..LinkConfig::default()
        }
    }

    /// Durable-log layout for this station.
    pub fn log_config(&self) -> LogConfig {
        LogConfig {
            data_dir: self.data_dir.clone(),
            backup_dir: self.backup_dir.clone(),
            history_dir: self.history_dir.clone(),
        }
    }

    /// Registry layout for this station. Shares the log directories.
    pub fn registry_config(&self) -> RegistryConfig {
        RegistryConfig {
            data_dir: self.data_dir.clone(),
            backup_dir: self.backup_dir.clone(),
        }
    }

    /// How long the station waits for the administrator tag.
    pub fn admin_wait(&self) -> Duration {
        Duration::from_secs(self.admin_wait_secs)
    }

    /// How long an enrollment capture stays open.
    pub fn enroll_window(&self) -> Duration {
        Duration::from_secs(self.enroll_secs)
    }

    /// Bounded wait for a probe pong.
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    /// Interval of the resilience sweep.
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_defaults_match_constants() {
        let config = StationConfig::default();
        assert_eq!(config.port, None);
        assert_eq!(config.baud_rate, DEFAULT_BAUD_RATE);
        assert_eq!(config.station_id, DEFAULT_STATION_ID);
        assert_eq!(config.admin_uid, DEFAULT_ADMIN_UID);
        assert_eq!(config.session_label, "station");
        assert_eq!(config.data_dir, PathBuf::from("data_logs"));
        assert_eq!(config.batch_hour, 23);
        assert_eq!(config.batch_minute, 50);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = StationConfig::load(dir.path().join("doorman.json")).unwrap();
        assert_eq!(config, StationConfig::default());
    }

    #[test]
    fn test_load_partial_file_merges_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("doorman.json");
        std::fs::write(&path, r#"{"baud_rate": 9600, "admin_uid": "AA-BB-CC-01"}"#).unwrap();

        let config = StationConfig::load(&path).unwrap();
        assert_eq!(config.baud_rate, 9600);
        assert_eq!(config.admin_uid, "AA-BB-CC-01");
        assert_eq!(config.port, None);
        assert_eq!(config.station_id, DEFAULT_STATION_ID);
        assert_eq!(config.batch_minute, 50);
    }

    #[test]
    fn test_load_rejects_malformed_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("doorman.json");
        std::fs::write(&path, "{not json").unwrap();

        let err = StationConfig::load(&path).unwrap_err();
        assert!(matches!(err, EngineError::Config(_)));
        assert!(err.to_string().contains("cannot parse"));
    }

    #[test]
    fn test_load_rejects_invalid_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("doorman.json");
        std::fs::write(&path, r#"{"batch_hour": 24}"#).unwrap();

        let err = StationConfig::load(&path).unwrap_err();
        assert!(err.to_string().contains("batch hour"));
    }

    #[rstest]
    #[case::zero_baud(r#"{"baud_rate": 0}"#, "baud rate")]
    #[case::bad_admin_uid(r#"{"admin_uid": "!"}"#, "admin uid")]
    #[case::zero_admin_wait(r#"{"admin_wait_secs": 0}"#, "timeouts")]
    #[case::zero_enroll(r#"{"enroll_secs": 0}"#, "timeouts")]
    #[case::batch_hour(r#"{"batch_hour": 24}"#, "batch hour")]
    #[case::batch_minute(r#"{"batch_minute": 60}"#, "batch minute")]
    fn test_validate_rejections(#[case] raw: &str, #[case] needle: &str) {
        let config: StationConfig = serde_json::from_str(raw).unwrap();
        let err = config.validate().unwrap_err();
        assert!(
            err.to_string().contains(needle),
            "expected {needle:?} in {err}"
        );
    }

    #[test]
    fn test_admin_uid_normalizes() {
        let config = StationConfig {
            admin_uid: " aa-bb-cc-01 ".to_string(),
            ..StationConfig::default()
        };
        assert_eq!(config.admin_uid().unwrap().as_str(), "AA-BB-CC-01");
    }

    #[test]
    fn test_link_config_conversion() {
        let config = StationConfig {
            baud_rate: 57_600,
            expected_firmware: Some("DOORMAN-FW".to_string()),
            ..StationConfig::default()
        };
        let link = config.link_config("/dev/ttyACM0".to_string());
        assert_eq!(link.port_name, "/dev/ttyACM0");
        assert_eq!(link.baud_rate, 57_600);
        assert_eq!(link.expected_firmware.as_deref(), Some("DOORMAN-FW"));
    }

    #[test]
    fn test_storage_config_conversions_share_dirs() {
        let config = StationConfig {
            data_dir: PathBuf::from("/srv/doorman/data"),
            backup_dir: PathBuf::from("/srv/doorman/backup"),
            history_dir: PathBuf::from("/srv/doorman/history"),
            ..StationConfig::default()
        };
        let log = config.log_config();
        let registry = config.registry_config();
        assert_eq!(log.data_dir, registry.data_dir);
        assert_eq!(log.backup_dir, registry.backup_dir);
        assert_eq!(log.history_dir, PathBuf::from("/srv/doorman/history"));
    }

    #[test]
    fn test_duration_accessors() {
        let config = StationConfig::default();
        assert_eq!(config.admin_wait(), Duration::from_secs(15));
        assert_eq!(config.enroll_window(), Duration::from_secs(20));
        assert_eq!(config.probe_timeout(), Duration::from_millis(3000));
        assert_eq!(config.sweep_interval(), Duration::from_secs(30));
    }
}
