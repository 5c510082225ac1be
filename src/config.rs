//! Configuration system using Figment
//!
//! Configuration is loaded from (in order of precedence, highest first):
//! 1. Environment variables prefixed with `RUSTOIS_`
//! 2. A TOML configuration file (default: `config/ois.toml`)
//! 3. Built-in defaults
//!
//! Nested keys are separated by a double underscore so that field names containing a single
//! underscore stay addressable:
//!
//! ```text
//! RUSTOIS_APPLICATION__LOG_LEVEL=debug
//! RUSTOIS_DEVICE__SLAVE_ID=14
//! RUSTOIS_REPORTS__OUTPUT_DIR=/sdcard
//! ```
//!
//! Protocol timing (settle delays, sample counts, telemetry batch sizes) is fixed by the device
//! and not configurable.
//!
//! # Example
//!
//! ```no_run
//! use rust_ois::config::OisConfig;
//!
//! let config = OisConfig::load_from("config/ois.toml")?;
//! println!("Device: {}", config.device.name);
//! # Ok::<(), rust_ois::config::ConfigError>(())
//! ```

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Configuration error types
#[derive(Debug, Error)]
pub enum ConfigError {
    /// File or environment could not be parsed
    #[error("Configuration load error: {0}")]
    LoadError(#[from] figment::Error),
    /// Values parsed but are not usable
    #[error("Configuration validation error: {0}")]
    ValidationError(String),
    /// Configuration could not be rendered back to TOML
    #[error("Configuration serialization error: {0}")]
    SerializeError(#[from] toml::ser::Error),
}

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OisConfig {
    /// Application settings
    #[serde(default)]
    pub application: ApplicationConfig,
    /// OIS device settings
    #[serde(default)]
    pub device: DeviceConfig,
    /// Report persistence settings
    #[serde(default)]
    pub reports: ReportsConfig,
}

/// Application-level configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApplicationConfig {
    /// Application name
    #[serde(default = "default_app_name")]
    pub name: String,
    /// Logging level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

/// OIS device configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// Device-identifying string reported to the factory tooling
    #[serde(default = "default_device_name")]
    pub name: String,
    /// 7-bit bus address of the OIS coprocessor
    #[serde(default = "default_slave_id")]
    pub slave_id: u8,
    /// First register of the window snapshotted around maintenance operations
    #[serde(default = "default_backup_base")]
    pub backup_base: u16,
    /// Length in bytes of that window
    #[serde(default = "default_backup_length")]
    pub backup_length: usize,
}

/// Report file configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportsConfig {
    /// Directory holding every report file
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    /// Gyro calibration result file
    #[serde(default = "default_calibration_file")]
    pub calibration_file: String,
    /// Telemetry batch file
    #[serde(default = "default_telemetry_file")]
    pub telemetry_file: String,
    /// Raw register dump file
    #[serde(default = "default_dump_file")]
    pub dump_file: String,
    /// Saved copy of the OIS parameter window
    #[serde(default = "default_ois_data_file")]
    pub ois_data_file: String,
}

// ============================================================================
// Default value functions
// ============================================================================

fn default_app_name() -> String {
    "rust_ois".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_device_name() -> String {
    "ois-rumba".to_string()
}

fn default_slave_id() -> u8 {
    0x0E
}

fn default_backup_base() -> u16 {
    0x0200
}

fn default_backup_length() -> usize {
    1024
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("data")
}

fn default_calibration_file() -> String {
    "gyro_k.txt".to_string()
}

fn default_telemetry_file() -> String {
    "gyro.csv".to_string()
}

fn default_dump_file() -> String {
    "debug_register_dump.txt".to_string()
}

fn default_ois_data_file() -> String {
    "ois_data.txt".to_string()
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self {
            name: default_app_name(),
            log_level: default_log_level(),
        }
    }
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            name: default_device_name(),
            slave_id: default_slave_id(),
            backup_base: default_backup_base(),
            backup_length: default_backup_length(),
        }
    }
}

impl Default for ReportsConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            calibration_file: default_calibration_file(),
            telemetry_file: default_telemetry_file(),
            dump_file: default_dump_file(),
            ois_data_file: default_ois_data_file(),
        }
    }
}

impl ReportsConfig {
    /// Full path of the calibration report
    pub fn calibration_path(&self) -> PathBuf {
        self.output_dir.join(&self.calibration_file)
    }

    /// Full path of the telemetry report
    pub fn telemetry_path(&self) -> PathBuf {
        self.output_dir.join(&self.telemetry_file)
    }

    /// Full path of the register dump
    pub fn dump_path(&self) -> PathBuf {
        self.output_dir.join(&self.dump_file)
    }

    /// Full path of the saved OIS parameter window
    pub fn ois_data_path(&self) -> PathBuf {
        self.output_dir.join(&self.ois_data_file)
    }
}

// ============================================================================
// Configuration Loading and Validation
// ============================================================================

impl OisConfig {
    /// Load configuration from `config/ois.toml` and environment variables
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from("config/ois.toml")
    }

    /// Load configuration from a specific file path
    ///
    /// A missing file is not an error: defaults and environment overrides still apply.
    ///
    /// # Errors
    ///
    /// Returns a ConfigError if the file cannot be parsed or validation fails.
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let config: Self = Figment::from(Serialized::defaults(Self::default()))
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed("RUSTOIS_").split("__"))
            .extract()
            .map_err(ConfigError::LoadError)?;

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration after loading
    ///
    /// Checks:
    /// - Log level is valid (trace, debug, info, warn, error)
    /// - Slave id is a 7-bit address
    /// - Backup window is non-empty and inside the 16-bit register space
    /// - Report file names are non-empty
    pub fn validate(&self) -> Result<(), ConfigError> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.application.log_level.as_str()) {
            return Err(ConfigError::ValidationError(format!(
                "Invalid log_level '{}'. Must be one of: {}",
                self.application.log_level,
                valid_levels.join(", ")
            )));
        }

        if self.device.slave_id > 0x7F {
            return Err(ConfigError::ValidationError(format!(
                "Invalid slave_id 0x{:02x}. Must be a 7-bit address",
                self.device.slave_id
            )));
        }

        let window_end = usize::from(self.device.backup_base) + self.device.backup_length;
        if self.device.backup_length == 0 || window_end > 0x1_0000 {
            return Err(ConfigError::ValidationError(format!(
                "Invalid backup window 0x{:04x}+{}. Must be non-empty and end by 0xffff",
                self.device.backup_base, self.device.backup_length
            )));
        }

        for (key, value) in [
            ("calibration_file", &self.reports.calibration_file),
            ("telemetry_file", &self.reports.telemetry_file),
            ("dump_file", &self.reports.dump_file),
            ("ois_data_file", &self.reports.ois_data_file),
        ] {
            if value.trim().is_empty() {
                return Err(ConfigError::ValidationError(format!(
                    "reports.{} cannot be empty",
                    key
                )));
            }
        }

        Ok(())
    }

    /// Render the effective configuration as TOML.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = OisConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.device.slave_id, 0x0E);
        assert_eq!(config.device.backup_base, 0x0200);
        assert_eq!(config.device.backup_length, 1024);
    }

    #[test]
    fn test_invalid_log_level() {
        let mut config = OisConfig::default();
        config.application.log_level = "loud".to_string();

        let result = config.validate();
        assert!(result.is_err());
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("Invalid log_level"));
    }

    #[test]
    fn test_slave_id_must_be_seven_bit() {
        let mut config = OisConfig::default();
        config.device.slave_id = 0x80;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_backup_window_bounds() {
        let mut config = OisConfig::default();
        config.device.backup_length = 0;
        assert!(config.validate().is_err());

        config.device.backup_base = 0xFF00;
        config.device.backup_length = 0x100;
        assert!(config.validate().is_ok());

        config.device.backup_length = 0x101;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_report_paths() {
        let config = ReportsConfig {
            output_dir: PathBuf::from("/sdcard"),
            ..Default::default()
        };
        assert_eq!(config.telemetry_path(), PathBuf::from("/sdcard/gyro.csv"));
        assert_eq!(config.calibration_path(), PathBuf::from("/sdcard/gyro_k.txt"));
    }

    #[test]
    fn test_toml_rendering_parses_back() {
        let mut config = OisConfig::default();
        config.device.name = "ois-bench".to_string();

        let text = config.to_toml().unwrap();
        assert!(text.contains("[device]"));
        let parsed: OisConfig = toml::from_str(&text).unwrap();
        assert_eq!(parsed, config);
    }
}
