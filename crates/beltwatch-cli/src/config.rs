//! Beltwatch CLI Configuration Management
//!
//! Configuration is layered with figment, lowest priority first:
//! built-in defaults, `beltwatch.toml` in the working directory,
//! `~/.beltwatch/config.toml`, then `BELTWATCH_*` environment variables
//! (nested keys separated by a double underscore, for example
//! `BELTWATCH_BLE__DEVICE_NAME_PREFIX`).

use std::path::{Path, PathBuf};
use std::time::Duration;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use beltwatch_ble::BleTransportConfig;
use beltwatch_core::{
    channel::ChannelConfig, BreakWindows, ConfigSnapshot, DeviceSelector, ScheduleWindow,
    SessionOptions, Thresholds,
};

/// Largest UTC offset chrono accepts, in minutes (exclusive)
const MAX_TZ_OFFSET_MINUTES: i32 = 24 * 60;

// ----------------------------------------------------------------------------
// Application Configuration
// ----------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BeltwatchConfig {
    pub ble: BleSettings,
    pub device: DeviceSettings,
    pub storage: StorageSettings,
    pub cli: CliSettings,
}

/// How to find and talk to the sensor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BleSettings {
    /// Advertised name prefix used when no address is given
    pub device_name_prefix: String,
    /// Fixed device address or platform id; takes precedence over the prefix
    pub device_address: Option<String>,
    pub scan_timeout_secs: u64,
    pub connection_timeout_secs: u64,
    pub max_write_size: usize,
}

/// Values pushed to the sensor after each HELLO
///
/// These seed the first run only; afterwards the last values actually sent
/// are restored from the database.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceSettings {
    /// UTC offset for time pushes and exports; the host's offset when unset
    pub tz_offset_minutes: Option<i32>,
    /// Push thresholds as part of the HELLO handshake
    pub auto_push_thresholds: bool,
    pub schedule: ScheduleWindow,
    pub breaks: BreakWindows,
    pub thresholds: Thresholds,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageSettings {
    /// SQLite database file; defaults to `~/.beltwatch/beltwatch.db`
    pub database_path: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CliSettings {
    pub prompt: String,
    pub command_buffer_size: usize,
}

// ----------------------------------------------------------------------------
// Default Implementations
// ----------------------------------------------------------------------------

impl Default for BleSettings {
    fn default() -> Self {
        let transport = BleTransportConfig::default();
        Self {
            device_name_prefix: transport.device_name_prefix,
            device_address: None,
            scan_timeout_secs: transport.scan_timeout.as_secs(),
            connection_timeout_secs: transport.connection_timeout.as_secs(),
            max_write_size: transport.max_write_size,
        }
    }
}

impl Default for DeviceSettings {
    fn default() -> Self {
        Self {
            tz_offset_minutes: None,
            auto_push_thresholds: SessionOptions::default().auto_push_thresholds,
            schedule: ScheduleWindow::default(),
            breaks: BreakWindows::default(),
            thresholds: Thresholds::default(),
        }
    }
}

impl Default for CliSettings {
    fn default() -> Self {
        Self {
            prompt: "beltwatch> ".to_string(),
            command_buffer_size: ChannelConfig::default().command_buffer_size,
        }
    }
}

// ----------------------------------------------------------------------------
// Derived Settings
// ----------------------------------------------------------------------------

impl BleSettings {
    pub fn transport_config(&self) -> BleTransportConfig {
        BleTransportConfig::new()
            .with_scan_timeout(Duration::from_secs(self.scan_timeout_secs))
            .with_connection_timeout(Duration::from_secs(self.connection_timeout_secs))
            .with_device_name_prefix(self.device_name_prefix.clone())
            .with_max_write_size(self.max_write_size)
    }

    /// The configured device, by address if one is set
    pub fn selector(&self) -> DeviceSelector {
        match &self.device_address {
            Some(address) => DeviceSelector::Address(address.clone()),
            None => DeviceSelector::NamePrefix(self.device_name_prefix.clone()),
        }
    }
}

impl DeviceSettings {
    /// Configured offset, or the host's current local offset
    pub fn effective_tz_offset_minutes(&self) -> i32 {
        self.tz_offset_minutes.unwrap_or_else(local_tz_offset_minutes)
    }

    pub fn snapshot(&self) -> ConfigSnapshot {
        ConfigSnapshot {
            schedule: self.schedule,
            breaks: self.breaks,
            thresholds: self.thresholds,
            tz_offset_minutes: self.effective_tz_offset_minutes(),
        }
    }

    pub fn session_options(&self) -> SessionOptions {
        SessionOptions {
            auto_push_thresholds: self.auto_push_thresholds,
        }
    }
}

impl StorageSettings {
    pub fn resolved_database_path(&self) -> Result<PathBuf, ConfigError> {
        match &self.database_path {
            Some(path) => Ok(path.clone()),
            None => Ok(BeltwatchConfig::data_dir()?.join("beltwatch.db")),
        }
    }
}

impl CliSettings {
    pub fn channel_config(&self) -> ChannelConfig {
        ChannelConfig {
            command_buffer_size: self.command_buffer_size,
        }
    }
}

/// Host offset from UTC right now, in minutes
pub fn local_tz_offset_minutes() -> i32 {
    chrono::Local::now().offset().local_minus_utc() / 60
}

// ----------------------------------------------------------------------------
// Configuration Loading Logic
// ----------------------------------------------------------------------------

impl BeltwatchConfig {
    /// Load with the standard layering
    pub fn load() -> Result<Self, ConfigError> {
        let figment = Figment::new()
            .merge(Serialized::defaults(Self::default()))
            .merge(Toml::file("beltwatch.toml"))
            .merge(Toml::file(Self::default_config_path()?))
            .merge(Env::prefixed("BELTWATCH_").split("__"));

        Self::extract(figment, "Failed to load configuration")
    }

    /// Load from one file on top of the defaults; environment still applies
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigError::FileSystem(format!(
                "Config file {} does not exist",
                path.display()
            )));
        }

        let figment = Figment::new()
            .merge(Serialized::defaults(Self::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed("BELTWATCH_").split("__"));

        Self::extract(figment, &format!("Failed to load from {}", path.display()))
    }

    fn extract(figment: Figment, context: &str) -> Result<Self, ConfigError> {
        let config: BeltwatchConfig = figment
            .extract()
            .map_err(|e| ConfigError::Loading(format!("{}: {}", context, e)))?;
        config.validate()?;
        Ok(config)
    }

    /// `~/.beltwatch`
    pub fn data_dir() -> Result<PathBuf, ConfigError> {
        dirs::home_dir()
            .map(|home| home.join(".beltwatch"))
            .ok_or_else(|| ConfigError::Environment("Cannot determine home directory".to_string()))
    }

    fn default_config_path() -> Result<PathBuf, ConfigError> {
        Ok(Self::data_dir()?.join("config.toml"))
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self)
            .map_err(|e| ConfigError::Serialization(format!("Failed to serialize config: {}", e)))
    }

    /// Validate the configuration for consistency and correctness
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.ble.device_name_prefix.trim().is_empty() && self.ble.device_address.is_none() {
            return Err(ConfigError::Validation(
                "Either a device name prefix or a device address is required".to_string(),
            ));
        }
        if self.ble.scan_timeout_secs == 0 || self.ble.connection_timeout_secs == 0 {
            return Err(ConfigError::Validation(
                "BLE timeouts must be greater than 0".to_string(),
            ));
        }
        if self.ble.max_write_size == 0 {
            return Err(ConfigError::Validation(
                "BLE max write size must be greater than 0".to_string(),
            ));
        }

        self.device.schedule.validate().map_err(ConfigError::Validation)?;
        self.device.breaks.validate().map_err(ConfigError::Validation)?;
        self.device.thresholds.validate().map_err(ConfigError::Validation)?;
        if let Some(offset) = self.device.tz_offset_minutes {
            validate_tz_offset(offset)?;
        }

        if self.cli.command_buffer_size == 0 {
            return Err(ConfigError::Validation(
                "Command buffer size must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }

    /// Example configuration file content
    pub fn example_config() -> String {
        let example = BeltwatchConfig {
            ble: BleSettings {
                device_address: Some("AA:BB:CC:DD:EE:FF".to_string()),
                ..Default::default()
            },
            device: DeviceSettings {
                tz_offset_minutes: Some(60),
                ..Default::default()
            },
            storage: StorageSettings {
                database_path: Some(PathBuf::from("/var/lib/beltwatch/beltwatch.db")),
            },
            cli: CliSettings::default(),
        };

        toml::to_string_pretty(&example)
            .unwrap_or_else(|_| "# Failed to generate example config".to_string())
    }
}

pub fn validate_tz_offset(minutes: i32) -> Result<(), ConfigError> {
    if minutes.abs() < MAX_TZ_OFFSET_MINUTES {
        Ok(())
    } else {
        Err(ConfigError::Validation(format!(
            "UTC offset must be within +/-{} minutes, got {}",
            MAX_TZ_OFFSET_MINUTES - 1,
            minutes
        )))
    }
}

// ----------------------------------------------------------------------------
// Error Types
// ----------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Configuration loading error: {0}")]
    Loading(String),

    #[error("Configuration validation error: {0}")]
    Validation(String),

    #[error("Environment error: {0}")]
    Environment(String),

    #[error("File system error: {0}")]
    FileSystem(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = BeltwatchConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.ble.device_name_prefix, "BeltStop");
        assert_eq!(config.ble.max_write_size, 180);
        assert!(config.device.auto_push_thresholds);
    }

    #[test]
    fn test_selector_prefers_address() {
        let mut ble = BleSettings::default();
        assert_eq!(ble.selector(), DeviceSelector::NamePrefix("BeltStop".to_string()));

        ble.device_address = Some("AA:BB".to_string());
        assert_eq!(ble.selector(), DeviceSelector::Address("AA:BB".to_string()));
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let mut config = BeltwatchConfig::default();
        config.device.schedule.start_min = 1440;
        assert!(config.validate().is_err());

        let mut config = BeltwatchConfig::default();
        config.device.thresholds.threshold_g = -0.1;
        assert!(config.validate().is_err());

        let mut config = BeltwatchConfig::default();
        config.device.tz_offset_minutes = Some(24 * 60);
        assert!(config.validate().is_err());

        let mut config = BeltwatchConfig::default();
        config.ble.max_write_size = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_explicit_tz_offset_wins() {
        let device = DeviceSettings {
            tz_offset_minutes: Some(-300),
            ..Default::default()
        };
        assert_eq!(device.snapshot().tz_offset_minutes, -300);
    }

    #[test]
    fn test_transport_config_mapping() {
        let ble = BleSettings {
            scan_timeout_secs: 4,
            max_write_size: 20,
            ..Default::default()
        };
        let transport = ble.transport_config();
        assert_eq!(transport.scan_timeout, Duration::from_secs(4));
        assert_eq!(transport.max_write_size, 20);
        assert_eq!(transport.device_name_prefix, "BeltStop");
    }

    #[test]
    fn test_load_from_file_layers_over_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("beltwatch.toml");
        std::fs::write(
            &path,
            "[ble]\ndevice_name_prefix = \"Belt\"\n\n[device.thresholds]\nthreshold_g = 0.2\nhysteresis_g = 0.05\nseconds_down = 5\nseconds_up = 4\n",
        )
        .unwrap();

        let config = BeltwatchConfig::load_from_file(&path).unwrap();
        assert_eq!(config.ble.device_name_prefix, "Belt");
        assert_eq!(config.device.thresholds.seconds_down, 5);
        assert_eq!(config.device.schedule, ScheduleWindow::default());
    }

    #[test]
    fn test_rendered_toml_reloads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sub").join("config.toml");
        let mut config = BeltwatchConfig::default();
        config.device.tz_offset_minutes = Some(120);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, config.to_toml().unwrap()).unwrap();

        assert_eq!(BeltwatchConfig::load_from_file(&path).unwrap(), config);
    }

    #[test]
    fn test_example_config_generation() {
        let example = BeltwatchConfig::example_config();
        assert!(example.contains("[ble]"));
        assert!(example.contains("[device.schedule]"));
        assert!(example.contains("[storage]"));
        assert!(example.contains("[cli]"));
    }
}
