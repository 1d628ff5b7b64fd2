//! BLE transport configuration

use std::time::Duration;

// ----------------------------------------------------------------------------
// Configuration
// ----------------------------------------------------------------------------

/// Configuration for the BLE transport
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct BleTransportConfig {
    /// How long a scan waits for the selected device to show up
    pub scan_timeout: Duration,
    /// Maximum time to wait for the GATT connection
    pub connection_timeout: Duration,
    /// Advertised name prefix of belt-stop sensors
    pub device_name_prefix: String,
    /// Largest single write to the write characteristic
    pub max_write_size: usize,
}

impl Default for BleTransportConfig {
    fn default() -> Self {
        Self {
            scan_timeout: Duration::from_secs(10),
            connection_timeout: Duration::from_secs(10),
            device_name_prefix: "BeltStop".to_string(),
            max_write_size: 180, // fits a 185-byte negotiated MTU
        }
    }
}

impl BleTransportConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_scan_timeout(mut self, timeout: Duration) -> Self {
        self.scan_timeout = timeout;
        self
    }

    pub fn with_connection_timeout(mut self, timeout: Duration) -> Self {
        self.connection_timeout = timeout;
        self
    }

    pub fn with_device_name_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.device_name_prefix = prefix.into();
        self
    }

    /// Set the write chunk size; zero is raised to one byte
    pub fn with_max_write_size(mut self, size: usize) -> Self {
        self.max_write_size = size.max(1);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_overrides_defaults() {
        let config = BleTransportConfig::new()
            .with_scan_timeout(Duration::from_secs(3))
            .with_device_name_prefix("Belt")
            .with_max_write_size(0);

        assert_eq!(config.scan_timeout, Duration::from_secs(3));
        assert_eq!(config.connection_timeout, Duration::from_secs(10));
        assert_eq!(config.device_name_prefix, "Belt");
        assert_eq!(config.max_write_size, 1);
    }

    #[test]
    fn test_round_trips_through_json() {
        let config = BleTransportConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let back: BleTransportConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back, config);
    }
}
