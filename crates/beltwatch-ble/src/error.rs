//! Error types for the BLE transport

use beltwatch_core::TransportError;
use thiserror::Error;

// ----------------------------------------------------------------------------
// Error Types
// ----------------------------------------------------------------------------

/// Errors specific to the BLE transport
#[derive(Error, Debug)]
pub enum BleTransportError {
    #[error("BLE adapter not available: {0}")]
    AdapterNotAvailable(String),

    #[error("Failed to scan: {0}")]
    ScanFailed(String),

    #[error("No device matching {selector} found within {timeout_ms}ms")]
    DeviceNotFound { selector: String, timeout_ms: u64 },

    #[error("Failed to connect to device: {0}")]
    ConnectionFailed(String),

    #[error("Connection timeout after {timeout_ms}ms")]
    ConnectionTimeout { timeout_ms: u64 },

    #[error("Failed to discover services: {0}")]
    ServiceDiscoveryFailed(String),

    #[error("Characteristic not found: {characteristic}")]
    CharacteristicNotFound { characteristic: String },

    #[error("Failed to subscribe to notifications: {0}")]
    SubscriptionFailed(String),

    #[error("Failed to get notifications stream: {0}")]
    NotificationStreamFailed(String),

    #[error("Failed to get BLE events: {0}")]
    EventStreamFailed(String),

    #[error("Failed to write to characteristic: {0}")]
    WriteFailed(String),

    #[error("Device not connected")]
    NotConnected,
}

pub type Result<T> = std::result::Result<T, BleTransportError>;

impl From<BleTransportError> for TransportError {
    fn from(err: BleTransportError) -> Self {
        match err {
            BleTransportError::AdapterNotAvailable(reason)
            | BleTransportError::ScanFailed(reason) => TransportError::AdapterUnavailable { reason },
            BleTransportError::DeviceNotFound { selector, .. } => {
                TransportError::DeviceNotFound { selector }
            }
            BleTransportError::ConnectionFailed(reason) => {
                TransportError::ConnectionFailed { reason }
            }
            BleTransportError::ConnectionTimeout { timeout_ms } => TransportError::Timeout {
                duration_ms: timeout_ms,
            },
            BleTransportError::ServiceDiscoveryFailed(reason) => {
                TransportError::DiscoveryFailed { reason }
            }
            err @ BleTransportError::CharacteristicNotFound { .. } => {
                TransportError::DiscoveryFailed {
                    reason: err.to_string(),
                }
            }
            BleTransportError::SubscriptionFailed(reason)
            | BleTransportError::NotificationStreamFailed(reason)
            | BleTransportError::EventStreamFailed(reason) => {
                TransportError::SubscriptionFailed { reason }
            }
            BleTransportError::WriteFailed(reason) => TransportError::WriteFailed { reason },
            BleTransportError::NotConnected => TransportError::NotConnected,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conversion_keeps_reason() {
        let err: TransportError =
            BleTransportError::SubscriptionFailed("notify refused".to_string()).into();
        assert_eq!(
            err,
            TransportError::SubscriptionFailed {
                reason: "notify refused".to_string()
            }
        );
    }

    #[test]
    fn test_missing_characteristic_is_a_discovery_failure() {
        let err: TransportError = BleTransportError::CharacteristicNotFound {
            characteristic: "notify".to_string(),
        }
        .into();
        assert!(matches!(err, TransportError::DiscoveryFailed { reason } if reason.contains("notify")));
    }
}
