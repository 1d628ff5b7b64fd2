//! Error types for the Beltwatch core
//!
//! Transport and storage failures are reported to the immediate caller and
//! logged; none of them tears the session down. Protocol parse failures are
//! not errors at all: malformed lines are dropped and malformed numeric fields
//! decode to zero (see [`crate::protocol`]).

use thiserror::Error;

// ----------------------------------------------------------------------------
// Specific Error Types
// ----------------------------------------------------------------------------

/// Failures raised by a [`crate::transport::DeviceTransport`]
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("No matching device found: {selector}")]
    DeviceNotFound { selector: String },
    #[error("Connection failed: {reason}")]
    ConnectionFailed { reason: String },
    #[error("Service discovery failed: {reason}")]
    DiscoveryFailed { reason: String },
    #[error("Failed to enable notifications: {reason}")]
    SubscriptionFailed { reason: String },
    #[error("Write failed: {reason}")]
    WriteFailed { reason: String },
    #[error("Transport not connected")]
    NotConnected,
    #[error("Transport timeout after {duration_ms}ms")]
    Timeout { duration_ms: u64 },
    #[error("Transport adapter unavailable: {reason}")]
    AdapterUnavailable { reason: String },
}

/// Failures raised by an [`crate::store::EventStore`]
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("Storage backend error: {reason}")]
    Backend { reason: String },
    #[error("Stored value for {key} is corrupt: {reason}")]
    CorruptValue { key: String, reason: String },
}

/// Session controller rejections for user-triggered actions
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("Not connected to a device")]
    NotConnected,
    #[error("Connection already {phase}")]
    AlreadyActive { phase: String },
}

// ----------------------------------------------------------------------------
// Unified Error
// ----------------------------------------------------------------------------

/// Core error type unifying the taxonomy above
#[derive(Debug, Error)]
pub enum BeltwatchError {
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Storage error: {0}")]
    Store(#[from] StoreError),

    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Channel closed: {0}")]
    ChannelClosed(String),
}

pub type Result<T> = std::result::Result<T, BeltwatchError>;
