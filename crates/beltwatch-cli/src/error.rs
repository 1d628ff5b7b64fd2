//! Error handling for the Beltwatch CLI

use thiserror::Error;

use crate::config::ConfigError;

#[derive(Error, Debug)]
pub enum CliError {
    #[error("Beltwatch core error: {0}")]
    Core(#[from] beltwatch_core::BeltwatchError),

    #[error("BLE error: {0}")]
    Ble(#[from] beltwatch_ble::BleTransportError),

    #[error("Storage error: {0}")]
    Storage(#[from] beltwatch_store::Error),

    #[error("Storage error: {0}")]
    StoreAccess(#[from] beltwatch_core::StoreError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Session ended: {0}")]
    SessionEnded(String),

    #[error("Runtime task failed: {0}")]
    Runtime(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for CLI operations
pub type Result<T> = std::result::Result<T, CliError>;
