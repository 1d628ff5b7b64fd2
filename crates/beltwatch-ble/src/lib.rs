//! Bluetooth Low Energy transport for Beltwatch
//!
//! Implements [`beltwatch_core::DeviceTransport`] on top of btleplug for the
//! belt-stop sensor's UART-style GATT service: one characteristic the client
//! writes command lines to, one the sensor notifies protocol lines on.
//!
//! ## Modules
//!
//! - [`config`] - scan/connect timeouts, name prefix and write chunk size
//! - [`error`] - BLE errors and their mapping onto core transport errors
//! - [`protocol`] - service and characteristic UUIDs, device matching
//! - `discovery` - adapter setup and scanning
//! - `connection` - connect, subscribe, notification pump, chunked writes
//! - [`transport`] - the `DeviceTransport` implementation
//!
//! ## Usage
//!
//! ```rust,no_run
//! use beltwatch_ble::{BleTransport, BleTransportConfig};
//! use beltwatch_core::channel::create_transport_event_channel;
//! use beltwatch_core::{DeviceSelector, DeviceTransport};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let (events_tx, mut events_rx) = create_transport_event_channel();
//! let config = BleTransportConfig::new().with_device_name_prefix("BeltStop");
//! let mut transport = BleTransport::new(config, events_tx);
//!
//! let handle = transport
//!     .connect(&DeviceSelector::NamePrefix("BeltStop".to_string()))
//!     .await?;
//! println!("connected to {}", handle.address);
//!
//! while let Some(event) = events_rx.recv().await {
//!     println!("{:?}", event);
//! }
//! # Ok(())
//! # }
//! ```

pub mod config;
mod connection;
pub mod device;
mod discovery;
pub mod error;
pub mod protocol;
pub mod transport;

pub use config::BleTransportConfig;
pub use device::DiscoveredDevice;
pub use error::BleTransportError;
pub use protocol::{
    SENSOR_NOTIFY_CHARACTERISTIC_UUID, SENSOR_SERVICE_UUID, SENSOR_WRITE_CHARACTERISTIC_UUID,
};
pub use transport::BleTransport;
