//! [`DeviceTransport`] implementation over btleplug

use async_trait::async_trait;
use beltwatch_core::channel::TransportEventSender;
use beltwatch_core::{DeviceHandle, DeviceSelector, DeviceTransport, TransportError};
use tracing::{debug, info};

use crate::config::BleTransportConfig;
use crate::connection::BleConnection;
use crate::device::DiscoveredDevice;
use crate::discovery::BleDiscovery;
use crate::error::{BleTransportError, Result};

// ----------------------------------------------------------------------------
// BLE Transport
// ----------------------------------------------------------------------------

/// Single-device BLE link to a belt-stop sensor
///
/// Inbound notification bytes and link loss are pushed onto the event channel
/// given to [`BleTransport::new`].
pub struct BleTransport {
    config: BleTransportConfig,
    discovery: BleDiscovery,
    connection: Option<BleConnection>,
    events: TransportEventSender,
}

impl BleTransport {
    pub fn new(config: BleTransportConfig, events: TransportEventSender) -> Self {
        Self {
            discovery: BleDiscovery::new(config.clone()),
            config,
            connection: None,
            events,
        }
    }

    /// List nearby sensors without connecting
    pub async fn scan(&mut self) -> Result<Vec<DiscoveredDevice>> {
        self.discovery.scan().await
    }

    async fn open(&mut self, selector: &DeviceSelector) -> Result<DeviceHandle> {
        let (peripheral, device) = self.discovery.find(selector).await?;
        let adapter = self.discovery.adapter()?;
        let connection =
            BleConnection::establish(adapter, peripheral, device, &self.config, self.events.clone())
                .await?;

        let handle = connection.device().to_handle();
        self.connection = Some(connection);
        Ok(handle)
    }
}

#[async_trait]
impl DeviceTransport for BleTransport {
    async fn connect(&mut self, selector: &DeviceSelector) -> std::result::Result<DeviceHandle, TransportError> {
        // one device at a time: a new attempt replaces any previous link
        if let Some(mut previous) = self.connection.take() {
            debug!("Closing previous link before reconnecting");
            previous.close().await;
        }

        info!("Looking for sensor by {}", selector);
        Ok(self.open(selector).await?)
    }

    async fn disconnect(&mut self) -> std::result::Result<(), TransportError> {
        if let Some(mut connection) = self.connection.take() {
            connection.close().await;
        }
        Ok(())
    }

    async fn send(&mut self, data: &[u8]) -> std::result::Result<(), TransportError> {
        let connection = self
            .connection
            .as_ref()
            .ok_or(BleTransportError::NotConnected)?;
        Ok(connection.write(data).await?)
    }

    fn is_connected(&self) -> bool {
        self.connection.as_ref().is_some_and(BleConnection::is_up)
    }
}
