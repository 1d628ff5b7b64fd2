//! Discovered sensor descriptions

use std::fmt;

use beltwatch_core::DeviceHandle;
use btleplug::api::{Peripheral as _, PeripheralProperties};
use btleplug::platform::Peripheral;

// ----------------------------------------------------------------------------
// Discovered Device
// ----------------------------------------------------------------------------

/// A peripheral seen during a scan
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredDevice {
    /// MAC address as reported by the adapter (zeroed on some platforms)
    pub address: String,
    /// Platform-specific identifier
    pub platform_id: String,
    pub name: Option<String>,
    /// Signal strength in dBm, when advertised
    pub rssi: Option<i16>,
}

impl DiscoveredDevice {
    /// Snapshot a peripheral's identity and advertised properties
    pub async fn describe(peripheral: &Peripheral) -> Self {
        let properties = peripheral.properties().await.ok().flatten();
        Self::from_parts(
            peripheral.address().to_string(),
            peripheral.id().to_string(),
            properties.as_ref(),
        )
    }

    pub fn from_parts(
        address: String,
        platform_id: String,
        properties: Option<&PeripheralProperties>,
    ) -> Self {
        Self {
            address,
            platform_id,
            name: properties.and_then(|p| p.local_name.clone()),
            rssi: properties.and_then(|p| p.rssi),
        }
    }

    pub fn to_handle(&self) -> DeviceHandle {
        DeviceHandle {
            address: self.address.clone(),
            name: self.name.clone(),
        }
    }
}

impl fmt::Display for DiscoveredDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name.as_deref().unwrap_or("<unnamed>"))?;
        write!(f, " [{}]", self.address)?;
        if let Some(rssi) = self.rssi {
            write!(f, " {} dBm", rssi)?;
        }
        Ok(())
    }
}
