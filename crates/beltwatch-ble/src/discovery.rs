//! BLE adapter setup and sensor scanning

use std::time::Duration;

use beltwatch_core::DeviceSelector;
use btleplug::api::{Central, Manager as _, ScanFilter};
use btleplug::platform::{Adapter, Manager, Peripheral};
use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};

use crate::config::BleTransportConfig;
use crate::device::DiscoveredDevice;
use crate::error::{BleTransportError, Result};
use crate::protocol::{is_sensor_name, matches_selector, SENSOR_SERVICE_UUID};

/// How often the peripheral list is re-read while waiting for a device
const POLL_INTERVAL: Duration = Duration::from_millis(250);

// ----------------------------------------------------------------------------
// Discovery Implementation
// ----------------------------------------------------------------------------

/// Handles adapter initialisation and scanning
pub struct BleDiscovery {
    config: BleTransportConfig,
    adapter: Option<Adapter>,
}

impl BleDiscovery {
    pub fn new(config: BleTransportConfig) -> Self {
        Self {
            config,
            adapter: None,
        }
    }

    /// Initialise the first BLE adapter once; later calls reuse it
    pub async fn initialize_adapter(&mut self) -> Result<&Adapter> {
        if self.adapter.is_none() {
            let manager = Manager::new().await.map_err(|e| {
                BleTransportError::AdapterNotAvailable(format!("failed to create manager: {}", e))
            })?;
            let adapter = manager
                .adapters()
                .await
                .map_err(|e| BleTransportError::AdapterNotAvailable(e.to_string()))?
                .into_iter()
                .next()
                .ok_or_else(|| {
                    BleTransportError::AdapterNotAvailable("no BLE adapters present".to_string())
                })?;
            info!("BLE adapter initialized");
            self.adapter = Some(adapter);
        }
        self.adapter()
    }

    pub fn adapter(&self) -> Result<&Adapter> {
        self.adapter.as_ref().ok_or_else(|| {
            BleTransportError::AdapterNotAvailable("adapter not initialized".to_string())
        })
    }

    async fn start_scanning(&self) -> Result<()> {
        let filter = ScanFilter {
            services: vec![SENSOR_SERVICE_UUID],
        };
        self.adapter()?
            .start_scan(filter)
            .await
            .map_err(|e| BleTransportError::ScanFailed(e.to_string()))?;
        debug!("Started BLE scan");
        Ok(())
    }

    async fn stop_scanning(&self) {
        if let Some(adapter) = &self.adapter {
            if let Err(e) = adapter.stop_scan().await {
                warn!("Failed to stop BLE scan: {}", e);
            }
        }
    }

    async fn peripherals(&self) -> Result<Vec<Peripheral>> {
        self.adapter()?
            .peripherals()
            .await
            .map_err(|e| BleTransportError::ScanFailed(e.to_string()))
    }

    /// Scan for the configured timeout and list every sensor seen
    pub async fn scan(&mut self) -> Result<Vec<DiscoveredDevice>> {
        self.initialize_adapter().await?;
        self.start_scanning().await?;
        sleep(self.config.scan_timeout).await;

        let result = self.peripherals().await;
        self.stop_scanning().await;

        let mut devices = Vec::new();
        for peripheral in result? {
            let device = DiscoveredDevice::describe(&peripheral).await;
            let is_sensor = device
                .name
                .as_deref()
                .is_some_and(|name| is_sensor_name(name, &self.config.device_name_prefix));
            if is_sensor {
                devices.push(device);
            }
        }
        info!("Scan found {} sensor(s)", devices.len());
        Ok(devices)
    }

    /// Scan until a peripheral matches `selector` or the scan timeout passes
    pub async fn find(
        &mut self,
        selector: &DeviceSelector,
    ) -> Result<(Peripheral, DiscoveredDevice)> {
        self.initialize_adapter().await?;
        self.start_scanning().await?;
        let found = self.poll_for(selector).await;
        self.stop_scanning().await;
        found
    }

    async fn poll_for(&self, selector: &DeviceSelector) -> Result<(Peripheral, DiscoveredDevice)> {
        let deadline = Instant::now() + self.config.scan_timeout;
        loop {
            for peripheral in self.peripherals().await? {
                let device = DiscoveredDevice::describe(&peripheral).await;
                if matches_selector(
                    selector,
                    device.name.as_deref(),
                    &device.address,
                    &device.platform_id,
                ) {
                    info!("Found sensor {}", device);
                    return Ok((peripheral, device));
                }
            }

            if Instant::now() >= deadline {
                return Err(BleTransportError::DeviceNotFound {
                    selector: selector.to_string(),
                    timeout_ms: self.config.scan_timeout.as_millis() as u64,
                });
            }
            sleep(POLL_INTERVAL).await;
        }
    }
}
