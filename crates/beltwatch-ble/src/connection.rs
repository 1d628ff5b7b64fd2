//! Live GATT link to one sensor
//!
//! Establishing a connection walks connect, service discovery,
//! characteristic lookup and notification subscription. A failure at any
//! step disconnects whatever was opened and leaves nothing running.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use beltwatch_core::channel::{TransportEvent, TransportEventSender};
use btleplug::api::{Central, CentralEvent, Characteristic, Peripheral as _, WriteType};
use btleplug::platform::{Adapter, Peripheral};
use futures::stream::StreamExt;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::BleTransportConfig;
use crate::device::DiscoveredDevice;
use crate::error::{BleTransportError, Result};
use crate::protocol::{SENSOR_NOTIFY_CHARACTERISTIC_UUID, SENSOR_WRITE_CHARACTERISTIC_UUID};

// ----------------------------------------------------------------------------
// Connection Management
// ----------------------------------------------------------------------------

/// An open, subscribed link
pub struct BleConnection {
    peripheral: Peripheral,
    device: DiscoveredDevice,
    write_characteristic: Characteristic,
    max_write_size: usize,
    /// Cleared by whichever side notices the link going away first
    link_up: Arc<AtomicBool>,
    tasks: Vec<JoinHandle<()>>,
}

impl BleConnection {
    /// Connect, discover, subscribe and start forwarding notifications
    pub async fn establish(
        adapter: &Adapter,
        peripheral: Peripheral,
        device: DiscoveredDevice,
        config: &BleTransportConfig,
        events: TransportEventSender,
    ) -> Result<Self> {
        // subscribe to adapter events first so an early drop is not missed
        let central_events = adapter
            .events()
            .await
            .map_err(|e| BleTransportError::EventStreamFailed(e.to_string()))?;

        match timeout(config.connection_timeout, peripheral.connect()).await {
            Ok(Ok(())) => info!("Connected to {}", device),
            Ok(Err(e)) => {
                error!("Failed to connect to {}: {}", device, e);
                return Err(BleTransportError::ConnectionFailed(e.to_string()));
            }
            Err(_) => {
                error!("Connection to {} timed out", device);
                // the platform may still complete the attempt in the background
                let _ = peripheral.disconnect().await;
                return Err(BleTransportError::ConnectionTimeout {
                    timeout_ms: config.connection_timeout.as_millis() as u64,
                });
            }
        }

        let write_characteristic = match Self::prepare(&peripheral).await {
            Ok(characteristic) => characteristic,
            Err(e) => {
                error!("Setting up {} failed: {}", device, e);
                if let Err(e) = peripheral.disconnect().await {
                    warn!("Cleanup disconnect failed: {}", e);
                }
                return Err(e);
            }
        };

        let mut connection = Self {
            peripheral,
            device,
            write_characteristic,
            max_write_size: config.max_write_size.max(1),
            link_up: Arc::new(AtomicBool::new(true)),
            tasks: Vec::new(),
        };

        if let Err(e) = connection.start_notification_pump(events.clone()).await {
            connection.close().await;
            return Err(e);
        }
        connection.start_disconnect_watcher(central_events, events);
        Ok(connection)
    }

    /// Discover services, locate both characteristics and enable notifications
    async fn prepare(peripheral: &Peripheral) -> Result<Characteristic> {
        peripheral
            .discover_services()
            .await
            .map_err(|e| BleTransportError::ServiceDiscoveryFailed(e.to_string()))?;

        let write = find_characteristic(peripheral, SENSOR_WRITE_CHARACTERISTIC_UUID, "write")?;
        let notify = find_characteristic(peripheral, SENSOR_NOTIFY_CHARACTERISTIC_UUID, "notify")?;

        peripheral
            .subscribe(&notify)
            .await
            .map_err(|e| BleTransportError::SubscriptionFailed(e.to_string()))?;
        debug!("Notifications enabled on {}", notify.uuid);
        Ok(write)
    }

    async fn start_notification_pump(&mut self, events: TransportEventSender) -> Result<()> {
        let mut notifications = self
            .peripheral
            .notifications()
            .await
            .map_err(|e| BleTransportError::NotificationStreamFailed(e.to_string()))?;
        let link_up = Arc::clone(&self.link_up);
        let name = self.device.to_string();

        self.tasks.push(tokio::spawn(async move {
            while let Some(notification) = notifications.next().await {
                if notification.uuid != SENSOR_NOTIFY_CHARACTERISTIC_UUID {
                    continue;
                }
                if events.send(TransportEvent::Data(notification.value)).is_err() {
                    debug!("Transport event channel closed");
                    return;
                }
            }
            if link_up.swap(false, Ordering::SeqCst) {
                let _ = events.send(TransportEvent::Disconnected {
                    reason: "notification stream ended".to_string(),
                });
            }
            debug!("Notification pump for {} ended", name);
        }));
        Ok(())
    }

    fn start_disconnect_watcher(
        &mut self,
        mut central_events: impl futures::Stream<Item = CentralEvent> + Send + Unpin + 'static,
        events: TransportEventSender,
    ) {
        let id = self.peripheral.id();
        let link_up = Arc::clone(&self.link_up);

        self.tasks.push(tokio::spawn(async move {
            while let Some(event) = central_events.next().await {
                if let CentralEvent::DeviceDisconnected(gone) = event {
                    if gone == id {
                        if link_up.swap(false, Ordering::SeqCst) {
                            info!("Sensor disconnected");
                            let _ = events.send(TransportEvent::Disconnected {
                                reason: "device disconnected".to_string(),
                            });
                        }
                        return;
                    }
                }
            }
        }));
    }

    pub fn device(&self) -> &DiscoveredDevice {
        &self.device
    }

    pub fn is_up(&self) -> bool {
        self.link_up.load(Ordering::SeqCst)
    }

    /// Write without response, split into `max_write_size` chunks
    pub async fn write(&self, data: &[u8]) -> Result<()> {
        if !self.is_up() {
            return Err(BleTransportError::NotConnected);
        }
        for chunk in data.chunks(self.max_write_size) {
            self.peripheral
                .write(&self.write_characteristic, chunk, WriteType::WithoutResponse)
                .await
                .map_err(|e| BleTransportError::WriteFailed(e.to_string()))?;
        }
        debug!("Wrote {} bytes to {}", data.len(), self.device);
        Ok(())
    }

    /// Stop background tasks and drop the link; never reports a disconnect event
    pub async fn close(&mut self) {
        self.link_up.store(false, Ordering::SeqCst);
        for task in self.tasks.drain(..) {
            task.abort();
        }
        match self.peripheral.is_connected().await {
            Ok(false) => {}
            _ => {
                if let Err(e) = self.peripheral.disconnect().await {
                    warn!("Failed to disconnect from {}: {}", self.device, e);
                }
            }
        }
        info!("Disconnected from {}", self.device);
    }
}

impl Drop for BleConnection {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

fn find_characteristic(peripheral: &Peripheral, uuid: Uuid, role: &str) -> Result<Characteristic> {
    peripheral
        .characteristics()
        .into_iter()
        .find(|c| c.uuid == uuid)
        .ok_or_else(|| BleTransportError::CharacteristicNotFound {
            characteristic: format!("{} ({})", role, uuid),
        })
}
