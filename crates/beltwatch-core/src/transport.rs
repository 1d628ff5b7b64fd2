//! Device transport interface
//!
//! The core only needs four things from the link: connect, disconnect, write
//! bytes, and a feed of inbound bytes. Inbound data and link loss are pushed
//! as [`TransportEvent`]s on the channel handed to the transport when it is
//! built, so the runtime sees them in the same queue as everything else.

use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;

use crate::channel::{TransportEvent, TransportEventSender};
use crate::errors::TransportError;
use crate::types::{DeviceHandle, DeviceSelector};

// ----------------------------------------------------------------------------
// Transport Trait
// ----------------------------------------------------------------------------

/// Byte-stream link to one device at a time
#[async_trait]
pub trait DeviceTransport: Send {
    /// Find, connect to and subscribe to the selected device
    ///
    /// Any failure along the way aborts the attempt and leaves the transport
    /// disconnected.
    async fn connect(&mut self, selector: &DeviceSelector) -> Result<DeviceHandle, TransportError>;

    /// Close the link and release its handles; a no-op when already closed
    async fn disconnect(&mut self) -> Result<(), TransportError>;

    /// Write bytes to the device; no acknowledgement is awaited
    async fn send(&mut self, data: &[u8]) -> Result<(), TransportError>;

    fn is_connected(&self) -> bool;
}

// ----------------------------------------------------------------------------
// Mock Transport
// ----------------------------------------------------------------------------

#[derive(Debug, Default)]
struct MockTransportInner {
    connected: bool,
    connect_attempts: Vec<DeviceSelector>,
    sent: Vec<Vec<u8>>,
    fail_next_connect: Option<String>,
    fail_next_send: Option<String>,
}

/// Scriptable transport that records writes and injects inbound data
///
/// Clones share state, so a test can keep one handle while the runtime owns
/// another.
#[derive(Debug, Clone)]
pub struct MockTransport {
    inner: Arc<Mutex<MockTransportInner>>,
    events: TransportEventSender,
}

impl MockTransport {
    pub fn new(events: TransportEventSender) -> Self {
        Self {
            inner: Arc::new(Mutex::new(MockTransportInner::default())),
            events,
        }
    }

    /// Deliver a notification chunk as if the device had sent it
    pub fn inject(&self, chunk: &[u8]) {
        let _ = self.events.send(TransportEvent::Data(chunk.to_vec()));
    }

    /// Simulate link loss
    pub fn drop_link(&self, reason: &str) {
        self.lock().connected = false;
        let _ = self.events.send(TransportEvent::Disconnected {
            reason: reason.to_string(),
        });
    }

    /// Everything written so far, decoded as text
    pub fn sent_lines(&self) -> Vec<String> {
        self.lock()
            .sent
            .iter()
            .map(|bytes| String::from_utf8_lossy(bytes).into_owned())
            .collect()
    }

    pub fn connect_attempts(&self) -> Vec<DeviceSelector> {
        self.lock().connect_attempts.clone()
    }

    pub fn fail_next_connect(&self, reason: &str) {
        self.lock().fail_next_connect = Some(reason.to_string());
    }

    pub fn fail_next_send(&self, reason: &str) {
        self.lock().fail_next_send = Some(reason.to_string());
    }

    fn lock(&self) -> MutexGuard<'_, MockTransportInner> {
        // a panic while holding the lock already failed the test
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl DeviceTransport for MockTransport {
    async fn connect(&mut self, selector: &DeviceSelector) -> Result<DeviceHandle, TransportError> {
        let mut inner = self.lock();
        inner.connect_attempts.push(selector.clone());

        if let Some(reason) = inner.fail_next_connect.take() {
            return Err(TransportError::ConnectionFailed { reason });
        }

        inner.connected = true;
        Ok(DeviceHandle {
            address: "00:00:00:00:00:01".to_string(),
            name: Some("BeltStop-mock".to_string()),
        })
    }

    async fn disconnect(&mut self) -> Result<(), TransportError> {
        self.lock().connected = false;
        Ok(())
    }

    async fn send(&mut self, data: &[u8]) -> Result<(), TransportError> {
        let mut inner = self.lock();
        if !inner.connected {
            return Err(TransportError::NotConnected);
        }
        if let Some(reason) = inner.fail_next_send.take() {
            return Err(TransportError::WriteFailed { reason });
        }
        inner.sent.push(data.to_vec());
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.lock().connected
    }
}
