//! Message types and channels connecting the transport, the session and the UI
//!
//! Transport callbacks and user actions never touch session state directly.
//! They enqueue [`TransportEvent`]s and [`Command`]s that a single runtime task
//! drains in order; the session answers with [`Effect`]s the runtime executes
//! one at a time.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::protocol::{Calibration, Hello, OutboundCommand};
use crate::session::SessionStatus;
use crate::types::{BreakWindows, DeviceHandle, DeviceSelector, EventId, ScheduleWindow, StopEvent, Thresholds};

// ----------------------------------------------------------------------------
// Commands (UI -> runtime)
// ----------------------------------------------------------------------------

/// User-triggered actions
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Connect(DeviceSelector),
    Disconnect,
    SendTime,
    SendSchedule(ScheduleWindow),
    SendBreaks(BreakWindows),
    SendThresholds(Thresholds),
    SetCalibration(bool),
    RequestSync,
    /// Change the UTC offset used by later time pushes; allowed while disconnected
    SetTzOffset(i32),
    QueryStatus,
    Shutdown,
}

impl Command {
    /// Short name for logs and failure reports
    pub fn name(&self) -> &'static str {
        match self {
            Command::Connect(_) => "connect",
            Command::Disconnect => "disconnect",
            Command::SendTime => "send time",
            Command::SendSchedule(_) => "send schedule",
            Command::SendBreaks(_) => "send breaks",
            Command::SendThresholds(_) => "send thresholds",
            Command::SetCalibration(_) => "calibration mode",
            Command::RequestSync => "sync request",
            Command::SetTzOffset(_) => "set utc offset",
            Command::QueryStatus => "status",
            Command::Shutdown => "shutdown",
        }
    }
}

// ----------------------------------------------------------------------------
// Transport Events (transport -> runtime)
// ----------------------------------------------------------------------------

/// What the transport reports after a successful connect
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// Raw notification payload
    Data(Vec<u8>),
    /// Link lost or closed by the device
    Disconnected { reason: String },
}

// ----------------------------------------------------------------------------
// Effects (session -> runtime)
// ----------------------------------------------------------------------------

/// Work the session asks the runtime to perform, in order
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Write one command to the device (fire-and-forget)
    Send(OutboundCommand),
    /// Append a decoded stop event to the store
    StoreEvent(StopEvent),
    /// Persist a setting value (JSON encoded)
    PersistSetting { key: String, value: String },
    /// Tell the UI something happened
    Notify(AppEvent),
}

// ----------------------------------------------------------------------------
// App Events (runtime -> UI)
// ----------------------------------------------------------------------------

/// Observable session activity for the operator
#[derive(Debug, Clone, PartialEq)]
pub enum AppEvent {
    Connecting { selector: DeviceSelector },
    Connected(DeviceHandle),
    ConnectFailed { reason: String },
    Disconnected { reason: String },
    Hello(Hello),
    Calibration(Calibration),
    StopRecorded { id: EventId, event: StopEvent },
    SyncRequested,
    SyncComplete { last_index: i64 },
    /// A pending sync was cut short by a disconnect
    SyncIncomplete,
    CommandSent(OutboundCommand),
    CommandFailed { command: String, reason: String },
    StorageFailed { reason: String },
    Status(Box<SessionStatus>),
}

// ----------------------------------------------------------------------------
// Channels
// ----------------------------------------------------------------------------

pub type CommandSender = mpsc::Sender<Command>;
pub type CommandReceiver = mpsc::Receiver<Command>;
pub type TransportEventSender = mpsc::UnboundedSender<TransportEvent>;
pub type TransportEventReceiver = mpsc::UnboundedReceiver<TransportEvent>;
pub type AppEventSender = mpsc::UnboundedSender<AppEvent>;
pub type AppEventReceiver = mpsc::UnboundedReceiver<AppEvent>;

/// Channel sizing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelConfig {
    pub command_buffer_size: usize,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            command_buffer_size: 32,
        }
    }
}

pub fn create_command_channel(config: &ChannelConfig) -> (CommandSender, CommandReceiver) {
    mpsc::channel(config.command_buffer_size.max(1))
}

pub fn create_transport_event_channel() -> (TransportEventSender, TransportEventReceiver) {
    mpsc::unbounded_channel()
}

pub fn create_app_event_channel() -> (AppEventSender, AppEventReceiver) {
    mpsc::unbounded_channel()
}
