//! Session controller
//!
//! Owns the connection lifecycle and every piece of per-connection state
//! (framer buffer, last HELLO, sync cursor). The controller never performs
//! I/O itself: each transition returns the [`Effect`]s the runtime must carry
//! out, in order.
//!
//! ```text
//! Disconnected --begin_connect--> Connecting --connected--> Connected
//!      ^                              |                         |
//!      +-------- connect_failed ------+------ disconnected -----+
//! ```
//!
//! The device opens the handshake: nothing is written after connecting until
//! its HELLO arrives. The HELLO answer is time, schedule, breaks and
//! (optionally) thresholds, in that order, because the device needs the clock
//! before it can interpret minute-of-day windows.

use std::fmt;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::channel::{AppEvent, Effect};
use crate::errors::SessionError;
use crate::framer::LineFramer;
use crate::protocol::{Calibration, Hello, InboundMessage, OutboundCommand};
use crate::store::keys;
use crate::types::{
    BreakWindows, ConfigSnapshot, DeviceHandle, ScheduleWindow, StopEvent, Thresholds, TimeSource,
};

/// `last_sync_acked_index` before any sync has completed
pub const NO_SYNC_INDEX: i64 = -1;

// ----------------------------------------------------------------------------
// Session State
// ----------------------------------------------------------------------------

/// Connection lifecycle phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ConnectionPhase {
    Disconnected,
    Connecting,
    Connected,
}

impl fmt::Display for ConnectionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionPhase::Disconnected => "disconnected",
            ConnectionPhase::Connecting => "connecting",
            ConnectionPhase::Connected => "connected",
        };
        f.write_str(name)
    }
}

/// Lifecycle phase plus the sync cursor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SessionState {
    pub phase: ConnectionPhase,
    /// Index acknowledged by the last `SYNC,ACK`, or [`NO_SYNC_INDEX`]
    pub last_sync_acked_index: i64,
}

impl Default for SessionState {
    fn default() -> Self {
        Self {
            phase: ConnectionPhase::Disconnected,
            last_sync_acked_index: NO_SYNC_INDEX,
        }
    }
}

/// Progress of the client-requested backlog replay
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SyncStatus {
    Idle,
    /// `SYNC,REQ` sent; waits for `SYNC,DONE` with no timeout
    Pending,
    Complete { last_index: i64 },
    /// Link dropped while a sync was pending
    Incomplete,
}

/// Session behaviour switches
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionOptions {
    /// Include the threshold push in the HELLO handshake
    pub auto_push_thresholds: bool,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            auto_push_thresholds: true,
        }
    }
}

/// Read-only snapshot for status displays
#[derive(Debug, Clone, PartialEq)]
pub struct SessionStatus {
    pub state: SessionState,
    pub device: Option<DeviceHandle>,
    pub last_hello: Option<Hello>,
    pub last_stop: Option<StopEvent>,
    pub shift_total: Option<i64>,
    pub calibration: Option<Calibration>,
    pub sync: SyncStatus,
    pub config: ConfigSnapshot,
}

// ----------------------------------------------------------------------------
// Session Controller
// ----------------------------------------------------------------------------

/// One device session with an explicit create/teardown lifecycle
pub struct Session {
    state: SessionState,
    options: SessionOptions,
    config: ConfigSnapshot,
    framer: LineFramer,
    time_source: Box<dyn TimeSource>,
    device: Option<DeviceHandle>,
    last_hello: Option<Hello>,
    last_stop: Option<StopEvent>,
    shift_total: Option<i64>,
    calibration: Option<Calibration>,
    sync: SyncStatus,
}

impl Session {
    /// Create a disconnected session
    pub fn new(
        config: ConfigSnapshot,
        options: SessionOptions,
        time_source: Box<dyn TimeSource>,
    ) -> Self {
        Self {
            state: SessionState::default(),
            options,
            config,
            framer: LineFramer::new(),
            time_source,
            device: None,
            last_hello: None,
            last_stop: None,
            shift_total: None,
            calibration: None,
            sync: SyncStatus::Idle,
        }
    }

    /// Restore the sync cursor persisted by an earlier run
    pub fn with_last_sync_index(mut self, index: i64) -> Self {
        self.state.last_sync_acked_index = index;
        self
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn phase(&self) -> ConnectionPhase {
        self.state.phase
    }

    pub fn is_connected(&self) -> bool {
        self.state.phase == ConnectionPhase::Connected
    }

    pub fn config(&self) -> &ConfigSnapshot {
        &self.config
    }

    pub fn last_hello(&self) -> Option<&Hello> {
        self.last_hello.as_ref()
    }

    pub fn last_stop(&self) -> Option<&StopEvent> {
        self.last_stop.as_ref()
    }

    pub fn shift_total(&self) -> Option<i64> {
        self.shift_total
    }

    pub fn sync_status(&self) -> SyncStatus {
        self.sync
    }

    pub fn status(&self) -> SessionStatus {
        SessionStatus {
            state: self.state,
            device: self.device.clone(),
            last_hello: self.last_hello.clone(),
            last_stop: self.last_stop.clone(),
            shift_total: self.shift_total,
            calibration: self.calibration,
            sync: self.sync,
            config: self.config,
        }
    }

    // ------------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------------

    /// Disconnected -> Connecting
    pub fn begin_connect(&mut self) -> Result<(), SessionError> {
        if self.state.phase != ConnectionPhase::Disconnected {
            return Err(SessionError::AlreadyActive {
                phase: self.state.phase.to_string(),
            });
        }
        self.state.phase = ConnectionPhase::Connecting;
        Ok(())
    }

    /// Transport is up and notifications are enabled
    pub fn connected(&mut self, device: DeviceHandle) -> Vec<Effect> {
        info!("Connected to {}", device.address);
        self.state.phase = ConnectionPhase::Connected;
        self.framer.clear();
        self.last_hello = None;
        self.calibration = None;
        self.sync = SyncStatus::Idle;
        self.device = Some(device.clone());
        vec![Effect::Notify(AppEvent::Connected(device))]
    }

    /// The connect attempt failed somewhere between scan and subscribe
    pub fn connect_failed(&mut self, reason: impl Into<String>) -> Vec<Effect> {
        let reason = reason.into();
        warn!("Connect attempt failed: {}", reason);
        self.state.phase = ConnectionPhase::Disconnected;
        self.device = None;
        vec![Effect::Notify(AppEvent::ConnectFailed { reason })]
    }

    /// Link closed by the user or lost; no reconnect is attempted
    pub fn disconnected(&mut self, reason: impl Into<String>) -> Vec<Effect> {
        if self.state.phase == ConnectionPhase::Disconnected {
            return Vec::new();
        }

        let reason = reason.into();
        info!("Disconnected: {}", reason);
        self.state.phase = ConnectionPhase::Disconnected;
        self.framer.clear();
        self.device = None;

        let mut effects = Vec::new();
        if self.sync == SyncStatus::Pending {
            self.sync = SyncStatus::Incomplete;
            effects.push(Effect::Notify(AppEvent::SyncIncomplete));
        }
        effects.push(Effect::Notify(AppEvent::Disconnected { reason }));
        effects
    }

    // ------------------------------------------------------------------------
    // Inbound
    // ------------------------------------------------------------------------

    /// Frame a notification chunk and dispatch every completed line in order
    pub fn on_data(&mut self, chunk: &[u8]) -> Vec<Effect> {
        if !self.is_connected() {
            debug!("Dropping {} bytes received while {}", chunk.len(), self.state.phase);
            return Vec::new();
        }

        let lines: Vec<String> = self.framer.feed(chunk).collect();
        lines
            .iter()
            .flat_map(|line| self.handle_line(line))
            .collect()
    }

    /// Dispatch one already-framed line
    pub fn handle_line(&mut self, line: &str) -> Vec<Effect> {
        let Some((message, quality)) = InboundMessage::parse_with_quality(line) else {
            debug!("Ignoring line: {}", line);
            return Vec::new();
        };

        if !quality.is_clean() {
            warn!(
                "{} line had malformed fields {:?}, decoded as 0: {}",
                message.kind(),
                quality.fallback_fields(),
                line
            );
        }

        match message {
            InboundMessage::Hello(hello) => self.on_hello(hello),
            InboundMessage::Stop(record) => {
                let device_id = self
                    .last_hello
                    .as_ref()
                    .map(|h| h.device_id.clone())
                    .unwrap_or_default();
                let event = record.into_stop_event(device_id);
                self.shift_total = event.accum_stops;
                self.last_stop = Some(event.clone());
                debug!(
                    "Stop at {} lasting {}ms",
                    event.start_epoch_seconds, event.duration_ms
                );
                vec![Effect::StoreEvent(event)]
            }
            InboundMessage::Calibration(calibration) => {
                self.calibration = Some(calibration);
                vec![Effect::Notify(AppEvent::Calibration(calibration))]
            }
            InboundMessage::SyncDone { last_index } => self.on_sync_done(last_index),
        }
    }

    fn on_hello(&mut self, hello: Hello) -> Vec<Effect> {
        info!(
            "HELLO from {} fw {} (battery {}mV, {} unsent, {} stops this shift)",
            hello.device_id,
            hello.firmware_version,
            hello.battery_mv,
            hello.unsent_count,
            hello.accum_stops
        );
        self.shift_total = Some(hello.accum_stops);
        self.last_hello = Some(hello.clone());

        let mut effects = vec![
            Effect::Notify(AppEvent::Hello(hello)),
            Effect::Send(self.time_command()),
            Effect::Send(OutboundCommand::Schedule(self.config.schedule)),
            Effect::Send(OutboundCommand::Breaks(self.config.breaks)),
        ];
        if self.options.auto_push_thresholds {
            effects.push(Effect::Send(OutboundCommand::Thresholds(
                self.config.thresholds,
            )));
        }
        effects
    }

    fn on_sync_done(&mut self, last_index: i64) -> Vec<Effect> {
        info!("Sync done, acknowledging index {}", last_index);
        self.state.last_sync_acked_index = last_index;
        self.sync = SyncStatus::Complete { last_index };
        vec![
            Effect::Send(OutboundCommand::SyncAck { index: last_index }),
            Effect::PersistSetting {
                key: keys::LAST_SYNC_INDEX.to_string(),
                value: last_index.to_string(),
            },
            Effect::Notify(AppEvent::SyncComplete { last_index }),
        ]
    }

    // ------------------------------------------------------------------------
    // User Actions
    // ------------------------------------------------------------------------

    /// Push the current time and offset only
    pub fn send_time_only(&mut self) -> Result<Vec<Effect>, SessionError> {
        self.ensure_connected()?;
        Ok(vec![Effect::Send(self.time_command())])
    }

    pub fn send_schedule(&mut self, schedule: ScheduleWindow) -> Result<Vec<Effect>, SessionError> {
        self.ensure_connected()?;
        self.config.schedule = schedule;
        Ok(vec![
            persist(keys::SCHEDULE, &schedule),
            Effect::Send(OutboundCommand::Schedule(schedule)),
        ])
    }

    pub fn send_breaks(&mut self, breaks: BreakWindows) -> Result<Vec<Effect>, SessionError> {
        self.ensure_connected()?;
        self.config.breaks = breaks;
        Ok(vec![
            persist(keys::BREAKS, &breaks),
            Effect::Send(OutboundCommand::Breaks(breaks)),
        ])
    }

    pub fn send_thresholds(&mut self, thresholds: Thresholds) -> Result<Vec<Effect>, SessionError> {
        self.ensure_connected()?;
        self.config.thresholds = thresholds;
        Ok(vec![
            persist(keys::THRESHOLDS, &thresholds),
            Effect::Send(OutboundCommand::Thresholds(thresholds)),
        ])
    }

    /// Toggle the device's calibration telemetry stream
    pub fn set_calibration(&mut self, on: bool) -> Result<Vec<Effect>, SessionError> {
        self.ensure_connected()?;
        if !on {
            self.calibration = None;
        }
        Ok(vec![Effect::Send(OutboundCommand::Calibration(on))])
    }

    /// Ask the device to replay its backlog; completes on `SYNC,DONE`
    pub fn request_sync(&mut self) -> Result<Vec<Effect>, SessionError> {
        self.ensure_connected()?;
        self.sync = SyncStatus::Pending;
        Ok(vec![
            Effect::Notify(AppEvent::SyncRequested),
            Effect::Send(OutboundCommand::SyncRequest),
        ])
    }

    /// A write the runtime attempted did not reach the device
    ///
    /// Only a lost `SYNC,REQ` changes state: the device was never asked, so
    /// no `SYNC,DONE` will come and the pending sync is over.
    pub fn command_failed(&mut self, command: &OutboundCommand) -> Vec<Effect> {
        match command {
            OutboundCommand::SyncRequest if self.sync == SyncStatus::Pending => {
                warn!("Sync request was not delivered");
                self.sync = SyncStatus::Incomplete;
                vec![Effect::Notify(AppEvent::SyncIncomplete)]
            }
            _ => Vec::new(),
        }
    }

    /// Change the offset used by future time pushes
    pub fn set_tz_offset_minutes(&mut self, minutes: i32) -> Vec<Effect> {
        self.config.tz_offset_minutes = minutes;
        vec![Effect::PersistSetting {
            key: keys::TZ_OFFSET_MINUTES.to_string(),
            value: minutes.to_string(),
        }]
    }

    fn ensure_connected(&self) -> Result<(), SessionError> {
        if self.is_connected() {
            Ok(())
        } else {
            Err(SessionError::NotConnected)
        }
    }

    fn time_command(&self) -> OutboundCommand {
        OutboundCommand::Time {
            epoch_seconds: self.time_source.now_epoch_seconds(),
            tz_offset_minutes: self.config.tz_offset_minutes,
        }
    }
}

fn persist<T: Serialize>(key: &str, value: &T) -> Effect {
    Effect::PersistSetting {
        key: key.to_string(),
        // plain structs of numbers and bools always serialise
        value: serde_json::to_string(value).unwrap_or_default(),
    }
}
