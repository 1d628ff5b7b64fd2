//! Client-to-device commands
//!
//! Each command serialises to one comma-joined ASCII line ending in `\n`.
//! Numbers are plain decimal; Rust's float `Display` never emits exponents or
//! separators, which keeps the format byte-compatible with the firmware.

use std::fmt;

use super::fields::{DecodeQuality, Fields};
use crate::types::{BreakWindows, ScheduleWindow, Thresholds};

/// Line terminator appended to every outbound command
pub const LINE_TERMINATOR: char = '\n';

// ----------------------------------------------------------------------------
// Outbound Command
// ----------------------------------------------------------------------------

/// Every command the client can write to the device
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OutboundCommand {
    /// `TIME,UTC,<epochSeconds>,<tzOffsetMinutes>`
    Time {
        epoch_seconds: i64,
        tz_offset_minutes: i32,
    },
    /// `CFG,SCHED,<startMin>,<endMin>,<enabled>`
    Schedule(ScheduleWindow),
    /// `CFG,BREAKS,<b1Start>,<b1End>,<b2Start>,<b2End>,<enabled>`
    Breaks(BreakWindows),
    /// `CFG,THRESH,<thresholdG>,<hysteresisG>,<secondsDown>,<secondsUp>`
    Thresholds(Thresholds),
    /// `MODE,CALIB,ON|OFF`
    Calibration(bool),
    /// `SYNC,REQ`
    SyncRequest,
    /// `SYNC,ACK,<index>`
    SyncAck { index: i64 },
}

impl OutboundCommand {
    /// Wire bytes, including the trailing newline
    pub fn to_line(&self) -> String {
        let mut line = self.to_string();
        line.push(LINE_TERMINATOR);
        line
    }

    /// Parse a command line back into its typed form
    ///
    /// Uses the same lenient rules as inbound parsing. Mostly useful for
    /// device simulators and tests.
    pub fn parse(line: &str) -> Option<Self> {
        Self::parse_with_quality(line).map(|(command, _)| command)
    }

    pub fn parse_with_quality(line: &str) -> Option<(Self, DecodeQuality)> {
        let mut fields = Fields::split(line);

        let command = match (fields.text(0), fields.text(1)) {
            ("TIME", "UTC") if fields.len() >= 4 => OutboundCommand::Time {
                epoch_seconds: fields.int(2, "epoch_seconds"),
                tz_offset_minutes: fields.int(3, "tz_offset_minutes"),
            },
            ("CFG", "SCHED") if fields.len() >= 5 => OutboundCommand::Schedule(ScheduleWindow {
                start_min: fields.int(2, "start_min"),
                end_min: fields.int(3, "end_min"),
                enabled: fields.flag(4, "enabled"),
            }),
            ("CFG", "BREAKS") if fields.len() >= 7 => OutboundCommand::Breaks(BreakWindows {
                first_start_min: fields.int(2, "first_start_min"),
                first_end_min: fields.int(3, "first_end_min"),
                second_start_min: fields.int(4, "second_start_min"),
                second_end_min: fields.int(5, "second_end_min"),
                enabled: fields.flag(6, "enabled"),
            }),
            ("CFG", "THRESH") if fields.len() >= 6 => OutboundCommand::Thresholds(Thresholds {
                threshold_g: fields.float(2, "threshold_g"),
                hysteresis_g: fields.float(3, "hysteresis_g"),
                seconds_down: fields.int(4, "seconds_down"),
                seconds_up: fields.int(5, "seconds_up"),
            }),
            ("MODE", "CALIB") if fields.len() >= 3 => match fields.text(2) {
                "ON" => OutboundCommand::Calibration(true),
                "OFF" => OutboundCommand::Calibration(false),
                _ => return None,
            },
            ("SYNC", "REQ") => OutboundCommand::SyncRequest,
            ("SYNC", "ACK") if fields.len() >= 3 => OutboundCommand::SyncAck {
                index: fields.int(2, "index"),
            },
            _ => return None,
        };

        Some((command, fields.into_quality()))
    }

    /// Short name for logging
    pub fn name(&self) -> &'static str {
        match self {
            OutboundCommand::Time { .. } => "TIME",
            OutboundCommand::Schedule(_) => "CFG,SCHED",
            OutboundCommand::Breaks(_) => "CFG,BREAKS",
            OutboundCommand::Thresholds(_) => "CFG,THRESH",
            OutboundCommand::Calibration(_) => "MODE,CALIB",
            OutboundCommand::SyncRequest => "SYNC,REQ",
            OutboundCommand::SyncAck { .. } => "SYNC,ACK",
        }
    }
}

fn flag(enabled: bool) -> u8 {
    u8::from(enabled)
}

impl fmt::Display for OutboundCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutboundCommand::Time {
                epoch_seconds,
                tz_offset_minutes,
            } => write!(f, "TIME,UTC,{},{}", epoch_seconds, tz_offset_minutes),
            OutboundCommand::Schedule(s) => write!(
                f,
                "CFG,SCHED,{},{},{}",
                s.start_min,
                s.end_min,
                flag(s.enabled)
            ),
            OutboundCommand::Breaks(b) => write!(
                f,
                "CFG,BREAKS,{},{},{},{},{}",
                b.first_start_min,
                b.first_end_min,
                b.second_start_min,
                b.second_end_min,
                flag(b.enabled)
            ),
            OutboundCommand::Thresholds(t) => write!(
                f,
                "CFG,THRESH,{},{},{},{}",
                t.threshold_g, t.hysteresis_g, t.seconds_down, t.seconds_up
            ),
            OutboundCommand::Calibration(on) => {
                write!(f, "MODE,CALIB,{}", if *on { "ON" } else { "OFF" })
            }
            OutboundCommand::SyncRequest => write!(f, "SYNC,REQ"),
            OutboundCommand::SyncAck { index } => write!(f, "SYNC,ACK,{}", index),
        }
    }
}
