//! Device-to-client messages

use serde::{Deserialize, Serialize};

use super::fields::{DecodeQuality, Fields};
use crate::types::StopEvent;

// ----------------------------------------------------------------------------
// Message Kinds
// ----------------------------------------------------------------------------

pub const KIND_HELLO: &str = "HELLO";
pub const KIND_CAL: &str = "CAL";
pub const KIND_EVENT: &str = "EV";
pub const KIND_SYNC: &str = "SYNC";
pub const SYNC_DONE: &str = "DONE";

/// Minimum field counts, including the kind field(s)
const HELLO_MIN_FIELDS: usize = 8;
const CAL_MIN_FIELDS: usize = 2;
const EVENT_MIN_FIELDS: usize = 4;
const SYNC_DONE_MIN_FIELDS: usize = 3;

// ----------------------------------------------------------------------------
// Payloads
// ----------------------------------------------------------------------------

/// Device announcement sent once after each connect
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hello {
    pub device_id: String,
    pub firmware_version: String,
    /// Whether the device clock has been set since boot
    pub clock_synced: bool,
    /// Events recorded but not yet replayed to a client
    pub unsent_count: u32,
    pub battery_mv: u32,
    /// Running stop counter for the current shift
    pub accum_stops: i64,
}

/// Calibration telemetry streamed while calibration mode is on
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Calibration {
    pub vibration_g: f64,
}

/// Body of an `EV` line, before it is attributed to a device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StopRecord {
    pub start_epoch_seconds: i64,
    pub duration_ms: i64,
    pub accum_stops: i64,
}

impl StopRecord {
    /// Attach the reporting device to produce the persisted event
    pub fn into_stop_event(self, device_id: impl Into<String>) -> StopEvent {
        StopEvent::new(
            self.start_epoch_seconds,
            self.duration_ms,
            device_id,
            Some(self.accum_stops),
        )
    }
}

// ----------------------------------------------------------------------------
// Inbound Message
// ----------------------------------------------------------------------------

/// Every message kind the client understands from the device
#[derive(Debug, Clone, PartialEq)]
pub enum InboundMessage {
    Hello(Hello),
    Calibration(Calibration),
    Stop(StopRecord),
    SyncDone { last_index: i64 },
}

impl InboundMessage {
    /// Parse one framed line
    ///
    /// Unknown kinds and lines shorter than their kind's minimum yield `None`.
    /// Malformed numeric fields decode to zero.
    pub fn parse(line: &str) -> Option<Self> {
        Self::parse_with_quality(line).map(|(message, _)| message)
    }

    /// Like [`InboundMessage::parse`], also reporting which fields fell back
    pub fn parse_with_quality(line: &str) -> Option<(Self, DecodeQuality)> {
        let mut fields = Fields::split(line);

        let message = match fields.text(0) {
            KIND_HELLO if fields.len() >= HELLO_MIN_FIELDS => {
                // field 2 is the literal "FW" marker; its value is not checked
                let hello = Hello {
                    device_id: fields.text(1).to_string(),
                    firmware_version: fields.text(3).to_string(),
                    clock_synced: fields.flag(4, "clock_synced"),
                    unsent_count: fields.int(5, "unsent_count"),
                    battery_mv: fields.int(6, "battery_mv"),
                    accum_stops: fields.int(7, "accum_stops"),
                };
                InboundMessage::Hello(hello)
            }
            KIND_CAL if fields.len() >= CAL_MIN_FIELDS => {
                InboundMessage::Calibration(Calibration {
                    vibration_g: fields.float(1, "vibration_g"),
                })
            }
            KIND_EVENT if fields.len() >= EVENT_MIN_FIELDS => InboundMessage::Stop(StopRecord {
                start_epoch_seconds: fields.int(1, "start_epoch_seconds"),
                duration_ms: fields.int(2, "duration_ms"),
                accum_stops: fields.int(3, "accum_stops"),
            }),
            KIND_SYNC if fields.text(1) == SYNC_DONE && fields.len() >= SYNC_DONE_MIN_FIELDS => {
                InboundMessage::SyncDone {
                    last_index: fields.int(2, "last_index"),
                }
            }
            _ => return None,
        };

        Some((message, fields.into_quality()))
    }

    /// Wire kind, for logging
    pub fn kind(&self) -> &'static str {
        match self {
            InboundMessage::Hello(_) => KIND_HELLO,
            InboundMessage::Calibration(_) => KIND_CAL,
            InboundMessage::Stop(_) => KIND_EVENT,
            InboundMessage::SyncDone { .. } => "SYNC,DONE",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_hello() {
        let message = InboundMessage::parse("HELLO,BS-0042,FW,1.4.2,1,12,3710,88").unwrap();
        assert_eq!(
            message,
            InboundMessage::Hello(Hello {
                device_id: "BS-0042".to_string(),
                firmware_version: "1.4.2".to_string(),
                clock_synced: true,
                unsent_count: 12,
                battery_mv: 3710,
                accum_stops: 88,
            })
        );
    }

    #[test]
    fn test_parse_event() {
        let message = InboundMessage::parse("EV,1700000000,4523,17").unwrap();
        assert_eq!(
            message,
            InboundMessage::Stop(StopRecord {
                start_epoch_seconds: 1_700_000_000,
                duration_ms: 4523,
                accum_stops: 17,
            })
        );
    }

    #[test]
    fn test_short_lines_are_dropped() {
        assert_eq!(InboundMessage::parse("EV,1700000000"), None);
        assert_eq!(InboundMessage::parse("HELLO,BS-1,FW,1.0,1,0,3700"), None);
        assert_eq!(InboundMessage::parse("CAL"), None);
        assert_eq!(InboundMessage::parse("SYNC,DONE"), None);
    }

    #[test]
    fn test_unknown_kinds_are_ignored() {
        assert_eq!(InboundMessage::parse("BATT,3700"), None);
        assert_eq!(InboundMessage::parse("SYNC,BUSY,4"), None);
        assert_eq!(InboundMessage::parse("ev,1,2,3"), None);
        assert_eq!(InboundMessage::parse(""), None);
    }

    #[test]
    fn test_extra_fields_are_tolerated() {
        let message = InboundMessage::parse("SYNC,DONE,42,extra,fields").unwrap();
        assert_eq!(message, InboundMessage::SyncDone { last_index: 42 });
    }

    #[test]
    fn test_malformed_calibration_value_is_zero() {
        let (message, quality) = InboundMessage::parse_with_quality("CAL,notanumber").unwrap();
        assert_eq!(message, InboundMessage::Calibration(Calibration { vibration_g: 0.0 }));
        assert_eq!(quality.fallback_fields(), &["vibration_g"]);
    }

    #[test]
    fn test_stop_record_into_event() {
        let record = StopRecord {
            start_epoch_seconds: 1_700_000_000,
            duration_ms: 4523,
            accum_stops: 17,
        };
        let event = record.into_stop_event("BS-0042");
        assert_eq!(event.device_id, "BS-0042");
        assert_eq!(event.accum_stops, Some(17));
    }
}
