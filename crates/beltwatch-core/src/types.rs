//! Domain types shared across the Beltwatch crates

use std::fmt;

use serde::{Deserialize, Serialize};

/// Minutes in one day; minute-of-day values must stay below this
pub const MINUTES_PER_DAY: u16 = 24 * 60;

// ----------------------------------------------------------------------------
// Stop Events
// ----------------------------------------------------------------------------

/// Identity assigned by the event store on append; never reused
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EventId(pub i64);

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One completed belt stop reported by the device
///
/// Created only from an `EV` line and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StopEvent {
    /// Stop start, seconds since the Unix epoch (UTC)
    pub start_epoch_seconds: i64,
    /// How long the belt stayed stopped
    pub duration_ms: i64,
    /// Device that reported the stop (from its HELLO)
    pub device_id: String,
    /// Running shift counter reported alongside the event
    pub accum_stops: Option<i64>,
}

impl StopEvent {
    pub fn new(
        start_epoch_seconds: i64,
        duration_ms: i64,
        device_id: impl Into<String>,
        accum_stops: Option<i64>,
    ) -> Self {
        Self {
            start_epoch_seconds,
            duration_ms,
            device_id: device_id.into(),
            accum_stops,
        }
    }
}

// ----------------------------------------------------------------------------
// Device Selection
// ----------------------------------------------------------------------------

/// How the transport picks the device to connect to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceSelector {
    /// First device whose advertised name starts with the prefix
    NamePrefix(String),
    /// Device with this exact address or platform identifier
    Address(String),
}

impl fmt::Display for DeviceSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceSelector::NamePrefix(prefix) => write!(f, "name prefix '{}'", prefix),
            DeviceSelector::Address(address) => write!(f, "address {}", address),
        }
    }
}

/// A live connection returned by the transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceHandle {
    /// Platform address or identifier
    pub address: String,
    /// Advertised name, when the device sent one
    pub name: Option<String>,
}

// ----------------------------------------------------------------------------
// Device Configuration
// ----------------------------------------------------------------------------

/// Minute-of-day window during which stop detection is active
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleWindow {
    pub start_min: u16,
    pub end_min: u16,
    pub enabled: bool,
}

impl Default for ScheduleWindow {
    fn default() -> Self {
        Self {
            start_min: 7 * 60,
            end_min: 17 * 60,
            enabled: true,
        }
    }
}

impl ScheduleWindow {
    /// Check minute-of-day bounds; the device rejects anything past midnight
    pub fn validate(&self) -> Result<(), String> {
        check_minute("schedule start", self.start_min)?;
        check_minute("schedule end", self.end_min)
    }
}

/// The two daily break windows during which stops are not counted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BreakWindows {
    pub first_start_min: u16,
    pub first_end_min: u16,
    pub second_start_min: u16,
    pub second_end_min: u16,
    pub enabled: bool,
}

impl Default for BreakWindows {
    fn default() -> Self {
        Self {
            first_start_min: 10 * 60,
            first_end_min: 10 * 60 + 15,
            second_start_min: 12 * 60,
            second_end_min: 12 * 60 + 30,
            enabled: true,
        }
    }
}

impl BreakWindows {
    pub fn validate(&self) -> Result<(), String> {
        check_minute("first break start", self.first_start_min)?;
        check_minute("first break end", self.first_end_min)?;
        check_minute("second break start", self.second_start_min)?;
        check_minute("second break end", self.second_end_min)
    }
}

fn check_minute(what: &str, minute: u16) -> Result<(), String> {
    if minute < MINUTES_PER_DAY {
        Ok(())
    } else {
        Err(format!("{} must be below {} minutes, got {}", what, MINUTES_PER_DAY, minute))
    }
}

/// Vibration thresholds driving the device's stop detector
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Thresholds {
    /// Vibration amplitude below which the belt counts as stopped
    pub threshold_g: f64,
    /// Band above the threshold required before the belt counts as running again
    pub hysteresis_g: f64,
    /// Seconds below threshold before a stop starts
    pub seconds_down: u32,
    /// Seconds above threshold before a stop ends
    pub seconds_up: u32,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            threshold_g: 0.05,
            hysteresis_g: 0.01,
            seconds_down: 3,
            seconds_up: 2,
        }
    }
}

impl Thresholds {
    /// Amplitudes must be finite and non-negative
    pub fn validate(&self) -> Result<(), String> {
        for (what, value) in [("threshold", self.threshold_g), ("hysteresis", self.hysteresis_g)] {
            if !value.is_finite() || value < 0.0 {
                return Err(format!("{} must be a finite, non-negative g value, got {}", what, value));
            }
        }
        Ok(())
    }
}

/// Last-sent configuration; restored from settings on startup
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ConfigSnapshot {
    pub schedule: ScheduleWindow,
    pub breaks: BreakWindows,
    pub thresholds: Thresholds,
    /// Local offset from UTC pushed with the time, in minutes
    pub tz_offset_minutes: i32,
}

// ----------------------------------------------------------------------------
// Time Source
// ----------------------------------------------------------------------------

/// Clock abstraction so session logic stays deterministic under test
pub trait TimeSource: Send + Sync {
    /// Current time in whole seconds since the Unix epoch
    fn now_epoch_seconds(&self) -> i64;
}

/// Wall-clock time source
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemTimeSource;

impl TimeSource for SystemTimeSource {
    fn now_epoch_seconds(&self) -> i64 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_secs() as i64)
            .unwrap_or_default()
    }
}

/// Time source pinned to one instant
#[derive(Debug, Clone, Copy)]
pub struct FixedTimeSource(pub i64);

impl TimeSource for FixedTimeSource {
    fn now_epoch_seconds(&self) -> i64 {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        assert!(ScheduleWindow::default().validate().is_ok());
        assert!(BreakWindows::default().validate().is_ok());
        assert!(Thresholds::default().validate().is_ok());
    }

    #[test]
    fn test_minute_past_midnight_rejected() {
        let schedule = ScheduleWindow {
            end_min: MINUTES_PER_DAY,
            ..Default::default()
        };
        assert!(schedule.validate().unwrap_err().contains("schedule end"));
    }

    #[test]
    fn test_non_finite_threshold_rejected() {
        let thresholds = Thresholds {
            hysteresis_g: f64::NAN,
            ..Default::default()
        };
        assert!(thresholds.validate().is_err());
    }
}
