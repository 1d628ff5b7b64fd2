//! CSV export of stored stop events
//!
//! Ranges are calendar days or months in the operator's local time, given as
//! a fixed UTC offset in minutes, and resolve to inclusive epoch bounds that
//! feed straight into a range query.

use std::fmt::Write as _;
use std::io::Write;

use beltwatch_core::StopEvent;
use chrono::{DateTime, Datelike, FixedOffset, NaiveDate, SecondsFormat};

use crate::{Error, Result};

pub const CSV_HEADER: &str = "date,start_iso8601,duration_ms,duration_hms,device_id,accum_stops";

// ----------------------------------------------------------------------------
// Export Range
// ----------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportRange {
    Day(NaiveDate),
    Month { year: i32, month: u32 },
    All,
}

impl ExportRange {
    /// Parse `YYYY-MM-DD`
    pub fn parse_day(text: &str) -> Result<Self> {
        NaiveDate::parse_from_str(text.trim(), "%Y-%m-%d")
            .map(ExportRange::Day)
            .map_err(|e| Error::InvalidRange(format!("bad day {:?}: {}", text, e)))
    }

    /// Parse `YYYY-MM`
    pub fn parse_month(text: &str) -> Result<Self> {
        let invalid = || Error::InvalidRange(format!("bad month {:?}, expected YYYY-MM", text));
        let (year, month) = text.trim().split_once('-').ok_or_else(invalid)?;
        let year: i32 = year.parse().map_err(|_| invalid())?;
        let month: u32 = month.parse().map_err(|_| invalid())?;
        NaiveDate::from_ymd_opt(year, month, 1).ok_or_else(invalid)?;
        Ok(ExportRange::Month { year, month })
    }

    /// Inclusive `[from, to]` epoch-second bounds for this range
    pub fn bounds(&self, tz_offset_minutes: i32) -> Result<(i64, i64)> {
        let (first, next) = match *self {
            ExportRange::All => return Ok((i64::MIN, i64::MAX)),
            ExportRange::Day(day) => {
                let next = day
                    .succ_opt()
                    .ok_or_else(|| Error::InvalidRange(format!("no day after {}", day)))?;
                (day, next)
            }
            ExportRange::Month { year, month } => {
                let invalid = || Error::InvalidRange(format!("bad month {}-{:02}", year, month));
                let first = NaiveDate::from_ymd_opt(year, month, 1).ok_or_else(invalid)?;
                let next = if month == 12 {
                    NaiveDate::from_ymd_opt(year + 1, 1, 1)
                } else {
                    NaiveDate::from_ymd_opt(year, month + 1, 1)
                }
                .ok_or_else(invalid)?;
                (first, next)
            }
        };

        let offset_seconds = i64::from(offset(tz_offset_minutes)?.local_minus_utc());
        let start = local_midnight_epoch(first) - offset_seconds;
        let end = local_midnight_epoch(next) - offset_seconds - 1;
        Ok((start, end))
    }
}

fn local_midnight_epoch(day: NaiveDate) -> i64 {
    day.and_hms_opt(0, 0, 0)
        .map(|midnight| midnight.and_utc().timestamp())
        .unwrap_or_default()
}

fn offset(tz_offset_minutes: i32) -> Result<FixedOffset> {
    tz_offset_minutes
        .checked_mul(60)
        .and_then(FixedOffset::east_opt)
        .ok_or_else(|| Error::InvalidRange(format!("utc offset {} min out of range", tz_offset_minutes)))
}

// ----------------------------------------------------------------------------
// CSV Rendering
// ----------------------------------------------------------------------------

/// Render events as CSV with local dates and times
pub fn render_csv(events: &[StopEvent], tz_offset_minutes: i32) -> Result<String> {
    let offset = offset(tz_offset_minutes)?;
    let mut out = String::with_capacity(64 * (events.len() + 1));
    out.push_str(CSV_HEADER);
    out.push('\n');

    for event in events {
        let start = DateTime::from_timestamp(event.start_epoch_seconds, 0)
            .ok_or_else(|| {
                Error::InvalidRange(format!("start {} not representable", event.start_epoch_seconds))
            })?
            .with_timezone(&offset);
        let accum = event
            .accum_stops
            .map(|n| n.to_string())
            .unwrap_or_default();

        // writing to a String cannot fail
        let _ = writeln!(
            out,
            "{:04}-{:02}-{:02},{},{},{},{},{}",
            start.year(),
            start.month(),
            start.day(),
            start.to_rfc3339_opts(SecondsFormat::Secs, false),
            event.duration_ms,
            format_hms(event.duration_ms),
            quote_field(&event.device_id),
            accum,
        );
    }
    Ok(out)
}

/// Render and write to any sink
pub fn write_csv<W: Write>(mut sink: W, events: &[StopEvent], tz_offset_minutes: i32) -> Result<()> {
    sink.write_all(render_csv(events, tz_offset_minutes)?.as_bytes())?;
    sink.flush()?;
    Ok(())
}

/// `HH:MM:SS.mmm`; negative durations clamp to zero
pub fn format_hms(duration_ms: i64) -> String {
    let ms = duration_ms.max(0);
    let hours = ms / 3_600_000;
    let minutes = (ms / 60_000) % 60;
    let seconds = (ms / 1_000) % 60;
    format!("{:02}:{:02}:{:02}.{:03}", hours, minutes, seconds, ms % 1_000)
}

fn quote_field(value: &str) -> String {
    if value.contains(&[',', '"', '\n', '\r'][..]) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_day_bounds_follow_offset() {
        let day = ExportRange::parse_day("2023-11-14").unwrap();
        // 2023-11-14T00:00:00Z
        assert_eq!(day.bounds(0).unwrap(), (1_699_920_000, 1_700_006_399));
        // an hour east of UTC the local day starts an hour earlier
        assert_eq!(day.bounds(60).unwrap(), (1_699_916_400, 1_700_002_799));
    }

    #[test]
    fn test_month_bounds_wrap_year() {
        let december = ExportRange::parse_month("2023-12").unwrap();
        let (from, to) = december.bounds(0).unwrap();
        assert_eq!(from, 1_701_388_800); // 2023-12-01
        assert_eq!(to, 1_704_067_199); // 2023-12-31T23:59:59
    }

    #[test]
    fn test_bad_ranges_are_rejected() {
        assert!(ExportRange::parse_day("2023-02-30").is_err());
        assert!(ExportRange::parse_month("2023-13").is_err());
        assert!(ExportRange::parse_month("november").is_err());
        assert!(ExportRange::All.bounds(0).is_ok());
        assert!(ExportRange::parse_day("2023-01-01").unwrap().bounds(100_000).is_err());
    }

    #[test]
    fn test_format_hms() {
        assert_eq!(format_hms(4523), "00:00:04.523");
        assert_eq!(format_hms(3_723_004), "01:02:03.004");
        assert_eq!(format_hms(-5), "00:00:00.000");
    }

    #[test]
    fn test_render_csv_rows() {
        let events = vec![
            StopEvent::new(1_700_000_000, 4523, "BS-0042", Some(17)),
            StopEvent::new(1_700_000_100, 61_000, "BS,\"x\"", None),
        ];
        let csv = render_csv(&events, 60).unwrap();
        let lines: Vec<&str> = csv.lines().collect();

        assert_eq!(lines[0], CSV_HEADER);
        assert_eq!(
            lines[1],
            "2023-11-14,2023-11-14T23:13:20+01:00,4523,00:00:04.523,BS-0042,17"
        );
        assert_eq!(
            lines[2],
            "2023-11-14,2023-11-14T23:15:00+01:00,61000,00:01:01.000,\"BS,\"\"x\"\"\","
        );
    }

    #[test]
    fn test_local_date_can_differ_from_utc_date() {
        // 22:13 UTC is already the next day two hours east
        let csv = render_csv(&[StopEvent::new(1_700_000_000, 1, "d", None)], 120).unwrap();
        assert!(csv.lines().nth(1).unwrap().starts_with("2023-11-15,2023-11-15T00:13:20+02:00"));
    }
}
