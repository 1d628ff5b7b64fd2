//! Interactive terminal commands
//!
//! Turns operator input lines into runtime [`Command`]s and renders
//! [`AppEvent`]s as one-line status messages.

use beltwatch_core::{
    AppEvent, BreakWindows, Command, DeviceSelector, ScheduleWindow, SessionStatus, SyncStatus,
    Thresholds,
};

use crate::config::validate_tz_offset;

pub const HELP: &str = "\
commands:
  time                                   push the current time
  sched <start> <end> [on|off]           detection window, HH:MM or minutes
  breaks <s1> <e1> <s2> <e2> [on|off]    two break windows
  thresh <g> <hysteresis_g> <down_s> <up_s>
  calib on|off                           calibration telemetry
  tz <minutes>                           UTC offset for later time pushes
  sync                                   download and acknowledge the backlog
  connect [address]                      reconnect, optionally to another device
  disconnect
  status
  help
  quit";

/// One parsed input line
#[derive(Debug, Clone, PartialEq)]
pub enum TerminalInput {
    Command(Command),
    Help,
    Quit,
}

// ----------------------------------------------------------------------------
// Input Parsing
// ----------------------------------------------------------------------------

/// Parse an input line; blank lines yield `Ok(None)`
///
/// `default_selector` is used by a bare `connect`.
pub fn parse_input(
    line: &str,
    default_selector: &DeviceSelector,
) -> Result<Option<TerminalInput>, String> {
    let mut words = line.split_whitespace();
    let Some(verb) = words.next() else {
        return Ok(None);
    };
    let args: Vec<&str> = words.collect();

    let input = match verb.to_ascii_lowercase().as_str() {
        "time" => TerminalInput::Command(Command::SendTime),
        "sched" | "schedule" => TerminalInput::Command(Command::SendSchedule(parse_schedule(&args)?)),
        "breaks" => TerminalInput::Command(Command::SendBreaks(parse_breaks(&args)?)),
        "thresh" | "thresholds" => {
            TerminalInput::Command(Command::SendThresholds(parse_thresholds(&args)?))
        }
        "calib" => match args.as_slice() {
            [state] => TerminalInput::Command(Command::SetCalibration(parse_switch(state)?)),
            _ => return Err("usage: calib on|off".to_string()),
        },
        "sync" => TerminalInput::Command(Command::RequestSync),
        "tz" => match args.as_slice() {
            [minutes] => {
                let minutes: i32 = parse_number(minutes, "utc offset")?;
                validate_tz_offset(minutes).map_err(|e| e.to_string())?;
                TerminalInput::Command(Command::SetTzOffset(minutes))
            }
            _ => return Err("usage: tz <minutes east of UTC>".to_string()),
        },
        "connect" => {
            let selector = match args.as_slice() {
                [] => default_selector.clone(),
                [address] => DeviceSelector::Address(address.to_string()),
                _ => return Err("usage: connect [address]".to_string()),
            };
            TerminalInput::Command(Command::Connect(selector))
        }
        "disconnect" => TerminalInput::Command(Command::Disconnect),
        "status" => TerminalInput::Command(Command::QueryStatus),
        "help" | "?" => TerminalInput::Help,
        "quit" | "exit" => TerminalInput::Quit,
        other => return Err(format!("unknown command '{}', try 'help'", other)),
    };
    Ok(Some(input))
}

fn parse_schedule(args: &[&str]) -> Result<ScheduleWindow, String> {
    let (times, enabled) = split_switch(args)?;
    let [start, end] = times else {
        return Err("usage: sched <start> <end> [on|off]".to_string());
    };
    let schedule = ScheduleWindow {
        start_min: parse_minute(start)?,
        end_min: parse_minute(end)?,
        enabled,
    };
    schedule.validate()?;
    Ok(schedule)
}

fn parse_breaks(args: &[&str]) -> Result<BreakWindows, String> {
    let (times, enabled) = split_switch(args)?;
    let [s1, e1, s2, e2] = times else {
        return Err("usage: breaks <s1> <e1> <s2> <e2> [on|off]".to_string());
    };
    let breaks = BreakWindows {
        first_start_min: parse_minute(s1)?,
        first_end_min: parse_minute(e1)?,
        second_start_min: parse_minute(s2)?,
        second_end_min: parse_minute(e2)?,
        enabled,
    };
    breaks.validate()?;
    Ok(breaks)
}

fn parse_thresholds(args: &[&str]) -> Result<Thresholds, String> {
    let [g, hysteresis, down, up] = args else {
        return Err("usage: thresh <g> <hysteresis_g> <down_s> <up_s>".to_string());
    };
    let thresholds = Thresholds {
        threshold_g: parse_number(g, "threshold")?,
        hysteresis_g: parse_number(hysteresis, "hysteresis")?,
        seconds_down: parse_number(down, "seconds down")?,
        seconds_up: parse_number(up, "seconds up")?,
    };
    thresholds.validate()?;
    Ok(thresholds)
}

/// Peel an optional trailing on/off; absent means enabled
fn split_switch<'a, 'b>(args: &'a [&'b str]) -> Result<(&'a [&'b str], bool), String> {
    match args.split_last() {
        Some((last, rest)) if last.eq_ignore_ascii_case("on") || last.eq_ignore_ascii_case("off") => {
            Ok((rest, parse_switch(last)?))
        }
        _ => Ok((args, true)),
    }
}

fn parse_switch(word: &str) -> Result<bool, String> {
    match word.to_ascii_lowercase().as_str() {
        "on" | "1" | "true" => Ok(true),
        "off" | "0" | "false" => Ok(false),
        other => Err(format!("expected on or off, got '{}'", other)),
    }
}

/// `HH:MM` or a plain minute-of-day
fn parse_minute(word: &str) -> Result<u16, String> {
    match word.split_once(':') {
        Some((hours, minutes)) => {
            let hours: u16 = parse_number(hours, "hour")?;
            let minutes: u16 = parse_number(minutes, "minute")?;
            if minutes >= 60 {
                return Err(format!("bad time '{}'", word));
            }
            Ok(hours.saturating_mul(60).saturating_add(minutes))
        }
        None => parse_number(word, "minute of day"),
    }
}

fn parse_number<T: std::str::FromStr>(word: &str, what: &str) -> Result<T, String> {
    word.parse()
        .map_err(|_| format!("bad {} '{}'", what, word))
}

// ----------------------------------------------------------------------------
// Event Rendering
// ----------------------------------------------------------------------------

/// `HH:MM` for a minute-of-day value
pub fn format_minute(minute: u16) -> String {
    format!("{:02}:{:02}", minute / 60, minute % 60)
}

/// One line describing an app event, or `None` for routine ones
pub fn describe_event(event: &AppEvent) -> Option<String> {
    let text = match event {
        AppEvent::Connecting { selector } => format!("connecting to {}...", selector),
        AppEvent::Connected(device) => format!(
            "connected to {} [{}]",
            device.name.as_deref().unwrap_or("sensor"),
            device.address
        ),
        AppEvent::ConnectFailed { reason } => format!("connect failed: {}", reason),
        AppEvent::Disconnected { reason } => format!("disconnected: {}", reason),
        AppEvent::Hello(hello) => format!(
            "HELLO {} fw {} | clock {} | unsent {} | battery {} mV | shift stops {}",
            hello.device_id,
            hello.firmware_version,
            if hello.clock_synced { "set" } else { "not set" },
            hello.unsent_count,
            hello.battery_mv,
            hello.accum_stops
        ),
        AppEvent::Calibration(calibration) => format!("vibration {:.3} g", calibration.vibration_g),
        AppEvent::StopRecorded { id, event } => format!(
            "stop #{} at {} lasting {:.1} s (shift total {})",
            id,
            event.start_epoch_seconds,
            event.duration_ms as f64 / 1000.0,
            event
                .accum_stops
                .map(|n| n.to_string())
                .unwrap_or_else(|| "-".to_string())
        ),
        AppEvent::SyncRequested => "sync requested".to_string(),
        AppEvent::SyncComplete { last_index } => format!("sync complete, acknowledged #{}", last_index),
        AppEvent::SyncIncomplete => "sync not complete: link lost".to_string(),
        AppEvent::CommandSent(_) => return None,
        AppEvent::CommandFailed { command, reason } => format!("{} failed: {}", command, reason),
        AppEvent::StorageFailed { reason } => format!("storage failed: {}", reason),
        AppEvent::Status(status) => describe_status(status),
    };
    Some(text)
}

fn describe_status(status: &SessionStatus) -> String {
    let mut lines = vec![format!("phase: {}", status.state.phase)];
    if let Some(device) = &status.device {
        lines.push(format!("device: {}", device.address));
    }
    if let Some(hello) = &status.last_hello {
        lines.push(format!(
            "sensor: {} fw {}, battery {} mV",
            hello.device_id, hello.firmware_version, hello.battery_mv
        ));
    }
    if let Some(total) = status.shift_total {
        lines.push(format!("shift stops: {}", total));
    }
    if let Some(stop) = &status.last_stop {
        lines.push(format!(
            "last stop: {} ({} ms)",
            stop.start_epoch_seconds, stop.duration_ms
        ));
    }
    lines.push(match status.sync {
        SyncStatus::Idle => "sync: idle".to_string(),
        SyncStatus::Pending => "sync: waiting for device".to_string(),
        SyncStatus::Complete { last_index } => format!("sync: complete (#{})", last_index),
        SyncStatus::Incomplete => "sync: not complete".to_string(),
    });
    let config = &status.config;
    lines.push(format!(
        "schedule: {}-{} {}",
        format_minute(config.schedule.start_min),
        format_minute(config.schedule.end_min),
        if config.schedule.enabled { "on" } else { "off" }
    ));
    lines.push(format!(
        "thresholds: {} g / {} g, {} s down, {} s up",
        config.thresholds.threshold_g,
        config.thresholds.hysteresis_g,
        config.thresholds.seconds_down,
        config.thresholds.seconds_up
    ));
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(line: &str) -> Result<Option<TerminalInput>, String> {
        parse_input(line, &DeviceSelector::NamePrefix("BeltStop".to_string()))
    }

    fn command(line: &str) -> Command {
        match parse(line) {
            Ok(Some(TerminalInput::Command(command))) => command,
            other => panic!("{:?} did not parse to a command: {:?}", line, other),
        }
    }

    #[test]
    fn test_blank_line() {
        assert_eq!(parse("   "), Ok(None));
    }

    #[test]
    fn test_schedule_accepts_clock_and_minutes() {
        assert_eq!(
            command("sched 07:00 1020"),
            Command::SendSchedule(ScheduleWindow {
                start_min: 420,
                end_min: 1020,
                enabled: true
            })
        );
        assert!(matches!(
            command("sched 6:30 15:00 off"),
            Command::SendSchedule(ScheduleWindow { start_min: 390, end_min: 900, enabled: false })
        ));
    }

    #[test]
    fn test_schedule_rejects_out_of_day() {
        assert!(parse("sched 07:00 24:00").is_err());
        assert!(parse("sched 07:61 08:00").is_err());
        assert!(parse("sched 07:00").is_err());
    }

    #[test]
    fn test_breaks() {
        assert_eq!(
            command("breaks 10:00 10:15 12:00 12:30"),
            Command::SendBreaks(BreakWindows::default())
        );
    }

    #[test]
    fn test_thresholds() {
        assert_eq!(
            command("thresh 0.2 0.05 5 4"),
            Command::SendThresholds(Thresholds {
                threshold_g: 0.2,
                hysteresis_g: 0.05,
                seconds_down: 5,
                seconds_up: 4
            })
        );
        assert!(parse("thresh -1 0 1 1").is_err());
        assert!(parse("thresh 0.1 0.1 x 1").is_err());
    }

    #[test]
    fn test_simple_commands() {
        assert_eq!(command("CALIB on"), Command::SetCalibration(true));
        assert_eq!(command("sync"), Command::RequestSync);
        assert_eq!(
            command("connect"),
            Command::Connect(DeviceSelector::NamePrefix("BeltStop".to_string()))
        );
        assert_eq!(
            command("connect AA:BB"),
            Command::Connect(DeviceSelector::Address("AA:BB".to_string()))
        );
        assert_eq!(command("tz -300"), Command::SetTzOffset(-300));
        assert!(parse("tz 1440").is_err());
        assert_eq!(parse("quit"), Ok(Some(TerminalInput::Quit)));
        assert!(parse("reboot").is_err());
    }

    #[test]
    fn test_describe_event() {
        assert_eq!(
            describe_event(&AppEvent::SyncComplete { last_index: 42 }).as_deref(),
            Some("sync complete, acknowledged #42")
        );
        assert_eq!(
            describe_event(&AppEvent::CommandSent(beltwatch_core::OutboundCommand::SyncRequest)),
            None
        );
    }

    #[test]
    fn test_format_minute() {
        assert_eq!(format_minute(420), "07:00");
        assert_eq!(format_minute(1439), "23:59");
    }
}
