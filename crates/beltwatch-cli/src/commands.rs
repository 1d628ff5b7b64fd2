//! Command handlers for the Beltwatch CLI

use std::io::Write;
use std::path::PathBuf;

use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};

use beltwatch_core::store::load_tz_offset_minutes;
use beltwatch_core::{AppEvent, Command, DeviceSelector, EventStore};
use beltwatch_store::{export, ExportRange};

use crate::app::{BeltwatchApp, RunningSession};
use crate::cli::{Cli, Commands, DeviceArgs};
use crate::config::BeltwatchConfig;
use crate::error::{CliError, Result};
use crate::terminal::{describe_event, parse_input, TerminalInput, HELP};

/// Command dispatcher for handling CLI commands
pub struct CommandDispatcher;

impl CommandDispatcher {
    pub async fn execute(cli: Cli, config: BeltwatchConfig) -> Result<()> {
        let app = BeltwatchApp::new(config, cli.db)?;

        match cli.command {
            Commands::Scan { timeout } => Self::handle_scan_command(&app, timeout).await,
            Commands::Run { device } => Self::handle_run_command(&app, device).await,
            Commands::Sync { device } => Self::handle_sync_command(&app, device).await,
            Commands::Export {
                day,
                month,
                all,
                tz_offset,
                out,
            } => {
                let range = match (day, month) {
                    (Some(day), _) => ExportRange::parse_day(&day)?,
                    (None, Some(month)) => ExportRange::parse_month(&month)?,
                    (None, None) if all => ExportRange::All,
                    (None, None) => {
                        return Err(CliError::InvalidInput(
                            "one of --day, --month or --all is required".to_string(),
                        ))
                    }
                };
                Self::handle_export_command(&app, range, tz_offset, out).await
            }
            Commands::Config { example } => Self::handle_config_command(&app, example),
        }
    }

    fn selector(app: &BeltwatchApp, device: DeviceArgs) -> DeviceSelector {
        match (device.address, device.name) {
            (Some(address), _) => DeviceSelector::Address(address),
            (None, Some(prefix)) => DeviceSelector::NamePrefix(prefix),
            (None, None) => app.config().ble.selector(),
        }
    }

    async fn handle_scan_command(app: &BeltwatchApp, timeout: Option<u64>) -> Result<()> {
        info!("Scanning for sensors...");
        let devices = app.scan(timeout).await?;
        if devices.is_empty() {
            println!("No sensors found.");
        } else {
            println!("Sensors:");
            for device in devices {
                println!("  {}", device);
            }
        }
        Ok(())
    }

    /// Stay attached, printing events and forwarding stdin commands
    async fn handle_run_command(app: &BeltwatchApp, device: DeviceArgs) -> Result<()> {
        let selector = Self::selector(app, device);
        let mut session = app.start(selector.clone()).await?;
        let prompt = app.config().cli.prompt.clone();
        let mut stdin = BufReader::new(tokio::io::stdin()).lines();

        println!("Type 'help' for commands.");
        let outcome = loop {
            tokio::select! {
                line = stdin.next_line() => {
                    let line = match line {
                        Ok(Some(line)) => line,
                        Ok(None) => break Ok(()),
                        Err(e) => break Err(CliError::Io(e)),
                    };
                    match parse_input(&line, &selector) {
                        Ok(None) => {}
                        Ok(Some(TerminalInput::Command(command))) => {
                            if let Err(e) = session.send(command).await {
                                break Err(e);
                            }
                        }
                        Ok(Some(TerminalInput::Help)) => println!("{}", HELP),
                        Ok(Some(TerminalInput::Quit)) => break Ok(()),
                        Err(message) => println!("{}", message),
                    }
                    print_prompt(&prompt);
                }

                event = session.next_event() => {
                    match event {
                        Some(event) => {
                            if let Some(text) = describe_event(&event) {
                                println!("{}", text);
                            }
                        }
                        None => break Err(CliError::SessionEnded("session task stopped".to_string())),
                    }
                }

                _ = tokio::signal::ctrl_c() => {
                    info!("Interrupted");
                    break Ok(());
                }
            }
        };

        session.shutdown().await?;
        outcome
    }

    /// Connect, wait for the handshake, request the backlog, exit after the ACK
    async fn handle_sync_command(app: &BeltwatchApp, device: DeviceArgs) -> Result<()> {
        let mut session = app.start(Self::selector(app, device)).await?;

        // no timeout on the round trip; Ctrl-C is the way out
        let outcome = tokio::select! {
            outcome = Self::drive_sync(&mut session) => outcome,
            _ = tokio::signal::ctrl_c() => Err(CliError::SessionEnded("interrupted".to_string())),
        };

        session.shutdown().await?;
        outcome
    }

    async fn drive_sync(session: &mut RunningSession) -> Result<()> {
        let mut stored = 0usize;
        while let Some(event) = session.next_event().await {
            if let Some(text) = describe_event(&event) {
                info!("{}", text);
            }
            match event {
                AppEvent::Hello(_) => session.send(Command::RequestSync).await?,
                AppEvent::StopRecorded { .. } => stored += 1,
                AppEvent::SyncComplete { last_index } => {
                    println!("Synced {} stop(s), acknowledged #{}", stored, last_index);
                    return Ok(());
                }
                AppEvent::SyncIncomplete => {
                    return Err(CliError::SessionEnded("sync not complete".to_string()))
                }
                AppEvent::ConnectFailed { reason } => return Err(CliError::SessionEnded(reason)),
                AppEvent::Disconnected { reason } => {
                    return Err(CliError::SessionEnded(format!("sync not complete: {}", reason)))
                }
                AppEvent::CommandFailed { command, reason } => {
                    warn!("{} failed: {}", command, reason);
                }
                _ => {}
            }
        }
        Err(CliError::SessionEnded("session task stopped".to_string()))
    }

    async fn handle_export_command(
        app: &BeltwatchApp,
        range: ExportRange,
        tz_offset: Option<i32>,
        out: Option<PathBuf>,
    ) -> Result<()> {
        let store = app.open_store()?;
        let tz_offset = match tz_offset {
            Some(minutes) => {
                crate::config::validate_tz_offset(minutes)?;
                minutes
            }
            // same offset the device was last given
            None => {
                let fallback = app.config().device.effective_tz_offset_minutes();
                load_tz_offset_minutes(&store, fallback).await?
            }
        };
        let (from, to) = range.bounds(tz_offset)?;

        let events = store.query_events_in_range(from, to).await?;

        match out {
            Some(path) => {
                let file = std::fs::File::create(&path)?;
                export::write_csv(std::io::BufWriter::new(file), &events, tz_offset)?;
                println!("Wrote {} stop(s) to {}", events.len(), path.display());
            }
            None => export::write_csv(std::io::stdout().lock(), &events, tz_offset)?,
        }
        Ok(())
    }

    fn handle_config_command(app: &BeltwatchApp, example: bool) -> Result<()> {
        if example {
            println!("{}", BeltwatchConfig::example_config());
        } else {
            println!("{}", app.config().to_toml()?);
        }
        Ok(())
    }
}

fn print_prompt(prompt: &str) {
    print!("{}", prompt);
    // a failed flush only delays the prompt
    let _ = std::io::stdout().flush();
}
