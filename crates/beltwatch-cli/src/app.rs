//! Wiring of transport, session and store into a running session task

use std::path::PathBuf;

use tokio::task::JoinHandle;
use tracing::{error, info};

use beltwatch_ble::{BleTransport, DiscoveredDevice};
use beltwatch_core::{
    channel::{
        create_app_event_channel, create_command_channel, create_transport_event_channel,
        AppEventReceiver, CommandSender,
    },
    session::NO_SYNC_INDEX,
    store::{get_setting_or, keys, load_config_snapshot},
    AppEvent, Command, DeviceSelector, Session, SessionRuntime, SystemTimeSource,
};
use beltwatch_store::SqliteEventStore;

use crate::config::BeltwatchConfig;
use crate::error::{CliError, Result};

type BleRuntime = SessionRuntime<BleTransport, SqliteEventStore>;

// ----------------------------------------------------------------------------
// Application
// ----------------------------------------------------------------------------

pub struct BeltwatchApp {
    config: BeltwatchConfig,
    database_path: PathBuf,
}

impl BeltwatchApp {
    pub fn new(config: BeltwatchConfig, database_override: Option<PathBuf>) -> Result<Self> {
        let database_path = match database_override {
            Some(path) => path,
            None => config.storage.resolved_database_path()?,
        };
        Ok(Self {
            config,
            database_path,
        })
    }

    pub fn config(&self) -> &BeltwatchConfig {
        &self.config
    }

    pub fn open_store(&self) -> Result<SqliteEventStore> {
        Ok(SqliteEventStore::open(&self.database_path)?)
    }

    /// Scan for sensors without starting a session
    pub async fn scan(&self, timeout_secs: Option<u64>) -> Result<Vec<DiscoveredDevice>> {
        let mut transport_config = self.config.ble.transport_config();
        if let Some(secs) = timeout_secs {
            transport_config = transport_config.with_scan_timeout(std::time::Duration::from_secs(secs));
        }
        // nothing is connected, so no events will arrive
        let (events_tx, _events_rx) = create_transport_event_channel();
        let mut transport = BleTransport::new(transport_config, events_tx);
        Ok(transport.scan().await?)
    }

    /// Restore persisted state, spawn the runtime task and start connecting
    pub async fn start(&self, selector: DeviceSelector) -> Result<RunningSession> {
        let store = self.open_store()?;
        let snapshot = load_config_snapshot(&store, self.config.device.snapshot()).await?;
        let last_sync_index = get_setting_or(&store, keys::LAST_SYNC_INDEX, NO_SYNC_INDEX).await?;
        info!(
            "Loaded settings from {} (last acknowledged sync #{})",
            self.database_path.display(),
            last_sync_index
        );

        let session = Session::new(
            snapshot,
            self.config.device.session_options(),
            Box::new(SystemTimeSource),
        )
        .with_last_sync_index(last_sync_index);

        let (command_tx, command_rx) = create_command_channel(&self.config.cli.channel_config());
        let (event_tx, event_rx) = create_transport_event_channel();
        let (app_tx, app_rx) = create_app_event_channel();

        let transport = BleTransport::new(self.config.ble.transport_config(), event_tx);
        let mut runtime: BleRuntime =
            SessionRuntime::new(session, transport, store, command_rx, event_rx, app_tx);

        let task = tokio::spawn(async move {
            if let Err(e) = runtime.run().await {
                error!("Session runtime failed: {}", e);
            }
        });

        command_tx
            .send(Command::Connect(selector))
            .await
            .map_err(|_| CliError::Runtime("session task exited before connecting".to_string()))?;

        Ok(RunningSession {
            commands: command_tx,
            events: app_rx,
            task,
        })
    }
}

// ----------------------------------------------------------------------------
// Running Session
// ----------------------------------------------------------------------------

/// Handle on a spawned session runtime
pub struct RunningSession {
    commands: CommandSender,
    events: AppEventReceiver,
    task: JoinHandle<()>,
}

impl RunningSession {
    pub async fn send(&self, command: Command) -> Result<()> {
        self.commands
            .send(command)
            .await
            .map_err(|_| CliError::Runtime("session task is no longer running".to_string()))
    }

    /// Next app event; `None` once the runtime has stopped
    pub async fn next_event(&mut self) -> Option<AppEvent> {
        self.events.recv().await
    }

    /// Ask the runtime to disconnect and wait for it to finish
    pub async fn shutdown(self) -> Result<()> {
        // the task may already be gone; joining below reports that
        let _ = self.commands.send(Command::Shutdown).await;
        self.task
            .await
            .map_err(|e| CliError::Runtime(e.to_string()))
    }
}
