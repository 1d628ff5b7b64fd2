//! Session runtime task
//!
//! Single task that serialises everything touching session state: user
//! commands and transport events are drained from their channels in arrival
//! order, and the resulting effects are executed one at a time, awaiting each
//! transport write or store call before starting the next.

use std::collections::VecDeque;

use tracing::{debug, error, info, warn};

use crate::channel::{
    AppEvent, AppEventSender, Command, CommandReceiver, Effect, TransportEvent,
    TransportEventReceiver,
};
use crate::errors::{BeltwatchError, Result};
use crate::session::Session;
use crate::store::EventStore;
use crate::transport::DeviceTransport;
use crate::types::DeviceSelector;

// ----------------------------------------------------------------------------
// Session Runtime
// ----------------------------------------------------------------------------

/// Drives one [`Session`] against a transport and a store
pub struct SessionRuntime<T, S> {
    session: Session,
    transport: T,
    store: S,
    commands: CommandReceiver,
    transport_events: TransportEventReceiver,
    app_events: AppEventSender,
    running: bool,
}

impl<T, S> SessionRuntime<T, S>
where
    T: DeviceTransport,
    S: EventStore,
{
    pub fn new(
        session: Session,
        transport: T,
        store: S,
        commands: CommandReceiver,
        transport_events: TransportEventReceiver,
        app_events: AppEventSender,
    ) -> Self {
        Self {
            session,
            transport,
            store,
            commands,
            transport_events,
            app_events,
            running: false,
        }
    }

    /// Main loop; returns when `Shutdown` arrives or the command channel closes
    pub async fn run(&mut self) -> Result<()> {
        info!("Session runtime starting");
        self.running = true;

        while self.running {
            tokio::select! {
                command = self.commands.recv() => {
                    match command {
                        Some(command) => self.handle_command(command).await,
                        None => {
                            info!("Command channel closed, shutting down");
                            break;
                        }
                    }
                }

                event = self.transport_events.recv() => {
                    match event {
                        Some(event) => self.handle_transport_event(event).await,
                        None => {
                            // the transport owns the only sender; nothing more can arrive
                            debug!("Transport event channel closed");
                            self.running = false;
                        }
                    }
                }
            }
        }

        self.teardown().await;
        info!("Session runtime stopped");
        Ok(())
    }

    /// Apply one user action
    pub async fn handle_command(&mut self, command: Command) {
        debug!("Command: {:?}", command);
        let name = command.name();
        let outcome = match command {
            Command::Connect(selector) => {
                self.connect(selector).await;
                return;
            }
            Command::Disconnect => {
                self.disconnect("closed by user").await;
                return;
            }
            Command::QueryStatus => {
                let status = self.session.status();
                self.notify(AppEvent::Status(Box::new(status)));
                return;
            }
            Command::Shutdown => {
                self.running = false;
                return;
            }
            Command::SendTime => self.session.send_time_only(),
            Command::SendSchedule(schedule) => self.session.send_schedule(schedule),
            Command::SendBreaks(breaks) => self.session.send_breaks(breaks),
            Command::SendThresholds(thresholds) => self.session.send_thresholds(thresholds),
            Command::SetCalibration(on) => self.session.set_calibration(on),
            Command::RequestSync => self.session.request_sync(),
            Command::SetTzOffset(minutes) => Ok(self.session.set_tz_offset_minutes(minutes)),
        };

        match outcome {
            Ok(effects) => self.execute(effects).await,
            Err(e) => {
                warn!("{} rejected: {}", name, e);
                self.notify(AppEvent::CommandFailed {
                    command: name.to_string(),
                    reason: e.to_string(),
                });
            }
        }
    }

    /// Apply one inbound transport event
    pub async fn handle_transport_event(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::Data(chunk) => {
                let effects = self.session.on_data(&chunk);
                self.execute(effects).await;
            }
            TransportEvent::Disconnected { reason } => {
                self.disconnect(&reason).await;
            }
        }
    }

    async fn connect(&mut self, selector: DeviceSelector) {
        if let Err(e) = self.session.begin_connect() {
            warn!("Connect ignored: {}", e);
            self.notify(AppEvent::CommandFailed {
                command: "connect".to_string(),
                reason: e.to_string(),
            });
            return;
        }

        info!("Connecting to device by {}", selector);
        self.notify(AppEvent::Connecting {
            selector: selector.clone(),
        });

        let effects = match self.transport.connect(&selector).await {
            Ok(device) => self.session.connected(device),
            Err(e) => {
                error!("Connect failed: {}", e);
                self.session.connect_failed(e.to_string())
            }
        };
        self.execute(effects).await;
    }

    async fn disconnect(&mut self, reason: &str) {
        if let Err(e) = self.transport.disconnect().await {
            warn!("Transport disconnect reported: {}", e);
        }
        let effects = self.session.disconnected(reason);
        self.execute(effects).await;
    }

    async fn teardown(&mut self) {
        if self.transport.is_connected() || self.session.is_connected() {
            self.disconnect("shutdown").await;
        }
    }

    /// Execute effects strictly in order
    ///
    /// When a write fails, the session's reaction to it runs before the rest
    /// of the batch.
    pub async fn execute(&mut self, effects: Vec<Effect>) {
        let mut pending: VecDeque<Effect> = effects.into();
        while let Some(effect) = pending.pop_front() {
            let sent = match &effect {
                Effect::Send(command) => Some(*command),
                _ => None,
            };
            if let Err(e) = self.execute_one(effect).await {
                error!("{}", e);
                if let Some(command) = sent {
                    for follow_up in self.session.command_failed(&command).into_iter().rev() {
                        pending.push_front(follow_up);
                    }
                }
            }
        }
    }

    async fn execute_one(&mut self, effect: Effect) -> Result<()> {
        match effect {
            Effect::Send(command) => {
                let line = command.to_line();
                debug!("-> {}", line.trim_end());
                match self.transport.send(line.as_bytes()).await {
                    Ok(()) => self.notify(AppEvent::CommandSent(command)),
                    Err(e) => {
                        self.notify(AppEvent::CommandFailed {
                            command: command.name().to_string(),
                            reason: e.to_string(),
                        });
                        return Err(BeltwatchError::Transport(e));
                    }
                }
            }
            Effect::StoreEvent(event) => match self.store.append_event(&event).await {
                Ok(id) => self.notify(AppEvent::StopRecorded { id, event }),
                Err(e) => {
                    self.notify(AppEvent::StorageFailed {
                        reason: e.to_string(),
                    });
                    return Err(BeltwatchError::Store(e));
                }
            },
            Effect::PersistSetting { key, value } => {
                if let Err(e) = self.store.put_setting(&key, &value).await {
                    self.notify(AppEvent::StorageFailed {
                        reason: e.to_string(),
                    });
                    return Err(BeltwatchError::Store(e));
                }
            }
            Effect::Notify(event) => self.notify(event),
        }
        Ok(())
    }

    fn notify(&self, event: AppEvent) {
        // no listener is fine: the runtime keeps going headless
        let _ = self.app_events.send(event);
    }
}
